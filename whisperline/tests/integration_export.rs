//! End-to-end tests: Whisper files on disk through to bucket files.

mod common;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use common::{data_lines, write_whisper};
use whisperline::config::parse_retention_names;
use whisperline::error::{WhisperlineError, WriteError};
use whisperline::whisper::WhisperOpener;
use whisperline::{
    BucketConfig, BucketRegistry, ExportOptions, ExportSummary, Exporter, MatchState, Plan, Rule,
    RuleSet,
};
use tempfile::tempdir;

fn export(
    root: &Path,
    rules: Vec<Rule>,
    buckets: BucketConfig,
    options: ExportOptions,
) -> (Plan, ExportSummary) {
    let rules = RuleSet::compile(rules).unwrap();
    let mut plan = Plan::build(root, &rules);
    let exporter = Exporter::new(WhisperOpener, BucketRegistry::new(buckets), options);
    let summary = exporter.run(&mut plan.matched, |_, _| {}).unwrap();
    (plan, summary)
}

fn unscaled() -> ExportOptions {
    ExportOptions {
        scale_by_interval: false,
        ..ExportOptions::default()
    }
}

#[test]
fn test_last_segment_measurement_and_default_field() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().join("whisper");
    write_whisper(&root.join("stats/server1/load.wsp"), &[(60, vec![(1000, 1.25)])]);

    let (plan, summary) = export(
        &root,
        vec![Rule::new("stats.{{host}}.load")],
        BucketConfig::new(temp_dir.path().join("out")),
        unscaled(),
    );

    assert_eq!(plan.matched[0].state(), MatchState::Exported);
    assert_eq!(summary.buckets.len(), 1);
    assert_eq!(data_lines(&summary.buckets[0].path), vec!["load value=1.25 1000"]);
}

#[test]
fn test_descending_substitution_keeps_numeric_captures() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().join("whisper");
    write_whisper(&root.join("a/10/b/20.wsp"), &[(10, vec![(100, 3.0)])]);

    let (_, summary) = export(
        &root,
        vec![
            Rule::new("a.{{x}}.b.{{y}}")
                .with_measurement("{{x}}_{{y}}")
                .with_tag("x", "{{x}}")
                .with_tag("y", "{{y}}"),
        ],
        BucketConfig::new(temp_dir.path().join("out")),
        unscaled(),
    );

    assert_eq!(
        data_lines(&summary.buckets[0].path),
        vec!["10_20,x=10,y=20 value=3 100"]
    );
}

#[test]
fn test_series_sharing_interval_share_one_bucket() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().join("whisper");
    write_whisper(
        &root.join("stats/a/load.wsp"),
        &[(60, vec![(60, 1.0), (120, 2.0)]), (3600, vec![(3600, 10.0)])],
    );
    write_whisper(
        &root.join("stats/b/load.wsp"),
        &[(60, vec![(60, 3.0)]), (3600, vec![(3600, 30.0)])],
    );

    let (_, summary) = export(
        &root,
        vec![Rule::new("stats.{{host}}.load").with_tag("host", "{{host}}")],
        BucketConfig::new(temp_dir.path().join("out")),
        unscaled(),
    );

    assert_eq!(summary.exported, 2);
    assert_eq!(summary.points_written, 5);
    let names: Vec<_> = summary.buckets.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["60", "3600"]);

    let minute = &summary.buckets[0];
    assert_eq!(minute.path, temp_dir.path().join("out/60-60.txt"));
    let contents = std::fs::read_to_string(&minute.path).unwrap();
    assert!(contents.starts_with(
        "# DML\n# CONTEXT-DATABASE: graphite\n# CONTEXT-RETENTION-POLICY: 60\n\n"
    ));
    assert_eq!(contents.matches("# DML").count(), 1);
    assert_eq!(
        data_lines(&minute.path),
        vec![
            "load,host=a value=1 60",
            "load,host=a value=2 120",
            "load,host=b value=3 60",
        ]
    );
    assert_eq!(
        data_lines(&summary.buckets[1].path),
        vec!["load,host=a value=10 3600", "load,host=b value=30 3600"]
    );
}

#[test]
fn test_retention_names_follow_discovery_order() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().join("whisper");
    // "a" sorts first, so its intervals claim names first: 10 then 60.
    write_whisper(&root.join("a.wsp"), &[(10, vec![(10, 1.0)]), (60, vec![(60, 1.0)])]);
    write_whisper(&root.join("b.wsp"), &[(60, vec![(120, 1.0)]), (600, vec![(600, 1.0)])]);

    let mut buckets = BucketConfig::new(temp_dir.path().join("out"));
    buckets.database = "telemetry".to_string();
    buckets.retention_names = parse_retention_names("raw,minute");

    let (_, summary) = export(&root, vec![Rule::new("{{name}}")], buckets, unscaled());

    let layout: Vec<_> = summary
        .buckets
        .iter()
        .map(|b| (b.key, b.name.as_str(), b.lines))
        .collect();
    assert_eq!(layout, vec![(10, "raw", 1), (60, "minute", 2), (600, "600", 1)]);

    let out = temp_dir.path().join("out");
    assert!(out.join("10-raw.txt").exists());
    assert!(out.join("60-minute.txt").exists());
    assert!(out.join("600-600.txt").exists());

    let header = std::fs::read_to_string(out.join("60-minute.txt")).unwrap();
    assert!(header.contains("# CONTEXT-DATABASE: telemetry\n"));
    assert!(header.contains("# CONTEXT-RETENTION-POLICY: minute\n"));
}

#[test]
fn test_rescaling_uses_ceiling_of_scaled_value() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().join("whisper");
    write_whisper(
        &root.join("rate.wsp"),
        &[(60, vec![(1000, 1.5), (1060, 0.125), (1120, -0.5)])],
    );

    let (_, summary) = export(
        &root,
        vec![Rule::new("rate")],
        BucketConfig::new(temp_dir.path().join("out")),
        ExportOptions::default(),
    );

    // 1.5 * 60 = 90, 0.125 * 60 = 7.5 -> 8, -0.5 * 60 = -30
    assert_eq!(
        data_lines(&summary.buckets[0].path),
        vec!["rate value=90 1000", "rate value=8 1060", "rate value=-30 1120"]
    );
}

#[test]
fn test_time_window_and_zeros() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().join("whisper");
    write_whisper(
        &root.join("m.wsp"),
        &[(1, vec![(0, 0.0), (99, 1.0), (100, 0.0), (150, 2.0), (200, 3.0), (201, 4.0)])],
    );

    let options = ExportOptions {
        from: 100,
        until: 200,
        export_zeros: true,
        scale_by_interval: false,
    };
    let (_, summary) = export(
        &root,
        vec![Rule::new("m")],
        BucketConfig::new(temp_dir.path().join("out")),
        options,
    );

    assert_eq!(
        data_lines(&summary.buckets[0].path),
        vec!["m value=0 100", "m value=2 150", "m value=3 200"]
    );
}

#[test]
fn test_gzip_output() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().join("whisper");
    write_whisper(&root.join("m.wsp"), &[(300, vec![(300, 4.5)])]);

    let mut buckets = BucketConfig::new(temp_dir.path().join("out"));
    buckets.compress = true;
    let (_, summary) = export(&root, vec![Rule::new("m")], buckets, unscaled());

    let path = &summary.buckets[0].path;
    assert_eq!(path, &temp_dir.path().join("out/300-300.txt.gz"));

    let mut contents = String::new();
    flate2::read::GzDecoder::new(File::open(path).unwrap())
        .read_to_string(&mut contents)
        .unwrap();
    assert_eq!(
        contents,
        "# DML\n# CONTEXT-DATABASE: graphite\n# CONTEXT-RETENTION-POLICY: 300\n\nm value=4.5 300\n"
    );
}

#[test]
fn test_corrupt_and_unmatched_series_do_not_stop_the_run() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().join("whisper");
    std::fs::create_dir_all(root.join("stats/bad")).unwrap();
    std::fs::write(root.join("stats/bad/load.wsp"), b"short").unwrap();
    write_whisper(&root.join("stats/good/load.wsp"), &[(60, vec![(60, 1.0)])]);
    write_whisper(&root.join("collectd/other.wsp"), &[(60, vec![(60, 9.0)])]);

    let (plan, summary) = export(
        &root,
        vec![Rule::new("stats.{{host}}.load")],
        BucketConfig::new(temp_dir.path().join("out")),
        unscaled(),
    );

    assert_eq!(plan.unmatched.len(), 1);
    assert_eq!(plan.unmatched[0].normalized_path(), "collectd.other");
    assert_eq!(plan.matched[0].state(), MatchState::ExportFailed);
    assert_eq!(plan.matched[1].state(), MatchState::Exported);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.exported, 1);
    assert_eq!(data_lines(&summary.buckets[0].path), vec!["load value=1 60"]);
}

#[test]
fn test_write_error_aborts_the_run() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().join("whisper");
    write_whisper(&root.join("stats/a/load.wsp"), &[(60, vec![(60, 1.0)])]);
    write_whisper(&root.join("stats/b/load.wsp"), &[(60, vec![(60, 2.0)])]);
    write_whisper(&root.join("stats/c/load.wsp"), &[(60, vec![(60, 3.0)])]);

    // A regular file where the export directory's parent should be.
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let rules = RuleSet::compile(vec![Rule::new("stats.{{host}}.load")]).unwrap();
    let mut plan = Plan::build(&root, &rules);
    assert_eq!(plan.matched.len(), 3);

    let exporter = Exporter::new(
        WhisperOpener,
        BucketRegistry::new(BucketConfig::new(blocker.join("out"))),
        unscaled(),
    );
    let mut progressed = 0;
    let err = exporter
        .run(&mut plan.matched, |_, _| progressed += 1)
        .unwrap_err();

    assert!(matches!(err, WhisperlineError::Write(WriteError::CreateDir { .. })));
    assert_eq!(progressed, 0);
    assert!(
        plan.matched
            .iter()
            .all(|series| series.state() == MatchState::Matched)
    );
}

#[test]
fn test_missing_root_exports_nothing() {
    let temp_dir = tempdir().unwrap();
    let (plan, summary) = export(
        &temp_dir.path().join("missing"),
        vec![Rule::new("{{x}}")],
        BucketConfig::new(temp_dir.path().join("out")),
        ExportOptions::default(),
    );

    assert!(plan.matched.is_empty());
    assert!(summary.buckets.is_empty());
    assert!(!temp_dir.path().join("out").exists());
}
