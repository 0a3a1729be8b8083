//! Shared helpers for integration tests.

#![allow(dead_code, clippy::cast_possible_truncation)]

use std::path::Path;

/// Writes a Whisper file with one sub-archive per `(seconds_per_point, points)`.
pub fn write_whisper(path: &Path, archives: &[(u32, Vec<(u32, f64)>)]) {
    let mut buf = Vec::new();
    buf.extend_from_slice(&1u32.to_be_bytes()); // average
    let max_retention = archives
        .iter()
        .map(|(spp, points)| spp * points.len() as u32)
        .max()
        .unwrap_or(0);
    buf.extend_from_slice(&max_retention.to_be_bytes());
    buf.extend_from_slice(&0.5f32.to_bits().to_be_bytes());
    buf.extend_from_slice(&(archives.len() as u32).to_be_bytes());

    let mut offset = (16 + archives.len() * 12) as u32;
    for (spp, points) in archives {
        buf.extend_from_slice(&offset.to_be_bytes());
        buf.extend_from_slice(&spp.to_be_bytes());
        buf.extend_from_slice(&(points.len() as u32).to_be_bytes());
        offset += (points.len() * 12) as u32;
    }
    for (_, points) in archives {
        for (timestamp, value) in points {
            buf.extend_from_slice(&timestamp.to_be_bytes());
            buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, buf).unwrap();
}

/// Reads a bucket file and returns its non-header lines.
pub fn data_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
