//! Line protocol encoding.
//!
//! One exported sample becomes one line:
//!
//! ```text
//! measurement[,tagkey=tagvalue]* field=value timestamp
//! ```
//!
//! `value` is the shortest decimal that round-trips the float, never in
//! exponent notation. `timestamp` is whole seconds. The encoder does not add
//! a line terminator.

use std::fmt::Write as _;

/// Renders one sample as a line protocol line without a trailing newline.
///
/// `tags` is the pre-rendered tag set (`,key=value` repeated), as produced
/// by [`crate::template::CompiledRule::resolve`].
///
/// # Example
///
/// ```rust
/// use whisperline::line::encode;
///
/// assert_eq!(
///     encode("load", ",host=a", "value", 1.5, 1_000),
///     "load,host=a value=1.5 1000"
/// );
/// ```
pub fn encode(measurement: &str, tags: &str, field: &str, value: f64, timestamp: u32) -> String {
    let mut line = String::with_capacity(measurement.len() + tags.len() + field.len() + 32);
    encode_into(&mut line, measurement, tags, field, value, timestamp);
    line
}

/// Appends one encoded line to `buf`, reusing its allocation.
pub fn encode_into(
    buf: &mut String,
    measurement: &str,
    tags: &str,
    field: &str,
    value: f64,
    timestamp: u32,
) {
    buf.push_str(measurement);
    buf.push_str(tags);
    buf.push(' ');
    buf.push_str(field);
    buf.push('=');
    // `Display` for f64 is shortest round-trip and never uses an exponent.
    let _ = write!(buf, "{value} {timestamp}");
}

/// Value written for a sample, optionally rescaled by its sampling interval.
///
/// With `scale` set, the result is `ceil(value * seconds_per_point)`.
pub fn output_value(value: f64, seconds_per_point: u32, scale: bool) -> f64 {
    if scale {
        (value * f64::from(seconds_per_point)).ceil()
    } else {
        value
    }
}

/// Header written once at the top of every bucket file.
///
/// The trailing blank line separates it from the data lines.
pub fn bucket_header(database: &str, retention: &str) -> String {
    format!("# DML\n# CONTEXT-DATABASE: {database}\n# CONTEXT-RETENTION-POLICY: {retention}\n\n")
}
