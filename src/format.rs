//! Display helpers for object sizes and timestamps

use chrono::{DateTime, Datelike, Utc};

const SIZE_UNITS: [&str; 9] = [
    "Bytes", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB",
];

/// Format a byte count with power-of-1024 units and 2-decimal rounding.
pub fn format_bytes(bytes: u64) -> String {
    format_bytes_with(bytes, 2)
}

pub fn format_bytes_with(bytes: u64, decimals: u32) -> String {
    if bytes == 0 {
        return "0 Byte".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    format!("{} {}", rounded, SIZE_UNITS[unit])
}

/// Format a last-modified timestamp as `YYYY-MM-DD HH:MM` (UTC).
///
/// Missing values and the zero date render as `-`.
pub fn format_timestamp(value: Option<DateTime<Utc>>) -> String {
    match value {
        Some(dt) if dt.year() > 1 => dt.format("%Y-%m-%d %H:%M").to_string(),
        _ => "-".to_string(),
    }
}

/// Convert an S3 timestamp into a chrono `DateTime`.
pub(crate) fn from_smithy(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}
