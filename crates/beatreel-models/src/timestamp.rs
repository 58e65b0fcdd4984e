//! Timestamp parsing for manual beat marks and end times.
//!
//! Accepts `SS`, `MM:SS` and `HH:MM:SS`, each with optional fractional
//! seconds.

use thiserror::Error;

/// Longest track the pipeline accepts (24 hours in seconds).
pub const MAX_TRACK_DURATION_SECS: f64 = 86400.0;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("timestamp cannot be empty")]
    Empty,

    #[error("timestamp cannot be negative")]
    Negative,

    #[error("invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("invalid timestamp format '{0}'. Use SS, MM:SS or HH:MM:SS (fractions allowed)")]
    InvalidFormat(String),

    #[error("timestamp exceeds maximum track duration ({0} seconds)")]
    ExceedsMaxDuration(f64),
}

fn parse_component(name: &'static str, raw: &str) -> Result<f64, TimestampError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, raw.to_string()))?;
    if !value.is_finite() {
        return Err(TimestampError::InvalidValue(name, raw.to_string()));
    }
    if value < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(value)
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use beatreel_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("2.5").unwrap(), 2.5);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let total = match parts.as_slice() {
        [secs] => parse_component("seconds", secs)?,
        [mins, secs] => parse_component("minutes", mins)? * 60.0 + parse_component("seconds", secs)?,
        [hours, mins, secs] => {
            parse_component("hours", hours)? * 3600.0
                + parse_component("minutes", mins)? * 60.0
                + parse_component("seconds", secs)?
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    if total > MAX_TRACK_DURATION_SECS {
        return Err(TimestampError::ExceedsMaxDuration(MAX_TRACK_DURATION_SECS));
    }
    Ok(total)
}

/// Parse a list of beat marks separated by commas and/or whitespace.
///
/// The result keeps input order; normalization happens downstream.
pub fn parse_beat_marks(input: &str) -> Result<Vec<f64>, TimestampError> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(parse_timestamp)
        .collect()
}

/// Format seconds into HH:MM:SS or HH:MM:SS.mmm.
pub fn format_seconds(total_secs: f64) -> String {
    let total_secs = total_secs.max(0.0);
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_forms() {
        assert_eq!(parse_timestamp("90").unwrap(), 90.0);
        assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
        assert_eq!(parse_timestamp("01:30:45").unwrap(), 5445.0);
        assert!((parse_timestamp("0:02.250").unwrap() - 2.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_timestamp_errors() {
        assert!(matches!(parse_timestamp(""), Err(TimestampError::Empty)));
        assert!(matches!(parse_timestamp("  "), Err(TimestampError::Empty)));
        assert!(matches!(
            parse_timestamp("abc"),
            Err(TimestampError::InvalidValue("seconds", _))
        ));
        assert!(matches!(
            parse_timestamp("1:2:3:4"),
            Err(TimestampError::InvalidFormat(_))
        ));
        assert!(matches!(parse_timestamp("-3"), Err(TimestampError::Negative)));
        assert!(matches!(parse_timestamp("NaN"), Err(TimestampError::InvalidValue(..))));
        assert!(matches!(
            parse_timestamp("25:00:00"),
            Err(TimestampError::ExceedsMaxDuration(_))
        ));
    }

    #[test]
    fn test_parse_beat_marks() {
        let marks = parse_beat_marks("2, 0:05.5  8\n1:00").unwrap();
        assert_eq!(marks, vec![2.0, 5.5, 8.0, 60.0]);
        assert!(parse_beat_marks("").unwrap().is_empty());
        assert!(parse_beat_marks("2, x").is_err());
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0), "00:00:00");
        assert_eq!(format_seconds(90.0), "00:01:30");
        assert_eq!(format_seconds(3661.0), "01:01:01");
        assert_eq!(format_seconds(2.5), "00:00:02.500");
    }
}
