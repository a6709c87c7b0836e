//! Time formatting and parsing helpers for playtime display and seeking.

use crate::errors::ControlError;

/// Formats seconds as `[h:]m:ss`; negative values (remaining time) get a leading `-`.
///
/// # Examples
/// ```
/// # use lmscontrol::time_utils::format_time;
/// assert_eq!(format_time(0), "0:00");
/// assert_eq!(format_time(65), "1:05");
/// assert_eq!(format_time(3661), "1:01:01");
/// assert_eq!(format_time(-42), "-0:42");
/// ```
pub fn format_time(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let total = seconds.unsigned_abs();

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{sign}{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{sign}{minutes}:{secs:02}")
    }
}

/// Parses a time string in HH:MM:SS, MM:SS, or SS format to seconds.
///
/// # Examples
/// ```
/// # use lmscontrol::time_utils::parse_time_flexible;
/// assert_eq!(parse_time_flexible("01:02:03").unwrap(), 3723);
/// assert_eq!(parse_time_flexible("2:03").unwrap(), 123);
/// assert_eq!(parse_time_flexible("42").unwrap(), 42);
/// ```
pub fn parse_time_flexible(input: &str) -> Result<u32, ControlError> {
    let input = input.trim();
    let parts: Vec<&str> = input.split(':').collect();

    if input.is_empty() || parts.len() > 3 {
        return Err(ControlError::InvalidTimeFormat(format!(
            "Invalid time format '{}': expected HH:MM:SS, MM:SS, or SS",
            input
        )));
    }

    let mut total = 0u32;
    for part in parts {
        let value = part.parse::<u32>().map_err(|_| {
            ControlError::InvalidTimeFormat(format!(
                "Invalid numeric value '{}' in time string '{}'",
                part, input
            ))
        })?;
        total = total
            .checked_mul(60)
            .and_then(|t| t.checked_add(value))
            .ok_or_else(|| {
                ControlError::InvalidTimeFormat(format!("Time '{}' is out of range", input))
            })?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(9), "0:09");
        assert_eq!(format_time(60), "1:00");
        assert_eq!(format_time(599), "9:59");
        assert_eq!(format_time(3600), "1:00:00");
        assert_eq!(format_time(3725), "1:02:05");
        assert_eq!(format_time(-135), "-2:15");
    }

    #[test]
    fn test_parse_time_flexible() {
        assert_eq!(parse_time_flexible("01:02:03").unwrap(), 3723);
        assert_eq!(parse_time_flexible("00:00").unwrap(), 0);
        assert_eq!(parse_time_flexible(" 90 ").unwrap(), 90);

        assert!(parse_time_flexible("").is_err());
        assert!(parse_time_flexible("1:2:3:4").is_err());
        assert!(parse_time_flexible("abc").is_err());
        assert!(parse_time_flexible("1:abc").is_err());
        assert!(matches!(
            parse_time_flexible("99999999:00"),
            Err(ControlError::InvalidTimeFormat(_))
        ));
        assert!(parse_time_flexible("1193046:28:15").is_ok());
    }
}
