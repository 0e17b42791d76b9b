//! Human-readable remaining-time strings for lockout messages

/// Format a millisecond span largest-unit-first
///
/// Under a minute renders seconds only; otherwise minutes plus any leftover
/// seconds. Units are pluralised and partial seconds are truncated.
pub fn format_duration(millis: u64) -> String {
    let seconds = millis / 1000;
    if seconds < 60 {
        return plural(seconds, "second");
    }

    let minutes = seconds / 60;
    let leftover = seconds % 60;
    if leftover == 0 {
        plural(minutes, "minute")
    } else {
        format!("{} and {}", plural(minutes, "minute"), plural(leftover, "second"))
    }
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(format_duration(0), "0 seconds");
    }

    #[test]
    fn test_seconds_only() {
        assert_eq!(format_duration(999), "0 seconds");
        assert_eq!(format_duration(1_000), "1 second");
        assert_eq!(format_duration(59_999), "59 seconds");
    }

    #[test]
    fn test_minutes_and_seconds() {
        assert_eq!(format_duration(61_000), "1 minute and 1 second");
        assert_eq!(format_duration(125_000), "2 minutes and 5 seconds");
    }

    #[test]
    fn test_whole_minutes() {
        assert_eq!(format_duration(60_000), "1 minute");
        assert_eq!(format_duration(120_000), "2 minutes");
        assert_eq!(format_duration(300_000), "5 minutes");
    }
}
