use std::time::Duration;

/// Compact `1d 2h 3m` rendering; days only appear once a full day has passed.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

pub fn format_duration(duration: Duration) -> String {
    format_uptime(duration.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hours_and_minutes() {
        assert_eq!(format_uptime(3661), "1h 1m");
    }

    #[test]
    fn zero_is_zero_minutes() {
        assert_eq!(format_uptime(0), "0m");
        assert_eq!(format_uptime(59), "0m");
    }

    #[test]
    fn days_appear_only_after_a_full_day() {
        assert_eq!(format_uptime(90_000), "1d 1h 0m");
        assert_eq!(format_uptime(86_399), "23h 59m");
        assert_eq!(format_uptime(86_400), "1d 0h 0m");
    }

    #[test]
    fn duration_wrapper_truncates_subseconds() {
        assert_eq!(format_duration(Duration::from_millis(3_661_999)), "1h 1m");
    }
}
