//! Time helpers for day buckets and human countdowns.

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Today's UTC day bucket.
#[must_use]
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Next UTC-midnight rollover after `now`.
#[must_use]
pub fn next_rollover(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + Duration::days(1);
    tomorrow
        .and_hms_opt(0, 0, 0)
        .map_or(now, |naive| naive.and_utc())
}

/// Format a countdown to a future time.
#[must_use]
pub fn format_countdown(target: DateTime<Utc>) -> String {
    let now = Utc::now();
    let duration = target.signed_duration_since(now);

    if duration.num_seconds() <= 0 {
        return "now".to_string();
    }

    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;

    if hours > 0 {
        format!("in {hours}h {minutes}m")
    } else if minutes > 0 {
        format!("in {minutes}m")
    } else {
        format!("in {}s", duration.num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollover_is_next_midnight() {
        let now = Utc::now();
        let rollover = next_rollover(now);
        assert!(rollover > now);
        assert_eq!(rollover.time(), chrono::NaiveTime::MIN);
        assert!((rollover - now) <= Duration::days(1));
    }

    #[test]
    fn countdown_formats() {
        let target = Utc::now() + Duration::minutes(90);
        let formatted = format_countdown(target);
        assert!(formatted.starts_with("in 1h"), "{formatted}");

        assert_eq!(format_countdown(Utc::now() - Duration::seconds(5)), "now");
    }
}
