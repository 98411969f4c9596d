//! Output formatting helpers.

/// Format a USD amount for human output.
///
/// Sub-cent amounts keep four decimals so small estimates don't render as
/// $0.00.
#[must_use]
pub fn format_usd(amount: f64) -> String {
    if amount != 0.0 && amount.abs() < 0.01 {
        format!("${amount:.4}")
    } else {
        format!("${amount:.2}")
    }
}

/// Format a millisecond duration for human output.
#[must_use]
pub fn format_duration_ms(ms: u64) -> String {
    if ms >= 60_000 {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_keeps_small_amounts_visible() {
        assert_eq!(format_usd(0.0042), "$0.0042");
        assert_eq!(format_usd(1.5), "$1.50");
        assert_eq!(format_usd(0.0), "$0.00");
    }

    #[test]
    fn durations_scale_units() {
        assert_eq!(format_duration_ms(250), "250ms");
        assert_eq!(format_duration_ms(2500), "2.5s");
        assert_eq!(format_duration_ms(125_000), "2m 5s");
    }
}
