use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if !v.is_finite() {
        return "0".to_string();
    }
    if v < 10.0 {
        format!("{v:.1}")
    } else {
        format!("{v:.0}")
    }
}

/// Renders milliseconds with a unit that keeps three significant-ish digits.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() || ms <= 0.0 {
        return "0ms".to_string();
    }
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else if ms >= 1.0 {
        format!("{ms:.1}ms")
    } else {
        format!("{:.0}us", ms * 1000.0)
    }
}

pub(crate) fn format_percent(ratio: f64) -> String {
    if ratio.is_finite() {
        format!("{:.2}%", ratio * 100.0)
    } else {
        "0.00%".to_string()
    }
}

/// Whole seconds for long spans, milliseconds below a second.
pub(crate) fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d < Duration::from_secs(1) {
        return format!("{}ms", d.as_millis());
    }
    let secs = d.as_secs_f64().round() as u64;
    match (secs / 60, secs % 60) {
        (0, s) => format!("{s}s"),
        (m, 0) => format!("{m}m"),
        (m, s) => format!("{m}m{s}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_compactly() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(20)), "20s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
    }

    #[test]
    fn latencies_pick_a_unit() {
        assert_eq!(format_ms(0.0), "0ms");
        assert_eq!(format_ms(0.25), "250us");
        assert_eq!(format_ms(52.04), "52.0ms");
        assert_eq!(format_ms(9000.0), "9.00s");
    }

    #[test]
    fn rates_and_percentages() {
        assert_eq!(format_rate(2.5), "2.5");
        assert_eq!(format_rate(123.4), "123");
        assert_eq!(format_rate(f64::NAN), "0");
        assert_eq!(format_percent(0.0125), "1.25%");
    }
}
