//! Severity classification.

use serde::{Deserialize, Serialize};

use crate::config::{AuditRule, Thresholds};
use crate::host::Cell;

/// Severity bucket of a finalized row. Orders most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    Warning,
    Ok,
}

impl Severity {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Warning => "WARNING",
            Self::Ok => "OK",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read a numeric cell. Engines often return numbers as strings.
#[must_use]
pub fn number(cell: Option<&Cell>) -> Option<f64> {
    match cell? {
        Cell::Number(n) => n.as_f64(),
        Cell::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Round to `places` decimals for display.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Percentage deviation of `yesterday` from `average`, `None` without a baseline.
#[must_use]
pub fn deviation_pct(yesterday: f64, average: f64) -> Option<f64> {
    (average > 0.0).then(|| (yesterday - average) / average * 100.0)
}

/// Classify a daily event count against its trailing average.
#[must_use]
pub fn classify_heartbeat(yesterday: f64, average: f64, thresholds: &Thresholds) -> Severity {
    let Some(deviation) = deviation_pct(yesterday, average) else {
        return Severity::Ok;
    };
    if yesterday <= 0.0 || deviation <= -thresholds.heartbeat_critical_drop_pct {
        Severity::Critical
    } else if deviation <= -thresholds.heartbeat_warning_drop_pct
        || deviation >= thresholds.heartbeat_spike_pct
    {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

/// Fill rate in percent, `0` when there were no events.
#[must_use]
pub fn fill_rate_pct(total: f64, filled: f64) -> f64 {
    if total > 0.0 { filled / total * 100.0 } else { 0.0 }
}

/// Minimum fill rate for an event/parameter pair.
#[must_use]
pub fn min_fill_rate_for(
    event_name: &str,
    parameter_name: &str,
    rules: &[AuditRule],
    thresholds: &Thresholds,
) -> f64 {
    rules
        .iter()
        .find(|r| r.covers(event_name, parameter_name))
        .map_or(thresholds.default_min_fill_rate, |r| r.min_fill_rate)
}

/// Classify a fill rate against its minimum.
#[must_use]
pub fn classify_fill_rate(rate: f64, min_rate: f64, thresholds: &Thresholds) -> Severity {
    let deficit = min_rate - rate;
    if deficit >= thresholds.fill_rate_critical_deficit {
        Severity::Critical
    } else if deficit > 0.0 {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_accepts_strings() {
        assert_eq!(number(Some(&json!("12"))), Some(12.0));
        assert_eq!(number(Some(&json!(3.5))), Some(3.5));
        assert_eq!(number(Some(&json!("n/a"))), None);
        assert_eq!(number(None), None);
    }

    #[test]
    fn test_heartbeat_thresholds() {
        let t = Thresholds::default();
        assert_eq!(classify_heartbeat(100.0, 100.0, &t), Severity::Ok);
        assert_eq!(classify_heartbeat(85.0, 100.0, &t), Severity::Ok);
        assert_eq!(classify_heartbeat(80.0, 100.0, &t), Severity::Warning);
        assert_eq!(classify_heartbeat(50.0, 100.0, &t), Severity::Critical);
        assert_eq!(classify_heartbeat(0.0, 100.0, &t), Severity::Critical);
        assert_eq!(classify_heartbeat(300.0, 100.0, &t), Severity::Warning);
        // No baseline, nothing to compare against
        assert_eq!(classify_heartbeat(40.0, 0.0, &t), Severity::Ok);
    }

    #[test]
    fn test_fill_rate_uses_matching_rule() {
        let t = Thresholds::default();
        let rules = vec![AuditRule::new("purchase", "transaction_id", 99.0)];

        assert!((min_fill_rate_for("PURCHASE", "transaction_id", &rules, &t) - 99.0).abs() < f64::EPSILON);
        assert!((min_fill_rate_for("purchase", "coupon", &rules, &t) - 90.0).abs() < f64::EPSILON);

        assert_eq!(classify_fill_rate(99.5, 99.0, &t), Severity::Ok);
        assert_eq!(classify_fill_rate(95.0, 99.0, &t), Severity::Warning);
        assert_eq!(classify_fill_rate(79.0, 99.0, &t), Severity::Critical);
        assert!((fill_rate_pct(0.0, 0.0)).abs() < f64::EPSILON);
    }
}
