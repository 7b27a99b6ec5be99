//! Frustration events: typed signals feeding the escalation engine.
//!
//! Each recorded observation becomes a [`FrustrationEvent`] with a severity
//! normalised to `[0, 1]`. The severity functions below are the only place
//! raw observations (audit severities, attempt numbers, durations) are turned
//! into numbers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four event partitions the engine scores independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrustrationKind {
    /// Usability defect reported by the audit.
    Friction,
    /// A failed attempt that will be retried.
    Retry,
    /// An action that took longer than expected.
    Timeout,
    /// An execution error (the script threw or produced nothing usable).
    Error,
}

impl FrustrationKind {
    pub const ALL: [FrustrationKind; 4] = [Self::Friction, Self::Retry, Self::Timeout, Self::Error];
}

impl std::fmt::Display for FrustrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Friction => write!(f, "friction"),
            Self::Retry => write!(f, "retry"),
            Self::Timeout => write!(f, "timeout"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single event contributing to the frustration score. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrustrationEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: FrustrationKind,
    /// Normalised severity in `[0, 1]`.
    pub severity: f64,
    pub description: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl FrustrationEvent {
    pub fn new(kind: FrustrationKind, severity: f64, description: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            severity: severity.clamp(0.0, 1.0),
            description: description.into(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Severity of an audited friction level. Unknown labels score 0.5.
pub fn friction_severity(label: &str) -> f64 {
    match label.trim().to_ascii_lowercase().as_str() {
        "low" => 0.2,
        "medium" => 0.4,
        "high" => 0.7,
        "critical" => 1.0,
        _ => 0.5,
    }
}

/// Retries grow more severe with each attempt: `min(0.3 + 0.2·n, 1)`.
pub fn retry_severity(attempt_number: u32) -> f64 {
    (0.3 + 0.2 * f64::from(attempt_number)).min(1.0)
}

/// Ratio of actual to expected duration; a non-positive expectation counts as 2×.
pub fn timeout_ratio(actual: f64, expected: f64) -> f64 {
    if expected > 0.0 {
        actual / expected
    } else {
        2.0
    }
}

/// `min(0.5 + 0.3·(ratio − 1), 1)`, floored at 0.
pub fn timeout_severity(actual: f64, expected: f64) -> f64 {
    (0.5 + (timeout_ratio(actual, expected) - 1.0) * 0.3).clamp(0.0, 1.0)
}

pub fn error_severity(recoverable: bool) -> f64 {
    if recoverable {
        0.6
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friction_severity_map() {
        assert_eq!(friction_severity("low"), 0.2);
        assert_eq!(friction_severity("Medium"), 0.4);
        assert_eq!(friction_severity("HIGH"), 0.7);
        assert_eq!(friction_severity("critical"), 1.0);
        assert_eq!(friction_severity("catastrophic"), 0.5);
    }

    #[test]
    fn test_retry_severity_grows_and_saturates() {
        assert!((retry_severity(1) - 0.5).abs() < 1e-9);
        assert!((retry_severity(2) - 0.7).abs() < 1e-9);
        assert!((retry_severity(3) - 0.9).abs() < 1e-9);
        assert_eq!(retry_severity(4), 1.0);
        assert_eq!(retry_severity(40), 1.0);
    }

    #[test]
    fn test_timeout_severity() {
        assert!((timeout_severity(10.0, 10.0) - 0.5).abs() < 1e-9);
        assert!((timeout_severity(20.0, 10.0) - 0.8).abs() < 1e-9);
        assert_eq!(timeout_severity(100.0, 10.0), 1.0);
        // zero expectation is treated as twice as slow
        assert!((timeout_severity(5.0, 0.0) - 0.8).abs() < 1e-9);
        // finishing early never goes negative
        assert_eq!(timeout_severity(0.0, 100.0), 0.2);
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(error_severity(true), 0.6);
        assert_eq!(error_severity(false), 1.0);
    }

    #[test]
    fn test_event_severity_clamped() {
        let e = FrustrationEvent::new(FrustrationKind::Error, 1.7, "boom");
        assert_eq!(e.severity, 1.0);
        let e = FrustrationEvent::new(FrustrationKind::Error, -0.3, "boom").with_context("k", 1);
        assert_eq!(e.severity, 0.0);
        assert_eq!(e.context["k"], serde_json::json!(1));
    }
}
