//! Escalation Engine: recency-weighted frustration scoring with a latch.
//!
//! Consumes [`FrustrationEvent`]s and decides when automated retries should
//! yield to a human. All decisions are deterministic: no model calls, no I/O.
//!
//! Each event kind is scored as a recency-weighted average (weight `0.8^i`
//! for the i-th most recent event). The combined score is
//! `w_friction·friction + w_timeout·(retry + timeout) + w_error·error`,
//! clamped to `[0, 1]`. The engine latches once the score reaches the
//! threshold, the retry count reaches the cap, or the caller reports that
//! many consecutive failures, and stays latched until a
//! human-feedback cycle calls [`EscalationEngine::clear_escalation`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::escalation::friction::{
    error_severity, friction_severity, retry_severity, timeout_ratio, timeout_severity,
    FrustrationEvent, FrustrationKind,
};

/// Per-event decay applied by recency rank.
pub const RECENCY_DECAY: f64 = 0.8;

/// Number of recent events surfaced in a HITL context.
const HITL_RECENT_EVENTS: usize = 5;

/// Score at which the recommendation calls the flow critical.
const CRITICAL_SCORE: f64 = 0.9;

/// Configuration for the Escalation Engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Combined score (τ) at which escalation fires.
    pub threshold: f64,
    /// Retry events (R) that force escalation regardless of score.
    pub max_retries: u32,
    /// Weight of the friction partition.
    pub friction_weight: f64,
    /// Weight applied to the sum of retry and timeout partitions.
    pub timeout_weight: f64,
    /// Weight of the error partition.
    pub error_weight: f64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            max_retries: 3,
            friction_weight: 0.4,
            timeout_weight: 0.3,
            error_weight: 0.3,
        }
    }
}

/// Rejected escalation configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EscalationConfigError {
    #[error("threshold {0} outside (0, 1]")]
    ThresholdOutOfRange(f64),
    #[error("retry cap must be at least 1")]
    ZeroRetryCap,
    #[error("weights must be non-negative")]
    NegativeWeight,
    #[error("weights sum to {0}, expected 1.0")]
    WeightsDoNotSumToOne(f64),
}

impl EscalationConfig {
    pub fn validate(&self) -> Result<(), EscalationConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(EscalationConfigError::ThresholdOutOfRange(self.threshold));
        }
        if self.max_retries == 0 {
            return Err(EscalationConfigError::ZeroRetryCap);
        }
        if self.friction_weight < 0.0 || self.timeout_weight < 0.0 || self.error_weight < 0.0 {
            return Err(EscalationConfigError::NegativeWeight);
        }
        let sum = self.friction_weight + self.timeout_weight + self.error_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(EscalationConfigError::WeightsDoNotSumToOne(sum));
        }
        Ok(())
    }
}

/// Why the engine latched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Combined score reached the threshold.
    ScoreThreshold { score: f64, threshold: f64 },
    /// Retry count reached the hard cap.
    RetryCap { retries: u32, cap: u32 },
    /// Consecutive failed attempts of any kind reached the hard cap.
    FailureCap { failures: u32, cap: u32 },
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScoreThreshold { score, threshold } => {
                write!(f, "frustration {:.2} reached threshold {:.2}", score, threshold)
            }
            Self::RetryCap { retries, cap } => {
                write!(f, "{} retries reached cap of {}", retries, cap)
            }
            Self::FailureCap { failures, cap } => {
                write!(f, "{} consecutive failures reached cap of {}", failures, cap)
            }
        }
    }
}

/// Decision produced by the Escalation Engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationDecision {
    /// Whether control should pass to a human.
    pub escalate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<EscalationReason>,
    pub score: f64,
    pub retry_count: u32,
}

/// Compact view of an event for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDigest {
    pub kind: FrustrationKind,
    pub severity: f64,
    pub description: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Everything a human operator needs to decide how to unblock a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlContext {
    pub frustration_score: f64,
    pub threshold: f64,
    pub retry_count: u32,
    pub total_events: usize,
    pub recent_events: Vec<EventDigest>,
    pub event_breakdown: HashMap<FrustrationKind, usize>,
    pub recommendation: String,
}

/// Summary statistics for reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrustrationSummary {
    pub current_score: f64,
    pub escalation_latched: bool,
    pub total_events: usize,
    pub retry_count: u32,
    pub event_breakdown: HashMap<FrustrationKind, usize>,
}

/// Owns the append-only frustration event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEngine {
    config: EscalationConfig,
    events: Vec<FrustrationEvent>,
    retry_count: u32,
    score: f64,
    latched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latch_reason: Option<EscalationReason>,
}

impl Default for EscalationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationEngine {
    /// Create a new engine with default config
    pub fn new() -> Self {
        Self::with_config(EscalationConfig::default())
    }

    /// Create with custom config
    pub fn with_config(config: EscalationConfig) -> Self {
        Self {
            config,
            events: Vec::new(),
            retry_count: 0,
            score: 0.0,
            latched: false,
            latch_reason: None,
        }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    pub fn events(&self) -> &[FrustrationEvent] {
        &self.events
    }

    /// Current combined score in `[0, 1]`.
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn latch_reason(&self) -> Option<&EscalationReason> {
        self.latch_reason.as_ref()
    }

    /// Append an event and recompute. Returns the updated combined score.
    pub fn record(&mut self, event: FrustrationEvent) -> f64 {
        if event.kind == FrustrationKind::Retry {
            self.retry_count += 1;
        }
        debug!(kind = %event.kind, severity = event.severity, "Frustration event recorded");
        self.events.push(event);
        self.recompute();
        self.score
    }

    /// Record a friction point from the UX audit.
    pub fn record_friction(
        &mut self,
        element: &str,
        issue_type: &str,
        severity: &str,
        persona_impact: &str,
    ) -> f64 {
        let event = FrustrationEvent::new(
            FrustrationKind::Friction,
            friction_severity(severity),
            format!("{} on {}", issue_type, element),
        )
        .with_context("element", element)
        .with_context("issue_type", issue_type)
        .with_context("severity", severity)
        .with_context("persona_impact", persona_impact);
        self.record(event)
    }

    /// Record a failed attempt that will be retried.
    pub fn record_retry(&mut self, action: &str, reason: &str, attempt_number: u32) -> f64 {
        let event = FrustrationEvent::new(
            FrustrationKind::Retry,
            retry_severity(attempt_number),
            format!("Retry #{}: {}", attempt_number, action),
        )
        .with_context("action", action)
        .with_context("reason", reason)
        .with_context("attempt_number", attempt_number);
        self.record(event)
    }

    /// Record an action that ran past its expected duration.
    pub fn record_timeout(&mut self, action: &str, actual: f64, expected: f64) -> f64 {
        let event = FrustrationEvent::new(
            FrustrationKind::Timeout,
            timeout_severity(actual, expected),
            format!("Timeout on {}", action),
        )
        .with_context("action", action)
        .with_context("actual", actual)
        .with_context("expected", expected)
        .with_context("ratio", timeout_ratio(actual, expected));
        self.record(event)
    }

    /// Record an execution error.
    pub fn record_error(
        &mut self,
        action: &str,
        error_type: &str,
        message: &str,
        recoverable: bool,
    ) -> f64 {
        let event = FrustrationEvent::new(
            FrustrationKind::Error,
            error_severity(recoverable),
            format!("Error on {}: {}", action, error_type),
        )
        .with_context("action", action)
        .with_context("error_type", error_type)
        .with_context("error_message", message)
        .with_context("is_recoverable", recoverable);
        self.record(event)
    }

    /// Recency-weighted average severity of one partition; 0 when empty.
    pub fn component_score(&self, kind: FrustrationKind) -> f64 {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        let mut weight = 1.0;
        for event in self.events.iter().rev().filter(|e| e.kind == kind) {
            weighted_sum += event.severity * weight;
            total_weight += weight;
            weight *= RECENCY_DECAY;
        }
        if total_weight > 0.0 {
            weighted_sum / total_weight
        } else {
            0.0
        }
    }

    fn recompute(&mut self) {
        let c = &self.config;
        let combined = c.friction_weight * self.component_score(FrustrationKind::Friction)
            + c.timeout_weight
                * (self.component_score(FrustrationKind::Retry)
                    + self.component_score(FrustrationKind::Timeout))
            + c.error_weight * self.component_score(FrustrationKind::Error);
        self.score = combined.clamp(0.0, 1.0);

        if self.latched {
            return;
        }
        let reason = if self.score >= self.config.threshold {
            Some(EscalationReason::ScoreThreshold {
                score: self.score,
                threshold: self.config.threshold,
            })
        } else if self.retry_count >= self.config.max_retries {
            Some(EscalationReason::RetryCap {
                retries: self.retry_count,
                cap: self.config.max_retries,
            })
        } else {
            None
        };
        if let Some(reason) = reason {
            warn!(score = self.score, retries = self.retry_count, %reason, "Escalation latched");
            self.latched = true;
            self.latch_reason = Some(reason);
        }
    }

    /// Whether control should pass to a human. True once latched.
    pub fn should_escalate(&self) -> bool {
        self.latched
    }

    /// Produce a decision snapshot without mutating the log.
    pub fn decide(&self) -> EscalationDecision {
        EscalationDecision {
            escalate: self.latched,
            reason: self.latch_reason.clone(),
            score: self.score,
            retry_count: self.retry_count,
        }
    }

    /// Latch when `failures` consecutive failed attempts reach the retry cap.
    ///
    /// Covers failures that never record a retry event (driver faults and
    /// timeouts). Returns whether the engine is latched afterwards.
    pub fn latch_failure_cap(&mut self, failures: u32) -> bool {
        if !self.latched && failures >= self.config.max_retries {
            let reason = EscalationReason::FailureCap {
                failures,
                cap: self.config.max_retries,
            };
            warn!(score = self.score, failures, %reason, "Escalation latched");
            self.latched = true;
            self.latch_reason = Some(reason);
        }
        self.latched
    }

    /// Unlatch after a completed human-feedback cycle.
    ///
    /// The retry counter restarts; the event log is kept.
    pub fn clear_escalation(&mut self) {
        if self.latched {
            info!(score = self.score, "Escalation cleared after human feedback");
        }
        self.latched = false;
        self.latch_reason = None;
        self.retry_count = 0;
    }

    fn breakdown(&self) -> HashMap<FrustrationKind, usize> {
        FrustrationKind::ALL
            .iter()
            .map(|k| (*k, self.events.iter().filter(|e| e.kind == *k).count()))
            .collect()
    }

    fn recommendation(&self) -> &'static str {
        let capped = matches!(self.latch_reason, Some(EscalationReason::FailureCap { .. }));
        if capped || self.retry_count >= self.config.max_retries {
            "Multiple retries failed. Manual intervention needed to identify root cause."
        } else if self.score >= CRITICAL_SCORE {
            "Critical frustration level. Consider redesigning this flow or providing an alternative path."
        } else if self.score >= self.config.threshold {
            "Significant friction detected. Human review recommended to assess severity."
        } else {
            "Frustration within acceptable range. Continue automated testing."
        }
    }

    /// Context handed to the human operator when a run pauses.
    pub fn hitl_context(&self) -> HitlContext {
        let start = self.events.len().saturating_sub(HITL_RECENT_EVENTS);
        HitlContext {
            frustration_score: self.score,
            threshold: self.config.threshold,
            retry_count: self.retry_count,
            total_events: self.events.len(),
            recent_events: self.events[start..]
                .iter()
                .map(|e| EventDigest {
                    kind: e.kind,
                    severity: e.severity,
                    description: e.description.clone(),
                    timestamp: e.timestamp,
                })
                .collect(),
            event_breakdown: self.breakdown(),
            recommendation: self.recommendation().to_string(),
        }
    }

    pub fn summary(&self) -> FrustrationSummary {
        FrustrationSummary {
            current_score: self.score,
            escalation_latched: self.latched,
            total_events: self.events.len(),
            retry_count: self.retry_count,
            event_breakdown: self.breakdown(),
        }
    }

    /// Forget everything. Used when a new mission starts.
    pub fn reset(&mut self) {
        self.events.clear();
        self.retry_count = 0;
        self.score = 0.0;
        self.latched = false;
        self.latch_reason = None;
        info!("Escalation engine reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_empty_engine_scores_zero() {
        let engine = EscalationEngine::new();
        assert_eq!(engine.score(), 0.0);
        assert!(!engine.should_escalate());
        assert_eq!(engine.component_score(FrustrationKind::Friction), 0.0);
    }

    #[test]
    fn test_single_critical_friction_does_not_escalate() {
        let mut engine = EscalationEngine::new();
        let score = engine.record_friction("Submit", "interaction", "critical", "too small");
        assert!((score - 0.4).abs() < EPS);
        assert!(!engine.should_escalate());
    }

    #[test]
    fn test_three_retries_force_escalation() {
        let mut engine = EscalationEngine::new();
        for n in 1..=3 {
            engine.record_retry("Click submit", "not found", n);
        }
        assert_eq!(engine.retry_count(), 3);
        assert!(engine.score() < 0.75);
        assert!(engine.should_escalate());
        assert!(matches!(
            engine.latch_reason(),
            Some(EscalationReason::RetryCap { retries: 3, cap: 3 })
        ));
    }

    #[test]
    fn test_recency_weighting() {
        let mut engine = EscalationEngine::new();
        engine.record_error("a", "E", "m", false); // 1.0
        engine.record_error("b", "E", "m", true); // 0.6, newest
        let expected = (0.6 * 1.0 + 1.0 * 0.8) / 1.8;
        assert!((engine.component_score(FrustrationKind::Error) - expected).abs() < EPS);
        assert!((engine.score() - 0.3 * expected).abs() < EPS);
    }

    #[test]
    fn test_score_threshold_latch() {
        let mut engine = EscalationEngine::new();
        engine.record_friction("nav", "visibility", "critical", "");
        engine.record_timeout("load", 100.0, 10.0);
        engine.record_error("submit", "Crash", "boom", false);
        // 0.4 + 0.3 + 0.3 = 1.0
        assert!((engine.score() - 1.0).abs() < EPS);
        assert!(engine.should_escalate());
        assert!(matches!(
            engine.latch_reason(),
            Some(EscalationReason::ScoreThreshold { .. })
        ));
    }

    #[test]
    fn test_score_clamped_to_one() {
        let mut engine = EscalationEngine::new();
        engine.record_friction("x", "y", "critical", "");
        engine.record_retry("x", "y", 9);
        engine.record_timeout("x", 99.0, 1.0);
        engine.record_error("x", "y", "z", false);
        assert_eq!(engine.score(), 1.0);
    }

    #[test]
    fn test_latch_survives_until_cleared() {
        let mut engine = EscalationEngine::new();
        for n in 1..=3 {
            engine.record_retry("x", "y", n);
        }
        assert!(engine.should_escalate());
        engine.record_friction("x", "y", "low", "");
        assert!(engine.should_escalate());

        engine.clear_escalation();
        assert!(!engine.should_escalate());
        assert_eq!(engine.retry_count(), 0);
        assert_eq!(engine.events().len(), 4);
    }

    #[test]
    fn test_failure_cap_latches_without_retry_events() {
        let mut engine = EscalationEngine::new();
        for _ in 0..3 {
            engine.record_error("Click submit", "execution_fault", "crashed", true);
        }
        assert!(!engine.should_escalate());
        assert_eq!(engine.retry_count(), 0);

        assert!(!engine.latch_failure_cap(2));
        assert!(engine.latch_failure_cap(3));
        assert_eq!(
            engine.latch_reason(),
            Some(&EscalationReason::FailureCap {
                failures: 3,
                cap: 3
            })
        );
        assert!(engine
            .hitl_context()
            .recommendation
            .starts_with("Multiple retries failed"));

        engine.clear_escalation();
        assert!(!engine.should_escalate());
        assert!(!engine.latch_failure_cap(0));
    }

    #[test]
    fn test_hitl_context_and_recommendation() {
        let mut engine = EscalationEngine::new();
        for n in 1..=6 {
            engine.record_retry("Click submit", "not clickable", n);
        }
        let ctx = engine.hitl_context();
        assert_eq!(ctx.recent_events.len(), 5);
        assert_eq!(ctx.total_events, 6);
        assert_eq!(ctx.event_breakdown[&FrustrationKind::Retry], 6);
        assert_eq!(ctx.event_breakdown[&FrustrationKind::Error], 0);
        assert!(ctx.recommendation.starts_with("Multiple retries failed"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut engine = EscalationEngine::new();
        engine.record_error("x", "y", "z", false);
        engine.reset();
        assert!(engine.events().is_empty());
        assert_eq!(engine.score(), 0.0);
        assert!(!engine.is_latched());
    }

    #[test]
    fn test_config_validation() {
        assert!(EscalationConfig::default().validate().is_ok());
        let bad = EscalationConfig {
            threshold: 0.0,
            ..Default::default()
        };
        assert_eq!(
            bad.validate(),
            Err(EscalationConfigError::ThresholdOutOfRange(0.0))
        );
        let bad = EscalationConfig {
            friction_weight: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(EscalationConfigError::WeightsDoNotSumToOne(_))
        ));
        let bad = EscalationConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(EscalationConfigError::ZeroRetryCap));
    }

    #[test]
    fn test_engine_round_trips_through_json() {
        let mut engine = EscalationEngine::new();
        engine.record_friction("x", "y", "high", "z");
        let json = serde_json::to_string(&engine).unwrap();
        let restored: EscalationEngine = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.events().len(), 1);
        assert!((restored.score() - engine.score()).abs() < EPS);
    }
}
