//! Integration tests for the Escalation Engine
//!
//! Exercises scoring bounds, monotonicity under critical friction, the latch
//! and both trigger paths with long deterministic event sequences.

use coordination::escalation::{
    EscalationConfig, EscalationEngine, EscalationReason, FrustrationEvent, FrustrationKind,
};

/// Small deterministic generator so sequences are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn unit(&mut self) -> f64 {
        (self.next() % 10_001) as f64 / 10_000.0
    }
}

fn random_event(rng: &mut Lcg) -> FrustrationEvent {
    let kind = FrustrationKind::ALL[(rng.next() % 4) as usize];
    FrustrationEvent::new(kind, rng.unit() * 1.5, "generated")
}

#[test]
fn test_score_stays_in_unit_interval() {
    for seed in 0..50 {
        let mut rng = Lcg(seed);
        let mut engine = EscalationEngine::with_config(EscalationConfig {
            max_retries: u32::MAX,
            ..EscalationConfig::default()
        });
        for _ in 0..200 {
            let score = engine.record(random_event(&mut rng));
            assert!((0.0..=1.0).contains(&score), "seed {seed}: score {score}");
        }
    }
}

#[test]
fn test_critical_friction_strictly_increases_unsaturated_score() {
    for seed in 0..50 {
        let mut rng = Lcg(seed);
        let mut engine = EscalationEngine::with_config(EscalationConfig {
            max_retries: u32::MAX,
            ..EscalationConfig::default()
        });
        for _ in 0..(rng.next() % 20) {
            // Friction below critical so a new critical event can raise the partition.
            let severity = ["low", "medium", "high"][(rng.next() % 3) as usize];
            engine.record_friction("el", "visibility", severity, "impact");
            engine.record(random_event(&mut rng));
        }
        let before = engine.score();
        let after = engine.record_friction("button", "visibility", "critical", "cannot see");
        if before < 1.0 {
            assert!(after > before, "seed {seed}: {before} -> {after}");
        } else {
            assert_eq!(after, 1.0);
        }
    }
}

#[test]
fn test_critical_friction_leaves_saturated_friction_partition_unchanged() {
    // The friction partition is a weighted average, so once every recorded
    // friction is critical another critical event cannot raise it.
    let mut engine = EscalationEngine::new();
    let first = engine.record_friction("checkout", "visibility", "critical", "hidden");
    let second = engine.record_friction("checkout", "visibility", "critical", "still hidden");
    assert!((first - 0.4).abs() < 1e-9);
    assert_eq!(second, first);
    assert_eq!(engine.component_score(FrustrationKind::Friction), 1.0);
    assert!(!engine.should_escalate());

    // Other partitions still move the combined score.
    let after_error = engine.record_error("checkout", "execution_fault", "crashed", false);
    assert!((after_error - 0.7).abs() < 1e-9);
    let again = engine.record_friction("checkout", "visibility", "critical", "hidden");
    assert_eq!(again, after_error);
}

#[test]
fn test_three_retries_force_escalation_below_threshold() {
    let mut engine = EscalationEngine::new();
    for attempt in 1..=3 {
        engine.record_retry("click submit", "not found", attempt);
    }
    assert_eq!(engine.retry_count(), 3);
    assert!(engine.score() < 0.75);
    assert!(engine.should_escalate());
    assert_eq!(
        engine.decide().reason,
        Some(EscalationReason::RetryCap { retries: 3, cap: 3 })
    );
}

#[test]
fn test_single_critical_friction_does_not_escalate() {
    let mut engine = EscalationEngine::new();
    let score = engine.record_friction("checkout", "visibility", "critical", "hidden");
    assert!((score - 0.4).abs() < 1e-9);
    assert!(!engine.should_escalate());
}

#[test]
fn test_latch_holds_until_cleared() {
    let mut engine = EscalationEngine::new();
    engine.record_friction("a", "visibility", "critical", "x");
    engine.record_timeout("load", 30.0, 10.0);
    engine.record_error("submit", "crash", "driver died", false);
    assert!(engine.should_escalate());

    // Later low-severity events cannot unlatch.
    for _ in 0..10 {
        engine.record_friction("b", "visibility", "low", "minor");
        assert!(engine.should_escalate());
    }

    engine.clear_escalation();
    assert!(!engine.should_escalate());
    assert_eq!(engine.retry_count(), 0);
    assert_eq!(engine.events().len(), 13);
}

#[test]
fn test_engine_survives_checkpoint_serialisation() {
    let mut engine = EscalationEngine::new();
    engine.record_retry("click", "missing", 1);
    engine.record_retry("click", "missing", 2);
    let json = serde_json::to_string(&engine).unwrap();
    let mut restored: EscalationEngine = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.retry_count(), 2);
    assert!(!restored.should_escalate());

    restored.record_retry("click", "missing", 3);
    assert!(restored.should_escalate());
}
