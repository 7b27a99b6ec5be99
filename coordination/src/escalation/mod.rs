//! Escalation Engine: frustration scoring that gates human-in-the-loop pauses
//!
//! ```text
//! audit friction ─┐
//! failed attempt ─┼─▶ FrustrationEvent ─▶ EscalationEngine ─▶ latched?
//! timeout/error  ─┘      (severity 0..1)     (decayed score,     │
//!                                             retry cap)         ├─ no  → keep automating
//!                                                                └─ yes → pause for a human
//! ```
//!
//! The latch holds until a human-feedback cycle clears it.

pub mod engine;
pub mod friction;

pub use engine::{
    EscalationConfig, EscalationConfigError, EscalationDecision, EscalationEngine,
    EscalationReason, EventDigest, FrustrationSummary, HitlContext,
};
pub use friction::{FrustrationEvent, FrustrationKind};
