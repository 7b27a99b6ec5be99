//! The run context: the single mutable aggregate threaded through a run.
//!
//! Exactly one `RunContext` exists per active mission and it is the sole
//! unit of checkpointing. Recoverable failures never leave a transition as
//! errors; they are appended here as [`Incident`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MissionErrorKind;
use crate::escalation::{EscalationConfig, EscalationEngine};
use crate::memory::LessonMatch;
use crate::mission::parse::{ActionScript, AuditFindings, MissionPlan};
use crate::mission::report::MissionReport;
use crate::mission::state::{IllegalTransition, MissionState, StateTrack};
use crate::model::{ActionAttempt, FrictionPoint, Mission, PageSnapshot, PersonaProfile, Step, UiSchema};

/// A recovered failure recorded on the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub kind: MissionErrorKind,
    pub message: String,
    /// State whose work produced the failure.
    pub state: MissionState,
    pub timestamp: DateTime<Utc>,
}

/// A per-state narrative message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunNote {
    pub role: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: String,
    pub mission: Mission,
    /// Persona actually used; `None` until `LoadPersona` completes.
    #[serde(default)]
    pub persona: Option<PersonaProfile>,
    /// Identifier of `persona` (differs from the mission's on fallback).
    #[serde(default)]
    pub persona_id: String,
    #[serde(default)]
    pub plan: Option<MissionPlan>,
    #[serde(default)]
    pub page: PageSnapshot,
    #[serde(default)]
    pub schema: UiSchema,
    #[serde(default)]
    pub audit: Option<AuditFindings>,
    #[serde(default)]
    pub friction_points: Vec<FrictionPoint>,
    /// Lessons offered to script generation, most relevant first.
    #[serde(default)]
    pub lessons: Vec<LessonMatch>,
    /// Lessons retrieved from memory at the start of the run.
    #[serde(default)]
    pub lessons_retrieved: usize,
    #[serde(default)]
    pub cross_platform_hit: Option<LessonMatch>,
    #[serde(default)]
    pub script: Option<ActionScript>,
    /// Why the last script generation produced nothing usable.
    #[serde(default)]
    pub script_error: Option<String>,
    #[serde(default)]
    pub attempts: Vec<ActionAttempt>,
    pub engine: EscalationEngine,
    #[serde(default)]
    pub current_step_index: usize,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub escalation_flag: bool,
    #[serde(default)]
    pub pending_feedback: Option<String>,
    #[serde(default)]
    pub interventions: u32,
    /// Ids of lessons written by human-feedback cycles.
    #[serde(default)]
    pub learned_lesson_ids: Vec<String>,
    #[serde(default)]
    pub report: Option<MissionReport>,
    /// Markdown rendering of `report`.
    #[serde(default)]
    pub final_report: Option<String>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    pub track: StateTrack,
    #[serde(default)]
    pub notes: Vec<RunNote>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, mission: Mission, escalation: EscalationConfig) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            persona_id: mission.persona_id.clone(),
            mission,
            persona: None,
            plan: None,
            page: PageSnapshot::default(),
            schema: UiSchema::default(),
            audit: None,
            friction_points: Vec::new(),
            lessons: Vec::new(),
            lessons_retrieved: 0,
            cross_platform_hit: None,
            script: None,
            script_error: None,
            attempts: Vec::new(),
            engine: EscalationEngine::with_config(escalation),
            current_step_index: 0,
            failure_count: 0,
            escalation_flag: false,
            pending_feedback: None,
            interventions: 0,
            learned_lesson_ids: Vec::new(),
            report: None,
            final_report: None,
            sentiment_score: None,
            track: StateTrack::new(),
            notes: Vec::new(),
            incidents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> MissionState {
        self.track.current()
    }

    /// Apply a guarded transition.
    pub fn advance(&mut self, to: MissionState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        self.track.advance(to, reason)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn steps(&self) -> &[Step] {
        self.plan
            .as_ref()
            .map(|p| p.steps.as_slice())
            .unwrap_or_default()
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps().get(self.current_step_index)
    }

    pub fn all_steps_done(&self) -> bool {
        self.current_step_index >= self.steps().len()
    }

    pub fn note(&mut self, role: &str, content: impl Into<String>) {
        self.notes.push(RunNote {
            role: role.to_string(),
            content: content.into(),
            at: Utc::now(),
        });
    }

    pub fn incident(&mut self, kind: MissionErrorKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(
            run_id = %self.run_id,
            state = %self.state(),
            kind = %kind,
            %message,
            "Recovered from failure"
        );
        self.incidents.push(Incident {
            kind,
            message,
            state: self.state(),
            timestamp: Utc::now(),
        });
    }

    /// Most recent failed attempts, oldest first.
    pub fn recent_failures(&self, n: usize) -> Vec<&ActionAttempt> {
        let mut failed: Vec<&ActionAttempt> =
            self.attempts.iter().rev().filter(|a| !a.success).take(n).collect();
        failed.reverse();
        failed
    }

    pub fn last_failure(&self) -> Option<&ActionAttempt> {
        self.attempts.iter().rev().find(|a| !a.success)
    }

    pub fn successful_attempts(&self) -> usize {
        self.attempts.iter().filter(|a| a.success).count()
    }

    /// Percentage of successful attempts; 0 when nothing ran.
    pub fn success_rate(&self) -> f64 {
        if self.attempts.is_empty() {
            0.0
        } else {
            self.successful_attempts() as f64 / self.attempts.len() as f64 * 100.0
        }
    }
}
