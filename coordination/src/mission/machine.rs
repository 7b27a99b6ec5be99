//! Mission State Machine: the top-level control loop.
//!
//! Each call to [`MissionMachine::step`] performs the pending work of the
//! current state and takes exactly one guarded transition. [`run`] and
//! [`resume`] drive steps until the run rests at `AwaitHuman` or reaches
//! `Done`, then checkpoint the context.
//!
//! [`run`]: MissionMachine::run
//! [`resume`]: MissionMachine::resume

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{MissionError, MissionResult};
use crate::escalation::{EscalationConfig, HitlContext};
use crate::memory::{lesson_metadata, CorrelatorConfig, CrossPlatformCorrelator, LessonMatch, MemoryService};
use crate::mission::checkpoint::{validate_context, CheckpointStore, IntegrityStatus};
use crate::mission::collaborators::{
    ActionRequest, AgentDispatcher, AutomationDriver, DriverError, PageScout, PersonaSource,
    SchemaMapper, ScreenshotSink,
};
use crate::mission::context::RunContext;
use crate::mission::parse::{parse_audit, parse_mission_plan, parse_script, AuditFindings, MissionPlan};
use crate::mission::report::MissionReport;
use crate::mission::state::MissionState;
use crate::mission::tasks;
use crate::model::{ActionAttempt, LessonEntry, Mission, PageSnapshot, PersonaProfile, Step};

/// Friction category recorded on lessons written by a human-feedback cycle.
pub const HITL_FRICTION_TYPE: &str = "hitl_intervention";

/// The five external collaborators plus memory and screenshot storage.
#[derive(Clone)]
pub struct Collaborators {
    pub personas: Arc<dyn PersonaSource>,
    pub scout: Arc<dyn PageScout>,
    pub mapper: Arc<dyn SchemaMapper>,
    pub dispatcher: Arc<dyn AgentDispatcher>,
    pub driver: Arc<dyn AutomationDriver>,
    pub memory: Arc<dyn MemoryService>,
    pub screenshots: Option<Arc<dyn ScreenshotSink>>,
}

/// Tuning for the mission loop.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineConfig {
    pub escalation: EscalationConfig,
    pub correlator: CorrelatorConfig,
    /// Page-context prefix handed to planning and audit.
    pub page_context_chars: usize,
    /// Same-platform lessons fetched at `RetrieveMemory`.
    pub memory_top_k: usize,
    /// Lessons shown to script generation.
    pub script_lessons: usize,
    /// Failed attempts shown to script generation.
    pub script_failures: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            escalation: EscalationConfig::default(),
            correlator: CorrelatorConfig::default(),
            page_context_chars: 2000,
            memory_top_k: 5,
            script_lessons: 3,
            script_failures: 3,
        }
    }
}

/// Where a driven run came to rest.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Reached `Done`.
    Completed {
        run_id: String,
        report: Box<MissionReport>,
    },
    /// Paused at `AwaitHuman`; resume with feedback for `run_id`.
    Suspended {
        run_id: String,
        hitl: Box<HitlContext>,
    },
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        match self {
            Self::Completed { run_id, .. } | Self::Suspended { run_id, .. } => run_id,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended { .. })
    }

    pub fn report(&self) -> Option<&MissionReport> {
        match self {
            Self::Completed { report, .. } => Some(report),
            Self::Suspended { .. } => None,
        }
    }
}

/// Branch policy after `CheckEscalation`, in priority order.
///
/// `max_retries` consecutive failures of any kind (failed outcome, driver
/// fault, timeout) hand the run to a human just like a latched engine. A
/// zero failure count with steps remaining moves on to the next step.
pub fn branch_policy(ctx: &RunContext, max_retries: u32) -> (MissionState, &'static str) {
    let needs_human = ctx.escalation_flag || ctx.failure_count >= max_retries;
    if needs_human && ctx.pending_feedback.is_none() {
        (MissionState::AwaitHuman, "escalation flagged")
    } else if ctx.all_steps_done() {
        (MissionState::GenerateReport, "all steps complete")
    } else if ctx.failure_count > 0 {
        (MissionState::GenerateScript, "retrying current step")
    } else {
        (MissionState::GenerateScript, "advancing to next step")
    }
}

fn recover(ctx: &mut RunContext, err: MissionError) {
    ctx.incident(err.kind(), err.to_string());
}

pub struct MissionMachine {
    collaborators: Collaborators,
    checkpoints: Arc<dyn CheckpointStore>,
    config: MachineConfig,
    correlator: CrossPlatformCorrelator,
}

impl MissionMachine {
    pub fn new(
        collaborators: Collaborators,
        checkpoints: Arc<dyn CheckpointStore>,
        config: MachineConfig,
    ) -> Self {
        let correlator = CrossPlatformCorrelator::with_config(config.correlator.clone());
        Self {
            collaborators,
            checkpoints,
            config,
            correlator,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Fresh context for `mission`, positioned at `LoadPersona`.
    pub fn start(&self, mission: Mission, run_id: Option<String>) -> RunContext {
        let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        RunContext::new(run_id, mission, self.config.escalation.clone())
    }

    /// Drive a new mission until it completes or pauses for a human.
    pub async fn run(&self, mission: Mission, run_id: Option<String>) -> MissionResult<RunOutcome> {
        let mut ctx = self.start(mission, run_id);
        info!(
            run_id = %ctx.run_id,
            target = %ctx.mission.target,
            platform = %ctx.mission.platform,
            persona = %ctx.mission.persona_id,
            "Starting mission"
        );
        self.drive(&mut ctx).await?;
        self.settle(ctx).await
    }

    /// Inject human feedback into a paused run and continue it.
    pub async fn resume(&self, run_id: &str, feedback: &str) -> MissionResult<RunOutcome> {
        let mut ctx = self.restore(run_id).await?;
        if ctx.state() != MissionState::AwaitHuman {
            return Err(MissionError::NotAwaitingFeedback {
                run_id: run_id.to_string(),
                state: ctx.state().to_string(),
            });
        }

        info!(run_id, "Resuming mission with human feedback");
        let feedback = feedback.trim().to_string();
        ctx.note("human", feedback.clone());
        ctx.pending_feedback = Some(feedback);
        ctx.advance(MissionState::LearnLesson, Some("human feedback received"))?;
        self.drive(&mut ctx).await?;
        self.settle(ctx).await
    }

    /// Load a checkpointed run read-only.
    pub async fn status(&self, run_id: &str) -> MissionResult<RunContext> {
        self.restore(run_id).await
    }

    async fn restore(&self, run_id: &str) -> MissionResult<RunContext> {
        let ctx = self.checkpoints.load(run_id).await?;
        match validate_context(&ctx) {
            IntegrityStatus::Valid => {}
            IntegrityStatus::Recoverable { warnings } => {
                warn!(run_id, ?warnings, "Checkpoint restored with warnings");
            }
            IntegrityStatus::Corrupted { errors } => {
                error!(run_id, ?errors, "Checkpoint failed integrity check");
                return Err(MissionError::InvalidContext {
                    reason: errors.join("; "),
                });
            }
        }
        Ok(ctx)
    }

    /// Step until the run rests.
    pub async fn drive(&self, ctx: &mut RunContext) -> MissionResult<()> {
        while !ctx.state().is_terminal() && !ctx.state().is_suspension_point() {
            self.step(ctx).await?;
        }
        Ok(())
    }

    async fn settle(&self, ctx: RunContext) -> MissionResult<RunOutcome> {
        if ctx.state().is_suspension_point() {
            self.checkpoints.save(&ctx.run_id, &ctx).await?;
            let hitl = ctx.engine.hitl_context();
            warn!(
                run_id = %ctx.run_id,
                score = hitl.frustration_score,
                retries = hitl.retry_count,
                "Mission paused for human input"
            );
            return Ok(RunOutcome::Suspended {
                run_id: ctx.run_id,
                hitl: Box::new(hitl),
            });
        }

        if let Err(e) = self.checkpoints.save(&ctx.run_id, &ctx).await {
            warn!(run_id = %ctx.run_id, error = %e, "Final checkpoint not saved");
        }
        let report = ctx
            .report
            .clone()
            .unwrap_or_else(|| MissionReport::from_context(&ctx));
        info!(
            run_id = %ctx.run_id,
            steps = %format!("{}/{}", report.steps_completed, report.total_steps),
            success_rate = %report.success_rate_label(),
            "Mission complete"
        );
        Ok(RunOutcome::Completed {
            run_id: ctx.run_id,
            report: Box::new(report),
        })
    }

    /// Perform the current state's work and take one transition.
    pub async fn step(&self, ctx: &mut RunContext) -> MissionResult<MissionState> {
        use MissionState::*;

        let (next, reason) = match ctx.state() {
            LoadPersona => (self.load_persona(ctx).await, None),
            PlanMission => (self.plan_mission(ctx).await, None),
            RetrieveMemory => (self.retrieve_memory(ctx).await, None),
            ScoutPage => (self.scout_page(ctx).await, None),
            MapSchema => (self.map_schema(ctx), None),
            AuditUx => (self.audit_ux(ctx).await, None),
            GenerateScript => (self.generate_script(ctx).await, None),
            ExecuteAction => (self.execute_action(ctx).await, None),
            CheckEscalation => {
                let (next, why) = self.check_escalation(ctx);
                (next, Some(why))
            }
            AwaitHuman => {
                return Err(MissionError::EscalationDeadlock {
                    run_id: ctx.run_id.clone(),
                })
            }
            LearnLesson => {
                let (next, why) = self.learn_lesson(ctx).await;
                (next, Some(why))
            }
            GenerateReport => (self.generate_report(ctx), None),
            Done => return Ok(Done),
        };
        ctx.advance(next, reason)?;
        Ok(next)
    }

    async fn load_persona(&self, ctx: &mut RunContext) -> MissionState {
        let requested = ctx.mission.persona_id.clone();
        let personas = &self.collaborators.personas;
        let persona = match personas.load(&requested).await {
            Some(p) => {
                ctx.persona_id = requested;
                p
            }
            None => {
                recover(
                    ctx,
                    MissionError::PersonaNotFound {
                        persona_id: requested,
                    },
                );
                ctx.persona_id = PersonaProfile::DEFAULT_ID.to_string();
                match personas.load(PersonaProfile::DEFAULT_ID).await {
                    Some(p) => p,
                    None => PersonaProfile::senior_casual(),
                }
            }
        };
        ctx.note("system", format!("Loaded persona: {}", ctx.persona_id));
        ctx.persona = Some(persona);
        MissionState::PlanMission
    }

    async fn plan_mission(&self, ctx: &mut RunContext) -> MissionState {
        let task = tasks::plan_task(ctx, self.config.page_context_chars);
        let parsed = match self.collaborators.dispatcher.dispatch(&task).await {
            Ok(output) => parse_mission_plan(&output).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let plan = match parsed {
            Ok(plan) => plan,
            Err(reason) => {
                recover(ctx, MissionError::PlanParseFailure { reason });
                MissionPlan::fallback(&ctx.mission.objective)
            }
        };
        ctx.note("planner", format!("Mission planned with {} steps", plan.steps.len()));
        debug!(run_id = %ctx.run_id, steps = plan.steps.len(), "Mission planned");
        ctx.plan = Some(plan);
        MissionState::RetrieveMemory
    }

    async fn retrieve_memory(&self, ctx: &mut RunContext) -> MissionState {
        let memory: &dyn MemoryService = self.collaborators.memory.as_ref();
        let platform = ctx.mission.platform;
        let query = format!("friction on {} for {}", ctx.mission.target, ctx.persona_id);

        let mut lessons = match memory
            .query(&query, Some(platform), self.config.memory_top_k)
            .await
        {
            Ok(lessons) => lessons,
            Err(e) => {
                recover(
                    ctx,
                    MissionError::MemoryServiceFailure {
                        reason: e.to_string(),
                    },
                );
                Vec::new()
            }
        };

        let hit = self
            .correlator
            .correlate(memory, &ctx.mission.target, &ctx.mission.objective, platform)
            .await;
        if let Some(hit) = hit {
            lessons.retain(|l| l.id != hit.id);
            lessons.insert(0, hit.clone());
            ctx.note(
                "memory",
                format!(
                    "Cross-platform lesson {} (similarity {:.2}) surfaced first",
                    hit.id, hit.similarity
                ),
            );
            ctx.cross_platform_hit = Some(hit);
        }

        ctx.lessons_retrieved = lessons.len();
        ctx.note("memory", format!("Retrieved {} relevant lessons", lessons.len()));
        ctx.lessons = lessons;
        MissionState::ScoutPage
    }

    async fn scout_page(&self, ctx: &mut RunContext) -> MissionState {
        match self
            .collaborators
            .scout
            .scout(&ctx.mission.target, ctx.mission.platform)
            .await
        {
            Ok(page) => {
                ctx.note("scout", format!("Scouted {} chars of content", page.markdown.len()));
                ctx.page = page;
            }
            Err(e) => {
                recover(
                    ctx,
                    MissionError::ScoutFailure {
                        reason: e.to_string(),
                    },
                );
                ctx.page = PageSnapshot::default();
            }
        }
        MissionState::MapSchema
    }

    fn map_schema(&self, ctx: &mut RunContext) -> MissionState {
        ctx.schema = self.collaborators.mapper.map(&ctx.page);
        ctx.note(
            "scout",
            format!(
                "Mapped {} interactive elements",
                ctx.schema.interactive_elements.len()
            ),
        );
        MissionState::AuditUx
    }

    async fn audit_ux(&self, ctx: &mut RunContext) -> MissionState {
        let task = tasks::audit_task(ctx, self.config.page_context_chars);
        let parsed = match self.collaborators.dispatcher.dispatch(&task).await {
            Ok(output) => parse_audit(&output, ctx.mission.platform).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        let findings = match parsed {
            Ok(findings) => findings,
            Err(reason) => {
                let fallback = AuditFindings::fallback(&reason);
                recover(ctx, MissionError::AuditParseFailure { reason });
                fallback
            }
        };

        for fp in &findings.friction_points {
            ctx.engine.record_friction(
                &fp.element,
                &fp.issue_type,
                fp.severity.as_str(),
                &fp.persona_impact,
            );
        }
        ctx.friction_points.extend(findings.friction_points.iter().cloned());
        ctx.sentiment_score = Some(findings.sentiment_score);
        ctx.note(
            "auditor",
            format!(
                "Audit complete. Found {} friction points",
                findings.friction_points.len()
            ),
        );
        ctx.audit = Some(findings);
        MissionState::GenerateScript
    }

    async fn generate_script(&self, ctx: &mut RunContext) -> MissionState {
        ctx.script = None;
        ctx.script_error = None;
        let Some(step) = ctx.current_step().cloned() else {
            ctx.script_error = Some("no step left to script".into());
            return MissionState::ExecuteAction;
        };

        let task = tasks::script_task(
            ctx,
            &step,
            self.config.script_lessons,
            self.config.script_failures,
        );
        let parsed = match self.collaborators.dispatcher.dispatch(&task).await {
            Ok(output) => parse_script(&output).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match parsed {
            Ok(script) => {
                debug!(
                    run_id = %ctx.run_id,
                    action = %script.action,
                    target = %script.target,
                    "Script generated"
                );
                ctx.script = Some(script);
            }
            Err(reason) => ctx.script_error = Some(reason),
        }
        MissionState::ExecuteAction
    }

    async fn execute_action(&self, ctx: &mut RunContext) -> MissionState {
        let step_desc = ctx
            .current_step()
            .map(Step::describe)
            .unwrap_or_else(|| ctx.mission.objective.clone());

        let Some(script) = ctx.script.take() else {
            let reason = ctx
                .script_error
                .take()
                .unwrap_or_else(|| "no script generated".into());
            self.record_fault(ctx, &step_desc, "execution_fault", &step_desc, reason);
            return MissionState::CheckEscalation;
        };

        let request = ActionRequest {
            platform: ctx.mission.platform,
            target: script.target.clone(),
            action: script.action,
            input_text: script.input_text.clone(),
            timeout_ms: script.timeout_ms,
        };
        let action_type = script.action.as_str();
        let started = Instant::now();
        let result = self.collaborators.driver.execute(&request).await;
        debug!(
            run_id = %ctx.run_id,
            action = action_type,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Driver returned"
        );

        match result {
            Ok(outcome) => {
                let screenshot_ref = self.store_screenshot(ctx, outcome.screenshot.as_deref()).await;
                ctx.attempts.push(ActionAttempt {
                    timestamp: Utc::now(),
                    action_type: action_type.to_string(),
                    target: request.target.clone(),
                    success: outcome.success,
                    error_message: outcome.error.clone(),
                    screenshot_ref,
                });
                if outcome.success {
                    ctx.current_step_index += 1;
                    ctx.failure_count = 0;
                    info!(
                        run_id = %ctx.run_id,
                        step = ctx.current_step_index,
                        total = ctx.steps().len(),
                        "Step succeeded"
                    );
                } else {
                    ctx.failure_count += 1;
                    let reason = outcome.error.unwrap_or_else(|| "action failed".into());
                    let score = ctx.engine.record_retry(&step_desc, &reason, ctx.failure_count);
                    warn!(
                        run_id = %ctx.run_id,
                        failure_count = ctx.failure_count,
                        score,
                        %reason,
                        "Action failed"
                    );
                }
            }
            Err(DriverError::Timeout {
                timeout_ms,
                elapsed_ms,
            }) => {
                let message = DriverError::Timeout {
                    timeout_ms,
                    elapsed_ms,
                }
                .to_string();
                ctx.attempts.push(ActionAttempt {
                    timestamp: Utc::now(),
                    action_type: action_type.to_string(),
                    target: request.target.clone(),
                    success: false,
                    error_message: Some(message.clone()),
                    screenshot_ref: None,
                });
                ctx.failure_count += 1;
                let score =
                    ctx.engine
                        .record_timeout(&step_desc, elapsed_ms as f64, timeout_ms as f64);
                warn!(
                    run_id = %ctx.run_id,
                    failure_count = ctx.failure_count,
                    score,
                    %message,
                    "Action timed out"
                );
            }
            Err(DriverError::Fault(reason)) => {
                self.record_fault(ctx, &step_desc, action_type, &request.target, reason);
            }
        }
        MissionState::CheckEscalation
    }

    /// A script that could not run counts as a failed attempt plus an error event.
    fn record_fault(
        &self,
        ctx: &mut RunContext,
        step_desc: &str,
        action_type: &str,
        target: &str,
        reason: String,
    ) {
        ctx.attempts.push(ActionAttempt {
            timestamp: Utc::now(),
            action_type: action_type.to_string(),
            target: target.to_string(),
            success: false,
            error_message: Some(reason.clone()),
            screenshot_ref: None,
        });
        ctx.failure_count += 1;
        ctx.engine
            .record_error(step_desc, "execution_fault", &reason, true);
        recover(ctx, MissionError::ExecutionFault { reason });
    }

    async fn store_screenshot(&self, ctx: &RunContext, png: Option<&[u8]>) -> Option<String> {
        let (sink, png) = (self.collaborators.screenshots.as_ref()?, png?);
        match sink.store(&ctx.run_id, ctx.attempts.len(), png).await {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!(run_id = %ctx.run_id, error = %e, "Screenshot not stored");
                None
            }
        }
    }

    fn check_escalation(&self, ctx: &mut RunContext) -> (MissionState, &'static str) {
        ctx.engine.latch_failure_cap(ctx.failure_count);
        let decision = ctx.engine.decide();
        if decision.escalate && !ctx.escalation_flag {
            ctx.escalation_flag = true;
            let why = decision
                .reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "escalation latched".into());
            ctx.note("system", format!("Escalation triggered: {why}"));
        }
        let (next, why) = branch_policy(ctx, self.config.escalation.max_retries);
        debug!(
            run_id = %ctx.run_id,
            score = decision.score,
            failure_count = ctx.failure_count,
            step = ctx.current_step_index,
            next = %next,
            why,
            "Branch decided"
        );
        (next, why)
    }

    async fn learn_lesson(&self, ctx: &mut RunContext) -> (MissionState, &'static str) {
        let feedback = ctx.pending_feedback.take().unwrap_or_default();
        let step_desc = ctx
            .current_step()
            .map(Step::describe)
            .unwrap_or_else(|| ctx.mission.objective.clone());
        let last_failure = ctx
            .last_failure()
            .map(|a| {
                format!(
                    "{} on '{}' failed: {}",
                    a.action_type,
                    a.target,
                    a.error_message.as_deref().unwrap_or("unknown error")
                )
            })
            .unwrap_or_else(|| "no recorded failure".into());
        let guidance = if feedback.is_empty() {
            "(no guidance given)"
        } else {
            feedback.as_str()
        };

        let mut metadata = HashMap::new();
        metadata.insert("run_id".to_string(), ctx.run_id.clone().into());
        metadata.insert("persona_id".to_string(), ctx.persona_id.clone().into());
        metadata.insert("step_index".to_string(), ctx.current_step_index.into());
        metadata.insert(
            "frustration_score".to_string(),
            ctx.engine.score().into(),
        );
        let entry = LessonEntry {
            lesson_text: format!(
                "Objective '{}', step '{}': {}. Human guidance: {}",
                ctx.mission.objective, step_desc, last_failure, guidance
            ),
            url: ctx.mission.target.clone(),
            platform: ctx.mission.platform,
            friction_type: HITL_FRICTION_TYPE.to_string(),
            resolution: feedback.clone(),
            metadata,
        };

        let id = match self.collaborators.memory.store(&entry).await {
            Ok(id) => {
                ctx.learned_lesson_ids.push(id.clone());
                id
            }
            Err(e) => {
                recover(
                    ctx,
                    MissionError::MemoryServiceFailure {
                        reason: e.to_string(),
                    },
                );
                format!("{}-unsaved-{}", ctx.run_id, ctx.interventions + 1)
            }
        };
        ctx.lessons.insert(
            0,
            LessonMatch {
                metadata: lesson_metadata(&id, &entry),
                id,
                similarity: 1.0,
            },
        );

        ctx.failure_count = 0;
        ctx.engine.clear_escalation();
        ctx.escalation_flag = false;
        ctx.interventions += 1;
        ctx.note("system", format!("Learned from human feedback: {guidance}"));
        info!(
            run_id = %ctx.run_id,
            interventions = ctx.interventions,
            "Human feedback recorded as lesson"
        );

        if ctx.all_steps_done() {
            (MissionState::GenerateReport, "all steps complete")
        } else {
            (MissionState::GenerateScript, "retrying with human guidance")
        }
    }

    fn generate_report(&self, ctx: &mut RunContext) -> MissionState {
        let report = MissionReport::from_context(ctx);
        ctx.final_report = Some(report.render_markdown());
        ctx.report = Some(report);
        ctx.note("system", "Report generated");
        MissionState::Done
    }
}
