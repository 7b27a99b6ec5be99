//! End-to-end mission flows with scripted collaborators.
//!
//! Every external seam is replaced by a Mutex-backed mock so each test can
//! script dispatcher output and driver results, then inspect what the state
//! machine sent and what it checkpointed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use coordination::memory::{InMemoryLessonStore, MemoryError, MemoryService};
use coordination::mission::{
    ActionOutcome, ActionRequest, AgentDispatcher, AgentRole, AgentTask, AutomationDriver,
    CheckpointStore, Collaborators, DefaultPersonaSource, DispatchError, DriverError,
    InMemoryCheckpointStore, MachineConfig, MissionMachine, MissionState, PageScout,
    RunOutcome, SchemaMapper, ScoutError, HITL_FRICTION_TYPE,
};
use coordination::model::{
    InteractiveElement, LessonEntry, Mission, PageSnapshot, Platform, Step, UiSchema,
};
use coordination::{LessonMatch, MissionError, MissionErrorKind};

// ── Mocks ──────────────────────────────────────────────────────────────

/// Dispatcher with a response queue per role and a default once drained.
struct ScriptedDispatcher {
    queues: Mutex<HashMap<AgentRole, VecDeque<String>>>,
    tasks: Mutex<Vec<AgentTask>>,
}

const PLAN_ONE_STEP: &str =
    r#"{"mission_name": "Contact", "steps": [{"action": "Open the contact page", "target": "Contact link"}]}"#;
const PLAN_TWO_STEPS: &str = r#"Sure! Here is the plan:
```json
{"mission_name": "Checkout", "steps": [
  {"action": "Add socks to cart", "target": "Add to cart button"},
  {"action": "Open the cart", "target": "Cart icon"}
]}
```"#;
const AUDIT_CLEAN: &str =
    r#"{"friction_points": [], "overall_sentiment": "positive", "sentiment_score": 0.8, "summary": "Clear layout"}"#;
const SCRIPT_CLICK: &str = r#"{"action": "click", "target": "Primary button", "timeout_ms": 3000}"#;

impl ScriptedDispatcher {
    fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn queue(self, role: AgentRole, responses: &[&str]) -> Self {
        self.queues
            .lock()
            .unwrap()
            .insert(role, responses.iter().map(|s| s.to_string()).collect());
        self
    }

    fn default_for(role: AgentRole) -> &'static str {
        match role {
            AgentRole::Planner => PLAN_ONE_STEP,
            AgentRole::Auditor => AUDIT_CLEAN,
            AgentRole::ScriptWriter => SCRIPT_CLICK,
        }
    }

    fn tasks_for(&self, role: AgentRole) -> Vec<AgentTask> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.role == role)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AgentDispatcher for ScriptedDispatcher {
    async fn dispatch(&self, task: &AgentTask) -> Result<String, DispatchError> {
        self.tasks.lock().unwrap().push(task.clone());
        let next = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&task.role)
            .and_then(VecDeque::pop_front);
        Ok(next.unwrap_or_else(|| Self::default_for(task.role).to_string()))
    }
}

/// Driver replaying scripted results, then succeeding.
struct ScriptedDriver {
    results: Mutex<VecDeque<Result<ActionOutcome, DriverError>>>,
    requests: Mutex<Vec<ActionRequest>>,
}

impl ScriptedDriver {
    fn new(results: Vec<Result<ActionOutcome, DriverError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn failing(n: usize) -> Self {
        Self::new(
            (0..n)
                .map(|_| Ok(ActionOutcome::failed("element not found")))
                .collect(),
        )
    }
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    async fn execute(&self, request: &ActionRequest) -> Result<ActionOutcome, DriverError> {
        self.requests.lock().unwrap().push(request.clone());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ActionOutcome::ok()))
    }
}

struct StaticScout(Result<PageSnapshot, ScoutError>);

#[async_trait]
impl PageScout for StaticScout {
    async fn scout(&self, _target: &str, _platform: Platform) -> Result<PageSnapshot, ScoutError> {
        self.0.clone()
    }
}

/// Maps any non-empty page to a single button.
struct OneButtonMapper;

impl SchemaMapper for OneButtonMapper {
    fn map(&self, page: &PageSnapshot) -> UiSchema {
        if page.markdown.is_empty() {
            return UiSchema::default();
        }
        UiSchema {
            interactive_elements: vec![InteractiveElement {
                tag: "button".into(),
                text: "Primary button".into(),
                ..InteractiveElement::default()
            }],
            ..UiSchema::default()
        }
    }
}

struct BrokenMemory;

#[async_trait]
impl MemoryService for BrokenMemory {
    async fn store(&self, _lesson: &LessonEntry) -> Result<String, MemoryError> {
        Err(MemoryError::Unavailable {
            reason: "connection refused".into(),
        })
    }

    async fn query(
        &self,
        _text: &str,
        _platform: Option<Platform>,
        _top_k: usize,
    ) -> Result<Vec<LessonMatch>, MemoryError> {
        Err(MemoryError::Unavailable {
            reason: "connection refused".into(),
        })
    }
}

// ── Harness ────────────────────────────────────────────────────────────

struct Harness {
    machine: MissionMachine,
    dispatcher: Arc<ScriptedDispatcher>,
    driver: Arc<ScriptedDriver>,
    checkpoints: Arc<InMemoryCheckpointStore>,
}

fn harness_with(
    dispatcher: ScriptedDispatcher,
    driver: ScriptedDriver,
    memory: Arc<dyn MemoryService>,
    scout: StaticScout,
) -> Harness {
    let dispatcher = Arc::new(dispatcher);
    let driver = Arc::new(driver);
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let collaborators = Collaborators {
        personas: Arc::new(DefaultPersonaSource),
        scout: Arc::new(scout),
        mapper: Arc::new(OneButtonMapper),
        dispatcher: dispatcher.clone(),
        driver: driver.clone(),
        memory,
        screenshots: None,
    };
    Harness {
        machine: MissionMachine::new(collaborators, checkpoints.clone(), MachineConfig::default()),
        dispatcher,
        driver,
        checkpoints,
    }
}

fn page() -> StaticScout {
    StaticScout(Ok(PageSnapshot {
        markdown: "Welcome to the sock shop. [Primary button]".into(),
        html: None,
    }))
}

fn harness(dispatcher: ScriptedDispatcher, driver: ScriptedDriver) -> Harness {
    harness_with(dispatcher, driver, Arc::new(InMemoryLessonStore::new()), page())
}

fn mission() -> Mission {
    Mission::new("buy socks", "https://shop.test", Platform::Web, "senior_casual")
}

fn completed(outcome: RunOutcome) -> coordination::MissionReport {
    match outcome {
        RunOutcome::Completed { report, .. } => *report,
        RunOutcome::Suspended { run_id, .. } => panic!("run {run_id} unexpectedly suspended"),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_happy_path_completes() {
    let h = harness(ScriptedDispatcher::new(), ScriptedDriver::new(vec![]));
    let outcome = h.machine.run(mission(), Some("happy".into())).await.unwrap();
    let report = completed(outcome);

    assert_eq!(report.steps_completed, 1);
    assert_eq!(report.total_steps, 1);
    assert_eq!(report.success_rate_label(), "100.0%");
    assert_eq!(report.sentiment_score, 0.8);

    let ctx = h.checkpoints.load("happy").await.unwrap();
    assert_eq!(ctx.state(), MissionState::Done);
    assert!(ctx.final_report.as_deref().unwrap().contains("Steps Completed**: 1/1"));
    assert!(ctx.incidents.is_empty());

    let requests = h.driver.requests.lock().unwrap();
    assert_eq!(requests[0].target, "Primary button");
    assert_eq!(requests[0].timeout_ms, 3000);
}

#[tokio::test]
async fn test_unparseable_plan_falls_back_to_objective() {
    let dispatcher = ScriptedDispatcher::new()
        .queue(AgentRole::Planner, &["I am unable to produce a plan right now."]);
    let h = harness(dispatcher, ScriptedDriver::new(vec![]));
    h.machine.run(mission(), Some("fallback".into())).await.unwrap();

    let ctx = h.machine.status("fallback").await.unwrap();
    assert_eq!(ctx.steps(), &[Step::new("buy socks")]);
    assert!(ctx
        .incidents
        .iter()
        .any(|i| i.kind == MissionErrorKind::PlanParseFailure && i.state == MissionState::PlanMission));
}

#[tokio::test]
async fn test_step_retried_after_one_failure() {
    let dispatcher = ScriptedDispatcher::new().queue(AgentRole::Planner, &[PLAN_TWO_STEPS]);
    let h = harness(dispatcher, ScriptedDriver::failing(1));
    let report = completed(h.machine.run(mission(), None).await.unwrap());

    assert_eq!(report.steps_completed, 2);
    assert_eq!(report.total_steps, 2);
    assert_eq!(report.failure_count, 0);
    assert_eq!(report.total_attempts, 3);
    assert_eq!(report.success_rate_label(), "66.7%");
    assert_eq!(report.hitl_interventions, 0);
}

#[tokio::test]
async fn test_two_failures_below_retry_cap_still_complete() {
    let dispatcher = ScriptedDispatcher::new().queue(AgentRole::Planner, &[PLAN_TWO_STEPS]);
    let h = harness(dispatcher, ScriptedDriver::failing(2));
    let report = completed(h.machine.run(mission(), None).await.unwrap());

    assert_eq!(report.steps_completed, 2);
    assert_eq!(report.failure_count, 0);
    assert_eq!(report.total_attempts, 4);
    assert_eq!(report.success_rate_label(), "50.0%");
    assert!(!report.frustration.escalation_latched);
}

#[tokio::test]
async fn test_step_index_and_failure_counter_invariants() {
    let dispatcher = ScriptedDispatcher::new().queue(AgentRole::Planner, &[PLAN_TWO_STEPS]);
    let h = harness(dispatcher, ScriptedDriver::failing(2));
    let mut ctx = h.machine.start(mission(), Some("invariants".into()));

    let mut last_index = 0;
    while !ctx.state().is_terminal() {
        let executing = ctx.state() == MissionState::ExecuteAction;
        let before = ctx.current_step_index;
        h.machine.step(&mut ctx).await.unwrap();
        assert!(ctx.current_step_index >= last_index);
        if executing {
            assert!(ctx.current_step_index - before <= 1);
            if ctx.attempts.last().unwrap().success {
                assert_eq!(ctx.failure_count, 0);
            }
        } else {
            assert_eq!(ctx.current_step_index, before);
        }
        last_index = ctx.current_step_index;
    }
    assert_eq!(ctx.current_step_index, 2);
}

#[tokio::test]
async fn test_retry_cap_suspends_then_feedback_resumes() {
    let memory = Arc::new(InMemoryLessonStore::new());
    let h = harness_with(
        ScriptedDispatcher::new(),
        ScriptedDriver::failing(3),
        memory.clone(),
        page(),
    );

    let outcome = h.machine.run(mission(), Some("hitl".into())).await.unwrap();
    let hitl = match outcome {
        RunOutcome::Suspended { run_id, hitl } => {
            assert_eq!(run_id, "hitl");
            hitl
        }
        RunOutcome::Completed { .. } => panic!("expected suspension"),
    };
    assert_eq!(hitl.retry_count, 3);
    assert!(hitl.frustration_score < 0.75);
    assert!(hitl.recommendation.starts_with("Multiple retries failed"));

    let paused = h.machine.status("hitl").await.unwrap();
    assert_eq!(paused.state(), MissionState::AwaitHuman);
    assert!(paused.escalation_flag);
    assert_eq!(paused.failure_count, 3);

    let feedback = "Use the 'Contact us' link in the footer";
    let report = completed(h.machine.resume("hitl", feedback).await.unwrap());
    assert_eq!(report.hitl_interventions, 1);
    assert_eq!(report.steps_completed, 1);
    assert_eq!(report.total_attempts, 4);

    // Human guidance is stored and offered first to the next script.
    assert_eq!(memory.len(), 1);
    let stored = memory.search("footer contact", None, 1).unwrap();
    assert_eq!(stored[0].friction_type(), Some(HITL_FRICTION_TYPE));
    assert_eq!(stored[0].resolution(), Some(feedback));

    let scripts = h.dispatcher.tasks_for(AgentRole::ScriptWriter);
    let last = scripts.last().unwrap();
    assert!(last.description.contains(feedback));

    let done = h.machine.status("hitl").await.unwrap();
    assert_eq!(done.state(), MissionState::Done);
    assert!(!done.escalation_flag);
    assert!(!done.engine.is_latched());
    assert_eq!(done.engine.retry_count(), 0);
    assert_eq!(done.track.visits(MissionState::LearnLesson), 1);
}

/// Runs a one-step mission whose first three driver calls return `error`,
/// checks it pauses at the failure cap, then resumes it to completion.
async fn assert_cap_suspends_then_resumes(run_id: &str, error: DriverError) {
    let driver = ScriptedDriver::new((0..5).map(|_| Err(error.clone())).collect());
    let h = harness(ScriptedDispatcher::new(), driver);

    let outcome = h.machine.run(mission(), Some(run_id.into())).await.unwrap();
    assert!(outcome.is_suspended(), "{run_id} should pause for a human");
    let RunOutcome::Suspended { hitl, .. } = outcome else {
        unreachable!()
    };
    assert!(hitl.frustration_score < 0.75);
    assert_eq!(hitl.retry_count, 0);
    assert!(hitl.recommendation.starts_with("Multiple retries failed"));

    let paused = h.machine.status(run_id).await.unwrap();
    assert_eq!(paused.state(), MissionState::AwaitHuman);
    assert!(paused.escalation_flag);
    assert!(paused.engine.is_latched());
    assert_eq!(paused.failure_count, 3);
    assert_eq!(paused.current_step_index, 0);
    assert_eq!(paused.attempts.len(), 3);
    assert_eq!(h.driver.requests.lock().unwrap().len(), 3);

    // Drop the leftover scripted failures so the guided retry succeeds.
    h.driver.results.lock().unwrap().clear();
    let report = completed(h.machine.resume(run_id, "wait for the page to settle").await.unwrap());
    assert_eq!(report.steps_completed, 1);
    assert_eq!(report.total_attempts, 4);
    assert_eq!(report.hitl_interventions, 1);

    let done = h.machine.status(run_id).await.unwrap();
    assert_eq!(done.state(), MissionState::Done);
    assert!(!done.escalation_flag);
    assert_eq!(done.failure_count, 0);
}

#[tokio::test]
async fn test_repeated_driver_faults_suspend_at_retry_cap() {
    assert_cap_suspends_then_resumes("faults", DriverError::Fault("browser crashed".into())).await;
}

#[tokio::test]
async fn test_repeated_timeouts_suspend_at_retry_cap() {
    assert_cap_suspends_then_resumes(
        "timeouts",
        DriverError::Timeout {
            timeout_ms: 3000,
            elapsed_ms: 3000,
        },
    )
    .await;
}

#[tokio::test]
async fn test_score_threshold_escalates_before_retry_cap() {
    let audit = r#"{"friction_points": [
        {"element": "Checkout", "issue_type": "visibility", "severity": "critical",
         "persona_impact": "cannot see it"}], "sentiment_score": 0.2}"#;
    let dispatcher = ScriptedDispatcher::new()
        .queue(AgentRole::Auditor, &[audit])
        .queue(AgentRole::ScriptWriter, &[SCRIPT_CLICK, "no idea, sorry"]);
    let driver = ScriptedDriver::new(vec![Err(DriverError::Timeout {
        timeout_ms: 3000,
        elapsed_ms: 9000,
    })]);
    let h = harness(dispatcher, driver);

    let outcome = h.machine.run(mission(), Some("score".into())).await.unwrap();
    let RunOutcome::Suspended { hitl, .. } = outcome else {
        panic!("expected suspension");
    };
    assert!(hitl.frustration_score >= 0.75);
    assert_eq!(hitl.retry_count, 0);

    let ctx = h.machine.status("score").await.unwrap();
    assert_eq!(ctx.failure_count, 2);
    assert_eq!(ctx.attempts.len(), 2);
    assert_eq!(ctx.attempts[1].action_type, "execution_fault");
    assert!(ctx
        .incidents
        .iter()
        .any(|i| i.kind == MissionErrorKind::ExecutionFault));
}

#[tokio::test]
async fn test_resume_rejects_runs_not_awaiting_feedback() {
    let h = harness(ScriptedDispatcher::new(), ScriptedDriver::new(vec![]));
    h.machine.run(mission(), Some("finished".into())).await.unwrap();

    let err = h.machine.resume("finished", "try again").await.unwrap_err();
    assert!(matches!(err, MissionError::NotAwaitingFeedback { .. }));
    assert!(!err.is_recoverable());

    let err = h.machine.resume("never-ran", "hello").await.unwrap_err();
    assert_eq!(err.kind(), MissionErrorKind::Checkpoint);
}

#[tokio::test]
async fn test_resume_rejects_corrupted_checkpoint() {
    let h = harness(ScriptedDispatcher::new(), ScriptedDriver::failing(3));
    h.machine.run(mission(), Some("corrupt".into())).await.unwrap();

    let mut ctx = h.checkpoints.load("corrupt").await.unwrap();
    ctx.mission.target.clear();
    h.checkpoints.save("corrupt", &ctx).await.unwrap();

    let err = h.machine.resume("corrupt", "anything").await.unwrap_err();
    assert_eq!(err.kind(), MissionErrorKind::InvalidContext);
}

#[tokio::test]
async fn test_cross_platform_hit_is_surfaced_first() {
    let memory = Arc::new(InMemoryLessonStore::new());
    let lesson = |text: &str, platform: Platform, friction: &str| LessonEntry {
        lesson_text: text.into(),
        url: "https://shop.test".into(),
        platform,
        friction_type: friction.into(),
        resolution: "resolved".into(),
        metadata: HashMap::new(),
    };
    memory
        .insert(
            "web-1".into(),
            &lesson("friction on https://shop.test for senior_casual", Platform::Web, "visibility"),
        )
        .unwrap();
    memory
        .insert(
            "mobile-1".into(),
            &lesson("friction on https://shop.test with buy socks", Platform::Mobile, "interaction"),
        )
        .unwrap();

    let h = harness_with(ScriptedDispatcher::new(), ScriptedDriver::new(vec![]), memory, page());
    let report = completed(h.machine.run(mission(), Some("xplat".into())).await.unwrap());

    let insight = report.cross_platform.expect("cross-platform hit");
    assert_eq!(insight.lesson_id, "mobile-1");
    assert_eq!(insight.source_platform, Some(Platform::Mobile));
    assert!(insight.similarity > 0.85);

    let ctx = h.machine.status("xplat").await.unwrap();
    assert_eq!(ctx.lessons[0].id, "mobile-1");
    assert_eq!(ctx.lessons[1].id, "web-1");
    assert_eq!(ctx.lessons_retrieved, 2);
    // A pre-emptive hint never becomes a frustration event.
    assert!(ctx.engine.events().is_empty());
}

#[tokio::test]
async fn test_degraded_collaborators_never_abort() {
    let h = harness_with(
        ScriptedDispatcher::new().queue(AgentRole::Auditor, &["<html>not json</html>"]),
        ScriptedDriver::new(vec![]),
        Arc::new(BrokenMemory),
        StaticScout(Err(ScoutError::Status(503))),
    );
    let mission = Mission::new("buy socks", "https://shop.test", Platform::Web, "pirate_captain");
    let report = completed(h.machine.run(mission, Some("degraded".into())).await.unwrap());

    assert_eq!(report.persona, "senior_casual");
    assert_eq!(report.sentiment_score, 0.5);
    assert!(report.audit_summary.starts_with("Audit parsing failed"));

    let ctx = h.machine.status("degraded").await.unwrap();
    let kinds: Vec<MissionErrorKind> = ctx.incidents.iter().map(|i| i.kind).collect();
    assert!(kinds.contains(&MissionErrorKind::PersonaNotFound));
    assert!(kinds.contains(&MissionErrorKind::MemoryServiceFailure));
    assert!(kinds.contains(&MissionErrorKind::ScoutFailure));
    assert!(kinds.contains(&MissionErrorKind::AuditParseFailure));
    assert!(ctx.schema.is_empty());
    assert!(ctx.lessons.is_empty());
}

#[tokio::test]
async fn test_feedback_survives_memory_outage() {
    let h = harness_with(
        ScriptedDispatcher::new(),
        ScriptedDriver::failing(3),
        Arc::new(BrokenMemory),
        page(),
    );
    assert!(h
        .machine
        .run(mission(), Some("outage".into()))
        .await
        .unwrap()
        .is_suspended());

    let report = completed(h.machine.resume("outage", "press Enter instead").await.unwrap());
    assert_eq!(report.hitl_interventions, 1);

    let ctx = h.machine.status("outage").await.unwrap();
    assert!(ctx.learned_lesson_ids.is_empty());
    assert_eq!(ctx.lessons[0].resolution(), Some("press Enter instead"));
}
