//! Full mission runs over the concrete file-backed adapters.
//!
//! The dispatcher and scout are stubbed, the automation driver is a mockall
//! mock, and everything else (persona registry, schema mapper, lesson store,
//! checkpoint store, screenshot sink, report writer) is the real thing over a
//! temp directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coordination::memory::MemoryService;
use coordination::EscalationReason;
use coordination::mission::{
    ActionOutcome, ActionRequest, AgentDispatcher, AgentRole, AgentTask, AutomationDriver,
    Collaborators, DispatchError, DriverError, FileCheckpointStore, MissionMachine, MissionState,
    PageScout, ScoutError, HITL_FRICTION_TYPE,
};
use coordination::model::{ActionKind, Mission, PageSnapshot, Platform};
use mission_agents::telemetry::{self, RunSummary, RUN_LOG};
use mission_agents::{FileLessonStore, FileScreenshotSink, HtmlSchemaMapper, PersonaRegistry};
use mockall::mock;

mock! {
    pub Driver {}

    #[async_trait]
    impl AutomationDriver for Driver {
        async fn execute(&self, request: &ActionRequest) -> Result<ActionOutcome, DriverError>;
    }
}

const PAGE: &str = r#"<html><body>
    <nav><a href="/">Home</a><a href="/contact">Contact</a></nav>
    <h1>Welcome</h1>
    <button id="subscribe">Subscribe</button>
</body></html>"#;

struct StubScout;

#[async_trait]
impl PageScout for StubScout {
    async fn scout(&self, _target: &str, _platform: Platform) -> Result<PageSnapshot, ScoutError> {
        Ok(PageSnapshot {
            markdown: "# Welcome\nSubscribe".into(),
            html: Some(PAGE.into()),
        })
    }
}

/// Answers each role with a fixed payload and records the tasks it saw.
#[derive(Default)]
struct StubDispatcher {
    tasks: Mutex<Vec<AgentTask>>,
}

#[async_trait]
impl AgentDispatcher for StubDispatcher {
    async fn dispatch(&self, task: &AgentTask) -> Result<String, DispatchError> {
        self.tasks.lock().unwrap().push(task.clone());
        Ok(match task.role {
            AgentRole::Planner => {
                r#"{"mission_name": "Subscribe", "steps": [{"action": "Subscribe", "target": "Subscribe button"}]}"#
            }
            AgentRole::Auditor => {
                r#"Audit done. {"friction_points": [{"element": "Subscribe button", "issue_type": "contrast",
                    "severity": "high", "persona_impact": "hard to read", "recommendation": "raise contrast"}],
                    "sentiment_score": 0.6, "summary": "Mostly fine"}"#
            }
            AgentRole::ScriptWriter => r#"{"action": "click", "target": "Subscribe button"}"#,
        }
        .to_string())
    }
}

struct Workspace {
    _dir: tempfile::TempDir,
    root: std::path::PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        Self { _dir: dir, root }
    }

    async fn machine(&self, driver: MockDriver) -> (MissionMachine, Arc<FileLessonStore>) {
        let memory = Arc::new(
            FileLessonStore::open(self.root.join("lessons.jsonl"))
                .await
                .unwrap(),
        );
        let collaborators = Collaborators {
            personas: Arc::new(PersonaRegistry::default()),
            scout: Arc::new(StubScout),
            mapper: Arc::new(HtmlSchemaMapper),
            dispatcher: Arc::new(StubDispatcher::default()),
            driver: Arc::new(driver),
            memory: memory.clone(),
            screenshots: Some(Arc::new(FileScreenshotSink::new(self.root.join("shots")))),
        };
        let machine = MissionMachine::new(
            collaborators,
            Arc::new(FileCheckpointStore::new(self.root.join("runs"))),
            Default::default(),
        );
        (machine, memory)
    }
}

fn mission() -> Mission {
    Mission::new(
        "Subscribe to the newsletter",
        "https://news.test",
        Platform::Web,
        "accessibility_focused",
    )
}

#[tokio::test]
async fn test_completed_run_writes_report_and_screenshot() {
    let ws = Workspace::new();
    let mut driver = MockDriver::new();
    driver
        .expect_execute()
        .withf(|req| req.action == ActionKind::Click && req.timeout_ms == 10_000)
        .times(1)
        .returning(|_| {
            Ok(ActionOutcome {
                success: true,
                error: None,
                screenshot: Some(b"png".to_vec()),
            })
        });
    let (machine, _) = ws.machine(driver).await;

    let outcome = machine.run(mission(), Some("ok-run".into())).await.unwrap();
    let report = outcome.report().unwrap().clone();
    assert_eq!(report.persona, "accessibility_focused");
    assert_eq!(report.friction_points.len(), 1);
    assert_eq!(
        report.friction_points[0].resolution.as_deref(),
        Some("raise contrast")
    );
    assert_eq!(report.success_rate_label(), "100.0%");

    let ctx = machine.status("ok-run").await.unwrap();
    assert_eq!(ctx.state(), MissionState::Done);
    assert_eq!(ctx.schema.interactive_elements.len(), 3);
    let shot = ctx.attempts[0].screenshot_ref.clone().unwrap();
    assert!(std::path::Path::new(&shot).exists());

    let reports = ws.root.join("reports");
    let (md, _) = telemetry::write_report(&report, &reports).unwrap();
    assert!(md
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("report_accessibility_focused_web_"));
    telemetry::append_run_summary(&RunSummary::from_outcome(&outcome), &reports);
    let runs = telemetry::read_run_log(&reports.join(RUN_LOG)).unwrap();
    assert_eq!(runs[0].run_id, "ok-run");
}

#[tokio::test]
async fn test_suspended_run_resumes_from_disk_and_persists_lesson() {
    let ws = Workspace::new();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut driver = MockDriver::new();
    driver.expect_execute().returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
            Ok(ActionOutcome::failed("button not found"))
        } else {
            Ok(ActionOutcome::ok())
        }
    });
    let (machine, _) = ws.machine(driver).await;

    let outcome = machine.run(mission(), Some("paused".into())).await.unwrap();
    assert!(outcome.is_suspended());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    drop(machine);

    // A fresh process: new machine over the same directories.
    let calls_after = calls.clone();
    let mut driver = MockDriver::new();
    driver.expect_execute().returning(move |_| {
        calls_after.fetch_add(1, Ordering::SeqCst);
        Ok(ActionOutcome::ok())
    });
    let (machine, _) = ws.machine(driver).await;
    let outcome = machine
        .resume("paused", "The subscribe button is under the hero image")
        .await
        .unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.hitl_interventions, 1);
    assert_eq!(report.total_attempts, 4);

    let reopened = FileLessonStore::open(ws.root.join("lessons.jsonl"))
        .await
        .unwrap();
    assert_eq!(reopened.len(), 1);
    let hits = reopened
        .query("subscribe button hero image", Some(Platform::Web), 1)
        .await
        .unwrap();
    assert_eq!(hits[0].friction_type(), Some(HITL_FRICTION_TYPE));
}

#[tokio::test]
async fn test_repeated_driver_faults_pause_for_a_human() {
    let ws = Workspace::new();
    let mut driver = MockDriver::new();
    driver
        .expect_execute()
        .times(3)
        .returning(|_| Err(DriverError::Fault("browser crashed".into())));
    let (machine, _) = ws.machine(driver).await;

    let outcome = machine.run(mission(), Some("crashing".into())).await.unwrap();
    assert!(outcome.is_suspended());
    assert!(outcome.report().is_none());

    let ctx = machine.status("crashing").await.unwrap();
    assert_eq!(ctx.state(), MissionState::AwaitHuman);
    assert_eq!(ctx.current_step_index, 0);
    assert_eq!(ctx.attempts.len(), 3);
    assert!(ctx.attempts.iter().all(|a| !a.success
        && a.error_message.as_deref().is_some_and(|m| m.contains("browser crashed"))));
    assert!(!ctx.incidents.is_empty());
    assert_eq!(
        ctx.engine.latch_reason(),
        Some(&EscalationReason::FailureCap {
            failures: 3,
            cap: 3
        })
    );
}
