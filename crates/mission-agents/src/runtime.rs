//! Wires configured collaborators into a [`MissionMachine`].

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use coordination::memory::MemoryService;
use coordination::mission::{
    ActionOutcome, ActionRequest, AutomationDriver, CheckpointStore, Collaborators, DriverError,
    FileCheckpointStore, MissionMachine,
};
use tracing::{info, warn};

use crate::config::PilotConfig;
use crate::dispatcher::HttpDispatcher;
use crate::driver::CommandDriver;
use crate::memory_bridge::{FileLessonStore, HttpMemoryService};
use crate::persona_registry::PersonaRegistry;
use crate::schema_mapper::HtmlSchemaMapper;
use crate::scout::HttpScout;
use crate::screenshots::FileScreenshotSink;

/// Stand-in when no driver command is configured: every action is a fault.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredDriver;

#[async_trait]
impl AutomationDriver for UnconfiguredDriver {
    async fn execute(&self, _request: &ActionRequest) -> Result<ActionOutcome, DriverError> {
        Err(DriverError::Fault(
            "no automation driver configured (set PILOT_DRIVER_CMD)".into(),
        ))
    }
}

/// Remote memory when a URL is configured, otherwise the local JSONL store.
pub async fn build_memory(config: &PilotConfig) -> Result<Arc<dyn MemoryService>> {
    match &config.memory_url {
        Some(url) => {
            info!(url = %url, "Using remote memory service");
            let memory = HttpMemoryService::new(url, config.llm.timeout_secs)
                .context("Failed to build memory client")?;
            Ok(Arc::new(memory))
        }
        None => {
            let path = config.lessons_file();
            let store = FileLessonStore::open(&path)
                .await
                .with_context(|| format!("Failed to open lesson store {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

pub async fn build_collaborators(config: &PilotConfig) -> Result<Collaborators> {
    let personas = PersonaRegistry::load(config.personas_file.as_deref())?;
    let dispatcher =
        HttpDispatcher::new(config.llm.clone()).context("Failed to build agent dispatcher")?;
    let scout = HttpScout::new(config.scout_timeout_secs).context("Failed to build page scout")?;
    let driver: Arc<dyn AutomationDriver> = match &config.driver_cmd {
        Some(cmd) => Arc::new(CommandDriver::new(cmd).context("Invalid driver command")?),
        None => {
            warn!("No automation driver configured; every action will fault");
            Arc::new(UnconfiguredDriver)
        }
    };

    Ok(Collaborators {
        personas: Arc::new(personas),
        scout: Arc::new(scout),
        mapper: Arc::new(HtmlSchemaMapper),
        dispatcher: Arc::new(dispatcher),
        driver,
        memory: build_memory(config).await?,
        screenshots: Some(Arc::new(FileScreenshotSink::new(config.screenshots_dir()))),
    })
}

pub fn checkpoint_store(config: &PilotConfig) -> Arc<dyn CheckpointStore> {
    Arc::new(FileCheckpointStore::new(config.checkpoints_dir()))
}

pub async fn build_machine(config: &PilotConfig) -> Result<MissionMachine> {
    Ok(MissionMachine::new(
        build_collaborators(config).await?,
        checkpoint_store(config),
        config.machine_config(),
    ))
}
