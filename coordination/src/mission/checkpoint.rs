//! Run checkpoints: suspend and resume for paused missions.
//!
//! A run context is wrapped in a versioned envelope, serialised to JSON and
//! keyed by run id. Restores are validated before the state machine is
//! allowed to re-enter, so a corrupted context fails the resume instead of
//! drifting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mission::context::RunContext;
use crate::mission::state::MissionState;

/// Errors from checkpoint persistence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointError {
    #[error("serialize failed: {0}")]
    SerializeFailed(String),
    #[error("deserialize failed: {0}")]
    DeserializeFailed(String),
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("no checkpoint for run '{0}'")]
    NotFound(String),
    #[error("invalid run id '{0}'")]
    InvalidRunId(String),
    #[error("checkpoint storage failed: {0}")]
    Storage(String),
}

/// A complete run checkpoint for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    /// Schema version for forward compatibility.
    pub version: u32,
    pub run_id: String,
    pub state: MissionState,
    pub saved_at: DateTime<Utc>,
    pub context: RunContext,
}

impl RunCheckpoint {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(context: &RunContext) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            run_id: context.run_id.clone(),
            state: context.state(),
            saved_at: Utc::now(),
            context: context.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self).map_err(|e| CheckpointError::SerializeFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self =
            serde_json::from_str(json).map_err(|e| CheckpointError::DeserializeFailed(e.to_string()))?;

        if checkpoint.version > Self::CURRENT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: checkpoint.version,
            });
        }

        Ok(checkpoint)
    }
}

/// Integrity check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    Valid,
    /// Minor issues; resume is still safe.
    Recoverable { warnings: Vec<String> },
    Corrupted { errors: Vec<String> },
}

impl IntegrityStatus {
    pub fn can_resume(&self) -> bool {
        matches!(self, Self::Valid | Self::Recoverable { .. })
    }
}

/// Validate a restored context before re-entering the state machine.
pub fn validate_context(ctx: &RunContext) -> IntegrityStatus {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    if ctx.run_id.trim().is_empty() {
        errors.push("run_id is empty".into());
    }
    if ctx.mission.objective.trim().is_empty() {
        errors.push("mission objective is empty".into());
    }
    if ctx.mission.target.trim().is_empty() {
        errors.push("mission target is empty".into());
    }
    if !ctx.track.is_consistent() {
        errors.push(format!(
            "last transition does not match current state {}",
            ctx.state()
        ));
    }

    let past_planning = ctx.track.visits(MissionState::RetrieveMemory) > 0;
    if past_planning && ctx.steps().is_empty() {
        errors.push("planned run has no steps".into());
    }
    if ctx.current_step_index > ctx.steps().len() {
        errors.push(format!(
            "step index {} beyond {} steps",
            ctx.current_step_index,
            ctx.steps().len()
        ));
    }
    if past_planning && ctx.persona.is_none() {
        errors.push("persona missing after LoadPersona".into());
    }

    if ctx.escalation_flag != ctx.engine.is_latched() {
        warnings.push("escalation flag disagrees with engine latch".into());
    }
    if ctx.pending_feedback.is_some() && ctx.state() != MissionState::AwaitHuman {
        warnings.push(format!("pending feedback outside AwaitHuman ({})", ctx.state()));
    }

    if !errors.is_empty() {
        IntegrityStatus::Corrupted { errors }
    } else if !warnings.is_empty() {
        IntegrityStatus::Recoverable { warnings }
    } else {
        IntegrityStatus::Valid
    }
}

/// Persistence for run contexts, keyed by run id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, run_id: &str, context: &RunContext) -> Result<(), CheckpointError>;

    /// `CheckpointError::NotFound` when nothing was saved under `run_id`.
    async fn load(&self, run_id: &str) -> Result<RunContext, CheckpointError>;

    /// Known run ids, sorted.
    async fn list(&self) -> Result<Vec<String>, CheckpointError>;
}

/// Process-local store holding serialised envelopes.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the raw JSON for a run.
    pub fn put_raw(&self, run_id: &str, json: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(run_id.to_string(), json.into());
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, run_id: &str, context: &RunContext) -> Result<(), CheckpointError> {
        let json = RunCheckpoint::new(context).to_json()?;
        self.entries
            .lock()
            .map_err(|e| CheckpointError::Storage(e.to_string()))?
            .insert(run_id.to_string(), json);
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<RunContext, CheckpointError> {
        let json = self
            .entries
            .lock()
            .map_err(|e| CheckpointError::Storage(e.to_string()))?
            .get(run_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(run_id.to_string()))?;
        Ok(RunCheckpoint::from_json(&json)?.context)
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self
            .entries
            .lock()
            .map_err(|e| CheckpointError::Storage(e.to_string()))?
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// One `<run_id>.json` file per run under a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: &str) -> Result<PathBuf, CheckpointError> {
        let valid = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CheckpointError::InvalidRunId(run_id.to_string()));
        }
        Ok(self.dir.join(format!("{run_id}.json")))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, run_id: &str, context: &RunContext) -> Result<(), CheckpointError> {
        let path = self.path_for(run_id)?;
        let json = RunCheckpoint::new(context).to_json()?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        // Readers never observe a partially written checkpoint.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        tracing::debug!(run_id, path = %path.display(), "Checkpoint saved");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<RunContext, CheckpointError> {
        let path = self.path_for(run_id)?;
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(run_id.to_string()))
            }
            Err(e) => return Err(CheckpointError::Storage(e.to_string())),
        };
        Ok(RunCheckpoint::from_json(&json)?.context)
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(CheckpointError::Storage(e.to_string())),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
