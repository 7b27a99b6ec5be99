//! Runtime configuration for the mission pilot.
//!
//! Precedence, lowest to highest: built-in defaults, an optional TOML file,
//! then `PILOT_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use coordination::escalation::EscalationConfig;
use coordination::mission::MachineConfig;
use serde::Deserialize;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "mission-agents.toml";

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmEndpoint {
    /// Base URL including the version prefix, e.g. `http://localhost:8080/v1`.
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Upper bound on the task text sent per request.
    pub max_task_chars: usize,
    pub temperature: f32,
}

impl Default for LlmEndpoint {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key: None,
            timeout_secs: 120,
            max_task_chars: 12_000,
            temperature: 0.2,
        }
    }
}

/// Escalation tuning as it appears in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EscalationSettings {
    pub threshold: f64,
    pub max_retries: u32,
    pub friction_weight: f64,
    pub timeout_weight: f64,
    pub error_weight: f64,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        let d = EscalationConfig::default();
        Self {
            threshold: d.threshold,
            max_retries: d.max_retries,
            friction_weight: d.friction_weight,
            timeout_weight: d.timeout_weight,
            error_weight: d.error_weight,
        }
    }
}

impl EscalationSettings {
    pub fn to_config(&self) -> EscalationConfig {
        EscalationConfig {
            threshold: self.threshold,
            max_retries: self.max_retries,
            friction_weight: self.friction_weight,
            timeout_weight: self.timeout_weight,
            error_weight: self.error_weight,
        }
    }
}

/// Top-level pilot configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub llm: LlmEndpoint,
    /// Remote memory service; `None` uses the local JSONL lesson store.
    pub memory_url: Option<String>,
    /// Automation driver command line; `None` disables execution.
    pub driver_cmd: Option<String>,
    /// Checkpoints, local lessons and screenshots live here.
    pub state_dir: PathBuf,
    pub reports_dir: PathBuf,
    /// Extra personas (JSON object keyed by persona id).
    pub personas_file: Option<PathBuf>,
    pub scout_timeout_secs: u64,
    pub escalation: EscalationSettings,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            llm: LlmEndpoint::default(),
            memory_url: None,
            driver_cmd: None,
            state_dir: PathBuf::from(".mission-state"),
            reports_dir: PathBuf::from("reports"),
            personas_file: None,
            scout_timeout_secs: 30,
            escalation: EscalationSettings::default(),
        }
    }
}

impl PilotConfig {
    /// Load from `path` (or the default file if present) and apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `PILOT_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("PILOT_LLM_URL") {
            self.llm.url = v;
        }
        if let Some(v) = lookup("PILOT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("PILOT_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("PILOT_MEMORY_URL") {
            self.memory_url = Some(v);
        }
        if let Some(v) = lookup("PILOT_DRIVER_CMD") {
            self.driver_cmd = Some(v);
        }
        if let Some(v) = lookup("PILOT_STATE_DIR") {
            self.state_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PILOT_REPORTS_DIR") {
            self.reports_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PILOT_PERSONAS") {
            self.personas_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PILOT_HITL_THRESHOLD") {
            self.escalation.threshold = v
                .parse()
                .with_context(|| format!("PILOT_HITL_THRESHOLD is not a number: {v}"))?;
        }
        if let Some(v) = lookup("PILOT_MAX_RETRIES") {
            self.escalation.max_retries = v
                .parse()
                .with_context(|| format!("PILOT_MAX_RETRIES is not an integer: {v}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.escalation
            .to_config()
            .validate()
            .context("Invalid escalation settings")?;
        if self.llm.max_task_chars == 0 {
            anyhow::bail!("llm.max_task_chars must be positive");
        }
        Ok(())
    }

    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            escalation: self.escalation.to_config(),
            ..MachineConfig::default()
        }
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.state_dir.join("runs")
    }

    pub fn lessons_file(&self) -> PathBuf {
        self.state_dir.join("lessons.jsonl")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.state_dir.join("screenshots")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PilotConfig::default();
        config.validate().unwrap();
        assert_eq!(config.llm.max_task_chars, 12_000);
        assert_eq!(config.escalation.threshold, 0.75);
        assert_eq!(config.machine_config().escalation.max_retries, 3);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = PilotConfig::from_toml(
            r#"
            memory_url = "http://memory:9000"
            [llm]
            model = "local-planner"
            [escalation]
            threshold = 0.6
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "local-planner");
        assert_eq!(config.llm.url, "http://localhost:8080/v1");
        assert_eq!(config.memory_url.as_deref(), Some("http://memory:9000"));
        assert_eq!(config.escalation.threshold, 0.6);
        assert_eq!(config.escalation.max_retries, 3);
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("PILOT_LLM_MODEL", "env-model"),
            ("PILOT_MAX_RETRIES", "5"),
            ("PILOT_DRIVER_CMD", "node driver.js --headless"),
        ]
        .into_iter()
        .collect();
        let mut config = PilotConfig::from_toml("[llm]\nmodel = \"file-model\"").unwrap();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.llm.model, "env-model");
        assert_eq!(config.escalation.max_retries, 5);
        assert_eq!(config.driver_cmd.as_deref(), Some("node driver.js --headless"));
    }

    #[test]
    fn test_invalid_env_and_weights_rejected() {
        let mut config = PilotConfig::default();
        assert!(config
            .apply_env(|k| (k == "PILOT_HITL_THRESHOLD").then(|| "high".to_string()))
            .is_err());

        let mut config = PilotConfig::default();
        config.escalation.error_weight = 0.9;
        assert!(config.validate().is_err());
    }
}
