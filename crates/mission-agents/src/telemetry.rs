//! Logging setup and run telemetry sinks.
//!
//! Two output sinks per finished run:
//! - `report_<persona>_<platform>_<stamp>.{md,json}` in the reports directory
//! - `runs.jsonl` in the reports directory: append-only one-line run summaries

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use coordination::mission::{MissionReport, RunOutcome};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Append-only run log file name.
pub const RUN_LOG: &str = "runs.jsonl";

/// Initialise the global subscriber. `RUST_LOG` wins; default is `info`.
pub fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialised: {e}");
    }
}

/// One line of `runs.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    /// `completed` or `suspended`.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default)]
    pub hitl_interventions: u32,
    pub frustration_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl RunSummary {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed { run_id, report } => Self {
                run_id: run_id.clone(),
                outcome: "completed".into(),
                persona: Some(report.persona.clone()),
                platform: Some(report.platform.to_string()),
                url: Some(report.url.clone()),
                success_rate: Some(report.success_rate),
                hitl_interventions: report.hitl_interventions,
                frustration_score: report.frustration.current_score,
                timestamp: Utc::now(),
            },
            RunOutcome::Suspended { run_id, hitl } => Self {
                run_id: run_id.clone(),
                outcome: "suspended".into(),
                persona: None,
                platform: None,
                url: None,
                success_rate: None,
                hitl_interventions: 0,
                frustration_score: hitl.frustration_score,
                timestamp: Utc::now(),
            },
        }
    }
}

/// `report_<persona>_<platform>_<YYYYmmdd_HHMMSS>` without extension.
pub fn report_stem(report: &MissionReport) -> String {
    let persona: String = report
        .persona
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!(
        "report_{}_{}_{}",
        persona,
        report.platform,
        report.generated_at.format("%Y%m%d_%H%M%S")
    )
}

/// Write the Markdown and JSON renderings; returns both paths.
pub fn write_report(report: &MissionReport, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create reports dir {}", dir.display()))?;
    let stem = report_stem(report);
    let md_path = dir.join(format!("{stem}.md"));
    let json_path = dir.join(format!("{stem}.json"));

    std::fs::write(&md_path, report.render_markdown())
        .with_context(|| format!("Failed to write {}", md_path.display()))?;
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(&json_path, json)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    info!(markdown = %md_path.display(), json = %json_path.display(), "Wrote mission report");
    Ok((md_path, json_path))
}

/// Append a run summary to `runs.jsonl`. Failures only warn.
pub fn append_run_summary(summary: &RunSummary, dir: &Path) {
    let path = dir.join(RUN_LOG);
    match serde_json::to_string(summary) {
        Ok(json) => {
            use std::io::Write;
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("Failed to create reports dir: {e}");
                return;
            }
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append run summary: {e}");
                    }
                }
                Err(e) => warn!("Failed to open run log: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize run summary: {e}"),
    }
}

/// Read every summary from a `runs.jsonl` file, oldest first.
pub fn read_run_log(path: &Path) -> std::io::Result<Vec<RunSummary>> {
    let text = std::fs::read_to_string(path)?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            serde_json::from_str(l)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
        .collect()
}
