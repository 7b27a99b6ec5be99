use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coordination::memory::{lessons_for_url, MemoryService};
use coordination::mission::{validate_context, CheckpointStore, RunOutcome};
use coordination::model::{Mission, Platform};
use mission_agents::config::PilotConfig;
use mission_agents::runtime;
use mission_agents::telemetry::{self, RunSummary, RUN_LOG};
use tracing::info;

/// Persona-driven cognitive usability missions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to mission-agents.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON-formatted logs
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new mission
    Run {
        /// Target URL (web) or activity identifier (mobile)
        #[arg(long)]
        url: String,
        /// What the persona is trying to do
        #[arg(long)]
        objective: String,
        #[arg(long, default_value = "web")]
        platform: Platform,
        #[arg(long, default_value = "senior_casual")]
        persona: String,
        /// Reuse a caller-chosen run id instead of a fresh UUID
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Continue a paused mission with human guidance
    Resume {
        run_id: String,
        #[arg(long)]
        feedback: String,
    },
    /// Show a checkpointed run, or list runs when no id is given
    Status { run_id: Option<String> },
    /// Query stored lessons
    Lessons {
        /// Every lesson recorded for this target
        #[arg(long, conflicts_with = "query")]
        url: Option<String>,
        /// Free-text similarity query
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        platform: Option<Platform>,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json_logs);

    let config = PilotConfig::load(cli.config.as_deref())?;
    info!(
        llm = %config.llm.url,
        model = %config.llm.model,
        state_dir = %config.state_dir.display(),
        "Mission pilot starting"
    );

    match cli.command {
        Command::Run {
            url,
            objective,
            platform,
            persona,
            run_id,
        } => {
            let machine = runtime::build_machine(&config).await?;
            let mission = Mission::new(objective, url, platform, persona);
            let outcome = machine.run(mission, run_id).await.context("Mission run failed")?;
            finish(&config, &outcome)?;
        }
        Command::Resume { run_id, feedback } => {
            let machine = runtime::build_machine(&config).await?;
            let outcome = machine
                .resume(&run_id, &feedback)
                .await
                .with_context(|| format!("Failed to resume run {run_id}"))?;
            finish(&config, &outcome)?;
        }
        Command::Status { run_id } => status(&config, run_id.as_deref()).await?,
        Command::Lessons {
            url,
            query,
            platform,
            top_k,
        } => {
            let memory = runtime::build_memory(&config).await?;
            let hits = match (url, query) {
                (Some(url), _) => lessons_for_url(memory.as_ref(), &url).await?,
                (None, Some(q)) => memory.query(&q, platform, top_k).await?,
                (None, None) => anyhow::bail!("pass --url or --query"),
            };
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
    }
    Ok(())
}

fn finish(config: &PilotConfig, outcome: &RunOutcome) -> Result<()> {
    telemetry::append_run_summary(&RunSummary::from_outcome(outcome), &config.reports_dir);
    match outcome {
        RunOutcome::Completed { report, .. } => {
            let (md, json) = telemetry::write_report(report, &config.reports_dir)?;
            println!("{}", report.render_markdown());
            println!("Report written to {} and {}", md.display(), json.display());
        }
        RunOutcome::Suspended { run_id, hitl } => {
            println!("{}", serde_json::to_string_pretty(hitl)?);
            println!("Mission {run_id} is waiting for guidance: {}", hitl.recommendation);
            println!("Resume with: mission-agents resume {run_id} --feedback \"...\"");
        }
    }
    Ok(())
}

async fn status(config: &PilotConfig, run_id: Option<&str>) -> Result<()> {
    let store = runtime::checkpoint_store(config);
    let Some(run_id) = run_id else {
        for id in store.list().await? {
            println!("{id}");
        }
        if let Ok(runs) = telemetry::read_run_log(&config.reports_dir.join(RUN_LOG)) {
            for run in runs.iter().rev().take(10) {
                println!(
                    "{}  {}  {}  score={:.2}",
                    run.timestamp.format("%Y-%m-%d %H:%M"),
                    run.run_id,
                    run.outcome,
                    run.frustration_score
                );
            }
        }
        return Ok(());
    };

    let ctx = store
        .load(run_id)
        .await
        .with_context(|| format!("No checkpoint for run {run_id}"))?;
    let summary = ctx.engine.summary();
    println!("run:         {}", ctx.run_id);
    println!("state:       {}", ctx.state());
    println!("target:      {} ({})", ctx.mission.target, ctx.mission.platform);
    println!("persona:     {}", ctx.persona_id);
    println!("steps:       {}/{}", ctx.current_step_index, ctx.steps().len());
    println!("failures:    {}", ctx.failure_count);
    println!("attempts:    {} ({:.1}% ok)", ctx.attempts.len(), ctx.success_rate());
    println!("frustration: {:.3} (latched: {})", summary.current_score, summary.escalation_latched);
    println!("incidents:   {}", ctx.incidents.len());
    println!("integrity:   {:?}", validate_context(&ctx));
    Ok(())
}
