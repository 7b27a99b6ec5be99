//! Final mission report: structured for JSON, rendered for humans.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::FrustrationSummary;
use crate::mission::context::RunContext;
use crate::model::{FrictionPoint, Platform};

/// Cross-platform lesson surfaced during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossPlatformInsight {
    pub lesson_id: String,
    pub source_platform: Option<Platform>,
    pub similarity: f64,
    pub friction_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionReport {
    pub run_id: String,
    pub url: String,
    pub platform: Platform,
    pub persona: String,
    pub objective: String,
    #[serde(default)]
    pub mission_name: String,
    pub sentiment_score: f64,
    #[serde(default)]
    pub audit_summary: String,
    /// Most severe first.
    pub friction_points: Vec<FrictionPoint>,
    pub steps_completed: usize,
    pub total_steps: usize,
    pub failure_count: u32,
    pub total_attempts: usize,
    pub successful_attempts: usize,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
    pub hitl_interventions: u32,
    pub lessons_retrieved: usize,
    #[serde(default)]
    pub cross_platform: Option<CrossPlatformInsight>,
    pub frustration: FrustrationSummary,
    pub incidents: usize,
    pub generated_at: DateTime<Utc>,
}

impl MissionReport {
    /// Aggregate a finished (or abandoned) run.
    pub fn from_context(ctx: &RunContext) -> Self {
        let mut friction_points = ctx.friction_points.clone();
        // Stable sort keeps audit order within a severity.
        friction_points.sort_by(|a, b| b.severity.cmp(&a.severity));

        let cross_platform = ctx.cross_platform_hit.as_ref().map(|hit| CrossPlatformInsight {
            lesson_id: hit.id.clone(),
            source_platform: hit.platform(),
            similarity: hit.similarity,
            friction_type: hit.friction_type().map(String::from),
        });

        Self {
            run_id: ctx.run_id.clone(),
            url: ctx.mission.target.clone(),
            platform: ctx.mission.platform,
            persona: ctx.persona_id.clone(),
            objective: ctx.mission.objective.clone(),
            mission_name: ctx
                .plan
                .as_ref()
                .map(|p| p.mission_name.clone())
                .unwrap_or_default(),
            sentiment_score: ctx.sentiment_score.unwrap_or(0.5),
            audit_summary: ctx.audit.as_ref().map(|a| a.summary.clone()).unwrap_or_default(),
            friction_points,
            steps_completed: ctx.current_step_index,
            total_steps: ctx.steps().len(),
            failure_count: ctx.failure_count,
            total_attempts: ctx.attempts.len(),
            successful_attempts: ctx.successful_attempts(),
            success_rate: ctx.success_rate(),
            hitl_interventions: ctx.interventions,
            lessons_retrieved: ctx.lessons_retrieved,
            cross_platform,
            frustration: ctx.engine.summary(),
            incidents: ctx.incidents.len(),
            generated_at: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_steps > 0 && self.steps_completed >= self.total_steps
    }

    /// Success rate formatted to one decimal, e.g. `66.7%`.
    pub fn success_rate_label(&self) -> String {
        format!("{:.1}%", self.success_rate)
    }

    pub fn render_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Cognitive Usability Mission Report\n");
        let _ = writeln!(md, "**URL**: {}", self.url);
        let _ = writeln!(md, "**Platform**: {}", self.platform);
        let _ = writeln!(md, "**Persona**: {}", self.persona);
        let _ = writeln!(md, "**Mission**: {}", self.objective);
        let _ = writeln!(md, "**Run**: {}\n", self.run_id);

        let _ = writeln!(md, "## Executive Summary");
        let _ = writeln!(md, "- **Sentiment Score**: {:.2}/1.0", self.sentiment_score);
        let _ = writeln!(md, "- **Friction Points Identified**: {}", self.friction_points.len());
        let _ = writeln!(
            md,
            "- **Steps Completed**: {}/{}",
            self.steps_completed, self.total_steps
        );
        let _ = writeln!(md, "- **HITL Interventions**: {}", self.hitl_interventions);
        if !self.audit_summary.is_empty() {
            let _ = writeln!(md, "- **Audit**: {}", self.audit_summary);
        }

        let _ = writeln!(md, "\n## Friction Points\n");
        if self.friction_points.is_empty() {
            let _ = writeln!(md, "_None identified._\n");
        }
        for fp in &self.friction_points {
            let _ = writeln!(md, "### {}: {}", fp.severity.as_str().to_uppercase(), fp.element);
            let _ = writeln!(md, "- **Issue Type**: {}", fp.issue_type);
            let _ = writeln!(md, "- **Persona Impact**: {}", fp.persona_impact);
            let _ = writeln!(
                md,
                "- **Resolution**: {}\n",
                fp.resolution.as_deref().unwrap_or("Pending")
            );
        }

        let _ = writeln!(md, "## Memory Insights");
        let _ = writeln!(md, "- **Lessons Retrieved**: {}", self.lessons_retrieved);
        match &self.cross_platform {
            Some(hit) => {
                let _ = writeln!(
                    md,
                    "- **Cross-Platform Issues**: Yes ({} on {}, similarity {:.2})",
                    hit.friction_type.as_deref().unwrap_or("unknown"),
                    hit.source_platform.map_or("unknown", |p| p.as_str()),
                    hit.similarity
                );
            }
            None => {
                let _ = writeln!(md, "- **Cross-Platform Issues**: No");
            }
        }

        let _ = writeln!(md, "\n## Execution Summary");
        let _ = writeln!(md, "- **Total Attempts**: {}", self.total_attempts);
        let _ = writeln!(md, "- **Successful Attempts**: {}", self.successful_attempts);
        let _ = writeln!(md, "- **Success Rate**: {}", self.success_rate_label());
        let _ = writeln!(md, "- **Open Failures**: {}", self.failure_count);
        if self.incidents > 0 {
            let _ = writeln!(md, "- **Recovered Incidents**: {}", self.incidents);
        }

        let _ = writeln!(md, "\n## Frustration Summary");
        let _ = writeln!(md, "- **Final Score**: {:.2}", self.frustration.current_score);
        let _ = writeln!(md, "- **Total Events**: {}", self.frustration.total_events);
        let _ = writeln!(
            md,
            "- **Escalation Latched**: {}",
            if self.frustration.escalation_latched { "Yes" } else { "No" }
        );
        md
    }
}
