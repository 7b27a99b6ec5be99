//! Task builders for the three generation roles.
//!
//! Each builder turns run state into an [`AgentTask`]: a bounded text
//! description plus a JSON context bundle. The expected output shape is
//! spelled out in the description so the parsers in
//! [`parse`](crate::mission::parse) can rely on it.

use std::fmt::Write as _;

use serde_json::json;

use crate::memory::LessonMatch;
use crate::mission::collaborators::{AgentRole, AgentTask};
use crate::mission::context::RunContext;
use crate::model::{ActionAttempt, PersonaProfile, Step, UiSchema};

/// Keep at most `limit` characters (not bytes) of `text`.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn persona_block(persona: &PersonaProfile) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "- Age: {}", persona.age);
    let _ = writeln!(s, "- Tech literacy: {}", persona.tech_literacy);
    let _ = writeln!(s, "- Eyesight: {}", persona.eyesight);
    let _ = writeln!(s, "- Cognitive load tolerance: {}", persona.cognitive_load);
    let _ = writeln!(s, "- Preferred navigation: {}", persona.preferred_navigation);
    let _ = writeln!(s, "- Reading level: {}", persona.reading_level);
    if !persona.attention_rules.is_empty() {
        let _ = writeln!(s, "- Attention rules:");
        for rule in &persona.attention_rules {
            let _ = writeln!(s, "  * {rule}");
        }
    }
    s
}

fn persona_context(ctx: &RunContext) -> serde_json::Value {
    json!({
        "run_id": ctx.run_id,
        "persona_id": ctx.persona_id,
        "persona": ctx.persona,
        "platform": ctx.mission.platform,
        "target": ctx.mission.target,
    })
}

/// Planning task: objective, persona and a bounded page-context prefix.
pub fn plan_task(ctx: &RunContext, page_context_chars: usize) -> AgentTask {
    let persona = ctx.persona.clone().unwrap_or_else(PersonaProfile::senior_casual);
    let page = truncate_chars(&ctx.page.markdown, page_context_chars);

    let mut d = String::new();
    let _ = writeln!(
        d,
        "Break the objective into atomic, independently verifiable steps for this persona.\n"
    );
    let _ = writeln!(d, "Objective: {}", ctx.mission.objective);
    let _ = writeln!(d, "Target ({}): {}\n", ctx.mission.platform, ctx.mission.target);
    let _ = writeln!(d, "Persona:\n{}", persona_block(&persona));
    if !page.is_empty() {
        let _ = writeln!(d, "Page context:\n{page}\n");
    }
    let _ = writeln!(
        d,
        "Return a single JSON object:\n\
         {{\"mission_name\": str, \"mission_description\": str,\n \
         \"steps\": [{{\"action\": str, \"target\": str, \"validation\": str, \"cognitive_notes\": str}}],\n \
         \"success_criteria\": [str], \"failure_scenarios\": [str]}}"
    );

    AgentTask {
        role: AgentRole::Planner,
        description: d,
        context: persona_context(ctx),
    }
}

fn schema_digest(schema: &UiSchema) -> String {
    if schema.is_empty() {
        return "(no interactive elements mapped)\n".into();
    }
    let mut s = String::new();
    for el in &schema.interactive_elements {
        let label = el
            .aria_label
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(el.text.as_str());
        let _ = write!(s, "- <{}> \"{}\"", el.tag, label);
        if let Some(id) = &el.id {
            let _ = write!(s, " #{id}");
        }
        if let Some(t) = &el.element_type {
            let _ = write!(s, " type={t}");
        }
        s.push('\n');
    }
    if !schema.navigation.is_empty() {
        let _ = writeln!(s, "Navigation: {}", schema.navigation.join(" | "));
    }
    if !schema.headings.is_empty() {
        let _ = writeln!(s, "Headings: {}", schema.headings.join(" | "));
    }
    s
}

/// Audit task: page content, schema and persona.
pub fn audit_task(ctx: &RunContext, page_context_chars: usize) -> AgentTask {
    let persona = ctx.persona.clone().unwrap_or_else(PersonaProfile::senior_casual);

    let mut d = String::new();
    let _ = writeln!(
        d,
        "Audit this {} interface for friction this persona would experience: \
         visibility, cognitive load, interaction and accessibility.\n",
        ctx.mission.platform
    );
    let _ = writeln!(d, "Persona:\n{}", persona_block(&persona));
    let _ = writeln!(d, "Interactive elements:\n{}", schema_digest(&ctx.schema));
    let page = truncate_chars(&ctx.page.markdown, page_context_chars);
    if !page.is_empty() {
        let _ = writeln!(d, "Page content:\n{page}\n");
    }
    let _ = writeln!(
        d,
        "Return a single JSON object:\n\
         {{\"friction_points\": [{{\"element\": str, \"issue_type\": \"visibility|cognitive_load|interaction|accessibility\",\n \
         \"severity\": \"low|medium|high|critical\", \"persona_impact\": str, \"recommendation\": str}}],\n \
         \"overall_sentiment\": \"positive|neutral|negative|critical\", \"sentiment_score\": 0.0-1.0,\n \
         \"blocking_issues\": [str], \"summary\": str}}"
    );

    AgentTask {
        role: AgentRole::Auditor,
        description: d,
        context: persona_context(ctx),
    }
}

fn lesson_line(lesson: &LessonMatch) -> String {
    format!(
        "- [{}{}] {} => {}",
        lesson.platform().map_or("?", |p| p.as_str()),
        lesson
            .friction_type()
            .map(|t| format!("/{t}"))
            .unwrap_or_default(),
        lesson.lesson_text().unwrap_or("(no text)"),
        lesson.resolution().unwrap_or("(no resolution)")
    )
}

fn failure_line(attempt: &ActionAttempt) -> String {
    format!(
        "- {} on '{}': {}",
        attempt.action_type,
        attempt.target,
        attempt.error_message.as_deref().unwrap_or("failed")
    )
}

/// Script task: current step, schema, audit summary, recent lessons and
/// recent failures.
pub fn script_task(
    ctx: &RunContext,
    step: &Step,
    max_lessons: usize,
    max_failures: usize,
) -> AgentTask {
    let lessons: Vec<&LessonMatch> = ctx.lessons.iter().take(max_lessons).collect();
    let failures = ctx.recent_failures(max_failures);

    let mut d = String::new();
    let _ = writeln!(
        d,
        "Produce the single next {} automation action for this step.\n",
        ctx.mission.platform
    );
    let _ = writeln!(
        d,
        "Step {}/{}: {}",
        ctx.current_step_index + 1,
        ctx.steps().len(),
        step.describe()
    );
    if !step.validation.is_empty() {
        let _ = writeln!(d, "Success check: {}", step.validation);
    }
    if !step.cognitive_notes.is_empty() {
        let _ = writeln!(d, "Persona notes: {}", step.cognitive_notes);
    }
    let _ = writeln!(d, "\nInteractive elements:\n{}", schema_digest(&ctx.schema));
    if let Some(audit) = &ctx.audit {
        if !audit.summary.is_empty() {
            let _ = writeln!(d, "Audit summary: {}\n", audit.summary);
        }
    }
    if !lessons.is_empty() {
        let _ = writeln!(d, "Lessons from earlier runs (most relevant first):");
        for lesson in &lessons {
            let _ = writeln!(d, "{}", lesson_line(lesson));
        }
        d.push('\n');
    }
    if !failures.is_empty() {
        let _ = writeln!(d, "Recent failed attempts (avoid repeating them):");
        for attempt in &failures {
            let _ = writeln!(d, "{}", failure_line(attempt));
        }
        d.push('\n');
    }
    let _ = writeln!(
        d,
        "Return a single JSON object:\n\
         {{\"action\": \"click|type|scroll|wait|screenshot\", \"target\": str,\n \
         \"input_text\": str (type only), \"timeout_ms\": int, \"rationale\": str}}"
    );

    let mut context = persona_context(ctx);
    context["step_index"] = json!(ctx.current_step_index);
    context["failure_count"] = json!(ctx.failure_count);
    context["lesson_ids"] = json!(lessons.iter().map(|l| l.id.as_str()).collect::<Vec<_>>());

    AgentTask {
        role: AgentRole::ScriptWriter,
        description: d,
        context,
    }
}
