//! Dispatcher output parsers.
//!
//! The agent dispatcher returns free text that should contain one JSON
//! object. Each parser here is fallible and typed; callers construct the
//! degraded value themselves when parsing fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{ActionKind, FrictionPoint, FrictionSeverity, Platform, Step};

/// Default driver timeout when a script omits `timeout_ms`.
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 10_000;

/// Why dispatcher output could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no JSON object found in output")]
    NoJson,
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("plan contains no steps")]
    EmptyPlan,
    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

/// Locate a JSON object inside free text.
///
/// Prefers a ```` ```json ```` fenced block, then the span from the first `{`
/// to the last `}`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Some(text[json_start..json_start + end].trim());
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Parse the first well-formed JSON object out of `text`.
///
/// When the outer `{…}` span is not valid JSON (prose containing braces on
/// both sides of the payload), every `{` is tried in turn as an object start.
pub fn extract_json_object(text: &str) -> Result<Value, ParseError> {
    let block = extract_json_block(text).ok_or(ParseError::NoJson)?;
    let first_err = match serde_json::from_str::<Value>(block) {
        Ok(v) if v.is_object() => return Ok(v),
        Ok(_) => ParseError::NoJson,
        Err(e) => ParseError::Malformed(e.to_string()),
    };

    for (idx, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        if let Some(Ok(v)) = stream.next() {
            if v.is_object() {
                return Ok(v);
            }
        }
    }
    Err(first_err)
}

// ============================================================================
// Mission plan
// ============================================================================

/// Structured plan returned by the planning role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionPlan {
    #[serde(default)]
    pub mission_name: String,
    #[serde(default)]
    pub mission_description: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub failure_scenarios: Vec<String>,
}

impl MissionPlan {
    /// Degraded plan: one step whose action is the mission objective.
    pub fn fallback(objective: &str) -> Self {
        Self {
            mission_name: "Fallback mission".into(),
            mission_description: objective.to_string(),
            steps: vec![Step::new(objective)],
            success_criteria: Vec::new(),
            failure_scenarios: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawStep {
    action: Option<String>,
    #[serde(default, alias = "target_element")]
    target: Option<String>,
    #[serde(default)]
    validation: Option<String>,
    #[serde(default)]
    cognitive_notes: Option<String>,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn str_field(obj: &Value, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Parse planner output. Steps may be objects or bare strings.
pub fn parse_mission_plan(output: &str) -> Result<MissionPlan, ParseError> {
    let root = extract_json_object(output)?;
    let raw_steps = root
        .get("steps")
        .and_then(Value::as_array)
        .ok_or(ParseError::MissingField("steps"))?;

    let mut steps = Vec::with_capacity(raw_steps.len());
    for raw in raw_steps {
        let step = match raw {
            Value::String(s) => Step::new(s.trim()),
            other => {
                let raw: RawStep = serde_json::from_value(other.clone())
                    .map_err(|e| ParseError::Malformed(e.to_string()))?;
                let action = raw.action.ok_or(ParseError::MissingField("action"))?;
                Step {
                    action,
                    target: raw.target.unwrap_or_default(),
                    validation: raw.validation.unwrap_or_default(),
                    cognitive_notes: raw.cognitive_notes.unwrap_or_default(),
                }
            }
        };
        if !step.action.trim().is_empty() {
            steps.push(step);
        }
    }
    if steps.is_empty() {
        return Err(ParseError::EmptyPlan);
    }

    Ok(MissionPlan {
        mission_name: str_field(&root, "mission_name"),
        mission_description: str_field(&root, "mission_description"),
        steps,
        success_criteria: string_list(root.get("success_criteria")),
        failure_scenarios: string_list(root.get("failure_scenarios")),
    })
}

// ============================================================================
// UX audit
// ============================================================================

/// Findings of the audit role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFindings {
    pub friction_points: Vec<FrictionPoint>,
    pub overall_sentiment: String,
    /// Sentiment in `[0, 1]`.
    pub sentiment_score: f64,
    #[serde(default)]
    pub blocking_issues: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl AuditFindings {
    /// Neutral findings used when audit output cannot be parsed.
    pub fn fallback(reason: &str) -> Self {
        Self {
            friction_points: Vec::new(),
            overall_sentiment: "neutral".into(),
            sentiment_score: 0.5,
            blocking_issues: Vec::new(),
            summary: format!("Audit parsing failed: {reason}"),
        }
    }
}

/// Parse auditor output. Friction points inherit the mission's platform;
/// an unrecognised severity is read as `medium`.
pub fn parse_audit(output: &str, platform: Platform) -> Result<AuditFindings, ParseError> {
    let root = extract_json_object(output)?;
    let now = chrono::Utc::now();

    let friction_points = root
        .get("friction_points")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|fp| fp.is_object())
                .map(|fp| {
                    let resolution = fp
                        .get("recommendation")
                        .or_else(|| fp.get("resolution"))
                        .and_then(Value::as_str)
                        .map(String::from);
                    FrictionPoint {
                        element: str_field(fp, "element"),
                        issue_type: str_field(fp, "issue_type"),
                        severity: str_field(fp, "severity")
                            .parse()
                            .unwrap_or(FrictionSeverity::Medium),
                        persona_impact: str_field(fp, "persona_impact"),
                        platform,
                        timestamp: now,
                        resolution,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let sentiment_score = root
        .get("sentiment_score")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    let overall_sentiment = root
        .get("overall_sentiment")
        .and_then(Value::as_str)
        .unwrap_or("neutral")
        .to_string();

    Ok(AuditFindings {
        friction_points,
        overall_sentiment,
        sentiment_score,
        blocking_issues: string_list(root.get("blocking_issues")),
        summary: str_field(&root, "summary"),
    })
}

// ============================================================================
// Automation script
// ============================================================================

/// One resolved driver action produced by the script role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionScript {
    pub action: ActionKind,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rationale: String,
}

/// Parse script-writer output into a driver action.
pub fn parse_script(output: &str) -> Result<ActionScript, ParseError> {
    let root = extract_json_object(output)?;
    let action_text = root
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField("action"))?;
    let action: ActionKind = action_text
        .parse()
        .map_err(|_| ParseError::UnknownAction(action_text.to_string()))?;

    let target = root
        .get("target")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if target.is_empty() && matches!(action, ActionKind::Click | ActionKind::Type) {
        return Err(ParseError::MissingField("target"));
    }

    let timeout_ms = root
        .get("timeout_ms")
        .and_then(Value::as_u64)
        .filter(|t| *t > 0)
        .unwrap_or(DEFAULT_ACTION_TIMEOUT_MS);

    Ok(ActionScript {
        action,
        target,
        input_text: root
            .get("input_text")
            .and_then(Value::as_str)
            .map(String::from),
        timeout_ms,
        rationale: str_field(&root, "rationale"),
    })
}
