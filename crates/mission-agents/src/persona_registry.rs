//! Persona registry: built-in profiles, optionally extended from a JSON file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use coordination::mission::PersonaSource;
use coordination::model::PersonaProfile;
use tracing::info;

fn profile(
    age: u32,
    tech_literacy: &str,
    eyesight: &str,
    cognitive_load: &str,
    preferred_navigation: &str,
    reading_level: &str,
    attention_rules: &[&str],
) -> PersonaProfile {
    PersonaProfile {
        age,
        tech_literacy: tech_literacy.into(),
        eyesight: eyesight.into(),
        cognitive_load: cognitive_load.into(),
        preferred_navigation: preferred_navigation.into(),
        reading_level: reading_level.into(),
        attention_rules: attention_rules.iter().map(|r| r.to_string()).collect(),
    }
}

/// The four personas every installation knows.
pub fn builtin_personas() -> HashMap<String, PersonaProfile> {
    let mut personas = HashMap::new();
    personas.insert(
        PersonaProfile::DEFAULT_ID.to_string(),
        PersonaProfile::senior_casual(),
    );
    personas.insert(
        "middle_age_moderate".to_string(),
        profile(
            45,
            "moderate",
            "normal with reading glasses",
            "moderate tolerance",
            "search first, then menus",
            "standard",
            &[
                "Scans headings before reading body text",
                "Expects familiar e-commerce patterns",
            ],
        ),
    );
    personas.insert(
        "young_power_user".to_string(),
        profile(
            24,
            "high",
            "normal",
            "high tolerance",
            "gestures and shortcuts",
            "skims",
            &[
                "Skips onboarding and tooltips",
                "Abandons slow pages within seconds",
            ],
        ),
    );
    personas.insert(
        "accessibility_focused".to_string(),
        profile(
            52,
            "moderate",
            "low vision (uses screen magnifier)",
            "low tolerance",
            "keyboard and screen reader",
            "plain language",
            &[
                "Relies on labels and ARIA names, not colour",
                "Needs visible focus indicators",
                "Cannot use targets smaller than 44px",
            ],
        ),
    );
    personas
}

/// In-process persona source.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: HashMap<String, PersonaProfile>,
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self {
            personas: builtin_personas(),
        }
    }
}

impl PersonaRegistry {
    /// Built-ins, overlaid with `{id: PersonaProfile}` entries from `path`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut registry = Self::default();
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read personas {}", path.display()))?;
            let extra: HashMap<String, PersonaProfile> = serde_json::from_str(&text)
                .with_context(|| format!("Invalid personas file {}", path.display()))?;
            info!(count = extra.len(), path = %path.display(), "Loaded persona overrides");
            registry.personas.extend(extra);
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&PersonaProfile> {
        self.personas.get(id)
    }

    /// Sorted persona identifiers.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.personas.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl PersonaSource for PersonaRegistry {
    async fn load(&self, persona_id: &str) -> Option<PersonaProfile> {
        self.get(persona_id).cloned()
    }
}
