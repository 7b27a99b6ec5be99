//! Cross-platform correlation: friction seen on web likely recurs on mobile.
//!
//! Queries the memory service restricted to the *opposite* platform and
//! confirms a hit only when the best match is strictly above the similarity
//! threshold. A hit is a pre-emptive hint for script generation, not an
//! observed failure, so it never becomes a frustration event.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::memory::store::{LessonMatch, MemoryService};
use crate::model::Platform;

/// Correlator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// Top similarity must be strictly greater than this.
    pub similarity_threshold: f64,
    /// Candidates fetched from the opposite platform.
    pub top_k: usize,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrossPlatformCorrelator {
    config: CorrelatorConfig,
}

impl CrossPlatformCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CorrelatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    /// Query text used against the opposite platform.
    pub fn query_text(target: &str, element_description: &str) -> String {
        format!("friction on {target} with {element_description}")
    }

    /// Apply the threshold rule to candidates already ordered by similarity.
    pub fn confirm(&self, candidates: Vec<LessonMatch>) -> Option<LessonMatch> {
        candidates
            .into_iter()
            .next()
            .filter(|top| top.similarity > self.config.similarity_threshold)
    }

    /// Look for a confirmed friction signal recorded on the other platform.
    ///
    /// Memory failures degrade to `None`.
    pub async fn correlate(
        &self,
        memory: &dyn MemoryService,
        target: &str,
        element_description: &str,
        current: Platform,
    ) -> Option<LessonMatch> {
        let other = current.opposite();
        let query = Self::query_text(target, element_description);
        let candidates = match memory.query(&query, Some(other), self.config.top_k).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, platform = %other, "Cross-platform lookup failed, skipping");
                return None;
            }
        };

        let hit = self.confirm(candidates);
        if let Some(ref m) = hit {
            info!(
                platform = %other,
                similarity = m.similarity,
                friction_type = m.friction_type().unwrap_or("unknown"),
                "Cross-platform friction confirmed"
            );
        }
        hit
    }
}
