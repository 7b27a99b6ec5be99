//! Lesson memory: the similarity-addressed store behind cross-session learning.
//!
//! Defines the [`MemoryService`] contract consumed by the mission state
//! machine and an in-process implementation scoring lexical cosine
//! similarity. Embedding-backed services live outside this crate and only
//! have to honour the contract: results ordered by descending similarity.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::errors::MemoryError;
use crate::model::{LessonEntry, Platform};

/// Maximum lesson text kept in stored metadata.
pub const LESSON_TEXT_LIMIT: usize = 1000;

/// One similarity hit returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonMatch {
    pub id: String,
    /// Similarity in `[0, 1]`; higher is closer.
    pub similarity: f64,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl LessonMatch {
    fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn platform(&self) -> Option<Platform> {
        self.meta_str("platform").and_then(|p| p.parse().ok())
    }

    pub fn friction_type(&self) -> Option<&str> {
        self.meta_str("friction_type")
    }

    pub fn lesson_text(&self) -> Option<&str> {
        self.meta_str("lesson_text")
    }

    pub fn resolution(&self) -> Option<&str> {
        self.meta_str("resolution")
    }

    pub fn url(&self) -> Option<&str> {
        self.meta_str("url")
    }
}

/// Build the metadata map stored alongside a lesson.
pub fn lesson_metadata(id: &str, lesson: &LessonEntry) -> HashMap<String, Value> {
    let mut meta: HashMap<String, Value> = HashMap::new();
    meta.insert("lesson_id".into(), id.into());
    meta.insert("url".into(), lesson.url.clone().into());
    meta.insert("platform".into(), lesson.platform.as_str().into());
    meta.insert("friction_type".into(), lesson.friction_type.clone().into());
    meta.insert("resolution".into(), lesson.resolution.clone().into());
    meta.insert("timestamp".into(), Utc::now().to_rfc3339().into());
    meta.insert(
        "lesson_text".into(),
        lesson.lesson_text.chars().take(LESSON_TEXT_LIMIT).collect::<String>().into(),
    );
    for (k, v) in &lesson.metadata {
        meta.insert(k.clone(), v.clone());
    }
    meta
}

/// Contract for the vector memory service.
///
/// Implementations are shared across concurrent mission runs and must do
/// their own synchronisation.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Store a lesson, returning its id.
    async fn store(&self, lesson: &LessonEntry) -> Result<String, MemoryError>;

    /// Top-`k` lessons similar to `text`, optionally restricted to a platform,
    /// ordered by descending similarity.
    async fn query(
        &self,
        text: &str,
        platform: Option<Platform>,
        top_k: usize,
    ) -> Result<Vec<LessonMatch>, MemoryError>;
}

/// Every lesson recorded for a target, best matches first.
pub async fn lessons_for_url(
    memory: &dyn MemoryService,
    url: &str,
) -> Result<Vec<LessonMatch>, MemoryError> {
    let hits = memory.query(&format!("lessons for {url}"), None, 50).await?;
    Ok(hits.into_iter().filter(|m| m.url() == Some(url)).collect())
}

/// A stored lesson with its precomputed token vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredLesson {
    pub id: String,
    pub platform: Platform,
    pub metadata: HashMap<String, Value>,
    #[serde(skip)]
    tokens: HashMap<String, f64>,
}

impl StoredLesson {
    pub fn new(id: String, lesson: &LessonEntry) -> Self {
        let metadata = lesson_metadata(&id, lesson);
        Self {
            tokens: token_vector(&lesson.lesson_text),
            id,
            platform: lesson.platform,
            metadata,
        }
    }

    /// Rebuild the token vector after deserialisation.
    pub fn reindex(&mut self) {
        let text = self
            .metadata
            .get("lesson_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.tokens = token_vector(&text);
    }
}

/// Lower-cased alphanumeric token counts.
fn token_vector(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(k, va)| b.get(k).map(|vb| va * vb))
        .sum();
    let norm = |v: &HashMap<String, f64>| v.values().map(|x| x * x).sum::<f64>().sqrt();
    (dot / (norm(a) * norm(b))).clamp(0.0, 1.0)
}

/// In-process lesson store scoring lexical cosine similarity.
pub struct InMemoryLessonStore {
    lessons: Mutex<Vec<StoredLesson>>,
}

impl Default for InMemoryLessonStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLessonStore {
    pub fn new() -> Self {
        Self {
            lessons: Mutex::new(Vec::new()),
        }
    }

    /// Seed from previously stored lessons.
    pub fn from_lessons(lessons: Vec<StoredLesson>) -> Self {
        let lessons = lessons
            .into_iter()
            .map(|mut l| {
                l.reindex();
                l
            })
            .collect();
        Self {
            lessons: Mutex::new(lessons),
        }
    }

    /// Insert with an explicit id, returning the stored record.
    pub fn insert(&self, id: String, lesson: &LessonEntry) -> Result<StoredLesson, MemoryError> {
        let stored = StoredLesson::new(id, lesson);
        let mut guard = self.lessons.lock().map_err(|e| MemoryError::Persistence {
            reason: e.to_string(),
        })?;
        guard.retain(|l| l.id != stored.id);
        guard.push(stored.clone());
        Ok(stored)
    }

    pub fn len(&self) -> usize {
        self.lessons.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronous query used by wrappers that already hold their own I/O.
    pub fn search(
        &self,
        text: &str,
        platform: Option<Platform>,
        top_k: usize,
    ) -> Result<Vec<LessonMatch>, MemoryError> {
        let query = token_vector(text);
        let guard = self.lessons.lock().map_err(|e| MemoryError::Persistence {
            reason: e.to_string(),
        })?;
        let mut hits: Vec<LessonMatch> = guard
            .iter()
            .filter(|l| platform.map_or(true, |p| l.platform == p))
            .map(|l| LessonMatch {
                id: l.id.clone(),
                similarity: cosine(&query, &l.tokens),
                metadata: l.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[async_trait]
impl MemoryService for InMemoryLessonStore {
    async fn store(&self, lesson: &LessonEntry) -> Result<String, MemoryError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert(id.clone(), lesson)?;
        Ok(id)
    }

    async fn query(
        &self,
        text: &str,
        platform: Option<Platform>,
        top_k: usize,
    ) -> Result<Vec<LessonMatch>, MemoryError> {
        self.search(text, platform, top_k)
    }
}
