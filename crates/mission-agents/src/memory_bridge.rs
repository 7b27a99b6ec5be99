//! Memory service adapters: a remote HTTP client and a local JSONL store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use coordination::memory::{InMemoryLessonStore, LessonMatch, MemoryError, MemoryService, StoredLesson};
use coordination::model::{LessonEntry, Platform};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Lesson id: blake3 over `url|platform|category|timestamp`, first 16 hex chars.
pub fn lesson_id(lesson: &LessonEntry, timestamp: &str) -> String {
    let key = format!(
        "{}|{}|{}|{}",
        lesson.url, lesson.platform, lesson.friction_type, timestamp
    );
    blake3::hash(key.as_bytes()).to_hex()[..16].to_string()
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Debug, Serialize)]
struct StoreRequest<'a> {
    lesson: &'a LessonEntry,
}

#[derive(Debug, Deserialize)]
struct StoreResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform: Option<Platform>,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<LessonMatch>,
}

/// Client for a remote embedding-backed memory service.
///
/// `POST {base}/lessons` with `{"lesson": …}` answers `{"id": …}`;
/// `POST {base}/query` with `{"text", "platform"?, "top_k"}` answers
/// `{"matches": [LessonMatch]}`.
pub struct HttpMemoryService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpMemoryService {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, MemoryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MemoryError::Unavailable {
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, MemoryError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MemoryError::Unavailable {
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(MemoryError::Unavailable {
                reason: format!("{url} returned HTTP {}", response.status()),
            });
        }
        response.json().await.map_err(|e| MemoryError::Malformed {
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MemoryService for HttpMemoryService {
    async fn store(&self, lesson: &LessonEntry) -> Result<String, MemoryError> {
        let resp: StoreResponse = self.post("lessons", &StoreRequest { lesson }).await?;
        debug!(id = %resp.id, "Lesson stored remotely");
        Ok(resp.id)
    }

    async fn query(
        &self,
        text: &str,
        platform: Option<Platform>,
        top_k: usize,
    ) -> Result<Vec<LessonMatch>, MemoryError> {
        let resp: QueryResponse = self
            .post(
                "query",
                &QueryRequest {
                    text,
                    platform,
                    top_k,
                },
            )
            .await?;
        let mut matches = resp.matches;
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(top_k);
        Ok(matches)
    }
}

// ============================================================================
// Local JSONL store
// ============================================================================

/// Append-only JSONL lesson log indexed in memory.
pub struct FileLessonStore {
    path: PathBuf,
    index: InMemoryLessonStore,
}

impl FileLessonStore {
    /// Open `path`, replaying every readable line. Unreadable lines are skipped.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        let mut lessons = Vec::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                for (n, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
                    match serde_json::from_str::<StoredLesson>(line) {
                        Ok(lesson) => lessons.push(lesson),
                        Err(e) => warn!(line = n + 1, error = %e, "Skipping unreadable lesson"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(MemoryError::Persistence {
                    reason: format!("{}: {e}", path.display()),
                })
            }
        }
        info!(count = lessons.len(), path = %path.display(), "Lesson store opened");
        Ok(Self {
            path,
            index: InMemoryLessonStore::from_lessons(lessons),
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    async fn append(&self, stored: &StoredLesson) -> Result<(), MemoryError> {
        let persist = |e: std::io::Error| MemoryError::Persistence {
            reason: format!("{}: {e}", self.path.display()),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(persist)?;
        }
        let mut line = serde_json::to_string(stored).map_err(|e| MemoryError::Persistence {
            reason: e.to_string(),
        })?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(persist)?;
        file.write_all(line.as_bytes()).await.map_err(persist)?;
        file.flush().await.map_err(persist)
    }
}

#[async_trait]
impl MemoryService for FileLessonStore {
    async fn store(&self, lesson: &LessonEntry) -> Result<String, MemoryError> {
        let id = lesson_id(lesson, &Utc::now().to_rfc3339());
        let stored = self.index.insert(id.clone(), lesson)?;
        self.append(&stored).await?;
        Ok(id)
    }

    async fn query(
        &self,
        text: &str,
        platform: Option<Platform>,
        top_k: usize,
    ) -> Result<Vec<LessonMatch>, MemoryError> {
        self.index.search(text, platform, top_k)
    }
}
