//! Screenshot sink writing PNG files under the state directory.

use std::path::PathBuf;

use async_trait::async_trait;
use coordination::mission::ScreenshotSink;

/// Stores `<dir>/<run_id>/attempt_<n>.png` and returns that path.
#[derive(Debug, Clone)]
pub struct FileScreenshotSink {
    dir: PathBuf,
}

impl FileScreenshotSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ScreenshotSink for FileScreenshotSink {
    async fn store(&self, run_id: &str, attempt: usize, png: &[u8]) -> std::io::Result<String> {
        let run_dir = self.dir.join(run_id);
        tokio::fs::create_dir_all(&run_dir).await?;
        let path = run_dir.join(format!("attempt_{attempt:03}.png"));
        tokio::fs::write(&path, png).await?;
        Ok(path.display().to_string())
    }
}
