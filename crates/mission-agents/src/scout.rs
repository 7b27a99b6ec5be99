//! HTTP page scout.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use coordination::mission::{PageScout, ScoutError};
use coordination::model::{PageSnapshot, Platform};
use regex::Regex;
use tracing::debug;

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)>")
        .expect("SCRIPT_STYLE_RE regex should compile")
});
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<h([1-6])\b[^>]*>").expect("HEADING_RE regex should compile")
});
static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(p|div|li|br|tr|section|article|header|footer|nav|form|h[1-6])\b[^>]*>")
        .expect("BLOCK_RE regex should compile")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("TAG_RE regex should compile"));

/// Decode the handful of entities that matter for readability.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Reduce HTML to markdown-ish text: headings become `#` lines, blocks
/// become line breaks, everything else is dropped.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_STYLE_RE.replace_all(html, "");
    let text = HEADING_RE.replace_all(&text, |caps: &regex::Captures<'_>| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("\n{} ", "#".repeat(level))
    });
    let text = BLOCK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    decode_entities(&text)
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fetches web targets over HTTP. Mobile targets are activity identifiers
/// with nothing to fetch.
pub struct HttpScout {
    http: reqwest::Client,
}

impl HttpScout {
    pub fn new(timeout_secs: u64) -> Result<Self, ScoutError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("mission-agents/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScoutError::Request(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageScout for HttpScout {
    async fn scout(&self, target: &str, platform: Platform) -> Result<PageSnapshot, ScoutError> {
        if platform == Platform::Mobile
            || !(target.starts_with("http://") || target.starts_with("https://"))
        {
            return Err(ScoutError::Unsupported {
                platform,
                target: target.to_string(),
            });
        }

        let response = self
            .http
            .get(target)
            .send()
            .await
            .map_err(|e| ScoutError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ScoutError::Status(response.status().as_u16()));
        }
        let html = response
            .text()
            .await
            .map_err(|e| ScoutError::Request(e.to_string()))?;

        let markdown = html_to_text(&html);
        debug!(target, html_len = html.len(), text_len = markdown.len(), "Scouted page");
        Ok(PageSnapshot {
            markdown,
            html: Some(html),
        })
    }
}
