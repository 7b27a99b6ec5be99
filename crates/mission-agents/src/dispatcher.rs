//! OpenAI-compatible HTTP agent dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use coordination::mission::{AgentDispatcher, AgentTask, DispatchError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmEndpoint;
use crate::prompts::{preamble_for, PROMPT_VERSION};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Sends each task to `/chat/completions` with the role's system preamble.
pub struct HttpDispatcher {
    http: reqwest::Client,
    endpoint: LlmEndpoint,
}

impl HttpDispatcher {
    pub fn new(endpoint: LlmEndpoint) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self { http, endpoint })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.url.trim_end_matches('/'))
    }

    /// User message: description followed by the context bundle, bounded to
    /// `max_task_chars`.
    pub fn user_message(task: &AgentTask, max_chars: usize) -> String {
        let mut text = task.description.clone();
        if !task.context.is_null() {
            let context = serde_json::to_string_pretty(&task.context).unwrap_or_default();
            text.push_str("\n\n## Context\n");
            text.push_str(&context);
        }
        if text.chars().count() > max_chars {
            warn!(
                role = %task.role,
                max_chars,
                "Task text truncated to dispatcher payload limit"
            );
            text = text.chars().take(max_chars).collect();
        }
        text
    }
}

#[async_trait]
impl AgentDispatcher for HttpDispatcher {
    async fn dispatch(&self, task: &AgentTask) -> Result<String, DispatchError> {
        let request = ChatRequest {
            model: &self.endpoint.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: preamble_for(task.role).into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: Self::user_message(task, self.endpoint.max_task_chars),
                },
            ],
            temperature: self.endpoint.temperature,
        };

        debug!(
            role = %task.role,
            model = %self.endpoint.model,
            prompt_version = PROMPT_VERSION,
            "Dispatching agent task"
        );

        let mut builder = self.http.post(self.completions_url()).json(&request);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status { status, body });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(DispatchError::Empty)
    }
}
