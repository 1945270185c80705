//! OpenAI-compatible inference client.
//!
//! Implements [`GenerationPort`] by streaming `POST {base_url}/chat/completions`
//! over SSE. Connection and HTTP failures are not raised: they become the
//! final `Err` item of the returned stream.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client as HttpClient;

use super::errors::InferenceError;
use super::generation::{strip_end_of_turn, FragmentStream, GenerationPort};
use super::streaming::parse_sse_stream;
use super::types::{ChatCompletionRequest, ChatMessage, Role, WireMessage};
use crate::config::ModelSettings;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for a local OpenAI-compatible endpoint (Ollama, llama.cpp, vLLM).
#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: HttpClient,
    settings: ModelSettings,
}

impl InferenceClient {
    /// Build a client. Does NOT check connectivity; that happens on the
    /// first request.
    pub fn from_settings(settings: ModelSettings) -> Result<Self, InferenceError> {
        if settings.base_url.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "model.base_url is empty".into(),
            });
        }

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: settings.base_url.clone(),
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self { http, settings })
    }

    /// The base URL of the endpoint.
    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    /// The model name sent with every request.
    pub fn model_name(&self) -> &str {
        &self.settings.model_name
    }

    fn build_request(&self, history: Vec<ChatMessage>, system_prompt: &str) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(WireMessage {
                role: Role::System.as_str(),
                content: system_prompt.to_string(),
            });
        }
        messages.extend(history.into_iter().map(to_wire));

        ChatCompletionRequest {
            model: self.settings.model_name.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: true,
        }
    }
}

/// Map a ledger message to a chat-completions message.
///
/// Tool feedback is plain text in this protocol, not an OpenAI tool-call
/// result, so it goes out as `user` content.
fn to_wire(message: ChatMessage) -> WireMessage {
    let role = match message.role {
        Role::Tool => Role::User,
        other => other,
    };
    WireMessage {
        role: role.as_str(),
        content: message.content,
    }
}

/// Send the request and turn the response into a fragment stream.
async fn open_stream(
    http: HttpClient,
    url: String,
    body: ChatCompletionRequest,
    timeout_secs: u64,
) -> Result<FragmentStream, InferenceError> {
    tracing::info!(
        url = %url,
        model = %body.model,
        message_count = body.messages.len(),
        max_tokens = body.max_tokens,
        "=== LLM REQUEST ==="
    );

    let response = http
        .post(&url)
        .json(&body)
        .header("Accept", "text/event-stream")
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: timeout_secs,
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(InferenceError::HttpError {
            status: status.as_u16(),
            body: body_text,
        });
    }

    Ok(parse_sse_stream(response.bytes_stream()).boxed())
}

impl GenerationPort for InferenceClient {
    fn generate(&self, history: Vec<ChatMessage>, system_prompt: &str) -> FragmentStream {
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        let body = self.build_request(history, system_prompt);
        let http = self.http.clone();
        let timeout_secs = self.settings.request_timeout_secs;

        let raw = stream::once(open_stream(http, url, body, timeout_secs))
            .flat_map(|opened| match opened {
                Ok(fragments) => fragments,
                Err(e) => {
                    tracing::warn!(error = %e, "generation request failed");
                    stream::once(async move { Err(e) }).boxed()
                }
            })
            .boxed();

        strip_end_of_turn(raw, self.settings.end_of_turn_markers.clone())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> InferenceClient {
        InferenceClient::from_settings(ModelSettings::default()).unwrap()
    }

    #[test]
    fn test_build_request_prepends_system_and_maps_tool_role() {
        let history = vec![
            ChatMessage::new(Role::User, "make a note"),
            ChatMessage::new(Role::Assistant, "<tool>create_file|path=a|content=b</tool>"),
            ChatMessage::new(Role::Tool, "<result>\nCreated file: a\n</result>"),
        ];
        let req = client().build_request(history, "You are helpful.");

        let roles: Vec<&str> = req.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(req.messages[0].content, "You are helpful.");
        assert!(req.stream);

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][3]["role"], "user");
        assert_eq!(json["model"], ModelSettings::default().model_name);
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let settings = ModelSettings {
            base_url: " ".into(),
            ..ModelSettings::default()
        };
        assert!(matches!(
            InferenceClient::from_settings(settings),
            Err(InferenceError::ConfigError { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_single_error_item() {
        let settings = ModelSettings {
            // Port 9 (discard) on localhost is closed on test machines.
            base_url: "http://127.0.0.1:9/v1".into(),
            request_timeout_secs: 5,
            ..ModelSettings::default()
        };
        let client = InferenceClient::from_settings(settings).unwrap();
        let items: Vec<_> = client
            .generate(vec![ChatMessage::new(Role::User, "hi")], "sys")
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
