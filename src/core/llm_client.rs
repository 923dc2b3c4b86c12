// src/core/llm_client.rs
//! Azure OpenAI chat-completion client, plain and streamed

use anyhow::{Context, Result};
use rocket::futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::core::config_manager::AzureSettings;
use crate::types::completion::{CompletionChunk, CompletionRequest, CompletionResponse};

/// Text deltas of a streamed completion, in arrival order
pub type TokenStream = BoxStream<'static, Result<String>>;

#[rocket::async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Run a completion and return the whole reply
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Run a streamed completion
    async fn stream(&self, request: CompletionRequest) -> Result<TokenStream>;
}

pub struct AzureOpenAiClient {
    client: reqwest::Client,
    completions_url: String,
    api_key: String,
}

impl AzureOpenAiClient {
    pub fn new(settings: &AzureSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        let completions_url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            settings.endpoint, settings.deployment, settings.api_version
        );

        Ok(Self {
            client,
            completions_url,
            api_key: settings.api_key.clone(),
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response> {
        debug!(
            "Calling chat completion with {} messages (stream: {})",
            request.messages.len(),
            request.stream
        );

        let response = self
            .client
            .post(&self.completions_url)
            .header("api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .context("Chat completion request failed")?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Chat completion error response {}: {}", status, error_text);
            anyhow::bail!("Chat completion returned status {}: {}", status, error_text)
        }
    }
}

#[rocket::async_trait]
impl ChatCompletion for AzureOpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let response = self.send(&request).await?;

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Chat completion returned no content")
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TokenStream> {
        let response = self.send(&request.streaming()).await?;
        let body = response.bytes_stream().boxed();

        let state = StreamState {
            body,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
        };

        let tokens = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(token) = state.pending.pop_front() {
                    return Some((Ok(token), state));
                }
                if state.finished || state.decoder.is_done() {
                    return None;
                }

                match state.body.next().await {
                    Some(Ok(bytes)) => {
                        let decoded = state.decoder.push(&bytes);
                        state.pending.extend(decoded);
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        let err = anyhow::Error::new(e).context("Chat completion stream failed");
                        return Some((Err(err), state));
                    }
                    None => {
                        let rest = state.decoder.finish();
                        state.pending.extend(rest);
                        state.finished = true;
                    }
                }
            }
        });

        Ok(tokens.boxed())
    }
}

struct StreamState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Incremental decoder for `data:` lines of a server-sent event body.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network reads are never cut.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Feed raw bytes, returning every complete non-empty text delta
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }

        self.buffer.extend_from_slice(bytes);
        let mut tokens = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(token) = self.decode_line(&line) {
                tokens.push(token);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }

        tokens
    }

    /// Flush a trailing line that had no newline
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.decode_line(&rest).into_iter().collect()
    }

    /// `data: [DONE]` was seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<String> {
        if self.done {
            return None;
        }

        let line = String::from_utf8_lossy(line);
        let payload = line.trim().strip_prefix("data:")?.trim();

        if payload == "[DONE]" {
            self.done = true;
            return None;
        }

        match serde_json::from_str::<CompletionChunk>(payload) {
            Ok(chunk) => chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty()),
            Err(e) => {
                warn!("Skipping malformed stream payload: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::completion::PromptMessage;
    use crate::types::Role;
    use httpmock::prelude::*;
    use serde_json::json;

    fn settings(endpoint: String) -> AzureSettings {
        AzureSettings {
            endpoint,
            api_key: "test-key".to_string(),
            deployment: "gpt-test".to_string(),
            api_version: "2024-10-21".to_string(),
            timeout_seconds: 5,
        }
    }

    fn hello_request() -> CompletionRequest {
        CompletionRequest::new(vec![PromptMessage::text(Role::User, "hello")])
    }

    #[test]
    fn test_decoder_handles_split_lines_and_done() {
        let mut decoder = SseDecoder::default();

        let first = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Xin\"}}]}\n\ndata: {\"choi");
        assert_eq!(first, vec!["Xin".to_string()]);

        let second = decoder.push(b"ces\":[{\"delta\":{\"content\":\" ch\xc3");
        assert!(second.is_empty());

        let third = decoder.push(b"\xa0o\"}}]}\n\ndata: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n");
        assert_eq!(third, vec![" chào".to_string()]);
        assert!(decoder.is_done());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decoder_skips_empty_and_role_only_deltas() {
        let mut decoder = SseDecoder::default();
        let tokens = decoder.push(
            b"data: {\"choices\":[]}\n\
              data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\
              : keep-alive\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}",
        );
        assert!(tokens.is_empty());
        assert_eq!(decoder.finish(), vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn test_complete_posts_to_deployment_with_api_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/deployments/gpt-test/chat/completions")
                    .query_param("api-version", "2024-10-21")
                    .header("api-key", "test-key");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "Chào bạn"}}]
                }));
            })
            .await;

        let client = AzureOpenAiClient::new(&settings(server.base_url())).unwrap();
        let reply = client.complete(hello_request()).await.unwrap();

        assert_eq!(reply, "Chào bạn");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(429).body("rate limited");
            })
            .await;

        let client = AzureOpenAiClient::new(&settings(server.base_url())).unwrap();
        let err = client.complete(hello_request()).await.unwrap_err();
        let message = format!("{:#}", err);

        assert!(message.contains("429"));
        assert!(message.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_stream_yields_deltas_in_order() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).json_body_partial(r#"{"stream": true}"#);
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(
                        "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n\
                         data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n\
                         data: [DONE]\n\n",
                    );
            })
            .await;

        let client = AzureOpenAiClient::new(&settings(server.base_url())).unwrap();
        let tokens: Vec<String> = client
            .stream(hello_request())
            .await
            .unwrap()
            .map(|token| token.unwrap())
            .collect()
            .await;

        assert_eq!(tokens, vec!["Hello".to_string(), " there".to_string()]);
    }
}
