use crate::error::InvocationError;
use crate::providers::{Chunk, ChunkStream, ModelInvoker, ToolDefinition};
use async_trait::async_trait;
use byte_common::{Role, Turn};
use bytes::Bytes;
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::debug;

/// Longest silence tolerated between two reads of a response body.
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Streaming chat completions against an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiInvoker {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiInvoker {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .read_timeout(STREAM_READ_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn build_request(
        &self,
        model: &str,
        turns: &[Turn],
        functions: &[ToolDefinition],
    ) -> OpenAiRequest {
        let messages = turns
            .iter()
            .map(|t| OpenAiMessage {
                role: match t.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Function => "function",
                },
                name: t.name.clone(),
                content: t.content.clone(),
            })
            .collect();

        let functions = if functions.is_empty() {
            None
        } else {
            Some(
                functions
                    .iter()
                    .map(|f| OpenAiFunctionDefinition {
                        name: f.name.clone(),
                        description: f.description.clone(),
                        parameters: f.input_schema.clone(),
                    })
                    .collect(),
            )
        };

        OpenAiRequest {
            model: model.to_string(),
            messages,
            functions,
            stream: true,
        }
    }
}

#[async_trait]
impl ModelInvoker for OpenAiInvoker {
    async fn invoke(
        &self,
        model: &str,
        turns: &[Turn],
        functions: &[ToolDefinition],
    ) -> Result<ChunkStream, InvocationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(model, turns, functions);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| InvocationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            debug!(status = status.as_u16(), %message, "completion request rejected");
            return Err(InvocationError::classify(
                status.as_u16(),
                &message,
                retry_after,
            ));
        }

        Ok(Box::pin(SseParser::new(response.bytes_stream())))
    }
}

/// Prefer the `error.message` field of a JSON error body over the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<OpenAiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// Request Types
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<Vec<OpenAiFunctionDefinition>>,
    stream: bool,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    content: String,
}

#[derive(Serialize)]
struct OpenAiFunctionDefinition {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Error Types
#[derive(Deserialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetail,
}

#[derive(Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// Stream Parser
struct SseParser {
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: Vec<u8>,
    queue: VecDeque<Result<Chunk, InvocationError>>,
    finished: bool,
}

impl SseParser {
    fn new(stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static) -> Self {
        Self {
            stream: Box::pin(stream),
            buffer: Vec::new(),
            queue: VecDeque::new(),
            finished: false,
        }
    }

    /// Split complete events off the buffer and queue their chunks.
    fn drain_events(&mut self) {
        while let Some((pos, len)) = find_event_boundary(&self.buffer) {
            let event = self.buffer.drain(..pos).collect::<Vec<u8>>();
            self.buffer.drain(..len);
            self.parse_event(&event);
        }
    }

    fn parse_event(&mut self, event: &[u8]) {
        let Ok(text) = std::str::from_utf8(event) else {
            self.queue.push_back(Err(InvocationError::Framing(
                "event is not valid UTF-8".to_string(),
            )));
            return;
        };

        for line in text.lines() {
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                continue;
            };
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                self.finish();
                continue;
            }
            self.parse_data(data);
        }
    }

    fn parse_data(&mut self, data: &str) {
        if let Ok(body) = serde_json::from_str::<OpenAiErrorBody>(data) {
            self.queue.push_back(Err(InvocationError::classify(
                200,
                &body.error.message,
                None,
            )));
            return;
        }

        let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.queue
                    .push_back(Err(InvocationError::Framing(format!("JSON parse error: {e}"))));
                return;
            }
        };

        for choice in chunk.choices {
            let delta = choice.delta;

            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                self.queue.push_back(Ok(Chunk::TextDelta(content)));
            }

            let calls = delta
                .function_call
                .into_iter()
                .chain(delta.tool_calls.into_iter().flatten().filter_map(|tc| tc.function));
            for call in calls {
                if let Some(name) = call.name.filter(|n| !n.is_empty()) {
                    self.queue.push_back(Ok(Chunk::ToolCallStart { name }));
                }
                if let Some(arguments) = call.arguments.filter(|a| !a.is_empty()) {
                    self.queue.push_back(Ok(Chunk::ToolCallArgs(arguments)));
                }
            }
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.queue.push_back(Ok(Chunk::End));
        }
    }
}

fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

impl Stream for SseParser {
    type Item = Result<Chunk, InvocationError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Poll::Ready(Some(item));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.drain_events();
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(InvocationError::Network(format!(
                        "stream error: {e}"
                    )))));
                }
                Poll::Ready(None) => {
                    // trailing event without a blank line
                    if !self.buffer.is_empty() {
                        let rest = std::mem::take(&mut self.buffer);
                        self.parse_event(&rest);
                    }
                    self.finish();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// Stream Response Types
#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct OpenAiStreamDelta {
    content: Option<String>,
    function_call: Option<OpenAiStreamFunctionCall>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiStreamToolCall {
    function: Option<OpenAiStreamFunctionCall>,
}

#[derive(Deserialize)]
struct OpenAiStreamFunctionCall {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn parse(raw: &[&'static str]) -> Vec<Result<Chunk, InvocationError>> {
        let parts: Vec<reqwest::Result<Bytes>> =
            raw.iter().map(|s| Ok(Bytes::from_static(s.as_bytes()))).collect();
        let parser = SseParser::new(futures::stream::iter(parts));
        futures::executor::block_on(parser.collect::<Vec<_>>())
    }

    #[test]
    fn parses_text_deltas_split_across_reads() {
        let chunks = parse(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let chunks: Vec<Chunk> = chunks.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(
            chunks,
            vec![
                Chunk::TextDelta("Hel".into()),
                Chunk::TextDelta("lo".into()),
                Chunk::End
            ]
        );
    }

    #[test]
    fn parses_legacy_function_call() {
        let chunks = parse(&[
            "data: {\"choices\":[{\"delta\":{\"function_call\":{\"name\":\"google_search\",\"arguments\":\"\"}}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"function_call\":{\"arguments\":\"{\\\"search_term\\\":\"}}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"function_call\":{\"arguments\":\"\\\"rust\\\"}\"}}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let chunks: Vec<Chunk> = chunks.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(
            chunks,
            vec![
                Chunk::ToolCallStart {
                    name: "google_search".into()
                },
                Chunk::ToolCallArgs("{\"search_term\":".into()),
                Chunk::ToolCallArgs("\"rust\"}".into()),
                Chunk::End
            ]
        );
    }

    #[test]
    fn parses_tool_calls_shape() {
        let chunks = parse(&[
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"ask_wolfram_alpha\",\"arguments\":\"{}\"}}]}}]}\r\n\r\n",
        ]);
        let chunks: Vec<Chunk> = chunks.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(
            chunks,
            vec![
                Chunk::ToolCallStart {
                    name: "ask_wolfram_alpha".into()
                },
                Chunk::ToolCallArgs("{}".into()),
                Chunk::End
            ]
        );
    }

    #[test]
    fn missing_done_still_ends_stream() {
        let chunks = parse(&["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}"]);
        assert_eq!(chunks.len(), 2);
        assert!(matches!(chunks[1], Ok(Chunk::End)));
    }

    #[test]
    fn malformed_json_is_framing_error() {
        let chunks = parse(&["data: {not json}\n\n"]);
        assert!(matches!(chunks[0], Err(InvocationError::Framing(_))));
    }

    #[test]
    fn in_stream_error_is_classified() {
        let chunks = parse(&[
            "data: {\"error\":{\"message\":\"flagged moderation category: violence\"}}\n\n",
        ]);
        assert_eq!(
            chunks[0],
            Err(InvocationError::Moderation {
                category: "violence".into()
            })
        );
    }

    #[test]
    fn error_message_prefers_json_field() {
        assert_eq!(
            error_message("{\"error\":{\"message\":\"Rate limit reached\"}}"),
            "Rate limit reached"
        );
        assert_eq!(error_message("plain text"), "plain text");
    }
}
