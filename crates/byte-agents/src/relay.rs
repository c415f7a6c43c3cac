use byte_channels::MessageSink;
use byte_common::MessageHandle;
use byte_config::RelayConfig;
use chrono::Utc;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::{PendingToolCall, StreamMachine, StreamStep};
use crate::providers::ChunkStream;

/// How often and how large the live message may be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPolicy {
    /// New characters required before the next edit.
    pub edit_budget_chars: usize,
    /// Minimum spacing between two edits.
    pub min_edit_interval: Duration,
    /// Longest text a single message may hold.
    pub max_message_chars: usize,
    /// Final texts longer than this are delivered as a file.
    pub file_threshold_chars: usize,
    /// Longest wait for the next chunk before the stream counts as broken.
    pub idle_timeout: Duration,
}

impl RelayPolicy {
    pub fn primary(config: &RelayConfig) -> Self {
        Self {
            edit_budget_chars: config.edit_budget_chars,
            min_edit_interval: Duration::from_millis(config.min_edit_interval_ms),
            max_message_chars: config.max_message_chars,
            file_threshold_chars: config.file_threshold_chars,
            idle_timeout: Duration::from_secs(config.stream_idle_timeout_secs.max(1)),
        }
    }

    /// Policy for the answer that follows a tool call.
    pub fn follow_up(config: &RelayConfig) -> Self {
        Self {
            edit_budget_chars: config.follow_up_edit_budget_chars,
            ..Self::primary(config)
        }
    }
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self::primary(&RelayConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Every text delta, concatenated.
    pub text: String,
    /// Function call the model asked for, if accepted.
    pub tool_call: Option<PendingToolCall>,
    /// The live message, if one exists.
    pub message: Option<MessageHandle>,
    /// The stream failed before its end marker.
    pub interrupted: bool,
}

/// Renders a chunk stream into progressive edits of one message.
///
/// Edits are awaited one after another, so at most one edit is in flight.
/// With no target message the first update sends a new one.
pub struct StreamingRelay<'a> {
    sink: &'a dyn MessageSink,
    policy: &'a RelayPolicy,
    target: Option<MessageHandle>,
    accept_tool_calls: bool,
    file_label: String,
    scratch_dir: PathBuf,
    shown: String,
}

impl<'a> StreamingRelay<'a> {
    pub fn new(
        sink: &'a dyn MessageSink,
        policy: &'a RelayPolicy,
        target: Option<MessageHandle>,
    ) -> Self {
        Self {
            sink,
            policy,
            target,
            accept_tool_calls: false,
            file_label: "conversation".to_string(),
            scratch_dir: std::env::temp_dir(),
            shown: String::new(),
        }
    }

    pub fn accept_tool_calls(mut self, accept: bool) -> Self {
        self.accept_tool_calls = accept;
        self
    }

    /// Used in the name of the file artifact for long answers.
    pub fn file_label(mut self, label: impl Into<String>) -> Self {
        self.file_label = label.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub async fn relay(mut self, mut stream: ChunkStream) -> RelayOutcome {
        let mut machine = StreamMachine::new(self.accept_tool_calls);
        let mut text = String::new();
        let mut total_chars = 0usize;
        let mut shown_chars = 0usize;
        let mut last_edit: Option<Instant> = None;
        let mut interrupted = false;

        loop {
            let item = match tokio::time::timeout(self.policy.idle_timeout, stream.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "response stream idle for {:?}, keeping partial text",
                        self.policy.idle_timeout
                    );
                    interrupted = true;
                    break;
                }
            };
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("response stream failed, keeping partial text: {e}");
                    interrupted = true;
                    break;
                }
            };

            match machine.on_chunk(chunk) {
                StreamStep::Text(delta) => {
                    total_chars += delta.chars().count();
                    text.push_str(&delta);

                    let budget_reached = total_chars - shown_chars >= self.policy.edit_budget_chars;
                    let spaced = last_edit
                        .map(|at| at.elapsed() >= self.policy.min_edit_interval)
                        .unwrap_or(true);
                    if budget_reached && spaced {
                        self.show(&text).await;
                        shown_chars = total_chars;
                        last_edit = Some(Instant::now());
                    }
                }
                StreamStep::Continue => {}
                StreamStep::Finished => break,
            }
        }

        self.deliver_final(&text, total_chars).await;

        RelayOutcome {
            tool_call: machine.finish(),
            text,
            message: self.target,
            interrupted,
        }
    }

    /// Put the (bounded) text into the live message.
    async fn show(&mut self, text: &str) {
        let live = truncate_chars(text, self.policy.max_message_chars);
        if live.is_empty() || live == self.shown {
            return;
        }

        let result = match self.target.clone() {
            Some(handle) => self.sink.edit(&handle, live).await,
            None => match self.sink.send(live).await {
                Ok(handle) => {
                    self.target = Some(handle);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };
        match result {
            Ok(()) => self.shown = live.to_string(),
            Err(e) => warn!("failed to update live message: {e}"),
        }
    }

    async fn deliver_final(&mut self, text: &str, total_chars: usize) {
        if text.is_empty() {
            return;
        }
        self.show(text).await;

        if total_chars > self.policy.file_threshold_chars {
            self.send_as_file(text).await;
        } else if total_chars > self.policy.max_message_chars {
            let rest: String = text.chars().skip(self.policy.max_message_chars).collect();
            for part in split_chars(&rest, self.policy.max_message_chars) {
                if let Err(e) = self.sink.send(&part).await {
                    warn!("failed to send continuation message: {e}");
                    break;
                }
            }
        }
    }

    async fn send_as_file(&self, text: &str) {
        let filename = format!(
            "response-{}-{}.txt",
            self.file_label,
            Utc::now().format("%Y-%m-%d-%H-%M-%S")
        );
        let path = self
            .scratch_dir
            .join(format!("{}-{filename}", Uuid::new_v4().simple()));

        match self.write_and_send(&path, &filename, text).await {
            Ok(_) => info!(file = %filename, "sent long response as a file"),
            Err(e) => warn!(file = %filename, "failed to send response file: {e}"),
        }
        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(file = %filename, "response file not removed: {e}");
        }
    }

    async fn write_and_send(
        &self,
        path: &std::path::Path,
        filename: &str,
        text: &str,
    ) -> std::io::Result<MessageHandle> {
        tokio::fs::write(path, text).await?;
        let bytes = tokio::fs::read(path).await?;
        self.sink
            .send_file(bytes, filename)
            .await
            .map_err(std::io::Error::other)
    }
}

/// Longest prefix of `text` holding at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn split_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
