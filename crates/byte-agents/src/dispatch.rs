use byte_channels::{Attachment, MessageSink};
use byte_common::{ConversationKey, MessageHandle, Turn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::{BackoffController, CycleContext};
use crate::error::CycleError;
use crate::providers::Chunk;
use crate::relay::{RelayOutcome, RelayPolicy, StreamingRelay};
use crate::tools::ToolRegistry;

/// A function call requested by the model, with its raw argument text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub name: String,
    pub arguments: String,
}

impl PendingToolCall {
    /// Parse the accumulated argument text. Empty arguments mean `{}`.
    pub fn parse_arguments(&self) -> Result<serde_json::Value, CycleError> {
        let raw = self.arguments.trim();
        if raw.is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| CycleError::MalformedToolArguments {
                tool: self.name.clone(),
                reason: e.to_string(),
            })?;
        if !value.is_object() {
            return Err(CycleError::MalformedToolArguments {
                tool: self.name.clone(),
                reason: "arguments are not a JSON object".to_string(),
            });
        }
        Ok(value)
    }
}

/// What the relay should do with a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStep {
    /// Append this text to the visible answer.
    Text(String),
    Continue,
    Finished,
}

#[derive(Debug)]
enum MachineState {
    AwaitingContent,
    Content,
    ToolCall { name: String, arguments: String },
}

/// Tracks whether a stream is producing text or a function call.
///
/// Only the first function call is kept; a second start marker is ignored.
#[derive(Debug)]
pub struct StreamMachine {
    accept_tool_calls: bool,
    state: MachineState,
}

impl StreamMachine {
    pub fn new(accept_tool_calls: bool) -> Self {
        Self {
            accept_tool_calls,
            state: MachineState::AwaitingContent,
        }
    }

    pub fn on_chunk(&mut self, chunk: Chunk) -> StreamStep {
        match chunk {
            Chunk::TextDelta(text) => {
                if matches!(self.state, MachineState::AwaitingContent) {
                    self.state = MachineState::Content;
                }
                if text.is_empty() {
                    StreamStep::Continue
                } else {
                    StreamStep::Text(text)
                }
            }
            Chunk::ToolCallStart { name } => {
                if !self.accept_tool_calls {
                    debug!(tool = %name, "ignoring function call in follow-up stream");
                } else if matches!(self.state, MachineState::ToolCall { .. }) {
                    debug!(tool = %name, "ignoring second function call");
                } else {
                    self.state = MachineState::ToolCall {
                        name,
                        arguments: String::new(),
                    };
                }
                StreamStep::Continue
            }
            Chunk::ToolCallArgs(fragment) => {
                if let MachineState::ToolCall { arguments, .. } = &mut self.state {
                    arguments.push_str(&fragment);
                }
                StreamStep::Continue
            }
            Chunk::End => StreamStep::Finished,
        }
    }

    pub fn finish(self) -> Option<PendingToolCall> {
        match self.state {
            MachineState::ToolCall { name, arguments } => Some(PendingToolCall { name, arguments }),
            _ => None,
        }
    }
}

/// Downloaded image files, removed when dropped.
struct ScratchFiles {
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    fn new() -> Self {
        Self { paths: Vec::new() }
    }

    async fn read_all(&self) -> Vec<Attachment> {
        let mut files = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "image.png".to_string());
                    files.push(Attachment::new(name, bytes));
                }
                Err(e) => warn!(path = %path.display(), "failed to read downloaded image: {e}"),
            }
        }
        files
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), "scratch file not removed: {e}");
            }
        }
    }
}

/// Runs a requested tool and streams the model's follow-up answer.
pub struct ToolDispatcher {
    tools: Arc<ToolRegistry>,
    backoff: Arc<BackoffController>,
    policy: RelayPolicy,
    http: reqwest::Client,
    scratch_dir: PathBuf,
    owner_name: String,
}

impl ToolDispatcher {
    pub fn new(
        tools: Arc<ToolRegistry>,
        backoff: Arc<BackoffController>,
        policy: RelayPolicy,
        scratch_dir: impl Into<PathBuf>,
        owner_name: impl Into<String>,
    ) -> Self {
        Self {
            tools,
            backoff,
            policy,
            http: reqwest::Client::new(),
            scratch_dir: scratch_dir.into(),
            owner_name: owner_name.into(),
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Execute `call`, record its result and relay the follow-up answer into
    /// the status message. The follow-up never triggers another tool.
    pub async fn run(
        &self,
        key: &ConversationKey,
        call: PendingToolCall,
        status: &MessageHandle,
        ctx: &CycleContext<'_>,
    ) -> Result<RelayOutcome, CycleError> {
        let sink = ctx.sink;
        let mut scratch = ScratchFiles::new();

        let content = match self.tools.find(&call.name) {
            None => {
                warn!(tool = %call.name, "model requested an unknown function");
                format!(
                    "The function {} does not exist. Tell the user you could not do that.",
                    call.name
                )
            }
            Some(tool) => {
                let args = match call.parse_arguments() {
                    Ok(args) => args,
                    Err(e) => {
                        self.report_technical_error(sink, status, &e).await;
                        return Err(e);
                    }
                };

                update_status(sink, status, &tool.progress_phrase(&args)).await;
                info!(conversation = %key, tool = tool.name(), "running tool");

                match tool.execute(&args).await {
                    Ok(output) => {
                        self.download_images(&output.image_urls, key, &mut scratch)
                            .await;
                        output.content
                    }
                    Err(e) => {
                        warn!(conversation = %key, tool = tool.name(), "tool failed: {e}");
                        if let Some(notice) = tool.failure_notice() {
                            update_status(sink, status, notice).await;
                        }
                        tool.failure_content(&e)
                    }
                }
            }
        };

        self.backoff
            .store()
            .append(key, &[Turn::function(call.name.clone(), content)])
            .await?;

        let stream = self.backoff.call(key, &[], ctx).await?;
        let outcome = StreamingRelay::new(sink, &self.policy, Some(status.clone()))
            .file_label(key.as_str())
            .scratch_dir(&self.scratch_dir)
            .relay(stream)
            .await;

        if !outcome.text.is_empty() {
            self.backoff
                .store()
                .append(key, &[Turn::assistant(outcome.text.clone())])
                .await?;
        }

        let files = scratch.read_all().await;
        if !files.is_empty() {
            if let Err(e) = sink.send_files(files).await {
                warn!(conversation = %key, "failed to send generated images: {e}");
            }
        }

        Ok(outcome)
    }

    async fn report_technical_error(
        &self,
        sink: &dyn MessageSink,
        status: &MessageHandle,
        error: &CycleError,
    ) {
        let text = format!(
            "Oops! An error occurred while processing your request. Here's the technical stuff: ```{error}```\nIf the problem persists, please contact {}.",
            self.owner_name
        );
        update_status(sink, status, &text).await;
    }

    async fn download_images(
        &self,
        urls: &[String],
        key: &ConversationKey,
        scratch: &mut ScratchFiles,
    ) {
        for (i, url) in urls.iter().enumerate() {
            let path = self
                .scratch_dir
                .join(format!("image-{}-{i}.png", Uuid::new_v4().simple()));
            match self.download(url, &path).await {
                Ok(()) => scratch.paths.push(path),
                Err(e) => {
                    warn!(conversation = %key, %url, "failed to download generated image: {e}");
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }
    }

    async fn download(&self, url: &str, path: &Path) -> std::io::Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(std::io::Error::other)?;
        let bytes = response.bytes().await.map_err(std::io::Error::other)?;
        tokio::fs::write(path, &bytes).await
    }
}

async fn update_status(sink: &dyn MessageSink, status: &MessageHandle, text: &str) {
    if let Err(e) = sink.edit(status, text).await {
        warn!("failed to update status message: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(machine: &mut StreamMachine, chunks: Vec<Chunk>) -> String {
        let mut text = String::new();
        for chunk in chunks {
            match machine.on_chunk(chunk) {
                StreamStep::Text(t) => text.push_str(&t),
                StreamStep::Continue => {}
                StreamStep::Finished => break,
            }
        }
        text
    }

    #[test]
    fn collects_function_call_arguments() {
        let mut machine = StreamMachine::new(true);
        let text = run(
            &mut machine,
            vec![
                Chunk::ToolCallStart {
                    name: "google_search".into(),
                },
                Chunk::ToolCallArgs("{\"search_term\":".into()),
                Chunk::ToolCallArgs("\"rust\"}".into()),
                Chunk::End,
            ],
        );
        assert!(text.is_empty());
        let call = machine.finish().unwrap();
        assert_eq!(call.name, "google_search");
        assert_eq!(
            call.parse_arguments().unwrap(),
            serde_json::json!({"search_term": "rust"})
        );
    }

    #[test]
    fn text_only_stream_has_no_call() {
        let mut machine = StreamMachine::new(true);
        let text = run(
            &mut machine,
            vec![
                Chunk::TextDelta("Hello".into()),
                Chunk::TextDelta(" there".into()),
                Chunk::End,
            ],
        );
        assert_eq!(text, "Hello there");
        assert!(machine.finish().is_none());
    }

    #[test]
    fn follow_up_streams_ignore_calls() {
        let mut machine = StreamMachine::new(false);
        run(
            &mut machine,
            vec![
                Chunk::ToolCallStart {
                    name: "google_search".into(),
                },
                Chunk::ToolCallArgs("{}".into()),
                Chunk::End,
            ],
        );
        assert!(machine.finish().is_none());
    }

    #[test]
    fn second_call_is_ignored() {
        let mut machine = StreamMachine::new(true);
        run(
            &mut machine,
            vec![
                Chunk::ToolCallStart { name: "a".into() },
                Chunk::ToolCallArgs("{\"x\":1}".into()),
                Chunk::ToolCallStart { name: "b".into() },
                Chunk::End,
            ],
        );
        let call = machine.finish().unwrap();
        assert_eq!(call.name, "a");
        assert_eq!(call.arguments, "{\"x\":1}");
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        let call = PendingToolCall {
            name: "scrape_web_page".into(),
            arguments: "{\"url\": ".into(),
        };
        assert!(matches!(
            call.parse_arguments(),
            Err(CycleError::MalformedToolArguments { .. })
        ));

        let call = PendingToolCall {
            name: "scrape_web_page".into(),
            arguments: "[1, 2]".into(),
        };
        assert!(call.parse_arguments().is_err());
    }

    #[test]
    fn empty_arguments_parse_as_object() {
        let call = PendingToolCall {
            name: "x".into(),
            arguments: "  ".into(),
        };
        assert_eq!(call.parse_arguments().unwrap(), serde_json::json!({}));
    }

    #[tokio::test]
    async fn scratch_files_are_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        tokio::fs::write(&path, b"png").await.unwrap();
        {
            let scratch = ScratchFiles {
                paths: vec![path.clone()],
            };
            let files = scratch.read_all().await;
            assert_eq!(files[0].bytes, b"png");
        }
        assert!(!path.exists());
    }
}
