use async_trait::async_trait;
use byte_common::{InboundMessage, MessageHandle, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outgoing side of a channel: send, edit and delete messages in one
/// conversation's channel.
///
/// Every call is a suspension point; callers await each call before issuing
/// the next, so at most one edit per target message is ever in flight.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Platform channel this sink writes to.
    fn channel_id(&self) -> &str;

    async fn send(&self, text: &str) -> Result<MessageHandle>;

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<()>;

    async fn delete(&self, handle: &MessageHandle) -> Result<()>;

    /// Send one message carrying all `files` as attachments.
    async fn send_files(&self, files: Vec<Attachment>) -> Result<MessageHandle>;

    async fn send_file(&self, bytes: Vec<u8>, filename: &str) -> Result<MessageHandle> {
        self.send_files(vec![Attachment::new(filename, bytes)]).await
    }
}

/// In-memory file attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Builds sinks for arbitrary channels, for deliveries that are not replies
/// to an inbound message (e.g. scheduled nudges).
pub trait SinkFactory: Send + Sync {
    fn sink_for(&self, channel_id: &str) -> Result<Arc<dyn MessageSink>>;
}

/// Receives every inbound user message together with a sink for replying.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn on_message(&self, message: InboundMessage, sink: Arc<dyn MessageSink>);
}

/// Lifecycle management for a messaging channel (connect, disconnect, status).
#[async_trait]
pub trait ChannelLifecycle: Send {
    /// Human-readable display name.
    fn display_name(&self) -> &str;

    /// Start the channel, connecting to the external service.
    async fn connect(&mut self) -> Result<()>;

    /// Gracefully disconnect from the external service.
    async fn disconnect(&mut self) -> Result<()>;

    /// Current connection status.
    fn status(&self) -> ChannelStatus;

    /// Factory for sinks into this channel's conversations. Only available
    /// once connected.
    fn sink_factory(&self) -> Option<Arc<dyn SinkFactory>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}
