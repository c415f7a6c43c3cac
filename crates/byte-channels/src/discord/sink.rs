use async_trait::async_trait;
use byte_common::{Error, MessageHandle, Result};
use serenity::all::{ChannelId, CreateAttachment, CreateMessage, EditMessage, Http};
use std::sync::Arc;

use super::convert;
use crate::traits::{Attachment, MessageSink, SinkFactory};

/// Sink writing into one Discord channel through the REST client.
pub struct DiscordSink {
    http: Arc<Http>,
    channel: ChannelId,
    channel_str: String,
}

impl DiscordSink {
    pub fn new(http: Arc<Http>, channel: ChannelId) -> Self {
        Self {
            http,
            channel_str: channel.to_string(),
            channel,
        }
    }
}

fn discord_err(action: &str, e: serenity::Error) -> Error {
    Error::Channel(format!("discord {action} failed: {e}"))
}

#[async_trait]
impl MessageSink for DiscordSink {
    fn channel_id(&self) -> &str {
        &self.channel_str
    }

    async fn send(&self, text: &str) -> Result<MessageHandle> {
        let msg = self
            .channel
            .say(self.http.as_ref(), text)
            .await
            .map_err(|e| discord_err("send", e))?;
        Ok(MessageHandle::new(msg.id.to_string()))
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<()> {
        let id = convert::message_id(handle)?;
        self.channel
            .edit_message(self.http.as_ref(), id, EditMessage::new().content(text))
            .await
            .map_err(|e| discord_err("edit", e))?;
        Ok(())
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<()> {
        let id = convert::message_id(handle)?;
        self.channel
            .delete_message(self.http.as_ref(), id)
            .await
            .map_err(|e| discord_err("delete", e))
    }

    async fn send_files(&self, files: Vec<Attachment>) -> Result<MessageHandle> {
        let attachments = files
            .into_iter()
            .map(|f| CreateAttachment::bytes(f.bytes, f.filename));
        let msg = self
            .channel
            .send_files(self.http.as_ref(), attachments, CreateMessage::new())
            .await
            .map_err(|e| discord_err("file upload", e))?;
        Ok(MessageHandle::new(msg.id.to_string()))
    }
}

/// Builds `DiscordSink`s sharing one REST client.
pub struct DiscordSinkFactory {
    http: Arc<Http>,
}

impl DiscordSinkFactory {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl SinkFactory for DiscordSinkFactory {
    fn sink_for(&self, channel_id: &str) -> Result<Arc<dyn MessageSink>> {
        let id = channel_id
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .ok_or_else(|| Error::Channel(format!("not a discord channel id: {channel_id}")))?;
        Ok(Arc::new(DiscordSink::new(
            Arc::clone(&self.http),
            ChannelId::new(id),
        )))
    }
}
