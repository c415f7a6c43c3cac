use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationKey, MessageHandle};

/// A user message received from the messaging platform, already reduced to
/// the fields the response pipeline needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub handle: MessageHandle,
    pub conversation: ConversationKey,
    /// Platform channel the message arrived in; replies go here.
    pub channel_id: String,
    pub is_direct: bool,
    pub author_id: String,
    pub author_name: String,
    /// Role names the author holds in the guild. Empty in direct messages.
    pub author_roles: Vec<String>,
    pub content: String,
    pub image: Option<ImageAttachment>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageAttachment {
    pub url: String,
    pub content_type: String,
}

impl InboundMessage {
    /// Build a plain text message; mostly useful for tests and synthetic turns.
    pub fn text(
        conversation: ConversationKey,
        channel_id: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        content: impl Into<String>,
        is_direct: bool,
    ) -> Self {
        Self {
            handle: MessageHandle::new(format!("inbound-{}", Utc::now().timestamp_micros())),
            conversation,
            channel_id: channel_id.into(),
            is_direct,
            author_id: author_id.into(),
            author_name: author_name.into(),
            author_roles: Vec::new(),
            content: content.into(),
            image: None,
            timestamp: Utc::now(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.author_roles.iter().any(|r| r == role)
    }
}
