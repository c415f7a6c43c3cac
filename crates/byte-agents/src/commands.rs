use byte_channels::MessageSink;
use byte_common::{InboundMessage, Result};
use byte_db::{ConversationStore, TimezoneStore};
use std::sync::Arc;
use tracing::{info, warn};

use crate::format::parse_timezone;
use crate::prompt::initial_conversation;

/// A text command typed into the chat. Commands never reach the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `!clear` — forget the conversation.
    Clear,
    /// `!settimezone <tz>` — store the author's IANA timezone.
    SetTimezone(String),
    /// `!prompt <text>` — restart a DM conversation with a custom prompt.
    Prompt(String),
}

impl Command {
    pub fn parse(content: &str) -> Option<Self> {
        let content = content.trim();
        if content == "!clear" {
            return Some(Self::Clear);
        }
        if let Some(tz) = content.strip_prefix("!settimezone ") {
            return Some(Self::SetTimezone(tz.trim().to_string()));
        }
        if let Some(prompt) = content.strip_prefix("!prompt ") {
            return Some(Self::Prompt(prompt.trim().to_string()));
        }
        None
    }

    /// Whether the command rewrites the conversation history.
    pub fn touches_history(&self) -> bool {
        matches!(self, Self::Clear | Self::Prompt(_))
    }
}

/// Executes commands against the stores and replies in the channel.
pub struct CommandHandler {
    conversations: Arc<dyn ConversationStore>,
    timezones: Arc<TimezoneStore>,
    manager_role: String,
    owner_name: String,
}

impl CommandHandler {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        timezones: Arc<TimezoneStore>,
        manager_role: impl Into<String>,
        owner_name: impl Into<String>,
    ) -> Self {
        Self {
            conversations,
            timezones,
            manager_role: manager_role.into(),
            owner_name: owner_name.into(),
        }
    }

    /// Returns the reply that was sent.
    pub async fn execute(
        &self,
        command: Command,
        message: &InboundMessage,
        sink: &dyn MessageSink,
    ) -> Result<String> {
        let key = &message.conversation;
        let reply = match command {
            Command::Clear => {
                if message.is_direct || message.has_role(&self.manager_role) {
                    self.conversations.delete(key).await?;
                    info!(conversation = %key, "conversation cleared");
                    "Conversation has been cleared.".to_string()
                } else {
                    "You do not have permission to clear the conversation.".to_string()
                }
            }
            Command::SetTimezone(tz) => {
                if parse_timezone(&tz).is_some() {
                    self.timezones.set_timezone(&message.author_id, &tz).await?;
                    format!("Timezone has been set to {tz}.")
                } else {
                    "Invalid timezone. Please use a valid IANA Time Zone like 'UTC' or 'America/New_York'."
                        .to_string()
                }
            }
            Command::Prompt(prompt) => {
                if message.is_direct {
                    self.conversations.delete(key).await?;
                    let turns = initial_conversation(true, &self.owner_name, Some(&prompt));
                    self.conversations.replace(key, &turns).await?;
                    info!(conversation = %key, "conversation reset with custom prompt");
                    format!("Conversation has been reset with the custom prompt: {prompt}")
                } else {
                    "You can only use this command in a DM.".to_string()
                }
            }
        };

        if let Err(e) = sink.send(&reply).await {
            warn!(conversation = %key, "failed to send command reply: {e}");
        }
        Ok(reply)
    }
}
