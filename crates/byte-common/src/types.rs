use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which stored turn sequence a message belongs to.
///
/// Direct messages are keyed by the author's user id, guild channels by the
/// channel id, so every member of a channel shares one history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn direct(user_id: impl fmt::Display) -> Self {
        Self(user_id.to_string())
    }

    pub fn channel(channel_id: impl fmt::Display) -> Self {
        Self(channel_id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a message previously sent or received on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle(String);

impl MessageHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_and_channel_keys_render_ids() {
        assert_eq!(ConversationKey::direct(42_u64).as_str(), "42");
        assert_eq!(ConversationKey::channel("9001").to_string(), "9001");
    }

    #[test]
    fn key_serializes_as_plain_string() {
        let key = ConversationKey::from_string("123");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"123\"");
    }
}
