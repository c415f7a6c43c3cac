use byte_common::{
    ConversationKey, Error, ImageAttachment, InboundMessage, MessageHandle, Result,
};
use chrono::{DateTime, Utc};
use serenity::all::{self as serenity_model, MessageId};

/// Direct messages are keyed by author, guild messages by channel.
pub fn conversation_key(is_direct: bool, author_id: u64, channel_id: u64) -> ConversationKey {
    if is_direct {
        ConversationKey::direct(author_id)
    } else {
        ConversationKey::channel(channel_id)
    }
}

/// The first attachment whose content type is an image, if any.
pub fn first_image<'a>(
    attachments: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
) -> Option<ImageAttachment> {
    attachments.into_iter().find_map(|(url, content_type)| {
        content_type
            .filter(|ct| ct.starts_with("image/"))
            .map(|ct| ImageAttachment {
                url: url.to_string(),
                content_type: ct.to_string(),
            })
    })
}

/// Parse a handle back into a Discord message id.
pub fn message_id(handle: &MessageHandle) -> Result<MessageId> {
    handle
        .as_str()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(MessageId::new)
        .ok_or_else(|| Error::Channel(format!("not a discord message id: {handle}")))
}

/// Convert a serenity message into an `InboundMessage`.
///
/// `author_roles` is resolved by the caller from the guild cache since the
/// message itself only carries role ids.
pub fn discord_message_to_inbound(
    msg: &serenity_model::Message,
    author_roles: Vec<String>,
) -> InboundMessage {
    let is_direct = msg.guild_id.is_none();
    let timestamp = DateTime::<Utc>::from_timestamp(msg.timestamp.unix_timestamp(), 0)
        .unwrap_or_else(Utc::now);

    InboundMessage {
        handle: MessageHandle::new(msg.id.to_string()),
        conversation: conversation_key(is_direct, msg.author.id.get(), msg.channel_id.get()),
        channel_id: msg.channel_id.to_string(),
        is_direct,
        author_id: msg.author.id.to_string(),
        author_name: msg.author.name.clone(),
        author_roles,
        content: msg.content.clone(),
        image: first_image(
            msg.attachments
                .iter()
                .map(|a| (a.url.as_str(), a.content_type.as_deref())),
        ),
        timestamp,
    }
}
