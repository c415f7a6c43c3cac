use rand::seq::IndexedRandom;
use serenity::all::{
    self as serenity_model, ActivityData, Context, EventHandler, Message as SerenityMessage, Ready,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::convert;
use super::presence::PresenceRotation;
use super::sink::DiscordSink;
use crate::traits::InboundHandler;

/// Serenity event handler that forwards user messages to an `InboundHandler`.
pub struct DiscordHandler {
    inbound: Arc<dyn InboundHandler>,
    status_phrases: Vec<String>,
    status_interval: Duration,
    presence: Arc<PresenceRotation>,
}

impl DiscordHandler {
    pub fn new(
        inbound: Arc<dyn InboundHandler>,
        status_phrases: Vec<String>,
        status_interval: Duration,
        presence: Arc<PresenceRotation>,
    ) -> Self {
        Self {
            inbound,
            status_phrases,
            status_interval,
            presence,
        }
    }

    fn role_names(ctx: &Context, msg: &SerenityMessage) -> Vec<String> {
        let (Some(guild_id), Some(member)) = (msg.guild_id, msg.member.as_ref()) else {
            return Vec::new();
        };
        let Some(guild) = ctx.cache.guild(guild_id) else {
            return Vec::new();
        };
        member
            .roles
            .iter()
            .filter_map(|id| guild.roles.get(id).map(|r| r.name.clone()))
            .collect()
    }

    fn spawn_presence_rotation(&self, ctx: Context) {
        if self.status_phrases.is_empty() {
            return;
        }
        let phrases = self.status_phrases.clone();
        let interval = self.status_interval;
        self.presence.start(move || {
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    let phrase = phrases.choose(&mut rand::rng()).cloned();
                    if let Some(phrase) = phrase {
                        debug!(status = %phrase, "rotating discord presence");
                        ctx.set_activity(Some(ActivityData::playing(phrase)));
                    }
                }
            })
        });
    }
}

#[serenity::async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            "Discord bot connected as {} (guilds: {})",
            ready.user.name,
            ready.guilds.len()
        );
        self.spawn_presence_rotation(ctx);
    }

    async fn resume(&self, _ctx: Context, _: serenity_model::ResumedEvent) {
        info!("Discord gateway connection resumed");
    }

    async fn message(&self, ctx: Context, msg: SerenityMessage) {
        // Ignore bots (including ourselves) to prevent loops
        if msg.author.bot {
            return;
        }

        let roles = Self::role_names(&ctx, &msg);
        let inbound = convert::discord_message_to_inbound(&msg, roles);

        debug!(
            message_id = %msg.id,
            author = %msg.author.name,
            channel = %msg.channel_id,
            direct = inbound.is_direct,
            "received discord message"
        );

        let sink = Arc::new(DiscordSink::new(Arc::clone(&ctx.http), msg.channel_id));
        let handler = Arc::clone(&self.inbound);
        tokio::spawn(async move {
            handler.on_message(inbound, sink).await;
        });
    }
}
