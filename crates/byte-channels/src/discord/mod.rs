pub mod config;
pub mod convert;
mod handler;
mod presence;
pub mod sink;

use async_trait::async_trait;
use byte_common::{Error, Result};
use serenity::Client;
use serenity::all::{Http, ShardManager};
use std::sync::Arc;
use tracing::{error, info};

use crate::traits::{ChannelLifecycle, ChannelStatus, InboundHandler, SinkFactory};

pub use config::DiscordSettings;
pub use handler::DiscordHandler;
pub use presence::PresenceRotation;
pub use sink::{DiscordSink, DiscordSinkFactory};

/// Discord gateway connection delivering messages to an `InboundHandler`.
pub struct DiscordChannel {
    settings: DiscordSettings,
    inbound: Arc<dyn InboundHandler>,
    status: ChannelStatus,
    http: Option<Arc<Http>>,
    shard_manager: Option<Arc<ShardManager>>,
    presence: Arc<PresenceRotation>,
}

impl DiscordChannel {
    pub fn new(settings: DiscordSettings, inbound: Arc<dyn InboundHandler>) -> Self {
        Self {
            settings,
            inbound,
            status: ChannelStatus::Disconnected,
            http: None,
            shard_manager: None,
            presence: Arc::new(PresenceRotation::default()),
        }
    }
}

#[async_trait]
impl ChannelLifecycle for DiscordChannel {
    fn display_name(&self) -> &str {
        "Discord"
    }

    async fn connect(&mut self) -> Result<()> {
        self.status = ChannelStatus::Connecting;

        let handler = DiscordHandler::new(
            Arc::clone(&self.inbound),
            self.settings.status_phrases.clone(),
            self.settings.status_interval,
            Arc::clone(&self.presence),
        );

        let mut client = Client::builder(&self.settings.bot_token, self.settings.intents)
            .event_handler(handler)
            .await
            .map_err(|e| {
                self.status = ChannelStatus::Error(e.to_string());
                Error::Channel(format!("failed to build discord client: {e}"))
            })?;

        self.http = Some(Arc::clone(&client.http));
        self.shard_manager = Some(Arc::clone(&client.shard_manager));

        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                error!("discord client stopped: {e}");
            }
        });

        self.status = ChannelStatus::Connected;
        info!("discord channel started");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.presence.stop() {
            info!("discord presence rotation stopped");
        }
        if let Some(manager) = self.shard_manager.take() {
            manager.shutdown_all().await;
        }
        self.http = None;
        self.status = ChannelStatus::Disconnected;
        info!("discord channel disconnected");
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.clone()
    }

    fn sink_factory(&self) -> Option<Arc<dyn SinkFactory>> {
        self.http
            .as_ref()
            .map(|http| Arc::new(DiscordSinkFactory::new(Arc::clone(http))) as Arc<dyn SinkFactory>)
    }
}
