use async_trait::async_trait;
use byte_channels::{InboundHandler, MessageSink};
use byte_common::{ConversationKey, InboundMessage, MessageHandle, Turn};
use byte_config::AppConfig;
use byte_db::{ActivityStore, TimezoneStore};
use chrono::Utc;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::backoff::{BackoffController, CycleContext};
use crate::commands::{Command, CommandHandler};
use crate::dispatch::ToolDispatcher;
use crate::error::CycleError;
use crate::format::{format_user_turn, parse_timezone};
use crate::gate::ConversationGate;
use crate::phrases;
use crate::prompt::initial_conversation;
use crate::reengage::next_nudge_at;
use crate::relay::{RelayPolicy, StreamingRelay};
use crate::tools::Captioner;

pub const BUSY_NOTICE: &str = "My mind is elsewhere, I'm busy with another task! Please try again after my previous task is done.";

/// Knobs of the chat runtime, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub trigger_word: String,
    pub manager_role: String,
    pub owner_name: String,
    pub busy_notice: Duration,
    pub relay: RelayPolicy,
    pub reengage_min_days: f64,
    pub reengage_max_days: f64,
    /// Where long answers are written before being sent as files.
    pub scratch_dir: PathBuf,
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            trigger_word: config.discord.trigger_word.clone(),
            manager_role: config.discord.manager_role.clone(),
            owner_name: config.owner_name.clone(),
            busy_notice: config.busy_notice(),
            relay: RelayPolicy::primary(&config.relay),
            reengage_min_days: config.reengage.min_days,
            reengage_max_days: config.reengage.max_days,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Turns inbound chat messages into model exchanges.
pub struct ChatRuntime {
    settings: RuntimeSettings,
    gate: Arc<ConversationGate>,
    backoff: Arc<BackoffController>,
    dispatcher: Arc<ToolDispatcher>,
    captioner: Arc<dyn Captioner>,
    timezones: Arc<TimezoneStore>,
    activity: Arc<ActivityStore>,
    commands: CommandHandler,
}

impl ChatRuntime {
    pub fn new(
        settings: RuntimeSettings,
        backoff: Arc<BackoffController>,
        dispatcher: Arc<ToolDispatcher>,
        captioner: Arc<dyn Captioner>,
        timezones: Arc<TimezoneStore>,
        activity: Arc<ActivityStore>,
    ) -> Self {
        let commands = CommandHandler::new(
            Arc::clone(backoff.store()),
            Arc::clone(&timezones),
            settings.manager_role.clone(),
            settings.owner_name.clone(),
        );
        Self {
            settings,
            gate: Arc::new(ConversationGate::new()),
            backoff,
            dispatcher,
            captioner,
            timezones,
            activity,
            commands,
        }
    }

    /// Share a gate with other writers, such as the re-engagement scheduler.
    pub fn with_gate(mut self, gate: Arc<ConversationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &Arc<ConversationGate> {
        &self.gate
    }

    /// Whether a message should get an answer rather than only be recorded.
    pub fn is_triggered(&self, message: &InboundMessage) -> bool {
        message.is_direct
            || message.image.is_some()
            || message
                .content
                .to_lowercase()
                .contains(&self.settings.trigger_word.to_lowercase())
    }

    #[instrument(skip_all, fields(conversation = %message.conversation))]
    pub async fn handle(
        &self,
        message: InboundMessage,
        sink: Arc<dyn MessageSink>,
    ) -> Result<(), CycleError> {
        if let Some(command) = Command::parse(&message.content) {
            let _guard = if command.touches_history() {
                let Ok(guard) = self.gate.try_acquire(&message.conversation) else {
                    info!("conversation busy, command dropped");
                    self.send_busy_notice(sink);
                    return Ok(());
                };
                Some(guard)
            } else {
                None
            };
            self.commands.execute(command, &message, sink.as_ref()).await?;
            return Ok(());
        }

        let key = message.conversation.clone();

        if !self.is_triggered(&message) {
            let _guard = self.gate.acquire(&key).await;
            self.record_user_turn(&message).await?;
            self.touch_activity(&message).await;
            debug!("recorded passive message");
            return Ok(());
        }

        let Ok(_guard) = self.gate.try_acquire(&key) else {
            info!("conversation busy, turn dropped");
            self.send_busy_notice(sink);
            return Ok(());
        };

        self.record_user_turn(&message).await?;

        let phrase = if message.image.is_some() {
            phrases::image_analysis()
        } else {
            phrases::typing()
        };
        let status = sink.send(phrase).await?;

        if let Some(image) = &message.image {
            let text = if message.content.trim().is_empty() {
                "No additional text provided."
            } else {
                message.content.trim()
            };
            let caption = self.captioner.caption(&image.url, text).await;
            self.backoff
                .store()
                .append(&key, &[view_image_turn(&message.author_name, text, &caption)])
                .await?;
        }

        let result = self
            .respond(&key, &message, sink.as_ref(), &status)
            .await;
        self.touch_activity(&message).await;
        result
    }

    async fn respond(
        &self,
        key: &ConversationKey,
        message: &InboundMessage,
        sink: &dyn MessageSink,
        status: &MessageHandle,
    ) -> Result<(), CycleError> {
        let ctx = CycleContext {
            sink,
            status: Some(status),
            inbound: Some(&message.handle),
            is_direct: message.is_direct,
            announce_failures: true,
        };

        let functions = self.dispatcher.tools().definitions();
        let stream = match self.backoff.call(key, &functions, &ctx).await {
            Ok(stream) => stream,
            Err(e) => {
                if !matches!(e, CycleError::ExhaustedRetries { .. }) {
                    delete_quietly(sink, status).await;
                }
                return Err(e);
            }
        };

        let outcome = StreamingRelay::new(sink, &self.settings.relay, Some(status.clone()))
            .accept_tool_calls(true)
            .file_label(key.as_str())
            .scratch_dir(&self.settings.scratch_dir)
            .relay(stream)
            .await;

        if !outcome.text.is_empty() {
            self.backoff
                .store()
                .append(key, &[Turn::assistant(outcome.text.clone())])
                .await?;
        }

        match outcome.tool_call {
            Some(call) => {
                info!(tool = %call.name, "model requested a function");
                if let Err(e) = self.dispatcher.run(key, call, status, &ctx).await {
                    if matches!(e, CycleError::ModerationRejected { .. }) {
                        delete_quietly(sink, status).await;
                    }
                    return Err(e);
                }
            }
            None if outcome.text.is_empty() => {
                warn!("model returned an empty answer");
                delete_quietly(sink, status).await;
            }
            None => {}
        }
        Ok(())
    }

    /// Initialise the conversation if needed and append the formatted user turn.
    async fn record_user_turn(&self, message: &InboundMessage) -> byte_common::Result<()> {
        let store = self.backoff.store();
        let key = &message.conversation;
        if store.get(key).await?.is_none() {
            let turns = initial_conversation(message.is_direct, &self.settings.owner_name, None);
            store.replace(key, &turns).await?;
            info!("initialized new conversation");
        }

        let tz = self.timezone_of(&message.author_id).await;
        let content = format_user_turn(
            &message.author_id,
            &message.author_name,
            &message.content,
            tz,
            message.timestamp,
        );
        store.append(key, &[Turn::user(content)]).await?;
        Ok(())
    }

    async fn timezone_of(&self, user_id: &str) -> Tz {
        match self.timezones.get_timezone(user_id).await {
            Ok(Some(name)) => parse_timezone(&name).unwrap_or(Tz::UTC),
            Ok(None) => Tz::UTC,
            Err(e) => {
                warn!("timezone lookup failed: {e}");
                Tz::UTC
            }
        }
    }

    async fn touch_activity(&self, message: &InboundMessage) {
        let now = Utc::now();
        let next = next_nudge_at(
            now,
            self.settings.reengage_min_days,
            self.settings.reengage_max_days,
        );
        if let Err(e) = self
            .activity
            .touch(
                &message.conversation,
                &message.channel_id,
                message.is_direct,
                now,
                next,
            )
            .await
        {
            warn!("failed to record activity: {e}");
        }
    }

    fn send_busy_notice(&self, sink: Arc<dyn MessageSink>) {
        let linger = self.settings.busy_notice;
        tokio::spawn(async move {
            match sink.send(BUSY_NOTICE).await {
                Ok(handle) => {
                    tokio::time::sleep(linger).await;
                    delete_quietly(sink.as_ref(), &handle).await;
                }
                Err(e) => warn!("failed to send busy notice: {e}"),
            }
        });
    }
}

#[async_trait]
impl InboundHandler for ChatRuntime {
    async fn on_message(&self, message: InboundMessage, sink: Arc<dyn MessageSink>) {
        let key = message.conversation.clone();
        if let Err(e) = self.handle(message, sink).await {
            warn!(conversation = %key, "response cycle ended: {e}");
        }
    }
}

fn view_image_turn(author_name: &str, text: &str, caption: &str) -> Turn {
    Turn::function(
        "view_image",
        format!(
            "{author_name} said '{text}' and sent an image with the contents: '{caption}'. If the user didn't say anything, describe the image and any deductions you can gain from it to the user. When given an image caption from a specific source, refrain from disclosing the source or mentioning it in the response. Instead, smoothly integrate the information into your conversational reply as if it was naturally occluded from your analysis of the image."
        ),
    )
}

async fn delete_quietly(sink: &dyn MessageSink, handle: &MessageHandle) {
    if let Err(e) = sink.delete(handle).await {
        debug!("failed to delete message: {e}");
    }
}
