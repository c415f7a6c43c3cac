use byte_channels::MessageSink;
use byte_common::{ConversationKey, MessageHandle, Role, Turn};
use byte_config::BackoffConfig;
use byte_db::ConversationStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{CycleError, InvocationError};
use crate::providers::{ChunkStream, ModelInvoker, ToolDefinition};

/// Where a cycle reports terminal failures.
pub struct CycleContext<'a> {
    pub sink: &'a dyn MessageSink,
    /// Status message shown while the cycle runs; deleted when retries run out.
    pub status: Option<&'a MessageHandle>,
    /// The user message that started the cycle; deleted on a guild moderation hit.
    pub inbound: Option<&'a MessageHandle>,
    pub is_direct: bool,
    /// Send moderation and apology notices to the channel.
    pub announce_failures: bool,
}

/// Retries the model invoker across a rotating list of models.
pub struct BackoffController {
    invoker: Arc<dyn ModelInvoker>,
    store: Arc<dyn ConversationStore>,
    models: Vec<String>,
    max_attempts: u32,
    attempt_timeout: Duration,
    initial_delay: Duration,
    owner_name: String,
}

impl BackoffController {
    pub fn new(
        invoker: Arc<dyn ModelInvoker>,
        store: Arc<dyn ConversationStore>,
        models: Vec<String>,
        config: &BackoffConfig,
        owner_name: impl Into<String>,
    ) -> Self {
        Self {
            invoker,
            store,
            models,
            max_attempts: config.max_attempts,
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
            initial_delay: Duration::from_secs(config.initial_delay_secs),
            owner_name: owner_name.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Start a completion for the stored conversation under `key`.
    ///
    /// Every attempt re-reads the conversation from the store. Model rotation
    /// starts from the first model on every call.
    pub async fn call(
        &self,
        key: &ConversationKey,
        functions: &[ToolDefinition],
        ctx: &CycleContext<'_>,
    ) -> Result<ChunkStream, CycleError> {
        let mut delay = self.initial_delay;

        for attempt in 0..self.max_attempts {
            let Some(model) = self.model_for(attempt) else {
                break;
            };
            let is_last = attempt + 1 == self.max_attempts;
            let turns = self.store.get(key).await?.unwrap_or_default();

            info!(conversation = %key, model = %model, attempt = attempt + 1, "invoking model");

            let result = tokio::time::timeout(
                self.attempt_timeout,
                self.invoker.invoke(model, &turns, functions),
            )
            .await
            .unwrap_or(Err(InvocationError::Timeout));

            match result {
                Ok(stream) => return Ok(stream),
                Err(InvocationError::Timeout) => {
                    warn!(conversation = %key, model = %model, "model call timed out after {:?}", self.attempt_timeout);
                }
                Err(InvocationError::RateLimited { wait_secs }) => {
                    warn!(conversation = %key, model = %model, wait_secs, "rate limit reached");
                    if !is_last {
                        tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    }
                }
                Err(InvocationError::Moderation { category }) => {
                    warn!(conversation = %key, %category, "conversation flagged by moderation");
                    self.redact(key, &category).await?;
                    self.notify_moderation(&category, ctx).await;
                    return Err(CycleError::ModerationRejected { category });
                }
                Err(e) => {
                    warn!(conversation = %key, model = %model, attempt = attempt + 1, "model call failed: {e}");
                    if !is_last {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        warn!(conversation = %key, attempts = self.max_attempts, "model unavailable, giving up");
        self.apologize(ctx).await;
        Err(CycleError::ExhaustedRetries {
            attempts: self.max_attempts,
        })
    }

    fn model_for(&self, attempt: u32) -> Option<&str> {
        if self.models.is_empty() {
            return None;
        }
        Some(&self.models[attempt as usize % self.models.len()])
    }

    /// Blank the last three non-system turns; the newest one names the
    /// category.
    async fn redact(&self, key: &ConversationKey, category: &str) -> Result<(), CycleError> {
        let Some(mut turns) = self.store.get(key).await? else {
            return Ok(());
        };
        if redact_recent_turns(&mut turns, category) {
            self.store.replace(key, &turns).await?;
            info!(conversation = %key, "removed recent turns after moderation flag");
        }
        Ok(())
    }

    async fn notify_moderation(&self, category: &str, ctx: &CycleContext<'_>) {
        if !ctx.announce_failures {
            return;
        }
        if !ctx.is_direct {
            if let Some(inbound) = ctx.inbound {
                if let Err(e) = ctx.sink.delete(inbound).await {
                    warn!("failed to delete flagged message: {e}");
                }
            }
        }
        let notice = format!(
            "Your message was ignored because of moderation category: {category}. \
             Please be more respectful in the future. \
             The last few messages in the conversation were removed."
        );
        if let Err(e) = ctx.sink.send(&notice).await {
            warn!("failed to send moderation notice: {e}");
        }
    }

    async fn apologize(&self, ctx: &CycleContext<'_>) {
        if let Some(status) = ctx.status {
            if let Err(e) = ctx.sink.delete(status).await {
                warn!("failed to delete status message: {e}");
            }
        }
        if !ctx.announce_failures {
            return;
        }
        let apology = format!(
            "I'm really sorry but I'm having some trouble connecting with the service I need to chat properly. \
             Could you please reach out to {} if this keeps happening?",
            self.owner_name
        );
        if let Err(e) = ctx.sink.send(&apology).await {
            warn!("failed to send apology: {e}");
        }
    }
}

/// Returns whether anything changed.
pub(crate) fn redact_recent_turns(turns: &mut [Turn], category: &str) -> bool {
    let candidates: Vec<usize> = turns
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, t)| t.role != Role::System)
        .map(|(i, _)| i)
        .take(3)
        .collect();

    for (n, idx) in candidates.iter().enumerate() {
        turns[*idx].content = if n == 0 {
            format!("[flagged for moderation category: {category}]")
        } else {
            "[]".to_string()
        };
    }
    !candidates.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_last_three_turns() {
        let mut turns = vec![
            Turn::system("sys"),
            Turn::user("a"),
            Turn::assistant("b"),
            Turn::user("c"),
            Turn::assistant("d"),
            Turn::user("e"),
        ];
        assert!(redact_recent_turns(&mut turns, "hate"));
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "sys",
                "a",
                "b",
                "[]",
                "[]",
                "[flagged for moderation category: hate]"
            ]
        );
    }

    #[test]
    fn short_conversation_keeps_system_prompt() {
        let mut turns = vec![Turn::system("sys"), Turn::user("bad")];
        assert!(redact_recent_turns(&mut turns, "violence"));
        assert_eq!(turns[0].content, "sys");
        assert_eq!(turns[1].content, "[flagged for moderation category: violence]");
    }

    #[test]
    fn nothing_to_redact() {
        let mut turns = vec![Turn::system("sys")];
        assert!(!redact_recent_turns(&mut turns, "x"));
    }
}
