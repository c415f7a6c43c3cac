use byte_common::{Error, Result};
use byte_config::DiscordConfig;
use serenity::all::GatewayIntents;
use std::time::Duration;

/// Discord connection settings resolved from the application config.
#[derive(Debug, Clone)]
pub struct DiscordSettings {
    /// Bot token for authenticating with Discord.
    pub bot_token: String,

    /// Gateway intents to request from Discord.
    pub intents: GatewayIntents,

    /// Presence phrases shown as "Playing ...".
    pub status_phrases: Vec<String>,

    pub status_interval: Duration,
}

impl DiscordSettings {
    pub fn from_config(config: &DiscordConfig) -> Result<Self> {
        let bot_token = config
            .bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config("discord bot_token is required".into()))?;

        // GUILD_MEMBERS is needed to resolve the author's role names for !clear.
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_MEMBERS;

        Ok(Self {
            bot_token,
            intents,
            status_phrases: config.status_phrases.clone(),
            status_interval: Duration::from_secs(config.status_interval_secs.max(1)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config_parses_successfully() {
        let config = DiscordConfig {
            bot_token: Some("my-secret-token".into()),
            ..DiscordConfig::default()
        };

        let settings = DiscordSettings::from_config(&config).expect("should parse valid config");
        assert_eq!(settings.bot_token, "my-secret-token");
        assert!(settings.intents.contains(GatewayIntents::MESSAGE_CONTENT));
        assert!(settings.intents.contains(GatewayIntents::DIRECT_MESSAGES));
        assert_eq!(settings.status_interval, Duration::from_secs(300));
    }

    #[test]
    fn missing_bot_token_fails() {
        let err = DiscordSettings::from_config(&DiscordConfig::default())
            .expect_err("should fail without token");
        assert!(err.to_string().contains("bot_token"));
    }

    #[test]
    fn empty_bot_token_fails() {
        let config = DiscordConfig {
            bot_token: Some("   ".into()),
            ..DiscordConfig::default()
        };
        let err = DiscordSettings::from_config(&config).expect_err("should fail with empty token");
        assert!(err.to_string().contains("bot_token"));
    }
}
