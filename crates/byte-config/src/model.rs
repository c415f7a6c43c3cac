use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration. Every field has a default so a partial TOML file
/// (or none at all, with secrets supplied through the environment) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discord: DiscordConfig,
    pub llm: LlmConfig,
    pub backoff: BackoffConfig,
    pub relay: RelayConfig,
    pub tools: ToolsConfig,
    pub storage: StorageConfig,
    pub reengage: ReengageConfig,
    /// Person users are told to contact when the bot cannot reach the model.
    pub owner_name: String,
    /// How long the "busy" notice stays up before it is deleted.
    pub busy_notice_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            discord: DiscordConfig::default(),
            llm: LlmConfig::default(),
            backoff: BackoffConfig::default(),
            relay: RelayConfig::default(),
            tools: ToolsConfig::default(),
            storage: StorageConfig::default(),
            reengage: ReengageConfig::default(),
            owner_name: "Xeniox".to_string(),
            busy_notice_secs: 5,
        }
    }
}

impl AppConfig {
    pub fn busy_notice(&self) -> Duration {
        Duration::from_secs(self.busy_notice_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub bot_token: Option<String>,
    /// Guild messages are only answered when they contain this word.
    pub trigger_word: String,
    /// Guild role allowed to clear a channel's conversation.
    pub manager_role: String,
    /// Presence phrases rotated while the bot is online.
    pub status_phrases: Vec<String>,
    pub status_interval_secs: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            trigger_word: "byte".to_string(),
            manager_role: "Bot Manager".to_string(),
            status_phrases: vec!["with time".to_string(), "fortnite".to_string()],
            status_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Chat models tried in rotation, one per attempt.
    pub models: Vec<String>,
    /// Image models tried in order until one returns images.
    pub image_models: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            models: vec![
                "gpt-4-1106-preview".to_string(),
                "gpt-4-1106-preview".to_string(),
            ],
            image_models: vec![
                "dall-e-3".to_string(),
                "sdxl".to_string(),
                "stable-diffusion-2.1".to_string(),
                "kandinsky-2.2".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub attempt_timeout_secs: u64,
    pub initial_delay_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout_secs: 10,
            initial_delay_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// New characters required before the live message is edited again.
    pub edit_budget_chars: usize,
    /// Edit budget used for the follow-up answer after a tool call.
    pub follow_up_edit_budget_chars: usize,
    pub min_edit_interval_ms: u64,
    pub max_message_chars: usize,
    /// Responses longer than this are delivered as a text file.
    pub file_threshold_chars: usize,
    /// A response stream silent for this long is treated as broken.
    pub stream_idle_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            edit_budget_chars: 75,
            follow_up_edit_budget_chars: 50,
            min_edit_interval_ms: 300,
            max_message_chars: 2000,
            file_threshold_chars: 4000,
            stream_idle_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub google_api_key: Option<String>,
    pub google_cse_id: Option<String>,
    pub wolfram_app_id: Option<String>,
    pub caption_endpoint: Option<String>,
}

impl ToolsConfig {
    pub const DEFAULT_CAPTION_ENDPOINT: &'static str = "http://localhost:6969/analyze-image";

    pub fn caption_endpoint(&self) -> &str {
        self.caption_endpoint
            .as_deref()
            .unwrap_or(Self::DEFAULT_CAPTION_ENDPOINT)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the SQLite database. Defaults to `~/.byte`.
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolved_data_dir().join("byte.db")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReengageConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub min_days: f64,
    pub max_days: f64,
}

impl Default for ReengageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 60,
            min_days: 2.0,
            max_days: 4.0,
        }
    }
}

pub(crate) fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".byte"))
        .unwrap_or_else(|| PathBuf::from(".byte"))
}
