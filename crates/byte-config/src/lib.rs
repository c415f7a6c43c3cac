pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{
    AppConfig, BackoffConfig, DiscordConfig, LlmConfig, ReengageConfig, RelayConfig,
    StorageConfig, ToolsConfig,
};
