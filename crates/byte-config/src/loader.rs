use byte_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::model::{AppConfig, default_data_dir};

/// Loads `AppConfig` from an optional TOML file, then overlays secrets and
/// endpoints from the process environment (after reading `.env`).
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loader pointing at `~/.byte/config.toml`.
    pub fn default_location() -> Self {
        Self::new(default_data_dir().join("config.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AppConfig> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("no .env file loaded: {e}");
        }
        let mut config = self.load_file()?;
        apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Read only the TOML file; a missing file yields defaults.
    pub fn load_file(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            info!(
                "config file {} not found, using defaults",
                self.path.display()
            );
            return Ok(AppConfig::default());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        let config: AppConfig = toml::from_str(&raw).map_err(|e| {
            Error::Config(format!("invalid config file {}: {e}", self.path.display()))
        })?;
        info!("loaded config from {}", self.path.display());
        Ok(config)
    }
}

/// Apply environment overrides using `lookup` so tests can supply a fake
/// environment.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = get("DISCORD_TOKEN") {
        config.discord.bot_token = Some(token);
    }
    if let Some(key) = get("OPENAI_API_KEY") {
        config.llm.api_key = Some(key);
    }
    if let Some(base) = get("OPENAI_API_BASE") {
        config.llm.base_url = base;
    }
    if let Some(key) = get("GOOGLE_API_KEY") {
        config.tools.google_api_key = Some(key);
    }
    if let Some(cse) = get("GOOGLE_CSE_ID") {
        config.tools.google_cse_id = Some(cse);
    }
    if let Some(app_id) = get("WOLFRAM_APP_ID") {
        config.tools.wolfram_app_id = Some(app_id);
    }
    if let Some(endpoint) = get("BYTE_CAPTION_ENDPOINT") {
        config.tools.caption_endpoint = Some(endpoint);
    }
    if let Some(dir) = get("BYTE_DATA_DIR") {
        config.storage.data_dir = Some(PathBuf::from(dir));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("nope.toml"));
        let config = loader.load_file().expect("defaults");
        assert_eq!(config.backoff.max_attempts, 5);
    }

    #[test]
    fn reads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [llm]
            models = ["a", "b", "c"]

            [relay]
            edit_budget_chars = 40
            "#
        )
        .unwrap();

        let config = ConfigLoader::new(file.path()).load_file().unwrap();
        assert_eq!(config.llm.models, vec!["a", "b", "c"]);
        assert_eq!(config.relay.edit_budget_chars, 40);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backoff = [not valid").unwrap();

        let err = ConfigLoader::new(file.path()).load_file().unwrap_err();
        assert!(matches!(err, Error::Config(_)), "unexpected error: {err}");
    }

    #[test]
    fn env_overrides_secrets_and_ignores_blank_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DISCORD_TOKEN", "token-123"),
            ("OPENAI_API_BASE", "http://localhost:1234/v1"),
            ("GOOGLE_API_KEY", "   "),
            ("BYTE_DATA_DIR", "/tmp/byte-data"),
        ]);

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.discord.bot_token.as_deref(), Some("token-123"));
        assert_eq!(config.llm.base_url, "http://localhost:1234/v1");
        assert!(config.tools.google_api_key.is_none());
        assert_eq!(
            config.storage.database_path(),
            PathBuf::from("/tmp/byte-data/byte.db")
        );
    }
}
