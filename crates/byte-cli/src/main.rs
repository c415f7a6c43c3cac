mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use byte_agents::{
    BackoffController, ChatRuntime, GenerateImage, GoogleSearch, HttpCaptioner, OpenAiInvoker,
    ReengageScheduler, RelayPolicy, RuntimeSettings, ScrapeWebPage, ToolDispatcher, ToolRegistry,
    WolframAlpha,
};
use byte_channels::discord::{DiscordChannel, DiscordSettings};
use byte_channels::{ChannelLifecycle, InboundHandler};
use byte_config::{AppConfig, ConfigLoader};
use byte_db::{ActivityStore, SqliteConversationStore, TimezoneStore};
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "byte")]
#[command(about = "Byte - a streaming LLM chat bot for Discord", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (defaults to ~/.byte/config.toml)
    #[arg(short, long, env = "BYTE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `byte_agents=debug` (overrides RUST_LOG)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let loader = match cli.config {
        Some(path) => ConfigLoader::new(path),
        None => ConfigLoader::default_location(),
    };
    let config = loader.load().context("failed to load configuration")?;

    run(config).await
}

fn build_tools(config: &AppConfig, api_key: &str) -> ToolRegistry {
    let mut tools = ToolRegistry::new();

    match (&config.tools.google_api_key, &config.tools.google_cse_id) {
        (Some(key), Some(cse)) => tools.register(Arc::new(GoogleSearch::new(key, cse))),
        _ => warn!("google search disabled: GOOGLE_API_KEY or GOOGLE_CSE_ID not set"),
    }
    tools.register(Arc::new(ScrapeWebPage::new()));
    match &config.tools.wolfram_app_id {
        Some(app_id) => tools.register(Arc::new(WolframAlpha::new(app_id))),
        None => warn!("wolfram alpha disabled: WOLFRAM_APP_ID not set"),
    }
    tools.register(Arc::new(GenerateImage::new(
        api_key,
        Some(config.llm.base_url.clone()),
        config.llm.image_models.clone(),
    )));

    info!("registered {} tools", tools.len());
    tools
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let Some(api_key) = config.llm.api_key.clone() else {
        bail!("no completion API key configured; set OPENAI_API_KEY or llm.api_key");
    };

    let data_dir = config.storage.resolved_data_dir();
    let scratch_dir = data_dir.join("scratch");
    std::fs::create_dir_all(&scratch_dir)
        .with_context(|| format!("failed to create {}", scratch_dir.display()))?;

    let db_path = config.storage.database_path();
    info!("database path: {}", db_path.display());
    let conversations = Arc::new(SqliteConversationStore::open(&db_path)?);
    let timezones = Arc::new(TimezoneStore::open(&db_path)?);
    let activity = Arc::new(ActivityStore::open(&db_path)?);

    let invoker = Arc::new(OpenAiInvoker::new(
        api_key.clone(),
        Some(config.llm.base_url.clone()),
    ));
    let backoff = Arc::new(BackoffController::new(
        invoker,
        conversations,
        config.llm.models.clone(),
        &config.backoff,
        config.owner_name.clone(),
    ));

    let dispatcher = Arc::new(ToolDispatcher::new(
        Arc::new(build_tools(&config, &api_key)),
        Arc::clone(&backoff),
        RelayPolicy::follow_up(&config.relay),
        &scratch_dir,
        config.owner_name.clone(),
    ));

    let settings = RuntimeSettings {
        scratch_dir: scratch_dir.clone(),
        ..RuntimeSettings::from_config(&config)
    };
    let runtime = Arc::new(ChatRuntime::new(
        settings,
        Arc::clone(&backoff),
        dispatcher,
        Arc::new(HttpCaptioner::new(config.tools.caption_endpoint())),
        timezones,
        Arc::clone(&activity),
    ));
    let gate = Arc::clone(runtime.gate());

    let discord_settings = DiscordSettings::from_config(&config.discord)?;
    let mut channel = DiscordChannel::new(discord_settings, runtime as Arc<dyn InboundHandler>);
    channel.connect().await?;
    info!("{} channel is {:?}", channel.display_name(), channel.status());

    let reengage = match (config.reengage.enabled, channel.sink_factory()) {
        (true, Some(sinks)) => {
            let scheduler = Arc::new(
                ReengageScheduler::new(
                    activity,
                    gate,
                    backoff,
                    sinks,
                    RelayPolicy::primary(&config.relay),
                    config.reengage.min_days,
                    config.reengage.max_days,
                    Duration::from_secs(config.reengage.poll_interval_secs.max(1)),
                )
                .with_scratch_dir(&scratch_dir),
            );
            info!("re-engagement scheduler started");
            Some(scheduler.spawn())
        }
        (true, None) => {
            warn!("re-engagement disabled: channel offers no outgoing sinks");
            None
        }
        (false, _) => None,
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    if let Some(task) = reengage {
        task.abort();
    }
    channel.disconnect().await?;
    Ok(())
}
