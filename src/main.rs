//! Assistant relay - main entry point.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use assistant_relay::{
    agent::Dispatcher,
    channels::{Channel, SlackApi, SlackChannel},
    cli::{Cli, Command, run_config_command},
    config::{Config, ContextStoreKind},
    context::{ContextStore, InMemoryContextStore, SlackMetadataContextStore},
    llm::OpenAiAssistants,
    relay::ConversationRelay,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    match &cli.command {
        Some(Command::Config { filter }) => {
            return run_config_command(&config, filter.as_deref());
        }
        None | Some(Command::Run) => {}
    }

    let api = Arc::new(SlackApi::new(&config.slack)?);
    let channel: Arc<dyn Channel> =
        Arc::new(SlackChannel::new(config.slack.clone(), Arc::clone(&api)));
    let runs = Arc::new(OpenAiAssistants::new(config.openai.clone())?);
    let contexts: Arc<dyn ContextStore> = match config.relay.context_store {
        ContextStoreKind::Memory => Arc::new(InMemoryContextStore::new()),
        ContextStoreKind::Slack => Arc::new(SlackMetadataContextStore::new(api)),
    };

    tracing::info!(
        assistant_id = %config.relay.assistant_id,
        context_store = config.relay.context_store.as_str(),
        "Starting assistant relay"
    );

    let relay = Arc::new(ConversationRelay::new(
        Arc::clone(&channel),
        runs,
        contexts,
        config.relay,
    ));
    let dispatcher = Dispatcher::new(channel, relay);

    dispatcher
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Assistant relay stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("assistant_relay=info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}
