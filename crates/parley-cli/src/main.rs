mod config;

use clap::{Parser, Subcommand};
use config::{ParleyConfig, StorageBackend, TransportMode};
use parley_channels::{Channel, MemoryChannel, TelegramChannel};
use parley_flows::{InMemoryUserDirectory, RegistrationFlow, UserDirectory};
use parley_gateway::{Dispatcher, GatewayServer, Router};
use parley_session::{
    ConversationStore, FileConversationStore, InMemoryConversationStore, SessionLocks,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Capacity of the queue between the Telegram poller and the dispatcher.
const EVENT_BUFFER: usize = 256;

#[derive(Parser)]
#[command(name = "parley", about = "Parley — conversational bot backend")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "parley.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot
    Serve {
        /// Host to bind to in webhook mode (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on in webhook mode (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List registered states and callback prefixes
    Routes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
    install_panic_hook();

    let cli = Cli::parse();
    let config = ParleyConfig::load(&cli.config)?;

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await?,
        Commands::Routes => {
            let store: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
            let router = build_router(
                &config,
                store,
                Arc::new(MemoryChannel::default()),
                Arc::new(InMemoryUserDirectory::new()),
            )?;

            println!("States:");
            for state in router.states() {
                println!("  {state}");
            }
            println!("Callback prefixes:");
            for prefix in router.callback_prefixes() {
                println!("  {prefix}");
            }
            println!(
                "Revert commands: {}",
                config.dispatch.revert_commands.join(", ")
            );
        }
    }

    Ok(())
}

/// Route panics through tracing so they land in the JSON log with a
/// backtrace. Handler panics are additionally reported by the dispatcher.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        error!(panic = %panic_info, backtrace = %backtrace, "Panic");
    }));
}

fn build_router(
    config: &ParleyConfig,
    store: Arc<dyn ConversationStore>,
    channel: Arc<dyn Channel>,
    directory: Arc<dyn UserDirectory>,
) -> anyhow::Result<Router> {
    let mut builder = Router::builder();
    builder.revert_commands(config.dispatch.revert_commands.iter().cloned());
    RegistrationFlow::with_delimiter(
        Arc::clone(&store),
        channel,
        directory,
        config.dispatch.callback_delimiter,
    )
    .install(&mut builder)?;
    Ok(builder.build(store)?)
}

async fn serve(config: ParleyConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let store: Arc<dyn ConversationStore> = match config.storage.backend {
        StorageBackend::File => {
            let dir = config.data_dir.join("sessions");
            info!(dir = %dir.display(), "Using file conversation store");
            Arc::new(FileConversationStore::new(dir).await?)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory conversation store; state is lost on restart");
            Arc::new(InMemoryConversationStore::new())
        }
    };

    let mut telegram = TelegramChannel::new(config.telegram_token()?, EVENT_BUFFER);
    let events = telegram
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("Telegram event receiver already taken"))?;
    let telegram = Arc::new(telegram);

    let router = build_router(
        &config,
        store,
        telegram.clone(),
        Arc::new(InMemoryUserDirectory::new()),
    )?;
    info!(
        states = router.states().len(),
        callbacks = router.callback_prefixes().len(),
        timeout_secs = config.dispatch.timeout_secs,
        "Routing table ready"
    );
    let dispatcher = Arc::new(
        Dispatcher::new(
            Arc::new(router),
            SessionLocks::new(),
            config.dispatch.timeout(),
        )
        .with_channel(telegram.clone()),
    );

    match config.telegram.mode {
        TransportMode::Polling => {
            telegram.delete_webhook().await?;
            let shutdown = CancellationToken::new();
            let runner = tokio::spawn(Arc::clone(&dispatcher).run(events, shutdown.clone()));
            info!("Parley started in polling mode");

            tokio::select! {
                result = telegram.poll_updates(config.telegram.poll_timeout_secs) => {
                    if let Err(e) = result {
                        error!(error = %e, "Telegram polling stopped");
                    }
                }
                _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
            }

            shutdown.cancel();
            if let Err(e) = runner.await {
                error!(error = %e, "Dispatcher task failed");
            }
        }
        TransportMode::Webhook => {
            if let Some(url) = &config.server.webhook_url {
                telegram
                    .set_webhook(url, config.server.secret.as_deref())
                    .await?;
                info!(url = %url, "Webhook registered with Telegram");
            }
            if config.server.secret.is_none() {
                warn!("No webhook secret configured; requests are not authenticated");
            }

            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);
            let app = GatewayServer::build(dispatcher, config.server.secret);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Parley webhook listening on {addr}");
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
    }

    info!("Parley stopped");
    Ok(())
}
