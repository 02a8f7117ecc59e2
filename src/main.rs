use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use viewport_stream::capture::{CaptureHost, PatternHost};
use viewport_stream::config::{ConfigStore, ExecutionModel};
use viewport_stream::state::AppState;
use viewport_stream::stream::{ClientContext, ClientSettings, Server, TransportEvent};
use viewport_stream::utils::LogThrottler;
use viewport_stream::video::EncoderRegistry;
use viewport_stream::web;

/// Inbound socket events buffered ahead of the server loop
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// viewport-stream command line arguments
#[derive(Parser, Debug)]
#[command(name = "viewport-stream")]
#[command(version, about = "Live capture-to-WebSocket video streaming server", long_about = None)]
struct CliArgs {
    /// Configuration file (TOML)
    #[arg(short = 'c', long, value_name = "FILE", default_value = "viewport-stream.toml")]
    config: PathBuf,

    /// Write the effective configuration to the config file if it does not exist
    #[arg(long)]
    write_default: bool,

    /// Listen address (overrides config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Default codec (overrides config)
    #[arg(long, value_name = "CODEC")]
    codec: Option<String>,

    /// Execution model (overrides config)
    #[arg(long, value_name = "MODEL")]
    model: Option<ExecutionModel>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting viewport-stream v{}", env!("CARGO_PKG_VERSION"));

    let config_store = ConfigStore::load(&args.config).await?;
    if args.write_default && !args.config.exists() {
        config_store.save().await?;
    }

    // CLI overrides are applied in memory only
    config_store.update(|config| {
        if let Some(address) = &args.address {
            config.web.bind_address = address.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(codec) = &args.codec {
            config.stream.codec = codec.clone();
        }
        if let Some(model) = args.model {
            config.stream.execution_model = model;
        }
    })?;
    let config = config_store.get();

    let registry = Arc::new(EncoderRegistry::with_builtin());
    if !registry.is_available(&config.stream.codec) {
        tracing::warn!(
            "Default codec {} is not available; clients must select one",
            config.stream.codec
        );
    }

    let host: Arc<dyn CaptureHost> = Arc::new(PatternHost::from_config(&config.capture));
    let throttler = Arc::new(LogThrottler::default());

    let ctx = Arc::new(ClientContext {
        registry: registry.clone(),
        host: host.clone(),
        settings: ClientSettings::from_config(&config.stream),
        throttler: throttler.clone(),
    });
    let server = Server::new(ctx, config.stream.max_clients);
    let clients = server.snapshot();

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let token = CancellationToken::new();
    let server_thread = spawn_server(server, events_rx, token.clone())?;

    let state = AppState::new(
        config_store.clone(),
        registry,
        host,
        events_tx,
        clients,
        throttler,
    );
    let app = web::create_router(state);

    let ip: IpAddr = config
        .web
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {:?}", config.web.bind_address))?;
    let addr = SocketAddr::new(ip, config.web.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(
        "Listening on http://{} (WebSocket at {}, codec {}, model {})",
        addr,
        config.web.ws_path,
        config.stream.codec,
        config.stream.execution_model
    );

    let shutdown_signal = {
        let token = token.clone();
        async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    }
                    tracing::info!("Shutdown signal received");
                }
                _ = token.cancelled() => {}
            }
            token.cancel();
        }
    };

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await;
    if let Err(e) = &served {
        tracing::error!("HTTP server error: {}", e);
    }

    token.cancel();
    match tokio::task::spawn_blocking(move || server_thread.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::error!("Stream server thread panicked"),
        Err(e) => tracing::error!("Failed to join stream server thread: {}", e),
    }

    tracing::info!("Shutdown complete");
    served.map_err(Into::into)
}

/// Run the server loop on its own thread
///
/// Inline encoding is CPU-bound, so the loop gets a dedicated
/// single-threaded runtime instead of sharing the HTTP workers.
fn spawn_server(
    server: Server,
    events: mpsc::Receiver<TransportEvent>,
    token: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to build stream server runtime")?;

    let handle = std::thread::Builder::new()
        .name("stream-server".to_string())
        .spawn(move || runtime.block_on(server.run(events, token)))
        .context("failed to spawn stream server thread")?;
    Ok(handle)
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "viewport_stream=error,tower_http=error",
        LogLevel::Warn => "viewport_stream=warn,tower_http=warn",
        LogLevel::Info => "viewport_stream=info,tower_http=info",
        LogLevel::Verbose => "viewport_stream=debug,tower_http=info",
        LogLevel::Debug => "viewport_stream=debug,tower_http=debug",
        LogLevel::Trace => "viewport_stream=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
