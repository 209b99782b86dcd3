use clap::Parser;
use openai_shim::config::config_search_paths;
use openai_shim::{build_router, AppState, ProxyConfig, RandomIds, SharedLogger, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "openai-shim",
    about = "OpenAI-compatible chat completions in front of a native chat backend",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Backend base URL (overrides config)
    #[arg(long)]
    backend_url: Option<String>,

    /// Log file path
    #[arg(long, default_value = "openai-shim.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "openai_shim=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = cli.backend_url {
        config.backend.base_url = url;
    }

    // Fail on a bad backend URL before accepting traffic
    let chat_url = config.effective_chat_url()?;

    let logger = SharedLogger::new(&cli.log_file)?;

    info!("openai-shim v{}", env!("CARGO_PKG_VERSION"));
    info!("  Backend:   {}", chat_url);
    info!("  Timeout:   {}s", config.backend.timeout_secs);
    info!("  Port:      {}", config.port);
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!("Starting openai-shim backend={} port={}", chat_url, config.port),
    );

    let client = reqwest::Client::builder()
        .timeout(config.backend_timeout())
        .build()?;

    let port = config.port;
    let state = Arc::new(AppState {
        config,
        client,
        logger,
        ids: Arc::new(RandomIds),
        clock: Arc::new(SystemClock),
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  OPENAI_BASE_URL=http://localhost:{}/v1", port);

    axum::serve(listener, app).await?;

    Ok(())
}
