use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use supernate_generator::composer::SelectionState;
use supernate_generator::config_store::ConfigStore;
use supernate_generator::inference::HttpInference;
use supernate_generator::path_utils::{get_base_dir, resolve_config_path};
use supernate_generator::server::{bind_listener, AppServer, AppState};
use supernate_generator::upstream::UpstreamClient;
use supernate_generator::workflow::Generator;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "supernate_generator",
    version,
    about = "Compose a SuperNate prompt and send it to an image model"
)]
struct Args {
    /// Config file (created with defaults when missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Preferred port; the next free one is used if taken
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let base_dir = get_base_dir();
    let config_path = resolve_config_path(args.config, &base_dir);
    let config = ConfigStore::new(config_path.clone())
        .with_context(|| format!("config error: {}", config_path.display()))?;
    info!(path = %config_path.display(), "config loaded");

    let listener = bind_listener(args.port.unwrap_or_else(|| config.server_port()))?;
    let port = listener
        .local_addr()
        .context("failed to inspect server local address")?
        .port();

    let timeout = config.request_timeout();
    let transport = HttpInference::new(&config.inference_url(port), timeout)?;
    info!(endpoint = transport.endpoint(), "inference endpoint");

    let auth_env = config.upstream_auth_env();
    let upstream = UpstreamClient::new(
        &config.upstream_model_url(),
        env::var(&auth_env).ok(),
        timeout,
    )?;
    if !upstream.is_configured() {
        warn!("upstream.model_url or ${auth_env} is not set; /api/generate will answer with errors");
    }

    let catalog = config.catalog();
    let initial = SelectionState::initial(
        &catalog,
        &config.initial_environment(),
        &config.initial_descriptors(),
    );
    let generator = Generator::new(Arc::new(transport), config.retry_policy());
    let state = Arc::new(AppState::new(catalog, initial, generator, upstream));

    let mut server = AppServer::start(state, listener).context("failed to start server")?;
    println!(
        "SuperNate Generator running at http://127.0.0.1:{}/",
        server.port()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("failed to listen for Ctrl-C")?;

    info!("shutting down");
    server.stop();
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("SUPERNATE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
