#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use videocat::{
    api::{self, AppState},
    config::{self, CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH},
    fields::FieldPaths,
    query::FilterCompiler,
    security,
    store::SqliteStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the video catalog API.")]
struct Cli {
    #[arg(
        long = "config",
        value_name = "PATH",
        env = CONFIG_PATH_VAR,
        default_value = DEFAULT_CONFIG_PATH,
        help = "Path to the KEY=VALUE config file"
    )]
    config: PathBuf,
    #[arg(long = "allow-root", help = "Skip the refusal to run as root")]
    allow_root: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "videocat=info,backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    security::check_privileges(cli.allow_root)?;

    let settings = config::load_settings_from(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    tracing::info!(
        db = %settings.db_path.display(),
        layout = ?settings.field_layout,
        search_fallback = ?settings.search_fallback,
        "starting video catalog"
    );

    let paths = FieldPaths::for_layout(settings.field_layout);
    let store = SqliteStore::open(&settings.db_path, paths.clone())
        .context("initializing catalog store")?;
    let compiler = FilterCompiler::new(paths, settings.search_fallback);
    let state = AppState::new(store.clone(), compiler, settings.max_page_limit);

    let addr = settings.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    tokio::task::spawn_blocking(move || store.close())
        .await
        .context("closing catalog store")??;
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(err) => tracing::error!(error = %err, "failed to install Ctrl+C handler"),
    }
}
