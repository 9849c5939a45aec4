mod http;

use clap::Parser;
use iptv_core::config::Config;
use iptv_core::{LogoCache, PlaylistStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[derive(Parser)]
#[command(name = "iptv-daemon")]
#[command(about = "IPTV channel catalog daemon")]
#[command(version)]
struct Args {
    /// Config file (default: <config dir>/iptv/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging(config: &Config) -> anyhow::Result<PathBuf> {
    let log_dir = &config.daemon.log_dir;
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(format!("{}.log", chrono::Local::now().format("%Y-%m-%d")));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    let stderr_layer = config
        .daemon
        .log_to_stderr
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr).boxed());

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,iptv_daemon=debug,iptv_core=debug")
            }),
        )
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)?;

    let log_path = init_logging(&config)?;
    info!("Log file: {:?}", log_path);
    info!("Config loaded from: {:?}", config_path);

    let logos = Arc::new(LogoCache::from_config(&config.logos));
    let store = Arc::new(PlaylistStore::new(config.daemon.state_file.clone()));

    if config.playlist.source.is_empty() {
        warn!("No playlist source configured, starting with an empty catalog");
    } else if let Err(e) = store
        .reload(
            &config.playlist.source,
            &logos,
            config.playlist.reload_timeout(),
        )
        .await
    {
        warn!("Initial playlist load failed: {}", e);
    }

    if !config.http.enabled {
        info!("HTTP API disabled, nothing to serve");
        return Ok(());
    }

    let state = http::HttpState {
        store,
        logos,
        playlist: config.playlist.clone(),
    };
    http::start_server(config.http.bind_address.clone(), config.http.port, state).await?;

    Ok(())
}
