use clap::Parser;
use pkg_api::server::{ServerConfig, start_server};
use pkg_constants::state::RESYNC_INTERVAL_SECS;
use pkg_types::config::{ControllerConfigFile, load_config_file};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "quotient-controller",
    about = "Tenant quota controller and API server"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = "/etc/quotient/config.yaml")]
    config: String,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Bearer token required on API requests
    #[arg(long)]
    token: Option<String>,

    /// Seconds between full resync passes
    #[arg(long)]
    resync_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: ControllerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let port = cli.port.or(file_cfg.port).unwrap_or(8443);
    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| "/var/lib/quotient/data".to_string());
    let token = cli
        .token
        .or(file_cfg.token)
        .unwrap_or_else(|| "quotient-dev-token".to_string());
    let resync_secs = cli
        .resync_secs
        .or(file_cfg.resync_secs)
        .unwrap_or(RESYNC_INTERVAL_SECS);

    info!("Starting quotient-controller");
    info!("  Port:      {}", port);
    info!("  Data dir:  {}", data_dir);
    info!("  Token:     {}***", &token[..token.len().min(4)]);
    info!("  Resync:    {}s", resync_secs);

    let config = ServerConfig {
        addr: SocketAddr::from(([0, 0, 0, 0], port)),
        data_dir,
        token,
        resync_interval: Duration::from_secs(resync_secs),
    };

    start_server(config).await?;

    Ok(())
}
