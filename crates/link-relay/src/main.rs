mod bitly;
mod config;
mod error;
mod logging;
mod web;

use anyhow::Result;
use bitly::BitlyClient;
use clap::Parser;
use config::{DEFAULT_BITLY_API_BASE, DEFAULT_BUILD_DIR, DEFAULT_PORT, RelayConfig};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "link-relay",
    version,
    about = "Serve the gallery bundle and shorten image links through Bitly."
)]
struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, default_value = "0.0.0.0")]
    bind_address: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory holding the pre-built gallery bundle.
    #[arg(long, env = "BUILD_DIR", default_value = DEFAULT_BUILD_DIR)]
    build_dir: PathBuf,

    /// Bitly API root, overridable for staging.
    #[arg(long, env = "BITLY_API_BASE", default_value = DEFAULT_BITLY_API_BASE)]
    bitly_api_base: String,

    #[arg(long, env = "BITLY_API_TOKEN", hide_env_values = true, hide = true)]
    bitly_api_token: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = try_main().await {
        error!(error = ?err, "link-relay exited with error");
        std::process::exit(1);
    }
}

async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config = RelayConfig {
        bind_address: cli.bind_address,
        port: cli.port,
        build_dir: cli.build_dir,
        bitly_api_base: cli.bitly_api_base,
        bitly_api_token: cli.bitly_api_token,
    }
    .validated()?;

    info!(
        addr = %config.socket_addr(),
        build_dir = %config.build_dir.display(),
        bitly = %config.bitly_api_base,
        "starting link-relay"
    );

    let client = BitlyClient::new(config.bitly_api_base.clone())?;
    web::run(client, config).await
}
