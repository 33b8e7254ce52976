//! HTTP/HTTPS forwarding proxy.
//!
//! ```text
//!                       ┌────────────────────────────────────────────────┐
//!   client ──:80──────▶ │ listener (plain) ─▶ engine ─┐                  │
//!                       │                             ├─▶ target registry│──▶ upstream A
//!   client ──:443─TLS─▶ │ listener (TLS)   ─▶ engine ─┘   + retry policy │──▶ upstream B
//!                       │                                                │
//!                       │ events ─▶ logger / metrics                     │
//!                       └────────────────────────────────────────────────┘
//! ```
//!
//! Requests for local paths, or on a listener with no targets, are answered
//! by the proxy itself.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use http_forwarder::config::{read_config, validate_config, ConfigError, ProxyConfig};
use http_forwarder::lifecycle;
use http_forwarder::observability::logging::init_tracing;
use http_forwarder::ProxyError;

#[derive(Parser, Debug)]
#[command(name = "http-forwarder")]
#[command(about = "Forward HTTP and HTTPS requests to configured upstream hosts", long_about = None)]
struct Cli {
    /// Configuration file (JSON or TOML)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Port of the plain HTTP listener
    #[arg(long)]
    http_port: Option<u16>,

    /// Port of the TLS listener
    #[arg(long)]
    https_port: Option<u16>,

    /// Do not start the TLS listener
    #[arg(long)]
    no_https: bool,

    /// Directory holding ssl.cert and ssl.key
    #[arg(long)]
    cert_dir: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(port) = self.http_port {
            config.listener.http_port = port;
        }
        if let Some(port) = self.https_port {
            config.listener.https_port = port;
        }
        if self.no_https {
            config.listener.https_enabled = false;
        }
        if let Some(dir) = &self.cert_dir {
            config.tls.cert_dir = dir.clone();
        }
    }
}

fn load(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let mut config = read_config(&cli.config)?;
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), ProxyError> {
    let config = load(&cli)?;
    init_tracing(&config.observability.log_level);

    tracing::info!(
        config = %cli.config.display(),
        http_port = config.listener.http_port,
        https_port = config.listener.https_port,
        https_enabled = config.listener.https_enabled,
        "Configuration loaded"
    );

    lifecycle::run(config).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Tracing may not be up yet if the config failed to load.
            init_tracing("info");
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}
