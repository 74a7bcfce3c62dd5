//! Jupyter Spy - log the iopub messages of a running kernel
//!
//! Writes a JSON array of messages to stdout or a file until interrupted.

use clap::Parser;
use jspy_capture::{CancellationToken, KernelClient, LogOptions, Spy};
use jspy_core::filter;
use jspy_core::{ConfigLoader, SpyConfig};
use jspy_export::Output;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "jupyter-spy")]
#[command(version)]
#[command(about = "Log the messages of a running Jupyter kernel", long_about = None)]
struct Cli {
    /// Kernel connection file, or a name to look up in the Jupyter runtime dir
    connect_info: String,

    /// File to write the messages to (default: stdout)
    output: Option<PathBuf>,

    /// Skip kernel status messages
    #[arg(long)]
    filter_status: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_error) = match ConfigLoader::new().load() {
        Ok(config) => (config, None),
        Err(e) => (SpyConfig::default(), Some(e)),
    };

    // Logs go to stderr; stdout may carry the JSON output
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.spy.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(e) = config_error {
        warn!("Failed to load configuration: {}, using defaults", e);
    }

    let mut spy = Spy::connect_with(kernel_client()?, cli.connect_info.as_str()).await?;

    eprintln!("Starting logging, press CTRL+C to stop...");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => trigger.cancel(),
            Err(e) => warn!("Failed to listen for CTRL+C: {}", e),
        }
    });

    let output = match cli.output {
        Some(path) => Output::file(path),
        None => Output::Stdout,
    };
    let stats = spy
        .log_iopub(output, capture_options(&config, cli.filter_status), cancel)
        .await?;

    info!(
        received = stats.received,
        written = stats.written,
        filtered = stats.filtered,
        "Logging stopped"
    );
    Ok(())
}

fn capture_options(config: &SpyConfig, filter_status: bool) -> LogOptions {
    let options = LogOptions::from_config(config);
    if filter_status && !config.capture.filter.filter_status {
        options.filter(filter::is_not_status())
    } else {
        options
    }
}

#[cfg(feature = "zmq")]
fn kernel_client() -> anyhow::Result<Box<dyn KernelClient>> {
    Ok(Box::new(jspy_capture::ZmqClient::new()))
}

#[cfg(not(feature = "zmq"))]
fn kernel_client() -> anyhow::Result<Box<dyn KernelClient>> {
    anyhow::bail!("No kernel transport compiled in; rebuild with `--features zmq`")
}
