//! `hfp-hf`: a Hands-Free unit talking to an AG over TCP.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use hfp_hf::{DeviceAddress, HfConfig};
use hfp_runner::{Result, Runner};

#[derive(Parser, Debug)]
#[command(name = "hfp-hf")]
#[command(about = "Bluetooth Hands-Free unit over a TCP emulated RFCOMM link")]
struct Args {
    /// HF configuration (YAML). Defaults to a full featured HF.
    #[arg(long)]
    config: Option<PathBuf>,

    /// AG endpoint, `host:port`.
    #[arg(long)]
    connect: String,

    /// Bluetooth address the AG is known by.
    #[arg(long, default_value = "00:00:00:00:00:01")]
    address: DeviceAddress,

    /// Log filter, overrides RUST_LOG (e.g. `debug`, `hfp_hf=trace`).
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Forward stdin lines until EOF.
fn spawn_console() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => HfConfig::from_file(path)?,
        None => HfConfig::default(),
    };
    hfp_hf::telemetry::describe_metrics();

    let runner = Runner::new(&config, args.address, &args.connect)?;
    eprintln!("{}", hfp_runner::console::HELP);
    runner.run(spawn_console()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
