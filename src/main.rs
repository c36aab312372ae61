mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use args::Args;
use voice_relay::io::{CpalDevice, UdpVoiceSession, VoiceSession, list_devices};
use voice_relay::relay::DuplexPipeline;

fn main() {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    if args.list_devices {
        for device in list_devices()? {
            println!("{}", device);
        }
        return Ok(());
    }

    let config = args.relay_config().validate()?;
    info!("Starting voice relay {}", env!("CARGO_PKG_VERSION"));

    let remote = args.remote_addr()?;
    let session = Arc::new(UdpVoiceSession::open(args.bind, remote)?);
    let device = CpalDevice::new(config.input_device.clone(), config.output_device.clone());

    let voice: Arc<dyn VoiceSession> = session.clone();
    let mut pipeline = DuplexPipeline::start(&config, &device, voice)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down");
    pipeline.stop();
    session.shutdown();

    Ok(())
}
