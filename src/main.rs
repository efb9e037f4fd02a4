use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chromecaster::{
    locate_device, AddressResolver, ChromeCaster, DeviceDirectory, MdnsDirectory,
    RustCastController, ServeConfig, DEFAULT_PORT,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Exit status when no device matches, as the scripts calling this expect.
const DEVICE_NOT_FOUND_EXIT: i32 = -1;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cast a video file to your ChromeCast.", long_about = None)]
struct Args {
    /// Video file to play on the ChromeCast
    #[arg(short, long, required_unless_present = "list")]
    filename: Option<PathBuf>,

    /// Name of the ChromeCast to use
    #[arg(short, long)]
    cast_name: Option<String>,

    /// Port to use on this device for providing video data
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// IP to use on this device for serving video data (default: guess)
    #[arg(short, long)]
    ip: Option<String>,

    /// Print some information on separate steps
    #[arg(short, long)]
    verbose: bool,

    /// Seconds to browse the network for cast devices
    #[arg(short = 't', long, default_value = "5")]
    discovery_timeout: u64,

    /// List discovered cast devices as JSON lines and exit
    #[arg(short, long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let directory = MdnsDirectory::new(Duration::from_secs(args.discovery_timeout));

    if args.list {
        for device in directory.list_devices().await? {
            println!("{}", serde_json::to_string(&device)?);
        }
        return Ok(());
    }

    let target = match locate_device(&directory, args.cast_name.as_deref()).await {
        Ok(target) => target,
        Err(e) if e.is_device_not_found() => {
            eprintln!("ERROR: {}.", e);
            std::process::exit(DEVICE_NOT_FOUND_EXIT);
        }
        Err(e) => return Err(e).context("device discovery failed"),
    };

    let ip = match args.ip {
        Some(ip) => ip,
        None => AddressResolver::default()
            .resolve()
            .context("pass the address to advertise with --ip")?
            .to_string(),
    };

    let filename = args
        .filename
        .context("--filename is required unless --list is given")?;
    let config = ServeConfig::new(ip, args.port, filename);
    let caster = ChromeCaster::new(target, config, RustCastController);

    caster.play_file(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("stop requested, shutting down media server");
}
