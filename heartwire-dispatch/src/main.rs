use std::path::PathBuf;

use clap::Parser;
use heartwire_dispatch::{
    Config, MockSettings, MockTransport, OutletSink, Transport, TransportConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "heartwire-dispatch")]
#[command(about = "Polar H10 to six-channel stream dispatcher")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "heartwire-dispatch.toml")]
    config: PathBuf,

    /// Address of the strap to connect to, overrides `transport.address`
    #[arg(short, long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "heartwire_dispatch=info,heartwire_core=info,heartwire_outlet=info".to_owned()
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    if let Some(device) = cli.device {
        match &mut config.transport {
            TransportConfig::Ble { address, .. } => *address = Some(device),
            TransportConfig::Mock { .. } => warn!("--device has no effect with the mock transport"),
        }
    }

    info!(
        http_addr = %config.server.http_addr,
        outlet_addr = %config.outlet.addr,
        policy = ?config.session.on_partial_subscription,
        "Starting heartwire-dispatch"
    );

    match config.transport.clone() {
        TransportConfig::Mock {
            ecg_frame_ms,
            acc_frame_ms,
            hr_interval_ms,
        } => {
            info!(ecg_frame_ms, acc_frame_ms, hr_interval_ms, "Using mock transport");
            let transport = MockTransport::new(MockSettings::from_millis(
                ecg_frame_ms,
                acc_frame_ms,
                hr_interval_ms,
            ));
            dispatch(transport, config).await?;
        }
        #[cfg(feature = "ble")]
        TransportConfig::Ble {
            name_pattern,
            address,
            scan_secs,
        } => {
            info!(%name_pattern, ?address, scan_secs, "Using BLE transport");
            let transport = heartwire_dispatch::BleTransport::new(heartwire_dispatch::BleSettings {
                name_pattern,
                address,
                scan: std::time::Duration::from_secs(scan_secs),
                teardown_timeout: config.session.teardown_timeout(),
            });
            dispatch(transport, config).await?;
        }
        #[cfg(not(feature = "ble"))]
        TransportConfig::Ble { .. } => {
            return Err(color_eyre::eyre::eyre!(
                "BLE transport requested but heartwire-dispatch was built without the `ble` feature"
            ));
        }
    }

    Ok(())
}

async fn dispatch<T: Transport>(transport: T, config: Config) -> color_eyre::Result<()> {
    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            shutdown_for_signal.cancel();
        }
    });

    let sink = OutletSink::new(&config.outlet);
    let summary = heartwire_dispatch::run_dispatcher(transport, sink, config, shutdown).await?;
    info!(outcome = ?summary.outcome, "heartwire-dispatch shut down complete");
    Ok(())
}
