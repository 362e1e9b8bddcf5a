//! hdhr-proxy: HTTP front end for legacy HDHomeRun tuners.
//!
//! Serves an M3U playlist of the device's lineup and turns each
//! `/auto/v<channel>` request into a tuned tuner whose raw transport stream
//! is relayed as the response body.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

mod config;
mod device;
mod discovery;
mod logging;
mod scheduler;
mod tuner;
mod web;

use config::{Args, ConfigFile, ProxyConfig};
use device::{DeviceHandle, HdhrConfigLink};
use discovery::Discovery;
use scheduler::{Heartbeat, HeartbeatConfig};
use tuner::{ChannelDirectory, TunerAllocator, TunerPool};
use web::{RouteConfig, SessionRegistry};

/// Tuner count when neither the configuration nor the device says.
const FALLBACK_TUNER_COUNT: usize = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let file_config = match config::config_path(&args) {
        Some(path) => match config::load_config(&path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e.into());
            }
        },
        None => ConfigFile::default(),
    };

    let config = match ProxyConfig::resolve(args, file_config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = logging::init_logging(&config.logging)?;

    info!("hdhr-proxy {} starting", env!("CARGO_PKG_VERSION"));

    if config.server.advertises_unspecified_host() {
        warn!(
            "Listening on {} with no advertise host; playlist URLs for requests without a Host header \
             will not be reachable. Set --advertise-host or server.advertise_host",
            config.server.listen
        );
    }

    // Locate the device
    let address = match &config.device.address {
        Some(address) => address.clone(),
        None => locate_device(&config.device.hdhomerun_config, config.device.command_timeout).await?,
    };
    info!("Using device at {}", address);

    // Fetch discover.json and the channel lineup
    let device_info = match Discovery::new()?.fetch(&address).await {
        Ok(info) => info,
        Err(e) => {
            error!("Could not fetch channel lineup: {}", e);
            return Err(e.into());
        }
    };

    let directory = match ChannelDirectory::from_lineup(&device_info.lineup) {
        Ok(directory) => Arc::new(directory),
        Err(e) => {
            error!("Could not build channel directory: {}", e);
            return Err(e.into());
        }
    };

    let tuner_count = config
        .device
        .tuner_count
        .or(device_info.discover.tuner_count)
        .filter(|&n| n > 0)
        .unwrap_or_else(|| {
            warn!("Tuner count unknown, assuming {}", FALLBACK_TUNER_COUNT);
            FALLBACK_TUNER_COUNT
        });

    let device: DeviceHandle = Arc::new(HdhrConfigLink::new(
        config.device.hdhomerun_config.clone(),
        address.clone(),
        config.device.command_timeout,
    ));

    info!(
        "{} channels, {} tuners, modulation {}",
        directory.len(),
        tuner_count,
        config.device.modulation
    );

    let pool = Arc::new(TunerPool::new(Arc::clone(&device), tuner_count));
    let allocator = Arc::new(TunerAllocator::new(
        directory,
        pool,
        config.device.modulation.clone(),
    ));

    // Start the keep-alive heartbeat
    let _heartbeat = Heartbeat::new(
        Arc::clone(&device),
        HeartbeatConfig {
            interval: config.server.heartbeat_interval,
        },
    )
    .start();

    let web_state = Arc::new(web::state::WebState::new(
        allocator,
        Arc::new(SessionRegistry::new()),
        RouteConfig {
            playlist_path: config.server.playlist_path.clone(),
            stream_prefix: config.server.stream_prefix.clone(),
            advertise_host: config.server.advertise_host.clone(),
        },
    ));

    // Run server
    if let Err(e) = web::start_web_server(config.server.listen, web_state).await {
        error!("HTTP server error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Find the device with `hdhomerun_config discover`.
async fn locate_device(program: &Path, timeout: Duration) -> Result<String, Box<dyn std::error::Error>> {
    info!("No device address configured, running discovery");
    let devices = match HdhrConfigLink::discover(program, timeout).await {
        Ok(devices) => devices,
        Err(e) => {
            error!("Device discovery failed: {}", e);
            return Err(e.into());
        }
    };

    let Some(first) = devices.first() else {
        error!("No HDHomeRun device found on the network");
        return Err("no HDHomeRun device found".into());
    };
    if devices.len() > 1 {
        warn!("{} devices found, using the first one", devices.len());
    }
    info!("Found device {} at {}", first.device_id, first.address);
    Ok(first.address.clone())
}
