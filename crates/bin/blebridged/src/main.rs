//! # blebridged: bridge daemon
//!
//! Wires a platform collaborator to the event-correlation bridge and runs
//! one explore pass.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialise structured logging
//! - Open the configured platform (virtual or host adapter)
//! - Pump platform events into the shared event channel
//! - Run the explore pass and print its report as JSON
//! - Stop early on Ctrl-C

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use blebridge_adapter_btleplug::BtleplugPlatform;
use blebridge_adapter_virtual::VirtualPlatform;
use blebridge_app::event_channel::EventChannel;
use blebridge_app::ports::Platform;
use blebridge_app::services::central::Central;
use blebridged::config::{Backend, Config};
use blebridged::explore::{self, ExploreOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let filter = EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (events, queue) = mpsc::unbounded_channel();
    let channel = EventChannel::new();
    let pump = channel.spawn_pump(queue);

    let options = ExploreOptions {
        scan_window: config.scan_duration(),
        service_uuids: config.scan.service_uuids.clone(),
        target: config.scan.target.clone(),
        ..ExploreOptions::default()
    };

    tracing::info!(backend = ?config.platform.backend, "blebridged starting");
    let result = match config.platform.backend {
        Backend::Virtual => {
            let platform = Arc::new(VirtualPlatform::demo(events));
            run(Central::new(channel.clone(), platform, config.central.clone()), &options).await
        }
        Backend::Btleplug => {
            let platform = Arc::new(BtleplugPlatform::open(events).await?);
            run(Central::new(channel.clone(), platform, config.central.clone()), &options).await
        }
    };

    channel.clear();
    pump.abort();
    result
}

async fn run<P: Platform>(
    central: Central<P>,
    options: &ExploreOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    tokio::select! {
        report = explore::explore(&central, options) => {
            let report = report?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted, shutting down");
            Ok(())
        }
    }
}
