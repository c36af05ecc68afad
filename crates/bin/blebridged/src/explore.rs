//! Explore pass: scan, pick a device, connect, walk its GATT table, read
//! what is readable, listen to what notifies, then disconnect.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use blebridge_app::ports::Platform;
use blebridge_app::services::central::Central;
use blebridge_app::services::scan::ScanOptions;
use blebridge_app::services::session::DeviceSession;
use blebridge_domain::characteristic::Characteristic;
use blebridge_domain::device::DeviceAdvertisement;
use blebridge_domain::error::BridgeError;
use blebridge_domain::id::Identifier;
use blebridge_domain::service::Service;

/// What to explore and for how long.
#[derive(Debug, Clone)]
pub struct ExploreOptions {
    /// How long to scan.
    pub scan_window: Duration,
    /// Restrict the scan to devices advertising these services.
    pub service_uuids: Vec<Uuid>,
    /// The device to explore; the strongest signal when `None`.
    pub target: Option<String>,
    /// How long to let discovery and notification streams run.
    pub settle: Duration,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(5),
            service_uuids: Vec::new(),
            target: None,
            settle: Duration::from_millis(500),
        }
    }
}

/// Outcome of a characteristic read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reading {
    Value(Vec<u8>),
    Failed(String),
}

/// Everything learned during one pass.
#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub devices: Vec<DeviceAdvertisement>,
    pub target: Option<Identifier>,
    pub services: Vec<Service>,
    pub characteristics: Vec<Characteristic>,
    pub readings: BTreeMap<Identifier, Reading>,
    pub notifications: usize,
}

fn shared<T>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn take<T>(items: &Mutex<Vec<T>>) -> Vec<T> {
    std::mem::take(&mut *items.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Run one explore pass.
///
/// # Errors
///
/// Fails when the scan cannot start or stop, or when connecting to or
/// discovering the chosen device fails. Individual read failures are
/// recorded in the report instead. Once connected, the device is
/// disconnected again whether or not the pass succeeds.
pub async fn explore<P: Platform>(
    central: &Central<P>,
    options: &ExploreOptions,
) -> Result<Report, BridgeError> {
    let _state = central.did_change_state(|state| tracing::info!(%state, "bluetooth state"));

    let seen = shared::<DeviceAdvertisement>();
    let devices = {
        let sink = Arc::clone(&seen);
        let _discovery = central.did_discover_device(move |ad| {
            tracing::debug!(device = %ad.identifier, name = ?ad.name, rssi = ?ad.rssi, "device discovered");
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(ad);
        });
        central
            .start_scan(ScanOptions::with_services(options.service_uuids.iter().copied()))
            .await?
            .stop_after(options.scan_window)
            .await?;
        dedupe(take(&seen))
    };
    tracing::info!(count = devices.len(), "scan complete");

    let mut report = Report {
        devices,
        ..Report::default()
    };
    let Some(chosen) = choose(&report.devices, options.target.as_deref()).map(DeviceAdvertisement::device) else {
        tracing::warn!(target = ?options.target, "no device to explore");
        return Ok(report);
    };
    report.target = Some(chosen.identifier.clone());

    let session = DeviceSession::new(central.clone(), chosen);
    session
        .connect(|ack| {
            tracing::warn!(device = ?ack.identifier, "device link lost during explore");
        })
        .await?;

    let walked = walk(&session, &mut report, options).await;
    let released = if session.state().is_linked() {
        session.disconnect().await
    } else {
        Ok(())
    };
    if let (Err(_), Err(err)) = (&walked, &released) {
        tracing::warn!(%err, device = %session.device().identifier, "disconnect after failed explore failed");
    }
    walked?;
    released?;
    Ok(report)
}

/// Everything done over the link. The caller disconnects whatever the outcome.
async fn walk<P: Platform>(
    session: &DeviceSession<P>,
    report: &mut Report,
    options: &ExploreOptions,
) -> Result<(), BridgeError> {
    session.discover_services(&[]).await?;
    tokio::time::sleep(options.settle).await;
    report.services = session.services();
    tracing::info!(device = %session.device().identifier, services = report.services.len(), "services discovered");

    let found = shared::<Characteristic>();
    let mut streams = Vec::new();
    for service in &report.services {
        let sink = Arc::clone(&found);
        let stream = session
            .discover_characteristics(service, &[], move |c| {
                sink.lock().unwrap_or_else(PoisonError::into_inner).push(c);
            })
            .await?;
        streams.push(stream);
    }
    tokio::time::sleep(options.settle).await;
    drop(streams);
    report.characteristics = take(&found);

    for characteristic in report.characteristics.iter().filter(|c| c.properties.read) {
        let reading = match session.read(characteristic).await {
            Ok(bytes) => Reading::Value(bytes),
            Err(err) => {
                tracing::warn!(%err, characteristic = %characteristic.identifier, "read failed");
                Reading::Failed(err.to_string())
            }
        };
        report.readings.insert(characteristic.identifier.clone(), reading);
    }

    report.notifications = listen(session, &report.characteristics, options.settle).await;
    Ok(())
}

async fn listen<P: Platform>(
    session: &DeviceSession<P>,
    characteristics: &[Characteristic],
    window: Duration,
) -> usize {
    let received = shared::<()>();
    let mut enabled = Vec::new();
    let mut streams = Vec::new();
    for characteristic in characteristics
        .iter()
        .filter(|c| c.properties.notify || c.properties.indicate)
    {
        let sink = Arc::clone(&received);
        let id = characteristic.identifier.clone();
        let stream = session.notifications(characteristic, move |item| match item {
            Ok(value) => {
                tracing::info!(characteristic = %id, value = ?value.value, "notification");
                sink.lock().unwrap_or_else(PoisonError::into_inner).push(());
            }
            Err(err) => tracing::warn!(characteristic = %id, %err, "notification stream failed"),
        });
        let Ok(stream) = stream else { continue };
        match session.set_notify(characteristic, true).await {
            Ok(()) => {
                enabled.push(characteristic);
                streams.push(stream);
            }
            Err(err) => {
                tracing::warn!(%err, characteristic = %characteristic.identifier, "could not enable notifications");
            }
        }
    }
    if enabled.is_empty() {
        return 0;
    }

    tokio::time::sleep(window).await;
    for characteristic in enabled {
        if let Err(err) = session.set_notify(characteristic, false).await {
            tracing::debug!(%err, characteristic = %characteristic.identifier, "could not disable notifications");
        }
    }
    drop(streams);
    take(&received).len()
}

/// Keep the latest advertisement of each device, in first-seen order.
fn dedupe(advertisements: Vec<DeviceAdvertisement>) -> Vec<DeviceAdvertisement> {
    let mut unique: Vec<DeviceAdvertisement> = Vec::new();
    for ad in advertisements {
        match unique.iter_mut().find(|known| known.identifier == ad.identifier) {
            Some(known) => *known = ad,
            None => unique.push(ad),
        }
    }
    unique
}

/// The requested device, or the one with the strongest signal.
fn choose<'a>(devices: &'a [DeviceAdvertisement], target: Option<&str>) -> Option<&'a DeviceAdvertisement> {
    match target {
        Some(target) => devices.iter().find(|d| d.identifier.as_str() == target),
        None => devices.iter().max_by_key(|d| d.rssi.unwrap_or(i16::MIN)),
    }
}
