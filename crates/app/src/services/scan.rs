//! Scan handle returned by [`Central::start_scan`].

use std::time::Duration;

use uuid::Uuid;

use blebridge_domain::error::BridgeError;

use crate::ports::Platform;
use crate::services::central::Central;

/// Options for [`Central::start_scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Only report devices advertising one of these services. Empty means all.
    pub service_uuids: Vec<Uuid>,
}

impl ScanOptions {
    #[must_use]
    pub fn with_services(service_uuids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            service_uuids: service_uuids.into_iter().collect(),
        }
    }
}

/// A running scan.
///
/// Dropping the handle does not stop the scan; call [`stop`](Self::stop).
#[must_use = "a scan keeps running until stopped"]
pub struct Scan<P> {
    central: Central<P>,
}

impl<P> std::fmt::Debug for Scan<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scan").field("central", &self.central).finish()
    }
}

impl<P: Platform> Scan<P> {
    pub(crate) fn new(central: Central<P>) -> Self {
        Self { central }
    }

    /// Stop the scan.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Platform`] if the platform reports a failure.
    pub async fn stop(self) -> Result<(), BridgeError> {
        self.central.stop_scan().await
    }

    /// Let the scan run for `duration`, then stop it.
    ///
    /// # Errors
    ///
    /// See [`stop`](Self::stop).
    pub async fn stop_after(self, duration: Duration) -> Result<(), BridgeError> {
        tokio::time::sleep(duration).await;
        tracing::debug!(elapsed_ms = duration.as_millis(), "scan window elapsed");
        self.stop().await
    }
}
