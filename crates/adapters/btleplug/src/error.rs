//! btleplug adapter error types.

use std::error::Error as _;

use blebridge_domain::error::PlatformError;

/// Errors specific to the btleplug adapter.
#[derive(Debug, thiserror::Error)]
pub enum BtleplugError {
    /// No Bluetooth adapter found on the host.
    #[error("no Bluetooth adapter available")]
    NotAvailable,

    /// A btleplug operation failed.
    #[error("Bluetooth operation failed")]
    Bluetooth(#[from] btleplug::Error),

    /// The peripheral is not known to the adapter (never discovered).
    #[error("unknown device {0}")]
    UnknownDevice(String),

    /// The peripheral is known but has no link.
    #[error("Device not connected")]
    NotConnected,

    /// No discovered service has this identifier.
    #[error("unknown service {0}")]
    UnknownService(String),

    /// No discovered characteristic has this identifier.
    #[error("unknown characteristic {0}")]
    UnknownCharacteristic(String),

    /// A write payload was not valid base64.
    #[error("invalid write payload")]
    Decode(#[from] base64::DecodeError),
}

impl From<&BtleplugError> for PlatformError {
    /// Flatten the error and its sources into the message carried by events.
    fn from(err: &BtleplugError) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        PlatformError::new(message)
    }
}
