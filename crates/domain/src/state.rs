//! Power/authorisation state of the local Bluetooth radio.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State reported by `StateChanged` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BluetoothState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl BluetoothState {
    /// Whether the radio can currently scan and connect.
    #[must_use]
    pub fn is_usable(self) -> bool {
        self == Self::PoweredOn
    }
}

impl fmt::Display for BluetoothState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unknown => "unknown",
            Self::Resetting => "resetting",
            Self::Unsupported => "unsupported",
            Self::Unauthorized => "unauthorized",
            Self::PoweredOff => "powered_off",
            Self::PoweredOn => "powered_on",
        };
        f.write_str(text)
    }
}
