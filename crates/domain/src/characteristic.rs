//! Characteristic: a GATT characteristic and the values it carries.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, PlatformError};
use crate::id::{Identified, Identifier};

/// Capabilities advertised by a characteristic.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

/// A GATT characteristic discovered on a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    pub identifier: Identifier,
    /// Identifier of the owning device.
    pub device: Identifier,
    /// Identifier of the owning service.
    pub service: Identifier,
    pub uuid: uuid::Uuid,
    #[serde(default)]
    pub properties: CharacteristicProperties,
}

impl Identified for Characteristic {
    fn identifier(&self) -> Option<&str> {
        Some(self.identifier.as_str())
    }
}

/// Payload of `CharacteristicRead` and `CharacteristicNotified` events.
///
/// `value` is base64 text, as carried on the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicValue {
    pub identifier: Identifier,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub error: Option<PlatformError>,
}

impl CharacteristicValue {
    /// Build a successful value payload from raw bytes.
    #[must_use]
    pub fn from_bytes(identifier: impl Into<Identifier>, bytes: &[u8]) -> Self {
        Self {
            identifier: identifier.into(),
            value: Some(encode(bytes)),
            error: None,
        }
    }

    /// Build a failed value payload.
    #[must_use]
    pub fn failed(identifier: impl Into<Identifier>, error: impl Into<PlatformError>) -> Self {
        Self {
            identifier: identifier.into(),
            value: None,
            error: Some(error.into()),
        }
    }

    /// Decode the carried value. An absent value decodes to no bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Decode`] when the value is not valid base64.
    pub fn bytes(&self) -> Result<Vec<u8>, BridgeError> {
        match &self.value {
            Some(text) => STANDARD.decode(text).map_err(BridgeError::Decode),
            None => Ok(Vec::new()),
        }
    }
}

impl Identified for CharacteristicValue {
    fn identifier(&self) -> Option<&str> {
        Some(self.identifier.as_str())
    }
}

/// Encode bytes the way write commands and value events carry them.
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
