//! Service: a GATT service exposed by a connected device.

use serde::{Deserialize, Serialize};

use crate::id::{Identified, Identifier};

/// A GATT service discovered on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub identifier: Identifier,
    /// Identifier of the owning device session.
    pub device: Identifier,
    pub uuid: uuid::Uuid,
}

impl Identified for Service {
    fn identifier(&self) -> Option<&str> {
        Some(self.identifier.as_str())
    }
}
