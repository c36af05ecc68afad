//! Opaque identifiers and the [`Identified`] capability.
//!
//! Identifiers are assigned by the platform collaborator and are unique
//! within a platform session. They are never parsed: two identifiers are
//! the same thing exactly when their text is equal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a device, service or characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap a platform-provided identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Anything that may carry an `identifier` field.
///
/// Returning `None` means the value has no identity; it never matches
/// anything, not even another value without identity.
pub trait Identified {
    /// The identifier carried by this value, if any.
    fn identifier(&self) -> Option<&str>;
}

impl Identified for Identifier {
    fn identifier(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl<T: Identified> Identified for Option<T> {
    fn identifier(&self) -> Option<&str> {
        self.as_ref().and_then(Identified::identifier)
    }
}

impl<T: Identified + ?Sized> Identified for &T {
    fn identifier(&self) -> Option<&str> {
        (**self).identifier()
    }
}

/// Untyped payloads, as a platform delegate serialises them.
impl Identified for serde_json::Value {
    fn identifier(&self) -> Option<&str> {
        self.get("identifier").and_then(serde_json::Value::as_str)
    }
}
