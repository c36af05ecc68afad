//! # blebridge-domain
//!
//! Pure domain model for the blebridge event-correlation bridge.
//!
//! ## Responsibilities
//! - Opaque [`Identifier`](id::Identifier)s and the [`Identified`](id::Identified)
//!   capability used for correlation
//! - Define the identifiable **entities**: devices, GATT services and characteristics
//! - Define the typed **inbound events** emitted by a platform collaborator
//!   and the typed **outbound commands** it accepts
//! - Define the error taxonomy shared by every layer
//! - Define the per-device **session** state machine
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod characteristic;
pub mod command;
pub mod device;
pub mod event;
pub mod service;
pub mod session;
pub mod state;
