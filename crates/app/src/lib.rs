//! # blebridge-app
//!
//! Application layer: the event-correlation bridge and its **port**.
//!
//! ## Responsibilities
//! - Define the [`Platform`](ports::Platform) port that platform collaborators
//!   implement (driven/outbound: fire-and-forget commands)
//! - Provide the in-process [`EventChannel`](event_channel::EventChannel) that
//!   carries inbound platform events to many independent listeners
//! - Turn "issue a command, wait for the matching event" into awaitable
//!   [`Correlation`](correlation::Correlation)s bounded by optional deadlines
//! - Forward open-ended event sequences to caller sinks ([`stream`])
//! - Expose the operation catalog ([`Central`](services::central::Central))
//!   and per-device [`DeviceSession`](services::session::DeviceSession)s
//!
//! ## Dependency rule
//! Depends on `blebridge-domain` only (plus `tokio` for channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod config;
pub mod correlation;
pub mod event_channel;
pub mod identity;
pub mod ports;
pub mod services;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;
