//! Application services: the operation catalog and the per-device session.
//!
//! Services accept a [`Platform`](crate::ports::Platform) implementation via a
//! generic parameter (constructor injection), keeping this layer decoupled
//! from concrete adapters.

pub mod central;
pub mod scan;
pub mod session;
