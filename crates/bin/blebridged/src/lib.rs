//! # blebridged
//!
//! Composition root: configuration, platform selection and the explore pass
//! driven by the daemon binary.
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no correlation logic belongs here.

pub mod config;
pub mod explore;
