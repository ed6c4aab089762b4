//! drydock-core — shared foundation for the drydock instance lifecycle core.
//!
//! Holds the domain types every subsystem speaks (instance records, deploy
//! jobs, schedule tasks), the `drydock.toml` configuration model, and the
//! status hub that fans deployment/scheduler progress out to pollers and
//! push subscribers.
//!
//! # Architecture
//!
//! Everything here is transport-agnostic: the queue, pipeline, supervisor,
//! and scheduler crates depend on this one and nothing depends back. The
//! `StatusHub` is `Clone` + `Send` + `Sync` (an `Arc` around its state) and
//! is shared by reference across subsystems, never duplicated.

pub mod config;
pub mod status;
pub mod types;

pub use config::Config;
pub use status::{ProgressFn, StatusHub, StatusUpdate};
pub use types::*;
