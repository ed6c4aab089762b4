//! drydock-deploy — the instance deployment pipeline.
//!
//! Transforms a [`DeployJob`](drydock_core::DeployJob) into a
//! ready-to-start installation on disk through four stages: content
//! package unpack, Java runtime acquisition, core binary acquisition, and
//! a conditional mod-loader install driven by a bounded state machine.
//!
//! # Architecture
//!
//! Every stage reports through a [`Reporter`] wired to the shared status
//! hub, with percent clamped monotonically non-decreasing per job. Stages
//! are retry-free: a failed job is resubmitted whole. Remote artifacts
//! (runtime archives, core jars, libraries, mappings) are verified against
//! their published sha256 when one is given; a mismatch deletes the
//! partial file before the stage fails.

pub mod archive;
pub mod catalog;
pub mod download;
pub mod error;
pub mod installer;
pub mod maven;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod runtime;
pub mod version;

pub use error::{DeployError, DeployResult};
pub use installer::{InstallOutcome, needs_install};
pub use pipeline::Pipeline;
pub use report::Reporter;
