//! drydock-supervisor — instance process supervision.
//!
//! Owns every child process spawned for a managed instance: launch
//! command construction, spawn with piped stdio, a bounded console ring
//! fed by reader tasks, graceful-then-forced stop, and the deployment
//! guard that keeps starts and deployments from interleaving.
//!
//! # Architecture
//!
//! One [`Supervisor`] per daemon, cloned by reference into the queue
//! worker and the scheduler. All live children sit in a single
//! tokio-mutexed map keyed by instance id; liveness checks and state
//! transitions are read-then-write under that one lock, which is what
//! serializes concurrent starts and stops per instance. Stdout and
//! stderr are drained by detached reader tasks that append to the
//! instance's ring buffer and fan out to broadcast subscribers.

pub mod command;
pub mod error;
pub mod ring;
pub mod supervisor;

pub use error::{SupervisorError, SupervisorResult};
pub use supervisor::{DeployGuard, Supervisor};
