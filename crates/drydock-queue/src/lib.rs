//! drydock-queue — bounded deployment job queue.
//!
//! A single-consumer FIFO between deployment submitters (transport layer,
//! scheduler) and the one worker that drives the pipeline. Submission is
//! non-blocking: a full queue rejects immediately rather than applying
//! backpressure to the caller.
//!
//! # Architecture
//!
//! [`channel`] builds the [`DeployQueue`] handle (cheap to clone, held by
//! anyone who submits) and the [`DeployWorker`] (consumed by `run`, one
//! per daemon). The worker holds the supervisor's deploy guard for the
//! whole span of a job, so instance starts cannot interleave with
//! provisioning, and releases it before dispatching the optional
//! post-success start.

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{DeployQueue, DeployWorker, channel};
