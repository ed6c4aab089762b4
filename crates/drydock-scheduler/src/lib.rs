//! drydock-scheduler — cron-driven recurring instance tasks.
//!
//! Evaluates every enabled [`drydock_core::ScheduleTask`] once per tick
//! (default one second) against its seconds-resolution cron expression
//! in local time, and dispatches the due ones: console commands, start,
//! stop, restart, backup.
//!
//! # Architecture
//!
//! [`Scheduler::run`] is one loop per daemon, alternating a tick sleep
//! with shutdown. A tick is synchronous: it loads the task list, asks
//! [`due::is_due`] about each task, and for the due ones persists
//! `last_run` *before* spawning the detached action task. Persist-first
//! gives at-least-once dispatch that under-fires rather than double-fires
//! when the process dies mid-tick. Action failures are logged at the
//! spawn boundary and never reach the loop.

pub mod due;
pub mod error;
pub mod scheduler;

mod actions;

pub use error::{ScheduleError, ScheduleResult};
pub use scheduler::Scheduler;
