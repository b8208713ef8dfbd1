//! Automatic payment generation.
//!
//! - `PaymentScheduler`: one pass over all active subscriptions, generating a
//!   payment for each one that is due, committed with a single flush
//! - `SchedulerWorker`: runs the scheduler periodically on a dedicated thread
//!
//! Runs must not overlap for the same store, or a subscription could receive
//! two generated payments for one due date. A single `SchedulerWorker` per
//! store provides that guarantee; callers invoking `PaymentScheduler::run`
//! directly are responsible for it themselves.

pub mod payments;
pub mod worker;

pub use payments::{PaymentScheduler, SchedulerError, SchedulerReport};
pub use worker::{SchedulerWorker, SchedulerWorkerHandle, WorkerStats};
