//! Infrastructure layer: persistence contracts, stores, command handlers,
//! payment scheduling and configuration.

pub mod config;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod store;

pub use config::SchedulerConfig;
pub use repository::{CategoryRepository, RepositoryError, SubscriptionRepository, UnitOfWork};
pub use scheduler::{
    PaymentScheduler, SchedulerError, SchedulerReport, SchedulerWorker, SchedulerWorkerHandle,
    WorkerStats,
};
pub use service::{CommandError, SubscriptionService};
pub use store::InMemoryStore;
