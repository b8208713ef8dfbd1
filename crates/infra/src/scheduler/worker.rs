//! Background worker that runs the payment scheduler on an interval.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use subtrack_core::Clock;

use super::payments::PaymentScheduler;
use crate::config::SchedulerConfig;
use crate::repository::{SubscriptionRepository, UnitOfWork};

#[derive(Debug)]
enum Signal {
    RunNow,
    Shutdown,
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub runs: u64,
    pub failures: u64,
    pub payments_generated: u64,
    pub last_run_date: Option<NaiveDate>,
    pub uptime_secs: u64,
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct SchedulerWorkerHandle {
    signals: mpsc::Sender<Signal>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl SchedulerWorkerHandle {
    /// Ask the worker to run immediately instead of waiting for the interval.
    ///
    /// Returns `false` when the worker thread is no longer running.
    pub fn run_now(&self) -> bool {
        if self.signals.send(Signal::RunNow).is_err() {
            warn!("payment scheduler worker is not running; run request dropped");
            return false;
        }
        true
    }

    /// Current worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Request graceful shutdown and wait for the current run to finish.
    pub fn shutdown(mut self) {
        if self.signals.send(Signal::Shutdown).is_err() {
            warn!("payment scheduler worker already stopped");
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("payment scheduler worker panicked");
            }
        }
    }
}

/// Owns a [`PaymentScheduler`] and drives it from a single thread, so runs
/// against the same store never overlap.
pub struct SchedulerWorker<S, C> {
    scheduler: PaymentScheduler<S, C>,
}

impl<S, C> SchedulerWorker<S, C>
where
    S: SubscriptionRepository + UnitOfWork + 'static,
    C: Clock + 'static,
{
    pub fn new(scheduler: PaymentScheduler<S, C>) -> Self {
        Self { scheduler }
    }

    /// Spawn the worker thread.
    pub fn spawn(self, config: SchedulerConfig) -> std::io::Result<SchedulerWorkerHandle> {
        let (signals_tx, signals_rx) = mpsc::channel::<Signal>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                worker_loop(self.scheduler, config, signals_rx, stats_clone);
            })?;

        Ok(SchedulerWorkerHandle {
            signals: signals_tx,
            join: Some(join),
            stats,
        })
    }
}

fn worker_loop<S, C>(
    scheduler: PaymentScheduler<S, C>,
    config: SchedulerConfig,
    signals: mpsc::Receiver<Signal>,
    stats: Arc<Mutex<WorkerStats>>,
) where
    S: SubscriptionRepository + UnitOfWork,
    C: Clock,
{
    info!(
        worker = %config.name,
        interval_secs = config.interval.as_secs(),
        "payment scheduler worker started"
    );
    let start_time = Instant::now();

    if config.run_on_start {
        run_once(&scheduler, &config, &stats, start_time);
    }

    loop {
        match signals.recv_timeout(config.interval) {
            Ok(Signal::RunNow) | Err(RecvTimeoutError::Timeout) => {
                run_once(&scheduler, &config, &stats, start_time);
            }
            Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = %config.name, "payment scheduler worker stopped");
}

fn run_once<S, C>(
    scheduler: &PaymentScheduler<S, C>,
    config: &SchedulerConfig,
    stats: &Mutex<WorkerStats>,
    start_time: Instant,
) where
    S: SubscriptionRepository + UnitOfWork,
    C: Clock,
{
    let result = scheduler.run();

    let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
    s.runs += 1;
    s.uptime_secs = start_time.elapsed().as_secs();
    match result {
        Ok(report) => {
            s.payments_generated += report.generated.len() as u64;
            s.last_run_date = Some(report.today);
        }
        Err(e) => {
            s.failures += 1;
            error!(worker = %config.name, error = %e, "payment scheduler run failed");
        }
    }
}
