use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use subtrack_core::{Clock, DomainError, Entity, SubscriptionId, SystemClock};
use subtrack_subscriptions::PaymentType;

use crate::repository::{RepositoryError, SubscriptionRepository, UnitOfWork};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome of one scheduler pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    /// Reference date every subscription was evaluated against.
    pub today: NaiveDate,
    /// Number of active subscriptions inspected.
    pub checked: usize,
    /// Subscriptions that received a generated payment, in iteration order.
    pub generated: Vec<SubscriptionId>,
}

/// Generates payments for subscriptions whose due date has passed.
pub struct PaymentScheduler<S, C = SystemClock> {
    store: S,
    clock: C,
}

impl<S> PaymentScheduler<S, SystemClock>
where
    S: SubscriptionRepository + UnitOfWork,
{
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S, C> PaymentScheduler<S, C>
where
    S: SubscriptionRepository + UnitOfWork,
    C: Clock,
{
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    /// Run one pass.
    ///
    /// "Today" is read once, so every subscription is judged against the same
    /// date. A subscription due exactly today is due. All due subscriptions are
    /// mutated in memory before anything is staged, and the unit of work is
    /// flushed exactly once, even when nothing was due.
    pub fn run(&self) -> Result<SchedulerReport, SchedulerError> {
        let today = self.clock.today();
        let subscriptions = self.store.find_all_active()?;
        let checked = subscriptions.len();

        let mut due = Vec::new();
        for mut subscription in subscriptions {
            if subscription.is_archived() || !subscription.is_due_on(today) {
                continue;
            }

            let next_due = subscription.next_due_date();
            let payment = subscription.record_payment(today, PaymentType::Generated, None)?;
            debug!(
                subscription_id = %subscription.id(),
                payment_id = %payment.id(),
                %next_due,
                amount = payment.amount(),
                "generated payment"
            );
            due.push(subscription);
        }

        let generated: Vec<SubscriptionId> = due.iter().map(|s| s.id_typed()).collect();
        for subscription in due {
            self.store.persist_subscription(subscription)?;
        }
        self.store.flush()?;

        info!(%today, checked, generated = generated.len(), "payment scheduler run finished");
        Ok(SchedulerReport {
            today,
            checked,
            generated,
        })
    }
}
