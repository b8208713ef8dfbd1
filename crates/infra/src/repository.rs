//! Persistence contracts consumed by command handlers and the scheduler.
//!
//! Aggregates are loaded as owned values. Mutations become durable only after
//! the changed aggregate is handed back through [`UnitOfWork`] and the unit of
//! work is flushed; reads never observe staged-but-unflushed changes.

use std::sync::Arc;

use thiserror::Error;

use subtrack_core::{CategoryId, DomainError, PaymentId, SubscriptionId};
use subtrack_subscriptions::{Category, Subscription};

/// Storage-level failure (as opposed to domain validation failures).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backing store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// A staged aggregate was loaded before another write committed. The whole
    /// batch was discarded.
    #[error("write rejected: {0}")]
    Conflict(DomainError),
}

pub trait CategoryRepository: Send + Sync {
    fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError>;

    fn find_all(&self) -> Result<Vec<Category>, RepositoryError>;
}

pub trait SubscriptionRepository: Send + Sync {
    fn find_by_id(&self, id: SubscriptionId) -> Result<Option<Subscription>, RepositoryError>;

    fn find_all(&self) -> Result<Vec<Subscription>, RepositoryError>;

    /// Subscriptions with `archived = false`, in a stable order.
    fn find_all_active(&self) -> Result<Vec<Subscription>, RepositoryError>;

    /// The subscription owning the given payment.
    fn find_by_payment_id(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Subscription>, RepositoryError>;

    fn find_by_category(&self, category_id: CategoryId)
    -> Result<Vec<Subscription>, RepositoryError>;
}

/// Staging area for changes, committed together by [`UnitOfWork::flush`].
pub trait UnitOfWork: Send + Sync {
    fn persist_category(&self, category: Category) -> Result<(), RepositoryError>;

    fn remove_category(&self, id: CategoryId) -> Result<(), RepositoryError>;

    /// Stage a new or modified subscription (with its payments and history).
    fn persist_subscription(&self, subscription: Subscription) -> Result<(), RepositoryError>;

    /// Stage removal of a subscription together with everything it owns.
    fn remove_subscription(&self, id: SubscriptionId) -> Result<(), RepositoryError>;

    /// Commit every staged change in staging order.
    ///
    /// Either every change is applied or none is. A subscription staged from a
    /// copy older than the committed one fails with [`RepositoryError::Conflict`].
    fn flush(&self) -> Result<(), RepositoryError>;
}

impl<T: CategoryRepository + ?Sized> CategoryRepository for Arc<T> {
    fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        (**self).find_by_id(id)
    }

    fn find_all(&self) -> Result<Vec<Category>, RepositoryError> {
        (**self).find_all()
    }
}

impl<T: SubscriptionRepository + ?Sized> SubscriptionRepository for Arc<T> {
    fn find_by_id(&self, id: SubscriptionId) -> Result<Option<Subscription>, RepositoryError> {
        (**self).find_by_id(id)
    }

    fn find_all(&self) -> Result<Vec<Subscription>, RepositoryError> {
        (**self).find_all()
    }

    fn find_all_active(&self) -> Result<Vec<Subscription>, RepositoryError> {
        (**self).find_all_active()
    }

    fn find_by_payment_id(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        (**self).find_by_payment_id(payment_id)
    }

    fn find_by_category(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        (**self).find_by_category(category_id)
    }
}

impl<T: UnitOfWork + ?Sized> UnitOfWork for Arc<T> {
    fn persist_category(&self, category: Category) -> Result<(), RepositoryError> {
        (**self).persist_category(category)
    }

    fn remove_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        (**self).remove_category(id)
    }

    fn persist_subscription(&self, subscription: Subscription) -> Result<(), RepositoryError> {
        (**self).persist_subscription(subscription)
    }

    fn remove_subscription(&self, id: SubscriptionId) -> Result<(), RepositoryError> {
        (**self).remove_subscription(id)
    }

    fn flush(&self) -> Result<(), RepositoryError> {
        (**self).flush()
    }
}
