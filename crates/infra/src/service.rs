//! Command and query handlers (application-level orchestration).
//!
//! Every command follows the same flow:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate(s) through the repositories
//!   ↓
//! 2. Call one domain method (validation happens there)
//!   ↓
//! 3. Stage the changed aggregate on the unit of work
//!   ↓
//! 4. Flush once
//! ```
//!
//! Missing entities are reported as [`CommandError::NotFound`]; the domain layer
//! never sees lookups that failed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use subtrack_core::{CategoryId, Clock, DomainError, Entity, PaymentId, SubscriptionId, SystemClock};
use subtrack_subscriptions::{
    Category, Payment, PaymentPeriod, PaymentType, Subscription, SubscriptionDetails,
};

use crate::repository::{CategoryRepository, RepositoryError, SubscriptionRepository, UnitOfWork};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{entity} with id \"{id}\" not found")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot delete category \"{0}\" because it has subscriptions assigned")]
    CategoryHasSubscriptions(CategoryId),
}

impl CommandError {
    fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Command: CreateCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCategory {
    pub name: String,
}

/// Command: RenameCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameCategory {
    pub category_id: CategoryId,
    pub name: String,
}

/// Command: DeleteCategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCategory {
    pub category_id: CategoryId,
}

/// Editable subscription fields as submitted by a client (category by id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFields {
    pub category_id: CategoryId,
    pub name: String,
    pub last_paid_date: NaiveDate,
    pub payment_period: PaymentPeriod,
    pub payment_period_count: u32,
    pub cost: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub logo: String,
}

/// Command: CreateSubscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubscription {
    #[serde(flatten)]
    pub fields: SubscriptionFields,
}

/// Command: UpdateSubscription (full replacement of every editable field).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSubscription {
    pub subscription_id: SubscriptionId,
    #[serde(flatten)]
    pub fields: SubscriptionFields,
}

/// Command: ArchiveSubscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSubscription {
    pub subscription_id: SubscriptionId,
}

/// Command: UnarchiveSubscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnarchiveSubscription {
    pub subscription_id: SubscriptionId,
}

/// Command: DeleteSubscription (payments and history go with it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSubscription {
    pub subscription_id: SubscriptionId,
}

/// Command: RecordPayment (a manual, `Verified` payment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub subscription_id: SubscriptionId,
    /// Defaults to today.
    #[serde(default)]
    pub paid_date: Option<NaiveDate>,
    /// Defaults to the subscription's cost.
    #[serde(default)]
    pub amount: Option<i64>,
}

/// Command: DeletePayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePayment {
    pub payment_id: PaymentId,
}

/// Handlers for every category, subscription and payment command.
pub struct SubscriptionService<S, C = SystemClock> {
    store: S,
    clock: C,
}

impl<S> SubscriptionService<S, SystemClock>
where
    S: CategoryRepository + SubscriptionRepository + UnitOfWork,
{
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S, C> SubscriptionService<S, C>
where
    S: CategoryRepository + SubscriptionRepository + UnitOfWork,
    C: Clock,
{
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn find_category(&self, id: CategoryId) -> Result<Category, CommandError> {
        CategoryRepository::find_by_id(&self.store, id)?
            .ok_or_else(|| CommandError::not_found("category", id))
    }

    pub fn list_categories(&self) -> Result<Vec<Category>, CommandError> {
        Ok(CategoryRepository::find_all(&self.store)?)
    }

    pub fn find_subscription(&self, id: SubscriptionId) -> Result<Subscription, CommandError> {
        SubscriptionRepository::find_by_id(&self.store, id)?
            .ok_or_else(|| CommandError::not_found("subscription", id))
    }

    pub fn list_subscriptions(&self) -> Result<Vec<Subscription>, CommandError> {
        Ok(SubscriptionRepository::find_all(&self.store)?)
    }

    pub fn create_category(&self, cmd: CreateCategory) -> Result<CategoryId, CommandError> {
        let category = Category::new(&cmd.name)?;
        let id = *category.id();

        self.store.persist_category(category)?;
        self.store.flush()?;

        debug!(category_id = %id, "category created");
        Ok(id)
    }

    /// Rename a category and refresh every subscription that references it.
    pub fn rename_category(&self, cmd: RenameCategory) -> Result<(), CommandError> {
        let mut category = self.find_category(cmd.category_id)?;
        category.rename(&cmd.name)?;

        for mut subscription in self.store.find_by_category(cmd.category_id)? {
            subscription.refresh_category(&category)?;
            self.store.persist_subscription(subscription)?;
        }
        self.store.persist_category(category)?;
        self.store.flush()?;

        debug!(category_id = %cmd.category_id, "category renamed");
        Ok(())
    }

    pub fn delete_category(&self, cmd: DeleteCategory) -> Result<(), CommandError> {
        let category = self.find_category(cmd.category_id)?;

        if !self.store.find_by_category(cmd.category_id)?.is_empty() {
            return Err(CommandError::CategoryHasSubscriptions(*category.id()));
        }

        self.store.remove_category(cmd.category_id)?;
        self.store.flush()?;

        debug!(category_id = %cmd.category_id, "category deleted");
        Ok(())
    }

    pub fn create_subscription(
        &self,
        cmd: CreateSubscription,
    ) -> Result<SubscriptionId, CommandError> {
        let details = self.resolve_details(cmd.fields)?;
        let subscription = Subscription::new(details, self.clock.now())?;
        let id = subscription.id_typed();

        self.store.persist_subscription(subscription)?;
        self.store.flush()?;

        debug!(subscription_id = %id, "subscription created");
        Ok(id)
    }

    /// Returns the number of history records appended by the update.
    pub fn update_subscription(&self, cmd: UpdateSubscription) -> Result<usize, CommandError> {
        let mut subscription = self.find_subscription(cmd.subscription_id)?;
        let details = self.resolve_details(cmd.fields)?;

        let appended = subscription.update(details, self.clock.now())?;

        self.store.persist_subscription(subscription)?;
        self.store.flush()?;

        debug!(
            subscription_id = %cmd.subscription_id,
            events = appended.len(),
            "subscription updated"
        );
        Ok(appended.len())
    }

    pub fn archive_subscription(&self, cmd: ArchiveSubscription) -> Result<(), CommandError> {
        let mut subscription = self.find_subscription(cmd.subscription_id)?;
        subscription.archive(self.clock.now())?;

        self.store.persist_subscription(subscription)?;
        self.store.flush()?;

        debug!(subscription_id = %cmd.subscription_id, "subscription archived");
        Ok(())
    }

    pub fn unarchive_subscription(&self, cmd: UnarchiveSubscription) -> Result<(), CommandError> {
        let mut subscription = self.find_subscription(cmd.subscription_id)?;
        subscription.unarchive(self.clock.now())?;

        self.store.persist_subscription(subscription)?;
        self.store.flush()?;

        debug!(subscription_id = %cmd.subscription_id, "subscription unarchived");
        Ok(())
    }

    pub fn delete_subscription(&self, cmd: DeleteSubscription) -> Result<(), CommandError> {
        let subscription = self.find_subscription(cmd.subscription_id)?;

        self.store.remove_subscription(subscription.id_typed())?;
        self.store.flush()?;

        debug!(subscription_id = %cmd.subscription_id, "subscription deleted");
        Ok(())
    }

    pub fn record_payment(&self, cmd: RecordPayment) -> Result<Payment, CommandError> {
        let mut subscription = self.find_subscription(cmd.subscription_id)?;
        let paid_date = cmd.paid_date.unwrap_or_else(|| self.clock.today());

        let payment = subscription.record_payment(paid_date, PaymentType::Verified, cmd.amount)?;

        self.store.persist_subscription(subscription)?;
        self.store.flush()?;

        debug!(
            subscription_id = %cmd.subscription_id,
            payment_id = %payment.id(),
            amount = payment.amount(),
            "payment recorded"
        );
        Ok(payment)
    }

    pub fn delete_payment(&self, cmd: DeletePayment) -> Result<(), CommandError> {
        let mut subscription = self
            .store
            .find_by_payment_id(cmd.payment_id)?
            .ok_or_else(|| CommandError::not_found("payment", cmd.payment_id))?;

        subscription.remove_payment(cmd.payment_id)?;

        self.store.persist_subscription(subscription)?;
        self.store.flush()?;

        debug!(payment_id = %cmd.payment_id, "payment deleted");
        Ok(())
    }

    fn resolve_details(
        &self,
        fields: SubscriptionFields,
    ) -> Result<SubscriptionDetails, CommandError> {
        let category = self.find_category(fields.category_id)?;

        Ok(SubscriptionDetails::new(
            category,
            fields.name,
            fields.last_paid_date,
            fields.payment_period,
            fields.payment_period_count,
            fields.cost,
        )
        .with_description(fields.description)
        .with_link(fields.link)
        .with_logo(fields.logo))
    }
}
