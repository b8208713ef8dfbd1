//! In-memory implementation of the repository and unit-of-work contracts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use tracing::{debug, warn};

use subtrack_core::{AggregateRoot, CategoryId, Entity, ExpectedVersion, PaymentId, SubscriptionId};
use subtrack_subscriptions::{Category, Subscription};

use crate::repository::{CategoryRepository, RepositoryError, SubscriptionRepository, UnitOfWork};

#[derive(Debug, Default)]
struct State {
    categories: BTreeMap<CategoryId, Category>,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
}

#[derive(Debug)]
enum PendingChange {
    PersistCategory(Category),
    RemoveCategory(CategoryId),
    PersistSubscription(Box<Subscription>),
    RemoveSubscription(SubscriptionId),
}

/// In-memory store.
///
/// Intended for tests/dev. Committed state is kept in id order (ids are
/// time-ordered, so this is creation order); staged changes are applied on
/// `flush`. Subscription writes are checked against the committed version.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    committed: RwLock<State>,
    pending: Mutex<Vec<PendingChange>>,
    flushes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed `flush` calls.
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Number of changes staged since the last flush.
    pub fn pending_len(&self) -> Result<usize, RepositoryError> {
        Ok(self
            .pending
            .lock()
            .map_err(|_| RepositoryError::Poisoned)?
            .len())
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, RepositoryError> {
        let state = self.committed.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(f(&state))
    }

    fn stage(&self, change: PendingChange) -> Result<(), RepositoryError> {
        self.pending
            .lock()
            .map_err(|_| RepositoryError::Poisoned)?
            .push(change);
        Ok(())
    }
}

impl CategoryRepository for InMemoryStore {
    fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        self.read(|s| s.categories.get(&id).cloned())
    }

    fn find_all(&self) -> Result<Vec<Category>, RepositoryError> {
        self.read(|s| s.categories.values().cloned().collect())
    }
}

impl SubscriptionRepository for InMemoryStore {
    fn find_by_id(&self, id: SubscriptionId) -> Result<Option<Subscription>, RepositoryError> {
        self.read(|s| s.subscriptions.get(&id).cloned())
    }

    fn find_all(&self) -> Result<Vec<Subscription>, RepositoryError> {
        self.read(|s| s.subscriptions.values().cloned().collect())
    }

    fn find_all_active(&self) -> Result<Vec<Subscription>, RepositoryError> {
        self.read(|s| {
            s.subscriptions
                .values()
                .filter(|sub| !sub.is_archived())
                .cloned()
                .collect()
        })
    }

    fn find_by_payment_id(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        self.read(|s| {
            s.subscriptions
                .values()
                .find(|sub| sub.payments().iter().any(|p| *p.id() == payment_id))
                .cloned()
        })
    }

    fn find_by_category(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<Subscription>, RepositoryError> {
        self.read(|s| {
            s.subscriptions
                .values()
                .filter(|sub| *sub.category().id() == category_id)
                .cloned()
                .collect()
        })
    }
}

impl UnitOfWork for InMemoryStore {
    fn persist_category(&self, category: Category) -> Result<(), RepositoryError> {
        self.stage(PendingChange::PersistCategory(category))
    }

    fn remove_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        self.stage(PendingChange::RemoveCategory(id))
    }

    fn persist_subscription(&self, subscription: Subscription) -> Result<(), RepositoryError> {
        self.stage(PendingChange::PersistSubscription(Box::new(subscription)))
    }

    fn remove_subscription(&self, id: SubscriptionId) -> Result<(), RepositoryError> {
        self.stage(PendingChange::RemoveSubscription(id))
    }

    fn flush(&self) -> Result<(), RepositoryError> {
        let changes = std::mem::take(
            &mut *self.pending.lock().map_err(|_| RepositoryError::Poisoned)?,
        );
        let mut state = self
            .committed
            .write()
            .map_err(|_| RepositoryError::Poisoned)?;

        if let Err(err) = check_versions(&state, &changes) {
            warn!(discarded = changes.len(), error = %err, "flush rejected");
            return Err(err);
        }

        let applied = changes.len();
        for change in changes {
            match change {
                PendingChange::PersistCategory(category) => {
                    state.categories.insert(*category.id(), category);
                }
                PendingChange::RemoveCategory(id) => {
                    state.categories.remove(&id);
                }
                PendingChange::PersistSubscription(mut subscription) => {
                    subscription.advance_version();
                    state.subscriptions.insert(*subscription.id(), *subscription);
                }
                PendingChange::RemoveSubscription(id) => {
                    state.subscriptions.remove(&id);
                }
            }
        }

        self.flushes.fetch_add(1, Ordering::SeqCst);
        debug!(applied, "flushed in-memory store");
        Ok(())
    }
}

/// Every staged subscription must carry the version that is current at its
/// point in the batch. Absent subscriptions are at version 0.
fn check_versions(state: &State, changes: &[PendingChange]) -> Result<(), RepositoryError> {
    let mut staged: BTreeMap<SubscriptionId, u64> = BTreeMap::new();
    for change in changes {
        match change {
            PendingChange::PersistSubscription(subscription) => {
                let id = *subscription.id();
                let actual = staged
                    .get(&id)
                    .copied()
                    .or_else(|| state.subscriptions.get(&id).map(|s| s.version()))
                    .unwrap_or(0);
                ExpectedVersion::Exact(subscription.version())
                    .check(actual)
                    .map_err(RepositoryError::Conflict)?;
                staged.insert(id, actual + 1);
            }
            PendingChange::RemoveSubscription(id) => {
                staged.insert(*id, 0);
            }
            PendingChange::PersistCategory(_) | PendingChange::RemoveCategory(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use subtrack_subscriptions::{PaymentPeriod, PaymentType, SubscriptionDetails};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_subscription(category: &Category) -> Subscription {
        let details = SubscriptionDetails::new(
            category.clone(),
            "Spotify",
            date(2024, 1, 1),
            PaymentPeriod::Month,
            1,
            999,
        );
        Subscription::new(details, Utc::now()).unwrap()
    }

    #[test]
    fn staged_changes_are_invisible_until_flush() {
        let store = InMemoryStore::new();
        let category = Category::new("Music").unwrap();
        let id = *category.id();

        store.persist_category(category).unwrap();
        assert!(CategoryRepository::find_by_id(&store, id).unwrap().is_none());
        assert_eq!(store.pending_len().unwrap(), 1);

        store.flush().unwrap();
        assert!(CategoryRepository::find_by_id(&store, id).unwrap().is_some());
        assert_eq!(store.pending_len().unwrap(), 0);
        assert_eq!(store.flush_count(), 1);
    }

    #[test]
    fn find_all_active_filters_archived() {
        let store = InMemoryStore::new();
        let category = Category::new("Music").unwrap();
        let active = test_subscription(&category);
        let mut archived = test_subscription(&category);
        archived.archive(Utc::now()).unwrap();

        store.persist_subscription(active.clone()).unwrap();
        store.persist_subscription(archived).unwrap();
        store.flush().unwrap();

        let found = store.find_all_active().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id_typed(), active.id_typed());
        assert_eq!(SubscriptionRepository::find_all(&store).unwrap().len(), 2);
    }

    #[test]
    fn find_by_payment_and_category() {
        let store = InMemoryStore::new();
        let category = Category::new("Music").unwrap();
        let mut subscription = test_subscription(&category);
        let payment = subscription
            .record_payment(date(2024, 2, 1), PaymentType::Verified, None)
            .unwrap();

        store.persist_subscription(subscription.clone()).unwrap();
        store.flush().unwrap();

        let owner = store.find_by_payment_id(*payment.id()).unwrap().unwrap();
        assert_eq!(owner.id_typed(), subscription.id_typed());
        assert!(store.find_by_payment_id(PaymentId::new()).unwrap().is_none());
        assert_eq!(store.find_by_category(*category.id()).unwrap().len(), 1);
        assert!(store.find_by_category(CategoryId::new()).unwrap().is_empty());
    }

    #[test]
    fn changes_apply_in_staging_order() {
        let store = InMemoryStore::new();
        let category = Category::new("Music").unwrap();
        let subscription = test_subscription(&category);
        let id = subscription.id_typed();

        store.persist_subscription(subscription).unwrap();
        store.remove_subscription(id).unwrap();
        store.flush().unwrap();

        assert!(SubscriptionRepository::find_by_id(&store, id).unwrap().is_none());
    }

    fn seeded(store: &InMemoryStore) -> SubscriptionId {
        let category = Category::new("Music").unwrap();
        let subscription = test_subscription(&category);
        let id = subscription.id_typed();
        store.persist_subscription(subscription).unwrap();
        store.flush().unwrap();
        id
    }

    #[test]
    fn commit_advances_version() {
        let store = InMemoryStore::new();
        let id = seeded(&store);
        let loaded = SubscriptionRepository::find_by_id(&store, id).unwrap().unwrap();
        assert_eq!(loaded.version(), 1);

        store.persist_subscription(loaded).unwrap();
        store.flush().unwrap();

        let reloaded = SubscriptionRepository::find_by_id(&store, id).unwrap().unwrap();
        assert_eq!(reloaded.version(), 2);
    }

    #[test]
    fn stale_copy_is_rejected_and_batch_discarded() {
        let store = InMemoryStore::new();
        let id = seeded(&store);
        let mut stale = SubscriptionRepository::find_by_id(&store, id).unwrap().unwrap();

        let mut fresh = SubscriptionRepository::find_by_id(&store, id).unwrap().unwrap();
        let mut details = fresh.details().clone();
        details.cost = 2599;
        fresh.update(details, Utc::now()).unwrap();
        store.persist_subscription(fresh).unwrap();
        store.flush().unwrap();

        stale
            .record_payment(date(2024, 2, 1), PaymentType::Generated, None)
            .unwrap();
        let category = Category::new("Video").unwrap();
        let category_id = *category.id();
        store.persist_category(category).unwrap();
        store.persist_subscription(stale).unwrap();
        let err = store.flush().unwrap_err();

        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(store.pending_len().unwrap(), 0);
        assert!(CategoryRepository::find_by_id(&store, category_id).unwrap().is_none());
        let committed = SubscriptionRepository::find_by_id(&store, id).unwrap().unwrap();
        assert_eq!(committed.cost(), 2599);
        assert_eq!(committed.history_len(), 1);
        assert!(committed.payments().is_empty());
    }

    #[test]
    fn same_copy_staged_twice_in_one_batch_conflicts() {
        let store = InMemoryStore::new();
        let id = seeded(&store);
        let loaded = SubscriptionRepository::find_by_id(&store, id).unwrap().unwrap();

        store.persist_subscription(loaded.clone()).unwrap();
        store.persist_subscription(loaded).unwrap();

        assert!(matches!(store.flush(), Err(RepositoryError::Conflict(_))));
    }

    #[test]
    fn removed_subscription_cannot_be_written_back() {
        let store = InMemoryStore::new();
        let id = seeded(&store);
        let loaded = SubscriptionRepository::find_by_id(&store, id).unwrap().unwrap();

        store.remove_subscription(id).unwrap();
        store.flush().unwrap();
        store.persist_subscription(loaded).unwrap();

        assert!(matches!(store.flush(), Err(RepositoryError::Conflict(_))));
        assert!(SubscriptionRepository::find_by_id(&store, id).unwrap().is_none());
    }
}
