use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use subtrack_core::{AggregateRoot, DomainError, DomainResult, Entity, PaymentId, SubscriptionId};

use crate::category::Category;
use crate::change_set::{Change, ChangeSet};
use crate::event::{SubscriptionEvent, SubscriptionEventType};
use crate::payment::{Payment, PaymentType};
use crate::period::{PaymentPeriod, next_due_date};

/// Full set of user-editable subscription fields.
///
/// Used both to create a subscription and as the full replacement value for
/// [`Subscription::update`] (there are no partial patches).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SubscriptionDetailsRecord")]
pub struct SubscriptionDetails {
    pub category: Category,
    pub name: String,
    pub last_paid_date: NaiveDate,
    pub payment_period: PaymentPeriod,
    pub payment_period_count: u32,
    pub cost: i64, // smallest currency unit
    pub description: String,
    pub link: String,
    pub logo: String,
}

impl SubscriptionDetails {
    /// Details with empty description, link and logo.
    pub fn new(
        category: Category,
        name: impl Into<String>,
        last_paid_date: NaiveDate,
        payment_period: PaymentPeriod,
        payment_period_count: u32,
        cost: i64,
    ) -> Self {
        Self {
            category,
            name: name.into(),
            last_paid_date,
            payment_period,
            payment_period_count,
            cost,
            description: String::new(),
            link: String::new(),
            logo: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    pub fn with_logo(mut self, logo: impl Into<String>) -> Self {
        self.logo = logo.into();
        self
    }

    /// Trim the name and check the business invariants.
    fn validated(mut self) -> DomainResult<Self> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("subscription name cannot be empty"));
        }
        self.name = name.to_string();

        if self.cost <= 0 {
            return Err(DomainError::validation("cost must be greater than zero"));
        }
        if self.payment_period_count < 1 {
            return Err(DomainError::validation(
                "payment period count must be at least 1",
            ));
        }
        Ok(self)
    }
}

#[derive(Deserialize)]
struct SubscriptionDetailsRecord {
    category: Category,
    name: String,
    last_paid_date: NaiveDate,
    payment_period: PaymentPeriod,
    payment_period_count: u32,
    cost: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    logo: String,
}

impl TryFrom<SubscriptionDetailsRecord> for SubscriptionDetails {
    type Error = DomainError;

    fn try_from(record: SubscriptionDetailsRecord) -> DomainResult<Self> {
        SubscriptionDetails {
            category: record.category,
            name: record.name,
            last_paid_date: record.last_paid_date,
            payment_period: record.payment_period,
            payment_period_count: record.payment_period_count,
            cost: record.cost,
            description: record.description,
            link: record.link,
            logo: record.logo,
        }
        .validated()
    }
}

/// Aggregate root: Subscription.
///
/// Current state is held in plain fields and mutated in place. Every mutation
/// that changes tracked fields also appends a [`SubscriptionEvent`] to an
/// append-only history; the history is an audit trail, never replayed.
///
/// `version` counts committed writes and is advanced by the store, which uses
/// it to reject writes based on a stale copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SubscriptionRecord")]
pub struct Subscription {
    id: SubscriptionId,
    version: u64,
    details: SubscriptionDetails,
    archived: bool,
    created_at: DateTime<Utc>,
    payments: Vec<Payment>,
    events: Vec<SubscriptionEvent>,
}

impl Subscription {
    pub fn new(details: SubscriptionDetails, created_at: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: SubscriptionId::new(),
            version: 0,
            details: details.validated()?,
            archived: false,
            created_at,
            payments: Vec::new(),
            events: Vec::new(),
        })
    }

    pub fn id_typed(&self) -> SubscriptionId {
        self.id
    }

    pub fn details(&self) -> &SubscriptionDetails {
        &self.details
    }

    pub fn category(&self) -> &Category {
        &self.details.category
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn last_paid_date(&self) -> NaiveDate {
        self.details.last_paid_date
    }

    pub fn payment_period(&self) -> PaymentPeriod {
        self.details.payment_period
    }

    pub fn payment_period_count(&self) -> u32 {
        self.details.payment_period_count
    }

    pub fn cost(&self) -> i64 {
        self.details.cost
    }

    pub fn description(&self) -> &str {
        &self.details.description
    }

    pub fn link(&self) -> &str {
        &self.details.link
    }

    pub fn logo(&self) -> &str {
        &self.details.logo
    }

    pub fn is_archived(&self) -> bool {
        self.archived
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// History records, oldest first.
    pub fn events(&self) -> &[SubscriptionEvent] {
        &self.events
    }

    pub fn next_due_date(&self) -> NaiveDate {
        next_due_date(
            self.details.last_paid_date,
            self.details.payment_period,
            self.details.payment_period_count,
        )
    }

    /// A subscription is due once its next due date is on or before `today`.
    pub fn is_due_on(&self, today: NaiveDate) -> bool {
        self.next_due_date() <= today
    }

    /// Replace every editable field and record what changed.
    ///
    /// Appends an `Update` event when any general field differs and a
    /// `CostChange` event when any billing field differs, in that order.
    /// Returns the appended events (possibly none). Invalid replacement values
    /// are rejected before anything is mutated.
    pub fn update(
        &mut self,
        details: SubscriptionDetails,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Vec<SubscriptionEvent>> {
        let details = details.validated()?;
        let current = &self.details;

        let general = ChangeSet::build([
            Change::new("category", current.category.name(), details.category.name()),
            Change::new("name", current.name.as_str(), details.name.as_str()),
            Change::new("lastPaidDate", current.last_paid_date, details.last_paid_date),
            Change::new("description", current.description.as_str(), details.description.as_str()),
            Change::new("link", current.link.as_str(), details.link.as_str()),
            Change::new("logo", current.logo.as_str(), details.logo.as_str()),
        ]);

        let cost = ChangeSet::build([
            Change::new(
                "paymentPeriod",
                current.payment_period.as_str(),
                details.payment_period.as_str(),
            ),
            Change::new(
                "paymentPeriodCount",
                current.payment_period_count,
                details.payment_period_count,
            ),
            Change::new("cost", current.cost, details.cost),
        ]);

        let mut appended = Vec::with_capacity(2);
        if !general.is_empty() {
            appended.push(SubscriptionEvent::new(
                self.id,
                SubscriptionEventType::Update,
                general,
                occurred_at,
            )?);
        }
        if !cost.is_empty() {
            appended.push(SubscriptionEvent::new(
                self.id,
                SubscriptionEventType::CostChange,
                cost,
                occurred_at,
            )?);
        }

        self.details = details;
        self.events.extend(appended.iter().cloned());
        Ok(appended)
    }

    /// Record a payment made on `paid_date`.
    ///
    /// The amount defaults to the current cost. The payment is dated
    /// `paid_date`, which also becomes the new last paid date.
    pub fn record_payment(
        &mut self,
        paid_date: NaiveDate,
        payment_type: PaymentType,
        amount: Option<i64>,
    ) -> DomainResult<Payment> {
        let amount = amount.unwrap_or(self.details.cost);
        let payment = Payment::new(self.id, payment_type, amount, paid_date)?;

        self.details.last_paid_date = paid_date;
        self.payments.push(payment.clone());
        Ok(payment)
    }

    /// Remove one payment. The last paid date is left untouched.
    pub fn remove_payment(&mut self, payment_id: PaymentId) -> DomainResult<Payment> {
        let index = self
            .payments
            .iter()
            .position(|p| *p.id() == payment_id)
            .ok_or_else(DomainError::not_found)?;
        Ok(self.payments.remove(index))
    }

    /// Mark this copy as committed: the stored version moves one step ahead.
    pub fn advance_version(&mut self) {
        self.version += 1;
    }

    /// Pick up a renamed category. Only the referenced category is accepted;
    /// no history is recorded because the subscription itself did not change.
    pub fn refresh_category(&mut self, category: &Category) -> DomainResult<()> {
        if category.id() != self.details.category.id() {
            return Err(DomainError::invariant("category_id mismatch"));
        }
        self.details.category = category.clone();
        Ok(())
    }

    /// Mark as archived. Always appends an `Archive` event, even when the
    /// subscription is already archived.
    pub fn archive(&mut self, occurred_at: DateTime<Utc>) -> DomainResult<SubscriptionEvent> {
        self.set_archived(true, SubscriptionEventType::Archive, occurred_at)
    }

    /// Mark as active. Always appends an `Unarchive` event.
    pub fn unarchive(&mut self, occurred_at: DateTime<Utc>) -> DomainResult<SubscriptionEvent> {
        self.set_archived(false, SubscriptionEventType::Unarchive, occurred_at)
    }

    fn set_archived(
        &mut self,
        archived: bool,
        event_type: SubscriptionEventType,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<SubscriptionEvent> {
        let event = SubscriptionEvent::new(self.id, event_type, ChangeSet::new(), occurred_at)?;
        self.archived = archived;
        self.events.push(event.clone());
        Ok(event)
    }
}

#[derive(Deserialize)]
struct SubscriptionRecord {
    id: SubscriptionId,
    #[serde(default)]
    version: u64,
    details: SubscriptionDetails,
    archived: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    payments: Vec<Payment>,
    #[serde(default)]
    events: Vec<SubscriptionEvent>,
}

impl TryFrom<SubscriptionRecord> for Subscription {
    type Error = DomainError;

    fn try_from(record: SubscriptionRecord) -> DomainResult<Self> {
        let foreign_payment = record
            .payments
            .iter()
            .any(|p| p.subscription_id() != record.id);
        let foreign_event = record
            .events
            .iter()
            .any(|e| e.subscription_id() != record.id);
        if foreign_payment || foreign_event {
            return Err(DomainError::invariant(
                "payments and events must belong to the subscription",
            ));
        }

        Ok(Self {
            id: record.id,
            version: record.version,
            details: record.details,
            archived: record.archived,
            created_at: record.created_at,
            payments: record.payments,
            events: record.events,
        })
    }
}

impl Entity for Subscription {
    type Id = SubscriptionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl AggregateRoot for Subscription {
    fn version(&self) -> u64 {
        self.version
    }

    fn history_len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_set::ChangeValue;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_category() -> Category {
        Category::new("Streaming").unwrap()
    }

    fn test_details() -> SubscriptionDetails {
        SubscriptionDetails::new(
            test_category(),
            "Netflix",
            date(2024, 1, 15),
            PaymentPeriod::Month,
            1,
            1599,
        )
        .with_description("Family plan")
        .with_link("https://netflix.com")
    }

    fn test_subscription() -> Subscription {
        Subscription::new(test_details(), test_time()).unwrap()
    }

    #[test]
    fn new_trims_name_and_starts_active() {
        let mut details = test_details();
        details.name = "  Netflix  ".to_string();
        let subscription = Subscription::new(details, test_time()).unwrap();

        assert_eq!(subscription.name(), "Netflix");
        assert!(!subscription.is_archived());
        assert!(subscription.payments().is_empty());
        assert!(subscription.events().is_empty());
    }

    #[test]
    fn new_rejects_invalid_details() {
        let mut blank = test_details();
        blank.name = "   ".to_string();
        let mut free = test_details();
        free.cost = 0;
        let mut no_period = test_details();
        no_period.payment_period_count = 0;

        for details in [blank, free, no_period] {
            let err = Subscription::new(details, test_time()).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn update_name_only_emits_single_update_event() {
        let mut subscription = test_subscription();
        let mut details = subscription.details().clone();
        details.name = "Netflix Premium".to_string();

        let events = subscription.update(details, test_time()).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(subscription.events().len(), 1);
        let event = &subscription.events()[0];
        assert_eq!(event.event_type(), SubscriptionEventType::Update);
        assert_eq!(event.context().fields().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(
            event.context().get("name").unwrap().new,
            ChangeValue::Text("Netflix Premium".to_string())
        );
        for field in ["cost", "paymentPeriod", "paymentPeriodCount"] {
            assert!(!event.context().contains(field));
        }
        assert_eq!(subscription.name(), "Netflix Premium");
    }

    #[test]
    fn update_cost_only_emits_single_cost_change_event() {
        let mut subscription = test_subscription();
        let mut details = subscription.details().clone();
        details.cost = 1799;

        subscription.update(details, test_time()).unwrap();

        assert_eq!(subscription.events().len(), 1);
        let event = &subscription.events()[0];
        assert_eq!(event.event_type(), SubscriptionEventType::CostChange);
        let cost = event.context().get("cost").unwrap();
        assert_eq!(cost.old, ChangeValue::Integer(1599));
        assert_eq!(cost.new, ChangeValue::Integer(1799));
        assert_eq!(subscription.cost(), 1799);
    }

    #[test]
    fn update_with_identical_values_emits_nothing() {
        let mut subscription = test_subscription();
        let before = subscription.clone();

        let events = subscription.update(subscription.details().clone(), test_time()).unwrap();

        assert!(events.is_empty());
        assert_eq!(subscription, before);
    }

    #[test]
    fn update_both_buckets_orders_update_before_cost_change() {
        let mut subscription = test_subscription();
        let mut details = subscription.details().clone();
        details.name = "Netflix 4K".to_string();
        details.cost = 2299;

        subscription.update(details, test_time()).unwrap();

        let types: Vec<_> = subscription.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![SubscriptionEventType::Update, SubscriptionEventType::CostChange]
        );
    }

    #[test]
    fn update_is_idempotent() {
        let mut subscription = test_subscription();
        let mut details = subscription.details().clone();
        details.link = "https://www.netflix.com".to_string();
        details.payment_period = PaymentPeriod::Year;

        subscription.update(details.clone(), test_time()).unwrap();
        subscription.update(details, test_time()).unwrap();

        assert_eq!(subscription.events().len(), 2);
    }

    #[test]
    fn update_formats_category_date_and_period_for_display() {
        let mut subscription = test_subscription();
        let mut details = subscription.details().clone();
        details.category = Category::new("Entertainment").unwrap();
        details.last_paid_date = date(2024, 2, 15);
        details.payment_period = PaymentPeriod::Week;
        details.payment_period_count = 4;

        subscription.update(details, test_time()).unwrap();

        let update = subscription.events()[0].context();
        assert_eq!(
            update.fields().collect::<Vec<_>>(),
            vec!["category", "lastPaidDate"]
        );
        assert_eq!(
            update.get("category").unwrap().old,
            ChangeValue::Text("Streaming".to_string())
        );
        assert_eq!(
            update.get("lastPaidDate").unwrap().new,
            ChangeValue::Text("2024-02-15".to_string())
        );

        let cost = subscription.events()[1].context();
        assert_eq!(
            cost.fields().collect::<Vec<_>>(),
            vec!["paymentPeriod", "paymentPeriodCount"]
        );
        assert_eq!(
            cost.get("paymentPeriod").unwrap().new,
            ChangeValue::Text("week".to_string())
        );
        assert_eq!(cost.get("paymentPeriodCount").unwrap().new, ChangeValue::Integer(4));
    }

    #[test]
    fn update_with_same_named_category_records_nothing_but_switches_reference() {
        let mut subscription = test_subscription();
        let mut details = subscription.details().clone();
        let other = Category::new("Streaming").unwrap();
        let other_id = *other.id();
        details.category = other;

        let events = subscription.update(details, test_time()).unwrap();

        assert!(events.is_empty());
        assert_eq!(*subscription.category().id(), other_id);
    }

    #[test]
    fn update_rejects_invalid_values_without_mutating() {
        let mut subscription = test_subscription();
        let before = subscription.clone();
        let mut details = subscription.details().clone();
        details.name = "New name".to_string();
        details.cost = -5;

        let err = subscription.update(details, test_time()).unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(subscription, before);
    }

    #[test]
    fn record_payment_defaults_amount_to_cost() {
        let mut subscription = test_subscription();
        let paid = date(2024, 2, 15);

        let payment = subscription
            .record_payment(paid, PaymentType::Verified, None)
            .unwrap();

        assert_eq!(payment.amount(), 1599);
        assert_eq!(payment.created_at(), paid);
        assert_eq!(payment.subscription_id(), subscription.id_typed());
        assert_eq!(subscription.last_paid_date(), paid);
        assert_eq!(subscription.payments().len(), 1);
        assert!(subscription.events().is_empty());
    }

    #[test]
    fn record_payment_uses_explicit_amount() {
        let mut subscription = test_subscription();
        let payment = subscription
            .record_payment(date(2024, 2, 15), PaymentType::Verified, Some(2000))
            .unwrap();
        assert_eq!(payment.amount(), 2000);
    }

    #[test]
    fn record_payment_rejects_bad_amount_before_mutating() {
        let mut subscription = test_subscription();
        let before = subscription.clone();

        let err = subscription
            .record_payment(date(2024, 2, 15), PaymentType::Verified, Some(0))
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(subscription, before);
    }

    #[test]
    fn remove_payment_deletes_only_that_payment() {
        let mut subscription = test_subscription();
        let first = subscription
            .record_payment(date(2024, 2, 15), PaymentType::Verified, None)
            .unwrap();
        let second = subscription
            .record_payment(date(2024, 3, 15), PaymentType::Generated, None)
            .unwrap();

        let removed = subscription.remove_payment(*first.id()).unwrap();

        assert_eq!(removed, first);
        assert_eq!(subscription.payments(), &[second]);
        assert_eq!(
            subscription.remove_payment(*first.id()).unwrap_err(),
            DomainError::NotFound
        );
    }

    #[test]
    fn refresh_category_accepts_only_the_same_category() {
        let mut subscription = test_subscription();
        let mut renamed = subscription.category().clone();
        renamed.rename("Video").unwrap();

        subscription.refresh_category(&renamed).unwrap();
        assert_eq!(subscription.category().name(), "Video");
        assert!(subscription.events().is_empty());

        let err = subscription.refresh_category(&test_category()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn archive_and_unarchive_append_empty_events() {
        let mut subscription = test_subscription();

        subscription.archive(test_time()).unwrap();
        assert!(subscription.is_archived());
        subscription.unarchive(test_time()).unwrap();
        assert!(!subscription.is_archived());

        let types: Vec<_> = subscription.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![SubscriptionEventType::Archive, SubscriptionEventType::Unarchive]
        );
        assert!(subscription.events().iter().all(|e| e.context().is_empty()));
    }

    #[test]
    fn repeated_archive_still_appends() {
        let mut subscription = test_subscription();
        subscription.archive(test_time()).unwrap();
        subscription.archive(test_time()).unwrap();

        assert!(subscription.is_archived());
        assert_eq!(subscription.history_len(), 2);
    }

    #[test]
    fn due_date_follows_last_payment() {
        let mut subscription = test_subscription();
        assert_eq!(subscription.next_due_date(), date(2024, 2, 15));
        assert!(subscription.is_due_on(date(2024, 2, 15)));
        assert!(!subscription.is_due_on(date(2024, 2, 14)));

        subscription
            .record_payment(date(2024, 2, 15), PaymentType::Generated, None)
            .unwrap();
        assert_eq!(subscription.next_due_date(), date(2024, 3, 15));
    }

    #[test]
    fn events_serialize_with_wire_context() {
        let mut subscription = test_subscription();
        let mut details = subscription.details().clone();
        details.cost = 1999;
        subscription.update(details, test_time()).unwrap();

        let json = serde_json::to_value(&subscription.events()[0]).unwrap();
        assert_eq!(json["type"], "costChange");
        assert_eq!(
            json["context"],
            serde_json::json!({ "cost": { "old": 1599, "new": 1999 } })
        );
    }

    #[test]
    fn deserialize_rejects_invalid_details() {
        let subscription = test_subscription();
        let json = serde_json::to_value(&subscription).unwrap();

        for (field, value) in [
            ("cost", serde_json::json!(0)),
            ("cost", serde_json::json!(-100)),
            ("name", serde_json::json!("   ")),
            ("payment_period_count", serde_json::json!(0)),
        ] {
            let mut bad = json.clone();
            bad["details"][field] = value;
            assert!(
                serde_json::from_value::<Subscription>(bad).is_err(),
                "{field} should be rejected"
            );
        }
    }

    #[test]
    fn deserialize_rejects_invalid_history_and_payments() {
        let mut subscription = test_subscription();
        subscription.archive(test_time()).unwrap();
        subscription
            .record_payment(date(2024, 2, 15), PaymentType::Verified, None)
            .unwrap();
        let json = serde_json::to_value(&subscription).unwrap();
        assert_eq!(serde_json::from_value::<Subscription>(json.clone()).unwrap(), subscription);

        let mut archive_with_context = json.clone();
        archive_with_context["events"][0]["context"] =
            serde_json::json!({ "name": { "old": "a", "new": "b" } });
        assert!(serde_json::from_value::<Subscription>(archive_with_context).is_err());

        let mut free_payment = json.clone();
        free_payment["payments"][0]["amount"] = serde_json::json!(0);
        assert!(serde_json::from_value::<Subscription>(free_payment).is_err());

        let mut foreign_payment = json;
        foreign_payment["payments"][0]["subscription_id"] =
            serde_json::to_value(SubscriptionId::new()).unwrap();
        assert!(serde_json::from_value::<Subscription>(foreign_payment).is_err());
    }

    #[test]
    fn advance_version_counts_commits() {
        let mut subscription = test_subscription();
        assert_eq!(subscription.version(), 0);
        subscription.advance_version();
        subscription.advance_version();
        assert_eq!(subscription.version(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: applying the same replacement twice only records history once.
        #[test]
        fn second_identical_update_is_silent(
            name in "[A-Za-z][A-Za-z0-9 ]{0,30}",
            cost in 1i64..1_000_000,
            count in 1u32..24,
        ) {
            let mut subscription = test_subscription();
            let mut details = subscription.details().clone();
            details.name = name;
            details.cost = cost;
            details.payment_period_count = count;

            let first = subscription.update(details.clone(), test_time()).unwrap();
            let second = subscription.update(details, test_time()).unwrap();

            prop_assert!(first.len() <= 2);
            prop_assert!(second.is_empty());
            prop_assert_eq!(subscription.events().len(), first.len());
        }
    }
}
