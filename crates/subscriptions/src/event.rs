//! Subscription history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use subtrack_core::{DomainError, DomainResult, Entity, SubscriptionEventId, SubscriptionId};

use crate::change_set::ChangeSet;

/// Kind of history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionEventType {
    /// General fields changed (category, name, dates, description, link, logo).
    Update,
    /// Billing terms changed (period, period count, cost).
    CostChange,
    Archive,
    Unarchive,
}

impl SubscriptionEventType {
    /// Wire value (`"update"`, `"costChange"`, `"archive"`, `"unarchive"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionEventType::Update => "update",
            SubscriptionEventType::CostChange => "costChange",
            SubscriptionEventType::Archive => "archive",
            SubscriptionEventType::Unarchive => "unarchive",
        }
    }

    /// Whether records of this type carry a field diff.
    pub fn requires_context(&self) -> bool {
        matches!(
            self,
            SubscriptionEventType::Update | SubscriptionEventType::CostChange
        )
    }
}

/// Append-only audit record attached to a subscription.
///
/// `Archive`/`Unarchive` records always have an empty context;
/// `Update`/`CostChange` records always have a non-empty one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SubscriptionEventRecord")]
pub struct SubscriptionEvent {
    id: SubscriptionEventId,
    subscription_id: SubscriptionId,
    #[serde(rename = "type")]
    event_type: SubscriptionEventType,
    context: ChangeSet,
    created_at: DateTime<Utc>,
}

impl SubscriptionEvent {
    pub fn new(
        subscription_id: SubscriptionId,
        event_type: SubscriptionEventType,
        context: ChangeSet,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        check_context(event_type, &context)?;

        Ok(Self {
            id: SubscriptionEventId::new(),
            subscription_id,
            event_type,
            context,
            created_at,
        })
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    pub fn event_type(&self) -> SubscriptionEventType {
        self.event_type
    }

    pub fn context(&self) -> &ChangeSet {
        &self.context
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

fn check_context(event_type: SubscriptionEventType, context: &ChangeSet) -> DomainResult<()> {
    if event_type.requires_context() && context.is_empty() {
        return Err(DomainError::invariant(
            "update and cost change events must have non-empty context",
        ));
    }
    if !event_type.requires_context() && !context.is_empty() {
        return Err(DomainError::invariant(
            "archive and unarchive events must have empty context",
        ));
    }
    Ok(())
}

/// Stored shape of a [`SubscriptionEvent`], checked before it becomes one.
#[derive(Deserialize)]
struct SubscriptionEventRecord {
    id: SubscriptionEventId,
    subscription_id: SubscriptionId,
    #[serde(rename = "type")]
    event_type: SubscriptionEventType,
    context: ChangeSet,
    created_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionEventRecord> for SubscriptionEvent {
    type Error = DomainError;

    fn try_from(record: SubscriptionEventRecord) -> DomainResult<Self> {
        check_context(record.event_type, &record.context)?;
        Ok(Self {
            id: record.id,
            subscription_id: record.subscription_id,
            event_type: record.event_type,
            context: record.context,
            created_at: record.created_at,
        })
    }
}

impl Entity for SubscriptionEvent {
    type Id = SubscriptionEventId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
