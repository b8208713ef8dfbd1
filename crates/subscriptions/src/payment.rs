use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use subtrack_core::{DomainError, DomainResult, Entity, PaymentId, SubscriptionId};

/// How a payment came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    /// Recorded manually by the user.
    Verified,
    /// Created by the payment scheduler for an overdue subscription.
    Generated,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Verified => "verified",
            PaymentType::Generated => "generated",
        }
    }
}

/// A single payment made for a subscription.
///
/// Immutable once created; payments are only ever added or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PaymentRecord")]
pub struct Payment {
    id: PaymentId,
    subscription_id: SubscriptionId,
    payment_type: PaymentType,
    amount: i64, // smallest currency unit
    created_at: NaiveDate,
}

impl Payment {
    pub fn new(
        subscription_id: SubscriptionId,
        payment_type: PaymentType,
        amount: i64,
        created_at: NaiveDate,
    ) -> DomainResult<Self> {
        check_amount(amount)?;

        Ok(Self {
            id: PaymentId::new(),
            subscription_id,
            payment_type,
            amount,
            created_at,
        })
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    pub fn payment_type(&self) -> PaymentType {
        self.payment_type
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Date the payment was made.
    pub fn created_at(&self) -> NaiveDate {
        self.created_at
    }
}

fn check_amount(amount: i64) -> DomainResult<()> {
    if amount <= 0 {
        return Err(DomainError::validation(
            "payment amount must be greater than zero",
        ));
    }
    Ok(())
}

#[derive(Deserialize)]
struct PaymentRecord {
    id: PaymentId,
    subscription_id: SubscriptionId,
    payment_type: PaymentType,
    amount: i64,
    created_at: NaiveDate,
}

impl TryFrom<PaymentRecord> for Payment {
    type Error = DomainError;

    fn try_from(record: PaymentRecord) -> DomainResult<Self> {
        check_amount(record.amount)?;
        Ok(Self {
            id: record.id,
            subscription_id: record.subscription_id,
            payment_type: record.payment_type,
            amount: record.amount,
            created_at: record.created_at,
        })
    }
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
