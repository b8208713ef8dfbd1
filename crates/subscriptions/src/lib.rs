//! Subscriptions domain module.
//!
//! This crate contains the business rules for subscription expense tracking,
//! implemented purely as deterministic domain logic (no IO, no storage):
//!
//! - [`ChangeSet`]: field-by-field diff of old/new displayable values
//! - [`Subscription`]: aggregate owning payments and an append-only history
//! - [`next_due_date`]: calendar-aware due date arithmetic

pub mod category;
pub mod change_set;
pub mod event;
pub mod payment;
pub mod period;
pub mod subscription;

pub use category::Category;
pub use change_set::{Change, ChangeSet, ChangeValue, FieldChange};
pub use event::{SubscriptionEvent, SubscriptionEventType};
pub use payment::{Payment, PaymentType};
pub use period::{PaymentPeriod, next_due_date};
pub use subscription::{Subscription, SubscriptionDetails};
