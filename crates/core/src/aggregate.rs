//! Aggregate root trait for mutable domain models with an owned history.

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
///
/// An aggregate root is the only entry point for mutating the cluster of
/// entities it owns. Owned entities (payments, history records) are reachable
/// only through the root and share its lifecycle.
pub trait AggregateRoot: Entity {
    /// Number of committed writes of this aggregate.
    ///
    /// A copy carries the version it was loaded at; stores compare it against
    /// the committed version before accepting a write.
    fn version(&self) -> u64;

    /// Number of owned history records appended so far.
    ///
    /// Records are append-only, so this value never decreases.
    fn history_len(&self) -> usize;
}

/// Optimistic concurrency expectation for an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// Require the aggregate to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
