//! Payment periods and due date arithmetic.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Unit of a subscription's billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentPeriod {
    Week,
    Month,
    Year,
}

impl PaymentPeriod {
    /// Wire value (`"week"`, `"month"`, `"year"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPeriod::Week => "week",
            PaymentPeriod::Month => "month",
            PaymentPeriod::Year => "year",
        }
    }
}

impl core::fmt::Display for PaymentPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Date on which the next payment is expected.
///
/// `last_paid_date + period_count * period`, using calendar arithmetic: month
/// and year steps land on the same day of the target month, clamped to its last
/// day (2024-01-31 + 1 month = 2024-02-29). Saturates at [`NaiveDate::MAX`].
pub fn next_due_date(
    last_paid_date: NaiveDate,
    period: PaymentPeriod,
    period_count: u32,
) -> NaiveDate {
    let due = match period {
        PaymentPeriod::Week => {
            last_paid_date.checked_add_days(Days::new(u64::from(period_count) * 7))
        }
        PaymentPeriod::Month => last_paid_date.checked_add_months(Months::new(period_count)),
        PaymentPeriod::Year => period_count
            .checked_mul(12)
            .and_then(|months| last_paid_date.checked_add_months(Months::new(months))),
    };

    due.unwrap_or(NaiveDate::MAX)
}
