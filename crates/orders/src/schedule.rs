//! Installment and subscription due dates.

use chrono::{DateTime, Duration, Months, Utc};

use crate::order::OrderTerms;

/// Time between two installments: `ceil(weeks / installments)` whole weeks.
pub fn installment_interval(terms: &OrderTerms) -> Duration {
    let installments = terms.installments.max(1);
    let weeks = terms.duration_weeks.div_ceil(installments);
    Duration::days(i64::from(weeks) * 7)
}

/// When the next installment of a non-recurring order falls due.
///
/// `None` when nothing has been paid yet (the first payment is collected
/// through the payment gate) or when every installment is already paid.
pub fn next_installment_due(
    first_payment: DateTime<Utc>,
    payments_made: u32,
    terms: &OrderTerms,
) -> Option<DateTime<Utc>> {
    if payments_made == 0 || payments_made >= terms.installments {
        return None;
    }
    Some(first_payment + installment_interval(terms) * payments_made as i32)
}

/// A subscription is charged one calendar month after its last payment.
pub fn next_subscription_charge(last_payment: DateTime<Utc>) -> DateTime<Utc> {
    last_payment
        .checked_add_months(Months::new(1))
        .unwrap_or(last_payment)
}
