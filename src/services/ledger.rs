// src/services/ledger.rs
//
// Payment-state derivation. Every place that shows or aggregates a payment state
// goes through `derive_state`; the cached column on `orders` is never trusted alone.

use crate::models::PaymentState;

/// Tolerance in minor currency units absorbed when comparing paid against total.
pub const SETTLEMENT_TOLERANCE: i64 = 1;

/// Map raw ledger figures to a payment state.
pub fn derive_state(total_amount: i64, paid_sum: i64) -> PaymentState {
    if paid_sum <= 0 {
        return PaymentState::Unpaid;
    }
    // Anything paid against a zero total settles it.
    if total_amount <= 0 {
        return PaymentState::Paid;
    }
    if paid_sum.saturating_add(SETTLEMENT_TOLERANCE) >= total_amount {
        return PaymentState::Paid;
    }
    PaymentState::Partial
}

/// Remaining amount owed, never negative.
pub fn balance(total_amount: i64, paid_sum: i64) -> i64 {
    total_amount.saturating_sub(paid_sum).max(0)
}

/// Figures an order would show if `pending_amount` were recorded now.
/// Pure projection; callers discard it once the real payment commits or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub paid_sum: i64,
    pub balance: i64,
    pub state: PaymentState,
}

pub fn project(total_amount: i64, paid_sum: i64, pending_amount: i64) -> Projection {
    let projected = paid_sum.saturating_add(pending_amount.max(0));
    Projection {
        paid_sum: projected,
        balance: balance(total_amount, projected),
        state: derive_state(total_amount, projected),
    }
}
