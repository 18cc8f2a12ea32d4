//! # Commission Engine
//!
//! One seller's payout for one calendar month.
//!
//! ```text
//! total_sales          Σ order.total     approved sales created in month
//! total_received_cash  Σ payment.amount  method != consumption, dated in month
//! total_consumed       Σ payment.amount  method == consumption, dated in month
//!
//! commission_gross = total_received_cash × rate
//! payout           = commission_gross − total_consumed − extra_discount
//! ```
//!
//! Sales are attributed by order date, payments by payment date. The payout
//! can be negative and is reported as is. Pending payments count unless
//! the caller asks for approved payments only.

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::money::Money;
use crate::types::{CommissionRate, Order, OrderStatus, OrderType, Payment, Seller, YearMonth};
use crate::validation::validate_non_negative;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionStatement {
    pub seller_id: String,
    pub seller_name: String,
    pub month: YearMonth,
    pub rate: CommissionRate,
    pub total_sales: Money,
    pub total_received_cash: Money,
    pub total_consumed: Money,
    pub extra_discount: Money,
    pub commission_gross: Money,
    pub payout: Money,
}

/// `received × rate − consumed − extra_discount`.
pub fn compute_payout(
    rate: CommissionRate,
    received: Money,
    consumed: Money,
    extra_discount: Money,
) -> (Money, Money) {
    let gross = received.apply_rate(rate);
    (gross, gross - consumed - extra_discount)
}

/// Builds the statement for `seller` in `month`.
///
/// Rows of other sellers are ignored, so callers may pass wider slices.
/// With `approved_only`, payments still waiting for review are left out.
pub fn commission_statement(
    seller: &Seller,
    month: YearMonth,
    orders: &[Order],
    payments: &[Payment],
    extra_discount: Money,
    approved_only: bool,
) -> CoreResult<CommissionStatement> {
    validate_non_negative("extra_discount", extra_discount)?;

    let total_sales: Money = orders
        .iter()
        .filter(|o| {
            o.seller_id == seller.id
                && o.order_type == OrderType::Sale
                && o.status == OrderStatus::Approved
                && month.contains_timestamp(o.created_at)
        })
        .map(Order::total)
        .sum();

    let in_month = payments
        .iter()
        .filter(|p| p.seller_id == seller.id && month.contains(p.date))
        .filter(|p| !approved_only || p.is_approved());

    let (mut received, mut consumed) = (Money::zero(), Money::zero());
    for payment in in_month {
        if payment.method.is_received_money() {
            received += payment.amount();
        } else {
            consumed += payment.amount();
        }
    }

    let rate = seller.commission_rate();
    let (commission_gross, payout) = compute_payout(rate, received, consumed, extra_discount);

    Ok(CommissionStatement {
        seller_id: seller.id.clone(),
        seller_name: seller.name.clone(),
        month,
        rate,
        total_sales,
        total_received_cash: received,
        total_consumed: consumed,
        extra_discount,
        commission_gross,
        payout,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
