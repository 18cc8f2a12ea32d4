//! # Order Lifecycle
//!
//! Pure transition rules for orders and payments. Nothing here touches the
//! store: each function validates its inputs and returns either the new
//! records to write or a [`ReviewPlan`] describing every row change an
//! approval implies. `tally-db` applies the result inside one transaction.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Order Lifecycle                                 │
//! │                                                                         │
//! │   submit_sale / submit_return                                          │
//! │            │                                                            │
//! │            ▼                                                            │
//! │      ┌──────────┐   plan_review    ┌──────────┐                        │
//! │      │ PENDING  │ ───────────────► │ APPROVED │ ◄── historical_sale    │
//! │      └────┬─────┘                  └────┬─────┘                        │
//! │           │ check_order_rejection       │ paid only grows              │
//! │           ▼                             ▼                              │
//! │      ┌──────────┐              payments (sale only)                    │
//! │      │ REJECTED │                                                      │
//! │      └──────────┘                                                      │
//! │                                                                         │
//! │   Payment: PENDING (cash) ──approve──► APPROVED                        │
//! │                      └──────reject───► (row deleted)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{
    LedgerPolicy, Order, OrderDetail, OrderItem, OrderStatus, OrderType, Payment, PaymentMeta,
    PaymentStatus, Product, Seller,
};
use crate::validation::{
    validate_amount, validate_non_negative, validate_note, validate_price_cents,
    validate_quantity,
};
use crate::{new_id, MAX_ITEM_QUANTITY};

// =============================================================================
// Inputs
// =============================================================================

/// A requested product line, priced from a product snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
}

impl CartLine {
    /// Freezes the product's current name and price into the line.
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartLine {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price_cents: product.unit_price_cents,
            quantity,
        }
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// A product id and quantity, as sent by a seller for a sale or a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: String,
    pub quantity: i64,
}

/// Admin's edited quantity for one line during review. 0 deletes the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdjustment {
    pub item_id: String,
    pub quantity: i64,
}

// =============================================================================
// Order creation
// =============================================================================

/// Builds a new pending sale for `seller`.
///
/// `total = Σ quantity × unit_price`, nothing paid, no stock effect yet.
pub fn new_sale_order(
    seller: &Seller,
    lines: &[CartLine],
    now: DateTime<Utc>,
) -> CoreResult<OrderDetail> {
    build_sale(seller, lines, OrderStatus::Pending, now)
}

/// Builds an already-approved sale dated `created_at` (admin backdating).
///
/// Historical sales record goods that left stock long ago, so the caller
/// applies no stock movement for them.
pub fn historical_sale_order(
    seller: &Seller,
    lines: &[CartLine],
    created_at: DateTime<Utc>,
) -> CoreResult<OrderDetail> {
    build_sale(seller, lines, OrderStatus::Approved, created_at)
}

fn build_sale(
    seller: &Seller,
    lines: &[CartLine],
    status: OrderStatus,
    created_at: DateTime<Utc>,
) -> CoreResult<OrderDetail> {
    if lines.is_empty() {
        return Err(CoreError::EmptyOrder);
    }

    let mut seen = HashSet::new();
    for line in lines {
        validate_quantity(line.quantity)?;
        validate_price_cents(line.unit_price_cents)?;
        if !seen.insert(line.product_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "product_id".to_string(),
                value: line.product_id.clone(),
            }
            .into());
        }
    }

    let order_id = new_id();
    let items: Vec<OrderItem> = lines
        .iter()
        .map(|line| OrderItem {
            id: new_id(),
            order_id: order_id.clone(),
            product_id: line.product_id.clone(),
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
        })
        .collect();
    let total: Money = items.iter().map(OrderItem::line_total).sum();

    Ok(OrderDetail {
        order: Order {
            id: order_id,
            seller_id: seller.id.clone(),
            seller_name: seller.name.clone(),
            total_cents: total.cents(),
            paid_cents: 0,
            status,
            order_type: OrderType::Sale,
            original_order_id: None,
            created_at,
            updated_at: created_at,
            version: 0,
        },
        items,
    })
}

// =============================================================================
// Returns
// =============================================================================

/// How much of one product on a sale can still be returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnableLine {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    /// Quantity currently on the sale (already net of approved returns).
    pub on_order: i64,
    /// Quantity claimed by still-pending return requests.
    pub pending_return: i64,
    pub remaining: i64,
}

/// Remaining un-returned quantity per product of `original`.
///
/// `pending_returns` may contain any orders; only pending returns that
/// reference `original` are counted.
pub fn returnable_quantities(
    original: &OrderDetail,
    pending_returns: &[OrderDetail],
) -> Vec<ReturnableLine> {
    let mut claimed: HashMap<&str, i64> = HashMap::new();
    for ret in pending_returns.iter().filter(|r| {
        r.order.is_return()
            && r.order.status == OrderStatus::Pending
            && r.order.original_order_id.as_deref() == Some(original.order.id.as_str())
    }) {
        for item in &ret.items {
            *claimed.entry(item.product_id.as_str()).or_insert(0) += item.quantity;
        }
    }

    // Keyed by product id, in first-seen order
    let mut lines: Vec<ReturnableLine> = Vec::new();
    for item in &original.items {
        match lines.iter_mut().find(|l| l.product_id == item.product_id) {
            Some(line) => line.on_order += item.quantity,
            None => lines.push(ReturnableLine {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                unit_price_cents: item.unit_price_cents,
                on_order: item.quantity,
                pending_return: 0,
                remaining: 0,
            }),
        }
    }

    for line in &mut lines {
        line.pending_return = claimed.get(line.product_id.as_str()).copied().unwrap_or(0);
        line.remaining = (line.on_order - line.pending_return).max(0);
    }

    lines
}

fn ensure_returnable(original: &Order) -> CoreResult<()> {
    if original.order_type != OrderType::Sale {
        return Err(CoreError::InvalidReturn {
            order_id: original.id.clone(),
            reason: "only sales can be returned".to_string(),
        });
    }
    if original.status != OrderStatus::Approved {
        return Err(CoreError::InvalidReturn {
            order_id: original.id.clone(),
            reason: format!("sale is {}", original.status),
        });
    }
    Ok(())
}

/// Checks one requested return quantity against what is still returnable.
fn check_return_quantity(
    product_id: &str,
    quantity: i64,
    returnable: &[ReturnableLine],
) -> CoreResult<()> {
    let available = returnable
        .iter()
        .find(|l| l.product_id == product_id)
        .map(|l| l.remaining)
        .unwrap_or(0);

    if quantity < 0 || quantity > available {
        return Err(CoreError::InvalidQuantity {
            product_id: product_id.to_string(),
            requested: quantity,
            available,
        });
    }
    Ok(())
}

/// Builds a pending return against `original`.
///
/// Lines with quantity 0 are ignored so callers can send every line of the
/// sale; at least one positive line is required. Prices come from the
/// original sale, not the current catalogue.
pub fn new_return_order(
    original: &OrderDetail,
    pending_returns: &[OrderDetail],
    lines: &[LineRequest],
    now: DateTime<Utc>,
) -> CoreResult<OrderDetail> {
    ensure_returnable(&original.order)?;

    let returnable = returnable_quantities(original, pending_returns);

    let mut seen = HashSet::new();
    for line in lines {
        if !seen.insert(line.product_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "product_id".to_string(),
                value: line.product_id.clone(),
            }
            .into());
        }
        check_return_quantity(&line.product_id, line.quantity, &returnable)?;
    }

    let order_id = new_id();
    let items: Vec<OrderItem> = lines
        .iter()
        .filter(|line| line.quantity > 0)
        .filter_map(|line| {
            returnable
                .iter()
                .find(|r| r.product_id == line.product_id)
                .map(|r| OrderItem {
                    id: new_id(),
                    order_id: order_id.clone(),
                    product_id: r.product_id.clone(),
                    name: r.name.clone(),
                    quantity: line.quantity,
                    unit_price_cents: r.unit_price_cents,
                })
        })
        .collect();

    if items.is_empty() {
        return Err(CoreError::EmptyOrder);
    }

    let total: Money = items.iter().map(OrderItem::line_total).sum();

    Ok(OrderDetail {
        order: Order {
            id: order_id,
            seller_id: original.order.seller_id.clone(),
            seller_name: original.order.seller_name.clone(),
            total_cents: total.cents(),
            paid_cents: 0,
            status: OrderStatus::Pending,
            order_type: OrderType::Return,
            original_order_id: Some(original.order.id.clone()),
            created_at: now,
            updated_at: now,
            version: 0,
        },
        items,
    })
}

// =============================================================================
// Review (approve with edits)
// =============================================================================

/// A stock change for one product. Negative for sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: String,
    pub delta: i64,
}

/// Changes an approved return applies to the sale it reverses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnReversal {
    pub original_order_id: String,
    /// Version the original was read at; the update is guarded on it.
    pub original_version: i64,
    /// `(item_id, new_quantity)`; rows reaching 0 are kept as history.
    pub item_quantities: Vec<(String, i64)>,
    pub new_total_cents: i64,
}

/// Every row change implied by approving one pending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPlan {
    pub order_id: String,
    /// Version the order was read at; the approval is guarded on it.
    pub expected_version: i64,
    pub total_cents: i64,
    /// Lines whose quantity changed to a positive value.
    pub updated_items: Vec<(String, i64)>,
    /// Lines the admin zeroed.
    pub deleted_item_ids: Vec<String>,
    /// Lines as they stand after approval.
    pub final_items: Vec<OrderItem>,
    pub stock_movements: Vec<StockMovement>,
    pub reversal: Option<ReturnReversal>,
}

impl ReviewPlan {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// The sale a return reverses, plus the other pending returns against it.
#[derive(Debug, Clone, Copy)]
pub struct ReturnContext<'a> {
    pub original: &'a OrderDetail,
    /// Pending returns for the same sale, excluding the one under review.
    pub other_pending_returns: &'a [OrderDetail],
}

/// Plans the approval of a pending order with admin edits.
///
/// - quantity 0 deletes the line, quantity > 0 updates it, unmentioned lines stay
/// - `adjusted_total` becomes the order total as given
/// - sales decrement stock by each surviving line's final quantity
/// - returns reverse the original sale; stock comes back only when
///   `policy.restock_on_return` is set
pub fn plan_review(
    detail: &OrderDetail,
    adjustments: &[ItemAdjustment],
    adjusted_total: Money,
    return_context: Option<ReturnContext<'_>>,
    policy: &LedgerPolicy,
) -> CoreResult<ReviewPlan> {
    let order = &detail.order;
    if order.status != OrderStatus::Pending {
        return Err(CoreError::transition("Order", &order.id, order.status, "approve"));
    }
    validate_non_negative("total", adjusted_total)?;

    let mut requested: HashMap<&str, i64> = HashMap::new();
    for adj in adjustments {
        let Some(item) = detail.items.iter().find(|i| i.id == adj.item_id) else {
            return Err(ValidationError::InvalidFormat {
                field: "item_id".to_string(),
                reason: format!("{} is not a line of order {}", adj.item_id, order.id),
            }
            .into());
        };
        if adj.quantity < 0 {
            return Err(CoreError::InvalidQuantity {
                product_id: item.product_id.clone(),
                requested: adj.quantity,
                available: item.quantity,
            });
        }
        if adj.quantity > MAX_ITEM_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 0,
                max: MAX_ITEM_QUANTITY,
            }
            .into());
        }
        requested.insert(adj.item_id.as_str(), adj.quantity);
    }

    let mut updated_items = Vec::new();
    let mut deleted_item_ids = Vec::new();
    let mut final_items = Vec::new();
    for item in &detail.items {
        match requested.get(item.id.as_str()).copied() {
            Some(0) => deleted_item_ids.push(item.id.clone()),
            Some(qty) => {
                if qty != item.quantity {
                    updated_items.push((item.id.clone(), qty));
                }
                final_items.push(OrderItem {
                    quantity: qty,
                    ..item.clone()
                });
            }
            None if item.quantity > 0 => final_items.push(item.clone()),
            None => {}
        }
    }

    if final_items.is_empty() {
        return Err(CoreError::EmptyOrder);
    }

    let (stock_movements, reversal) = match order.order_type {
        OrderType::Sale => {
            let movements = final_items
                .iter()
                .map(|item| StockMovement {
                    product_id: item.product_id.clone(),
                    delta: -item.quantity,
                })
                .collect();
            (movements, None)
        }
        OrderType::Return => {
            let ctx = return_context.ok_or_else(|| CoreError::InvalidReturn {
                order_id: order.id.clone(),
                reason: "original sale not available".to_string(),
            })?;
            let reversal = plan_reversal(order, &final_items, adjusted_total, ctx)?;
            let movements = if policy.restock_on_return {
                final_items
                    .iter()
                    .map(|item| StockMovement {
                        product_id: item.product_id.clone(),
                        delta: item.quantity,
                    })
                    .collect()
            } else {
                Vec::new()
            };
            (movements, Some(reversal))
        }
    };

    Ok(ReviewPlan {
        order_id: order.id.clone(),
        expected_version: order.version,
        total_cents: adjusted_total.cents(),
        updated_items,
        deleted_item_ids,
        final_items,
        stock_movements,
        reversal,
    })
}

fn plan_reversal(
    return_order: &Order,
    final_items: &[OrderItem],
    credit: Money,
    ctx: ReturnContext<'_>,
) -> CoreResult<ReturnReversal> {
    let original = ctx.original;
    if return_order.original_order_id.as_deref() != Some(original.order.id.as_str()) {
        return Err(CoreError::InvalidReturn {
            order_id: return_order.id.clone(),
            reason: "original sale does not match".to_string(),
        });
    }
    ensure_returnable(&original.order)?;

    let returnable = returnable_quantities(original, ctx.other_pending_returns);
    for item in final_items {
        check_return_quantity(&item.product_id, item.quantity, &returnable)?;
    }

    // Reduce original lines product by product, first line first
    let mut to_remove: BTreeMap<&str, i64> = BTreeMap::new();
    for item in final_items {
        *to_remove.entry(item.product_id.as_str()).or_insert(0) += item.quantity;
    }
    let mut item_quantities = Vec::new();
    for line in &original.items {
        if let Some(left) = to_remove.get_mut(line.product_id.as_str()) {
            if *left > 0 && line.quantity > 0 {
                let take = (*left).min(line.quantity);
                *left -= take;
                item_quantities.push((line.id.clone(), line.quantity - take));
            }
        }
    }

    // Never push the sale's total under what was already paid
    let new_total = (original.order.total() - credit).max(original.order.paid());

    Ok(ReturnReversal {
        original_order_id: original.order.id.clone(),
        original_version: original.order.version,
        item_quantities,
        new_total_cents: new_total.cents(),
    })
}

/// Only pending orders can be rejected. No stock or balance effect.
pub fn check_order_rejection(order: &Order) -> CoreResult<()> {
    if order.status != OrderStatus::Pending {
        return Err(CoreError::transition("Order", &order.id, order.status, "reject"));
    }
    Ok(())
}

// =============================================================================
// Payments
// =============================================================================

/// Validates a payment of `amount` against `order`.
///
/// Gating comes first: a pending order or a return fails with
/// `PaymentNotAllowed` whatever the amount.
pub fn check_payment(order: &Order, amount: Money, meta: &PaymentMeta) -> CoreResult<()> {
    if !order.can_pay() {
        return Err(CoreError::PaymentNotAllowed {
            order_id: order.id.clone(),
            status: order.status,
            order_type: order.order_type,
        });
    }
    validate_amount("payment amount", amount)?;
    validate_note("description", meta.description.as_deref())?;
    validate_note("proof_ref", meta.proof_ref.as_deref())?;

    check_debt_bound(order, amount)
}

/// `paid + amount <= total + ε`, the same predicate the store guards on.
fn check_debt_bound(order: &Order, amount: Money) -> CoreResult<()> {
    if (order.paid() + amount).exceeds(order.total()) {
        return Err(CoreError::AllocationExceedsDebt {
            requested: amount,
            available: order.remaining_debt(),
        });
    }
    Ok(())
}

/// Builds the payment row. Status follows the method: cash waits for an admin.
pub fn new_payment(
    order: &Order,
    amount: Money,
    meta: &PaymentMeta,
    allocation_id: Option<String>,
    now: DateTime<Utc>,
) -> Payment {
    Payment {
        id: new_id(),
        order_id: order.id.clone(),
        seller_id: order.seller_id.clone(),
        amount_cents: amount.cents(),
        date: meta.date,
        method: meta.method,
        status: meta.method.initial_status(),
        proof_ref: meta.proof_ref.clone(),
        description: meta.description.clone(),
        allocation_id,
        created_at: now,
    }
}

/// An admin may confirm a pending payment if it still fits the order's debt.
pub fn check_payment_approval(payment: &Payment, order: &Order) -> CoreResult<()> {
    if payment.status != PaymentStatus::Pending {
        return Err(CoreError::transition(
            "Payment",
            &payment.id,
            "approved",
            "approve",
        ));
    }
    check_debt_bound(order, payment.amount())
}

/// Approved payments are already in `paid`; only pending ones can be rejected.
pub fn check_payment_rejection(payment: &Payment) -> CoreResult<()> {
    if payment.status != PaymentStatus::Pending {
        return Err(CoreError::transition(
            "Payment",
            &payment.id,
            "approved",
            "reject",
        ));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
    }

    fn seller() -> Seller {
        Seller {
            id: "s1".to_string(),
            name: "Ana".to_string(),
            commission_rate_bps: 2000,
            created_at: now(),
        }
    }

    fn line(product_id: &str, price: i64, qty: i64) -> CartLine {
        CartLine {
            product_id: product_id.to_string(),
            name: format!("Product {}", product_id),
            unit_price_cents: price,
            quantity: qty,
        }
    }

    fn approved_sale() -> OrderDetail {
        let mut sale =
            new_sale_order(&seller(), &[line("p1", 500, 3), line("p2", 1000, 2)], now()).unwrap();
        sale.order.status = OrderStatus::Approved;
        sale
    }

    fn meta(method: PaymentMethod) -> PaymentMeta {
        PaymentMeta::new(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(), method)
    }

    #[test]
    fn test_new_sale_order_totals() {
        let sale = new_sale_order(&seller(), &[line("p1", 500, 3), line("p2", 1000, 2)], now())
            .unwrap();
        assert_eq!(sale.order.total_cents, 3500);
        assert_eq!(sale.order.paid_cents, 0);
        assert_eq!(sale.order.status, OrderStatus::Pending);
        assert_eq!(sale.order.order_type, OrderType::Sale);
        assert_eq!(sale.items.len(), 2);
        assert!(sale.items.iter().all(|i| i.order_id == sale.order.id));
    }

    #[test]
    fn test_new_sale_order_rejects_empty_and_duplicates() {
        assert_eq!(
            new_sale_order(&seller(), &[], now()).unwrap_err(),
            CoreError::EmptyOrder
        );
        assert!(matches!(
            new_sale_order(&seller(), &[line("p1", 500, 1), line("p1", 500, 2)], now()),
            Err(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));
        assert!(new_sale_order(&seller(), &[line("p1", 500, 0)], now()).is_err());
    }

    #[test]
    fn test_historical_sale_is_approved_and_backdated() {
        let when = Utc.with_ymd_and_hms(2023, 11, 20, 9, 0, 0).unwrap();
        let sale = historical_sale_order(&seller(), &[line("p1", 500, 2)], when).unwrap();
        assert_eq!(sale.order.status, OrderStatus::Approved);
        assert_eq!(sale.order.created_at, when);
        assert!(sale.order.can_pay());
    }

    #[test]
    fn test_return_quantity_bound() {
        let sale = approved_sale();
        let err = new_return_order(
            &sale,
            &[],
            &[LineRequest {
                product_id: "p1".to_string(),
                quantity: 5,
            }],
            now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidQuantity {
                product_id: "p1".to_string(),
                requested: 5,
                available: 3,
            }
        );
    }

    #[test]
    fn test_return_counts_pending_returns() {
        let sale = approved_sale();
        let first = new_return_order(
            &sale,
            &[],
            &[LineRequest {
                product_id: "p1".to_string(),
                quantity: 2,
            }],
            now(),
        )
        .unwrap();
        assert_eq!(first.order.total_cents, 1000);
        assert_eq!(first.order.original_order_id.as_deref(), Some(sale.order.id.as_str()));

        let remaining = returnable_quantities(&sale, std::slice::from_ref(&first));
        let p1 = remaining.iter().find(|l| l.product_id == "p1").unwrap();
        assert_eq!(p1.pending_return, 2);
        assert_eq!(p1.remaining, 1);

        let err = new_return_order(
            &sale,
            std::slice::from_ref(&first),
            &[LineRequest {
                product_id: "p1".to_string(),
                quantity: 2,
            }],
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuantity { available: 1, .. }));
    }

    #[test]
    fn test_return_requires_approved_sale() {
        let pending =
            new_sale_order(&seller(), &[line("p1", 500, 3)], now()).unwrap();
        let err = new_return_order(
            &pending,
            &[],
            &[LineRequest {
                product_id: "p1".to_string(),
                quantity: 1,
            }],
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidReturn { .. }));
    }

    #[test]
    fn test_return_unknown_product_and_zero_lines() {
        let sale = approved_sale();
        let err = new_return_order(
            &sale,
            &[],
            &[LineRequest {
                product_id: "nope".to_string(),
                quantity: 1,
            }],
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuantity { available: 0, .. }));

        let err = new_return_order(
            &sale,
            &[],
            &[LineRequest {
                product_id: "p1".to_string(),
                quantity: 0,
            }],
            now(),
        )
        .unwrap_err();
        assert_eq!(err, CoreError::EmptyOrder);
    }

    #[test]
    fn test_review_sale_edits_and_stock() {
        let sale = new_sale_order(&seller(), &[line("p1", 500, 3), line("p2", 1000, 2)], now())
            .unwrap();
        let p1 = sale.items[0].id.clone();
        let p2 = sale.items[1].id.clone();

        let plan = plan_review(
            &sale,
            &[
                ItemAdjustment {
                    item_id: p1.clone(),
                    quantity: 0,
                },
                ItemAdjustment {
                    item_id: p2.clone(),
                    quantity: 1,
                },
            ],
            Money::from_cents(900),
            None,
            &LedgerPolicy::default(),
        )
        .unwrap();

        assert_eq!(plan.deleted_item_ids, vec![p1]);
        assert_eq!(plan.updated_items, vec![(p2, 1)]);
        assert_eq!(plan.total_cents, 900);
        assert_eq!(
            plan.stock_movements,
            vec![StockMovement {
                product_id: "p2".to_string(),
                delta: -1,
            }]
        );
        assert!(plan.reversal.is_none());
    }

    #[test]
    fn test_review_rejects_negative_and_all_zero() {
        let sale = new_sale_order(&seller(), &[line("p1", 500, 3)], now()).unwrap();
        let id = sale.items[0].id.clone();

        let err = plan_review(
            &sale,
            &[ItemAdjustment {
                item_id: id.clone(),
                quantity: -1,
            }],
            Money::from_cents(0),
            None,
            &LedgerPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuantity { .. }));

        let err = plan_review(
            &sale,
            &[ItemAdjustment {
                item_id: id,
                quantity: 0,
            }],
            Money::from_cents(0),
            None,
            &LedgerPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err, CoreError::EmptyOrder);
    }

    #[test]
    fn test_review_only_pending() {
        let sale = approved_sale();
        let err = plan_review(&sale, &[], sale.order.total(), None, &LedgerPolicy::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_review_return_reverses_original_without_restock() {
        let mut sale = approved_sale();
        sale.order.paid_cents = 1000;
        let ret = new_return_order(
            &sale,
            &[],
            &[LineRequest {
                product_id: "p1".to_string(),
                quantity: 3,
            }],
            now(),
        )
        .unwrap();

        let plan = plan_review(
            &ret,
            &[],
            ret.order.total(),
            Some(ReturnContext {
                original: &sale,
                other_pending_returns: &[],
            }),
            &LedgerPolicy::default(),
        )
        .unwrap();

        assert!(plan.stock_movements.is_empty());
        let reversal = plan.reversal.unwrap();
        assert_eq!(reversal.original_order_id, sale.order.id);
        // p1 line fully returned, row kept at quantity 0
        assert_eq!(reversal.item_quantities, vec![(sale.items[0].id.clone(), 0)]);
        assert_eq!(reversal.new_total_cents, 3500 - 1500);
    }

    #[test]
    fn test_review_return_total_floors_at_paid() {
        let mut sale = approved_sale();
        sale.order.paid_cents = 3000;
        let ret = new_return_order(
            &sale,
            &[],
            &[LineRequest {
                product_id: "p2".to_string(),
                quantity: 2,
            }],
            now(),
        )
        .unwrap();

        let plan = plan_review(
            &ret,
            &[],
            ret.order.total(),
            Some(ReturnContext {
                original: &sale,
                other_pending_returns: &[],
            }),
            &LedgerPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.reversal.unwrap().new_total_cents, 3000);
    }

    #[test]
    fn test_review_return_restocks_when_enabled() {
        let sale = approved_sale();
        let ret = new_return_order(
            &sale,
            &[],
            &[LineRequest {
                product_id: "p2".to_string(),
                quantity: 1,
            }],
            now(),
        )
        .unwrap();
        let policy = LedgerPolicy {
            restock_on_return: true,
            ..LedgerPolicy::default()
        };

        let plan = plan_review(
            &ret,
            &[],
            ret.order.total(),
            Some(ReturnContext {
                original: &sale,
                other_pending_returns: &[],
            }),
            &policy,
        )
        .unwrap();
        assert_eq!(
            plan.stock_movements,
            vec![StockMovement {
                product_id: "p2".to_string(),
                delta: 1,
            }]
        );
    }

    #[test]
    fn test_review_return_cannot_raise_quantity_past_sale() {
        let sale = approved_sale();
        let ret = new_return_order(
            &sale,
            &[],
            &[LineRequest {
                product_id: "p1".to_string(),
                quantity: 1,
            }],
            now(),
        )
        .unwrap();

        let err = plan_review(
            &ret,
            &[ItemAdjustment {
                item_id: ret.items[0].id.clone(),
                quantity: 4,
            }],
            Money::from_cents(2000),
            Some(ReturnContext {
                original: &sale,
                other_pending_returns: &[],
            }),
            &LedgerPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuantity { available: 3, .. }));
    }

    #[test]
    fn test_payment_gating() {
        let pending = new_sale_order(&seller(), &[line("p1", 500, 3)], now()).unwrap();
        let err = check_payment(&pending.order, Money::from_cents(100), &meta(PaymentMethod::Pix))
            .unwrap_err();
        assert!(matches!(err, CoreError::PaymentNotAllowed { .. }));

        let sale = approved_sale();
        let mut ret = new_return_order(
            &sale,
            &[],
            &[LineRequest {
                product_id: "p1".to_string(),
                quantity: 1,
            }],
            now(),
        )
        .unwrap();
        ret.order.status = OrderStatus::Approved;
        // gating wins even over an absurd amount
        let err = check_payment(&ret.order, Money::from_cents(-5), &meta(PaymentMethod::Pix))
            .unwrap_err();
        assert!(matches!(err, CoreError::PaymentNotAllowed { .. }));
    }

    #[test]
    fn test_payment_amount_bounds() {
        let sale = approved_sale();
        let m = meta(PaymentMethod::Card);
        assert!(check_payment(&sale.order, Money::from_cents(3500), &m).is_ok());
        assert!(check_payment(&sale.order, Money::from_cents(3501), &m).is_ok());
        assert!(matches!(
            check_payment(&sale.order, Money::from_cents(3502), &m),
            Err(CoreError::AllocationExceedsDebt { .. })
        ));
        assert!(matches!(
            check_payment(&sale.order, Money::zero(), &m),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_new_payment_status_follows_method() {
        let sale = approved_sale();
        let cash = new_payment(&sale.order, Money::from_cents(4000), &meta(PaymentMethod::Cash), None, now());
        assert_eq!(cash.status, PaymentStatus::Pending);
        assert_eq!(cash.seller_id, "s1");

        let pix = new_payment(&sale.order, Money::from_cents(4000), &meta(PaymentMethod::Pix), None, now());
        assert_eq!(pix.status, PaymentStatus::Approved);
    }

    #[test]
    fn test_payment_approval_and_rejection_checks() {
        let mut sale = approved_sale();
        let cash = new_payment(&sale.order, Money::from_cents(3000), &meta(PaymentMethod::Cash), None, now());
        assert!(check_payment_approval(&cash, &sale.order).is_ok());
        assert!(check_payment_rejection(&cash).is_ok());

        // another payment got approved in the meantime
        sale.order.paid_cents = 1000;
        assert!(matches!(
            check_payment_approval(&cash, &sale.order),
            Err(CoreError::AllocationExceedsDebt { .. })
        ));

        let pix = new_payment(&sale.order, Money::from_cents(100), &meta(PaymentMethod::Pix), None, now());
        assert!(check_payment_approval(&pix, &sale.order).is_err());
        assert!(check_payment_rejection(&pix).is_err());
    }

    #[test]
    fn test_order_rejection_only_pending() {
        let pending = new_sale_order(&seller(), &[line("p1", 500, 3)], now()).unwrap();
        assert!(check_order_rejection(&pending.order).is_ok());
        assert!(check_order_rejection(&approved_sale().order).is_err());
    }
}
