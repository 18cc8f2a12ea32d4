//! # Payment Allocator
//!
//! Spreads one payment amount across a seller's outstanding orders,
//! oldest first.
//!
//! ## Algorithm
//! ```text
//! debts (oldest first):  [30.00] [50.00] [20.00]      amount = 70.00
//!                           │       │       │
//!                           ▼       ▼       ▼
//! pay = min(left, debt):  30.00   40.00     -          left: 70 → 40 → 0
//! ```
//!
//! Amounts are exact cents, so the loop runs while anything is left. The
//! 1-cent tolerance only applies to the upfront bound check and to
//! candidate eligibility.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Order, YearMonth};
use crate::validation::validate_amount;

/// One generated payment: `amount` against `order_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub order_id: String,
    pub amount: Money,
}

/// Result of allocating one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub requested: Money,
    /// Combined remaining debt of the eligible candidates.
    pub selected_debt: Money,
    /// `min(requested, selected_debt)`.
    pub allocated: Money,
    pub allocations: Vec<Allocation>,
}

/// True for orders the allocator may pay: approved sales with real debt left.
#[inline]
pub fn is_eligible(order: &Order) -> bool {
    order.can_pay() && order.remaining_debt().above_tolerance()
}

/// Eligible orders sorted oldest first. Ties break on id for a stable order.
pub fn eligible_orders(orders: &[Order]) -> Vec<Order> {
    let mut eligible: Vec<Order> = orders.iter().filter(|o| is_eligible(o)).cloned().collect();
    eligible.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    eligible
}

/// Eligible orders created in `month`.
pub fn select_by_month(orders: &[Order], month: YearMonth) -> Vec<Order> {
    eligible_orders(orders)
        .into_iter()
        .filter(|o| month.contains_timestamp(o.created_at))
        .collect()
}

/// Plans an oldest-first allocation of `amount` over `candidates`.
///
/// Every candidate must be payable (approved sale); one that is not fails
/// the whole plan with `PaymentNotAllowed`. A repeated order id fails it
/// with `Duplicate`. Candidates with no debt left are skipped. Requests above the selected debt by more than the
/// tolerance fail with `AllocationExceedsDebt`.
pub fn allocate(candidates: &[Order], amount: Money) -> CoreResult<AllocationPlan> {
    validate_amount("payment amount", amount)?;

    if let Some(order) = candidates.iter().find(|o| !o.can_pay()) {
        return Err(CoreError::PaymentNotAllowed {
            order_id: order.id.clone(),
            status: order.status,
            order_type: order.order_type,
        });
    }

    let mut seen = HashSet::new();
    if let Some(order) = candidates.iter().find(|o| !seen.insert(o.id.as_str())) {
        return Err(ValidationError::Duplicate {
            field: "order_id".to_string(),
            value: order.id.clone(),
        }
        .into());
    }

    let ordered = eligible_orders(candidates);
    let selected_debt: Money = ordered.iter().map(Order::remaining_debt).sum();

    if ordered.is_empty() || amount.exceeds(selected_debt) {
        return Err(CoreError::AllocationExceedsDebt {
            requested: amount,
            available: selected_debt,
        });
    }

    let mut left = amount;
    let mut allocations = Vec::new();
    for order in &ordered {
        if !left.is_positive() {
            break;
        }
        let pay = left.min(order.remaining_debt());
        if pay.is_positive() {
            allocations.push(Allocation {
                order_id: order.id.clone(),
                amount: pay,
            });
            left -= pay;
        }
    }

    let allocated: Money = allocations.iter().map(|a| a.amount).sum();

    Ok(AllocationPlan {
        requested: amount,
        selected_debt,
        allocated,
        allocations,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderStatus, OrderType};
    use chrono::{TimeZone, Utc};

    fn order(id: &str, day: u32, total: i64, paid: i64) -> Order {
        let created = Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap();
        Order {
            id: id.to_string(),
            seller_id: "s1".to_string(),
            seller_name: "Ana".to_string(),
            total_cents: total,
            paid_cents: paid,
            status: OrderStatus::Approved,
            order_type: OrderType::Sale,
            original_order_id: None,
            created_at: created,
            updated_at: created,
            version: 0,
        }
    }

    #[test]
    fn test_allocation_conservation() {
        // passed newest first on purpose
        let orders = vec![
            order("c", 3, 2000, 0),
            order("b", 2, 5000, 0),
            order("a", 1, 3000, 0),
        ];

        let plan = allocate(&orders, Money::from_cents(7000)).unwrap();

        assert_eq!(
            plan.allocations,
            vec![
                Allocation {
                    order_id: "a".to_string(),
                    amount: Money::from_cents(3000),
                },
                Allocation {
                    order_id: "b".to_string(),
                    amount: Money::from_cents(4000),
                },
            ]
        );
        assert_eq!(plan.allocated, Money::from_cents(7000));
        assert_eq!(plan.selected_debt, Money::from_cents(10000));
    }

    #[test]
    fn test_allocation_rejection() {
        let orders = vec![order("a", 1, 6000, 0), order("b", 2, 4000, 0)];

        let err = allocate(&orders, Money::from_cents(10002)).unwrap_err();
        assert_eq!(
            err,
            CoreError::AllocationExceedsDebt {
                requested: Money::from_cents(10002),
                available: Money::from_cents(10000),
            }
        );
    }

    #[test]
    fn test_allocation_within_tolerance_caps_at_debt() {
        let orders = vec![order("a", 1, 6000, 0), order("b", 2, 4000, 0)];

        let plan = allocate(&orders, Money::from_cents(10001)).unwrap();
        assert_eq!(plan.allocated, Money::from_cents(10000));
        assert_eq!(plan.allocations.len(), 2);
    }

    #[test]
    fn test_allocation_uses_remaining_debt() {
        let orders = vec![order("a", 1, 3000, 2500), order("b", 2, 5000, 0)];

        let plan = allocate(&orders, Money::from_cents(1000)).unwrap();
        assert_eq!(plan.allocations[0].amount, Money::from_cents(500));
        assert_eq!(plan.allocations[1].amount, Money::from_cents(500));
    }

    #[test]
    fn test_allocation_rejects_unpayable_candidate() {
        let mut pending = order("p", 1, 3000, 0);
        pending.status = OrderStatus::Pending;

        let err = allocate(&[pending, order("a", 2, 1000, 0)], Money::from_cents(500)).unwrap_err();
        assert!(matches!(err, CoreError::PaymentNotAllowed { .. }));
    }

    #[test]
    fn test_allocation_requires_debt() {
        let settled = order("a", 1, 3000, 3000);
        let err = allocate(&[settled], Money::from_cents(1)).unwrap_err();
        assert!(matches!(err, CoreError::AllocationExceedsDebt { .. }));
    }

    #[test]
    fn test_allocation_rejects_repeated_order() {
        let a = order("a", 1, 3000, 0);
        let err = allocate(&[a.clone(), a], Money::from_cents(6000)).unwrap_err();
        assert_eq!(
            err,
            CoreError::Validation(ValidationError::Duplicate {
                field: "order_id".to_string(),
                value: "a".to_string(),
            })
        );
    }

    #[test]
    fn test_allocation_never_pays_past_remaining_debt() {
        let orders = vec![order("paid", 1, 3000, 3000), order("a", 2, 2000, 500)];

        let plan = allocate(&orders, Money::from_cents(1500)).unwrap();
        assert_eq!(
            plan.allocations,
            vec![Allocation {
                order_id: "a".to_string(),
                amount: Money::from_cents(1500),
            }]
        );

        let err = allocate(&orders, Money::from_cents(1502)).unwrap_err();
        assert!(matches!(err, CoreError::AllocationExceedsDebt { .. }));
    }

    #[test]
    fn test_eligible_orders_filters_and_sorts() {
        let mut ret = order("r", 1, 1000, 0);
        ret.order_type = OrderType::Return;
        let dust = order("d", 2, 1000, 999);
        let orders = vec![order("late", 20, 1000, 0), ret, dust, order("early", 5, 1000, 0)];

        let ids: Vec<String> = eligible_orders(&orders).into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["early".to_string(), "late".to_string()]);
    }

    #[test]
    fn test_select_by_month() {
        let mut feb = order("feb", 1, 1000, 0);
        feb.created_at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let orders = vec![order("jan", 31, 1000, 0), feb];

        let jan = select_by_month(&orders, YearMonth::new(2024, 1).unwrap());
        assert_eq!(jan.len(), 1);
        assert_eq!(jan[0].id, "jan");
    }
}
