//! # Report Snapshots
//!
//! Read-only views handed to the reporting/printing and notification
//! collaborators. No formatting happens here.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Order, OrderDetail, OrderStatus, OrderType, OrderItem, Payment};

/// Date range (inclusive, by order creation day) and optional seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub seller_id: Option<String>,
}

impl ReportFilter {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::InvalidFormat {
                field: "from".to_string(),
                reason: format!("{} is after {}", from, to),
            });
        }
        Ok(ReportFilter {
            from,
            to,
            seller_id: None,
        })
    }

    pub fn for_seller(mut self, seller_id: impl Into<String>) -> Self {
        self.seller_id = Some(seller_id.into());
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        let day = order.created_at.date_naive();
        day >= self.from
            && day <= self.to
            && self
                .seller_id
                .as_deref()
                .map_or(true, |id| id == order.seller_id)
    }
}

/// Number of items waiting for an admin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
    pub orders: u64,
    pub payments: u64,
}

impl PendingCounts {
    #[inline]
    pub fn total(&self) -> u64 {
        self.orders + self.payments
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
    pub remaining_debt: Money,
}

/// Per-seller figures over the orders in a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerTotals {
    pub seller_id: String,
    pub seller_name: String,
    pub order_count: u64,
    /// Approved sales.
    pub sales: Money,
    /// Approved returns.
    pub returns: Money,
    /// Approved payments that brought money in.
    pub received: Money,
    pub consumed: Money,
    /// Recorded cash still waiting for an admin to confirm it.
    pub pending_payments: Money,
    /// Remaining debt on approved sales.
    pub outstanding: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub filter: ReportFilter,
    pub generated_at: DateTime<Utc>,
    pub orders: Vec<OrderSnapshot>,
    pub sellers: Vec<SellerTotals>,
}

/// Assembles a snapshot from orders and payments.
///
/// Orders outside `filter` are dropped; payments are attached to their
/// order and dropped when the order is not in the snapshot.
pub fn build_snapshot(
    filter: ReportFilter,
    orders: Vec<OrderDetail>,
    payments: Vec<Payment>,
    generated_at: DateTime<Utc>,
) -> LedgerSnapshot {
    let mut by_order: HashMap<String, Vec<Payment>> = HashMap::new();
    for payment in payments {
        by_order.entry(payment.order_id.clone()).or_default().push(payment);
    }

    let mut snapshots: Vec<OrderSnapshot> = orders
        .into_iter()
        .filter(|d| filter.matches(&d.order))
        .map(|d| {
            let mut payments = by_order.remove(&d.order.id).unwrap_or_default();
            payments.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.created_at.cmp(&b.created_at)));
            let remaining_debt = if d.order.can_pay() {
                d.order.remaining_debt()
            } else {
                Money::zero()
            };
            OrderSnapshot {
                order: d.order,
                items: d.items,
                payments,
                remaining_debt,
            }
        })
        .collect();
    snapshots.sort_by(|a, b| a.order.created_at.cmp(&b.order.created_at));

    let mut sellers: BTreeMap<String, SellerTotals> = BTreeMap::new();
    for snap in &snapshots {
        let totals = sellers
            .entry(snap.order.seller_id.clone())
            .or_insert_with(|| SellerTotals {
                seller_id: snap.order.seller_id.clone(),
                seller_name: snap.order.seller_name.clone(),
                ..SellerTotals::default()
            });
        totals.order_count += 1;

        if snap.order.status != OrderStatus::Approved {
            continue;
        }
        match snap.order.order_type {
            OrderType::Sale => {
                totals.sales += snap.order.total();
                totals.outstanding += snap.remaining_debt;
            }
            OrderType::Return => totals.returns += snap.order.total(),
        }
        for payment in &snap.payments {
            if !payment.is_approved() {
                totals.pending_payments += payment.amount();
            } else if payment.method.is_received_money() {
                totals.received += payment.amount();
            } else {
                totals.consumed += payment.amount();
            }
        }
    }

    LedgerSnapshot {
        filter,
        generated_at,
        orders: snapshots,
        sellers: sellers.into_values().collect(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethod, PaymentStatus};
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn detail(id: &str, seller: &str, d: u32, total: i64, paid: i64, status: OrderStatus) -> OrderDetail {
        let created = Utc.with_ymd_and_hms(2024, 3, d, 15, 0, 0).unwrap();
        OrderDetail {
            order: Order {
                id: id.to_string(),
                seller_id: seller.to_string(),
                seller_name: seller.to_uppercase(),
                total_cents: total,
                paid_cents: paid,
                status,
                order_type: OrderType::Sale,
                original_order_id: None,
                created_at: created,
                updated_at: created,
                version: 1,
            },
            items: Vec::new(),
        }
    }

    fn payment(order_id: &str, seller: &str, cents: i64, method: PaymentMethod, status: PaymentStatus) -> Payment {
        Payment {
            id: format!("p-{}-{}", order_id, cents),
            order_id: order_id.to_string(),
            seller_id: seller.to_string(),
            amount_cents: cents,
            date: day(10),
            method,
            status,
            proof_ref: None,
            description: None,
            allocation_id: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_filter_range_is_inclusive() {
        let filter = ReportFilter::new(day(1), day(5)).unwrap();
        assert!(filter.matches(&detail("a", "s1", 1, 0, 0, OrderStatus::Pending).order));
        assert!(filter.matches(&detail("a", "s1", 5, 0, 0, OrderStatus::Pending).order));
        assert!(!filter.matches(&detail("a", "s1", 6, 0, 0, OrderStatus::Pending).order));

        let only_s2 = filter.for_seller("s2");
        assert!(!only_s2.matches(&detail("a", "s1", 2, 0, 0, OrderStatus::Pending).order));
        assert!(ReportFilter::new(day(5), day(1)).is_err());
    }

    #[test]
    fn test_snapshot_seller_totals() {
        let orders = vec![
            detail("a", "s1", 2, 10_000, 6_000, OrderStatus::Approved),
            detail("b", "s1", 3, 5_000, 0, OrderStatus::Pending),
            detail("c", "s2", 4, 2_000, 2_000, OrderStatus::Approved),
            detail("late", "s1", 20, 9_000, 0, OrderStatus::Approved),
        ];
        let payments = vec![
            payment("a", "s1", 5_000, PaymentMethod::Pix, PaymentStatus::Approved),
            payment("a", "s1", 1_000, PaymentMethod::Consumption, PaymentStatus::Approved),
            payment("a", "s1", 3_000, PaymentMethod::Cash, PaymentStatus::Pending),
            payment("c", "s2", 2_000, PaymentMethod::Card, PaymentStatus::Approved),
            payment("late", "s1", 100, PaymentMethod::Card, PaymentStatus::Approved),
        ];

        let now = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        let snapshot = build_snapshot(ReportFilter::new(day(1), day(10)).unwrap(), orders, payments, now);

        assert_eq!(snapshot.orders.len(), 3);
        assert_eq!(snapshot.orders[0].payments.len(), 3);
        assert_eq!(snapshot.orders[1].remaining_debt, Money::zero());

        let s1 = &snapshot.sellers[0];
        assert_eq!(s1.seller_id, "s1");
        assert_eq!(s1.order_count, 2);
        assert_eq!(s1.sales, Money::from_cents(10_000));
        assert_eq!(s1.received, Money::from_cents(5_000));
        assert_eq!(s1.consumed, Money::from_cents(1_000));
        assert_eq!(s1.pending_payments, Money::from_cents(3_000));
        assert_eq!(s1.outstanding, Money::from_cents(4_000));

        let s2 = &snapshot.sellers[1];
        assert_eq!(s2.outstanding, Money::zero());
    }

    #[test]
    fn test_pending_counts() {
        let counts = PendingCounts {
            orders: 2,
            payments: 1,
        };
        assert_eq!(counts.total(), 3);
        assert!(PendingCounts::default().is_empty());
    }
}
