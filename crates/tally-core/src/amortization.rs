//! # Debt Amortization Engine
//!
//! Shows, for one customer, how much of each month's purchases is still
//! unpaid. Payments are not linked to purchases: they form one fungible
//! pool applied to the oldest month first.
//!
//! ```text
//! purchases:  2024-01 100.00   2024-02 50.00        pool = 120.00
//!
//! pass (oldest first):
//!   2024-01  covered = min(100, 120) = 100   remaining   0   pool 20
//!   2024-02  covered = min( 50,  20) =  20   remaining  30   pool  0
//!
//! display (newest first): 2024-02 → 2024-01
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{CustomerTransaction, CustomerTransactionType, YearMonth};

/// One month of a customer statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthBalance {
    pub month: YearMonth,
    pub purchases: Money,
    /// Payments dated in this month (informational; the pool ignores dates).
    pub payments: Money,
    pub covered: Money,
    pub remaining_debt: Money,
}

/// A customer's balance broken down by month, newest month first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmortizationSchedule {
    pub months: Vec<MonthBalance>,
    pub total_purchases: Money,
    pub total_payments: Money,
    /// `total_purchases - total_payments`. Negative when the customer overpaid.
    pub balance: Money,
    /// What the seller owes the customer back (`-balance` when negative).
    pub credit: Money,
}

impl AmortizationSchedule {
    /// Sum of the per-month remaining debt.
    pub fn total_remaining(&self) -> Money {
        self.months.iter().map(|m| m.remaining_debt).sum()
    }
}

/// Runs the FIFO amortization pass over a customer's transactions.
pub fn amortize(transactions: &[CustomerTransaction]) -> AmortizationSchedule {
    let mut by_month: BTreeMap<YearMonth, (Money, Money)> = BTreeMap::new();
    let mut total_purchases = Money::zero();
    let mut total_payments = Money::zero();

    for tx in transactions {
        let entry = by_month
            .entry(YearMonth::of(tx.date))
            .or_insert((Money::zero(), Money::zero()));
        match tx.tx_type {
            CustomerTransactionType::Purchase => {
                entry.0 += tx.amount();
                total_purchases += tx.amount();
            }
            CustomerTransactionType::Payment => {
                entry.1 += tx.amount();
                total_payments += tx.amount();
            }
        }
    }

    // BTreeMap iterates oldest month first
    let mut pool = total_payments;
    let mut months: Vec<MonthBalance> = by_month
        .into_iter()
        .map(|(month, (purchases, payments))| {
            let covered = purchases.min(pool).max(Money::zero());
            pool -= covered;
            MonthBalance {
                month,
                purchases,
                payments,
                covered,
                remaining_debt: purchases - covered,
            }
        })
        .collect();
    months.reverse();

    let balance = total_purchases - total_payments;

    AmortizationSchedule {
        months,
        total_purchases,
        total_payments,
        balance,
        credit: if balance.is_negative() {
            -balance
        } else {
            Money::zero()
        },
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn tx(kind: CustomerTransactionType, cents: i64, y: i32, m: u32, d: u32) -> CustomerTransaction {
        CustomerTransaction {
            id: format!("{:?}-{}-{}-{}", kind, y, m, d),
            customer_id: "c1".to_string(),
            tx_type: kind,
            amount_cents: cents,
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            description: None,
            created_at: Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap(),
        }
    }

    fn purchase(cents: i64, y: i32, m: u32, d: u32) -> CustomerTransaction {
        tx(CustomerTransactionType::Purchase, cents, y, m, d)
    }

    fn payment(cents: i64, y: i32, m: u32, d: u32) -> CustomerTransaction {
        tx(CustomerTransactionType::Payment, cents, y, m, d)
    }

    #[test]
    fn test_fifo_amortization() {
        // the payment is dated in February but still settles January first
        let schedule = amortize(&[
            purchase(10000, 2024, 1, 10),
            purchase(5000, 2024, 2, 3),
            payment(12000, 2024, 2, 20),
        ]);

        assert_eq!(schedule.months.len(), 2);
        let feb = &schedule.months[0];
        let jan = &schedule.months[1];
        assert_eq!(feb.month, YearMonth::new(2024, 2).unwrap());
        assert_eq!(jan.remaining_debt, Money::zero());
        assert_eq!(feb.remaining_debt, Money::from_cents(3000));
        assert_eq!(feb.payments, Money::from_cents(12000));
    }

    #[test]
    fn test_amortization_conservation() {
        let histories = vec![
            vec![],
            vec![purchase(999, 2023, 12, 1)],
            vec![
                purchase(2500, 2023, 11, 5),
                payment(1000, 2023, 11, 6),
                purchase(4000, 2024, 1, 1),
                payment(300, 2024, 3, 9),
                purchase(100, 2024, 3, 10),
            ],
            vec![payment(500, 2024, 1, 1), purchase(500, 2024, 2, 1)],
        ];

        for history in histories {
            let schedule = amortize(&history);
            assert_eq!(schedule.total_remaining(), schedule.balance);
            assert!(schedule.months.iter().all(|m| !m.remaining_debt.is_negative()));
        }
    }

    #[test]
    fn test_overpayment_reports_credit() {
        let schedule = amortize(&[purchase(1000, 2024, 1, 1), payment(1500, 2024, 1, 2)]);

        assert_eq!(schedule.balance, Money::from_cents(-500));
        assert_eq!(schedule.credit, Money::from_cents(500));
        assert_eq!(schedule.total_remaining(), Money::zero());
        assert_eq!(schedule.total_remaining() - schedule.credit, schedule.balance);
    }

    #[test]
    fn test_months_sorted_newest_first() {
        let schedule = amortize(&[
            purchase(100, 2023, 12, 31),
            purchase(100, 2024, 2, 1),
            purchase(100, 2024, 1, 15),
        ]);
        let months: Vec<String> = schedule.months.iter().map(|m| m.month.to_string()).collect();
        assert_eq!(months, vec!["2024-02", "2024-01", "2023-12"]);
    }
}
