//! Racing admin decisions against a file-backed database.

use std::path::PathBuf;

use chrono::{NaiveDate, TimeZone, Utc};
use tally_core::{
    Actor, CoreError, LedgerPolicy, LineRequest, Money, PaymentMeta, PaymentMethod,
};
use tally_db::{Database, DbConfig, Ledger, LedgerError};

struct TempDb(PathBuf);

impl TempDb {
    fn new() -> Self {
        let name = format!("tally-race-{}.db", uuid::Uuid::new_v4());
        TempDb(std::env::temp_dir().join(name))
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

fn lost_race(err: &LedgerError) -> bool {
    err.is_retryable() || matches!(err, LedgerError::Core(CoreError::InvalidTransition { .. }))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_double_cash_approval_counts_once() {
    let tmp = TempDb::new();
    let db = Database::new(DbConfig::new(&tmp.0).max_connections(4))
        .await
        .unwrap();
    let ledger = Ledger::new(db, LedgerPolicy::default()).await.unwrap();
    let admin = Actor::admin("admin-1");

    let seller = ledger.register_seller(&admin, "Ana", None).await.unwrap();
    let owner = Actor::seller(seller.id.clone());
    let cake = ledger
        .register_product(&admin, "Carrot Cake", Money::from_cents(1000), 10)
        .await
        .unwrap();
    let sale = ledger
        .record_historical_sale(
            &admin,
            &seller.id,
            &[LineRequest {
                product_id: cake.id,
                quantity: 2,
            }],
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        )
        .await
        .unwrap();

    let date = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
    let cash = ledger
        .record_payment(
            &owner,
            &sale.order.id,
            Money::from_cents(1500),
            PaymentMeta::new(date, PaymentMethod::Cash),
        )
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        ledger.approve_payment(&admin, &cash.id),
        ledger.approve_payment(&admin, &cash.id),
    );

    let outcomes = [a, b];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    for result in &outcomes {
        if let Err(err) = result {
            assert!(lost_race(err), "unexpected error: {err}");
        }
    }

    let order = ledger
        .database()
        .orders()
        .get(&sale.order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.paid_cents, 1500);

    ledger.database().close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_approve_and_reject_race_has_one_winner() {
    let tmp = TempDb::new();
    let db = Database::new(DbConfig::new(&tmp.0).max_connections(4))
        .await
        .unwrap();
    let ledger = Ledger::new(db, LedgerPolicy::default()).await.unwrap();
    let admin = Actor::admin("admin-1");

    let seller = ledger.register_seller(&admin, "Ana", None).await.unwrap();
    let owner = Actor::seller(seller.id.clone());
    let cake = ledger
        .register_product(&admin, "Carrot Cake", Money::from_cents(1000), 10)
        .await
        .unwrap();
    let order = ledger
        .submit_sale_order(
            &owner,
            &seller.id,
            &[LineRequest {
                product_id: cake.id.clone(),
                quantity: 2,
            }],
        )
        .await
        .unwrap();

    let (approved, rejected) = tokio::join!(
        ledger.review_and_approve(&admin, &order.order.id, &[], Money::from_cents(2000)),
        ledger.reject_order(&admin, &order.order.id),
    );

    assert!(approved.is_ok() != rejected.is_ok());
    if let Err(err) = &approved {
        assert!(lost_race(err), "unexpected error: {err}");
    }
    if let Err(err) = &rejected {
        assert!(lost_race(err), "unexpected error: {err}");
    }

    // Stock moved only if the approval won
    let stock = ledger
        .database()
        .products()
        .get(&cake.id)
        .await
        .unwrap()
        .unwrap()
        .stock_quantity;
    let expected = if approved.is_ok() { 8 } else { 10 };
    assert_eq!(stock, expected);
    assert_eq!(ledger.pending_counts().await.unwrap().orders, 0);

    ledger.database().close().await;
}
