//! # Seed Data Generator
//!
//! Populates a development database with sellers, products and a few months
//! of order history, all written through the [`Ledger`] so every balance is
//! consistent.
//!
//! ## Usage
//! ```bash
//! # Three sellers (default)
//! cargo run -p tally-db --bin seed
//!
//! # Custom amount
//! cargo run -p tally-db --bin seed -- --sellers 5
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//! ```
//!
//! ## Generated Data
//! Per seller:
//! - Two historical sales per month for the last three months
//! - A partial PIX payment on the older sales
//! - One pending sale order and one pending cash payment
//! - A customer with a short credit history

use chrono::{Duration, Utc};
use std::env;
use tally_core::{
    Actor, CommissionRate, CustomerTransactionType, LedgerPolicy, LineRequest, Money,
    PaymentMeta, PaymentMethod,
};
use tally_db::{Database, DbConfig, Ledger};

/// Catalogue for test data: name, unit price in cents, initial stock.
const PRODUCTS: &[(&str, i64, i64)] = &[
    ("Chocolate Cake Slice", 1200, 80),
    ("Brigadeiro Box", 2500, 60),
    ("Cheese Bread Pack", 1800, 120),
    ("Carrot Cake", 3500, 40),
    ("Coconut Sweets", 900, 150),
    ("Honey Bread", 700, 200),
];

const SELLER_NAMES: &[&str] = &["Ana", "Bruno", "Carla", "Diego", "Elisa", "Fabio"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut sellers: usize = 3;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--sellers" | "-s" => {
                if i + 1 < args.len() {
                    sellers = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -s, --sellers <N>  Number of sellers to generate (default: 3, max: 6)");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }
    let sellers = sellers.clamp(1, SELLER_NAMES.len());

    println!("🌱 Tally Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!("Sellers:  {}", sellers);
    println!();

    // Connect to database
    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Check existing products
    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let ledger = Ledger::new(db, LedgerPolicy::default()).await?;
    let admin = Actor::admin("seed-admin");
    let start = std::time::Instant::now();

    // Catalogue
    let mut product_ids = Vec::with_capacity(PRODUCTS.len());
    for (name, price, stock) in PRODUCTS {
        let product = ledger
            .register_product(&admin, name, Money::from_cents(*price), *stock)
            .await?;
        product_ids.push(product.id);
    }
    println!("✓ Registered {} products", product_ids.len());

    let today = Utc::now();
    let mut orders = 0;
    let mut payments = 0;

    for (seller_idx, name) in SELLER_NAMES.iter().take(sellers).enumerate() {
        // Rates cycle through 15%, 20%, 25%
        let rate = CommissionRate::from_percent(15 + 5 * (seller_idx as u32 % 3));
        let seller = ledger.register_seller(&admin, name, Some(rate)).await?;
        let owner = Actor::seller(seller.id.clone());

        // History: two sales per month, three months back
        for month_back in 1..=3i64 {
            for n in 0..2usize {
                let created_at = today - Duration::days(month_back * 30 + n as i64 * 7);
                let lines = pick_lines(&product_ids, seller_idx + n + month_back as usize);
                let sale = ledger
                    .record_historical_sale(&admin, &seller.id, &lines, created_at)
                    .await?;
                orders += 1;

                if month_back > 1 {
                    let half = Money::from_cents(sale.order.total_cents / 2);
                    let meta = PaymentMeta::new(created_at.date_naive(), PaymentMethod::Pix)
                        .with_description("Partial transfer");
                    ledger
                        .record_payment(&owner, &sale.order.id, half, meta)
                        .await?;
                    payments += 1;
                }
            }
        }

        // Current activity waiting for review
        let lines = pick_lines(&product_ids, seller_idx);
        ledger.submit_sale_order(&owner, &seller.id, &lines).await?;
        orders += 1;

        let open = ledger
            .database()
            .orders()
            .list_by_seller(&seller.id)
            .await?
            .into_iter()
            .find(|o| o.can_pay() && o.remaining_debt().is_positive());
        if let Some(open) = open {
            let amount = open.remaining_debt().min(Money::from_cents(1000));
            let meta = PaymentMeta::new(today.date_naive(), PaymentMethod::Cash);
            ledger.record_payment(&owner, &open.id, amount, meta).await?;
            payments += 1;
        }

        // Informal customer credit
        let customer = ledger
            .register_customer(&owner, &seller.id, &format!("{}'s neighbour", name), None)
            .await?;
        let entries = [
            (CustomerTransactionType::Purchase, 5000, 40),
            (CustomerTransactionType::Purchase, 3000, 20),
            (CustomerTransactionType::Payment, 4000, 10),
        ];
        for (tx_type, cents, days_ago) in entries {
            ledger
                .record_customer_transaction(
                    &owner,
                    &customer.id,
                    tx_type,
                    Money::from_cents(cents),
                    (today - Duration::days(days_ago)).date_naive(),
                    None,
                )
                .await?;
        }

        println!("  Seeded seller {} ({}%)", seller.name, rate.percent());
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} orders and {} payments in {:?}", orders, payments, elapsed);

    let counts = ledger.pending_counts().await?;
    println!(
        "  Pending review: {} orders, {} payments",
        counts.orders, counts.payments
    );

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Picks two or three catalogue lines, varying with `seed`.
fn pick_lines(product_ids: &[String], seed: usize) -> Vec<LineRequest> {
    let count = 2 + seed % 2;
    (0..count)
        .map(|k| LineRequest {
            product_id: product_ids[(seed + k * 2) % product_ids.len()].clone(),
            quantity: 1 + ((seed + k) % 4) as i64,
        })
        .collect()
}
