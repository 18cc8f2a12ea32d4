//! # Tally CLI
//!
//! Administrator command line over the ledger. Every command prints JSON.
//!
//! ## Usage
//! ```bash
//! tally migrate
//! tally pending
//! tally commission --seller <ID> --month 2024-03 --discount 12.50
//! tally statement --customer <ID>
//! tally report --from 2024-03-01 --to 2024-03-31 [--seller <ID>]
//! tally approve-payment --payment <ID>
//! tally reject-payment --payment <ID>
//! tally approve-order --order <ID> [--total 38.00]
//! tally reject-order --order <ID>
//! ```

use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tally_cli::config::AppConfig;
use tally_core::{Actor, Money, ReportFilter, YearMonth};
use tally_db::{Database, Ledger};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Administer the tally order and payment ledger", version)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "TALLY_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations
    Migrate,

    /// List orders and payments waiting for review
    Pending,

    /// Monthly commission statement for a seller
    Commission {
        #[arg(long)]
        seller: String,

        /// Calendar month, YYYY-MM
        #[arg(long)]
        month: YearMonth,

        /// Extra discount subtracted from the payout
        #[arg(long, default_value = "0")]
        discount: Money,
    },

    /// Month-by-month debt statement of a customer
    Statement {
        #[arg(long)]
        customer: String,
    },

    /// Orders, payments and seller totals for a date range
    Report {
        /// First day, YYYY-MM-DD (inclusive)
        #[arg(long)]
        from: NaiveDate,

        /// Last day, YYYY-MM-DD (inclusive)
        #[arg(long)]
        to: NaiveDate,

        #[arg(long)]
        seller: Option<String>,
    },

    /// Confirm a pending cash payment
    ApprovePayment {
        #[arg(long)]
        payment: String,
    },

    /// Delete a pending cash payment
    RejectPayment {
        #[arg(long)]
        payment: String,
    },

    /// Approve a pending order as submitted
    ApproveOrder {
        #[arg(long)]
        order: String,

        /// Agreed total (defaults to the submitted total)
        #[arg(long)]
        total: Option<Money>,
    },

    /// Reject a pending order
    RejectOrder {
        #[arg(long)]
        order: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tally=debug,sqlx=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config).context("loading configuration")?;
    info!(
        db_path = %config.database.path.display(),
        operator = %config.operator.id,
        "Configuration loaded"
    );

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let db = Database::new(config.db_config())
        .await
        .context("opening database")?;
    let ledger = Ledger::new(db, config.policy()).await?;
    let admin = Actor::admin(config.operator.id.clone());

    let result = run(&ledger, &admin, cli.command).await;
    ledger.database().close().await;
    result
}

async fn run(ledger: &Ledger, admin: &Actor, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Migrate => {
            ledger.database().run_migrations().await?;
            let (total, applied) = ledger.database().migration_status().await?;
            print_json(&serde_json::json!({ "total": total, "applied": applied }))
        }
        Command::Pending => print_json(&ledger.pending_review(admin).await?),
        Command::Commission {
            seller,
            month,
            discount,
        } => print_json(
            &ledger
                .commission_statement(admin, &seller, month, discount)
                .await?,
        ),
        Command::Statement { customer } => {
            print_json(&ledger.customer_statement(admin, &customer).await?)
        }
        Command::Report { from, to, seller } => {
            let mut filter = ReportFilter::new(from, to)?;
            if let Some(seller) = seller {
                filter = filter.for_seller(seller);
            }
            print_json(&ledger.snapshot(admin, filter).await?)
        }
        Command::ApprovePayment { payment } => {
            print_json(&ledger.approve_payment(admin, &payment).await?)
        }
        Command::RejectPayment { payment } => {
            print_json(&ledger.reject_payment(admin, &payment).await?)
        }
        Command::ApproveOrder { order, total } => {
            let total = match total {
                Some(total) => total,
                None => ledger.order_detail(admin, &order).await?.order.total(),
            };
            print_json(&ledger.review_and_approve(admin, &order, &[], total).await?)
        }
        Command::RejectOrder { order } => print_json(&ledger.reject_order(admin, &order).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_commission() {
        let cli = Cli::try_parse_from([
            "tally",
            "commission",
            "--seller",
            "s1",
            "--month",
            "2024-03",
            "--discount",
            "12.50",
        ])
        .unwrap();

        match cli.command {
            Command::Commission {
                seller,
                month,
                discount,
            } => {
                assert_eq!(seller, "s1");
                assert_eq!(month, YearMonth::new(2024, 3).unwrap());
                assert_eq!(discount.cents(), 1250);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parses_approve_order() {
        let cli = Cli::try_parse_from(["tally", "approve-order", "--order", "o1"]).unwrap();
        match cli.command {
            Command::ApproveOrder { order, total } => {
                assert_eq!(order, "o1");
                assert!(total.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "tally",
            "approve-order",
            "--order",
            "o1",
            "--total",
            "38.00",
        ])
        .unwrap();
        match cli.command {
            Command::ApproveOrder { total, .. } => {
                assert_eq!(total.map(|t| t.cents()), Some(3800));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_month() {
        let err = Cli::try_parse_from(["tally", "commission", "--seller", "s1", "--month", "2024-13"]);
        assert!(err.is_err());
    }
}
