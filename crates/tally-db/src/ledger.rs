//! # Ledger Service
//!
//! Executes every lifecycle operation as one SQLite transaction: load the
//! rows, let `tally-core` decide, write the result, commit. A failure at
//! any step drops the transaction and nothing is kept.
//!
//! ## Operation Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Ledger::approve_payment(actor, payment_id)                             │
//! │       │                                                                 │
//! │       ├── require_admin(actor)                                          │
//! │       ├── BEGIN                                                         │
//! │       ├── payment::fetch, order::fetch                                  │
//! │       ├── lifecycle::check_payment_approval      (pure, tally-core)     │
//! │       ├── payment::mark_approved   WHERE status = 'pending'             │
//! │       ├── order::add_paid          WHERE paid + amount <= total + 0.01  │
//! │       ├── COMMIT                                                        │
//! │       └── publish pending counts (watch channel)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Guarded updates that lose a race surface as
//! `LedgerError::Store(DbError::ConcurrentModification)`; callers refetch
//! and retry (`LedgerError::is_retryable`).

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::pool::Database;
use crate::repository::{customer, order, payment, product, seller};
use tally_core::allocation::{self, AllocationPlan};
use tally_core::amortization::{self, AmortizationSchedule};
use tally_core::commission::{self, CommissionStatement};
use tally_core::lifecycle::{
    self, CartLine, ItemAdjustment, LineRequest, ReturnContext, ReturnableLine, ReviewPlan,
};
use tally_core::report::{self, LedgerSnapshot, PendingCounts, ReportFilter};
use tally_core::validation::{
    validate_amount, validate_commission_rate_bps, validate_name, validate_note,
    validate_non_negative, validate_price_cents,
};
use tally_core::{
    new_id, Actor, CommissionRate, Customer, CustomerTransaction,
    CustomerTransactionType, LedgerPolicy, Money, Order, OrderDetail, Payment, PaymentMeta,
    PaymentStatus, Product, Role, Seller, ValidationError, YearMonth,
};

// =============================================================================
// Inputs and outcomes
// =============================================================================

/// Which orders an allocation may pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationTarget {
    /// Orders picked by the seller.
    Orders(Vec<String>),
    /// Every eligible order created in the month.
    Month(YearMonth),
}

/// What one allocation wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub allocation_id: String,
    pub plan: AllocationPlan,
    pub payments: Vec<Payment>,
}

/// Everything waiting for an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReview {
    pub counts: PendingCounts,
    pub orders: Vec<OrderDetail>,
    pub payments: Vec<Payment>,
}

// =============================================================================
// Ledger
// =============================================================================

/// Transactional entry point for every ledger operation.
///
/// Cheap to clone; clones share the pool and the pending-count channel.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
    policy: LedgerPolicy,
    pending: Arc<watch::Sender<PendingCounts>>,
}

impl Ledger {
    /// Builds the service and loads the current pending counts.
    pub async fn new(db: Database, policy: LedgerPolicy) -> LedgerResult<Self> {
        let counts = load_pending_counts(&db).await?;
        let (sender, _) = watch::channel(counts);

        Ok(Ledger {
            db,
            policy,
            pending: Arc::new(sender),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Registers a seller. `rate` defaults to the policy's commission rate.
    pub async fn register_seller(
        &self,
        actor: &Actor,
        name: &str,
        rate: Option<CommissionRate>,
    ) -> LedgerResult<Seller> {
        require_admin(actor, "register sellers")?;
        validate_name("name", name)?;
        let rate = rate.unwrap_or(self.policy.default_commission_rate);
        validate_commission_rate_bps(rate.bps())?;

        let seller = Seller {
            id: new_id(),
            name: name.trim().to_string(),
            commission_rate_bps: rate.bps(),
            created_at: Utc::now(),
        };

        let mut conn = self.db.pool().acquire().await?;
        seller::insert(&mut conn, &seller).await?;

        info!(seller_id = %seller.id, name = %seller.name, "Seller registered");
        Ok(seller)
    }

    pub async fn set_commission_rate(
        &self,
        actor: &Actor,
        seller_id: &str,
        rate: CommissionRate,
    ) -> LedgerResult<Seller> {
        require_admin(actor, "change commission rates")?;
        validate_commission_rate_bps(rate.bps())?;

        let mut tx = self.db.pool().begin().await?;
        seller::set_commission_rate(&mut tx, seller_id, rate).await?;
        let updated = seller::fetch(&mut tx, seller_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Seller", seller_id))?;
        tx.commit().await?;

        info!(seller_id = %seller_id, bps = rate.bps(), "Commission rate changed");
        Ok(updated)
    }

    pub async fn register_product(
        &self,
        actor: &Actor,
        name: &str,
        unit_price: Money,
        initial_stock: i64,
    ) -> LedgerResult<Product> {
        require_admin(actor, "register products")?;
        validate_name("name", name)?;
        validate_price_cents(unit_price.cents())?;

        let now = Utc::now();
        let product = Product {
            id: new_id(),
            name: name.trim().to_string(),
            unit_price_cents: unit_price.cents(),
            stock_quantity: initial_stock,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.pool().acquire().await?;
        product::insert(&mut conn, &product).await?;

        info!(product_id = %product.id, name = %product.name, "Product registered");
        Ok(product)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// A seller requests products. Creates a pending sale.
    pub async fn submit_sale_order(
        &self,
        actor: &Actor,
        seller_id: &str,
        lines: &[LineRequest],
    ) -> LedgerResult<OrderDetail> {
        require_owner(actor, seller_id, "submit orders")?;

        let mut tx = self.db.pool().begin().await?;
        let seller = fetch_seller(&mut tx, seller_id).await?;
        let cart = price_lines(&mut tx, lines).await?;
        let detail = lifecycle::new_sale_order(&seller, &cart, Utc::now())?;
        order::insert_detail(&mut tx, &detail).await?;
        tx.commit().await?;

        info!(
            order_id = %detail.order.id,
            seller_id = %seller_id,
            total = %detail.order.total(),
            "Sale order submitted"
        );
        self.publish_pending().await;
        Ok(detail)
    }

    /// An admin records an old sale, approved as of `created_at`.
    ///
    /// No stock movement: the goods left long ago.
    pub async fn record_historical_sale(
        &self,
        actor: &Actor,
        seller_id: &str,
        lines: &[LineRequest],
        created_at: DateTime<Utc>,
    ) -> LedgerResult<OrderDetail> {
        require_admin(actor, "record historical sales")?;

        let mut tx = self.db.pool().begin().await?;
        let seller = fetch_seller(&mut tx, seller_id).await?;
        let cart = price_lines(&mut tx, lines).await?;
        let detail = lifecycle::historical_sale_order(&seller, &cart, created_at)?;
        order::insert_detail(&mut tx, &detail).await?;
        tx.commit().await?;

        info!(
            order_id = %detail.order.id,
            seller_id = %seller_id,
            created_at = %created_at,
            total = %detail.order.total(),
            "Historical sale recorded"
        );
        Ok(detail)
    }

    /// Remaining un-returned quantity per product of an approved sale.
    pub async fn returnable_quantities(
        &self,
        actor: &Actor,
        original_order_id: &str,
    ) -> LedgerResult<Vec<ReturnableLine>> {
        let mut conn = self.db.pool().acquire().await?;
        let original = fetch_detail(&mut conn, original_order_id).await?;
        require_owner_or_admin(actor, &original.order.seller_id, "view returns")?;

        let pending = order::list_pending_returns(&mut conn, original_order_id).await?;
        Ok(lifecycle::returnable_quantities(&original, &pending))
    }

    /// A seller hands back part of an approved sale. Creates a pending return.
    pub async fn submit_return_order(
        &self,
        actor: &Actor,
        original_order_id: &str,
        lines: &[LineRequest],
    ) -> LedgerResult<OrderDetail> {
        let mut tx = self.db.pool().begin().await?;
        let original = fetch_detail(&mut tx, original_order_id).await?;
        require_owner(actor, &original.order.seller_id, "submit returns")?;

        let pending = order::list_pending_returns(&mut tx, original_order_id).await?;
        let detail = lifecycle::new_return_order(&original, &pending, lines, Utc::now())?;
        order::insert_detail(&mut tx, &detail).await?;
        tx.commit().await?;

        info!(
            order_id = %detail.order.id,
            original_order_id = %original_order_id,
            total = %detail.order.total(),
            "Return order submitted"
        );
        self.publish_pending().await;
        Ok(detail)
    }

    /// Approves a pending order with the admin's edits.
    ///
    /// Sales move stock out; returns reverse their original sale (and move
    /// stock back only under `restock_on_return`). All in one transaction.
    pub async fn review_and_approve(
        &self,
        actor: &Actor,
        order_id: &str,
        adjustments: &[ItemAdjustment],
        adjusted_total: Money,
    ) -> LedgerResult<OrderDetail> {
        require_admin(actor, "approve orders")?;

        let mut tx = self.db.pool().begin().await?;
        let detail = fetch_detail(&mut tx, order_id).await?;

        let plan = match detail.order.original_order_id.as_deref() {
            Some(original_id) if detail.order.is_return() => {
                let original = fetch_detail(&mut tx, original_id).await?;
                let others: Vec<OrderDetail> = order::list_pending_returns(&mut tx, original_id)
                    .await?
                    .into_iter()
                    .filter(|r| r.order.id != order_id)
                    .collect();
                let ctx = ReturnContext {
                    original: &original,
                    other_pending_returns: &others,
                };
                lifecycle::plan_review(&detail, adjustments, adjusted_total, Some(ctx), &self.policy)?
            }
            _ => lifecycle::plan_review(&detail, adjustments, adjusted_total, None, &self.policy)?,
        };

        apply_review(&mut tx, &plan, Utc::now()).await?;
        let approved = fetch_detail(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(
            order_id = %order_id,
            order_type = %approved.order.order_type,
            total = %approved.order.total(),
            stock_movements = plan.stock_movements.len(),
            "Order approved"
        );
        self.publish_pending().await;
        Ok(approved)
    }

    /// Rejects a pending order. No stock or balance effect.
    pub async fn reject_order(&self, actor: &Actor, order_id: &str) -> LedgerResult<Order> {
        require_admin(actor, "reject orders")?;

        let mut tx = self.db.pool().begin().await?;
        let current = fetch_order(&mut tx, order_id).await?;
        lifecycle::check_order_rejection(&current)?;
        order::reject(&mut tx, order_id, Utc::now()).await?;
        let rejected = fetch_order(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(order_id = %order_id, "Order rejected");
        self.publish_pending().await;
        Ok(rejected)
    }

    /// One order with its lines, for its seller or an admin.
    pub async fn order_detail(&self, actor: &Actor, order_id: &str) -> LedgerResult<OrderDetail> {
        let mut conn = self.db.pool().acquire().await?;
        let detail = fetch_detail(&mut conn, order_id).await?;
        require_owner_or_admin(actor, &detail.order.seller_id, "view orders")?;
        Ok(detail)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Records a payment on one approved sale.
    ///
    /// Cash stays pending until an admin confirms it; other methods count
    /// toward `paid` immediately, in the same transaction.
    pub async fn record_payment(
        &self,
        actor: &Actor,
        order_id: &str,
        amount: Money,
        meta: PaymentMeta,
    ) -> LedgerResult<Payment> {
        let mut tx = self.db.pool().begin().await?;
        let target = fetch_order(&mut tx, order_id).await?;
        require_owner(actor, &target.seller_id, "record payments")?;

        lifecycle::check_payment(&target, amount, &meta)?;
        let now = Utc::now();
        let payment = lifecycle::new_payment(&target, amount, &meta, None, now);
        insert_payment(&mut tx, &payment, now).await?;
        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            order_id = %order_id,
            amount = %amount,
            method = %payment.method,
            "Payment recorded"
        );
        if payment.status == PaymentStatus::Pending {
            self.publish_pending().await;
        }
        Ok(payment)
    }

    /// Spreads one payment over a seller's orders, oldest first.
    ///
    /// Every generated payment and every `paid` increment commit together
    /// or not at all.
    pub async fn allocate_payment(
        &self,
        actor: &Actor,
        seller_id: &str,
        target: AllocationTarget,
        amount: Money,
        meta: PaymentMeta,
    ) -> LedgerResult<AllocationOutcome> {
        require_owner(actor, seller_id, "record payments")?;
        validate_note("description", meta.description.as_deref())?;
        validate_note("proof_ref", meta.proof_ref.as_deref())?;

        let mut tx = self.db.pool().begin().await?;
        let candidates = match &target {
            AllocationTarget::Orders(ids) => {
                let mut orders = Vec::with_capacity(ids.len());
                for id in ids {
                    let candidate = fetch_order(&mut tx, id).await?;
                    if candidate.seller_id != seller_id {
                        return Err(LedgerError::forbidden(
                            actor_label(actor),
                            format!("pay order {} of another seller", id),
                        ));
                    }
                    orders.push(candidate);
                }
                orders
            }
            AllocationTarget::Month(month) => {
                let orders = order::list_by_seller(&mut tx, seller_id).await?;
                allocation::select_by_month(&orders, *month)
            }
        };

        let plan = allocation::allocate(&candidates, amount)?;
        let allocation_id = new_id();
        let now = Utc::now();

        let mut payments = Vec::with_capacity(plan.allocations.len());
        for alloc in &plan.allocations {
            let target_order = candidates
                .iter()
                .find(|o| o.id == alloc.order_id)
                .ok_or_else(|| LedgerError::not_found("Order", alloc.order_id.as_str()))?;
            let payment = lifecycle::new_payment(
                target_order,
                alloc.amount,
                &meta,
                Some(allocation_id.clone()),
                now,
            );
            insert_payment(&mut tx, &payment, now).await?;
            payments.push(payment);
        }
        tx.commit().await?;

        info!(
            allocation_id = %allocation_id,
            seller_id = %seller_id,
            requested = %plan.requested,
            allocated = %plan.allocated,
            payments = payments.len(),
            "Payment allocated"
        );
        if payments.iter().any(|p| p.status == PaymentStatus::Pending) {
            self.publish_pending().await;
        }

        Ok(AllocationOutcome {
            allocation_id,
            plan,
            payments,
        })
    }

    /// Confirms a pending (cash) payment and adds it to the order's `paid`.
    pub async fn approve_payment(&self, actor: &Actor, payment_id: &str) -> LedgerResult<Payment> {
        require_admin(actor, "approve payments")?;

        let mut tx = self.db.pool().begin().await?;
        let pending = fetch_payment(&mut tx, payment_id).await?;
        let target = fetch_order(&mut tx, &pending.order_id).await?;
        lifecycle::check_payment_approval(&pending, &target)?;

        payment::mark_approved(&mut tx, payment_id).await?;
        order::add_paid(&mut tx, &target.id, pending.amount(), Utc::now()).await?;
        tx.commit().await?;

        info!(
            payment_id = %payment_id,
            order_id = %target.id,
            amount = %pending.amount(),
            "Payment approved"
        );
        self.publish_pending().await;

        Ok(Payment {
            status: PaymentStatus::Approved,
            ..pending
        })
    }

    /// Deletes a pending payment. `paid` never included it.
    pub async fn reject_payment(&self, actor: &Actor, payment_id: &str) -> LedgerResult<Payment> {
        require_admin(actor, "reject payments")?;

        let mut tx = self.db.pool().begin().await?;
        let pending = fetch_payment(&mut tx, payment_id).await?;
        lifecycle::check_payment_rejection(&pending)?;
        payment::delete_pending(&mut tx, payment_id).await?;
        tx.commit().await?;

        info!(payment_id = %payment_id, order_id = %pending.order_id, "Payment rejected");
        self.publish_pending().await;
        Ok(pending)
    }

    // =========================================================================
    // Customer ledger
    // =========================================================================

    pub async fn register_customer(
        &self,
        actor: &Actor,
        seller_id: &str,
        name: &str,
        phone: Option<&str>,
    ) -> LedgerResult<Customer> {
        require_owner(actor, seller_id, "register customers")?;
        validate_name("name", name)?;
        validate_note("phone", phone)?;

        let mut tx = self.db.pool().begin().await?;
        fetch_seller(&mut tx, seller_id).await?;
        let created = Customer {
            id: new_id(),
            seller_id: seller_id.to_string(),
            name: name.trim().to_string(),
            phone: phone.map(str::to_string),
            created_at: Utc::now(),
        };
        customer::insert(&mut tx, &created).await?;
        tx.commit().await?;

        info!(customer_id = %created.id, seller_id = %seller_id, "Customer registered");
        Ok(created)
    }

    pub async fn record_customer_transaction(
        &self,
        actor: &Actor,
        customer_id: &str,
        tx_type: CustomerTransactionType,
        amount: Money,
        date: NaiveDate,
        description: Option<&str>,
    ) -> LedgerResult<CustomerTransaction> {
        validate_amount("amount", amount)?;
        validate_note("description", description)?;

        let mut conn = self.db.pool().acquire().await?;
        let owner = fetch_customer(&mut conn, customer_id).await?;
        require_owner(actor, &owner.seller_id, "edit customer ledgers")?;

        let entry = CustomerTransaction {
            id: new_id(),
            customer_id: customer_id.to_string(),
            tx_type,
            amount_cents: amount.cents(),
            date,
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        customer::insert_transaction(&mut conn, &entry).await?;

        debug!(customer_id = %customer_id, tx_id = %entry.id, "Customer transaction recorded");
        Ok(entry)
    }

    pub async fn delete_customer_transaction(&self, actor: &Actor, tx_id: &str) -> LedgerResult<()> {
        let mut tx = self.db.pool().begin().await?;
        let entry = customer::fetch_transaction(&mut tx, tx_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("CustomerTransaction", tx_id))?;
        let owner = fetch_customer(&mut tx, &entry.customer_id).await?;
        require_owner(actor, &owner.seller_id, "edit customer ledgers")?;

        customer::delete_transaction(&mut tx, tx_id).await?;
        tx.commit().await?;

        debug!(customer_id = %entry.customer_id, tx_id = %tx_id, "Customer transaction deleted");
        Ok(())
    }

    /// Month-by-month amortization of a customer's balance.
    pub async fn customer_statement(
        &self,
        actor: &Actor,
        customer_id: &str,
    ) -> LedgerResult<AmortizationSchedule> {
        let mut conn = self.db.pool().acquire().await?;
        let owner = fetch_customer(&mut conn, customer_id).await?;
        require_owner_or_admin(actor, &owner.seller_id, "view customer ledgers")?;

        let transactions = customer::list_transactions(&mut conn, customer_id).await?;
        Ok(amortization::amortize(&transactions))
    }

    // =========================================================================
    // Commission and reporting
    // =========================================================================

    pub async fn commission_statement(
        &self,
        actor: &Actor,
        seller_id: &str,
        month: YearMonth,
        extra_discount: Money,
    ) -> LedgerResult<CommissionStatement> {
        require_admin(actor, "compute commissions")?;
        validate_non_negative("extra_discount", extra_discount)?;

        let (from, to) = month
            .first_day()
            .zip(month.last_day())
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "month".to_string(),
                reason: format!("{} is out of range", month),
            })?;

        let mut conn = self.db.pool().acquire().await?;
        let owner = fetch_seller(&mut conn, seller_id).await?;
        let orders = order::list_by_seller(&mut conn, seller_id).await?;
        let payments = payment::list_by_seller_dated(&mut conn, seller_id, from, to).await?;

        let statement = commission::commission_statement(
            &owner,
            month,
            &orders,
            &payments,
            extra_discount,
            self.policy.commission_approved_only,
        )?;

        info!(
            seller_id = %seller_id,
            month = %month,
            payout = %statement.payout,
            "Commission computed"
        );
        Ok(statement)
    }

    /// Orders, payments and per-seller totals for a date range.
    ///
    /// Sellers only ever see their own figures.
    pub async fn snapshot(&self, actor: &Actor, filter: ReportFilter) -> LedgerResult<LedgerSnapshot> {
        let filter = match actor.role {
            Role::Admin => filter,
            Role::Seller => match filter.seller_id.clone() {
                None => filter.for_seller(actor.user_id.clone()),
                Some(id) if id == actor.user_id => filter,
                Some(_) => {
                    return Err(LedgerError::forbidden(
                        actor_label(actor),
                        "view other sellers' reports",
                    ))
                }
            },
        };

        let mut conn = self.db.pool().acquire().await?;
        let seller_id = filter.seller_id.as_deref();
        let orders = order::list_created_between(&mut conn, filter.from, filter.to, seller_id).await?;
        let payments =
            payment::list_for_orders_created_between(&mut conn, filter.from, filter.to, seller_id)
                .await?;

        Ok(report::build_snapshot(filter, orders, payments, Utc::now()))
    }

    /// Orders and payments waiting for an admin.
    pub async fn pending_review(&self, actor: &Actor) -> LedgerResult<PendingReview> {
        require_admin(actor, "review pending items")?;

        let mut conn = self.db.pool().acquire().await?;
        let orders = order::list_pending(&mut conn).await?;
        let payments = payment::list_pending(&mut conn).await?;

        Ok(PendingReview {
            counts: PendingCounts {
                orders: orders.len() as u64,
                payments: payments.len() as u64,
            },
            orders,
            payments,
        })
    }

    // =========================================================================
    // Notification
    // =========================================================================

    /// Current number of pending orders and payments.
    pub async fn pending_counts(&self) -> LedgerResult<PendingCounts> {
        load_pending_counts(&self.db).await
    }

    /// Receives the pending counts after every committed transition.
    pub fn subscribe_pending(&self) -> watch::Receiver<PendingCounts> {
        self.pending.subscribe()
    }

    async fn publish_pending(&self) {
        match self.pending_counts().await {
            Ok(counts) => {
                self.pending.send_if_modified(|current| {
                    if *current == counts {
                        return false;
                    }
                    *current = counts;
                    true
                });
            }
            // The transition is already committed; only the notification is lost
            Err(err) => warn!(error = %err, "Failed to refresh pending counts"),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn actor_label(actor: &Actor) -> String {
    match actor.role {
        Role::Admin => format!("admin {}", actor.user_id),
        Role::Seller => format!("seller {}", actor.user_id),
    }
}

fn require_admin(actor: &Actor, action: &str) -> LedgerResult<()> {
    if actor.is_admin() {
        return Ok(());
    }
    Err(LedgerError::forbidden(actor_label(actor), action))
}

fn require_owner(actor: &Actor, seller_id: &str, action: &str) -> LedgerResult<()> {
    if actor.is_seller(seller_id) {
        return Ok(());
    }
    Err(LedgerError::forbidden(actor_label(actor), action))
}

fn require_owner_or_admin(actor: &Actor, seller_id: &str, action: &str) -> LedgerResult<()> {
    if actor.is_admin() || actor.is_seller(seller_id) {
        return Ok(());
    }
    Err(LedgerError::forbidden(actor_label(actor), action))
}

async fn load_pending_counts(db: &Database) -> LedgerResult<PendingCounts> {
    let mut conn = db.pool().acquire().await?;
    let orders = order::count_pending(&mut conn).await?;
    let payments = payment::count_pending(&mut conn).await?;

    Ok(PendingCounts {
        orders: orders.max(0) as u64,
        payments: payments.max(0) as u64,
    })
}

async fn fetch_seller(conn: &mut SqliteConnection, id: &str) -> LedgerResult<Seller> {
    seller::fetch(conn, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Seller", id))
}

async fn fetch_order(conn: &mut SqliteConnection, id: &str) -> LedgerResult<Order> {
    order::fetch(conn, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Order", id))
}

async fn fetch_detail(conn: &mut SqliteConnection, id: &str) -> LedgerResult<OrderDetail> {
    order::fetch_detail(conn, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Order", id))
}

async fn fetch_payment(conn: &mut SqliteConnection, id: &str) -> LedgerResult<Payment> {
    payment::fetch(conn, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Payment", id))
}

async fn fetch_customer(conn: &mut SqliteConnection, id: &str) -> LedgerResult<Customer> {
    customer::fetch(conn, id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Customer", id))
}

/// Prices requested lines from the current catalogue.
async fn price_lines(
    conn: &mut SqliteConnection,
    lines: &[LineRequest],
) -> LedgerResult<Vec<CartLine>> {
    let mut cart = Vec::with_capacity(lines.len());
    for line in lines {
        let item = product::fetch(&mut *conn, &line.product_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Product", line.product_id.as_str()))?;
        cart.push(CartLine::from_product(&item, line.quantity));
    }
    Ok(cart)
}

/// Inserts a payment and, when it is already approved, counts it.
async fn insert_payment(
    conn: &mut SqliteConnection,
    record: &Payment,
    now: DateTime<Utc>,
) -> LedgerResult<()> {
    payment::insert(&mut *conn, record).await?;
    if record.is_approved() {
        order::add_paid(&mut *conn, &record.order_id, record.amount(), now).await?;
    }
    Ok(())
}

/// Writes every row change of an approval plan.
async fn apply_review(
    conn: &mut SqliteConnection,
    plan: &ReviewPlan,
    now: DateTime<Utc>,
) -> LedgerResult<()> {
    // State transition first: a lost race stops before any side effect
    order::approve(&mut *conn, &plan.order_id, plan.expected_version, plan.total(), now).await?;

    for item_id in &plan.deleted_item_ids {
        order::delete_item(&mut *conn, item_id).await?;
    }
    for (item_id, quantity) in &plan.updated_items {
        order::update_item_quantity(&mut *conn, item_id, *quantity).await?;
    }
    for movement in &plan.stock_movements {
        product::adjust_stock(&mut *conn, &movement.product_id, movement.delta).await?;
    }

    if let Some(reversal) = &plan.reversal {
        for (item_id, quantity) in &reversal.item_quantities {
            order::update_item_quantity(&mut *conn, item_id, *quantity).await?;
        }
        order::set_total(
            &mut *conn,
            &reversal.original_order_id,
            reversal.original_version,
            Money::from_cents(reversal.new_total_cents),
            now,
        )
        .await?;
        debug!(
            original_order_id = %reversal.original_order_id,
            new_total = reversal.new_total_cents,
            "Return reversal applied"
        );
    }

    Ok(())
}
