//! # Domain Types
//!
//! Core domain types used throughout Tally.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Seller       │   │     Order       │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name           │   │  status + type  │   │  order_id (FK)  │       │
//! │  │  commission bps │   │  total / paid   │   │  method/status  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Customer      │   │  OrderStatus    │   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  seller's own   │   │  Pending        │   │  Cash (pending) │       │
//! │  │  credit ledger  │   │  Approved       │   │  Pix / Card     │       │
//! │  └─────────────────┘   │  Rejected       │   │  Consumption    │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status and Type Are Orthogonal
//! A pending return is `(OrderStatus::Pending, OrderType::Return)`. There is
//! no combined "return pending" state; transition functions in
//! [`crate::lifecycle`] validate the pair together.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::money::Money;
use crate::DEFAULT_COMMISSION_RATE_BPS;

// =============================================================================
// Commission Rate
// =============================================================================

/// Commission rate in basis points (2000 = 20%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommissionRate(u32);

impl CommissionRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        CommissionRate(bps)
    }

    /// Whole-percent convenience constructor (`20` = 20%).
    #[inline]
    pub const fn from_percent(percent: u32) -> Self {
        CommissionRate(percent * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percent(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        CommissionRate(DEFAULT_COMMISSION_RATE_BPS)
    }
}

// =============================================================================
// Calendar Month
// =============================================================================

/// A calendar month, the unit of commission and amortization attribution.
///
/// Field order matters: the derived `Ord` sorts chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::OutOfRange {
                field: "month".to_string(),
                min: 1,
                max: 12,
            });
        }
        Ok(YearMonth { year, month })
    }

    /// The month a calendar date falls in.
    pub fn of(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month a UTC timestamp falls in.
    pub fn of_timestamp(ts: DateTime<Utc>) -> Self {
        Self::of(ts.date_naive())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::of(date) == *self
    }

    pub fn contains_timestamp(&self, ts: DateTime<Utc>) -> bool {
        Self::of_timestamp(ts) == *self
    }

    /// First day of the month.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// Last day of the month.
    pub fn last_day(&self) -> Option<NaiveDate> {
        self.next().first_day()?.pred_opt()
    }

    /// The following calendar month.
    pub fn next(&self) -> YearMonth {
        if self.month == 12 {
            YearMonth {
                year: self.year + 1,
                month: 1,
            }
        } else {
            YearMonth {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Parses `YYYY-MM`.
impl FromStr for YearMonth {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidFormat {
            field: "month".to_string(),
            reason: "expected YYYY-MM".to_string(),
        };

        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        YearMonth::new(year, month)
    }
}

// =============================================================================
// Actor (from the Auth collaborator)
// =============================================================================

/// Role resolved by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Seller,
    Admin,
}

/// The user performing a ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn admin(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    /// A seller acting on their own behalf; `user_id` is the seller id.
    pub fn seller(seller_id: impl Into<String>) -> Self {
        Actor {
            user_id: seller_id.into(),
            role: Role::Seller,
        }
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when this actor is the seller owning `seller_id`'s records.
    #[inline]
    pub fn is_seller(&self, seller_id: &str) -> bool {
        self.role == Role::Seller && self.user_id == seller_id
    }
}

// =============================================================================
// Seller
// =============================================================================

/// A field seller who requests products and owes the business for approved sales.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Seller {
    pub id: String,
    pub name: String,
    /// Commission rate in basis points, overridable per seller.
    pub commission_rate_bps: u32,
    pub created_at: DateTime<Utc>,
}

impl Seller {
    #[inline]
    pub fn commission_rate(&self) -> CommissionRate {
        CommissionRate::from_bps(self.commission_rate_bps)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product sellers can request.
///
/// `stock_quantity` is only ever changed by order-approval side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub stock_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

// =============================================================================
// Order Status / Type
// =============================================================================

/// Review status of an order. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Rejected => "rejected",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an order sells goods or reverses (part of) an earlier sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Sale,
    Return,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Sale => "sale",
            OrderType::Return => "return",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order
// =============================================================================

/// A seller's product request (sale) or return request.
///
/// Invariant: `0 <= paid_cents <= total_cents + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    pub seller_id: String,
    /// Seller name at time of ordering (frozen).
    pub seller_name: String,
    pub total_cents: i64,
    /// Sum of this order's approved payments.
    pub paid_cents: i64,
    pub status: OrderStatus,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Set only for returns: the sale being reversed.
    pub original_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped on every guarded update.
    pub version: i64,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }

    /// What the seller still owes on this order (never negative).
    #[inline]
    pub fn remaining_debt(&self) -> Money {
        (self.total() - self.paid()).max(Money::zero())
    }

    /// Payments are accepted only on approved sales.
    #[inline]
    pub fn can_pay(&self) -> bool {
        self.status == OrderStatus::Approved && self.order_type == OrderType::Sale
    }

    #[inline]
    pub fn is_return(&self) -> bool {
        self.order_type == OrderType::Return
    }
}

/// A line in an order.
///
/// Quantity 0 marks a fully returned line that is kept for history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// Product name at time of ordering (frozen).
    pub name: String,
    pub quantity: i64,
    /// Unit price at time of ordering (frozen).
    pub unit_price_cents: i64,
}

impl OrderItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

/// An order together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Payment
// =============================================================================

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash handed to the admin; needs confirmation.
    Cash,
    /// Instant bank transfer.
    Pix,
    Card,
    /// Goods the seller kept for personal use. Not real money.
    Consumption,
}

impl PaymentMethod {
    /// Cash waits for an admin to confirm receipt; everything else settles at once.
    #[inline]
    pub fn initial_status(&self) -> PaymentStatus {
        match self {
            PaymentMethod::Cash => PaymentStatus::Pending,
            _ => PaymentStatus::Approved,
        }
    }

    /// True for methods that bring money in (commission accrues on these).
    #[inline]
    pub fn is_received_money(&self) -> bool {
        !matches!(self, PaymentMethod::Consumption)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Pix => "pix",
            PaymentMethod::Card => "card",
            PaymentMethod::Consumption => "consumption",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "pix" => Ok(PaymentMethod::Pix),
            "card" => Ok(PaymentMethod::Card),
            "consumption" => Ok(PaymentMethod::Consumption),
            _ => Err(ValidationError::NotAllowed {
                field: "method".to_string(),
                allowed: ["cash", "pix", "card", "consumption"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }
}

/// A payment is either awaiting confirmation or counted.
///
/// Rejected payments are deleted, so there is no `Rejected` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
}

/// A payment against one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    /// Owning seller (denormalised from the order).
    pub seller_id: String,
    pub amount_cents: i64,
    /// Date the payment happened; drives commission month attribution.
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Opaque reference to an uploaded proof (receipt photo, etc.).
    pub proof_ref: Option<String>,
    pub description: Option<String>,
    /// Groups the payments generated by one allocation.
    pub allocation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    #[inline]
    pub fn is_approved(&self) -> bool {
        self.status == PaymentStatus::Approved
    }
}

/// Metadata shared by every payment generated from one user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMeta {
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub proof_ref: Option<String>,
    pub description: Option<String>,
}

impl PaymentMeta {
    pub fn new(date: NaiveDate, method: PaymentMethod) -> Self {
        PaymentMeta {
            date,
            method,
            proof_ref: None,
            description: None,
        }
    }

    pub fn with_proof(mut self, proof_ref: impl Into<String>) -> Self {
        self.proof_ref = Some(proof_ref.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// =============================================================================
// Customer Ledger
// =============================================================================

/// A seller's own end customer. Independent of Orders/Payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: String,
    pub seller_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CustomerTransactionType {
    /// The customer took goods on credit.
    Purchase,
    /// The customer paid something back.
    Payment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CustomerTransaction {
    pub id: String,
    pub customer_id: String,
    #[serde(rename = "type")]
    pub tx_type: CustomerTransactionType,
    pub amount_cents: i64,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CustomerTransaction {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Business policy knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    /// Rate given to newly registered sellers.
    pub default_commission_rate: CommissionRate,
    /// Restore product stock when a return is approved. Off by default:
    /// returned goods (often perishable) are not put back on sale.
    pub restock_on_return: bool,
    /// Count only approved payments in commission statements. Off by
    /// default: every recorded payment dated in the month counts.
    pub commission_approved_only: bool,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        LedgerPolicy {
            default_commission_rate: CommissionRate::default(),
            restock_on_return: false,
            commission_approved_only: false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order(status: OrderStatus, order_type: OrderType) -> Order {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        Order {
            id: "o1".to_string(),
            seller_id: "s1".to_string(),
            seller_name: "Ana".to_string(),
            total_cents: 5000,
            paid_cents: 1200,
            status,
            order_type,
            original_order_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[test]
    fn test_commission_rate_default_is_twenty_percent() {
        let rate = CommissionRate::default();
        assert_eq!(rate.bps(), 2000);
        assert!((rate.percent() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_year_month_parse_and_display() {
        let month: YearMonth = "2024-02".parse().unwrap();
        assert_eq!(month, YearMonth { year: 2024, month: 2 });
        assert_eq!(month.to_string(), "2024-02");

        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("2024".parse::<YearMonth>().is_err());
        assert!("feb-2024".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_year_month_ordering_is_chronological() {
        let dec = YearMonth::new(2023, 12).unwrap();
        let jan = YearMonth::new(2024, 1).unwrap();
        assert!(dec < jan);
    }

    #[test]
    fn test_year_month_bounds() {
        let feb = YearMonth::new(2024, 2).unwrap();
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29));
        let dec = YearMonth::new(2023, 12).unwrap();
        assert_eq!(dec.next(), YearMonth::new(2024, 1).unwrap());
        assert_eq!(dec.last_day(), NaiveDate::from_ymd_opt(2023, 12, 31));
    }

    #[test]
    fn test_year_month_contains() {
        let jan = YearMonth::new(2024, 1).unwrap();
        assert!(jan.contains(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        assert!(!jan.contains(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
        assert!(jan.contains_timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_can_pay_only_approved_sales() {
        assert!(order(OrderStatus::Approved, OrderType::Sale).can_pay());
        assert!(!order(OrderStatus::Pending, OrderType::Sale).can_pay());
        assert!(!order(OrderStatus::Rejected, OrderType::Sale).can_pay());
        assert!(!order(OrderStatus::Approved, OrderType::Return).can_pay());
    }

    #[test]
    fn test_remaining_debt() {
        let mut o = order(OrderStatus::Approved, OrderType::Sale);
        assert_eq!(o.remaining_debt().cents(), 3800);

        // within-tolerance overpayment never shows as negative debt
        o.paid_cents = 5001;
        assert_eq!(o.remaining_debt(), Money::zero());
    }

    #[test]
    fn test_payment_method_initial_status() {
        assert_eq!(PaymentMethod::Cash.initial_status(), PaymentStatus::Pending);
        assert_eq!(PaymentMethod::Pix.initial_status(), PaymentStatus::Approved);
        assert_eq!(PaymentMethod::Card.initial_status(), PaymentStatus::Approved);
        assert_eq!(
            PaymentMethod::Consumption.initial_status(),
            PaymentStatus::Approved
        );
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("PIX".parse::<PaymentMethod>().unwrap(), PaymentMethod::Pix);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_order_serializes_type_field() {
        let json = serde_json::to_value(order(OrderStatus::Pending, OrderType::Return)).unwrap();
        assert_eq!(json["type"], "return");
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn test_actor_roles() {
        let admin = Actor::admin("root");
        assert!(admin.is_admin());
        assert!(!admin.is_seller("root"));

        let seller = Actor::seller("s1");
        assert!(seller.is_seller("s1"));
        assert!(!seller.is_seller("s2"));
    }

    #[test]
    fn test_policy_default() {
        let policy = LedgerPolicy::default();
        assert!(!policy.restock_on_return);
        assert!(!policy.commission_approved_only);
        assert_eq!(policy.default_commission_rate, CommissionRate::from_percent(20));
    }
}
