//! # Domain Types
//!
//! Types that travel through the bill pipeline.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  BillRequest    │   │      Bill       │   │    Product      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  channel        │   │  bill_number    │   │  sku            │       │
//! │  │  payment_method │──►│  lines          │   │  unit_price     │       │
//! │  │  items          │   │  total_cents    │   │  shelf_stock    │       │
//! │  │  amount_paid    │   │  change_cents   │   │  website_stock  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   CallerType    │   │  SalesChannel   │   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  CASHIER        │   │  IN_STORE→shelf │   │  cash           │       │
//! │  │  CUSTOMER       │   │  ONLINE→website │   │  card / online  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Caller Type vs. Sales Channel
//! `CallerType` says *who* submitted (observability only, never ordering).
//! `SalesChannel` says *where* the stock comes from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation;

// =============================================================================
// Caller Type
// =============================================================================

/// Which caller population submitted a request.
///
/// Used for audit and logging only. The queue serves both populations in
/// strict arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallerType {
    /// In-person cashier at a till.
    Cashier,
    /// Online customer checking out from the storefront.
    Customer,
}

impl CallerType {
    /// Wire tag for this caller type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CallerType::Cashier => "CASHIER",
            CallerType::Customer => "CUSTOMER",
        }
    }
}

impl std::fmt::Display for CallerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallerType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CASHIER" => Ok(CallerType::Cashier),
            "CUSTOMER" => Ok(CallerType::Customer),
            _ => Err(ValidationError::required("caller type (CASHIER or CUSTOMER)")),
        }
    }
}

// =============================================================================
// Sales Channel
// =============================================================================

/// Where a sale happens, which decides the stock location it draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SalesChannel {
    /// Over the counter. Deducts shelf stock.
    #[default]
    InStore,
    /// Storefront order. Deducts website stock and ships.
    Online,
}

impl SalesChannel {
    /// True if this channel ships goods (needs a delivery address).
    pub const fn ships(&self) -> bool {
        matches!(self, SalesChannel::Online)
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash; change is computed from the tendered amount.
    Cash,
    /// Card on an external terminal.
    Card,
    /// Paid through the storefront's payment provider.
    Online,
}

// =============================================================================
// Bill Request
// =============================================================================

/// One requested line: a SKU and how many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BillLineRequest {
    pub sku: String,
    pub quantity: i64,
}

impl BillLineRequest {
    pub fn new(sku: impl Into<String>, quantity: i64) -> Self {
        BillLineRequest {
            sku: sku.into(),
            quantity,
        }
    }
}

/// Shipping destination for online orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub phone: Option<String>,
}

/// The business payload of one bill submission.
///
/// Immutable once handed to the queue: the worker only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BillRequest {
    #[serde(default)]
    pub channel: SalesChannel,
    pub payment_method: PaymentMethod,
    pub items: Vec<BillLineRequest>,
    /// Cash tendered, in cents. `None` for card/online payments, where the
    /// amount paid is the bill total.
    #[serde(default)]
    pub amount_paid_cents: Option<i64>,
    #[serde(default)]
    pub delivery: Option<DeliveryAddress>,
}

impl BillRequest {
    pub fn new(
        channel: SalesChannel,
        payment_method: PaymentMethod,
        items: Vec<BillLineRequest>,
    ) -> Self {
        BillRequest {
            channel,
            payment_method,
            items,
            amount_paid_cents: None,
            delivery: None,
        }
    }

    /// Sets the cash tendered.
    pub fn with_amount_paid(mut self, cents: i64) -> Self {
        self.amount_paid_cents = Some(cents);
        self
    }

    /// Sets the delivery address.
    pub fn with_delivery(mut self, delivery: DeliveryAddress) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Checks the request shape. See [`crate::validation`] for the rules.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_bill_request(self)
    }

    /// Total number of units across all lines.
    pub fn total_units(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

// =============================================================================
// Product
// =============================================================================

/// A sellable product with per-location stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub unit_price_cents: i64,
    /// Units on the shop floor (in-store sales).
    pub shelf_stock: i64,
    /// Units reserved for the storefront (online orders).
    pub website_stock: i64,
    /// False once withdrawn from sale (soft delete).
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Stock available to the given channel.
    pub fn available_for(&self, channel: SalesChannel) -> i64 {
        match channel {
            SalesChannel::InStore => self.shelf_stock,
            SalesChannel::Online => self.website_stock,
        }
    }

    /// Checks whether `quantity` can be sold through `channel`.
    pub fn can_sell(&self, channel: SalesChannel, quantity: i64) -> bool {
        self.is_active && self.available_for(channel) >= quantity
    }
}

// =============================================================================
// Bill
// =============================================================================

/// A line on a created bill.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BillLine {
    pub sku: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

/// A created bill, returned to the caller on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Bill {
    pub id: String,
    /// Human-readable number printed on the receipt.
    pub bill_number: String,
    pub user_id: String,
    pub caller_type: CallerType,
    pub channel: SalesChannel,
    pub payment_method: PaymentMethod,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub change_cents: i64,
    /// Set for online orders only.
    pub tracking_number: Option<String>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub lines: Vec<BillLine>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Bill {
    /// Number of units sold on this bill.
    pub fn units(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(shelf: i64, website: i64) -> Product {
        Product {
            id: "p-1".into(),
            sku: "COKE-330".into(),
            name: "Coca-Cola 330ml".into(),
            unit_price_cents: 150,
            shelf_stock: shelf,
            website_stock: website,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_caller_type_wire_format() {
        assert_eq!(CallerType::Cashier.to_string(), "CASHIER");
        assert_eq!(
            serde_json::to_string(&CallerType::Customer).unwrap(),
            "\"CUSTOMER\""
        );
        assert_eq!("cashier".parse::<CallerType>().unwrap(), CallerType::Cashier);
        assert!("manager".parse::<CallerType>().is_err());
    }

    #[test]
    fn test_channel_decides_stock_location() {
        let p = product(3, 10);
        assert_eq!(p.available_for(SalesChannel::InStore), 3);
        assert_eq!(p.available_for(SalesChannel::Online), 10);
        assert!(!p.can_sell(SalesChannel::InStore, 5));
        assert!(p.can_sell(SalesChannel::Online, 5));
    }

    #[test]
    fn test_inactive_product_cannot_sell() {
        let mut p = product(10, 10);
        p.is_active = false;
        assert!(!p.can_sell(SalesChannel::InStore, 1));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{"payment_method":"card","items":[{"sku":"A","quantity":2}]}"#;
        let request: BillRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.channel, SalesChannel::InStore);
        assert_eq!(request.amount_paid_cents, None);
        assert_eq!(request.total_units(), 2);
    }
}
