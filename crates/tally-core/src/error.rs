//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── BillError        - Why a bill could not be created                │
//! │  └── ValidationError  - Malformed bill request                         │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - Persistence failures (→ BillError::Persistence)│
//! │                                                                         │
//! │  tally-queue                                                           │
//! │  └── BillOutcome::Failure carries BillError's message to the caller    │
//! │                                                                         │
//! │  Flow: ValidationError → BillError → worker → Failure(message)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The queue treats every `BillError` the same way: the message ends up in
//! the request's result slot and the worker moves on.

use thiserror::Error;

// =============================================================================
// Bill Error
// =============================================================================

/// Reasons a bill-creation request can fail.
///
/// Business failures and persistence failures share this type so the
/// worker handles them identically.
#[derive(Debug, Error)]
pub enum BillError {
    /// The request itself is malformed.
    #[error("Invalid bill request: {0}")]
    Validation(#[from] ValidationError),

    /// No product exists with this SKU.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but has been withdrawn from sale.
    #[error("Product is no longer available: {0}")]
    ProductUnavailable(String),

    /// Not enough stock at the location the sales channel draws from.
    ///
    /// ## User Workflow
    /// ```text
    /// Cashier bills COKE-330 × 5
    ///      │
    ///      ▼
    /// Shelf stock = 3
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "COKE-330", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Till shows: "Insufficient stock for COKE-330: available 3, requested 5"
    /// ```
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Cash tendered does not cover the bill total.
    #[error("Amount paid ({paid_cents}) is less than total amount ({total_cents})")]
    PaymentShortfall { paid_cents: i64, total_cents: i64 },

    /// The persistence layer failed (connection, constraint, transaction).
    #[error("Failed to create bill: {0}")]
    Persistence(String),
}

impl BillError {
    /// Creates an InsufficientStock error.
    pub fn insufficient_stock(sku: impl Into<String>, available: i64, requested: i64) -> Self {
        BillError::InsufficientStock {
            sku: sku.into(),
            available,
            requested,
        }
    }

    /// True for failures caused by the request or inventory state rather
    /// than by infrastructure.
    pub fn is_business(&self) -> bool {
        !matches!(self, BillError::Persistence(_))
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Bill request validation errors.
///
/// Raised by [`crate::BillRequest::validate`] before any product lookup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Bill has no lines.
    #[error("At least one item is required")]
    EmptyBill,

    /// Bill has more lines than allowed.
    #[error("A bill cannot have more than {max} items")]
    TooManyLines { max: usize },

    /// Online order without a delivery address.
    #[error("Delivery address is required for online orders")]
    MissingDelivery,
}

impl ValidationError {
    pub(crate) fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with BillError.
pub type CoreResult<T> = Result<T, BillError>;

// =============================================================================
// Unit Tests
// =============================================================================
