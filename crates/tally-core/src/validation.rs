//! # Validation Module
//!
//! Shape checks for bill requests, run by the business operation before it
//! touches inventory.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler                                                 │
//! │  └── JSON deserialization into BillRequest                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: BillProcessor (inside a worker)                              │
//! │  └── THIS MODULE: lines, quantities, SKUs, delivery address            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database transaction                                         │
//! │  └── product exists, stock available, conditional deduction            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation runs on the worker, not at submit time, so a malformed
//! request still gets a queue slot and comes back as a Failure like any
//! other business error.
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_sku, validate_quantity};
//!
//! validate_sku("COKE-330").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::{BillRequest, DeliveryAddress};
use crate::{MAX_BILL_LINES, MAX_LINE_QUANTITY, MAX_SKU_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a SKU on a bill line.
///
/// ## Rules
/// - Must not be empty
/// - At most `MAX_SKU_LENGTH` (50) characters
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_sku;
///
/// assert!(validate_sku("COKE-330").is_ok());
/// assert!(validate_sku("  ").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::required("sku"));
    }

    if sku.len() > MAX_SKU_LENGTH {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: MAX_SKU_LENGTH,
        });
    }

    Ok(())
}

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed `MAX_LINE_QUANTITY` (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a tendered amount. Zero is allowed (fully discounted bill).
pub fn validate_amount_paid(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "amount paid".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a delivery address: street, city and postal code are required.
pub fn validate_delivery(delivery: &DeliveryAddress) -> ValidationResult<()> {
    for (field, value) in [
        ("delivery street", &delivery.street),
        ("delivery city", &delivery.city),
        ("delivery postal code", &delivery.postal_code),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationError::required(field));
        }
    }

    Ok(())
}

// =============================================================================
// Request Validator
// =============================================================================

/// Validates a whole bill request.
///
/// ## Rules
/// ```text
/// items empty?               → EmptyBill
/// items > MAX_BILL_LINES?    → TooManyLines
/// any sku / quantity bad?    → Required / TooLong / MustBePositive / OutOfRange
/// amount_paid < 0?           → OutOfRange
/// Online without delivery?   → MissingDelivery
/// ```
pub fn validate_bill_request(request: &BillRequest) -> ValidationResult<()> {
    if request.items.is_empty() {
        return Err(ValidationError::EmptyBill);
    }

    if request.items.len() > MAX_BILL_LINES {
        return Err(ValidationError::TooManyLines {
            max: MAX_BILL_LINES,
        });
    }

    for line in &request.items {
        validate_sku(&line.sku)?;
        validate_quantity(line.quantity)?;
    }

    if let Some(paid) = request.amount_paid_cents {
        validate_amount_paid(paid)?;
    }

    if request.channel.ships() {
        match &request.delivery {
            Some(delivery) => validate_delivery(delivery)?,
            None => return Err(ValidationError::MissingDelivery),
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
