//! # tally-core: Domain Types for the Bill Pipeline
//!
//! Everything the bill-submission pipeline needs to talk about a bill,
//! with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        HTTP handlers (cashier till, online storefront)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ BillRequest + user + CallerType        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          tally-queue (bounded channel + worker pool)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ BillProcessor::create_bill             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   error   │  │ validation│  │ processor │  │   │
//! │  │   │BillRequest│  │ BillError │  │  request  │  │   port    │  │   │
//! │  │   │   Bill    │  │           │  │   rules   │  │  (trait)  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          tally-db (SqliteBillProcessor implements the port)     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Bill request, bill, caller type, sales channel
//! - [`error`] - Domain error types
//! - [`validation`] - Request validation rules
//! - [`processor`] - The `BillProcessor` port and its per-worker factory
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::{BillLineRequest, BillRequest, PaymentMethod, SalesChannel};
//!
//! let request = BillRequest::new(
//!     SalesChannel::InStore,
//!     PaymentMethod::Cash,
//!     vec![BillLineRequest::new("COKE-330", 2)],
//! )
//! .with_amount_paid(1000);
//!
//! assert!(request.validate().is_ok());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod processor;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{BillError, CoreResult, ValidationError};
pub use processor::{BillProcessor, ProcessorFactory};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines on a single bill.
///
/// ## Business Reason
/// Keeps one work item's transaction short so a single oversized order
/// cannot hold a worker (and the inventory rows it touches) for long.
pub const MAX_BILL_LINES: usize = 100;

/// Maximum quantity on a single bill line.
///
/// ## Business Reason
/// Catches typing 1000 instead of 10 at the till.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum SKU length accepted on a bill line.
pub const MAX_SKU_LENGTH: usize = 50;
