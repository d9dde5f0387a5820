//! # Repository Module
//!
//! Database repository implementations for Tally.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SqliteBillProcessor / bill-load / request log sink                    │
//! │       │                                                                 │
//! │       │  db.bills().create_bill(&request, user, caller)                │
//! │       ▼                                                                 │
//! │  BillRepository / ProductRepository / RequestLogRepository             │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Products and stock levels
//! - [`BillRepository`](bill::BillRepository) - Transactional bill creation
//! - [`RequestLogRepository`](request_log::RequestLogRepository) - Per-request audit rows

pub mod bill;
pub mod product;
pub mod request_log;
