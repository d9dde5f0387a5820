//! # Bill Repository
//!
//! Creates bills and deducts stock in one transaction.
//!
//! ## Create Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     create_bill (single transaction)                   │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │   │                                                                     │
//! │   ├── for each line:                                                   │
//! │   │     UPDATE products SET <stock> = <stock> - qty                    │
//! │   │       WHERE sku = ? AND is_active = 1 AND <stock> >= qty           │
//! │   │     0 rows? → look up why: NotFound / Unavailable / Insufficient   │
//! │   │     read name + price (snapshot)                                   │
//! │   │                                                                     │
//! │   ├── total = Σ price × qty; check amount paid                         │
//! │   ├── INSERT bills, INSERT bill_lines                                  │
//! │   │                                                                     │
//! │  COMMIT  (any error → transaction dropped → ROLLBACK)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The deduction is the first statement, so the transaction takes SQLite's
//! write lock before it reads anything. Two workers selling the last unit
//! of the same SKU serialize on that lock; the loser sees 0 rows affected.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::{
    Bill, BillError, BillLine, BillRequest, CallerType, PaymentMethod, Product, SalesChannel,
};

use super::product::PRODUCT_COLUMNS;

const BILL_COLUMNS: &str = "id, bill_number, user_id, caller_type, channel, payment_method, \
     subtotal_cents, discount_cents, total_cents, amount_paid_cents, change_cents, \
     tracking_number, created_at";

/// Repository for bill database operations.
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: SqlitePool,
}

impl BillRepository {
    /// Creates a new BillRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BillRepository { pool }
    }

    /// Creates a bill for `request` and deducts stock from the location
    /// its channel draws on.
    ///
    /// The request is assumed to be validated. Business failures come back
    /// as the matching `BillError` variant; database failures as
    /// `BillError::Persistence`. Nothing is written unless the whole bill
    /// succeeds.
    pub async fn create_bill(
        &self,
        request: &BillRequest,
        user_id: &str,
        caller_type: CallerType,
    ) -> Result<Bill, BillError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let bill_id = Uuid::new_v4().to_string();
        let mut lines = Vec::with_capacity(request.items.len());
        let mut product_ids = Vec::with_capacity(request.items.len());

        for item in &request.items {
            let product = deduct_stock(&mut tx, &item.sku, request.channel, item.quantity).await?;

            lines.push(BillLine {
                sku: product.sku.clone(),
                name_snapshot: product.name.clone(),
                quantity: item.quantity,
                unit_price_cents: product.unit_price_cents,
                line_total_cents: product.unit_price_cents * item.quantity,
            });
            product_ids.push(product.id);
        }

        let subtotal_cents: i64 = lines.iter().map(|l| l.line_total_cents).sum();
        let discount_cents = 0;
        let total_cents = subtotal_cents - discount_cents;
        let (amount_paid_cents, change_cents) =
            settle_payment(request.payment_method, request.amount_paid_cents, total_cents)?;

        let now = Utc::now();
        let bill = Bill {
            id: bill_id,
            bill_number: generate_bill_number(),
            user_id: user_id.to_string(),
            caller_type,
            channel: request.channel,
            payment_method: request.payment_method,
            subtotal_cents,
            discount_cents,
            total_cents,
            amount_paid_cents,
            change_cents,
            tracking_number: request.channel.ships().then(generate_tracking_number),
            lines,
            created_at: now,
        };

        debug!(
            id = %bill.id,
            bill_number = %bill.bill_number,
            total_cents = bill.total_cents,
            lines = bill.lines.len(),
            "Inserting bill"
        );

        sqlx::query(
            r#"
            INSERT INTO bills (
                id, bill_number, user_id, caller_type, channel, payment_method,
                subtotal_cents, discount_cents, total_cents,
                amount_paid_cents, change_cents, tracking_number, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&bill.id)
        .bind(&bill.bill_number)
        .bind(&bill.user_id)
        .bind(bill.caller_type)
        .bind(bill.channel)
        .bind(bill.payment_method)
        .bind(bill.subtotal_cents)
        .bind(bill.discount_cents)
        .bind(bill.total_cents)
        .bind(bill.amount_paid_cents)
        .bind(bill.change_cents)
        .bind(&bill.tracking_number)
        .bind(bill.created_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        for (line_no, (line, product_id)) in bill.lines.iter().zip(&product_ids).enumerate() {
            sqlx::query(
                r#"
                INSERT INTO bill_lines (
                    id, bill_id, product_id, line_no,
                    sku_snapshot, name_snapshot, unit_price_cents,
                    quantity, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&bill.id)
            .bind(product_id)
            .bind(line_no as i64)
            .bind(&line.sku)
            .bind(&line.name_snapshot)
            .bind(line.unit_price_cents)
            .bind(line.quantity)
            .bind(line.line_total_cents)
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;
        }

        tx.commit().await.map_err(DbError::from)?;

        Ok(bill)
    }

    /// Gets a bill with its lines.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Bill>> {
        let bill = sqlx::query_as::<_, Bill>(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match bill {
            Some(mut bill) => {
                bill.lines = self.get_lines(&bill.id).await?;
                Ok(Some(bill))
            }
            None => Ok(None),
        }
    }

    /// Gets the lines of a bill in entry order.
    pub async fn get_lines(&self, bill_id: &str) -> DbResult<Vec<BillLine>> {
        let lines = sqlx::query_as::<_, BillLine>(
            r#"
            SELECT
                sku_snapshot AS sku,
                name_snapshot,
                quantity,
                unit_price_cents,
                line_total_cents
            FROM bill_lines
            WHERE bill_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Counts bills (for diagnostics and load runs).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bills")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Deducts `quantity` from the channel's stock location, returning the
/// product for the line snapshot.
async fn deduct_stock(
    tx: &mut Transaction<'_, Sqlite>,
    sku: &str,
    channel: SalesChannel,
    quantity: i64,
) -> Result<Product, BillError> {
    let sql = match channel {
        SalesChannel::InStore => {
            "UPDATE products SET shelf_stock = shelf_stock - ?2, updated_at = ?3 \
             WHERE sku = ?1 AND is_active = 1 AND shelf_stock >= ?2"
        }
        SalesChannel::Online => {
            "UPDATE products SET website_stock = website_stock - ?2, updated_at = ?3 \
             WHERE sku = ?1 AND is_active = 1 AND website_stock >= ?2"
        }
    };

    let result = sqlx::query(sql)
        .bind(sku)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1"
    ))
    .bind(sku)
    .fetch_optional(&mut **tx)
    .await
    .map_err(DbError::from)?
    .ok_or_else(|| BillError::ProductNotFound(sku.to_string()))?;

    if result.rows_affected() == 0 {
        if !product.is_active {
            return Err(BillError::ProductUnavailable(sku.to_string()));
        }
        return Err(BillError::insufficient_stock(
            sku,
            product.available_for(channel),
            quantity,
        ));
    }

    Ok(product)
}

/// Works out `(amount_paid, change)` for a bill total.
///
/// Cash uses the tendered amount (exact cash when none was given).
/// Card and online payments are charged the total.
fn settle_payment(
    method: PaymentMethod,
    tendered: Option<i64>,
    total_cents: i64,
) -> Result<(i64, i64), BillError> {
    match method {
        PaymentMethod::Cash => {
            let paid = tendered.unwrap_or(total_cents);
            if paid < total_cents {
                return Err(BillError::PaymentShortfall {
                    paid_cents: paid,
                    total_cents,
                });
            }
            Ok((paid, paid - total_cents))
        }
        PaymentMethod::Card | PaymentMethod::Online => Ok((total_cents, 0)),
    }
}

/// Generates a bill number: `BILL-YYYYMMDD-XXXXXXXX`.
pub fn generate_bill_number() -> String {
    format!("BILL-{}-{}", Utc::now().format("%Y%m%d"), short_id())
}

/// Generates a tracking number for online orders: `TRK-YYYYMMDD-XXXXXXXX`.
pub fn generate_tracking_number() -> String {
    format!("TRK-{}-{}", Utc::now().format("%Y%m%d"), short_id())
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}
