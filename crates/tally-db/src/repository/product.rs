//! # Product Repository
//!
//! Products and their two stock locations.
//!
//! ## Stock Locations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products                                                               │
//! │  ┌──────────┬───────────────┬─────────────┬───────────────┐            │
//! │  │ sku      │ name          │ shelf_stock │ website_stock │            │
//! │  ├──────────┼───────────────┼─────────────┼───────────────┤            │
//! │  │ COKE-330 │ Coca-Cola     │     40      │      12       │            │
//! │  └──────────┴───────────────┴─────────────┴───────────────┘            │
//! │                                   ▲               ▲                     │
//! │                     IN_STORE bills│               │ONLINE bills         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sales never write stock through this repository: the deduction happens
//! inside the bill transaction (see [`super::bill`]).

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::{Product, SalesChannel};

/// Column list shared by every product query.
pub(crate) const PRODUCT_COLUMNS: &str = "id, sku, name, unit_price_cents, shelf_stock, \
     website_stock, is_active, created_at, updated_at";

/// Stock snapshot for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StockLevels {
    pub shelf_stock: i64,
    pub website_stock: i64,
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates and inserts an active product with a fresh ID.
    pub async fn create(
        &self,
        sku: &str,
        name: &str,
        unit_price_cents: i64,
        shelf_stock: i64,
        website_stock: i64,
    ) -> DbResult<Product> {
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            sku: sku.to_string(),
            name: name.to_string(),
            unit_price_cents,
            shelf_stock,
            website_stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.insert(&product).await
    }

    /// Inserts a product.
    ///
    /// ## Errors
    /// `UniqueViolation` if the SKU already exists.
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, unit_price_cents,
                shelf_stock, website_stock, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.unit_price_cents)
        .bind(product.shelf_stock)
        .bind(product.website_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &product.sku),
            other => other,
        })?;

        Ok(product.clone())
    }

    /// Gets a product by SKU, active or not.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Current shelf and website stock for a SKU.
    pub async fn stock_levels(&self, sku: &str) -> DbResult<StockLevels> {
        sqlx::query_as::<_, StockLevels>(
            "SELECT shelf_stock, website_stock FROM products WHERE sku = ?1",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Product", sku))
    }

    /// Adds units to the stock location used by `channel`.
    pub async fn restock(&self, sku: &str, channel: SalesChannel, quantity: i64) -> DbResult<()> {
        debug!(sku = %sku, ?channel, quantity, "Restocking product");

        let sql = match channel {
            SalesChannel::InStore => {
                "UPDATE products SET shelf_stock = shelf_stock + ?2, updated_at = ?3 WHERE sku = ?1"
            }
            SalesChannel::Online => {
                "UPDATE products SET website_stock = website_stock + ?2, updated_at = ?3 WHERE sku = ?1"
            }
        };

        let result = sqlx::query(sql)
            .bind(sku)
            .bind(quantity)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", sku));
        }

        Ok(())
    }

    /// Withdraws a product from sale. Existing bills keep their snapshots.
    pub async fn soft_delete(&self, sku: &str) -> DbResult<()> {
        debug!(sku = %sku, "Soft-deleting product");

        let result =
            sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE sku = ?1")
                .bind(sku)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", sku));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use tally_core::SalesChannel;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.create("COKE-330", "Coca-Cola 330ml", 150, 40, 12)
            .await
            .unwrap();

        let product = repo.get_by_sku("COKE-330").await.unwrap().unwrap();
        assert_eq!(product.unit_price_cents, 150);
        assert!(product.is_active);
        assert!(repo.get_by_sku("NOPE").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();

        repo.create("A", "First", 100, 1, 1).await.unwrap();
        let err = repo.create("A", "Second", 100, 1, 1).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_restock_targets_channel_location() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        repo.create("A", "Apple", 50, 5, 5).await.unwrap();

        repo.restock("A", SalesChannel::Online, 10).await.unwrap();
        let levels = repo.stock_levels("A").await.unwrap();
        assert_eq!(levels.shelf_stock, 5);
        assert_eq!(levels.website_stock, 15);

        assert!(repo.restock("B", SalesChannel::InStore, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_row() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.products();
        repo.create("A", "Apple", 50, 5, 5).await.unwrap();

        repo.soft_delete("A").await.unwrap();
        let product = repo.get_by_sku("A").await.unwrap().unwrap();
        assert!(!product.is_active);
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
