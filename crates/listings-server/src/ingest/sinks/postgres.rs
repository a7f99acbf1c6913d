//! Relational sink: the `products` table
//!
//! Rows are bulk inserted with one multi-row `INSERT` per slice of the batch.
//! Listings already present under `(url, product_id)` are skipped by the
//! unique constraint, so `rows_affected` only counts new rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::ingest::framework::{CanonicalRecord, RecordSink};

/// Postgres caps a statement at 65535 bind parameters
const MAX_BIND_PARAMS: usize = 65_535;
const COLUMNS_PER_ROW: usize = 10;
pub const MAX_ROWS_PER_STATEMENT: usize = MAX_BIND_PARAMS / COLUMNS_PER_ROW;

#[derive(Clone)]
pub struct PostgresProductSink {
    pool: PgPool,
}

impl PostgresProductSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_rows(&self, records: &[CanonicalRecord]) -> Result<u64> {
        let now = Utc::now();
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO products (
                country, brand, product_id, product_name, shop_name,
                product_category_id, price, url, created_at, updated_at
            )
            "#,
        );

        query_builder.push_values(records.iter(), |mut b, record| {
            b.push_bind(&record.country)
                .push_bind(&record.brand)
                .push_bind(record.product_id)
                .push_bind(&record.product_name)
                .push_bind(&record.shop_name)
                .push_bind(record.product_category_id)
                .push_bind(record.price)
                .push_bind(&record.url)
                .push_bind(now)
                .push_bind(now);
        });
        query_builder.push(" ON CONFLICT (url, product_id) DO NOTHING");

        let result = query_builder
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to insert products")?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RecordSink for PostgresProductSink {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn insert_batch(&self, records: &[CanonicalRecord]) -> Result<u64> {
        let mut inserted = 0;
        for rows in records.chunks(MAX_ROWS_PER_STATEMENT) {
            inserted += self.insert_rows(rows).await?;
        }
        debug!(
            batch_size = records.len(),
            inserted, "Inserted products into postgres"
        );
        Ok(inserted)
    }
}
