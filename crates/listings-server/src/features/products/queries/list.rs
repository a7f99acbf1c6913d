use chrono::{DateTime, Utc};
use mediator::Request;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::features::shared::pagination::{PaginationMetadata, PaginationParams};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProductsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductListItem {
    pub id: i64,
    pub country: Option<String>,
    pub brand: String,
    pub product_id: i64,
    pub product_name: String,
    pub shop_name: Option<String>,
    pub product_category_id: i64,
    pub price: f64,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListProductsResponse {
    pub items: Vec<ProductListItem>,
    /// Every distinct country in the table, for filter drop-downs
    pub countries: Vec<String>,
    pub pagination: PaginationMetadata,
}

#[derive(Debug, thiserror::Error)]
pub enum ListProductsError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Request<Result<ListProductsResponse, ListProductsError>> for ListProductsQuery {}

impl ListProductsQuery {
    fn pagination(&self) -> PaginationParams {
        PaginationParams::new(self.page, self.per_page)
    }

    /// Blank filters are ignored
    fn product_name_filter(&self) -> Option<&str> {
        non_blank(self.product_name.as_deref())
    }

    fn country_filter(&self) -> Option<&str> {
        non_blank(self.country.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: PgPool,
    query: ListProductsQuery,
) -> Result<ListProductsResponse, ListProductsError> {
    let params = query.pagination();
    let product_name = query.product_name_filter();
    let country = query.country_filter();

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM products
        WHERE ($1::TEXT IS NULL OR product_name = $1)
          AND ($2::TEXT IS NULL OR country = $2)
        "#,
    )
    .bind(product_name)
    .bind(country)
    .fetch_one(&pool)
    .await?;

    let items = sqlx::query_as::<_, ProductListItem>(
        r#"
        SELECT id, country, brand, product_id, product_name, shop_name,
               product_category_id, price, url, created_at, updated_at
        FROM products
        WHERE ($1::TEXT IS NULL OR product_name = $1)
          AND ($2::TEXT IS NULL OR country = $2)
        ORDER BY country DESC, id
        LIMIT $3
        OFFSET $4
        "#,
    )
    .bind(product_name)
    .bind(country)
    .bind(params.per_page())
    .bind(params.offset())
    .fetch_all(&pool)
    .await?;

    let countries: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT country
        FROM products
        WHERE country IS NOT NULL
        ORDER BY country
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(ListProductsResponse {
        items,
        countries,
        pagination: PaginationMetadata::from_params(&params, total),
    })
}
