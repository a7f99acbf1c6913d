//! Mediator wiring for database-backed queries
//!
//! Upload commands and status queries need the ingestion coordinator and the
//! progress store, so routes call their handlers directly.

pub use mediator::DefaultAsyncMediator;
use sqlx::PgPool;

pub type AppMediator = DefaultAsyncMediator;

pub fn build_mediator(pool: PgPool) -> AppMediator {
    DefaultAsyncMediator::builder()
        // Products
        .add_handler({
            let pool = pool.clone();
            move |query| {
                let pool = pool.clone();
                async move { crate::features::products::queries::list::handle(pool, query).await }
            }
        })
        .build()
}
