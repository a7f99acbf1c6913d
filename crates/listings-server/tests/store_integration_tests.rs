//! Integration tests against real stores
//!
//! Each test starts its own container, so they are ignored by default:
//!
//! ```bash
//! cargo test --test store_integration_tests -- --ignored
//! ```

use std::sync::Arc;

use listings_common::types::JobStatus;
use listings_server::cqrs::build_mediator;
use listings_server::features::products::{queries::list, ListProductsQuery};
use listings_server::ingest::framework::{
    CanonicalRecord, ChunkWorker, Denylist, IngestionCoordinator, LocalChunkQueue, Normalizer,
    ProgressStore, RecordSink, SinkWriter,
};
use listings_server::ingest::progress::RedisProgressStore;
use listings_server::ingest::sinks::{MongoRecordSink, PostgresProductSink};

mod common;

use common::{batch_config, listing, to_bytes, TestMongo, TestPostgres, TestRedis};

fn record(product_id: i64, country: Option<&str>, name: &str) -> CanonicalRecord {
    CanonicalRecord {
        country: country.map(str::to_string),
        brand: "ACME".to_string(),
        product_id,
        product_name: name.to_string(),
        shop_name: Some("ACME STORE".to_string()),
        product_category_id: 7,
        price: 19.99,
        url: format!("https://shop.example/p/{product_id}"),
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_postgres_sink_skips_duplicates() {
    let pg = TestPostgres::start().await.unwrap();
    let sink = PostgresProductSink::new(pg.pool_clone());

    let inserted = sink
        .insert_batch(&[record(1, Some("GERMANY"), "WIDGET"), record(2, None, "GADGET")])
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    // Same (url, product_id) again, plus one new row
    let inserted = sink
        .insert_batch(&[record(1, Some("GERMANY"), "WIDGET"), record(3, Some("FRANCE"), "WIDGET")])
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
#[ignore]
async fn test_postgres_sink_stores_long_text() {
    let pg = TestPostgres::start().await.unwrap();
    let sink = PostgresProductSink::new(pg.pool_clone());

    let name = "WIDGET ".repeat(50);
    let mut long = record(1, Some("GERMANY"), name.trim_end());
    long.brand = "A".repeat(300);
    long.shop_name = Some("S".repeat(400));

    let inserted = sink
        .insert_batch(&[long.clone(), record(2, None, "GADGET")])
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let (brand, product_name, shop_name): (String, String, Option<String>) = sqlx::query_as(
        "SELECT brand, product_name, shop_name FROM products WHERE product_id = 1",
    )
    .fetch_one(pg.pool())
    .await
    .unwrap();
    assert_eq!(brand, long.brand);
    assert_eq!(product_name, long.product_name);
    assert!(product_name.len() > 255);
    assert_eq!(shop_name, long.shop_name);
}

#[tokio::test]
#[ignore]
async fn test_list_products_filters_and_paginates() {
    let pg = TestPostgres::start().await.unwrap();
    let sink = PostgresProductSink::new(pg.pool_clone());
    sink.insert_batch(&[
        record(1, Some("AUSTRIA"), "WIDGET"),
        record(2, Some("GERMANY"), "WIDGET"),
        record(3, Some("GERMANY"), "GADGET"),
        record(4, None, "WIDGET"),
    ])
    .await
    .unwrap();

    let all = list::handle(pg.pool_clone(), ListProductsQuery::default())
        .await
        .unwrap();
    assert_eq!(all.pagination.total, 4);
    assert_eq!(all.countries, vec!["AUSTRIA", "GERMANY"]);
    // NULL countries sort first when descending
    assert_eq!(all.items[0].country, None);
    assert_eq!(all.items[1].country.as_deref(), Some("GERMANY"));

    let widgets_in_germany = list::handle(pg.pool_clone(), ListProductsQuery {
        product_name: Some("WIDGET".to_string()),
        country: Some("GERMANY".to_string()),
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(widgets_in_germany.items.len(), 1);
    assert_eq!(widgets_in_germany.items[0].product_id, 2);

    // Blank filters are ignored
    let blank = list::handle(pg.pool_clone(), ListProductsQuery {
        product_name: Some("  ".to_string()),
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(blank.pagination.total, 4);

    let second_page = list::handle(pg.pool_clone(), ListProductsQuery {
        page: Some(2),
        per_page: Some(3),
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(second_page.items.len(), 1);
    assert_eq!(second_page.pagination.pages, 2);
    assert!(second_page.pagination.has_prev);
    assert!(!second_page.pagination.has_next);

    let _mediator = build_mediator(pg.pool_clone());
}

// ============================================================================
// Redis
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_redis_progress_store_lifecycle() {
    let redis = TestRedis::start().await.unwrap();
    let store = RedisProgressStore::connect(redis.url(), "data_processing")
        .await
        .unwrap();
    store.ping().await.unwrap();

    assert!(store.snapshot("job-1").await.unwrap().is_none());

    store.register("job-1", "listings.json").await.unwrap();
    let snapshot = store.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.status, Some(JobStatus::Pending));

    store.set_initial("job-1", 2).await.unwrap();
    assert_eq!(store.increment_processed("job-1").await.unwrap(), 1);
    assert_eq!(store.increment_processed("job-1").await.unwrap(), 2);

    assert!(store
        .transition_status("job-1", JobStatus::Processing, JobStatus::Completed)
        .await
        .unwrap());
    assert!(!store
        .transition_status("job-1", JobStatus::Processing, JobStatus::Error)
        .await
        .unwrap());

    let snapshot = store.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.status, Some(JobStatus::Completed));
    assert_eq!(snapshot.total_chunks, 2);
    assert_eq!(snapshot.processed_chunks, 2);
    assert_eq!(snapshot.file_name.as_deref(), Some("listings.json"));

    // Nothing leaves a terminal state, but an overwrite always lands
    assert!(!store
        .transition_status("job-1", JobStatus::Completed, JobStatus::Processing)
        .await
        .unwrap());
    store.set_status("job-1", JobStatus::Error).await.unwrap();
    let snapshot = store.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.status, Some(JobStatus::Error));
    assert_eq!(snapshot.processed_chunks, 2);
}

#[tokio::test]
#[ignore]
async fn test_redis_concurrent_increments_complete_once() {
    let redis = TestRedis::start().await.unwrap();
    let store = Arc::new(
        RedisProgressStore::connect(redis.url(), "data_processing")
            .await
            .unwrap(),
    );
    store.set_initial("job-1", 20).await.unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let store = store.clone();
        tasks.spawn(async move {
            let processed = store.increment_processed("job-1").await.unwrap();
            processed >= 20
                && store
                    .transition_status("job-1", JobStatus::Processing, JobStatus::Completed)
                    .await
                    .unwrap()
        });
    }

    let mut completions = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap() {
            completions += 1;
        }
    }
    assert_eq!(completions, 1);
}

// ============================================================================
// MongoDB
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_mongo_sink_skips_duplicates() {
    let mongo = TestMongo::start().await.unwrap();
    let sink = MongoRecordSink::connect(mongo.url(), "listings_test", "external_records")
        .await
        .unwrap();

    let inserted = sink
        .insert_batch(&[record(1, Some("GERMANY"), "WIDGET"), record(2, None, "GADGET")])
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let inserted = sink
        .insert_batch(&[record(2, None, "GADGET"), record(3, Some("FRANCE"), "WIDGET")])
        .await
        .unwrap();
    assert_eq!(inserted, 1);
}

// ============================================================================
// Full pipeline
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_pipeline_writes_to_both_stores() {
    let pg = TestPostgres::start().await.unwrap();
    let redis = TestRedis::start().await.unwrap();
    let mongo = TestMongo::start().await.unwrap();

    let progress: Arc<dyn ProgressStore> = Arc::new(
        RedisProgressStore::connect(redis.url(), "data_processing")
            .await
            .unwrap(),
    );
    let sinks: Vec<Arc<dyn RecordSink>> = vec![
        Arc::new(PostgresProductSink::new(pg.pool_clone())),
        Arc::new(
            MongoRecordSink::connect(mongo.url(), "listings_test", "external_records")
                .await
                .unwrap(),
        ),
    ];

    let config = batch_config(2, 2);
    let worker = ChunkWorker::new(
        Arc::new(Normalizer::new(Denylist::standard().unwrap())),
        SinkWriter::new(sinks),
        progress.clone(),
        config.clone(),
    );
    let (queue, queue_handle) = LocalChunkQueue::start(worker, 4, 2);
    let coordinator = IngestionCoordinator::new(progress.clone(), Arc::new(queue), config);

    progress.register("job-1", "listings.json").await.unwrap();
    let records = vec![listing(123, "100"), listing(123, "100"), listing(5, "7")];
    coordinator.dispatch(to_bytes(&records), "job-1").await.unwrap();

    drop(coordinator);
    queue_handle.await.unwrap();

    let snapshot = progress.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.status, Some(JobStatus::Completed));
    assert_eq!(snapshot.processed_chunks, 2);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE product_id = 123")
        .fetch_one(pg.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);
}
