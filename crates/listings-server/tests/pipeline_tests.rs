//! End-to-end tests for the ingestion pipeline
//!
//! Jobs run through the real coordinator, queue and chunk workers against a
//! memory progress store and recording sinks, so no external services are
//! needed.

use serde_json::json;
use std::sync::Arc;

use listings_common::types::{JobStatus, JobStatusReport};
use listings_server::ingest::framework::{IngestError, ProgressStore, RecordSink};

mod common;

use common::{batch_config, listing, to_bytes, wait_for_status, RecordingSink, TestPipeline};

fn sinks() -> (Arc<RecordingSink>, Arc<RecordingSink>) {
    (RecordingSink::new("postgres"), RecordingSink::new("mongodb"))
}

// ============================================================================
// Chunking and completion
// ============================================================================

#[tokio::test]
async fn test_job_completes_after_every_chunk() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo.clone()],
        batch_config(10, 4),
    );
    pipeline.progress.register("job-1", "listings.json").await.unwrap();

    let records: Vec<_> = (1..=25).map(|sku| listing(sku, "19.99")).collect();
    let summary = pipeline
        .coordinator
        .dispatch(to_bytes(&records), "job-1")
        .await
        .unwrap();

    assert_eq!(summary.total_records, 25);
    assert_eq!(summary.total_chunks, 3);

    let progress = pipeline.drain().await;
    let snapshot = progress.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.status, Some(JobStatus::Completed));
    assert_eq!(snapshot.total_chunks, 3);
    assert_eq!(snapshot.processed_chunks, 3);
    assert_eq!(snapshot.file_name.as_deref(), Some("listings.json"));

    let report = JobStatusReport::from(snapshot);
    assert_eq!(report.progress, 100.0);

    assert_eq!(pg.records().await.len(), 25);
    assert_eq!(mongo.records().await.len(), 25);
}

#[tokio::test]
async fn test_records_are_normalized_before_storage() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo.clone()],
        batch_config(10, 10),
    );
    pipeline.progress.register("job-1", "listings.json").await.unwrap();

    let mut marketplace = listing(2, "5.5");
    marketplace["ismarketplace"] = json!(true);
    marketplace["marketplaceseller"] = json!("Trader  Joe  FR");

    pipeline
        .coordinator
        .dispatch(to_bytes(&[listing(1, "12.50 EUR"), marketplace]), "job-1")
        .await
        .unwrap();
    pipeline.drain().await;

    let mut stored = pg.records().await;
    stored.sort_by_key(|r| r.product_id);

    assert_eq!(stored[0].country.as_deref(), Some("GERMANY"));
    assert_eq!(stored[0].brand, "ACME");
    assert_eq!(stored[0].product_name, "MODEL 1");
    assert_eq!(stored[0].shop_name.as_deref(), Some("ACME STORE"));
    assert_eq!(stored[0].product_category_id, 7);
    assert_eq!(stored[0].price, 12.5);
    assert_eq!(stored[0].url, "https://shop.example/p/1");

    assert_eq!(stored[1].shop_name.as_deref(), Some("TRADER JOE"));

    let mut documents = mongo.records().await;
    documents.sort_by_key(|r| r.product_id);
    assert_eq!(documents, stored);
}

#[tokio::test]
async fn test_ineligible_listings_never_reach_a_sink() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo.clone()],
        batch_config(2, 2),
    );
    pipeline.progress.register("job-1", "listings.json").await.unwrap();

    let mut unavailable = listing(2, "10");
    unavailable["availability"] = json!(false);
    let mut missing_availability = listing(3, "10");
    missing_availability
        .as_object_mut()
        .unwrap()
        .remove("availability");

    let records = vec![
        listing(1, "10"),
        unavailable,
        missing_availability,
        listing(4, "0"),
        listing(5, "-3"),
        listing(6, "free"),
        listing(7, "0.01"),
    ];
    pipeline
        .coordinator
        .dispatch(to_bytes(&records), "job-1")
        .await
        .unwrap();
    let progress = pipeline.drain().await;

    let mut ids: Vec<i64> = pg.records().await.iter().map(|r| r.product_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 7]);
    assert_eq!(mongo.records().await.len(), 2);

    // Chunks with nothing to store still count as processed
    let snapshot = progress.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.processed_chunks, 4);
    assert_eq!(snapshot.status, Some(JobStatus::Completed));
}

#[tokio::test]
async fn test_repeated_listing_is_stored_once_per_sink() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo.clone()],
        batch_config(1, 1),
    );
    pipeline.progress.register("job-1", "listings.json").await.unwrap();

    let records = vec![listing(123, "100"), listing(123, "100"), listing(123, "100")];
    pipeline
        .coordinator
        .dispatch(to_bytes(&records), "job-1")
        .await
        .unwrap();
    let progress = pipeline.drain().await;

    for sink in [&pg, &mongo] {
        let stored = sink.records().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].product_id, 123);
        assert_eq!(stored[0].price, 100.0);
    }

    let snapshot = progress.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.processed_chunks, 3);
    assert_eq!(snapshot.status, Some(JobStatus::Completed));
}

#[tokio::test]
async fn test_many_small_chunks_complete_exactly_once() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo.clone()],
        batch_config(1, 1),
    );
    pipeline.progress.register("job-1", "listings.json").await.unwrap();

    let records: Vec<_> = (1..=50).map(|sku| listing(sku, "1")).collect();
    pipeline
        .coordinator
        .dispatch(to_bytes(&records), "job-1")
        .await
        .unwrap();
    let progress = pipeline.drain().await;

    let snapshot = progress.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.total_chunks, 50);
    assert_eq!(snapshot.processed_chunks, 50);
    assert_eq!(snapshot.status, Some(JobStatus::Completed));

    // A late transition finds the job already completed
    assert!(!progress
        .transition_status("job-1", JobStatus::Processing, JobStatus::Completed)
        .await
        .unwrap());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_invalid_record_fails_its_chunk() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo.clone()],
        batch_config(2, 2),
    );
    pipeline.progress.register("job-1", "listings.json").await.unwrap();

    let mut no_url = listing(4, "10");
    no_url.as_object_mut().unwrap().remove("url");
    let records = vec![listing(1, "10"), listing(2, "10"), listing(3, "10"), no_url];

    pipeline
        .coordinator
        .dispatch(to_bytes(&records), "job-1")
        .await
        .unwrap();
    let progress = pipeline.drain().await;

    let snapshot = progress.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.status, Some(JobStatus::Error));
    assert_eq!(snapshot.total_chunks, 2);
    assert!(snapshot.processed_chunks <= 1);

    // Nothing from the failed chunk was written, not even its valid record
    let ids: Vec<i64> = pg.records().await.iter().map(|r| r.product_id).collect();
    assert!(!ids.contains(&3));
    assert!(!ids.contains(&4));
}

#[tokio::test]
async fn test_failing_sink_does_not_block_the_other() {
    let pg = RecordingSink::failing("postgres");
    let mongo = RecordingSink::new("mongodb");
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo.clone()],
        batch_config(5, 5),
    );
    pipeline.progress.register("job-1", "listings.json").await.unwrap();

    let records: Vec<_> = (1..=12).map(|sku| listing(sku, "3")).collect();
    pipeline
        .coordinator
        .dispatch(to_bytes(&records), "job-1")
        .await
        .unwrap();
    let progress = pipeline.drain().await;

    assert!(pg.records().await.is_empty());
    assert_eq!(mongo.records().await.len(), 12);

    let snapshot = progress.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.status, Some(JobStatus::Completed));
    assert_eq!(snapshot.processed_chunks, 3);
}

#[tokio::test]
async fn test_fatal_sink_errors_fail_the_job() {
    let pg = RecordingSink::failing("postgres");
    let mongo = RecordingSink::new("mongodb");
    let mut config = batch_config(5, 5);
    config.sink_errors_fatal = true;
    let pipeline = TestPipeline::start(vec![pg as Arc<dyn RecordSink>, mongo], config);
    pipeline.progress.register("job-1", "listings.json").await.unwrap();

    pipeline
        .coordinator
        .dispatch(to_bytes(&[listing(1, "3")]), "job-1")
        .await
        .unwrap();
    let progress = pipeline.drain().await;

    let snapshot = progress.snapshot("job-1").await.unwrap().unwrap();
    assert_eq!(snapshot.status, Some(JobStatus::Error));
    assert_eq!(snapshot.processed_chunks, 0);
}

#[tokio::test]
async fn test_malformed_input_fails_job_without_writes() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo.clone()],
        batch_config(10, 10),
    );
    pipeline.progress.register("job-1", "broken.json").await.unwrap();

    // A stray byte between records is structural damage, not bad text
    let bodies = [
        &b"[{\"sku\": 1,"[..],
        &b"{\"not\": \"an array\"}"[..],
        &b"[{\"sku\": 1}\xff]"[..],
    ];
    for body in bodies {
        let err = pipeline
            .coordinator
            .dispatch(body.to_vec(), "job-1")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput(_)));
    }

    let snapshot = pipeline.snapshot("job-1").await;
    assert_eq!(snapshot.status, Some(JobStatus::Error));
    assert_eq!(snapshot.total_chunks, 0);

    pipeline.drain().await;
    assert!(pg.records().await.is_empty());
    assert!(mongo.records().await.is_empty());
}

#[tokio::test]
async fn test_missing_file_fails_job() {
    let (pg, mongo) = sinks();
    let pipeline =
        TestPipeline::start(vec![pg as Arc<dyn RecordSink>, mongo], batch_config(10, 10));
    pipeline.progress.register("job-1", "gone.json").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let err = pipeline
        .coordinator
        .start_job(dir.path().join("gone.json"), "job-1")
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::SourceUnavailable { .. }));
    assert_eq!(pipeline.snapshot("job-1").await.status, Some(JobStatus::Error));
}

// ============================================================================
// Edge cases
// ============================================================================

#[tokio::test]
async fn test_empty_array_completes_immediately() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo],
        batch_config(10, 10),
    );
    pipeline.progress.register("job-1", "empty.json").await.unwrap();

    let summary = pipeline
        .coordinator
        .dispatch(b"[]".to_vec(), "job-1")
        .await
        .unwrap();
    assert_eq!(summary.total_chunks, 0);

    let snapshot = pipeline.snapshot("job-1").await;
    assert_eq!(snapshot.status, Some(JobStatus::Completed));
    assert_eq!(snapshot.processed_chunks, 0);
    assert_eq!(JobStatusReport::from(snapshot).progress, 0.0);

    pipeline.drain().await;
    assert!(pg.records().await.is_empty());
}

#[tokio::test]
async fn test_invalid_utf8_is_repaired() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo],
        batch_config(10, 10),
    );
    pipeline.progress.register("job-1", "latin1.json").await.unwrap();

    let mut body = br#"[{"availability": true, "price": "4", "sku": "9", "brand": "Caf"#.to_vec();
    body.push(0xE9);
    body.extend_from_slice(
        r#"", "model": "Crème", "url": "https://shop.example/9", "site": "Shop"}]"#.as_bytes(),
    );

    pipeline.coordinator.dispatch(body, "job-1").await.unwrap();
    let progress = pipeline.drain().await;

    let stored = pg.records().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].brand, "CAF");
    assert_eq!(stored[0].product_name, "CRÈME");
    assert_eq!(
        progress.snapshot("job-1").await.unwrap().unwrap().status,
        Some(JobStatus::Completed)
    );
}

#[tokio::test]
async fn test_unpaired_surrogate_escape_is_dropped() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo.clone()],
        batch_config(10, 10),
    );
    pipeline.progress.register("job-1", "listings.json").await.unwrap();

    let mut broken = listing(2, "5");
    broken["brand"] = json!("Caf@@");
    let body = String::from_utf8(to_bytes(&[listing(1, "5"), broken, listing(3, "5")]))
        .unwrap()
        .replace("@@", "\\ud800");

    let summary = pipeline
        .coordinator
        .dispatch(body.into_bytes(), "job-1")
        .await
        .unwrap();
    assert_eq!(summary.total_records, 3);
    let progress = pipeline.drain().await;

    let mut stored = pg.records().await;
    stored.sort_by_key(|r| r.product_id);
    let brands: Vec<&str> = stored.iter().map(|r| r.brand.as_str()).collect();
    assert_eq!(brands, vec!["ACME", "CAF", "ACME"]);
    assert_eq!(mongo.records().await.len(), 3);
    assert_eq!(
        progress.snapshot("job-1").await.unwrap().unwrap().status,
        Some(JobStatus::Completed)
    );
}

#[tokio::test]
async fn test_spawned_job_reads_the_uploaded_file() {
    let (pg, mongo) = sinks();
    let pipeline = TestPipeline::start(
        vec![pg.clone() as Arc<dyn RecordSink>, mongo],
        batch_config(3, 3),
    );
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upload.json");
    let records: Vec<_> = (1..=7).map(|sku| listing(sku, "2")).collect();
    tokio::fs::write(&path, to_bytes(&records)).await.unwrap();

    pipeline.progress.register("job-1", "upload.json").await.unwrap();
    pipeline
        .coordinator
        .spawn_job(path, "job-1".to_string())
        .await
        .unwrap();

    wait_for_status(&pipeline.progress, "job-1", JobStatus::Completed).await;
    assert_eq!(pipeline.snapshot("job-1").await.total_chunks, 3);
    pipeline.drain().await;
    assert_eq!(pg.records().await.len(), 7);
}
