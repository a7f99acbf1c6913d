//! Document sink: one MongoDB collection of listing documents
//!
//! A unique index on `(url, product_id)` makes re-inserts harmless. Batches
//! are written unordered, so a duplicate does not stop the rest of the batch,
//! and a failure made up only of duplicate-key errors counts as success.

use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::bson::{doc, DateTime};
use mongodb::error::{ErrorKind, InsertManyError};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ingest::framework::{CanonicalRecord, RecordSink};

const DUPLICATE_KEY: i32 = 11000;

/// Stored shape of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDocument {
    #[serde(flatten)]
    pub record: CanonicalRecord,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl ListingDocument {
    pub fn new(record: CanonicalRecord, now: DateTime) -> Self {
        Self {
            record,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone)]
pub struct MongoRecordSink {
    collection: Collection<ListingDocument>,
}

impl MongoRecordSink {
    pub async fn connect(url: &str, database: &str, collection: &str) -> Result<Self> {
        info!(database, collection, "Connecting document sink to MongoDB");
        let client = Client::with_uri_str(url)
            .await
            .context("Failed to create MongoDB client")?;
        let sink = Self::new(client.database(database).collection(collection));
        sink.ensure_indexes().await?;
        Ok(sink)
    }

    pub fn new(collection: Collection<ListingDocument>) -> Self {
        Self { collection }
    }

    /// Create the lookup and dedupe indexes if they do not exist yet
    pub async fn ensure_indexes(&self) -> Result<()> {
        let country = IndexModel::builder().keys(doc! { "country": 1 }).build();
        let product_name = IndexModel::builder()
            .keys(doc! { "product_name": 1 })
            .build();
        let dedupe = IndexModel::builder()
            .keys(doc! { "url": 1, "product_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("url_product_id_unique".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.collection
            .create_indexes(vec![country, product_name, dedupe])
            .await
            .context("Failed to create MongoDB indexes")?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for MongoRecordSink {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn insert_batch(&self, records: &[CanonicalRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = DateTime::now();
        let documents: Vec<ListingDocument> = records
            .iter()
            .cloned()
            .map(|record| ListingDocument::new(record, now))
            .collect();

        match self.collection.insert_many(documents).ordered(false).await {
            Ok(result) => Ok(result.inserted_ids.len() as u64),
            Err(err) => match err.kind.as_ref() {
                ErrorKind::InsertMany(failure) if only_duplicates(failure) => {
                    let duplicates = failure.write_errors.as_ref().map_or(0, Vec::len);
                    debug!(
                        batch_size = records.len(),
                        duplicates, "Skipped existing listings in mongodb"
                    );
                    Ok(records.len().saturating_sub(duplicates) as u64)
                },
                _ => Err(err).context("Failed to insert listings into MongoDB"),
            },
        }
    }
}

fn only_duplicates(failure: &InsertManyError) -> bool {
    failure.write_concern_error.is_none()
        && failure
            .write_errors
            .as_ref()
            .is_some_and(|errors| all_duplicate_keys(errors.iter().map(|e| e.code)))
}

fn all_duplicate_keys(mut codes: impl Iterator<Item = i32>) -> bool {
    let mut seen = false;
    let all = codes.all(|code| {
        seen = true;
        code == DUPLICATE_KEY
    });
    seen && all
}
