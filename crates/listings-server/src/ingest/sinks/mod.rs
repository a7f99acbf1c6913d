//! Concrete [`RecordSink`](crate::ingest::framework::RecordSink) implementations

pub mod mongo;
pub mod postgres;

pub use mongo::MongoRecordSink;
pub use postgres::PostgresProductSink;
