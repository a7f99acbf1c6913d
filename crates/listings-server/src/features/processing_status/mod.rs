pub mod queries;
pub mod routes;

pub use queries::{GetProcessingStatusError, GetProcessingStatusQuery};
pub use routes::processing_status_routes;
