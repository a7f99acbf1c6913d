pub mod get;

pub use get::{GetProcessingStatusError, GetProcessingStatusQuery};
