pub mod upload;

pub use upload::{UploadProductsCommand, UploadProductsError, UploadProductsResponse};
