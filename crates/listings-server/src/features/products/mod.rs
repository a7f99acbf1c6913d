pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{UploadProductsCommand, UploadProductsError, UploadProductsResponse};
pub use queries::{ListProductsError, ListProductsQuery, ListProductsResponse, ProductListItem};
pub use routes::{products_routes, ProductsState};
