pub mod list;

pub use list::{ListProductsError, ListProductsQuery, ListProductsResponse, ProductListItem};
