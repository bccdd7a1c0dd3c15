pub mod aggregate;
pub mod query;

pub use aggregate::{Product, ProductFields, ProductId};
pub use query::{PageMeta, ProductListResponse, ProductQuery};
