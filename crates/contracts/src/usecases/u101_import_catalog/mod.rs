pub mod catalog;
pub mod progress;
pub mod response;

pub use catalog::{CatalogItem, CatalogSnapshot};
pub use progress::{ImportJobState, ImportResult, ImportStatus};
pub use response::{ImportResponse, ImportStartStatus};
