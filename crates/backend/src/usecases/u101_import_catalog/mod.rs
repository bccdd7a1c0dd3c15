pub mod catalog_api_client;
pub mod change_detection;
pub mod executor;
pub mod processor;
pub mod status;

pub use catalog_api_client::{CatalogApiClient, CatalogSource};
pub use executor::{import_job_options, ImportExecutor};
pub use processor::{ImportCatalogProcessor, IMPORT_JOB_NAME};
