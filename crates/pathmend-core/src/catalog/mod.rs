//! Catalog documents: record model and store client.

mod model;
mod store;

pub use model::{BusinessRecord, CatalogSnapshot, RecordFields, RefField};
pub use store::{parse_catalog, CatalogClient};
