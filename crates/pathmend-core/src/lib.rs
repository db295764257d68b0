//! Pathmend Core - catalog image-path reconciliation.
//!
//! A business directory keeps one JSON catalog and one image album per
//! (category, environment). This crate derives canonical object keys from the
//! heterogeneous references found in catalogs, rewrites the catalogs, verifies
//! every reference against the store and reports what needs a human.
//!
//! # Example
//!
//! ```rust,ignore
//! use pathmend_core::{CatalogClient, CorrectionTable, Orchestrator, RunOptions, S3Store, Target};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> pathmend_core::Result<()> {
//!     let store = Arc::new(S3Store::from_env("baliciaga-database", None, false).await);
//!     let catalogs = CatalogClient::new(store.clone());
//!     let orchestrator = Orchestrator::new(store, catalogs, CorrectionTable::new(), RunOptions::default());
//!
//!     let report = orchestrator.run(&Target::new("bars-dev.json", "bar-image-dev")).await;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod cdn;
pub mod config;
pub mod corrections;
pub mod error;
pub mod migrate;
pub mod naming;
pub mod persist;
pub mod references;
pub mod report;
pub mod resolver;
pub mod rewrite;
pub mod scanner;
pub mod store;

// Re-export commonly used types
pub use catalog::{BusinessRecord, CatalogClient, CatalogSnapshot};
pub use cdn::{CacheInvalidator, CloudFrontInvalidator, NoopInvalidator};
pub use config::{Category, Environment, Settings, Target};
pub use corrections::CorrectionTable;
pub use error::{PathmendError, Result};
pub use migrate::{Orchestrator, PromotionReport, Promoter, RunOptions};
pub use naming::{normalize_path, normalize_segment};
pub use references::ImageRef;
pub use report::{MigrationReport, RunState};
pub use resolver::{resolve, Confidence, Resolution, Resolver};
pub use rewrite::{rewrite, ResolvedTarget, RewriteOutcome};
pub use scanner::{AlbumListing, Scanner};
pub use store::{LocalStore, MemoryStore, ObjectStore, S3Store};
