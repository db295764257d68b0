//! Object store abstraction and backends.
//!
//! - `s3`: the production bucket via `aws-sdk-s3`
//! - `local`: a directory mirror of the bucket
//! - `memory`: in-process store for tests

mod local;
mod memory;
mod retry;
mod s3;
mod traits;

pub use local::{content_version, LocalStore};
pub use memory::{FaultOp, MemoryStore};
pub use retry::{with_retry, RetryConfig};
pub use s3::{encode_key, S3Store};
pub use traits::{content_type_for, ObjectInfo, ObjectStore, ObjectVersion, PutCondition, StoredObject};
