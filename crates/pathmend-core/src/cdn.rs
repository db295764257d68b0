//! CDN cache invalidation after catalog writes.

use crate::{PathmendError, Result};
use async_trait::async_trait;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use std::sync::Mutex;
use tracing::{debug, info};

/// Invalidates cached copies of updated documents.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Request invalidation of `paths` (each starting with `/`).
    async fn invalidate(&self, paths: &[String]) -> Result<()>;
}

/// Does nothing. Used when no distribution is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInvalidator;

#[async_trait]
impl CacheInvalidator for NoopInvalidator {
    async fn invalidate(&self, paths: &[String]) -> Result<()> {
        debug!("No CDN distribution configured, skipping invalidation of {:?}", paths);
        Ok(())
    }
}

/// CloudFront distribution invalidation.
pub struct CloudFrontInvalidator {
    client: aws_sdk_cloudfront::Client,
    distribution_id: String,
}

impl CloudFrontInvalidator {
    pub fn new(client: aws_sdk_cloudfront::Client, distribution_id: impl Into<String>) -> Self {
        Self {
            client,
            distribution_id: distribution_id.into(),
        }
    }

    pub async fn from_env(distribution_id: impl Into<String>) -> Self {
        let cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_cloudfront::Client::new(&cfg), distribution_id)
    }
}

#[async_trait]
impl CacheInvalidator for CloudFrontInvalidator {
    async fn invalidate(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let build_err = |e: aws_sdk_cloudfront::error::BuildError| {
            PathmendError::fatal_transport(format!("invalid invalidation request: {}", e))
        };
        let items = Paths::builder()
            .quantity(paths.len() as i32)
            .set_items(Some(paths.to_vec()))
            .build()
            .map_err(build_err)?;
        let batch = InvalidationBatch::builder()
            .paths(items)
            .caller_reference(uuid::Uuid::new_v4().to_string())
            .build()
            .map_err(build_err)?;

        let out = self
            .client
            .create_invalidation()
            .distribution_id(&self.distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| {
                PathmendError::transient(format!(
                    "CloudFront invalidation on {} failed: {}",
                    self.distribution_id,
                    aws_sdk_cloudfront::error::DisplayErrorContext(&e)
                ))
            })?;

        let id = out
            .invalidation()
            .map(|i| i.id().to_string())
            .unwrap_or_default();
        info!(
            "Requested invalidation {} on {} for {} path(s)",
            id,
            self.distribution_id,
            paths.len()
        );
        Ok(())
    }
}

/// Records requested paths. Test double.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    requested: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An invalidator whose every request fails.
    pub fn failing() -> Self {
        Self {
            requested: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn invalidate(&self, paths: &[String]) -> Result<()> {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(paths.iter().cloned());
        if self.fail {
            return Err(PathmendError::transient("CDN unavailable"));
        }
        Ok(())
    }
}
