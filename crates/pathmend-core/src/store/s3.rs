//! S3 backend.
//!
//! Every call goes through [`with_retry`]. Listing follows continuation
//! tokens. Conditional writes use `If-Match` / `If-None-Match`; a failed
//! precondition surfaces as `PathmendError::Conflict`.

use super::retry::{with_retry, RetryConfig};
use super::traits::{content_type_for, ObjectInfo, ObjectStore, ObjectVersion, PutCondition, StoredObject};
use crate::config::StoreConfig;
use crate::{PathmendError, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::debug;

/// Object store backed by one S3 bucket.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    retry: RetryConfig,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            retry: RetryConfig::default(),
        }
    }

    /// Build a client from the ambient AWS configuration (env, profile, IMDS).
    pub async fn from_env(
        bucket: impl Into<String>,
        endpoint_url: Option<&str>,
        force_path_style: bool,
    ) -> Self {
        let cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&cfg);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }
        if force_path_style || endpoint_url.is_some() {
            builder = builder.force_path_style(true);
        }
        Self::new(aws_sdk_s3::Client::from_conf(builder.build()), bucket)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let resp = with_retry(&self.retry, &format!("list {}", prefix), || {
                let mut req = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix)
                    .max_keys(StoreConfig::LIST_PAGE_SIZE);
                if let Some(t) = token.as_deref() {
                    req = req.continuation_token(t);
                }
                async move { req.send().await.map_err(|e| classify(e, prefix, "list")) }
            })
            .await?;
            pages += 1;

            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                if key.ends_with('/') {
                    continue;
                }
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                });
            }

            if resp.is_truncated().unwrap_or(false) {
                token = resp.next_continuation_token().map(str::to_string);
                if token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        debug!(
            "Listed {} objects under s3://{}/{} in {} page(s)",
            objects.len(),
            self.bucket,
            prefix,
            pages
        );
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<StoredObject> {
        with_retry(&self.retry, &format!("get {}", key), || async move {
            let out = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| classify(e, key, "get"))?;
            let version = ObjectVersion(out.e_tag().unwrap_or_default().to_string());
            let body = out
                .body
                .collect()
                .await
                .map_err(|e| PathmendError::transient(format!("reading body of {}: {}", key, e)))?
                .into_bytes();
            Ok(StoredObject { body, version })
        })
        .await
    }

    async fn put(&self, key: &str, body: Bytes, condition: PutCondition) -> Result<ObjectVersion> {
        with_retry(&self.retry, &format!("put {}", key), || {
            let mut req = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type_for(key))
                .body(ByteStream::from(body.clone()));
            req = match &condition {
                PutCondition::Overwrite => req,
                PutCondition::IfMatch(version) => req.if_match(&version.0),
                PutCondition::IfAbsent => req.if_none_match("*"),
            };
            async move {
                let out = req.send().await.map_err(|e| classify(e, key, "put"))?;
                Ok(ObjectVersion(out.e_tag().unwrap_or_default().to_string()))
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        with_retry(&self.retry, &format!("delete {}", key), || async move {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| classify(e, key, "delete"))?;
            Ok(())
        })
        .await
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        // CopySource is the one place S3 expects the key URL-encoded
        let source = format!("{}/{}", self.bucket, encode_key(src));
        with_retry(&self.retry, &format!("copy {} -> {}", src, dst), || {
            let req = self
                .client
                .copy_object()
                .bucket(&self.bucket)
                .copy_source(&source)
                .key(dst);
            async move {
                req.send().await.map_err(|e| classify(e, src, "copy"))?;
                Ok(())
            }
        })
        .await
    }
}

/// Percent-encode each segment of a key, keeping the separators.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn classify<E>(err: SdkError<E, HttpResponse>, key: &str, op: &str) -> PathmendError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    match status {
        Some(404) => {
            return PathmendError::NotFound {
                key: key.to_string(),
            }
        }
        Some(409) | Some(412) => {
            return PathmendError::Conflict {
                key: key.to_string(),
            }
        }
        _ => {}
    }

    let message = format!("{} {} failed: {}", op, key, DisplayErrorContext(&err));
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        _ => matches!(status, Some(429) | Some(500..=599)),
    };
    if transient {
        PathmendError::transient(message)
    } else {
        PathmendError::fatal_transport(message)
    }
}
