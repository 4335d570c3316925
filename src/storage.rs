use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Lifetime of a presigned upload URL.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("presigning failed: {0}")]
    Presign(String),

    #[error("bucket provisioning failed: {0}")]
    Bucket(String),
}

/// StorageService
///
/// Object storage for NBS media. The S3 client talks to MinIO locally and to
/// any S3-compatible endpoint in production; tests use `MockStorageService`.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if it is missing. Called at start-up in `Env::Local`.
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError>;

    /// Signs a PUT for `key`, constrained to `content_type`, valid for `UPLOAD_URL_TTL`.
    async fn presigned_upload_url(&self, key: &str, content_type: &str) -> Result<String, StorageError>;
}

/// S3StorageClient
///
/// `force_path_style(true)` is required by MinIO.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub fn new(endpoint: &str, region: &str, access_key: &str, secret_key: &str, bucket: &str) -> Self {
        let credentials = s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        self.client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(|e| StorageError::Bucket(e.to_string()))?;

        tracing::info!(bucket = %self.bucket_name, "Created storage bucket");
        Ok(())
    }

    async fn presigned_upload_url(&self, key: &str, content_type: &str) -> Result<String, StorageError> {
        let key = sanitize_key(key);
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty after sanitization".to_string()));
        }

        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL)
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}

/// object_key
///
/// Key for a new media asset: `{nbs_title}_{uuid}_{filename}`, with the
/// caller-supplied parts stripped of path separators and dot segments.
pub fn object_key(nbs_title: &str, filename: &str) -> Result<String, StorageError> {
    let title = flatten_segment(nbs_title);
    let file = flatten_segment(filename);

    if title.is_empty() || file.is_empty() {
        return Err(StorageError::InvalidKey(format!(
            "title '{nbs_title}' and filename '{filename}' must both be non-empty"
        )));
    }
    Ok(format!("{title}_{}_{file}", Uuid::new_v4()))
}

/// Joins the non-traversal segments of a user-supplied name with `_`.
fn flatten_segment(raw: &str) -> String {
    raw.split(['/', '\\'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect::<Vec<_>>()
        .join("_")
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments from an object key.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// MockStorageService
///
/// Deterministic storage double for handler tests.
#[derive(Clone, Default)]
pub struct MockStorageService {
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn presigned_upload_url(&self, key: &str, _content_type: &str) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError::Presign("simulated failure".to_string()));
        }
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }
}

pub type StorageState = Arc<dyn StorageService>;
