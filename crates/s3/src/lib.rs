use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// Provider code S3 returns when a bucket has no default encryption
/// configuration.
pub const ENCRYPTION_NOT_FOUND: &str = "ServerSideEncryptionConfigurationNotFoundError";

#[derive(Error, Debug, Clone)]
pub enum AuditError {
    #[error("{code}: {message}")]
    Service { code: String, message: String },
    #[error("connectivity failure: {0}")]
    Connectivity(String),
}

/// Default encryption state of one bucket. `Absent` is a distinct outcome,
/// not an error: the attribute-fetch call succeeded in telling us the
/// configuration does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketEncryption {
    Configured,
    Absent,
}

/// Remote bucket enumeration and attribute-fetch collaborator.
#[async_trait]
pub trait BucketStore: Send + Sync {
    async fn bucket_names(&self) -> Result<Vec<String>, AuditError>;
    async fn encryption(&self, bucket: &str) -> Result<BucketEncryption, AuditError>;
}

/// Production store backed by the S3 ListBuckets and GetBucketEncryption APIs.
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BucketStore for S3Store {
    async fn bucket_names(&self) -> Result<Vec<String>, AuditError> {
        let out = self.client.list_buckets().send().await.map_err(classify)?;
        Ok(out
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name().map(str::to_string))
            .collect())
    }

    async fn encryption(&self, bucket: &str) -> Result<BucketEncryption, AuditError> {
        match self.client.get_bucket_encryption().bucket(bucket).send().await {
            Ok(_) => Ok(BucketEncryption::Configured),
            Err(err) => service_outcome(classify(err)),
        }
    }
}

fn classify<E>(err: aws_sdk_s3::error::SdkError<E>) -> AuditError
where
    E: aws_sdk_s3::error::ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match err.as_service_error() {
        Some(svc) => AuditError::Service {
            code: svc.code().unwrap_or("Unknown").to_string(),
            message: svc.message().unwrap_or("no message").to_string(),
        },
        None => AuditError::Connectivity(err.to_string()),
    }
}

/// Maps the "configuration not found" provider code to `Absent`; every other
/// failure stays an error.
fn service_outcome(err: AuditError) -> Result<BucketEncryption, AuditError> {
    match err {
        AuditError::Service { ref code, .. } if code == ENCRYPTION_NOT_FOUND => {
            Ok(BucketEncryption::Absent)
        }
        other => Err(other),
    }
}

/// True iff the bucket has a default encryption configuration. Errors other
/// than the "not found" code propagate to the caller.
pub async fn is_bucket_encrypted(store: &dyn BucketStore, bucket: &str) -> Result<bool, AuditError> {
    Ok(matches!(store.encryption(bucket).await?, BucketEncryption::Configured))
}

/// Enumerates all buckets and returns the names of those without default
/// encryption. Enumeration failure is a hard error. A bucket whose attribute
/// fetch fails (e.g. AccessDenied) is logged and skipped; it is counted
/// neither encrypted nor unencrypted.
pub async fn list_unencrypted_buckets(store: &dyn BucketStore) -> Result<Vec<String>, AuditError> {
    let names = store.bucket_names().await?;
    let mut unencrypted = Vec::new();
    for name in names {
        match is_bucket_encrypted(store, &name).await {
            Ok(true) => {}
            Ok(false) => unencrypted.push(name),
            Err(err) => {
                warn!(bucket = %name, error = %err, "skipping bucket");
            }
        }
    }
    Ok(unencrypted)
}
