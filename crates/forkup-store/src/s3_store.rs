//! S3-compatible chunk storage backend (MinIO, AWS S3).
//!
//! Namespaces map onto buckets. Connection settings are explicit; nothing
//! here reads the environment.

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use bytes::Bytes;
use forkup_types::Namespace;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::traits::ChunkStore;

const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for an S3-compatible endpoint.
#[derive(Clone)]
pub struct S3Config {
    /// Endpoint URL, e.g. `http://localhost:9000`. A bare `host:port` is
    /// treated as plain HTTP.
    pub endpoint: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Signing region. MinIO accepts any value.
    pub region: String,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`.
    pub force_path_style: bool,
}

impl S3Config {
    /// Settings for `endpoint` with the default region and path-style addressing.
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: DEFAULT_REGION.to_string(),
            force_path_style: true,
        }
    }

    /// The endpoint with a scheme, defaulting to `http://`.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

/// Chunk store backed by an S3-compatible object store.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    region: String,
}

impl S3Store {
    /// Build a client for the configured endpoint.
    ///
    /// No request is made here; connectivity problems surface on the first
    /// operation.
    pub async fn connect(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "forkup",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .build();

        debug!(endpoint = %config.endpoint_url(), region = %config.region, "configured s3 client");
        Self {
            client: Client::from_conf(s3_config),
            region: config.region,
        }
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }
}

fn backend_error<E>(operation: &'static str, err: E) -> StoreError
where
    E: std::error::Error + 'static,
{
    StoreError::Backend {
        operation,
        message: DisplayErrorContext(&err).to_string(),
    }
}

#[async_trait::async_trait]
impl ChunkStore for S3Store {
    async fn ensure_namespace(&self, namespace: &Namespace) -> Result<(), StoreError> {
        match self.client.head_bucket().bucket(namespace.as_str()).send().await {
            Ok(_) => return Ok(()),
            Err(err) => {
                let missing =
                    matches!(&err, SdkError::ServiceError(e) if e.err().is_not_found());
                if !missing {
                    return Err(backend_error("head_bucket", err));
                }
            }
        }

        let mut request = self.client.create_bucket().bucket(namespace.as_str());
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(%namespace, "created bucket");
                Ok(())
            }
            // Another session created it between our check and create.
            Err(SdkError::ServiceError(e))
                if e.err().is_bucket_already_owned_by_you()
                    || e.err().is_bucket_already_exists() =>
            {
                Ok(())
            }
            Err(err) => Err(backend_error("create_bucket", err)),
        }
    }

    async fn exists(&self, namespace: &Namespace, key: &str) -> Result<bool, StoreError> {
        match self
            .client
            .head_object()
            .bucket(namespace.as_str())
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(e)) if e.err().is_not_found() => Ok(false),
            Err(err) => Err(backend_error("head_object", err)),
        }
    }

    async fn put(&self, namespace: &Namespace, key: &str, data: Bytes) -> Result<(), StoreError> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(namespace.as_str())
            .key(key)
            .content_length(size as i64)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| backend_error("put_object", err))?;
        debug!(%namespace, key, size, "stored object in s3");
        Ok(())
    }

    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Bytes, StoreError> {
        let output = match self
            .client
            .get_object()
            .bucket(namespace.as_str())
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(SdkError::ServiceError(e)) if e.err().is_no_such_key() => {
                return Err(StoreError::NotFound {
                    namespace: namespace.clone(),
                    key: key.to_owned(),
                });
            }
            Err(err) => return Err(backend_error("get_object", err)),
        };
        let body = output
            .body
            .collect()
            .await
            .map_err(|err| backend_error("get_object", err))?;
        Ok(body.into_bytes())
    }

    async fn size(&self, namespace: &Namespace, key: &str) -> Result<u64, StoreError> {
        match self
            .client
            .head_object()
            .bucket(namespace.as_str())
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(u64::try_from(output.content_length().unwrap_or_default()).unwrap_or(0)),
            Err(SdkError::ServiceError(e)) if e.err().is_not_found() => Err(StoreError::NotFound {
                namespace: namespace.clone(),
                key: key.to_owned(),
            }),
            Err(err) => Err(backend_error("head_object", err)),
        }
    }
}
