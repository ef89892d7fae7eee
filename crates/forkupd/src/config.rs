//! TOML configuration and store selection for the `forkup` CLI.
//!
//! Values are layered once, here at the program boundary: command-line
//! flags (or their `FORKUP_*` environment variables) override the config
//! file, which overrides built-in defaults. Library crates only ever see the
//! resolved [`StoreTarget`], [`SyncConfig`] and [`RetryPolicy`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use forkup_engine::{NamespacePolicy, SyncConfig};
use forkup_store::{RetryPolicy, S3Config};
use forkup_types::{DigestAlgorithm, Namespace};
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Chunk store selection and credentials.
    pub store: StoreSection,
    /// Sync session tuning.
    pub sync: SyncSection,
    /// Store retry policy.
    pub retry: RetrySection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[store]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Store URI: `minio://host:port/bucket[/prefix]`, `s3://...`,
    /// `file:///dir` or `memory://`.
    pub uri: Option<String>,
    /// S3 endpoint, when not given in the URI.
    pub endpoint: Option<String>,
    /// S3 access key.
    pub access_key: Option<String>,
    /// S3 secret key.
    pub secret_key: Option<String>,
    /// S3 signing region.
    pub region: Option<String>,
    /// Use path-style bucket addressing (default true).
    pub path_style: Option<bool>,
    /// Global bucket name.
    pub bucket: Option<String>,
    /// Derive the bucket from each blob's file name instead.
    pub per_blob: bool,
}

/// `[sync]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Worker count; defaults to the available hardware parallelism.
    pub workers: Option<usize>,
    /// Verify chunk digests before upload (`"sha256"` or `"blake3"`).
    pub verify_digest: Option<DigestAlgorithm>,
    /// Publish the manifest under this prefix after a complete sync.
    pub manifest_prefix: Option<String>,
}

/// `[retry]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Retries after the first attempt.
    pub max_retries: Option<u32>,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: Option<u64>,
    /// Upper bound on a single delay, in milliseconds.
    pub max_delay_ms: Option<u64>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)
                    .with_context(|| format!("failed to parse {}", p.display()))?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Effective retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.retry.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: self
                .retry
                .initial_delay_ms
                .map_or(defaults.initial_delay, Duration::from_millis),
            max_delay: self
                .retry
                .max_delay_ms
                .map_or(defaults.max_delay, Duration::from_millis),
        }
    }
}

/// Default local store directory: `~/.forkup/store`.
pub fn default_store_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".forkup"))
        .unwrap_or_else(|| PathBuf::from(".forkup"))
        .join("store")
}

// -----------------------------------------------------------------------
// Store URIs
// -----------------------------------------------------------------------

/// A parsed `--store` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUri {
    /// An S3-compatible endpoint with optional bucket and manifest prefix.
    S3 {
        /// Endpoint URL including scheme.
        endpoint: String,
        /// Bucket (first path segment).
        bucket: Option<String>,
        /// Remaining path, used as the manifest prefix.
        prefix: Option<String>,
    },
    /// A local directory.
    File(PathBuf),
    /// An in-memory store that lives for one command.
    Memory,
}

impl FromStr for StoreUri {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .with_context(|| format!("store URI {s:?} has no scheme"))?;

        match scheme {
            "minio" | "s3" => {
                let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
                if host.is_empty() {
                    bail!("store URI {s:?} has no endpoint");
                }
                let http = if scheme == "minio" { "http" } else { "https" };
                let path = path.trim_matches('/');
                let (bucket, prefix) = match path.split_once('/') {
                    Some((bucket, prefix)) => (bucket, prefix),
                    None => (path, ""),
                };
                Ok(Self::S3 {
                    endpoint: format!("{http}://{host}"),
                    bucket: (!bucket.is_empty()).then(|| bucket.to_string()),
                    prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
                })
            }
            "file" => {
                if rest.is_empty() {
                    bail!("store URI {s:?} has no directory");
                }
                Ok(Self::File(PathBuf::from(rest)))
            }
            "memory" => Ok(Self::Memory),
            other => bail!("unsupported store scheme {other:?} (expected minio, s3, file or memory)"),
        }
    }
}

// -----------------------------------------------------------------------
// Resolution
// -----------------------------------------------------------------------

/// Store-related command-line overrides.
#[derive(Debug, Default, Clone)]
pub struct StoreOverrides {
    pub uri: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: Option<String>,
    pub per_blob: bool,
}

/// Sync-related command-line overrides.
#[derive(Debug, Default, Clone)]
pub struct SyncOverrides {
    pub workers: Option<usize>,
    pub verify_digest: Option<DigestAlgorithm>,
    pub manifest_prefix: Option<String>,
}

/// The backend a command should talk to.
#[derive(Debug, Clone)]
pub enum StoreTarget {
    S3(S3Config),
    File(PathBuf),
    Memory,
}

/// Everything a command needs to build its session.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub target: StoreTarget,
    pub sync: SyncConfig,
    pub retry: RetryPolicy,
}

impl CliConfig {
    /// Layer command-line overrides over this config.
    pub fn resolve(&self, store: &StoreOverrides, sync: &SyncOverrides) -> anyhow::Result<Resolved> {
        let uri = match store.uri.as_deref().or(self.store.uri.as_deref()) {
            Some(uri) => Some(uri.parse::<StoreUri>()?),
            None => None,
        };
        let endpoint = store.endpoint.clone().or_else(|| self.store.endpoint.clone());

        let mut uri_bucket = None;
        let mut uri_prefix = None;
        let target = match uri {
            Some(StoreUri::S3 {
                endpoint: uri_endpoint,
                bucket,
                prefix,
            }) => {
                uri_bucket = bucket;
                uri_prefix = prefix;
                StoreTarget::S3(self.s3_config(endpoint.unwrap_or(uri_endpoint), store)?)
            }
            Some(StoreUri::File(root)) => StoreTarget::File(root),
            Some(StoreUri::Memory) => StoreTarget::Memory,
            None => match endpoint {
                Some(endpoint) => StoreTarget::S3(self.s3_config(endpoint, store)?),
                None => StoreTarget::File(default_store_dir()),
            },
        };

        let namespace = if store.per_blob || self.store.per_blob {
            NamespacePolicy::PerBlob
        } else {
            match store
                .bucket
                .clone()
                .or(uri_bucket)
                .or_else(|| self.store.bucket.clone())
            {
                Some(bucket) => NamespacePolicy::Global(
                    Namespace::new(bucket.clone())
                        .with_context(|| format!("invalid bucket name {bucket:?}"))?,
                ),
                None => NamespacePolicy::default(),
            }
        };

        let sync = SyncConfig {
            workers: sync.workers.or(self.sync.workers),
            namespace,
            verify_digest: sync.verify_digest.or(self.sync.verify_digest),
            manifest_prefix: sync
                .manifest_prefix
                .clone()
                .or(uri_prefix)
                .or_else(|| self.sync.manifest_prefix.clone()),
        };

        Ok(Resolved {
            target,
            sync,
            retry: self.retry_policy(),
        })
    }

    fn s3_config(&self, endpoint: String, store: &StoreOverrides) -> anyhow::Result<S3Config> {
        let access_key = store
            .access_key
            .clone()
            .or_else(|| self.store.access_key.clone())
            .context("no S3 access key (use --access-key, FORKUP_S3_ACCESS_KEY or [store] access_key)")?;
        let secret_key = store
            .secret_key
            .clone()
            .or_else(|| self.store.secret_key.clone())
            .context("no S3 secret key (use --secret-key, FORKUP_S3_SECRET_KEY or [store] secret_key)")?;

        let mut config = S3Config::new(endpoint, access_key, secret_key);
        if let Some(region) = &self.store.region {
            config.region = region.clone();
        }
        if let Some(path_style) = self.store.path_style {
            config.force_path_style = path_style;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[store]
uri = "minio://localhost:9000/chunks/images"
access_key = "minioadmin"
secret_key = "miniosecret"
region = "eu-west-1"
path_style = true

[sync]
workers = 8
verify_digest = "blake3"
manifest_prefix = "disks"

[retry]
max_retries = 5
initial_delay_ms = 50
max_delay_ms = 2000

[log]
level = "debug"
"#;

        let config = CliConfig::from_toml(toml).unwrap();
        assert_eq!(config.store.uri.as_deref(), Some("minio://localhost:9000/chunks/images"));
        assert_eq!(config.store.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.sync.workers, Some(8));
        assert_eq!(config.sync.verify_digest, Some(DigestAlgorithm::Blake3));
        assert_eq!(config.log.level, "debug");

        let retry = config.retry_policy();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(50));
        assert_eq!(retry.max_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = CliConfig::from_toml("").unwrap();
        assert!(config.store.uri.is_none());
        assert!(!config.store.per_blob);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forkup.toml");
        std::fs::write(
            &path,
            r#"
[store]
uri = "file:///srv/chunks"
"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.store.uri.as_deref(), Some("file:///srv/chunks"));
        assert!(CliConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_store_uri_forms() {
        assert_eq!(
            "minio://localhost:9000/bucket/a/b".parse::<StoreUri>().unwrap(),
            StoreUri::S3 {
                endpoint: "http://localhost:9000".to_string(),
                bucket: Some("bucket".to_string()),
                prefix: Some("a/b".to_string()),
            }
        );
        assert_eq!(
            "s3://s3.example.com".parse::<StoreUri>().unwrap(),
            StoreUri::S3 {
                endpoint: "https://s3.example.com".to_string(),
                bucket: None,
                prefix: None,
            }
        );
        assert_eq!(
            "file:///tmp/store".parse::<StoreUri>().unwrap(),
            StoreUri::File(PathBuf::from("/tmp/store"))
        );
        assert_eq!("memory://".parse::<StoreUri>().unwrap(), StoreUri::Memory);

        assert!("localhost:9000".parse::<StoreUri>().is_err());
        assert!("ftp://host/x".parse::<StoreUri>().is_err());
        assert!("minio:///bucket".parse::<StoreUri>().is_err());
    }

    #[test]
    fn test_resolve_defaults_to_local_store() {
        let resolved = CliConfig::default()
            .resolve(&StoreOverrides::default(), &SyncOverrides::default())
            .unwrap();
        match resolved.target {
            StoreTarget::File(root) => assert_eq!(root, default_store_dir()),
            other => panic!("unexpected target: {other:?}"),
        }
        assert_eq!(resolved.sync.namespace, NamespacePolicy::default());
        assert!(resolved.sync.workers.is_none());
    }

    #[test]
    fn test_resolve_uri_sets_bucket_and_prefix() {
        let config = CliConfig::from_toml(
            r#"
[store]
access_key = "ak"
secret_key = "sk"
"#,
        )
        .unwrap();
        let store = StoreOverrides {
            uri: Some("minio://localhost:9000/my-chunks/images/disk".to_string()),
            ..StoreOverrides::default()
        };

        let resolved = config.resolve(&store, &SyncOverrides::default()).unwrap();
        match &resolved.target {
            StoreTarget::S3(s3) => {
                assert_eq!(s3.endpoint, "http://localhost:9000");
                assert_eq!(s3.access_key, "ak");
            }
            other => panic!("unexpected target: {other:?}"),
        }
        assert_eq!(
            resolved.sync.namespace,
            NamespacePolicy::Global(Namespace::new("my-chunks").unwrap())
        );
        assert_eq!(resolved.sync.manifest_prefix.as_deref(), Some("images/disk"));
    }

    #[test]
    fn test_flags_override_file() {
        let config = CliConfig::from_toml(
            r#"
[store]
uri = "file:///srv/chunks"
bucket = "from-file"

[sync]
workers = 2
"#,
        )
        .unwrap();
        let store = StoreOverrides {
            bucket: Some("from-flag".to_string()),
            ..StoreOverrides::default()
        };
        let sync = SyncOverrides {
            workers: Some(16),
            ..SyncOverrides::default()
        };

        let resolved = config.resolve(&store, &sync).unwrap();
        assert_eq!(
            resolved.sync.namespace,
            NamespacePolicy::Global(Namespace::new("from-flag").unwrap())
        );
        assert_eq!(resolved.sync.workers, Some(16));
    }

    #[test]
    fn test_per_blob_wins_over_bucket() {
        let store = StoreOverrides {
            bucket: Some("ignored".to_string()),
            per_blob: true,
            ..StoreOverrides::default()
        };
        let resolved = CliConfig::default()
            .resolve(&store, &SyncOverrides::default())
            .unwrap();
        assert_eq!(resolved.sync.namespace, NamespacePolicy::PerBlob);
    }

    #[test]
    fn test_s3_requires_credentials() {
        let store = StoreOverrides {
            uri: Some("minio://localhost:9000/chunks".to_string()),
            ..StoreOverrides::default()
        };
        let err = CliConfig::default()
            .resolve(&store, &SyncOverrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("access key"));
    }

    #[test]
    fn test_invalid_bucket_rejected() {
        let store = StoreOverrides {
            bucket: Some("Not_A_Bucket".to_string()),
            ..StoreOverrides::default()
        };
        assert!(
            CliConfig::default()
                .resolve(&store, &SyncOverrides::default())
                .is_err()
        );
    }
}
