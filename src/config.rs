//! Configuration for the datas3t service.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Catalog database URL, e.g. `sqlite://datas3t.db` or a postgres DSN.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// S3-compatible object store the bulk bytes live in.
    #[serde(default)]
    pub s3: S3Config,

    /// Directory for staged temp files (tar uploads, multipart parts).
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// How long a compacted-away datarange's objects wait before the
    /// deletion worker is allowed to remove them (§4.5, §7).
    #[serde(default = "default_compaction_grace", with = "duration_secs")]
    pub compaction_grace: Duration,

    /// Deletion worker tuning (§4.7).
    #[serde(default)]
    pub deletion_worker: DeletionWorkerConfig,

    /// Multipart upload staleness TTL (§4.6).
    #[serde(default = "default_multipart_ttl", with = "duration_secs")]
    pub multipart_upload_ttl: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 endpoint URL (MinIO, LocalStack, or a custom S3-compatible service).
    /// If not specified, uses the AWS default endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bucket the service reads/writes dataranges and sidecars in.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Use path-style URLs (required for MinIO, LocalStack).
    #[serde(default = "default_force_path_style")]
    pub force_path_style: bool,

    /// Static credentials (optional — falls back to the default credential chain).
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: default_bucket(),
            region: default_region(),
            force_path_style: default_force_path_style(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionWorkerConfig {
    #[serde(default = "default_min_interval", with = "duration_secs")]
    pub min_interval: Duration,
    #[serde(default = "default_max_interval", with = "duration_secs")]
    pub max_interval: Duration,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

impl Default for DeletionWorkerConfig {
    fn default() -> Self {
        Self {
            min_interval: default_min_interval(),
            max_interval: default_max_interval(),
            batch_size: default_batch_size(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:9000".parse().unwrap()
}

fn default_database_url() -> String {
    "sqlite://datas3t.db".to_string()
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_compaction_grace() -> Duration {
    Duration::from_secs(300)
}

fn default_multipart_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_min_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_batch_size() -> i64 {
    100
}

fn default_bucket() -> String {
    "datas3t".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_force_path_style() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            database_url: default_database_url(),
            s3: S3Config::default(),
            uploads_dir: default_uploads_dir(),
            compaction_grace: default_compaction_grace(),
            deletion_worker: DeletionWorkerConfig::default(),
            multipart_upload_ttl: default_multipart_ttl(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("DATAS3T_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.listen_addr = parsed;
            }
        }
        if let Ok(url) = std::env::var("DATAS3T_DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(bucket) = std::env::var("DATAS3T_S3_BUCKET") {
            config.s3.bucket = bucket;
        }
        if let Ok(endpoint) = std::env::var("DATAS3T_S3_ENDPOINT") {
            config.s3.endpoint = Some(endpoint);
        }
        if let Ok(region) = std::env::var("DATAS3T_S3_REGION") {
            config.s3.region = region;
        }
        if let Ok(v) = std::env::var("DATAS3T_S3_FORCE_PATH_STYLE") {
            config.s3.force_path_style = v == "true" || v == "1";
        }
        config.s3.access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok();
        config.s3.secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok();

        if let Ok(dir) = std::env::var("DATAS3T_UPLOADS_DIR") {
            config.uploads_dir = PathBuf::from(dir);
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("DATAS3T_CONFIG") {
            if let Ok(config) = Self::from_file(&path) {
                return config;
            }
        }

        for path in &["datas3t.toml", "/etc/datas3t/config.toml"] {
            if std::path::Path::new(path).exists() {
                if let Ok(config) = Self::from_file(path) {
                    return config;
                }
            }
        }

        Self::from_env()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
