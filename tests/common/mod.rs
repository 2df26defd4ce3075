//! Shared test infrastructure: an ephemeral MinIO container (via
//! testcontainers) and a `TestServer` that spawns the real `datas3t` binary
//! against it.

#![allow(dead_code)]

use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use tempfile::TempDir;
use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::minio::MinIO;
use tokio::sync::OnceCell;
use tokio::time::sleep;

pub const MINIO_ACCESS_KEY: &str = "minioadmin";
pub const MINIO_SECRET_KEY: &str = "minioadmin";
pub const TEST_BUCKET: &str = "datas3t-test";

static PORT_COUNTER: AtomicU16 = AtomicU16::new(19100);

/// Shared MinIO container for every test in the binary. Static values are
/// never dropped, so the container outlives the test process; acceptable
/// here since `docker`'s own lifecycle reaping (or CI teardown) cleans it up,
/// and the alternative (one container per test) would dominate wall-clock.
static MINIO_CONTAINER: OnceCell<ContainerAsync<MinIO>> = OnceCell::const_new();

pub fn docker_available() -> bool {
    Command::new("docker")
        .arg("version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[macro_export]
macro_rules! skip_unless_docker {
    () => {
        if !common::docker_available() {
            eprintln!("Docker not available, skipping test");
            return;
        }
    };
}

/// Starts (once) the shared MinIO container and returns its endpoint URL.
pub async fn minio_endpoint() -> String {
    let container = MINIO_CONTAINER
        .get_or_init(|| async { MinIO::default().start().await.expect("failed to start MinIO container") })
        .await;

    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(9000.tcp()).await.unwrap();
    format!("http://{host}:{port}")
}

async fn minio_client(endpoint: &str) -> Client {
    let credentials = Credentials::new(MINIO_ACCESS_KEY, MINIO_SECRET_KEY, None, None, "test");
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .endpoint_url(endpoint)
        .credentials_provider(credentials)
        .force_path_style(true)
        .build();
    Client::from_conf(config)
}

pub async fn ensure_bucket(endpoint: &str) {
    let client = minio_client(endpoint).await;
    let _ = client.create_bucket().bucket(TEST_BUCKET).send().await;
}

/// Spawns the real `datas3t` binary against a temp sqlite file and the
/// shared MinIO container, waiting for `/healthy` before returning.
pub struct TestServer {
    process: Child,
    pub base_url: String,
    _db_dir: TempDir,
    uploads_dir: TempDir,
}

impl TestServer {
    /// The staged-uploads directory this server was started with, so tests
    /// can assert temp files (staged tars, multipart parts) don't outlive
    /// the request that created them.
    pub fn uploads_dir_path(&self) -> &std::path::Path {
        self.uploads_dir.path()
    }

    pub async fn start() -> Self {
        let endpoint = minio_endpoint().await;
        ensure_bucket(&endpoint).await;

        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let db_dir = TempDir::new().expect("temp dir");
        let uploads_dir = TempDir::new().expect("temp dir");
        let db_path = db_dir.path().join("catalog.db");

        let process = Command::new(env!("CARGO_BIN_EXE_datas3t"))
            .env("DATAS3T_LISTEN_ADDR", format!("127.0.0.1:{port}"))
            .env("DATAS3T_DATABASE_URL", format!("sqlite://{}", db_path.display()))
            .env("DATAS3T_UPLOADS_DIR", uploads_dir.path())
            .env("DATAS3T_S3_ENDPOINT", &endpoint)
            .env("DATAS3T_S3_BUCKET", TEST_BUCKET)
            .env("DATAS3T_S3_REGION", "us-east-1")
            .env("DATAS3T_S3_FORCE_PATH_STYLE", "true")
            .env("AWS_ACCESS_KEY_ID", MINIO_ACCESS_KEY)
            .env("AWS_SECRET_ACCESS_KEY", MINIO_SECRET_KEY)
            .env("RUST_LOG", "datas3t=warn")
            .spawn()
            .expect("failed to start datas3t server");

        let mut server = Self {
            process,
            base_url: format!("http://127.0.0.1:{port}"),
            _db_dir: db_dir,
            uploads_dir,
        };
        server.wait_ready().await;
        server
    }

    async fn wait_ready(&mut self) {
        let client = reqwest::Client::new();
        for _ in 0..100 {
            if let Ok(resp) = client.get(format!("{}/healthy", self.base_url)).send().await {
                if resp.status().is_success() {
                    return;
                }
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("datas3t server did not become ready in time");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// A minimal USTAR entry: 512-byte header + content + zero padding to the
/// next 512-byte boundary. Entry names follow the `{key:020}.ext` convention
/// the ingest pipeline requires.
pub fn tar_entry(name: &str, content: &[u8]) -> Vec<u8> {
    let mut header = [0u8; 512];
    header[0..name.len()].copy_from_slice(name.as_bytes());
    let size_field = format!("{:011o}\0", content.len());
    header[124..124 + size_field.len()].copy_from_slice(size_field.as_bytes());
    header[156] = b'0';
    header[257..262].copy_from_slice(b"ustar");
    header[148..156].copy_from_slice(b"        ");

    let mut buf = header.to_vec();
    buf.extend_from_slice(content);
    let pad = (512 - content.len() % 512) % 512;
    buf.extend(std::iter::repeat(0u8).take(pad));
    buf
}

/// Builds a full tar archive (entries + the trailing two zero blocks) out of
/// `(datapoint_key, content)` pairs.
pub fn build_tar(entries: &[(u64, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (key, content) in entries {
        buf.extend_from_slice(&tar_entry(&format!("{key:020}.json"), content));
    }
    buf.extend(std::iter::repeat(0u8).take(1024));
    buf
}
