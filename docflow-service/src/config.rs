//! Service configuration.
//!
//! Loaded once at startup from an optional `config` file and `DOCFLOW__*`
//! environment variables. See [`loader`].

mod loader;

pub use loader::load_config;

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_ocr")]
    pub ocr: OcrConfig,

    #[serde(default = "default_workflow")]
    pub workflow: WorkflowConfig,

    #[serde(default = "default_extraction")]
    pub extraction: ExtractionConfig,

    #[serde(default = "default_upload")]
    pub upload: UploadConfig,

    #[serde(default = "default_aws")]
    pub aws: AwsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which object storage implementation to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Buckets are directories under `root_dir`
    Fs,
    /// Path-style S3-compatible HTTP endpoint
    Http,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    #[serde(default = "default_storage_root")]
    pub root_dir: PathBuf,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// OCR (document analysis) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_ocr_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Seconds between job status queries
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Give up after this many status queries. Unset means poll until the
    /// job leaves IN_PROGRESS or the caller cancels.
    #[serde(default)]
    pub max_polls: Option<u32>,

    #[serde(default = "default_feature_types")]
    pub feature_types: Vec<String>,
}

impl OcrConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Which workflow engine starts and sequences ingestion runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEngineKind {
    /// In-process state machine
    Local,
    /// Remote Step Functions compatible endpoint
    StepFunctions,
}

/// Workflow engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow_engine")]
    pub engine: WorkflowEngineKind,

    #[serde(default)]
    pub state_machine_arn: Option<String>,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Per-step timeout enforced by the local engine
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Finished executions the local engine keeps for lookups
    #[serde(default = "default_retained_executions")]
    pub retained_executions: usize,
}

impl WorkflowConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// The configured ARN, falling back to the name the local engine uses.
    pub fn state_machine_arn(&self) -> String {
        self.state_machine_arn
            .clone()
            .unwrap_or_else(default_state_machine_arn)
    }
}

/// Page image extraction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    #[serde(default = "default_dpi")]
    pub dpi: f32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Upload endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_bucket")]
    pub bucket: String,

    /// Leading `tenant/collection/index` segments of every uploaded key
    #[serde(default = "default_upload_base_path")]
    pub base_path: String,

    /// Synthesize an object-created notification after each upload
    #[serde(default = "default_upload_notify")]
    pub notify: bool,
}

/// Credentials for the remote OCR and workflow endpoints.
///
/// Requests go out unsigned unless both keys are set.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default)]
    pub session_token: Option<String>,
}

impl AwsConfig {
    pub fn region(&self) -> String {
        self.region.clone().unwrap_or_else(default_aws_region)
    }
}

// ==================== Default Value Functions ====================

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        backend: default_storage_backend(),
        root_dir: default_storage_root(),
        endpoint: None,
        request_timeout_secs: default_request_timeout_secs(),
    }
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Fs
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/buckets")
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_ocr() -> OcrConfig {
    OcrConfig {
        endpoint: default_ocr_endpoint(),
        request_timeout_secs: default_ocr_timeout_secs(),
        poll_interval_secs: default_poll_interval_secs(),
        max_polls: None,
        feature_types: default_feature_types(),
    }
}

fn default_ocr_endpoint() -> String {
    "http://localhost:4566".to_string()
}

fn default_ocr_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_feature_types() -> Vec<String> {
    vec!["TABLES".to_string()]
}

fn default_workflow() -> WorkflowConfig {
    WorkflowConfig {
        engine: default_workflow_engine(),
        state_machine_arn: None,
        endpoint: None,
        request_timeout_secs: default_request_timeout_secs(),
        step_timeout_secs: default_step_timeout_secs(),
        retained_executions: default_retained_executions(),
    }
}

fn default_workflow_engine() -> WorkflowEngineKind {
    WorkflowEngineKind::Local
}

fn default_step_timeout_secs() -> u64 {
    900
}

fn default_retained_executions() -> usize {
    1000
}

fn default_state_machine_arn() -> String {
    "arn:local:states:document-orchestrator".to_string()
}

fn default_extraction() -> ExtractionConfig {
    ExtractionConfig {
        scratch_dir: default_scratch_dir(),
        dpi: default_dpi(),
        jpeg_quality: default_jpeg_quality(),
    }
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("docflow")
}

fn default_dpi() -> f32 {
    200.0
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_upload() -> UploadConfig {
    UploadConfig {
        bucket: default_upload_bucket(),
        base_path: default_upload_base_path(),
        notify: default_upload_notify(),
    }
}

fn default_upload_bucket() -> String {
    "documents".to_string()
}

fn default_upload_base_path() -> String {
    "tenants/public/default".to_string()
}

fn default_upload_notify() -> bool {
    true
}

fn default_aws() -> AwsConfig {
    AwsConfig {
        region: None,
        access_key_id: None,
        secret_access_key: None,
        session_token: None,
    }
}

fn default_aws_region() -> String {
    "us-east-1".to_string()
}
