use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./storage/uploads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./storage/outputs")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("./storage/archives")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
            archive_dir: default_archive_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./storage/bulkconv.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// How the external renderer is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the renderer's own flags.
    #[serde(default)]
    pub program_args: Vec<String>,
    #[serde(default = "default_target_format")]
    pub target_format: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Give every invocation its own LibreOffice user profile.
    #[serde(default = "default_true")]
    pub isolated_profile: bool,
}

fn default_program() -> String {
    "libreoffice".to_string()
}

fn default_target_format() -> String {
    "pdf".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl ConverterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            program_args: Vec::new(),
            target_format: default_target_format(),
            timeout_secs: default_timeout_secs(),
            isolated_profile: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_files_per_job")]
    pub max_files_per_job: usize,
    /// Per-file upload limit in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_max_files_per_job() -> usize {
    1000
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["docx".to_string()]
}

impl LimitsConfig {
    /// Case-insensitive extension check on a filename.
    pub fn allows(&self, filename: &str) -> bool {
        let Some((_, ext)) = filename.rsplit_once('.') else {
            return false;
        };
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files_per_job: default_max_files_per_job(),
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Conversions allowed to run at once inside a single job.
    #[serde(default = "default_file_concurrency")]
    pub file_concurrency: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_file_concurrency() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            file_concurrency: default_file_concurrency(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
