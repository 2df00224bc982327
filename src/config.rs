use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PIPELINE_COUNT: u64 = 256;

/// Configuration for the pipeline-assignment coordinator.
///
/// Read once at startup; nothing here is reloadable at runtime.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Size of the fixed pipeline universe (`0..pipeline_count`).
    pub pipeline_count: u64,
    /// Timeout for each remote call to a synchronizer.
    pub request_timeout_ms: u64,
    /// Pause inserted before every dispatch attempt.
    pub retry_interval_ms: u64,
    /// Pipelines unowned for longer than this are reported at warn level.
    pub unassigned_warn_after_ms: u64,
    /// SQLite database holding synchronizer records.
    pub store_path: PathBuf,
    /// Bind address of the admin HTTP API.
    pub api_addr: SocketAddr,
    /// gRPC endpoint template; `{id}` is replaced by the synchronizer ID.
    pub synchronizer_endpoint: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pipeline_count: DEFAULT_PIPELINE_COUNT,
            request_timeout_ms: 10_000,
            retry_interval_ms: 10,
            unassigned_warn_after_ms: 30_000,
            store_path: PathBuf::from("./datastore/controller.db"),
            api_addr: SocketAddr::from(([127, 0, 0, 1], 44444)),
            synchronizer_endpoint: "http://{id}:7100".to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn new(pipeline_count: u64) -> Self {
        Self {
            pipeline_count,
            ..Default::default()
        }
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    pub fn with_retry_interval_ms(mut self, ms: u64) -> Self {
        self.retry_interval_ms = ms;
        self
    }

    pub fn with_unassigned_warn_after_ms(mut self, ms: u64) -> Self {
        self.unassigned_warn_after_ms = ms;
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn unassigned_warn_after(&self) -> Duration {
        Duration::from_millis(self.unassigned_warn_after_ms)
    }
}
