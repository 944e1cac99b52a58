//! Audit trail of privileged operations
//!
//! Every rule change, annotation change, reload and reset is appended to
//! `<state_dir>/audit.log` as one JSON object per line. The log rolls over to
//! `audit.log.1` once it passes [`DEFAULT_MAX_BYTES`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Size at which the log is rotated
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AddRule,
    EditRule,
    DeleteRule,
    Annotate,
    Reload,
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the operation finished (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Kind of operation
    pub event_type: EventType,
    /// Whether ufw (or the annotation save) succeeded
    pub success: bool,
    /// Real uid of the ufwm process (ufw itself may run as root)
    #[serde(default)]
    pub uid: u32,
    /// Positions, rule text, the ufw command line
    pub details: serde_json::Value,
    /// Error message when `success` is false
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            uid: nix::unistd::getuid().as_raw(),
            details,
            error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    log_path: PathBuf,
    max_bytes: u64,
}

impl AuditLog {
    /// Audit log at `<state_dir>/audit.log`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let state_dir = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        Ok(Self::at(state_dir.join("audit.log")))
    }

    pub fn at(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn rotated_path(&self) -> PathBuf {
        let mut name = self.log_path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    /// Appends `event` as one JSON line, rotating first if the log is full.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the log cannot be rotated, opened or written
    pub async fn log(&self, event: AuditEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        if let Ok(meta) = tokio::fs::metadata(&self.log_path).await
            && meta.len() + line.len() as u64 > self.max_bytes
        {
            tokio::fs::rename(&self.log_path, self.rotated_path()).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await
    }

    /// Records an outcome; a failed write is logged and otherwise ignored.
    pub async fn record(
        &self,
        event_type: EventType,
        details: serde_json::Value,
        error: Option<String>,
    ) {
        let event = AuditEvent::new(event_type, error.is_none(), details, error);
        if let Err(e) = self.log(event).await {
            tracing::warn!("Failed to write audit log {}: {e}", self.log_path.display());
        }
    }

    /// Up to `count` most recent events from the current log, newest first.
    /// Unparseable lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the log cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;
        Ok(content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect())
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}
