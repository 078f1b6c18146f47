//! Request logging
//!
//! Optional JSON-lines log of every decoded request and transmitted reply,
//! keyed by `(nas_ip, nas_port, request_id)`. Intended for compliance and
//! post-incident analysis; per-packet tracing for operators goes through
//! `tracing` instead.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::error;

/// Direction of the logged packet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogDirection {
    Request,
    Reply,
}

/// One request-log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    /// Timestamp (Unix epoch seconds)
    pub timestamp: u64,
    pub direction: LogDirection,
    pub nas_ip: String,
    pub nas_port: u16,
    pub request_id: u8,
    /// Packet command as wire code
    pub command: u8,
    /// Packet size in bytes
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RequestLogEntry {
    pub fn new(
        direction: LogDirection,
        sender: (IpAddr, u16, u8),
        command: u8,
        length: usize,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        RequestLogEntry {
            timestamp,
            direction,
            nas_ip: sender.0.to_string(),
            nas_port: sender.1,
            request_id: sender.2,
            command,
            length,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Append-only request logger
pub struct RequestLogger {
    file_path: Option<String>,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl RequestLogger {
    /// Create a logger; `None` disables logging entirely
    pub fn new(file_path: Option<String>) -> std::io::Result<Self> {
        let file = if let Some(ref path) = file_path {
            let f = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Arc::new(Mutex::new(f)))
        } else {
            None
        };

        Ok(RequestLogger { file_path, file })
    }

    /// A disabled logger, for servers without a configured log path
    pub fn disabled() -> Self {
        RequestLogger {
            file_path: None,
            file: None,
        }
    }

    /// Append one entry; errors are reported through tracing, never
    /// propagated into the packet path
    pub async fn write_request(&self, entry: RequestLogEntry) {
        if let Some(ref file) = self.file {
            match serde_json::to_string(&entry) {
                Ok(json) => {
                    let mut f = file.lock().await;
                    if let Err(e) = writeln!(f, "{}", json) {
                        error!("Failed to write request log: {}", e);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize request log entry: {}", e);
                }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_write_request_appends_json_lines() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_string_lossy().to_string();
        let logger = RequestLogger::new(Some(path.clone())).unwrap();
        assert!(logger.is_enabled());

        let sender = ("192.168.1.1".parse().unwrap(), 50000, 7);
        logger
            .write_request(RequestLogEntry::new(LogDirection::Request, sender, 1, 38))
            .await;
        logger
            .write_request(
                RequestLogEntry::new(LogDirection::Reply, sender, 2, 20).with_detail("accept"),
            )
            .await;

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: RequestLogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.direction, LogDirection::Request);
        assert_eq!(first.request_id, 7);
        assert_eq!(first.command, 1);

        let second: RequestLogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.detail.as_deref(), Some("accept"));
    }

    #[tokio::test]
    async fn test_disabled_logger_is_silent() {
        let logger = RequestLogger::disabled();
        assert!(!logger.is_enabled());
        assert!(logger.file_path().is_none());

        let sender = ("10.0.0.1".parse().unwrap(), 1, 1);
        logger
            .write_request(RequestLogEntry::new(LogDirection::Request, sender, 4, 20))
            .await;
    }
}
