//! Routing log
//!
//! One [`RoutingLogEntry`] is produced per call attempt and handed to a
//! [`RoutingLogSink`]. Sinks are infallible and must not block: the file sink
//! writes through a `tracing-appender` non-blocking worker, so a slow or
//! failing disk never reaches the request path.

use crate::category::TaskCategory;
use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use uuid::Uuid;

/// Record of one routed call attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingLogEntry {
    /// Shared by every attempt of one routed request
    pub request_id: Uuid,
    /// Time the attempt finished
    pub ts: DateTime<Utc>,
    /// Category of this step of the fallback chain
    pub task_type: TaskCategory,
    /// Prompt length in characters
    pub input_length: usize,
    /// Classifier keywords that decided the category
    pub matched_keywords: Vec<String>,
    /// Endpoint called (or rejected by its breaker)
    pub endpoint: String,
    /// Whether a fallback was involved
    pub fallback_used: bool,
    /// Endpoint the fallback moved away from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<String>,
    /// Error classification of a failed attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Attempt latency
    pub latency_ms: u64,
    /// 1-based position in the fallback chain
    pub attempt: usize,
}

/// Destination for routing log entries
pub trait RoutingLogSink: Send + Sync {
    /// Append one entry; never blocks on I/O and never fails
    fn append(&self, entry: &RoutingLogEntry);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRoutingLog;

impl RoutingLogSink for NullRoutingLog {
    fn append(&self, _entry: &RoutingLogEntry) {}
}

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryRoutingLog {
    entries: Mutex<Vec<RoutingLogEntry>>,
}

impl MemoryRoutingLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries appended so far
    #[must_use]
    pub fn entries(&self) -> Vec<RoutingLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RoutingLogSink for MemoryRoutingLog {
    fn append(&self, entry: &RoutingLogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
    }
}

/// Appends one JSON object per line to a file
pub struct JsonlRoutingLog {
    writer: NonBlocking,
    _guard: WorkerGuard,
}

impl std::fmt::Debug for JsonlRoutingLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlRoutingLog").finish_non_exhaustive()
    }
}

impl JsonlRoutingLog {
    /// Open (or create) `path` for appending
    pub fn open(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Config(format!("invalid routing log path {}", path.display())))?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(dir)
            .map_err(|e| Error::Config(format!("cannot open routing log {}: {e}", path.display())))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        Ok(Self {
            writer,
            _guard: guard,
        })
    }
}

impl RoutingLogSink for JsonlRoutingLog {
    fn append(&self, entry: &RoutingLogEntry) {
        let Ok(mut line) = serde_json::to_string(entry) else {
            return;
        };
        line.push('\n');
        // The non-blocking writer drops the line when its buffer is full
        let mut writer = self.writer.clone();
        let _ = writer.write_all(line.as_bytes());
    }
}

/// Sink selected by the logging configuration
pub fn open_routing_log(config: &LoggingConfig) -> Result<Arc<dyn RoutingLogSink>> {
    if config.routing_log {
        Ok(Arc::new(JsonlRoutingLog::open(&config.routing_log_path)?))
    } else {
        Ok(Arc::new(NullRoutingLog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> RoutingLogEntry {
        RoutingLogEntry {
            request_id: Uuid::new_v4(),
            ts: Utc::now(),
            task_type: TaskCategory::ReasonStrict,
            input_length: 120,
            matched_keywords: vec!["formal".to_string()],
            endpoint: "deepseek/deepseek-v3.2".to_string(),
            fallback_used: true,
            fallback_from: Some("deepseek/deepseek-v3.2".to_string()),
            error_type: Some("server_error".to_string()),
            latency_ms: 42,
            attempt: 1,
        }
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let json = serde_json::to_value(entry()).unwrap();
        assert_eq!(json["taskType"], "reason_strict");
        assert_eq!(json["inputLength"], 120);
        assert_eq!(json["matchedKeywords"][0], "formal");
        assert_eq!(json["fallbackUsed"], true);
        assert_eq!(json["errorType"], "server_error");
        assert_eq!(json["latencyMs"], 42);
        assert!(json["ts"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_success_entry_omits_error_fields() {
        let mut e = entry();
        e.fallback_used = false;
        e.fallback_from = None;
        e.error_type = None;
        let json = serde_json::to_value(e).unwrap();
        assert!(json.get("fallbackFrom").is_none());
        assert!(json.get("errorType").is_none());
    }

    #[test]
    fn test_memory_log() {
        let log = MemoryRoutingLog::new();
        log.append(&entry());
        log.append(&entry());
        assert_eq!(log.entries().len(), 2);
    }

    #[test]
    fn test_disabled_config_opens_null_sink() {
        let sink = open_routing_log(&LoggingConfig::default());
        assert!(sink.is_ok());
    }

    #[test]
    fn test_jsonl_log_writes_lines() {
        let dir = std::env::temp_dir().join(format!("clawroute-log-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("routing.log");

        let log = JsonlRoutingLog::open(&path).unwrap();
        log.append(&entry());
        log.append(&entry());
        // Dropping the guard flushes the worker
        drop(log);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["endpoint"], "deepseek/deepseek-v3.2");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
