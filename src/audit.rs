//! Audit logging for key lifecycle events
//!
//! Provides a structured trail of security-relevant events: key generation,
//! current-key resolution and JWKS publication. Audit sinks are best effort;
//! the service logs a failing sink and carries on.

use crate::{Algorithm, KeyUse};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Types of auditable events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum AuditEvent {
    /// A new key was generated and saved
    KeyGenerated {
        /// The ID of the new key
        key_id: String,
        /// The algorithm of the new key
        algorithm: Algorithm,
        /// Slot the key belongs to
        key_use: KeyUse,
        /// Whether generation was triggered by a missing or expired current key
        rotation: bool,
    },

    /// The stored current key was handed out
    CurrentKeyResolved {
        /// The ID of the current key
        key_id: String,
        /// Slot the key belongs to
        key_use: KeyUse,
    },

    /// Public keys were read for publication
    PublicKeysPublished {
        /// Slot that was queried; `None` for a merged key set
        key_use: Option<KeyUse>,
        /// Number of keys returned
        count: usize,
    },

    /// Error occurred
    ErrorOccurred {
        /// The operation that was being performed
        operation: String,
        /// The error code
        error_type: String,
        /// Detailed error message
        message: String,
    },
}

/// Audit log entry with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// When the event occurred
    pub timestamp: SystemTime,

    /// The event details
    #[serde(flatten)]
    pub event: AuditEvent,

    /// Optional context/metadata
    pub context: Option<String>,
}

impl AuditLogEntry {
    /// Create a new audit log entry
    pub fn new(event: AuditEvent) -> Self {
        Self {
            timestamp: SystemTime::now(),
            event,
            context: None,
        }
    }

    /// Add context to the log entry
    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Trait for audit logging backends
pub trait AuditLogger: Send {
    /// Log an audit event
    fn log(&mut self, entry: AuditLogEntry) -> crate::Result<()>;

    /// Flush any buffered logs
    fn flush(&mut self) -> crate::Result<()>;
}

/// No-op logger for when auditing is disabled
pub struct NoOpLogger;

impl AuditLogger for NoOpLogger {
    fn log(&mut self, _entry: AuditLogEntry) -> crate::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> crate::Result<()> {
        Ok(())
    }
}

/// JSON-lines audit logger
pub struct FileAuditLogger {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileAuditLogger {
    /// Open (or create) an append-only audit log
    pub fn new<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| crate::Error::io("audit_open", e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| crate::Error::io("audit_open", e))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Get the path to the audit log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLogger for FileAuditLogger {
    fn log(&mut self, entry: AuditLogEntry) -> crate::Result<()> {
        let json = serde_json::to_string(&entry)
            .map_err(|e| {
                crate::Error::serialization(
                    "audit_log",
                    format!("failed to serialize audit entry: {}", e),
                )
            })?;

        writeln!(self.writer, "{}", json).map_err(|e| crate::Error::io("audit_log", e))
    }

    fn flush(&mut self) -> crate::Result<()> {
        self.writer.flush().map_err(|e| crate::Error::io("audit_flush", e))
    }
}

impl Drop for FileAuditLogger {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// In-memory audit logger. Clones share the same entries, so a test can keep
/// one handle and give the other to the service.
#[derive(Default, Clone)]
pub struct MemoryAuditLogger {
    entries: Arc<Mutex<Vec<AuditLogEntry>>>,
}

impl MemoryAuditLogger {
    /// Create a new in-memory audit logger
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all logged entries
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Clear all logged entries
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Count entries matching `predicate`
    pub fn count_event_type(&self, predicate: impl Fn(&AuditEvent) -> bool) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.iter().filter(|e| predicate(&e.event)).count())
            .unwrap_or(0)
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn log(&mut self, entry: AuditLogEntry) -> crate::Result<()> {
        self.entries
            .lock()
            .map_err(|_| crate::Error::storage("audit_log", "lock poisoned"))?
            .push(entry);
        Ok(())
    }

    fn flush(&mut self) -> crate::Result<()> {
        Ok(())
    }
}
