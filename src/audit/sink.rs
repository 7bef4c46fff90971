//! One rotating audit sink.

use chrono::Duration as AgeLimit;
use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, FileLimit};
use file_rotate::{ContentLimit, FileRotate};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;

use crate::config::AuditConfig;

/// One audited request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditRecord {
    pub request_id: String,
    pub remote_addr: String,
    pub method: String,
    /// Request URI with credential values redacted.
    pub url: String,
    pub status: u16,
    /// Response body bytes streamed to the client.
    pub size: u64,
    pub elapsed_ms: u64,
    pub app: String,
    pub service: String,
    pub user_agent: String,
}

/// Writes audit records for a single route as JSON lines.
///
/// Records are handed to a background writer thread; the file is rotated by
/// size, old rotations are pruned by age and compressed.
pub struct AuditLogger {
    route_id: String,
    path: Option<PathBuf>,
    dispatch: Dispatch,
    _guard: Option<WorkerGuard>,
}

impl AuditLogger {
    /// Open (or append to) `<directory>/<route_id>.log`.
    pub fn open(route_id: &str, config: &AuditConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.directory)?;
        let path = config.directory.join(format!("{route_id}.log"));

        let file = FileRotate::new(
            &path,
            AppendTimestamp::default(FileLimit::Age(AgeLimit::days(i64::from(config.max_age_days)))),
            ContentLimit::Bytes(config.max_file_bytes),
            Compression::OnRotate(0),
            #[cfg(unix)]
            None,
        );
        let (writer, guard) = tracing_appender::non_blocking(file);

        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(writer)
            .finish();

        Ok(Self {
            route_id: route_id.to_string(),
            path: Some(path),
            dispatch: Dispatch::new(subscriber),
            _guard: Some(guard),
        })
    }

    /// A logger that drops every record.
    pub fn disabled(route_id: &str) -> Self {
        Self {
            route_id: route_id.to_string(),
            path: None,
            dispatch: Dispatch::none(),
            _guard: None,
        }
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    /// Log file path, `None` for a disabled logger.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log(&self, record: &AuditRecord) {
        tracing::dispatcher::with_default(&self.dispatch, || {
            tracing::info!(
                target: "audit",
                proxy_id = %self.route_id,
                request_id = %record.request_id,
                remote_addr = %record.remote_addr,
                method = %record.method,
                url = %record.url,
                status = record.status,
                size = record.size,
                elapsed_ms = record.elapsed_ms,
                app = %record.app,
                service = %record.service,
                user_agent = %record.user_agent,
                "request"
            );
        });
    }
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogger")
            .field("route_id", &self.route_id)
            .field("path", &self.path)
            .finish()
    }
}

/// An audit record waiting for its response body to finish streaming.
///
/// Counts body bytes as they pass and writes the record when dropped, which
/// covers both a completed body and a client that went away mid-stream.
pub struct PendingAudit {
    logger: Arc<AuditLogger>,
    record: AuditRecord,
    start: Instant,
}

impl PendingAudit {
    pub fn new(logger: Arc<AuditLogger>, record: AuditRecord, start: Instant) -> Self {
        Self { logger, record, start }
    }

    pub fn add_bytes(&mut self, len: usize) {
        self.record.size += len as u64;
    }
}

impl Drop for PendingAudit {
    fn drop(&mut self) {
        self.record.elapsed_ms = self.start.elapsed().as_millis() as u64;
        self.logger.log(&self.record);
    }
}
