//! Shared application state.
//!
//! `CoreState` is created once at startup, wrapped in `Arc`, and handed
//! to the HTTP layer. It owns the database location, session settings,
//! the in-memory audit buffer and the running server handle. Handlers
//! open a fresh connection per request through `open_db()`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::api::ApiServer;
use crate::config::ServerConfig;
use crate::db;

/// Maximum audit buffer size before flush.
const AUDIT_BUFFER_CAPACITY: usize = 100;

/// Audit rows older than this are pruned on flush.
pub const AUDIT_RETENTION_DAYS: i64 = 90;

/// How often the background maintenance pass runs.
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    db_path: PathBuf,
    session_ttl_hours: i64,
    audit: AuditLogger,
    api_server: tokio::sync::Mutex<Option<ApiServer>>,
}

impl CoreState {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_database(config.database_path(), config.session_ttl_hours)
    }

    pub fn with_database(db_path: impl Into<PathBuf>, session_ttl_hours: i64) -> Self {
        Self {
            db_path: db_path.into(),
            session_ttl_hours,
            audit: AuditLogger::new(),
            api_server: tokio::sync::Mutex::new(None),
        }
    }

    /// Open a database connection. Migrations are applied if the schema
    /// is behind.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn session_ttl_hours(&self) -> i64 {
        self.session_ttl_hours
    }

    /// Record an access event. Flushes to SQLite when the buffer is full.
    pub fn log_access(&self, source: AccessSource, action: &str, entity: &str) {
        let needs_flush = self.audit.log(source, action, entity);
        if needs_flush {
            if let Err(e) = self.flush_audit() {
                tracing::warn!("Audit auto-flush failed: {e}");
            }
        }
    }

    /// Buffered (not yet flushed) audit entries.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }

    /// Flush buffered entries. Old rows are pruned on the same connection.
    pub fn flush_audit(&self) -> Result<usize, CoreError> {
        self.flush_and_prune_audit().map(|(flushed, _)| flushed)
    }

    /// Flush buffered entries, then drop rows past the retention window.
    pub fn flush_and_prune_audit(&self) -> Result<(usize, usize), CoreError> {
        let conn = self.open_db()?;
        let flushed = self.audit.flush_to_db(&conn)?;
        let pruned = db::repository::prune_audit_log(&conn, AUDIT_RETENTION_DAYS)?;
        if pruned > 0 {
            tracing::info!(pruned, "Pruned old audit entries");
        }
        Ok((flushed, pruned))
    }

    /// Periodic housekeeping: persist and prune the audit log, then drop
    /// expired sessions.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport, CoreError> {
        let (flushed, pruned_audit) = self.flush_and_prune_audit()?;
        let conn = self.open_db()?;
        let purged_sessions = db::repository::delete_expired_sessions(&conn, &db::now())?;
        if purged_sessions > 0 {
            tracing::info!(purged = purged_sessions, "Expired sessions removed");
        }
        Ok(MaintenanceReport { flushed, pruned_audit, purged_sessions })
    }

    /// Keep the running server handle so shutdown can reach it.
    pub async fn set_api_server(&self, server: ApiServer) {
        let mut guard = self.api_server.lock().await;
        if let Some(mut previous) = guard.replace(server) {
            previous.shutdown();
        }
    }

    /// Signal the running server (if any) to stop. Returns whether one was running.
    pub async fn shutdown_api_server(&self) -> bool {
        match self.api_server.lock().await.take() {
            Some(mut server) => {
                server.shutdown();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub flushed: usize,
    pub pruned_audit: usize,
    pub purged_sessions: usize,
}

/// Run `run_maintenance` every `period` until the task is aborted. The
/// first pass happens one period after spawning.
pub fn spawn_maintenance(core: Arc<CoreState>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately; startup already purged
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = core.run_maintenance() {
                tracing::warn!("Maintenance pass failed: {e}");
            }
        }
    })
}

// ═══════════════════════════════════════════════════════════
// Access source
// ═══════════════════════════════════════════════════════════

/// Who touched the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessSource {
    /// HTTP request, authenticated or not.
    Api { user_id: Option<Uuid> },
    /// Startup, shutdown and maintenance tasks.
    System,
}

impl std::fmt::Display for AccessSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api { .. } => write!(f, "api"),
            Self::System => write!(f, "system"),
        }
    }
}

impl AccessSource {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Api { user_id } => *user_id,
            Self::System => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Audit logger
// ═══════════════════════════════════════════════════════════

/// In-memory audit log buffer. Entries are flushed to SQLite
/// when the buffer reaches capacity or on explicit flush.
pub struct AuditLogger {
    buffer: Mutex<Vec<AuditEntry>>,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: chrono::NaiveDateTime,
    pub source: AccessSource,
    pub action: String,
    pub entity: String,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(AUDIT_BUFFER_CAPACITY)),
        }
    }

    /// Append an entry. Returns `true` once the buffer has reached the
    /// flush threshold.
    pub fn log(&self, source: AccessSource, action: &str, entity: &str) -> bool {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(AuditEntry {
                timestamp: db::now(),
                source,
                action: action.to_string(),
                entity: entity.to_string(),
            });
            buf.len() >= AUDIT_BUFFER_CAPACITY
        } else {
            false
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|mut buf| buf.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    /// Write buffered entries to `audit_log`. Entries are restored to the
    /// buffer if the insert fails.
    pub fn flush_to_db(&self, conn: &rusqlite::Connection) -> Result<usize, CoreError> {
        let entries = self.drain();
        if entries.is_empty() {
            return Ok(0);
        }

        let rows: Vec<db::repository::AuditRow> = entries
            .iter()
            .map(|e| {
                (
                    db::fmt_ts(&e.timestamp),
                    e.source.to_string(),
                    e.action.clone(),
                    e.entity.clone(),
                    e.source.user_id().map(|id| id.to_string()),
                )
            })
            .collect();

        if let Err(e) = db::repository::insert_audit_entries(conn, &rows) {
            if let Ok(mut buf) = self.buffer.lock() {
                let newer = std::mem::take(&mut *buf);
                buf.extend(entries);
                buf.extend(newer);
            }
            return Err(e.into());
        }

        let count = rows.len();
        tracing::debug!(count, "Flushed audit entries to database");
        Ok(count)
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
