/// Operation audit trail
///
/// Mutating API calls are recorded off the request path through a bounded
/// channel. Auditing is best-effort: a full channel or a failed insert never
/// delays or fails the request that triggered it.
use crate::error::TalonResult;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

const AUDIT_QUEUE_DEPTH: usize = 1024;

/// One recorded operation
#[derive(Debug, Clone, Default)]
pub struct AuditRecord {
    /// Acting admin (empty for unauthenticated paths)
    pub admin_id: String,
    pub admin_account: String,
    pub admin_name: String,
    pub module: String,
    pub operation: String,
    pub method: String,
    pub path: String,
    pub ip: String,
    pub request_data: String,
}

/// Handle for submitting audit records
#[derive(Clone)]
pub struct OperationAuditSink {
    tx: mpsc::Sender<AuditRecord>,
}

impl OperationAuditSink {
    /// Spawn the writer task and return the submission handle
    pub fn spawn(db: SqlitePool) -> Self {
        let (tx, rx) = mpsc::channel(AUDIT_QUEUE_DEPTH);
        tokio::spawn(write_loop(db, rx));
        Self { tx }
    }

    /// Submit a record without waiting. Records are dropped when the queue
    /// is full rather than applying backpressure to the request path.
    pub fn record(&self, record: AuditRecord) {
        if let Err(e) = self.tx.try_send(record) {
            warn!("Audit queue full, dropping record: {}", e);
        }
    }
}

async fn write_loop(db: SqlitePool, mut rx: mpsc::Receiver<AuditRecord>) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = insert_record(&db, &record).await {
            warn!(
                "Failed to persist audit record {}/{}: {}",
                record.module, record.operation, e
            );
        }
    }
    debug!("Audit writer shutting down");
}

async fn insert_record(db: &SqlitePool, record: &AuditRecord) -> TalonResult<()> {
    sqlx::query(
        "INSERT INTO operation_log
            (operation_id, admin_id, admin_account, admin_name, module, operation,
             method, path, ip, request_data, create_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&record.admin_id)
    .bind(&record.admin_account)
    .bind(&record.admin_name)
    .bind(&record.module)
    .bind(&record.operation)
    .bind(&record.method)
    .bind(&record.path)
    .bind(&record.ip)
    .bind(&record.request_data)
    .bind(Utc::now().timestamp_millis())
    .execute(db)
    .await?;
    Ok(())
}

/// Derive `(module, operation)` from a request path.
///
/// The first path segment names the module; the remaining segments joined
/// with `_` name the operation. Paths too short to carry either part fall
/// back to "unknown".
pub fn module_and_operation(path: &str) -> (String, String) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let module = segments
        .first()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let operation = if segments.len() > 1 {
        segments[1..].join("_")
    } else {
        "unknown".to_string()
    };

    (module, operation)
}
