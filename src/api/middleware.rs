/// Request middleware
use crate::audit::{module_and_operation, AuditRecord};
use crate::context::AppContext;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Matches axum's default `Json` extractor limit; a body the handler would
/// accept must never be rejected by the audit pass.
const MAX_BUFFERED_BODY: usize = 2 * 1024 * 1024;

/// Cap on the `request_data` column; larger bodies are recorded truncated.
const MAX_AUDITED_BODY: usize = 64 * 1024;

/// Record every successful mutating request in the audit trail.
///
/// The operator identity comes from the `token` header when one parses;
/// unauthenticated calls (login, register without auto-auth) are recorded
/// with an empty operator.
pub async fn audit_middleware(
    State(ctx): State<AppContext>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() != Method::POST {
        return next.run(req).await;
    }

    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    let ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let admin_id = req
        .headers()
        .get("token")
        .and_then(|v| v.to_str().ok())
        .and_then(|t| ctx.sessions.parse_token(t).ok())
        .map(|(user_id, _)| user_id)
        .unwrap_or_default();

    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };
    let request_data = truncated_lossy(&bytes, MAX_AUDITED_BODY);
    let req = Request::from_parts(parts, Body::from(bytes));

    let response = next.run(req).await;

    if response.status().is_success() {
        let (module, operation) = module_and_operation(&path);
        ctx.audit.record(AuditRecord {
            admin_id,
            module,
            operation,
            method,
            path,
            ip,
            request_data,
            ..Default::default()
        });
    }

    response
}

/// Lossy UTF-8 decode of at most `max` bytes; a multi-byte character split
/// at the cut surfaces as a replacement character rather than a panic
fn truncated_lossy(bytes: &[u8], max: usize) -> String {
    let cut = bytes.len().min(max);
    String::from_utf8_lossy(&bytes[..cut]).into_owned()
}
