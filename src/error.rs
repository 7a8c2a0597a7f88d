/// Unified error types for the Talon admin backend
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the backend
#[derive(Error, Debug)]
pub enum TalonError {
    /// Malformed or missing input
    #[error("Invalid argument: {0}")]
    Args(String),

    /// A user ID is already registered
    #[error("Duplicate account: {0}")]
    DuplicateAccount(String),

    /// A credential identifier is already held by some account
    #[error("Duplicate credential: {0}")]
    DuplicateCredential(String),

    /// An update would leave an account with zero credentials
    #[error("Credential invariant violated: {0}")]
    CredentialInvariant(String),

    /// Account lookup failed
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Caller lacks the required privilege
    #[error("No permission: {0}")]
    NoPermission(String),

    /// Token map absent, token missing, or token kicked
    #[error("Token expired")]
    TokenExpired,

    /// Token present with an unrecognized state value
    #[error("Token unknown")]
    TokenUnknown,

    /// Token issued for a different user type than required
    #[error("Wrong token type: expected {expected}, got {actual}")]
    WrongTokenType { expected: String, actual: String },

    /// User-ID generation gave up within its probe budget
    #[error("User ID allocation exhausted")]
    IdAllocationExhausted,

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Cache layer errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Opaque remote error from the messaging directory service
    #[error("Directory error: {0}")]
    Directory(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type TalonResult<T> = Result<T, TalonError>;

/// Stable machine-readable error kind, part of the wire contract
impl TalonError {
    pub fn kind(&self) -> &'static str {
        match self {
            TalonError::Args(_) => "ArgsError",
            TalonError::DuplicateAccount(_) => "DuplicateAccount",
            TalonError::DuplicateCredential(_) => "DuplicateCredential",
            TalonError::CredentialInvariant(_) => "InvariantViolation",
            TalonError::AccountNotFound(_) => "AccountNotFound",
            TalonError::NoPermission(_) => "NoPermission",
            TalonError::TokenExpired => "TokenExpired",
            TalonError::TokenUnknown => "TokenUnknown",
            TalonError::WrongTokenType { .. } => "WrongTokenType",
            TalonError::IdAllocationExhausted => "IDAllocationExhausted",
            TalonError::Database(_) => "DatabaseError",
            TalonError::Cache(_) => "CacheError",
            TalonError::Directory(_) => "DirectoryError",
            TalonError::Internal(_) => "InternalError",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            TalonError::Args(_) => StatusCode::BAD_REQUEST,
            TalonError::DuplicateAccount(_)
            | TalonError::DuplicateCredential(_)
            | TalonError::CredentialInvariant(_) => StatusCode::CONFLICT,
            TalonError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            TalonError::NoPermission(_) => StatusCode::FORBIDDEN,
            TalonError::TokenExpired
            | TalonError::TokenUnknown
            | TalonError::WrongTokenType { .. } => StatusCode::UNAUTHORIZED,
            TalonError::IdAllocationExhausted
            | TalonError::Database(_)
            | TalonError::Cache(_)
            | TalonError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            TalonError::Directory(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for TalonError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "request failed: {}", self);
        } else {
            tracing::debug!(kind = self.kind(), "request rejected: {}", self);
        }

        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Map a sqlx error to the duplicate-key taxonomy when a unique index fired.
///
/// SQLite reports unique violations as constraint errors; racing inserts of
/// the same key must surface as Duplicate*, never as a silent overwrite.
pub fn map_unique_violation(err: sqlx::Error, duplicate: TalonError) -> TalonError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return duplicate;
        }
    }
    TalonError::Database(err)
}
