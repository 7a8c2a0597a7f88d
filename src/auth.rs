/// Authentication extractors
///
/// Callers present a session token in the `token` header. Extraction parses
/// the signed token, checks it against the user's token map, and enforces
/// the token's issuing path: admin operations reject user tokens and vice
/// versa, failing closed on anything unexpected.
use crate::context::AppContext;
use crate::db::models::{USER_TYPE_ADMIN, USER_TYPE_NORMAL};
use crate::error::TalonError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

const TOKEN_HEADER: &str = "token";

fn extract_token(parts: &Parts) -> Result<String, TalonError> {
    parts
        .headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| TalonError::Args("token is empty".to_string()))
}

async fn validate_token(state: &AppContext, token: &str) -> Result<(String, i64), TalonError> {
    let (user_id, user_type) = state.sessions.parse_token(token)?;
    state.sessions.validate(&user_id, token).await?;
    Ok((user_id, user_type))
}

/// Caller authenticated with an admin-path token
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminIdentity {
    type Rejection = TalonError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let (user_id, user_type) = validate_token(state, &token).await?;

        if user_type != USER_TYPE_ADMIN {
            return Err(TalonError::WrongTokenType {
                expected: "admin".to_string(),
                actual: user_type.to_string(),
            });
        }

        Ok(AdminIdentity { user_id })
    }
}

/// Caller authenticated with a token from either issuing path
#[derive(Debug, Clone)]
pub struct AnyIdentity {
    pub user_id: String,
    pub user_type: i64,
}

#[async_trait]
impl FromRequestParts<AppContext> for AnyIdentity {
    type Rejection = TalonError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let (user_id, user_type) = validate_token(state, &token).await?;

        match user_type {
            USER_TYPE_ADMIN | USER_TYPE_NORMAL => Ok(AnyIdentity { user_id, user_type }),
            other => Err(TalonError::WrongTokenType {
                expected: "admin or user".to_string(),
                actual: other.to_string(),
            }),
        }
    }
}
