/// Account API endpoints
use crate::{
    account::{RegisterCandidate, UserInfoUpdate},
    auth::{AdminIdentity, AnyIdentity},
    context::AppContext,
    error::{TalonError, TalonResult},
};
use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/account/register", post(register))
        .route("/account/add", post(add_account))
        .route("/account/login", post(login))
        .route("/account/update", post(update))
        .route("/account/check", post(check))
        .route("/account/delete", post(delete))
        .route("/account/info", post(info))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(default, rename = "userID")]
    user_id: Option<String>,
    account: String,
    password: String,
    #[serde(default)]
    nickname: String,
    #[serde(default, rename = "faceURL")]
    face_url: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    public_key: String,
    #[serde(default)]
    platform: i64,
    #[serde(default)]
    auto_login: bool,
    #[serde(default)]
    ip: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    #[serde(rename = "userID")]
    user_id: String,
    token: Option<String>,
    directory_token: Option<String>,
}

fn candidate_from(req: RegisterRequest) -> (RegisterCandidate, String, i64, bool) {
    (
        RegisterCandidate {
            user_id: req.user_id,
            account: req.account,
            password: req.password,
            nickname: req.nickname,
            face_url: req.face_url,
            address: req.address,
            public_key: req.public_key,
        },
        req.ip,
        req.platform,
        req.auto_login,
    )
}

/// Unauthenticated self-registration
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> TalonResult<Json<RegisterResponse>> {
    let (candidate, ip, platform, auto_login) = candidate_from(req);
    let outcome = ctx
        .provisioner
        .register(candidate, &ip, platform, auto_login, None)
        .await?;

    Ok(Json(RegisterResponse {
        user_id: outcome.user_id,
        token: outcome.token,
        directory_token: outcome.directory_token,
    }))
}

/// Admin-initiated account creation
async fn add_account(
    State(ctx): State<AppContext>,
    admin: AdminIdentity,
    Json(req): Json<RegisterRequest>,
) -> TalonResult<Json<RegisterResponse>> {
    let (candidate, ip, platform, auto_login) = candidate_from(req);
    let outcome = ctx
        .provisioner
        .register(candidate, &ip, platform, auto_login, Some(&admin.user_id))
        .await?;

    Ok(Json(RegisterResponse {
        user_id: outcome.user_id,
        token: outcome.token,
        directory_token: outcome.directory_token,
    }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    account: String,
    password: String,
    #[serde(default)]
    platform: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(rename = "userID")]
    user_id: String,
    token: String,
    directory_token: String,
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> TalonResult<Json<LoginResponse>> {
    let (user_id, token, directory_token) = ctx
        .provisioner
        .login(&req.account, &req.password, req.platform)
        .await?;

    Ok(Json(LoginResponse {
        user_id,
        token,
        directory_token,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    #[serde(rename = "userID")]
    user_id: String,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default, rename = "faceURL")]
    face_url: Option<String>,
    #[serde(default)]
    gender: Option<i64>,
}

async fn update(
    State(ctx): State<AppContext>,
    identity: AnyIdentity,
    Json(req): Json<UpdateRequest>,
) -> TalonResult<Json<serde_json::Value>> {
    ctx.provisioner
        .update_user_info(
            &identity.user_id,
            identity.user_type,
            UserInfoUpdate {
                user_id: req.user_id,
                account: req.account,
                nickname: req.nickname,
                face_url: req.face_url,
                gender: req.gender,
            },
        )
        .await?;

    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    account: String,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    registered: bool,
    #[serde(rename = "userID", skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

async fn check(
    State(ctx): State<AppContext>,
    _admin: AdminIdentity,
    Json(req): Json<CheckRequest>,
) -> TalonResult<Json<CheckResponse>> {
    let user_id = ctx.provisioner.check_user_exist(&req.account).await?;
    Ok(Json(CheckResponse {
        registered: user_id.is_some(),
        user_id,
    }))
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    #[serde(rename = "userIDs")]
    user_ids: Vec<String>,
}

async fn delete(
    State(ctx): State<AppContext>,
    _admin: AdminIdentity,
    Json(req): Json<DeleteRequest>,
) -> TalonResult<Json<serde_json::Value>> {
    if req.user_ids.is_empty() {
        return Err(TalonError::Args("userIDs is empty".to_string()));
    }
    ctx.provisioner.delete_accounts(&req.user_ids).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
struct InfoRequest {
    /// Defaults to the caller when absent
    #[serde(default, rename = "userID")]
    user_id: Option<String>,
}

async fn info(
    State(ctx): State<AppContext>,
    identity: AnyIdentity,
    Json(req): Json<InfoRequest>,
) -> TalonResult<Json<crate::db::models::Attribute>> {
    let user_id = req.user_id.unwrap_or_else(|| identity.user_id.clone());

    let attribute = ctx
        .provisioner
        .get_attribute(&user_id)
        .await?
        .ok_or_else(|| TalonError::AccountNotFound(user_id))?;

    Ok(Json(attribute))
}
