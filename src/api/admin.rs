/// Admin API endpoints: admin sessions, menu management, force logout
use crate::{
    account::password_digest,
    admin::MenuUpdate,
    auth::AdminIdentity,
    context::AppContext,
    db::models::{AdminMenu, LEVEL_NORMAL_ADMIN, USER_TYPE_ADMIN},
    error::{TalonError, TalonResult},
};
use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build admin routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/login", post(admin_login))
        .route("/admin/logout", post(admin_logout))
        .route("/admin/force_logout", post(force_logout))
        .route("/menu/list", post(menu_list))
        .route("/menu/all", post(menu_all))
        .route("/menu/create", post(menu_create))
        .route("/menu/update", post(menu_update))
        .route("/menu/delete", post(menu_delete))
        .route("/menu/user/assign", post(menu_assign))
        .route("/menu/user/list", post(menu_user_list))
}

/// Menu management and assignment are super-admin operations
async fn require_super_admin(ctx: &AppContext, user_id: &str) -> TalonResult<()> {
    if !ctx.menus.is_super_admin(user_id).await? {
        return Err(TalonError::NoPermission(
            "super admin required".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct AdminLoginRequest {
    account: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct AdminLoginResponse {
    #[serde(rename = "userID")]
    user_id: String,
    token: String,
    level: i64,
}

async fn admin_login(
    State(ctx): State<AppContext>,
    Json(req): Json<AdminLoginRequest>,
) -> TalonResult<Json<AdminLoginResponse>> {
    let credential = ctx
        .credentials
        .take_by_account(&req.account)
        .await?
        .ok_or_else(|| TalonError::AccountNotFound(req.account.clone()))?;

    let account = ctx
        .provisioner
        .get_account(&credential.user_id)
        .await?
        .ok_or_else(|| TalonError::AccountNotFound(credential.user_id.clone()))?;

    if account.password != password_digest(&req.password) {
        return Err(TalonError::Args("password is wrong".to_string()));
    }
    if account.blocked {
        return Err(TalonError::NoPermission("account is blocked".to_string()));
    }
    if account.level < LEVEL_NORMAL_ADMIN {
        return Err(TalonError::NoPermission("not an admin".to_string()));
    }

    let token = ctx
        .sessions
        .create_token(&account.user_id, USER_TYPE_ADMIN)
        .await?;

    Ok(Json(AdminLoginResponse {
        user_id: account.user_id,
        token,
        level: account.level,
    }))
}

async fn admin_logout(
    State(ctx): State<AppContext>,
    admin: AdminIdentity,
) -> TalonResult<Json<serde_json::Value>> {
    ctx.sessions.revoke(&admin.user_id).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
struct ForceLogoutRequest {
    #[serde(rename = "userID")]
    user_id: String,
}

/// Kick a user everywhere: directory sessions first, then the local
/// token map.
async fn force_logout(
    State(ctx): State<AppContext>,
    _admin: AdminIdentity,
    Json(req): Json<ForceLogoutRequest>,
) -> TalonResult<Json<serde_json::Value>> {
    ctx.directory.force_logout(&req.user_id).await?;
    ctx.sessions.revoke(&req.user_id).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Serialize)]
struct MenuListResponse {
    menus: Vec<AdminMenu>,
}

/// The caller's visible menu tree, with implicit parents resolved
async fn menu_list(
    State(ctx): State<AppContext>,
    admin: AdminIdentity,
) -> TalonResult<Json<MenuListResponse>> {
    let menus = ctx.menus.resolve_for_user(&admin.user_id).await?;
    Ok(Json(MenuListResponse { menus }))
}

/// The full menu tree, regardless of assignment
async fn menu_all(
    State(ctx): State<AppContext>,
    _admin: AdminIdentity,
) -> TalonResult<Json<MenuListResponse>> {
    let menus = ctx.menus.list_menus("").await?;
    Ok(Json(MenuListResponse { menus }))
}

#[derive(Debug, Deserialize)]
struct MenuCreateRequest {
    key: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    sort: i64,
    #[serde(default)]
    parent: String,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    redirect: String,
}

async fn menu_create(
    State(ctx): State<AppContext>,
    admin: AdminIdentity,
    Json(req): Json<MenuCreateRequest>,
) -> TalonResult<Json<serde_json::Value>> {
    require_super_admin(&ctx, &admin.user_id).await?;
    if req.key.is_empty() {
        return Err(TalonError::Args("menu key is empty".to_string()));
    }

    ctx.menus
        .create_menu(&AdminMenu {
            key: req.key,
            name: req.name,
            path: req.path,
            icon: req.icon,
            sort: req.sort,
            parent: req.parent,
            hidden: req.hidden,
            redirect: req.redirect,
        })
        .await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
struct MenuUpdateRequest {
    key: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    sort: Option<i64>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    hidden: Option<bool>,
    #[serde(default)]
    redirect: Option<String>,
}

async fn menu_update(
    State(ctx): State<AppContext>,
    admin: AdminIdentity,
    Json(req): Json<MenuUpdateRequest>,
) -> TalonResult<Json<serde_json::Value>> {
    require_super_admin(&ctx, &admin.user_id).await?;

    ctx.menus
        .update_menu(
            &req.key,
            &MenuUpdate {
                name: req.name,
                path: req.path,
                icon: req.icon,
                sort: req.sort,
                parent: req.parent,
                hidden: req.hidden,
                redirect: req.redirect,
            },
        )
        .await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
struct MenuDeleteRequest {
    keys: Vec<String>,
}

async fn menu_delete(
    State(ctx): State<AppContext>,
    admin: AdminIdentity,
    Json(req): Json<MenuDeleteRequest>,
) -> TalonResult<Json<serde_json::Value>> {
    require_super_admin(&ctx, &admin.user_id).await?;
    ctx.menus.delete_menus(&req.keys).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
struct MenuAssignRequest {
    #[serde(rename = "userID")]
    user_id: String,
    keys: Vec<String>,
}

async fn menu_assign(
    State(ctx): State<AppContext>,
    admin: AdminIdentity,
    Json(req): Json<MenuAssignRequest>,
) -> TalonResult<Json<serde_json::Value>> {
    require_super_admin(&ctx, &admin.user_id).await?;
    ctx.menus.assign(&req.user_id, &req.keys).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Deserialize)]
struct MenuUserListRequest {
    #[serde(rename = "userID")]
    user_id: String,
}

/// A user's raw assignment, without parent inference
async fn menu_user_list(
    State(ctx): State<AppContext>,
    _admin: AdminIdentity,
    Json(req): Json<MenuUserListRequest>,
) -> TalonResult<Json<MenuListResponse>> {
    let menus = ctx.menus.user_menu(&req.user_id).await?;
    Ok(Json(MenuListResponse { menus }))
}
