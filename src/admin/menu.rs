/// Hierarchical admin-menu permission resolution
///
/// Menu keys are flat strings using `-` as the parent/child delimiter
/// (e.g. `users`, `users-list`). Assignment records hold plain key lists;
/// resolution adds the immediate parent of any assigned child so a child
/// menu is never visible with its parent navigation entry missing.

use crate::db::models::{AdminMenu, AdminUserMenu, LEVEL_SUPER_ADMIN};
use crate::error::{map_unique_violation, TalonError, TalonResult};
use sqlx::SqlitePool;
use std::collections::HashSet;

/// Menu key hierarchy delimiter
pub const MENU_KEY_DELIMITER: char = '-';

/// Typed partial update for a menu entry; absent fields are left untouched
#[derive(Debug, Default, Clone)]
pub struct MenuUpdate {
    pub name: Option<String>,
    pub path: Option<String>,
    pub icon: Option<String>,
    pub sort: Option<i64>,
    pub parent: Option<String>,
    pub hidden: Option<bool>,
    pub redirect: Option<String>,
}

#[derive(Clone)]
pub struct MenuPermissionResolver {
    db: SqlitePool,
}

impl MenuPermissionResolver {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Resolve the menu entries visible to an admin.
    ///
    /// Super admin is the only bypass and is evaluated fresh on every call,
    /// never cached, so privilege revocation takes effect immediately.
    pub async fn resolve_for_user(&self, user_id: &str) -> TalonResult<Vec<AdminMenu>> {
        if self.is_super_admin(user_id).await? {
            return self.list_menus("").await;
        }

        let assigned = self.assigned_keys(user_id).await?;
        let keys = with_inferred_parents(&assigned);
        self.list_menus_by_keys(&keys).await
    }

    /// Capability predicate over the account's level field
    pub async fn is_super_admin(&self, user_id: &str) -> TalonResult<bool> {
        let level: Option<i64> =
            sqlx::query_scalar("SELECT level FROM account WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;

        match level {
            Some(level) => Ok(level == LEVEL_SUPER_ADMIN),
            None => Err(TalonError::AccountNotFound(user_id.to_string())),
        }
    }

    /// Assigned key list for a user; absent record is "no permissions yet"
    pub async fn assigned_keys(&self, user_id: &str) -> TalonResult<Vec<String>> {
        let record = sqlx::query_as::<_, AdminUserMenu>(
            "SELECT user_id, menus FROM admin_user_menu WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(record.map(|r| r.keys()).unwrap_or_default())
    }

    /// Assign a key list to a user: create the record if absent, otherwise
    /// replace the list wholesale.
    pub async fn assign(&self, user_id: &str, keys: &[String]) -> TalonResult<()> {
        let menus = serde_json::to_string(keys)
            .map_err(|e| TalonError::Internal(format!("Menu key list encoding failed: {}", e)))?;

        sqlx::query(
            "INSERT INTO admin_user_menu (user_id, menus) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET menus = excluded.menus",
        )
        .bind(user_id)
        .bind(&menus)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn create_menu(&self, menu: &AdminMenu) -> TalonResult<()> {
        sqlx::query(
            "INSERT INTO admin_menu (key, name, path, icon, sort, parent, hidden, redirect)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&menu.key)
        .bind(&menu.name)
        .bind(&menu.path)
        .bind(&menu.icon)
        .bind(menu.sort)
        .bind(&menu.parent)
        .bind(menu.hidden)
        .bind(&menu.redirect)
        .execute(&self.db)
        .await
        .map_err(|e| {
            map_unique_violation(
                e,
                TalonError::Args(format!("menu key already exists: {}", menu.key)),
            )
        })?;

        Ok(())
    }

    pub async fn update_menu(&self, key: &str, update: &MenuUpdate) -> TalonResult<()> {
        let mut sets = Vec::new();
        let mut builder = sqlx::QueryBuilder::new("UPDATE admin_menu SET ");

        macro_rules! push_field {
            ($field:literal, $value:expr) => {
                if let Some(value) = &$value {
                    if !sets.is_empty() {
                        builder.push(", ");
                    }
                    builder.push(concat!($field, " = "));
                    builder.push_bind(value.clone());
                    sets.push($field);
                }
            };
        }

        push_field!("name", update.name);
        push_field!("path", update.path);
        push_field!("icon", update.icon);
        push_field!("sort", update.sort);
        push_field!("parent", update.parent);
        push_field!("hidden", update.hidden);
        push_field!("redirect", update.redirect);

        if sets.is_empty() {
            return Ok(());
        }

        builder.push(" WHERE key = ");
        builder.push_bind(key.to_string());

        builder.build().execute(&self.db).await?;
        Ok(())
    }

    pub async fn delete_menus(&self, keys: &[String]) -> TalonResult<()> {
        for key in keys {
            sqlx::query("DELETE FROM admin_menu WHERE key = ?1")
                .bind(key)
                .execute(&self.db)
                .await?;
        }
        Ok(())
    }

    pub async fn take_menu(&self, key: &str) -> TalonResult<AdminMenu> {
        sqlx::query_as::<_, AdminMenu>(
            "SELECT key, name, path, icon, sort, parent, hidden, redirect
             FROM admin_menu WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| TalonError::Args(format!("menu not found: {}", key)))
    }

    /// List menus under a parent; empty parent lists the whole tree
    pub async fn list_menus(&self, parent: &str) -> TalonResult<Vec<AdminMenu>> {
        let rows = if parent.is_empty() {
            sqlx::query_as::<_, AdminMenu>(
                "SELECT key, name, path, icon, sort, parent, hidden, redirect
                 FROM admin_menu ORDER BY sort",
            )
            .fetch_all(&self.db)
            .await?
        } else {
            sqlx::query_as::<_, AdminMenu>(
                "SELECT key, name, path, icon, sort, parent, hidden, redirect
                 FROM admin_menu WHERE parent = ?1 ORDER BY sort",
            )
            .bind(parent)
            .fetch_all(&self.db)
            .await?
        };

        Ok(rows)
    }

    pub async fn list_menus_by_keys(&self, keys: &[String]) -> TalonResult<Vec<AdminMenu>> {
        let mut menus = Vec::with_capacity(keys.len());
        for key in keys {
            let row = sqlx::query_as::<_, AdminMenu>(
                "SELECT key, name, path, icon, sort, parent, hidden, redirect
                 FROM admin_menu WHERE key = ?1",
            )
            .bind(key)
            .fetch_optional(&self.db)
            .await?;

            if let Some(menu) = row {
                menus.push(menu);
            }
        }
        Ok(menus)
    }

    /// Menu metadata for a user's raw assignment, without inference
    pub async fn user_menu(&self, user_id: &str) -> TalonResult<Vec<AdminMenu>> {
        let keys = self.assigned_keys(user_id).await?;
        self.list_menus_by_keys(&keys).await
    }
}

/// Implicit-parent inference: for every key containing the delimiter, add
/// the prefix before the FIRST delimiter if it is not already assigned.
///
/// Inference is deliberately single-level; grandparents are not derived.
pub fn with_inferred_parents(assigned: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = assigned.iter().map(String::as_str).collect();
    let mut keys: Vec<String> = assigned.to_vec();

    for key in assigned {
        if let Some(idx) = key.find(MENU_KEY_DELIMITER) {
            if idx > 0 {
                let parent = &key[..idx];
                if !seen.contains(parent) {
                    keys.push(parent.to_string());
                    seen.insert(parent);
                }
            }
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{LEVEL_NORMAL_ADMIN, LEVEL_SUPER_ADMIN};
    use chrono::Utc;

    fn keys(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn child_without_parent_gains_parent() {
        let resolved = with_inferred_parents(&keys(&["a-b"]));
        assert_eq!(resolved, keys(&["a-b", "a"]));
    }

    #[test]
    fn parent_alone_stays_alone() {
        let resolved = with_inferred_parents(&keys(&["a"]));
        assert_eq!(resolved, keys(&["a"]));
    }

    #[test]
    fn already_assigned_parent_is_not_duplicated() {
        let resolved = with_inferred_parents(&keys(&["a", "a-b"]));
        assert_eq!(resolved, keys(&["a", "a-b"]));
    }

    #[test]
    fn inference_is_single_level() {
        // only the prefix before the first delimiter is derived
        let resolved = with_inferred_parents(&keys(&["a-b-c"]));
        assert_eq!(resolved, keys(&["a-b-c", "a"]));
    }

    #[test]
    fn shared_parent_is_added_once() {
        let resolved = with_inferred_parents(&keys(&["users-list", "users-block"]));
        assert_eq!(resolved, keys(&["users-list", "users-block", "users"]));
    }

    async fn create_test_resolver() -> MenuPermissionResolver {
        let db = SqlitePool::connect(":memory:").await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE account (
                user_id TEXT PRIMARY KEY,
                password TEXT NOT NULL DEFAULT '',
                level INTEGER NOT NULL DEFAULT 0,
                operator_user_id TEXT NOT NULL DEFAULT '',
                blocked INTEGER NOT NULL DEFAULT 0,
                stealth INTEGER NOT NULL DEFAULT 0,
                create_time TEXT NOT NULL,
                change_time TEXT NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        sqlx::query(
            r#"
            CREATE TABLE admin_menu (
                key TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                path TEXT NOT NULL DEFAULT '',
                icon TEXT NOT NULL DEFAULT '',
                sort INTEGER NOT NULL DEFAULT 0,
                parent TEXT NOT NULL DEFAULT '',
                hidden INTEGER NOT NULL DEFAULT 0,
                redirect TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        sqlx::query(
            r#"
            CREATE TABLE admin_user_menu (
                user_id TEXT PRIMARY KEY,
                menus TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        MenuPermissionResolver::new(db)
    }

    async fn seed_account(resolver: &MenuPermissionResolver, user_id: &str, level: i64) {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO account (user_id, level, create_time, change_time)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(level)
        .bind(now)
        .bind(now)
        .execute(&resolver.db)
        .await
        .unwrap();
    }

    async fn seed_menu(resolver: &MenuPermissionResolver, key: &str, parent: &str) {
        resolver
            .create_menu(&AdminMenu {
                key: key.to_string(),
                name: key.to_string(),
                path: format!("/{}", key),
                icon: String::new(),
                sort: 0,
                parent: parent.to_string(),
                hidden: false,
                redirect: String::new(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resolve_adds_missing_parent_entry() {
        let resolver = create_test_resolver().await;
        seed_account(&resolver, "9000000001", LEVEL_NORMAL_ADMIN).await;
        seed_menu(&resolver, "users", "").await;
        seed_menu(&resolver, "users-list", "users").await;

        resolver
            .assign("9000000001", &keys(&["users-list"]))
            .await
            .unwrap();

        let menus = resolver.resolve_for_user("9000000001").await.unwrap();
        let mut resolved: Vec<&str> = menus.iter().map(|m| m.key.as_str()).collect();
        resolved.sort();
        assert_eq!(resolved, vec!["users", "users-list"]);
    }

    #[tokio::test]
    async fn super_admin_sees_full_tree_without_assignment() {
        let resolver = create_test_resolver().await;
        seed_account(&resolver, "9000000002", LEVEL_SUPER_ADMIN).await;
        seed_menu(&resolver, "users", "").await;
        seed_menu(&resolver, "users-list", "users").await;
        seed_menu(&resolver, "logs", "").await;

        let menus = resolver.resolve_for_user("9000000002").await.unwrap();
        assert_eq!(menus.len(), 3);
    }

    #[tokio::test]
    async fn missing_assignment_record_is_empty_not_error() {
        let resolver = create_test_resolver().await;
        seed_account(&resolver, "9000000003", LEVEL_NORMAL_ADMIN).await;
        seed_menu(&resolver, "users", "").await;

        let menus = resolver.resolve_for_user("9000000003").await.unwrap();
        assert!(menus.is_empty());
    }

    #[tokio::test]
    async fn assign_replaces_wholesale() {
        let resolver = create_test_resolver().await;
        seed_account(&resolver, "9000000004", LEVEL_NORMAL_ADMIN).await;

        resolver
            .assign("9000000004", &keys(&["users", "logs"]))
            .await
            .unwrap();
        resolver.assign("9000000004", &keys(&["apps"])).await.unwrap();

        let assigned = resolver.assigned_keys("9000000004").await.unwrap();
        assert_eq!(assigned, keys(&["apps"]));
    }

    #[tokio::test]
    async fn update_menu_touches_only_present_fields() {
        let resolver = create_test_resolver().await;
        seed_menu(&resolver, "users", "").await;

        resolver
            .update_menu(
                "users",
                &MenuUpdate {
                    name: Some("User Management".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let menu = resolver.take_menu("users").await.unwrap();
        assert_eq!(menu.name, "User Management");
        assert_eq!(menu.path, "/users");
    }

    #[tokio::test]
    async fn missing_menu_is_a_bad_argument_not_a_missing_account() {
        let resolver = create_test_resolver().await;
        assert!(matches!(
            resolver.take_menu("no-such-menu").await,
            Err(TalonError::Args(_))
        ));
    }
}
