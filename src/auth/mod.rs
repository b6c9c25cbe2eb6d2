pub mod roles;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::{UserDocument, UserRecord};
use crate::db::JsonDocument;
use crate::error::ServiceError;
use roles::{Capability, RoleDefinition, RoleSet, ADMIN_ROLE};

/// Usage counters after a request was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub daily_used: u32,
    pub daily_limit: u32,
}

/// Authorized users, their roles and daily request quotas.
pub struct IdentityStore {
    users: JsonDocument<UserDocument>,
    roles: RoleSet,
}

impl IdentityStore {
    /// Open the users document, seeding it with `admin_usernames` as Admins if
    /// it does not exist yet.
    pub async fn open(
        path: impl Into<PathBuf>,
        roles: RoleSet,
        admin_usernames: &[String],
    ) -> anyhow::Result<Self> {
        let admin_limit = roles
            .get(ADMIN_ROLE)
            .map(|r| r.daily_limit)
            .ok_or_else(|| anyhow::anyhow!("role set has no '{}' role", ADMIN_ROLE))?;

        let users = JsonDocument::<UserDocument>::open(path, || {
            let now = Utc::now();
            admin_usernames
                .iter()
                .map(|name| (name.clone(), new_record(name, ADMIN_ROLE, admin_limit, now)))
                .collect()
        })
        .await?;

        let count = users.read(|u| u.len()).await;
        tracing::info!("Identity store loaded from {:?} ({} users)", users.path(), count);

        Ok(Self { users, roles })
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// Exact, case-sensitive match.
    pub async fn is_authorized(&self, username: &str) -> bool {
        self.users.read(|u| u.contains_key(username)).await
    }

    pub async fn get_user(&self, username: &str) -> Option<UserRecord> {
        self.users.read(|u| u.get(username).cloned()).await
    }

    pub async fn list_users(&self) -> Vec<UserRecord> {
        self.users.read(|u| u.values().cloned().collect()).await
    }

    pub async fn add_user(&self, username: &str, role: &str) -> Result<UserRecord, ServiceError> {
        if username.is_empty() {
            return Err(ServiceError::InvalidInput("Username cannot be empty".into()));
        }

        let record = self
            .users
            .update(|users| {
                if users.contains_key(username) {
                    return Err(ServiceError::AlreadyExists(username.to_string()));
                }
                let def = self.role(role)?;
                let record = new_record(username, role, def.daily_limit, Utc::now());
                users.insert(username.to_string(), record.clone());
                Ok(record)
            })
            .await?;

        tracing::info!("Added user '{}' with role '{}'", username, role);
        Ok(record)
    }

    pub async fn remove_user(&self, username: &str) -> Result<(), ServiceError> {
        self.users
            .update(|users| {
                users
                    .remove(username)
                    .map(|_| ())
                    .ok_or_else(|| user_not_found(username))
            })
            .await?;

        tracing::info!("Removed user '{}'", username);
        Ok(())
    }

    /// Change a user's role. The daily limit follows the new role; the
    /// counter already used today is kept.
    pub async fn update_user(
        &self,
        username: &str,
        role: Option<&str>,
    ) -> Result<UserRecord, ServiceError> {
        let record = self
            .users
            .update(|users| {
                let user = users.get_mut(username).ok_or_else(|| user_not_found(username))?;
                if let Some(role) = role {
                    let def = self.role(role)?;
                    user.role = role.to_string();
                    user.daily_limit = def.daily_limit;
                }
                Ok::<_, ServiceError>(user.clone())
            })
            .await?;

        tracing::info!("Updated user '{}' (role now '{}')", username, record.role);
        Ok(record)
    }

    /// Stamp the last-login time. Unknown users are ignored.
    pub async fn record_login(&self, username: &str) -> Result<(), ServiceError> {
        let result: Result<(), ServiceError> = self
            .users
            .update(|users| {
                let user = users.get_mut(username).ok_or_else(|| user_not_found(username))?;
                user.last_login = Some(Utc::now());
                Ok(())
            })
            .await;

        match result {
            Err(ServiceError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    /// Count one request against the user's daily quota.
    pub async fn record_request(&self, username: &str) -> Result<QuotaUsage, ServiceError> {
        self.record_request_at(username, Utc::now()).await
    }

    /// Check and increment happen under the document lock, so concurrent
    /// requests for the same user can never overshoot the limit.
    pub(crate) async fn record_request_at(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<QuotaUsage, ServiceError> {
        let result = self
            .users
            .update(|users| {
                let user = users.get_mut(username).ok_or_else(|| user_not_found(username))?;

                if user.last_reset.date_naive() < now.date_naive() {
                    user.daily_used = 0;
                    user.last_reset = now;
                }

                if user.daily_used >= user.daily_limit {
                    return Err(ServiceError::RateLimited);
                }

                user.request_count += 1;
                user.daily_used += 1;
                Ok(QuotaUsage {
                    daily_used: user.daily_used,
                    daily_limit: user.daily_limit,
                })
            })
            .await;

        if let Err(ServiceError::RateLimited) = &result {
            tracing::warn!("User '{}' hit the daily request limit", username);
        }
        result
    }

    /// False for unknown users and for roles missing from the role set.
    pub async fn check_permission(&self, username: &str, capability: Capability) -> bool {
        let role = self.users.read(|u| u.get(username).map(|r| r.role.clone())).await;
        role.and_then(|r| self.roles.get(&r).map(|def| def.allows(capability)))
            .unwrap_or(false)
    }

    fn role(&self, name: &str) -> Result<&RoleDefinition, ServiceError> {
        self.roles
            .get(name)
            .ok_or_else(|| ServiceError::InvalidRole(name.to_string()))
    }
}

fn new_record(username: &str, role: &str, daily_limit: u32, now: DateTime<Utc>) -> UserRecord {
    UserRecord {
        username: username.to_string(),
        role: role.to_string(),
        added_on: now,
        last_login: None,
        request_count: 0,
        daily_limit,
        daily_used: 0,
        last_reset: now,
    }
}

fn user_not_found(username: &str) -> ServiceError {
    ServiceError::NotFound(format!("User '{username}' not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::Duration;

    fn small_roles() -> RoleSet {
        let mut roles = BTreeMap::new();
        for (name, limit, manage) in [("Admin", 1000, true), ("Tester", 3, false), ("User", 100, false)] {
            roles.insert(
                name.to_string(),
                RoleDefinition {
                    can_manage_users: manage,
                    can_view_logs: manage,
                    can_use_all_models: manage,
                    can_upload_files: manage,
                    can_modify_workspace: manage,
                    daily_limit: limit,
                },
            );
        }
        RoleSet::new(roles)
    }

    async fn store(dir: &tempfile::TempDir) -> IdentityStore {
        IdentityStore::open(dir.path().join("users.json"), small_roles(), &["root".to_string()])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn seeds_admins_on_first_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let root = store.get_user("root").await.unwrap();
        assert_eq!(root.role, "Admin");
        assert_eq!(root.daily_limit, 1000);
        assert!(store.check_permission("root", Capability::ManageUsers).await);
    }

    #[tokio::test]
    async fn add_then_remove_revokes_access() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store.add_user("alice", "User").await.unwrap();
        assert!(store.is_authorized("alice").await);
        assert!(!store.is_authorized("Alice").await);

        let again = store.add_user("alice", "User").await;
        assert!(matches!(again, Err(ServiceError::AlreadyExists(_))));

        store.remove_user("alice").await.unwrap();
        assert!(!store.is_authorized("alice").await);
        assert!(matches!(
            store.remove_user("alice").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn add_user_validates_input() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        assert!(matches!(
            store.add_user("", "User").await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            store.add_user("bob", "Overlord").await,
            Err(ServiceError::InvalidRole(_))
        ));
        assert!(!store.is_authorized("bob").await);
    }

    #[tokio::test]
    async fn role_change_recomputes_limit_but_keeps_usage() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.add_user("carol", "User").await.unwrap();
        store.record_request("carol").await.unwrap();
        store.record_request("carol").await.unwrap();

        let updated = store.update_user("carol", Some("Tester")).await.unwrap();
        assert_eq!(updated.daily_limit, 3);
        assert_eq!(updated.daily_used, 2);

        assert!(matches!(
            store.update_user("carol", Some("Nope")).await,
            Err(ServiceError::InvalidRole(_))
        ));
        assert!(matches!(
            store.update_user("nobody", Some("User")).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn quota_rejects_after_limit_without_incrementing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.add_user("dave", "Tester").await.unwrap();

        for expected in 1..=3 {
            let usage = store.record_request("dave").await.unwrap();
            assert_eq!(usage.daily_used, expected);
        }
        assert!(matches!(
            store.record_request("dave").await,
            Err(ServiceError::RateLimited)
        ));

        let dave = store.get_user("dave").await.unwrap();
        assert_eq!(dave.daily_used, 3);
        assert_eq!(dave.request_count, 3);
    }

    #[tokio::test]
    async fn daily_counter_resets_on_a_later_day() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.add_user("erin", "Tester").await.unwrap();

        let today = Utc::now();
        for _ in 0..3 {
            store.record_request_at("erin", today).await.unwrap();
        }
        assert!(store.record_request_at("erin", today).await.is_err());

        let later = today + Duration::days(5);
        let usage = store.record_request_at("erin", later).await.unwrap();
        assert_eq!(usage.daily_used, 1);

        let erin = store.get_user("erin").await.unwrap();
        assert_eq!(erin.request_count, 4);
        assert_eq!(erin.last_reset, later);
    }

    #[tokio::test]
    async fn concurrent_requests_never_overshoot_quota() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store(&dir).await);
        store.add_user("frank", "Tester").await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..12 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move { store.record_request("frank").await }));
        }

        let mut accepted = 0;
        for t in tasks {
            if t.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 3);
        assert_eq!(store.get_user("frank").await.unwrap().daily_used, 3);
    }

    #[tokio::test]
    async fn unknown_user_or_role_has_no_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let store = IdentityStore::open(&path, small_roles(), &["root".to_string()])
            .await
            .unwrap();
        store.add_user("legacy", "Tester").await.unwrap();
        drop(store);

        // Reopen with a role set that no longer defines "Tester".
        let store = IdentityStore::open(&path, RoleSet::builtin(), &[]).await.unwrap();
        assert!(store.is_authorized("legacy").await);
        assert!(!store.check_permission("legacy", Capability::ViewLogs).await);
        assert!(!store.check_permission("ghost", Capability::ViewLogs).await);
    }

    #[tokio::test]
    async fn login_is_recorded_and_ignored_for_strangers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store.record_login("root").await.unwrap();
        assert!(store.get_user("root").await.unwrap().last_login.is_some());

        store.record_login("stranger").await.unwrap();
        assert!(!store.is_authorized("stranger").await);
    }

    #[tokio::test]
    async fn failed_write_leaves_users_and_quota_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let store = IdentityStore::open(data.join("users.json"), small_roles(), &["root".to_string()])
            .await
            .unwrap();
        std::fs::remove_dir_all(&data).unwrap();

        let err = store.add_user("alice", "User").await.unwrap_err();
        assert_eq!(err.code(), "internal_error");
        assert!(!store.is_authorized("alice").await);

        assert!(store.record_request("root").await.is_err());
        assert_eq!(store.get_user("root").await.unwrap().daily_used, 0);
    }
}
