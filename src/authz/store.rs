use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Role;
use crate::errors::AppResult;

/// Authorization-relevant slice of a user row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: Role,
    /// Raw stored matrix document, possibly legacy or absent.
    pub permissions: Option<String>,
}

/// System of record for user role, organization and stored permissions
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<UserRecord>>;

    async fn list_users(&self) -> AppResult<Vec<UserRecord>>;

    /// Replaces the stored permissions only if they still equal `expected`
    /// (`None` matching a NULL column). Returns whether the write happened.
    async fn compare_and_set_permissions(
        &self,
        user_id: Uuid,
        expected: Option<&str>,
        replacement: &str,
    ) -> AppResult<bool>;
}

/// Process-local store, used by tests and tooling.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: UserRecord) {
        self.users.write().await.insert(record.user_id, record);
    }

    pub async fn remove(&self, user_id: Uuid) {
        self.users.write().await.remove(&user_id);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn list_users(&self) -> AppResult<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.user_id);
        Ok(users)
    }

    async fn compare_and_set_permissions(
        &self,
        user_id: Uuid,
        expected: Option<&str>,
        replacement: &str,
    ) -> AppResult<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&user_id) {
            Some(record) if record.permissions.as_deref() == expected => {
                record.permissions = Some(replacement.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
