use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::{UserRecord, UserStore};
use crate::errors::AppResult;
use crate::models::user::DbUser;
use crate::utils::utc_now;

const USER_COLUMNS: &str =
    "id, organization_id, name, email, password_hash, role, permissions, created_at, updated_at, deleted_at";

/// [`UserStore`] over the `users` table.
#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ? AND deleted_at IS NULL");
        let user = sqlx::query_as::<_, DbUser>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        user.as_ref().map(DbUser::to_record).transpose()
    }

    async fn list_users(&self) -> AppResult<Vec<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at");
        let users = sqlx::query_as::<_, DbUser>(&sql).fetch_all(&self.pool).await?;

        users.iter().map(DbUser::to_record).collect()
    }

    async fn compare_and_set_permissions(
        &self,
        user_id: Uuid,
        expected: Option<&str>,
        replacement: &str,
    ) -> AppResult<bool> {
        // `IS` compares NULL to NULL as equal
        let result = sqlx::query(
            "UPDATE users SET permissions = ?, updated_at = ? WHERE id = ? AND permissions IS ? AND deleted_at IS NULL",
        )
        .bind(replacement)
        .bind(utc_now())
        .bind(user_id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
