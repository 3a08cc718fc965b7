use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

use crm_access::authz::{
    defaults_for_role, Action, Backfill, BackfillOutcome, Decision, Enforcer, Module, ModulePermissions, Role,
    SessionActor, UserPermissions, UserStore,
};
use crm_access::db::SqliteUserStore;

async fn setup() -> Result<(TempDir, SqlitePool, Uuid)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("backfill.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    let org = Uuid::new_v4();
    let now = chrono::Utc::now();
    sqlx::query("INSERT INTO organizations (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(org)
        .bind("Acme")
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await?;

    Ok((dir, pool, org))
}

async fn insert_user(pool: &SqlitePool, org: Uuid, role: Role, permissions: Option<&str>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO users (id, organization_id, name, email, password_hash, role, permissions, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(org)
    .bind("Someone")
    .bind(format!("{id}@acme.test"))
    .bind("not-a-real-hash")
    .bind(role.as_str())
    .bind(permissions)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

#[tokio::test]
async fn backfill_rewrites_legacy_rows_once() -> Result<()> {
    let (_dir, pool, org) = setup().await?;
    let custom = UserPermissions::none().with(Module::Goals, ModulePermissions::ALL).to_json();

    let legacy = insert_user(&pool, org, Role::Admin, Some(r#"["leads","tasks"]"#)).await?;
    let null = insert_user(&pool, org, Role::User, None).await?;
    let current = insert_user(&pool, org, Role::Manager, Some(custom.as_str())).await?;

    let store = Arc::new(SqliteUserStore::new(pool.clone()));
    let first = Backfill::new(store.clone()).run().await?;
    assert_eq!(first.writes(), 2);
    assert_eq!(first.outcome_for(current), Some(&BackfillOutcome::Unchanged));

    let legacy_row = store.find_user(legacy).await?.context("legacy user missing")?;
    assert_eq!(legacy_row.permissions, Some(defaults_for_role(Role::Admin).to_json()));
    let null_row = store.find_user(null).await?.context("null user missing")?;
    assert_eq!(null_row.permissions, Some(defaults_for_role(Role::User).to_json()));
    let current_row = store.find_user(current).await?.context("current user missing")?;
    assert_eq!(current_row.permissions.as_deref(), Some(custom.as_str()));

    let second = Backfill::new(store).run().await?;
    assert_eq!(second.writes(), 0);
    Ok(())
}

#[tokio::test]
async fn compare_and_set_rejects_stale_write() -> Result<()> {
    let (_dir, pool, org) = setup().await?;
    let user = insert_user(&pool, org, Role::Manager, Some("legacy")).await?;
    let store = SqliteUserStore::new(pool.clone());

    // an administrator saves a new matrix after the backfill read "legacy"
    let edit = defaults_for_role(Role::Manager).with(Module::Reports, ModulePermissions::ALL).to_json();
    assert!(store.compare_and_set_permissions(user, Some("legacy"), &edit).await?);

    let replacement = defaults_for_role(Role::Manager).to_json();
    assert!(!store.compare_and_set_permissions(user, Some("legacy"), &replacement).await?);

    let row = store.find_user(user).await?.context("user missing")?;
    assert_eq!(row.permissions.as_deref(), Some(edit.as_str()));
    Ok(())
}

#[tokio::test]
async fn enforcer_reads_legacy_rows_with_role_defaults() -> Result<()> {
    let (_dir, pool, org) = setup().await?;
    let user = insert_user(&pool, org, Role::Manager, Some(r#"{"canEditLeads": true}"#)).await?;
    let enforcer = Enforcer::new(Arc::new(SqliteUserStore::new(pool)));
    let actor = SessionActor::new(user, org, Role::Manager);

    assert_eq!(enforcer.check(Some(&actor), Module::Leads, Action::View).await?, Decision::Allowed(org));
    assert_eq!(enforcer.check(Some(&actor), Module::Settings, Action::Delete).await?, Decision::ForbiddenGrant);

    let elsewhere = SessionActor::new(user, Uuid::new_v4(), Role::Manager);
    assert_eq!(enforcer.check(Some(&elsewhere), Module::Leads, Action::View).await?, Decision::ForbiddenTenant);
    Ok(())
}
