use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{defaults_for_role, Action, Module, Principal, Role, SessionActor, UserPermissions};
use crate::errors::{AppError, AppResult};
use crate::models::user::{DbUser, User, UserCreateRequest, UserPermissionsResponse};
use crate::routes::auth::ensure_email_available;
use crate::utils::{hash_password, normalize_email, require_non_empty, utc_now};

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses((status = 200, description = "Users of the caller's organization", body = [User])),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, actor: SessionActor) -> AppResult<Json<Vec<User>>> {
    let principal = state.enforcer.require(&actor, Module::Users, Action::View).await?;

    let users = sqlx::query_as::<_, DbUser>(
        "SELECT id, organization_id, name, email, password_hash, role, permissions, created_at, updated_at, deleted_at FROM users WHERE organization_id = ? AND deleted_at IS NULL ORDER BY created_at",
    )
    .bind(principal.organization_id)
    .fetch_all(&state.pool)
    .await?;

    let users: Vec<User> = users.into_iter().map(User::try_from).collect::<Result<_, _>>()?;

    Ok(Json(users))
}

/// Adds a user to the caller's organization with the catalog defaults of its role.
#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid role or payload"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    actor: SessionActor,
    Json(payload): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let principal = state.enforcer.require(&actor, Module::Users, Action::Create).await?;

    if payload.role == Role::Owner {
        return Err(AppError::bad_request("the owner role cannot be assigned"));
    }
    ensure_outranks_or_equals(&principal, payload.role)?;

    let name = require_non_empty("name", &payload.name)?;
    let email = normalize_email(&payload.email)?;
    ensure_email_available(&state.pool, &email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, organization_id, name, email, password_hash, role, permissions, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(principal.organization_id)
    .bind(&name)
    .bind(&email)
    .bind(password_hash)
    .bind(payload.role.as_str())
    .bind(defaults_for_role(payload.role).to_json())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    tracing::info!(%user_id, role = %payload.role, created_by = %principal.user_id, "user created");

    let user: User = fetch_user(&state.pool, principal.organization_id, user_id).await?.try_into()?;

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "User detail", body = User)),
    security(("bearerAuth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    actor: SessionActor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let principal = state.enforcer.require(&actor, Module::Users, Action::View).await?;
    let user: User = fetch_user(&state.pool, principal.organization_id, id).await?.try_into()?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 204, description = "User soft deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    actor: SessionActor,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = state.enforcer.require(&actor, Module::Users, Action::Delete).await?;

    if id == principal.user_id {
        return Err(AppError::bad_request("cannot delete your own account"));
    }

    let target = fetch_user(&state.pool, principal.organization_id, id).await?;
    let target_role = target.role()?;
    if target_role == Role::Owner {
        return Err(AppError::denied());
    }
    ensure_outranks_or_equals(&principal, target_role)?;

    let now = utc_now();
    let affected = sqlx::query(
        "UPDATE users SET deleted_at = ?, updated_at = ? WHERE id = ? AND organization_id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .bind(principal.organization_id)
    .execute(&state.pool)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("user not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Resolved matrix of a user (stored document completed with role defaults).
#[utoipa::path(
    get,
    path = "/users/{id}/permissions",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "Resolved permissions", body = UserPermissionsResponse)),
    security(("bearerAuth" = []))
)]
pub async fn get_user_permissions(
    State(state): State<AppState>,
    actor: SessionActor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserPermissionsResponse>> {
    let principal = state.enforcer.require(&actor, Module::Users, Action::View).await?;
    let target = fetch_user(&state.pool, principal.organization_id, id).await?;
    let target = Principal::from_record(&target.to_record()?);

    Ok(Json(UserPermissionsResponse {
        user_id: target.user_id,
        role: target.role,
        permissions: target.permissions,
    }))
}

/// Replaces a user's matrix. The body must list every module and action.
#[utoipa::path(
    put,
    path = "/users/{id}/permissions",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Permissions replaced", body = UserPermissionsResponse),
        (status = 422, description = "Matrix incomplete or malformed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user_permissions(
    State(state): State<AppState>,
    actor: SessionActor,
    Path(id): Path<Uuid>,
    Json(permissions): Json<UserPermissions>,
) -> AppResult<Json<UserPermissionsResponse>> {
    let principal = state.enforcer.require(&actor, Module::Users, Action::Edit).await?;
    write_permissions(&state.pool, &principal, id, |_| permissions).await.map(Json)
}

/// Rewrites a user's matrix from the defaults of their role.
#[utoipa::path(
    post,
    path = "/users/{id}/permissions/reset",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "Permissions reset to role defaults", body = UserPermissionsResponse)),
    security(("bearerAuth" = []))
)]
pub async fn reset_user_permissions(
    State(state): State<AppState>,
    actor: SessionActor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserPermissionsResponse>> {
    let principal = state.enforcer.require(&actor, Module::Users, Action::Edit).await?;
    write_permissions(&state.pool, &principal, id, defaults_for_role).await.map(Json)
}

async fn write_permissions(
    pool: &SqlitePool,
    principal: &Principal,
    user_id: Uuid,
    build: impl FnOnce(Role) -> UserPermissions,
) -> AppResult<UserPermissionsResponse> {
    if user_id == principal.user_id && !principal.is_owner() {
        tracing::warn!(target: "security", %user_id, "attempt to rewrite own permissions");
        return Err(AppError::denied());
    }

    let target = fetch_user(pool, principal.organization_id, user_id).await?;
    let role = target.role()?;
    ensure_outranks_or_equals(principal, role)?;

    let permissions = build(role);
    if let Some((module, action)) = principal.ungranted_in(&permissions) {
        tracing::warn!(
            target: "security",
            %user_id,
            changed_by = %principal.user_id,
            module = %module,
            action = %action,
            "attempt to grant a permission the caller does not hold"
        );
        return Err(AppError::denied());
    }

    store_permissions(pool, principal.organization_id, user_id, &permissions).await?;

    tracing::info!(%user_id, changed_by = %principal.user_id, "user permissions replaced");

    Ok(UserPermissionsResponse {
        user_id,
        role,
        permissions,
    })
}

async fn store_permissions(
    pool: &SqlitePool,
    organization_id: Uuid,
    user_id: Uuid,
    permissions: &UserPermissions,
) -> AppResult<()> {
    let affected = sqlx::query(
        "UPDATE users SET permissions = ?, updated_at = ? WHERE id = ? AND organization_id = ? AND deleted_at IS NULL",
    )
    .bind(permissions.to_json())
    .bind(utc_now())
    .bind(user_id)
    .bind(organization_id)
    .execute(pool)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("user not found"));
    }

    Ok(())
}

/// Callers may only manage users whose role does not exceed their own.
fn ensure_outranks_or_equals(principal: &Principal, target: Role) -> AppResult<()> {
    if target > principal.role {
        return Err(AppError::denied());
    }
    Ok(())
}

pub(crate) async fn fetch_user(pool: &SqlitePool, organization_id: Uuid, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(
        "SELECT id, organization_id, name, email, password_hash, role, permissions, created_at, updated_at, deleted_at FROM users WHERE id = ? AND organization_id = ? AND deleted_at IS NULL",
    )
    .bind(user_id)
    .bind(organization_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))
}
