use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Action, Module, SessionActor};
use crate::errors::{AppError, AppResult};
use crate::models::lead::{Lead, LeadCreateRequest, LeadUpdateRequest};
use crate::utils::{require_non_empty, utc_now};

const DEFAULT_STATUS: &str = "new";

#[utoipa::path(
    get,
    path = "/leads",
    tag = "Leads",
    responses((status = 200, description = "List leads", body = [Lead])),
    security(("bearerAuth" = []))
)]
pub async fn list_leads(State(state): State<AppState>, actor: SessionActor) -> AppResult<Json<Vec<Lead>>> {
    let principal = state.enforcer.require(&actor, Module::Leads, Action::View).await?;

    let leads = sqlx::query_as::<_, Lead>(
        "SELECT id, organization_id, owner_id, name, email, phone, status, notes, created_at, updated_at FROM leads WHERE organization_id = ? AND deleted_at IS NULL ORDER BY created_at DESC",
    )
    .bind(principal.organization_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(leads))
}

#[utoipa::path(
    post,
    path = "/leads",
    tag = "Leads",
    request_body = LeadCreateRequest,
    responses((status = 201, description = "Lead created", body = Lead)),
    security(("bearerAuth" = []))
)]
pub async fn create_lead(
    State(state): State<AppState>,
    actor: SessionActor,
    Json(payload): Json<LeadCreateRequest>,
) -> AppResult<(StatusCode, Json<Lead>)> {
    let principal = state.enforcer.require(&actor, Module::Leads, Action::Create).await?;

    let name = require_non_empty("name", &payload.name)?;
    let status = payload.status.clone().unwrap_or_else(|| DEFAULT_STATUS.to_string());
    let now = utc_now();
    let lead_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO leads (id, organization_id, owner_id, name, email, phone, status, notes, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(lead_id)
    .bind(principal.organization_id)
    .bind(principal.user_id)
    .bind(&name)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&status)
    .bind(&payload.notes)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let lead = fetch_lead(&state.pool, principal.organization_id, lead_id).await?;

    Ok((StatusCode::CREATED, Json(lead)))
}

#[utoipa::path(
    get,
    path = "/leads/{id}",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "Lead id")),
    responses((status = 200, description = "Lead detail", body = Lead)),
    security(("bearerAuth" = []))
)]
pub async fn get_lead(
    State(state): State<AppState>,
    actor: SessionActor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Lead>> {
    let principal = state.enforcer.require(&actor, Module::Leads, Action::View).await?;
    let lead = fetch_lead(&state.pool, principal.organization_id, id).await?;
    Ok(Json(lead))
}

#[utoipa::path(
    put,
    path = "/leads/{id}",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "Lead id")),
    request_body = LeadUpdateRequest,
    responses((status = 200, description = "Lead updated", body = Lead)),
    security(("bearerAuth" = []))
)]
pub async fn update_lead(
    State(state): State<AppState>,
    actor: SessionActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<LeadUpdateRequest>,
) -> AppResult<Json<Lead>> {
    let principal = state.enforcer.require(&actor, Module::Leads, Action::Edit).await?;
    let mut lead = fetch_lead(&state.pool, principal.organization_id, id).await?;

    if let Some(name) = payload.name.as_ref() {
        lead.name = require_non_empty("name", name)?;
    }
    if payload.email.is_some() {
        lead.email = payload.email.clone();
    }
    if payload.phone.is_some() {
        lead.phone = payload.phone.clone();
    }
    if let Some(status) = payload.status.as_ref() {
        lead.status = status.clone();
    }
    if payload.notes.is_some() {
        lead.notes = payload.notes.clone();
    }

    let now = utc_now();

    sqlx::query(
        "UPDATE leads SET name = ?, email = ?, phone = ?, status = ?, notes = ?, updated_at = ? WHERE id = ? AND organization_id = ?",
    )
    .bind(&lead.name)
    .bind(&lead.email)
    .bind(&lead.phone)
    .bind(&lead.status)
    .bind(&lead.notes)
    .bind(now)
    .bind(lead.id)
    .bind(principal.organization_id)
    .execute(&state.pool)
    .await?;

    lead.updated_at = now;

    Ok(Json(lead))
}

#[utoipa::path(
    delete,
    path = "/leads/{id}",
    tag = "Leads",
    params(("id" = Uuid, Path, description = "Lead id")),
    responses((status = 204, description = "Lead soft deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_lead(
    State(state): State<AppState>,
    actor: SessionActor,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = state.enforcer.require(&actor, Module::Leads, Action::Delete).await?;

    let now = utc_now();
    let affected = sqlx::query(
        "UPDATE leads SET deleted_at = ?, updated_at = ? WHERE id = ? AND organization_id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .bind(principal.organization_id)
    .execute(&state.pool)
    .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("lead not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Leads of other organizations are reported as missing.
async fn fetch_lead(pool: &SqlitePool, organization_id: Uuid, lead_id: Uuid) -> AppResult<Lead> {
    sqlx::query_as::<_, Lead>(
        "SELECT id, organization_id, owner_id, name, email, phone, status, notes, created_at, updated_at FROM leads WHERE id = ? AND organization_id = ? AND deleted_at IS NULL",
    )
    .bind(lead_id)
    .bind(organization_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("lead not found"))
}
