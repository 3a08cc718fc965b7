use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`
use uuid::Uuid;

use crm_access::authz::{defaults_for_role, Module, ModulePermissions, Role, SessionActor, UserPermissions};
use crm_access::create_app;
use crm_access::jwt::JwtConfig;

const SECRET: &str = "test-secret";

async fn setup() -> Result<(TempDir, Router)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", SECRET);
    let app = create_app(pool).await?;
    Ok((dir, app))
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req.header("content-type", "application/json").body(Body::from(body.to_string()))?,
        None => req.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    Ok((status, value))
}

struct Registered {
    token: String,
    user_id: Uuid,
    organization_id: Uuid,
}

async fn register(app: &Router, org: &str, email: &str) -> Result<Registered> {
    let body = json!({
        "organization_name": org,
        "name": "Owner",
        "email": email,
        "password": "password123"
    });
    let (status, v) = send(app, "POST", "/auth/register", None, Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED, "register failed: {v}");

    Ok(Registered {
        token: v["token"].as_str().context("missing token")?.to_string(),
        user_id: v["user"]["id"].as_str().context("missing user id")?.parse()?,
        organization_id: v["user"]["organization_id"].as_str().context("missing org id")?.parse()?,
    })
}

async fn login(app: &Router, email: &str) -> Result<String> {
    let (status, v) = send(app, "POST", "/auth/login", None, Some(json!({ "email": email, "password": "password123" }))).await?;
    assert_eq!(status, StatusCode::OK, "login failed: {v}");
    Ok(v["token"].as_str().context("missing token")?.to_string())
}

async fn create_member(app: &Router, token: &str, email: &str, role: &str) -> Result<(StatusCode, Value)> {
    let body = json!({ "name": "Member", "email": email, "password": "password123", "role": role });
    send(app, "POST", "/users", Some(token), Some(body)).await
}

#[tokio::test]
async fn health_reports_db_ok() -> Result<()> {
    let (_dir, app) = setup().await?;
    let (status, v) = send(&app, "GET", "/api/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["db_ok"], json!(true));
    Ok(())
}

#[tokio::test]
async fn owner_profile_grants_every_module() -> Result<()> {
    let (_dir, app) = setup().await?;
    let owner = register(&app, "Acme", "owner@acme.test").await?;

    let (status, v) = send(&app, "GET", "/auth/me/permissions", Some(&owner.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["role"], json!("owner"));
    for module in Module::ALL {
        assert_eq!(v["navigation"][module.as_str()], json!(true), "{module}");
    }
    Ok(())
}

#[tokio::test]
async fn manager_is_limited_by_default_matrix() -> Result<()> {
    let (_dir, app) = setup().await?;
    let owner = register(&app, "Acme", "owner@acme.test").await?;
    let (status, _) = create_member(&app, &owner.token, "manager@acme.test", "manager").await?;
    assert_eq!(status, StatusCode::CREATED);
    let manager = login(&app, "manager@acme.test").await?;

    let (status, lead) = send(&app, "POST", "/leads", Some(&manager), Some(json!({ "name": "Northwind" }))).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(lead["status"], json!("new"));
    let lead_id = lead["id"].as_str().context("missing lead id")?.to_string();

    let (status, _) = send(&app, "PUT", &format!("/leads/{lead_id}"), Some(&manager), Some(json!({ "status": "qualified" }))).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, v) = send(&app, "DELETE", &format!("/leads/{lead_id}"), Some(&manager), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(v["message"], json!("forbidden: insufficient permission"));

    let (status, _) = send(&app, "GET", "/users", Some(&manager), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, v) = send(&app, "GET", "/auth/me/permissions", Some(&manager), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["navigation"]["leads"], json!(true));
    assert_eq!(v["navigation"]["settings"], json!(false));
    assert_eq!(v["permissions"]["leads"]["delete"], json!(false));
    Ok(())
}

#[tokio::test]
async fn owner_customizes_and_resets_member_matrix() -> Result<()> {
    let (_dir, app) = setup().await?;
    let owner = register(&app, "Acme", "owner@acme.test").await?;
    let (_, member) = create_member(&app, &owner.token, "manager@acme.test", "manager").await?;
    let member_id = member["id"].as_str().context("missing member id")?.to_string();
    let manager = login(&app, "manager@acme.test").await?;

    let (_, lead) = send(&app, "POST", "/leads", Some(&manager), Some(json!({ "name": "Contoso" }))).await?;
    let lead_id = lead["id"].as_str().context("missing lead id")?.to_string();

    let custom = defaults_for_role(Role::Manager).with(Module::Leads, ModulePermissions::ALL);
    let uri = format!("/users/{member_id}/permissions");
    let (status, v) = send(&app, "PUT", &uri, Some(&owner.token), Some(serde_json::to_value(&custom)?)).await?;
    assert_eq!(status, StatusCode::OK, "update failed: {v}");
    assert_eq!(v["permissions"]["leads"]["delete"], json!(true));

    let (status, _) = send(&app, "DELETE", &format!("/leads/{lead_id}"), Some(&manager), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let mut partial = serde_json::to_value(&custom)?;
    partial.as_object_mut().context("matrix is an object")?.remove("settings");
    let (status, _) = send(&app, "PUT", &uri, Some(&owner.token), Some(partial)).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, v) = send(&app, "POST", &format!("{uri}/reset"), Some(&owner.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["permissions"], serde_json::to_value(defaults_for_role(Role::Manager))?);

    let (status, v) = send(&app, "GET", &uri, Some(&owner.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["role"], json!("manager"));
    assert_eq!(v["permissions"]["leads"]["delete"], json!(false));
    Ok(())
}

/// Owner hands a manager `users.view` + `users.edit`; returns (manager token, manager id).
async fn user_editor(app: &Router, owner: &Registered, email: &str) -> Result<(String, String)> {
    let (_, member) = create_member(app, &owner.token, email, "manager").await?;
    let member_id = member["id"].as_str().context("missing member id")?.to_string();
    let matrix = defaults_for_role(Role::Manager).with(Module::Users, ModulePermissions::new(true, false, true, false));
    let (status, v) = send(app, "PUT", &format!("/users/{member_id}/permissions"), Some(&owner.token), Some(serde_json::to_value(&matrix)?)).await?;
    assert_eq!(status, StatusCode::OK, "grant failed: {v}");
    Ok((login(app, email).await?, member_id))
}

#[tokio::test]
async fn member_cannot_rewrite_own_permissions() -> Result<()> {
    let (_dir, app) = setup().await?;
    let owner = register(&app, "Acme", "owner@acme.test").await?;
    let (editor, editor_id) = user_editor(&app, &owner, "editor@acme.test").await?;

    let everything = serde_json::to_value(UserPermissions::uniform(ModulePermissions::ALL))?;
    let uri = format!("/users/{editor_id}/permissions");
    let (status, _) = send(&app, "PUT", &uri, Some(&editor), Some(everything)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "POST", &format!("{uri}/reset"), Some(&editor), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, v) = send(&app, "GET", &uri, Some(&owner.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["permissions"]["settings"]["view"], json!(false));
    assert_eq!(v["permissions"]["users"]["delete"], json!(false));
    assert_eq!(v["permissions"]["users"]["edit"], json!(true));
    Ok(())
}

#[tokio::test]
async fn member_cannot_grant_what_they_lack() -> Result<()> {
    let (_dir, app) = setup().await?;
    let owner = register(&app, "Acme", "owner@acme.test").await?;
    let (editor, _) = user_editor(&app, &owner, "editor@acme.test").await?;
    let (_, peer) = create_member(&app, &owner.token, "peer@acme.test", "manager").await?;
    let uri = format!("/users/{}/permissions", peer["id"].as_str().context("missing peer id")?);

    let wider = defaults_for_role(Role::Manager).with(Module::Settings, ModulePermissions::new(false, false, false, true));
    let (status, v) = send(&app, "PUT", &uri, Some(&editor), Some(serde_json::to_value(&wider)?)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(v["message"], json!("forbidden: insufficient permission"));

    let (_, v) = send(&app, "GET", &uri, Some(&owner.token), None).await?;
    assert_eq!(v["permissions"]["settings"]["delete"], json!(false));

    // grants the editor holds may be passed on
    let within = defaults_for_role(Role::Manager).with(Module::Users, ModulePermissions::new(true, false, false, false));
    let (status, v) = send(&app, "PUT", &uri, Some(&editor), Some(serde_json::to_value(&within)?)).await?;
    assert_eq!(status, StatusCode::OK, "delegation failed: {v}");
    assert_eq!(v["permissions"]["users"]["view"], json!(true));
    Ok(())
}

#[tokio::test]
async fn role_assignment_rules() -> Result<()> {
    let (_dir, app) = setup().await?;
    let owner = register(&app, "Acme", "owner@acme.test").await?;

    let (status, _) = create_member(&app, &owner.token, "second@acme.test", "owner").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = create_member(&app, &owner.token, "admin@acme.test", "admin").await?;
    assert_eq!(status, StatusCode::CREATED);
    let admin = login(&app, "admin@acme.test").await?;

    let (status, _) = create_member(&app, &admin, "user@acme.test", "user").await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, "DELETE", &format!("/users/{}", owner.user_id), Some(&admin), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let user = login(&app, "user@acme.test").await?;
    let (status, _) = create_member(&app, &user, "other@acme.test", "user").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn tenant_isolation_applies_to_owner() -> Result<()> {
    let (_dir, app) = setup().await?;
    let acme = register(&app, "Acme", "owner@acme.test").await?;
    let globex = register(&app, "Globex", "owner@globex.test").await?;

    let (_, lead) = send(&app, "POST", "/leads", Some(&acme.token), Some(json!({ "name": "Initech" }))).await?;
    let lead_id = lead["id"].as_str().context("missing lead id")?.to_string();

    // another tenant's lead looks like a missing one
    let (status, _) = send(&app, "GET", &format!("/leads/{lead_id}"), Some(&globex.token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // session claiming a different organization than the stored one
    let forged = JwtConfig::new(SECRET, 1).encode(&SessionActor::new(acme.user_id, globex.organization_id, Role::Owner))?;
    for uri in ["/leads", "/users", "/auth/me/permissions"] {
        let (status, v) = send(&app, "GET", uri, Some(&forged), None).await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(v["message"], json!("forbidden: insufficient permission"));
    }

    let (status, _) = send(&app, "GET", "/leads", Some(&acme.token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(acme.organization_id, globex.organization_id);
    Ok(())
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() -> Result<()> {
    let (_dir, app) = setup().await?;
    let owner = register(&app, "Acme", "owner@acme.test").await?;

    let (status, _) = send(&app, "GET", "/leads", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/leads", Some("garbage"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // valid signature, user unknown to the store
    let ghost = JwtConfig::new(SECRET, 1).encode(&SessionActor::new(Uuid::new_v4(), owner.organization_id, Role::Owner))?;
    let (status, _) = send(&app, "GET", "/auth/me/permissions", Some(&ghost), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}
