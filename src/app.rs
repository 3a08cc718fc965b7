use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::Enforcer;
use crate::db::SqliteUserStore;
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{access, auth, health, leads, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub enforcer: Enforcer,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig) -> Self {
        let store = Arc::new(SqliteUserStore::new(pool.clone()));
        Self {
            pool,
            jwt: Arc::new(jwt),
            enforcer: Enforcer::new(store),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    Ok(router(AppState::new(pool, jwt_config)))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/me/permissions", get(access::my_permissions))
        .route("/logout", post(auth::logout));

    let user_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/:id", get(users::get_user).delete(users::delete_user))
        .route("/:id/permissions", get(users::get_user_permissions).put(users::update_user_permissions))
        .route("/:id/permissions/reset", post(users::reset_user_permissions));

    let lead_routes = Router::new()
        .route("/", get(leads::list_leads).post(leads::create_lead))
        .route("/:id", get(leads::get_lead).put(leads::update_lead).delete(leads::delete_lead));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/leads", lead_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
