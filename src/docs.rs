use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::ServerBuilder;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{authz, models, routes};

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::logout,
        routes::access::my_permissions,
        routes::users::list_users,
        routes::users::create_user,
        routes::users::get_user,
        routes::users::delete_user,
        routes::users::get_user_permissions,
        routes::users::update_user_permissions,
        routes::users::reset_user_permissions,
        routes::leads::list_leads,
        routes::leads::create_lead,
        routes::leads::get_lead,
        routes::leads::update_lead,
        routes::leads::delete_lead
    ),
    components(
        schemas(
            authz::Role,
            authz::Module,
            authz::Action,
            authz::ModulePermissions,
            authz::GateState,
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::user::UserCreateRequest,
            models::user::UserPermissionsResponse,
            models::access::AccessProfile,
            models::lead::Lead,
            models::lead::LeadCreateRequest,
            models::lead::LeadUpdateRequest,
            routes::health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Authentication and the caller's access profile"),
        (name = "Users", description = "Organization members and their permission matrices"),
        (name = "Leads", description = "Lead management"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.servers = Some(vec![ServerBuilder::new()
        .url(format!("http://localhost:{port}"))
        .build()]);
    doc
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", doc))
}
