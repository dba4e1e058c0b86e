use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    response::{IntoResponse, Response},
    routing::{any, get, post, put},
    Router,
};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorError,
    GovernorLayer,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::admin_handler::{self, AdminUserList};
use crate::config::Config;
use crate::enrichment_handler;
use crate::errors::AppError;
use crate::handlers::{self, method_not_allowed, AppState};
use crate::models::*;
use crate::table_handler;
use crate::workflow_handler;

/// Request bodies above 1 MiB are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    info(title = "Prospect CRM API", description = "Prospects, custom tables, enrichments and N8N workflows"),
    paths(
        handlers::health,
        handlers::list_prospects,
        handlers::get_prospect,
        handlers::create_prospect,
        handlers::update_prospect,
        handlers::delete_prospect,
        enrichment_handler::list_enrichments,
        enrichment_handler::create_enrichment,
        enrichment_handler::update_enrichment,
        enrichment_handler::delete_enrichment,
        table_handler::list_custom_tables,
        table_handler::create_custom_table,
        table_handler::update_custom_table,
        table_handler::delete_custom_table,
        table_handler::list_records,
        table_handler::get_record,
        table_handler::create_record,
        table_handler::update_record,
        table_handler::delete_record,
        workflow_handler::generate_prospects,
        workflow_handler::seo_audit,
        workflow_handler::prospection_email,
        admin_handler::list_users,
    ),
    components(schemas(
        HealthStatus,
        MessageResponse,
        Prospect,
        NewProspect,
        ProspectPatch,
        ProspectPage,
        CustomTable,
        NewCustomTable,
        CustomTablePatch,
        RecordPage,
        Enrichment,
        NewEnrichment,
        EnrichmentPatch,
        GenerateProspectsRequest,
        SeoAuditRequest,
        ProspectionEmailRequest,
        AdminUserList,
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
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

/// Rate limiter rejections use the same JSON envelope as every other error.
fn rate_limit_response(error: GovernorError) -> Response {
    AppError::from(error).into_response()
}

/// Replenish period for one request of quota, from a requests-per-second rate.
fn replenish_period_ms(per_second: u64) -> u64 {
    (1000 / per_second.max(1)).max(1)
}

/// Builds the full application router.
///
/// Health and API docs are outside the rate limiter; every `/api/*` data
/// route gets the body limit and per-IP rate limiting.
pub fn build_router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let config: &Config = &state.config;

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(replenish_period_ms(config.rate_limit_per_second))
            .burst_size(config.rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .error_handler(rate_limit_response)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let api_routes = Router::new()
        // Prospects
        .route(
            "/api/prospects",
            get(handlers::list_prospects)
                .post(handlers::create_prospect)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/prospects/:id",
            get(handlers::get_prospect)
                .put(handlers::update_prospect)
                .delete(handlers::delete_prospect)
                .fallback(method_not_allowed),
        )
        // Enriched information
        .route(
            "/api/prospects/:id/enrichments",
            get(enrichment_handler::list_enrichments)
                .post(enrichment_handler::create_enrichment)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/enrichments/:id",
            put(enrichment_handler::update_enrichment)
                .delete(enrichment_handler::delete_enrichment)
                .fallback(method_not_allowed),
        )
        // Custom table definitions
        .route(
            "/api/custom-tables",
            get(table_handler::list_custom_tables)
                .post(table_handler::create_custom_table)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/custom-tables/:id",
            put(table_handler::update_custom_table)
                .delete(table_handler::delete_custom_table)
                .fallback(method_not_allowed),
        )
        // Custom table records
        .route("/api/tables", any(handlers::missing_table_name))
        .route("/api/tables/", any(handlers::missing_table_name))
        .route(
            "/api/tables/:table_name",
            get(table_handler::list_records)
                .post(table_handler::create_record)
                .put(table_handler::missing_record_id)
                .delete(table_handler::missing_record_id)
                .fallback(method_not_allowed),
        )
        .route(
            "/api/tables/:table_name/:id",
            get(table_handler::get_record)
                .put(table_handler::update_record)
                .delete(table_handler::delete_record)
                .fallback(method_not_allowed),
        )
        // N8N workflows
        .route(
            "/api/workflows/generate-prospects",
            post(workflow_handler::generate_prospects).fallback(method_not_allowed),
        )
        .route(
            "/api/workflows/seo-audit",
            post(workflow_handler::seo_audit).fallback(method_not_allowed),
        )
        .route(
            "/api/workflows/prospection-email",
            post(workflow_handler::prospection_email).fallback(method_not_allowed),
        )
        // Admin
        .route(
            "/api/admin/users",
            get(admin_handler::list_users).fallback(method_not_allowed),
        )
        // Oversized bodies surface as a JSON rejection, mapped to PAYLOAD_TOO_LARGE
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(GovernorLayer {
            config: governor_conf,
        });

    let app = Router::new()
        .route(
            "/api/health",
            get(handlers::health).fallback(method_not_allowed),
        )
        .merge(api_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(handlers::endpoint_not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    Ok(app)
}
