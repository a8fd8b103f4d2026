pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;
pub mod widget;

pub use services::registry::init;

use crate::config::BridgeConfig;
use crate::services::materializer::Materializer;
use crate::services::registry::InputHandlers;
use crate::services::session::SessionStore;
use crate::widget::UppyConfig;
use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn,
    routing::{delete, get, post},
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::inputs::publish_value,
        api::handlers::inputs::get_value,
        api::handlers::inputs::reset_input,
        api::handlers::inputs::end_session,
        api::handlers::widget::widget_page,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::inputs::InputUpdate,
            api::handlers::inputs::EndSessionResponse,
            models::FileTable,
            models::MaterializedFile,
            models::RawBatch,
            models::RawFileEntry,
            services::session::ResetCommand,
        )
    ),
    tags(
        (name = "inputs", description = "Upload input values"),
        (name = "widgets", description = "Rendered upload widgets"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub materializer: Arc<Materializer>,
    pub handlers: &'static InputHandlers,
    pub widgets: Arc<HashMap<String, UppyConfig>>,
    pub config: BridgeConfig,
}

impl AppState {
    pub fn new(
        config: BridgeConfig,
        handlers: &'static InputHandlers,
        materializer: Materializer,
        widgets: Vec<UppyConfig>,
    ) -> Self {
        let widgets = widgets
            .into_iter()
            .map(|w| (w.input_id().to_string(), w))
            .collect();
        Self {
            sessions: Arc::new(SessionStore::new()),
            materializer: Arc::new(materializer),
            handlers,
            widgets: Arc::new(widgets),
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let origin = if state.config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            state
                .config
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        )
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    // Inline batches carry base64, a third larger than the files themselves
    let body_limit = (state.config.max_file_size as usize)
        .saturating_mul(4)
        .saturating_div(3)
        .saturating_add(1024 * 1024);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/assets/uppy-bridge.js",
            get(api::handlers::widget::bridge_script),
        )
        .route(
            "/widgets/:input_id",
            get(api::handlers::widget::widget_page),
        )
        .route(
            "/sessions/:session_id/inputs/:input_id",
            post(api::handlers::inputs::publish_value).get(api::handlers::inputs::get_value),
        )
        .route(
            "/sessions/:session_id/inputs/:input_id/reset",
            post(api::handlers::inputs::reset_input),
        )
        .route(
            "/sessions/:session_id",
            delete(api::handlers::inputs::end_session),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
