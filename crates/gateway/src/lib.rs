//! DeepSearch API Gateway
//!
//! The HTTP surface of the service.
//! Handles:
//! - Account signup and login
//! - Document upload, listing, download and deletion
//! - Rate limiting
//! - Observability (logging, metrics, request ids)

pub mod handlers;
pub mod middleware;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Router,
};
use deepsearch_common::{
    auth::JwtManager,
    config::AppConfig,
    db::{DocumentRepository, UserRepository},
    errors::Result,
    storage::ObjectStore,
};
use deepsearch_ingestion::{EntityExtractor, IngestionPipeline, PipelineSettings};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub pipeline: Arc<IngestionPipeline>,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    /// Wire collaborators together; fails when no JWT secret is configured
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserRepository>,
        documents: Arc<dyn DocumentRepository>,
        store: Arc<dyn ObjectStore>,
        extractor: Arc<dyn EntityExtractor>,
    ) -> Result<Self> {
        let jwt = JwtManager::new(config.jwt_secret()?, config.auth.jwt_expiration_secs);

        let pipeline = IngestionPipeline::new(
            documents.clone(),
            store,
            extractor,
            PipelineSettings::from_config(&config),
        );

        Ok(Self {
            config: Arc::new(config),
            users,
            documents,
            pipeline: Arc::new(pipeline),
            jwt: Arc::new(jwt),
        })
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(allowed))
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // CORS configuration
    let cors = cors_layer(&config.server.cors_origins);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let upload_limit = DefaultBodyLimit::max(config.upload.max_file_bytes + MULTIPART_OVERHEAD);

    // API routes
    let mut api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Account endpoints
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))

        // Document endpoints
        .route(
            "/documents/upload",
            post(handlers::documents::upload_document).layer(upload_limit),
        )
        .route("/documents", get(handlers::documents::list_documents))
        .route(
            "/documents/{id}",
            get(handlers::documents::get_document).delete(handlers::documents::delete_document),
        )
        .route("/documents/{id}/download", get(handlers::documents::download_document))
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_metrics));

    if config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );
        let limit = config.rate_limit.requests_per_second;
        api_routes = api_routes.layer(axum::middleware::from_fn(
            move |req: axum::extract::Request, next: axum::middleware::Next| {
                middleware::rate_limit::rate_limit_middleware(req, next, limiter.clone(), limit)
            },
        ));
    }

    // Compose the app
    Router::new()
        .route("/", get(handlers::health::root))
        .nest("/api", api_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_accepts_lists() {
        // Builds without panicking for both shapes
        let _ = cors_layer(&[]);
        let _ = cors_layer(&["http://localhost:5173".to_string(), "bad\norigin".to_string()]);
    }
}
