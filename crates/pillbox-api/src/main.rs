//! pillbox-api - HTTP API server for pillbox

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pillbox_core::defaults;
use pillbox_db::{Database, ImageStore};
use pillbox_vision::VisionClient;

use handlers::drugs::{
    analyze_batch, analyze_single, delete_drug, expiring_drugs, list_drugs, search_drugs,
    update_drug, upload_images,
};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically — useful for
/// log correlation and debugging slow vision calls.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Application state shared across handlers.
///
/// Constructed once at startup and cloned per request; there is no
/// module-level singleton anywhere.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub images: Arc<ImageStore>,
    pub vision: Arc<VisionClient>,
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// API-level error with an HTTP status.
#[derive(Debug)]
pub enum ApiError {
    Internal(String),
    NotFound(String),
    BadRequest(String),
}

impl From<pillbox_core::Error> for ApiError {
    fn from(err: pillbox_core::Error) -> Self {
        use pillbox_core::Error;
        match err {
            Error::DrugNotFound(_) | Error::ImageNotFound(_) => ApiError::NotFound(err.to_string()),
            Error::InvalidInput(_) | Error::SizeLimitExceeded { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Parse allowed origins from a comma-separated environment variable.
///
/// Defaults cover the local dev frontends when `ALLOWED_ORIGINS` is unset
/// or empty.
fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str = std::env::var(defaults::ENV_ALLOWED_ORIGINS)
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());

    if origins_str.trim().is_empty() {
        return vec![
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://localhost:5173"),
        ];
    }

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

// =============================================================================
// BASIC HANDLERS
// =============================================================================

/// Service banner.
async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "pillbox",
        "drugs": "/api/drugs",
        "uploads": defaults::UPLOADS_MOUNT,
    }))
}

/// Liveness check with a database ping.
async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    sqlx::query("SELECT 1")
        .execute(state.db.pool())
        .await
        .map_err(|e| ApiError::Internal(format!("database ping failed: {}", e)))?;

    Ok(Json(serde_json::json!({"status": "ok"})))
}

// =============================================================================
// STARTUP
// =============================================================================

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   RUST_LOG    - standard env filter
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pillbox_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("pillbox-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing();

    // Database: pool + versioned migrations
    let database_url = std::env::var(defaults::ENV_DATABASE_URL)
        .unwrap_or_else(|_| defaults::DATABASE_URL.to_string());
    let db = Database::connect(&database_url).await?;
    db.migrate().await?;

    // Image store: fail fast on an unusable upload directory
    let images = ImageStore::from_env();
    images
        .validate()
        .await
        .map_err(|e| anyhow::anyhow!("upload directory validation failed: {}", e))?;
    let upload_dir = images.base_dir().to_path_buf();
    let max_upload = images.max_size();

    // Vision client
    let vision = VisionClient::from_env()?;

    let state = AppState {
        db,
        images: Arc::new(images),
        vision: Arc::new(vision),
    };

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(parse_allowed_origins()))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(defaults::CORS_MAX_AGE_SECS));

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/drugs", get(list_drugs))
        .route("/api/drugs/upload", post(upload_images))
        .route("/api/drugs/analyze-batch", post(analyze_batch))
        .route("/api/drugs/expiring", get(expiring_drugs))
        .route("/api/drugs/search", get(search_drugs))
        .route("/api/drugs/:image_id/analyze", post(analyze_single))
        .route("/api/drugs/:drug_id", put(update_drug).delete(delete_drug))
        .nest_service(defaults::UPLOADS_MOUNT, ServeDir::new(upload_dir))
        // Room for a multi-file batch above the per-file cap
        .layer(DefaultBodyLimit::max(max_upload * 8))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .with_state(state);

    let port: u16 = std::env::var(defaults::ENV_PORT)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(defaults::SERVER_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(
        subsystem = "api",
        op = "startup",
        %addr,
        "pillbox-api listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_maps_not_found() {
        let err: ApiError = pillbox_core::Error::DrugNotFound(Uuid::nil()).into();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err: ApiError = pillbox_core::Error::ImageNotFound("x".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn api_error_maps_bad_request() {
        let err: ApiError = pillbox_core::Error::InvalidInput("no files".to_string()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err: ApiError =
            pillbox_core::Error::SizeLimitExceeded { size: 2, limit: 1 }.into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn api_error_maps_vision_failures_to_internal() {
        let err: ApiError = pillbox_core::Error::Auth("denied".to_string()).into();
        assert!(matches!(err, ApiError::Internal(_)));

        let err: ApiError = pillbox_core::Error::Upstream {
            status: 503,
            body: "overloaded".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn parse_allowed_origins_defaults_to_local_frontends() {
        // Not set in the test environment.
        std::env::remove_var(defaults::ENV_ALLOWED_ORIGINS);
        let origins = parse_allowed_origins();
        assert!(origins.contains(&HeaderValue::from_static("http://localhost:3000")));
        assert!(origins.contains(&HeaderValue::from_static("http://localhost:5173")));
    }
}
