//! Centralized default constants for the pillbox system.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates reference these constants instead of defining their
//! own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 8000;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;

// =============================================================================
// STORAGE
// =============================================================================

/// Default database connection string.
///
/// `mode=rwc` creates the file on first run.
pub const DATABASE_URL: &str = "sqlite://drugs.db?mode=rwc";

/// Default directory for uploaded images.
pub const UPLOAD_DIR: &str = "uploads";

/// URL prefix under which stored images are served.
pub const UPLOADS_MOUNT: &str = "/uploads";

/// Maximum upload size in bytes (10 MB).
///
/// Enforced at two layers: the axum body limit on the upload route and the
/// image store's own size check.
pub const MAX_FILE_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// Extensions probed when resolving an image id to a file on disk,
/// in lookup order.
pub const KNOWN_IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".webp"];

/// Extension assumed for uploads with no usable filename.
pub const FALLBACK_IMAGE_EXTENSION: &str = ".jpg";

// =============================================================================
// VISION API
// =============================================================================

/// Default vision chat-completions endpoint.
pub const VISION_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default vision model identifier.
pub const VISION_MODEL: &str = "gpt-4o-mini";

/// Request timeout in seconds for a single-image call.
///
/// Multi-image payloads get double this budget; see
/// `VisionClient::request_timeout`.
pub const VISION_TIMEOUT_SECS: u64 = 30;

/// Maximum tokens requested from the vision model.
pub const VISION_MAX_TOKENS: u32 = 1000;

/// Sampling temperature. Low, because the reply must be machine-parseable.
pub const VISION_TEMPERATURE: f32 = 0.1;

/// Maximum characters of an upstream error body kept in error messages.
pub const UPSTREAM_BODY_EXCERPT_CHARS: usize = 500;

// =============================================================================
// EXPIRY TRACKING
// =============================================================================

/// Default "expiring soon" window in days.
pub const EXPIRING_WINDOW_DAYS: i64 = 30;

/// Date format expected in `expiry_date` for the expiry scan.
pub const EXPIRY_DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// RECORDS
// =============================================================================

/// Sentinel name stored when extraction recovered no medication name.
pub const UNKNOWN_DRUG_NAME: &str = "unknown";

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

/// Database connection string.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Upload directory.
pub const ENV_UPLOAD_DIR: &str = "UPLOAD_DIR";

/// Maximum upload size in bytes.
pub const ENV_MAX_FILE_SIZE: &str = "MAX_FILE_SIZE";

/// HTTP server port.
pub const ENV_PORT: &str = "PORT";

/// Comma-separated CORS origin whitelist.
pub const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";

/// Vision API endpoint URL.
pub const ENV_VISION_BASE_URL: &str = "VISION_BASE_URL";

/// Vision API bearer token.
pub const ENV_VISION_API_KEY: &str = "VISION_API_KEY";

/// Vision model identifier.
pub const ENV_VISION_MODEL: &str = "VISION_MODEL";

/// Vision request timeout in seconds.
pub const ENV_VISION_TIMEOUT: &str = "VISION_TIMEOUT";
