//! Drug HTTP handlers: upload, analysis, listing, search, expiry, edit,
//! delete.

use std::path::Path as FsPath;

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use pillbox_core::{
    defaults, CreateDrugRequest, Drug, DrugAnalysis, DrugRepository, UpdateDrugRequest,
    UploadedImage,
};
use pillbox_db::ImageStore;
use pillbox_vision::extract;

use crate::{ApiError, AppState};

// =============================================================================
// UPLOAD
// =============================================================================

/// Store uploaded medication images.
///
/// Files are processed sequentially; a failure partway leaves the already
/// written files in place (no rollback). Returns one entry per stored file.
pub async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<UploadedImage>>, ApiError> {
    let mut uploaded = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        // Only file parts carry a filename; skip plain form fields.
        let Some(file_name) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {}", e)))?;

        if data.is_empty() {
            continue;
        }

        let extension = FsPath::new(&file_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()));

        let image_id = state
            .images
            .save(&data, extension.as_deref())
            .await
            .map_err(|e| match e {
                pillbox_core::Error::SizeLimitExceeded { size, limit } => {
                    ApiError::BadRequest(format!(
                        "File {} is {} bytes, exceeding the {} byte limit",
                        file_name, size, limit
                    ))
                }
                other => ApiError::from(other),
            })?;

        uploaded.push(UploadedImage {
            image_id,
            message: "upload successful".to_string(),
        });
    }

    if uploaded.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one image file is required".to_string(),
        ));
    }

    info!(
        subsystem = "api",
        op = "upload",
        result_count = uploaded.len(),
        "Stored uploaded images"
    );
    Ok(Json(uploaded))
}

// =============================================================================
// ANALYSIS
// =============================================================================

/// Request body for batch analysis.
///
/// Accepts `{"image_ids": [...]}` or a bare JSON array of ids.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AnalyzeBatchRequest {
    Wrapped { image_ids: Vec<String> },
    Bare(Vec<String>),
}

impl AnalyzeBatchRequest {
    fn into_ids(self) -> Vec<String> {
        match self {
            AnalyzeBatchRequest::Wrapped { image_ids } => image_ids,
            AnalyzeBatchRequest::Bare(image_ids) => image_ids,
        }
    }
}

/// Response for batch analysis.
#[derive(Debug, Serialize)]
pub struct AnalyzeBatchResponse {
    pub name: String,
    pub production_date: Option<String>,
    pub expiry_date: Option<String>,
    pub image_urls: Vec<String>,
}

/// Response for the legacy single-image analysis.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub name: String,
    pub production_date: Option<String>,
    pub expiry_date: Option<String>,
}

/// Run the vision pipeline over loaded image bytes and persist the record.
async fn analyze_and_store(
    state: &AppState,
    images: Vec<Vec<u8>>,
    image_urls: Vec<String>,
    multi_image: bool,
) -> Result<Drug, ApiError> {
    let raw_reply = state.vision.analyze(&images).await.map_err(|e| {
        error!(
            subsystem = "api",
            op = "analyze",
            image_count = images.len(),
            error = %e,
            "Vision analysis failed"
        );
        ApiError::Internal(format!("Analysis failed: {}", e))
    })?;

    // Extraction never fails; an unreadable reply becomes an all-null
    // analysis and the record is still created.
    let analysis: DrugAnalysis = extract(&raw_reply);
    let name = analysis
        .name
        .clone()
        .unwrap_or_else(|| defaults::UNKNOWN_DRUG_NAME.to_string());

    let record = CreateDrugRequest {
        name,
        production_date: analysis.production_date.clone(),
        expiry_date: analysis.expiry_date.clone(),
        image_url: image_urls.first().cloned(),
        image_urls: multi_image.then(|| image_urls.clone()),
        analysis_result: serde_json::to_string(&analysis).ok(),
    };

    let drug = state.db.drugs.insert(record).await?;
    info!(
        subsystem = "api",
        op = "analyze",
        drug_id = %drug.id,
        image_count = images.len(),
        "Created drug record from analysis"
    );
    Ok(drug)
}

/// Analyze several uploads as different views of the same package.
pub async fn analyze_batch(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeBatchRequest>,
) -> Result<Json<AnalyzeBatchResponse>, ApiError> {
    let image_ids = request.into_ids();
    if image_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one image id is required".to_string(),
        ));
    }

    let mut images = Vec::with_capacity(image_ids.len());
    let mut image_urls = Vec::with_capacity(image_ids.len());
    for image_id in &image_ids {
        let (path, data) = state.images.load(image_id).await?;
        image_urls.push(ImageStore::public_url(&path));
        images.push(data);
    }

    let drug = analyze_and_store(&state, images, image_urls.clone(), true).await?;

    Ok(Json(AnalyzeBatchResponse {
        name: drug.name,
        production_date: drug.production_date,
        expiry_date: drug.expiry_date,
        image_urls,
    }))
}

/// Legacy single-image analysis.
pub async fn analyze_single(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let (path, data) = state.images.load(&image_id).await?;
    let image_url = ImageStore::public_url(&path);

    let drug = analyze_and_store(&state, vec![data], vec![image_url], false).await?;

    Ok(Json(AnalyzeResponse {
        name: drug.name,
        production_date: drug.production_date,
        expiry_date: drug.expiry_date,
    }))
}

// =============================================================================
// QUERIES
// =============================================================================

/// All records, newest first.
pub async fn list_drugs(State(state): State<AppState>) -> Result<Json<Vec<Drug>>, ApiError> {
    Ok(Json(state.db.drugs.list().await?))
}

#[derive(Debug, Deserialize)]
pub struct ExpiringParams {
    pub days: Option<i64>,
}

/// Records expiring within the window (default 30 days).
pub async fn expiring_drugs(
    State(state): State<AppState>,
    Query(params): Query<ExpiringParams>,
) -> Result<Json<Vec<Drug>>, ApiError> {
    let within_days = params
        .days
        .filter(|d| *d > 0)
        .unwrap_or(defaults::EXPIRING_WINDOW_DAYS);
    Ok(Json(state.db.drugs.list_expiring(within_days).await?))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

/// Substring match on name. A blank query returns an empty list.
pub async fn search_drugs(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Drug>>, ApiError> {
    let query = params.q.unwrap_or_default();
    let query = query.trim();
    if query.is_empty() {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(state.db.drugs.search(query).await?))
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Apply a partial field update.
pub async fn update_drug(
    State(state): State<AppState>,
    Path(drug_id): Path<Uuid>,
    Json(request): Json<UpdateDrugRequest>,
) -> Result<Json<Drug>, ApiError> {
    Ok(Json(state.db.drugs.update(drug_id, request).await?))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Delete a record and every image file it owns.
pub async fn delete_drug(
    State(state): State<AppState>,
    Path(drug_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let drug = state.db.drugs.delete(drug_id).await?;

    // Best-effort cascade; the record is already gone and a missing file
    // is not an error for the caller.
    for url in drug.owned_image_urls() {
        state.images.remove_by_url(&url).await;
    }

    info!(
        subsystem = "api",
        op = "delete",
        drug_id = %drug_id,
        "Deleted drug record and owned images"
    );
    Ok(Json(DeleteResponse {
        message: "deleted".to_string(),
    }))
}
