//! Core data models for pillbox.
//!
//! These types are shared across all pillbox crates and represent the
//! domain entities of the medication tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// DRUG RECORD
// =============================================================================

/// One persisted medication entry with its images and analysis provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drug {
    pub id: Uuid,
    /// Free-text medication name; `defaults::UNKNOWN_DRUG_NAME` when the
    /// extraction yielded nothing.
    pub name: String,
    /// Opaque date string as returned by the vision model, nominally
    /// `YYYY-MM-DD`. Never validated at write time.
    pub production_date: Option<String>,
    pub expiry_date: Option<String>,
    /// Retrieval path of the first image (legacy single-image field).
    pub image_url: Option<String>,
    /// Ordered retrieval paths of all images; absent on legacy records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    /// Serialized extraction output, kept for audit/debugging.
    pub analysis_result: Option<String>,
}

impl Drug {
    /// All image retrieval paths owned by this record, deduplicated.
    ///
    /// Combines `image_urls` with the legacy `image_url` so deletion
    /// cascades cover records written by either generation of the schema.
    pub fn owned_image_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.image_urls.clone().unwrap_or_default();
        if let Some(ref legacy) = self.image_url {
            if !urls.iter().any(|u| u == legacy) {
                urls.push(legacy.clone());
            }
        }
        urls
    }
}

// =============================================================================
// EXTRACTION OUTPUT
// =============================================================================

/// Structured fields recovered from the vision model's free-form reply.
///
/// All fields are optional: a failed extraction is "no information
/// extracted", never an application error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugAnalysis {
    pub name: Option<String>,
    pub production_date: Option<String>,
    pub expiry_date: Option<String>,
}

impl DrugAnalysis {
    /// True when no field was recovered.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.production_date.is_none() && self.expiry_date.is_none()
    }
}

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Request for creating a drug record after analysis.
#[derive(Debug, Clone)]
pub struct CreateDrugRequest {
    pub name: String,
    pub production_date: Option<String>,
    pub expiry_date: Option<String>,
    pub image_url: Option<String>,
    pub image_urls: Option<Vec<String>>,
    pub analysis_result: Option<String>,
}

/// Partial update of a drug record.
///
/// Only present fields are applied. A present-but-empty date string clears
/// the column to NULL; the image set is immutable after creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDrugRequest {
    pub name: Option<String>,
    pub production_date: Option<String>,
    pub expiry_date: Option<String>,
}

impl UpdateDrugRequest {
    /// True when no field is present (nothing to apply).
    pub fn is_noop(&self) -> bool {
        self.name.is_none() && self.production_date.is_none() && self.expiry_date.is_none()
    }
}

// =============================================================================
// UPLOAD TYPES
// =============================================================================

/// Result of storing one uploaded image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedImage {
    pub image_id: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drug_with_images(image_url: Option<&str>, image_urls: Option<Vec<&str>>) -> Drug {
        Drug {
            id: Uuid::new_v4(),
            name: "Aspirin".to_string(),
            production_date: None,
            expiry_date: None,
            image_url: image_url.map(String::from),
            image_urls: image_urls.map(|v| v.into_iter().map(String::from).collect()),
            created_at: Utc::now(),
            analysis_result: None,
        }
    }

    #[test]
    fn owned_image_urls_merges_legacy_field() {
        let drug = drug_with_images(Some("/uploads/a.jpg"), Some(vec!["/uploads/b.jpg"]));
        assert_eq!(drug.owned_image_urls(), vec!["/uploads/b.jpg", "/uploads/a.jpg"]);
    }

    #[test]
    fn owned_image_urls_deduplicates_primary() {
        let drug = drug_with_images(
            Some("/uploads/a.jpg"),
            Some(vec!["/uploads/a.jpg", "/uploads/b.jpg"]),
        );
        assert_eq!(drug.owned_image_urls(), vec!["/uploads/a.jpg", "/uploads/b.jpg"]);
    }

    #[test]
    fn owned_image_urls_legacy_only() {
        let drug = drug_with_images(Some("/uploads/a.jpg"), None);
        assert_eq!(drug.owned_image_urls(), vec!["/uploads/a.jpg"]);
    }

    #[test]
    fn owned_image_urls_empty() {
        let drug = drug_with_images(None, None);
        assert!(drug.owned_image_urls().is_empty());
    }

    #[test]
    fn analysis_is_empty() {
        assert!(DrugAnalysis::default().is_empty());
        let partial = DrugAnalysis {
            expiry_date: Some("2026-01-01".to_string()),
            ..Default::default()
        };
        assert!(!partial.is_empty());
    }

    #[test]
    fn update_request_is_noop() {
        assert!(UpdateDrugRequest::default().is_noop());
        let req = UpdateDrugRequest {
            name: Some("Ibuprofen".to_string()),
            ..Default::default()
        };
        assert!(!req.is_noop());
    }

    #[test]
    fn update_request_deserializes_partial_body() {
        let req: UpdateDrugRequest =
            serde_json::from_str(r#"{"expiry_date": ""}"#).unwrap();
        assert!(req.name.is_none());
        assert!(req.production_date.is_none());
        assert_eq!(req.expiry_date.as_deref(), Some(""));
    }

    #[test]
    fn drug_serializes_without_absent_image_urls() {
        let drug = drug_with_images(Some("/uploads/a.jpg"), None);
        let json = serde_json::to_value(&drug).unwrap();
        assert!(json.get("image_urls").is_none());
        assert_eq!(json["image_url"], "/uploads/a.jpg");
    }
}
