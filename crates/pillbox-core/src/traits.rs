//! Core traits for pillbox abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CreateDrugRequest, Drug, UpdateDrugRequest};

// =============================================================================
// DRUG REPOSITORY TRAIT
// =============================================================================

/// Repository for drug record CRUD operations.
#[async_trait]
pub trait DrugRepository: Send + Sync {
    /// Insert a new record and return it as stored.
    async fn insert(&self, req: CreateDrugRequest) -> Result<Drug>;

    /// Fetch a record by ID.
    async fn fetch(&self, id: Uuid) -> Result<Drug>;

    /// List all records, newest first.
    async fn list(&self) -> Result<Vec<Drug>>;

    /// Substring match on name, newest first.
    async fn search(&self, query: &str) -> Result<Vec<Drug>>;

    /// Apply a partial update and return the updated record.
    async fn update(&self, id: Uuid, req: UpdateDrugRequest) -> Result<Drug>;

    /// Delete a record, returning it so the caller can cascade
    /// image-file removal.
    async fn delete(&self, id: Uuid) -> Result<Drug>;

    /// Records whose expiry date falls on or before today + `within_days`.
    /// Unparsable expiry dates are excluded, not an error.
    async fn list_expiring(&self, within_days: i64) -> Result<Vec<Drug>>;
}
