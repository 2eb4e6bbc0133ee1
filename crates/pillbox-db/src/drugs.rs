//! Drug record repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;
use uuid::Uuid;

use pillbox_core::{
    defaults, CreateDrugRequest, Drug, DrugRepository, Error, Result, UpdateDrugRequest,
};

use crate::escape_like;

/// SQLite implementation of DrugRepository.
pub struct SqliteDrugRepository {
    pool: Pool<Sqlite>,
}

impl SqliteDrugRepository {
    /// Create a new SqliteDrugRepository with the given connection pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str =
    "id, name, production_date, expiry_date, image_url, image_urls, created_at, analysis_result";

/// Map a database row to a Drug.
fn map_row(row: &SqliteRow) -> Result<Drug> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Serialization(format!("invalid record id {}: {}", id, e)))?;

    // Legacy rows may hold anything here; an unreadable list is treated
    // as absent rather than failing the whole query.
    let image_urls: Option<Vec<String>> = row
        .try_get::<Option<String>, _>("image_urls")?
        .and_then(|raw| serde_json::from_str(&raw).ok());

    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Drug {
        id,
        name: row.try_get("name")?,
        production_date: row.try_get("production_date")?,
        expiry_date: row.try_get("expiry_date")?,
        image_url: row.try_get("image_url")?,
        image_urls,
        created_at,
        analysis_result: row.try_get("analysis_result")?,
    })
}

/// True when the expiry string parses as a date falling on or before
/// today + `within_days`. Unparsable dates never match.
pub fn expires_within(expiry_date: &str, today: NaiveDate, within_days: i64) -> bool {
    match NaiveDate::parse_from_str(expiry_date, defaults::EXPIRY_DATE_FORMAT) {
        Ok(date) => date <= today + chrono::Duration::days(within_days),
        Err(_) => false,
    }
}

#[async_trait]
impl DrugRepository for SqliteDrugRepository {
    async fn insert(&self, req: CreateDrugRequest) -> Result<Drug> {
        let drug = Drug {
            id: Uuid::new_v4(),
            name: req.name,
            production_date: req.production_date,
            expiry_date: req.expiry_date,
            image_url: req.image_url,
            image_urls: req.image_urls,
            created_at: Utc::now(),
            analysis_result: req.analysis_result,
        };

        let image_urls_json = drug
            .image_urls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO drugs (id, name, production_date, expiry_date, image_url, image_urls, created_at, analysis_result) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(drug.id.to_string())
        .bind(&drug.name)
        .bind(&drug.production_date)
        .bind(&drug.expiry_date)
        .bind(&drug.image_url)
        .bind(image_urls_json)
        .bind(drug.created_at)
        .bind(&drug.analysis_result)
        .execute(&self.pool)
        .await?;

        debug!(
            subsystem = "db",
            component = "drugs",
            op = "insert",
            drug_id = %drug.id,
            "Created drug record"
        );
        Ok(drug)
    }

    async fn fetch(&self, id: Uuid) -> Result<Drug> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM drugs WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::DrugNotFound(id))?;

        map_row(&row)
    }

    async fn list(&self) -> Result<Vec<Drug>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM drugs ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }

    async fn search(&self, query: &str) -> Result<Vec<Drug>> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query(&format!(
            "SELECT {} FROM drugs WHERE name LIKE ? ESCAPE '\\' ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }

    async fn update(&self, id: Uuid, req: UpdateDrugRequest) -> Result<Drug> {
        let mut drug = self.fetch(id).await?;

        if let Some(name) = req.name {
            drug.name = name;
        }
        // A present-but-empty date string clears the column.
        if let Some(date) = req.production_date {
            drug.production_date = if date.is_empty() { None } else { Some(date) };
        }
        if let Some(date) = req.expiry_date {
            drug.expiry_date = if date.is_empty() { None } else { Some(date) };
        }

        sqlx::query("UPDATE drugs SET name = ?, production_date = ?, expiry_date = ? WHERE id = ?")
            .bind(&drug.name)
            .bind(&drug.production_date)
            .bind(&drug.expiry_date)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(
            subsystem = "db",
            component = "drugs",
            op = "update",
            drug_id = %id,
            "Updated drug record"
        );
        Ok(drug)
    }

    async fn delete(&self, id: Uuid) -> Result<Drug> {
        let drug = self.fetch(id).await?;

        sqlx::query("DELETE FROM drugs WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(
            subsystem = "db",
            component = "drugs",
            op = "delete",
            drug_id = %id,
            "Deleted drug record"
        );
        Ok(drug)
    }

    async fn list_expiring(&self, within_days: i64) -> Result<Vec<Drug>> {
        // Full scan: expiry dates are opaque strings and the table is
        // household-sized, so there is no index to use.
        let today = Utc::now().date_naive();
        let drugs = self.list().await?;

        Ok(drugs
            .into_iter()
            .filter(|drug| {
                drug.expiry_date
                    .as_deref()
                    .map(|date| expires_within(date, today, within_days))
                    .unwrap_or(false)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_expires_within_window() {
        let today = day("2024-01-01");
        assert!(expires_within("2024-01-31", today, 30));
        assert!(!expires_within("2024-03-01", today, 30));
    }

    #[test]
    fn test_expires_within_boundary() {
        let today = day("2024-01-01");
        // Exactly today + 30 days is included.
        assert!(expires_within("2024-01-31", today, 30));
        assert!(!expires_within("2024-02-01", today, 30));
    }

    #[test]
    fn test_expires_within_already_expired() {
        let today = day("2024-01-01");
        assert!(expires_within("2020-01-01", today, 30));
    }

    #[test]
    fn test_expires_within_unparsable() {
        let today = day("2024-01-01");
        assert!(!expires_within("N/A", today, 30));
        assert!(!expires_within("", today, 30));
        assert!(!expires_within("2024/01/15", today, 30));
        assert!(!expires_within("2024年1月", today, 30));
    }
}
