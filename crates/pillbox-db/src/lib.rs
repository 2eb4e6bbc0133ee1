//! # pillbox-db
//!
//! SQLite storage layer for pillbox.
//!
//! This crate provides:
//! - Connection pool management
//! - The drug record repository
//! - The filesystem image store
//! - Versioned schema migrations (feature `migrations`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use pillbox_db::Database;
//! use pillbox_core::DrugRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("sqlite://drugs.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let drugs = db.drugs.list().await?;
//!     println!("{} records", drugs.len());
//!     Ok(())
//! }
//! ```

pub mod drugs;
pub mod image_store;
pub mod pool;

// Re-export core types
pub use pillbox_core::*;

pub use drugs::{expires_within, SqliteDrugRepository};
pub use image_store::ImageStore;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};

/// Escape LIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Combined database context, constructed once at process start and passed
/// by reference into each request-scoped operation.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Sqlite>,
    /// Drug record repository.
    pub drugs: SqliteDrugRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Sqlite>) -> Self {
        Self {
            drugs: SqliteDrugRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
