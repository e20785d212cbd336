//! Relational storage for the invoiceflow pipeline.
//!
//! One [`Store`] handle wraps an sqlx SQLite pool and exposes every query
//! the coordinator and its collaborators need: tenancy-filtered pipeline
//! loads, CAS-guarded job transitions, and the append-only audit surfaces.
//! Tests run against `Store::connect_in_memory()`.

pub mod admin;
pub mod error;
pub mod history;
pub mod jobs;
pub mod models;
pub mod pipeline;
mod schema;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

pub use error::StoreError;
pub use models::*;

pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to the persistent store. Cheap to clone; all clones share the pool.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database for tests. Single connection: every handle must
    /// observe the same memory database.
    pub async fn connect_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        schema::init(&self.pool).await
    }
}
