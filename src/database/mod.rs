//! # PostgreSQL Backend
//!
//! `sqlx` implementations of the store contracts in [`crate::store`], compiled with the
//! `postgres` feature.
//!
//! ## Key Components
//!
//! - [`connection`] - pool setup from [`crate::config::DatabaseConfig`] and embedded migrations
//! - [`node_execution_store`] - [`PgNodeExecutionStore`], JSONB documents with indexed columns
//! - [`plan_expansion_store`] - [`PgPlanExpansionStore`], path projection done in SQL
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pipeline_engine::config::EngineConfig;
//! use pipeline_engine::database::DatabaseConnection;
//! use pipeline_engine::orchestration::{EngineComponents, OrchestrationEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let db = DatabaseConnection::connect(&config.database).await?;
//! db.migrate().await?;
//!
//! let engine = OrchestrationEngine::new(EngineComponents::postgres(db.pool().clone(), config));
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod node_execution_store;
pub mod plan_expansion_store;

pub use connection::{DatabaseConnection, MIGRATOR};
pub use node_execution_store::PgNodeExecutionStore;
pub use plan_expansion_store::PgPlanExpansionStore;

use crate::store::StoreError;

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::PoolTimedOut => Self::Timeout(error.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => Self::DuplicateKey {
                    entity: db.table().unwrap_or("unknown").to_string(),
                    id: db.constraint().unwrap_or_default().to_string(),
                },
                Some(SERIALIZATION_FAILURE) => Self::OptimisticLockConflict {
                    entity: db.table().unwrap_or("unknown").to_string(),
                    id: String::new(),
                },
                _ => Self::Backend(error.to_string()),
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Serialization(error.to_string())
            }
            _ => Self::Backend(error.to_string()),
        }
    }
}
