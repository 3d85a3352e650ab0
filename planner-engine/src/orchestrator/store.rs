//! Best-plan persistence.
//!
//! Plans are keyed by `(portfolio_hash, config_id)`. The in-memory store is
//! the default; the SQLite store survives restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use planner_common::{Error, Result, StorageBackend, StorageConfig};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::model::{ActionSequence, EvaluationResult};

/// A persisted best plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlan {
    pub portfolio_hash: String,
    pub config_id: String,
    pub job_id: String,
    pub sequence: ActionSequence,
    pub result: EvaluationResult,
    pub created_at: DateTime<Utc>,
}

/// Storage for the best plan per portfolio hash and configuration.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Insert or replace the plan for its key.
    async fn save(&self, plan: &StoredPlan) -> Result<()>;

    async fn load(&self, portfolio_hash: &str, config_id: &str) -> Result<Option<StoredPlan>>;

    /// Every stored plan for a portfolio hash, newest first.
    async fn list(&self, portfolio_hash: &str) -> Result<Vec<StoredPlan>>;
}

/// Open the store selected by configuration.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn PlanStore>> {
    Ok(match config.backend {
        StorageBackend::Memory => Arc::new(InMemoryPlanStore::new()),
        StorageBackend::Sqlite => Arc::new(SqlitePlanStore::open(&config.resolved_db_path())?),
    })
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryPlanStore {
    plans: RwLock<HashMap<(String, String), StoredPlan>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn save(&self, plan: &StoredPlan) -> Result<()> {
        let key = (plan.portfolio_hash.clone(), plan.config_id.clone());
        self.plans.write().await.insert(key, plan.clone());
        Ok(())
    }

    async fn load(&self, portfolio_hash: &str, config_id: &str) -> Result<Option<StoredPlan>> {
        let key = (portfolio_hash.to_string(), config_id.to_string());
        Ok(self.plans.read().await.get(&key).cloned())
    }

    async fn list(&self, portfolio_hash: &str) -> Result<Vec<StoredPlan>> {
        let mut plans: Vec<StoredPlan> = self
            .plans
            .read()
            .await
            .values()
            .filter(|p| p.portfolio_hash == portfolio_hash)
            .cloned()
            .collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(plans)
    }
}

// ============================================================================
// SQLite
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS best_plans (
    portfolio_hash TEXT NOT NULL,
    config_id TEXT NOT NULL,
    job_id TEXT NOT NULL,
    sequence_json TEXT NOT NULL,
    result_json TEXT NOT NULL,
    score REAL NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (portfolio_hash, config_id)
);

CREATE INDEX IF NOT EXISTS idx_best_plans_created
ON best_plans(portfolio_hash, created_at DESC);
"#;

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

type PlanRow = (String, String, String, String, String, String);

/// SQLite-backed store. Queries run on the blocking thread pool.
pub struct SqlitePlanStore {
    db: Arc<Mutex<Connection>>,
}

impl SqlitePlanStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(storage_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(storage_err)?;
        conn.execute_batch(CREATE_TABLES_SQL).map_err(storage_err)?;

        info!(db_path = %path.display(), "Opened plan store");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| Error::Internal("plan store connection poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::Internal(format!("plan store task failed: {e}")))?
    }

    fn row_to_plan(row: PlanRow) -> Result<StoredPlan> {
        let (portfolio_hash, config_id, job_id, sequence_json, result_json, created_at) = row;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::Storage(format!("bad created_at '{created_at}': {e}")))?
            .with_timezone(&Utc);

        Ok(StoredPlan {
            portfolio_hash,
            config_id,
            job_id,
            sequence: serde_json::from_str(&sequence_json)?,
            result: serde_json::from_str(&result_json)?,
            created_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT portfolio_hash, config_id, job_id, sequence_json, result_json, created_at FROM best_plans";

#[async_trait]
impl PlanStore for SqlitePlanStore {
    async fn save(&self, plan: &StoredPlan) -> Result<()> {
        let sequence_json = serde_json::to_string(&plan.sequence)?;
        let result_json = serde_json::to_string(&plan.result)?;
        let (portfolio_hash, config_id, job_id) =
            (plan.portfolio_hash.clone(), plan.config_id.clone(), plan.job_id.clone());
        let (score, created_at) = (plan.result.score, plan.created_at.to_rfc3339());

        self.with_conn(move |db| {
            db.execute(
                r#"
                INSERT OR REPLACE INTO best_plans
                (portfolio_hash, config_id, job_id, sequence_json, result_json, score, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![portfolio_hash, config_id, job_id, sequence_json, result_json, score, created_at],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await?;

        debug!(portfolio_hash = %plan.portfolio_hash, config_id = %plan.config_id, "Saved best plan");
        Ok(())
    }

    async fn load(&self, portfolio_hash: &str, config_id: &str) -> Result<Option<StoredPlan>> {
        let (portfolio_hash, config_id) = (portfolio_hash.to_string(), config_id.to_string());
        self.with_conn(move |db| {
            let row: rusqlite::Result<PlanRow> = db.query_row(
                &format!("{SELECT_COLUMNS} WHERE portfolio_hash = ?1 AND config_id = ?2"),
                params![portfolio_hash, config_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
            );

            match row {
                Ok(row) => Self::row_to_plan(row).map(Some),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(storage_err(e)),
            }
        })
        .await
    }

    async fn list(&self, portfolio_hash: &str) -> Result<Vec<StoredPlan>> {
        let portfolio_hash = portfolio_hash.to_string();
        self.with_conn(move |db| {
            let mut stmt = db
                .prepare(&format!("{SELECT_COLUMNS} WHERE portfolio_hash = ?1 ORDER BY created_at DESC"))
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![portfolio_hash], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
                })
                .map_err(storage_err)?
                .collect::<rusqlite::Result<Vec<PlanRow>>>()
                .map_err(storage_err)?;

            rows.into_iter().map(Self::row_to_plan).collect()
        })
        .await
    }
}
