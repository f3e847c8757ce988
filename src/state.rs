use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::anthropometry::formulas::FormulaRegistry;
use crate::anthropometry::growth::{GrowthReference, LmsTable};
use crate::anthropometry::repo::{
    EvaluationRepository, PgEvaluationRepository, PgResultRepository, ResultRepository,
};
use crate::auth::repo::{PgUserRepository, UserRepository};
use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, StoreKind};
use crate::gestation::repo::{GestationRepository, PgGestationRepository};
use crate::metrics::repo::{MetricsRepository, PgMetricsRepository};
use crate::store::MemoryStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepository>,
    pub evaluations: Arc<dyn EvaluationRepository>,
    pub results: Arc<dyn ResultRepository>,
    pub metrics: Arc<dyn MetricsRepository>,
    pub gestation: Arc<dyn GestationRepository>,
    pub formulas: Arc<FormulaRegistry>,
    pub clock: Arc<dyn Clock>,
    /// Present only for the Postgres backend.
    pub db: Option<PgPool>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let growth: Arc<dyn GrowthReference> = match &config.growth_tables_path {
            Some(path) => {
                let table = LmsTable::load(path)
                    .with_context(|| format!("load growth tables from {path}"))?;
                info!(rows = table.len(), %path, "growth reference loaded");
                Arc::new(table)
            }
            None => {
                warn!("GROWTH_TABLES_PATH not set; WHO z-score methods will be unavailable");
                Arc::new(LmsTable::empty())
            }
        };
        let formulas = Arc::new(FormulaRegistry::standard(growth));

        match config.store {
            StoreKind::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is required for the postgres store")?;
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                info!("connected to postgres");
                Ok(Self {
                    config,
                    users: Arc::new(PgUserRepository::new(db.clone())),
                    evaluations: Arc::new(PgEvaluationRepository::new(db.clone())),
                    results: Arc::new(PgResultRepository::new(db.clone())),
                    metrics: Arc::new(PgMetricsRepository::new(db.clone())),
                    gestation: Arc::new(PgGestationRepository::new(db.clone())),
                    formulas,
                    clock,
                    db: Some(db),
                })
            }
            StoreKind::Memory => {
                warn!("using the in-memory store; data is lost on restart");
                Ok(Self::in_memory(config, formulas, clock))
            }
        }
    }

    pub fn in_memory(
        config: Arc<AppConfig>,
        formulas: Arc<FormulaRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = MemoryStore::new(clock.clone());
        Self {
            config,
            users: Arc::new(store.clone()),
            evaluations: Arc::new(store.clone()),
            results: Arc::new(store.clone()),
            metrics: Arc::new(store.clone()),
            gestation: Arc::new(store),
            formulas,
            clock,
            db: None,
        }
    }

    /// Memory-backed state with a frozen clock at 2025-06-01 12:00 UTC.
    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::anthropometry::growth::sample_table;
        use crate::clock::FixedClock;
        use time::macros::datetime;

        let config = Arc::new(AppConfig {
            store: StoreKind::Memory,
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            growth_tables_path: None,
        });
        let formulas = Arc::new(FormulaRegistry::standard(Arc::new(sample_table())));
        let clock = Arc::new(FixedClock(datetime!(2025-06-01 12:00 UTC)));
        Self::in_memory(config, formulas, clock)
    }
}
