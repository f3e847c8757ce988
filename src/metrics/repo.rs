use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::RepoError;
use crate::metrics::repo_types::{MetricsRecord, MetricsRow, NewMetrics};

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn latest(&self, user_id: i64) -> Result<Option<MetricsRecord>, RepoError>;
    /// Newest first.
    async fn history(&self, user_id: i64) -> Result<Vec<MetricsRecord>, RepoError>;
    async fn append(&self, record: NewMetrics) -> Result<MetricsRecord, RepoError>;
}

#[derive(Clone)]
pub struct PgMetricsRepository {
    db: PgPool,
}

impl PgMetricsRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const METRICS_COLUMNS: &str =
    "id, user_id, weight_kg, height_m, age_years, sex, activity_level, body_fat_pct, created_at";

fn to_record(row: MetricsRow) -> Result<MetricsRecord, RepoError> {
    MetricsRecord::try_from(row).map_err(|e| RepoError::Database(sqlx::Error::Decode(Box::new(e))))
}

#[async_trait]
impl MetricsRepository for PgMetricsRepository {
    async fn latest(&self, user_id: i64) -> Result<Option<MetricsRecord>, RepoError> {
        let row = sqlx::query_as::<_, MetricsRow>(&format!(
            r#"
            SELECT {METRICS_COLUMNS} FROM user_metrics
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_record).transpose()
    }

    async fn history(&self, user_id: i64) -> Result<Vec<MetricsRecord>, RepoError> {
        let rows = sqlx::query_as::<_, MetricsRow>(&format!(
            r#"
            SELECT {METRICS_COLUMNS} FROM user_metrics
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(to_record).collect()
    }

    async fn append(&self, m: NewMetrics) -> Result<MetricsRecord, RepoError> {
        let row = sqlx::query_as::<_, MetricsRow>(&format!(
            r#"
            INSERT INTO user_metrics
                (user_id, weight_kg, height_m, age_years, sex, activity_level, body_fat_pct, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {METRICS_COLUMNS}
            "#
        ))
        .bind(m.user_id)
        .bind(m.weight_kg)
        .bind(m.height_m)
        .bind(m.age_years)
        .bind(m.sex.as_str())
        .bind(m.activity_level.as_str())
        .bind(m.body_fat_pct)
        .bind(m.created_at)
        .fetch_one(&self.db)
        .await?;
        to_record(row)
    }
}
