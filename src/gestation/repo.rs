use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::RepoError;
use crate::gestation::repo_types::{
    GestationTracking, GestationVisit, NewTracking, NewVisit, TrackingRow,
};

#[async_trait]
pub trait GestationRepository: Send + Sync {
    async fn active_for_user(&self, user_id: i64) -> Result<Option<GestationTracking>, RepoError>;
    async fn find_tracking(&self, id: i64) -> Result<Option<GestationTracking>, RepoError>;
    /// Fails with `Duplicate` when the user already has an active tracking.
    async fn insert_tracking(&self, tracking: NewTracking) -> Result<GestationTracking, RepoError>;
    async fn insert_visit(&self, visit: NewVisit) -> Result<GestationVisit, RepoError>;
    /// Ordered by visit date, then id.
    async fn list_visits(&self, tracking_id: i64) -> Result<Vec<GestationVisit>, RepoError>;
}

#[derive(Clone)]
pub struct PgGestationRepository {
    db: PgPool,
}

impl PgGestationRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const TRACKING_COLUMNS: &str = "id, user_id, pre_pregnancy_weight_kg, height_cm, \
     last_menstrual_period, starting_week, gestation_type, bmi_pre, bmi_class, \
     goal_gain_min_kg, goal_gain_max_kg, active, created_at";

const VISIT_COLUMNS: &str = "id, tracking_id, visit_date, weight_kg, gestational_week, \
     trimester, systolic_bp, diastolic_bp, notes, created_at";

fn to_tracking(row: TrackingRow) -> Result<GestationTracking, RepoError> {
    GestationTracking::try_from(row)
        .map_err(|e| RepoError::Database(sqlx::Error::Decode(Box::new(e))))
}

#[async_trait]
impl GestationRepository for PgGestationRepository {
    async fn active_for_user(&self, user_id: i64) -> Result<Option<GestationTracking>, RepoError> {
        let row = sqlx::query_as::<_, TrackingRow>(&format!(
            "SELECT {TRACKING_COLUMNS} FROM gestation_tracking WHERE user_id = $1 AND active"
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_tracking).transpose()
    }

    async fn find_tracking(&self, id: i64) -> Result<Option<GestationTracking>, RepoError> {
        let row = sqlx::query_as::<_, TrackingRow>(&format!(
            "SELECT {TRACKING_COLUMNS} FROM gestation_tracking WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_tracking).transpose()
    }

    async fn insert_tracking(&self, t: NewTracking) -> Result<GestationTracking, RepoError> {
        let row = sqlx::query_as::<_, TrackingRow>(&format!(
            r#"
            INSERT INTO gestation_tracking (
                user_id, pre_pregnancy_weight_kg, height_cm, last_menstrual_period,
                starting_week, gestation_type, bmi_pre, bmi_class,
                goal_gain_min_kg, goal_gain_max_kg, active, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, $11)
            RETURNING {TRACKING_COLUMNS}
            "#
        ))
        .bind(t.user_id)
        .bind(t.pre_pregnancy_weight_kg)
        .bind(t.height_cm)
        .bind(t.last_menstrual_period)
        .bind(t.starting_week)
        .bind(t.gestation_type.as_str())
        .bind(t.bmi_pre)
        .bind(t.bmi_class.as_str())
        .bind(t.goal_gain_min_kg)
        .bind(t.goal_gain_max_kg)
        .bind(t.created_at)
        .fetch_one(&self.db)
        .await?;
        to_tracking(row)
    }

    async fn insert_visit(&self, v: NewVisit) -> Result<GestationVisit, RepoError> {
        let visit = sqlx::query_as::<_, GestationVisit>(&format!(
            r#"
            INSERT INTO gestation_visit (
                tracking_id, visit_date, weight_kg, gestational_week, trimester,
                systolic_bp, diastolic_bp, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {VISIT_COLUMNS}
            "#
        ))
        .bind(v.tracking_id)
        .bind(v.visit_date)
        .bind(v.weight_kg)
        .bind(v.gestational_week)
        .bind(v.trimester)
        .bind(v.systolic_bp)
        .bind(v.diastolic_bp)
        .bind(&v.notes)
        .bind(v.created_at)
        .fetch_one(&self.db)
        .await?;
        Ok(visit)
    }

    async fn list_visits(&self, tracking_id: i64) -> Result<Vec<GestationVisit>, RepoError> {
        let visits = sqlx::query_as::<_, GestationVisit>(&format!(
            r#"
            SELECT {VISIT_COLUMNS} FROM gestation_visit
            WHERE tracking_id = $1
            ORDER BY visit_date ASC, id ASC
            "#
        ))
        .bind(tracking_id)
        .fetch_all(&self.db)
        .await?;
        Ok(visits)
    }
}
