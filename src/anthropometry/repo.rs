use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::anthropometry::repo_types::{
    AnthropometricResult, Method, NewResult, NewSnapshot, ResultRow, Snapshot, SnapshotRow,
};
use crate::error::{AppError, RepoError};

/// Filter and window for a subject's evaluation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationQuery {
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait EvaluationRepository: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<Snapshot>, RepoError>;
    async fn create(&self, snapshot: NewSnapshot) -> Result<Snapshot, RepoError>;
    /// Overwrites every measurement column of an existing snapshot.
    async fn update(&self, snapshot: &Snapshot) -> Result<Snapshot, RepoError>;
    async fn latest_for_user(&self, user_id: i64) -> Result<Option<Snapshot>, RepoError>;
    /// Page of snapshots (newest measurement first) plus the unpaged total.
    async fn list_for_user(
        &self,
        user_id: i64,
        query: EvaluationQuery,
    ) -> Result<(Vec<Snapshot>, i64), RepoError>;
}

#[async_trait]
pub trait ResultRepository: Send + Sync {
    async fn for_evaluation(&self, evaluation_id: i64) -> Result<Vec<AnthropometricResult>, RepoError>;
    async fn find(
        &self,
        evaluation_id: i64,
        method: Method,
    ) -> Result<Option<AnthropometricResult>, RepoError>;
    /// Fails with `Duplicate` when the (evaluation, method) pair already exists.
    async fn insert(&self, result: NewResult) -> Result<AnthropometricResult, RepoError>;
    async fn replace(&self, id: i64, result: NewResult) -> Result<AnthropometricResult, RepoError>;
    async fn delete(&self, evaluation_id: i64, method: Method) -> Result<(), RepoError>;
}

fn decode(e: AppError) -> RepoError {
    RepoError::Database(sqlx::Error::Decode(Box::new(e)))
}

fn to_snapshot(row: SnapshotRow) -> Result<Snapshot, RepoError> {
    Snapshot::try_from(row).map_err(decode)
}

#[derive(Clone)]
pub struct PgEvaluationRepository {
    db: PgPool,
}

impl PgEvaluationRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const SNAPSHOT_COLUMNS: &str = "id, user_id, assessor_id, measured_at, weight_kg, height_m, \
     age_years, sex, triceps_mm, biceps_mm, subscapular_mm, suprailiac_mm, abdominal_mm, \
     chest_mm, midaxillary_mm, thigh_mm, medial_calf_mm, waist_cm, hip_cm, neck_cm, \
     mid_upper_arm_cm, thigh_circ_cm, calf_circ_cm, extras, created_at, updated_at";

#[async_trait]
impl EvaluationRepository for PgEvaluationRepository {
    async fn find(&self, id: i64) -> Result<Option<Snapshot>, RepoError> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM anthropometry_evaluation WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_snapshot).transpose()
    }

    async fn create(&self, s: NewSnapshot) -> Result<Snapshot, RepoError> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            r#"
            INSERT INTO anthropometry_evaluation (
                user_id, assessor_id, measured_at, weight_kg, height_m, age_years, sex,
                triceps_mm, biceps_mm, subscapular_mm, suprailiac_mm, abdominal_mm,
                chest_mm, midaxillary_mm, thigh_mm, medial_calf_mm,
                waist_cm, hip_cm, neck_cm, mid_upper_arm_cm, thigh_circ_cm, calf_circ_cm,
                extras, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $24)
            RETURNING {SNAPSHOT_COLUMNS}
            "#
        ))
        .bind(s.user_id)
        .bind(s.assessor_id)
        .bind(s.measured_at)
        .bind(s.weight_kg)
        .bind(s.height_m)
        .bind(s.age_years)
        .bind(s.sex.map(|x| x.as_str()))
        .bind(s.skinfolds.triceps_mm)
        .bind(s.skinfolds.biceps_mm)
        .bind(s.skinfolds.subscapular_mm)
        .bind(s.skinfolds.suprailiac_mm)
        .bind(s.skinfolds.abdominal_mm)
        .bind(s.skinfolds.chest_mm)
        .bind(s.skinfolds.midaxillary_mm)
        .bind(s.skinfolds.thigh_mm)
        .bind(s.skinfolds.medial_calf_mm)
        .bind(s.circumferences.waist_cm)
        .bind(s.circumferences.hip_cm)
        .bind(s.circumferences.neck_cm)
        .bind(s.circumferences.mid_upper_arm_cm)
        .bind(s.circumferences.thigh_cm)
        .bind(s.circumferences.calf_cm)
        .bind(&s.extras)
        .bind(s.created_at)
        .fetch_one(&self.db)
        .await?;
        to_snapshot(row)
    }

    async fn update(&self, s: &Snapshot) -> Result<Snapshot, RepoError> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            r#"
            UPDATE anthropometry_evaluation SET
                assessor_id = $2, measured_at = $3, weight_kg = $4, height_m = $5,
                age_years = $6, sex = $7, triceps_mm = $8, biceps_mm = $9,
                subscapular_mm = $10, suprailiac_mm = $11, abdominal_mm = $12,
                chest_mm = $13, midaxillary_mm = $14, thigh_mm = $15, medial_calf_mm = $16,
                waist_cm = $17, hip_cm = $18, neck_cm = $19, mid_upper_arm_cm = $20,
                thigh_circ_cm = $21, calf_circ_cm = $22, extras = $23, updated_at = $24
            WHERE id = $1
            RETURNING {SNAPSHOT_COLUMNS}
            "#
        ))
        .bind(s.id)
        .bind(s.assessor_id)
        .bind(s.measured_at)
        .bind(s.weight_kg)
        .bind(s.height_m)
        .bind(s.age_years)
        .bind(s.sex.map(|x| x.as_str()))
        .bind(s.skinfolds.triceps_mm)
        .bind(s.skinfolds.biceps_mm)
        .bind(s.skinfolds.subscapular_mm)
        .bind(s.skinfolds.suprailiac_mm)
        .bind(s.skinfolds.abdominal_mm)
        .bind(s.skinfolds.chest_mm)
        .bind(s.skinfolds.midaxillary_mm)
        .bind(s.skinfolds.thigh_mm)
        .bind(s.skinfolds.medial_calf_mm)
        .bind(s.circumferences.waist_cm)
        .bind(s.circumferences.hip_cm)
        .bind(s.circumferences.neck_cm)
        .bind(s.circumferences.mid_upper_arm_cm)
        .bind(s.circumferences.thigh_cm)
        .bind(s.circumferences.calf_cm)
        .bind(&s.extras)
        .bind(s.updated_at)
        .fetch_one(&self.db)
        .await?;
        to_snapshot(row)
    }

    async fn latest_for_user(&self, user_id: i64) -> Result<Option<Snapshot>, RepoError> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            r#"
            SELECT {SNAPSHOT_COLUMNS} FROM anthropometry_evaluation
            WHERE user_id = $1
            ORDER BY measured_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(to_snapshot).transpose()
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        q: EvaluationQuery,
    ) -> Result<(Vec<Snapshot>, i64), RepoError> {
        const WINDOW: &str = "user_id = $1 \
            AND ($2::timestamptz IS NULL OR measured_at >= $2) \
            AND ($3::timestamptz IS NULL OR measured_at <= $3)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM anthropometry_evaluation WHERE {WINDOW}"
        ))
        .bind(user_id)
        .bind(q.from)
        .bind(q.to)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            r#"
            SELECT {SNAPSHOT_COLUMNS} FROM anthropometry_evaluation
            WHERE {WINDOW}
            ORDER BY measured_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(user_id)
        .bind(q.from)
        .bind(q.to)
        .bind(q.limit)
        .bind(q.offset)
        .fetch_all(&self.db)
        .await?;

        let items: Vec<Snapshot> = rows.into_iter().map(to_snapshot).collect::<Result<_, _>>()?;
        Ok((items, total))
    }
}

#[derive(Clone)]
pub struct PgResultRepository {
    db: PgPool,
}

impl PgResultRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const RESULT_COLUMNS: &str = "id, evaluation_id, method, sex, age_years, body_density, \
     body_fat_pct, fat_mass_kg, lean_mass_kg, z_score, percentile, classification, \
     parameters, notes, version, created_at, updated_at";

#[async_trait]
impl ResultRepository for PgResultRepository {
    async fn for_evaluation(&self, evaluation_id: i64) -> Result<Vec<AnthropometricResult>, RepoError> {
        let rows = sqlx::query_as::<_, ResultRow>(&format!(
            "SELECT {RESULT_COLUMNS} FROM anthropometry_result WHERE evaluation_id = $1 ORDER BY id"
        ))
        .bind(evaluation_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter()
            .map(|r| AnthropometricResult::try_from(r).map_err(decode))
            .collect()
    }

    async fn find(
        &self,
        evaluation_id: i64,
        method: Method,
    ) -> Result<Option<AnthropometricResult>, RepoError> {
        let row = sqlx::query_as::<_, ResultRow>(&format!(
            "SELECT {RESULT_COLUMNS} FROM anthropometry_result WHERE evaluation_id = $1 AND method = $2"
        ))
        .bind(evaluation_id)
        .bind(method.as_str())
        .fetch_optional(&self.db)
        .await?;
        row.map(|r| AnthropometricResult::try_from(r).map_err(decode))
            .transpose()
    }

    async fn insert(&self, r: NewResult) -> Result<AnthropometricResult, RepoError> {
        let row = sqlx::query_as::<_, ResultRow>(&format!(
            r#"
            INSERT INTO anthropometry_result (
                evaluation_id, method, sex, age_years, body_density, body_fat_pct,
                fat_mass_kg, lean_mass_kg, z_score, percentile, classification,
                parameters, notes, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
            RETURNING {RESULT_COLUMNS}
            "#
        ))
        .bind(r.evaluation_id)
        .bind(r.outcome.method.as_str())
        .bind(r.sex.as_str())
        .bind(r.age_years)
        .bind(r.outcome.body_density)
        .bind(r.outcome.body_fat_pct)
        .bind(r.outcome.fat_mass_kg)
        .bind(r.outcome.lean_mass_kg)
        .bind(r.outcome.z_score)
        .bind(r.outcome.percentile)
        .bind(&r.outcome.classification)
        .bind(&r.outcome.parameters)
        .bind(&r.outcome.notes)
        .bind(r.version)
        .bind(r.computed_at)
        .fetch_one(&self.db)
        .await?;
        AnthropometricResult::try_from(row).map_err(decode)
    }

    async fn replace(&self, id: i64, r: NewResult) -> Result<AnthropometricResult, RepoError> {
        let row = sqlx::query_as::<_, ResultRow>(&format!(
            r#"
            UPDATE anthropometry_result SET
                sex = $2, age_years = $3, body_density = $4, body_fat_pct = $5,
                fat_mass_kg = $6, lean_mass_kg = $7, z_score = $8, percentile = $9,
                classification = $10, parameters = $11, notes = $12, version = $13,
                updated_at = $14
            WHERE id = $1
            RETURNING {RESULT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(r.sex.as_str())
        .bind(r.age_years)
        .bind(r.outcome.body_density)
        .bind(r.outcome.body_fat_pct)
        .bind(r.outcome.fat_mass_kg)
        .bind(r.outcome.lean_mass_kg)
        .bind(r.outcome.z_score)
        .bind(r.outcome.percentile)
        .bind(&r.outcome.classification)
        .bind(&r.outcome.parameters)
        .bind(&r.outcome.notes)
        .bind(r.version)
        .bind(r.computed_at)
        .fetch_one(&self.db)
        .await?;
        AnthropometricResult::try_from(row).map_err(decode)
    }

    async fn delete(&self, evaluation_id: i64, method: Method) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM anthropometry_result WHERE evaluation_id = $1 AND method = $2")
            .bind(evaluation_id)
            .bind(method.as_str())
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
