use tracing::{debug, info};

use crate::error::AppError;
use crate::metrics::derived::{self, DerivedInputs, DerivedKind, DerivedMetric};
use crate::metrics::dto::RecordMetricsRequest;
use crate::metrics::repo_types::{ActivityLevel, MetricsRecord, NewMetrics};
use crate::state::AppState;
use crate::units::{
    normalize_height_to_meters, parse_locale_number, validate_age, validate_body_fat,
    validate_weight, NumberInput, Sex,
};

/// Validated, canonical values for the fields a caller supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsPatch {
    pub weight_kg: Option<f64>,
    pub height_m: Option<f64>,
    pub age_years: Option<i32>,
    pub sex: Option<Sex>,
    pub activity_level: Option<ActivityLevel>,
    pub body_fat_pct: Option<f64>,
}

fn given_number(v: Option<NumberInput>) -> Option<NumberInput> {
    v.filter(|n| !matches!(n, NumberInput::Text(s) if s.trim().is_empty()))
}

fn given_text(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

impl MetricsPatch {
    /// Absent, null and blank values stay `None`; zero is a value and gets validated.
    pub fn parse(req: RecordMetricsRequest) -> Result<Self, AppError> {
        Ok(Self {
            weight_kg: given_number(req.weight)
                .map(|v| parse_locale_number(&v).and_then(validate_weight))
                .transpose()?,
            height_m: given_number(req.height)
                .map(|v| parse_locale_number(&v).and_then(normalize_height_to_meters))
                .transpose()?,
            age_years: given_number(req.age)
                .map(|v| parse_locale_number(&v).and_then(validate_age))
                .transpose()?,
            sex: given_text(req.sex).map(|s| s.parse::<Sex>()).transpose()?,
            activity_level: given_text(req.activity_level)
                .map(|s| s.parse::<ActivityLevel>())
                .transpose()?,
            body_fat_pct: given_number(req.body_fat_pct)
                .map(|v| parse_locale_number(&v).and_then(validate_body_fat))
                .transpose()?,
        })
    }
}

/// Builds the next record from `patch`, inheriting each absent field from `prior`.
pub fn merge(
    user_id: i64,
    prior: Option<&MetricsRecord>,
    patch: MetricsPatch,
    now: time::OffsetDateTime,
) -> Result<NewMetrics, AppError> {
    let Some(prior) = prior else {
        let mut missing = Vec::new();
        if patch.weight_kg.is_none() {
            missing.push("weight");
        }
        if patch.height_m.is_none() {
            missing.push("height");
        }
        if patch.age_years.is_none() {
            missing.push("age");
        }
        if patch.sex.is_none() {
            missing.push("sex");
        }
        if patch.activity_level.is_none() {
            missing.push("activity_level");
        }
        return match patch {
            MetricsPatch {
                weight_kg: Some(weight_kg),
                height_m: Some(height_m),
                age_years: Some(age_years),
                sex: Some(sex),
                activity_level: Some(activity_level),
                body_fat_pct,
            } => Ok(NewMetrics {
                user_id,
                weight_kg,
                height_m,
                age_years,
                sex,
                activity_level,
                body_fat_pct,
                created_at: now,
            }),
            _ => Err(AppError::MissingRequiredField(missing)),
        };
    };

    Ok(NewMetrics {
        user_id,
        weight_kg: patch.weight_kg.unwrap_or(prior.weight_kg),
        height_m: patch.height_m.unwrap_or(prior.height_m),
        age_years: patch.age_years.unwrap_or(prior.age_years),
        sex: patch.sex.unwrap_or(prior.sex),
        activity_level: patch.activity_level.unwrap_or(prior.activity_level),
        body_fat_pct: patch.body_fat_pct.or(prior.body_fat_pct),
        created_at: now,
    })
}

/// Appends one history row; never touches existing rows.
pub async fn append(
    state: &AppState,
    user_id: i64,
    patch: MetricsPatch,
) -> Result<MetricsRecord, AppError> {
    if state.users.find(user_id).await?.is_none() {
        return Err(AppError::NotFound("user"));
    }
    let prior = state.metrics.latest(user_id).await?;
    let next = merge(user_id, prior.as_ref(), patch, state.clock.now())?;
    let record = state.metrics.append(next).await?;
    info!(user_id, metrics_id = record.id, inherited = prior.is_some(), "metrics recorded");
    Ok(record)
}

pub async fn latest(state: &AppState, user_id: i64) -> Result<Option<MetricsRecord>, AppError> {
    Ok(state.metrics.latest(user_id).await?)
}

pub async fn history(state: &AppState, user_id: i64) -> Result<Vec<MetricsRecord>, AppError> {
    Ok(state.metrics.history(user_id).await?)
}

pub async fn compute_derived(
    state: &AppState,
    user_id: i64,
    kind: DerivedKind,
) -> Result<DerivedMetric, AppError> {
    let current = state.metrics.latest(user_id).await?;
    let metric = derived::compute(kind, &DerivedInputs::from(current.as_ref()))?;
    debug!(user_id, kind = ?kind, value = metric.value, "derived metric computed");
    Ok(metric)
}
