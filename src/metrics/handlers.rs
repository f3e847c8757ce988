use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::AuthUser,
    error::AppError,
    metrics::{
        derived::{DerivedKind, DerivedMetric},
        dto::{HasMetricsResponse, RecordMetricsRequest},
        repo_types::MetricsRecord,
        services::{self, MetricsPatch},
    },
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/metrics/check", get(check_metrics))
        .route("/metrics/imc", get(get_bmi))
        .route("/metrics/tdee", get(get_tdee))
        .route("/metrics/tmb", get(get_tmb))
        .route("/metrics/macronutrients", get(get_macros))
        .route("/metrics/water", get(get_water))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/metrics", get(list_metrics).post(record_metrics))
}

#[instrument(skip(state, payload))]
pub async fn record_metrics(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Json(payload): Json<RecordMetricsRequest>,
) -> Result<(StatusCode, Json<MetricsRecord>), AppError> {
    let patch = MetricsPatch::parse(payload)?;
    let record = services::append(&state, requester.id, patch).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[instrument(skip(state))]
pub async fn list_metrics(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
) -> Result<Json<Vec<MetricsRecord>>, AppError> {
    Ok(Json(services::history(&state, requester.id).await?))
}

#[instrument(skip(state))]
pub async fn check_metrics(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
) -> Result<Json<HasMetricsResponse>, AppError> {
    let has_metrics = services::latest(&state, requester.id).await?.is_some();
    Ok(Json(HasMetricsResponse { has_metrics }))
}

async fn derived(
    state: &AppState,
    user_id: i64,
    kind: DerivedKind,
) -> Result<Json<DerivedMetric>, AppError> {
    Ok(Json(services::compute_derived(state, user_id, kind).await?))
}

#[instrument(skip(state))]
pub async fn get_bmi(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
) -> Result<Json<DerivedMetric>, AppError> {
    derived(&state, requester.id, DerivedKind::Bmi).await
}

#[instrument(skip(state))]
pub async fn get_tdee(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
) -> Result<Json<DerivedMetric>, AppError> {
    derived(&state, requester.id, DerivedKind::Tdee).await
}

#[instrument(skip(state))]
pub async fn get_tmb(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
) -> Result<Json<DerivedMetric>, AppError> {
    derived(&state, requester.id, DerivedKind::Tmb).await
}

#[instrument(skip(state))]
pub async fn get_macros(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
) -> Result<Json<DerivedMetric>, AppError> {
    derived(&state, requester.id, DerivedKind::Macros).await
}

#[instrument(skip(state))]
pub async fn get_water(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
) -> Result<Json<DerivedMetric>, AppError> {
    derived(&state, requester.id, DerivedKind::Water).await
}
