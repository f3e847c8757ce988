use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    anthropometry::{
        dto::{ComputeOutcome, EvaluationPage, EvaluationView, ListQuery, SnapshotFields, SubmitSnapshotRequest},
        repo_types::{AnthropometricResult, Method, Snapshot},
        services,
    },
    auth::AuthUser,
    error::AppError,
    state::AppState,
};

pub fn evaluation_routes() -> Router<AppState> {
    Router::new()
        .route("/anthropometry/evaluations", post(submit_evaluation))
        .route(
            "/anthropometry/evaluations/:id",
            get(get_evaluation).patch(update_evaluation),
        )
        .route("/anthropometry/evaluations/:id/compute", post(compute_autopick))
        .route(
            "/anthropometry/evaluations/:id/compute/:method",
            post(compute_method),
        )
}

pub fn subject_routes() -> Router<AppState> {
    Router::new()
        .route("/anthropometry/users/:user_id/evaluations", get(list_evaluations))
        .route("/anthropometry/users/:user_id/latest", get(latest_evaluation))
}

#[instrument(skip(state, payload))]
pub async fn submit_evaluation(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Json(payload): Json<SubmitSnapshotRequest>,
) -> Result<(StatusCode, Json<Snapshot>), AppError> {
    let subject = payload.user_id.unwrap_or(requester.id);
    let snapshot = services::submit_snapshot(&state, &requester, subject, &payload.fields).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

#[instrument(skip(state, payload))]
pub async fn update_evaluation(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<SnapshotFields>,
) -> Result<Json<Snapshot>, AppError> {
    Ok(Json(
        services::update_snapshot(&state, &requester, id, &payload).await?,
    ))
}

#[instrument(skip(state))]
pub async fn get_evaluation(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<EvaluationView>, AppError> {
    Ok(Json(services::get_evaluation(&state, &requester, id).await?))
}

#[instrument(skip(state))]
pub async fn compute_autopick(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ComputeOutcome>, AppError> {
    Ok(Json(services::compute_autopick(&state, &requester, id).await?))
}

#[instrument(skip(state))]
pub async fn compute_method(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path((id, method)): Path<(i64, String)>,
) -> Result<Json<Vec<AnthropometricResult>>, AppError> {
    let method: Method = method.parse()?;
    Ok(Json(
        services::compute_method(&state, &requester, id, method).await?,
    ))
}

#[instrument(skip(state))]
pub async fn list_evaluations(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(user_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<EvaluationPage>, AppError> {
    Ok(Json(
        services::list_by_subject(&state, &requester, user_id, &query).await?,
    ))
}

#[instrument(skip(state))]
pub async fn latest_evaluation(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Option<EvaluationView>>, AppError> {
    Ok(Json(
        services::latest_by_subject(&state, &requester, user_id).await?,
    ))
}
