use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::AuthUser,
    error::AppError,
    gestation::{
        dto::{AddVisitRequest, StartGestationRequest, VisitView},
        repo_types::GestationTracking,
        services,
    },
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/gestation/start", post(start_tracking))
        .route("/gestation/users/:user_id/current", get(current_tracking))
        .route(
            "/gestation/:tracking_id/visits",
            get(list_visits).post(add_visit),
        )
}

#[instrument(skip(state, payload))]
pub async fn start_tracking(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Json(payload): Json<StartGestationRequest>,
) -> Result<(StatusCode, Json<GestationTracking>), AppError> {
    let tracking = services::start(&state, &requester, payload).await?;
    Ok((StatusCode::CREATED, Json(tracking)))
}

#[instrument(skip(state))]
pub async fn current_tracking(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Option<GestationTracking>>, AppError> {
    Ok(Json(services::current(&state, &requester, user_id).await?))
}

#[instrument(skip(state, payload))]
pub async fn add_visit(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(tracking_id): Path<i64>,
    Json(payload): Json<AddVisitRequest>,
) -> Result<(StatusCode, Json<VisitView>), AppError> {
    let visit = services::add_visit(&state, &requester, tracking_id, payload).await?;
    Ok((StatusCode::CREATED, Json(visit)))
}

#[instrument(skip(state))]
pub async fn list_visits(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
    Path(tracking_id): Path<i64>,
) -> Result<Json<Vec<VisitView>>, AppError> {
    Ok(Json(
        services::list_visits(&state, &requester, tracking_id).await?,
    ))
}
