pub mod autopick;
mod dto;
pub mod formulas;
pub mod growth;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::evaluation_routes())
        .merge(handlers::subject_routes())
}
