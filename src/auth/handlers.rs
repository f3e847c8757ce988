use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest},
        repo_types::{NewUser, Role, User},
        services::{hash_password, is_valid_email, verify_password, AuthUser, JwtKeys},
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn issue_tokens(state: &AppState, user: User) -> Result<AuthResponse, AppError> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user.id, user.role).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        AppError::Persistence(e.to_string())
    })?;
    let refresh_token = keys.sign_refresh(user.id, user.role).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        AppError::Persistence(e.to_string())
    })?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }

    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AppError::Validation("Password too short".into()));
    }

    // Ensure email is not taken
    if state.users.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Duplicate("Email already registered".into()));
    }

    let password_hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        AppError::Persistence(e.to_string())
    })?;

    let user = state
        .users
        .create(NewUser {
            email: payload.email,
            name: payload.name,
            password_hash,
            role: Role::User,
            birth_date: payload.birth_date,
        })
        .await?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(issue_tokens(&state, user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }

    let user = match state.users.find_by_email(&payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        AppError::Persistence(e.to_string())
    })?;

    if !ok {
        warn!(email = %payload.email, user_id = user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    info!(user_id = user.id, "user logged in");
    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    let user = state
        .users
        .find(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

    Ok(Json(issue_tokens(&state, user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(requester): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state.users.find(requester.id).await?.ok_or_else(|| {
        error!(user_id = requester.id, "user not found");
        AppError::Unauthorized("User not found".into())
    })?;

    Ok(Json(user.into()))
}

#[cfg(test)]
mod me_tests {
    use super::*;

    #[test]
    fn public_user_hides_password_hash() {
        let user = User {
            id: 5,
            email: "test@example.com".to_string(),
            name: Some("Test".into()),
            password_hash: "secret-hash".into(),
            role: Role::User,
            birth_date: Some(time::macros::date!(1990 - 01 - 02)),
            created_at: time::OffsetDateTime::UNIX_EPOCH,
        };

        let json = serde_json::to_string(&PublicUser::from(user)).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("1990-01-02"));
        assert!(!json.contains("secret-hash"));
    }
}
