use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::User;
use crate::services::auth;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let user = {
        let db = state.db.lock().unwrap();
        auth::register(&db, &body.name, &body.email, &body.password, body.phone)?
    };
    let token = auth::issue_token(&user, &state.config)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = {
        let db = state.db.lock().unwrap();
        auth::login(&db, &body.email, &body.password)?
    };
    let token = auth::issue_token(&user, &state.config)?;
    Ok(Json(AuthResponse { token, user }))
}
