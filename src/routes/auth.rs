use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::state::{
    AppState, LoginInput, RegisterInput, TokenPair, UserView, approve_user, login, logout,
    refresh, register,
};

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserView,
    pub access: String,
    pub refresh: String,
}

impl AuthResponse {
    fn of(user: UserView, tokens: TokenPair) -> Self {
        AuthResponse {
            user,
            access: tokens.access,
            refresh: tokens.refresh,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct ApproveQuery {
    pub token: String,
}

pub async fn auth_register(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let (user, tokens) = register(&state, input).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse::of(user, tokens))))
}

pub async fn auth_login(
    State(state): State<Arc<AppState>>,
    Json(input): Json<LoginInput>,
) -> Result<Json<AuthResponse>, ApiError> {
    let (user, tokens) = login(&state, input).await?;
    Ok(Json(AuthResponse::of(user, tokens)))
}

pub async fn auth_refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshBody>,
) -> Result<Json<TokenPair>, ApiError> {
    Ok(Json(refresh(&state, &body.refresh).await?))
}

pub async fn auth_logout(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshBody>,
) -> Result<StatusCode, ApiError> {
    logout(&state, &body.refresh).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn auth_user(current: CurrentUser) -> Json<UserView> {
    Json(UserView::of(current.user()))
}

pub async fn admin_approve_user(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ApproveQuery>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(approve_user(&state, &query.token).await?))
}
