// auth.rs
// Bearer-token middleware to protect routes and extractor to access the
// authenticated user.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;

use bson::oid::ObjectId;

use crate::error::ApiError;
use crate::models::{TokenKind, User};
use crate::state::{AppState, user_for_token};

#[derive(Clone)]
pub struct AuthData {
    pub user: User,
    pub token: String,
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let Some(token) = bearer_token(request.headers()) else {
        return Err(unauthorized_response());
    };

    match user_for_token(&state, &token, TokenKind::Access).await {
        Ok(Some(user)) if user.is_approved => {
            request.extensions_mut().insert(AuthData { user, token });
            Ok(next.run(request).await)
        }
        Ok(_) => Err(unauthorized_response()),
        Err(err) => Err(err.into_response()),
    }
}

pub struct CurrentUser(pub AuthData);

impl CurrentUser {
    pub fn user(&self) -> &User {
        &self.0.user
    }

    pub fn token(&self) -> &str {
        &self.0.token
    }

    pub fn user_id(&self) -> Option<&ObjectId> {
        self.0.user.id.as_ref()
    }
}

#[allow(refining_impl_trait)]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> BoxFuture<'static, Result<Self, Self::Rejection>> {
        let data = parts
            .extensions
            .get::<AuthData>()
            .cloned()
            .ok_or_else(unauthorized_response);

        Box::pin(async move {
            match data {
                Ok(auth) => Ok(CurrentUser(auth)),
                Err(resp) => Err(resp),
            }
        })
    }
}

fn unauthorized_response() -> Response {
    ApiError::unauthorized("authentication required").into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let rest = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    let token = rest.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_owned())
    }
}
