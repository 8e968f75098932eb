// lib.rs
// Public-works lifecycle tracker: GRs, works, spill-overs, technical
// sanctions, tenders and bills over MongoDB, exposed as a JSON API with
// a production partition behind bearer auth and a public demo sandbox.

pub mod auth;
pub mod calc;
pub mod error;
pub mod models;
pub mod routes;
pub mod state;
pub mod uploads;

use std::sync::Arc;

use axum::{Extension, Router, middleware, routing::get, routing::post};

use state::{AppState, Scope};

/// Full application router. Auth endpoints are public, the production
/// partition sits behind the bearer-token middleware, and the demo
/// partition is open.
pub fn app(state: Arc<AppState>) -> Router {
    let production = routes::entity_routes()
        .layer(Extension(Scope::Production))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let session = Router::new()
        .route("/auth/logout", post(routes::auth::auth_logout))
        .route("/auth/user", get(routes::auth::auth_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let api = Router::new()
        .route("/auth/register", post(routes::auth::auth_register))
        .route("/auth/login", post(routes::auth::auth_login))
        .route("/auth/refresh", post(routes::auth::auth_refresh))
        .route("/admin/approve-user", get(routes::auth::admin_approve_user))
        .merge(session)
        .merge(production)
        .nest("/demo", routes::entity_routes().layer(Extension(Scope::Demo)));

    Router::new().nest("/api", api).with_state(state)
}
