use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::error::{ApiError, parse_body_id};
use crate::state::{AppState, Dashboard, Scope, StatusPage, StatusReport, dashboard, status_report};

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub page: Option<String>,
    pub gr: Option<String>,
    pub work: Option<String>,
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusReport>, ApiError> {
    let page = StatusPage::parse(query.page.as_deref())?;
    let gr = match query.gr.as_deref() {
        Some(raw) if !raw.is_empty() => Some(parse_body_id(raw, "gr")?),
        _ => None,
    };
    let work = match query.work.as_deref() {
        Some(raw) if !raw.is_empty() => Some(parse_body_id(raw, "work")?),
        _ => None,
    };
    let report = status_report(&state, scope, page, gr.as_ref(), work.as_ref()).await?;
    Ok(Json(report))
}

pub async fn dashboard_totals(
    State(state): State<Arc<AppState>>,
    Extension(scope): Extension<Scope>,
) -> Result<Json<Dashboard>, ApiError> {
    Ok(Json(dashboard(&state, scope).await?))
}
