// routes/mod.rs
// JSON handlers over the state layer, plus shared plumbing for the
// endpoints that accept either JSON or a multipart form with a file.

pub mod auth;
pub mod bills;
pub mod grs;
pub mod sanctions;
pub mod spills;
pub mod status;
pub mod tenders;
pub mod works;

use std::sync::Arc;

use axum::{
    RequestExt, Router,
    extract::{Multipart, Request},
    routing::get,
};
use bson::oid::ObjectId;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::error::{ApiError, parse_body_id};
use crate::state::AppState;

/// The CRUD and reporting surface. Mounted twice: once behind auth for
/// the production partition and once publicly for the demo sandbox, with
/// the partition injected as an extension layer.
pub fn entity_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/grs", get(grs::gr_list).post(grs::gr_create))
        .route(
            "/grs/{id}",
            get(grs::gr_get).put(grs::gr_update).delete(grs::gr_delete),
        )
        .route("/works", get(works::work_list).post(works::work_create))
        .route(
            "/works/{id}",
            get(works::work_get)
                .put(works::work_update)
                .delete(works::work_delete),
        )
        .route(
            "/spills",
            get(spills::spill_list).post(spills::spill_create),
        )
        .route(
            "/spills/{id}",
            get(spills::spill_get)
                .put(spills::spill_update)
                .delete(spills::spill_delete),
        )
        .route(
            "/technical-sanctions",
            get(sanctions::sanction_list).post(sanctions::sanction_create),
        )
        .route(
            "/technical-sanctions/{id}",
            get(sanctions::sanction_get)
                .put(sanctions::sanction_update)
                .delete(sanctions::sanction_delete),
        )
        .route(
            "/tenders",
            get(tenders::tender_list).post(tenders::tender_create),
        )
        .route(
            "/tenders/{id}",
            get(tenders::tender_get)
                .put(tenders::tender_update)
                .delete(tenders::tender_delete),
        )
        .route("/bills", get(bills::bill_list).post(bills::bill_create))
        .route(
            "/bills/{id}",
            get(bills::bill_get)
                .put(bills::bill_update)
                .delete(bills::bill_delete),
        )
        .route("/status", get(status::status))
        .route("/dashboard", get(status::dashboard_totals))
}

/// Common `?gr=` / `?work=` list filter.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub gr: Option<String>,
    pub work: Option<String>,
    pub technical_sanction: Option<String>,
    pub tender: Option<String>,
}

impl ListQuery {
    pub fn gr_id(&self) -> Result<Option<ObjectId>, ApiError> {
        match self.gr.as_deref() {
            Some(raw) if !raw.is_empty() => parse_body_id(raw, "gr").map(Some),
            _ => Ok(None),
        }
    }

    pub fn work_id(&self) -> Result<Option<ObjectId>, ApiError> {
        match self.work.as_deref() {
            Some(raw) if !raw.is_empty() => parse_body_id(raw, "work").map(Some),
            _ => Ok(None),
        }
    }

    pub fn sanction_id(&self) -> Result<Option<ObjectId>, ApiError> {
        match self.technical_sanction.as_deref() {
            Some(raw) if !raw.is_empty() => parse_body_id(raw, "technical_sanction").map(Some),
            _ => Ok(None),
        }
    }

    pub fn tender_id(&self) -> Result<Option<ObjectId>, ApiError> {
        match self.tender.as_deref() {
            Some(raw) if !raw.is_empty() => parse_body_id(raw, "tender").map(Some),
            _ => Ok(None),
        }
    }
}

/// A parsed multipart form: text fields plus at most one file per field
/// name.
#[derive(Debug, Default)]
pub(crate) struct FormBody {
    fields: HashMap<String, String>,
    files: HashMap<String, (String, Vec<u8>)>,
}

impl FormBody {
    pub fn required(&self, name: &str) -> Result<&str, ApiError> {
        match self.fields.get(name).map(String::as_str) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ApiError::validation(name, "this field is required")),
        }
    }

    pub fn optional(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn f64_required(&self, name: &str) -> Result<f64, ApiError> {
        self.required(name)?
            .trim()
            .parse()
            .map_err(|_| ApiError::validation(name, "expected a number"))
    }

    pub fn f64_optional(&self, name: &str) -> Result<Option<f64>, ApiError> {
        match self.optional(name) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| ApiError::validation(name, "expected a number")),
            None => Ok(None),
        }
    }

    pub fn f64_or_zero(&self, name: &str) -> Result<f64, ApiError> {
        Ok(self.f64_optional(name)?.unwrap_or(0.0))
    }

    pub fn date_optional(&self, name: &str) -> Result<Option<NaiveDate>, ApiError> {
        match self.optional(name) {
            Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| ApiError::validation(name, "expected a date in YYYY-MM-DD form")),
            None => Ok(None),
        }
    }

    pub fn date_required(&self, name: &str) -> Result<NaiveDate, ApiError> {
        self.date_optional(name)?
            .ok_or_else(|| ApiError::validation(name, "this field is required"))
    }

    /// HTML checkbox semantics: absent means unset, not false.
    pub fn bool_optional(&self, name: &str) -> Result<Option<bool>, ApiError> {
        match self.optional(name) {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Ok(Some(true)),
                "false" | "0" | "off" | "no" => Ok(Some(false)),
                _ => Err(ApiError::validation(name, "expected a boolean")),
            },
            None => Ok(None),
        }
    }

    pub fn file(&self, name: &str) -> Option<(&str, &[u8])> {
        self.files
            .get(name)
            .map(|(filename, bytes)| (filename.as_str(), bytes.as_slice()))
    }
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn parse_multipart(request: Request) -> Result<FormBody, ApiError> {
    let mut multipart = request
        .extract::<Multipart, _>()
        .await
        .map_err(|err| ApiError::validation("body", err.to_string()))?;

    let mut form = FormBody::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::validation("body", err.to_string()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if let Some(filename) = field.file_name().map(str::to_string) {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::validation(&name, err.to_string()))?;
            if !filename.is_empty() && !bytes.is_empty() {
                form.files.insert(name, (filename, bytes.to_vec()));
            }
        } else {
            let text = field
                .text()
                .await
                .map_err(|err| ApiError::validation(&name, err.to_string()))?;
            form.fields.insert(name, text);
        }
    }
    Ok(form)
}

async fn parse_json<T: DeserializeOwned + 'static>(request: Request) -> Result<T, ApiError> {
    let axum::Json(value) = request
        .extract::<axum::Json<T>, _>()
        .await
        .map_err(|err| ApiError::validation("body", err.to_string()))?;
    Ok(value)
}

/// Either a JSON body or a multipart form, depending on the content type.
pub(crate) enum Body<T> {
    Json(T),
    Form(FormBody),
}

pub(crate) async fn parse_body<T: DeserializeOwned + 'static>(
    request: Request,
) -> Result<Body<T>, ApiError> {
    if is_multipart(&request) {
        Ok(Body::Form(parse_multipart(request).await?))
    } else {
        Ok(Body::Json(parse_json(request).await?))
    }
}
