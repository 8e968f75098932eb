use bson::{DateTime, doc, oid::ObjectId};
use chrono::NaiveDate;
use futures::stream::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::ApiError;
use crate::models::Gr;

use super::{AppState, Scope, works::delete_work_subtree, works::fmt_ts};

#[derive(Debug, Deserialize)]
pub struct GrInput {
    pub gr_number: String,
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct GrView {
    pub id: String,
    pub gr_number: String,
    pub date: NaiveDate,
    pub document: Option<String>,
    pub is_demo: bool,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl GrView {
    pub fn of(gr: &Gr) -> Self {
        GrView {
            id: gr.id.map(|id| id.to_hex()).unwrap_or_default(),
            gr_number: gr.gr_number.clone(),
            date: gr.date,
            document: gr.document.clone(),
            is_demo: gr.is_demo,
            created_at: fmt_ts(gr.created_at),
            updated_at: fmt_ts(gr.updated_at),
        }
    }
}

pub async fn list_grs(state: &AppState, scope: Scope) -> Result<Vec<Gr>, ApiError> {
    let mut cursor = state
        .grs
        .find(doc! { "is_demo": scope.is_demo() })
        .sort(doc! { "date": -1 })
        .await?;
    let mut items = Vec::new();
    while let Some(gr) = cursor.try_next().await? {
        items.push(gr);
    }
    Ok(items)
}

pub async fn get_gr(state: &AppState, scope: Scope, id: &ObjectId) -> Result<Option<Gr>, ApiError> {
    state
        .grs
        .find_one(doc! { "_id": id, "is_demo": scope.is_demo() })
        .await
        .map_err(Into::into)
}

async fn check_gr_number_free(
    state: &AppState,
    scope: Scope,
    gr_number: &str,
    exclude: Option<&ObjectId>,
) -> Result<(), ApiError> {
    let mut filter = doc! { "gr_number": gr_number, "is_demo": scope.is_demo() };
    if let Some(id) = exclude {
        filter.insert("_id", doc! { "$ne": id });
    }
    if state.grs.find_one(filter).await?.is_some() {
        return Err(ApiError::conflict(format!(
            "a GR with number {gr_number} already exists"
        )));
    }
    Ok(())
}

pub async fn create_gr(
    state: &AppState,
    scope: Scope,
    input: GrInput,
    document: Option<String>,
) -> Result<Gr, ApiError> {
    check_gr_number_free(state, scope, &input.gr_number, None).await?;

    let mut gr = Gr {
        id: None,
        gr_number: input.gr_number,
        date: input.date,
        document,
        is_demo: scope.is_demo(),
        created_at: Some(DateTime::from_system_time(SystemTime::now())),
        updated_at: None,
    };
    let res = state.grs.insert_one(&gr).await?;
    gr.id = res.inserted_id.as_object_id();
    Ok(gr)
}

pub async fn update_gr(
    state: &AppState,
    scope: Scope,
    id: &ObjectId,
    input: GrInput,
    document: Option<String>,
) -> Result<Gr, ApiError> {
    let mut gr = get_gr(state, scope, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("GR {id} not found")))?;
    check_gr_number_free(state, scope, &input.gr_number, Some(id)).await?;

    gr.gr_number = input.gr_number;
    gr.date = input.date;
    if document.is_some() {
        gr.document = document;
    }
    gr.updated_at = Some(DateTime::from_system_time(SystemTime::now()));

    state.grs.replace_one(doc! { "_id": id }, &gr).await?;
    Ok(gr)
}

/// Delete a GR and its whole subtree, then detach any bill that named it
/// as the payment source.
pub async fn delete_gr(state: &AppState, scope: Scope, id: &ObjectId) -> Result<(), ApiError> {
    if get_gr(state, scope, id).await?.is_none() {
        return Err(ApiError::not_found(format!("GR {id} not found")));
    }
    let gr_id = *id;

    let mut cursor = state.works.find(doc! { "gr_id": &gr_id }).await?;
    while let Some(work) = cursor.try_next().await? {
        if let Some(work_id) = work.id {
            delete_work_subtree(state, &work_id).await?;
        }
    }

    state
        .bills
        .update_many(
            doc! { "payment_done_from_gr": &gr_id },
            doc! { "$set": { "payment_done_from_gr": null } },
        )
        .await?;

    state.grs.delete_one(doc! { "_id": &gr_id }).await?;
    Ok(())
}
