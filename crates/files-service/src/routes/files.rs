use std::collections::BTreeMap;

use actix_web::{delete, get, patch, post, web, HttpResponse};
use file_types::file::{FileId, NewFile, SongPublishStatus};
use file_types::filter::{FileFilter, FilterSet};
use file_types::{Error, Result};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::state::AppState;

fn comma_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Query parameters for `GET /files`: comma-separated id lists map onto an
/// include-only [`FilterSet`], plus a page/limit pair (§6).
#[derive(Debug, Deserialize)]
pub struct FileListQuery {
    pub analyses: Option<String>,
    pub donors: Option<String>,
    pub programs: Option<String>,
    #[serde(rename = "fileIds")]
    pub file_ids: Option<String>,
    #[serde(rename = "objectIds")]
    pub object_ids: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    0
}

fn default_limit() -> u64 {
    100
}

impl FileListQuery {
    fn into_filter(self) -> Result<FileFilter> {
        let file_ids = match self.file_ids {
            Some(raw) => Some(comma_list(&raw).into_iter().map(|s| s.parse::<FileId>()).collect::<Result<Vec<_>>>()?),
            None => None,
        };
        let set = FilterSet {
            analyses: self.analyses.as_deref().map(comma_list),
            donors: self.donors.as_deref().map(comma_list),
            programs: self.programs.as_deref().map(comma_list),
            file_ids,
            object_ids: self.object_ids.as_deref().map(comma_list),
        };
        Ok(if set.is_empty() { FileFilter::default() } else { FileFilter { include: Some(set), exclude: None } })
    }
}

#[derive(Debug, serde::Serialize)]
struct FilePage {
    files: Vec<file_types::File>,
    total: u64,
    page: u64,
    limit: u64,
}

#[get("/files")]
pub async fn list_files(state: web::Data<AppState>, query: web::Query<FileListQuery>) -> Result<HttpResponse> {
    let query = query.into_inner();
    let page = query.page;
    let limit = query.limit;
    let filter = query.into_filter()?;
    let (files, total) = state.file_store.get_paginated_files(page, limit, filter)?;
    Ok(HttpResponse::Ok().json(FilePage { files, total, page, limit }))
}

#[get("/files/{id}")]
pub async fn get_file(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id: FileId = path.into_inner().parse()?;
    let file = state.file_store.get_by_id(id)?.ok_or_else(|| Error::not_found(format!("no file with id {id}")))?;
    Ok(HttpResponse::Ok().json(file))
}

/// Request body for `POST /files`: registers a data object the platform has
/// not seen before and immediately recalculates its embargo state, without
/// waiting for the next `analysisUpdate` event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    pub object_id: String,
    pub repo_id: String,
    pub program_id: String,
    pub donor_id: String,
    pub analysis_id: String,
}

#[post("/files")]
pub async fn create_file(state: web::Data<AppState>, body: web::Json<CreateFileRequest>) -> Result<HttpResponse> {
    let body = body.into_inner();
    let file = state.file_store.get_or_create_by_object_id(NewFile {
        object_id: body.object_id,
        repo_id: body.repo_id,
        program_id: body.program_id,
        donor_id: body.donor_id,
        analysis_id: body.analysis_id,
        status: SongPublishStatus::Published,
        first_published: OffsetDateTime::now_utc(),
    })?;
    let file = state.file_manager.update_file_from_external_sources(file).await?;
    Ok(HttpResponse::Created().json(file))
}

#[patch("/files/{id}/labels")]
pub async fn add_labels(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<BTreeMap<String, Vec<String>>>,
) -> Result<HttpResponse> {
    let id: FileId = path.into_inner().parse()?;
    let file = state.file_store.add_or_update_label(id, body.into_inner())?;
    Ok(HttpResponse::Ok().json(file))
}

#[derive(Debug, Deserialize)]
pub struct RemoveLabelsQuery {
    pub keys: String,
}

#[delete("/files/{id}/labels")]
pub async fn remove_labels(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<RemoveLabelsQuery>,
) -> Result<HttpResponse> {
    let id: FileId = path.into_inner().parse()?;
    let keys = comma_list(&query.keys);
    let file = state.file_store.remove_label(id, &keys)?;
    Ok(HttpResponse::Ok().json(file))
}
