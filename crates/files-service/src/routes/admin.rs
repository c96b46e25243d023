use actix_web::{post, web, HttpResponse};
use file_store::{AdminControlUpdate, BulkUpdate};
use file_types::file::{ClinicalExemptionReason, EmbargoStage};
use file_types::{Error, FileFilter, Result};
use serde::{Deserialize, Serialize};

use crate::reindex;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DryRunQuery {
    #[serde(default, rename = "dryRun")]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct BulkResult {
    #[serde(rename = "objectIds")]
    object_ids: Vec<String>,
    #[serde(rename = "dryRun")]
    dry_run: bool,
}

fn affected_object_ids(state: &AppState, filter: &FileFilter) -> Result<Vec<String>> {
    state.file_store.get_files(filter.clone())?.map(|r| r.map(|f| f.object_id)).collect()
}

async fn apply_bulk(state: &AppState, filter: FileFilter, update: BulkUpdate, dry_run: bool) -> Result<HttpResponse> {
    if dry_run {
        let object_ids = affected_object_ids(state, &filter)?;
        return Ok(HttpResponse::Ok().json(BulkResult { object_ids, dry_run: true }));
    }
    let updated = state.file_store.update_bulk(filter, update, true)?;
    let object_ids = updated.into_iter().map(|f| f.object_id).collect();
    Ok(HttpResponse::Ok().json(BulkResult { object_ids, dry_run: false }))
}

#[post("/admin/promote/{stage}")]
pub async fn promote(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DryRunQuery>,
    body: web::Json<FileFilter>,
) -> Result<HttpResponse> {
    let stage: EmbargoStage = parse_stage(&path.into_inner())?;
    let update = BulkUpdate { admin: AdminControlUpdate { admin_promote: Some(Some(stage)), ..Default::default() }, ..Default::default() };
    apply_bulk(&state, body.into_inner(), update, query.dry_run).await
}

#[post("/admin/demote/{stage}")]
pub async fn demote(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DryRunQuery>,
    body: web::Json<FileFilter>,
) -> Result<HttpResponse> {
    let stage: EmbargoStage = parse_stage(&path.into_inner())?;
    let update = BulkUpdate { admin: AdminControlUpdate { admin_demote: Some(Some(stage)), ..Default::default() }, ..Default::default() };
    apply_bulk(&state, body.into_inner(), update, query.dry_run).await
}

#[post("/admin/clinicalExemption/{reason}")]
pub async fn set_clinical_exemption(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<DryRunQuery>,
    body: web::Json<FileFilter>,
) -> Result<HttpResponse> {
    let reason = ClinicalExemptionReason(path.into_inner());
    let update = BulkUpdate {
        admin: AdminControlUpdate { clinical_exemption: Some(Some(reason)), ..Default::default() },
        ..Default::default()
    };
    apply_bulk(&state, body.into_inner(), update, query.dry_run).await
}

#[post("/admin/clinicalExemption/remove")]
pub async fn remove_clinical_exemption(
    state: web::Data<AppState>,
    query: web::Query<DryRunQuery>,
    body: web::Json<FileFilter>,
) -> Result<HttpResponse> {
    let update = BulkUpdate {
        admin: AdminControlUpdate { clinical_exemption: Some(None), ..Default::default() },
        ..Default::default()
    };
    apply_bulk(&state, body.into_inner(), update, query.dry_run).await
}

#[derive(Debug, Deserialize)]
pub struct ReindexQuery {
    pub study: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReindexAccepted {
    #[serde(rename = "dataCenterId")]
    data_center_id: String,
    status: &'static str,
}

/// Kicks off a full re-index of one data center's published analyses (§6).
/// The walk itself can take minutes against a large song server, so it runs
/// as a detached background task; the response only confirms the job was
/// accepted.
#[post("/admin/index/{datacenter}")]
pub async fn reindex_data_center(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ReindexQuery>,
) -> Result<HttpResponse> {
    let data_center_id = path.into_inner();
    let state = state.into_inner();
    let study = query.into_inner().study;
    let spawned_id = data_center_id.clone();
    tokio::spawn(async move {
        if let Err(e) = reindex::reindex_data_center(&state, &spawned_id, study).await {
            tracing::error!(data_center_id = %spawned_id, error = %e, "data center re-index job failed");
        }
    });
    Ok(HttpResponse::Accepted().json(ReindexAccepted { data_center_id, status: "accepted" }))
}

fn parse_stage(raw: &str) -> Result<EmbargoStage> {
    match raw {
        "PROGRAM_ONLY" => Ok(EmbargoStage::ProgramOnly),
        "MEMBER_ACCESS" => Ok(EmbargoStage::MemberAccess),
        "ASSOCIATE_ACCESS" => Ok(EmbargoStage::AssociateAccess),
        "PUBLIC" => Ok(EmbargoStage::Public),
        "UNRELEASED" => Ok(EmbargoStage::Unreleased),
        other => Err(Error::invalid_argument(format!("unknown embargo stage {other:?}"))),
    }
}
