use actix_web::{get, post, web, HttpResponse};
use file_types::{Error, Result};
use serde::Deserialize;

use crate::state::AppState;

#[get("/release")]
pub async fn list_releases(state: web::Data<AppState>) -> Result<HttpResponse> {
    let releases = state.release_store.get_releases()?;
    Ok(HttpResponse::Ok().json(releases))
}

#[get("/release/active")]
pub async fn active_release(state: web::Data<AppState>) -> Result<HttpResponse> {
    let release = state.release_store.get_active_release()?;
    Ok(HttpResponse::Ok().json(release))
}

#[get("/release/latest")]
pub async fn latest_release(state: web::Data<AppState>) -> Result<HttpResponse> {
    let release = state.release_store.get_latest_release()?;
    Ok(HttpResponse::Ok().json(release))
}

#[get("/release/{id}")]
pub async fn release_by_id(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let release = state
        .release_store
        .get_release_by_id(&path.into_inner())?
        .ok_or_else(|| Error::not_found("no release with that id"))?;
    Ok(HttpResponse::Ok().json(release))
}

#[post("/release/calculate")]
pub async fn calculate(state: web::Data<AppState>) -> Result<HttpResponse> {
    let release = state.release_orchestrator.calculate().await?;
    Ok(HttpResponse::Ok().json(release))
}

#[derive(Debug, Deserialize)]
pub struct BuildPath {
    version: String,
    label: String,
}

#[post("/release/build/{version}/{label}")]
pub async fn build(state: web::Data<AppState>, path: web::Path<BuildPath>) -> Result<HttpResponse> {
    let path = path.into_inner();
    let release = state.release_orchestrator.build(&path.version, &path.label).await?;
    Ok(HttpResponse::Ok().json(release))
}

#[post("/release/publish/{version}")]
pub async fn publish(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let release = state.release_orchestrator.publish(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(release))
}
