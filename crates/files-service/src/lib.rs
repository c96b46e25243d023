pub mod config;
pub mod reindex;
pub mod routes;
pub mod state;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{web, App};
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};

use crate::state::AppState;

/// Wires every route handler onto `state`, the same factory shape
/// `actix_web::HttpServer::new` expects so it can be reused verbatim by
/// integration tests.
pub fn create_app(
    state: Arc<AppState>,
) -> App<impl ServiceFactory<ServiceRequest, Config = (), Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error, InitError = ()>> {
    App::new()
        .wrap(Cors::permissive())
        .app_data(web::Data::from(state))
        .service(routes::files::list_files)
        .service(routes::files::get_file)
        .service(routes::files::create_file)
        .service(routes::files::add_labels)
        .service(routes::files::remove_labels)
        .service(routes::admin::promote)
        .service(routes::admin::demote)
        .service(routes::admin::set_clinical_exemption)
        .service(routes::admin::remove_clinical_exemption)
        .service(routes::admin::reindex_data_center)
        .service(routes::release::list_releases)
        .service(routes::release::active_release)
        .service(routes::release::latest_release)
        .service(routes::release::release_by_id)
        .service(routes::release::calculate)
        .service(routes::release::build)
        .service(routes::release::publish)
}
