use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use super::dto::{
    CommandResponse, ConfigRequest, DeleteFileResponse, DeleteNodeResponse, FileDto, NodeDto,
    NodeLogsDto, OtaRequest, RenameFileRequest,
};
use super::handlers;
use super::problem::Problem;
use crate::domain::service::Service;

/// Largest accepted firmware upload.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    info(title = "Fleet dashboard API"),
    paths(
        handlers::list_nodes,
        handlers::delete_node,
        handlers::get_logs,
        handlers::set_config,
        handlers::trigger_ota,
        handlers::list_files,
        handlers::delete_file,
        handlers::rename_file,
    ),
    components(schemas(
        NodeDto,
        NodeLogsDto,
        DeleteNodeResponse,
        ConfigRequest,
        OtaRequest,
        CommandResponse,
        FileDto,
        RenameFileRequest,
        DeleteFileResponse,
        Problem,
    )),
    tags(
        (name = "nodes", description = "Registry of fleet nodes"),
        (name = "commands", description = "Commands published to nodes"),
        (name = "files", description = "Firmware images for OTA updates")
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the HTTP router for the dashboard API
#[must_use]
pub fn router(service: Arc<Service>) -> Router {
    let files_dir = service.files().dir().to_path_buf();

    Router::new()
        .route("/api/nodes", get(handlers::list_nodes))
        .route("/api/nodes/{id}", delete(handlers::delete_node))
        .route("/logs/{id}", get(handlers::get_logs))
        // the dashboard page posts to /set-threshold, older clients to /config
        .route("/config", post(handlers::set_config))
        .route("/set-threshold", post(handlers::set_config))
        .route("/ota", post(handlers::trigger_ota))
        .route("/api/files", get(handlers::list_files))
        .route("/api/files/{name}", delete(handlers::delete_file))
        .route("/api/files/{name}/rename", post(handlers::rename_file))
        .route(
            "/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/openapi.json", get(openapi_json))
        .nest_service("/files", ServeDir::new(files_dir))
        .layer(Extension(service))
        .layer(TraceLayer::new_for_http())
}
