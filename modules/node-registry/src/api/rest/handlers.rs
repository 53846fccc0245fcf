use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Multipart, Path};
use axum::http::StatusCode;
use axum::response::Redirect;

use super::dto::{
    CommandResponse, ConfigRequest, DeleteFileResponse, DeleteNodeResponse, FileDto, NodeDto,
    NodeLogsDto, OtaRequest, RenameFileRequest,
};
use super::problem::{ApiResult, Problem};
use crate::domain::service::{ConfigCommand, Service};

fn invalid_body(rejection: &JsonRejection) -> Problem {
    Problem::new(StatusCode::BAD_REQUEST, "Invalid body", rejection.body_text())
        .with_code("INVALID_BODY")
}

/// Deduplicated node snapshot
#[utoipa::path(
    get,
    path = "/api/nodes",
    tag = "nodes",
    responses(
        (status = 200, description = "Nodes keyed by logical id", body = BTreeMap<String, NodeDto>)
    )
)]
pub async fn list_nodes(
    Extension(svc): Extension<Arc<Service>>,
) -> Json<BTreeMap<String, NodeDto>> {
    let nodes = svc
        .snapshot()
        .into_iter()
        .map(|(id, view)| (id, view.into()))
        .collect();
    Json(nodes)
}

/// Delete a node by logical id, or every node of a device by MAC
#[utoipa::path(
    delete,
    path = "/api/nodes/{id}",
    tag = "nodes",
    params(("id" = String, Path, description = "Logical node id or 12-hex-digit MAC")),
    responses(
        (status = 200, description = "Nodes deleted", body = DeleteNodeResponse),
        (status = 404, description = "Nothing matched", body = Problem)
    )
)]
pub async fn delete_node(
    Extension(svc): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteNodeResponse>> {
    let deleted = svc.delete_node(&id).await?;
    Ok(Json(deleted.into()))
}

/// Last log lines of a node
#[utoipa::path(
    get,
    path = "/logs/{id}",
    tag = "nodes",
    params(("id" = String, Path, description = "Logical node id")),
    responses(
        (status = 200, description = "Log lines, oldest first", body = NodeLogsDto),
        (status = 404, description = "Unknown node", body = Problem)
    )
)]
pub async fn get_logs(
    Extension(svc): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> ApiResult<Json<NodeLogsDto>> {
    let logs = svc.logs(&id)?;
    Ok(Json(NodeLogsDto { node: id, logs }))
}

/// Store configuration tags and send thresholds to a node
#[utoipa::path(
    post,
    path = "/config",
    tag = "commands",
    request_body = ConfigRequest,
    responses(
        (status = 200, description = "Command published", body = CommandResponse),
        (status = 502, description = "Bus unavailable", body = Problem)
    )
)]
pub async fn set_config(
    Extension(svc): Extension<Arc<Service>>,
    payload: Result<Json<ConfigRequest>, JsonRejection>,
) -> ApiResult<Json<CommandResponse>> {
    let Json(req) = payload.map_err(|e| invalid_body(&e))?;
    let topic = svc.set_config(&ConfigCommand::from(req)).await?;
    Ok(Json(CommandResponse {
        status: "ok".to_owned(),
        topic,
    }))
}

/// Ask a node to install firmware from a URL
#[utoipa::path(
    post,
    path = "/ota",
    tag = "commands",
    request_body = OtaRequest,
    responses(
        (status = 200, description = "Command published", body = CommandResponse),
        (status = 400, description = "Invalid request", body = Problem),
        (status = 502, description = "Bus unavailable", body = Problem)
    )
)]
pub async fn trigger_ota(
    Extension(svc): Extension<Arc<Service>>,
    payload: Result<Json<OtaRequest>, JsonRejection>,
) -> ApiResult<Json<CommandResponse>> {
    let Json(req) = payload.map_err(|e| invalid_body(&e))?;
    let topic = svc.trigger_ota(&req.node, &req.url).await?;
    Ok(Json(CommandResponse {
        status: "OTA triggered".to_owned(),
        topic,
    }))
}

/// List uploaded firmware files
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    responses((status = 200, description = "Uploaded files", body = Vec<FileDto>))
)]
pub async fn list_files(Extension(svc): Extension<Arc<Service>>) -> Json<Vec<FileDto>> {
    let files = svc.list_files().await;
    Json(files.into_iter().map(Into::into).collect())
}

/// Delete an uploaded file
#[utoipa::path(
    delete,
    path = "/api/files/{name}",
    tag = "files",
    params(("name" = String, Path, description = "File name")),
    responses(
        (status = 200, description = "File deleted", body = DeleteFileResponse),
        (status = 404, description = "Unknown file", body = Problem)
    )
)]
pub async fn delete_file(
    Extension(svc): Extension<Arc<Service>>,
    Path(name): Path<String>,
) -> ApiResult<Json<DeleteFileResponse>> {
    let name = svc.delete_file(&name).await?;
    Ok(Json(DeleteFileResponse {
        status: "deleted".to_owned(),
        name,
    }))
}

/// Rename an uploaded file
#[utoipa::path(
    post,
    path = "/api/files/{name}/rename",
    tag = "files",
    params(("name" = String, Path, description = "Current file name")),
    request_body = RenameFileRequest,
    responses(
        (status = 200, description = "File renamed", body = FileDto),
        (status = 400, description = "Invalid new name", body = Problem),
        (status = 404, description = "Unknown file", body = Problem)
    )
)]
pub async fn rename_file(
    Extension(svc): Extension<Arc<Service>>,
    Path(name): Path<String>,
    payload: Result<Json<RenameFileRequest>, JsonRejection>,
) -> ApiResult<Json<FileDto>> {
    let Json(req) = payload.map_err(|e| invalid_body(&e))?;
    let file = svc.rename_file(&name, &req.new_name).await?;
    Ok(Json(file.into()))
}

/// Upload a firmware image from the `file` field of a multipart form
pub async fn upload_file(
    Extension(svc): Extension<Arc<Service>>,
    mut multipart: Multipart,
) -> ApiResult<Redirect> {
    let bad_form = |detail: String| {
        Problem::new(StatusCode::BAD_REQUEST, "Invalid upload", detail).with_code("INVALID_UPLOAD")
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_form(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let Some(file_name) = field.file_name().map(ToOwned::to_owned) else {
            return Err(bad_form("file field has no file name".to_owned()));
        };
        let data = field.bytes().await.map_err(|e| bad_form(e.body_text()))?;
        svc.upload_file(&file_name, data).await?;
        return Ok(Redirect::to("/"));
    }
    Err(bad_form("file required".to_owned()))
}
