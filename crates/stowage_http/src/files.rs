use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use stowage_core::StorageService;

use super::empty_string_as_none;
use super::errors::Result;

pub fn router() -> Router<StorageService> {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/:key/download-url", get(download_url))
        .route("/files/:key/download-info", get(download_info))
        .route("/folders", post(create_folder))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    prefix: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    flat: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateFolderRequest {
    key: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateFolderResponse {
    success: bool,
    key: String,
}

#[derive(Debug, Serialize)]
struct UrlResponse {
    url: String,
}

fn key_param(path_params: &HashMap<String, String>) -> &str {
    path_params.get("key").map(String::as_str).unwrap_or_default()
}

// GET /files?prefix=<prefix>[&flat=true]
async fn list_files(
    State(service): State<StorageService>,
    Query(params): Query<ListParams>,
) -> Result<Response> {
    let prefix = params.prefix.unwrap_or_default();
    let flat = params
        .flat
        .map(|f| f.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if flat {
        let listing = service.list_flat(&prefix).await?;
        Ok((StatusCode::OK, Json(listing)).into_response())
    } else {
        let listing = service.list(&prefix).await?;
        Ok((StatusCode::OK, Json(listing)).into_response())
    }
}

// POST /folders
async fn create_folder(
    State(service): State<StorageService>,
    body: std::result::Result<Json<CreateFolderRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body?;
    let key = service.create_folder(request.key.as_deref()).await?;
    tracing::info!(key, "created folder");
    let response = CreateFolderResponse { success: true, key };
    Ok((StatusCode::OK, Json(response)).into_response())
}

// GET /files/<key>/download-url
async fn download_url(
    State(service): State<StorageService>,
    Path(path_params): Path<HashMap<String, String>>,
) -> Result<Response> {
    let url = service.download_url(key_param(&path_params)).await?;
    Ok((StatusCode::OK, Json(UrlResponse { url })).into_response())
}

// GET /files/<key>/download-info
async fn download_info(
    State(service): State<StorageService>,
    Path(path_params): Path<HashMap<String, String>>,
) -> Result<Response> {
    let info = service.resolve_download(key_param(&path_params)).await?;
    Ok((StatusCode::OK, Json(info)).into_response())
}
