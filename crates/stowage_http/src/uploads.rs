use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use stowage_core::{CompletedPart, StorageService};

use super::empty_string_as_none;
use super::errors::Result;

pub fn router() -> Router<StorageService> {
    Router::new()
        .route("/uploads", post(initiate))
        .route("/uploads/:upload_id", delete(abort))
        .route("/uploads/:upload_id/parts/:part_number", get(authorize_part))
        .route("/uploads/:upload_id/complete", post(complete))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateRequest {
    file_name: Option<String>,
    file_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateResponse {
    upload_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileNameParams {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    file_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PartTargetResponse {
    url: String,
    /// Seconds the url stays usable.
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest {
    file_name: Option<String>,
    parts: Option<Vec<CompletedPart>>,
}

#[derive(Debug, Serialize)]
struct CompleteResponse {
    location: String,
}

#[derive(Debug, Serialize)]
struct AbortResponse {
    aborted: bool,
}

// POST /uploads
async fn initiate(
    State(service): State<StorageService>,
    body: std::result::Result<Json<InitiateRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body?;
    let session = service
        .initiate(request.file_name.as_deref(), request.file_type.as_deref())
        .await?;
    let response = InitiateResponse {
        upload_id: session.to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

// GET /uploads/<upload_id>/parts/<part_number>?fileName=<key>
async fn authorize_part(
    State(service): State<StorageService>,
    Path(path_params): Path<HashMap<String, String>>,
    Query(params): Query<FileNameParams>,
) -> Result<Response> {
    let target = service
        .authorize_part(
            params.file_name.as_deref(),
            path_params.get("upload_id").map(String::as_str),
            path_params.get("part_number").map(String::as_str),
        )
        .await?;
    let response = PartTargetResponse {
        url: target.url,
        expires_in: target.expires_in.as_secs(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

// POST /uploads/<upload_id>/complete
async fn complete(
    State(service): State<StorageService>,
    Path(path_params): Path<HashMap<String, String>>,
    body: std::result::Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body?;
    let location = service
        .complete(
            request.file_name.as_deref(),
            path_params.get("upload_id").map(String::as_str),
            request.parts.as_deref(),
        )
        .await?;
    let response = CompleteResponse {
        location: location.to_string(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

// DELETE /uploads/<upload_id>?fileName=<key>
async fn abort(
    State(service): State<StorageService>,
    Path(path_params): Path<HashMap<String, String>>,
    Query(params): Query<FileNameParams>,
) -> Result<Response> {
    service
        .abort(
            params.file_name.as_deref(),
            path_params.get("upload_id").map(String::as_str),
        )
        .await?;
    Ok((StatusCode::OK, Json(AbortResponse { aborted: true })).into_response())
}
