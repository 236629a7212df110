use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    http::{error::ApiError, CREATION_KEY_HEADER},
    session::{SessionError, SessionPayload, SessionRecord, SessionValidity},
    session_manager::SessionManager,
    session_store::{SessionToken, Store},
};

type Manager<S> = State<Arc<SessionManager<S>>>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

pub async fn echo() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: env!("CARGO_PKG_DESCRIPTION").to_string(),
    })
}

/// POST /v1, authenticated by the creation key header.
pub async fn create<S: Store>(
    State(manager): Manager<S>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionRecord>, ApiError> {
    let creation_key = headers
        .get(CREATION_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    // Unauthenticated callers learn nothing about body parsing.
    manager.authorize(creation_key)?;
    let payload = parse_payload(&body)?;
    let record = manager.create(creation_key, payload).await?;
    Ok(Json(record))
}

pub async fn get<S: Store>(
    State(manager): Manager<S>,
    Path(token): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    let record = manager.get(&SessionToken::from(token)).await?;
    Ok(Json(record))
}

pub async fn validate<S: Store>(
    State(manager): Manager<S>,
    Path(token): Path<String>,
) -> Result<Json<SessionValidity>, ApiError> {
    let validity = manager.validate(&SessionToken::from(token)).await?;
    Ok(Json(validity))
}

pub async fn update<S: Store>(
    State(manager): Manager<S>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Json<SessionRecord>, ApiError> {
    let token = SessionToken::from(token);
    let payload = parse_payload(&body)?;
    let record = manager.update(&token, payload).await?;
    Ok(Json(record))
}

pub async fn patch<S: Store>(
    State(manager): Manager<S>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Json<SessionRecord>, ApiError> {
    let token = SessionToken::from(token);
    let payload = parse_payload(&body)?;
    let record = manager.patch(&token, payload).await?;
    Ok(Json(record))
}

pub async fn delete<S: Store>(
    State(manager): Manager<S>,
    Path(token): Path<String>,
) -> Result<(StatusCode, Json<DeleteResponse>), ApiError> {
    match manager.delete(&SessionToken::from(token)).await {
        Ok(()) => Ok((StatusCode::OK, Json(DeleteResponse { deleted: true }))),
        Err(SessionError::NotFound(_)) => {
            Ok((StatusCode::NOT_FOUND, Json(DeleteResponse { deleted: false })))
        }
        Err(e) => Err(e.into()),
    }
}

/// An empty body counts as `{}`; anything but a JSON object is refused.
fn parse_payload(body: &[u8]) -> Result<SessionPayload, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SessionPayload::default());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;
    match value {
        Value::Object(fields) => Ok(SessionPayload::from(fields)),
        _ => Err(ApiError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
    }
}
