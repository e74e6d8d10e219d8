//! JSON body extractors that reject with [`ServerError`].
//!
//! Devices do not always send a `Content-Type`, so bodies are parsed from
//! the raw bytes. Any decode failure is a 400 `{"error": ...}`.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::ServerError;

/// A required JSON body.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

/// A JSON body that may be absent. Only an empty body maps to `None`; a
/// body that is present but malformed is still rejected.
#[derive(Debug)]
pub struct OptionalJsonBody<T>(pub Option<T>);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match read_json(req, state).await? {
            Some(value) => Ok(JsonBody(value)),
            None => Err(ServerError::BadRequest("Request body is required".into())),
        }
    }
}

#[async_trait]
impl<S, T> FromRequest<S> for OptionalJsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalJsonBody(read_json(req, state).await?))
    }
}

async fn read_json<S, T>(req: Request, state: &S) -> Result<Option<T>, ServerError>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    let bytes = Bytes::from_request(req, state)
        .await
        .map_err(|e| ServerError::BadRequest(e.body_text()))?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ServerError::BadRequest(format!("Invalid JSON body: {e}")))
}
