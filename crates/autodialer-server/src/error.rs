use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("List not found: {0}")]
    ListNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("No connected devices")]
    NoConnectedDevices,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::DeviceNotFound(_)
            | ServerError::ListNotFound(_)
            | ServerError::MessageNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::NoConnectedDevices | ServerError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<autodialer_shared::ProtocolError> for ServerError {
    fn from(e: autodialer_shared::ProtocolError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServerError::DeviceNotFound("d1".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::NoConnectedDevices.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_detail_not_exposed() {
        let response = ServerError::Internal("db path /secret".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("/secret"));

        let body: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["error"], "Internal server error");
    }
}
