use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("relay unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "http")]
mod http {
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };

    use super::ApiError;

    impl ApiError {
        pub fn status(&self) -> StatusCode {
            match self {
                ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            }
        }
    }

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                tracing::warn!(error = %self, "api request failed");
            }
            let body = serde_json::json!({ "error": self.to_string() });
            (status, Json(body)).into_response()
        }
    }
}
