//! Request-level error taxonomy.
//!
//! Every failure a caller can observe is one of these variants. Backend
//! failures always surface as [`ProxyError::BadGateway`]; the upstream cause is
//! kept as the error source so it reaches the logs but never the response body.
use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub const DETAIL_NOT_FOUND: &str = "Dataset not found.";
pub const DETAIL_FORBIDDEN: &str = "Required scopes not given.";
pub const DETAIL_UNAUTHORIZED: &str = "Invalid token.";
pub const DETAIL_BAD_GATEWAY: &str = "Connection failed (bad gateway)";

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type ProxyResult<T> = Result<T, ProxyError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    /// Unknown dataset identifier
    #[error("Dataset '{0}' not found")]
    NotFound(String),

    /// Caller lacks one of the dataset's scopes
    #[error("Missing scopes for dataset '{dataset}'")]
    Forbidden { dataset: String },

    /// Caller token could not be verified
    #[error("Invalid caller token: {0}")]
    Unauthorized(String),

    /// The proxy's own input validation rejected the request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Backend transport failure or unexpected backend answer
    #[error("Bad gateway: {detail}")]
    BadGateway {
        detail: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Bad gateway without an underlying cause.
    pub fn bad_gateway(detail: impl Into<String>) -> Self {
        ProxyError::BadGateway {
            detail: detail.into(),
            source: None,
        }
    }

    /// Bad gateway chained to the error that caused it.
    pub fn bad_gateway_from(
        detail: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        ProxyError::BadGateway {
            detail: detail.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ProxyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the `detail` field of the error envelope.
    pub fn detail(&self) -> String {
        match self {
            ProxyError::NotFound(_) => DETAIL_NOT_FOUND.to_string(),
            ProxyError::Forbidden { .. } => DETAIL_FORBIDDEN.to_string(),
            ProxyError::Unauthorized(_) => DETAIL_UNAUTHORIZED.to_string(),
            ProxyError::BadRequest(message) => message.clone(),
            ProxyError::BadGateway { detail, .. } => detail.clone(),
            ProxyError::Internal(_) => "Internal server error.".to_string(),
        }
    }

    fn log(&self) {
        let status = self.status_code().as_u16();
        let cause = StdError::source(self)
            .map(|source| source.to_string())
            .unwrap_or_default();

        if self.status_code().is_server_error() {
            tracing::error!(error = %self, status, cause = %cause, "Proxy request failed");
        } else {
            tracing::debug!(error = %self, status, "Proxy request rejected");
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}
