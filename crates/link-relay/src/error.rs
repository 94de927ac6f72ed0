use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::bitly::BitlyError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Missing Bitly API token")]
    MissingToken,

    #[error("missing `url` query parameter")]
    MissingUrl,

    #[error("Error: {0}")]
    Upstream(#[from] BitlyError),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingUrl => StatusCode::BAD_REQUEST,
            Self::MissingToken | Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            Self::Upstream(err) => error!(error = %err, "bitly request failed"),
            Self::MissingToken => error!("BITLY_API_TOKEN is not configured"),
            Self::MissingUrl => {}
        }
        (self.status(), self.to_string()).into_response()
    }
}
