//! HTTP API surface

pub mod auth;
pub mod download;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::downloader::BatchError;
use crate::links::LinkError;
use crate::provider::ProviderError;

/// API-level failures, mapped to a status code and a JSON error body.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Link(_) => StatusCode::BAD_REQUEST,
            ApiError::Batch(BatchError::Empty | BatchError::Duplicate(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Batch(BatchError::AlreadyDownloading(_)) => StatusCode::CONFLICT,
            ApiError::Batch(BatchError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Provider(ProviderError::NotRegistered(_)) => StatusCode::NOT_FOUND,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
