/**
 * API ERROR - Traduction des erreurs du cœur en réponses HTTP
 *
 * RÔLE : Point unique de correspondance erreur typée → code HTTP + corps JSON.
 * validation → 400, introuvable → 404, conflit → 409, amont injoignable → 502,
 * le reste → 500. Corps : `{"error": "..."}`.
 */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use edgepick_core::error::{AnalysisError, ArchiveError, InventoryError, ProbeError, SelectionError, StoreError};
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::AlreadyExists { .. } => StatusCode::CONFLICT,
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Unavailable(_) => StatusCode::BAD_GATEWAY,
        StoreError::Serialization(_) | StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn inventory_status(e: &InventoryError) -> StatusCode {
    match e {
        InventoryError::NotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::AlreadyExists(_) => StatusCode::CONFLICT,
        InventoryError::Invalid(_) => StatusCode::BAD_REQUEST,
        InventoryError::Unavailable(_) => StatusCode::BAD_GATEWAY,
        InventoryError::Serialization(_) | InventoryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn analysis_status(e: &AnalysisError) -> StatusCode {
    match e {
        AnalysisError::InvalidWindow(_) => StatusCode::BAD_REQUEST,
        AnalysisError::Store(e) => store_status(e),
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Probe(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(e) => store_status(e),
            ApiError::Inventory(e) => inventory_status(e),
            ApiError::Analysis(e) => analysis_status(e),
            ApiError::Archive(ArchiveError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Archive(ArchiveError::Store(e)) => store_status(e),
            ApiError::Selection(e) => match e {
                SelectionError::Validation(_) => StatusCode::BAD_REQUEST,
                // la sélection ne lit l'inventaire que comme dépendance amont
                SelectionError::Inventory(_) => StatusCode::BAD_GATEWAY,
                SelectionError::Analysis(AnalysisError::InvalidWindow(_)) => StatusCode::BAD_REQUEST,
                SelectionError::Analysis(AnalysisError::Store(_)) => StatusCode::BAD_GATEWAY,
                SelectionError::Persist(StoreError::AlreadyExists { .. }) => StatusCode::CONFLICT,
                SelectionError::Persist(_) => StatusCode::BAD_GATEWAY,
                SelectionError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, "request failed");
        } else {
            warn!(%status, error = %self, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
