//! Errors returned by the ingest/query façade and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::store::{RejectedRecord, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("malformed request body: {0}")]
    MalformedInput(String),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{} measure value(s) rejected by the store", .0.len())]
    RejectedRecords(Vec<RejectedRecord>),

    #[error("store fault: {0}")]
    StoreFault(String),

    #[error("unknown sensor: {0}")]
    UnknownSensor(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Rejected(details) => ApiError::RejectedRecords(details),
            other => ApiError::StoreFault(other.to_string()),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MalformedInput(_)
            | ApiError::Validation(_)
            | ApiError::RejectedRecords(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownSensor(_) => StatusCode::NOT_FOUND,
            ApiError::StoreFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status_code();
        let body = match &self {
            ApiError::MalformedInput(msg) => {
                warn!("Rejecting malformed body: {}", msg);
                json!({ "errors": [format!("Malformed request body: {msg}")] })
            }
            ApiError::Validation(errors) => {
                warn!("Rejecting invalid reading: {:?}", errors);
                json!({ "errors": errors })
            }
            ApiError::RejectedRecords(details) => {
                warn!("Store rejected {} measure value(s)", details.len());
                let details = serde_json::to_string(details).unwrap_or_default();
                json!(format!("Some records were rejected. Details: {details}"))
            }
            ApiError::StoreFault(msg) => {
                error!("Store fault: {}", msg);
                json!(format!("Error: {msg}"))
            }
            ApiError::UnknownSensor(name) => json!(format!("Unknown sensor: {name}")),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(err: ApiError) -> (StatusCode, Value) {
        // ---
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_errors_are_enumerated() {
        // ---
        let (status, body) = body_json(ApiError::Validation(vec![
            "Missing required field: value".into(),
            "Invalid status. Must be 'ok' or 'fail'".into(),
        ]))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_details_are_reported() {
        // ---
        let rejected = StoreError::Rejected(vec![RejectedRecord {
            record_index: 0,
            measure: "velocity".into(),
            reason: "value 'x' is not a valid DOUBLE".into(),
        }]);
        let (status, body) = body_json(rejected.into()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let text = body.as_str().unwrap();
        assert!(text.starts_with("Some records were rejected. Details: "));
        assert!(text.contains("velocity"));
    }

    #[tokio::test]
    async fn test_store_faults_are_server_errors() {
        // ---
        let (status, body) = body_json(StoreError::Fault("connection reset".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, Value::String("Error: store fault: connection reset".into()));

        let timeout = ApiError::from(StoreError::Timeout(std::time::Duration::from_secs(20)));
        assert_eq!(timeout.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_malformed_input_is_client_error() {
        // ---
        assert_eq!(
            ApiError::MalformedInput("eof".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UnknownSensor("boiler".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
