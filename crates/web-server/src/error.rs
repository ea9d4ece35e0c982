use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use core_types::CoreError;
use orchestrator::{AllocError, PairError, ServiceError, StartError, StopError, StoreError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
    #[error("Invalid slot: {0}")]
    InvalidSlot(#[from] CoreError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidSlot(_) => StatusCode::BAD_REQUEST,
            AppError::Service(err) => match err {
                ServiceError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
                ServiceError::Store(StoreError::MissingSecret { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
                ServiceError::Credentials(_) | ServiceError::Pair(PairError::EmptyPair) => StatusCode::BAD_REQUEST,
                ServiceError::Allocation(AllocError::NoCapacity(_))
                | ServiceError::Start(StartError::InvalidState { .. })
                | ServiceError::Stop(StopError::StillStarting { .. }) => StatusCode::CONFLICT,
                ServiceError::Allocation(_)
                | ServiceError::Start(_)
                | ServiceError::Stop(_)
                | ServiceError::Pair(_)
                | ServiceError::Command(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

/// Converts our custom `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::Service(err) => {
                if status.is_server_error() {
                    tracing::error!(error = %err, "Service error.");
                }
                err.user_message().to_string()
            }
            AppError::InvalidSlot(err) => err.to_string(),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator::NoCapacityError;

    #[test]
    fn maps_errors_to_status_codes() {
        let cases = [
            (AppError::from(CoreError::SlotOutOfRange(31)), StatusCode::BAD_REQUEST),
            (ServiceError::from(StoreError::NotFound("bob".into())).into(), StatusCode::NOT_FOUND),
            (ServiceError::from(AllocError::from(NoCapacityError(30))).into(), StatusCode::CONFLICT),
            (ServiceError::from(PairError::EmptyPair).into(), StatusCode::BAD_REQUEST),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
