//! HTTP error mapping for the master API
//!
//! Every failure leaves the API as a JSON body of the form
//! `{"error": {"code": "...", "message": "..."}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{
    AdmissionError, DispatchError, ScoreboardError, SlaveError, SubmitError,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Scoreboard(#[from] ScoreboardError),

    #[error(transparent)]
    Slave(#[from] SlaveError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Admission(e) => Self::Admission(e),
            SubmitError::Dispatch(e) => Self::Dispatch(e),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Admission(e) => match e {
                AdmissionError::UnknownProblem(_) => "PROBLEM_NOT_FOUND",
                AdmissionError::UnknownLanguage(_) => "LANGUAGE_NOT_FOUND",
                AdmissionError::LanguageDisabled(_) => "LANGUAGE_DISABLED",
                AdmissionError::AccessDenied(_) => "ACCESS_DENIED",
                AdmissionError::MaxAttemptsReached => "MAX_ATTEMPTS_REACHED",
                AdmissionError::Internal(_) => "INTERNAL_ERROR",
            },
            Self::Dispatch(e) => match e {
                DispatchError::Slave(e) => slave_code(e),
                DispatchError::Connect { .. } => "SLAVE_UNREACHABLE",
                DispatchError::QueueClosed => "QUEUE_CLOSED",
                DispatchError::Storage(_) => "INTERNAL_ERROR",
            },
            Self::Scoreboard(e) => match e {
                ScoreboardError::UnknownContest(_) => "CONTEST_NOT_FOUND",
                ScoreboardError::PublicNotAllowed => "PUBLIC_SCOREBOARD_DISABLED",
                ScoreboardError::Storage(_) => "INTERNAL_ERROR",
            },
            Self::Slave(e) => slave_code(e),
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Admission(e) => match e {
                AdmissionError::UnknownProblem(_) | AdmissionError::UnknownLanguage(_) => {
                    StatusCode::NOT_FOUND
                }
                AdmissionError::LanguageDisabled(_) => StatusCode::BAD_REQUEST,
                AdmissionError::AccessDenied(_) => StatusCode::FORBIDDEN,
                AdmissionError::MaxAttemptsReached => StatusCode::TOO_MANY_REQUESTS,
                AdmissionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Dispatch(e) => match e {
                DispatchError::Slave(e) => slave_status(e),
                DispatchError::Connect { .. } => StatusCode::BAD_GATEWAY,
                DispatchError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
                DispatchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Scoreboard(e) => match e {
                ScoreboardError::UnknownContest(_) => StatusCode::NOT_FOUND,
                ScoreboardError::PublicNotAllowed => StatusCode::FORBIDDEN,
                ScoreboardError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Slave(e) => slave_status(e),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn slave_code(err: &SlaveError) -> &'static str {
    match err {
        SlaveError::NoAvailableSlave => "NO_AVAILABLE_SLAVE",
        SlaveError::Storage(_) => "INTERNAL_ERROR",
    }
}

fn slave_status(err: &SlaveError) -> StatusCode {
    match err {
        SlaveError::NoAvailableSlave => StatusCode::SERVICE_UNAVAILABLE,
        SlaveError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log server-side failures but don't expose details to clients
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!("Request failed: {:#}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code: self.error_code().to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
