use crate::replicate::ApiError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub const MSG_QUOTA_EXCEEDED: &str = "Daily limit reached. Please come back tomorrow!";
pub const MSG_GENERATE_FAILED: &str = "Failed to generate image";
pub const MSG_PREDICTION_FAILED: &str = "Prediction failed";
pub const MSG_PREDICTION_TIMEOUT: &str = "Prediction timed out";
pub const MSG_EMPTY_OUTPUT: &str = "Prediction returned no output";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Daily limit reached. Please come back tomorrow!")]
    QuotaExceeded { retry_after_secs: u64 },

    /// Replicate 拒绝了请求（创建或轮询），状态码与响应体原样透传。
    #[error("Failed to generate image: 上游返回 {status}")]
    Upstream {
        status: u16,
        details: sonic_rs::Value,
    },

    #[error("Prediction failed: 任务状态 {status}")]
    PredictionFailed {
        status: String,
        details: sonic_rs::Value,
    },

    #[error("Prediction returned no output")]
    EmptyOutput,

    #[error("Prediction timed out: {id}")]
    Timeout { id: String },

    #[error("Failed to generate image: {0}")]
    Transport(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<sonic_rs::Value>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            AppError::PredictionFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::EmptyOutput => StatusCode::BAD_GATEWAY,
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 对外响应体：`{ error, details? }`。
    pub fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            AppError::BadRequest(msg) => (msg.clone(), None),
            AppError::QuotaExceeded { .. } => (MSG_QUOTA_EXCEEDED.to_string(), None),
            AppError::Upstream { details, .. } => {
                (MSG_GENERATE_FAILED.to_string(), Some(details.clone()))
            }
            AppError::PredictionFailed { details, .. } => {
                (MSG_PREDICTION_FAILED.to_string(), Some(details.clone()))
            }
            AppError::EmptyOutput => (MSG_EMPTY_OUTPUT.to_string(), None),
            AppError::Timeout { id } => (
                MSG_PREDICTION_TIMEOUT.to_string(),
                Some(sonic_rs::Value::from(id.as_str())),
            ),
            AppError::Transport(msg) => (
                MSG_GENERATE_FAILED.to_string(),
                Some(sonic_rs::Value::from(msg.as_str())),
            ),
        };
        ErrorBody { error, details }
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http { status, body } => AppError::Upstream {
                status,
                details: body,
            },
            other => AppError::Transport(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut resp = (status, Json(self.body())).into_response();
        if let AppError::QuotaExceeded { retry_after_secs } = self
            && let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            resp.headers_mut().insert(header::RETRY_AFTER, v);
        }
        resp
    }
}
