//! Result envelope returned by the persistence engine and operation handlers.

use crate::error::{ErrorBody, ErrorDetail};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Success/failure discriminator, status code, optional payload and message.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResult {
    pub success: bool,
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn serialize_status<S: Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

impl ApiResult {
    fn success(status: StatusCode, data: Option<Value>) -> Self {
        ApiResult {
            success: true,
            status,
            data,
            message: None,
        }
    }

    fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        ApiResult {
            success: false,
            status,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn ok(data: Value) -> Self {
        Self::success(StatusCode::OK, Some(data))
    }

    pub fn created(data: Value) -> Self {
        Self::success(StatusCode::CREATED, Some(data))
    }

    /// Success without a body.
    pub fn no_content() -> Self {
        Self::success(StatusCode::NO_CONTENT, None)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::failure(StatusCode::NOT_FOUND, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::failure(StatusCode::BAD_REQUEST, message)
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

#[derive(Serialize)]
pub struct SuccessMany {
    pub data: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaCount>,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

/// List payload; `count` is only present when `$count` was requested and allowed.
pub fn success_many(data: Vec<Value>, count: Option<u64>) -> ApiResult {
    let body = SuccessMany {
        data,
        meta: count.map(|count| MetaCount { count }),
    };
    ApiResult::ok(serde_json::to_value(body).unwrap_or(Value::Null))
}

fn failure_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::CONFLICT => "conflict",
        s if s.is_server_error() => "internal_error",
        _ => "failed",
    }
}

impl IntoResponse for ApiResult {
    fn into_response(self) -> Response {
        if self.success {
            return match self.data {
                Some(data) => (self.status, Json(data)).into_response(),
                None => self.status.into_response(),
            };
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: failure_code(self.status).to_string(),
                message: self.message.unwrap_or_default(),
            },
        };
        (self.status, Json(body)).into_response()
    }
}
