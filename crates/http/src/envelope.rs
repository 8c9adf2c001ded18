//! The `{success, data}` / `{success: false, error}` response envelope
//! (spec §4.7) and the `FsError` → HTTP status mapping (spec §6).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fsx_core::{ErrorCode, FsError};
use serde::Serialize;
use serde_json::json;

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::EINVAL | ErrorCode::ENOTDIR | ErrorCode::EISDIR => StatusCode::BAD_REQUEST,
        ErrorCode::EAUTH => StatusCode::UNAUTHORIZED,
        ErrorCode::EACCES | ErrorCode::EPERM => StatusCode::FORBIDDEN,
        ErrorCode::ENOENT => StatusCode::NOT_FOUND,
        ErrorCode::EEXIST | ErrorCode::ENOTEMPTY => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A successful response: `{success: true, data: T}`.
pub struct Success<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        Json(json!({ "success": true, "data": self.0 })).into_response()
    }
}

/// Wraps an [`FsError`] into the failure envelope with the right HTTP status.
pub struct Failure(pub FsError);

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code);
        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.0.code.as_str(),
                "message": self.0.message,
                "path": self.0.path,
                "syscall": self.0.syscall,
            }
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<Success<T>, Failure>;

impl From<FsError> for Failure {
    fn from(e: FsError) -> Self {
        Failure(e)
    }
}
