use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{self as aweb, HttpResponseBuilder};
use serde::{Deserialize, Serialize};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The kinds of failure the core can produce, independent of transport.
///
/// Mirrors the propagation policy in the specification: the calculator never
/// fails, the store maps malformed input / missing rows / CAS races onto the
/// first three variants, and everything downstream of an upstream call folds
/// into [`Code::Upstream`] or [`Code::Transient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    InvalidArgument,
    NotFound,
    StateConflict,
    Unauthorized,
    Forbidden,
    Upstream,
    Transient,
    Fatal,
}

impl Code {
    pub fn http(&self) -> StatusCode {
        match self {
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::StateConflict => StatusCode::CONFLICT,
            Code::Unauthorized => StatusCode::UNAUTHORIZED,
            Code::Forbidden => StatusCode::FORBIDDEN,
            Code::Upstream => StatusCode::BAD_GATEWAY,
            Code::Transient => StatusCode::SERVICE_UNAVAILABLE,
            Code::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Code::InvalidArgument => "invalid_argument",
            Code::NotFound => "not_found",
            Code::StateConflict => "state_conflict",
            Code::Unauthorized => "unauthorized",
            Code::Forbidden => "forbidden",
            Code::Upstream => "upstream_error",
            Code::Transient => "transient_error",
            Code::Fatal => "internal_error",
        }
    }

    /// Whether a caller may reasonably retry the operation that produced
    /// an error of this kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Code::Transient | Code::Upstream)
    }
}

#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct Error {
    pub code: Code,
    pub message: String,
}

impl Error {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(Code::StateConflict, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(Code::Upstream, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(Code::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Code::Fatal, message)
    }
}

/// Wire shape for every error response emitted by the HTTP surface:
/// `{error, message}` as required by §7.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        ErrorBody { error: err.code.name().to_string(), message: err.message.clone() }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl aweb::error::ResponseError for Error {
    fn error_response(&self) -> aweb::HttpResponse {
        let body = ErrorBody::from(self);
        HttpResponseBuilder::new(self.status_code()).json(body)
    }

    fn status_code(&self) -> StatusCode {
        self.code.http()
    }
}
