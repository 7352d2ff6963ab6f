use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Request-time failures. The `Display` text is for logs only; clients see
/// [`ErrorKind::public_message`].
#[derive(Error, Debug)]
pub enum AppError {
    #[error("malformed form body: {0}")]
    MalformedForm(String),

    #[error("database error: {0:#}")]
    Database(anyhow::Error),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("unknown authentication strategy `{0}`")]
    UnknownStrategy(String),

    #[error("user has no id and cannot be stored in the session")]
    UnsavedUser,

    #[error("{0} is not installed in the middleware chain")]
    MissingLayer(&'static str),

    #[error("handler panicked: {0}")]
    Panic(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Database,
    Session,
    Template,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "The submitted form could not be read.",
            ErrorKind::Database => "The database is unavailable right now.",
            ErrorKind::Session => "Your session could not be loaded.",
            ErrorKind::Template => "The page could not be rendered.",
            ErrorKind::Internal => "Something went wrong on our side.",
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::MalformedForm(_) => ErrorKind::BadRequest,
            AppError::Database(_) => ErrorKind::Database,
            AppError::Session(_) => ErrorKind::Session,
            AppError::Template(_) => ErrorKind::Template,
            AppError::PasswordHash(_)
            | AppError::UnknownStrategy(_)
            | AppError::UnsavedUser
            | AppError::MissingLayer(_)
            | AppError::Panic(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorReport(pub ErrorKind);

/// What the `error` view receives as its `error` variable.
#[derive(Debug, Clone, Serialize)]
pub struct PublicError {
    pub status: u16,
    pub kind: ErrorKind,
    pub message: &'static str,
}

impl From<ErrorKind> for PublicError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            status: kind.status().as_u16(),
            kind,
            message: kind.public_message(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        error!(error = %self, kind = ?kind, "request failed");
        let mut res = (kind.status(), kind.public_message()).into_response();
        res.extensions_mut().insert(ErrorReport(kind));
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_hides_internal_detail() {
        let err = AppError::Database(anyhow::anyhow!("connection refused by 10.0.0.7:27017"));
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = res.extensions().get::<ErrorReport>().copied().unwrap();
        assert_eq!(report.0, ErrorKind::Database);
    }

    #[test]
    fn malformed_form_is_a_client_error() {
        let res = AppError::MalformedForm("bad".into()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn public_error_carries_kind_status_and_message() {
        let public = PublicError::from(ErrorKind::Session);
        assert_eq!(public.status, 500);
        let json = serde_json::to_value(&public).unwrap();
        assert_eq!(json["kind"], "session");
    }
}
