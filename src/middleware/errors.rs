use std::any::Any;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use minijinja::context;
use tracing::error;

use crate::{
    error::{AppError, ErrorReport, PublicError},
    views::Views,
};

/// Renders error responses from further down the chain through the `error` view.
pub async fn render_errors(State(views): State<Views>, req: Request, next: Next) -> Response {
    let res = next.run(req).await;
    let Some(ErrorReport(kind)) = res.extensions().get::<ErrorReport>().copied() else {
        return res;
    };
    error!(kind = ?kind, status = %res.status(), "error caught by terminal handler");

    let status = res.status();
    match views.render("error", context! { error => PublicError::from(kind) }) {
        Ok(page) => (status, page).into_response(),
        Err(e) => {
            error!(error = %e, "error view failed to render");
            res
        }
    }
}

pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    AppError::Panic(detail).into_response()
}
