use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use tower::ServiceExt;
use tower_http::services::ServeDir;

pub const STATIC_PREFIX: &str = "/static";

pub async fn serve_static(State(dir): State<ServeDir>, req: Request, next: Next) -> Response {
    let Some(asset_uri) = asset_uri(&req) else {
        return next.run(req).await;
    };

    let mut asset_req = Request::new(Body::empty());
    *asset_req.method_mut() = req.method().clone();
    *asset_req.uri_mut() = asset_uri;
    *asset_req.version_mut() = req.version();
    *asset_req.headers_mut() = req.headers().clone();

    let res = match dir.oneshot(asset_req).await {
        Ok(res) => res,
        Err(never) => match never {},
    };
    if res.status() == StatusCode::NOT_FOUND {
        return next.run(req).await;
    }
    res.map(Body::new)
}

fn asset_uri(req: &Request) -> Option<Uri> {
    if !matches!(*req.method(), Method::GET | Method::HEAD) {
        return None;
    }
    let rest = req.uri().path().strip_prefix(STATIC_PREFIX)?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let path = if rest.is_empty() { "/" } else { rest };
    let path_and_query = match req.uri().query() {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    };
    Uri::builder().path_and_query(path_and_query).build().ok()
}
