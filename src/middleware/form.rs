use axum::{
    async_trait,
    body::{self, Body},
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::AppError;

pub const FORM_BODY_LIMIT: usize = 100 * 1024;
const MAX_DEPTH: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormBody(pub Value);

/// Parses `application/x-www-form-urlencoded` bodies into a [`FormBody`]
/// extension. The raw bytes are put back for later consumers.
pub async fn parse_form_body(req: Request, next: Next) -> Result<Response, AppError> {
    if !is_urlencoded(&req) {
        return Ok(next.run(req).await);
    }
    let (mut parts, body) = req.into_parts();
    let bytes = body::to_bytes(body, FORM_BODY_LIMIT)
        .await
        .map_err(|e| AppError::MalformedForm(e.to_string()))?;
    parts.extensions.insert(FormBody(parse_extended(&bytes)?));
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

fn is_urlencoded(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// `user[email]=a` becomes `{"user": {"email": "a"}}`, `tag[]=a&tag[]=b`
/// and repeated keys become arrays.
pub fn parse_extended(bytes: &[u8]) -> Result<Value, AppError> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(bytes).map_err(|e| AppError::MalformedForm(e.to_string()))?;
    let mut root = Value::Object(Map::new());
    for (key, value) in pairs {
        if key.is_empty() {
            continue;
        }
        assign(&mut root, &split_key(&key), value);
    }
    Ok(root)
}

fn split_key(key: &str) -> Vec<String> {
    let literal = || vec![key.to_string()];
    let Some(open) = key.find('[') else {
        return literal();
    };
    if open == 0 || !key.ends_with(']') {
        return literal();
    }
    let mut segments = vec![key[..open].to_string()];
    segments.extend(key[open + 1..key.len() - 1].split("][").map(str::to_string));
    if segments.len() > MAX_DEPTH + 1 || segments.iter().any(|s| s.contains(['[', ']'])) {
        return literal();
    }
    segments
}

fn assign(slot: &mut Value, segments: &[String], value: String) {
    match segments.split_first() {
        None => match slot {
            Value::Null => *slot = Value::String(value),
            Value::Array(items) => items.push(Value::String(value)),
            other => {
                let previous = other.take();
                *other = Value::Array(vec![previous, Value::String(value)]);
            }
        },
        Some((head, rest)) if head.is_empty() => {
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                let mut child = Value::Null;
                assign(&mut child, rest, value);
                items.push(child);
            }
        }
        Some((head, rest)) => {
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(map) = slot {
                let child = map.entry(head.clone()).or_insert(Value::Null);
                assign(child, rest, value);
            }
        }
    }
}

pub struct ParsedForm<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ParsedForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .extensions
            .get::<FormBody>()
            .map(|f| f.0.clone())
            .unwrap_or_else(|| Value::Object(Map::new()));
        serde_json::from_value(value)
            .map(ParsedForm)
            .map_err(|e| AppError::MalformedForm(e.to_string()))
    }
}
