use std::{str::FromStr, time::Duration};

use axum::http::{header, HeaderMap, Request, Response, StatusCode};
use tracing::{field, Span};

/// Request log line shapes, named after the classic access-log presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLogFormat {
    Combined,
    Common,
    Dev,
    Short,
    Tiny,
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownFormat;

impl FromStr for RequestLogFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combined" => Ok(Self::Combined),
            "common" => Ok(Self::Common),
            "dev" => Ok(Self::Dev),
            "short" => Ok(Self::Short),
            "tiny" => Ok(Self::Tiny),
            _ => Err(UnknownFormat),
        }
    }
}

impl RequestLogFormat {
    fn includes_client(self) -> bool {
        matches!(self, Self::Combined | Self::Common | Self::Short)
    }

    fn includes_agent(self) -> bool {
        matches!(self, Self::Combined)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

pub fn make_span<B>(format: RequestLogFormat, req: &Request<B>) -> Span {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let span = tracing::info_span!(
        "http_request",
        %method,
        uri = %uri,
        version = ?req.version(),
        host = field::Empty,
        referrer = field::Empty,
        user_agent = field::Empty,
        status = field::Empty,
    );
    if format.includes_client() {
        span.record("host", header_str(req.headers(), header::HOST));
    }
    if format.includes_agent() {
        span.record("referrer", header_str(req.headers(), header::REFERER));
        span.record("user_agent", header_str(req.headers(), header::USER_AGENT));
    }
    span
}

pub fn on_response<B>(format: RequestLogFormat, res: &Response<B>, latency: Duration, span: &Span) {
    let status = res.status();
    span.record("status", field::display(status));
    let length = header_str(res.headers(), header::CONTENT_LENGTH);
    let latency_ms = latency.as_secs_f64() * 1000.0;
    emit(format, status, length, latency_ms);
}

fn emit(format: RequestLogFormat, status: StatusCode, length: &str, latency_ms: f64) {
    macro_rules! at_level {
        ($($fields:tt)*) => {
            if status.is_server_error() {
                tracing::error!($($fields)*);
            } else if format == RequestLogFormat::Dev && status.is_client_error() {
                tracing::warn!($($fields)*);
            } else {
                tracing::info!($($fields)*);
            }
        };
    }
    match format {
        RequestLogFormat::Tiny | RequestLogFormat::Dev | RequestLogFormat::Short => {
            at_level!(%status, length, latency_ms, "response")
        }
        RequestLogFormat::Common | RequestLogFormat::Combined => {
            at_level!(%status, length, "response")
        }
    }
}
