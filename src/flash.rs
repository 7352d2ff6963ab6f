use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tower_sessions::Session;

use crate::error::AppError;

const FLASH_KEY: &str = "flash";

type Messages = HashMap<String, Vec<String>>;

#[derive(Clone)]
pub struct Flash {
    session: Session,
}

impl Flash {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub async fn push(&self, key: &str, message: impl Into<String>) -> Result<(), AppError> {
        let mut messages = self.load().await?;
        messages.entry(key.to_string()).or_default().push(message.into());
        self.session.insert(FLASH_KEY, messages).await?;
        Ok(())
    }

    /// Returns and clears every message stored under `key`.
    pub async fn take(&self, key: &str) -> Result<Vec<String>, AppError> {
        let mut messages = self.load().await?;
        let Some(taken) = messages.remove(key) else {
            return Ok(Vec::new());
        };
        if messages.is_empty() {
            self.session.remove::<Messages>(FLASH_KEY).await?;
        } else {
            self.session.insert(FLASH_KEY, messages).await?;
        }
        Ok(taken)
    }

    async fn load(&self) -> Result<Messages, AppError> {
        Ok(self.session.get::<Messages>(FLASH_KEY).await?.unwrap_or_default())
    }
}

pub async fn install_flash(mut req: Request, next: Next) -> Response {
    if let Some(session) = req.extensions().get::<Session>().cloned() {
        req.extensions_mut().insert(Flash::new(session));
    }
    next.run(req).await
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Flash {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Flash>()
            .cloned()
            .ok_or(AppError::MissingLayer("flash middleware"))
    }
}
