use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{Html, Response},
};
use minijinja::Environment;
use serde::Serialize;

use crate::error::AppError;

const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../views/layout.html")),
    ("index.html", include_str!("../views/index.html")),
    ("login.html", include_str!("../views/login.html")),
    ("signup.html", include_str!("../views/signup.html")),
    ("profile.html", include_str!("../views/profile.html")),
    ("error.html", include_str!("../views/error.html")),
];

/// Compiled page templates, looked up by view name (`"error"` renders
/// `error.html`).
#[derive(Clone)]
pub struct Views {
    env: Arc<Environment<'static>>,
}

impl Views {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for (name, source) in TEMPLATES {
            env.add_template(*name, *source)?;
        }
        Ok(Self { env: Arc::new(env) })
    }

    pub fn render<C: Serialize>(&self, view: &str, ctx: C) -> Result<Html<String>, AppError> {
        let template = self.env.get_template(&format!("{view}.html"))?;
        Ok(Html(template.render(ctx)?))
    }
}

pub async fn select_view_engine(State(views): State<Views>, mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(views);
    next.run(req).await
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Views {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Views>()
            .cloned()
            .ok_or(AppError::MissingLayer("view engine"))
    }
}
