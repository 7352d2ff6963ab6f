use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{Request, State},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    Router,
};
use sha2::{Digest, Sha512};
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};
use tower_sessions::{cookie::Key, Expiry, MemoryStore, SessionManagerLayer};
use tracing::{trace, Span};

use crate::{auth, config::SessionSettings, flash, state::AppState, views};

pub mod errors;
pub mod form;
pub mod request_log;
pub mod static_files;

pub const SESSION_COOKIE: &str = "movielist.sid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RequestLog,
    BodyParser,
    ViewEngine,
    Session,
    StaticAssets,
    AuthInitialize,
    AuthSession,
    Flash,
}

#[derive(Debug, Clone, Default)]
pub struct StageRecorder(Arc<Mutex<Vec<Stage>>>);

impl StageRecorder {
    fn record(&self, stage: Stage) {
        if let Ok(mut stages) = self.0.lock() {
            stages.push(stage);
        }
    }

    pub fn take(&self) -> Vec<Stage> {
        self.0
            .lock()
            .map(|mut stages| std::mem::take(&mut *stages))
            .unwrap_or_default()
    }
}

#[derive(Clone)]
struct Tap {
    stage: Stage,
    recorder: Option<StageRecorder>,
}

async fn record_stage(State(tap): State<Tap>, req: Request, next: Next) -> Response {
    trace!(stage = ?tap.stage, "middleware stage");
    if let Some(recorder) = &tap.recorder {
        recorder.record(tap.stage);
    }
    next.run(req).await
}

fn session_key(secret: &str) -> Key {
    Key::from(Sha512::digest(secret.as_bytes()).as_slice())
}

fn session_expiry(settings: &SessionSettings) -> Expiry {
    match settings.max_age_minutes {
        Some(minutes) => Expiry::OnInactivity(time::Duration::minutes(minutes)),
        None => Expiry::OnSessionEnd,
    }
}

/// Wraps `router` in the full middleware chain, outermost first.
pub fn install(
    router: Router<AppState>,
    state: &AppState,
    recorder: Option<StageRecorder>,
) -> Router<AppState> {
    let tap = |stage| Tap {
        stage,
        recorder: recorder.clone(),
    };
    let format = state.config.request_log;
    let session = &state.config.session;

    let sessions = SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE)
        .with_secure(session.secure_cookie)
        .with_always_save(true)
        .with_expiry(session_expiry(session))
        .with_signed(session_key(&session.secret));

    let assets = ServeDir::new(&state.config.static_dir).append_index_html_on_directories(false);

    let chain = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |req: &axum::http::Request<_>| {
                    request_log::make_span(format, req)
                })
                .on_response(
                    move |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        request_log::on_response(format, res, latency, span)
                    },
                ),
        )
        .layer(from_fn_with_state(tap(Stage::RequestLog), record_stage))
        .layer(from_fn_with_state(state.views.clone(), errors::render_errors))
        .layer(CatchPanicLayer::custom(errors::panic_response))
        .layer(from_fn(form::parse_form_body))
        .layer(from_fn_with_state(tap(Stage::BodyParser), record_stage))
        .layer(from_fn_with_state(state.views.clone(), views::select_view_engine))
        .layer(from_fn_with_state(tap(Stage::ViewEngine), record_stage))
        .layer(sessions)
        .layer(from_fn_with_state(tap(Stage::Session), record_stage))
        .layer(from_fn_with_state(assets, static_files::serve_static))
        .layer(from_fn_with_state(tap(Stage::StaticAssets), record_stage))
        .layer(from_fn_with_state(state.auth.clone(), auth::initialize))
        .layer(from_fn_with_state(tap(Stage::AuthInitialize), record_stage))
        .layer(from_fn_with_state(state.auth.clone(), auth::hydrate_session_user))
        .layer(from_fn_with_state(tap(Stage::AuthSession), record_stage))
        .layer(from_fn(flash::install_flash))
        .layer(from_fn_with_state(tap(Stage::Flash), record_stage));

    router.layer(chain)
}
