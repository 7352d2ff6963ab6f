use std::net::SocketAddr;

use axum::Router;

use crate::middleware::{self, StageRecorder};
use crate::routes;
use crate::state::AppState;

/// Middleware chain around the registered routes. `recorder` is only
/// supplied by tests that observe stage order.
pub fn build_app(state: AppState, recorder: Option<StageRecorder>) -> Router {
    let routes = routes::register(Router::new(), &state.auth);
    middleware::install(routes, &state, recorder).with_state(state)
}

pub async fn serve(app: Router, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("server started on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, Response, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::strategy::{EMAIL_TAKEN, WRONG_PASSWORD},
        error::AppError,
        middleware::Stage,
        users::store::MemoryUserStore,
    };

    struct Client {
        app: Router,
        cookie: Option<String>,
    }

    impl Client {
        fn new(app: Router) -> Self {
            Self { app, cookie: None }
        }

        async fn send(&mut self, mut req: Request<Body>) -> Response<Body> {
            if let Some(cookie) = &self.cookie {
                req.headers_mut()
                    .insert(header::COOKIE, cookie.parse().unwrap());
            }
            let res = self.app.clone().oneshot(req).await.unwrap();
            if let Some(set) = res.headers().get(header::SET_COOKIE) {
                let pair = set.to_str().unwrap().split(';').next().unwrap();
                self.cookie = Some(pair.to_string());
            }
            res
        }

        async fn get(&mut self, uri: &str) -> Response<Body> {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn post_form(&mut self, uri: &str, body: &'static str) -> Response<Body> {
            let req = Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap();
            self.send(req).await
        }
    }

    async fn text(res: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(res: &Response<Body>) -> &str {
        res.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    fn app_with_store() -> (Router, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::default());
        (build_app(AppState::fake(store.clone()), None), store)
    }

    #[tokio::test]
    async fn every_stage_runs_in_order() {
        let recorder = StageRecorder::default();
        let app = build_app(
            AppState::fake(Arc::new(MemoryUserStore::default())),
            Some(recorder.clone()),
        );
        let res = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            recorder.take(),
            [
                Stage::RequestLog,
                Stage::BodyParser,
                Stage::ViewEngine,
                Stage::Session,
                Stage::StaticAssets,
                Stage::AuthInitialize,
                Stage::AuthSession,
                Stage::Flash,
            ]
        );
    }

    #[tokio::test]
    async fn static_assets_short_circuit_before_authentication() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/app.css"), "body{}").unwrap();

        let store: Arc<MemoryUserStore> = Arc::default();
        let base = AppState::fake(store.clone());
        let mut settings = (*base.config).clone();
        settings.static_dir = dir.path().to_path_buf();
        let state = AppState::from_parts(Arc::new(settings), store).unwrap();

        let recorder = StageRecorder::default();
        let app = build_app(state, Some(recorder.clone()));

        let res = app
            .clone()
            .oneshot(Request::get("/static/css/app.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(text(res).await, "body{}");
        assert_eq!(
            recorder.take(),
            [Stage::RequestLog, Stage::BodyParser, Stage::ViewEngine, Stage::Session]
        );

        let missing = app
            .oneshot(Request::get("/static/nope.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(recorder.take().last(), Some(&Stage::Flash));
    }

    #[tokio::test]
    async fn signup_stores_digest_and_logs_in() {
        let (app, store) = app_with_store();
        let mut client = Client::new(app);

        let res = client
            .post_form("/signup", "email=a%40x.com&password=secret")
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/profile");

        let users = store.all().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email(), "a@x.com");
        assert_ne!(users[0].local.password.as_deref(), Some("secret"));
        assert!(users[0].valid_password("secret"));

        let profile = client.get("/profile").await;
        assert_eq!(profile.status(), StatusCode::OK);
        assert!(text(profile).await.contains("a@x.com"));
    }

    #[tokio::test]
    async fn duplicate_signup_flashes_once() {
        let (app, store) = app_with_store();
        let mut first = Client::new(app.clone());
        first.post_form("/signup", "email=a%40x.com&password=one").await;

        let mut second = Client::new(app);
        let res = second.post_form("/signup", "email=a%40x.com&password=two").await;
        assert_eq!(location(&res), "/signup");
        assert_eq!(store.all().await.len(), 1);

        let page = text(second.get("/signup").await).await;
        assert!(page.contains(EMAIL_TAKEN));
        let again = text(second.get("/signup").await).await;
        assert!(!again.contains(EMAIL_TAKEN));
    }

    #[tokio::test]
    async fn wrong_password_redirects_back_to_login() {
        let (app, _) = app_with_store();
        Client::new(app.clone())
            .post_form("/signup", "email=a%40x.com&password=secret")
            .await;

        let mut client = Client::new(app);
        let res = client
            .post_form("/login", "email=a%40x.com&password=guess")
            .await;
        assert_eq!(location(&res), "/login");
        assert!(text(client.get("/login").await).await.contains(WRONG_PASSWORD));
        assert_eq!(location(&client.get("/profile").await), "/");

        let res = client
            .post_form("/login", "email=a%40x.com&password=secret")
            .await;
        assert_eq!(location(&res), "/profile");
        assert_eq!(client.get("/profile").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn movies_append_in_order_and_logout_ends_session() {
        let (app, store) = app_with_store();
        let mut client = Client::new(app);
        client
            .post_form("/signup", "email=a%40x.com&password=secret")
            .await;

        for body in ["title=Heat", "title=The+Thing", "title=Heat", "title=++"] {
            let res = client.post_form("/profile/movies", body).await;
            assert_eq!(location(&res), "/profile");
        }
        assert_eq!(
            store.all().await[0].local.movie_list,
            ["Heat", "The Thing", "Heat"]
        );
        let page = text(client.get("/profile").await).await;
        assert!(page.contains("The Thing"));
        assert!(page.contains("Movie title cannot be empty."));

        assert_eq!(location(&client.get("/logout").await), "/");
        assert_eq!(location(&client.get("/profile").await), "/");
    }

    #[tokio::test]
    async fn anonymous_movie_post_redirects_home() {
        let (app, store) = app_with_store();
        let res = Client::new(app).post_form("/profile/movies", "title=Heat").await;
        assert_eq!(location(&res), "/");
        assert!(store.all().await.is_empty());
    }

    async fn failing() -> Result<&'static str, AppError> {
        Err(AppError::Database(anyhow::anyhow!("connection refused by 10.1.2.3")))
    }

    async fn panicking() -> &'static str {
        panic!("kaboom at 10.1.2.3")
    }

    fn error_app() -> Router {
        let state = AppState::fake(Arc::new(MemoryUserStore::default()));
        let routes = Router::new()
            .route("/fail", get(failing))
            .route("/panic", get(panicking));
        middleware::install(routes, &state, None).with_state(state)
    }

    #[tokio::test]
    async fn errors_render_the_error_view_without_internal_detail() {
        let res = error_app()
            .oneshot(Request::get("/fail").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let page = text(res).await;
        assert!(page.contains("The database is unavailable right now."));
        assert!(page.contains("data-kind=\"database\""));
        assert!(!page.contains("10.1.2.3"));
    }

    #[tokio::test]
    async fn panics_render_the_error_view() {
        let res = error_app()
            .oneshot(Request::get("/panic").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let page = text(res).await;
        assert!(page.contains("Something went wrong on our side."));
        assert!(!page.contains("kaboom"));
    }

    #[tokio::test]
    async fn malformed_form_is_a_bad_request() {
        let (app, _) = app_with_store();
        let res = Client::new(app)
            .post_form("/login", "email[first]=a&password=x")
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(text(res).await.contains("The submitted form could not be read."));
    }

    #[tokio::test]
    async fn oversized_form_renders_the_error_view() {
        let (app, _) = app_with_store();
        let body = format!("email={}&password=x", "a".repeat(200 * 1024));
        let req = Request::post("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let page = text(res).await;
        assert!(page.contains("data-kind=\"bad_request\""));
        assert!(page.contains("The submitted form could not be read."));
    }

    #[tokio::test]
    async fn unmodified_session_is_resaved_on_every_request() {
        let (app, _) = app_with_store();
        let mut client = Client::new(app);
        client
            .post_form("/signup", "email=a%40x.com&password=secret")
            .await;

        for _ in 0..2 {
            let res = client.get("/").await;
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().contains_key(header::SET_COOKIE));
            assert!(text(res).await.contains("/logout"));
        }
    }
}
