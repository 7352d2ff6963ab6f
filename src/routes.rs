use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use minijinja::context;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        setup::{LOCAL_LOGIN, LOCAL_SIGNUP},
        strategy::{Credentials, Verdict},
        AuthSession, Authenticator, LoggedIn,
    },
    error::AppError,
    flash::Flash,
    middleware::form::ParsedForm,
    state::AppState,
    views::Views,
};

pub const LOGIN_MESSAGE: &str = "loginMessage";
pub const SIGNUP_MESSAGE: &str = "signupMessage";
pub const MOVIE_MESSAGE: &str = "movieMessage";

/// Where a strategy-backed form post sends the browser afterwards.
#[derive(Debug, Clone, Copy)]
struct AuthRedirects {
    strategy: &'static str,
    success: &'static str,
    failure: &'static str,
    flash_key: &'static str,
}

const SIGNUP: AuthRedirects = AuthRedirects {
    strategy: LOCAL_SIGNUP,
    success: "/profile",
    failure: "/signup",
    flash_key: SIGNUP_MESSAGE,
};

const LOGIN: AuthRedirects = AuthRedirects {
    strategy: LOCAL_LOGIN,
    success: "/profile",
    failure: "/login",
    flash_key: LOGIN_MESSAGE,
};

/// Registers every page and form handler on `router`.
pub fn register(router: Router<AppState>, auth: &Authenticator) -> Router<AppState> {
    for redirects in [SIGNUP, LOGIN] {
        if !auth.has_strategy(redirects.strategy) {
            warn!(strategy = redirects.strategy, "strategy not registered");
        }
    }
    let signup_auth = auth.clone();
    let login_auth = auth.clone();

    router
        .route("/", get(index))
        .route(
            "/login",
            get(login_page).post(
                move |flash: Flash, session: AuthSession, form: ParsedForm<Credentials>| {
                    authenticate(login_auth.clone(), LOGIN, flash, session, form)
                },
            ),
        )
        .route(
            "/signup",
            get(signup_page).post(
                move |flash: Flash, session: AuthSession, form: ParsedForm<Credentials>| {
                    authenticate(signup_auth.clone(), SIGNUP, flash, session, form)
                },
            ),
        )
        .route("/profile", get(profile))
        .route("/profile/movies", post(add_movie))
        .route("/logout", get(logout))
        .fallback(not_found)
}

#[instrument(skip_all, fields(strategy = redirects.strategy))]
async fn authenticate(
    auth: Authenticator,
    redirects: AuthRedirects,
    flash: Flash,
    mut session: AuthSession,
    ParsedForm(credentials): ParsedForm<Credentials>,
) -> Result<Redirect, AppError> {
    match auth.authenticate(redirects.strategy, &credentials).await? {
        Verdict::Success(user) => {
            session.login(user).await?;
            Ok(Redirect::to(redirects.success))
        }
        Verdict::Failure(message) => {
            flash.push(redirects.flash_key, message).await?;
            Ok(Redirect::to(redirects.failure))
        }
    }
}

async fn index(views: Views, session: AuthSession) -> Result<Response, AppError> {
    let page = views.render("index", context! { logged_in => session.is_authenticated() })?;
    Ok(page.into_response())
}

async fn login_page(views: Views, flash: Flash) -> Result<Response, AppError> {
    let message = flash.take(LOGIN_MESSAGE).await?;
    Ok(views.render("login", context! { message })?.into_response())
}

async fn signup_page(views: Views, flash: Flash) -> Result<Response, AppError> {
    let message = flash.take(SIGNUP_MESSAGE).await?;
    Ok(views.render("signup", context! { message })?.into_response())
}

async fn profile(
    views: Views,
    flash: Flash,
    LoggedIn(user): LoggedIn,
) -> Result<Response, AppError> {
    let message = flash.take(MOVIE_MESSAGE).await?;
    let page = views.render(
        "profile",
        context! {
            user => context! { email => user.email(), movies => &user.local.movie_list },
            message,
        },
    )?;
    Ok(page.into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NewMovie {
    title: String,
}

#[instrument(skip_all)]
async fn add_movie(
    State(state): State<AppState>,
    flash: Flash,
    LoggedIn(user): LoggedIn,
    ParsedForm(movie): ParsedForm<NewMovie>,
) -> Result<Redirect, AppError> {
    let title = movie.title.trim();
    if title.is_empty() {
        flash.push(MOVIE_MESSAGE, "Movie title cannot be empty.").await?;
        return Ok(Redirect::to("/profile"));
    }
    let id = user.id.ok_or(AppError::UnsavedUser)?;
    state
        .users
        .push_movie(&id, title)
        .await
        .map_err(AppError::Database)?;
    info!(user_id = %id, title, "movie added");
    Ok(Redirect::to("/profile"))
}

async fn logout(mut session: AuthSession) -> Result<Redirect, AppError> {
    session.logout().await?;
    Ok(Redirect::to("/"))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
