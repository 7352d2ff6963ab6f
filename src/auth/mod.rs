use std::{collections::HashMap, sync::Arc};

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use mongodb::bson::oid::ObjectId;
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::{
    error::AppError,
    users::{User, UserStore},
};

pub mod password;
pub mod setup;
pub mod strategy;

use strategy::{Credentials, Strategy, Verdict};

/// Session key holding the logged-in user's id.
pub const SESSION_USER_KEY: &str = "auth.user";

#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserStore>,
    strategies: HashMap<&'static str, Arc<dyn Strategy>>,
}

impl Authenticator {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            users,
            strategies: HashMap::new(),
        }
    }

    pub fn use_strategy(&mut self, name: &'static str, strategy: impl Strategy + 'static) {
        self.strategies.insert(name, Arc::new(strategy));
    }

    pub fn has_strategy(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub async fn authenticate(
        &self,
        name: &str,
        credentials: &Credentials,
    ) -> Result<Verdict, AppError> {
        let strategy = self
            .strategies
            .get(name)
            .ok_or_else(|| AppError::UnknownStrategy(name.to_string()))?;
        strategy.authenticate(self.users.as_ref(), credentials).await
    }

    pub fn serialize_user(&self, user: &User) -> Result<String, AppError> {
        user.id.map(|id| id.to_hex()).ok_or(AppError::UnsavedUser)
    }

    /// `Ok(None)` for ids that are malformed or no longer exist.
    pub async fn deserialize_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let Ok(id) = ObjectId::parse_str(id) else {
            return Ok(None);
        };
        self.users.find_by_id(&id).await.map_err(AppError::Database)
    }
}

#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub async fn initialize(State(auth): State<Authenticator>, mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(auth);
    next.run(req).await
}

/// Authentication session stage: loads the session user, dropping ids whose
/// user is gone.
pub async fn hydrate_session_user(
    State(auth): State<Authenticator>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(session) = req.extensions().get::<Session>().cloned() else {
        return Ok(next.run(req).await);
    };
    if let Some(id) = session.get::<String>(SESSION_USER_KEY).await? {
        match auth.deserialize_user(&id).await? {
            Some(user) => {
                debug!(user_id = %id, "session user loaded");
                req.extensions_mut().insert(CurrentUser(user));
            }
            None => {
                warn!(user_id = %id, "session refers to a missing user");
                session.remove::<String>(SESSION_USER_KEY).await?;
            }
        }
    }
    Ok(next.run(req).await)
}

pub struct AuthSession {
    auth: Authenticator,
    session: Session,
    user: Option<User>,
}

impl AuthSession {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Stores the user in a fresh session id; other session data is kept.
    pub async fn login(&mut self, user: User) -> Result<(), AppError> {
        let id = self.auth.serialize_user(&user)?;
        self.session.cycle_id().await?;
        self.session.insert(SESSION_USER_KEY, id).await?;
        self.user = Some(user);
        Ok(())
    }

    pub async fn logout(&mut self) -> Result<(), AppError> {
        self.session.remove::<String>(SESSION_USER_KEY).await?;
        self.user = None;
        Ok(())
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<Authenticator>()
            .cloned()
            .ok_or(AppError::MissingLayer("authentication initializer"))?;
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AppError::MissingLayer("session"))?;
        let user = parts.extensions.get::<CurrentUser>().map(|u| u.0.clone());
        Ok(Self {
            auth,
            session,
            user,
        })
    }
}

pub struct LoggedIn(pub User);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for LoggedIn {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .map(|u| LoggedIn(u.0.clone()))
            .ok_or_else(|| Redirect::to("/").into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::store::MemoryUserStore;

    fn authenticator() -> (Authenticator, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::default());
        (setup::configure(store.clone()), store)
    }

    #[tokio::test]
    async fn unknown_strategy_is_an_error() {
        let (auth, _) = authenticator();
        let err = auth
            .authenticate("oauth", &Credentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownStrategy(name) if name == "oauth"));
    }

    #[tokio::test]
    async fn serialized_id_deserializes_to_same_user() {
        let (auth, store) = authenticator();
        let user = store
            .insert(User::with_credentials("a@x.com", "digest".into()))
            .await
            .unwrap();
        let id = auth.serialize_user(&user).unwrap();
        let loaded = auth.deserialize_user(&id).await.unwrap();
        assert_eq!(loaded, Some(user));
    }

    #[tokio::test]
    async fn stale_or_malformed_ids_deserialize_to_none() {
        let (auth, _) = authenticator();
        assert_eq!(auth.deserialize_user("zzz").await.unwrap(), None);
        let missing = ObjectId::new().to_hex();
        assert_eq!(auth.deserialize_user(&missing).await.unwrap(), None);
    }

    #[test]
    fn unsaved_user_cannot_be_serialized() {
        let (auth, _) = authenticator();
        let err = auth.serialize_user(&User::default()).unwrap_err();
        assert!(matches!(err, AppError::UnsavedUser));
    }
}
