use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    error::AppError,
    users::{User, UserStore},
};

pub const MISSING_CREDENTIALS: &str = "Missing credentials";
pub const EMAIL_TAKEN: &str = "That email is already taken.";
pub const NO_USER: &str = "No user found.";
pub const WRONG_PASSWORD: &str = "Oops! Wrong password.";

/// Login/signup form fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    fn is_complete(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug)]
pub enum Verdict {
    Success(User),
    /// Rejected credentials, with the message to flash back to the user.
    Failure(&'static str),
}

#[async_trait]
pub trait Strategy: Send + Sync {
    async fn authenticate(
        &self,
        users: &dyn UserStore,
        credentials: &Credentials,
    ) -> Result<Verdict, AppError>;
}

/// Creates an account when the email is not registered yet.
pub struct LocalSignup;

#[async_trait]
impl Strategy for LocalSignup {
    async fn authenticate(
        &self,
        users: &dyn UserStore,
        credentials: &Credentials,
    ) -> Result<Verdict, AppError> {
        if !credentials.is_complete() {
            return Ok(Verdict::Failure(MISSING_CREDENTIALS));
        }
        let existing = users
            .find_by_email(&credentials.email)
            .await
            .map_err(AppError::Database)?;
        if existing.is_some() {
            warn!(email = %credentials.email, "email already registered");
            return Ok(Verdict::Failure(EMAIL_TAKEN));
        }

        let hash = User::generate_hash(&credentials.password)?;
        let user = users
            .insert(User::with_credentials(credentials.email.clone(), hash))
            .await
            .map_err(AppError::Database)?;
        info!(user_id = ?user.id, email = %credentials.email, "user registered");
        Ok(Verdict::Success(user))
    }
}

/// Checks an email/password pair against the stored digest.
pub struct LocalLogin;

#[async_trait]
impl Strategy for LocalLogin {
    async fn authenticate(
        &self,
        users: &dyn UserStore,
        credentials: &Credentials,
    ) -> Result<Verdict, AppError> {
        if !credentials.is_complete() {
            return Ok(Verdict::Failure(MISSING_CREDENTIALS));
        }
        let Some(user) = users
            .find_by_email(&credentials.email)
            .await
            .map_err(AppError::Database)?
        else {
            warn!(email = %credentials.email, "login unknown email");
            return Ok(Verdict::Failure(NO_USER));
        };
        if !user.valid_password(&credentials.password) {
            warn!(email = %credentials.email, user_id = ?user.id, "login invalid password");
            return Ok(Verdict::Failure(WRONG_PASSWORD));
        }
        info!(user_id = ?user.id, "user logged in");
        Ok(Verdict::Success(user))
    }
}
