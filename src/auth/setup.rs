use std::sync::Arc;

use super::{
    strategy::{LocalLogin, LocalSignup},
    Authenticator,
};
use crate::users::UserStore;

pub const LOCAL_SIGNUP: &str = "local-signup";
pub const LOCAL_LOGIN: &str = "local-login";

/// Registers the email/password strategies against `users`.
pub fn configure(users: Arc<dyn UserStore>) -> Authenticator {
    let mut auth = Authenticator::new(users);
    auth.use_strategy(LOCAL_SIGNUP, LocalSignup);
    auth.use_strategy(LOCAL_LOGIN, LocalLogin);
    auth
}
