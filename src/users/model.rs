use bcrypt::BcryptError;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::auth::password::{hash_password, verify_password};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default)]
    pub local: LocalCredentials,
}

/// Email/password credentials and the movie list. Every field may be
/// absent in stored documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>, // bcrypt digest, never plaintext
    #[serde(rename = "movieList", default)]
    pub movie_list: Vec<String>,
}

impl User {
    pub fn with_credentials(email: impl Into<String>, password_hash: String) -> Self {
        Self {
            id: None,
            local: LocalCredentials {
                email: Some(email.into()),
                password: Some(password_hash),
                movie_list: Vec::new(),
            },
        }
    }

    pub fn generate_hash(password: &str) -> Result<String, BcryptError> {
        hash_password(password)
    }

    /// Checks `password` against the stored digest. A user without a digest
    /// never validates.
    pub fn valid_password(&self, password: &str) -> bool {
        self.local
            .password
            .as_deref()
            .is_some_and(|digest| verify_password(password, digest))
    }

    pub fn email(&self) -> &str {
        self.local.email.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, doc};

    #[test]
    fn valid_password_matches_generated_hash() {
        let hash = User::generate_hash("secret").unwrap();
        let user = User::with_credentials("a@x.com", hash);
        assert_ne!(user.local.password.as_deref(), Some("secret"));
        assert!(user.valid_password("secret"));
        assert!(!user.valid_password("Secret"));
    }

    #[test]
    fn user_without_digest_never_validates() {
        let user = User::default();
        assert!(!user.valid_password(""));
        assert!(!user.valid_password("secret"));
    }

    #[test]
    fn serializes_to_local_subdocument() {
        let mut user = User::with_credentials("a@x.com", "$2a$08$digest".into());
        user.local.movie_list = vec!["Alien".into(), "Alien".into()];
        let document = bson::to_document(&user).unwrap();
        assert_eq!(
            document,
            doc! {
                "local": {
                    "email": "a@x.com",
                    "password": "$2a$08$digest",
                    "movieList": ["Alien", "Alien"],
                }
            }
        );
    }

    #[test]
    fn reads_sparse_documents_and_ignores_unknown_fields() {
        let id = ObjectId::new();
        let user: User = bson::from_document(doc! {
            "_id": id,
            "local": { "email": "b@x.com" },
            "__v": 0,
        })
        .unwrap();
        assert_eq!(user.id, Some(id));
        assert_eq!(user.email(), "b@x.com");
        assert_eq!(user.local.password, None);
        assert!(user.local.movie_list.is_empty());

        let empty: User = bson::from_document(doc! { "_id": id }).unwrap();
        assert_eq!(empty.local, LocalCredentials::default());
    }
}
