use anyhow::Context;
use async_trait::async_trait;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Collection, Database,
};

use super::model::User;

pub const USERS_COLLECTION: &str = "users";

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: &ObjectId) -> anyhow::Result<Option<User>>;
    async fn insert(&self, user: User) -> anyhow::Result<User>;
    /// Appends `title` to the user's movie list. Duplicates are kept.
    async fn push_movie(&self, id: &ObjectId, title: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct MongoUserStore {
    users: Collection<User>,
}

impl MongoUserStore {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection(USERS_COLLECTION),
        }
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.users
            .find_one(doc! { "local.email": email }, None)
            .await
            .context("find user by email")
    }

    async fn find_by_id(&self, id: &ObjectId) -> anyhow::Result<Option<User>> {
        self.users
            .find_one(doc! { "_id": id }, None)
            .await
            .context("find user by id")
    }

    async fn insert(&self, mut user: User) -> anyhow::Result<User> {
        let result = self
            .users
            .insert_one(&user, None)
            .await
            .context("insert user")?;
        user.id = result.inserted_id.as_object_id();
        Ok(user)
    }

    async fn push_movie(&self, id: &ObjectId, title: &str) -> anyhow::Result<()> {
        self.users
            .update_one(
                doc! { "_id": id },
                doc! { "$push": { "local.movieList": title } },
                None,
            )
            .await
            .context("append movie")?;
        Ok(())
    }
}

#[cfg(test)]
pub use memory::MemoryUserStore;
