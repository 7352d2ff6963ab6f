use std::sync::Arc;

use crate::auth::{setup, Authenticator};
use crate::config::Settings;
use crate::db;
use crate::users::{MongoUserStore, UserStore};
use crate::views::Views;

/// Everything a request handler needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub users: Arc<dyn UserStore>,
    pub auth: Authenticator,
    pub views: Views,
}

impl AppState {
    /// Connects to MongoDB and configures authentication against it.
    pub async fn init(config: Settings) -> anyhow::Result<Self> {
        let db = db::connect(&config.mongodb.uri, &config.mongodb.connect_options).await?;
        let users = Arc::new(MongoUserStore::new(&db)) as Arc<dyn UserStore>;
        Self::from_parts(Arc::new(config), users)
    }

    pub fn from_parts(config: Arc<Settings>, users: Arc<dyn UserStore>) -> anyhow::Result<Self> {
        let auth = setup::configure(users.clone());
        let views = Views::new()?;
        Ok(Self {
            config,
            users,
            auth,
            views,
        })
    }

    #[cfg(test)]
    pub fn fake(users: Arc<dyn UserStore>) -> Self {
        use crate::config::{MongoSettings, SessionSettings};
        use crate::middleware::request_log::RequestLogFormat;

        let config = Arc::new(Settings {
            settings_group: "test".into(),
            port: 0,
            mongodb: MongoSettings {
                uri: db::MongoUri::default(),
                connect_options: Default::default(),
            },
            session: SessionSettings {
                secret: "test-secret".into(),
                max_age_minutes: None,
                secure_cookie: false,
            },
            request_log: RequestLogFormat::Tiny,
            static_dir: "static".into(),
        });
        Self::from_parts(config, users).expect("templates compile")
    }
}
