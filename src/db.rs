use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Context;
use mongodb::{
    bson::doc,
    event::sdam::{
        SdamEventHandler, ServerDescriptionChangedEvent, ServerHeartbeatFailedEvent,
        TopologyClosedEvent, TopologyOpeningEvent,
    },
    options::ClientOptions,
    Client, Database, ServerType,
};
use serde::Deserialize;
use tracing::{error, info, warn};

pub const DEFAULT_DATABASE: &str = "movielist";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MongoUri {
    Uri(String),
    Components(UriComponents),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UriComponents {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    pub port: Option<u16>,
    pub path: Option<String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

fn default_protocol() -> String {
    "mongodb".into()
}

fn default_hostname() -> String {
    "localhost".into()
}

impl Default for MongoUri {
    fn default() -> Self {
        MongoUri::Components(UriComponents {
            protocol: default_protocol(),
            username: None,
            password: None,
            hostname: default_hostname(),
            port: Some(27017),
            path: Some(DEFAULT_DATABASE.into()),
            query: BTreeMap::new(),
        })
    }
}

impl MongoUri {
    /// Reads an environment value: a JSON object is taken as components,
    /// anything else as a literal URI.
    pub fn from_env_value(value: &str) -> Result<Self, serde_json::Error> {
        let trimmed = value.trim();
        if trimmed.starts_with('{') {
            serde_json::from_str::<UriComponents>(trimmed).map(MongoUri::Components)
        } else {
            Ok(MongoUri::Uri(trimmed.to_string()))
        }
    }

    pub fn to_uri_string(&self) -> String {
        match self {
            MongoUri::Uri(uri) => uri.clone(),
            MongoUri::Components(c) => c.build(false),
        }
    }

    /// Same as [`MongoUri::to_uri_string`] with any password masked.
    pub fn redacted(&self) -> String {
        match self {
            MongoUri::Uri(uri) => redact_uri(uri),
            MongoUri::Components(c) => c.build(true),
        }
    }
}

impl UriComponents {
    fn build(&self, mask_password: bool) -> String {
        let mut uri = format!("{}://", self.protocol);
        if let Some(user) = &self.username {
            uri.push_str(&urlencoding::encode(user));
            if let Some(pass) = &self.password {
                uri.push(':');
                if mask_password {
                    uri.push_str("****");
                } else {
                    uri.push_str(&urlencoding::encode(pass));
                }
            }
            uri.push('@');
        }
        uri.push_str(&self.hostname);
        if let Some(port) = self.port {
            uri.push_str(&format!(":{port}"));
        }
        let path = self.path.as_deref().unwrap_or_default().trim_start_matches('/');
        if !path.is_empty() || !self.query.is_empty() {
            uri.push('/');
            uri.push_str(path);
        }
        if !self.query.is_empty() {
            let query: Vec<String> = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            uri.push('?');
            uri.push_str(&query.join("&"));
        }
        uri
    }
}

fn redact_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let Some(at) = rest[..authority_end].rfind('@') else {
        return uri.to_string();
    };
    match rest[..at].split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:****{}", &rest[at..]),
        None => uri.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    pub app_name: Option<String>,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub server_selection_timeout_ms: Option<u64>,
    pub direct_connection: Option<bool>,
    pub replica_set: Option<String>,
}

impl ConnectOptions {
    pub fn apply(&self, opts: &mut ClientOptions) {
        if let Some(name) = &self.app_name {
            opts.app_name = Some(name.clone());
        }
        if let Some(n) = self.max_pool_size {
            opts.max_pool_size = Some(n);
        }
        if let Some(n) = self.min_pool_size {
            opts.min_pool_size = Some(n);
        }
        if let Some(ms) = self.connect_timeout_ms {
            opts.connect_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = self.server_selection_timeout_ms {
            opts.server_selection_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(direct) = self.direct_connection {
            opts.direct_connection = Some(direct);
        }
        if let Some(rs) = &self.replica_set {
            opts.repl_set_name = Some(rs.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Open,
    Close,
    Connected,
    Disconnected,
    Error(String),
}

impl ConnectionEvent {
    pub fn from_transition(previous: ServerType, new: ServerType) -> Option<Self> {
        match (previous == ServerType::Unknown, new == ServerType::Unknown) {
            (true, false) => Some(ConnectionEvent::Connected),
            (false, true) => Some(ConnectionEvent::Disconnected),
            _ => None,
        }
    }

    pub fn log(&self) {
        match self {
            ConnectionEvent::Open => info!("mongodb open event"),
            ConnectionEvent::Close => info!("mongodb close event"),
            ConnectionEvent::Connected => info!("mongodb connected event"),
            ConnectionEvent::Disconnected => warn!("mongodb disconnected event"),
            ConnectionEvent::Error(e) => error!(error = %e, "mongodb error event"),
        }
    }
}

/// Logs topology changes. Never reconnects or exits.
struct ConnectionObserver;

impl SdamEventHandler for ConnectionObserver {
    fn handle_topology_opening_event(&self, _event: TopologyOpeningEvent) {
        ConnectionEvent::Open.log();
    }

    fn handle_topology_closed_event(&self, _event: TopologyClosedEvent) {
        ConnectionEvent::Close.log();
    }

    fn handle_server_description_changed_event(&self, event: ServerDescriptionChangedEvent) {
        let previous = event.previous_description.server_type();
        let new = event.new_description.server_type();
        if let Some(ev) = ConnectionEvent::from_transition(previous, new) {
            ev.log();
        }
    }

    fn handle_server_heartbeat_failed_event(&self, event: ServerHeartbeatFailedEvent) {
        ConnectionEvent::Error(event.failure.to_string()).log();
    }
}

/// Builds the client and returns the target database. The first round trip
/// happens in the background; its failure is only logged.
pub async fn connect(uri: &MongoUri, connect_options: &ConnectOptions) -> anyhow::Result<Database> {
    info!(uri = %uri.redacted(), "mongodb uri");

    let mut opts = ClientOptions::parse(uri.to_uri_string())
        .await
        .context("parse mongodb uri")?;
    connect_options.apply(&mut opts);
    opts.sdam_event_handler = Some(Arc::new(ConnectionObserver));

    let client = Client::with_options(opts).context("create mongodb client")?;
    let db = client
        .default_database()
        .unwrap_or_else(|| client.database(DEFAULT_DATABASE));

    let probe = db.clone();
    tokio::spawn(async move {
        match probe.run_command(doc! { "ping": 1 }, None).await {
            Ok(_) => info!(database = %probe.name(), "mongodb ping ok"),
            Err(e) => ConnectionEvent::Error(e.to_string()).log(),
        }
    });

    Ok(db)
}
