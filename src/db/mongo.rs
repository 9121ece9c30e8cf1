//! MongoDB client construction
//!
//! Builds a client from a connection URI plus explicit option overrides,
//! then verifies the connection with a ping before any cursor work starts.

use bson::doc;
use mongodb::options::{ClientOptions, Credential, ServerAddress, Tls, TlsOptions};
use mongodb::Client;
use tracing::info;

use crate::types::{Result, VerifyError};

const DEFAULT_MONGODB_PORT: u16 = 27017;
const DEFAULT_MAX_POOL_SIZE: u32 = 30;

/// Connection target assembled from the CLI options
#[derive(Debug, Clone, Default)]
pub struct DbTarget {
    pub uri: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ssl: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_database: Option<String>,
    pub database: Option<String>,
}

/// Connects to MongoDB and returns the client along with the resolved
/// target database name, if any. Explicit overrides take precedence over
/// the URI.
pub async fn connect(target: &DbTarget) -> Result<(Client, Option<String>)> {
    let mut options = ClientOptions::parse(&target.uri)
        .await
        .map_err(|e| VerifyError::Database(format!("invalid MongoDB URI: {e}")))?;

    if target.host.is_some() || target.port.is_some() {
        if options.hosts.len() != 1 {
            return Err(VerifyError::InvalidInput(
                "'--host' or '--port' cannot be used to override multiple hosts in URI".to_string(),
            ));
        }

        let (uri_host, uri_port) = match &options.hosts[0] {
            ServerAddress::Tcp { host, port } => (host.clone(), port.unwrap_or(DEFAULT_MONGODB_PORT)),
            other => (other.to_string(), DEFAULT_MONGODB_PORT),
        };

        options.hosts = vec![ServerAddress::Tcp {
            host: target.host.clone().unwrap_or(uri_host),
            port: Some(target.port.unwrap_or(uri_port)),
        }];
    }

    if let Some(ssl) = target.ssl {
        options.tls = Some(if ssl {
            Tls::Enabled(TlsOptions::default())
        } else {
            Tls::Disabled
        });
    }

    if target.username.is_some() || target.password.is_some() {
        let mut credential = options.credential.clone().unwrap_or_default();

        if let Some(username) = &target.username {
            credential.username = Some(username.clone());
        }
        if let Some(password) = &target.password {
            credential.password = Some(password.clone());
        }
        if let Some(auth_db) = &target.auth_database {
            credential.source = Some(auth_db.clone());
        }

        options.credential = Some(credential);
    } else if let Some(auth_db) = &target.auth_database {
        let mut credential = options.credential.clone().unwrap_or_default();
        credential.source = Some(auth_db.clone());
        options.credential = Some(credential);
    }

    if options.max_pool_size.is_none() {
        options.max_pool_size = Some(DEFAULT_MAX_POOL_SIZE);
    }

    let database = target
        .database
        .clone()
        .or_else(|| options.default_database.clone());

    let client = Client::with_options(options)
        .map_err(|e| VerifyError::Database(format!("cannot create MongoDB client: {e}")))?;

    if let Some(name) = &database {
        // fail fast on an unreachable target
        client
            .database(name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| VerifyError::Database(format!("MongoDB ping failed: {e}")))?;

        info!(database = name.as_str(), "connected to MongoDB");
    }

    Ok((client, database))
}
