//! Remote server registration and persistence.
//!
//! Registrations are persisted at ~/.conductor/servers.json. Connection
//! lifecycle is owned by the paired `RemoteClient`, not by these records.

use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::error::{ConfigError, ServerError};

/// Protocol flavor a remote server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerKind {
    /// JSON-RPC tool protocol over streamable HTTP (the default).
    #[default]
    Http,
}

impl std::fmt::Display for ServerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
        }
    }
}

/// Credential bundle for a remote server.
#[derive(Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication (local/dev servers).
    #[default]
    None,
    /// Bearer API key sent in the Authorization header.
    ApiKey { key: SecretString },
    /// HTTP basic auth.
    Basic {
        username: String,
        password: SecretString,
    },
}

impl AuthConfig {
    /// Whether any credential material is configured.
    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::None)
    }
}

// Secrets only leave memory for the registrations file, which lives in
// the user's own config directory.
impl Serialize for AuthConfig {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(tag = "type", rename_all = "snake_case")]
        enum Repr<'a> {
            None,
            ApiKey {
                key: &'a str,
            },
            Basic {
                username: &'a str,
                password: &'a str,
            },
        }

        let repr = match self {
            Self::None => Repr::None,
            Self::ApiKey { key } => Repr::ApiKey {
                key: key.expose_secret(),
            },
            Self::Basic { username, password } => Repr::Basic {
                username,
                password: password.expose_secret(),
            },
        };
        repr.serialize(serializer)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "AuthConfig::None"),
            Self::ApiKey { .. } => write!(f, "AuthConfig::ApiKey {{ .. }}"),
            Self::Basic { username, .. } => {
                write!(f, "AuthConfig::Basic {{ username: {username:?}, .. }}")
            }
        }
    }
}

/// Last known reachability of a registered server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// Registered but never connected.
    #[default]
    Registered,
    /// Handshake succeeded on the last attempt.
    Connected,
    /// Last connection attempt failed.
    Unreachable,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Connected => write!(f, "connected"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Registration record for one remote server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRegistration {
    /// Stable id assigned at registration time.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Display name, unique within the registry (e.g. "patents", "search").
    pub name: String,

    /// Server URL (must be HTTPS for non-loopback hosts).
    pub endpoint: String,

    #[serde(default)]
    pub kind: ServerKind,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub status: ServerStatus,
}

impl ServerRegistration {
    /// Create a new registration with a fresh id.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            endpoint: endpoint.into(),
            kind: ServerKind::default(),
            auth: AuthConfig::default(),
            status: ServerStatus::Registered,
        }
    }

    /// Set the auth configuration.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Validate the registration.
    ///
    /// Bad registrations are rejected here, at registration time, never
    /// silently accepted.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.name.is_empty() {
            return Err(ServerError::InvalidConfig {
                reason: "server name cannot be empty".to_string(),
            });
        }

        let parsed = url::Url::parse(&self.endpoint).map_err(|e| ServerError::InvalidConfig {
            reason: format!("malformed endpoint '{}': {}", self.endpoint, e),
        })?;

        match parsed.scheme() {
            "https" => Ok(()),
            // Plain HTTP is allowed only for loopback dev servers.
            "http" if is_loopback_host(&parsed) => Ok(()),
            "http" => Err(ServerError::InvalidConfig {
                reason: "remote servers must use HTTPS".to_string(),
            }),
            other => Err(ServerError::InvalidConfig {
                reason: format!("unsupported endpoint scheme '{}'", other),
            }),
        }
    }
}

/// Check if a URL points to a loopback address (localhost, 127.0.0.1, [::1]).
fn is_loopback_host(url: &url::Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Persisted file containing all server registrations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersFile {
    #[serde(default)]
    pub servers: Vec<ServerRegistration>,

    /// Schema version for future compatibility.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    1
}

impl ServersFile {
    /// Get a registration by name.
    pub fn get(&self, name: &str) -> Option<&ServerRegistration> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Add or update a registration by name.
    pub fn upsert(&mut self, registration: ServerRegistration) {
        if let Some(existing) = self.servers.iter_mut().find(|s| s.name == registration.name) {
            *existing = registration;
        } else {
            self.servers.push(registration);
        }
    }

    /// Remove a registration by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let len_before = self.servers.len();
        self.servers.retain(|s| s.id != id);
        self.servers.len() < len_before
    }
}

/// Load server registrations from a specific path.
///
/// A missing file is an empty registry, not an error.
pub async fn load_servers_from(path: impl AsRef<Path>) -> Result<ServersFile, ConfigError> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(ServersFile::default());
    }

    let content = fs::read_to_string(path).await?;
    let file: ServersFile = serde_json::from_str(&content)?;

    Ok(file)
}

/// Save server registrations to a specific path.
pub async fn save_servers_to(
    file: &ServersFile,
    path: impl AsRef<Path>,
) -> Result<(), ConfigError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_string_pretty(file)?;
    fs::write(path, content).await?;

    Ok(())
}

/// Build the Authorization/credential headers for a request.
pub fn apply_auth(builder: reqwest::RequestBuilder, auth: &AuthConfig) -> reqwest::RequestBuilder {
    match auth {
        AuthConfig::None => builder,
        AuthConfig::ApiKey { key } => builder.header(
            "Authorization",
            format!("Bearer {}", key.expose_secret()),
        ),
        AuthConfig::Basic { username, password } => {
            builder.basic_auth(username, Some(password.expose_secret()))
        }
    }
}
