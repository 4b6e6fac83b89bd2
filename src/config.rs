// Service configuration
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::ingestion::DEFAULT_LANGUAGE;
use crate::model::Hotel;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid hotel definition '{0}', expected CODE=Name")]
    InvalidHotel(String),
}

/// Credentials the PMS must present on `/alpinebits`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolAuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub require_client_id: bool,
}

impl ProtocolAuthConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            require_client_id: false,
        }
    }

    pub fn with_require_client_id(mut self, require: bool) -> Self {
        self.require_client_id = require;
        self
    }

    /// Both halves of the expected credential, if configured and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// SQLite database file; the in-memory store is used when absent.
    pub database_path: Option<PathBuf>,
    pub default_language: String,
    pub hotels: Vec<Hotel>,
    pub auth: ProtocolAuthConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            database_path: None,
            default_language: DEFAULT_LANGUAGE.to_string(),
            hotels: Vec::new(),
            auth: ProtocolAuthConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    pub fn with_hotel(mut self, hotel: Hotel) -> Self {
        self.hotels.push(hotel);
        self
    }

    pub fn with_auth(mut self, auth: ProtocolAuthConfig) -> Self {
        self.auth = auth;
        self
    }
}

/// Parses a `CODE=Name` hotel definition as given on the command line.
pub fn parse_hotel(definition: &str) -> Result<Hotel, ConfigError> {
    let invalid = || ConfigError::InvalidHotel(definition.to_string());
    let (code, name) = definition.split_once('=').ok_or_else(invalid)?;
    let (code, name) = (code.trim(), name.trim());
    if code.is_empty() || name.is_empty() {
        return Err(invalid());
    }
    Ok(Hotel::new(code, name))
}
