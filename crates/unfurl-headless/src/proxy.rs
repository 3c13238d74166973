//! Upstream proxy configuration.
//!
//! Requests may carry a proxy server in loose forms (`host`, `host:port`,
//! `scheme://host`, `scheme://host:port`); this module normalizes them to a
//! canonical `protocol://host:port` string for the browser context and
//! validates the credential pair.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProxyError {
    #[error("proxy server must not be empty")]
    EmptyServer,

    #[error("unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("proxy server is missing a host")]
    MissingHost,

    #[error("invalid proxy port: {0}")]
    InvalidPort(String),

    #[error("proxy credentials require both username and password")]
    PartialCredentials,
}

/// Supported proxy protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks5 => "socks5",
        }
    }

    /// Conventional default port when the server string omits one.
    pub fn default_port(&self) -> u16 {
        match self {
            ProxyProtocol::Http => 8080,
            ProxyProtocol::Https => 8443,
            ProxyProtocol::Socks5 => 1080,
        }
    }
}

/// A validated proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub protocol: ProxyProtocol,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub rotate: bool,
}

impl ProxySettings {
    /// Parse and validate a proxy server string plus optional credentials.
    pub fn parse(
        server: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ProxyError> {
        let server = server.trim();
        if server.is_empty() {
            return Err(ProxyError::EmptyServer);
        }

        let (protocol, rest) = match server.split_once("://") {
            Some((scheme, rest)) => {
                let protocol = match scheme.to_ascii_lowercase().as_str() {
                    "http" => ProxyProtocol::Http,
                    "https" => ProxyProtocol::Https,
                    "socks5" => ProxyProtocol::Socks5,
                    other => return Err(ProxyError::UnsupportedProtocol(other.to_string())),
                };
                (protocol, rest)
            }
            None => (ProxyProtocol::Http, server),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ProxyError::InvalidPort(port.to_string()))?;
                (host, port)
            }
            None => (rest, protocol.default_port()),
        };

        let host = host.trim_end_matches('/');
        if host.is_empty() {
            return Err(ProxyError::MissingHost);
        }

        let credentials = match (username, password) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            _ => return Err(ProxyError::PartialCredentials),
        };
        let (username, password) = match credentials {
            Some((u, p)) => (Some(u), Some(p)),
            None => (None, None),
        };

        Ok(Self {
            protocol,
            host: host.to_string(),
            port,
            username,
            password,
            rotate: false,
        })
    }

    /// Canonical `protocol://host:port` server string handed to the engine.
    pub fn server_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.as_str(), self.host, self.port)
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some()
    }
}
