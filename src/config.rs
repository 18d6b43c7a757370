//! Process configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file named by
//! `MBTA_RELAY_CONFIG`, then individual environment overrides. The result is
//! read once at startup and handed to [`crate::upstream::Upstream::new`] and
//! [`crate::server::Server::new`].

use std::{fmt, net::SocketAddr, path::Path, path::PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Environment variable naming an optional YAML configuration file.
pub const CONFIG_FILE_ENV: &str = "MBTA_RELAY_CONFIG";
/// Environment variable holding the upstream API key.
pub const API_KEY_ENV: &str = "MBTA_API_KEY";
/// Environment variable overriding the listen address.
pub const LISTEN_ENV: &str = "MBTA_RELAY_LISTEN";
/// Environment variable overriding the upstream base URI.
pub const UPSTREAM_ENV: &str = "MBTA_RELAY_UPSTREAM";

pub const DEFAULT_LISTEN: &str = "0.0.0.0:4567";
pub const DEFAULT_UPSTREAM: &str = "https://api-v3.mbta.com";

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the relay listens on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Base URI of the transit API, without a trailing path
    #[serde(default = "default_upstream")]
    pub upstream: String,
    /// Credential sent as `X-API-Key` on every upstream call
    #[serde(default)]
    pub api_key: Option<String>,
    /// Inbound TLS termination; plain TCP when absent
    #[serde(default)]
    pub tls: Option<Tls>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tls {
    /// PEM file with the certificate chain
    pub certificate: PathBuf,
    /// PEM file with the private key
    pub private_key: PathBuf,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4567))
}

fn default_upstream() -> String {
    DEFAULT_UPSTREAM.to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            upstream: default_upstream(),
            api_key: None,
            tls: None,
        }
    }
}

// The key must never end up in logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen", &self.listen)
            .field("upstream", &self.upstream)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .finish()
    }
}

impl Config {
    /// Loads the configuration from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration using `lookup` in place of the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_FILE_ENV) {
            Some(path) => Self::from_yaml_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV) {
            self.api_key = Some(key);
        }
        if let Some(listen) = lookup(LISTEN_ENV) {
            self.listen = listen
                .parse()
                .with_context(|| format!("{LISTEN_ENV} is not a socket address: {listen}"))?;
        }
        if let Some(upstream) = lookup(UPSTREAM_ENV) {
            self.upstream = upstream;
        }
        Ok(())
    }
}
