//! Hop configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default listen port of the entry hop.
pub const DEFAULT_ENTRY_PORT: u16 = 8888;

/// Default listen port of the terminal hop.
pub const DEFAULT_TERMINAL_PORT: u16 = 8081;

/// Default dial timeout (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default greeting/request timeout (seconds).
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Which part of the proxy chain a process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HopMode {
    /// Answers client greetings and forwards everything else upstream.
    Entry,
    /// Parses destination requests and dials targets.
    Terminal,
    /// Both roles in one process.
    Standalone,
}

impl fmt::Display for HopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HopMode::Entry => "entry",
            HopMode::Terminal => "terminal",
            HopMode::Standalone => "standalone",
        };
        f.write_str(name)
    }
}

/// Runtime configuration of one hop.
#[derive(Debug, Clone)]
pub struct HopConfig {
    /// Role of this hop
    pub mode: HopMode,
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub listen_port: u16,
    /// Next hop (`host:port`), entry mode only
    pub upstream_addr: Option<String>,
    /// Upper bound on every outbound connect
    pub connect_timeout: Duration,
    /// Upper bound on reading the greeting or the request
    pub handshake_timeout: Duration,
    /// Dial before replying and report dial failures with a reply code
    pub strict_reply: bool,
    /// Set TCP_NODELAY on accepted and dialed sockets
    pub nodelay: bool,
}

impl HopConfig {
    fn with_defaults(mode: HopMode, listen_addr: String, listen_port: u16) -> Self {
        Self {
            mode,
            listen_addr,
            listen_port,
            upstream_addr: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            strict_reply: false,
            nodelay: true,
        }
    }

    /// Entry hop forwarding to `upstream_addr`.
    pub fn entry(
        listen_addr: impl Into<String>,
        listen_port: u16,
        upstream_addr: impl Into<String>,
    ) -> Self {
        Self {
            upstream_addr: Some(upstream_addr.into()),
            ..Self::with_defaults(HopMode::Entry, listen_addr.into(), listen_port)
        }
    }

    /// Terminal hop.
    pub fn terminal(listen_addr: impl Into<String>, listen_port: u16) -> Self {
        Self::with_defaults(HopMode::Terminal, listen_addr.into(), listen_port)
    }

    /// Single-process proxy.
    pub fn standalone(listen_addr: impl Into<String>, listen_port: u16) -> Self {
        Self::with_defaults(HopMode::Standalone, listen_addr.into(), listen_port)
    }

    /// Default configuration for `mode`.
    pub fn default_for(mode: HopMode) -> Self {
        match mode {
            HopMode::Entry => Self::entry(
                "0.0.0.0",
                DEFAULT_ENTRY_PORT,
                format!("127.0.0.1:{}", DEFAULT_TERMINAL_PORT),
            ),
            HopMode::Terminal => Self::terminal("0.0.0.0", DEFAULT_TERMINAL_PORT),
            HopMode::Standalone => Self::standalone("0.0.0.0", DEFAULT_ENTRY_PORT),
        }
    }

    /// `listen_addr:listen_port`.
    pub fn listen_endpoint(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            return Err(Error::config("listen_addr cannot be empty"));
        }
        match (self.mode, &self.upstream_addr) {
            (HopMode::Entry, None) => {
                return Err(Error::config("entry hop requires upstream_addr"));
            }
            (HopMode::Entry, Some(upstream)) => {
                parse_endpoint(upstream)?;
            }
            (_, Some(_)) => {
                return Err(Error::config(format!(
                    "upstream_addr is only used by the entry hop, not {}",
                    self.mode
                )));
            }
            (_, None) => {}
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be positive"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::config("handshake_timeout must be positive"));
        }
        if self.strict_reply && self.mode == HopMode::Entry {
            return Err(Error::config("strict_reply has no effect on the entry hop"));
        }
        Ok(())
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts.
pub fn parse_endpoint(endpoint: &str) -> Result<(String, u16)> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| Error::config(format!("missing port in {:?}", endpoint)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(Error::config(format!("missing host in {:?}", endpoint)));
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| Error::config(format!("invalid port in {:?}: {}", endpoint, e)))?;
    Ok((host.to_string(), port))
}

/// Configuration file format for serialization.
#[derive(Debug, Serialize, Deserialize)]
pub struct HopConfigFile {
    /// Role of this hop
    pub mode: HopMode,
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub listen_port: u16,
    /// Next hop, entry mode only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_addr: Option<String>,
    /// Dial timeout (seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Handshake timeout (seconds)
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Dial before replying
    #[serde(default)]
    pub strict_reply: bool,
    /// TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_handshake_timeout_secs() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_SECS
}

fn default_nodelay() -> bool {
    true
}

impl HopConfigFile {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Convert to runtime configuration.
    pub fn to_config(&self) -> Result<HopConfig> {
        let config = HopConfig {
            mode: self.mode,
            listen_addr: self.listen_addr.clone(),
            listen_port: self.listen_port,
            upstream_addr: self.upstream_addr.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            strict_reply: self.strict_reply,
            nodelay: self.nodelay,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create from runtime configuration.
    pub fn from_config(config: &HopConfig) -> Self {
        Self {
            mode: config.mode,
            listen_addr: config.listen_addr.clone(),
            listen_port: config.listen_port,
            upstream_addr: config.upstream_addr.clone(),
            connect_timeout_secs: config.connect_timeout.as_secs(),
            handshake_timeout_secs: config.handshake_timeout.as_secs(),
            strict_reply: config.strict_reply,
            nodelay: config.nodelay,
        }
    }
}
