use crate::admission::AdmissionConfig;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// User entry for the bundled PAP handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
}

/// One configured NAS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NasEntry {
    /// NAS IP address or network (supports CIDR notation)
    pub address: String,
    /// Shared secret for this NAS
    pub secret: String,
    /// Optional NAS name/description
    #[serde(default)]
    pub name: Option<String>,
    /// Handler module serving this NAS
    #[serde(default = "default_handler_module")]
    pub handler: String,
    /// Worker nodes permitted to run the handler; absent pins execution to
    /// the local node
    #[serde(default)]
    pub nodes: Option<Vec<String>>,
    /// Emit per-packet trace lines for this NAS
    #[serde(default)]
    pub trace: bool,
}

fn default_handler_module() -> String {
    "default".to_string()
}

impl NasEntry {
    /// Parse the NAS address as an IP network
    pub fn parse_network(&self) -> Result<IpNetwork, ConfigError> {
        if let Ok(network) = self.address.parse::<IpNetwork>() {
            return Ok(network);
        }

        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return Ok(IpNetwork::from(ip));
        }

        Err(ConfigError::Invalid(format!(
            "Invalid NAS address: {}",
            self.address
        )))
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Server listen port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// How long a sent reply is retained for retransmission, in milliseconds
    #[serde(default = "default_resend_timeout_ms")]
    pub resend_timeout_ms: u64,

    /// Admission queue configuration
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Registered NASes
    #[serde(default)]
    pub nases: Vec<NasEntry>,

    /// Users for the bundled PAP handler
    #[serde(default)]
    pub users: Vec<User>,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Request log file path (JSON lines, optional)
    #[serde(default)]
    pub request_log_path: Option<String>,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    1812 // Standard RADIUS authentication port
}

fn default_resend_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            resend_timeout_ms: default_resend_timeout_ms(),
            admission: AdmissionConfig::default(),
            nases: vec![],
            users: vec![],
            log_level: None,
            request_log_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .listen_address
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid listen address: {}", self.listen_address)))?;
        Ok(SocketAddr::new(ip, self.listen_port))
    }

    /// Reply retention duration
    pub fn resend_timeout(&self) -> Duration {
        Duration::from_millis(self.resend_timeout_ms)
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.resend_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "resend_timeout_ms must be greater than zero".to_string(),
            ));
        }

        for nas in &self.nases {
            nas.parse_network()?;
            if nas.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "NAS {} has an empty shared secret",
                    nas.address
                )));
            }
            if let Some(ref nodes) = nas.nodes {
                if nodes.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "NAS {} lists an empty node set; omit the field to run locally",
                        nas.address
                    )));
                }
            }
        }

        if let Some(ref level) = self.log_level {
            match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => {}
                other => {
                    return Err(ConfigError::Invalid(format!("Unknown log level: {}", other)));
                }
            }
        }

        Ok(())
    }

    /// Example configuration written on first start
    pub fn example() -> Self {
        Config {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 1812,
            resend_timeout_ms: 5000,
            admission: AdmissionConfig::default(),
            nases: vec![NasEntry {
                address: "192.168.1.0/24".to_string(),
                secret: "testing123".to_string(),
                name: Some("lab switches".to_string()),
                handler: "default".to_string(),
                nodes: None,
                trace: false,
            }],
            users: vec![User {
                username: "alice".to_string(),
                password: "changeme".to_string(),
            }],
            log_level: Some("info".to_string()),
            request_log_path: None,
        }
    }
}
