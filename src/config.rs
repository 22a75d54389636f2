//! Reader configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via RSCP_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by `main`)

use rscp_client::{ConnectionConfig, Credentials, SessionOptions};
use rscp_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "RSCP_CONFIG";

/// Reader configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Power station address and timeouts.
    pub device: DeviceConfig,
    /// Portal and AES credentials.
    pub credentials: CredentialsConfig,
    /// Request loop settings.
    pub session: SessionConfig,
}

impl Config {
    /// Loads the config file (explicit path, else `RSCP_CONFIG`), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let config = Self::from_file(&path)?;
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `RSCP_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.device.apply_overrides(&lookup);
        self.credentials.apply_overrides(&lookup);
        self.session.apply_overrides(&lookup);
    }

    /// Checks that everything needed to talk to the device is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.user.is_none()
            || self.credentials.password.is_none()
            || self.credentials.aes_password.is_none()
        {
            return Err(ConfigError::ValidationError(
                "user name, password and aes key must be given".to_string(),
            ));
        }
        if self.device.host.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::ValidationError(
                "no S10 address given".to_string(),
            ));
        }
        if self.device.port == 0 {
            return Err(ConfigError::ValidationError(
                "port number out of range".to_string(),
            ));
        }
        if self.session.max_cycles == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_cycles must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Connection settings for the transport.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let host = self
            .device
            .host
            .as_deref()
            .ok_or_else(|| ConfigError::ValidationError("no S10 address given".to_string()))?;

        Ok(ConnectionConfig::new(host)
            .with_port(self.device.port)
            .with_connect_timeout(Duration::from_secs(self.device.connect_timeout_secs))
            .with_read_timeout(Duration::from_secs(self.device.read_timeout_secs))
            .with_write_timeout(Duration::from_secs(self.device.write_timeout_secs))
            .with_read_buffer_size(self.device.read_buffer_size))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::default()
            .with_crc(self.session.with_crc)
            .with_max_cycles(self.session.max_cycles)
            .with_cycle_interval(Duration::from_millis(self.session.cycle_interval_ms))
            .with_read_buffer_size(self.device.read_buffer_size)
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        match (&self.credentials.user, &self.credentials.password) {
            (Some(user), Some(password)) => Ok(Credentials::new(user, password)),
            _ => Err(ConfigError::ValidationError(
                "user name and password must be given".to_string(),
            )),
        }
    }

    pub fn aes_password(&self) -> Result<&str, ConfigError> {
        self.credentials
            .aes_password
            .as_deref()
            .ok_or_else(|| ConfigError::ValidationError("aes key must be given".to_string()))
    }
}

/// Power station connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Host name or IP address of the power station.
    pub host: Option<String>,
    /// RSCP service port.
    pub port: u16,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Write timeout in seconds.
    pub write_timeout_secs: u64,
    /// Socket read chunk size in bytes.
    pub read_buffer_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            write_timeout_secs: 10,
            read_buffer_size: rscp_client::connection::DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl DeviceConfig {
    fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("RSCP_HOST") {
            if !host.is_empty() {
                self.host = Some(host);
            }
        }

        if let Some(port) = lookup("RSCP_PORT") {
            if let Ok(p) = port.parse() {
                self.port = p;
            }
        }

        if let Some(timeout) = lookup("RSCP_READ_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.read_timeout_secs = secs;
            }
        }
    }
}

/// Credentials. Passwords are never printed.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Portal user name.
    pub user: Option<String>,
    /// Portal password.
    pub password: Option<String>,
    /// RSCP password configured on the device, used as AES key.
    pub aes_password: Option<String>,
}

impl CredentialsConfig {
    fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup("RSCP_USER") {
            self.user = Some(user);
        }
        if let Some(password) = lookup("RSCP_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(aes) = lookup("RSCP_AES_PASSWORD") {
            self.aes_password = Some(aes);
        }
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hidden = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("CredentialsConfig")
            .field("user", &self.user)
            .field("password", &hidden(&self.password))
            .field("aes_password", &hidden(&self.aes_password))
            .finish()
    }
}

/// Request loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Round trips per run, authentication included.
    pub max_cycles: usize,
    /// Pause between round trips in milliseconds.
    pub cycle_interval_ms: u64,
    /// Append CRC-32 to requests.
    pub with_crc: bool,
    /// Also request battery data for this battery index.
    pub battery_index: Option<u8>,
    /// Block cipher of the encrypted stream.
    pub cipher: CipherKind,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_cycles: 2,
            cycle_interval_ms: 1000,
            with_crc: true,
            battery_index: None,
            cipher: CipherKind::default(),
        }
    }
}

impl SessionConfig {
    fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(cipher) = lookup("RSCP_CIPHER") {
            match cipher.parse() {
                Ok(kind) => self.cipher = kind,
                Err(e) => tracing::warn!("Ignoring RSCP_CIPHER: {}", e),
            }
        }
    }
}

/// Block cipher used on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherKind {
    /// Rijndael with 32 byte blocks, as spoken by the S10.
    #[default]
    Rijndael256,
    /// AES-256 with 16 byte blocks.
    Aes256,
}

impl FromStr for CipherKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rijndael256" => Ok(CipherKind::Rijndael256),
            "aes256" => Ok(CipherKind::Aes256),
            other => Err(ConfigError::ValidationError(format!(
                "unknown cipher '{}', expected rijndael256 or aes256",
                other
            ))),
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
