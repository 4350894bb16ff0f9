//! Configuration management for ekz-tesla
//!
//! This module handles loading, validation, and persistence of the YAML
//! configuration file. Environment variables and command line flags are
//! folded in through [`ConfigOverrides`] with the precedence
//! flag > env > file (clap resolves flag vs. env before we see the value).

use crate::error::{EkzError, Result};
use crate::logging::get_logger;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default EKZ e-mobility backend
pub const DEFAULT_BACKEND_URL: &str = "https://be.emob.ekz.ch";

/// Directory name below the XDG config home
pub const CONFIG_DIR_NAME: &str = "ekz-tesla";

/// File name of the configuration inside [`CONFIG_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// EKZ account e-mail
    pub username: String,

    /// EKZ account password
    pub password: String,

    /// Cached bearer token from the last successful login
    pub token: String,

    /// Physical charging station used for start/stop and the geofence
    pub charging_station: ChargingStationConfig,

    /// Base URL of the EKZ backend
    pub backend_url: String,

    /// IANA time zone used to evaluate tariff windows (system zone if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Charging station descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargingStationConfig {
    /// Latitude of the station in decimal degrees
    pub latitude: f64,

    /// Longitude of the station in decimal degrees
    pub longitude: f64,

    /// EKZ charge box identifier
    pub box_id: String,

    /// Connector number on the charge box
    pub connector_id: u32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional log file; its parent directory receives daily rotated files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to the console (stderr)
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: None,
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            token: String::new(),
            charging_station: ChargingStationConfig::default(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            timezone: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Values coming from flags or the environment; `None` keeps the file value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub box_id: Option<String>,
    pub connector_id: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub backend_url: Option<String>,
    pub timezone: Option<String>,
    pub log_level: Option<String>,
}

/// Username and password pair used for (re-)authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load the configuration from `path`, or the default location.
    ///
    /// A missing file is not an error: the default configuration is
    /// returned so that env variables and flags alone can drive the tool.
    /// The resolved path is returned alongside for token persistence.
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };

        if !path.exists() {
            return Ok((Config::default(), path));
        }

        let config = Self::from_file(&path)?;
        Ok((config, path))
    }

    /// Save configuration to a YAML file, creating the parent directory
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Apply flag/env overrides on top of the file values
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = &overrides.username {
            self.username = v.clone();
        }
        if let Some(v) = &overrides.password {
            self.password = v.clone();
        }
        if let Some(v) = &overrides.token {
            self.token = v.clone();
        }
        if let Some(v) = &overrides.box_id {
            self.charging_station.box_id = v.clone();
        }
        if let Some(v) = overrides.connector_id {
            self.charging_station.connector_id = v;
        }
        if let Some(v) = overrides.latitude {
            self.charging_station.latitude = v;
        }
        if let Some(v) = overrides.longitude {
            self.charging_station.longitude = v;
        }
        if let Some(v) = &overrides.backend_url {
            self.backend_url = v.clone();
        }
        if let Some(v) = &overrides.timezone {
            self.timezone = Some(v.clone());
        }
        if let Some(v) = &overrides.log_level {
            self.logging.level = v.clone();
        }
    }

    /// Credentials for login, if both parts are configured
    pub fn credentials(&self) -> Option<Credentials> {
        if self.username.is_empty() || self.password.is_empty() {
            return None;
        }
        Some(Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }

    /// Either a cached token or a username/password pair must be present
    pub fn validate_credentials(&self) -> Result<()> {
        if self.token.is_empty() && self.credentials().is_none() {
            return Err(EkzError::validation(
                "username",
                "username and password are required when no token is cached",
            ));
        }
        Ok(())
    }

    /// Validate the charging station block used by start/stop and autostart
    pub fn validate_charging_station(&self) -> Result<()> {
        let station = &self.charging_station;

        if station.latitude == 0.0 {
            return Err(EkzError::validation(
                "charging_station.latitude",
                "is not set",
            ));
        }

        if station.longitude == 0.0 {
            return Err(EkzError::validation(
                "charging_station.longitude",
                "is not set",
            ));
        }

        self.validate_target()
    }

    /// Box and connector are enough for the commands that do not use the geofence
    pub fn validate_target(&self) -> Result<()> {
        let station = &self.charging_station;

        if station.box_id.is_empty() {
            return Err(EkzError::validation(
                "charging_station.box_id",
                "is not set (use --box-id or set it in the config)",
            ));
        }

        if station.connector_id == 0 {
            return Err(EkzError::validation(
                "charging_station.connector_id",
                "is not set (use --connector-id or set it in the config)",
            ));
        }

        Ok(())
    }

    /// Parse the configured time zone
    pub fn time_zone(&self) -> Result<Option<Tz>> {
        match self.timezone.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(name) => name.parse::<Tz>().map(Some).map_err(|e| {
                EkzError::Validation {
                    field: "timezone".to_string(),
                    message: e.to_string(),
                }
            }),
        }
    }
}

/// `$XDG_CONFIG_HOME/ekz-tesla/config.yaml`, falling back to `$HOME/.config`
pub fn default_config_path() -> Result<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME")
                .filter(|v| !v.is_empty())
                .map(|home| PathBuf::from(home).join(".config"))
        })
        .ok_or_else(|| EkzError::config("neither XDG_CONFIG_HOME nor HOME is set"))?;
    Ok(base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// The file that backs a client; only the token is ever written back.
///
/// The store keeps the configuration as read from disk, so values that
/// came from flags or the environment never end up in the file.
pub struct ConfigStore {
    path: Option<PathBuf>,
    on_disk: Mutex<Config>,
    logger: crate::logging::StructuredLogger,
}

impl ConfigStore {
    /// Store backed by `path`, with `on_disk` being the unmodified file content
    pub fn new(path: PathBuf, on_disk: Config) -> Self {
        Self {
            path: Some(path),
            on_disk: Mutex::new(on_disk),
            logger: get_logger("config"),
        }
    }

    /// Store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            path: None,
            on_disk: Mutex::new(Config::default()),
            logger: get_logger("config"),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a fresh token and write the file, if there is one
    pub fn persist_token(&self, token: &str) -> Result<()> {
        let mut guard = self
            .on_disk
            .lock()
            .map_err(|_| EkzError::config("config store lock poisoned"))?;
        guard.token = token.to_string();

        let Some(path) = &self.path else {
            return Ok(());
        };
        guard.save_to_file(path)?;
        self.logger
            .debug(&format!("Saved token to {}", path.display()));
        Ok(())
    }
}
