//! Environment-backed configuration.
//!
//! Every deployment-specific value comes from the process environment and is
//! validated once at startup; a missing required variable is fatal before
//! any subsystem starts.

use crate::{AppError, AppResult};

use std::env;
use std::panic::Location;
use std::path::PathBuf;

use error_location::ErrorLocation;
use tracing::info;

use super::{DEFAULT_DATA_DIR, DEFAULT_LOG_DIR, DEFAULT_RETENTION_DAYS};

/// Validated process configuration, loaded once and passed explicitly.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Base URL of the remote document store.
    pub remote_url: String,
    /// Remote store user.
    pub remote_username: String,
    /// Remote store password.
    pub remote_password: String,
    /// Shared remote database holding the device status documents.
    pub device_status_db: String,
    /// Local MySQL host.
    pub mysql_host: String,
    /// Local MySQL port.
    pub mysql_port: u16,
    /// Local MySQL user.
    pub mysql_user: String,
    /// Local MySQL password.
    pub mysql_password: String,
    /// Device serial number; also names the remote data database.
    pub serial_number: String,
    /// Row retention in days for every local table.
    pub retention_days: u32,
    /// Base directory for construct and staged audio.
    pub data_dir: PathBuf,
    /// Directory for rotated log files.
    pub log_dir: PathBuf,
}

impl EnvConfig {
    /// Loads and validates the environment. Collects every missing required
    /// variable into one error so a misconfigured unit reports everything
    /// at once.
    #[track_caller]
    pub fn load() -> AppResult<Self> {
        let mut missing = Vec::new();

        let mut required = |name: &'static str| -> String {
            match env::var(name) {
                Ok(value) if !value.is_empty() => value,
                _ => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let remote_url = required("REMOTE_URL");
        let remote_username = required("REMOTE_USERNAME");
        let remote_password = required("REMOTE_PASSWORD");
        let device_status_db = required("DEVICE_STATUS_DB");
        let mysql_host = required("MYSQL_HOST");
        let mysql_port = required("MYSQL_PORT");
        let mysql_user = required("MYSQL_USER");
        let mysql_password = required("MYSQL_PASSWORD");
        let serial_number = required("SERIAL_NUMBER");

        if !missing.is_empty() {
            return Err(AppError::ConfigError {
                reason: format!("missing required environment variables: {}", missing.join(", ")),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let mysql_port: u16 = mysql_port.parse().map_err(|_| AppError::ConfigError {
            reason: format!("MYSQL_PORT is not a valid port: {mysql_port}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let retention_days = match env::var("DATA_RETENTION_DAYS") {
            Ok(value) => value.parse().map_err(|_| AppError::ConfigError {
                reason: format!("DATA_RETENTION_DAYS is not a number: {value}"),
                location: ErrorLocation::from(Location::caller()),
            })?,
            Err(_) => DEFAULT_RETENTION_DAYS,
        };

        let data_dir =
            PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string()));
        let log_dir =
            PathBuf::from(env::var("LOG_DIR").unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string()));

        info!(retention_days, "Configuration validated successfully");

        Ok(Self {
            remote_url,
            remote_username,
            remote_password,
            device_status_db,
            mysql_host,
            mysql_port,
            mysql_user,
            mysql_password,
            serial_number,
            retention_days,
            data_dir,
            log_dir,
        })
    }

    /// MySQL connection URL for the pool.
    pub fn mysql_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}",
            self.mysql_user, self.mysql_password, self.mysql_host, self.mysql_port
        )
    }

    /// Directory holding in-progress WAV files.
    pub fn construct_dir(&self) -> PathBuf {
        self.data_dir.join("construct_audio")
    }

    /// Directory holding transcoded files ready for upload.
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }
}
