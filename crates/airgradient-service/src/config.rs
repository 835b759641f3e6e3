//! Service configuration.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener settings.
    pub server: ServerConfig,
    /// Backup file settings.
    pub backup: BackupConfig,
    /// Access gate settings.
    pub security: SecurityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Bind addresses are in host:port format with a non-zero port
    /// - Timeouts and the staleness bound are positive
    /// - The backup path is not empty
    /// - Hashed credentials decode to SHA-256 digests when Basic auth is enabled
    ///
    /// # Example
    ///
    /// ```
    /// use airgradient_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.backup.validate());
        errors.extend(self.security.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Public bind address, serving ingest and metrics (e.g., "0.0.0.0:12321").
    pub bind: String,
    /// Internal bind address serving `/metrics` only, never behind the access gate.
    pub internal_bind: Option<String>,
    /// Deadline for reading a request body, in seconds.
    pub read_timeout_secs: u64,
    /// Deadline for producing a response, in seconds.
    pub write_timeout_secs: u64,
}

/// Default request read/write deadline in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:12321".to_string(),
            internal_bind: None,
            read_timeout_secs: DEFAULT_TIMEOUT_SECS,
            write_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        errors.extend(validate_bind("server.bind", &self.bind));
        if let Some(internal) = &self.internal_bind {
            errors.extend(validate_bind("server.internal_bind", internal));
            if *internal == self.bind {
                errors.push(ValidationError {
                    field: "server.internal_bind".to_string(),
                    message: format!("internal bind address '{}' equals server.bind", internal),
                });
            }
        }

        if self.read_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "server.read_timeout_secs".to_string(),
                message: "read timeout must be at least 1 second".to_string(),
            });
        }
        if self.write_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "server.write_timeout_secs".to_string(),
                message: "write timeout must be at least 1 second".to_string(),
            });
        }

        errors
    }
}

fn validate_bind(field: &str, bind: &str) -> Option<ValidationError> {
    if bind.is_empty() {
        return Some(ValidationError {
            field: field.to_string(),
            message: "bind address cannot be empty".to_string(),
        });
    }

    let Some((_, port_str)) = bind.rsplit_once(':') else {
        return Some(ValidationError {
            field: field.to_string(),
            message: format!("invalid bind address '{}': expected format 'host:port'", bind),
        });
    };

    match port_str.parse::<u16>() {
        Ok(0) => Some(ValidationError {
            field: field.to_string(),
            message: "port cannot be 0".to_string(),
        }),
        Err(_) => Some(ValidationError {
            field: field.to_string(),
            message: format!("invalid port '{}': must be a number 1-65535", port_str),
        }),
        Ok(_) => None,
    }
}

/// Backup file configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Path of the last-reading backup file.
    pub path: PathBuf,
    /// Maximum age in seconds of a backup still restored on a cold start.
    pub max_time_delta: i64,
}

/// Default staleness bound for cold-start restore, in seconds.
pub const DEFAULT_MAX_TIME_DELTA: i64 = 60;

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: default_backup_path(),
            max_time_delta: DEFAULT_MAX_TIME_DELTA,
        }
    }
}

impl BackupConfig {
    /// Validate backup configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "backup.path".to_string(),
                message: "backup path cannot be empty".to_string(),
            });
        }

        if self.max_time_delta <= 0 {
            errors.push(ValidationError {
                field: "backup.max_time_delta".to_string(),
                message: format!(
                    "max time delta {} must be a positive number of seconds",
                    self.max_time_delta
                ),
            });
        }

        errors
    }
}

/// Access gate configuration.
///
/// Credentials are never stored in clear text: each is the base64 encoding of
/// the SHA-256 digest of the username or password, e.g.
/// `printf '%s' admin | sha256sum | xxd -r -p | base64`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Require HTTP Basic authentication on the public listener.
    pub basic_auth_enabled: bool,
    /// base64(sha256(username)).
    pub basic_auth_username_hashed: String,
    /// base64(sha256(password)).
    pub basic_auth_password_hashed: String,
}

impl SecurityConfig {
    /// Validate security configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        if !self.basic_auth_enabled {
            return Vec::new();
        }

        [
            (
                "security.basic_auth_username_hashed",
                &self.basic_auth_username_hashed,
            ),
            (
                "security.basic_auth_password_hashed",
                &self.basic_auth_password_hashed,
            ),
        ]
        .into_iter()
        .filter_map(|(field, value)| decode_digest(field, value).err())
        .collect()
    }

    /// Decode the expected username and password digests.
    ///
    /// Returns `Ok(None)` when Basic auth is disabled.
    pub fn decoded_credentials(
        &self,
    ) -> Result<Option<([u8; DIGEST_LEN], [u8; DIGEST_LEN])>, ConfigError> {
        if !self.basic_auth_enabled {
            return Ok(None);
        }
        let username = decode_digest(
            "security.basic_auth_username_hashed",
            &self.basic_auth_username_hashed,
        );
        let password = decode_digest(
            "security.basic_auth_password_hashed",
            &self.basic_auth_password_hashed,
        );
        match (username, password) {
            (Ok(username), Ok(password)) => Ok(Some((username, password))),
            (username, password) => Err(ConfigError::Validation(
                [username.err(), password.err()].into_iter().flatten().collect(),
            )),
        }
    }
}

fn decode_digest(field: &str, encoded: &str) -> Result<[u8; DIGEST_LEN], ValidationError> {
    let invalid = |message: String| ValidationError {
        field: field.to_string(),
        message,
    };

    if encoded.is_empty() {
        return Err(invalid(
            "hashed credential is required when basic auth is enabled".to_string(),
        ));
    }

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| invalid(format!("invalid base64: {}", e)))?;

    <[u8; DIGEST_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        invalid(format!(
            "decoded digest is {} bytes, expected {} (SHA-256)",
            bytes.len(),
            DIGEST_LEN
        ))
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `backup.path`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airgradient")
        .join("bridge.toml")
}

/// Default backup file path.
pub fn default_backup_path() -> PathBuf {
    std::env::temp_dir().join("airgradient.json")
}
