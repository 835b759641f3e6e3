//! HTTP bridge exposing AirGradient sensor readings as Prometheus metrics.
//!
//! This crate provides a service that:
//! - Accepts readings posted by AirGradient DIY monitors
//! - Replaces failed PM2.5/CO2 measurements with the last good value
//! - Keeps the most recent reading in memory and in a backup file
//! - Exposes that reading in the Prometheus text format
//! - Optional HTTP Basic authentication on the public listener
//!
//! # Endpoints
//!
//! - `POST /sensors/{id}/measures` - Ingest a reading (`id` is `airgradient:<serial>`)
//! - `GET /metrics` - Current reading in Prometheus text format
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/airgradient/bridge.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:12321"
//! internal_bind = "127.0.0.1:12322"  # /metrics only, no auth
//!
//! [backup]
//! path = "/var/lib/airgradient/last.json"
//! max_time_delta = 60  # seconds a backup stays eligible for restore
//! ```
//!
//! # Security
//!
//! ```toml
//! [security]
//! basic_auth_enabled = true
//! basic_auth_username_hashed = "jGl25bVBBBW96Qi9Te4V37Fnqchz/Eu4qB9vKrRIqRg="  # base64(sha256)
//! basic_auth_password_hashed = "K7gNU3sdo+OL0wNhqoVWhr3g6s1xYv72ol/pe/Unols="
//! ```

pub mod api;
pub mod backup;
pub mod cache;
pub mod config;
pub mod exposition;
pub mod middleware;
pub mod server;
pub mod state;

pub use backup::{BackupError, BackupStore};
pub use cache::LastValueCache;
pub use config::{BackupConfig, Config, ConfigError, SecurityConfig, ServerConfig};
pub use middleware::BasicAuth;
pub use state::{AppState, Ingested};
