//! Host side of lineup: configuration and a SQLite-backed host.
//!
//! The `lineup` binary is a thin clap front end over [`Host`].

pub mod config;
pub mod host;

pub use config::{ConfigError, LineupConfig};
pub use host::{HealthReport, Host, HostError, parse_scope};
