//! # ekz-tesla
//!
//! Starts and stops charging sessions on an EKZ charging station and
//! decides on its own when to charge a car tracked by TeslaMate.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration, flag/env overrides and token persistence
//! - `logging`: Structured logging and tracing
//! - `http`: Buffered request/response seam shared by the API clients
//! - `ekz`: EKZ backend client with reactive token refresh
//! - `vehicle`: TeslaMate vehicle status client
//! - `tariff`: High-tariff windows and the low-tariff search
//! - `autostart`: Charging decision from vehicle state and geofence
//! - `scheduler`: Tariff-gated interval loop and cron loop
//! - `render`: Tables and power sparkline for the terminal
//! - `cli` / `commands`: Command line surface

pub mod autostart;
pub mod cli;
pub mod commands;
pub mod config;
pub mod ekz;
pub mod error;
pub mod http;
pub mod logging;
pub mod render;
pub mod scheduler;
pub mod tariff;
pub mod vehicle;

// Re-export commonly used types
pub use config::Config;
pub use ekz::EkzClient;
pub use error::{EkzError, Result};
