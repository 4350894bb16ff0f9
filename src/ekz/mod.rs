//! EKZ e-mobility backend integration
//!
//! Login, station listing, live telemetry and remote start/stop, with
//! transparent token refresh when the backend answers 401.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{AuthenticatedSender, RefreshPolicy, Session, TokenRefresher, TokenStore};
pub use client::{EkzClient, LoginRefresher, StartChargeOutcome, StartChargePolling};
pub use types::{ChargeBox, ChargingStation, ConnectorStatus, LiveData, RemoteOpResult};
