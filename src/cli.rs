//! Command line interface
//!
//! Every flag can also be given through an environment variable; clap
//! resolves flag over env, and [`GlobalArgs::overrides`] hands the result
//! to the config layer where it wins over the file.

use crate::autostart::DEFAULT_MAXIMUM_CHARGE;
use crate::config::ConfigOverrides;
use crate::scheduler::DEFAULT_CRON;
use crate::tariff::TimeRange;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ekz-tesla", author, version = env!("APP_VERSION"), about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[clap(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Default, ClapArgs)]
pub struct GlobalArgs {
    /// Configuration file [default: $XDG_CONFIG_HOME/ekz-tesla/config.yaml]
    #[clap(long, global = true, env = "EKZ_CONFIG")]
    pub config: Option<PathBuf>,

    /// TRACE, DEBUG, INFO, WARN or ERROR
    #[clap(long, global = true, env = "EKZ_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// EKZ account e-mail
    #[clap(long, global = true, env = "EKZ_USERNAME")]
    pub username: Option<String>,

    #[clap(long, global = true, env = "EKZ_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Use this token instead of the cached one
    #[clap(long, global = true, env = "EKZ_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[clap(long, global = true, env = "EKZ_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// IANA time zone for tariff windows, e.g. Europe/Zurich
    #[clap(long, global = true, env = "EKZ_TIMEZONE")]
    pub timezone: Option<String>,

    #[clap(flatten)]
    pub station: StationArgs,
}

#[derive(Debug, Clone, Default, ClapArgs)]
pub struct StationArgs {
    /// Charge box identifier
    #[clap(long, global = true, env = "EKZ_BOX_ID")]
    pub box_id: Option<String>,

    #[clap(long, global = true, env = "EKZ_CONNECTOR_ID")]
    pub connector_id: Option<u32>,

    /// Station latitude, center of the geofence
    #[clap(long, global = true, env = "EKZ_LATITUDE", allow_negative_numbers = true)]
    pub latitude: Option<f64>,

    #[clap(long, global = true, env = "EKZ_LONGITUDE", allow_negative_numbers = true)]
    pub longitude: Option<f64>,
}

impl GlobalArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            username: self.username.clone(),
            password: self.password.clone(),
            token: self.token.clone(),
            box_id: self.station.box_id.clone(),
            connector_id: self.station.connector_id,
            latitude: self.station.latitude,
            longitude: self.station.longitude,
            backend_url: self.backend_url.clone(),
            timezone: self.timezone.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start charging on the configured connector
    #[clap(name = "start")]
    Start,

    /// Stop charging on the configured connector
    #[clap(name = "stop")]
    Stop,

    /// List the charging stations of the account
    #[clap(name = "list")]
    List,

    /// Show live charging data with a power trend
    #[clap(name = "live-data")]
    LiveData(LiveDataArgs),

    /// Start charging automatically when the car is parked and plugged in
    #[clap(name = "autostart")]
    Autostart(Box<AutostartArgs>),

    /// Print version information
    #[clap(name = "version")]
    Version,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct LiveDataArgs {
    /// Fetch once and exit
    #[clap(long)]
    pub once: bool,

    /// Seconds between updates
    #[clap(long, default_value_t = 5, env = "EKZ_LIVE_DATA_INTERVAL")]
    pub interval: u64,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct AutostartArgs {
    #[clap(flatten)]
    pub vehicle: VehicleArgs,

    #[command(subcommand)]
    pub mode: AutostartMode,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct VehicleArgs {
    /// TeslaMate car id
    #[clap(long, global = true, env = "TESLAMATE_CAR_ID")]
    pub car_id: Option<u32>,

    /// Base URL of the TeslaMate API
    #[clap(long, global = true, env = "TESLAMATE_API_URL")]
    pub teslamate_api_url: Option<String>,

    /// Do not start charging at or above this battery level (percent)
    #[clap(
        long,
        global = true,
        env = "EKZ_MAXIMUM_CHARGE",
        default_value_t = DEFAULT_MAXIMUM_CHARGE,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    pub maximum_charge: u8,
}

#[derive(Debug, Clone, Subcommand)]
pub enum AutostartMode {
    /// Check the conditions once and exit
    #[clap(name = "once")]
    Once,

    /// Check on a cron schedule
    #[clap(name = "scheduled")]
    Scheduled {
        /// 5-field crontab or 6/7-field expression with seconds
        #[clap(long, default_value = DEFAULT_CRON, env = "EKZ_CRON")]
        cron: String,
    },

    /// Check periodically, but only outside high-tariff windows
    #[clap(name = "smart")]
    Smart {
        /// High-tariff window `HH:MM-HH:MM[:Day,...]`; repeat or separate with `;`
        #[clap(
            long = "high-tariff-time",
            alias = "high-tariff-times",
            env = "EKZ_HIGH_TARIFF_TIMES",
            value_delimiter = ';',
            value_parser = parse_time_range
        )]
        high_tariff_times: Vec<TimeRange>,

        /// Seconds between tariff checks
        #[clap(long, default_value_t = 300, env = "EKZ_CHECK_INTERVAL")]
        check_interval: u64,
    },
}

fn parse_time_range(s: &str) -> Result<TimeRange, String> {
    s.parse::<TimeRange>().map_err(|e| e.to_string())
}
