//! Decide whether to start charging from the vehicle's state
//!
//! [`decide`] is pure; [`AutostartService`] wires it to the vehicle
//! status source and the charging backend.

use crate::config::ChargingStationConfig;
use crate::ekz::StartChargeOutcome;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::scheduler::AutostartAction;
use crate::vehicle::{VehicleClient, VehicleStatus};
use geo::{HaversineDistance, Point};
use std::fmt;
use std::sync::Arc;

/// Radius around the station within which the car counts as parked there
pub const GEOFENCE_RADIUS_METERS: f64 = 100.0;

pub const DEFAULT_MAXIMUM_CHARGE: u8 = 90;

/// Something that can start a charging session
#[async_trait::async_trait]
pub trait ChargingBackend: Send + Sync {
    async fn start_charge(&self, box_id: &str, connector_id: u32) -> Result<StartChargeOutcome>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutostartDecision {
    AlreadyCharging,
    NotPluggedIn,
    BatteryFull { level: u8, maximum: u8 },
    TooFar { distance_m: f64 },
    Start { distance_m: f64 },
}

impl AutostartDecision {
    pub fn should_start(&self) -> bool {
        matches!(self, Self::Start { .. })
    }
}

impl fmt::Display for AutostartDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyCharging => write!(f, "car is already charging"),
            Self::NotPluggedIn => write!(f, "car is not plugged in"),
            Self::BatteryFull { level, maximum } => {
                write!(f, "battery at {}% (maximum {}%)", level, maximum)
            }
            Self::TooFar { distance_m } => {
                write!(f, "car is {:.0} m away from the charging station", distance_m)
            }
            Self::Start { distance_m } => {
                write!(f, "all conditions met ({:.0} m from the station)", distance_m)
            }
        }
    }
}

/// Great-circle distance between the station and the car in meters
pub fn distance_to_station(station: &ChargingStationConfig, status: &VehicleStatus) -> f64 {
    let station = Point::new(station.longitude, station.latitude);
    let car = Point::new(status.longitude, status.latitude);
    station.haversine_distance(&car)
}

pub fn decide(
    status: &VehicleStatus,
    station: &ChargingStationConfig,
    maximum_charge: u8,
) -> AutostartDecision {
    if status.state.is_charging() {
        return AutostartDecision::AlreadyCharging;
    }
    if !status.plugged_in {
        return AutostartDecision::NotPluggedIn;
    }
    if status.battery_level >= maximum_charge {
        return AutostartDecision::BatteryFull {
            level: status.battery_level,
            maximum: maximum_charge,
        };
    }

    let distance_m = distance_to_station(station, status);
    if distance_m > GEOFENCE_RADIUS_METERS {
        return AutostartDecision::TooFar { distance_m };
    }
    AutostartDecision::Start { distance_m }
}

/// Fetches the car status and starts charging when [`decide`] says so
pub struct AutostartService {
    vehicle: Arc<dyn VehicleClient>,
    backend: Arc<dyn ChargingBackend>,
    station: ChargingStationConfig,
    car_id: u32,
    maximum_charge: u8,
    logger: StructuredLogger,
}

impl AutostartService {
    pub fn new(
        vehicle: Arc<dyn VehicleClient>,
        backend: Arc<dyn ChargingBackend>,
        station: ChargingStationConfig,
        car_id: u32,
        maximum_charge: u8,
    ) -> Self {
        let logger = get_logger("autostart")
            .with_field("car_id", car_id)
            .with_field("box_id", &station.box_id);
        Self {
            vehicle,
            backend,
            station,
            car_id,
            maximum_charge,
            logger,
        }
    }

    /// One autostart check; skips are `Ok`, backend failures are errors
    pub async fn try_autostart(&self) -> Result<AutostartDecision> {
        self.logger.debug(&format!(
            "Checking autostart conditions (maximum charge {}%)",
            self.maximum_charge
        ));

        let status = self.vehicle.fetch_status(self.car_id).await?;
        let decision = decide(&status, &self.station, self.maximum_charge);

        match &decision {
            AutostartDecision::Start { .. } => {
                self.logger.info(&format!("Starting charge: {}", decision));
                match self
                    .backend
                    .start_charge(&self.station.box_id, self.station.connector_id)
                    .await?
                {
                    StartChargeOutcome::AlreadyCharging(_) => {
                        self.logger.info("Charging station already has an active session")
                    }
                    StartChargeOutcome::Started(live) => self
                        .logger
                        .info(&format!("Charging started at {:.2} kW", live.power)),
                }
            }
            AutostartDecision::AlreadyCharging | AutostartDecision::BatteryFull { .. } => {
                self.logger.info(&format!("Skipping: {}", decision))
            }
            AutostartDecision::NotPluggedIn | AutostartDecision::TooFar { .. } => {
                self.logger.warn(&format!("Skipping: {}", decision))
            }
        }
        Ok(decision)
    }
}

#[async_trait::async_trait]
impl AutostartAction for AutostartService {
    async fn run(&self) -> Result<()> {
        self.try_autostart().await.map(|_| ())
    }
}
