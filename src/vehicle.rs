//! Vehicle status from the TeslaMate API
//!
//! Only the fields the autostart decision needs are modelled strictly;
//! everything is optional on the wire and defaults when absent.

use crate::error::{EkzError, Result};
use crate::http::{HttpRequest, HttpSender, ReqwestSender};
use crate::logging::{StructuredLogger, get_logger};
use serde::Deserialize;
use std::sync::Arc;

/// Car state as reported by TeslaMate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleState {
    Charging,
    Online,
    Asleep,
    Offline,
    Driving,
    Other(String),
}

impl VehicleState {
    pub fn parse(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "charging" => Self::Charging,
            "online" => Self::Online,
            "asleep" => Self::Asleep,
            "offline" => Self::Offline,
            "driving" => Self::Driving,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_charging(&self) -> bool {
        matches!(self, Self::Charging)
    }
}

/// Snapshot used by the autostart decision
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleStatus {
    pub name: Option<String>,
    pub state: VehicleState,
    pub plugged_in: bool,
    /// State of charge in percent
    pub battery_level: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub geofence: Option<String>,
}

/// Vehicle status source
#[async_trait::async_trait]
pub trait VehicleClient: Send + Sync {
    async fn fetch_status(&self, car_id: u32) -> Result<VehicleStatus>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenericResponse<T> {
    data: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CarStatusResponse {
    car: CarInfo,
    status: CarStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CarInfo {
    car_id: u32,
    car_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CarStatus {
    display_name: Option<String>,
    state: Option<String>,
    odometer: Option<f64>,
    battery_details: BatteryDetails,
    charging_details: ChargingDetails,
    car_geodata: GeoData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BatteryDetails {
    battery_level: Option<f64>,
    usable_battery_level: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChargingDetails {
    plugged_in: Option<bool>,
    charge_limit_soc: Option<f64>,
    charger_power: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeoData {
    geofence: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<CarStatusResponse> for VehicleStatus {
    fn from(response: CarStatusResponse) -> Self {
        let status = response.status;
        Self {
            name: status.display_name.or(response.car.car_name),
            state: VehicleState::parse(status.state.as_deref().unwrap_or_default()),
            plugged_in: status.charging_details.plugged_in.unwrap_or(false),
            battery_level: status
                .battery_details
                .battery_level
                .unwrap_or(0.0)
                .clamp(0.0, 100.0) as u8,
            latitude: status.car_geodata.latitude.unwrap_or(0.0),
            longitude: status.car_geodata.longitude.unwrap_or(0.0),
            geofence: status.car_geodata.geofence.filter(|g| !g.is_empty()),
        }
    }
}

/// Client for `GET {base}/api/v1/cars/{id}/status`
pub struct TeslaMateClient {
    base_url: String,
    http: Arc<dyn HttpSender>,
    logger: StructuredLogger,
}

impl TeslaMateClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http: Arc<dyn HttpSender> = Arc::new(ReqwestSender::new()?);
        Self::with_transport(base_url, http)
    }

    pub fn with_transport(base_url: &str, http: Arc<dyn HttpSender>) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(EkzError::validation(
                "teslamate_api_url",
                "must start with http:// or https://",
            ));
        }
        Ok(Self {
            base_url: base_url.to_string(),
            http,
            logger: get_logger("teslamate"),
        })
    }
}

#[async_trait::async_trait]
impl VehicleClient for TeslaMateClient {
    async fn fetch_status(&self, car_id: u32) -> Result<VehicleStatus> {
        let url = format!("{}/api/v1/cars/{}/status", self.base_url, car_id);
        let response = self
            .http
            .send(HttpRequest::get(url))
            .await?
            .error_for_status()?;

        let body: GenericResponse<CarStatusResponse> = response.json()?;
        let data = body.data;
        self.logger.with_field("car_id", car_id).debug(&format!(
            "state={:?} battery={:?} plugged_in={:?} odometer={:?} usable={:?} limit={:?} power={:?}",
            data.status.state,
            data.status.battery_details.battery_level,
            data.status.charging_details.plugged_in,
            data.status.odometer,
            data.status.battery_details.usable_battery_level,
            data.status.charging_details.charge_limit_soc,
            data.status.charging_details.charger_power,
        ));
        if data.car.car_id != 0 && data.car.car_id != car_id {
            return Err(EkzError::api(format!(
                "TeslaMate returned car {} instead of {}",
                data.car.car_id, car_id
            )));
        }
        Ok(data.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_car_states() {
        assert!(VehicleState::parse("charging").is_charging());
        assert!(VehicleState::parse("Charging").is_charging());
        assert_eq!(VehicleState::parse("asleep"), VehicleState::Asleep);
        assert_eq!(
            VehicleState::parse("updating"),
            VehicleState::Other("updating".to_string())
        );
    }

    #[test]
    fn converts_wire_status() {
        let body: GenericResponse<CarStatusResponse> = serde_json::from_str(
            r#"{"data":{"car":{"car_id":1,"car_name":"Blue"},"status":{
                "display_name":"Blue","state":"online",
                "battery_details":{"battery_level":64},
                "charging_details":{"plugged_in":true,"charge_limit_soc":90},
                "car_geodata":{"geofence":"","latitude":47.3,"longitude":8.5}}}}"#,
        )
        .unwrap();
        let status = VehicleStatus::from(body.data);
        assert_eq!(status.name.as_deref(), Some("Blue"));
        assert_eq!(status.state, VehicleState::Online);
        assert!(status.plugged_in);
        assert_eq!(status.battery_level, 64);
        assert_eq!(status.geofence, None);
        assert_eq!(status.latitude, 47.3);
    }

    #[test]
    fn rejects_url_without_scheme() {
        let http: Arc<dyn HttpSender> = Arc::new(ReqwestSender::new().unwrap());
        assert!(TeslaMateClient::with_transport("teslamate.local", http.clone()).is_err());
        assert!(TeslaMateClient::with_transport("http://teslamate.local/", http).is_ok());
    }
}
