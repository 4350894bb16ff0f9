//! Wire types of the EKZ e-mobility backend
//!
//! The backend is loose with nulls, so most scalar fields fall back to
//! their default when the value is `null` or missing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Envelope used by most endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(default, deserialize_with = "null_to_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub status_code: i64,
}

/// Body of 4xx answers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorResponse {
    #[serde(deserialize_with = "null_to_default")]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub device: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    #[serde(rename = "isSocialLogin")]
    pub is_social_login: bool,
    pub provider: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginResponse {
    #[serde(deserialize_with = "null_to_default")]
    pub status_code: i64,
    #[serde(deserialize_with = "null_to_default")]
    pub message: String,
    #[serde(deserialize_with = "null_to_default")]
    pub token: String,
    #[serde(deserialize_with = "null_to_default")]
    pub is_verified: bool,
}

/// `GET /users/profile`, only used to check that a token still works
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub personal: PersonalDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersonalDetails {
    #[serde(deserialize_with = "null_to_default")]
    pub first_name: String,
    #[serde(deserialize_with = "null_to_default")]
    pub last_name: String,
    #[serde(deserialize_with = "null_to_default")]
    pub email: String,
    #[serde(deserialize_with = "null_to_default")]
    pub language: String,
    #[serde(deserialize_with = "null_to_default")]
    pub city: String,
    #[serde(deserialize_with = "null_to_default")]
    pub country: String,
    #[serde(deserialize_with = "null_to_default")]
    pub user_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChargingStationResult {
    pub charging_stations: Vec<ChargingStation>,
    #[serde(deserialize_with = "null_to_default")]
    pub quantity: i64,
    #[serde(deserialize_with = "null_to_default")]
    pub user_contract_exists: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChargingStation {
    #[serde(rename = "chargeBoxes", deserialize_with = "null_to_default")]
    pub charge_boxes: Vec<ChargeBox>,
    #[serde(deserialize_with = "null_to_default")]
    pub invoiced: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChargeBox {
    #[serde(deserialize_with = "null_to_default")]
    pub charge_box_id: String,
    #[serde(deserialize_with = "null_to_default")]
    pub charge_box_name: String,
    #[serde(deserialize_with = "null_to_default")]
    pub charging_process_status: String,
    #[serde(deserialize_with = "null_to_default")]
    pub city: String,
    #[serde(deserialize_with = "null_to_default")]
    pub connector_status: String,
    #[serde(rename = "connector_count", deserialize_with = "null_to_default")]
    pub connector_count: i64,
    #[serde(deserialize_with = "null_to_default")]
    pub connectors: Vec<Connector>,
    #[serde(deserialize_with = "null_to_default")]
    pub country: String,
    #[serde(deserialize_with = "null_to_default")]
    pub gps_lat: f64,
    #[serde(deserialize_with = "null_to_default")]
    pub gps_lng: f64,
    #[serde(deserialize_with = "null_to_default")]
    pub online: bool,
    #[serde(deserialize_with = "null_to_default")]
    pub plug_type: String,
    #[serde(deserialize_with = "null_to_default")]
    pub street: String,
    #[serde(rename = "tariff_schedule", deserialize_with = "null_to_default")]
    pub tariff_schedule: String,
    #[serde(deserialize_with = "null_to_default")]
    pub zip: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Connector {
    #[serde(deserialize_with = "null_to_default")]
    pub charging_process_status: String,
    #[serde(deserialize_with = "null_to_default")]
    pub connector_id: i64,
    #[serde(deserialize_with = "null_to_default")]
    pub connector_name: String,
    #[serde(deserialize_with = "null_to_default")]
    pub connector_status: String,
    #[serde(deserialize_with = "null_to_default")]
    pub has_permission: bool,
    #[serde(deserialize_with = "null_to_default")]
    pub plug_type: String,
    #[serde(deserialize_with = "null_to_default")]
    pub status: String,
    #[serde(rename = "tariff_data", deserialize_with = "null_to_default")]
    pub tariff_data: TariffData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TariffData {
    #[serde(deserialize_with = "null_to_default")]
    pub prices: TariffPrices,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TariffPrices {
    #[serde(deserialize_with = "null_to_default")]
    pub current: String,
    #[serde(deserialize_with = "null_to_default")]
    pub high: f64,
    #[serde(deserialize_with = "null_to_default")]
    pub low: f64,
}

/// Which transactions the live-data endpoint should consider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectorStatus {
    /// No filter; the backend expects an empty string
    #[default]
    Any,
    Charging,
}

impl ConnectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Charging => "CHARGING",
        }
    }
}

impl Serialize for ConnectorStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveDataRequest<'a> {
    pub charge_box_id: &'a str,
    pub connector_id: u32,
    pub connector_status: ConnectorStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteOpRequest<'a> {
    pub charge_box_id: &'a str,
    pub connector_id: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CurrentTariff {
    #[serde(deserialize_with = "null_to_default")]
    pub tariff_price: f64,
    #[serde(deserialize_with = "null_to_default")]
    pub tariff_status: String,
}

/// `POST /charging-stations/charging-live-data`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LiveData {
    #[serde(rename = "chargeBoxId", deserialize_with = "null_to_default")]
    pub charge_box_id: String,
    /// kWh delivered in the running transaction
    #[serde(deserialize_with = "null_to_default")]
    pub charged_energy: f64,
    /// String or number depending on the backend version
    #[serde(rename = "connectorId")]
    pub connector_id: serde_json::Value,
    #[serde(deserialize_with = "null_to_default")]
    pub current_tariff: CurrentTariff,
    pub duration: serde_json::Value,
    #[serde(deserialize_with = "null_to_default")]
    pub id: i64,
    #[serde(rename = "idTag", deserialize_with = "null_to_default")]
    pub id_tag: String,
    /// Current charging power in kW
    #[serde(deserialize_with = "null_to_default")]
    pub power: f64,
    #[serde(deserialize_with = "null_to_default")]
    pub starttimestamp: i64,
    #[serde(deserialize_with = "null_to_default")]
    pub status: String,
    pub totalcost: serde_json::Value,
    #[serde(deserialize_with = "null_to_default")]
    pub transaction_id: i64,
}

impl LiveData {
    /// A transaction that is drawing power or reported as charging
    pub fn is_active(&self) -> bool {
        self.power > 0.0 || self.status.eq_ignore_ascii_case("CHARGING")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteTariff {
    #[serde(deserialize_with = "null_to_default")]
    pub tariff_status: String,
    pub tariff_price: serde_json::Value,
}

/// Payload of `remote-start` and `remote-stop`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteOpResult {
    #[serde(deserialize_with = "null_to_default")]
    pub start_time: String,
    #[serde(deserialize_with = "null_to_default")]
    pub charging_status: String,
    #[serde(deserialize_with = "null_to_default")]
    pub current_tariff: RemoteTariff,
    pub current_power: serde_json::Value,
}
