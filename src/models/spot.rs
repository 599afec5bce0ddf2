use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkingSpot {
    pub id: String,
    pub spot_number: String,
    pub location: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub spot_type: SpotType,
    pub hourly_rate_cents: i64,
    pub features: Vec<String>,
    pub description: Option<String>,
    pub maintenance: bool,
    /// Derived at read time from active bookings plus the maintenance flag.
    pub status: SpotStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpotType {
    Standard,
    Compact,
    Handicap,
    Electric,
}

impl SpotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotType::Standard => "standard",
            SpotType::Compact => "compact",
            SpotType::Handicap => "handicap",
            SpotType::Electric => "electric",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(SpotType::Standard),
            "compact" => Some(SpotType::Compact),
            "handicap" => Some(SpotType::Handicap),
            "electric" => Some(SpotType::Electric),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpotStatus {
    Available,
    Occupied,
    Reserved,
    Maintenance,
}

impl SpotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotStatus::Available => "available",
            SpotStatus::Occupied => "occupied",
            SpotStatus::Reserved => "reserved",
            SpotStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(SpotStatus::Available),
            "occupied" => Some(SpotStatus::Occupied),
            "reserved" => Some(SpotStatus::Reserved),
            "maintenance" => Some(SpotStatus::Maintenance),
            _ => None,
        }
    }
}
