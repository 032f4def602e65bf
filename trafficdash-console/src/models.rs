/**
 * MODELS - Payloads JSON du backend de supervision trafic
 *
 * RÔLE : Structures désérialisées depuis les endpoints du backend
 * (/api/all-stats, /signal-control/get_status, /streetlight/get_status).
 *
 * Les champs de télémétrie (stats, historique, caméras) sont opaques :
 * la console les transmet à la vue sans les interpréter. Seuls `incident`
 * et `ev_route` alimentent la réconciliation d'alertes.
 */

use serde::{Deserialize, Deserializer, Serialize};

/// Le backend envoie `null` pour les champs texte d'un incident résolu.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default)]
    pub active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, alias = "optimizationImpact")]
    pub optimization_impact: f64,
}

/// Route prioritaire véhicule d'urgence (ambulance, pompiers...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvRoute {
    #[serde(default)]
    pub active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lights: Vec<String>,
}

/// Point de sparkline: `{"v": 42.0}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub v: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatSeries {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub data: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    #[serde(default)]
    pub cpu: StatSeries,
    #[serde(default)]
    pub memory: StatSeries,
    #[serde(default)]
    pub latency: StatSeries,
    #[serde(default)]
    pub cameras: StatSeries,
    #[serde(default)]
    pub response: StatSeries,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPoint {
    pub time: String,
    pub vehicles: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraStatus {
    pub id: String,
    pub location: String,
    pub status: String,
}

/// Snapshot complet renvoyé par `GET /api/all-stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub stats: SystemStats,
    #[serde(default, rename = "trafficHistory")]
    pub traffic_history: Vec<TrafficPoint>,
    #[serde(default, rename = "cameraStatus")]
    pub camera_status: Vec<CameraStatus>,
    #[serde(default, rename = "optimizationScore")]
    pub optimization_score: f64,
    #[serde(default)]
    pub incident: Incident,
    #[serde(default, rename = "ev_route", alias = "evRoute")]
    pub ev_route: EvRoute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColor {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalState {
    pub ns: LightColor,
    pub ew: LightColor,
    pub timer: u32,
}

/// Réponse de `GET /signal-control/get_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStatus {
    pub signal_state: SignalState,
    #[serde(default)]
    pub ev_route: EvRoute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightMode {
    Auto,
    Manual,
}

impl LightMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Réponse de `GET /streetlight/get_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetlightStatus {
    pub led1: u8,
    pub led2: u8,
    pub mode: LightMode,
    #[serde(default)]
    pub motion: bool,
}
