/*!
Builders de payloads au format exact du backend trafic

Les clés suivent le JSON du backend (camelCase pour trafficHistory,
cameraStatus, optimizationScore; snake_case pour ev_route et l'incident).
*/

use serde_json::{json, Value};

/// Construit une réponse /api/all-stats
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    value: Value,
}

impl SnapshotBuilder {
    /// Snapshot calme: pas d'incident, pas de route prioritaire
    pub fn new() -> Self {
        let series = |value: &str, base: f64| {
            json!({
                "value": value,
                "data": (0..6).map(|i| json!({ "v": base + i as f64 })).collect::<Vec<_>>(),
            })
        };

        Self {
            value: json!({
                "stats": {
                    "cpu": series("42%", 40.0),
                    "memory": series("61%", 58.0),
                    "latency": series("24ms", 20.0),
                    "cameras": series("4/5", 4.0),
                    "response": series("1.2s", 1.0),
                },
                "trafficHistory": [
                    { "time": "10:00", "vehicles": 120 },
                    { "time": "10:05", "vehicles": 134 },
                ],
                "cameraStatus": [
                    { "id": "CAM-01", "location": "Main St & 5th Ave", "status": "online" },
                    { "id": "CAM-02", "location": "Harbor Rd", "status": "offline" },
                ],
                "optimizationScore": 82,
                "incident": {
                    "active": false,
                    "location": null,
                    "message": null,
                    "optimization_impact": 0,
                },
                "ev_route": {
                    "active": false,
                    "route_name": null,
                    "lights": [],
                    "message": "",
                },
            }),
        }
    }

    pub fn incident(mut self, location: &str, message: &str) -> Self {
        self.value["incident"] = json!({
            "active": true,
            "location": location,
            "message": message,
            "optimization_impact": -30,
        });
        self
    }

    pub fn ev_route(mut self, message: &str) -> Self {
        self.value["ev_route"] = json!({
            "active": true,
            "route_name": "Hospital Corridor",
            "lights": ["L1", "L2", "L3"],
            "message": message,
        });
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.value["optimizationScore"] = json!(score);
        self
    }

    pub fn cpu(mut self, value: &str) -> Self {
        self.value["stats"]["cpu"]["value"] = json!(value);
        self
    }

    pub fn build(self) -> Value {
        self.value
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Réponse /signal-control/get_status
pub fn signal_status(ns: &str, ew: &str, timer: u32) -> Value {
    json!({
        "signal_state": { "ns": ns, "ew": ew, "timer": timer },
        "ev_route": { "active": false, "route_name": null, "lights": [], "message": "" },
    })
}

/// Réponse /streetlight/get_status
pub fn streetlight_status(led1: u8, led2: u8, mode: &str, motion: bool) -> Value {
    json!({ "led1": led1, "led2": led2, "mode": mode, "motion": motion })
}
