/*!
Backend trafic stub pour tests sans Flask

Serveur Axum sur 127.0.0.1:0 qui reproduit les routes consommées par la
console. Les réponses de /api/all-stats sont scriptables (JSON ou statut
d'erreur) et peuvent être retardées; le stub compte les requêtes et le
nombre maximal de requêtes simultanées. Les routes streetlight et démo
suivent la sémantique du vrai backend (403 hors mode manuel, 400 si
incident déjà actif, etc).
*/

use crate::payloads::{signal_status, streetlight_status, SnapshotBuilder};
use anyhow::Result;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Réponse scriptée pour /api/all-stats
#[derive(Debug, Clone)]
pub enum StubReply {
    Json(Value),
    Status(u16),
}

#[derive(Debug, Clone)]
struct LightState {
    led1: u8,
    led2: u8,
    mode: String,
    motion: bool,
}

struct StubState {
    script: Mutex<VecDeque<StubReply>>,
    current: Mutex<Value>,
    delay: Mutex<Duration>,
    stats_requests: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    signal: Mutex<Value>,
    light: Mutex<LightState>,
    camera: Mutex<(usize, Duration)>,
}

pub struct StubBackend {
    addr: SocketAddr,
    state: Arc<StubState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl StubBackend {
    /// Démarre le stub sur un port libre
    pub async fn start() -> Result<Self> {
        let state = Arc::new(StubState {
            script: Mutex::new(VecDeque::new()),
            current: Mutex::new(SnapshotBuilder::new().build()),
            delay: Mutex::new(Duration::ZERO),
            stats_requests: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            signal: Mutex::new(signal_status("green", "red", 20)),
            light: Mutex::new(LightState { led1: 0, led2: 0, mode: "auto".into(), motion: false }),
            camera: Mutex::new((2, Duration::ZERO)),
        });

        let app = Router::new()
            .route("/api/all-stats", get(all_stats))
            .route("/api/trigger-incident", get(trigger_incident))
            .route("/api/trigger-ev-route", get(trigger_ev_route))
            .route("/signal-control/get_status", get(get_signal))
            .route("/streetlight/get_status", get(get_light))
            .route("/streetlight/set_mode", post(set_mode))
            .route("/streetlight/set_brightness", post(set_brightness))
            .route("/streetlight/camera_feed", get(camera_feed))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                log::error!("stub backend stopped: {}", e);
            }
        });

        log::info!("🚦 [STUB] traffic backend listening on http://{}", addr);
        Ok(Self { addr, state, shutdown_tx: Some(shutdown_tx) })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Réponses consommées dans l'ordre; la dernière réponse JSON est ensuite rejouée
    pub fn script(&self, replies: Vec<StubReply>) {
        *lock(&self.state.script) = replies.into();
    }

    pub fn set_snapshot(&self, snapshot: Value) {
        *lock(&self.state.current) = snapshot;
    }

    pub fn snapshot(&self) -> Value {
        lock(&self.state.current).clone()
    }

    /// Latence appliquée à chaque /api/all-stats
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.state.delay) = delay;
    }

    pub fn stats_requests(&self) -> usize {
        self.state.stats_requests.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Flux caméra de `frames` images espacées de `interval`
    pub fn set_camera_feed(&self, frames: usize, interval: Duration) {
        *lock(&self.state.camera) = (frames, interval);
    }

    pub fn set_signal(&self, status: Value) {
        *lock(&self.state.signal) = status;
    }

    /// Simule la résolution d'incident côté backend: impact positif, score remonté de 15
    pub fn clear_incident(&self) {
        let mut current = lock(&self.state.current);
        current["incident"] = json!({
            "active": false,
            "location": null,
            "message": null,
            "optimization_impact": 15,
        });
        let score = current["optimizationScore"].as_f64().unwrap_or(0.0);
        current["optimizationScore"] = json!((score + 15.0).min(100.0));
    }

    pub fn clear_ev_route(&self) {
        let cleared = json!({ "active": false, "route_name": null, "lights": [], "message": "" });
        lock(&self.state.current)["ev_route"] = cleared.clone();
        lock(&self.state.signal)["ev_route"] = cleared;
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Un handler qui panique ne doit pas bloquer les tests suivants
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct InFlight<'a>(&'a StubState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a StubState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn all_stats(State(state): State<Arc<StubState>>) -> Response {
    state.stats_requests.fetch_add(1, Ordering::SeqCst);
    let _guard = InFlight::enter(&state);

    let delay = *lock(&state.delay);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let reply = lock(&state.script).pop_front();
    match reply {
        Some(StubReply::Json(v)) => {
            *lock(&state.current) = v.clone();
            Json(v).into_response()
        }
        Some(StubReply::Status(code)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({ "error": "scripted failure" }))).into_response()
        }
        None => {
            let current = lock(&state.current).clone();
            Json(current).into_response()
        }
    }
}

async fn trigger_incident(State(state): State<Arc<StubState>>) -> Response {
    let mut current = lock(&state.current);
    if current["incident"]["active"] == json!(true) {
        let body = json!({ "status": "error", "message": "Incident already active." });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }
    current["incident"] = json!({
        "active": true,
        "location": "Main St & 5th Ave",
        "message": "Multi-vehicle collision",
        "optimization_impact": -30,
    });
    let score = current["optimizationScore"].as_f64().unwrap_or(0.0);
    current["optimizationScore"] = json!((score - 30.0).max(0.0));
    log::info!("💥 [STUB] incident triggered");
    Json(json!({ "status": "success", "message": "Incident triggered." })).into_response()
}

async fn trigger_ev_route(State(state): State<Arc<StubState>>) -> Response {
    let mut current = lock(&state.current);
    if current["ev_route"]["active"] == json!(true) {
        let body = json!({ "status": "error", "message": "EV Route already active." });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }
    let route = json!({
        "active": true,
        "route_name": "Hospital Corridor",
        "lights": ["L1", "L2", "L3"],
        "message": "Emergency vehicle approaching. Clearing route.",
    });
    current["ev_route"] = route.clone();
    lock(&state.signal)["ev_route"] = route;
    log::info!("🚑 [STUB] EV route triggered");
    Json(json!({ "status": "success", "message": "EV Route triggered." })).into_response()
}

async fn get_signal(State(state): State<Arc<StubState>>) -> Json<Value> {
    let signal = lock(&state.signal).clone();
    Json(signal)
}

async fn get_light(State(state): State<Arc<StubState>>) -> Json<Value> {
    let light = lock(&state.light).clone();
    Json(streetlight_status(light.led1, light.led2, &light.mode, light.motion))
}

async fn set_mode(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Response {
    match body["mode"].as_str() {
        Some(mode @ ("auto" | "manual")) => {
            lock(&state.light).mode = mode.to_string();
            Json(json!({ "mode": mode })).into_response()
        }
        _ => (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid mode" }))).into_response(),
    }
}

async fn set_brightness(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Response {
    let mut light = lock(&state.light);
    if light.mode != "manual" {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "Switch to manual mode first" }))).into_response();
    }
    let Some(value) = body["value"].as_u64().filter(|v| *v <= 255) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid value" }))).into_response();
    };
    match body["led"].as_str() {
        Some("LED1") => light.led1 = value as u8,
        Some("LED2") => light.led2 = value as u8,
        _ => return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid LED name" }))).into_response(),
    }
    Json(json!({ "LED1": light.led1, "LED2": light.led2 })).into_response()
}

/// Même framing que le vrai flux MJPEG; par défaut deux images sans délai
async fn camera_feed(State(state): State<Arc<StubState>>) -> Response {
    let (frames, interval) = *lock(&state.camera);
    let stream = futures::stream::unfold(0usize, move |index| async move {
        if index >= frames {
            return None;
        }
        if index > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        Some((Ok::<_, std::io::Error>(mjpeg_part(index)), index + 1))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "multipart/x-mixed-replace; boundary=frame")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn mjpeg_part(index: usize) -> Vec<u8> {
    let mut part = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
    part.extend_from_slice(b"\xff\xd8");
    part.extend_from_slice(format!("frame-{index}").as_bytes());
    part.extend_from_slice(b"\xff\xd9\r\n");
    part
}
