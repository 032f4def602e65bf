/**
 * API REST TRAFFICDASH - Surface JSON consommée par le dashboard navigateur
 *
 * RÔLE :
 * Expose les modèles de rendu produits par les vues (dashboard, signal,
 * streetlight), les notifications actives, et relaie les commandes
 * opérateur vers le backend.
 *
 * ROUTES :
 * - GET  /health, /system/health
 * - GET  /dashboard, /notifications, /signal, /streetlight
 * - GET  /streetlight/camera_feed (flux relayé tel quel)
 * - POST /streetlight/brightness, /streetlight/mode
 * - POST /demo/incident, /demo/ev-route
 *
 * SÉCURITÉ :
 * - Lectures ouvertes
 * - Toute route POST exige le header x-api-key = clé configurée
 * - Sans clé configurée, les commandes sont refusées
 */

use crate::alerts::Notification;
use crate::client::{BrightnessLevels, ControlError};
use crate::health::ConsoleHealth;
use crate::models::{LightMode, StreetlightStatus};
use crate::state::AppState;
use crate::view::{DashboardModel, FeedModel, SignalPanel};
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("invalid request body: {0}")]
    Body(#[from] JsonRejection),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Control(ControlError::InvalidLed(_))
            | Self::Control(ControlError::BrightnessOutOfRange(_))
            | Self::Control(ControlError::InvalidMode(_)) => StatusCode::BAD_REQUEST,
            Self::Control(ControlError::Rejected { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            Self::Control(ControlError::Network(_)) => StatusCode::BAD_GATEWAY,
            Self::Body(rejection) => rejection.status(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    if req.method() == Method::GET || req.method() == Method::HEAD {
        return Ok(next.run(req).await);
    }

    let Some(expected) = app.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
        warn!("SECURITY: no api_key configured - command {} denied", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!("SECURITY: bad x-api-key on {}", req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/dashboard", get(get_dashboard))
        .route("/notifications", get(get_notifications))
        .route("/signal", get(get_signal))
        .route("/streetlight", get(get_streetlight))
        .route("/streetlight/camera_feed", get(camera_feed))
        .route("/streetlight/brightness", post(set_brightness))
        .route("/streetlight/mode", post(set_mode))
        .route("/demo/incident", post(trigger_incident))
        .route("/demo/ev-route", post(trigger_ev_route))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<ConsoleHealth> {
    let active = app.notifications.active().len();
    Json(app.health.get_health(active))
}

// GET /dashboard
async fn get_dashboard(State(app): State<AppState>) -> Json<DashboardModel> {
    let model = app.dashboard.lock().clone();
    Json(model)
}

// GET /notifications (visibles uniquement, plus récente en premier)
async fn get_notifications(State(app): State<AppState>) -> Json<Vec<Notification>> {
    Json(app.notifications.active())
}

// GET /signal
async fn get_signal(State(app): State<AppState>) -> Json<FeedModel<SignalPanel>> {
    let feed = app.signal.lock();
    let panel = FeedModel {
        loading: feed.loading,
        error: feed.error.clone(),
        data: feed.data.as_ref().map(SignalPanel::from),
    };
    Json(panel)
}

// GET /streetlight
async fn get_streetlight(State(app): State<AppState>) -> Json<FeedModel<StreetlightStatus>> {
    let feed = app.streetlight.lock().clone();
    Json(feed)
}

async fn camera_feed(State(app): State<AppState>) -> Result<Response, ApiError> {
    let upstream = app.client.camera_feed().await?;
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("multipart/x-mixed-replace; boundary=frame")
        .to_string();

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct BrightnessRequest {
    led: String,
    value: i64,
}

#[derive(Debug, Deserialize)]
struct ModeRequest {
    mode: String,
}

#[derive(Debug, Serialize)]
struct ModeReply {
    mode: LightMode,
}

// POST /streetlight/brightness {led, value}
async fn set_brightness(
    State(app): State<AppState>,
    body: Result<Json<BrightnessRequest>, JsonRejection>,
) -> Result<Json<BrightnessLevels>, ApiError> {
    let Json(body) = body?;
    let result = app.client.set_brightness(&body.led, body.value).await;
    app.health.record_command(&result);
    Ok(Json(result?))
}

// POST /streetlight/mode {mode}
async fn set_mode(
    State(app): State<AppState>,
    body: Result<Json<ModeRequest>, JsonRejection>,
) -> Result<Json<ModeReply>, ApiError> {
    let Json(body) = body?;
    let result = app.client.set_mode(&body.mode).await;
    app.health.record_command(&result);
    Ok(Json(ModeReply { mode: result? }))
}

async fn trigger_incident(State(app): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let result = app.client.trigger_incident().await;
    app.health.record_command(&result);
    Ok(Json(serde_json::json!({ "ok": true, "message": result? })))
}

async fn trigger_ev_route(State(app): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let result = app.client.trigger_ev_route().await;
    app.health.record_command(&result);
    Ok(Json(serde_json::json!({ "ok": true, "message": result? })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertEvent, AlertKind, AlertPriority, AlertSink, NotificationTray};
    use crate::client::BackendClient;
    use crate::config::ConsoleConfig;
    use crate::health::HealthTracker;
    use crate::state::new_state;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use trafficdash_devkit::StubBackend;

    fn app_state(base_url: &str, api_key: Option<&str>) -> AppState {
        app_state_with_timeout(base_url, api_key, Duration::from_secs(2))
    }

    fn app_state_with_timeout(base_url: &str, api_key: Option<&str>, timeout: Duration) -> AppState {
        let mut cfg = ConsoleConfig::default();
        cfg.backend.base_url = base_url.to_string();
        cfg.api_key = api_key.map(str::to_string);
        AppState {
            client: BackendClient::new(base_url, timeout).unwrap(),
            config: Arc::new(cfg),
            dashboard: new_state(DashboardModel::default()),
            signal: new_state(FeedModel::default()),
            streetlight: new_state(FeedModel::default()),
            notifications: NotificationTray::new(),
            health: HealthTracker::new(base_url),
        }
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, key: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = axum::http::Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_dashboard_starts_loading() {
        let app = build_router(app_state("http://127.0.0.1:9", None));
        let resp = app.oneshot(get_req("/dashboard")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["loading"], true);
        assert!(json["error"].is_null());
    }

    #[tokio::test]
    async fn test_notifications_listed() {
        let state = app_state("http://127.0.0.1:9", None);
        state.notifications.emit(AlertEvent {
            kind: AlertKind::EvRouteStarted,
            title: "PRIORITY ALERT".into(),
            message: "Ambulance en route".into(),
            priority: AlertPriority::Info,
            duration_ms: 10_000,
        });
        let app = build_router(state);
        let json = body_json(app.oneshot(get_req("/notifications")).await.unwrap()).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["kind"], "ev_route_started");
    }

    #[tokio::test]
    async fn test_commands_require_api_key() {
        let app = build_router(app_state("http://127.0.0.1:9", None));
        let req = post_json("/streetlight/mode", Some("anything"), serde_json::json!({"mode": "manual"}));
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::UNAUTHORIZED);

        let app = build_router(app_state("http://127.0.0.1:9", Some("s3cret")));
        let req = post_json("/streetlight/mode", Some("wrong"), serde_json::json!({"mode": "manual"}));
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_brightness_is_bad_request() {
        let state = app_state("http://127.0.0.1:9", Some("k"));
        let app = build_router(state.clone());
        let req = post_json("/streetlight/brightness", Some("k"), serde_json::json!({"led": "LED1", "value": 300}));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].as_str().unwrap().contains("300"));

        // jamais envoyée: ni forwarded ni rejected
        let health = state.health.get_health(0);
        assert_eq!(health.commands_invalid, 1);
        assert_eq!(health.commands_rejected, 0);
        assert_eq!(health.commands_forwarded, 0);
    }

    #[tokio::test]
    async fn test_malformed_command_body_gets_json_error() {
        let app = build_router(app_state("http://127.0.0.1:9", Some("k")));

        let req = post_json("/streetlight/brightness", Some("k"), serde_json::json!({"led": "LED1", "value": 12.5}));
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(resp).await;
        assert_eq!(json["status"], 422);
        assert!(json["error"].as_str().unwrap().starts_with("invalid request body"));

        let req = post_json("/streetlight/mode", Some("k"), serde_json::json!({"state": "manual"}));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(resp).await["status"], 422);
    }

    #[tokio::test]
    async fn test_brightness_forwarded_to_backend() {
        let backend = StubBackend::start().await.unwrap();
        let state = app_state(&backend.base_url(), Some("k"));
        let app = build_router(state.clone());

        // en mode auto le backend refuse (403)
        let req = post_json("/streetlight/brightness", Some("k"), serde_json::json!({"led": "LED2", "value": 80}));
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(body_json(resp).await["error"].as_str().unwrap().contains("manual"));

        let req = post_json("/streetlight/mode", Some("k"), serde_json::json!({"mode": "manual"}));
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["mode"], "manual");

        let req = post_json("/streetlight/brightness", Some("k"), serde_json::json!({"led": "led2", "value": 80}));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["LED2"], 80);

        let health = state.health.get_health(0);
        assert_eq!(health.commands_forwarded, 2);
        assert_eq!(health.commands_rejected, 1);
    }

    #[tokio::test]
    async fn test_backend_down_is_bad_gateway() {
        let app = build_router(app_state("http://127.0.0.1:9", Some("k")));
        let req = post_json("/demo/incident", Some("k"), serde_json::json!({}));
        assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_camera_feed_streamed_through() {
        let backend = StubBackend::start().await.unwrap();
        let app = build_router(app_state(&backend.base_url(), None));
        let resp = app.oneshot(get_req("/streetlight/camera_feed")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let ct = resp.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap().to_string();
        assert!(ct.starts_with("multipart/x-mixed-replace"));
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"--frame"));
    }

    #[tokio::test]
    async fn test_camera_feed_not_cut_by_request_timeout() {
        let backend = StubBackend::start().await.unwrap();
        backend.set_camera_feed(5, Duration::from_millis(100));
        let app = build_router(app_state_with_timeout(&backend.base_url(), None, Duration::from_millis(150)));

        let resp = app.oneshot(get_req("/streetlight/camera_feed")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let frames = bytes.windows(b"--frame".len()).filter(|w| *w == b"--frame").count();
        assert_eq!(frames, 5);
    }
}
