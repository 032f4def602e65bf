/**
 * BACKEND CLIENT - Accès HTTP au backend de supervision trafic
 *
 * RÔLE :
 * Seul module qui parle au backend (reqwest). Fournit :
 * - les lectures pollées (all-stats, signal-control, streetlight)
 * - les commandes éclairage public (luminosité, mode) et le flux caméra
 * - les déclencheurs de démo (incident, route prioritaire)
 *
 * ERREURS :
 * - FetchError = toute erreur réseau (transport, statut non-2xx, payload illisible)
 * - ControlError = commande refusée localement (validation) ou par le backend
 *
 * Pas de retry ni de backoff ici : le poller rappelle à intervalle fixe,
 * les commandes sont à l'initiative de l'opérateur.
 */

use crate::models::LightMode;
use crate::poller::SnapshotSource;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, info};

pub const ALL_STATS_PATH: &str = "/api/all-stats";
pub const SIGNAL_STATUS_PATH: &str = "/signal-control/get_status";
pub const STREETLIGHT_STATUS_PATH: &str = "/streetlight/get_status";
pub const SET_BRIGHTNESS_PATH: &str = "/streetlight/set_brightness";
pub const SET_MODE_PATH: &str = "/streetlight/set_mode";
pub const CAMERA_FEED_PATH: &str = "/streetlight/camera_feed";
pub const TRIGGER_INCIDENT_PATH: &str = "/api/trigger-incident";
pub const TRIGGER_EV_ROUTE_PATH: &str = "/api/trigger-ev-route";

/// Erreur réseau d'un appel au backend. Clonable pour être gardée dans l'état de la vue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid payload from {url}: {reason}")]
    Decode { url: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("invalid LED name: {0} (expected LED1 or LED2)")]
    InvalidLed(String),
    #[error("brightness out of range (0-255): {0}")]
    BrightnessOutOfRange(i64),
    #[error("invalid mode: {0} (expected auto or manual)")]
    InvalidMode(String),
    #[error("backend rejected command (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error(transparent)]
    Network(#[from] FetchError),
}

impl ControlError {
    /// Refusée avant tout appel réseau
    pub fn is_local(&self) -> bool {
        matches!(self, Self::InvalidLed(_) | Self::BrightnessOutOfRange(_) | Self::InvalidMode(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Led {
    #[serde(rename = "LED1")]
    Led1,
    #[serde(rename = "LED2")]
    Led2,
}

impl Led {
    pub fn parse(raw: &str) -> Result<Self, ControlError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LED1" => Ok(Self::Led1),
            "LED2" => Ok(Self::Led2),
            _ => Err(ControlError::InvalidLed(raw.to_string())),
        }
    }
}

/// Réponse de set_brightness: niveaux des deux LEDs après application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessLevels {
    #[serde(rename = "LED1")]
    pub led1: u8,
    #[serde(rename = "LED2")]
    pub led2: u8,
}

#[derive(Debug, Serialize)]
struct BrightnessCommand {
    led: Led,
    value: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModeCommand {
    mode: LightMode,
}

#[derive(Debug, Deserialize)]
struct DemoReply {
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl BackendClient {
    /// `request_timeout` borne la connexion et chaque appel JSON. Le flux
    /// caméra n'a pas de limite globale: il ne se termine jamais.
    pub fn new(base_url: &str, request_timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .user_agent(concat!("trafficdash-console/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), request_timeout })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET + décodage JSON; toute erreur est une FetchError
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = self.url(path);
        let resp = self
            .http
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status: status.as_u16() });
        }
        let body = resp.bytes().await.map_err(|e| transport(&url, e))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode { url, reason: e.to_string() })
    }

    /// Source pollable pour un endpoint GET donné
    pub fn source<T>(&self, path: &str) -> HttpSource<T> {
        HttpSource { client: self.clone(), path: path.to_string(), _payload: PhantomData }
    }

    pub async fn set_brightness(&self, led: &str, value: i64) -> Result<BrightnessLevels, ControlError> {
        let led = Led::parse(led)?;
        let value = u8::try_from(value).map_err(|_| ControlError::BrightnessOutOfRange(value))?;
        let levels: BrightnessLevels = self
            .send_command(reqwest::Method::POST, SET_BRIGHTNESS_PATH, Some(&BrightnessCommand { led, value }))
            .await?;
        info!(?led, value, "brightness command accepted");
        Ok(levels)
    }

    pub async fn set_mode(&self, mode: &str) -> Result<LightMode, ControlError> {
        let mode = LightMode::parse(mode).ok_or_else(|| ControlError::InvalidMode(mode.to_string()))?;
        let reply: ModeCommand = self
            .send_command(reqwest::Method::POST, SET_MODE_PATH, Some(&ModeCommand { mode }))
            .await?;
        info!(mode = ?reply.mode, "streetlight mode switched");
        Ok(reply.mode)
    }

    pub async fn trigger_incident(&self) -> Result<String, ControlError> {
        let reply: DemoReply = self.send_command::<(), _>(reqwest::Method::GET, TRIGGER_INCIDENT_PATH, None).await?;
        Ok(reply.message)
    }

    pub async fn trigger_ev_route(&self) -> Result<String, ControlError> {
        let reply: DemoReply = self.send_command::<(), _>(reqwest::Method::GET, TRIGGER_EV_ROUTE_PATH, None).await?;
        Ok(reply.message)
    }

    /// Ouvre le flux caméra (multipart JPEG); le corps est relayé tel quel.
    pub async fn camera_feed(&self) -> Result<reqwest::Response, ControlError> {
        let url = self.url(CAMERA_FEED_PATH);
        // seule l'attente des en-têtes est bornée, le corps est un flux sans fin
        let resp = tokio::time::timeout(self.request_timeout, self.http.get(&url).send())
            .await
            .map_err(|_| FetchError::Transport { url: url.clone(), reason: "timed out waiting for camera feed".into() })?
            .map_err(|e| transport(&url, e))?;
        if !resp.status().is_success() {
            return Err(FetchError::Status { url, status: resp.status().as_u16() }.into());
        }
        Ok(resp)
    }

    async fn send_command<B, R>(&self, method: reqwest::Method, path: &str, body: Option<&B>) -> Result<R, ControlError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        let mut req = self.http.request(method, &url).timeout(self.request_timeout);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|e| transport(&url, e))?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| transport(&url, e))?;

        if status.is_client_error() {
            let message = rejection_message(&bytes);
            debug!(%url, status = status.as_u16(), %message, "command rejected by backend");
            return Err(ControlError::Rejected { status: status.as_u16(), message });
        }
        if !status.is_success() {
            return Err(FetchError::Status { url, status: status.as_u16() }.into());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Decode { url, reason: e.to_string() }.into())
    }
}

fn transport(url: &str, err: reqwest::Error) -> FetchError {
    FetchError::Transport { url: url.to_string(), reason: err.to_string() }
}

/// Le backend répond `{"error": ...}` ou `{"status": "error", "message": ...}`
fn rejection_message(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(v) => v
            .get("error")
            .or_else(|| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| v.to_string()),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

/// Endpoint GET décodé en `T`, utilisable par un Poller
pub struct HttpSource<T> {
    client: BackendClient,
    path: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> SnapshotSource<T> for HttpSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn fetch(&self) -> BoxFuture<'static, Result<T, FetchError>> {
        let client = self.client.clone();
        let path = self.path.clone();
        Box::pin(async move { client.get_json::<T>(&path).await })
    }

    fn describe(&self) -> String {
        self.client.url(&self.path)
    }
}
