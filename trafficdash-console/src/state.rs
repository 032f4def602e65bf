use crate::alerts::NotificationTray;
use crate::client::BackendClient;
use crate::config::ConsoleConfig;
use crate::health::HealthTracker;
use crate::models::{SignalStatus, StreetlightStatus};
use crate::view::{DashboardModel, FeedModel};
use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// État unique partagé entre les vues (écriture) et l'API Axum (lecture)
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConsoleConfig>,
    pub client: BackendClient,
    pub dashboard: Shared<DashboardModel>,
    pub signal: Shared<FeedModel<SignalStatus>>,
    pub streetlight: Shared<FeedModel<StreetlightStatus>>,
    pub notifications: NotificationTray,
    pub health: HealthTracker,
}
