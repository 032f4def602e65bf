/**
 * CONSOLE - Assemblage des pollers, vues et état partagé
 *
 * RÔLE :
 * Démarre les trois pollers (all-stats, signal-control, streetlight),
 * branche chaque flux sur sa vue, enregistre les pollers auprès du
 * HealthTracker et fabrique l'AppState servi par Axum.
 *
 * CYCLE DE VIE :
 * - start() : doit être appelé dans un runtime tokio
 * - shutdown() : stoppe les pollers; une réponse en vol est jetée
 */

use crate::alerts::{AlertSink, NotificationTray};
use crate::client::{BackendClient, ALL_STATS_PATH, SIGNAL_STATUS_PATH, STREETLIGHT_STATUS_PATH};
use crate::config::ConsoleConfig;
use crate::differ::AlertDurations;
use crate::health::HealthTracker;
use crate::models::{SignalStatus, Snapshot, StreetlightStatus};
use crate::poller::{self, PollerHandle};
use crate::state::AppState;
use crate::view::{DashboardView, FeedView};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Console {
    state: AppState,
    stats: PollerHandle<Snapshot>,
    signal: PollerHandle<SignalStatus>,
    streetlight: PollerHandle<StreetlightStatus>,
}

impl Console {
    pub fn start(config: ConsoleConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(config.backend.request_timeout_ms);
        let client = BackendClient::new(&config.backend.base_url, timeout).context("building backend HTTP client")?;

        let notifications = NotificationTray::new();
        let health = HealthTracker::new(&config.backend.base_url);

        let sink: Arc<dyn AlertSink> = Arc::new(notifications.clone());
        let dashboard = DashboardView::new(sink, AlertDurations::from(&config.alerts));
        let dashboard_model = dashboard.model();
        let stats = poller::start(
            "stats",
            client.source::<Snapshot>(ALL_STATS_PATH),
            config.polling.stats_interval(),
            dashboard,
        );

        let signal_view = FeedView::<SignalStatus>::new();
        let signal_model = signal_view.model();
        let signal = poller::start(
            "signal",
            client.source::<SignalStatus>(SIGNAL_STATUS_PATH),
            config.polling.signal_interval(),
            signal_view,
        );

        let light_view = FeedView::<StreetlightStatus>::new();
        let light_model = light_view.model();
        let streetlight = poller::start(
            "streetlight",
            client.source::<StreetlightStatus>(STREETLIGHT_STATUS_PATH),
            config.polling.streetlight_interval(),
            light_view,
        );

        health.track_poller(Arc::new(stats.monitor()));
        health.track_poller(Arc::new(signal.monitor()));
        health.track_poller(Arc::new(streetlight.monitor()));

        info!(backend = %config.backend.base_url, "console started");

        let state = AppState {
            config: Arc::new(config),
            client,
            dashboard: dashboard_model,
            signal: signal_model,
            streetlight: light_model,
            notifications,
            health,
        };
        Ok(Self { state, stats, signal, streetlight })
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn stats_poller(&self) -> &PollerHandle<Snapshot> {
        &self.stats
    }

    pub async fn shutdown(self) {
        info!("stopping console pollers");
        tokio::join!(self.stats.shutdown(), self.signal.shutdown(), self.streetlight.shutdown());
    }
}
