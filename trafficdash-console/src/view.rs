/**
 * VIEWS - Abonnés des pollers, modèles de rendu pour le dashboard
 *
 * RÔLE :
 * - DashboardView : reçoit les snapshots /api/all-stats, lance la
 *   réconciliation, pousse les alertes vers le sink, garde l'état précédent
 *   et expose le modèle de rendu (cartes de stats, historique, score...)
 * - FeedView : vue simple (signal-control, streetlight) = dernière valeur + erreur
 *
 * Une erreur de polling ne touche jamais l'état précédent : une coupure
 * réseau ne doit pas ressembler à un changement d'état côté backend.
 */

use crate::alerts::AlertSink;
use crate::client::FetchError;
use crate::differ::{reconcile_with, AlertDurations, PreviousState};
use crate::models::{
    CameraStatus, EvRoute, Incident, SeriesPoint, SignalState, SignalStatus, Snapshot, StatSeries, TrafficPoint,
};
use crate::poller::PollSubscriber;
use crate::state::{new_state, Shared};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatCard {
    pub title: &'static str,
    pub value: String,
    pub data: Vec<SeriesPoint>,
}

impl StatCard {
    fn new(title: &'static str, series: &StatSeries) -> Self {
        Self { title, value: series.value.clone(), data: series.data.clone() }
    }
}

/// Modèle de rendu du dashboard principal
#[derive(Debug, Clone, Serialize)]
pub struct DashboardModel {
    pub loading: bool,
    pub error: Option<String>,
    pub stat_cards: Vec<StatCard>,
    pub traffic_history: Vec<TrafficPoint>,
    pub optimization_score: Option<f64>,
    pub camera_status: Vec<CameraStatus>,
    pub incident: Option<Incident>,
    pub ev_route: Option<EvRoute>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Default for DashboardModel {
    fn default() -> Self {
        Self {
            loading: true,
            error: None,
            stat_cards: Vec::new(),
            traffic_history: Vec::new(),
            optimization_score: None,
            camera_status: Vec::new(),
            incident: None,
            ev_route: None,
            updated_at: None,
        }
    }
}

impl DashboardModel {
    fn render(&mut self, snap: &Snapshot) {
        let stats = &snap.stats;
        self.loading = false;
        self.error = None;
        self.stat_cards = vec![
            StatCard::new("CPU Usage", &stats.cpu),
            StatCard::new("Memory", &stats.memory),
            StatCard::new("Network Latency", &stats.latency),
            StatCard::new("Active Cameras", &stats.cameras),
            StatCard::new("Avg Response", &stats.response),
        ];
        self.traffic_history = snap.traffic_history.clone();
        self.optimization_score = Some(snap.optimization_score);
        self.camera_status = snap.camera_status.clone();
        self.incident = Some(snap.incident.clone());
        self.ev_route = Some(snap.ev_route.clone());
        self.updated_at = Some(OffsetDateTime::now_utc());
    }
}

pub struct DashboardView {
    previous: Option<PreviousState>,
    durations: AlertDurations,
    sink: Arc<dyn AlertSink>,
    model: Shared<DashboardModel>,
}

impl DashboardView {
    pub fn new(sink: Arc<dyn AlertSink>, durations: AlertDurations) -> Self {
        Self { previous: None, durations, sink, model: new_state(DashboardModel::default()) }
    }

    /// Modèle partagé, à récupérer avant de confier la vue au poller
    pub fn model(&self) -> Shared<DashboardModel> {
        self.model.clone()
    }

    pub fn previous(&self) -> Option<&PreviousState> {
        self.previous.as_ref()
    }
}

impl PollSubscriber<Snapshot> for DashboardView {
    fn on_snapshot(&mut self, snapshot: Arc<Snapshot>) {
        let (events, next) = reconcile_with(self.durations, self.previous.as_ref(), &snapshot);
        if !events.is_empty() {
            debug!(count = events.len(), "snapshot produced alerts");
        }
        for event in events {
            self.sink.emit(event);
        }
        self.previous = Some(next);
        self.model.lock().render(&snapshot);
    }

    fn on_error(&mut self, error: FetchError) {
        let mut model = self.model.lock();
        model.loading = false;
        model.error = Some(error.to_string());
    }
}

/// État d'un flux secondaire (pas d'alertes, juste la dernière valeur)
#[derive(Debug, Clone, Serialize)]
pub struct FeedModel<T> {
    pub loading: bool,
    pub error: Option<String>,
    pub data: Option<T>,
}

impl<T> Default for FeedModel<T> {
    fn default() -> Self {
        Self { loading: true, error: None, data: None }
    }
}

pub struct FeedView<T> {
    model: Shared<FeedModel<T>>,
}

impl<T> FeedView<T> {
    pub fn new() -> Self {
        Self { model: new_state(FeedModel::default()) }
    }

    pub fn model(&self) -> Shared<FeedModel<T>> {
        self.model.clone()
    }
}

impl<T> Default for FeedView<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> PollSubscriber<T> for FeedView<T> {
    fn on_snapshot(&mut self, snapshot: Arc<T>) {
        let mut model = self.model.lock();
        model.loading = false;
        model.error = None;
        model.data = Some((*snapshot).clone());
    }

    fn on_error(&mut self, error: FetchError) {
        let mut model = self.model.lock();
        model.loading = false;
        model.error = Some(error.to_string());
    }
}

/// Panneau signal-control: feux + bannière de priorité
#[derive(Debug, Clone, Serialize)]
pub struct SignalPanel {
    pub signal_state: SignalState,
    pub priority_override: bool,
    pub ev_route: EvRoute,
}

impl From<&SignalStatus> for SignalPanel {
    fn from(status: &SignalStatus) -> Self {
        Self {
            signal_state: status.signal_state.clone(),
            priority_override: status.ev_route.active,
            ev_route: status.ev_route.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertEvent, AlertKind};
    use crate::models::LightColor;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<AlertEvent>>);

    impl AlertSink for Collect {
        fn emit(&self, event: AlertEvent) {
            self.0.lock().push(event);
        }
    }

    fn snap(incident_active: bool, ev_active: bool) -> Arc<Snapshot> {
        let mut s = Snapshot::default();
        s.incident = Incident {
            active: incident_active,
            message: "Collision".into(),
            location: "5th & Main".into(),
            optimization_impact: 0.0,
        };
        s.ev_route.active = ev_active;
        s.ev_route.message = "Ambulance en route".into();
        s.stats.cpu.value = "12%".into();
        s.optimization_score = 64.0;
        Arc::new(s)
    }

    fn kinds(sink: &Collect) -> Vec<AlertKind> {
        sink.0.lock().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_first_snapshot_renders_without_alert() {
        let sink = Arc::new(Collect::default());
        let mut view = DashboardView::new(sink.clone(), AlertDurations::default());
        let model = view.model();
        assert!(model.lock().loading);

        view.on_snapshot(snap(true, false));

        assert!(kinds(&sink).is_empty());
        let m = model.lock();
        assert!(!m.loading);
        assert_eq!(m.stat_cards.len(), 5);
        assert_eq!(m.stat_cards[0].title, "CPU Usage");
        assert_eq!(m.stat_cards[0].value, "12%");
        assert_eq!(m.stat_cards[4].title, "Avg Response");
        assert_eq!(m.optimization_score, Some(64.0));
    }

    #[test]
    fn test_error_does_not_advance_previous_state() {
        let sink = Arc::new(Collect::default());
        let mut view = DashboardView::new(sink.clone(), AlertDurations::default());
        let model = view.model();

        view.on_snapshot(snap(true, false));
        let before = view.previous().cloned();

        view.on_error(FetchError::Status { url: "u".into(), status: 500 });
        assert_eq!(view.previous().cloned(), before);
        assert!(model.lock().error.as_deref().unwrap().contains("500"));

        // la reprise compare à l'état d'avant la panne
        view.on_snapshot(snap(false, false));
        assert_eq!(kinds(&sink), vec![AlertKind::IncidentCleared]);
        assert!(model.lock().error.is_none());
    }

    #[test]
    fn test_transitions_forwarded_to_sink() {
        let sink = Arc::new(Collect::default());
        let mut view = DashboardView::new(sink.clone(), AlertDurations::default());

        view.on_snapshot(snap(false, false));
        view.on_snapshot(snap(true, false));
        view.on_snapshot(snap(true, true));
        view.on_snapshot(snap(true, false));

        assert_eq!(
            kinds(&sink),
            vec![AlertKind::IncidentStarted, AlertKind::EvRouteStarted, AlertKind::EvRouteCleared]
        );
    }

    #[test]
    fn test_feed_view_tracks_latest_and_error() {
        let mut view: FeedView<SignalStatus> = FeedView::new();
        let model = view.model();
        let status = SignalStatus {
            signal_state: SignalState { ns: LightColor::Green, ew: LightColor::Red, timer: 99 },
            ev_route: EvRoute { active: true, message: "Ambulance".into(), ..Default::default() },
        };

        view.on_snapshot(Arc::new(status.clone()));
        assert_eq!(model.lock().data.as_ref(), Some(&status));

        view.on_error(FetchError::Transport { url: "u".into(), reason: "refused".into() });
        let m = model.lock();
        assert!(m.error.is_some());
        assert_eq!(m.data.as_ref(), Some(&status));
        assert!(SignalPanel::from(&status).priority_override);
    }
}
