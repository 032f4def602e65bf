/**
 * SNAPSHOT DIFFER - Réconciliation de snapshots successifs en alertes
 *
 * RÔLE :
 * Compare l'état précédent (incident + route prioritaire) au snapshot reçu
 * et produit les alertes de transition (front montant / descendant).
 *
 * RÈGLES :
 * - Pas d'état précédent (premier snapshot de la session) => aucune alerte
 * - Route prioritaire active dans le snapshot courant => alertes incident muettes
 * - L'état suivant est toujours le snapshot courant, qu'il y ait alerte ou non
 *
 * Fonction pure : l'appelant possède l'état précédent et le repasse à chaque appel.
 */

use crate::alerts::{AlertEvent, AlertKind, AlertPriority};
use crate::config::AlertsConf;
use crate::models::{EvRoute, Incident, Snapshot};
use serde::Serialize;

/// Sous-ensemble d'un snapshot retenu entre deux cycles de polling
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreviousState {
    pub incident: Incident,
    pub ev_route: EvRoute,
}

impl PreviousState {
    pub fn of(snapshot: &Snapshot) -> Self {
        Self { incident: snapshot.incident.clone(), ev_route: snapshot.ev_route.clone() }
    }
}

/// Durées d'affichage appliquées aux alertes produites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertDurations {
    pub default_ms: u64,
    pub priority_ms: u64,
}

impl Default for AlertDurations {
    fn default() -> Self {
        Self { default_ms: 4_000, priority_ms: 10_000 }
    }
}

impl From<&AlertsConf> for AlertDurations {
    fn from(conf: &AlertsConf) -> Self {
        Self { default_ms: conf.default_duration_ms, priority_ms: conf.priority_duration_ms }
    }
}

/// `reconcile` avec les durées par défaut
pub fn reconcile(previous: Option<&PreviousState>, current: &Snapshot) -> (Vec<AlertEvent>, PreviousState) {
    reconcile_with(AlertDurations::default(), previous, current)
}

pub fn reconcile_with(
    durations: AlertDurations,
    previous: Option<&PreviousState>,
    current: &Snapshot,
) -> (Vec<AlertEvent>, PreviousState) {
    let next = PreviousState::of(current);
    let Some(prev) = previous else {
        return (Vec::new(), next);
    };

    let mut events = Vec::new();
    let ev_now = current.ev_route.active;
    let ev_before = prev.ev_route.active;

    if ev_now && !ev_before {
        events.push(AlertEvent {
            kind: AlertKind::EvRouteStarted,
            title: "PRIORITY ALERT".into(),
            message: current.ev_route.message.clone(),
            priority: AlertPriority::Info,
            duration_ms: durations.priority_ms,
        });
    }
    if !ev_now && ev_before {
        events.push(AlertEvent {
            kind: AlertKind::EvRouteCleared,
            title: "Priority Route Cleared".into(),
            message: "Resuming normal traffic flow.".into(),
            priority: AlertPriority::Success,
            duration_ms: durations.default_ms,
        });
    }

    // la route prioritaire masque les alertes incident
    if !ev_now {
        let inc = &current.incident;
        let before = &prev.incident;

        if inc.active && !before.active {
            events.push(AlertEvent {
                kind: AlertKind::IncidentStarted,
                title: "CRITICAL INCIDENT".into(),
                message: format!("{} at {}", inc.message, inc.location),
                priority: AlertPriority::Error,
                duration_ms: durations.priority_ms,
            });
        }
        if !inc.active && before.active {
            events.push(AlertEvent {
                kind: AlertKind::IncidentCleared,
                title: "Incident Cleared".into(),
                message: format!("{} at {} has been resolved.", before.message, before.location),
                priority: AlertPriority::Success,
                duration_ms: durations.default_ms,
            });
        }
        if inc.optimization_impact > 0.0 && before.optimization_impact <= 0.0 {
            events.push(AlertEvent {
                kind: AlertKind::IncidentMitigated,
                title: "AI Response".into(),
                message: format!("Traffic flow re-optimized. Score is now {}.", current.optimization_score),
                priority: AlertPriority::Info,
                duration_ms: durations.default_ms,
            });
        }
    }

    (events, next)
}
