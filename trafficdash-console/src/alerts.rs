//! Alert events and the transient notification tray.
//!
//! An [`AlertEvent`] is produced by the differ on a state transition. The
//! [`NotificationTray`] sink turns each one into a notification that stays
//! visible for its duration and then disappears on its own: no
//! acknowledgement, no persistence, no replay.

use crate::state::{new_state, Shared};
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// Upper bound on stacked notifications kept in memory.
const MAX_STACKED: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    EvRouteStarted,
    EvRouteCleared,
    IncidentStarted,
    IncidentCleared,
    IncidentMitigated,
}

/// Drives the notification style on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub priority: AlertPriority,
    pub duration_ms: u64,
}

pub trait AlertSink: Send + Sync {
    fn emit(&self, event: AlertEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub priority: AlertPriority,
    pub duration_ms: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub raised_at: OffsetDateTime,
    #[serde(skip)]
    expires_at: Instant,
}

impl Notification {
    fn from_event(event: AlertEvent, now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: event.kind,
            title: event.title,
            message: event.message,
            priority: event.priority,
            duration_ms: event.duration_ms,
            raised_at: OffsetDateTime::now_utc(),
            expires_at: now + Duration::from_millis(event.duration_ms),
        }
    }

    pub fn is_visible_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Pile de notifications auto-expirantes, partagée avec l'API HTTP
#[derive(Clone, Default)]
pub struct NotificationTray {
    items: Shared<Vec<Notification>>,
}

impl NotificationTray {
    pub fn new() -> Self {
        Self { items: new_state(Vec::new()) }
    }

    /// Notifications encore visibles, plus récente en premier
    pub fn active(&self) -> Vec<Notification> {
        self.active_at(Instant::now())
    }

    pub fn active_at(&self, now: Instant) -> Vec<Notification> {
        let mut items = self.items.lock();
        items.retain(|n| n.is_visible_at(now));
        items.iter().rev().cloned().collect()
    }

    fn push(&self, notification: Notification) {
        let mut items = self.items.lock();
        items.push(notification);
        if items.len() > MAX_STACKED {
            let overflow = items.len() - MAX_STACKED;
            items.drain(..overflow);
        }
    }
}

impl AlertSink for NotificationTray {
    fn emit(&self, event: AlertEvent) {
        match event.priority {
            AlertPriority::Error => error!(kind = ?event.kind, "{}: {}", event.title, event.message),
            AlertPriority::Info | AlertPriority::Success => {
                info!(kind = ?event.kind, "{}: {}", event.title, event.message)
            }
        }
        self.push(Notification::from_event(event, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: AlertKind, duration_ms: u64) -> AlertEvent {
        AlertEvent {
            kind,
            title: "t".into(),
            message: "m".into(),
            priority: AlertPriority::Info,
            duration_ms,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_stack_and_expire() {
        let tray = NotificationTray::new();
        tray.emit(event(AlertKind::EvRouteStarted, 10_000));
        tray.emit(event(AlertKind::IncidentCleared, 4_000));

        let visible = tray.active();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].kind, AlertKind::IncidentCleared);

        tokio::time::advance(Duration::from_millis(4_001)).await;
        let visible = tray.active();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].kind, AlertKind::EvRouteStarted);

        tokio::time::advance(Duration::from_millis(6_000)).await;
        assert!(tray.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stack_is_bounded() {
        let tray = NotificationTray::new();
        for _ in 0..(MAX_STACKED + 5) {
            tray.emit(event(AlertKind::IncidentMitigated, 60_000));
        }
        assert_eq!(tray.active().len(), MAX_STACKED);
    }

    #[test]
    fn test_notification_json_shape() {
        let n = Notification::from_event(
            AlertEvent {
                kind: AlertKind::IncidentStarted,
                title: "CRITICAL INCIDENT".into(),
                message: "Collision at 5th & Main".into(),
                priority: AlertPriority::Error,
                duration_ms: 10_000,
            },
            Instant::now(),
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["kind"], "incident_started");
        assert_eq!(json["priority"], "error");
        assert_eq!(json["duration_ms"], 10_000);
        assert!(json.get("expires_at").is_none());
    }
}
