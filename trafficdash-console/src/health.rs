use crate::client::ControlError;
use crate::poller::{PollerProbe, PollerReport};
use crate::state::{new_state, Shared};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct ConsoleHealth {
    pub uptime_seconds: u64,
    pub memory_usage_mb: Option<f32>,
    pub backend_url: String,
    pub pollers: Vec<PollerReport>,
    pub notifications_active: usize,
    /// acceptées par le backend
    pub commands_forwarded: u32,
    /// refusées par le backend ou backend injoignable
    pub commands_rejected: u32,
    /// invalides, jamais envoyées
    pub commands_invalid: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    backend_url: String,
    pollers: Shared<Vec<Arc<dyn PollerProbe>>>,
    commands_forwarded: Arc<AtomicU32>,
    commands_rejected: Arc<AtomicU32>,
    commands_invalid: Arc<AtomicU32>,
}

impl HealthTracker {
    pub fn new(backend_url: &str) -> Self {
        Self {
            start_time: Instant::now(),
            backend_url: backend_url.to_string(),
            pollers: new_state(Vec::new()),
            commands_forwarded: Arc::new(AtomicU32::new(0)),
            commands_rejected: Arc::new(AtomicU32::new(0)),
            commands_invalid: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn track_poller(&self, probe: Arc<dyn PollerProbe>) {
        self.pollers.lock().push(probe);
    }

    pub fn record_command<T>(&self, outcome: &Result<T, ControlError>) {
        let counter = match outcome {
            Ok(_) => &self.commands_forwarded,
            Err(e) if e.is_local() => &self.commands_invalid,
            Err(_) => &self.commands_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, notifications_active: usize) -> ConsoleHealth {
        let pollers = self.pollers.lock().iter().map(|p| p.report()).collect();
        ConsoleHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            memory_usage_mb: get_memory_usage_mb(),
            backend_url: self.backend_url.clone(),
            pollers,
            notifications_active,
            commands_forwarded: self.commands_forwarded.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            commands_invalid: self.commands_invalid.load(Ordering::Relaxed),
        }
    }

    /// Log périodique de l'état des pollers
    pub fn spawn_health_logger(&self, every: Duration) -> task::JoinHandle<()> {
        let tracker = self.clone();
        task::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // premier tick immédiat, rien à dire encore
            loop {
                interval.tick().await;
                let health = tracker.get_health(0);
                for p in &health.pollers {
                    match &p.last_error {
                        Some(err) => warn!(poller = %p.name, failed = p.stats.failed, "backend unreachable: {err}"),
                        None => info!(
                            poller = %p.name,
                            ok = p.stats.succeeded,
                            skipped = p.stats.skipped_ticks,
                            "poller healthy"
                        ),
                    }
                }
                info!(uptime_s = health.uptime_seconds, "console health");
            }
        })
    }
}

fn get_memory_usage_mb() -> Option<f32> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let kb = status
            .lines()
            .find(|l| l.starts_with("VmRSS:"))?
            .split_whitespace()
            .nth(1)?
            .parse::<u64>()
            .ok()?;
        Some(kb as f32 / 1024.0)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollStats;

    struct FixedProbe(&'static str);

    impl PollerProbe for FixedProbe {
        fn report(&self) -> PollerReport {
            PollerReport {
                name: self.0.to_string(),
                target: "http://127.0.0.1:5000/api/all-stats".into(),
                interval_ms: 3_000,
                active: true,
                loading: false,
                last_error: None,
                last_success_at: None,
                stats: PollStats { dispatched: 4, succeeded: 4, ..Default::default() },
            }
        }
    }

    #[test]
    fn test_health_aggregates_pollers_and_commands() {
        let tracker = HealthTracker::new("http://127.0.0.1:5000");
        tracker.track_poller(Arc::new(FixedProbe("stats")));
        tracker.track_poller(Arc::new(FixedProbe("signal")));
        tracker.record_command(&Ok::<(), ControlError>(()));
        tracker.record_command::<()>(&Err(ControlError::Rejected { status: 403, message: "manual".into() }));
        tracker.record_command::<()>(&Err(ControlError::BrightnessOutOfRange(300)));
        tracker.record_command::<()>(&Err(ControlError::InvalidLed("LED9".into())));
        tracker.record_command(&Ok::<(), ControlError>(()));

        let health = tracker.get_health(2);
        assert_eq!(health.pollers.len(), 2);
        assert_eq!(health.pollers[1].name, "signal");
        assert_eq!(health.commands_forwarded, 2);
        assert_eq!(health.commands_rejected, 1);
        assert_eq!(health.commands_invalid, 2);
        assert_eq!(health.notifications_active, 2);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memory_usage_readable_on_linux() {
        assert!(get_memory_usage_mb().unwrap() > 0.0);
    }
}
