/*!
Test Harness pour la console TrafficDash

- Init du logging de test (env_logger)
- Backend stub démarré et prêt
- Attente active de conditions (pollers asynchrones)
*/

use crate::stub_backend::StubBackend;
use anyhow::Result;
use std::time::{Duration, Instant};

pub struct TestHarness {
    pub backend: StubBackend,
}

impl TestHarness {
    pub async fn start() -> Result<Self> {
        env_logger::builder().is_test(true).try_init().ok();
        let backend = StubBackend::start().await?;
        Ok(Self { backend })
    }

    pub fn base_url(&self) -> String {
        self.backend.base_url()
    }
}

/// Sonde `cond` toutes les 20ms jusqu'à `timeout`; false si jamais satisfaite
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let ok = cond();
    if !ok {
        log::warn!("⏰ condition not met after {:?}", timeout);
    }
    ok
}
