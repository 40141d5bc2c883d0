//! Periodic health sweeps and the one-shot startup sweep.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use vigil_common::{HealthSweep, ResourceState, SessionHealthReport, SessionId, SweepSummary};

use crate::events::{self, EventBus};
use crate::health::HealthService;
use crate::store::{SessionStore, StoreError};

#[derive(Debug, Serialize)]
struct HealthChanged<'a> {
    session_id: &'a SessionId,
    previous: Option<&'a ResourceState>,
    current: &'a ResourceState,
    recommended_action: Option<vigil_common::AvailableAction>,
}

#[derive(Debug, Serialize)]
struct StartupAttention<'a> {
    count: usize,
    reports: &'a [SessionHealthReport],
}

#[derive(Debug, Clone)]
struct LatestSweep {
    sweep: HealthSweep,
    finished_at: Instant,
}

/// Drives sweeps over the session store and keeps the latest result.
#[derive(Clone)]
pub struct HealthPoller {
    service: HealthService,
    store: Arc<dyn SessionStore>,
    events: EventBus,
    interval: Duration,
    latest: Arc<RwLock<Option<LatestSweep>>>,
    attention: Arc<RwLock<Vec<SessionHealthReport>>>,
    startup_done: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl HealthPoller {
    pub fn new(
        service: HealthService,
        store: Arc<dyn SessionStore>,
        events: EventBus,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            store,
            events,
            interval,
            latest: Arc::new(RwLock::new(None)),
            attention: Arc::new(RwLock::new(Vec::new())),
            startup_done: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn service(&self) -> &HealthService {
        &self.service
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Result of the most recent sweep.
    pub async fn latest(&self) -> Option<HealthSweep> {
        self.latest.read().await.as_ref().map(|latest| latest.sweep.clone())
    }

    /// The latest sweep if it finished within the cache TTL, otherwise a new
    /// sweep. Serves on-demand callers whether or not the poll loop runs.
    pub async fn current_sweep(&self) -> Result<HealthSweep, StoreError> {
        let ttl = self.service.cache().ttl();
        let fresh = self
            .latest
            .read()
            .await
            .as_ref()
            .filter(|latest| latest.finished_at.elapsed() < ttl)
            .map(|latest| latest.sweep.clone());
        match fresh {
            Some(sweep) => Ok(sweep),
            None => self.poll_once().await,
        }
    }

    /// Reports flagged by the startup sweep.
    pub async fn startup_attention(&self) -> Vec<SessionHealthReport> {
        self.attention.read().await.clone()
    }

    pub fn startup_sweep_done(&self) -> bool {
        self.startup_done.load(Ordering::SeqCst)
    }

    /// Sweep every session in the store once.
    ///
    /// Emits `health_changed` for every session whose state differs from the
    /// previous sweep and `sweep_completed` at the end.
    pub async fn poll_once(&self) -> Result<HealthSweep, StoreError> {
        let sessions = self.store.list().await?;
        let live: HashSet<SessionId> = sessions.iter().map(|s| s.id.clone()).collect();
        let sweep = self.service.sweep(sessions).await;
        self.service.cache().retain(&live);

        let previous_sweep = self.latest().await;
        for (id, report) in &sweep.reports {
            let previous = previous_sweep
                .as_ref()
                .and_then(|prev| prev.reports.get(id))
                .map(|prev| &prev.state);
            if previous == Some(&report.state) {
                continue;
            }
            debug!(session_id = %id, state = %report.state, "Session health changed");
            self.events.emit(
                events::HEALTH_CHANGED,
                &HealthChanged {
                    session_id: id,
                    previous,
                    current: &report.state,
                    recommended_action: report.recommended_action,
                },
            );
        }

        let summary: SweepSummary = sweep.summary();
        self.events.emit(events::SWEEP_COMPLETED, &summary);
        *self.latest.write().await = Some(LatestSweep {
            sweep: sweep.clone(),
            finished_at: Instant::now(),
        });
        Ok(sweep)
    }

    /// Run the startup sweep. Only the first call that loads the session list
    /// does anything; later calls return `None`. A failed load leaves the
    /// sweep pending so the next call tries again.
    pub async fn run_startup_sweep(&self) -> Option<Result<Vec<SessionHealthReport>, StoreError>> {
        if self.startup_done.swap(true, Ordering::SeqCst) {
            return None;
        }

        let sweep = match self.poll_once().await {
            Ok(sweep) => sweep,
            Err(err) => {
                self.startup_done.store(false, Ordering::SeqCst);
                return Some(Err(err));
            }
        };
        let flagged: Vec<SessionHealthReport> = sweep
            .reports
            .into_values()
            .filter(|report| !report.state.is_healthy())
            .collect();

        if flagged.is_empty() {
            info!("Startup sweep: all sessions healthy");
        } else {
            warn!(count = flagged.len(), "Startup sweep: sessions need attention");
        }
        self.events.emit(
            events::STARTUP_ATTENTION,
            &StartupAttention {
                count: flagged.len(),
                reports: &flagged,
            },
        );
        *self.attention.write().await = flagged.clone();
        Some(Ok(flagged))
    }

    /// Start the polling loop. Ticks that fall behind are skipped rather than
    /// queued, so a slow sweep never causes a burst of catch-up sweeps.
    pub fn start(&self, startup_sweep: bool) -> tokio::task::JoinHandle<()> {
        let poller = self.clone();
        poller.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            if startup_sweep {
                if let Some(Err(err)) = poller.run_startup_sweep().await {
                    warn!(code = %err.error_code().code_string(), "Startup sweep failed: {}", err);
                }
            }

            let mut ticker = interval(poller.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if startup_sweep {
                // The startup sweep stands in for the immediate first tick.
                ticker.tick().await;
            }
            info!("Health poller started (interval: {:?})", poller.interval);

            loop {
                ticker.tick().await;
                if !poller.running.load(Ordering::SeqCst) {
                    info!("Health poller stopping");
                    break;
                }
                if startup_sweep && !poller.startup_sweep_done() {
                    if let Some(Err(err)) = poller.run_startup_sweep().await {
                        warn!(code = %err.error_code().code_string(), "Startup sweep failed again: {}", err);
                    }
                    continue;
                }
                match poller.poll_once().await {
                    Ok(sweep) => debug!(
                        total = sweep.reports.len(),
                        attention = sweep.needs_attention_count(),
                        "Poll sweep complete"
                    ),
                    Err(err) => warn!(
                        code = %err.error_code().code_string(),
                        "Failed to list sessions: {}",
                        err
                    ),
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthConfig;
    use crate::probe::ProbeRegistry;
    use crate::probe::mock::MockAdapter;
    use crate::store::MemoryStore;
    use tempfile::TempDir;
    use vigil_common::health::ContainerSnapshot;
    use vigil_common::{BackendKind, RawSnapshot, Session};

    struct Fixture {
        _dir: TempDir,
        poller: HealthPoller,
        store: Arc<MemoryStore>,
        events: EventBus,
        worktree: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let worktree = dir.path().join("wt");
        std::fs::create_dir(&worktree).unwrap();

        let adapter = MockAdapter::new(BackendKind::Container)
            .with_default(Ok(RawSnapshot::Container(ContainerSnapshot::Running)))
            .with(
                "c-stopped",
                crate::probe::mock::MockBehavior::Respond(Ok(RawSnapshot::Container(
                    ContainerSnapshot::Stopped,
                ))),
            );
        let service = HealthService::new(ProbeRegistry::new().with(adapter), HealthConfig::default());
        let store = Arc::new(MemoryStore::new([
            Session::new("a", "a", BackendKind::Container, &worktree).with_backend_id("c-running"),
            Session::new("b", "b", BackendKind::Container, &worktree).with_backend_id("c-stopped"),
        ]));
        let events = EventBus::default();
        let poller = HealthPoller::new(
            service,
            store.clone(),
            events.clone(),
            Duration::from_millis(20),
        );
        Fixture {
            _dir: dir,
            poller,
            store,
            events,
            worktree,
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<String>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(line) = rx.try_recv() {
            out.push(serde_json::from_str(&line).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_startup_sweep_runs_once() {
        let fx = fixture();
        let mut rx = fx.events.subscribe();

        let flagged = fx.poller.run_startup_sweep().await.unwrap().unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].session_id.as_str(), "b");
        assert!(fx.poller.startup_sweep_done());

        let events = drain(&mut rx);
        let attention: Vec<_> = events
            .iter()
            .filter(|e| e["event"] == "startup_attention")
            .collect();
        assert_eq!(attention.len(), 1);
        assert_eq!(attention[0]["data"]["count"], 1);

        assert!(fx.poller.run_startup_sweep().await.is_none());
        fx.poller.poll_once().await.unwrap();
        assert!(
            drain(&mut rx)
                .iter()
                .all(|e| e["event"] != "startup_attention")
        );
        assert_eq!(fx.poller.startup_attention().await.len(), 1);
    }

    /// Fails the first `failures` listings, then serves the wrapped store.
    struct FlakyStore {
        inner: MemoryStore,
        failures: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SessionStore for FlakyStore {
        async fn list(&self) -> Result<Vec<Session>, StoreError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Read {
                    path: "sessions.json".into(),
                    source: std::io::Error::other("device busy"),
                });
            }
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_failed_session_load_keeps_startup_sweep_pending() {
        let fx = fixture();
        let sessions = fx.store.list().await.unwrap();
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(sessions),
            failures: std::sync::atomic::AtomicUsize::new(1),
        });
        let poller = HealthPoller::new(
            fx.poller.service().clone(),
            store,
            fx.events.clone(),
            Duration::from_millis(20),
        );

        let err = poller.run_startup_sweep().await.unwrap().unwrap_err();
        assert_eq!(err.error_code().code_string(), "VGL-E200");
        assert!(!poller.startup_sweep_done());
        assert!(poller.startup_attention().await.is_empty());

        let flagged = poller.run_startup_sweep().await.unwrap().unwrap();
        assert_eq!(flagged.len(), 1);
        assert!(poller.startup_sweep_done());
        assert!(poller.run_startup_sweep().await.is_none());
    }

    #[tokio::test]
    async fn test_current_sweep_refreshes_after_ttl() {
        let dir = TempDir::new().unwrap();
        let worktree = dir.path().join("wt");
        std::fs::create_dir(&worktree).unwrap();
        let adapter = MockAdapter::new(BackendKind::Container)
            .with_default(Ok(RawSnapshot::Container(ContainerSnapshot::Running)));
        let service = HealthService::new(
            ProbeRegistry::new().with(adapter),
            HealthConfig {
                cache_ttl: Duration::from_millis(30),
                ..HealthConfig::default()
            },
        );
        let store = Arc::new(MemoryStore::new([Session::new(
            "a",
            "a",
            BackendKind::Container,
            &worktree,
        )
        .with_backend_id("c-a")]));
        let poller = HealthPoller::new(
            service,
            store.clone(),
            EventBus::default(),
            Duration::from_secs(60),
        );

        assert_eq!(poller.current_sweep().await.unwrap().reports.len(), 1);
        store
            .upsert(Session::new("b", "b", BackendKind::Container, &worktree).with_backend_id("c-b"))
            .await;
        assert_eq!(poller.current_sweep().await.unwrap().reports.len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(poller.current_sweep().await.unwrap().reports.len(), 2);
    }

    #[tokio::test]
    async fn test_health_changed_only_on_change() {
        let fx = fixture();
        let mut rx = fx.events.subscribe();

        fx.poller.poll_once().await.unwrap();
        let first = drain(&mut rx);
        assert_eq!(
            first.iter().filter(|e| e["event"] == "health_changed").count(),
            2
        );
        assert_eq!(
            first.iter().filter(|e| e["event"] == "sweep_completed").count(),
            1
        );

        fx.poller.poll_once().await.unwrap();
        let second = drain(&mut rx);
        assert_eq!(
            second.iter().filter(|e| e["event"] == "health_changed").count(),
            0
        );

        fx.store
            .upsert(
                Session::new("b", "b", BackendKind::Container, &fx.worktree)
                    .with_backend_id("c-running"),
            )
            .await;
        fx.poller.poll_once().await.unwrap();
        let changed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| e["event"] == "health_changed")
            .collect();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0]["data"]["session_id"], "b");
        assert_eq!(changed[0]["data"]["previous"]["type"], "stopped");
        assert_eq!(changed[0]["data"]["current"]["type"], "healthy");
    }

    #[tokio::test]
    async fn test_removed_sessions_leave_cache() {
        let fx = fixture();
        fx.poller.poll_once().await.unwrap();
        assert_eq!(fx.poller.service().cache().len(), 2);

        fx.store.remove(&SessionId::new("a")).await;
        let sweep = fx.poller.poll_once().await.unwrap();
        assert_eq!(sweep.reports.len(), 1);
        assert_eq!(fx.poller.service().cache().len(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let fx = fixture();
        let handle = fx.poller.start(true);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(fx.poller.startup_sweep_done());
        assert!(fx.poller.latest().await.is_some());

        fx.poller.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
