//! Health aggregation: probe, classify and assemble reports for sessions.
//!
//! [`HealthService::sweep`] fans out across sessions with bounded
//! concurrency. Each session is evaluated in its own task, so a probe that
//! errors, times out or panics only degrades that session's report. A session
//! is probed by at most one task at a time; overlapping requests reuse the
//! last cached report instead of queueing a second probe.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};
use vigil_common::{
    BackendKind, ErrorCode, HealthSweep, Observation, ProbeError, RawSnapshot, Session, SessionContext,
    SessionHealthReport, SessionId, SessionStatus, WorktreePresence, classify,
    evaluate_observation, evaluation_failed,
};

use crate::probe::ProbeRegistry;

/// Default cap on concurrent probes.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;
/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default cache TTL.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);

/// Settings for the health service.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub probe_timeout: Duration,
    pub max_concurrent: usize,
    pub cache_ttl: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl HealthConfig {
    pub fn from_daemon(config: &vigil_common::DaemonConfig) -> Self {
        Self {
            probe_timeout: config.probes.timeout(),
            max_concurrent: config.probes.max_concurrent,
            cache_ttl: config.poller.cache_ttl(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedReport {
    report: SessionHealthReport,
    refreshed_at: Instant,
}

/// Last report per session plus when it was computed.
///
/// Owned by the service. The decision engines never read it.
#[derive(Debug)]
pub struct HealthCache {
    ttl: Duration,
    entries: RwLock<HashMap<SessionId, CachedReport>>,
}

impl HealthCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn insert(&self, report: SessionHealthReport) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            report.session_id.clone(),
            CachedReport {
                report,
                refreshed_at: Instant::now(),
            },
        );
    }

    /// Last report regardless of age.
    pub fn get(&self, id: &SessionId) -> Option<SessionHealthReport> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(id).map(|cached| cached.report.clone())
    }

    /// Last report if it was refreshed within the TTL.
    pub fn fresh(&self, id: &SessionId) -> Option<SessionHealthReport> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(id)
            .filter(|cached| cached.refreshed_at.elapsed() < self.ttl)
            .map(|cached| cached.report.clone())
    }

    /// Drop entries for sessions that no longer exist.
    pub fn retain(&self, live: &HashSet<SessionId>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|id, _| live.contains(id));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sessions with a probe outstanding.
#[derive(Debug, Default)]
struct InFlight {
    ids: Mutex<HashSet<SessionId>>,
    settled: Notify,
}

impl InFlight {
    fn claim(self: &Arc<Self>, id: &SessionId) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        ids.insert(id.clone()).then(|| InFlightGuard {
            owner: Arc::clone(self),
            id: id.clone(),
        })
    }

    fn contains(&self, id: &SessionId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    async fn wait_settled(&self, id: &SessionId) {
        loop {
            let notified = self.settled.notified();
            if !self.contains(id) {
                return;
            }
            notified.await;
        }
    }
}

/// Releases the in-flight marker when the probing task finishes, including
/// when it panics.
struct InFlightGuard {
    owner: Arc<InFlight>,
    id: SessionId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.owner
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        self.owner.settled.notify_waiters();
    }
}

/// Probes sessions and turns the results into health reports.
#[derive(Clone)]
pub struct HealthService {
    registry: Arc<ProbeRegistry>,
    probe_timeout: Duration,
    limiter: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
    cache: Arc<HealthCache>,
}

impl HealthService {
    pub fn new(registry: ProbeRegistry, config: HealthConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            probe_timeout: config.probe_timeout,
            limiter: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            in_flight: Arc::new(InFlight::default()),
            cache: Arc::new(HealthCache::new(config.cache_ttl)),
        }
    }

    pub fn cache(&self) -> &HealthCache {
        &self.cache
    }

    /// Evaluate one session.
    ///
    /// Does not consult the cache or the in-flight markers; shared callers
    /// go through [`Self::report_for`] or [`Self::sweep`].
    #[instrument(skip_all, fields(session_id = %session.id, backend = %session.backend))]
    pub async fn evaluate(&self, session: &Session) -> SessionHealthReport {
        let observation = self.observe(session).await;
        if let Observation::Probed {
            worktree,
            snapshot: Ok(snapshot),
        } = &observation
        {
            log_classification_failure(session, *worktree, snapshot);
        }
        let report = evaluate_observation(session, observation);
        debug!(state = %report.state, data_safe = report.data_safe, "Evaluated session");
        report
    }

    async fn observe(&self, session: &Session) -> Observation {
        if session.status == SessionStatus::Archived {
            return Observation::Archived;
        }
        if session.backend == BackendKind::Unsupported {
            return Observation::probed(
                WorktreePresence::NotTracked,
                Err(ProbeError::NoAdapter(BackendKind::Unsupported)),
            );
        }
        let worktree = worktree_presence(session).await;
        if worktree == WorktreePresence::Missing {
            return Observation::WorktreeMissing;
        }
        if session.backend_id.is_none() {
            return Observation::NoBackendResource;
        }
        Observation::probed(worktree, self.probe(session).await)
    }

    async fn probe(&self, session: &Session) -> Result<RawSnapshot, ProbeError> {
        let adapter = self.registry.get(session.backend)?;
        let started = Instant::now();
        match tokio::time::timeout(self.probe_timeout, adapter.probe(session)).await {
            Ok(Ok(snapshot)) => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Probe completed");
                Ok(snapshot)
            }
            Ok(Err(err)) => {
                warn!(code = %err.error_code().code_string(), "Probe failed: {}", err);
                Err(err)
            }
            Err(_) => {
                warn!(timeout = ?self.probe_timeout, "Probe timed out");
                Err(ProbeError::Timeout(self.probe_timeout))
            }
        }
    }

    /// Report for one session, served from the cache when fresh.
    ///
    /// If another task is already probing the session this waits for it
    /// rather than probing again.
    pub async fn report_for(&self, session: &Session) -> SessionHealthReport {
        if let Some(report) = self.cache.fresh(&session.id) {
            return report;
        }
        loop {
            if let Some(_guard) = self.in_flight.claim(&session.id) {
                let report = self.evaluate(session).await;
                self.cache.insert(report.clone());
                return report;
            }
            self.in_flight.wait_settled(&session.id).await;
            if let Some(report) = self.cache.fresh(&session.id) {
                return report;
            }
        }
    }

    /// Evaluate every session concurrently.
    ///
    /// Sessions being created or deleted are skipped. Sessions whose previous
    /// probe is still running are listed in `coalesced` and carry their last
    /// cached report, if any.
    pub async fn sweep(&self, sessions: Vec<Session>) -> HealthSweep {
        let mut sweep = HealthSweep::default();
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, Session> = HashMap::new();

        for session in sessions {
            if session.status.is_transitioning() {
                debug!(session_id = %session.id, status = ?session.status, "Skipping transitioning session");
                continue;
            }
            let Some(guard) = self.in_flight.claim(&session.id) else {
                debug!(session_id = %session.id, "Probe already in flight, coalescing");
                if let Some(report) = self.cache.get(&session.id) {
                    sweep.reports.insert(session.id.clone(), report);
                }
                sweep.coalesced.push(session.id);
                continue;
            };

            let service = self.clone();
            let task_session = session.clone();
            let handle = tasks.spawn(async move {
                let _guard = guard;
                let _permit = service.limiter.clone().acquire_owned().await;
                let report = service.evaluate(&task_session).await;
                service.cache.insert(report.clone());
                report
            });
            pending.insert(handle.id(), session);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, report)) => {
                    pending.remove(&id);
                    sweep.reports.insert(report.session_id.clone(), report);
                }
                Err(err) => {
                    let Some(session) = pending.remove(&err.id()) else {
                        error!("Sweep task failed for an unknown session: {}", err);
                        continue;
                    };
                    let message = panic_message(err);
                    error!(
                        session_id = %session.id,
                        code = %ErrorCode::InternalEvaluationPanicked.code_string(),
                        "Session evaluation failed: {}",
                        message
                    );
                    let report = evaluation_failed(
                        &session,
                        ErrorCode::InternalEvaluationPanicked,
                        &message,
                    );
                    self.cache.insert(report.clone());
                    sweep.reports.insert(session.id.clone(), report);
                }
            }
        }

        sweep
    }
}

async fn worktree_presence(session: &Session) -> WorktreePresence {
    if !session.backend.tracks_local_worktree() {
        return WorktreePresence::NotTracked;
    }
    WorktreePresence::from_exists(tokio::fs::try_exists(&session.worktree_path).await)
}

fn log_classification_failure(session: &Session, worktree: WorktreePresence, snapshot: &RawSnapshot) {
    if let Err(err) = classify(session.backend, snapshot, &SessionContext::new(worktree)) {
        error!(
            code = %err.error_code().code_string(),
            ?snapshot,
            "Backend state could not be classified: {}",
            err
        );
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("evaluation panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("evaluation panicked: {message}")
    } else {
        "evaluation panicked".to_string()
    }
}
