//! Gate-driven periodic sync.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::mirror::MirrorStore;

use super::cycle::{apply_fetch_result, SyncObserver};
use super::gate::{GateDecision, GateInputs};
use super::source::SnapshotSource;

/// Time between cycles while the gate stays open.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Not mounted
    Idle,
    /// Mounted, auth provider still loading
    WaitingForAuth,
    /// Mounted, but signed out, not admin, or offline
    GatedOff,
    /// Timer running, no cycle in flight
    Active,
    /// One cycle in flight
    Syncing,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "idle"),
            SyncPhase::WaitingForAuth => write!(f, "waiting for auth"),
            SyncPhase::GatedOff => write!(f, "gated off"),
            SyncPhase::Active => write!(f, "active"),
            SyncPhase::Syncing => write!(f, "syncing"),
        }
    }
}

/// One uninterrupted stretch of the gate being open.
struct Session {
    id: u64,
    timer: JoinHandle<()>,
}

struct SchedulerState {
    phase: SyncPhase,
    mounted: bool,
    inputs: GateInputs,
    session: Option<Session>,
    next_session_id: u64,
    /// Session whose cycle is fetching right now, current or not.
    in_flight: Option<u64>,
    /// The current session's first tick arrived while an earlier session's
    /// cycle was still fetching; run it once that cycle ends.
    deferred_tick: bool,
}

impl SchedulerState {
    fn is_current(&self, session_id: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == session_id)
    }

    /// Cancel the session timer, if any. In-flight cycles run to completion
    /// but no longer count as current.
    fn teardown(&mut self) -> bool {
        self.deferred_tick = false;
        match self.session.take() {
            Some(session) => {
                session.timer.abort();
                debug!(session = session.id, "Sync session torn down");
                true
            }
            None => false,
        }
    }
}

struct Shared<S> {
    source: S,
    mirror: MirrorStore,
    observer: Arc<dyn SyncObserver>,
    state: Mutex<SchedulerState>,
}

/// Keeps the mirror fresh while the sync gate is open.
///
/// Hosts call `mount` when the owning view appears, `update` whenever auth or
/// connectivity changes, and `unmount` (or drop) when it goes away.
pub struct SyncScheduler<S: SnapshotSource + 'static> {
    shared: Arc<Shared<S>>,
}

impl<S: SnapshotSource + 'static> SyncScheduler<S> {
    pub fn new(source: S, mirror: MirrorStore, observer: Arc<dyn SyncObserver>) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                mirror,
                observer,
                state: Mutex::new(SchedulerState {
                    phase: SyncPhase::Idle,
                    mounted: false,
                    inputs: GateInputs::default(),
                    session: None,
                    next_session_id: 0,
                    in_flight: None,
                    deferred_tick: false,
                }),
            }),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.shared.lock().phase
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.lock().mounted
    }

    /// Start evaluating the gate with `inputs`. Mounting twice is harmless.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn mount(&self, inputs: GateInputs) {
        let mut state = self.shared.lock();
        state.mounted = true;
        state.inputs = inputs;
        self.shared.evaluate(&mut state);
    }

    /// Re-evaluate after an auth or connectivity change.
    pub fn update(&self, inputs: GateInputs) {
        let mut state = self.shared.lock();
        if state.inputs == inputs {
            return;
        }
        state.inputs = inputs;
        if state.mounted {
            self.shared.evaluate(&mut state);
        }
    }

    /// Stop syncing and return to `Idle`.
    pub fn unmount(&self) {
        let mut state = self.shared.lock();
        state.mounted = false;
        self.shared.evaluate(&mut state);
    }
}

impl<S: SnapshotSource + 'static> Drop for SyncScheduler<S> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<S: SnapshotSource + 'static> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn evaluate(self: &Arc<Self>, state: &mut SchedulerState) {
        if !state.mounted {
            state.teardown();
            state.phase = SyncPhase::Idle;
            return;
        }

        match state.inputs.decide() {
            GateDecision::AwaitingAuth => {
                state.teardown();
                state.phase = SyncPhase::WaitingForAuth;
            }
            GateDecision::Closed(reason) => {
                if state.teardown() {
                    info!(reason = %reason, "Sync gate closed, stopping background sync");
                } else if state.phase != SyncPhase::GatedOff {
                    debug!(reason = %reason, "Sync gate closed");
                }
                state.phase = SyncPhase::GatedOff;
            }
            GateDecision::Open => {
                if state.session.is_none() {
                    self.start_session(state);
                }
            }
        }
    }

    fn start_session(self: &Arc<Self>, state: &mut SchedulerState) {
        state.next_session_id += 1;
        let id = state.next_session_id;
        state.phase = SyncPhase::Active;

        let shared = Arc::clone(self);
        let timer = tokio::spawn(async move { shared.run_timer(id).await });
        state.session = Some(Session { id, timer });

        info!(session = id, interval_secs = SYNC_INTERVAL.as_secs(), "Background sync started");
    }

    /// Fires immediately, then every `SYNC_INTERVAL`, until aborted.
    async fn run_timer(self: Arc<Self>, session_id: u64) {
        let mut ticker = tokio::time::interval(SYNC_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.on_tick(session_id);
        }
    }

    fn on_tick(self: &Arc<Self>, session_id: u64) {
        let mut state = self.lock();
        if !state.is_current(session_id) {
            return;
        }
        let running = state.in_flight;
        match running {
            Some(running) if running == session_id => {
                debug!(session = session_id, "Previous sync cycle still running, skipping tick");
            }
            Some(running) => {
                debug!(
                    session = session_id,
                    previous = running,
                    "Earlier session's cycle still running, deferring tick"
                );
                state.deferred_tick = true;
            }
            None => self.start_cycle(&mut state, session_id),
        }
    }

    fn start_cycle(self: &Arc<Self>, state: &mut SchedulerState, session_id: u64) {
        state.in_flight = Some(session_id);
        state.phase = SyncPhase::Syncing;

        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.run_cycle(session_id).await });
    }

    async fn run_cycle(self: Arc<Self>, session_id: u64) {
        debug!(session = session_id, "Sync cycle started");
        let fetched = self.source.fetch_snapshot().await;

        let outcome = {
            // Hold the lock across the write so teardown cannot interleave
            // between the currency check and the mirror update.
            let mut state = self.lock();
            state.in_flight = None;

            if !state.is_current(session_id) {
                debug!(session = session_id, "Sync session ended mid-cycle, discarding result");
                if state.deferred_tick {
                    state.deferred_tick = false;
                    if let Some(current) = state.session.as_ref().map(|s| s.id) {
                        self.start_cycle(&mut state, current);
                    }
                }
                return;
            }
            state.phase = SyncPhase::Active;
            apply_fetch_result(&self.mirror, fetched)
        };

        self.observer.on_outcome(&outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthSnapshot;
    use crate::models::{OutingId, Role, Snapshot};
    use crate::notify::Notifier;
    use crate::sync::SyncOutcome;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// Serves a different snapshot per call; call 1 has outings 1 and 2,
    /// later calls only outing 1.
    struct FakeSource {
        calls: AtomicUsize,
        delay: Duration,
        fail: AtomicBool,
    }

    impl FakeSource {
        fn new() -> Arc<Self> {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    fn snapshot_for_call(n: usize) -> Snapshot {
        let json = if n == 1 {
            r#"{
                "user": {"id": "u1", "name": "Pat", "role": "admin"},
                "outings": [{"id": "1", "name": "Outing v1"}, {"id": "2", "name": "Hike"}],
                "rosters": {
                    "1": [{"id": "m1", "firstName": "Sam", "lastName": "Lee"}],
                    "2": [{"id": "m2", "firstName": "Ana", "lastName": "Ruiz"}]
                }
            }"#
            .to_string()
        } else {
            format!(
                r#"{{
                    "user": {{"id": "u1", "name": "Pat", "role": "admin"}},
                    "outings": [{{"id": "1", "name": "Outing v{n}"}}],
                    "rosters": {{"1": []}}
                }}"#
            )
        };
        serde_json::from_str(&json).unwrap()
    }

    #[async_trait]
    impl SnapshotSource for Arc<FakeSource> {
        async fn fetch_snapshot(&self) -> Result<Snapshot> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("server returned 503");
            }
            Ok(snapshot_for_call(n))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        outcomes: Mutex<Vec<SyncOutcome>>,
    }

    impl RecordingObserver {
        fn outcomes(&self) -> Vec<SyncOutcome> {
            self.outcomes.lock().unwrap().clone()
        }
    }

    impl SyncObserver for RecordingObserver {
        fn on_outcome(&self, outcome: &SyncOutcome) {
            self.outcomes.lock().unwrap().push(outcome.clone());
        }
    }

    struct Harness {
        source: Arc<FakeSource>,
        mirror: MirrorStore,
        observer: Arc<RecordingObserver>,
        scheduler: SyncScheduler<Arc<FakeSource>>,
    }

    fn harness(source: Arc<FakeSource>) -> Harness {
        let mirror = MirrorStore::in_memory();
        let observer = Arc::new(RecordingObserver::default());
        let scheduler = SyncScheduler::new(
            Arc::clone(&source),
            mirror.clone(),
            observer.clone() as Arc<dyn SyncObserver>,
        );
        Harness {
            source,
            mirror,
            observer,
            scheduler,
        }
    }

    fn admin_online() -> GateInputs {
        GateInputs::new(AuthSnapshot::signed_in(Role::Admin), true)
    }

    fn minutes(n: u64) -> Duration {
        Duration::from_secs(n * 60)
    }

    /// Let spawned tasks run without moving past any pending timer.
    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    fn outing_name(mirror: &MirrorStore) -> Option<String> {
        mirror
            .read_outings()
            .unwrap()
            .and_then(|o| o.data.first().map(|o| o.name.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_is_immediate_then_every_interval() {
        let h = harness(FakeSource::new());
        assert_eq!(h.scheduler.phase(), SyncPhase::Idle);

        h.scheduler.mount(admin_online());
        assert_eq!(h.scheduler.phase(), SyncPhase::Active);
        settle().await;

        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.scheduler.phase(), SyncPhase::Active);
        assert_eq!(outing_name(&h.mirror).as_deref(), Some("Outing v1"));
        assert_eq!(h.observer.outcomes(), vec![SyncOutcome::Synced { outings: 2, rosters: 2 }]);

        sleep(SYNC_INTERVAL).await;
        assert_eq!(h.source.calls(), 2);
        sleep(SYNC_INTERVAL).await;
        assert_eq!(h.source.calls(), 3);
        assert_eq!(outing_name(&h.mirror).as_deref(), Some("Outing v3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_blocks_every_non_admin_combination() {
        let blocked = [
            GateInputs::new(AuthSnapshot::signed_in(Role::Member), true),
            GateInputs::new(AuthSnapshot::signed_in(Role::Unknown), true),
            GateInputs::new(AuthSnapshot::signed_out(), true),
            GateInputs::new(AuthSnapshot::signed_in(Role::Admin), false),
        ];

        for inputs in blocked {
            let h = harness(FakeSource::new());
            h.scheduler.mount(inputs);
            sleep(minutes(60)).await;

            assert_eq!(h.source.calls(), 0, "synced with {inputs:?}");
            assert_eq!(h.scheduler.phase(), SyncPhase::GatedOff);
            assert!(h.observer.outcomes().is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_auth_then_activates() {
        let h = harness(FakeSource::new());
        h.scheduler.mount(GateInputs::new(AuthSnapshot::loading(), true));
        sleep(minutes(30)).await;
        assert_eq!(h.scheduler.phase(), SyncPhase::WaitingForAuth);
        assert_eq!(h.source.calls(), 0);

        h.scheduler.update(admin_online());
        settle().await;
        assert_eq!(h.scheduler.phase(), SyncPhase::Active);
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_during_in_flight_cycle_is_skipped() {
        let h = harness(FakeSource::with_delay(minutes(7)));
        h.scheduler.mount(admin_online());
        settle().await;
        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.scheduler.phase(), SyncPhase::Syncing);

        // The 5 minute tick lands while the first cycle is still running
        sleep(minutes(6)).await;
        assert_eq!(h.source.calls(), 1);
        assert!(h.observer.outcomes().is_empty());
        assert!(h.mirror.read_outings().unwrap().is_none());

        sleep(minutes(2)).await;
        assert_eq!(h.observer.outcomes().len(), 1);
        assert_eq!(h.scheduler.phase(), SyncPhase::Active);

        // Skipped tick was not queued: next cycle starts at the 10 minute tick
        assert_eq!(h.source.calls(), 1);
        sleep(minutes(2)).await;
        assert_eq!(h.source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_mirror_and_next_tick_retries() {
        let h = harness(FakeSource::new());
        h.scheduler.mount(admin_online());
        settle().await;
        assert_eq!(outing_name(&h.mirror).as_deref(), Some("Outing v1"));

        h.source.set_failing(true);
        sleep(SYNC_INTERVAL).await;
        assert_eq!(h.source.calls(), 2);
        assert_eq!(outing_name(&h.mirror).as_deref(), Some("Outing v1"));
        assert!(matches!(
            h.observer.outcomes().last(),
            Some(SyncOutcome::Failed { reason }) if reason.contains("503")
        ));
        assert_eq!(h.scheduler.phase(), SyncPhase::Active);

        h.source.set_failing(false);
        sleep(SYNC_INTERVAL).await;
        assert_eq!(h.source.calls(), 3);
        assert_eq!(outing_name(&h.mirror).as_deref(), Some("Outing v3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_snapshot_overwrites_but_never_deletes() {
        let h = harness(FakeSource::new());
        h.scheduler.mount(admin_online());
        settle().await;
        sleep(SYNC_INTERVAL).await;
        assert_eq!(h.source.calls(), 2);

        let outings = h.mirror.read_outings().unwrap().unwrap().data;
        assert_eq!(outings.len(), 1);
        assert!(h.mirror.read_roster(&OutingId::from("1")).unwrap().unwrap().data.is_empty());
        // Outing 2 dropped out of the second snapshot but its roster remains
        let kept = h.mirror.read_roster(&OutingId::from("2")).unwrap().unwrap().data;
        assert_eq!(kept.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_timer() {
        let h = harness(FakeSource::new());
        h.scheduler.mount(admin_online());
        settle().await;
        assert_eq!(h.source.calls(), 1);

        h.scheduler.unmount();
        assert_eq!(h.scheduler.phase(), SyncPhase::Idle);
        assert!(!h.scheduler.is_mounted());

        sleep(minutes(60)).await;
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_mid_cycle_discards_result() {
        let h = harness(FakeSource::with_delay(minutes(1)));
        h.scheduler.mount(admin_online());
        settle().await;
        assert_eq!(h.scheduler.phase(), SyncPhase::Syncing);

        h.scheduler.unmount();
        sleep(minutes(30)).await;

        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.scheduler.phase(), SyncPhase::Idle);
        assert!(h.observer.outcomes().is_empty());
        assert!(h.mirror.read_outings().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_reopening_starts_fresh_session() {
        let h = harness(FakeSource::new());
        h.scheduler.mount(admin_online());
        settle().await;
        assert_eq!(h.source.calls(), 1);

        sleep(minutes(2)).await;
        h.scheduler.update(GateInputs::new(AuthSnapshot::signed_in(Role::Admin), false));
        assert_eq!(h.scheduler.phase(), SyncPhase::GatedOff);

        sleep(minutes(10)).await;
        assert_eq!(h.source.calls(), 1);

        // Back online: immediate cycle, then a full interval from now
        h.scheduler.update(admin_online());
        settle().await;
        assert_eq!(h.source.calls(), 2);

        sleep(SYNC_INTERVAL - Duration::from_secs(1)).await;
        assert_eq!(h.source.calls(), 2);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(h.source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_during_orphaned_cycle_waits_for_it() {
        let h = harness(FakeSource::with_delay(minutes(2)));
        h.scheduler.mount(admin_online());
        settle().await;
        assert_eq!(h.source.calls(), 1);

        h.scheduler.update(GateInputs::new(AuthSnapshot::signed_in(Role::Admin), false));
        sleep(Duration::from_secs(30)).await;
        h.scheduler.update(admin_online());
        settle().await;

        // Only the orphaned fetch is out; the new session's first tick waits
        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.scheduler.phase(), SyncPhase::Active);

        // Orphan lands at 2m and is discarded; the deferred cycle starts then
        sleep(minutes(2)).await;
        assert_eq!(h.source.calls(), 2);
        assert_eq!(h.scheduler.phase(), SyncPhase::Syncing);
        assert!(h.observer.outcomes().is_empty());
        assert!(h.mirror.read_outings().unwrap().is_none());

        sleep(minutes(2)).await;
        assert_eq!(h.observer.outcomes().len(), 1);
        assert_eq!(outing_name(&h.mirror).as_deref(), Some("Outing v2"));
        assert_eq!(h.scheduler.phase(), SyncPhase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_tick_dropped_if_gate_closes_again() {
        let h = harness(FakeSource::with_delay(minutes(2)));
        h.scheduler.mount(admin_online());
        settle().await;

        h.scheduler.unmount();
        h.scheduler.mount(admin_online());
        settle().await;
        h.scheduler.unmount();

        sleep(minutes(30)).await;
        assert_eq!(h.source.calls(), 1);
        assert!(h.observer.outcomes().is_empty());
        assert_eq!(h.scheduler.phase(), SyncPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_mount_unmount_leaves_single_timer() {
        let h = harness(FakeSource::new());
        for _ in 0..10 {
            h.scheduler.mount(admin_online());
            h.scheduler.unmount();
        }
        h.scheduler.mount(admin_online());
        h.scheduler.mount(admin_online());
        settle().await;
        assert_eq!(h.source.calls(), 1);

        sleep(SYNC_INTERVAL).await;
        assert_eq!(h.source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signing_out_returns_to_gated_off() {
        let h = harness(FakeSource::new());
        h.scheduler.mount(admin_online());
        settle().await;

        h.scheduler.update(GateInputs::new(AuthSnapshot::signed_out(), true));
        assert_eq!(h.scheduler.phase(), SyncPhase::GatedOff);
        sleep(minutes(20)).await;
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_scheduler_stops_syncing() {
        let h = harness(FakeSource::new());
        h.scheduler.mount(admin_online());
        settle().await;

        let source = Arc::clone(&h.source);
        drop(h);
        sleep(minutes(30)).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifier_shows_outcome_without_blocking() {
        let source = FakeSource::new();
        let notifier = Notifier::new();
        let scheduler = SyncScheduler::new(
            Arc::clone(&source),
            MirrorStore::in_memory(),
            Arc::new(notifier.clone()) as Arc<dyn SyncObserver>,
        );

        scheduler.mount(admin_online());
        settle().await;
        assert_eq!(notifier.message().as_deref(), Some("Offline data synced"));

        sleep(Duration::from_millis(2500)).await;
        assert!(notifier.message().is_none());

        source.set_failing(true);
        sleep(SYNC_INTERVAL - Duration::from_millis(2500)).await;
        assert_eq!(notifier.message().as_deref(), Some("Sync failed"));
    }
}
