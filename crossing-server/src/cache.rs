//! Adaptive cache for crossing estimates.
//!
//! Holds the last successful fetch and serves it until it goes stale. Data
//! is stale once it is older than the TTL, or as soon as the first held
//! train has already reached the crossing, whichever comes first.
//!
//! While consumers keep reading, a single background task polls and
//! refreshes the data before it reaches the TTL, so reads rarely block.
//! The task stops itself once nobody has read for a while.
//!
//! A failed fetch never replaces held data: a stale list is still served.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::domain::{ArrivalEstimate, Clock};
use crate::feed::FeedError;
use crate::sources::{TrainFetcher, TrainQuery};

/// Configuration for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age before held data is stale.
    pub ttl: Duration,

    /// Age at which the background task refreshes ahead of the TTL.
    pub proactive_refresh: Duration,

    /// How often the background task wakes up.
    pub poll_interval: Duration,

    /// The background task stops after this long without a read.
    pub inactivity_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(120),
            proactive_refresh: Duration::from_secs(60),
            poll_interval: Duration::from_secs(90),
            inactivity_timeout: Duration::from_secs(300),
        }
    }
}

/// Freshness of the held data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// No successful fetch yet.
    Empty,
    Valid,
    Stale,
}

/// The held fetch result. Replaced wholesale, never edited.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    estimates: Arc<Vec<ArrivalEstimate>>,
    captured_at: Option<DateTime<Tz>>,
}

impl Snapshot {
    /// Estimates ordered by crossing arrival.
    pub fn estimates(&self) -> &Arc<Vec<ArrivalEstimate>> {
        &self.estimates
    }

    pub fn captured_at(&self) -> Option<DateTime<Tz>> {
        self.captured_at
    }

    /// Age at `now`, or `None` if nothing has been captured.
    pub fn age(&self, now: DateTime<Tz>) -> Option<chrono::Duration> {
        self.captured_at.map(|t| now - t)
    }

    pub fn freshness(&self, now: DateTime<Tz>, ttl: Duration) -> Freshness {
        let Some(age) = self.age(now) else {
            return Freshness::Empty;
        };

        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        if age >= ttl {
            return Freshness::Stale;
        }

        // The next train has already gone past.
        if self.estimates.first().is_some_and(|next| next.eta_at_crossing < now) {
            return Freshness::Stale;
        }

        Freshness::Valid
    }
}

/// Point-in-time view of the cache, for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub freshness: Freshness,
    pub age_seconds: Option<i64>,
    pub entries: usize,
    pub background_running: bool,
}

struct Inner<F> {
    fetcher: F,
    query: TrainQuery,
    config: CacheConfig,
    clock: Arc<dyn Clock>,

    snapshot: RwLock<Arc<Snapshot>>,
    last_activity: Mutex<Option<DateTime<Tz>>>,
    running: AtomicBool,

    /// Serializes fetch cycles so concurrent cold reads fetch once.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl<F: TrainFetcher> Inner<F> {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn replace(&self, snapshot: Snapshot) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(snapshot);
    }

    fn record_activity(&self, now: DateTime<Tz>) {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
    }

    fn last_activity(&self) -> Option<DateTime<Tz>> {
        *self.last_activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one fetch cycle. Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<usize, FeedError> {
        match self.fetcher.fetch(&self.query).await {
            Ok(estimates) => {
                let count = estimates.len();
                self.replace(Snapshot {
                    estimates: Arc::new(estimates),
                    captured_at: Some(self.clock.now()),
                });
                info!(station = %self.query.station_code, count, "refreshed train cache");
                Ok(count)
            }
            Err(e) => {
                error!(station = %self.query.station_code, error = %e, "fetch failed, keeping cached data");
                Err(e)
            }
        }
    }

    async fn refresh(&self) -> Result<usize, FeedError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Fetch unless another caller refreshed while we waited for the lock.
    async fn refresh_if_not_valid(&self) -> Arc<Snapshot> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.snapshot();
        if current.freshness(self.clock.now(), self.config.ttl) == Freshness::Valid {
            return current;
        }

        // Failure is logged inside; the previous snapshot stays.
        let _ = self.refresh_locked().await;
        self.snapshot()
    }

    /// Whether nobody has read within the inactivity window.
    fn is_idle(&self, now: DateTime<Tz>) -> bool {
        let inactivity = chrono::Duration::from_std(self.config.inactivity_timeout)
            .unwrap_or(chrono::Duration::MAX);
        self.last_activity()
            .is_none_or(|last| now - last > inactivity)
    }

    /// Give up the running flag after an idle check.
    ///
    /// A read that landed between the check and the release could not start
    /// its own task, so activity is checked once more; if there is some, the
    /// flag is taken back. Returns `true` if the task should stop.
    fn try_stop(&self, flag: &mut RunningFlag<'_>) -> bool {
        flag.release();
        if !self.is_idle(self.clock.now()) && flag.reclaim() {
            debug!("reader arrived while stopping, background refresh continues");
            return false;
        }
        true
    }

    /// Body of the background task.
    async fn poll_loop(self: Arc<Self>) {
        // Cleared on every exit, including a panic in the fetcher.
        let mut flag = RunningFlag::held(&self.running);
        debug!("background refresh started");
        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let now = self.clock.now();
            if self.is_idle(now) && self.try_stop(&mut flag) {
                info!("no recent readers, background refresh stopped");
                return;
            }

            let proactive = chrono::Duration::from_std(self.config.proactive_refresh)
                .unwrap_or(chrono::Duration::MAX);
            let due = self.snapshot().age(now).is_none_or(|age| age > proactive);
            if due {
                debug!("proactive refresh");
                let _ = self.refresh().await;
            }
        }
    }
}

/// Ownership of the background task's running flag.
///
/// Clears the flag on drop if still held, so a task that dies for any
/// reason leaves the cache able to start a new one.
struct RunningFlag<'a> {
    flag: &'a AtomicBool,
    held: bool,
}

impl<'a> RunningFlag<'a> {
    /// Wrap a flag the caller has already set.
    fn held(flag: &'a AtomicBool) -> Self {
        Self { flag, held: true }
    }

    fn release(&mut self) {
        if self.held {
            self.flag.store(false, Ordering::SeqCst);
            self.held = false;
        }
    }

    /// Set the flag again unless another task has claimed it.
    fn reclaim(&mut self) -> bool {
        self.held = self
            .flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.held
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Train estimate cache with demand-driven background refresh.
///
/// Cloning is cheap and clones share state.
pub struct AdaptiveCache<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for AdaptiveCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: TrainFetcher> AdaptiveCache<F> {
    /// Create an empty cache. Nothing is fetched until the first read.
    pub fn new(fetcher: F, query: TrainQuery, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                query,
                config,
                clock,
                snapshot: RwLock::new(Arc::new(Snapshot::default())),
                last_activity: Mutex::new(None),
                running: AtomicBool::new(false),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Current estimates.
    ///
    /// Records reader activity and makes sure the background task is
    /// running. Returns held data when valid; otherwise runs a fetch cycle
    /// first. If that fails, whatever is held (possibly stale or empty) is
    /// returned.
    pub async fn get_estimates(&self) -> Arc<Vec<ArrivalEstimate>> {
        let now = self.inner.clock.now();
        self.inner.record_activity(now);
        self.ensure_background_refresh();

        let current = self.inner.snapshot();
        if current.freshness(now, self.inner.config.ttl) == Freshness::Valid {
            return Arc::clone(&current.estimates);
        }

        let refreshed = self.inner.refresh_if_not_valid().await;
        Arc::clone(&refreshed.estimates)
    }

    /// Force a fetch cycle, regardless of freshness.
    pub async fn refresh(&self) -> Result<usize, FeedError> {
        self.inner.refresh().await
    }

    /// Start the background task unless one is already running.
    ///
    /// Returns `true` if this call started it. Must be called from within
    /// a Tokio runtime.
    pub fn ensure_background_refresh(&self) -> bool {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.poll_loop());
        true
    }

    pub fn is_background_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// The held snapshot, without touching activity or freshness.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot()
    }

    pub fn freshness(&self) -> Freshness {
        self.inner
            .snapshot()
            .freshness(self.inner.clock.now(), self.inner.config.ttl)
    }

    pub fn status(&self) -> CacheStatus {
        let now = self.inner.clock.now();
        let snapshot = self.inner.snapshot();
        CacheStatus {
            freshness: snapshot.freshness(now, self.inner.config.ttl),
            age_seconds: snapshot.age(now).map(|a| a.num_seconds()),
            entries: snapshot.estimates.len(),
            background_running: self.is_background_running(),
        }
    }

    pub fn query(&self) -> &TrainQuery {
        &self.inner.query
    }

    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;

    use crate::domain::{EtaDeriver, ManualClock, SourceTag, TrainNumber};

    /// Returns trains arriving at fixed offsets from the clock's current
    /// time, or fails on demand.
    struct StubFetcher {
        clock: Arc<ManualClock>,
        offsets_secs: Mutex<Vec<i64>>,
        fail: AtomicBool,
        panic: AtomicBool,
        calls: AtomicU32,
    }

    impl StubFetcher {
        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_offsets(&self, offsets: Vec<i64>) {
            *self.offsets_secs.lock().unwrap() = offsets;
        }
    }

    impl TrainFetcher for StubFetcher {
        async fn fetch(&self, _query: &TrainQuery) -> Result<Vec<ArrivalEstimate>, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic.load(Ordering::SeqCst) {
                panic!("fetcher blew up");
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(FeedError::Timeout);
            }
            let now = self.clock.now();
            let offsets = self.offsets_secs.lock().unwrap().clone();
            Ok(offsets
                .into_iter()
                .enumerate()
                .map(|(i, secs)| {
                    ArrivalEstimate::derive(
                        TrainNumber::parse(&format!("1000{i}")).unwrap(),
                        "stub",
                        now + chrono::Duration::seconds(secs),
                        &EtaDeriver::new(0.0, 50.0, 30.0),
                        SourceTag::Simulated,
                    )
                })
                .collect())
        }
    }

    fn start() -> DateTime<Tz> {
        Kolkata.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap()
    }

    fn setup(offsets: Vec<i64>) -> (AdaptiveCache<StubFetcher>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let fetcher = StubFetcher {
            clock: Arc::clone(&clock),
            offsets_secs: Mutex::new(offsets),
            fail: AtomicBool::new(false),
            panic: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        };
        let cache = AdaptiveCache::new(
            fetcher,
            TrainQuery::default(),
            CacheConfig::default(),
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(120));
        assert_eq!(config.proactive_refresh, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_secs(90));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(300));
        assert!(config.proactive_refresh < config.ttl);
    }

    #[test]
    fn snapshot_freshness_rules() {
        let empty = Snapshot::default();
        assert_eq!(empty.freshness(start(), Duration::from_secs(120)), Freshness::Empty);

        let captured = Snapshot {
            estimates: Arc::new(Vec::new()),
            captured_at: Some(start()),
        };
        let ttl = Duration::from_secs(120);
        assert_eq!(captured.freshness(start() + chrono::Duration::seconds(119), ttl), Freshness::Valid);
        assert_eq!(captured.freshness(start() + chrono::Duration::seconds(120), ttl), Freshness::Stale);
    }

    #[tokio::test]
    async fn cold_read_fetches_then_hits() {
        let (cache, clock) = setup(vec![600]);
        assert_eq!(cache.freshness(), Freshness::Empty);

        let first = cache.get_estimates().await;
        assert_eq!(first.len(), 1);
        assert_eq!(cache.fetcher().calls(), 1);

        clock.advance(chrono::Duration::seconds(90));
        let second = cache.get_estimates().await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.fetcher().calls(), 1);
    }

    #[tokio::test]
    async fn read_after_ttl_refetches() {
        let (cache, clock) = setup(vec![600]);
        let first = cache.get_estimates().await;

        clock.advance(chrono::Duration::seconds(125));
        assert_eq!(cache.freshness(), Freshness::Stale);

        let second = cache.get_estimates().await;
        assert_eq!(cache.fetcher().calls(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.freshness(), Freshness::Valid);
    }

    #[tokio::test]
    async fn passed_train_invalidates_before_ttl() {
        // Next train crosses 50s after the fetch.
        let (cache, clock) = setup(vec![50, 900]);
        cache.get_estimates().await;

        clock.advance(chrono::Duration::seconds(55));
        assert_eq!(cache.freshness(), Freshness::Stale);

        cache.fetcher().set_offsets(vec![900]);
        let refreshed = cache.get_estimates().await;
        assert_eq!(cache.fetcher().calls(), 2);
        assert_eq!(refreshed.len(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_serves_stale_data() {
        let (cache, clock) = setup(vec![600]);
        let first = cache.get_estimates().await;

        cache.fetcher().fail.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::seconds(125));

        let second = cache.get_estimates().await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.fetcher().calls(), 2);
        assert_eq!(cache.freshness(), Freshness::Stale);
        assert!(cache.refresh().await.is_err());
    }

    #[tokio::test]
    async fn failed_cold_read_is_empty() {
        let (cache, _clock) = setup(vec![600]);
        cache.fetcher().fail.store(true, Ordering::SeqCst);

        let out = cache.get_estimates().await;
        assert!(out.is_empty());
        assert_eq!(cache.freshness(), Freshness::Empty);
    }

    #[tokio::test]
    async fn concurrent_cold_reads_fetch_once() {
        let (cache, _clock) = setup(vec![600]);

        let reads = (0..8).map(|_| cache.get_estimates());
        let results = futures::future::join_all(reads).await;

        assert_eq!(cache.fetcher().calls(), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[tokio::test]
    async fn empty_successful_fetch_is_valid() {
        let (cache, _clock) = setup(vec![]);
        let out = cache.get_estimates().await;
        assert!(out.is_empty());
        assert_eq!(cache.freshness(), Freshness::Valid);

        cache.get_estimates().await;
        assert_eq!(cache.fetcher().calls(), 1);
    }

    #[tokio::test]
    async fn status_reports_age_and_entries() {
        let (cache, clock) = setup(vec![600, 1200]);
        cache.get_estimates().await;
        clock.advance(chrono::Duration::seconds(30));

        let status = cache.status();
        assert_eq!(status.freshness, Freshness::Valid);
        assert_eq!(status.age_seconds, Some(30));
        assert_eq!(status.entries, 2);
        assert!(status.background_running);
    }

    #[tokio::test]
    async fn only_one_background_task() {
        let (cache, _clock) = setup(vec![600]);
        assert!(cache.ensure_background_refresh());
        assert!(!cache.ensure_background_refresh());
        assert!(cache.clone().is_background_running());
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_stops_when_idle() {
        let (cache, clock) = setup(vec![3600]);
        cache.get_estimates().await;
        assert!(cache.is_background_running());

        clock.advance(chrono::Duration::seconds(400));
        tokio::time::sleep(Duration::from_secs(91)).await;

        assert!(!cache.is_background_running());
        assert_eq!(cache.fetcher().calls(), 1);

        // The next read starts it again.
        cache.get_estimates().await;
        assert!(cache.is_background_running());
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_refreshes_ahead_of_ttl() {
        let (cache, clock) = setup(vec![3600]);
        cache.get_estimates().await;

        clock.advance(chrono::Duration::seconds(61));
        tokio::time::sleep(Duration::from_secs(91)).await;

        assert_eq!(cache.fetcher().calls(), 2);
        assert!(cache.is_background_running());
        assert_eq!(cache.snapshot().captured_at(), Some(clock.now()));
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_can_restart_after_panic() {
        let (cache, clock) = setup(vec![3600]);
        cache.get_estimates().await;

        // The proactive refresh panics inside the task.
        cache.fetcher().panic.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::seconds(61));
        tokio::time::sleep(Duration::from_secs(91)).await;

        assert_eq!(cache.fetcher().calls(), 2);
        assert!(!cache.is_background_running());

        cache.fetcher().panic.store(false, Ordering::SeqCst);
        clock.advance(chrono::Duration::seconds(1000));
        assert!(cache.ensure_background_refresh());
        assert!(cache.is_background_running());
    }

    #[test]
    fn stopping_task_keeps_flag_when_reader_arrives() {
        let (cache, clock) = setup(vec![3600]);
        let inner = &cache.inner;
        inner.running.store(true, Ordering::SeqCst);
        let mut flag = RunningFlag::held(&inner.running);

        // A read lands just after the task found the cache idle.
        inner.record_activity(clock.now());

        assert!(!inner.try_stop(&mut flag));
        assert!(inner.running.load(Ordering::SeqCst));

        // Once readers are gone for good, the flag is released.
        clock.advance(chrono::Duration::seconds(400));
        assert!(inner.try_stop(&mut flag));
        assert!(!inner.running.load(Ordering::SeqCst));
        drop(flag);
        assert!(!inner.running.load(Ordering::SeqCst));
    }

    #[test]
    fn stopping_task_yields_to_a_newer_task() {
        let (cache, clock) = setup(vec![3600]);
        let inner = &cache.inner;
        inner.running.store(true, Ordering::SeqCst);
        let mut flag = RunningFlag::held(&inner.running);
        inner.record_activity(clock.now());

        flag.release();
        // Another reader started a fresh task in between.
        inner.running.store(true, Ordering::SeqCst);

        assert!(!flag.reclaim());
        drop(flag);
        assert!(inner.running.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_skips_fresh_data() {
        let (cache, clock) = setup(vec![3600]);
        cache.get_estimates().await;

        clock.advance(chrono::Duration::seconds(30));
        tokio::time::sleep(Duration::from_secs(91)).await;

        assert_eq!(cache.fetcher().calls(), 1);
    }
}
