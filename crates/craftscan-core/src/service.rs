//! Craftability service.
//!
//! [`CraftabilityService`] ties the pieces together for one consumer: it
//! builds or loads a recipe index per catalog variant on a background
//! thread, sends scan and fetch requests through a [`ScanTransport`], turns
//! replies into cached result sets, and reports progress on an [`EventBus`].
//!
//! Work finished on background threads comes back through a task queue that
//! [`CraftabilityService::pump`] drains on the owning thread. Every worker
//! carries the generation it was started under; [`CraftabilityService::dispose`]
//! bumps the generation so late results are dropped. Rebuilds are also
//! numbered per context, and only the latest one for a context may replace
//! its cached result.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use craftscan_common::{ContextKey, ScanId};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::display::DisplayResolver;
use crate::events::{EventBus, ServiceEvent};
use crate::fingerprint::{fingerprint, CacheDecision, FingerprintCache, RebuildReason, ResultSet};
use crate::index::RecipeIndex;
use crate::index_cache::IndexCache;
use crate::pool::ResourcePool;
use crate::protocol::{IngredientSet, ProtocolError, ScanReply, ScanRequest};
use crate::provider::RecipeProvider;
use crate::scan_state::{RequestDecision, ScanPhase, ScanScheduler, ScanTicket};
use crate::scanner::CraftabilityScanner;
use crate::variant::CatalogVariant;

/// Service error types.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service is switched off in its configuration
    #[error("Craftability service is disabled")]
    Disabled,
    /// `init` has not been called, or `dispose` has
    #[error("Craftability service is not initialized")]
    NotInitialized,
    /// Fetching is switched off in the configuration
    #[error("Fetching is disabled")]
    FetchDisabled,
    /// A fetch is already running
    #[error("A fetch is already in progress")]
    FetchInProgress,
    /// A scan is in flight and blocks fetching
    #[error("A scan is in flight")]
    ScanInFlight,
    /// No index became ready in time
    #[error("Recipe index for {variant} not ready after {waited:?}")]
    IndexNotReady {
        /// Variant waited for
        variant: CatalogVariant,
        /// How long the caller waited
        waited: Duration,
    },
    /// The index build failed
    #[error("Recipe index build for {variant} failed: {reason}")]
    IndexBuildFailed {
        /// Variant affected
        variant: CatalogVariant,
        /// Failure description
        reason: String,
    },
    /// The transport could not send a request
    #[error("Failed to send request: {0}")]
    Send(String),
    /// A reply could not be interpreted
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// A background worker could not be started
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Outbound side of the scan protocol.
pub trait ScanTransport: Send + Sync {
    /// Sends a request to whoever owns the storage.
    fn send(&self, request: &ScanRequest) -> ServiceResult<()>;
}

#[derive(Debug, Clone)]
enum IndexSlot {
    Building,
    Ready(Arc<RecipeIndex>),
    Failed(String),
}

#[derive(Debug, Default)]
struct RegistryState {
    generation: u64,
    slots: AHashMap<CatalogVariant, IndexSlot>,
}

/// Recipe indexes of one session, one per variant.
///
/// Waiters block on a condition variable until the variant they need is
/// published, fails, or their timeout runs out.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    state: Mutex<RegistryState>,
    changed: Condvar,
}

impl IndexRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a variant for building. Returns false when it is already
    /// built or being built.
    pub fn mark_building(&self, variant: CatalogVariant) -> bool {
        let mut state = self.state.lock();
        match state.slots.get(&variant) {
            Some(IndexSlot::Building | IndexSlot::Ready(_)) => false,
            Some(IndexSlot::Failed(_)) | None => {
                state.slots.insert(variant, IndexSlot::Building);
                true
            },
        }
    }

    /// Publishes an index built under `generation`. Returns false and drops
    /// the index when the registry has moved on.
    pub fn publish(&self, generation: u64, index: Arc<RecipeIndex>) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.slots.insert(index.variant(), IndexSlot::Ready(index));
        self.changed.notify_all();
        true
    }

    /// Records a failed build so waiters stop waiting and a later build may
    /// retry.
    pub fn fail(&self, generation: u64, variant: CatalogVariant, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        state.slots.insert(variant, IndexSlot::Failed(reason.into()));
        self.changed.notify_all();
    }

    /// Index of `variant` if it is ready.
    #[must_use]
    pub fn get(&self, variant: CatalogVariant) -> Option<Arc<RecipeIndex>> {
        match self.state.lock().slots.get(&variant) {
            Some(IndexSlot::Ready(index)) => Some(Arc::clone(index)),
            _ => None,
        }
    }

    /// Checks if `variant` is being built.
    #[must_use]
    pub fn is_building(&self, variant: CatalogVariant) -> bool {
        matches!(self.state.lock().slots.get(&variant), Some(IndexSlot::Building))
    }

    /// Blocks until `variant` is ready, its build fails, or `timeout` passes.
    pub fn wait(&self, variant: CatalogVariant, timeout: Duration) -> ServiceResult<Arc<RecipeIndex>> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut state = self.state.lock();
        loop {
            match state.slots.get(&variant) {
                Some(IndexSlot::Ready(index)) => return Ok(Arc::clone(index)),
                Some(IndexSlot::Failed(reason)) => {
                    return Err(ServiceError::IndexBuildFailed {
                        variant,
                        reason: reason.clone(),
                    })
                },
                Some(IndexSlot::Building) | None => {},
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                if let Some(IndexSlot::Ready(index)) = state.slots.get(&variant) {
                    return Ok(Arc::clone(index));
                }
                return Err(ServiceError::IndexNotReady {
                    variant,
                    waited: started.elapsed(),
                });
            }
        }
    }

    /// Drops every index and starts a new generation. Waiters keep waiting
    /// for the next build.
    pub fn reset(&self, generation: u64) {
        let mut state = self.state.lock();
        state.generation = generation;
        state.slots.clear();
        self.changed.notify_all();
    }
}

/// Results of background rebuilds, applied by `pump`.
#[derive(Debug)]
enum ServiceTask {
    Publish {
        generation: u64,
        seq: u64,
        context: ContextKey,
        fingerprint: u64,
        reason: RebuildReason,
        result: ResultSet,
    },
    Failed {
        generation: u64,
        seq: u64,
        context: ContextKey,
        error: String,
    },
}

impl ServiceTask {
    const fn generation(&self) -> u64 {
        match self {
            Self::Publish { generation, .. } | Self::Failed { generation, .. } => *generation,
        }
    }

    fn rebuild(&self) -> (&ContextKey, u64) {
        match self {
            Self::Publish { context, seq, .. } | Self::Failed { context, seq, .. } => (context, *seq),
        }
    }
}

/// Latest rebuild number handed out per context.
#[derive(Debug, Default)]
struct RebuildSequence {
    latest: Mutex<AHashMap<ContextKey, u64>>,
}

impl RebuildSequence {
    fn next(&self, context: &ContextKey) -> u64 {
        let mut latest = self.latest.lock();
        let seq = latest.get(context).map_or(1, |s| s + 1);
        latest.insert(context.clone(), seq);
        seq
    }

    fn is_latest(&self, context: &ContextKey, seq: u64) -> bool {
        self.latest.lock().get(context).map_or(true, |&latest| seq >= latest)
    }

    fn clear(&self) {
        self.latest.lock().clear();
    }
}

/// Everything a rebuild worker needs, detached from the service.
struct RebuildJob {
    generation: u64,
    seq: u64,
    sequence: Arc<RebuildSequence>,
    context: ContextKey,
    fingerprint: u64,
    reason: RebuildReason,
    pool: ResourcePool,
    provider: Arc<dyn RecipeProvider>,
    resolver: Arc<dyn DisplayResolver>,
    indexes: Arc<IndexRegistry>,
    config: ServiceConfig,
    tasks: Sender<ServiceTask>,
}

impl RebuildJob {
    fn run(self) {
        let variant = CatalogVariant::from_context(&self.context).unwrap_or(CatalogVariant::Vanilla);
        let task = match self.indexes.wait(variant, self.config.index_wait_timeout()) {
            Ok(_) if !self.sequence.is_latest(&self.context, self.seq) => {
                debug!("Rebuild {} of {} superseded, skipping", self.seq, self.context);
                return;
            },
            Ok(index) => {
                let started = Instant::now();
                let scanner = CraftabilityScanner::new(&index);
                let outcome = if self.config.full_catalog_scan {
                    let catalog = self.provider.catalog(None);
                    scanner.scan_with_catalog(&self.pool, self.resolver.as_ref(), &catalog, &self.config.partitioner())
                } else {
                    scanner.scan(&self.pool, self.resolver.as_ref())
                };
                debug!(
                    "Rebuilt {} ({}): {} display ids in {:?}",
                    self.context,
                    self.reason,
                    outcome.display_ids.len(),
                    started.elapsed()
                );
                ServiceTask::Publish {
                    generation: self.generation,
                    seq: self.seq,
                    context: self.context,
                    fingerprint: self.fingerprint,
                    reason: self.reason,
                    result: Arc::new(outcome.display_ids),
                }
            },
            Err(e) => {
                warn!("Rebuild of {} failed: {e}", self.context);
                ServiceTask::Failed {
                    generation: self.generation,
                    seq: self.seq,
                    context: self.context,
                    error: e.to_string(),
                }
            },
        };
        // The receiver only goes away with the service.
        let _ = self.tasks.send(task);
    }
}

/// Scan, fetch and index orchestration for one consumer.
pub struct CraftabilityService {
    config: ServiceConfig,
    provider: Arc<dyn RecipeProvider>,
    resolver: Arc<dyn DisplayResolver>,
    transport: Arc<dyn ScanTransport>,
    indexes: Arc<IndexRegistry>,
    cache: FingerprintCache,
    scheduler: ScanScheduler,
    events: Arc<EventBus>,
    task_tx: Sender<ServiceTask>,
    task_rx: Receiver<ServiceTask>,
    generation: AtomicU64,
    rebuilds: Arc<RebuildSequence>,
    initialized: AtomicBool,
    fetch_in_progress: AtomicBool,
    last_recheck: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for CraftabilityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CraftabilityService")
            .field("config", &self.config)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .field("fetch_in_progress", &self.fetch_in_progress.load(Ordering::Relaxed))
            .field("scheduler", &self.scheduler)
            .field("cached_contexts", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl CraftabilityService {
    /// Creates an uninitialized service.
    #[must_use]
    pub fn new(
        mut config: ServiceConfig,
        provider: Arc<dyn RecipeProvider>,
        resolver: Arc<dyn DisplayResolver>,
        transport: Arc<dyn ScanTransport>,
    ) -> Self {
        config.validate();
        let (task_tx, task_rx) = unbounded();
        Self {
            scheduler: ScanScheduler::new(config.debounce()),
            config,
            provider,
            resolver,
            transport,
            indexes: Arc::new(IndexRegistry::new()),
            cache: FingerprintCache::new(),
            events: Arc::new(EventBus::default()),
            task_tx,
            task_rx,
            generation: AtomicU64::new(0),
            rebuilds: Arc::new(RebuildSequence::default()),
            initialized: AtomicBool::new(false),
            fetch_in_progress: AtomicBool::new(false),
            last_recheck: Mutex::new(None),
        }
    }

    /// Starts a session: kicks off index builds for every variant.
    ///
    /// Calling it again while initialized does nothing.
    pub fn init(&self) -> ServiceResult<()> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if !self.config.enabled {
            info!("Craftability service disabled, skipping index build");
            return Ok(());
        }
        info!("Initializing craftability service");
        self.rebuild_indexes()
    }

    /// Ends the session. Caches, indexes and pending scans are dropped and
    /// work still running in the background is discarded when it finishes.
    pub fn dispose(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.initialized.store(false, Ordering::Release);
        self.fetch_in_progress.store(false, Ordering::Release);
        self.scheduler.reset();
        self.cache.clear();
        self.rebuilds.clear();
        self.indexes.reset(generation);
        let dropped = self.task_rx.try_iter().count();
        *self.last_recheck.lock() = None;
        info!("Disposed craftability service (generation {generation}, {dropped} tasks dropped)");
    }

    /// Builds the indexes of every variant not yet built or being built,
    /// on a background thread.
    pub fn rebuild_indexes(&self) -> ServiceResult<()> {
        let generation = self.generation.load(Ordering::Acquire);
        let variants: Vec<CatalogVariant> = CatalogVariant::ALL
            .into_iter()
            .filter(|&v| self.indexes.mark_building(v))
            .collect();
        if variants.is_empty() {
            return Ok(());
        }

        let provider = Arc::clone(&self.provider);
        let indexes = Arc::clone(&self.indexes);
        let events = Arc::clone(&self.events);
        let cache = self.config.cache_dir.clone().map(IndexCache::new);
        let pending = variants.clone();
        let spawned = thread::Builder::new()
            .name("craftscan-index".to_owned())
            .spawn(move || {
                for variant in variants {
                    let started = Instant::now();
                    let built = catch_unwind(AssertUnwindSafe(|| match &cache {
                        Some(cache) => cache.load_or_build(variant, provider.as_ref()),
                        None => (RecipeIndex::build(variant, provider.as_ref()).0, false),
                    }));
                    match built {
                        Ok((index, from_cache)) => {
                            let recipes = index.len();
                            if !indexes.publish(generation, Arc::new(index)) {
                                warn!("Index build for generation {generation} is stale, aborting");
                                return;
                            }
                            info!("{variant} index ready: {recipes} recipes in {:?}", started.elapsed());
                            events.publish(ServiceEvent::IndexReady {
                                variant,
                                recipes,
                                from_cache,
                            });
                        },
                        Err(_) => {
                            warn!("{variant} index build panicked");
                            indexes.fail(generation, variant, "index build panicked");
                        },
                    }
                }
            });

        if let Err(e) = spawned {
            for variant in pending {
                self.indexes.fail(generation, variant, e.to_string());
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Asks for a scan of `context`.
    ///
    /// While a fetch runs the request is parked and issued later by
    /// [`pump`](Self::pump).
    pub fn request_scan(&self, context: ContextKey, now: Instant) -> ServiceResult<RequestDecision> {
        self.ensure_active()?;
        if self.fetch_in_progress.load(Ordering::Acquire) {
            debug!("Fetch in progress, deferring scan of {context}");
            self.scheduler.defer(context);
            return Ok(RequestDecision::Queued);
        }
        let decision = self.scheduler.request(context, now);
        if let RequestDecision::Send(ticket) = &decision {
            self.send_scan(ticket)?;
        }
        Ok(decision)
    }

    /// Starts a fetch of the first satisfiable ingredient set.
    ///
    /// Rejected while a scan is in flight or another fetch runs. The
    /// returned id is carried by the fetch reply.
    pub fn begin_fetch(&self, context: ContextKey, variants: Vec<IngredientSet>) -> ServiceResult<ScanId> {
        self.ensure_active()?;
        if !self.config.fetch_enabled {
            return Err(ServiceError::FetchDisabled);
        }
        if self.scheduler.is_busy() {
            return Err(ServiceError::ScanInFlight);
        }
        if self
            .fetch_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ServiceError::FetchInProgress);
        }

        let ScanTicket { scan_id, context } = self.scheduler.register(context);
        let request = ScanRequest::fetch(self.config.search_radius, variants, scan_id, context.clone());
        if let Err(e) = self.transport.send(&request) {
            warn!("Fetch {scan_id} for {context} could not be sent: {e}");
            self.scheduler.send_failed(scan_id);
            self.end_fetch();
            return Err(e);
        }
        info!("Fetch {scan_id} sent for {context}");
        self.events.publish(ServiceEvent::ScanSent { scan_id, context });
        Ok(scan_id)
    }

    /// Clears the fetch-in-progress flag.
    pub fn end_fetch(&self) {
        self.fetch_in_progress.store(false, Ordering::Release);
    }

    /// Applies a reply: reuses the cached result when the pool is unchanged,
    /// otherwise starts a rebuild on a background thread.
    pub fn handle_reply(&self, reply: &ScanReply, now: Instant) -> ServiceResult<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(ServiceError::NotInitialized);
        }
        let context = self
            .scheduler
            .complete(reply.scan_id, now)
            .unwrap_or_else(|| reply.context_key.clone());
        if reply.is_fetch {
            self.end_fetch();
            self.events.publish(ServiceEvent::FetchFinished {
                scan_id: reply.scan_id,
                context: context.clone(),
            });
        }

        let pool = reply.to_pool()?;
        let fingerprint = fingerprint(&pool);
        let reason = match self.cache.lookup(&context, fingerprint) {
            CacheDecision::Reuse(display_ids) => {
                info!("Reusing cached result for {context} ({} ids)", display_ids.len());
                self.events.publish(ServiceEvent::CacheReused { context, display_ids });
                return Ok(());
            },
            CacheDecision::Rebuild(reason) => reason,
        };
        info!("Rebuilding {context}: {reason}");

        let job = self.rebuild_job(context, fingerprint, reason, pool);
        thread::Builder::new()
            .name("craftscan-rebuild".to_owned())
            .spawn(move || job.run())?;
        Ok(())
    }

    /// Numbers a rebuild of `context`, superseding any earlier one.
    fn rebuild_job(
        &self,
        context: ContextKey,
        fingerprint: u64,
        reason: RebuildReason,
        pool: ResourcePool,
    ) -> RebuildJob {
        RebuildJob {
            generation: self.generation.load(Ordering::Acquire),
            seq: self.rebuilds.next(&context),
            sequence: Arc::clone(&self.rebuilds),
            context,
            fingerprint,
            reason,
            pool,
            provider: Arc::clone(&self.provider),
            resolver: Arc::clone(&self.resolver),
            indexes: Arc::clone(&self.indexes),
            config: self.config.clone(),
            tasks: self.task_tx.clone(),
        }
    }

    /// Applies finished background work and issues the pending scan once the
    /// scheduler is free. Returns the number of tasks applied.
    ///
    /// Results of a rebuild that a newer one for the same context has
    /// superseded are dropped, whatever order they arrive in.
    pub fn pump(&self, now: Instant) -> usize {
        let current = self.generation.load(Ordering::Acquire);
        let mut applied = 0;
        for task in self.task_rx.try_iter() {
            if task.generation() != current {
                warn!("Dropping result from stale generation {}", task.generation());
                continue;
            }
            let (context, seq) = task.rebuild();
            if !self.rebuilds.is_latest(context, seq) {
                debug!("Dropping superseded rebuild {seq} of {context}");
                continue;
            }
            match task {
                ServiceTask::Publish {
                    context,
                    fingerprint,
                    reason,
                    result,
                    ..
                } => {
                    self.cache.store(context.clone(), fingerprint, Arc::clone(&result));
                    self.events.publish(ServiceEvent::Rebuilt {
                        context,
                        reason,
                        display_ids: result,
                    });
                },
                ServiceTask::Failed { context, error, .. } => {
                    self.events.publish(ServiceEvent::RebuildFailed { context, error });
                },
            }
            applied += 1;
        }

        if self.initialized.load(Ordering::Acquire) && self.recheck_due(now) {
            self.issue_pending(now);
        }
        applied
    }

    /// Waits for the index of `variant` up to the configured timeout.
    pub fn wait_for_index(&self, variant: CatalogVariant) -> ServiceResult<Arc<RecipeIndex>> {
        self.indexes.wait(variant, self.config.index_wait_timeout())
    }

    /// Index of `variant` if it is ready.
    #[must_use]
    pub fn index(&self, variant: CatalogVariant) -> Option<Arc<RecipeIndex>> {
        self.indexes.get(variant)
    }

    /// Last result computed for `context`.
    #[must_use]
    pub fn result(&self, context: &ContextKey) -> Option<ResultSet> {
        self.cache.result(context)
    }

    /// Drops the cached result of `context` so the next reply rebuilds it.
    pub fn invalidate(&self, context: &ContextKey) {
        self.cache.invalidate(context);
    }

    /// Service events.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Phase of the consumer's scan.
    #[must_use]
    pub fn phase(&self) -> ScanPhase {
        self.scheduler.phase()
    }

    /// Checks if a fetch is running.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.fetch_in_progress.load(Ordering::Acquire)
    }

    /// Checks if `init` ran and `dispose` has not.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn ensure_active(&self) -> ServiceResult<()> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(ServiceError::NotInitialized);
        }
        if !self.config.enabled {
            return Err(ServiceError::Disabled);
        }
        Ok(())
    }

    fn recheck_due(&self, now: Instant) -> bool {
        let mut last = self.last_recheck.lock();
        let due = last.map_or(true, |at| now.saturating_duration_since(at) >= self.config.queue_recheck());
        if due {
            *last = Some(now);
        }
        due
    }

    fn issue_pending(&self, now: Instant) {
        if self.fetch_in_progress.load(Ordering::Acquire) {
            return;
        }
        if let Some(ticket) = self.scheduler.poll(now) {
            if let Err(e) = self.send_scan(&ticket) {
                debug!("Pending scan of {} dropped: {e}", ticket.context);
            }
        }
    }

    fn send_scan(&self, ticket: &ScanTicket) -> ServiceResult<()> {
        let request = ScanRequest::scan(self.config.search_radius, ticket.scan_id, ticket.context.clone());
        if let Err(e) = self.transport.send(&request) {
            warn!("Scan {} for {} could not be sent: {e}", ticket.scan_id, ticket.context);
            self.scheduler.send_failed(ticket.scan_id);
            return Err(e);
        }
        debug!("Scan {} sent for {}", ticket.scan_id, ticket.context);
        self.events.publish(ServiceEvent::ScanSent {
            scan_id: ticket.scan_id,
            context: ticket.context.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::PageCodeMap;
    use crate::protocol::WireIngredient;
    use crate::testing::{bucket_catalog, pool_of};
    use craftscan_common::{ItemClass, StackKey};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<ScanRequest>>,
        fail: AtomicBool,
    }

    impl RecordingTransport {
        fn last(&self) -> ScanRequest {
            self.sent.lock().last().cloned().expect("a request was sent")
        }
    }

    impl ScanTransport for RecordingTransport {
        fn send(&self, request: &ScanRequest) -> ServiceResult<()> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(ServiceError::Send("channel closed".to_owned()));
            }
            self.sent.lock().push(request.clone());
            Ok(())
        }
    }

    fn service_with(config: ServiceConfig) -> (CraftabilityService, Arc<RecordingTransport>, Arc<PageCodeMap>) {
        let catalog = bucket_catalog();
        let resolver = Arc::new(PageCodeMap::from_catalog(&catalog.catalog(None)));
        let transport = Arc::new(RecordingTransport::default());
        let service = CraftabilityService::new(config, Arc::new(catalog), resolver.clone(), transport.clone());
        (service, transport, resolver)
    }

    fn sticks() -> Vec<IngredientSet> {
        vec![IngredientSet {
            ingredients: vec![WireIngredient::concrete(["game:stick"], 1)],
        }]
    }

    fn all_tab() -> ContextKey {
        CatalogVariant::All.context()
    }

    fn pump_until(service: &CraftabilityService, done: impl Fn(&ServiceEvent) -> bool) -> Vec<ServiceEvent> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut seen = Vec::new();
        loop {
            service.pump(Instant::now());
            seen.extend(service.events().drain());
            if seen.iter().any(&done) {
                return seen;
            }
            assert!(Instant::now() < deadline, "timed out, saw {seen:?}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_index_wait_times_out() {
        let registry = IndexRegistry::new();
        let started = Instant::now();
        let err = registry
            .wait(CatalogVariant::Wood, Duration::from_millis(30))
            .expect_err("nothing published");
        assert!(matches!(err, ServiceError::IndexNotReady { variant: CatalogVariant::Wood, .. }));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_index_wait_wakes_on_publish() {
        let registry = Arc::new(IndexRegistry::new());
        assert!(registry.mark_building(CatalogVariant::All));
        assert!(!registry.mark_building(CatalogVariant::All));

        let publisher = Arc::clone(&registry);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let (index, _) = RecipeIndex::build(CatalogVariant::All, &bucket_catalog());
            assert!(publisher.publish(0, Arc::new(index)));
        });
        let index = registry
            .wait(CatalogVariant::All, Duration::from_secs(10))
            .expect("published");
        assert_eq!(index.variant(), CatalogVariant::All);
        handle.join().expect("publisher");
    }

    #[test]
    fn test_stale_publish_and_failed_build() {
        let registry = IndexRegistry::new();
        registry.reset(3);
        let (index, _) = RecipeIndex::build(CatalogVariant::Mods, &bucket_catalog());
        assert!(!registry.publish(2, Arc::new(index)));
        assert!(registry.get(CatalogVariant::Mods).is_none());

        assert!(registry.mark_building(CatalogVariant::Stone));
        registry.fail(3, CatalogVariant::Stone, "boom");
        let err = registry
            .wait(CatalogVariant::Stone, Duration::from_secs(10))
            .expect_err("failed build");
        assert!(matches!(err, ServiceError::IndexBuildFailed { .. }));
        assert!(registry.mark_building(CatalogVariant::Stone));
    }

    #[test]
    fn test_requires_init() {
        let (service, _, _) = service_with(ServiceConfig::default());
        assert!(matches!(
            service.request_scan(all_tab(), Instant::now()),
            Err(ServiceError::NotInitialized)
        ));
    }

    #[test]
    fn test_disabled_service_rejects_scans() {
        let (service, transport, _) = service_with(ServiceConfig {
            enabled: false,
            ..ServiceConfig::default()
        });
        service.init().expect("init");
        assert!(matches!(
            service.request_scan(all_tab(), Instant::now()),
            Err(ServiceError::Disabled)
        ));
        assert!(transport.sent.lock().is_empty());
    }

    #[test]
    fn test_scan_rebuild_then_reuse() {
        let (service, transport, resolver) = service_with(ServiceConfig::default());
        service.init().expect("init");
        let t0 = Instant::now();

        assert!(matches!(service.request_scan(all_tab(), t0), Ok(RequestDecision::Send(_))));
        let request = transport.last();
        assert!(!request.wants_fetch());
        assert_eq!(request.radius, 20);

        let pool = pool_of(&[("game:planks-oak", 4, ItemClass::Block)]);
        let reply = ScanReply::from_pool(&pool, request.scan_id, all_tab(), false);
        service.handle_reply(&reply, t0).expect("reply");
        pump_until(&service, |e| matches!(e, ServiceEvent::Rebuilt { .. }));

        let bucket = resolver
            .display_id(&StackKey::new("game:bucket-oak"))
            .expect("bucket has a display id");
        let result = service.result(&all_tab()).expect("result cached");
        assert!(result.contains(&bucket));

        let again = ScanReply::from_pool(&pool, ScanId::NONE, all_tab(), false);
        service.handle_reply(&again, t0).expect("reply");
        let events = service.events().drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, ServiceEvent::CacheReused { display_ids, .. } if display_ids.contains(&bucket))));
    }

    #[test]
    fn test_fetch_and_scan_exclude_each_other() {
        let (service, transport, _) = service_with(ServiceConfig::default());
        service.init().expect("init");
        let t0 = Instant::now();

        service.request_scan(all_tab(), t0).expect("scan");
        let scan = transport.last();
        assert!(matches!(
            service.begin_fetch(all_tab(), sticks()),
            Err(ServiceError::ScanInFlight)
        ));

        service
            .handle_reply(&ScanReply::from_pool(&pool_of(&[]), scan.scan_id, all_tab(), false), t0)
            .expect("reply");
        let fetch_id = service.begin_fetch(all_tab(), sticks()).expect("fetch");
        assert!(transport.last().wants_fetch());
        assert!(matches!(
            service.begin_fetch(all_tab(), sticks()),
            Err(ServiceError::FetchInProgress)
        ));

        let later = t0 + Duration::from_secs(1);
        assert!(matches!(service.request_scan(all_tab(), later), Ok(RequestDecision::Queued)));
        let sent_before = transport.sent.lock().len();
        service.pump(later);
        assert_eq!(transport.sent.lock().len(), sent_before);

        let reply = ScanReply::from_pool(&pool_of(&[]), fetch_id, all_tab(), true);
        service.handle_reply(&reply, later).expect("fetch reply");
        assert!(!service.is_fetching());

        service.pump(later + Duration::from_secs(1));
        assert_eq!(transport.sent.lock().len(), sent_before + 1);
        assert!(!transport.last().wants_fetch());
        let events = pump_until(&service, |e| matches!(e, ServiceEvent::FetchFinished { .. }));
        assert!(events.iter().any(|e| matches!(e, ServiceEvent::FetchFinished { scan_id, .. } if *scan_id == fetch_id)));
    }

    #[test]
    fn test_send_failure_returns_to_idle() {
        let (service, transport, _) = service_with(ServiceConfig::default());
        service.init().expect("init");
        transport.fail.store(true, Ordering::Relaxed);
        assert!(matches!(
            service.request_scan(all_tab(), Instant::now()),
            Err(ServiceError::Send(_))
        ));
        assert_eq!(service.phase(), ScanPhase::Idle);
        assert!(matches!(
            service.begin_fetch(all_tab(), sticks()),
            Err(ServiceError::Send(_))
        ));
        assert!(!service.is_fetching());
    }

    #[test]
    fn test_out_of_order_rebuilds_keep_newest() {
        let (service, _, _) = service_with(ServiceConfig::default());
        let ctx = all_tab();
        let older = service.rebuild_job(ctx.clone(), 1, RebuildReason::Missing, pool_of(&[]));
        let newer = service.rebuild_job(ctx.clone(), 2, RebuildReason::Changed, pool_of(&[]));
        assert!(newer.seq > older.seq);

        let newest: ResultSet = Arc::new(["item-game:bucket-oak".to_owned()].into_iter().collect());
        let stale: ResultSet = Arc::new(["item-game:torch".to_owned()].into_iter().collect());
        for (seq, fingerprint, result) in [(newer.seq, 2, &newest), (older.seq, 1, &stale)] {
            service
                .task_tx
                .send(ServiceTask::Publish {
                    generation: 0,
                    seq,
                    context: ctx.clone(),
                    fingerprint,
                    reason: RebuildReason::Changed,
                    result: Arc::clone(result),
                })
                .expect("queue");
        }
        service
            .task_tx
            .send(ServiceTask::Failed {
                generation: 0,
                seq: older.seq,
                context: ctx.clone(),
                error: "late".to_owned(),
            })
            .expect("queue");

        assert_eq!(service.pump(Instant::now()), 1);
        assert_eq!(service.result(&ctx), Some(Arc::clone(&newest)));
        assert_eq!(service.cache.lookup(&ctx, 2), CacheDecision::Reuse(newest));
        let events = service.events().drain();
        assert!(!events.iter().any(|e| matches!(e, ServiceEvent::RebuildFailed { .. })));
    }

    #[test]
    fn test_superseded_rebuild_skips_publish() {
        let (service, _, _) = service_with(ServiceConfig::default());
        service.init().expect("init");
        service.wait_for_index(CatalogVariant::All).expect("index");
        let ctx = all_tab();
        let planks = pool_of(&[("game:planks-oak", 4, ItemClass::Block)]);
        let older = service.rebuild_job(ctx.clone(), 1, RebuildReason::Missing, pool_of(&[]));
        let newer = service.rebuild_job(ctx.clone(), fingerprint(&planks), RebuildReason::Changed, planks.clone());

        newer.run();
        older.run();
        assert_eq!(service.task_rx.len(), 1);
        assert_eq!(service.pump(Instant::now()), 1);
        assert_eq!(
            service.cache.lookup(&ctx, fingerprint(&planks)),
            CacheDecision::Reuse(service.result(&ctx).expect("stored"))
        );
    }

    #[test]
    fn test_dispose_discards_late_results() {
        let (service, transport, _) = service_with(ServiceConfig {
            index_wait_timeout_ms: 200,
            ..ServiceConfig::default()
        });
        service.init().expect("init");
        service.wait_for_index(CatalogVariant::All).expect("index");
        let t0 = Instant::now();
        service.request_scan(all_tab(), t0).expect("scan");
        let reply = ScanReply::from_pool(
            &pool_of(&[("game:planks-oak", 4, ItemClass::Block)]),
            transport.last().scan_id,
            all_tab(),
            false,
        );
        service.handle_reply(&reply, t0).expect("reply");
        service.dispose();

        thread::sleep(Duration::from_millis(400));
        assert_eq!(service.pump(Instant::now()), 0);
        assert!(service.result(&all_tab()).is_none());
        assert!(service.index(CatalogVariant::All).is_none());
        assert!(matches!(service.handle_reply(&reply, t0), Err(ServiceError::NotInitialized)));
    }

    #[test]
    fn test_index_ready_events_cover_every_variant() {
        let (service, _, _) = service_with(ServiceConfig::default());
        service.init().expect("init");
        for variant in CatalogVariant::ALL {
            service.wait_for_index(variant).expect("index");
        }
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut ready = 0;
        while ready < CatalogVariant::ALL.len() {
            assert!(Instant::now() < deadline, "only {ready} ready events");
            ready += service
                .events()
                .drain()
                .iter()
                .filter(|e| matches!(e, ServiceEvent::IndexReady { from_cache: false, .. }))
                .count();
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ready, CatalogVariant::ALL.len());
    }

    #[test]
    fn test_persisted_indexes_reload() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let config = ServiceConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            ..ServiceConfig::default()
        };
        let (first, _, _) = service_with(config.clone());
        first.init().expect("init");
        let built = first.wait_for_index(CatalogVariant::All).expect("index");
        for variant in CatalogVariant::ALL {
            first.wait_for_index(variant).expect("index");
        }

        let (second, _, _) = service_with(config);
        second.init().expect("init");
        let loaded = second.wait_for_index(CatalogVariant::All).expect("index");
        assert_eq!(loaded.len(), built.len());
    }
}
