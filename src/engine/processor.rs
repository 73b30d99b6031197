//! The change feed processor: per-partition poll-process-checkpoint loops
//! coordinated through the lease store.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     ChangeFeedProcessor                        │
//! │                                                                │
//! │  rebalance loop ──► LeaseBalancer.plan() ──► acquire / shed    │
//! │        │                                                       │
//! │        ▼ (per acquired lease)                                  │
//! │  ┌───────────────────────────┐   ┌─────────────────────────┐   │
//! │  │ partition worker          │   │ renewal task            │   │
//! │  │ Polling ► Delivering ►    │   │ renew every TTL/3,      │   │
//! │  │ Checkpointing ► Polling   │   │ mark lease lost on CAS  │   │
//! │  └────────────┬──────────────┘   │ mismatch                │   │
//! │               │ shared LeaseCell └──────────┬──────────────┘   │
//! │               └──────────────┬──────────────┘                  │
//! └──────────────────────────────┼─────────────────────────────────┘
//!                                ▼
//!                          Lease Store (compare-and-swap)
//! ```
//!
//! All coordination goes through the shared lease store, never through
//! in-process locks, so ownership stays correct across a fleet of
//! independent processes. Within one process, a worker and its renewal task
//! serialize lease writes through a shared [`LeaseCell`] so they never race
//! each other's version.
//!
//! Delivery is at-least-once: the checkpoint is written strictly after the
//! handler returns success, so a crash between the two redelivers the batch
//! on the next acquisition.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::background_tasks::TaskRegistry;
use super::balancer::LeaseBalancer;
use super::config::{HandlerErrorPolicy, ProcessorConfig};
use super::error::{EngineError, EngineResult};
use super::lease::Lease;
use super::lease_manager::LeaseManager;
use super::metrics;
use super::retry;
use super::traits::{ChangeHandler, ChangeSource, LeaseStore};
use super::worker_state::WorkerState;
use crate::constants::DEFAULT_SHUTDOWN_TIMEOUT_SECS;
use crate::types::ChangeBatch;

/// Add +/- 15% jitter to an interval so a fleet of instances does not renew
/// or rebalance in lockstep against the same store.
fn with_jitter(base: Duration) -> Duration {
    let factor = 0.85 + fastrand::f64() * 0.30;
    base.mul_f64(factor)
}

/// Shared lease state between a partition worker and its renewal task.
///
/// Both tasks mutate the lease through the write lock, holding it across
/// the store call, so their compare-and-swap writes are serialized and
/// never invalidate each other's version.
struct LeaseCell {
    lease: RwLock<Lease>,
    lost: AtomicBool,
}

impl LeaseCell {
    fn new(lease: Lease) -> Self {
        Self {
            lease: RwLock::new(lease),
            lost: AtomicBool::new(false),
        }
    }

    async fn snapshot(&self) -> Lease {
        self.lease.read().await.clone()
    }

    fn mark_lost(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }
}

/// Observable status of one partition worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    /// The partition this worker owns.
    pub partition_id: String,

    /// Current state machine position.
    pub state: WorkerState,

    /// Records delivered to the handler by this worker.
    pub delivered_records: u64,
}

/// One owned partition: lease cell, state, and control flags.
struct WorkerSlot {
    partition_id: String,
    cell: LeaseCell,
    state: AtomicU8,
    delivered: AtomicU64,
    release_requested: AtomicBool,
}

impl WorkerSlot {
    fn new(partition_id: String, lease: Lease) -> Self {
        Self {
            partition_id,
            cell: LeaseCell::new(lease),
            state: AtomicU8::new(WorkerState::Starting as u8),
            delivered: AtomicU64::new(0),
            release_requested: AtomicBool::new(false),
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn request_release(&self) {
        self.release_requested.store(true, Ordering::SeqCst);
    }

    fn release_requested(&self) -> bool {
        self.release_requested.load(Ordering::SeqCst)
    }

    fn add_delivered(&self, records: u64) {
        self.delivered.fetch_add(records, Ordering::SeqCst);
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus {
            partition_id: self.partition_id.clone(),
            state: self.state(),
            delivered_records: self.delivered.load(Ordering::SeqCst),
        }
    }
}

/// Why a partition worker exited its loop.
enum WorkerExit {
    /// Shutdown, shed, run-window boundary, or handler abort.
    Graceful,
    /// Another instance owns the lease now.
    LeaseLost,
    /// The change source stayed unavailable past the retry budget.
    Degraded,
}

struct ProcessorInner {
    config: ProcessorConfig,
    source: Arc<dyn ChangeSource>,
    lease_manager: LeaseManager,
    handler: Arc<dyn ChangeHandler>,
    balancer: LeaseBalancer,
    workers: DashMap<String, Arc<WorkerSlot>>,
    registry: TaskRegistry,
    running: AtomicBool,
}

/// Builder for [`ChangeFeedProcessor`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use feedlock::engine::memory::{InMemoryChangeSource, InMemoryLeaseStore};
/// use feedlock::engine::{ChangeFeedProcessor, ProcessorConfig};
/// # use async_trait::async_trait;
/// # use feedlock::engine::{ChangeHandler, HandlerError};
/// # use feedlock::types::ChangeBatch;
/// # struct MyHandler;
/// # #[async_trait]
/// # impl ChangeHandler for MyHandler {
/// #     async fn process(&self, _batch: &ChangeBatch) -> Result<(), HandlerError> { Ok(()) }
/// # }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let processor = ChangeFeedProcessor::builder()
///     .config(ProcessorConfig::new("host-1"))
///     .source(Arc::new(InMemoryChangeSource::new()))
///     .lease_store(Arc::new(InMemoryLeaseStore::new()))
///     .handler(Arc::new(MyHandler))
///     .build()?;
///
/// processor.start().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ChangeFeedProcessorBuilder {
    config: Option<ProcessorConfig>,
    source: Option<Arc<dyn ChangeSource>>,
    lease_store: Option<Arc<dyn LeaseStore>>,
    handler: Option<Arc<dyn ChangeHandler>>,
}

impl ChangeFeedProcessorBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the processor configuration.
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the change source adapter.
    pub fn source(mut self, source: Arc<dyn ChangeSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the lease store adapter.
    pub fn lease_store(mut self, store: Arc<dyn LeaseStore>) -> Self {
        self.lease_store = Some(store);
        self
    }

    /// Set the application's change handler.
    pub fn handler(mut self, handler: Arc<dyn ChangeHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Validate the configuration and build the processor.
    pub fn build(self) -> EngineResult<ChangeFeedProcessor> {
        let config = self
            .config
            .ok_or_else(|| EngineError::Config("config is required".to_string()))?;
        config.validate()?;

        let source = self
            .source
            .ok_or_else(|| EngineError::Config("change source is required".to_string()))?;
        let lease_store = self
            .lease_store
            .ok_or_else(|| EngineError::Config("lease store is required".to_string()))?;
        let handler = self
            .handler
            .ok_or_else(|| EngineError::Config("handler is required".to_string()))?;

        let lease_manager = LeaseManager::new(
            lease_store,
            &config.host_name,
            config.lease_ttl,
            config.operation_timeout,
        )?;
        let balancer = LeaseBalancer::new(&config.host_name);

        Ok(ChangeFeedProcessor {
            inner: Arc::new(ProcessorInner {
                config,
                source,
                lease_manager,
                handler,
                balancer,
                workers: DashMap::new(),
                registry: TaskRegistry::new(),
                running: AtomicBool::new(false),
            }),
        })
    }
}

/// The engine: claims partitions via leases, polls each owned partition for
/// changes, delivers ordered batches to the handler, and checkpoints
/// progress.
///
/// A processor runs once: [`start`](ChangeFeedProcessor::start), then
/// [`stop`](ChangeFeedProcessor::stop) (or an engine-initiated stop at the
/// run-window boundary). Build a new processor to run again.
pub struct ChangeFeedProcessor {
    inner: Arc<ProcessorInner>,
}

impl ChangeFeedProcessor {
    /// Start building a processor.
    pub fn builder() -> ChangeFeedProcessorBuilder {
        ChangeFeedProcessorBuilder::new()
    }

    /// This instance's identity.
    pub fn host_name(&self) -> &str {
        &self.inner.config.host_name
    }

    /// True between a successful [`start`](ChangeFeedProcessor::start) and
    /// the completion of [`stop`](ChangeFeedProcessor::stop).
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Start the engine.
    ///
    /// Verifies the lease store is reachable (an unreachable store at
    /// startup is fatal and reported here), then spawns the rebalance loop.
    /// Partition workers follow as leases are acquired.
    pub async fn start(&self) -> EngineResult<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Config(
                "processor is already running".to_string(),
            ));
        }

        if let Err(e) = self.inner.lease_manager.list().await {
            self.inner.running.store(false, Ordering::SeqCst);
            error!(error = %e, "Lease store unreachable at startup");
            return Err(e);
        }

        info!(
            host = %self.inner.config.host_name,
            poll_delay_ms = self.inner.config.poll_delay.as_millis() as u64,
            lease_ttl_secs = self.inner.config.lease_ttl.as_secs(),
            end_time = ?self.inner.config.end_time,
            "Starting change feed processor"
        );

        let inner = self.inner.clone();
        self.inner
            .registry
            .spawn("rebalance", rebalance_loop(inner))
            .await;

        Ok(())
    }

    /// Stop the engine.
    ///
    /// Signals every loop to exit at its next suspension point, waits for
    /// in-flight handler invocations to complete, and releases held leases.
    /// Idempotent.
    pub async fn stop(&self) -> EngineResult<()> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        info!(host = %self.inner.config.host_name, "Stopping change feed processor");
        self.inner
            .registry
            .shutdown_all(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS))
            .await;
        self.inner.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Wait until the engine begins shutting down, whether from
    /// [`stop`](ChangeFeedProcessor::stop) or from the run-window boundary.
    ///
    /// Call [`stop`](ChangeFeedProcessor::stop) afterwards to wait for the
    /// drain to finish.
    pub async fn until_stopped(&self) {
        let mut shutdown = self.inner.registry.subscribe();
        if self.inner.registry.is_shutting_down() {
            return;
        }
        let _ = shutdown.recv().await;
    }

    /// Status of every known partition worker.
    pub fn workers(&self) -> Vec<WorkerStatus> {
        self.inner
            .workers
            .iter()
            .map(|entry| entry.value().status())
            .collect()
    }

    /// Partitions with an active (non-terminal) worker.
    pub fn owned_partitions(&self) -> Vec<String> {
        let mut owned: Vec<String> = self
            .inner
            .workers
            .iter()
            .filter(|entry| entry.value().state().is_active())
            .map(|entry| entry.key().clone())
            .collect();
        owned.sort();
        owned
    }
}

fn refresh_owned_gauge(inner: &ProcessorInner) {
    let active = inner
        .workers
        .iter()
        .filter(|entry| entry.value().state().is_active())
        .count();
    metrics::OWNED_PARTITIONS.set(active as i64);
}

/// Periodic rebalance: discover partitions, plan, acquire and shed.
async fn rebalance_loop(inner: Arc<ProcessorInner>) {
    let mut shutdown = inner.registry.subscribe();

    loop {
        if let Err(e) = rebalance_once(&inner).await {
            warn!(error = %e, "Rebalance cycle failed; retrying next interval");
        }

        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(with_jitter(inner.config.rebalance_interval)) => {}
        }
    }

    debug!("Rebalance loop exited");
}

async fn rebalance_once(inner: &Arc<ProcessorInner>) -> EngineResult<()> {
    // Reap workers that exited since the last cycle.
    inner.workers.retain(|_, slot| slot.state().is_active());
    refresh_owned_gauge(inner);

    // Discovery: make sure every source partition has a lease record. A
    // source hiccup only skips discovery this cycle; known leases still
    // rebalance.
    match inner.source.partitions().await {
        Ok(partition_ids) => {
            for partition_id in partition_ids {
                if let Err(e) = inner.lease_manager.ensure_lease(&partition_id).await {
                    warn!(
                        partition_id = %partition_id,
                        error = %e,
                        "Could not ensure lease for discovered partition"
                    );
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "Partition discovery failed this cycle");
        }
    }

    let leases = inner.lease_manager.list().await?;
    let plan = inner.balancer.plan(&leases, Utc::now());

    for partition_id in &plan.to_release {
        if let Some(slot) = inner.workers.get(partition_id) {
            info!(partition_id = %partition_id, "Shedding lease to rebalance the fleet");
            slot.request_release();
        }
    }

    for candidate in &plan.to_acquire {
        if inner.workers.contains_key(&candidate.partition_id) {
            // Previous worker for this partition is still draining.
            continue;
        }
        match inner.lease_manager.acquire(candidate).await {
            Ok(lease) => {
                spawn_partition_worker(inner, lease).await;
                // Ownership expands one lease per cycle.
                break;
            }
            Err(EngineError::Conflict { partition_id }) => {
                debug!(
                    partition_id = %partition_id,
                    "Lease went to a peer; trying the next candidate"
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

async fn spawn_partition_worker(inner: &Arc<ProcessorInner>, lease: Lease) {
    let partition_id = lease.partition_id.clone();
    let slot = Arc::new(WorkerSlot::new(partition_id.clone(), lease));
    inner.workers.insert(partition_id.clone(), slot.clone());
    refresh_owned_gauge(inner);

    inner
        .registry
        .spawn(
            format!("renew:{}", partition_id),
            renewal_loop(inner.clone(), slot.clone()),
        )
        .await;
    inner
        .registry
        .spawn(
            format!("worker:{}", partition_id),
            worker_loop(inner.clone(), slot),
        )
        .await;
}

/// Defend one lease: renew on a jittered interval, mark it lost when the
/// store says another instance owns it.
async fn renewal_loop(inner: Arc<ProcessorInner>, slot: Arc<WorkerSlot>) {
    let mut shutdown = inner.registry.subscribe();

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(with_jitter(inner.config.renew_interval)) => {}
        }

        if slot.cell.is_lost() || slot.release_requested() || slot.state().is_terminal() {
            break;
        }

        let mut guard = slot.cell.lease.write().await;
        match inner.lease_manager.renew(&guard).await {
            Ok(renewed) => {
                *guard = renewed;
            }
            Err(EngineError::LeaseLost { partition_id }) => {
                warn!(partition_id = %partition_id, "Lease stolen; halting renewal");
                slot.cell.mark_lost();
                break;
            }
            Err(e) => {
                if guard.is_expired_at(Utc::now()) {
                    // The store was unreachable for a full TTL; another
                    // instance may legitimately own the lease by now.
                    warn!(
                        partition_id = %slot.partition_id,
                        error = %e,
                        "Renewal failed past lease TTL; presuming lease lost"
                    );
                    metrics::LEASES_LOST.inc();
                    slot.cell.mark_lost();
                    break;
                }
                warn!(
                    partition_id = %slot.partition_id,
                    error = %e,
                    "Renewal failed; retrying next interval"
                );
            }
        }
    }

    debug!(partition_id = %slot.partition_id, "Renewal task exited");
}

/// One partition's poll-process-checkpoint loop.
async fn worker_loop(inner: Arc<ProcessorInner>, slot: Arc<WorkerSlot>) {
    let partition_id = slot.partition_id.clone();
    info!(partition_id = %partition_id, "Partition worker starting");

    let exit = run_partition(&inner, &slot).await;

    match exit {
        WorkerExit::LeaseLost => {
            // Another owner holds the lease; writing anything from here
            // risks reverting its progress, so no release either.
            slot.set_state(WorkerState::LeaseLost);
            warn!(partition_id = %partition_id, "Partition worker exited: lease lost");
        }
        WorkerExit::Degraded => {
            slot.set_state(WorkerState::Degraded);
            error!(
                partition_id = %partition_id,
                "Partition degraded: change source unavailable past retry budget"
            );
            let snapshot = slot.cell.snapshot().await;
            inner.lease_manager.release(&snapshot).await;
        }
        WorkerExit::Graceful => {
            slot.set_state(WorkerState::Stopped);
            info!(
                partition_id = %partition_id,
                delivered_records = slot.delivered.load(Ordering::SeqCst),
                "Partition worker stopped"
            );
            let snapshot = slot.cell.snapshot().await;
            inner.lease_manager.release(&snapshot).await;
        }
    }

    refresh_owned_gauge(&inner);
}

async fn run_partition(inner: &Arc<ProcessorInner>, slot: &Arc<WorkerSlot>) -> WorkerExit {
    let mut shutdown = inner.registry.subscribe();
    let config = &inner.config;

    loop {
        if slot.cell.is_lost() {
            return WorkerExit::LeaseLost;
        }
        if slot.release_requested() || inner.registry.is_shutting_down() {
            return WorkerExit::Graceful;
        }

        slot.set_state(WorkerState::Polling);
        let current = slot.cell.snapshot().await;

        let batch = match poll_with_retry(inner, &current).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(
                    partition_id = %slot.partition_id,
                    error = %e,
                    "Poll retries exhausted"
                );
                return WorkerExit::Degraded;
            }
        };

        if batch.is_empty() {
            tokio::select! {
                _ = shutdown.recv() => return WorkerExit::Graceful,
                _ = tokio::time::sleep(config.poll_delay) => {}
            }
            continue;
        }

        let (batch, boundary_reached) = clip_to_run_window(batch, config.end_time);

        if !batch.is_empty() {
            slot.set_state(WorkerState::Delivering);
            match inner.handler.process(&batch).await {
                Ok(()) => {
                    metrics::BATCHES_DELIVERED.inc();
                    metrics::RECORDS_DELIVERED.inc_by(batch.len() as u64);
                    slot.add_delivered(batch.len() as u64);
                }
                Err(err) => {
                    metrics::HANDLER_FAILURES.inc();
                    let failure = EngineError::HandlerFailure {
                        partition_id: batch.partition_id.clone(),
                        token: current.continuation_token.clone(),
                        records: batch.len(),
                        message: err.message().to_string(),
                    };
                    match config.on_handler_error {
                        HandlerErrorPolicy::Abort => {
                            error!(error = %failure, "Aborting partition loop on handler failure");
                            return WorkerExit::Graceful;
                        }
                        HandlerErrorPolicy::Skip => {
                            warn!(error = %failure, "Skipping rejected batch");
                            // Checkpoint below advances past the batch.
                        }
                    }
                }
            }
        }

        if boundary_reached {
            // The clipped batch is deliberately not checkpointed: a restart
            // redelivers it instead of silently dropping the tail past the
            // boundary.
            info!(
                partition_id = %slot.partition_id,
                end_time = ?config.end_time,
                "Run window end reached; stopping the engine"
            );
            inner.registry.trigger_shutdown();
            return WorkerExit::Graceful;
        }

        slot.set_state(WorkerState::Checkpointing);
        let mut guard = slot.cell.lease.write().await;
        match inner
            .lease_manager
            .checkpoint(&guard, batch.next_token.clone())
            .await
        {
            Ok(updated) => {
                *guard = updated;
            }
            Err(EngineError::LeaseLost { .. }) => {
                slot.cell.mark_lost();
                return WorkerExit::LeaseLost;
            }
            Err(e) => {
                // Transient store failure: leave the token where it is and
                // redeliver the batch next iteration.
                warn!(
                    partition_id = %slot.partition_id,
                    error = %e,
                    "Checkpoint failed; batch will be redelivered"
                );
                drop(guard);
                tokio::select! {
                    _ = shutdown.recv() => return WorkerExit::Graceful,
                    _ = tokio::time::sleep(config.poll_delay) => {}
                }
            }
        }
    }
}

/// Poll the change source for the next batch, retrying transient failures.
async fn poll_with_retry(inner: &Arc<ProcessorInner>, lease: &Lease) -> EngineResult<ChangeBatch> {
    let config = &inner.config;
    let source = inner.source.clone();
    let partition_id = lease.partition_id.clone();
    let token = lease.continuation_token.clone();
    let start_time = config.start_time;
    let max_records = config.max_batch_records;
    let timeout = config.operation_timeout;

    (|| {
        let source = source.clone();
        let partition_id = partition_id.clone();
        let token = token.clone();
        async move {
            match tokio::time::timeout(
                timeout,
                source.poll(&partition_id, token.as_ref(), start_time, max_records),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(EngineError::SourceUnavailable(format!(
                    "poll timed out after {:?}",
                    timeout
                ))),
            }
        }
    })
    .retry(retry::source_policy().with_max_times(config.max_poll_retries))
    .when(|e: &EngineError| e.is_retriable())
    .await
}

/// Split a batch at the run-window end boundary.
///
/// Returns the in-window prefix and whether any record fell past the
/// boundary. Records past `end_time` are never delivered.
fn clip_to_run_window(
    mut batch: ChangeBatch,
    end_time: Option<DateTime<Utc>>,
) -> (ChangeBatch, bool) {
    let Some(end) = end_time else {
        return (batch, false);
    };
    let keep = batch.records.partition_point(|r| r.ts <= end);
    if keep == batch.records.len() {
        return (batch, false);
    }
    batch.records.truncate(keep);
    (batch, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeRecord;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn batch(record_ts: &[i64]) -> ChangeBatch {
        ChangeBatch {
            partition_id: "p0".to_string(),
            records: record_ts
                .iter()
                .map(|&t| ChangeRecord::new(format!("doc-{}", t), ts(t), serde_json::json!({})))
                .collect(),
            next_token: crate::types::ContinuationToken::new("end"),
        }
    }

    #[test]
    fn test_clip_without_window_passes_through() {
        let (clipped, reached) = clip_to_run_window(batch(&[1, 2, 3]), None);
        assert_eq!(clipped.len(), 3);
        assert!(!reached);
    }

    #[test]
    fn test_clip_inside_window_passes_through() {
        let (clipped, reached) = clip_to_run_window(batch(&[1, 2, 3]), Some(ts(10)));
        assert_eq!(clipped.len(), 3);
        assert!(!reached);
    }

    #[test]
    fn test_clip_at_boundary_keeps_inclusive_prefix() {
        let (clipped, reached) = clip_to_run_window(batch(&[1, 2, 3, 4]), Some(ts(2)));
        assert_eq!(clipped.len(), 2);
        assert_eq!(clipped.records.last().unwrap().ts, ts(2));
        assert!(reached);
    }

    #[test]
    fn test_clip_entirely_past_boundary_is_empty() {
        let (clipped, reached) = clip_to_run_window(batch(&[5, 6]), Some(ts(2)));
        assert!(clipped.is_empty());
        assert!(reached);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let base = Duration::from_secs(10);
        for _ in 0..100 {
            let jittered = with_jitter(base);
            assert!(jittered >= Duration::from_millis(8_500));
            assert!(jittered <= Duration::from_millis(11_500));
        }
    }

    #[test]
    fn test_worker_slot_state_transitions() {
        let slot = WorkerSlot::new("p0".to_string(), Lease::unowned("p0"));
        assert_eq!(slot.state(), WorkerState::Starting);

        slot.set_state(WorkerState::Polling);
        assert_eq!(slot.state(), WorkerState::Polling);

        slot.add_delivered(4);
        let status = slot.status();
        assert_eq!(status.partition_id, "p0");
        assert_eq!(status.delivered_records, 4);
    }

    #[test]
    fn test_builder_requires_all_parts() {
        let result = ChangeFeedProcessor::builder().build();
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
