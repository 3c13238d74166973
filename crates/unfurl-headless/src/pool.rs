//! Browser pool management: process supervision, capacity accounting and
//! strict-FIFO lease queueing.
//!
//! The pool owns every Chromium process the service runs. Capacity is
//! tracked as a per-instance `lease_count` bounded by
//! `max_contexts_per_browser`; a lease reserves its slot *before* the
//! browsing context is created so concurrent acquisitions can never
//! oversubscribe an instance. Acquisitions that find no capacity queue in
//! strict FIFO order with an armed deadline.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::target::DisposeBrowserContextParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot, Mutex, OnceCell};
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::PoolError;

/// Pool sizing and supervision configuration.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Browsers kept alive even when idle.
    pub min_browsers: usize,
    /// Hard cap on concurrent browser processes.
    pub max_browsers: usize,
    /// Concurrent browsing contexts per browser process.
    pub max_contexts_per_browser: usize,
    /// Idle time after which a surplus browser is closed.
    pub idle_timeout: Duration,
    /// Health ticker period.
    pub health_check_interval: Duration,
    /// Default deadline for queued acquisitions.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_browsers: 1,
            max_browsers: 3,
            max_contexts_per_browser: 5,
            idle_timeout: Duration::from_secs(300),
            health_check_interval: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// One live browser process and its bookkeeping.
#[derive(Debug)]
struct BrowserInstance {
    id: Uuid,
    handle: Arc<Browser>,
    lease_count: usize,
    created_at: Instant,
    last_used: Instant,
    healthy: bool,
    handler_task: tokio::task::JoinHandle<()>,
    // Chrome locks its profile directory; each process needs its own, kept
    // alive for the browser's lifetime.
    _profile_dir: TempDir,
}

impl BrowserInstance {
    fn has_spare_capacity(&self, config: &PoolConfig) -> bool {
        self.healthy && self.lease_count < config.max_contexts_per_browser
    }
}

/// Pool lifecycle events, consumed by a logging monitor task.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    BrowserLaunched { id: Uuid },
    BrowserRemoved { id: Uuid, reason: String },
    BrowserDisconnected { id: Uuid },
    LeaseGranted { browser_id: Uuid },
    LeaseReleased { browser_id: Uuid },
}

/// A queued acquisition. `claimed` is the one-way pending -> {claimed,
/// cancelled} transition: whichever of `process_queue` and the waiter's
/// deadline flips it first wins the waiter.
#[derive(Debug)]
struct Waiter {
    tx: oneshot::Sender<Result<ReservedSlot, PoolError>>,
    claimed: Arc<AtomicBool>,
}

/// A reserved context slot on one instance. The lease count is already
/// incremented; the holder must either turn it into a [`Lease`] or hand it
/// back via `release_reserved`.
#[derive(Debug)]
pub struct ReservedSlot {
    pub(crate) browser_id: Uuid,
    pub(crate) handle: Arc<Browser>,
}

#[derive(Debug)]
struct PoolInner {
    instances: HashMap<Uuid, BrowserInstance>,
    queue: VecDeque<Waiter>,
    shutting_down: bool,
}

/// Point-in-time capacity snapshot, served by `/health` and
/// `/v1/pool/status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolCapacity {
    pub browsers: usize,
    pub healthy_browsers: usize,
    pub active_leases: usize,
    pub available_slots: usize,
    pub queue_length: usize,
    pub max_browsers: usize,
    pub max_contexts_per_browser: usize,
}

/// Cloneable handle used by leases to report releases without holding a
/// reference to the pool itself.
#[derive(Clone, Debug)]
pub(crate) struct PoolHandle {
    inner: Arc<Mutex<PoolInner>>,
    config: PoolConfig,
    events_tx: mpsc::UnboundedSender<PoolEvent>,
}

impl PoolHandle {
    async fn release_slot(&self, browser_id: Uuid) {
        let mut guard = self.inner.lock().await;
        if let Some(instance) = guard.instances.get_mut(&browser_id) {
            instance.lease_count = instance.lease_count.saturating_sub(1);
            instance.last_used = Instant::now();
        }
        BrowserPool::process_queue(&mut guard, &self.config, &self.events_tx);
        let _ = self.events_tx.send(PoolEvent::LeaseReleased { browser_id });
    }
}

/// The browser pool.
pub struct BrowserPool {
    config: PoolConfig,
    inner: Arc<Mutex<PoolInner>>,
    events_tx: mpsc::UnboundedSender<PoolEvent>,
    disconnect_tx: mpsc::UnboundedSender<Uuid>,
    shutdown_tx: mpsc::Sender<()>,
    init: OnceCell<()>,
}

impl BrowserPool {
    /// Create the pool and start its supervisor. No browser is launched
    /// until [`BrowserPool::initialize`] runs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: PoolConfig) -> Self {
        let inner = Arc::new(Mutex::new(PoolInner {
            instances: HashMap::new(),
            queue: VecDeque::new(),
            shutting_down: false,
        }));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Self::spawn_event_logger(events_rx);
        Self::spawn_supervisor(
            config.clone(),
            inner.clone(),
            events_tx.clone(),
            disconnect_tx.clone(),
            disconnect_rx,
            shutdown_rx,
        );

        Self {
            config,
            inner,
            events_tx,
            disconnect_tx,
            shutdown_tx,
            init: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Launch `min_browsers` in parallel. Idempotent: concurrent callers
    /// share one completion, and a failed attempt can be retried.
    ///
    /// Fails when `min_browsers > 0` and not a single browser came up.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        self.init
            .get_or_try_init(|| async {
                if self.config.min_browsers == 0 {
                    info!("browser pool initialized with no resident browsers");
                    return Ok(());
                }

                let launches = (0..self.config.min_browsers).map(|_| {
                    Self::launch_instance(
                        &self.config,
                        &self.inner,
                        &self.events_tx,
                        &self.disconnect_tx,
                    )
                });
                let results = futures::future::join_all(launches).await;
                let launched = results.iter().filter(|r| r.is_ok()).count();

                if launched == 0 {
                    let detail = results
                        .into_iter()
                        .find_map(|r| r.err())
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(PoolError::Launch(format!(
                        "no browser could be launched: {detail}"
                    )));
                }

                info!(
                    launched,
                    requested = self.config.min_browsers,
                    "browser pool initialized"
                );
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// Reserve a context slot, queueing FIFO when the pool is saturated.
    ///
    /// `deadline` overrides the configured `acquire_timeout` for the queued
    /// wait; expiry fails with [`PoolError::QueueTimeout`].
    pub async fn acquire_slot(
        &self,
        deadline: Option<Duration>,
    ) -> Result<ReservedSlot, PoolError> {
        if self.inner.lock().await.shutting_down {
            return Err(PoolError::ShuttingDown);
        }
        self.initialize().await?;

        {
            let mut guard = self.inner.lock().await;
            if guard.shutting_down {
                return Err(PoolError::ShuttingDown);
            }
            if let Some(slot) = Self::try_reserve(&mut guard, &self.config) {
                let _ = self.events_tx.send(PoolEvent::LeaseGranted {
                    browser_id: slot.browser_id,
                });
                return Ok(slot);
            }
        }

        // No capacity on the resident instances; try growing the pool. The
        // launch itself drains the queue first, so an earlier waiter may eat
        // the new capacity before we re-check.
        if Self::launch_instance(&self.config, &self.inner, &self.events_tx, &self.disconnect_tx)
            .await
            .is_ok()
        {
            let mut guard = self.inner.lock().await;
            if guard.shutting_down {
                return Err(PoolError::ShuttingDown);
            }
            if let Some(slot) = Self::try_reserve(&mut guard, &self.config) {
                let _ = self.events_tx.send(PoolEvent::LeaseGranted {
                    browser_id: slot.browser_id,
                });
                return Ok(slot);
            }
        }

        self.wait_queued(deadline.unwrap_or(self.config.acquire_timeout))
            .await
    }

    /// Enqueue a pending acquisition and wait for a grant or the deadline.
    async fn wait_queued(&self, deadline: Duration) -> Result<ReservedSlot, PoolError> {
        let (tx, mut rx) = oneshot::channel();
        let claimed = Arc::new(AtomicBool::new(false));

        {
            let mut guard = self.inner.lock().await;
            if guard.shutting_down {
                return Err(PoolError::ShuttingDown);
            }
            guard.queue.push_back(Waiter {
                tx,
                claimed: claimed.clone(),
            });
            debug!(queue_length = guard.queue.len(), "acquisition queued");
        }

        tokio::select! {
            granted = &mut rx => match granted {
                Ok(result) => result,
                // Sender dropped without a grant: pool state was cleared.
                Err(_) => Err(PoolError::ShuttingDown),
            },
            _ = tokio::time::sleep(deadline) => {
                if claimed
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    // Cancellation won; drop our queue entry.
                    let mut guard = self.inner.lock().await;
                    guard.queue.retain(|w| !Arc::ptr_eq(&w.claimed, &claimed));
                    Err(PoolError::QueueTimeout)
                } else {
                    // A grant is in flight; accept it and hand it straight
                    // back so the slot is not leaked.
                    if let Ok(Ok(slot)) = (&mut rx).await {
                        self.release_reserved(slot).await;
                    }
                    Err(PoolError::QueueTimeout)
                }
            }
        }
    }

    /// Turn a reserved slot plus an engine context/page pair into a lease.
    pub(crate) fn complete_lease(
        &self,
        slot: ReservedSlot,
        context_id: BrowserContextId,
        page: Page,
    ) -> Lease {
        Lease {
            browser_id: slot.browser_id,
            context_id,
            page,
            handle: slot.handle,
            pool: self.handle(),
            released: false,
        }
    }

    /// Hand back a reserved slot whose context never materialized.
    pub(crate) async fn release_reserved(&self, slot: ReservedSlot) {
        self.handle().release_slot(slot.browser_id).await;
    }

    pub(crate) fn handle(&self) -> PoolHandle {
        PoolHandle {
            inner: self.inner.clone(),
            config: self.config.clone(),
            events_tx: self.events_tx.clone(),
        }
    }

    /// Point-in-time capacity totals.
    pub async fn capacity(&self) -> PoolCapacity {
        let guard = self.inner.lock().await;
        let healthy_browsers = guard.instances.values().filter(|i| i.healthy).count();
        let active_leases: usize = guard.instances.values().map(|i| i.lease_count).sum();
        let healthy_spare: usize = guard
            .instances
            .values()
            .filter(|i| i.healthy)
            .map(|i| self.config.max_contexts_per_browser.saturating_sub(i.lease_count))
            .sum();
        let unlaunched = self
            .config
            .max_browsers
            .saturating_sub(guard.instances.len())
            * self.config.max_contexts_per_browser;

        PoolCapacity {
            browsers: guard.instances.len(),
            healthy_browsers,
            active_leases,
            available_slots: healthy_spare + unlaunched,
            queue_length: guard
                .queue
                .iter()
                .filter(|w| !w.claimed.load(Ordering::SeqCst))
                .count(),
            max_browsers: self.config.max_browsers,
            max_contexts_per_browser: self.config.max_contexts_per_browser,
        }
    }

    /// Stop serving acquisitions, fail every queued waiter, close all
    /// browsers concurrently and clear state.
    pub async fn shutdown(&self) {
        info!("shutting down browser pool");

        let (instances, waiters) = {
            let mut guard = self.inner.lock().await;
            guard.shutting_down = true;
            let instances: Vec<BrowserInstance> =
                guard.instances.drain().map(|(_, v)| v).collect();
            let waiters: Vec<Waiter> = guard.queue.drain(..).collect();
            (instances, waiters)
        };

        let _ = self.shutdown_tx.send(()).await;

        for waiter in waiters {
            if waiter
                .claimed
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let _ = waiter.tx.send(Err(PoolError::ShuttingDown));
            }
        }

        let closes = instances
            .into_iter()
            .map(|instance| Self::close_instance(instance, "shutdown"));
        futures::future::join_all(closes).await;

        info!("browser pool shutdown completed");
    }

    // ---- internals -------------------------------------------------------

    /// Reserve a slot if, and only if, no earlier waiter is still queued.
    fn try_reserve(guard: &mut PoolInner, config: &PoolConfig) -> Option<ReservedSlot> {
        guard.queue.retain(|w| !w.claimed.load(Ordering::SeqCst));
        if !guard.queue.is_empty() {
            return None;
        }
        Self::reserve_any(guard, config)
    }

    /// Increment the least-loaded healthy instance's lease count and return
    /// its slot. The increment happens before any engine call so capacity
    /// decisions stay conservative.
    fn reserve_any(guard: &mut PoolInner, config: &PoolConfig) -> Option<ReservedSlot> {
        let instance = guard
            .instances
            .values_mut()
            .filter(|i| i.has_spare_capacity(config))
            .min_by_key(|i| i.lease_count)?;
        instance.lease_count += 1;
        instance.last_used = Instant::now();
        Some(ReservedSlot {
            browser_id: instance.id,
            handle: instance.handle.clone(),
        })
    }

    /// Drain the queue head-first while capacity lasts. Runs after every
    /// release and every successful launch.
    fn process_queue(
        guard: &mut PoolInner,
        config: &PoolConfig,
        events_tx: &mpsc::UnboundedSender<PoolEvent>,
    ) {
        loop {
            let has_capacity = guard
                .instances
                .values()
                .any(|i| i.has_spare_capacity(config));
            if !has_capacity {
                break;
            }
            let Some(waiter) = guard.queue.pop_front() else {
                break;
            };
            if waiter
                .claimed
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                // Waiter cancelled itself; keep draining.
                continue;
            }
            let Some(slot) = Self::reserve_any(guard, config) else {
                // Cannot happen while the lock is held, but never strand a
                // claimed waiter.
                let _ = waiter.tx.send(Err(PoolError::Engine(
                    "capacity vanished during queue processing".to_string(),
                )));
                break;
            };
            let browser_id = slot.browser_id;
            if let Err(unsent) = waiter.tx.send(Ok(slot)) {
                // Receiver is gone (acquire future dropped); roll back.
                if let Ok(slot) = unsent {
                    if let Some(instance) = guard.instances.get_mut(&slot.browser_id) {
                        instance.lease_count = instance.lease_count.saturating_sub(1);
                    }
                }
                continue;
            }
            let _ = events_tx.send(PoolEvent::LeaseGranted { browser_id });
        }
    }

    /// Launch one browser if below `max_browsers`, register it and drain the
    /// queue against the new capacity.
    async fn launch_instance(
        config: &PoolConfig,
        inner: &Arc<Mutex<PoolInner>>,
        events_tx: &mpsc::UnboundedSender<PoolEvent>,
        disconnect_tx: &mpsc::UnboundedSender<Uuid>,
    ) -> Result<Uuid, PoolError> {
        {
            let guard = inner.lock().await;
            if guard.shutting_down {
                return Err(PoolError::ShuttingDown);
            }
            if guard.instances.len() >= config.max_browsers {
                return Err(PoolError::Launch("pool is at max_browsers".to_string()));
            }
        }

        let id = Uuid::new_v4();
        let profile_dir = TempDir::new()
            .map_err(|e| PoolError::Launch(format!("failed to create profile dir: {e}")))?;

        let browser_config = BrowserConfig::builder()
            .user_data_dir(profile_dir.path())
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-backgrounding-occluded-windows")
            .arg("--disable-renderer-backgrounding")
            .arg("--memory-pressure-off")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .build()
            .map_err(PoolError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| PoolError::Launch(e.to_string()))?;

        // Drain CDP events for this process; when the stream ends the
        // browser has disconnected and the supervisor takes over.
        let handler_task = {
            let disconnect_tx = disconnect_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        debug!(browser_id = %id, error = %e, "browser event error");
                    }
                }
                let _ = disconnect_tx.send(id);
            })
        };

        let now = Instant::now();
        let instance = BrowserInstance {
            id,
            handle: Arc::new(browser),
            lease_count: 0,
            created_at: now,
            last_used: now,
            healthy: true,
            handler_task,
            _profile_dir: profile_dir,
        };

        let mut guard = inner.lock().await;
        if guard.shutting_down || guard.instances.len() >= config.max_browsers {
            // Lost the race while launching; close what we just started.
            drop(guard);
            Self::close_instance(instance, "launch raced capacity limit").await;
            return Err(PoolError::Launch("pool is at max_browsers".to_string()));
        }
        guard.instances.insert(id, instance);
        Self::process_queue(&mut guard, config, events_tx);
        drop(guard);

        let _ = events_tx.send(PoolEvent::BrowserLaunched { id });
        info!(browser_id = %id, "browser launched");
        Ok(id)
    }

    /// Gracefully close one instance: ask the browser to exit over CDP, then
    /// stop its event task. Already-dead processes are tolerated.
    async fn close_instance(instance: BrowserInstance, reason: &str) {
        debug!(
            browser_id = %instance.id,
            reason,
            uptime_s = instance.created_at.elapsed().as_secs(),
            "closing browser"
        );
        if let Err(e) = timeout(
            Duration::from_secs(5),
            instance.handle.execute(CloseParams::default()),
        )
        .await
        .map_err(|_| "browser close timed out".to_string())
        .and_then(|r| r.map(|_| ()).map_err(|e| e.to_string()))
        {
            debug!(browser_id = %instance.id, error = %e, "browser close failed (likely already gone)");
        }
        instance.handler_task.abort();
    }

    /// Evict a disconnected instance and replace it when below minimum.
    async fn handle_disconnect(
        config: &PoolConfig,
        inner: &Arc<Mutex<PoolInner>>,
        events_tx: &mpsc::UnboundedSender<PoolEvent>,
        disconnect_tx: &mpsc::UnboundedSender<Uuid>,
        browser_id: Uuid,
    ) {
        let (removed, shutting_down, below_min) = {
            let mut guard = inner.lock().await;
            let removed = guard.instances.remove(&browser_id);
            let shutting_down = guard.shutting_down;
            let below_min = guard.instances.len() < config.min_browsers;
            (removed, shutting_down, below_min)
        };

        let Some(instance) = removed else {
            return;
        };
        warn!(browser_id = %browser_id, "browser disconnected");
        instance.handler_task.abort();
        let _ = events_tx.send(PoolEvent::BrowserDisconnected { id: browser_id });
        let _ = events_tx.send(PoolEvent::BrowserRemoved {
            id: browser_id,
            reason: "disconnected".to_string(),
        });

        if !shutting_down && below_min {
            if let Err(e) = Self::launch_instance(config, inner, events_tx, disconnect_tx).await {
                error!(error = %e, "failed to replace disconnected browser");
            }
        }
    }

    /// One health tick: evict dead instances, reap surplus idle ones, then
    /// top the pool back up to its minimum.
    async fn health_tick(
        config: &PoolConfig,
        inner: &Arc<Mutex<PoolInner>>,
        events_tx: &mpsc::UnboundedSender<PoolEvent>,
        disconnect_tx: &mpsc::UnboundedSender<Uuid>,
    ) {
        let mut to_close = Vec::new();
        {
            let mut guard = inner.lock().await;
            if guard.shutting_down {
                return;
            }

            let dead: Vec<Uuid> = guard
                .instances
                .values()
                .filter(|i| i.handler_task.is_finished() || !i.healthy)
                .map(|i| i.id)
                .collect();
            for id in dead {
                if let Some(instance) = guard.instances.remove(&id) {
                    let _ = events_tx.send(PoolEvent::BrowserRemoved {
                        id,
                        reason: "disconnected".to_string(),
                    });
                    to_close.push((instance, "disconnected"));
                }
            }

            // Only instances with zero leases are eligible, so the reaper
            // can never race an in-flight release.
            let idle: Vec<Uuid> = guard
                .instances
                .values()
                .filter(|i| i.lease_count == 0 && i.last_used.elapsed() > config.idle_timeout)
                .map(|i| i.id)
                .collect();
            for id in idle {
                if guard.instances.len() <= config.min_browsers {
                    break;
                }
                if let Some(instance) = guard.instances.remove(&id) {
                    let _ = events_tx.send(PoolEvent::BrowserRemoved {
                        id,
                        reason: "idle timeout".to_string(),
                    });
                    to_close.push((instance, "idle timeout"));
                }
            }
        }

        for (instance, reason) in to_close {
            Self::close_instance(instance, reason).await;
        }

        loop {
            let needs_replacement = {
                let guard = inner.lock().await;
                !guard.shutting_down && guard.instances.len() < config.min_browsers
            };
            if !needs_replacement {
                break;
            }
            if let Err(e) = Self::launch_instance(config, inner, events_tx, disconnect_tx).await {
                warn!(error = %e, "failed to restore minimum pool size");
                break;
            }
        }
    }

    fn spawn_supervisor(
        config: PoolConfig,
        inner: Arc<Mutex<PoolInner>>,
        events_tx: mpsc::UnboundedSender<PoolEvent>,
        disconnect_tx: mpsc::UnboundedSender<Uuid>,
        mut disconnect_rx: mpsc::UnboundedReceiver<Uuid>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tokio::spawn(async move {
            let mut ticker = interval(config.health_check_interval);
            // The first tick fires immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::health_tick(&config, &inner, &events_tx, &disconnect_tx).await;
                    }
                    Some(browser_id) = disconnect_rx.recv() => {
                        Self::handle_disconnect(&config, &inner, &events_tx, &disconnect_tx, browser_id).await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("pool supervisor stopping");
                        break;
                    }
                }
            }
        });
    }

    fn spawn_event_logger(mut events_rx: mpsc::UnboundedReceiver<PoolEvent>) {
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    PoolEvent::BrowserLaunched { id } => {
                        debug!(browser_id = %id, "pool event: browser launched");
                    }
                    PoolEvent::BrowserRemoved { id, reason } => {
                        debug!(browser_id = %id, reason = %reason, "pool event: browser removed");
                    }
                    PoolEvent::BrowserDisconnected { id } => {
                        warn!(browser_id = %id, "pool event: browser disconnected");
                    }
                    PoolEvent::LeaseGranted { browser_id } => {
                        debug!(browser_id = %browser_id, "pool event: lease granted");
                    }
                    PoolEvent::LeaseReleased { browser_id } => {
                        debug!(browser_id = %browser_id, "pool event: lease released");
                    }
                }
            }
        });
    }
}

/// An exclusive browsing context bound to one in-flight request.
///
/// Release is one-shot: the explicit [`Lease::release`] closes the page,
/// disposes the context and returns the slot; dropping an unreleased lease
/// spawns the same teardown best-effort so cancellation and panics cannot
/// leak capacity.
#[derive(Debug)]
pub struct Lease {
    browser_id: Uuid,
    context_id: BrowserContextId,
    page: Page,
    handle: Arc<Browser>,
    pool: PoolHandle,
    released: bool,
}

impl Lease {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn browser_id(&self) -> Uuid {
        self.browser_id
    }

    /// Release the lease. Safe to call exactly once; the drop guard turns a
    /// forgotten release into a background teardown instead of a leak.
    pub async fn release(mut self) {
        self.released = true;
        Self::teardown(
            self.page.clone(),
            self.handle.clone(),
            self.context_id.clone(),
            self.pool.clone(),
            self.browser_id,
        )
        .await;
    }

    async fn teardown(
        page: Page,
        handle: Arc<Browser>,
        context_id: BrowserContextId,
        pool: PoolHandle,
        browser_id: Uuid,
    ) {
        // Page first, then its context; both tolerate already-closed errors.
        if let Err(e) = page.close().await {
            debug!(browser_id = %browser_id, error = %e, "page close failed (likely already closed)");
        }
        match DisposeBrowserContextParams::builder()
            .browser_context_id(context_id)
            .build()
        {
            Ok(params) => {
                if let Err(e) = handle.execute(params).await {
                    debug!(browser_id = %browser_id, error = %e, "context dispose failed (likely already gone)");
                }
            }
            Err(e) => {
                debug!(browser_id = %browser_id, error = %e, "context dispose params invalid");
            }
        }
        pool.release_slot(browser_id).await;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        debug!(
            browser_id = %self.browser_id,
            "lease dropped without explicit release; tearing down in background"
        );
        let page = self.page.clone();
        let handle = self.handle.clone();
        let context_id = self.context_id.clone();
        let pool = self.pool.clone();
        let browser_id = self.browser_id;
        tokio::spawn(async move {
            Self::teardown(page, handle, context_id, pool, browser_id).await;
        });
    }
}
