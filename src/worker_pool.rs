//! # Worker Pool Module
//!
//! Executors for chain segments that must not run on the calling thread.
//!
//! - [`WorkerPool`]: a fixed set of worker coroutines sharing one queue. Blocking
//!   resource methods hop here.
//! - [`VirtualExecutor`]: one fresh coroutine per hop, for methods marked to run on
//!   a virtual thread.
//!
//! Both move the owned [`RequestContext`] to the executor and hand it back when the
//! segment ends, so the context is never shared.
//!
//! ## Configuration
//!
//! - `BRRTR_BLOCKING_WORKERS`: number of worker coroutines (default: 4)
//! - `BRRTR_BLOCKING_QUEUE_BOUND`: queue depth that triggers backpressure (default: 1024)
//! - `BRRTR_BACKPRESSURE_MODE`: `block` waits up to the timeout, `shed` rejects at once
//! - `BRRTR_BACKPRESSURE_TIMEOUT_MS`: wait budget in block mode (default: 50)
//! - `BRRTR_STACK_SIZE`: coroutine stack size, hex or decimal (default: 0x10000)

use crate::context::{Execution, RequestContext};
use crate::error::HandlerError;
use crate::executor;
use may::sync::mpsc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::SendError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What to do when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureMode {
    /// Wait up to the timeout for room, then reject.
    #[default]
    Block,
    /// Reject immediately with 429.
    Shed,
}

impl BackpressureMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "block" => Some(Self::Block),
            "shed" => Some(Self::Shed),
            _ => None,
        }
    }
}

/// Parse a stack size given in decimal or `0x` hex.
#[must_use]
pub fn parse_stack_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    pub num_workers: usize,
    pub queue_bound: usize,
    pub backpressure_mode: BackpressureMode,
    pub backpressure_timeout_ms: u64,
    pub stack_size: usize,
}

impl WorkerPoolConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let num = |key: &str| std::env::var(key).ok().and_then(|s| s.parse::<usize>().ok());
        Self {
            num_workers: num("BRRTR_BLOCKING_WORKERS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.num_workers),
            queue_bound: num("BRRTR_BLOCKING_QUEUE_BOUND").unwrap_or(defaults.queue_bound),
            backpressure_mode: std::env::var("BRRTR_BACKPRESSURE_MODE")
                .ok()
                .and_then(|s| BackpressureMode::parse(&s))
                .unwrap_or_default(),
            backpressure_timeout_ms: std::env::var("BRRTR_BACKPRESSURE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.backpressure_timeout_ms),
            stack_size: std::env::var("BRRTR_STACK_SIZE")
                .ok()
                .and_then(|s| parse_stack_size(&s))
                .unwrap_or(defaults.stack_size),
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_bound: 1024,
            backpressure_mode: BackpressureMode::Block,
            backpressure_timeout_ms: 50,
            stack_size: 0x10000,
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    pub shed_count: AtomicU64,
    /// Approximate.
    pub queue_depth: AtomicUsize,
    pub dispatched_count: AtomicU64,
    pub completed_count: AtomicU64,
}

impl WorkerPoolMetrics {
    pub fn record_shed(&self) {
        self.shed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get_shed_count(&self) -> u64 {
        self.shed_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }
}

/// A context travelling to a worker, with the channel that brings it back.
struct Job {
    ctx: RequestContext,
    reply: mpsc::Sender<RequestContext>,
}

/// Fixed pool of worker coroutines running blocking chain segments.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: mpsc::Sender<Job>,
    metrics: Arc<WorkerPoolMetrics>,
    name: String,
}

impl WorkerPool {
    /// Create the pool and spawn its workers.
    ///
    /// # Safety
    ///
    /// Spawns coroutines with `may::coroutine::Builder::spawn()`, which is unsafe in
    /// the `may` runtime. Workers must not use thread-local storage across
    /// yields; chain handlers only touch the owned context.
    pub unsafe fn new(name: &str, config: WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(rx);
        let metrics = Arc::new(WorkerPoolMetrics::default());

        info!(
            pool = %name,
            num_workers = config.num_workers,
            queue_bound = config.queue_bound,
            backpressure_mode = ?config.backpressure_mode,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        for worker_id in 0..config.num_workers {
            let rx = Arc::clone(&rx);
            let metrics = Arc::clone(&metrics);
            let pool = name.to_string();

            let spawn_result = may::coroutine::Builder::new()
                .name(format!("{name}-{worker_id}"))
                .stack_size(config.stack_size)
                .spawn(move || {
                    debug!(pool = %pool, worker_id, "Worker coroutine started");
                    // All workers share the receiver and balance the queue between them.
                    while let Ok(Job { mut ctx, reply }) = rx.recv() {
                        debug!(
                            request_id = %ctx.request_id(),
                            pool = %pool,
                            worker_id,
                            "Worker processing request"
                        );
                        ctx.set_execution(Execution::Worker);
                        executor::run_segment(&mut ctx);
                        metrics.record_completion();
                        if reply.send(ctx).is_err() {
                            warn!(pool = %pool, worker_id, "Caller went away before the segment finished");
                        }
                    }
                    debug!(pool = %pool, worker_id, "Worker coroutine exiting");
                });

            if let Err(e) = spawn_result {
                error!(pool = %name, worker_id, error = %e, "Failed to spawn worker coroutine");
            }
        }

        Self {
            config,
            sender: tx,
            metrics,
            name: name.to_string(),
        }
    }

    /// Run the next segment of `ctx` on a worker and wait for it.
    ///
    /// When the pool rejects the request the context is failed with 429 or 503
    /// and its abort chain runs on the calling thread. `None` means the context
    /// was lost with its worker.
    pub(crate) fn run_segment(&self, mut ctx: RequestContext) -> Option<RequestContext> {
        if !self.has_room() {
            self.metrics.record_shed();
            warn!(
                request_id = %ctx.request_id(),
                pool = %self.name,
                queue_depth = self.metrics.get_queue_depth(),
                "Worker pool saturated, shedding request"
            );
            ctx.fail(HandlerError::web(429, "Too Many Requests"));
            executor::run_segment(&mut ctx);
            return Some(ctx);
        }

        let (reply, response) = mpsc::channel();
        self.metrics.record_dispatch();
        if let Err(SendError(job)) = self.sender.send(Job { ctx, reply }) {
            self.metrics.record_completion();
            let mut ctx = job.ctx;
            error!(
                request_id = %ctx.request_id(),
                pool = %self.name,
                "Worker pool channel disconnected"
            );
            ctx.fail(HandlerError::unavailable("Blocking workers are not responding"));
            executor::run_segment(&mut ctx);
            return Some(ctx);
        }

        match response.recv() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                error!(pool = %self.name, error = %e, "Worker dropped the request context");
                None
            }
        }
    }

    fn has_room(&self) -> bool {
        let bound = self.config.queue_bound;
        if self.metrics.get_queue_depth() < bound {
            return true;
        }
        if self.config.backpressure_mode == BackpressureMode::Shed {
            return false;
        }
        let deadline = Instant::now() + Duration::from_millis(self.config.backpressure_timeout_ms);
        while Instant::now() < deadline {
            may::coroutine::sleep(Duration::from_millis(1));
            if self.metrics.get_queue_depth() < bound {
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Runs each hop on a dedicated coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualExecutor {
    stack_size: usize,
}

impl VirtualExecutor {
    #[must_use]
    pub fn new(stack_size: usize) -> Self {
        Self { stack_size }
    }

    pub(crate) fn run_segment(&self, mut ctx: RequestContext) -> Option<RequestContext> {
        let request_id = ctx.request_id();
        // SAFETY: the coroutine owns the context and touches no thread-local state;
        // it is joined before this function returns.
        let spawned = unsafe {
            may::coroutine::Builder::new()
                .stack_size(self.stack_size)
                .spawn(move || {
                    ctx.set_execution(Execution::Virtual);
                    executor::run_segment(&mut ctx);
                    ctx
                })
        };
        match spawned {
            Ok(handle) => match handle.join() {
                Ok(ctx) => Some(ctx),
                Err(panic) => {
                    error!(request_id = %request_id, panic_message = ?panic, "Virtual thread panicked");
                    None
                }
            },
            Err(e) => {
                error!(request_id = %request_id, error = %e, "Failed to spawn virtual thread");
                None
            }
        }
    }
}

impl Default for VirtualExecutor {
    fn default() -> Self {
        Self::new(WorkerPoolConfig::default().stack_size)
    }
}
