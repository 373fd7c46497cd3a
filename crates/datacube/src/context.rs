//! Execution context handed to the query engines.
//!
//! Bundles the worker pool, a progress handle and the sink that receives
//! warnings and per-unit errors. Each query gets its context explicitly, so
//! concurrent queries (and tests) never share hidden global state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::CubeConfig;
use crate::error::{CubeError, Result};

/// Progress reporting handle.
pub trait Progress: Send + Sync {
    /// Set the completed fraction in `[0, 1]`.
    fn set(&self, fraction: f64);
    /// Add `delta` to the completed fraction.
    fn increment(&self, delta: f64);
    /// Mark the operation as finished.
    fn finalize(&self);
}

/// Progress handle that discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn set(&self, _fraction: f64) {}
    fn increment(&self, _delta: f64) {}
    fn finalize(&self) {}
}

/// Progress handle that only records the current fraction.
#[derive(Debug, Default)]
pub struct AtomicProgress {
    bits: AtomicU64,
    finished: std::sync::atomic::AtomicBool,
}

impl AtomicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fraction(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Progress for AtomicProgress {
    fn set(&self, fraction: f64) {
        self.bits.store(fraction.to_bits(), Ordering::Release);
    }

    fn increment(&self, delta: f64) {
        let _ = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + delta).to_bits())
            });
    }

    fn finalize(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Receiver for advisory warnings and per-unit errors.
pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

/// Records diagnostics in memory, for inspection after a query.
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages(Severity::Warning)
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages(Severity::Error)
    }

    fn messages(&self, severity: Severity) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.message.clone())
            .collect()
    }

    fn push(&self, severity: Severity, message: &str) {
        self.lock().push(Diagnostic {
            severity,
            message: message.to_string(),
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DiagnosticSink for CollectingSink {
    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
        self.push(Severity::Warning, message);
    }

    fn error(&self, message: &str) {
        tracing::error!("{}", message);
        self.push(Severity::Error, message);
    }
}

/// Worker pool, progress handle and diagnostics sink for one or more queries.
#[derive(Clone)]
pub struct ExecutionContext {
    pool: Arc<ThreadPool>,
    threads: usize,
    progress: Arc<dyn Progress>,
    sink: Arc<dyn DiagnosticSink>,
}

impl ExecutionContext {
    /// Create a context with `threads` workers, no progress reporting and a
    /// `tracing` sink.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(CubeError::invalid_argument("thread count must be > 0"));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("cube-worker-{}", i))
            .build()
            .map_err(|e| CubeError::precondition(format!("failed to build thread pool: {}", e)))?;

        Ok(Self {
            pool: Arc::new(pool),
            threads,
            progress: Arc::new(NoProgress),
            sink: Arc::new(TracingSink),
        })
    }

    /// Create a context from configuration.
    pub fn from_config(config: &CubeConfig) -> Result<Self> {
        config.validate().map_err(CubeError::invalid_argument)?;
        Self::new(config.threads)
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Recommended degree of parallelism, always >= 1.
    pub fn max_threads(&self) -> usize {
        self.threads
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    pub fn progress(&self) -> &dyn Progress {
        self.progress.as_ref()
    }

    pub fn sink(&self) -> &dyn DiagnosticSink {
        self.sink.as_ref()
    }

    pub fn warn(&self, message: &str) {
        self.sink.warn(message);
    }

    pub fn error(&self, message: &str) {
        self.sink.error(message);
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}
