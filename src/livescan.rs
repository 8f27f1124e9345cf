use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::embedding::Embedding;
use crate::errors::{EngineError, EngineResult};
use crate::matcher;

/// Probe acquisition failure, split by whether the scan loop keeps going.
#[derive(Debug)]
pub enum ProbeError {
    /// Logged and retried on the next tick.
    Transient(String),
    /// Surfaced to the caller; the controller returns to `Idle`.
    Fatal(String),
}

/// Supplies fresh probe embeddings to the live-scan loop. Implementations
/// typically wrap a camera plus the face model (see `vision`).
pub trait ProbeSource: Send + 'static {
    fn next_probe(&mut self) -> Result<Embedding, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Succeeded,
}

/// Observable controller snapshot, refreshed after every completed tick.
#[derive(Debug, Clone)]
pub struct ScanStatus {
    pub state: ScanState,
    pub last_similarity: Option<f32>,
    pub ticks: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Per-scan threshold override; falls back to the controller default.
    pub threshold: Option<f32>,
    /// Tick rate; the period is `1 / checks_per_second`. Must be positive.
    pub checks_per_second: f32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            threshold: None,
            checks_per_second: 2.0,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ScanState,
    /// Bumped on stop/cancel/success; a worker holding a stale generation
    /// discards its result instead of applying it.
    generation: u64,
    last_similarity: Option<f32>,
    ticks: u64,
    last_error: Option<String>,
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Drives repeated probe-vs-target verification on a timer.
///
/// Single owner: one active worker at a time, at most one acquire+compare in
/// flight. A tick that fires while the previous one is still outstanding is
/// dropped, never queued, so backlog is bounded by capture latency rather
/// than the configured rate. Dropping the controller cancels the scan.
#[derive(Debug)]
pub struct LiveScanController {
    shared: Arc<Shared>,
    dimension: usize,
    default_threshold: f32,
    worker: Option<JoinHandle<()>>,
}

impl LiveScanController {
    pub fn new(dimension: usize, default_threshold: f32) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: ScanState::Idle,
                    generation: 0,
                    last_similarity: None,
                    ticks: 0,
                    last_error: None,
                }),
            }),
            dimension,
            default_threshold,
            worker: None,
        }
    }

    /// Begin scanning against `target`. Only valid from `Idle`.
    pub fn start<S: ProbeSource>(
        &mut self,
        source: S,
        target: Embedding,
        opts: ScanOptions,
    ) -> EngineResult<()> {
        if opts.checks_per_second <= 0.0 {
            return Err(EngineError::Validation(
                "checks_per_second must be positive".into(),
            ));
        }
        if target.dim() != self.dimension {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension,
                found: target.dim(),
            });
        }
        if target.as_slice().iter().all(|v| *v == 0.0) {
            return Err(EngineError::Validation(
                "scan target must be a non-zero embedding".into(),
            ));
        }

        let threshold = opts.threshold.unwrap_or(self.default_threshold);
        let period = Duration::from_secs_f32(1.0 / opts.checks_per_second);

        let generation;
        {
            let mut inner = self.shared.lock();
            if inner.state != ScanState::Idle {
                return Err(EngineError::Validation(
                    "scan already in progress; stop or reset first".into(),
                ));
            }
            inner.state = ScanState::Scanning;
            inner.generation += 1;
            inner.last_similarity = None;
            inner.ticks = 0;
            inner.last_error = None;
            generation = inner.generation;
        }

        self.reap_worker();
        let shared = Arc::clone(&self.shared);
        self.worker = Some(thread::spawn(move || {
            scan_loop(shared, generation, source, target, threshold, period);
        }));
        debug!(
            "live scan started: threshold={threshold:.3} period={}ms",
            period.as_millis()
        );
        Ok(())
    }

    /// Cancel an active scan. No further ticks are applied; a comparison
    /// already in flight has its result discarded when it lands.
    pub fn stop(&mut self) {
        let mut inner = self.shared.lock();
        if inner.state == ScanState::Scanning {
            inner.state = ScanState::Idle;
            debug!("live scan stopped after {} tick(s)", inner.ticks);
        }
        inner.generation += 1;
    }

    /// Alias for [`stop`](Self::stop); matches the caller-facing verb for
    /// user-driven teardown.
    pub fn cancel(&mut self) {
        self.stop();
    }

    /// Return from `Succeeded` to `Idle`, clearing per-scan progress.
    pub fn reset(&mut self) {
        let mut inner = self.shared.lock();
        if inner.state == ScanState::Succeeded {
            inner.state = ScanState::Idle;
            inner.last_similarity = None;
            inner.ticks = 0;
            inner.last_error = None;
        }
    }

    pub fn state(&self) -> ScanState {
        self.shared.lock().state
    }

    pub fn status(&self) -> ScanStatus {
        let inner = self.shared.lock();
        ScanStatus {
            state: inner.state,
            last_similarity: inner.last_similarity,
            ticks: inner.ticks,
            last_error: inner.last_error.clone(),
        }
    }

    /// Join a finished worker; a worker still blocked in capture is left to
    /// exit on its own once it observes the bumped generation.
    fn reap_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("live scan worker panicked");
                }
            } else {
                debug!("previous scan worker still draining; detached");
            }
        }
    }
}

impl Drop for LiveScanController {
    fn drop(&mut self) {
        self.stop();
        self.reap_worker();
    }
}

fn scan_loop<S: ProbeSource>(
    shared: Arc<Shared>,
    generation: u64,
    mut source: S,
    target: Embedding,
    threshold: f32,
    period: Duration,
) {
    let mut next_tick = Instant::now();
    loop {
        if shared.lock().generation != generation {
            return;
        }

        let now = Instant::now();
        if now < next_tick {
            thread::sleep(next_tick - now);
            continue;
        }
        // Schedule strictly past "now": ticks missed while the previous
        // acquire+compare was outstanding are dropped, not queued.
        while next_tick <= Instant::now() {
            next_tick += period;
        }

        let tick = source.next_probe().and_then(|probe| {
            matcher::compare(&target, &probe, threshold)
                .map_err(|err| ProbeError::Transient(err.to_string()))
        });

        let mut inner = shared.lock();
        if inner.generation != generation {
            // Cancelled while this comparison was in flight.
            return;
        }
        match tick {
            Ok(cmp) => {
                inner.ticks += 1;
                inner.last_similarity = Some(cmp.similarity);
                if cmp.verified {
                    inner.state = ScanState::Succeeded;
                    inner.generation += 1;
                    debug!(
                        "live scan verified at similarity {:.3} on tick {}",
                        cmp.similarity, inner.ticks
                    );
                    return;
                }
            }
            Err(ProbeError::Transient(msg)) => {
                inner.ticks += 1;
                inner.last_error = Some(msg.clone());
                drop(inner);
                warn!("live scan tick failed, retrying: {msg}");
            }
            Err(ProbeError::Fatal(msg)) => {
                inner.state = ScanState::Idle;
                inner.last_error = Some(msg.clone());
                inner.generation += 1;
                drop(inner);
                warn!("live scan aborted: {msg}");
                return;
            }
        }
    }
}
