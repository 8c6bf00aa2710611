//! Jobs and runs.
//!
//! A [`Job`] owns the sampler and certainty estimator of one validation
//! process and tracks every run it has issued. Each run is a slot whose state
//! lives in a single `AtomicU8`:
//!
//! ```text
//! Pending ──claim──► Dispatched ──send──► Completed
//!                        │                   ▲
//!                     timeout                │ late send
//!                        ▼                   │
//!                    Abandoned ──────────────┘
//!                        │
//!                     resample
//!                        ▼
//!                    Resampled   (send fails with StaleRun)
//! ```
//!
//! Every transition is a compare-and-swap, so a pending run is handed to at
//! most one caller and a run is completed at most once. A resample issues a
//! new slot with the same coordinates.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use valicy_core::{
    CertaintyEstimate, CertaintyEstimator, Point, RetirementPolicy, RunOrigin, RunSampler, Schema,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::report::{InstanceSnapshot, JobReport, RetiredInstance};
use crate::sync::{lock, read, write, TimedGuard, TimedMutex};

const PENDING: u8 = 0;
const DISPATCHED: u8 = 1;
const COMPLETING: u8 = 2;
const COMPLETED: u8 = 3;
const ABANDONED: u8 = 4;
const RESAMPLED: u8 = 5;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Generated, not yet handed out.
    Pending,
    /// Handed to a caller, awaiting its output.
    Dispatched,
    /// Output received.
    Completed,
    /// Timed out; a late send is still accepted.
    Abandoned,
    /// Timed out and re-issued as a new run.
    Resampled,
}

impl RunState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            PENDING => RunState::Pending,
            DISPATCHED | COMPLETING => RunState::Dispatched,
            COMPLETED => RunState::Completed,
            ABANDONED => RunState::Abandoned,
            _ => RunState::Resampled,
        }
    }
}

/// Acknowledgement of an accepted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ack {
    /// The output was recorded.
    Accepted,
    /// The run had been abandoned but not yet resampled; the output was
    /// recorded.
    AcceptedLate,
    /// The same output had already been recorded; nothing changed.
    Duplicate,
}

/// Why a job stopped dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// [`Job::close`] was called.
    Manual,
    /// Every output reached its certainty target.
    CertaintyReached,
    /// `max_runs_per_job` fresh runs were generated.
    BudgetExhausted,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Manual => write!(f, "closed manually"),
            CloseReason::CertaintyReached => write!(f, "certainty reached"),
            CloseReason::BudgetExhausted => write!(f, "run budget exhausted"),
        }
    }
}

/// Coarse job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, nothing dispatched yet.
    Open,
    /// Dispatching runs and collecting outputs.
    Collecting,
    /// No further runs are dispatched; outstanding sends are still accepted.
    Closed,
}

/// Run counters of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStats {
    /// Runs issued, resamples included.
    pub issued: u64,
    /// Runs waiting to be dispatched.
    pub pending: u64,
    /// Runs handed out and not yet completed.
    pub dispatched: u64,
    /// Runs with a recorded output.
    pub completed: u64,
    /// Runs abandoned and not (yet) resampled.
    pub abandoned: u64,
    /// Abandoned runs whose coordinates were re-issued.
    pub resampled: u64,
    /// Completions that arrived after abandonment.
    pub late_completions: u64,
    /// Fresh runs produced by the sampler.
    pub generated: u64,
    /// Budget of fresh runs.
    pub max_runs: u64,
    /// Coarse state.
    pub state: JobState,
    /// Why the job closed, if it did.
    pub close_reason: Option<CloseReason>,
}

#[derive(Debug)]
struct RunSlot {
    id: u64,
    point: Point,
    origin: RunOrigin,
    region: usize,
    resample_of: Option<u64>,
    state: AtomicU8,
    /// Nanoseconds since the job epoch.
    dispatched_at: AtomicU64,
    output: OnceLock<Vec<f64>>,
}

impl RunSlot {
    fn load(&self) -> u8 {
        self.state.load(Ordering::SeqCst)
    }

    fn transition(&self, from: u8, to: u8) -> std::result::Result<u8, u8> {
        self.state
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    batch_size: usize,
    max_runs: u64,
    stop_on_certainty: bool,
    run_timeout: Duration,
    generation_timeout: Duration,
}

struct JobInner {
    name: String,
    system: String,
    scenario: String,
    schema: Arc<Schema>,
    settings: Settings,
    epoch: Instant,
    sampler: TimedMutex<RunSampler>,
    estimator: CertaintyEstimator,
    slots: RwLock<Vec<Arc<RunSlot>>>,
    pending: Mutex<VecDeque<u64>>,
    abandoned: Mutex<VecDeque<u64>>,
    retirements: Mutex<Vec<RetiredInstance>>,
    generated: AtomicU64,
    late_completions: AtomicU64,
    dispatched_any: AtomicBool,
    closed: OnceLock<CloseReason>,
}

/// One validation process of a system in a scenario.
///
/// Cheap to clone; clones share the same state and may be used from any
/// number of threads.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.inner.name)
            .field("system", &self.inner.system)
            .field("scenario", &self.inner.scenario)
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

/// Seed of a job: the base seed mixed with an FNV-1a hash of its names, so
/// it does not depend on creation order.
fn job_seed(base: u64, system: &str, scenario: &str, name: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for part in [system, scenario, name] {
        for byte in part.bytes().chain(std::iter::once(0)) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    }
    base ^ hash
}

impl Job {
    pub(crate) fn new(
        system: &str,
        scenario: &str,
        name: &str,
        schema: Arc<Schema>,
        config: &EngineConfig,
        policy: Box<dyn RetirementPolicy>,
    ) -> Self {
        let seed = job_seed(config.seed, system, scenario, name);
        let sampler = RunSampler::new(Schema::clone(&schema), config.sampler_config(seed), policy);
        let estimator =
            CertaintyEstimator::new(&schema, sampler.regions().len(), config.certainty_config());

        tracing::info!(
            job = name,
            scenario,
            regions = sampler.regions().len(),
            grid_points = sampler.grid_remaining(),
            "job created"
        );

        Self {
            inner: Arc::new(JobInner {
                name: name.to_string(),
                system: system.to_string(),
                scenario: scenario.to_string(),
                schema,
                settings: Settings {
                    batch_size: config.batch_size,
                    max_runs: config.max_runs_per_job,
                    stop_on_certainty: config.stop_on_certainty,
                    run_timeout: config.run_timeout,
                    generation_timeout: config.generation_timeout,
                },
                epoch: Instant::now(),
                sampler: TimedMutex::new(sampler),
                estimator,
                slots: RwLock::new(Vec::new()),
                pending: Mutex::new(VecDeque::new()),
                abandoned: Mutex::new(VecDeque::new()),
                retirements: Mutex::new(Vec::new()),
                generated: AtomicU64::new(0),
                late_completions: AtomicU64::new(0),
                dispatched_any: AtomicBool::new(false),
                closed: OnceLock::new(),
            }),
        }
    }

    /// Job name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Name of the system under test.
    pub fn system(&self) -> &str {
        &self.inner.system
    }

    /// Name of the scenario.
    pub fn scenario(&self) -> &str {
        &self.inner.scenario
    }

    /// The frozen schema of the scenario.
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Lazily dispatch up to `number` runs.
    ///
    /// The iterator ends early once the job closes. A dispatch error is
    /// yielded once and ends the iterator.
    pub fn get_runs(&self, number: usize) -> Runs {
        Runs {
            job: self.clone(),
            remaining: number,
        }
    }

    /// Dispatch a single run.
    ///
    /// Abandoned coordinates are re-issued first, then pending runs, and only
    /// then is the sampler asked for a new batch. Fails with
    /// [`EngineError::JobClosed`] once the job stopped dispatching and with
    /// [`EngineError::GenerationTimeout`] if no run could be produced in time.
    pub fn get_next_run(&self) -> Result<Run> {
        let inner = &self.inner;
        let deadline = Instant::now() + inner.settings.generation_timeout;
        loop {
            inner.ensure_open()?;
            if inner.settings.stop_on_certainty && inner.estimator.is_certainty_reached() {
                inner.close(CloseReason::CertaintyReached);
                continue;
            }
            if let Some(slot) = inner.claim_resample() {
                return Ok(self.run(slot));
            }
            if let Some(slot) = inner.claim_pending() {
                return Ok(self.run(slot));
            }
            inner.refill(deadline)?;
        }
    }

    fn run(&self, slot: Arc<RunSlot>) -> Run {
        self.inner.dispatched_any.store(true, Ordering::SeqCst);
        Run {
            job: Arc::clone(&self.inner),
            slot,
        }
    }

    /// Whether every output reached its certainty target.
    pub fn is_certainty_reached(&self) -> bool {
        self.inner.estimator.is_certainty_reached()
    }

    /// Per-output certainty breakdown.
    pub fn certainty(&self) -> Vec<CertaintyEstimate> {
        self.inner.estimator.estimate()
    }

    /// Stop dispatching. Returns false if the job was already closed.
    pub fn close(&self) -> bool {
        self.inner.close(CloseReason::Manual)
    }

    /// Whether the job stopped dispatching.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get().is_some()
    }

    /// Abandon dispatched runs older than the configured `run_timeout`.
    ///
    /// Returns the number of runs abandoned. The background reaper calls this
    /// periodically; it may also be called directly.
    pub fn reclaim_expired(&self) -> usize {
        self.inner.reclaim_older_than(self.inner.settings.run_timeout)
    }

    /// Run counters, computed from a scan of all slots.
    pub fn stats(&self) -> JobStats {
        let inner = &self.inner;
        let mut stats = JobStats {
            issued: 0,
            pending: 0,
            dispatched: 0,
            completed: 0,
            abandoned: 0,
            resampled: 0,
            late_completions: inner.late_completions.load(Ordering::SeqCst),
            generated: inner.generated.load(Ordering::SeqCst),
            max_runs: inner.settings.max_runs,
            state: inner.state(),
            close_reason: inner.closed.get().copied(),
        };
        for slot in read(&inner.slots).iter() {
            stats.issued += 1;
            match RunState::from_raw(slot.load()) {
                RunState::Pending => stats.pending += 1,
                RunState::Dispatched => stats.dispatched += 1,
                RunState::Completed => stats.completed += 1,
                RunState::Abandoned => stats.abandoned += 1,
                RunState::Resampled => stats.resampled += 1,
            }
        }
        stats
    }

    /// Full report: counters, certainty and the instance pool.
    pub fn report(&self) -> JobReport {
        let stats = self.stats();
        let certainty = self.certainty();
        let retirements = lock(&self.inner.retirements).clone();
        let sampler = self.inner.sampler.lock();
        let pool = sampler.pool();
        JobReport {
            job: self.inner.name.clone(),
            system: self.inner.system.clone(),
            scenario: self.inner.scenario.clone(),
            certainty_reached: certainty.iter().all(|e| e.certainty_reached),
            certainty,
            stats,
            regions: sampler.regions().len(),
            grid_remaining: sampler.grid_remaining(),
            instances: pool.active().iter().map(InstanceSnapshot::from).collect(),
            retired: pool.retired(),
            retirements,
        }
    }
}

impl JobInner {
    fn state(&self) -> JobState {
        if self.closed.get().is_some() {
            JobState::Closed
        } else if self.dispatched_any.load(Ordering::SeqCst) {
            JobState::Collecting
        } else {
            JobState::Open
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.closed.get() {
            Some(&reason) => Err(EngineError::JobClosed {
                job: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn close(&self, reason: CloseReason) -> bool {
        let closed = self.closed.set(reason).is_ok();
        if closed {
            tracing::info!(job = %self.name, %reason, "job closed");
        }
        closed
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn slot(&self, id: u64) -> Option<Arc<RunSlot>> {
        let index = usize::try_from(id).ok()?;
        read(&self.slots).get(index).cloned()
    }

    fn claim_pending(&self) -> Option<Arc<RunSlot>> {
        loop {
            let id = lock(&self.pending).pop_front()?;
            let Some(slot) = self.slot(id) else { continue };
            slot.dispatched_at.store(self.now_nanos(), Ordering::SeqCst);
            if slot.transition(PENDING, DISPATCHED).is_ok() {
                return Some(slot);
            }
        }
    }

    fn claim_resample(&self) -> Option<Arc<RunSlot>> {
        loop {
            let id = lock(&self.abandoned).pop_front()?;
            let Some(old) = self.slot(id) else { continue };
            // A late send may have completed it in the meantime.
            if old.transition(ABANDONED, RESAMPLED).is_err() {
                continue;
            }
            let mut slots = write(&self.slots);
            let slot = Arc::new(RunSlot {
                id: slots.len() as u64,
                point: old.point.clone(),
                origin: old.origin,
                region: old.region,
                resample_of: Some(old.id),
                state: AtomicU8::new(DISPATCHED),
                dispatched_at: AtomicU64::new(self.now_nanos()),
                output: OnceLock::new(),
            });
            slots.push(Arc::clone(&slot));
            tracing::debug!(job = %self.name, run = slot.id, resample_of = old.id, "run resampled");
            return Some(slot);
        }
    }

    fn lock_sampler(&self, deadline: Instant) -> Result<TimedGuard<'_, RunSampler>> {
        self.sampler
            .lock_until(deadline)
            .ok_or_else(|| self.generation_timeout())
    }

    fn generation_timeout(&self) -> EngineError {
        tracing::warn!(
            job = %self.name,
            timeout = ?self.settings.generation_timeout,
            "run generation timed out"
        );
        EngineError::GenerationTimeout {
            timeout: self.settings.generation_timeout,
        }
    }

    /// Generate a new batch of pending runs, or close the job if the budget
    /// is spent.
    fn refill(&self, deadline: Instant) -> Result<()> {
        let mut sampler = self.lock_sampler(deadline)?;
        // Another caller may have refilled while we waited.
        if !lock(&self.pending).is_empty() || !lock(&self.abandoned).is_empty() {
            return Ok(());
        }
        let remaining = self.settings.max_runs.saturating_sub(sampler.generated());
        if remaining == 0 {
            self.close(CloseReason::BudgetExhausted);
            return Ok(());
        }

        let count = remaining.min(self.settings.batch_size as u64) as usize;
        let batch = sampler
            .generate(count, Some(deadline))
            .map_err(|_| self.generation_timeout())?;
        self.generated.store(sampler.generated(), Ordering::SeqCst);

        let mut slots = write(&self.slots);
        let mut pending = lock(&self.pending);
        let first = slots.len();
        for candidate in batch {
            let id = slots.len() as u64;
            slots.push(Arc::new(RunSlot {
                id,
                point: candidate.point,
                origin: candidate.origin,
                region: candidate.region,
                resample_of: None,
                state: AtomicU8::new(PENDING),
                dispatched_at: AtomicU64::new(0),
                output: OnceLock::new(),
            }));
            pending.push_back(id);
        }
        tracing::debug!(
            job = %self.name,
            runs = slots.len() - first,
            generated = sampler.generated(),
            "generated runs"
        );
        Ok(())
    }

    fn reclaim_older_than(&self, timeout: Duration) -> usize {
        let now = self.now_nanos();
        let limit = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let expired: Vec<u64> = read(&self.slots)
            .iter()
            .filter(|slot| {
                slot.load() == DISPATCHED
                    && now.saturating_sub(slot.dispatched_at.load(Ordering::SeqCst)) >= limit
                    && slot.transition(DISPATCHED, ABANDONED).is_ok()
            })
            .map(|slot| slot.id)
            .collect();

        if !expired.is_empty() {
            tracing::debug!(job = %self.name, runs = expired.len(), "abandoned expired runs");
            lock(&self.abandoned).extend(expired.iter().copied());
        }
        expired.len()
    }

    fn complete(&self, slot: &RunSlot, output: &BTreeMap<String, f64>) -> Result<Ack> {
        let values = self.schema.decode_outputs(output).map_err(|e| {
            tracing::warn!(job = %self.name, run = slot.id, error = %e, "rejected output");
            EngineError::from(e)
        })?;

        let late = loop {
            match slot.transition(DISPATCHED, COMPLETING) {
                Ok(_) => break false,
                Err(ABANDONED) => {
                    if slot.transition(ABANDONED, COMPLETING).is_ok() {
                        break true;
                    }
                }
                Err(COMPLETING) => thread::yield_now(),
                Err(COMPLETED) => {
                    return if slot.output.get() == Some(&values) {
                        Ok(Ack::Duplicate)
                    } else {
                        tracing::warn!(job = %self.name, run = slot.id, "conflicting output");
                        Err(EngineError::ConflictingOutput { run_id: slot.id })
                    };
                }
                Err(_) => {
                    tracing::warn!(job = %self.name, run = slot.id, "send on resampled run");
                    return Err(EngineError::StaleRun { run_id: slot.id });
                }
            }
        };

        let satisfied = self
            .estimator
            .record(slot.region, slot.origin.is_coverage(), &values);
        let _ = slot.output.set(values);
        let retirement = self.sampler.lock().observe(slot.origin, &slot.point, satisfied);
        if let Some(retirement) = retirement {
            let review = retirement.review;
            lock(&self.retirements).push(RetiredInstance::from(&review));
            tracing::info!(
                job = %self.name,
                instance = review.instance_id,
                predictions = review.predictions,
                width_gain = review.width_gain(),
                "instance retired"
            );
        }
        slot.state.store(COMPLETED, Ordering::SeqCst);

        if late {
            self.late_completions.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(job = %self.name, run = slot.id, "late send accepted");
        }
        if self.settings.stop_on_certainty
            && self.closed.get().is_none()
            && self.estimator.is_certainty_reached()
        {
            self.close(CloseReason::CertaintyReached);
        }
        Ok(if late { Ack::AcceptedLate } else { Ack::Accepted })
    }
}

/// A dispatched sample point of the feature space.
#[derive(Clone)]
pub struct Run {
    job: Arc<JobInner>,
    slot: Arc<RunSlot>,
}

impl fmt::Debug for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("id", &self.slot.id)
            .field("job", &self.job.name)
            .field("origin", &self.slot.origin)
            .field("state", &self.state())
            .finish()
    }
}

impl Run {
    /// Run identifier, unique within its job.
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    /// Feature values in schema order.
    pub fn features(&self) -> &[f64] {
        &self.slot.point
    }

    /// Feature values by name.
    pub fn get_test_features(&self) -> BTreeMap<String, f64> {
        self.job.schema.features_map(&self.slot.point)
    }

    /// An output mapping with every configured output name set to `0.0`,
    /// ready to be filled in and passed to [`send`](Self::send).
    pub fn get_result_dict(&self) -> BTreeMap<String, f64> {
        self.job.schema.result_template()
    }

    /// Which stream produced the run.
    pub fn origin(&self) -> RunOrigin {
        self.slot.origin
    }

    /// Region of the run's coordinates.
    pub fn region(&self) -> usize {
        self.slot.region
    }

    /// The abandoned run this one re-issues, if any.
    pub fn resample_of(&self) -> Option<u64> {
        self.slot.resample_of
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        RunState::from_raw(self.slot.load())
    }

    /// The recorded output values, in schema order.
    pub fn output(&self) -> Option<&[f64]> {
        self.slot.output.get().map(Vec::as_slice)
    }

    /// Submit the model output for this run.
    ///
    /// Keys must match the configured output names exactly. Sending the same
    /// output again is acknowledged as [`Ack::Duplicate`]; a different one
    /// fails with [`EngineError::ConflictingOutput`].
    pub fn send(&self, output: &BTreeMap<String, f64>) -> Result<Ack> {
        self.job.complete(&self.slot, output)
    }
}

/// Lazy, finite iterator over dispatched runs. See [`Job::get_runs`].
#[derive(Debug)]
pub struct Runs {
    job: Job,
    remaining: usize,
}

impl Iterator for Runs {
    type Item = Result<Run>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        match self.job.get_next_run() {
            Ok(run) => {
                self.remaining -= 1;
                Some(Ok(run))
            }
            Err(EngineError::JobClosed { .. }) => {
                self.remaining = 0;
                None
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
