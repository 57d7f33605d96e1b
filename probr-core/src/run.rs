use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use probr_metrics::agg::RateTracker;
use probr_metrics::{OutcomeKind, Registry};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{RunOptions, Scenario, ScenarioExecutor};
use crate::error::Result;
use crate::outcome::Outcome;
use crate::pool::{Worker, WorkerPool};
use crate::probe::{Endpoint, ProbeError, ProbeRequest, Prober};
use crate::progress::{LiveMetrics, ProgressFn, ProgressUpdate, ScenarioProgress};
use crate::schedule::RateSchedule;
use crate::state::{RunState, StateMachine};
use crate::summary::{RunEnd, RunReport};
use crate::thresholds::Threshold;
use crate::thresholds_eval::{evaluate, validate_thresholds};

/// A validated run: everything a run needs, checked before the first probe goes out.
#[derive(Debug, Clone)]
pub struct Plan {
    scenario: Scenario,
    thresholds: Vec<Threshold>,
    options: RunOptions,
    endpoint: Endpoint,
}

impl Plan {
    pub fn new(
        scenario: Scenario,
        thresholds: Vec<Threshold>,
        options: RunOptions,
        endpoint: Endpoint,
    ) -> Result<Self> {
        scenario.validate()?;
        options.validate()?;
        validate_thresholds(&thresholds, &scenario.targets)?;

        Ok(Self {
            scenario,
            thresholds,
            options,
            endpoint,
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// Caller-side handles of a run: cancellation, live progress, and the state channel.
#[derive(Clone, Default)]
pub struct RunContext {
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
    state: Arc<StateMachine>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> Arc<StateMachine> {
        self.state.clone()
    }
}

#[derive(Debug)]
struct Target {
    url: String,
    tag: Arc<str>,
}

/// Upper bound on how far ahead a deadline is scheduled; longer waits are treated as unbounded.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(base: Instant, wait: Duration) -> Instant {
    base + wait.min(FAR_FUTURE)
}

#[derive(Debug, Default)]
struct DispatchCounters {
    dispatched: AtomicU64,
    dropped: AtomicU64,
}

/// State shared by every probe task of one run.
struct Shared<P> {
    prober: P,
    targets: Arc<[Target]>,
    headers: Arc<[(String, String)]>,
    think_time: Duration,
    probe_timeout: Duration,
    outcomes: mpsc::UnboundedSender<Outcome>,
    registry: Arc<Registry>,
    /// Cancellation: in-flight probes end as `Cancelled`.
    stop: CancellationToken,
    /// Grace period expiry: in-flight probes end as `Abandoned`.
    abandon: CancellationToken,
    counters: Arc<DispatchCounters>,
}

impl<P> Shared<P> {
    fn record(&self, outcome: Outcome) {
        // The recorder outlives every sender; a send error means the run is being torn down.
        let _ = self.outcomes.send(outcome);
    }

    fn interrupted(&self) -> bool {
        self.stop.is_cancelled() || self.abandon.is_cancelled()
    }
}

/// Runs `plan` to completion (or cancellation) and judges the result.
///
/// Transport, protocol and pool-exhaustion failures are recorded as outcomes; the run itself
/// cannot fail once the plan is valid.
pub async fn run<P: Prober>(plan: &Plan, prober: P, ctx: RunContext) -> RunReport {
    let scenario = &plan.scenario;
    let options = plan.options;
    let total_duration = scenario.total_duration();

    let registry = Arc::new(Registry::default());
    let (tx, rx) = mpsc::unbounded_channel::<Outcome>();
    let recorder = tokio::spawn(record_outcomes(rx, registry.clone()));

    let stop = ctx.cancel.child_token();
    let abandon = CancellationToken::new();
    let threshold_abort = Arc::new(AtomicBool::new(false));
    let counters = Arc::new(DispatchCounters::default());
    let pool = WorkerPool::new(scenario.pool_config());

    let targets: Arc<[Target]> = scenario
        .targets
        .iter()
        .map(|t| Target {
            url: plan.endpoint.url_for(&t.path),
            tag: Arc::from(t.tag.as_str()),
        })
        .collect();

    let shared = Arc::new(Shared {
        prober,
        targets,
        headers: Arc::from(plan.endpoint.headers.clone()),
        think_time: scenario.think_time,
        probe_timeout: options.probe_timeout,
        outcomes: tx,
        registry: registry.clone(),
        stop: stop.clone(),
        abandon: abandon.clone(),
        counters: counters.clone(),
    });

    let schedule = match &scenario.executor {
        ScenarioExecutor::RampingArrivalRate {
            start_rate,
            time_unit,
            stages,
            ..
        } => Some(Arc::new(RateSchedule::new(
            *start_rate,
            *time_unit,
            stages.clone(),
        ))),
        ScenarioExecutor::ConstantVus { .. } => None,
    };

    let started = Instant::now();
    ctx.state.advance(RunState::Running);
    tracing::info!(
        scenario = %scenario.name,
        executor = %scenario.kind(),
        duration = ?total_duration,
        targets = scenario.targets.len(),
        "run started"
    );

    let mut monitors: Vec<JoinHandle<()>> = Vec::new();
    if let Some(progress) = ctx.progress.clone() {
        monitors.push(tokio::spawn(report_progress(ProgressTask {
            progress,
            plan_scenario: scenario.clone(),
            interval: options.progress_interval,
            started,
            registry: registry.clone(),
            state: ctx.state.clone(),
            schedule: schedule.clone(),
            pool: pool.clone(),
            counters: counters.clone(),
        })));
    }

    let abort_on_fail: Vec<Threshold> = plan
        .thresholds
        .iter()
        .filter(|t| t.abort_on_fail)
        .cloned()
        .collect();
    if !abort_on_fail.is_empty() {
        monitors.push(tokio::spawn(watch_thresholds(
            abort_on_fail,
            options.evaluation_interval,
            registry.clone(),
            stop.clone(),
            threshold_abort.clone(),
        )));
    }

    let mut tasks: JoinSet<()> = JoinSet::new();
    match (&scenario.executor, &schedule) {
        (ScenarioExecutor::ConstantVus { vus, duration }, _) => {
            let deadline = deadline_after(started, *duration);
            for _ in 0..*vus {
                match pool.try_acquire() {
                    Ok(worker) => {
                        tasks.spawn(vu_loop(shared.clone(), worker, deadline));
                    }
                    Err(err) => tracing::error!(error = %err, "constant pool undersized"),
                }
            }

            tokio::select! {
                biased;
                _ = stop.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
        (ScenarioExecutor::RampingArrivalRate { .. }, Some(schedule)) => {
            dispatch_arrivals(&shared, &pool, schedule, options.tick, started, &mut tasks).await;
        }
        (ScenarioExecutor::RampingArrivalRate { .. }, None) => {}
    }

    let mut grace_expired = false;
    if !stop.is_cancelled() {
        ctx.state.advance(RunState::Draining);
        tracing::info!(
            in_flight = tasks.len(),
            grace_period = ?options.grace_period,
            "admission closed, draining"
        );

        let drained = tokio::select! {
            _ = join_all(&mut tasks) => Drain::Done,
            _ = stop.cancelled() => Drain::Stopped,
            _ = tokio::time::sleep(options.grace_period) => Drain::GraceExpired,
        };

        if drained == Drain::GraceExpired {
            grace_expired = true;
            tracing::warn!(
                in_flight = tasks.len(),
                "grace period expired, abandoning in-flight probes"
            );
            abandon.cancel();
        }
    }

    // Every remaining await in a task selects on `stop` or `abandon`, so this returns promptly.
    join_all(&mut tasks).await;
    ctx.state.advance(RunState::Stopped);

    for m in monitors {
        m.abort();
    }

    // Dropping the last sender lets the recorder drain the channel and exit.
    drop(shared);
    if let Err(err) = recorder.await {
        tracing::error!(error = %err, "outcome recorder failed");
    }

    let elapsed = started.elapsed();
    let snapshot = registry.snapshot();
    let verdict = evaluate(&snapshot, &plan.thresholds);

    let end = if threshold_abort.load(Ordering::Acquire) {
        RunEnd::ThresholdAbort
    } else if stop.is_cancelled() {
        RunEnd::Cancelled
    } else {
        RunEnd::Completed
    };

    let dropped = counters.dropped.load(Ordering::Relaxed);
    if dropped != 0 {
        tracing::warn!(
            dropped,
            max_workers = pool.max(),
            "arrivals dropped, worker pool exhausted"
        );
    }

    let global = snapshot.global();
    tracing::info!(
        %end,
        elapsed = ?elapsed,
        requests = global.total(),
        failed = global.failed(),
        error_rate = global.error_rate(),
        verdict = %verdict.overall,
        "run finished"
    );

    RunReport {
        scenario: scenario.name.clone(),
        verdict,
        elapsed,
        end,
        pool: pool.stats(),
        dispatched: counters.dispatched.load(Ordering::Relaxed),
        dropped,
        grace_expired,
        snapshot,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    Done,
    Stopped,
    GraceExpired,
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(res) = tasks.join_next().await {
        if let Err(err) = res
            && err.is_panic()
        {
            tracing::error!(error = %err, "probe task panicked");
        }
    }
}

async fn record_outcomes(mut rx: mpsc::UnboundedReceiver<Outcome>, registry: Arc<Registry>) {
    while let Some(o) = rx.recv().await {
        registry.record(&o.tag, o.kind, o.latency);
    }
}

/// Fixed-concurrency loop: one worker, iterations back to back until `deadline`.
async fn vu_loop<P: Prober>(shared: Arc<Shared<P>>, mut worker: Worker, deadline: Instant) {
    while Instant::now() < deadline && !shared.interrupted() {
        shared.counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let completed = run_iteration(&shared).await;
        worker.count_iteration();
        if !completed || !think(&shared, Some(deadline)).await {
            break;
        }
    }
}

/// One arrival of the open model. The worker returns to the pool when this finishes.
async fn arrival<P: Prober>(shared: Arc<Shared<P>>, mut worker: Worker) {
    let completed = run_iteration(&shared).await;
    worker.count_iteration();
    if completed {
        think(&shared, None).await;
    }
}

async fn dispatch_arrivals<P: Prober>(
    shared: &Arc<Shared<P>>,
    pool: &Arc<WorkerPool>,
    schedule: &RateSchedule,
    tick: Duration,
    started: Instant,
    tasks: &mut JoinSet<()>,
) {
    let total = schedule.total_duration();
    let mut interval = tokio::time::interval_at(started, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut dispatched = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = shared.stop.cancelled() => return,
            _ = interval.tick() => {}
        }

        let elapsed = started.elapsed().min(total);
        // The epsilon keeps float error at integral boundaries from delaying an arrival a tick.
        let expected = (schedule.expected_arrivals(elapsed) + 1e-9).floor() as u64;
        let due = expected.saturating_sub(dispatched);

        let mut dropped_now = 0u64;
        for _ in 0..due {
            dispatched += 1;
            match pool.try_acquire() {
                Ok(worker) => {
                    tasks.spawn(arrival(shared.clone(), worker));
                }
                Err(_) => {
                    dropped_now += 1;
                    shared.registry.record_dropped_arrival();
                    for t in shared.targets.iter() {
                        shared.record(Outcome::dropped(t.tag.clone()));
                    }
                }
            }
        }

        shared.counters.dispatched.store(dispatched, Ordering::Relaxed);
        if dropped_now != 0 {
            shared
                .counters
                .dropped
                .fetch_add(dropped_now, Ordering::Relaxed);
            tracing::debug!(dropped = dropped_now, "pool exhausted");
        }

        // Reap finished arrivals so the set only holds in-flight work.
        while tasks.try_join_next().is_some() {}

        if elapsed >= total {
            return;
        }
    }
}

/// Probes every target once, in order. Returns `false` if the iteration was interrupted.
async fn run_iteration<P: Prober>(shared: &Shared<P>) -> bool {
    for target in shared.targets.iter() {
        if !probe(shared, target).await {
            return false;
        }
    }
    true
}

async fn probe<P: Prober>(shared: &Shared<P>, target: &Target) -> bool {
    let req = ProbeRequest {
        url: target.url.clone(),
        headers: shared.headers.clone(),
    };

    let started = Instant::now();
    let res = tokio::select! {
        biased;
        _ = shared.stop.cancelled() => Err(OutcomeKind::Cancelled),
        _ = shared.abandon.cancelled() => Err(OutcomeKind::Abandoned),
        res = tokio::time::timeout(shared.probe_timeout, shared.prober.send(req)) => Ok(res),
    };
    let latency = started.elapsed();
    let tag = target.tag.clone();

    let outcome = match res {
        Ok(Ok(Ok(status))) => {
            if status != 200 {
                tracing::warn!(tag = %tag, status, "unexpected status");
            }
            Outcome::from_status(tag, status, latency)
        }
        Ok(Ok(Err(ProbeError::Timeout)) | Err(_)) => {
            tracing::warn!(tag = %tag, latency = ?latency, "probe timed out");
            Outcome::new(tag, OutcomeKind::Timeout, latency)
        }
        Ok(Ok(Err(ProbeError::Transport(error)))) => {
            tracing::warn!(tag = %tag, %error, "probe failed");
            Outcome::new(tag, OutcomeKind::TransportFailure, latency)
        }
        Err(kind) => Outcome::new(tag, kind, latency),
    };

    let interrupted = !outcome.kind.has_latency();
    shared.record(outcome);
    !interrupted
}

/// Sleeps the think time, cut short at `deadline`. Returns `false` if interrupted.
async fn think<P>(shared: &Shared<P>, deadline: Option<Instant>) -> bool {
    if shared.think_time.is_zero() {
        return !shared.interrupted();
    }

    let mut wake = deadline_after(Instant::now(), shared.think_time);
    if let Some(deadline) = deadline {
        wake = wake.min(deadline);
    }

    tokio::select! {
        biased;
        _ = shared.stop.cancelled() => false,
        _ = shared.abandon.cancelled() => false,
        _ = tokio::time::sleep_until(wake) => true,
    }
}

async fn watch_thresholds(
    thresholds: Vec<Threshold>,
    every: Duration,
    registry: Arc<Registry>,
    stop: CancellationToken,
    aborted: Arc<AtomicBool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick is immediate; judge only once some data exists.
    interval.tick().await;

    loop {
        interval.tick().await;

        let verdict = evaluate(&registry.snapshot(), &thresholds);
        if let Some(failed) = verdict.violations().next() {
            tracing::warn!(
                threshold = %failed.threshold,
                observed = ?failed.observed,
                "abortOnFail threshold failed, stopping run"
            );
            aborted.store(true, Ordering::Release);
            stop.cancel();
            return;
        }
    }
}

struct ProgressTask {
    progress: ProgressFn,
    plan_scenario: Scenario,
    interval: Duration,
    started: Instant,
    registry: Arc<Registry>,
    state: Arc<StateMachine>,
    schedule: Option<Arc<RateSchedule>>,
    pool: Arc<WorkerPool>,
    counters: Arc<DispatchCounters>,
}

async fn report_progress(task: ProgressTask) {
    let mut interval = tokio::time::interval(task.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // tokio::time::interval yields an immediate first tick. The first emission should come
    // after one full interval so the rate isn't computed over a ~0s sample.
    interval.tick().await;

    let mut tick_id: u64 = 0;
    let mut last_at = Instant::now();
    let mut rates = RateTracker::default();

    loop {
        interval.tick().await;

        tick_id = tick_id.saturating_add(1);
        let now = Instant::now();
        let dt = now.duration_since(last_at);
        last_at = now;
        let elapsed = task.started.elapsed();

        let snapshot = task.registry.snapshot();
        let metrics = LiveMetrics::compute(&snapshot, dt, &mut rates);

        let progress = match (&task.plan_scenario.executor, &task.schedule) {
            (ScenarioExecutor::RampingArrivalRate { time_unit, .. }, Some(schedule)) => {
                ScenarioProgress::RampingArrivalRate {
                    time_unit: *time_unit,
                    total_duration: schedule.total_duration(),
                    stage: schedule.stage_snapshot_at(elapsed).map(Into::into),
                    pool: task.pool.stats(),
                    dispatched_total: task.counters.dispatched.load(Ordering::Relaxed),
                    dropped_arrivals_total: task.counters.dropped.load(Ordering::Relaxed),
                }
            }
            _ => ScenarioProgress::ConstantVus {
                vus: task.pool.max(),
                duration: task.plan_scenario.total_duration(),
            },
        };

        (task.progress)(ProgressUpdate {
            tick: tick_id,
            interval: dt,
            elapsed,
            scenario: task.plan_scenario.name.clone(),
            state: task.state.current(),
            metrics,
            progress,
        });
    }
}
