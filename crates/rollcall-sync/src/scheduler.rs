//! Background scheduling of sync cycles.
//!
//! Work is identified by name. Periodic ticks enqueue [`PERIODIC_WORK`];
//! every one-shot trigger (foreground, background, manual) enqueues
//! [`ONE_TIME_WORK`]. A request whose name is already pending or running is
//! dropped. A single worker task runs the queue, so two cycles never
//! overlap. The worker waits for connectivity before starting a job and
//! retries failed jobs with exponential backoff.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::RetryConfig;
use crate::error::SyncResult;

pub const PERIODIC_WORK: &str = "periodic-sync";
pub const ONE_TIME_WORK: &str = "one-time-sync";

/// A unit of work the scheduler can run.
#[async_trait]
pub trait SyncJob: Send + Sync {
    async fn run(&self) -> SyncResult<()>;
}

/// Network availability probe gating every run.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Periodic,
    /// The app came to the foreground.
    Foreground,
    /// The app is about to go to the background.
    Background,
    /// The user asked for a sync.
    Manual,
}

impl Trigger {
    pub fn work_name(self) -> &'static str {
        match self {
            Trigger::Periodic => PERIODIC_WORK,
            Trigger::Foreground | Trigger::Background | Trigger::Manual => ONE_TIME_WORK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Accepted,
    /// Work with the same name was already pending; the request was dropped.
    KeptExisting,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// `None` disables periodic work. The first periodic run happens one
    /// interval after start.
    pub interval: Option<Duration>,
    pub retry: RetryConfig,
    /// Delay between connectivity probes while offline.
    pub connectivity_poll: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Some(Duration::from_secs(
                rollcall_shared::constants::DEFAULT_SYNC_INTERVAL_SECS,
            )),
            retry: RetryConfig::default(),
            connectivity_poll: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Job invocations, retries included.
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    /// Requests dropped because the same work was already pending.
    pub dropped: u64,
}

struct Shared {
    queue: mpsc::UnboundedSender<&'static str>,
    /// Names that are queued or running.
    pending: watch::Sender<BTreeSet<&'static str>>,
    stats: Mutex<SchedulerStats>,
}

impl Shared {
    fn enqueue(&self, name: &'static str) -> Enqueue {
        let mut accepted = false;
        self.pending.send_if_modified(|names| {
            accepted = names.insert(name);
            accepted
        });

        if !accepted {
            self.record(|s| s.dropped += 1);
            tracing::debug!(work = name, "work already pending, keeping existing");
            return Enqueue::KeptExisting;
        }

        if self.queue.send(name).is_err() {
            // Worker is gone; nothing will ever clear the name otherwise.
            self.finish(name);
            tracing::warn!(work = name, "scheduler stopped, dropping work");
            return Enqueue::KeptExisting;
        }
        Enqueue::Accepted
    }

    fn finish(&self, name: &'static str) {
        self.pending.send_modify(|names| {
            names.remove(name);
        });
    }

    fn record(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut stats);
    }
}

pub struct Scheduler {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the worker (and the periodic ticker, if configured) on the
    /// current tokio runtime.
    pub fn start(
        job: Arc<dyn SyncJob>,
        connectivity: Arc<dyn Connectivity>,
        config: SchedulerConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(BTreeSet::new());
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            queue: queue_tx,
            pending,
            stats: Mutex::new(SchedulerStats::default()),
        });

        let mut tasks = Vec::with_capacity(2);
        tasks.push(tokio::spawn(worker(
            shared.clone(),
            queue_rx,
            job,
            connectivity,
            config.clone(),
            shutdown.subscribe(),
        )));

        if let Some(interval) = config.interval {
            tasks.push(tokio::spawn(ticker(
                shared.clone(),
                interval,
                shutdown.subscribe(),
            )));
            tracing::info!(?interval, "periodic sync scheduled");
        }

        Self {
            shared,
            shutdown,
            tasks,
        }
    }

    pub fn trigger(&self, trigger: Trigger) -> Enqueue {
        let outcome = self.shared.enqueue(trigger.work_name());
        tracing::debug!(?trigger, ?outcome, "sync requested");
        outcome
    }

    /// Names currently queued or running.
    pub fn pending(&self) -> Vec<&'static str> {
        self.shared.pending.borrow().iter().copied().collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.shared.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until no work is queued or running.
    pub async fn idle(&self) {
        let mut rx = self.shared.pending.subscribe();
        let _ = rx.wait_for(|names| names.is_empty()).await;
    }

    /// Stop scheduling. A cycle already in progress is allowed to finish;
    /// queued work and pending retries are abandoned.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "scheduler task panicked");
            }
        }
        tracing::info!("scheduler stopped");
    }
}

async fn ticker(shared: Arc<Shared>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                shared.enqueue(PERIODIC_WORK);
            }
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
}

async fn worker(
    shared: Arc<Shared>,
    mut queue: mpsc::UnboundedReceiver<&'static str>,
    job: Arc<dyn SyncJob>,
    connectivity: Arc<dyn Connectivity>,
    config: SchedulerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let name = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            next = queue.recv() => match next {
                Some(name) => name,
                None => break,
            },
        };

        execute(&shared, name, job.as_ref(), connectivity.as_ref(), &config, &mut shutdown).await;
        shared.finish(name);
    }
}

/// Run `name` to completion: wait for connectivity, run, retry on failure.
async fn execute(
    shared: &Shared,
    name: &'static str,
    job: &dyn SyncJob,
    connectivity: &dyn Connectivity,
    config: &SchedulerConfig,
    shutdown: &mut watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        while !connectivity.is_online().await {
            tracing::debug!(work = name, "offline, waiting for connectivity");
            if stopped_during(config.connectivity_poll, shutdown).await {
                return;
            }
        }

        shared.record(|s| s.runs += 1);
        let error = match job.run().await {
            Ok(()) => {
                shared.record(|s| s.successes += 1);
                return;
            }
            Err(e) => e,
        };
        shared.record(|s| s.failures += 1);

        if !error.is_retryable() {
            tracing::warn!(work = name, error = %error, "sync failed, not retrying");
            return;
        }

        attempt += 1;
        if !config.retry.allows(attempt) {
            tracing::warn!(work = name, attempts = attempt, error = %error, "sync failed, giving up");
            return;
        }

        let delay = config.retry.delay_for(attempt);
        tracing::info!(work = name, attempt, ?delay, error = %error, "sync failed, retrying");
        if stopped_during(delay, shutdown).await {
            return;
        }
    }
}

/// Sleep for `delay`; returns true if shutdown was requested meanwhile.
async fn stopped_during(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.wait_for(|stop| *stop) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::sync::Semaphore;

    use super::*;
    use crate::error::SyncError;

    #[derive(Default)]
    struct ScriptedJob {
        results: Mutex<VecDeque<SyncResult<()>>>,
        always_fail: bool,
        gate: Option<Semaphore>,
        runs: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl ScriptedJob {
        fn with_results(results: Vec<SyncResult<()>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                always_fail: true,
                ..Default::default()
            }
        }

        fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Default::default()
            }
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SyncJob for ScriptedJob {
        async fn run(&self) -> SyncResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.always_fail {
                return Err(SyncError::Unavailable("scripted".into()));
            }
            self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    #[derive(Default)]
    struct Switch(AtomicBool);

    #[async_trait]
    impl Connectivity for Switch {
        async fn is_online(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn one_shot_config() -> SchedulerConfig {
        SchedulerConfig {
            interval: None,
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn triggers_map_to_work_names() {
        assert_eq!(Trigger::Periodic.work_name(), "periodic-sync");
        for t in [Trigger::Foreground, Trigger::Background, Trigger::Manual] {
            assert_eq!(t.work_name(), "one-time-sync");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_requests_keep_existing_work() {
        let job = Arc::new(ScriptedJob::gated());
        let scheduler = Scheduler::start(job.clone(), Arc::new(AlwaysOnline), one_shot_config());

        assert_eq!(scheduler.trigger(Trigger::Manual), Enqueue::Accepted);
        assert_eq!(scheduler.trigger(Trigger::Foreground), Enqueue::KeptExisting);
        assert_eq!(scheduler.trigger(Trigger::Periodic), Enqueue::Accepted);
        assert_eq!(scheduler.pending(), vec![ONE_TIME_WORK, PERIODIC_WORK]);

        job.gate.as_ref().unwrap().add_permits(2);
        scheduler.idle().await;

        assert_eq!(job.runs(), 2);
        assert_eq!(job.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.stats().dropped, 1);

        // Once finished the name is free again.
        job.gate.as_ref().unwrap().add_permits(1);
        assert_eq!(scheduler.trigger(Trigger::Background), Enqueue::Accepted);
        scheduler.idle().await;
        assert_eq!(job.runs(), 3);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failures_back_off_exponentially() {
        let job = Arc::new(ScriptedJob::with_results(vec![
            Err(SyncError::Unavailable("down".into())),
            Err(SyncError::Unavailable("down".into())),
        ]));
        let scheduler = Scheduler::start(job.clone(), Arc::new(AlwaysOnline), one_shot_config());

        let started = Instant::now();
        scheduler.trigger(Trigger::Manual);
        scheduler.idle().await;

        assert_eq!(job.runs(), 3);
        // 30 s after the first failure, 60 s after the second.
        assert!(started.elapsed() >= Duration::from_secs(90));
        assert!(started.elapsed() < Duration::from_secs(91));
        assert_eq!(
            scheduler.stats(),
            SchedulerStats {
                runs: 3,
                successes: 1,
                failures: 2,
                dropped: 0,
            }
        );
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let job = Arc::new(ScriptedJob::failing());
        let config = SchedulerConfig {
            retry: RetryConfig::default().with_max_attempts(2),
            ..one_shot_config()
        };
        let scheduler = Scheduler::start(job.clone(), Arc::new(AlwaysOnline), config);

        scheduler.trigger(Trigger::Manual);
        scheduler.idle().await;

        assert_eq!(job.runs(), 3);
        assert!(scheduler.pending().is_empty());
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn session_rejection_is_not_retried() {
        let job = Arc::new(ScriptedJob::with_results(vec![Err(
            SyncError::SessionRejected("phone-9".into()),
        )]));
        let scheduler = Scheduler::start(job.clone(), Arc::new(AlwaysOnline), one_shot_config());

        scheduler.trigger(Trigger::Manual);
        scheduler.idle().await;

        assert_eq!(job.runs(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn offline_work_waits_for_connectivity() {
        let job = Arc::new(ScriptedJob::default());
        let online = Arc::new(Switch::default());
        let scheduler = Scheduler::start(job.clone(), online.clone(), one_shot_config());

        assert_eq!(scheduler.trigger(Trigger::Manual), Enqueue::Accepted);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(job.runs(), 0);
        assert_eq!(scheduler.trigger(Trigger::Manual), Enqueue::KeptExisting);

        online.0.store(true, Ordering::SeqCst);
        scheduler.idle().await;
        assert_eq!(job.runs(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_work_starts_after_one_interval() {
        let job = Arc::new(ScriptedJob::default());
        let config = SchedulerConfig {
            interval: Some(Duration::from_secs(3600)),
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::start(job.clone(), Arc::new(AlwaysOnline), config);

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert_eq!(job.runs(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(job.runs(), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(job.runs(), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_pending_retries() {
        let job = Arc::new(ScriptedJob::failing());
        let scheduler = Scheduler::start(job.clone(), Arc::new(AlwaysOnline), one_shot_config());

        scheduler.trigger(Trigger::Manual);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(job.runs(), 1);

        let started = Instant::now();
        scheduler.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(job.runs(), 1);
    }
}
