//! Named periodic jobs on the tokio runtime
//!
//! Every job runs in its own task: a firing runs to completion before the
//! next one is considered, so a job never overlaps itself, while distinct
//! jobs run concurrently. Errors and panics of a handler are logged and the
//! job keeps its schedule.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, warn};

pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub type JobHandler = Arc<dyn Fn() -> JobFuture + Send + Sync>;

const FALLBACK_DAILY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

const MIN_PERIOD: Duration = Duration::from_millis(1);
const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("job '{0}' is already registered")]
    DuplicateJob(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fires every period, first one period after start
    Interval(Duration),
    /// Fires once a day at the given server-local wall clock time
    DailyAt { hour: u32, minute: u32 },
}

/// Next occurrence of `hour:minute` strictly after `now`
///
/// Days on which the time does not exist (DST gaps) are skipped.
pub fn next_daily_run<Tz: TimeZone>(
    now: &DateTime<Tz>,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Tz>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let today = now.date_naive();

    (0..=2u64).find_map(|offset| {
        let day = today.checked_add_days(Days::new(offset))?;
        now.timezone()
            .from_local_datetime(&day.and_time(time))
            .earliest()
            .filter(|candidate| candidate > now)
    })
}

enum Trigger {
    Ticker(Interval),
    Daily { hour: u32, minute: u32 },
}

impl Trigger {
    fn new(schedule: Schedule) -> Self {
        match schedule {
            Schedule::Interval(requested) => {
                let period = requested.clamp(MIN_PERIOD, MAX_PERIOD);
                if period != requested {
                    warn!(?requested, ?period, "interval out of range, clamped");
                }
                let now = Instant::now();
                let start = now.checked_add(period).unwrap_or(now);
                let mut ticker = interval_at(start, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Trigger::Ticker(ticker)
            }
            Schedule::DailyAt { hour, minute } => Trigger::Daily { hour, minute },
        }
    }

    async fn wait(&mut self) {
        match self {
            Trigger::Ticker(ticker) => {
                ticker.tick().await;
            }
            Trigger::Daily { hour, minute } => {
                let now = Local::now();
                let delay = next_daily_run(&now, *hour, *minute)
                    .and_then(|next| (next - now).to_std().ok())
                    .unwrap_or(FALLBACK_DAILY_DELAY);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

async fn fire(name: &str, handler: &JobHandler) {
    let started = Instant::now();
    let run = async { handler().await };

    match AssertUnwindSafe(run).catch_unwind().await {
        Ok(Ok(())) => debug!(
            job = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "job finished"
        ),
        Ok(Err(e)) => error!(job = name, "job failed: {e:#}"),
        Err(panic) => error!(job = name, "job panicked: {}", panic_message(&*panic)),
    }
}

#[instrument(skip(handler, shutdown))]
async fn run_job(
    name: String,
    schedule: Schedule,
    handler: JobHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut trigger = Trigger::new(schedule);

    loop {
        tokio::select! {
            _ = trigger.wait() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
        fire(&name, &handler).await;
    }

    debug!("job stopped");
}

struct Job {
    schedule: Schedule,
    handler: JobHandler,
    task: Option<JoinHandle<()>>,
}

pub struct Scheduler {
    jobs: HashMap<String, Job>,
    shutdown: watch::Sender<bool>,
    running: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: HashMap::new(),
            shutdown,
            running: false,
        }
    }

    fn boxed<F, Fut>(handler: F) -> JobHandler
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Arc::new(move || Box::pin(handler()) as JobFuture)
    }

    fn spawn(&self, name: &str, job: &mut Job) {
        job.task = Some(tokio::spawn(run_job(
            name.to_string(),
            job.schedule,
            job.handler.clone(),
            self.shutdown.subscribe(),
        )));
    }

    /// Register a job; fails if the name is taken
    ///
    /// Jobs registered while the scheduler runs start immediately.
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        schedule: Schedule,
        handler: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        if self.jobs.contains_key(&name) {
            return Err(SchedulerError::DuplicateJob(name));
        }
        self.insert(name, schedule, Self::boxed(handler));
        Ok(())
    }

    /// Register a job, replacing any job with the same name
    pub fn register_or_replace<F, Fut>(
        &mut self,
        name: impl Into<String>,
        schedule: Schedule,
        handler: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        if let Some(task) = self.jobs.remove(&name).and_then(|old| old.task) {
            debug!(job = %name, "replacing job");
            task.abort();
        }
        self.insert(name, schedule, Self::boxed(handler));
    }

    fn insert(&mut self, name: String, schedule: Schedule, handler: JobHandler) {
        let mut job = Job {
            schedule,
            handler,
            task: None,
        };
        if self.running {
            self.spawn(&name, &mut job);
        }
        self.jobs.insert(name, job);
    }

    pub fn job_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start firing all registered jobs; a no-op when already running
    pub fn start(&mut self) {
        if self.running {
            debug!("scheduler already running");
            return;
        }

        self.shutdown.send_replace(false);
        self.running = true;

        let mut jobs = std::mem::take(&mut self.jobs);
        for (name, job) in jobs.iter_mut() {
            self.spawn(name, job);
        }
        self.jobs = jobs;

        info!(jobs = self.jobs.len(), "scheduler started");
    }

    /// Stop issuing firings and wait for in-flight runs to finish
    pub async fn shutdown(&mut self) {
        if !self.running {
            return;
        }

        self.shutdown.send_replace(true);
        self.running = false;

        for (name, job) in self.jobs.iter_mut() {
            if let Some(task) = job.task.take() {
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        warn!(job = %name, "job task ended abnormally: {e}");
                    }
                }
            }
        }

        info!("scheduler stopped");
    }
}
