use crate::api::ApiClient;
use crate::sync::run_cycle;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Timelike};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long a running cycle may take to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A once-a-day trigger at a fixed local clock time (minute granularity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    at: NaiveTime,
    next_run: NaiveDateTime,
}

impl DailyTrigger {
    /// Schedule the first run one minute after `start`, then daily at that time.
    pub fn one_minute_after(start: NaiveDateTime) -> Self {
        let first = start + ChronoDuration::minutes(1);
        let at = NaiveTime::from_hms_opt(first.hour(), first.minute(), 0)
            .unwrap_or(NaiveTime::MIN);
        Self::at(at, start)
    }

    /// Schedule the next occurrence of `at` strictly after `now`.
    pub fn at(at: NaiveTime, now: NaiveDateTime) -> Self {
        let at = at.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(at);
        Self {
            at,
            next_run: Self::next_after(at, now),
        }
    }

    fn next_after(at: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(at);
        if today > now {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    }

    pub fn time(&self) -> NaiveTime {
        self.at
    }

    pub fn next_run(&self) -> NaiveDateTime {
        self.next_run
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now >= self.next_run
    }

    /// Move to the next occurrence after `now`. Occurrences that were missed
    /// while the process was busy or down are not caught up.
    pub fn advance(&mut self, now: NaiveDateTime) {
        self.next_run = Self::next_after(self.at, now);
    }
}

/// The work run each time the trigger fires.
#[async_trait]
pub trait CycleJob: Send + Sync + 'static {
    async fn run(&self);
}

/// One full reconciliation cycle against the store and the upstream API.
pub struct SyncCycle {
    pool: SqlitePool,
    api: Arc<ApiClient>,
}

impl SyncCycle {
    pub fn new(pool: SqlitePool, api: Arc<ApiClient>) -> Self {
        Self { pool, api }
    }
}

#[async_trait]
impl CycleJob for SyncCycle {
    async fn run(&self) {
        run_cycle(&self.pool, &self.api).await;
    }
}

/// Runs a [`CycleJob`] once a day.
///
/// The loop polls on a fixed interval. Cycles never overlap: a due cycle runs
/// to completion before the next poll. A failing or panicking cycle is logged
/// and the trigger still moves to the next day.
pub struct Scheduler {
    job: Arc<dyn CycleJob>,
    trigger: DailyTrigger,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(job: Arc<dyn CycleJob>, trigger: DailyTrigger, poll_interval: Duration) -> Self {
        Self {
            job,
            trigger,
            poll_interval,
        }
    }

    pub fn trigger(&self) -> &DailyTrigger {
        &self.trigger
    }

    /// Runs the scheduler until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            at = %self.trigger.time().format("%H:%M"),
            next_run = %self.trigger.next_run(),
            poll_interval = ?self.poll_interval,
            "Scheduler begins"
        );

        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let now = Local::now().naive_local();
                    if !self.trigger.is_due(now) {
                        debug!(next_run = %self.trigger.next_run(), "Sync not due yet");
                        continue;
                    }

                    let finished = self.run_once(&shutdown).await;
                    self.trigger.advance(Local::now().naive_local());
                    info!(next_run = %self.trigger.next_run(), "Next sync scheduled");

                    if !finished {
                        break;
                    }
                }
            }
        }

        info!("Scheduler exiting gracefully");
    }

    /// Run one cycle in its own task so a panic cannot take the loop down.
    ///
    /// Returns `false` when shutdown was requested while the cycle was running.
    async fn run_once(&self, shutdown: &CancellationToken) -> bool {
        let job = self.job.clone();
        let mut handle = tokio::spawn(async move { job.run().await });

        tokio::select! {
            result = &mut handle => {
                if let Err(e) = result {
                    error!(error = ?e, "An error occurred in the sync cycle");
                }
                true
            }
            _ = shutdown.cancelled() => {
                info!("Shutdown requested during sync cycle, waiting for it to finish");
                match time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                    Ok(_) => debug!("Sync cycle completed gracefully"),
                    Err(_) => {
                        warn!("Sync cycle did not complete within 5s, abandoning");
                        handle.abort();
                    }
                }
                false
            }
        }
    }
}
