// src/ingest/scheduler.rs
//! Time-of-day scheduling for the aggregation jobs.
//!
//! Each job gets its own timer task. A firing spawns the run in a separate
//! task, so stopping the scheduler never cancels a run already in flight.
//! A per-job guard makes a firing that would overlap the previous run skip
//! instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::ingest::aggregator::{AggregationJob, RunReport};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("{job} aggregation is already running")]
    AlreadyRunning { job: &'static str },
}

/// First slot strictly after `after`, looking at most one day ahead.
pub fn next_fire_after(after: DateTime<Utc>, slots: &[NaiveTime]) -> Option<DateTime<Utc>> {
    let today = after.date_naive();
    [Some(today), today.checked_add_days(Days::new(1))]
        .into_iter()
        .flatten()
        .flat_map(|day| slots.iter().map(move |t| day.and_time(*t).and_utc()))
        .filter(|candidate| *candidate > after)
        .min()
}

/// Releases the job's running flag when dropped, including on panic.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ScheduledJob {
    job: Arc<dyn AggregationJob>,
    slots: Vec<NaiveTime>,
    running: Arc<AtomicBool>,
}

impl ScheduledJob {
    pub fn new(job: Arc<dyn AggregationJob>, slots: Vec<NaiveTime>) -> Self {
        Self {
            job,
            slots,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.job.kind()
    }

    pub fn slots(&self) -> &[NaiveTime] {
        &self.slots
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(Arc::clone(&self.running)))
    }

    /// Run once now, unless a run of this job is already in flight.
    pub async fn run_now(&self) -> Result<RunReport, TriggerError> {
        let _guard = self.try_acquire().ok_or(TriggerError::AlreadyRunning {
            job: self.kind(),
        })?;
        Ok(self.job.run().await)
    }
}

/// Spawns one run of `job` unless the previous one is still in flight.
/// The run gets its own task so a panic surfaces as a `JoinError` here.
fn fire(job: &Arc<ScheduledJob>) -> Option<JoinHandle<()>> {
    let Some(guard) = job.try_acquire() else {
        tracing::warn!(target: "scheduler", job = job.kind(), "previous run still active; skipping firing");
        counter!("aggregate_skipped_overlap_total", "job" => job.kind()).increment(1);
        return None;
    };
    let job = Arc::clone(job);
    Some(tokio::spawn(async move {
        let _guard = guard;
        tracing::info!(target: "scheduler", job = job.kind(), "scheduled run starting");
        let inner = Arc::clone(&job.job);
        match tokio::spawn(async move { inner.run().await }).await {
            Ok(report) => tracing::info!(
                target: "scheduler",
                job = job.kind(),
                processed = report.processed,
                "scheduled run completed"
            ),
            Err(e) => {
                tracing::error!(target: "scheduler", job = job.kind(), error = %e, "scheduled run failed");
                counter!("aggregate_run_panics_total", "job" => job.kind()).increment(1);
            }
        }
    }))
}

fn spawn_timer(job: Arc<ScheduledJob>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_fired: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let from = last_fired.map_or(now, |l| l.max(now));
            let Some(next) = next_fire_after(from, job.slots()) else {
                tracing::warn!(target: "scheduler", job = job.kind(), "no slots configured; timer idle");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(target: "scheduler", job = job.kind(), next = %next, "sleeping until next slot");
            tokio::time::sleep(wait).await;
            last_fired = Some(next);
            fire(&job);
        }
    })
}

pub struct Scheduler {
    matches: Arc<ScheduledJob>,
    news: Arc<ScheduledJob>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        matches: Arc<dyn AggregationJob>,
        news: Arc<dyn AggregationJob>,
        match_slots: Vec<NaiveTime>,
        news_slots: Vec<NaiveTime>,
    ) -> Self {
        Self {
            matches: Arc::new(ScheduledJob::new(matches, match_slots)),
            news: Arc::new(ScheduledJob::new(news, news_slots)),
            timers: Mutex::new(Vec::new()),
        }
    }

    /// `stopped -> running`. Returns false when already running.
    pub fn start(&self) -> bool {
        let mut timers = self.timers.lock();
        if !timers.is_empty() {
            tracing::warn!(target: "scheduler", "start requested but scheduler already running");
            return false;
        }
        timers.push(spawn_timer(Arc::clone(&self.matches)));
        timers.push(spawn_timer(Arc::clone(&self.news)));
        tracing::info!(
            target: "scheduler",
            matches = ?self.matches.slots(),
            news = ?self.news.slots(),
            "scheduler started (UTC slots)"
        );
        true
    }

    /// `running -> stopped`. Prevents future firings; in-flight runs finish.
    pub fn stop(&self) -> bool {
        let mut timers = self.timers.lock();
        if timers.is_empty() {
            return false;
        }
        for t in timers.drain(..) {
            t.abort();
        }
        tracing::info!(target: "scheduler", "scheduler stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        !self.timers.lock().is_empty()
    }

    pub fn matches_job(&self) -> &ScheduledJob {
        &self.matches
    }

    pub fn news_job(&self) -> &ScheduledJob {
        &self.news
    }

    /// Manual match aggregation outside the schedule; returns the processed count.
    pub async fn trigger_matches_now(&self) -> Result<usize, TriggerError> {
        self.matches.run_now().await.map(|r| r.processed)
    }

    /// Manual news aggregation outside the schedule; returns the processed count.
    pub async fn trigger_news_now(&self) -> Result<usize, TriggerError> {
        self.news.run_now().await.map(|r| r.processed)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for t in self.timers.get_mut().drain(..) {
            t.abort();
        }
    }
}
