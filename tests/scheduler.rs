// tests/scheduler.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveTime;
use tokio::sync::Notify;

use cricket_aggregator::ingest::aggregator::{AggregationJob, Aggregator, RunReport};
use cricket_aggregator::ingest::providers::sample_matches::SampleMatchProvider;
use cricket_aggregator::ingest::types::{MatchProvider, NewsProvider};
use cricket_aggregator::ingest::{build_scheduler, config::AggregatorConfig};
use cricket_aggregator::store::{MemoryStore, MATCHES_COLLECTION};
use cricket_aggregator::{Scheduler, TriggerError};

/// Job that counts runs and optionally parks until released.
struct StubJob {
    kind: &'static str,
    runs: AtomicUsize,
    gate: Option<Arc<Notify>>,
    started: Arc<Notify>,
}

impl StubJob {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            runs: AtomicUsize::new(0),
            gate: None,
            started: Arc::new(Notify::new()),
        }
    }

    fn gated(kind: &'static str, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(kind)
        }
    }
}

#[async_trait]
impl AggregationJob for StubJob {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn run(&self) -> RunReport {
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        RunReport {
            job: self.kind,
            processed: n,
            ..RunReport::default()
        }
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn stub_scheduler(matches: Arc<StubJob>, news: Arc<StubJob>) -> Scheduler {
    Scheduler::new(
        matches,
        news,
        vec![hm(6, 0), hm(14, 0), hm(22, 0)],
        vec![hm(6, 15), hm(14, 15), hm(22, 15)],
    )
}

#[tokio::test]
async fn start_and_stop_transitions() {
    let sched = stub_scheduler(Arc::new(StubJob::new("matches")), Arc::new(StubJob::new("news")));

    assert!(!sched.is_running());
    assert!(sched.start());
    assert!(sched.is_running());
    assert!(!sched.start(), "second start is a no-op");

    assert!(sched.stop());
    assert!(!sched.is_running());
    assert!(!sched.stop(), "stopping a stopped scheduler is a no-op");

    // Can be restarted after a stop.
    assert!(sched.start());
    assert!(sched.stop());
}

#[tokio::test]
async fn manual_triggers_run_independently_of_schedule() {
    let matches = Arc::new(StubJob::new("matches"));
    let news = Arc::new(StubJob::new("news"));
    let sched = stub_scheduler(matches.clone(), news.clone());

    assert_eq!(sched.trigger_matches_now().await, Ok(1));
    assert_eq!(sched.trigger_matches_now().await, Ok(2));
    assert_eq!(sched.trigger_news_now().await, Ok(1));
    assert_eq!(matches.runs.load(Ordering::SeqCst), 2);
    assert_eq!(news.runs.load(Ordering::SeqCst), 1);
    assert!(!sched.is_running(), "manual triggers do not start the timers");
}

#[tokio::test]
async fn overlapping_trigger_is_rejected() {
    let gate = Arc::new(Notify::new());
    let matches = Arc::new(StubJob::gated("matches", gate.clone()));
    let started = matches.started.clone();
    let sched = Arc::new(stub_scheduler(matches.clone(), Arc::new(StubJob::new("news"))));

    let bg = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.trigger_matches_now().await })
    };
    started.notified().await;
    assert!(sched.matches_job().is_running());

    assert_eq!(
        sched.trigger_matches_now().await,
        Err(TriggerError::AlreadyRunning { job: "matches" })
    );
    // The other job is unaffected.
    assert_eq!(sched.trigger_news_now().await, Ok(1));

    gate.notify_one();
    assert_eq!(bg.await.unwrap(), Ok(1));
    assert!(!sched.matches_job().is_running());

    // Guard released: next trigger goes through.
    let again = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.trigger_matches_now().await })
    };
    started.notified().await;
    gate.notify_one();
    assert_eq!(again.await.unwrap(), Ok(2));
}

#[tokio::test]
async fn stop_does_not_cancel_in_flight_manual_run() {
    let gate = Arc::new(Notify::new());
    let matches = Arc::new(StubJob::gated("matches", gate.clone()));
    let started = matches.started.clone();
    let sched = Arc::new(stub_scheduler(matches, Arc::new(StubJob::new("news"))));
    assert!(sched.start());

    let bg = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.trigger_matches_now().await })
    };
    started.notified().await;
    assert!(sched.stop());

    gate.notify_one();
    assert_eq!(bg.await.unwrap(), Ok(1));
}

#[tokio::test]
async fn built_scheduler_drives_real_aggregators() {
    let store = Arc::new(MemoryStore::new());
    let cfg = AggregatorConfig {
        news_feeds: vec![],
        ..AggregatorConfig::default()
    };
    let sched = build_scheduler(&cfg, store.clone()).unwrap();

    assert_eq!(sched.matches_job().kind(), "matches");
    assert_eq!(sched.news_job().kind(), "news");
    assert_eq!(sched.matches_job().slots(), &[hm(6, 0), hm(14, 0), hm(22, 0)]);

    assert_eq!(sched.trigger_matches_now().await, Ok(2));
    assert_eq!(store.len(MATCHES_COLLECTION), 2);
    assert_eq!(sched.trigger_news_now().await, Ok(0));
}

#[tokio::test]
async fn aggregator_is_usable_as_a_job() {
    let store = Arc::new(MemoryStore::new());
    let providers: Vec<MatchProvider> = vec![Box::new(SampleMatchProvider::new())];
    let matches: Arc<dyn AggregationJob> = Arc::new(Aggregator::new(providers, store.clone()));
    let news: Arc<dyn AggregationJob> =
        Arc::new(Aggregator::new(Vec::<NewsProvider>::new(), store.clone()));

    let sched = Scheduler::new(matches, news, vec![hm(6, 0)], vec![hm(6, 15)]);
    let report = sched.matches_job().run_now().await.unwrap();
    assert_eq!(report.job, "matches");
    assert_eq!(report.upserted, 2);
}
