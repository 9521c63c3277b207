// tests/engine_e2e.rs
//
// End-to-end ticks through the public engine API with mock fetchers and a
// recording transport (no network, no disk).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use job_radar::engine::{Engine, SourceEntry};
use job_radar::error::{DeliveryError, FetchError};
use job_radar::ingest::recency::{RecencyClassifier, UndatedPolicy};
use job_radar::ingest::roles::RoleMatcher;
use job_radar::ingest::types::{Fetcher, RawPosting, SourceId};
use job_radar::notify::{Fanout, FanoutConfig, Transport};
use job_radar::store::{DedupStore, RetentionPolicy, SubscriberId, SubscriberRegistry};

struct StaticFetcher(Vec<RawPosting>);

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _source: &SourceId) -> Result<Vec<RawPosting>, FetchError> {
        Ok(self.0.clone())
    }
    fn name(&self) -> &'static str {
        "static"
    }
}

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(SubscriberId, String)>>,
}

#[async_trait]
impl Transport for Recorder {
    async fn send(&self, to: &SubscriberId, text: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push((to.clone(), text.to_string()));
        Ok(())
    }
    fn name(&self) -> &'static str {
        "recorder"
    }
}

fn fanout(rec: Arc<Recorder>) -> Fanout {
    Fanout::new(rec).with_config(FanoutConfig {
        batch_size: 10,
        inter_message_delay: Duration::ZERO,
        ..FanoutConfig::default()
    })
}

fn alpha_postings() -> Vec<RawPosting> {
    vec![
        RawPosting::new("Junior Developer", "https://u1").with_date("today"),
        RawPosting::new("Senior Architect", "https://u2").with_date("today"),
    ]
}

#[tokio::test]
async fn alpha_scenario_delivers_once_per_subscriber() {
    let rec = Arc::new(Recorder::default());
    let registry = Arc::new(SubscriberRegistry::in_memory(["100".into(), "200".into()]));
    let engine = Engine::new(
        vec![SourceEntry::new(
            "alpha",
            Arc::new(StaticFetcher(alpha_postings())),
            UndatedPolicy::AssumeStale,
        )],
        Arc::new(DedupStore::in_memory()),
        registry.clone(),
        fanout(rec.clone()),
    )
    .expect("engine")
    .with_recency(RecencyClassifier::from_days(7))
    .with_roles(RoleMatcher::new(["junior"]));

    let report = engine.tick().await;
    assert_eq!(report.fetched, 2);
    assert_eq!(report.off_role, 1);
    assert_eq!(report.admitted, 1);
    assert_eq!(report.delivery.messages_sent, 2);

    {
        let sent = rec.sent.lock().unwrap();
        assert_eq!(sent.len(), 2, "one batch per subscriber");
        for (_, text) in sent.iter() {
            assert_eq!(text.matches("📌").count(), 1);
            assert!(text.contains("Junior Developer"));
            assert!(text.contains("https://u1"));
            assert!(!text.contains("Senior Architect"));
        }
        let to: Vec<&str> = sent.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(to, vec!["100", "200"]);
    }

    let again = engine.tick().await;
    assert_eq!(again.admitted, 0);
    assert_eq!(again.duplicates, 1);
    assert_eq!(rec.sent.lock().unwrap().len(), 2, "second tick sends nothing");
}

#[tokio::test]
async fn same_posting_from_two_sources_is_sent_once() {
    let rec = Arc::new(Recorder::default());
    let dup = || vec![RawPosting::new("Junior QA Tester", "https://jobs/qa-1").with_date("yesterday")];
    let engine = Engine::new(
        vec![
            SourceEntry::new("a", Arc::new(StaticFetcher(dup())), UndatedPolicy::AssumeStale),
            SourceEntry::new("b", Arc::new(StaticFetcher(dup())), UndatedPolicy::AssumeStale),
        ],
        Arc::new(DedupStore::in_memory()),
        Arc::new(SubscriberRegistry::in_memory(["1".into()])),
        fanout(rec.clone()),
    )
    .expect("engine");

    let first = engine.tick().await;
    let second = engine.tick().await;
    assert_eq!(first.source.as_str(), "a");
    assert_eq!(second.source.as_str(), "b");
    assert_eq!(first.admitted + second.admitted, 1);
    assert_eq!(rec.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn stale_and_undated_postings_follow_source_policy() {
    let rec = Arc::new(Recorder::default());
    let raw = vec![
        RawPosting::new("Junior Developer", "https://old").with_date("10 days ago"),
        RawPosting::new("Junior Analyst", "https://undated"),
        RawPosting::new("Junior Designer", "https://weird").with_date("sometime soon"),
    ];
    let engine = Engine::new(
        vec![
            SourceEntry::new("strict", Arc::new(StaticFetcher(raw.clone())), UndatedPolicy::AssumeStale),
            SourceEntry::new("trusted", Arc::new(StaticFetcher(raw)), UndatedPolicy::AssumeFresh),
        ],
        Arc::new(DedupStore::in_memory()),
        Arc::new(SubscriberRegistry::in_memory(["1".into()])),
        fanout(rec.clone()),
    )
    .expect("engine");

    let strict = engine.tick().await;
    assert_eq!(strict.stale, 3);
    assert_eq!(strict.admitted, 0);

    let trusted = engine.tick().await;
    assert_eq!(trusted.stale, 1, "dated and too old is stale regardless of policy");
    assert_eq!(trusted.admitted, 2);
}

#[tokio::test]
async fn no_subscribers_still_records_postings() {
    let rec = Arc::new(Recorder::default());
    let dedup = Arc::new(DedupStore::in_memory());
    let engine = Engine::new(
        vec![SourceEntry::new(
            "alpha",
            Arc::new(StaticFetcher(alpha_postings())),
            UndatedPolicy::AssumeStale,
        )],
        dedup.clone(),
        Arc::new(SubscriberRegistry::in_memory(Vec::new())),
        fanout(rec.clone()),
    )
    .expect("engine")
    .with_roles(RoleMatcher::new(Vec::<String>::new()));

    let report = engine.tick().await;
    assert_eq!(report.admitted, 2, "empty keyword list admits every title");
    assert_eq!(report.delivery.messages_sent, 0);
    assert_eq!(dedup.len(), 2);
    assert!(rec.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tiny_record_cap_never_resends_fresh_postings() {
    let rec = Arc::new(Recorder::default());
    let fresh = vec![
        RawPosting::new("Junior Backend Developer", "https://jobs/b-1").with_date("today"),
        RawPosting::new("Junior Frontend Developer", "https://jobs/f-1").with_date("today"),
    ];
    let engine = Engine::new(
        vec![SourceEntry::new("one", Arc::new(StaticFetcher(fresh)), UndatedPolicy::AssumeStale)],
        Arc::new(DedupStore::in_memory()),
        Arc::new(SubscriberRegistry::in_memory(["1".into()])),
        fanout(rec.clone()),
    )
    .expect("engine")
    .with_roles(RoleMatcher::new(["junior"]))
    .with_retention(RetentionPolicy {
        max_records: 1,
        retention: chrono::Duration::days(30),
    });

    let first = engine.tick().await;
    assert_eq!(first.admitted, 2);
    assert_eq!(first.dedup_pruned, 0, "records admitted this tick are kept");

    let second = engine.tick().await;
    assert_eq!(second.admitted, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(rec.sent.lock().unwrap().len(), 1, "one batch, never repeated");
    assert_eq!(engine.dedup().len(), 2);
}
