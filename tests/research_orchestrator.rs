// tests/research_orchestrator.rs
mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{item, Behavior, Gauge, MockSource};
use podcast_generator::research::{ResearchOrchestrator, ResearchSettings};
use podcast_generator::{PodcastError, SourceAdapter, SourceType};
use tokio_util::sync::CancellationToken;

fn orchestrator(timeout_ms: u64) -> ResearchOrchestrator {
    ResearchOrchestrator::new(ResearchSettings {
        max_concurrent: 4,
        source_timeout: Duration::from_millis(timeout_ms),
        max_results_per_source: 5,
        max_items: 10,
    })
}

#[tokio::test]
async fn one_failing_source_of_three_is_tolerated() {
    let sources: Vec<Arc<dyn SourceAdapter>> = vec![
        MockSource::items(
            "arxiv",
            vec![
                item("Async runtimes compared", SourceType::Arxiv, 0.9, Some(3)),
                item("Work stealing revisited", SourceType::Arxiv, 0.5, Some(1)),
            ],
        ),
        MockSource::failing("blog"),
        MockSource::items(
            "docs",
            vec![item("Tokio tutorial", SourceType::Docs, 0.7, None)],
        ),
    ];

    let items = orchestrator(1_000)
        .research("async runtimes", &sources, &CancellationToken::new())
        .await
        .expect("two healthy sources are enough");

    let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Async runtimes compared", "Tokio tutorial", "Work stealing revisited"]
    );
}

#[tokio::test]
async fn all_sources_failing_is_no_research_available() {
    let sources = vec![MockSource::failing("a"), MockSource::failing("b")];
    let err = orchestrator(1_000)
        .research("quantum widgets", &sources, &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        PodcastError::NoResearchAvailable { topic } => assert_eq!(topic, "quantum widgets"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn all_sources_empty_is_no_research_available() {
    let sources = vec![MockSource::items("a", vec![]), MockSource::items("b", vec![])];
    let err = orchestrator(1_000)
        .research("nothing", &sources, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PodcastError::NoResearchAvailable { .. }));
}

#[tokio::test]
async fn slow_source_times_out_without_blocking_the_rest() {
    let sources = vec![
        MockSource::sleeping("slow", Duration::from_secs(30)),
        MockSource::items(
            "fast",
            vec![item("Fast result", SourceType::Rss, 0.8, Some(2))],
        ),
    ];
    let t0 = Instant::now();
    let items = orchestrator(100)
        .research("fast", &sources, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert!(t0.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancellation_stops_in_flight_fetches() {
    let sources = vec![
        MockSource::sleeping("slow-a", Duration::from_secs(30)),
        MockSource::sleeping("slow-b", Duration::from_secs(30)),
    ];
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let t0 = Instant::now();
    let err = orchestrator(60_000)
        .research("anything", &sources, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PodcastError::Cancelled));
    assert!(t0.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn duplicates_across_sources_keep_higher_score_and_ranking_is_stable() {
    let run = || async {
        let sources: Vec<Arc<dyn SourceAdapter>> = vec![
            MockSource::items(
                "feed-a",
                vec![
                    item("Rust 2024 Edition", SourceType::Rss, 0.4, Some(5)),
                    item("Same score older", SourceType::Rss, 0.6, Some(1)),
                ],
            ),
            MockSource::items(
                "feed-b",
                vec![
                    item("rust 2024 edition!", SourceType::Rss, 0.8, Some(5)),
                    item("Same score newer", SourceType::Rss, 0.6, Some(9)),
                ],
            ),
        ];
        orchestrator(1_000)
            .research("rust edition", &sources, &CancellationToken::new())
            .await
            .unwrap()
    };

    let first = run().await;
    let titles: Vec<&str> = first.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["rust 2024 edition!", "Same score newer", "Same score older"]
    );
    assert_eq!(first, run().await);
}

#[tokio::test]
async fn concurrency_is_bounded_by_settings() {
    let gauge = Arc::new(Gauge::default());
    let sources: Vec<Arc<dyn SourceAdapter>> = (0..6)
        .map(|i| {
            let s = MockSource::new(
                &format!("s{i}"),
                SourceType::Rss,
                Behavior::Items(vec![item(&format!("Item {i}"), SourceType::Rss, 0.5, None)]),
            )
            .gauged(Arc::clone(&gauge));
            Arc::new(s) as Arc<dyn SourceAdapter>
        })
        .collect();

    let orch = ResearchOrchestrator::new(ResearchSettings {
        max_concurrent: 2,
        source_timeout: Duration::from_secs(5),
        max_results_per_source: 5,
        max_items: 10,
    });
    let items = orch
        .research("items", &sources, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(items.len(), 6);
    assert!(gauge.peak.load(std::sync::atomic::Ordering::SeqCst) <= 2);
}
