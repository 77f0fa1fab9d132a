// tests/metrics.rs
// One test per binary: the Prometheus recorder is process-global.
mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{item, script_of, FlakyTts, MockSource, ScriptedLlm};
use metrics_exporter_prometheus::PrometheusBuilder;
use podcast_generator::audio::{AudioSettings, AudioSynthesizer, RetryPolicy};
use podcast_generator::research::{ResearchOrchestrator, ResearchSettings};
use podcast_generator::script::{ScriptSettings, ScriptSynthesizer};
use podcast_generator::{PodcastPipeline, SourceType};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn pipeline_series_are_exported() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("recorder");

    let llm = ScriptedLlm::new(vec![Ok(script_of(80)), Ok(script_of(150))]);
    let tts = Arc::new(FlakyTts::new(300).fail_times("word", 1));
    let pipeline = PodcastPipeline::new(
        ResearchOrchestrator::new(ResearchSettings::default()),
        ScriptSynthesizer::new(llm, ScriptSettings::default()),
        AudioSynthesizer::new(
            tts,
            AudioSettings {
                max_concurrent: 2,
                retry: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(1),
                },
            },
        ),
    );
    let sources = vec![
        MockSource::items("arxiv", vec![item("Paper", SourceType::Arxiv, 0.9, Some(1))]),
        MockSource::failing("blog"),
    ];
    pipeline
        .generate("rust", 1.0, &sources, &CancellationToken::new())
        .await
        .expect("episode");

    let out = handle.render();
    for series in [
        "research_runs_total",
        "research_source_errors_total",
        "research_items_total",
        "research_fetch_ms",
        "script_corrective_retries_total",
        "tts_segments_total",
        "tts_segment_retries_total",
        "pipeline_runs_total",
    ] {
        assert!(out.contains(series), "missing {series} in:\n{out}");
    }
}
