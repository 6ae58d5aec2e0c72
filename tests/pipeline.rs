mod common;
use common::*;

use std::sync::Arc;
use std::time::Duration;

use ragloom::pipeline::{PipelineError, PipelineRunner, SessionInit, Stage};
use ragloom::providers::mock::{
    MockCompletionProvider, MockEmbeddingProvider, MockSearchProvider,
};
use ragloom::providers::{ProviderError, SearchHit};
use ragloom::stores::{MemoryStore, SourceTag};

fn runner(
    embedding: MockEmbeddingProvider,
    search: MockSearchProvider,
    completion: MockCompletionProvider,
) -> PipelineRunner {
    PipelineRunner::builder()
        .with_embedding(Arc::new(embedding))
        .with_search(Arc::new(search))
        .with_completion(Arc::new(completion))
        .with_config(tight_config())
        .build()
        .expect("runner builds")
}

#[tokio::test]
async fn document_and_web_turns_share_one_ordinal_sequence() {
    let runner = runner(
        pinned_embedding(),
        MockSearchProvider::new(vec![SearchHit::new("canned", "https://a.example")]),
        MockCompletionProvider::new("the answer"),
    );
    runner.create_session("s1").await.unwrap();
    runner
        .ingest_document("s1", "geography.pdf", DOC_TEXT)
        .await
        .unwrap();

    let first = runner.ask("s1", DOC_QUESTION).await.unwrap();
    let second = runner.ask("s1", WEB_QUESTION).await.unwrap();

    assert_eq!(first.source, SourceTag::Document);
    assert_eq!(first.ordinal, Some(1));
    assert_eq!(second.source, SourceTag::Web);
    assert_eq!(second.ordinal, Some(2));

    let history = runner.history("s1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].ordinal, 1);
    assert_eq!(history[0].source, SourceTag::Document);
    assert_eq!(history[0].question, DOC_QUESTION);
    assert_eq!(history[1].ordinal, 2);
    assert_eq!(history[1].source, SourceTag::Web);
}

#[tokio::test]
async fn gate_accepts_a_score_exactly_at_the_threshold() {
    // Identical vectors give an exact 1.0 cosine, so threshold 1.0 probes
    // the >= boundary without floating-point slack.
    let embedding = MockEmbeddingProvider::new()
        .with_dims(4)
        .pin(DOC_TEXT, vec![1.0, 0.0, 0.0, 0.0])
        .pin(DOC_QUESTION, vec![1.0, 0.0, 0.0, 0.0]);
    let search = Arc::new(MockSearchProvider::failing());
    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(embedding))
        .with_search(search.clone())
        .with_completion(Arc::new(MockCompletionProvider::new("docs win")))
        .with_config(tight_config().with_sufficiency_threshold(1.0))
        .build()
        .unwrap();

    runner.create_session("s1").await.unwrap();
    runner
        .ingest_document("s1", "geography.pdf", DOC_TEXT)
        .await
        .unwrap();

    let outcome = runner.ask("s1", DOC_QUESTION).await.unwrap();
    assert_eq!(outcome.source, SourceTag::Document);
    assert_eq!(search.calls(), 0);
}

#[tokio::test]
async fn empty_index_always_falls_back_to_web() {
    let search = Arc::new(MockSearchProvider::empty());
    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(MockEmbeddingProvider::new()))
        .with_search(search.clone())
        .with_completion(Arc::new(MockCompletionProvider::echoing()))
        .with_config(tight_config())
        .build()
        .unwrap();
    runner.create_session("s1").await.unwrap();

    let outcome = runner.ask("s1", "Is anything indexed?").await.unwrap();
    assert_eq!(outcome.source, SourceTag::Web);
    assert_eq!(outcome.ordinal, Some(1));
    assert_eq!(search.calls(), 1);
    assert!(outcome.stages.contains(&Stage::WebSearch));
    assert!(outcome.cited_chunks.is_empty());
    // No hits either, so the prompt says so and the echo proves it.
    assert!(outcome.answer.contains("(no supporting context was found)"));
}

#[tokio::test]
async fn web_search_failure_fails_the_question_and_records_nothing() {
    let runner = runner(
        MockEmbeddingProvider::new(),
        MockSearchProvider::failing(),
        MockCompletionProvider::echoing(),
    );
    runner.create_session("s1").await.unwrap();

    let err = runner.ask("s1", "Anything out there?").await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::WebSearch(ProviderError::Call { .. })
    ));
    assert!(runner.history("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn slow_web_search_times_out_under_the_deadline() {
    let search = MockSearchProvider::empty().with_delay(Duration::from_millis(200));
    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(MockEmbeddingProvider::new()))
        .with_search(Arc::new(search))
        .with_completion(Arc::new(MockCompletionProvider::echoing()))
        .with_config(tight_config().with_external_call_timeout(Duration::from_millis(25)))
        .build()
        .unwrap();
    runner.create_session("s1").await.unwrap();

    let err = runner.ask("s1", "Still waiting?").await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::WebSearch(ProviderError::Timeout { waited_ms: 25, .. })
    ));
    assert!(runner.history("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn synthesis_retries_once_with_identical_input() {
    let completion = Arc::new(MockCompletionProvider::new("recovered").fail_times(1));
    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(pinned_embedding()))
        .with_search(Arc::new(MockSearchProvider::empty()))
        .with_completion(completion.clone())
        .with_config(tight_config())
        .build()
        .unwrap();
    runner.create_session("s1").await.unwrap();
    runner
        .ingest_document("s1", "geography.pdf", DOC_TEXT)
        .await
        .unwrap();

    let outcome = runner.ask("s1", DOC_QUESTION).await.unwrap();
    assert_eq!(outcome.answer, "recovered");
    assert_eq!(outcome.ordinal, Some(1));
    assert_eq!(completion.calls(), 2);
}

#[tokio::test]
async fn synthesis_fails_after_the_retry_also_fails() {
    let completion = Arc::new(MockCompletionProvider::new("never seen").fail_times(2));
    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(MockEmbeddingProvider::new()))
        .with_search(Arc::new(MockSearchProvider::empty()))
        .with_completion(completion.clone())
        .with_config(tight_config())
        .build()
        .unwrap();
    runner.create_session("s1").await.unwrap();

    let err = runner.ask("s1", "Does retrying help?").await.unwrap_err();
    assert!(matches!(err, PipelineError::Synthesis { attempts: 2, .. }));
    assert_eq!(completion.calls(), 2);
    assert!(runner.history("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn zero_retry_config_fails_on_the_first_synthesis_error() {
    let completion = Arc::new(MockCompletionProvider::new("never seen").fail_times(1));
    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(MockEmbeddingProvider::new()))
        .with_search(Arc::new(MockSearchProvider::empty()))
        .with_completion(completion.clone())
        .with_config(tight_config().with_synthesis_retry_count(0))
        .build()
        .unwrap();
    runner.create_session("s1").await.unwrap();

    let err = runner.ask("s1", "One strike?").await.unwrap_err();
    assert!(matches!(err, PipelineError::Synthesis { attempts: 1, .. }));
    assert_eq!(completion.calls(), 1);
}

#[tokio::test]
async fn history_markers_pull_recent_turns_into_the_prompt() {
    let runner = runner(
        MockEmbeddingProvider::new(),
        MockSearchProvider::empty(),
        MockCompletionProvider::echoing(),
    );
    runner.create_session("s1").await.unwrap();

    runner.ask("s1", WEB_QUESTION).await.unwrap();
    let followup = runner
        .ask("s1", "What did you say earlier about the cup?")
        .await
        .unwrap();

    assert!(followup.answer.contains("Conversation so far:"));
    assert!(followup.answer.contains(WEB_QUESTION));
}

#[tokio::test]
async fn plain_questions_do_not_carry_history() {
    let runner = runner(
        MockEmbeddingProvider::new(),
        MockSearchProvider::empty(),
        MockCompletionProvider::echoing(),
    );
    runner.create_session("s1").await.unwrap();

    runner.ask("s1", WEB_QUESTION).await.unwrap();
    let followup = runner.ask("s1", "Anything new under the sun?").await.unwrap();

    assert!(!followup.answer.contains("Conversation so far:"));
}

#[tokio::test]
async fn append_failure_still_delivers_the_answer() {
    let store = Arc::new(FlakyStore::new());
    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(pinned_embedding()))
        .with_search(Arc::new(MockSearchProvider::empty()))
        .with_completion(Arc::new(MockCompletionProvider::new("kept answer")))
        .with_store(store.clone())
        .with_config(tight_config())
        .build()
        .unwrap();
    runner.create_session("s1").await.unwrap();
    runner
        .ingest_document("s1", "geography.pdf", DOC_TEXT)
        .await
        .unwrap();

    store.fail_appends(true);
    let outcome = runner.ask("s1", DOC_QUESTION).await.unwrap();
    assert_eq!(outcome.answer, "kept answer");
    assert!(!outcome.persisted);
    assert_eq!(outcome.ordinal, None);
    assert!(runner.history("s1").await.unwrap().is_empty());

    // The sequence picks up cleanly once the store recovers.
    store.fail_appends(false);
    let outcome = runner.ask("s1", DOC_QUESTION).await.unwrap();
    assert_eq!(outcome.ordinal, Some(1));
}

#[tokio::test]
async fn document_store_failure_keeps_the_session_serviceable() {
    let store = Arc::new(FlakyStore::new());
    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(pinned_embedding()))
        .with_search(Arc::new(MockSearchProvider::empty()))
        .with_completion(Arc::new(MockCompletionProvider::new("from docs")))
        .with_store(store.clone())
        .with_config(tight_config())
        .build()
        .unwrap();
    runner.create_session("s1").await.unwrap();

    store.fail_documents(true);
    let report = runner
        .ingest_document("s1", "geography.pdf", DOC_TEXT)
        .await
        .unwrap();
    assert!(!report.persisted);
    assert!(runner.documents("s1").await.unwrap().is_empty());

    // The in-memory index still answers from the document.
    let outcome = runner.ask("s1", DOC_QUESTION).await.unwrap();
    assert_eq!(outcome.source, SourceTag::Document);
}

#[tokio::test]
async fn resumed_session_replays_chunks_and_continues_ordinals() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());

    {
        let runner = PipelineRunner::builder()
            .with_embedding(Arc::new(pinned_embedding()))
            .with_search(Arc::new(MockSearchProvider::empty()))
            .with_completion(Arc::new(MockCompletionProvider::new("first run")))
            .with_store(store.clone())
            .with_config(tight_config())
            .build()
            .unwrap();
        runner.create_session("keep").await.unwrap();
        runner
            .ingest_document("keep", "geography.pdf", DOC_TEXT)
            .await
            .unwrap();
        let outcome = runner.ask("keep", DOC_QUESTION).await.unwrap();
        assert_eq!(outcome.ordinal, Some(1));
    }

    // A fresh runner over the same store stands the session back up.
    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(pinned_embedding()))
        .with_search(Arc::new(MockSearchProvider::failing()))
        .with_completion(Arc::new(MockCompletionProvider::new("second run")))
        .with_store(store)
        .with_config(tight_config())
        .build()
        .unwrap();

    let init = runner.create_session("keep").await.unwrap();
    assert_eq!(init, SessionInit::Resumed { turn_count: 1 });

    // Document branch works without re-ingesting, so the index was rebuilt.
    let outcome = runner.ask("keep", DOC_QUESTION).await.unwrap();
    assert_eq!(outcome.source, SourceTag::Document);
    assert_eq!(outcome.ordinal, Some(2));

    // The dedupe ledger was rebuilt too.
    let report = runner
        .ingest_document("keep", "again.pdf", DOC_TEXT)
        .await
        .unwrap();
    assert!(report.deduplicated);
}

#[tokio::test]
async fn sessions_do_not_see_each_other_documents() {
    let runner = Arc::new(runner(
        pinned_embedding(),
        MockSearchProvider::new(vec![SearchHit::new("from the web", "https://w.example")]),
        MockCompletionProvider::new("answer"),
    ));
    runner.create_session("with-docs").await.unwrap();
    runner.create_session("empty").await.unwrap();
    runner
        .ingest_document("with-docs", "geography.pdf", DOC_TEXT)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        runner.ask("with-docs", DOC_QUESTION),
        runner.ask("empty", DOC_QUESTION),
    );
    assert_eq!(a.unwrap().source, SourceTag::Document);
    // Same question, but this session's index is empty.
    assert_eq!(b.unwrap().source, SourceTag::Web);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_asks_on_one_session_serialize_with_unique_ordinals() {
    let runner = Arc::new(runner(
        pinned_embedding(),
        MockSearchProvider::empty(),
        MockCompletionProvider::new("answer"),
    ));
    runner.create_session("s1").await.unwrap();
    runner
        .ingest_document("s1", "geography.pdf", DOC_TEXT)
        .await
        .unwrap();

    let first = tokio::spawn({
        let runner = runner.clone();
        async move { runner.ask("s1", DOC_QUESTION).await.unwrap() }
    });
    let second = tokio::spawn({
        let runner = runner.clone();
        async move { runner.ask("s1", DOC_QUESTION).await.unwrap() }
    });

    let (a, b) = (first.await.unwrap(), second.await.unwrap());
    let mut ordinals = vec![a.ordinal.unwrap(), b.ordinal.unwrap()];
    ordinals.sort_unstable();
    assert_eq!(ordinals, vec![1, 2]);
}

#[tokio::test]
async fn web_results_are_capped_at_the_configured_maximum() {
    let hits: Vec<SearchHit> = (0..7)
        .map(|i| SearchHit::new(format!("snippet {i}"), format!("https://h{i}.example")))
        .collect();
    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(MockEmbeddingProvider::new()))
        .with_search(Arc::new(MockSearchProvider::new(hits)))
        .with_completion(Arc::new(MockCompletionProvider::new("capped")))
        .with_config(tight_config().with_search_max_results(3))
        .build()
        .unwrap();
    runner.create_session("s1").await.unwrap();

    let outcome = runner.ask("s1", "How many sources?").await.unwrap();
    assert_eq!(outcome.cited_hits.len(), 3);
    assert_eq!(outcome.cited_hits[0].snippet, "snippet 0");
}

#[tokio::test]
async fn delete_session_clears_turns_documents_and_the_live_index() {
    let runner = runner(
        pinned_embedding(),
        MockSearchProvider::empty(),
        MockCompletionProvider::new("answer"),
    );
    runner.create_session("s1").await.unwrap();
    runner
        .ingest_document("s1", "geography.pdf", DOC_TEXT)
        .await
        .unwrap();
    runner.ask("s1", DOC_QUESTION).await.unwrap();

    runner.delete_session("s1").await.unwrap();

    assert!(runner.history("s1").await.unwrap().is_empty());
    assert!(runner.documents("s1").await.unwrap().is_empty());
    // The handle is gone too; asking again requires a fresh create.
    let err = runner.ask("s1", DOC_QUESTION).await.unwrap_err();
    assert!(matches!(err, PipelineError::UnknownSession { .. }));

    assert_eq!(
        runner.create_session("s1").await.unwrap(),
        SessionInit::Fresh
    );
}
