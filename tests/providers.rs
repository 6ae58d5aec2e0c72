use std::time::Duration;

use ragloom::providers::mock::{
    MockCompletionProvider, MockEmbeddingProvider, MockSearchProvider,
};
use ragloom::providers::{
    CompletionProvider, EmbeddingProvider, ProviderError, SearchHit, SearchProvider, bounded,
};

#[tokio::test]
async fn derived_vectors_are_deterministic_and_unit_length() {
    let provider = MockEmbeddingProvider::new().with_dims(8);

    let first = provider.embed("the same text").await.expect("embed");
    let second = provider.embed("the same text").await.expect("embed again");
    let other = provider.embed("a different text").await.expect("embed other");

    assert_eq!(first.len(), 8);
    assert_eq!(first, second);
    assert_ne!(first, other);

    let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4, "expected unit vector, norm {norm}");
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn pinned_vectors_are_returned_verbatim() {
    let provider = MockEmbeddingProvider::new()
        .with_dims(4)
        .pin("north", vec![0.0, 1.0, 0.0, 0.0]);

    let pinned = provider.embed("north").await.expect("pinned");
    assert_eq!(pinned, vec![0.0, 1.0, 0.0, 0.0]);

    // Unpinned inputs still go through derivation at the configured width.
    let derived = provider.embed("south").await.expect("derived");
    assert_eq!(derived.len(), 4);
    assert_ne!(derived, pinned);
}

#[tokio::test]
async fn embed_batch_matches_single_embeds_in_order() {
    let provider = MockEmbeddingProvider::new();
    let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];

    let batch = provider.embed_batch(&texts).await.expect("batch");
    assert_eq!(batch.len(), 3);
    for (text, vector) in texts.iter().zip(&batch) {
        let single = provider.embed(text).await.expect("single");
        assert_eq!(&single, vector);
    }
}

#[tokio::test]
async fn failing_embedding_names_its_provider() {
    let provider = MockEmbeddingProvider::failing();
    let err = provider.embed("anything").await.expect_err("should fail");
    assert!(matches!(
        err,
        ProviderError::Call {
            provider: "mock-embedding",
            ..
        }
    ));
    assert!(err.to_string().contains("injected embedding failure"));
}

#[tokio::test]
async fn bounded_converts_an_elapsed_deadline_into_timeout() {
    let provider = MockSearchProvider::empty().with_delay(Duration::from_millis(200));

    let err = bounded(
        "web-search",
        Duration::from_millis(25),
        provider.search("anything"),
    )
    .await
    .expect_err("should time out");

    assert!(matches!(
        err,
        ProviderError::Timeout {
            provider: "web-search",
            waited_ms: 25,
        }
    ));
}

#[tokio::test]
async fn bounded_passes_results_and_provider_errors_through() {
    let hits = vec![SearchHit::new("a snippet", "https://example.test")];
    let provider = MockSearchProvider::new(hits.clone());
    let found = bounded("web-search", Duration::from_secs(5), provider.search("q"))
        .await
        .expect("in time");
    assert_eq!(found, hits);
    assert_eq!(provider.calls(), 1);

    // A provider failure inside the deadline keeps its own shape.
    let failing = MockSearchProvider::failing();
    let err = bounded("web-search", Duration::from_secs(5), failing.search("q"))
        .await
        .expect_err("should fail");
    assert!(matches!(err, ProviderError::Call { .. }));
}

#[tokio::test]
async fn completion_fails_the_configured_number_of_times_then_recovers() {
    let provider = MockCompletionProvider::new("the answer").fail_times(2);

    assert!(provider.generate("prompt").await.is_err());
    assert!(provider.generate("prompt").await.is_err());
    let answer = provider.generate("prompt").await.expect("third call");
    assert_eq!(answer, "the answer");
    assert_eq!(provider.calls(), 3);

    let stuck = MockCompletionProvider::always_failing();
    for _ in 0..3 {
        assert!(stuck.generate("prompt").await.is_err());
    }
}

#[tokio::test]
async fn echoing_completion_returns_the_prompt_it_was_given() {
    let provider = MockCompletionProvider::echoing();
    let answer = provider
        .generate("You are a careful assistant.")
        .await
        .expect("echo");
    assert_eq!(answer, "You are a careful assistant.");
}
