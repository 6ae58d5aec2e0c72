//! Quickstart: Sessions, Ingest, and the Fallback Pipeline
//!
//! This demonstration walks the whole question pipeline end to end with
//! deterministic mock providers, so it runs without API keys or a network.
//! It covers session creation, document ingestion, the sufficiency gate
//! choosing between the document and web branches, turn history, and live
//! pipeline events on the event bus.
//!
//! What You'll Learn:
//! 1. Runner Assembly: Wiring providers, config, and an event sender
//! 2. Ingestion: Chunking, deduplication, and ingest reports
//! 3. The Gate: Why one question answers from documents and another from the web
//! 4. History: Ordinal-ordered turns and session summaries
//! 5. Observability: Watching stage transitions on the event bus
//!
//! Running This Demo:
//! ```bash
//! cargo run --example quickstart
//! ```

use std::sync::Arc;

use miette::Result;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ragloom::config::PipelineConfig;
use ragloom::event_bus::EventBus;
use ragloom::pipeline::PipelineRunner;
use ragloom::providers::SearchHit;
use ragloom::providers::mock::{
    MockCompletionProvider, MockEmbeddingProvider, MockSearchProvider,
};

const DOC_TEXT: &str = "The capital of France is Paris.";
const DOC_QUESTION: &str = "What is the capital of France?";
const WEB_QUESTION: &str = "Who won the most recent world cup?";

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        // Log when spans are created/closed so we see instrumented async boundaries
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("error,ragloom=info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn init_miette() {
    // Pretty panic reports
    miette::set_panic_hook();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_miette();
    demo().await
}

async fn demo() -> Result<()> {
    info!("\n╔══════════════════════════════════════════════════════════╗");
    info!("║                       Quickstart                         ║");
    info!("║        Sessions, Ingest & the Fallback Pipeline          ║");
    info!("╚══════════════════════════════════════════════════════════╝\n");

    // ✅ STEP 1: Assemble providers the gate can reason about
    info!("📊 Step 1: Building deterministic mock providers");

    // Pinned embeddings make the gate's branch choice predictable: the
    // document question lands at cosine 0.9 from the chunk, the web
    // question is orthogonal to it.
    let embedding = MockEmbeddingProvider::new()
        .with_dims(4)
        .pin(DOC_TEXT, vec![1.0, 0.0, 0.0, 0.0])
        .pin(DOC_QUESTION, vec![0.9, 0.435_889_9, 0.0, 0.0])
        .pin(WEB_QUESTION, vec![0.0, 1.0, 0.0, 0.0]);
    let search = MockSearchProvider::new(vec![SearchHit::new(
        "Argentina won the 2022 FIFA World Cup in Qatar.",
        "https://example.org/world-cup",
    )]);
    let completion = MockCompletionProvider::echoing();

    info!("   ✓ Embedding pinned for both questions and the document");
    info!("   ✓ Search returns one canned hit; completion echoes its prompt");

    // ✅ STEP 2: Event bus with a stdout listener
    info!("\n🔔 Step 2: Starting the event bus listener");

    let bus = EventBus::default();
    bus.listen_for_events();

    let runner = PipelineRunner::builder()
        .with_embedding(Arc::new(embedding))
        .with_search(Arc::new(search))
        .with_completion(Arc::new(completion))
        .with_config(
            PipelineConfig::default()
                .with_chunk_window(50, 10)
                .with_sufficiency_threshold(0.5),
        )
        .with_event_sender(bus.get_sender())
        .build()?;

    info!("   ✓ Runner wired to the bus; stage transitions will print live");

    // ✅ STEP 3: Session and ingestion
    info!("\n📥 Step 3: Creating a session and ingesting a document");

    let init = runner.create_session("demo").await?;
    info!("   ✓ Session opened: {init:?}");

    let report = runner.ingest_document("demo", "geography.pdf", DOC_TEXT).await?;
    info!(
        "   ✓ Ingested {} chunk(s), content hash {}…",
        report.chunk_count,
        &report.content_hash[..12]
    );

    let duplicate = runner.ingest_document("demo", "copy.pdf", DOC_TEXT).await?;
    info!("   ✓ Re-upload deduplicated: {}", duplicate.deduplicated);

    // ✅ STEP 4: A question the corpus can answer
    info!("\n📚 Step 4: Asking a question the document covers");

    let outcome = runner.ask("demo", DOC_QUESTION).await?;
    info!("   ✓ Source: {} (ordinal {:?})", outcome.source, outcome.ordinal);
    info!("   ✓ Stages: {:?}", outcome.stages);
    info!(
        "   ✓ Cited {} chunk(s) from {}",
        outcome.cited_chunks.len(),
        outcome.cited_chunks[0].record.document_name
    );

    // ✅ STEP 5: A question that falls back to the web
    info!("\n🌐 Step 5: Asking a question the corpus cannot answer");

    let outcome = runner.ask("demo", WEB_QUESTION).await?;
    info!("   ✓ Source: {} (ordinal {:?})", outcome.source, outcome.ordinal);
    info!("   ✓ Stages: {:?}", outcome.stages);
    info!("   ✓ Cited hit: {}", outcome.cited_hits[0].url);

    // ✅ STEP 6: History and session listing
    info!("\n🗂 Step 6: Reviewing history");

    let history = runner.history("demo").await?;
    for turn in &history {
        info!("   {}. [{}] {}", turn.ordinal, turn.source, turn.question);
    }
    let sessions = runner.list_sessions().await?;
    info!(
        "   ✓ {} session(s); most recent preview: {:?}",
        sessions.len(),
        sessions[0].preview
    );

    bus.stop_listener().await;
    info!("\n✅ Demo complete");
    Ok(())
}
