//! End-to-end pipeline tests over the durable SQLite backend: ingest,
//! retrieve with sibling expansion, grounded chat, and deletion.

use std::sync::Arc;

use tempfile::TempDir;

use ragmill::chat::ChatService;
use ragmill::config::{IngestionConfig, RetrievalConfig, StoreConfig};
use ragmill::error::RagError;
use ragmill::ingestion::IngestPipeline;
use ragmill::message::ChatTurn;
use ragmill::providers::{MockEmbedder, MockLanguageModel};
use ragmill::retriever::{ContextFilter, Retriever};
use ragmill::stores::{BackendKind, open_stores};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Harness {
    pipeline: IngestPipeline,
    retriever: Arc<Retriever>,
    chat: ChatService,
    // Dropping the tempdir removes the database file.
    _db_dir: TempDir,
}

async fn harness() -> Harness {
    init_tracing();
    let db_dir = tempfile::tempdir().expect("create temp dir");
    let config = StoreConfig {
        db_path: db_dir
            .path()
            .join("ragmill-test.db")
            .to_string_lossy()
            .into_owned(),
    };
    let stores = open_stores(&config).await;
    assert_eq!(stores.backend, BackendKind::Durable);

    let embedder = Arc::new(MockEmbedder::new(128));
    let pipeline = IngestPipeline::new(
        embedder.clone(),
        stores.node_store.clone(),
        stores.vector_index.clone(),
        IngestionConfig {
            window_size: 1,
            ..IngestionConfig::default()
        },
    );
    let retriever = Arc::new(Retriever::new(
        embedder,
        stores.node_store.clone(),
        stores.vector_index.clone(),
    ));
    let chat = ChatService::new(
        Arc::new(MockLanguageModel::new()),
        retriever.clone(),
        None,
        RetrievalConfig::default(),
    );
    Harness {
        pipeline,
        retriever,
        chat,
        _db_dir: db_dir,
    }
}

#[tokio::test]
async fn ingest_then_retrieve_round_trip() {
    let h = harness().await;
    let docs = h
        .pipeline
        .ingest(
            "handbook.txt",
            "Badges unlock the east entrance. Visitors sign in at reception. \
             Parking permits renew annually.",
        )
        .await
        .expect("ingest");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].object, "ingest.document");
    assert_eq!(docs[0].doc_metadata["file_name"], "handbook.txt");

    let chunks = h
        .retriever
        .retrieve_relevant(
            "where do visitors sign in",
            &ContextFilter::default(),
            2,
            3,
        )
        .await
        .expect("retrieve");
    assert!(!chunks.is_empty());
    let best = &chunks[0];
    assert_eq!(best.object, "context.chunk");
    assert!(best.text.contains("Visitors sign in"));
    // Middle sentence: one sibling on each side.
    assert_eq!(best.previous_texts.as_ref().map(Vec::len), Some(1));
    assert_eq!(best.next_texts.as_ref().map(Vec::len), Some(1));
    // Bookkeeping metadata never reaches the response.
    assert!(!best.document.doc_metadata.contains_key("window"));
    assert!(!best.document.doc_metadata.contains_key("doc_id"));
}

#[tokio::test]
async fn durable_state_survives_reopen() {
    init_tracing();
    let db_dir = tempfile::tempdir().expect("create temp dir");
    let config = StoreConfig {
        db_path: db_dir
            .path()
            .join("persist.db")
            .to_string_lossy()
            .into_owned(),
    };
    let embedder = Arc::new(MockEmbedder::new(64));

    let doc_id = {
        let stores = open_stores(&config).await;
        let pipeline = IngestPipeline::new(
            embedder.clone(),
            stores.node_store.clone(),
            stores.vector_index.clone(),
            IngestionConfig::default(),
        );
        let docs = pipeline
            .ingest("kept.txt", "This sentence outlives its connection.")
            .await
            .expect("ingest");
        stores.vector_index.close().await.expect("close");
        docs[0].doc_id.clone()
    };

    let stores = open_stores(&config).await;
    assert_eq!(stores.backend, BackendKind::Durable);
    let pipeline = IngestPipeline::new(
        embedder.clone(),
        stores.node_store.clone(),
        stores.vector_index.clone(),
        IngestionConfig::default(),
    );
    let listed = pipeline.list_ingested().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].doc_id, doc_id);

    let retriever = Retriever::new(embedder, stores.node_store, stores.vector_index);
    let hits = retriever
        .retrieve("sentence outlives connection", &ContextFilter::default(), 1)
        .await
        .expect("retrieve");
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn delete_removes_document_everywhere() {
    let h = harness().await;
    let docs = h
        .pipeline
        .ingest_bulk(vec![
            ("a.txt".into(), "Alpha content stays put.".into()),
            ("b.txt".into(), "Beta content gets removed.".into()),
        ])
        .await
        .expect("bulk ingest");

    h.pipeline.delete(&docs[1].doc_id).await.expect("delete");

    let listed = h.pipeline.list_ingested().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].doc_id, docs[0].doc_id);

    let hits = h
        .retriever
        .retrieve("beta content", &ContextFilter::default(), 10)
        .await
        .expect("retrieve");
    assert!(hits.iter().all(|hit| hit.node.ref_doc_id != docs[1].doc_id));

    let err = h.pipeline.delete(&docs[1].doc_id).await.unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}

#[tokio::test]
async fn filtered_retrieval_scopes_to_requested_documents() {
    let h = harness().await;
    let docs = h
        .pipeline
        .ingest_bulk(vec![
            ("red.txt".into(), "The launch window opens in March.".into()),
            ("blue.txt".into(), "The launch window opens in October.".into()),
        ])
        .await
        .expect("bulk ingest");

    let filter = ContextFilter::for_docs(vec![docs[0].doc_id.clone()]);
    let chunks = h
        .retriever
        .retrieve_relevant("when does the launch window open", &filter, 10, 0)
        .await
        .expect("retrieve");
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text.contains("March"));
}

#[tokio::test]
async fn grounded_chat_cites_durable_sources() {
    let h = harness().await;
    h.pipeline
        .ingest("ops.txt", "The standby cluster lives in Frankfurt.")
        .await
        .expect("ingest");

    let completion = h
        .chat
        .chat(
            vec![ChatTurn::user("where does the standby cluster live")],
            true,
            &ContextFilter::default(),
        )
        .await
        .expect("chat");
    assert_eq!(completion.sources.len(), 1);
    assert!(completion.sources[0].text.contains("Frankfurt"));

    // Same request without context: no sources attached.
    let plain = h
        .chat
        .chat(
            vec![ChatTurn::user("where does the standby cluster live")],
            false,
            &ContextFilter::default(),
        )
        .await
        .expect("chat");
    assert!(plain.sources.is_empty());
}

#[tokio::test]
async fn streamed_chat_matches_materialized_chat() {
    let h = harness().await;
    h.pipeline
        .ingest("notes.txt", "Deploys happen every Tuesday morning.")
        .await
        .expect("ingest");
    let turns = vec![ChatTurn::user("when do deploys happen")];

    let completion = h
        .chat
        .chat(turns.clone(), true, &ContextFilter::default())
        .await
        .expect("chat");
    let streaming = h
        .chat
        .stream_chat(turns, true, &ContextFilter::default())
        .await
        .expect("stream chat");

    let mut assembled = String::new();
    while let Ok(token) = streaming.tokens.recv_async().await {
        assembled.push_str(&token.expect("stream token"));
    }
    assert_eq!(assembled, completion.response);
    assert_eq!(streaming.sources.len(), completion.sources.len());
}

#[tokio::test]
async fn unreachable_database_falls_back_to_memory() {
    init_tracing();
    let config = StoreConfig {
        db_path: "/nonexistent-ragmill-dir/ragmill.db".into(),
    };
    let stores = open_stores(&config).await;
    assert_eq!(stores.backend, BackendKind::InMemory);

    // The fallback stores are fully functional.
    let embedder = Arc::new(MockEmbedder::new(64));
    let pipeline = IngestPipeline::new(
        embedder.clone(),
        stores.node_store.clone(),
        stores.vector_index.clone(),
        IngestionConfig::default(),
    );
    pipeline
        .ingest("volatile.txt", "This lives only in memory.")
        .await
        .expect("ingest");
    let retriever = Retriever::new(embedder, stores.node_store, stores.vector_index);
    let hits = retriever
        .retrieve("lives in memory", &ContextFilter::default(), 1)
        .await
        .expect("retrieve");
    assert_eq!(hits.len(), 1);
}
