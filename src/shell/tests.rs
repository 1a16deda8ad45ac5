use super::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::generation::TextGenerator;
use crate::pipeline::Clients;
use crate::testing::{HistogramEmbedder, PlainTextExtractor, RecordingGenerator};

fn error(message: &str) -> ShellState {
    ShellState::Error(message.to_string())
}

#[test]
fn valid_transitions() {
    let cases = [
        (ShellState::Idle, ShellEvent::RebuildRequested, ShellState::Ingesting),
        (ShellState::IndexReady, ShellEvent::RebuildRequested, ShellState::Ingesting),
        (ShellState::Ingesting, ShellEvent::IngestSucceeded, ShellState::IndexReady),
        (ShellState::Ingesting, ShellEvent::Failed("boom".to_string()), error("boom")),
        (ShellState::IndexReady, ShellEvent::QuestionSubmitted, ShellState::Querying),
        (ShellState::Idle, ShellEvent::QuestionSubmitted, ShellState::Querying),
        (ShellState::Querying, ShellEvent::AnswerProduced, ShellState::IndexReady),
        (ShellState::Querying, ShellEvent::Failed("late".to_string()), error("late")),
        (error("boom"), ShellEvent::Retry, ShellState::Idle),
        (ShellState::Idle, ShellEvent::IndexLoaded, ShellState::IndexReady),
    ];

    for (state, event, expected) in cases {
        assert_eq!(
            transition(&state, &event),
            Ok(expected),
            "{:?} on {:?}",
            event,
            state
        );
    }
}

#[test]
fn invalid_transitions_are_rejected() {
    let cases = [
        (ShellState::Idle, ShellEvent::AnswerProduced),
        (ShellState::Idle, ShellEvent::Retry),
        (ShellState::Idle, ShellEvent::Failed("x".to_string())),
        (ShellState::Ingesting, ShellEvent::QuestionSubmitted),
        (ShellState::Ingesting, ShellEvent::RebuildRequested),
        (ShellState::Querying, ShellEvent::RebuildRequested),
        (ShellState::IndexReady, ShellEvent::IngestSucceeded),
        (error("boom"), ShellEvent::QuestionSubmitted),
        (error("boom"), ShellEvent::RebuildRequested),
        (error("boom"), ShellEvent::IndexLoaded),
        (ShellState::IndexReady, ShellEvent::IndexLoaded),
        (ShellState::Querying, ShellEvent::IndexLoaded),
    ];

    for (state, event) in cases {
        let rejected = transition(&state, &event).expect_err("transition should be rejected");
        assert_eq!(rejected.state, state);
        assert_eq!(rejected.event, event);
    }
}

struct Fixture {
    _temp_dir: TempDir,
    config: Config,
    generator: Arc<RecordingGenerator>,
}

impl Fixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let mut config = Config::default();
        config.base_dir = temp_dir.path().to_path_buf();
        config.storage.documents_dir = temp_dir.path().join("data");
        config.storage.index_dir = temp_dir.path().join("faiss_index");
        config.chunking.chunk_size = 100;
        config.chunking.chunk_overlap = 10;

        Self {
            _temp_dir: temp_dir,
            config,
            generator: Arc::new(RecordingGenerator::new("test-gen", "An answer.")),
        }
    }

    fn write_document(&self, name: &str, text: &str) {
        fs::create_dir_all(&self.config.storage.documents_dir).expect("should create data dir");
        fs::write(self.config.storage.documents_dir.join(name), text)
            .expect("should write document");
    }

    fn pipeline_with_model(&self, model: &str) -> Pipeline {
        let clients = Clients {
            extractor: Arc::new(PlainTextExtractor),
            embedder: Arc::new(HistogramEmbedder::new(model)) as Arc<dyn Embedder>,
            llama: Arc::clone(&self.generator) as Arc<dyn TextGenerator>,
            mistral: Arc::clone(&self.generator) as Arc<dyn TextGenerator>,
        };
        Pipeline::new(self.config.clone(), clients)
    }

    fn pipeline(&self) -> Pipeline {
        self.pipeline_with_model("test-embed")
    }
}

#[tokio::test]
async fn starts_idle_without_an_index() {
    let fixture = Fixture::new();
    let session = Session::start(fixture.pipeline()).await;
    assert_eq!(session.state(), &ShellState::Idle);
}

#[tokio::test]
async fn starts_ready_when_an_index_is_persisted() {
    let fixture = Fixture::new();
    fixture.write_document("a.pdf", "Some text.");
    fixture
        .pipeline()
        .rebuild_index()
        .await
        .expect("rebuild should succeed");

    let session = Session::start(fixture.pipeline()).await;
    assert_eq!(session.state(), &ShellState::IndexReady);
}

#[tokio::test]
async fn starts_idle_when_the_index_uses_another_model() {
    let fixture = Fixture::new();
    fixture.write_document("a.pdf", "Some text.");
    fixture
        .pipeline()
        .rebuild_index()
        .await
        .expect("rebuild should succeed");

    let session = Session::start(fixture.pipeline_with_model("other-embed")).await;
    assert_eq!(session.state(), &ShellState::Idle);
}

#[tokio::test]
async fn question_before_build_lands_in_error_then_retry_returns_to_idle() {
    let fixture = Fixture::new();
    let mut session = Session::start(fixture.pipeline()).await;

    let result = session.ask("What is this?", Backend::Llama).await;

    assert!(matches!(result, Err(RagError::IndexNotFound(_))));
    match session.state() {
        ShellState::Error(message) => assert!(message.contains("build the index first")),
        other => panic!("expected error state, got {:?}", other),
    }

    // Only Retry is accepted from the error state
    assert!(session.rebuild().await.is_err());
    assert!(matches!(session.state(), ShellState::Error(_)));

    session.retry().await.expect("retry should be accepted");
    assert_eq!(session.state(), &ShellState::Idle);
}

#[tokio::test]
async fn rebuild_then_ask_returns_to_ready() {
    let fixture = Fixture::new();
    fixture.write_document("a.pdf", "Some text.");
    let mut session = Session::start(fixture.pipeline()).await;

    let stats = session.rebuild().await.expect("rebuild should succeed");
    assert_eq!(stats.documents, 1);
    assert_eq!(session.state(), &ShellState::IndexReady);

    let answer = session
        .ask("Some text.", Backend::Mistral)
        .await
        .expect("answer should succeed");
    assert_eq!(answer.text, "An answer.");
    assert_eq!(session.state(), &ShellState::IndexReady);
}

#[tokio::test]
async fn failed_rebuild_moves_to_error() {
    let fixture = Fixture::new();
    let mut session = Session::start(fixture.pipeline()).await;

    let result = session.rebuild().await;

    assert!(matches!(result, Err(RagError::Ingestion(_))));
    assert!(matches!(session.state(), ShellState::Error(_)));
}

#[tokio::test]
async fn empty_question_does_not_change_state() {
    let fixture = Fixture::new();
    let mut session = Session::start(fixture.pipeline()).await;

    assert!(matches!(
        session.ask("  ", Backend::Llama).await,
        Err(RagError::Config(_))
    ));
    assert_eq!(session.state(), &ShellState::Idle);
}

#[tokio::test]
async fn blank_model_output_is_an_answer_not_an_error() {
    let fixture = Fixture::new();
    fixture.write_document("a.pdf", "Some text.");
    fixture.generator.set_reply("");
    let mut session = Session::start(fixture.pipeline()).await;
    session.rebuild().await.expect("rebuild should succeed");

    let answer = session
        .ask("Some text.", Backend::Llama)
        .await
        .expect("answer should succeed");

    assert!(answer.is_blank());
    assert_eq!(session.state(), &ShellState::IndexReady);
}

#[tokio::test]
async fn retry_after_a_failed_answer_keeps_the_loaded_index() {
    let fixture = Fixture::new();
    fixture.write_document("a.pdf", "Some text.");
    let mut session = Session::start(fixture.pipeline()).await;
    session.rebuild().await.expect("rebuild should succeed");
    fixture.generator.fail_with("model overloaded");

    let result = session.ask("Some text.", Backend::Llama).await;

    assert!(matches!(result, Err(RagError::GenerationService(_))));
    match session.state() {
        ShellState::Error(message) => assert!(message.contains("model overloaded")),
        other => panic!("expected error state, got {:?}", other),
    }

    session.retry().await.expect("retry should be accepted");
    assert_eq!(session.state(), &ShellState::IndexReady);
    assert_eq!(session.state().to_string(), "index ready");
}
