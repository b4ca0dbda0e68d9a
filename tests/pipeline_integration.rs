//! End-to-end pipeline tests: ingest -> publish -> retrieve -> answer,
//! with deterministic mock embedding and generation backends.

use std::sync::Arc;

use async_trait::async_trait;

use repomind::chunker::ChunkingConfig;
use repomind::embedding::{EmbeddingConfig, MockEmbeddingProvider};
use repomind::error::RepomindError;
use repomind::generation::{GenerationConfig, GenerationError, MockBackend};
use repomind::ingest::{
    FetchError, IngestConfig, Ingestor, Issue, IssueSource, RepositoryFetcher, SourceUnit,
};
use repomind::prompt::PromptBudget;
use repomind::query::{answer, AnswerRequest};
use repomind::retrieval::{RetrievalConfig, Retriever};
use repomind::session::{SessionError, SessionStore};

/// In-memory repository fixture
struct StaticRepo {
    units: Vec<(String, String)>,
    /// Delay before returning, to hold the build claim open
    delay_ms: u64,
}

impl StaticRepo {
    fn new(units: &[(&str, &str)]) -> Self {
        Self {
            units: units
                .iter()
                .map(|(p, t)| (p.to_string(), t.to_string()))
                .collect(),
            delay_ms: 0,
        }
    }

    fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

#[async_trait]
impl RepositoryFetcher for StaticRepo {
    async fn fetch_units(&self) -> Result<Vec<SourceUnit>, FetchError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        Ok(self
            .units
            .iter()
            .map(|(path, text)| SourceUnit {
                path: path.clone(),
                bytes: text.clone().into_bytes(),
            })
            .collect())
    }
}

struct StaticIssues(Vec<Issue>);

#[async_trait]
impl IssueSource for StaticIssues {
    async fn fetch_issues(&self) -> Result<Vec<Issue>, FetchError> {
        Ok(self.0.clone())
    }
}

struct BrokenIssues;

#[async_trait]
impl IssueSource for BrokenIssues {
    async fn fetch_issues(&self) -> Result<Vec<Issue>, FetchError> {
        Err(FetchError::NotFound {
            path: "tracker".to_string(),
        })
    }
}

fn issue(id: u64, title: &str, body: &str) -> Issue {
    Issue {
        id,
        title: title.to_string(),
        body: body.to_string(),
        comments: Vec::new(),
        repo_key: String::new(),
    }
}

fn fast_generation_config() -> GenerationConfig {
    GenerationConfig {
        timeout_secs: 5,
        max_retries: 1,
        retry_base_ms: 1,
        ..GenerationConfig::default()
    }
}

fn ingestor() -> Ingestor {
    Ingestor::new(
        ChunkingConfig::default(),
        EmbeddingConfig {
            batch_size: 4,
            max_concurrent: 2,
            max_retries: 2,
            retry_base_ms: 1,
            ..EmbeddingConfig::default()
        },
        fast_generation_config(),
        IngestConfig::default(),
    )
}

fn three_file_repo() -> StaticRepo {
    StaticRepo::new(&[
        ("README.md", "A parser library for configuration files.\n"),
        (
            "src/lib.rs",
            "pub fn parse(input: &str) -> Result<Ast, ParseError> {\n    tokenize(input)\n}\n",
        ),
        (
            "src/token.rs",
            "pub fn tokenize(input: &str) -> Result<Ast, ParseError> {\n    todo!()\n}\n",
        ),
    ])
}

/// Scenario: ingest a small repository with two issues; the summary and the
/// issue list come back, and the chunk/vector bijection holds
#[tokio::test]
async fn ingest_returns_summary_and_issues() {
    let store = SessionStore::new();
    let issues = StaticIssues(vec![
        issue(1, "Parser panics", "parse panics on empty input"),
        issue(2, "Docs missing", "tokenize has no docs"),
    ]);

    let outcome = ingestor()
        .ingest(
            &store,
            "acme/parser",
            &three_file_repo(),
            &issues,
            Arc::new(MockEmbeddingProvider::new(32)),
            Arc::new(MockBackend::new("A parser library with two open issues.")),
        )
        .await
        .unwrap();

    assert_eq!(outcome.issues.len(), 2);
    let summary = outcome.summary.expect("summary should be generated");
    assert!(!summary.is_empty());
    assert!(outcome.indexed_chunks > 0);
    assert_eq!(outcome.dropped_chunks, 0);

    // Bijection: every chunk id has exactly one vector and vice versa
    let session = store.get("acme/parser").unwrap();
    assert_eq!(session.chunks.len(), session.index.len());
    for id in session.chunks.keys() {
        assert!(session.index.contains(*id));
    }
    for id in session.index.ids() {
        assert!(session.chunks.contains_key(&id));
    }
}

/// Scenario: query with the exact text of an indexed chunk; it comes back
/// as the top result with near-perfect similarity
#[tokio::test]
async fn self_query_returns_indexed_chunk() {
    let store = SessionStore::new();
    let text = "fn similarity(a: &[f32], b: &[f32]) -> f32";
    let repo = StaticRepo::new(&[("src/sim.rs", text)]);

    ingestor()
        .ingest(
            &store,
            "acme/sim",
            &repo,
            &StaticIssues(vec![]),
            Arc::new(MockEmbeddingProvider::new(32)),
            Arc::new(MockBackend::new("summary")),
        )
        .await
        .unwrap();

    let session = store.get("acme/sim").unwrap();
    let retriever = Retriever::new(RetrievalConfig::default());
    let results = retriever.retrieve_with(&session, text, 3, 0.0).unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].chunk.text, text);
    assert!(results[0].score > 0.99);
}

/// Scenario: embedding fails for one of ten chunks; the session still
/// publishes with the other nine indexed
#[tokio::test]
async fn partial_embedding_failure_publishes_remainder() {
    let store = SessionStore::new();

    let units: Vec<(String, String)> = (0..10)
        .map(|i| {
            let marker = if i == 6 { "poison" } else { "clean" };
            (
                format!("src/file{}.rs", i),
                format!("fn item{}() {{ /* {} */ }}", i, marker),
            )
        })
        .collect();
    let unit_refs: Vec<(&str, &str)> = units
        .iter()
        .map(|(p, t)| (p.as_str(), t.as_str()))
        .collect();

    let outcome = ingestor()
        .ingest(
            &store,
            "acme/partial",
            &StaticRepo::new(&unit_refs),
            &StaticIssues(vec![]),
            Arc::new(MockEmbeddingProvider::new(32).failing_on("poison")),
            Arc::new(MockBackend::new("summary")),
        )
        .await
        .unwrap();

    assert_eq!(outcome.indexed_chunks, 9);
    assert_eq!(outcome.dropped_chunks, 1);

    let session = store.get("acme/partial").unwrap();
    assert_eq!(session.chunks.len(), 9);
    assert_eq!(session.index.len(), 9);
    assert!(!session
        .chunks
        .values()
        .any(|c| c.text.contains("poison")));
}

/// Over-threshold embedding failure aborts the ingestion: nothing is
/// published and the build claim is released
#[tokio::test]
async fn excessive_embedding_failure_aborts_without_publish() {
    let store = SessionStore::new();

    let units: Vec<(String, String)> = (0..10)
        .map(|i| {
            let marker = if i < 5 { "poison" } else { "clean" };
            (
                format!("src/file{}.rs", i),
                format!("fn item{}() {{ /* {} */ }}", i, marker),
            )
        })
        .collect();
    let unit_refs: Vec<(&str, &str)> = units
        .iter()
        .map(|(p, t)| (p.as_str(), t.as_str()))
        .collect();

    let err = ingestor()
        .ingest(
            &store,
            "acme/broken",
            &StaticRepo::new(&unit_refs),
            &StaticIssues(vec![]),
            Arc::new(MockEmbeddingProvider::new(32).failing_on("poison")),
            Arc::new(MockBackend::new("summary")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RepomindError::IngestFailed { .. }));
    assert!(matches!(
        store.get("acme/broken"),
        Err(SessionError::NotFound { .. })
    ));

    // The failed build released its claim; a clean retry succeeds
    let outcome = ingestor()
        .ingest(
            &store,
            "acme/broken",
            &StaticRepo::new(&unit_refs),
            &StaticIssues(vec![]),
            Arc::new(MockEmbeddingProvider::new(32)),
            Arc::new(MockBackend::new("summary")),
        )
        .await
        .unwrap();
    assert_eq!(outcome.dropped_chunks, 0);
}

/// Scenario: the backend hangs past its deadline on an answer call; the
/// caller sees a timeout error, never an empty answer
#[tokio::test]
async fn generation_timeout_surfaces_to_caller() {
    let store = SessionStore::new();

    let ingestor = Ingestor::new(
        ChunkingConfig::default(),
        EmbeddingConfig {
            max_retries: 1,
            retry_base_ms: 1,
            ..EmbeddingConfig::default()
        },
        GenerationConfig {
            timeout_secs: 1,
            max_retries: 1,
            retry_base_ms: 1,
            ..GenerationConfig::default()
        },
        IngestConfig::default(),
    );

    // The slow backend also makes the ingestion-time summary time out,
    // which degrades to a session without a summary
    let outcome = ingestor
        .ingest(
            &store,
            "acme/slow",
            &three_file_repo(),
            &StaticIssues(vec![issue(1, "Bug", "it breaks")]),
            Arc::new(MockEmbeddingProvider::new(32)),
            Arc::new(MockBackend::new("too late").with_delay_ms(1500)),
        )
        .await
        .unwrap();
    assert!(outcome.summary.is_none());

    let request = AnswerRequest {
        key: "acme/slow".to_string(),
        issue_id: 1,
        question: "why does it break?".to_string(),
    };
    let err = answer(
        &store,
        &request,
        &RetrievalConfig::default(),
        &GenerationConfig {
            timeout_secs: 1,
            max_retries: 1,
            retry_base_ms: 1,
            ..GenerationConfig::default()
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        RepomindError::Generation(GenerationError::Timeout { .. })
    ));
}

/// Scenario: cleanup releases the session; querying the key afterwards is
/// NotFound
#[tokio::test]
async fn cleanup_then_query_is_not_found() {
    let store = SessionStore::new();

    ingestor()
        .ingest(
            &store,
            "acme/gone",
            &three_file_repo(),
            &StaticIssues(vec![issue(1, "Bug", "body")]),
            Arc::new(MockEmbeddingProvider::new(32)),
            Arc::new(MockBackend::new("summary")),
        )
        .await
        .unwrap();

    store.remove("acme/gone").unwrap();

    let request = AnswerRequest {
        key: "acme/gone".to_string(),
        issue_id: 1,
        question: "anything".to_string(),
    };
    let err = answer(
        &store,
        &request,
        &RetrievalConfig::default(),
        &fast_generation_config(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        RepomindError::Session(SessionError::NotFound { .. })
    ));
}

/// Concurrent ingestion for the same key: exactly one build proceeds, the
/// other is rejected immediately and the winner's state is intact
#[tokio::test]
async fn concurrent_ingest_same_key_one_wins() {
    let store = Arc::new(SessionStore::new());

    let slow_store = Arc::clone(&store);
    let first = tokio::spawn(async move {
        ingestor()
            .ingest(
                &slow_store,
                "acme/contested",
                &three_file_repo().with_delay(300),
                &StaticIssues(vec![]),
                Arc::new(MockEmbeddingProvider::new(32)),
                Arc::new(MockBackend::new("first")),
            )
            .await
    });

    // Give the first build time to claim the key
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second = ingestor()
        .ingest(
            &store,
            "acme/contested",
            &three_file_repo(),
            &StaticIssues(vec![]),
            Arc::new(MockEmbeddingProvider::new(32)),
            Arc::new(MockBackend::new("second")),
        )
        .await;

    assert!(matches!(
        second,
        Err(RepomindError::Session(SessionError::AlreadyBuilding { .. }))
    ));

    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.summary.as_deref(), Some("first"));

    let session = store.get("acme/contested").unwrap();
    assert_eq!(session.chunks.len(), session.index.len());
}

/// Issue tracker failure is partial: ingestion proceeds without issues
#[tokio::test]
async fn issue_fetch_failure_tolerated() {
    let store = SessionStore::new();

    let outcome = ingestor()
        .ingest(
            &store,
            "acme/no-tracker",
            &three_file_repo(),
            &BrokenIssues,
            Arc::new(MockEmbeddingProvider::new(32)),
            Arc::new(MockBackend::new("summary")),
        )
        .await
        .unwrap();

    assert!(outcome.issues.is_empty());
    assert!(outcome.indexed_chunks > 0);
}

/// Non-decodable source units are skipped, not fatal
#[tokio::test]
async fn binary_unit_skipped() {
    let store = SessionStore::new();

    struct MixedRepo;

    #[async_trait]
    impl RepositoryFetcher for MixedRepo {
        async fn fetch_units(&self) -> Result<Vec<SourceUnit>, FetchError> {
            Ok(vec![
                SourceUnit {
                    path: "good.rs".to_string(),
                    bytes: b"fn main() {}".to_vec(),
                },
                SourceUnit {
                    path: "bad.bin".to_string(),
                    bytes: vec![0xff, 0xfe, 0x00, 0x01],
                },
            ])
        }
    }

    let outcome = ingestor()
        .ingest(
            &store,
            "acme/mixed",
            &MixedRepo,
            &StaticIssues(vec![]),
            Arc::new(MockEmbeddingProvider::new(32)),
            Arc::new(MockBackend::new("summary")),
        )
        .await
        .unwrap();

    assert_eq!(outcome.skipped_units, 1);
    assert_eq!(outcome.indexed_chunks, 1);
}

/// Repository fetch failure aborts the ingestion and publishes nothing
#[tokio::test]
async fn fetch_failure_aborts_ingestion() {
    let store = SessionStore::new();

    struct MissingRepo;

    #[async_trait]
    impl RepositoryFetcher for MissingRepo {
        async fn fetch_units(&self) -> Result<Vec<SourceUnit>, FetchError> {
            Err(FetchError::NotFound {
                path: "git://example/missing".to_string(),
            })
        }
    }

    let err = ingestor()
        .ingest(
            &store,
            "acme/missing",
            &MissingRepo,
            &StaticIssues(vec![]),
            Arc::new(MockEmbeddingProvider::new(32)),
            Arc::new(MockBackend::new("summary")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RepomindError::Fetch(_)));
    assert!(store.get("acme/missing").is_err());

    // Claim released: the key is immediately buildable again
    assert!(store.begin_build("acme/missing").is_ok());
}

/// The assembled answer prompt respects the backend's declared budget and
/// keeps the contract ordering
#[tokio::test]
async fn answer_prompt_bounded_and_ordered() {
    let store = SessionStore::new();

    let backend = Arc::new(
        MockBackend::new("grounded answer").with_budget(PromptBudget::chars(900)),
    );

    ingestor()
        .ingest(
            &store,
            "acme/budget",
            &three_file_repo(),
            &StaticIssues(vec![issue(3, "Panic on empty input", "parse panics")]),
            Arc::new(MockEmbeddingProvider::new(32)),
            backend.clone(),
        )
        .await
        .unwrap();

    let request = AnswerRequest {
        key: "acme/budget".to_string(),
        issue_id: 3,
        question: "where is the panic?".to_string(),
    };
    let text = answer(
        &store,
        &request,
        &RetrievalConfig::default(),
        &fast_generation_config(),
    )
    .await
    .unwrap();
    assert_eq!(text, "grounded answer");

    let prompts = backend.received_prompts();
    // Prompt 0 is the ingestion summary; prompt 1 is the answer
    let answer_prompt = prompts.last().unwrap();
    assert!(answer_prompt.chars().count() <= 900);

    let title_pos = answer_prompt.find("Panic on empty input").unwrap();
    let question_pos = answer_prompt.find("where is the panic?").unwrap();
    assert!(title_pos < question_pos);
}
