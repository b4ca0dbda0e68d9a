use std::path::{Path, PathBuf};
use std::sync::Arc;

use repomind::cli::{Cli, Commands, ConfigAction};
use repomind::config::Config;
use repomind::embedding::{EmbeddingProvider, FastEmbedProvider};
use repomind::error::{RepomindError, Result};
use repomind::generation::{build_backend, BackendKind, GenerationBackend};
use repomind::ingest::{Ingestor, JsonIssueSource, LocalRepoFetcher, NoIssues};
use repomind::query::{answer, AnswerRequest};
use repomind::session::SessionStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    // Parse CLI arguments
    let cli = Cli::parse_args();
    let config = load_config(cli.config.clone())?;

    // Sessions live for the lifetime of this process; there is no
    // cross-restart persistence
    let store = SessionStore::new();

    match cli.command {
        Commands::Ingest {
            path,
            key,
            backend,
            issues,
            json,
        } => {
            cmd_ingest(&config, &store, &path, key, backend, issues, json).await?;
        }
        Commands::Ask {
            question,
            key,
            issue,
            repo,
            issues,
        } => {
            cmd_ask(&config, &store, &question, &key, issue, repo, issues).await?;
        }
        Commands::Summary { key } => {
            cmd_summary(&store, &key)?;
        }
        Commands::Sessions { json } => {
            cmd_sessions(&store, json)?;
        }
        Commands::Cleanup { key } => {
            store.remove(&key)?;
            println!("✓ Session released: {}", key);
        }
        Commands::Backends => {
            cmd_backends(&config);
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("repomind=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::debug!(
            "Config file not found, using defaults. Run 'repomind config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}

fn session_key_for(path: &Path, key: Option<String>) -> String {
    key.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "repository".to_string())
    })
}

fn select_backend(
    config: &Config,
    flag: Option<String>,
) -> Result<(BackendKind, Arc<dyn GenerationBackend>)> {
    let kind = match flag {
        Some(name) => name
            .parse::<BackendKind>()
            .map_err(RepomindError::Config)?,
        None => config.generation.backend,
    };
    let backend = build_backend(kind, &config.generation)?;
    Ok((kind, backend))
}

async fn run_ingest(
    config: &Config,
    store: &SessionStore,
    path: &Path,
    key: &str,
    backend_flag: Option<String>,
    issues: Option<PathBuf>,
) -> Result<repomind::ingest::IngestOutcome> {
    let (kind, backend) = select_backend(config, backend_flag)?;
    tracing::info!("Using {} backend for session {}", kind, key);

    let provider: Arc<dyn EmbeddingProvider> =
        Arc::new(FastEmbedProvider::new(&config.embedding.model)?);

    let fetcher = LocalRepoFetcher::new(path, config.ingest.max_file_size);
    let ingestor = Ingestor::new(
        config.chunking.clone(),
        config.embedding.clone(),
        config.generation.clone(),
        config.ingest.clone(),
    );

    match issues {
        Some(file) => {
            let source = JsonIssueSource::new(file, key);
            ingestor
                .ingest(store, key, &fetcher, &source, provider, backend)
                .await
        }
        None => {
            ingestor
                .ingest(store, key, &fetcher, &NoIssues, provider, backend)
                .await
        }
    }
}

async fn cmd_ingest(
    config: &Config,
    store: &SessionStore,
    path: &Path,
    key: Option<String>,
    backend: Option<String>,
    issues: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let key = session_key_for(path, key);
    let outcome = run_ingest(config, store, path, &key, backend, issues).await?;

    if json {
        let payload = serde_json::json!({
            "key": outcome.key,
            "summary": outcome.summary,
            "issues": outcome.issues,
            "indexed_chunks": outcome.indexed_chunks,
            "dropped_chunks": outcome.dropped_chunks,
        });
        println!("{}", serde_json::to_string_pretty(&payload).map_err(|e| {
            RepomindError::Json {
                source: e,
                context: "Failed to serialize ingest outcome".to_string(),
            }
        })?);
        return Ok(());
    }

    println!("✓ Ingested session: {}", outcome.key);
    println!(
        "  Chunks indexed: {} ({} dropped, {} units skipped)",
        outcome.indexed_chunks, outcome.dropped_chunks, outcome.skipped_units
    );
    println!("  Issues: {}", outcome.issues.len());
    for issue in &outcome.issues {
        println!("    #{}: {}", issue.id, issue.title);
    }
    match &outcome.summary {
        Some(summary) => println!("\n{}", summary),
        None => println!("  (no summary generated)"),
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_ask(
    config: &Config,
    store: &SessionStore,
    question: &str,
    key: &str,
    issue: u64,
    repo: Option<PathBuf>,
    issues: Option<PathBuf>,
) -> Result<()> {
    // Sessions are process-scoped; ingest on demand when a repo path is given
    if store.get(key).is_err() {
        match repo {
            Some(path) => {
                run_ingest(config, store, &path, key, None, issues).await?;
            }
            None => {
                return Err(RepomindError::Session(
                    repomind::session::SessionError::NotFound {
                        key: key.to_string(),
                    },
                ));
            }
        }
    }

    let request = AnswerRequest {
        key: key.to_string(),
        issue_id: issue,
        question: question.to_string(),
    };

    let text = answer(store, &request, &config.retrieval, &config.generation).await?;
    println!("{}", text);
    Ok(())
}

fn cmd_summary(store: &SessionStore, key: &str) -> Result<()> {
    match repomind::query::summary(store, key)? {
        Some(text) => println!("{}", text),
        None => println!("(no summary was generated for this session)"),
    }
    Ok(())
}

fn cmd_sessions(store: &SessionStore, json: bool) -> Result<()> {
    let sessions = store.list();

    if json {
        let text = serde_json::to_string_pretty(&sessions).map_err(|e| RepomindError::Json {
            source: e,
            context: "Failed to serialize session list".to_string(),
        })?;
        println!("{}", text);
        return Ok(());
    }

    println!("Sessions: {} total", sessions.len());
    for info in sessions {
        println!(
            "  {} - {} chunks, {} issues, backend {} ({})",
            info.key,
            info.chunk_count,
            info.issue_count,
            info.backend,
            info.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn cmd_backends(config: &Config) {
    println!("Available generation backends:");
    for kind in BackendKind::ALL {
        let marker = if kind == config.generation.backend {
            " (default)"
        } else {
            ""
        };
        println!("  {}{}", kind, marker);
    }
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| RepomindError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RepomindError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}
