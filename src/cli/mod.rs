//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "repomind",
    version,
    about = "Repository-grounded Q&A with semantic retrieval",
    long_about = "Repomind ingests a repository and its issue threads, builds a semantic \
                  search index over the content, and grounds generation backend answers \
                  in the most relevant source snippets and issue context."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/repomind/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a repository: chunk, embed, index, and summarize it
    Ingest {
        /// Path to the repository checkout
        path: PathBuf,

        /// Session key (defaults to the repository directory name)
        #[arg(short, long)]
        key: Option<String>,

        /// Generation backend for this session (gemini or groq)
        #[arg(short, long)]
        backend: Option<String>,

        /// Issues JSON file exported from the tracker
        #[arg(long)]
        issues: Option<PathBuf>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask a grounded question about an ingested repository issue
    Ask {
        /// Question to ask
        question: String,

        /// Session key of the ingested repository
        #[arg(short, long)]
        key: String,

        /// Issue id the question is about
        #[arg(short, long)]
        issue: u64,

        /// Repository path, to ingest first when the session is missing
        #[arg(long)]
        repo: Option<PathBuf>,

        /// Issues JSON file, used together with --repo
        #[arg(long)]
        issues: Option<PathBuf>,
    },

    /// Print the cached summary of an ingested repository
    Summary {
        /// Session key
        key: String,
    },

    /// List published sessions
    Sessions {
        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Release a session and everything it owns
    Cleanup {
        /// Session key
        key: String,
    },

    /// List available generation backends
    Backends,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
