//! CLI definitions for Recall.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

const EMBEDDING_HELP: &str = "\
Semantic search needs an embedding provider. The default `local` provider
only works in builds made with `--features local-embeddings`; otherwise set
`[embedding] provider = \"hash\"` or `\"openai\"` in the config file.
Without one, memories are stored and searched lexically.";

/// Recall CLI.
#[derive(Parser)]
#[command(name = "recall")]
#[command(about = "Hybrid memory retrieval engine")]
#[command(version)]
#[command(after_help = EMBEDDING_HELP)]
pub(crate) struct Cli {
    /// Configuration file path (default: ~/.recall/config.toml)
    #[arg(short, long, global = true, env = "RECALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Store a new memory
    Add {
        /// Memory text
        content: String,

        /// Importance between 0 and 1 (clamped)
        #[arg(short, long, default_value_t = 0.5)]
        importance: f32,

        /// Memory type (general, fact, preference, event, or any tag)
        #[arg(short = 't', long = "type", default_value = "general")]
        memory_type: String,

        /// Where the memory came from
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Show a memory by id (counts as an access)
    Get {
        id: i64,
    },

    /// Delete a memory by id
    Delete {
        id: i64,
    },

    /// List the newest memories
    Recent {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Remove old, unimportant memories
    Prune {
        /// Age threshold in days (default from config)
        #[arg(long)]
        older_than_days: Option<u32>,

        /// Importance ceiling (default from config)
        #[arg(long)]
        importance_below: Option<f32>,
    },

    /// Search memories
    Search {
        query: String,

        #[arg(short, long, value_enum, default_value_t = SearchMode::Hybrid)]
        mode: SearchMode,

        /// Maximum results (default from config)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Vector share of the hybrid score (default from config)
        #[arg(long)]
        vector_weight: Option<f64>,
    },

    /// Show store statistics
    Stats,

    /// Embed memories stored without a vector
    Backfill {
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum SearchMode {
    Lexical,
    Vector,
    Hybrid,
}
