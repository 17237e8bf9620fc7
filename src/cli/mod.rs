//! CLI command definitions and parsing
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hybrid-rag",
    version,
    author = "neur0map",
    about = "Hybrid dense + sparse retrieval with score fusion",
    long_about = "hybrid-rag searches a JSON corpus with an embedding retriever and a BM25 keyword \
                  retriever, fuses their rankings, and evaluates or tunes the fusion against \
                  labeled queries."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/hybrid-rag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    Rrf,
    // Same spelling as the config file
    #[value(name = "weighted_sum")]
    WeightedSum,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search a corpus with hybrid retrieval
    Search {
        /// Search query text
        query: String,

        /// JSON array of {"id", "text"} documents
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// Maximum number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Fusion method (defaults to the configured one)
        #[arg(short, long, value_enum)]
        method: Option<MethodArg>,

        /// Use the multi-stage sparse-then-dense refiner
        #[arg(long)]
        staged: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Evaluate retrieval quality against labeled queries
    Evaluate {
        /// JSON array of {"id", "text"} documents
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// JSON array of {"query", "relevant": [ids]} entries
        #[arg(long, value_name = "FILE")]
        queries: PathBuf,

        /// Also evaluate optimized weights and the multi-stage refiner
        #[arg(long)]
        optimized: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Grid-search the dense/sparse fusion weights
    Optimize {
        /// JSON array of {"id", "text"} documents
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// JSON array of {"query", "relevant": [ids]} entries
        #[arg(long, value_name = "FILE")]
        queries: PathBuf,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

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
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "hybrid-rag",
            "search",
            "neural networks",
            "--corpus",
            "docs.json",
            "-k",
            "3",
            "--method",
            "weighted_sum",
            "--staged",
        ])
        .unwrap();

        match cli.command {
            Commands::Search {
                query,
                top_k,
                method,
                staged,
                ..
            } => {
                assert_eq!(query, "neural networks");
                assert_eq!(top_k, Some(3));
                assert_eq!(method, Some(MethodArg::WeightedSum));
                assert!(staged);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_method_uses_config_spelling() {
        let parse = |method: &str| {
            Cli::try_parse_from([
                "hybrid-rag",
                "search",
                "q",
                "--corpus",
                "docs.json",
                "--method",
                method,
            ])
        };

        assert!(parse("rrf").is_ok());
        assert!(parse("weighted_sum").is_ok());
        assert!(parse("weighted-sum").is_err());
    }
}
