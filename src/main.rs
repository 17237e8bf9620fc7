use hybrid_rag::cache::{
    CacheBackend, CachedSearcher, MemoryCacheBackend, SqliteCacheBackend,
};
use hybrid_rag::cli::{Cli, Commands, ConfigAction, MethodArg};
use hybrid_rag::config::{CacheBackendKind, Config, ConfigValidator};
use hybrid_rag::corpus::{load_documents, load_labeled_queries, split_labeled};
use hybrid_rag::embedding::{DenseRetriever, FastEmbedProvider, KeywordIndex, SparseRetriever};
use hybrid_rag::evaluation::{comparison_table, evaluate, optimize_fusion_weights};
use hybrid_rag::monitor::{MonitoredSearcher, PerformanceMonitor};
use hybrid_rag::retrieval::{
    FusionConfig, FusionMethod, HybridSearcher, MultiStageSearcher, SearchQuery, Searcher,
};
use hybrid_rag::{RagError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Search {
            query,
            corpus,
            top_k,
            method,
            staged,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_search(&config, &query, &corpus, top_k, method, staged, json).await?;
        }
        Commands::Evaluate {
            corpus,
            queries,
            optimized,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_evaluate(&config, &corpus, &queries, optimized, json).await?;
        }
        Commands::Optimize {
            corpus,
            queries,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_optimize(&config, &corpus, &queries, json).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if verbose {
        "hybrid_rag=debug"
    } else {
        "hybrid_rag=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Retrievers and orchestrator over one indexed corpus
struct Engine {
    hybrid: Arc<HybridSearcher>,
    dense: Arc<DenseRetriever>,
}

impl Engine {
    async fn build(config: &Config, corpus: &Path) -> Result<Self> {
        let documents = load_documents(corpus)?;

        let provider = FastEmbedProvider::new(&config.embedding.model, config.embedding.batch_size)
            .map_err(|e| RagError::Other(e.into()))?;
        let dense = Arc::new(DenseRetriever::new("dense", Arc::new(provider)));

        let keyword_index =
            KeywordIndex::in_memory(config.sparse.fuzziness).map_err(|e| RagError::Other(e.into()))?;
        let sparse = Arc::new(SparseRetriever::new("sparse", keyword_index));

        let hybrid = Arc::new(HybridSearcher::new(
            dense.clone(),
            sparse,
            config.search_timeout(),
        ));
        hybrid.index_documents(documents).await?;

        Ok(Self { hybrid, dense })
    }

    fn staged(&self, config: &Config) -> Result<Arc<MultiStageSearcher>> {
        Ok(Arc::new(MultiStageSearcher::from_hybrid(
            &self.hybrid,
            self.dense.clone(),
            config.staging,
        )?))
    }
}

/// Wrap a searcher with the configured cache, if enabled
fn with_cache(config: &Config, searcher: Arc<dyn Searcher>) -> Result<Arc<dyn Searcher>> {
    if !config.cache.enabled {
        return Ok(searcher);
    }

    let backend: Arc<dyn CacheBackend> = match config.cache.backend {
        CacheBackendKind::Memory => Arc::new(MemoryCacheBackend::new()),
        CacheBackendKind::Sqlite => Arc::new(
            SqliteCacheBackend::open(&config.cache.path).map_err(|e| RagError::Other(e.into()))?,
        ),
    };

    Ok(Arc::new(
        CachedSearcher::new(searcher, backend, config.cache_ttl())
            .with_io_timeout(config.cache_io_timeout()),
    ))
}

#[derive(Serialize)]
struct SearchHit {
    rank: usize,
    id: String,
    score: f64,
    text: String,
}

async fn cmd_search(
    config: &Config,
    query: &str,
    corpus: &Path,
    top_k: Option<usize>,
    method: Option<MethodArg>,
    staged: bool,
    json: bool,
) -> Result<()> {
    let engine = Engine::build(config, corpus).await?;

    let mut fusion = config.fusion_config()?;
    if let Some(method) = method {
        fusion.method = match method {
            MethodArg::Rrf => FusionMethod::Rrf,
            MethodArg::WeightedSum => FusionMethod::WeightedSum,
        };
    }

    let base: Arc<dyn Searcher> = if staged {
        engine.staged(config)?
    } else {
        engine.hybrid.clone()
    };
    let monitor = Arc::new(PerformanceMonitor::new());
    let searcher = MonitoredSearcher::new(with_cache(config, base)?, monitor.clone());

    let request = SearchQuery::new(query, top_k.unwrap_or(config.search.top_k)).with_fusion(fusion);
    let response = searcher.search(&request).await?;

    let ids = response.results.ids();
    let texts = engine.hybrid.get_documents_by_indices(&ids).await?;

    let hits: Vec<SearchHit> = response
        .results
        .into_iter()
        .zip(texts)
        .enumerate()
        .map(|(rank, (item, text))| SearchHit {
            rank: rank + 1,
            id: item.id,
            score: item.score,
            text,
        })
        .collect();

    if json {
        let output = serde_json::to_string_pretty(&hits).map_err(|e| RagError::Json {
            source: e,
            context: "Failed to serialize search results".to_string(),
        })?;
        println!("{}", output);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results for: {}", query);
        return Ok(());
    }

    println!("Results for: {}", query);
    println!();
    for hit in &hits {
        println!("{:>3}. [{}] score={:.4}", hit.rank, hit.id, hit.score);
        println!("     {}", snippet(&hit.text, 160));
    }

    let report = monitor.get_performance_report();
    tracing::info!(
        "Search took {:.1} ms",
        report.average_response_time_ms
    );

    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

async fn cmd_evaluate(
    config: &Config,
    corpus: &Path,
    queries: &Path,
    optimized: bool,
    json: bool,
) -> Result<()> {
    let engine = Engine::build(config, corpus).await?;
    let labeled = load_labeled_queries(queries)?;
    let (texts, relevance_sets) = split_labeled(&labeled);
    let k_values = &config.evaluation.k_values;

    let monitor = Arc::new(PerformanceMonitor::new());
    let hybrid = MonitoredSearcher::new(
        with_cache(config, engine.hybrid.clone())?,
        monitor.clone(),
    );

    let base_fusion = config.fusion_config()?;
    let base = evaluate(&hybrid, &texts, &relevance_sets, k_values, &base_fusion).await?;

    if !optimized {
        if json {
            print_json(&base)?;
        } else {
            println!("Evaluation results ({} queries):", texts.len());
            println!();
            print!("{}", base.to_table());
        }
        return Ok(());
    }

    println!("Optimizing fusion weights...");
    let weighted = tuning_base(&base_fusion);
    let best = optimize_fusion_weights(
        &hybrid,
        &texts,
        &relevance_sets,
        config.weight_range(),
        &weighted,
    )
    .await?;
    println!(
        "Best fusion weights found: dense={:.2}, sparse={:.2}",
        best.dense_weight, best.sparse_weight
    );

    let tuned_fusion = best.apply_to(&weighted)?;
    let tuned = evaluate(&hybrid, &texts, &relevance_sets, k_values, &tuned_fusion).await?;

    let staged = MonitoredSearcher::new(
        with_cache(config, engine.staged(config)?)?,
        monitor.clone(),
    );
    let multistage = evaluate(&staged, &texts, &relevance_sets, k_values, &tuned_fusion).await?;

    if json {
        #[derive(Serialize)]
        struct Comparison<'a> {
            base: &'a hybrid_rag::evaluation::EvaluationReport,
            optimized: &'a hybrid_rag::evaluation::EvaluationReport,
            multistage: &'a hybrid_rag::evaluation::EvaluationReport,
            weights: (f64, f64),
        }
        return print_json(&Comparison {
            base: &base,
            optimized: &tuned,
            multistage: &multistage,
            weights: (best.dense_weight, best.sparse_weight),
        });
    }

    println!();
    println!("Evaluation results comparison:");
    println!();
    print!(
        "{}",
        comparison_table(&[
            ("Base Hybrid", &base),
            ("Optimized Hybrid", &tuned),
            ("MultiStage Hybrid", &multistage),
        ])
    );

    let report = monitor.get_performance_report();
    println!();
    println!(
        "{} searches, avg {:.1} ms, cache hit rate {:.1}%",
        report.total_queries,
        report.average_response_time_ms,
        report.cache_hit_rate * 100.0
    );

    Ok(())
}

/// Weights only affect weighted-sum fusion, so tuning always uses it
fn tuning_base(fusion: &FusionConfig) -> FusionConfig {
    FusionConfig {
        method: FusionMethod::WeightedSum,
        ..fusion.clone()
    }
}

async fn cmd_optimize(config: &Config, corpus: &Path, queries: &Path, json: bool) -> Result<()> {
    let engine = Engine::build(config, corpus).await?;
    let labeled = load_labeled_queries(queries)?;
    let (texts, relevance_sets) = split_labeled(&labeled);

    let searcher = with_cache(config, engine.hybrid.clone())?;
    let result = optimize_fusion_weights(
        &searcher,
        &texts,
        &relevance_sets,
        config.weight_range(),
        &tuning_base(&config.fusion_config()?),
    )
    .await?;

    if json {
        return print_json(&result);
    }

    println!("| Dense | Sparse | Mean precision |");
    println!("|-------|--------|----------------|");
    for trial in &result.trials {
        println!(
            "| {:.1} | {:.1} | {:.4} |",
            trial.dense_weight, trial.sparse_weight, trial.mean_precision
        );
    }
    println!();
    println!(
        "✓ Optimal weights: dense={:.2}, sparse={:.2} (mean precision {:.4})",
        result.dense_weight, result.sparse_weight, result.best_score
    );

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).map_err(|e| RagError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", output);
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let content = toml::to_string_pretty(&config)?;
            println!("{}", content);
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

            // Save default config
            let config = Config::default();
            ConfigValidator::validate(&config)?;
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'hybrid-rag config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
