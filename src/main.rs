mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use strata_agents::Orchestrator;
use strata_core::config::{AppConfig, ModelConfig};
use strata_core::types::AnalysisRequest;
use strata_llm::{CredentialPool, FailoverClient};
use strata_store::{KnowledgeBase, ResponseCache, SqliteCacheBackend};

#[derive(Parser)]
#[command(name = "strata", version, about = "Cross-layer upgrade impact analysis")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "strata.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a platform transition and cascade the impacts layer by layer
    Analyze {
        /// Version or release upgrading from
        from: String,
        /// Version or release upgrading to
        to: String,
        /// Workload running on the platform (defaults from config)
        #[arg(long)]
        workload: Option<String>,
        /// Skip the response cache for this run
        #[arg(long)]
        no_cache: bool,
        /// Print the full report as JSON instead of text
        #[arg(long)]
        json: bool,
        /// Save the markdown report under the configured reports directory
        #[arg(long)]
        save: bool,
        /// Write the markdown report to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the specialist dependency graph
    Graph,
    /// Manage the knowledge base the specialists ground their analysis in
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },
    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum KbAction {
    /// Ingest a file or a directory of release notes (md, markdown, txt)
    Add {
        /// File or directory to ingest
        path: PathBuf,
        /// Category label stored with the documents
        #[arg(long, default_value = "general")]
        category: String,
    },
    /// List ingested documents
    List,
    /// Remove a document and its index entries
    Remove {
        /// Document id (see `strata kb list`)
        id: i64,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Drop every cached analysis
    Clear,
    /// Drop the cached analysis for one transition
    Invalidate {
        /// Version or release upgrading from
        from: String,
        /// Version or release upgrading to
        to: String,
        /// Workload the cached run was keyed under (defaults from config)
        #[arg(long)]
        workload: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strata=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Analyze {
            from,
            to,
            workload,
            no_cache,
            json,
            save,
            output,
        } => {
            let workload =
                workload.unwrap_or_else(|| config.analysis.default_workload.clone());
            let request = AnalysisRequest::new(from, to).with_workload(workload);

            let orchestrator = build_orchestrator(&config, !no_cache)?;
            let report = orchestrator.analyze(&request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", render::console_report(&report));
            }
            if let Some(path) = output {
                std::fs::write(&path, render::markdown_report(&report))?;
                println!("Report written to {}", path.display());
            }
            if save {
                let path = render::save_report(&report, &config.reports_dir())?;
                println!("Report saved to {}", path.display());
            }
        }
        Commands::Graph => {
            let orchestrator = build_orchestrator(&config, false)?;
            println!("{}", orchestrator.registry().render_graph());
        }
        Commands::Kb { action } => handle_kb(&config, action)?,
        Commands::Cache { action } => handle_cache(&config, action)?,
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    // Check for config in the home directory before falling back to env vars
    if let Some(home) = dirs_home() {
        let home_config = home.join(".strata").join("config.toml");
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }

    eprintln!("Warning: No config file found. Set ANTHROPIC_API_KEY or create strata.toml");
    eprintln!("See strata.toml.example for reference.");
    Ok(create_env_config()?)
}

fn create_env_config() -> strata_core::Result<AppConfig> {
    let config = AppConfig {
        analysis: Default::default(),
        model: ModelConfig {
            provider: "anthropic".to_string(),
            model_id: "claude-sonnet-4-20250514".to_string(),
            api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            fallback_api_keys: Vec::new(),
            base_url: None,
            max_tokens: 4096,
            temperature: 0.1,
            request_timeout_secs: 120,
        },
        cache: Default::default(),
        knowledge: Default::default(),
    };
    config.validate()?;
    Ok(config)
}

fn build_orchestrator(config: &AppConfig, use_cache: bool) -> anyhow::Result<Orchestrator> {
    let knowledge = Arc::new(KnowledgeBase::open(
        &config.knowledge_path(),
        config.knowledge.chunk_chars,
        config.knowledge.search_limit,
    )?);

    let cache = if use_cache && config.cache.enabled {
        let backend = SqliteCacheBackend::open(&config.cache_path())?;
        Some(ResponseCache::new(Box::new(backend)))
    } else {
        None
    };

    let credentials = CredentialPool::from_config(&config.model).len();
    let llm = Arc::new(FailoverClient::from_config(&config.model));
    info!(
        provider = %config.model.provider,
        model = %config.model.model_id,
        credentials,
        "Reasoning backend ready"
    );

    Ok(Orchestrator::new(config, llm, knowledge, cache)?)
}

fn handle_kb(config: &AppConfig, action: KbAction) -> anyhow::Result<()> {
    let kb = KnowledgeBase::open(
        &config.knowledge_path(),
        config.knowledge.chunk_chars,
        config.knowledge.search_limit,
    )?;

    match action {
        KbAction::Add { path, category } => {
            if path.is_dir() {
                let count = kb.ingest_dir(&path, &category)?;
                println!("Ingested {} document(s) from {}", count, path.display());
            } else {
                let chunks = kb.ingest_file(&path, &category)?;
                println!("Ingested {} ({} chunks)", path.display(), chunks);
            }
        }
        KbAction::List => {
            let docs = kb.list_documents()?;
            if docs.is_empty() {
                println!("No documents yet. Add release notes with `strata kb add <path>`.");
            } else {
                println!("{:<6} {:<14} {:<8} {}", "id", "category", "chunks", "filename");
                for doc in docs {
                    println!(
                        "{:<6} {:<14} {:<8} {}",
                        doc.id, doc.category, doc.chunks, doc.filename
                    );
                }
            }
        }
        KbAction::Remove { id } => {
            if kb.remove_document(id)? {
                println!("Removed document {}", id);
            } else {
                println!("No document with id {}", id);
            }
        }
    }
    Ok(())
}

fn handle_cache(config: &AppConfig, action: CacheAction) -> anyhow::Result<()> {
    let cache = ResponseCache::new(Box::new(SqliteCacheBackend::open(&config.cache_path())?));

    match action {
        CacheAction::Clear => {
            let count = cache.len()?;
            cache.clear()?;
            println!("Cleared {} cached analysis entries", count);
        }
        CacheAction::Invalidate { from, to, workload } => {
            let workload =
                workload.unwrap_or_else(|| config.analysis.default_workload.clone());
            let request = AnalysisRequest::new(from, to).with_workload(workload);
            cache.invalidate(&request.cache_key())?;
            println!(
                "Invalidated {} -> {} ({})",
                request.from_version, request.to_version, request.workload
            );
        }
    }
    Ok(())
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
