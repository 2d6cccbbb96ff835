// ── Engram CLI ─────────────────────────────────────────────────────────────
//
// Thin command-line front end over `MemorySubsystem`. Every command prints
// JSON on stdout; logs go to stderr via env_logger (RUST_LOG overrides the
// default `info` filter).

use clap::{Parser, Subcommand, ValueEnum};
use log::error;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use engram_memory::{
    ContextSnapshot, EngineResult, MemoryConfig, MemoryMetadata, MemorySubsystem, MemoryType,
    NewMemory, RetrievalFilters, RetrievalRequest, RetrievalStrategy,
};

#[derive(Parser)]
#[command(name = "engram")]
#[command(about = "Store, recall and maintain agent memories")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, env = "ENGRAM_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides `store.path`).
    #[arg(long, global = true, env = "ENGRAM_DB")]
    db: Option<PathBuf>,

    /// Hashing embedder, no network calls.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new memory
    Store {
        content: String,
        #[arg(long)]
        owner: String,
        #[arg(long = "type", default_value = "interaction")]
        memory_type: MemoryType,
        #[arg(long, default_value = "")]
        agent: String,
        /// Context level of the producing state (0.0-1.0).
        #[arg(long)]
        level: Option<f64>,
        /// Context tag of the producing state.
        #[arg(long, requires = "level")]
        tag: Option<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Rank memories for a query
    Recall {
        query: String,
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "hybrid")]
        strategy: RetrievalStrategy,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
        /// Restrict to these memory types (repeatable).
        #[arg(long = "type")]
        types: Vec<MemoryType>,
    },
    /// Assemble a token-bounded context block
    Context {
        query: String,
        #[arg(long)]
        owner: String,
        #[arg(long, default_value_t = 1024)]
        budget: usize,
        /// Print the prompt-ready text instead of JSON.
        #[arg(long)]
        text: bool,
    },
    /// Run lifecycle cycles once
    Sweep {
        #[arg(long, value_enum, default_value_t = Cycle::All)]
        cycle: Cycle,
    },
    /// Probe every component
    Health,
    /// Counters and latency percentiles for this process
    Metrics,
    /// Audit trail of one memory, or every memory of an owner
    Audit {
        memory_id: Option<String>,
        #[arg(long, conflicts_with = "memory_id")]
        owner: Option<String>,
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Record and concept counts
    Stats,
    /// Embed records that were stored without a vector
    Backfill {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Cycle {
    Decay,
    Consolidation,
    Archival,
    All,
}

fn load_config(cli: &Cli) -> EngineResult<MemoryConfig> {
    let mut config = match &cli.config {
        Some(path) => MemoryConfig::load(path)?,
        None if cli.offline => MemoryConfig::offline(),
        None => MemoryConfig::default(),
    };
    if cli.offline {
        let offline = MemoryConfig::offline();
        config.embedding = offline.embedding;
    }
    if let Some(db) = &cli.db {
        config.store.path = Some(db.clone());
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> EngineResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> EngineResult<()> {
    let config = load_config(&cli)?;
    let subsystem = MemorySubsystem::from_config(config)?;

    match cli.command {
        Commands::Store { content, owner, memory_type, agent, level, tag, session } => {
            let mut input = NewMemory::new(content, memory_type, owner).agent(agent);
            if let Some(level) = level {
                input = input.context(ContextSnapshot::new(level, tag.unwrap_or_default()));
            }
            if session.is_some() {
                input = input.metadata(MemoryMetadata { session_id: session, ..Default::default() });
            }
            let memory_id = subsystem.store(input).await?;
            print_json(&serde_json::json!({ "memory_id": memory_id }))?;
        }
        Commands::Recall { query, owner, strategy, limit, min_score, types } => {
            let limit = limit.unwrap_or(subsystem.config().retrieval.default_limit);
            let request = RetrievalRequest::new(query, owner)
                .strategy(strategy)
                .limit(limit)
                .min_score(min_score)
                .filters(RetrievalFilters::default().with_types(types));
            let results = subsystem.retrieve(request).await?;
            print_json(&results)?;
        }
        Commands::Context { query, owner, budget, text } => {
            let payload = subsystem.build_context(&query, &owner, None, budget).await?;
            if text {
                println!("{}", payload.render());
            } else {
                println!("{}", payload.to_json()?);
            }
        }
        Commands::Sweep { cycle } => match cycle {
            Cycle::Decay => print_json(&subsystem.run_decay_cycle().await?)?,
            Cycle::Consolidation => print_json(&subsystem.run_consolidation_cycle().await?)?,
            Cycle::Archival => print_json(&subsystem.run_archival_cycle().await?)?,
            Cycle::All => print_json(&subsystem.run_sweep().await?)?,
        },
        Commands::Health => print_json(&subsystem.health_check().await)?,
        Commands::Metrics => print_json(&subsystem.metrics())?,
        Commands::Audit { memory_id, owner, limit } => match (memory_id, owner) {
            (Some(id), _) => print_json(&subsystem.audit_record(&id).await?)?,
            (None, Some(owner)) => print_json(&subsystem.audit_list(&owner, limit).await?)?,
            (None, None) => print_json(&subsystem.audit_log(limit).await?)?,
        },
        Commands::Stats => print_json(&subsystem.stats().await?)?,
        Commands::Backfill { limit } => {
            let embedded = subsystem.backfill_embeddings(limit).await?;
            print_json(&serde_json::json!({ "embedded": embedded }))?;
        }
    }

    // Access-stat writes run in the background; flush them before exit.
    subsystem.settle_access_updates().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[engram] {}", e);
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_recall_with_types() {
        let cli = Cli::try_parse_from([
            "engram", "--offline", "recall", "alpha", "--owner", "o1", "--strategy", "keyword",
            "--type", "reflection", "--type", "system",
        ])
        .unwrap();
        match cli.command {
            Commands::Recall { strategy, types, .. } => {
                assert_eq!(strategy, RetrievalStrategy::Keyword);
                assert_eq!(types, vec![MemoryType::Reflection, MemoryType::System]);
            }
            _ => panic!("expected recall"),
        }
    }

    #[test]
    fn offline_flag_swaps_embedder_only() {
        let cli = Cli::try_parse_from(["engram", "--offline", "--db", "/tmp/x.db", "stats"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.embedding.model, "hash-256");
        assert_eq!(config.store.path, Some(PathBuf::from("/tmp/x.db")));
    }

    #[test]
    fn unknown_memory_type_is_rejected() {
        let parsed = Cli::try_parse_from(["engram", "store", "x", "--owner", "o", "--type", "dream"]);
        assert!(parsed.is_err());
    }
}
