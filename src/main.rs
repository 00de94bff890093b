//! mindloop CLI: thoughts, rules, and the scheduling loop.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use mindloop::bootstrap::RulePack;
use mindloop::config::MindConfig;
use mindloop::daemon::{Daemon, DaemonConfig, run_steps};
use mindloop::engine::Engine;
use mindloop::feed::{ChangeFeed, JsonSink, MessageSink, StdoutSink};
use mindloop::llm::{Generator, OfflineGenerator, OllamaClient};
use mindloop::memory::EmbeddingMemory;
use mindloop::paths::AppPaths;
use mindloop::persist::{Persister, load_memory, load_snapshot, memory_path};
use mindloop::rule::Rule;
use mindloop::term::Term;
use mindloop::thought::{Thought, ThoughtKind, ThoughtStatus};
use mindloop::tool::ToolRegistry;
use mindloop::tools::register_builtin;

#[derive(Parser)]
#[command(name = "mindloop", version, about = "Rule-driven task engine for notes and goals")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/mindloop/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State file (default: $XDG_DATA_HOME/mindloop/state.json).
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create directories and a default config file.
    Init,

    /// Add a thought. The text is parsed as a term, or stored as an atom.
    Add {
        text: String,
        /// Thought type: input, goal, strategy, outcome, query, system, ...
        #[arg(long, default_value = "input")]
        kind: String,
        /// Explicit sampling weight.
        #[arg(long)]
        priority: Option<f64>,
    },

    /// List thoughts.
    List {
        /// Only thoughts in this status.
        #[arg(long)]
        status: Option<String>,
    },

    /// List rules.
    Rules,

    /// Add a rule.
    AddRule {
        /// Pattern term, e.g. `todo(?Task)`.
        pattern: String,
        /// Action term, e.g. `core(add_thought, GOAL, ?Task)`.
        action: String,
        #[arg(long, default_value = "0")]
        priority: f64,
        #[arg(long)]
        description: Option<String>,
    },

    /// Answer a pending user prompt.
    Respond {
        /// Request id (or unique prefix) of the USER_PROMPT thought.
        request_id: String,
        text: String,
    },

    /// Delete a thought by id or unique prefix.
    Delete { id: String },

    /// Run scheduling batches until idle, then save.
    Step {
        #[arg(long, default_value = "1")]
        batches: usize,
    },

    /// Run the scheduling loop until Ctrl+C.
    Run {
        /// Stop after this many batches (0 = unlimited).
        #[arg(long, default_value = "0")]
        max_batches: usize,
        /// Emit the change feed as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Show engine summary.
    Info,
}

struct Session {
    engine: Arc<Engine>,
    persister: Persister,
    config: MindConfig,
}

impl Session {
    fn save(&self) -> Result<()> {
        self.persister
            .save(self.engine.thoughts(), self.engine.rules())?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let paths = AppPaths::resolve()?;
            paths.ensure_dirs()?;
            let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
            if config_path.exists() {
                println!("Config already exists at {}", config_path.display());
            } else {
                MindConfig::default().save(&config_path)?;
                println!("Wrote default config to {}", config_path.display());
            }
            let state_path = cli.state.clone().unwrap_or_else(|| paths.state_file());
            println!("State file: {}", state_path.display());
        }

        Commands::Add {
            text,
            kind,
            priority,
        } => {
            let session = open(&cli.config, &cli.state, false).await?;
            let content = Term::parse(&text).unwrap_or_else(|_| Term::atom(text.clone()));
            let mut thought = Thought::new(ThoughtKind::from(kind), content);
            if let Some(p) = priority {
                thought = thought.with_priority(p);
            }
            let id = session.engine.add_thought(thought)?;
            session.save()?;
            println!("{id}");
        }

        Commands::List { status } => {
            let session = open(&cli.config, &cli.state, false).await?;
            let thoughts = match status {
                Some(s) => {
                    let status: ThoughtStatus = s.parse().map_err(|e: String| miette::miette!(e))?;
                    session.engine.thoughts().with_status(status)
                }
                None => session.engine.thoughts().get_all(),
            };
            if thoughts.is_empty() {
                println!("No thoughts.");
            }
            for t in &thoughts {
                println!("{t}");
                if let Some(err) = &t.metadata.error {
                    println!("    error: {err}");
                }
            }
        }

        Commands::Rules => {
            let session = open(&cli.config, &cli.state, false).await?;
            let rules = session.engine.rules().get_all();
            if rules.is_empty() {
                println!("No rules.");
            }
            for r in &rules {
                println!("{r}");
            }
        }

        Commands::AddRule {
            pattern,
            action,
            priority,
            description,
        } => {
            let session = open(&cli.config, &cli.state, false).await?;
            let mut rule = Rule::new(Term::parse(&pattern)?, Term::parse(&action)?)
                .with_priority(priority)
                .with_provenance("user");
            if let Some(d) = description {
                rule = rule.with_description(d);
            }
            let id = session.engine.add_rule(rule)?;
            session.save()?;
            println!("{id}");
        }

        Commands::Respond { request_id, text } => {
            let session = open(&cli.config, &cli.state, false).await?;
            let request = session.engine.resolve_thought(&request_id)?;
            let child = session.engine.handle_response(&request.id, &text)?;
            session.save()?;
            println!("{child}");
        }

        Commands::Delete { id } => {
            let session = open(&cli.config, &cli.state, false).await?;
            let removed = session.engine.delete_thought(&id)?;
            session.save()?;
            println!("Deleted {removed}");
        }

        Commands::Step { batches } => {
            let session = open(&cli.config, &cli.state, true).await?;
            let feed = ChangeFeed::new(
                Arc::clone(session.engine.thoughts()),
                Arc::clone(session.engine.rules()),
                Arc::new(StdoutSink),
            );
            let reports = run_steps(&session.engine, &feed, batches.max(1)).await;
            if reports.is_empty() {
                println!("Nothing to do.");
            }
            session.save()?;
        }

        Commands::Run { max_batches, json } => {
            let session = open(&cli.config, &cli.state, true).await?;
            let sink: Arc<dyn MessageSink> = if json {
                Arc::new(JsonSink)
            } else {
                Arc::new(StdoutSink)
            };
            let feed = ChangeFeed::new(
                Arc::clone(session.engine.thoughts()),
                Arc::clone(session.engine.rules()),
                sink,
            );
            let config = DaemonConfig {
                tick_interval: session.config.tick_interval(),
                persist_interval: session.config.persist_interval(),
                max_batches,
                ..Default::default()
            };
            let report = Daemon::new(
                Arc::clone(&session.engine),
                feed,
                Some(session.persister.clone()),
                config,
            )
            .run()
            .await?;
            println!(
                "{} batches, {} attempts, {} saves",
                report.batches, report.attempts, report.saves
            );
        }

        Commands::Info => {
            let session = open(&cli.config, &cli.state, false).await?;
            print!("{}", session.engine.info());
        }
    }

    Ok(())
}

/// Load config and state and build the engine. `with_model` probes the
/// configured model; without it generation is offline.
async fn open(
    config_path: &Option<PathBuf>,
    state_path: &Option<PathBuf>,
    with_model: bool,
) -> Result<Session> {
    let paths = match (config_path, state_path) {
        (Some(_), Some(_)) => None,
        _ => Some(AppPaths::resolve()?),
    };
    let config_path = config_path
        .clone()
        .or_else(|| paths.as_ref().map(AppPaths::config_file))
        .ok_or_else(|| miette::miette!("no config path"))?;
    let state_path = state_path
        .clone()
        .or_else(|| paths.as_ref().map(AppPaths::state_file))
        .ok_or_else(|| miette::miette!("no state path"))?;

    let config = MindConfig::load_or_default(&config_path)?;

    let generator: Arc<dyn Generator> = if with_model && config.llm.enabled {
        let client = OllamaClient::new(config.ollama_config());
        let client = tokio::task::spawn_blocking(move || {
            client.probe();
            client
        })
        .await
        .into_diagnostic()?;
        if !client.is_available() {
            tracing::warn!("model unavailable; llm and memory actions will fail and be retried");
        }
        Arc::new(client)
    } else {
        Arc::new(OfflineGenerator)
    };
    let memory = Arc::new(EmbeddingMemory::new(Arc::clone(&generator)));
    if let Some(saved) = load_memory(&memory_path(&state_path))? {
        memory.restore(saved);
    }

    let mut tools = ToolRegistry::new();
    register_builtin(&mut tools);
    let engine = Engine::new(config.engine_config(), tools, generator, memory.clone())?;

    if let Some(snapshot) = load_snapshot(&state_path)? {
        engine.restore(snapshot);
    }
    if engine.rules().is_empty() && config.persist.bootstrap {
        RulePack::bootstrap()?.apply(engine.rules());
    }
    // Loading is not a change worth reporting.
    engine.thoughts().get_delta();
    engine.rules().get_delta();

    let persister = Persister::new(state_path).with_memory(memory);
    persister.watch(engine.thoughts(), engine.rules());

    Ok(Session {
        engine: Arc::new(engine),
        persister,
        config,
    })
}
