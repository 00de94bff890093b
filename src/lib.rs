// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # mindloop
//!
//! An agent-style task engine. User notes and derived sub-tasks ("thoughts")
//! are symbolic terms; rewrite rules match them by unification and advance
//! them by dispatching actions to tools (text generation, vector memory,
//! user interaction). Every rule and thought carries a smoothed success
//! score that steers selection and sampling.
//!
//! ## Architecture
//!
//! - **Terms** (`term`): Atom / Variable / Structure / List, unification, substitution, text syntax
//! - **Beliefs** (`belief`): Laplace-smoothed success rate
//! - **Stores** (`store`): DashMap-backed thought and rule stores with change deltas
//! - **Engine** (`engine`): weighted sampling, rule selection, concurrent batches, retries
//! - **Tools** (`tool`, `tools`): registry plus built-in `llm`, `memory`, `user_interaction`, `core`
//! - **Collaborators** (`llm`, `memory`): Ollama client and embedding memory
//! - **Runtime** (`daemon`, `feed`, `persist`, `config`, `paths`, `bootstrap`)
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mindloop::engine::{Engine, EngineConfig};
//! use mindloop::llm::{Generator, OfflineGenerator};
//! use mindloop::memory::EmbeddingMemory;
//! use mindloop::rule::Rule;
//! use mindloop::term::Term;
//! use mindloop::thought::{Thought, ThoughtKind};
//! use mindloop::tool::ToolRegistry;
//!
//! # async fn demo() -> mindloop::error::MindResult<()> {
//! let generator: Arc<dyn Generator> = Arc::new(OfflineGenerator);
//! let memory = Arc::new(EmbeddingMemory::new(generator.clone()));
//! let mut tools = ToolRegistry::new();
//! mindloop::tools::register_builtin(&mut tools);
//!
//! let engine = Engine::new(EngineConfig::default(), tools, generator, memory)?;
//! engine.add_rule(Rule::new(
//!     Term::parse("log(?Msg)")?,
//!     Term::parse("core(log, ?Msg)")?,
//! ))?;
//! engine.add_thought(Thought::new(ThoughtKind::Input, Term::parse("log(hello)")?))?;
//! let reports = engine.process_batch().await;
//! # Ok(())
//! # }
//! ```

pub mod belief;
pub mod bootstrap;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod feed;
pub mod llm;
pub mod memory;
pub mod paths;
pub mod persist;
pub mod rule;
pub mod store;
pub mod term;
pub mod thought;
pub mod tool;
pub mod tools;
