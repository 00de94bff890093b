//! Tool system: trait-based tools with runtime registration.
//!
//! Tools are how the engine acts on a thought. A rule's bound action is a
//! structure such as `llm(expand, GOAL)`; its functor names the tool in the
//! [`ToolRegistry`] and the whole term is handed to [`Tool::execute`].
//!
//! A tool signals failure either by returning an error marker
//! ([`Term::error`]) or by returning `Err(ToolError)`. It may also change the
//! trigger thought's status through the [`ToolContext`]; the engine reads the
//! status back after the call.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use miette::Diagnostic;
use thiserror::Error;

use crate::error::StoreError;
use crate::llm::Generator;
use crate::memory::{MemoryEntry, MemoryError, VectorMemory};
use crate::rule::Rule;
use crate::store::{RuleStore, ThoughtStore};
use crate::term::Term;
use crate::thought::{Thought, ThoughtStatus};

/// Errors raised by tools and tool dispatch.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    #[error("tool not found: \"{name}\"")]
    #[diagnostic(
        code(mindloop::tool::not_found),
        help("Run `mindloop info` to see registered tools, or fix the functor of the rule action.")
    )]
    NotFound { name: String },

    #[error("{tool_name}: invalid action {action}: {message}")]
    #[diagnostic(
        code(mindloop::tool::invalid_action),
        help("Check the argument shape the tool expects in its signature.")
    )]
    InvalidAction {
        tool_name: String,
        action: String,
        message: String,
    },

    #[error("{tool_name} failed: {message}")]
    #[diagnostic(code(mindloop::tool::execution))]
    Execution { tool_name: String, message: String },

    #[error("{tool_name} timed out after {timeout_ms} ms")]
    #[diagnostic(
        code(mindloop::tool::timeout),
        help("Raise `[engine] tool_timeout_ms` or make the tool faster. The call may still finish in the background.")
    )]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("{tool_name} panicked: {message}")]
    #[diagnostic(code(mindloop::tool::panicked))]
    Panicked { tool_name: String, message: String },

    #[error("tool call outlived its attempt; write rejected")]
    #[diagnostic(
        code(mindloop::tool::expired),
        help("The call timed out and the engine has settled the thought. Raise `[engine] tool_timeout_ms` if this is a slow tool.")
    )]
    Expired,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Memory(#[from] MemoryError),
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// Description of a tool's interface.
#[derive(Debug, Clone)]
pub struct ToolSignature {
    /// Unique name of the tool, matched against action functors.
    pub name: String,
    /// What this tool does.
    pub description: String,
    /// Accepted action forms.
    pub parameters: Vec<ToolParam>,
}

/// One accepted action form, e.g. `memory(search, Query, K)`.
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ToolParam {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Write permission for one tool call.
///
/// The engine revokes it when the call outlives its deadline. Revocation
/// waits for writes already in progress, and every later write through the
/// context fails with [`ToolError::Expired`].
#[derive(Debug, Clone)]
pub struct AttemptToken {
    live: Arc<RwLock<bool>>,
}

impl AttemptToken {
    pub fn new() -> Self {
        Self {
            live: Arc::new(RwLock::new(true)),
        }
    }

    pub fn revoke(&self) {
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_live(&self) -> bool {
        *self.live.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AttemptToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a tool may touch while executing.
///
/// The stores are exposed for reads. Writes go through the context methods,
/// which are rejected once the call's [`AttemptToken`] is revoked.
#[derive(Clone)]
pub struct ToolContext {
    pub thoughts: Arc<ThoughtStore>,
    pub rules: Arc<RuleStore>,
    pub generator: Arc<dyn Generator>,
    pub memory: Arc<dyn VectorMemory>,
    attempt: Option<AttemptToken>,
}

impl ToolContext {
    pub fn new(
        thoughts: Arc<ThoughtStore>,
        rules: Arc<RuleStore>,
        generator: Arc<dyn Generator>,
        memory: Arc<dyn VectorMemory>,
    ) -> Self {
        Self {
            thoughts,
            rules,
            generator,
            memory,
            attempt: None,
        }
    }

    /// A copy of this context whose writes are bound to `token`.
    pub fn for_attempt(&self, token: AttemptToken) -> Self {
        Self {
            attempt: Some(token),
            ..self.clone()
        }
    }

    /// Run a write while holding the attempt's permission.
    fn write<R>(&self, f: impl FnOnce() -> ToolResult<R>) -> ToolResult<R> {
        let Some(token) = &self.attempt else {
            return f();
        };
        let live = token.live.read().unwrap_or_else(PoisonError::into_inner);
        if !*live {
            return Err(ToolError::Expired);
        }
        f()
    }

    pub fn add_thought(&self, thought: Thought) -> ToolResult<()> {
        self.write(|| Ok(self.thoughts.add(thought)?))
    }

    /// Replace a stored thought; `created_at` and unknown `extra` keys are kept.
    pub fn update_thought(&self, thought: Thought) -> ToolResult<()> {
        self.write(|| Ok(self.thoughts.update(thought)?))
    }

    /// Mutate a stored thought in place.
    pub fn modify_thought<F>(&self, id: &str, f: F) -> ToolResult<Thought>
    where
        F: FnOnce(&mut Thought),
    {
        self.write(|| {
            self.thoughts.modify(id, f).ok_or_else(|| {
                ToolError::Store(StoreError::NotFound {
                    store: self.thoughts.label(),
                    id: id.to_string(),
                })
            })
        })
    }

    pub fn set_status(&self, id: &str, status: ThoughtStatus) -> ToolResult<Thought> {
        self.modify_thought(id, |t| t.status = status)
    }

    /// Delete a thought by id or unique prefix.
    pub fn delete_thought(&self, prefix: &str) -> ToolResult<Thought> {
        self.write(|| {
            let target = self.thoughts.resolve_prefix(prefix)?;
            self.thoughts.delete(&target.id);
            Ok(target)
        })
    }

    pub fn add_rule(&self, rule: Rule) -> ToolResult<()> {
        self.write(|| Ok(self.rules.add(rule)?))
    }

    /// Store a memory entry. Only the start of the call is checked, so a
    /// revocation never waits on the embedding request.
    pub fn add_memory(&self, entry: MemoryEntry) -> ToolResult<()> {
        self.write(|| Ok(()))?;
        Ok(self.memory.add(entry)?)
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("thoughts", &self.thoughts)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

/// A tool the engine can dispatch actions to.
pub trait Tool: Send + Sync {
    /// Describe this tool's interface.
    fn signature(&self) -> ToolSignature;

    /// Execute a bound action on behalf of `thought`.
    ///
    /// Called on the blocking pool; may block.
    fn execute(&self, action: &Term, ctx: &ToolContext, thought: &Thought) -> ToolResult<Term>;
}

/// Positional view over a bound action's arguments.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    tool_name: &'a str,
    action: &'a Term,
}

impl<'a> Invocation<'a> {
    pub fn new(tool_name: &'a str, action: &'a Term) -> Self {
        Self { tool_name, action }
    }

    pub fn arg(&self, index: usize) -> Option<&'a Term> {
        self.action.args().get(index)
    }

    pub fn arity(&self) -> usize {
        self.action.args().len()
    }

    /// Get a required argument, returning an error if missing.
    pub fn require(&self, index: usize, what: &str) -> ToolResult<&'a Term> {
        self.arg(index)
            .ok_or_else(|| self.invalid(format!("missing argument {index} ({what})")))
    }

    /// The sub-command atom in first position: `memory(search, ...)` → `search`.
    pub fn verb(&self) -> ToolResult<&'a str> {
        match self.require(0, "operation")? {
            Term::Atom(name) => Ok(name),
            other => Err(self.invalid(format!("operation must be an atom, got {other}"))),
        }
    }

    pub fn invalid(&self, message: impl Into<String>) -> ToolError {
        ToolError::InvalidAction {
            tool_name: self.tool_name.to_string(),
            action: self.action.to_string(),
            message: message.into(),
        }
    }
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. If a tool with the same name exists, it is replaced.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let sig = tool.signature();
        if self.tools.insert(sig.name.clone(), Arc::new(tool)).is_some() {
            tracing::debug!(tool = %sig.name, "replaced registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tool signatures, sorted by name.
    pub fn list(&self) -> Vec<ToolSignature> {
        let mut sigs: Vec<_> = self.tools.values().map(|t| t.signature()).collect();
        sigs.sort_by(|a, b| a.name.cmp(&b.name));
        sigs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyTool;

    impl Tool for DummyTool {
        fn signature(&self) -> ToolSignature {
            ToolSignature {
                name: "dummy".into(),
                description: "A test tool".into(),
                parameters: vec![],
            }
        }

        fn execute(&self, _action: &Term, _ctx: &ToolContext, _t: &Thought) -> ToolResult<Term> {
            Ok(Term::atom("ok"))
        }
    }

    #[test]
    fn register_and_list() {
        let mut reg = ToolRegistry::new();
        reg.register(DummyTool);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.list()[0].name, "dummy");
        assert!(reg.contains("dummy"));
    }

    #[test]
    fn get_missing_tool() {
        let reg = ToolRegistry::new();
        assert!(reg.get("nonexistent").is_none());
    }

    #[test]
    fn invocation_arguments() {
        let action = Term::parse("memory(search, \"rust async\", 3)").unwrap();
        let inv = Invocation::new("memory", &action);
        assert_eq!(inv.verb().unwrap(), "search");
        assert_eq!(inv.arity(), 3);
        assert_eq!(inv.require(1, "query").unwrap().text(), "rust async");
        assert!(matches!(
            inv.require(3, "extra"),
            Err(ToolError::InvalidAction { .. })
        ));

        let nested = Term::parse("memory(f(x))").unwrap();
        assert!(Invocation::new("memory", &nested).verb().is_err());
    }

    #[test]
    fn context_updates_thoughts() {
        use crate::tools::testing::{ScriptedGenerator, context};

        let ctx = context(ScriptedGenerator::failing());
        let mut t = Thought::with_id("t1", "GOAL", Term::atom("a"));
        t.metadata.extra.insert("kept".into(), "yes".into());
        ctx.add_thought(t).unwrap();

        let replacement = Thought::with_id("t1", "GOAL", Term::atom("b"));
        ctx.update_thought(replacement).unwrap();
        let stored = ctx.thoughts.get("t1").unwrap();
        assert_eq!(stored.content, Term::atom("b"));
        assert_eq!(stored.metadata.extra.get("kept").map(String::as_str), Some("yes"));

        assert!(ctx.set_status("missing", ThoughtStatus::Done).is_err());
        assert!(ctx.update_thought(Thought::with_id("nope", "GOAL", Term::atom("x"))).is_err());
    }

    #[test]
    fn revoked_attempt_rejects_writes() {
        use crate::tools::testing::{ScriptedGenerator, context};

        let base = context(ScriptedGenerator::replying(""));
        base.add_thought(Thought::with_id("t1", "GOAL", Term::atom("a"))).unwrap();

        let token = AttemptToken::new();
        let ctx = base.for_attempt(token.clone());
        ctx.set_status("t1", ThoughtStatus::Waiting).unwrap();

        token.revoke();
        assert!(!token.is_live());
        assert!(matches!(
            ctx.set_status("t1", ThoughtStatus::Done),
            Err(ToolError::Expired)
        ));
        assert!(matches!(
            ctx.add_thought(Thought::with_id("t2", "GOAL", Term::atom("b"))),
            Err(ToolError::Expired)
        ));
        assert!(matches!(ctx.delete_thought("t1"), Err(ToolError::Expired)));
        assert!(matches!(
            ctx.add_memory(MemoryEntry::new("m", "text")),
            Err(ToolError::Expired)
        ));
        assert_eq!(base.thoughts.get("t1").unwrap().status, ThoughtStatus::Waiting);
        assert!(base.thoughts.get("t2").is_none());

        // The shared context is not bound to any attempt.
        base.set_status("t1", ThoughtStatus::Done).unwrap();
    }
}
