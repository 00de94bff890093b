//! Engine: picks pending thoughts, matches rules, runs tools, and keeps
//! beliefs and retry state current.
//!
//! One attempt on a thought goes:
//!
//! 1. claim the thought id (at most one attempt per id at a time)
//! 2. mark it ACTIVE
//! 3. unify every enabled rule pattern with the content and pick the best
//!    match, or fall back to a per-type default action
//! 4. substitute the bindings into the action and dispatch it to the tool
//!    named by its functor, on the blocking pool under a timeout
//! 5. read the thought back and settle the attempt as success, suspension
//!    (WAITING) or failure, updating thought and rule beliefs
//!
//! [`Engine::process_batch`] runs several attempts concurrently and returns
//! once all of them have settled.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;

use crate::error::{EngineError, EngineResult, StoreError};
use crate::llm::Generator;
use crate::memory::VectorMemory;
use crate::rule::Rule;
use crate::store::snapshot::Snapshot;
use crate::store::{RuleStore, ThoughtStore};
use crate::term::{Bindings, Term, substitute, unify};
use crate::thought::{Thought, ThoughtKind, ThoughtStatus};
use crate::tool::{AttemptToken, ToolContext, ToolError, ToolRegistry, ToolResult};

/// Floor for sampling weights, so every pending thought stays reachable.
pub const EPSILON: f64 = 0.01;

/// Recorded error messages are cut to this many characters.
pub const MAX_ERROR_LEN: usize = 500;

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on attempts in flight at once.
    pub max_concurrent: usize,
    /// Upper bound on attempts started by one batch.
    pub batch_size: usize,
    /// Failures before a thought is marked FAILED.
    pub max_retries: u32,
    /// Per-call tool deadline.
    pub tool_timeout: Duration,
    /// Fixed sampling seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            batch_size: 4,
            max_retries: 3,
            tool_timeout: Duration::from_secs(60),
            seed: None,
        }
    }
}

/// How an attempt settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded,
    /// The thought is parked on an external request.
    Waiting,
    Failed(String),
}

/// Summary of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReport {
    pub thought_id: String,
    /// Rule that drove the attempt; `None` for fallback.
    pub rule_id: Option<String>,
    pub action: Option<Term>,
    pub outcome: Outcome,
    /// Status after the attempt; `None` if the thought was deleted meanwhile.
    pub status: Option<ThoughtStatus>,
}

/// The task engine.
pub struct Engine {
    config: EngineConfig,
    thoughts: Arc<ThoughtStore>,
    rules: Arc<RuleStore>,
    tools: ToolRegistry,
    context: ToolContext,
    claims: Arc<Mutex<Claims>>,
    rng: Mutex<StdRng>,
}

/// Thought ids the engine is working on.
#[derive(Debug, Default)]
struct Claims {
    /// Attempts in progress.
    attempts: HashSet<String>,
    /// Timed-out tool calls still running on the blocking pool, per thought.
    draining: HashMap<String, usize>,
}

impl Claims {
    fn contains(&self, id: &str) -> bool {
        self.attempts.contains(id) || self.draining.contains_key(id)
    }

    /// Distinct thoughts held by an attempt or a draining call.
    fn len(&self) -> usize {
        self.attempts.len()
            + self
                .draining
                .keys()
                .filter(|id| !self.attempts.contains(*id))
                .count()
    }
}

impl Engine {
    /// Create an engine with empty stores.
    pub fn new(
        config: EngineConfig,
        tools: ToolRegistry,
        generator: Arc<dyn Generator>,
        memory: Arc<dyn VectorMemory>,
    ) -> EngineResult<Self> {
        Self::with_stores(
            config,
            Arc::new(ThoughtStore::new("thoughts")),
            Arc::new(RuleStore::new("rules")),
            tools,
            generator,
            memory,
        )
    }

    /// Create an engine over existing stores.
    pub fn with_stores(
        config: EngineConfig,
        thoughts: Arc<ThoughtStore>,
        rules: Arc<RuleStore>,
        tools: ToolRegistry,
        generator: Arc<dyn Generator>,
        memory: Arc<dyn VectorMemory>,
    ) -> EngineResult<Self> {
        if config.max_concurrent == 0 {
            return Err(EngineError::InvalidConfig {
                message: "max_concurrent must be > 0".into(),
            });
        }
        if config.batch_size == 0 {
            return Err(EngineError::InvalidConfig {
                message: "batch_size must be > 0".into(),
            });
        }
        if config.tool_timeout.is_zero() {
            return Err(EngineError::InvalidConfig {
                message: "tool_timeout must be > 0".into(),
            });
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tracing::info!(
            max_concurrent = config.max_concurrent,
            batch_size = config.batch_size,
            max_retries = config.max_retries,
            tools = tools.len(),
            "initializing engine"
        );

        let context = ToolContext::new(Arc::clone(&thoughts), Arc::clone(&rules), generator, memory);

        Ok(Self {
            config,
            thoughts,
            rules,
            tools,
            context,
            claims: Arc::new(Mutex::new(Claims::default())),
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn thoughts(&self) -> &Arc<ThoughtStore> {
        &self.thoughts
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    // -----------------------------------------------------------------------
    // Thought and rule management
    // -----------------------------------------------------------------------

    /// Add a thought and return its id.
    pub fn add_thought(&self, thought: Thought) -> EngineResult<String> {
        let id = thought.id.clone();
        self.thoughts.add(thought)?;
        tracing::debug!(thought = %id, "thought added");
        Ok(id)
    }

    /// Add a rule and return its id. The action must be a structure.
    pub fn add_rule(&self, rule: Rule) -> EngineResult<String> {
        let Some(tool) = rule.tool_name() else {
            return Err(EngineError::InvalidRule {
                id: rule.id.clone(),
                message: format!("action {} is not a structure", rule.action),
            });
        };
        if !self.tools.contains(tool) {
            tracing::warn!(rule = %rule.id, %tool, "rule names an unregistered tool");
        }
        let id = rule.id.clone();
        self.rules.add(rule)?;
        Ok(id)
    }

    /// Resolve an id or unique prefix to a thought.
    pub fn resolve_thought(&self, prefix: &str) -> EngineResult<Thought> {
        Ok(self.thoughts.resolve_prefix(prefix)?)
    }

    /// Delete a thought by id or unique prefix, returning what was removed.
    pub fn delete_thought(&self, prefix: &str) -> EngineResult<Thought> {
        let thought = self.resolve_thought(prefix)?;
        if !self.thoughts.delete(&thought.id) {
            return Err(StoreError::NotFound {
                store: self.thoughts.label(),
                id: thought.id,
            }
            .into());
        }
        tracing::debug!(thought = %thought.id, "thought deleted");
        Ok(thought)
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Pick a PENDING thought that is not claimed, weighted by
    /// `max(EPSILON, priority ?? belief score)`.
    pub fn sample_thought(&self) -> Option<Thought> {
        let candidates: Vec<Thought> = {
            let claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
            self.thoughts
                .pending()
                .into_iter()
                .filter(|t| !claims.contains(&t.id))
                .collect()
        };
        if candidates.is_empty() {
            return None;
        }

        let weights: Vec<f64> = candidates
            .iter()
            .map(|t| {
                let w = t.sampling_weight();
                if w.is_finite() { w.max(EPSILON) } else { EPSILON }
            })
            .collect();
        let total: f64 = weights.iter().sum();

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let index = if total > 0.0 && total.is_finite() {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = candidates.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                if target < *w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        } else {
            rng.gen_range(0..candidates.len())
        };
        candidates.into_iter().nth(index)
    }

    /// Best enabled rule whose pattern unifies with the thought's content.
    ///
    /// Ties are broken by priority (highest first), then belief score
    /// (highest first), then id.
    pub fn find_and_select_rule(&self, thought: &Thought) -> Option<(Rule, Bindings)> {
        let empty = Bindings::new();
        let mut matches: Vec<(Rule, Bindings)> = self
            .rules
            .enabled()
            .into_iter()
            .filter_map(|rule| {
                let bindings = unify(&rule.pattern, &thought.content, &empty)?;
                Some((rule, bindings))
            })
            .collect();

        matches.sort_by(|(a, _), (b, _)| {
            b.metadata
                .priority
                .total_cmp(&a.metadata.priority)
                .then_with(|| b.belief.score().total_cmp(&a.belief.score()))
                .then_with(|| a.id.cmp(&b.id))
        });
        if matches.len() > 1 {
            tracing::debug!(
                thought = %thought.id,
                candidates = matches.len(),
                chosen = %matches[0].0.id,
                "several rules match"
            );
        }
        matches.into_iter().next()
    }

    /// Default action for a thought no rule matches. `None` means there is
    /// nothing to do and the attempt succeeds as is.
    pub fn fallback_action(thought: &Thought) -> Option<Term> {
        let expand = |kind: &str| {
            Term::structure("llm", vec![Term::atom("expand"), Term::atom(kind)])
        };
        match &thought.kind {
            ThoughtKind::Input => Some(expand("GOAL")),
            ThoughtKind::Goal => Some(expand("STRATEGY")),
            ThoughtKind::Strategy => Some(expand("OUTCOME")),
            ThoughtKind::Outcome => Some(Term::structure("memory", vec![Term::atom("add")])),
            ThoughtKind::UserPrompt => None,
            kind @ (ThoughtKind::Query | ThoughtKind::System | ThoughtKind::Other(_)) => {
                let question = format!(
                    "How should I proceed with this {}: {}?",
                    kind.as_str().to_ascii_lowercase(),
                    thought.content.text()
                );
                Some(Term::structure(
                    "user_interaction",
                    vec![Term::atom("prompt"), Term::atom(question)],
                ))
            }
        }
    }

    /// Run one scheduling round: admit up to
    /// `min(batch_size, max_concurrent - in_flight)` attempts, run them
    /// concurrently, and wait for all of them.
    pub async fn process_batch(&self) -> Vec<AttemptReport> {
        let capacity = self.config.max_concurrent.saturating_sub(self.in_flight_count());
        let slots = self.config.batch_size.min(capacity);

        let mut claims = Vec::with_capacity(slots);
        while claims.len() < slots {
            let Some(thought) = self.sample_thought() else {
                break;
            };
            if let Some(claim) = self.claim(&thought.id) {
                claims.push(claim);
            }
        }
        if claims.is_empty() {
            return Vec::new();
        }

        tracing::debug!(attempts = claims.len(), "starting batch");
        join_all(claims.into_iter().map(|claim| self.attempt(claim)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Run batches until nothing is pending or `max_batches` is reached.
    pub async fn run_until_idle(&self, max_batches: usize) -> Vec<AttemptReport> {
        let mut reports = Vec::new();
        for _ in 0..max_batches {
            let batch = self.process_batch().await;
            if batch.is_empty() {
                break;
            }
            reports.extend(batch);
        }
        reports
    }

    /// Run a single attempt on a specific thought. `None` when the thought
    /// is already in flight, missing, or not PENDING.
    pub async fn process_thought(&self, id: &str) -> Option<AttemptReport> {
        let claim = self.claim(id)?;
        self.attempt(claim).await
    }

    /// Thoughts with an attempt in progress or a timed-out tool call that
    /// has not returned yet.
    pub fn in_flight_count(&self) -> usize {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn claim(&self, id: &str) -> Option<InFlight<'_>> {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        if claims.contains(id) {
            return None;
        }
        claims.attempts.insert(id.to_string());
        Some(InFlight {
            id: id.to_string(),
            claims: &self.claims,
            thoughts: &self.thoughts,
        })
    }

    async fn attempt(&self, claim: InFlight<'_>) -> Option<AttemptReport> {
        let id = claim.id.as_str();
        let current = self.thoughts.get(id)?;
        if current.status != ThoughtStatus::Pending {
            return None;
        }

        let selected = self.find_and_select_rule(&current);
        let rule_id = selected.as_ref().map(|(rule, _)| rule.id.clone());
        let thought = self.thoughts.modify(id, |t| {
            t.status = ThoughtStatus::Active;
            if let Some(rule_id) = &rule_id {
                t.metadata.rule_id = Some(rule_id.clone());
            }
        })?;

        let action = match &selected {
            Some((rule, bindings)) => Some(substitute(&rule.action, bindings)),
            None => Self::fallback_action(&thought),
        };
        tracing::debug!(
            thought = %id,
            rule = rule_id.as_deref().unwrap_or("fallback"),
            action = %action.as_ref().map(Term::to_string).unwrap_or_default(),
            "attempt started"
        );

        let result = match &action {
            Some(action) => self.execute_action(action, &thought).await,
            None => Ok(Term::atom("ok")),
        };
        let outcome = self.settle(&thought, result);

        if let Some(rule_id) = &rule_id {
            let success = !matches!(outcome, Outcome::Failed(_));
            self.rules.modify(rule_id, |r| r.belief.update(success));
        }

        let status = self.thoughts.get(id).map(|t| t.status);
        match &outcome {
            Outcome::Failed(error) => {
                tracing::warn!(thought = %id, status = ?status, %error, "attempt failed")
            }
            _ => tracing::info!(thought = %id, status = ?status, "attempt settled"),
        }

        Some(AttemptReport {
            thought_id: id.to_string(),
            rule_id,
            action,
            outcome,
            status,
        })
    }

    /// Dispatch a bound action to its tool on the blocking pool, under the
    /// configured timeout. Error markers come back as `Err`.
    ///
    /// A call that times out keeps running. Its writes are rejected from
    /// then on, and the thought stays claimed until the call returns.
    pub async fn execute_action(&self, action: &Term, thought: &Thought) -> Result<Term, String> {
        let Term::Structure { name, .. } = action else {
            return Err(format!("action {action} is not a structure"));
        };
        let Some(tool) = self.tools.get(name) else {
            return Err(ToolError::NotFound { name: name.clone() }.to_string());
        };

        let token = AttemptToken::new();
        let ctx = self.context.for_attempt(token.clone());
        let call_action = action.clone();
        let call_thought = thought.clone();
        let mut handle =
            tokio::task::spawn_blocking(move || tool.execute(&call_action, &ctx, &call_thought));

        let timeout = self.config.tool_timeout;
        let finished = tokio::time::timeout(timeout, &mut handle).await;
        let result = match finished {
            Err(_) => {
                token.revoke();
                self.drain(&thought.id, name, handle);
                Err(ToolError::Timeout {
                    tool_name: name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Ok(Err(join)) => Err(ToolError::Panicked {
                tool_name: name.clone(),
                message: join.to_string(),
            }),
            Ok(Ok(result)) => result,
        };

        match result {
            Ok(term) => match term.error_message() {
                Some(message) => Err(message.to_string()),
                None => Ok(term),
            },
            Err(e) => Err(e.to_string()),
        }
    }

    /// Hold the thought's claim until a timed-out call returns.
    fn drain(&self, id: &str, tool_name: &str, handle: JoinHandle<ToolResult<Term>>) {
        *self
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .draining
            .entry(id.to_string())
            .or_default() += 1;

        let claims = Arc::clone(&self.claims);
        let id = id.to_string();
        let tool_name = tool_name.to_string();
        tokio::spawn(async move {
            let late = handle.await;
            tracing::debug!(
                thought = %id,
                tool = %tool_name,
                panicked = late.is_err(),
                "timed-out tool call returned"
            );
            let mut claims = claims.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(count) = claims.draining.get_mut(&id) {
                *count -= 1;
                if *count == 0 {
                    claims.draining.remove(&id);
                }
            }
        });
    }

    /// Apply the retry policy and belief updates for a finished call.
    fn settle(&self, thought: &Thought, result: Result<Term, String>) -> Outcome {
        let Some(after) = self.thoughts.get(&thought.id) else {
            return match result {
                Ok(_) => Outcome::Succeeded,
                Err(e) => Outcome::Failed(e),
            };
        };

        let outcome = match result {
            Err(e) => Outcome::Failed(e),
            Ok(_) => match after.status {
                ThoughtStatus::Waiting => Outcome::Waiting,
                ThoughtStatus::Failed => Outcome::Failed(
                    after
                        .metadata
                        .error
                        .clone()
                        .unwrap_or_else(|| "tool marked the thought as failed".into()),
                ),
                _ => Outcome::Succeeded,
            },
        };

        let max_retries = self.config.max_retries;
        match &outcome {
            Outcome::Succeeded => {
                self.thoughts.modify(&thought.id, |t| {
                    if t.status == ThoughtStatus::Active {
                        t.status = ThoughtStatus::Done;
                    }
                    t.metadata.retries = 0;
                    t.metadata.error = None;
                    t.belief.update(true);
                });
            }
            Outcome::Waiting => {}
            Outcome::Failed(error) => {
                let error = truncate_error(error);
                let mut abandoned = None;
                self.thoughts.modify(&thought.id, |t| {
                    t.metadata.retries += 1;
                    t.metadata.error = Some(error);
                    t.belief.update(false);
                    abandoned = t.metadata.waiting_for.take();
                    t.status = if t.metadata.retries < max_retries {
                        ThoughtStatus::Pending
                    } else {
                        ThoughtStatus::Failed
                    };
                });
                if let Some(request_id) = abandoned {
                    self.close_request(&request_id, &thought.id);
                }
            }
        }
        outcome
    }

    /// Fail an open USER_PROMPT whose asker no longer waits for it.
    fn close_request(&self, request_id: &str, asker: &str) {
        let closed = self.thoughts.modify(request_id, |t| {
            if t.kind == ThoughtKind::UserPrompt && t.status == ThoughtStatus::Waiting {
                t.status = ThoughtStatus::Failed;
                t.metadata.error = Some("the attempt that asked this failed".into());
            }
        });
        if closed.is_some_and(|t| t.status == ThoughtStatus::Failed) {
            tracing::debug!(request = %request_id, thought = %asker, "closed abandoned request");
        }
    }

    // -----------------------------------------------------------------------
    // Resumption
    // -----------------------------------------------------------------------

    /// Deliver a user response to the thought waiting on `request_id`.
    ///
    /// Adds an INPUT child carrying the text, returns the waiting thought to
    /// PENDING and closes the USER_PROMPT request. Returns the child's id.
    pub fn handle_response(&self, request_id: &str, text: &str) -> EngineResult<String> {
        let waiting = self.thoughts.find_waiting_for(request_id).ok_or_else(|| {
            EngineError::NoWaitingThought {
                request_id: request_id.to_string(),
            }
        })?;

        let child = Thought::new(ThoughtKind::Input, Term::atom(text)).child_of(&waiting);
        let child_id = child.id.clone();
        self.thoughts.add(child)?;

        self.thoughts.modify(&waiting.id, |t| {
            t.status = ThoughtStatus::Pending;
            t.metadata.waiting_for = None;
            t.belief.update(true);
        });

        if self
            .thoughts
            .get(request_id)
            .is_some_and(|t| t.kind == ThoughtKind::UserPrompt)
        {
            self.thoughts
                .modify(request_id, |t| t.status = ThoughtStatus::Done);
        }

        tracing::info!(request = %request_id, thought = %waiting.id, response = %child_id, "response delivered");
        Ok(child_id)
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.thoughts, &self.rules)
    }

    /// Replace both stores with a snapshot.
    pub fn restore(&self, snapshot: Snapshot) {
        snapshot.restore(&self.thoughts, &self.rules);
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(self.snapshot().to_json()?)
    }

    pub fn load_json(&self, json: &str) -> EngineResult<()> {
        self.restore(Snapshot::from_json(json)?);
        Ok(())
    }

    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            thought_count: self.thoughts.count(),
            status_counts: self.thoughts.status_counts(),
            rule_count: self.rules.count(),
            enabled_rules: self.rules.enabled().len(),
            tools: self.tools.names(),
            in_flight: self.in_flight_count(),
            max_concurrent: self.config.max_concurrent,
            batch_size: self.config.batch_size,
            max_retries: self.config.max_retries,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("thoughts", &self.thoughts)
            .field("rules", &self.rules)
            .field("tools", &self.tools)
            .finish()
    }
}

/// An attempt's claim on a thought, released on drop.
///
/// A thought still ACTIVE when its claim is released never had its attempt
/// settled (for instance the future was dropped) and is marked FAILED.
struct InFlight<'a> {
    id: String,
    claims: &'a Mutex<Claims>,
    thoughts: &'a ThoughtStore,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self
            .thoughts
            .get(&self.id)
            .is_some_and(|t| t.status == ThoughtStatus::Active)
        {
            tracing::warn!(thought = %self.id, "attempt ended with thought still ACTIVE");
            self.thoughts.modify(&self.id, |t| {
                t.status = ThoughtStatus::Failed;
                t.metadata.error = Some("attempt ended without settling the thought".into());
            });
        }
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attempts
            .remove(&self.id);
    }
}

fn truncate_error(error: &str) -> String {
    if error.chars().count() <= MAX_ERROR_LEN {
        error.to_string()
    } else {
        error.chars().take(MAX_ERROR_LEN).collect()
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub thought_count: usize,
    pub status_counts: Vec<(ThoughtStatus, usize)>,
    pub rule_count: usize,
    pub enabled_rules: usize,
    pub tools: Vec<String>,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub batch_size: usize,
    pub max_retries: u32,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "mindloop engine info")?;
        writeln!(f, "  thoughts:     {}", self.thought_count)?;
        for (status, count) in &self.status_counts {
            writeln!(f, "    {:<10} {count}", status.as_str())?;
        }
        writeln!(f, "  rules:        {} ({} enabled)", self.rule_count, self.enabled_rules)?;
        writeln!(f, "  tools:        {}", self.tools.join(", "))?;
        writeln!(f, "  in flight:    {}", self.in_flight)?;
        writeln!(
            f,
            "  concurrency:  {} (batch {})",
            self.max_concurrent, self.batch_size
        )?;
        writeln!(f, "  max retries:  {}", self.max_retries)?;
        Ok(())
    }
}
