//! Change feed: store deltas and attempt results as structured messages.
//!
//! [`ChangeFeed::drain`] empties both stores' pending deltas into
//! [`FeedMessage`]s and hands them to a [`MessageSink`]: styled terminal
//! lines, newline-delimited JSON, or an in-memory vector for tests.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::engine::{AttemptReport, Outcome};
use crate::rule::Rule;
use crate::store::{RuleStore, ThoughtStore};
use crate::thought::Thought;

// ── Message types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// Current state of added or updated thoughts.
    Thoughts { changed: Vec<Thought> },
    ThoughtsDeleted { ids: Vec<String> },
    Rules { changed: Vec<Rule> },
    RulesDeleted { ids: Vec<String> },
    /// One settled attempt.
    Attempt {
        thought_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rule_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<String>,
        outcome: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    System { text: String },
}

impl From<&AttemptReport> for FeedMessage {
    fn from(report: &AttemptReport) -> Self {
        let (outcome, error) = match &report.outcome {
            Outcome::Succeeded => ("succeeded", None),
            Outcome::Waiting => ("waiting", None),
            Outcome::Failed(e) => ("failed", Some(e.clone())),
        };
        Self::Attempt {
            thought_id: report.thought_id.clone(),
            rule_id: report.rule_id.clone(),
            action: report.action.as_ref().map(|a| a.to_string()),
            outcome: outcome.into(),
            error,
        }
    }
}

// ── MessageSink trait ───────────────────────────────────────────────────

/// A destination for feed messages.
pub trait MessageSink: Send + Sync {
    fn emit(&self, msg: &FeedMessage);

    fn emit_batch(&self, msgs: &[FeedMessage]) {
        for m in msgs {
            self.emit(m);
        }
    }
}

/// Human-readable terminal lines.
pub struct StdoutSink;

impl MessageSink for StdoutSink {
    fn emit(&self, msg: &FeedMessage) {
        match msg {
            FeedMessage::Thoughts { changed } => {
                for t in changed {
                    println!("[thought] {t}");
                    if let Some(error) = &t.metadata.error {
                        println!("          error: {error}");
                    }
                }
            }
            FeedMessage::ThoughtsDeleted { ids } => {
                for id in ids {
                    println!("[thought] {id} deleted");
                }
            }
            FeedMessage::Rules { changed } => {
                for r in changed {
                    println!("[rule] {r}");
                }
            }
            FeedMessage::RulesDeleted { ids } => {
                for id in ids {
                    println!("[rule] {id} deleted");
                }
            }
            FeedMessage::Attempt {
                thought_id,
                rule_id,
                action,
                outcome,
                error,
            } => {
                let short: String = thought_id.chars().take(8).collect();
                print!("[attempt] {short} {outcome}");
                if let Some(a) = action {
                    print!(" via {a}");
                }
                if let Some(r) = rule_id {
                    let r: String = r.chars().take(8).collect();
                    print!(" (rule {r})");
                }
                println!();
                if let Some(e) = error {
                    println!("          error: {e}");
                }
            }
            FeedMessage::System { text } => println!("{text}"),
        }
    }
}

/// Newline-delimited JSON.
pub struct JsonSink;

impl MessageSink for JsonSink {
    fn emit(&self, msg: &FeedMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize feed message"),
        }
    }
}

/// Collects messages for testing.
#[derive(Default)]
pub struct VecSink {
    messages: Mutex<Vec<FeedMessage>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<FeedMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSink for VecSink {
    fn emit(&self, msg: &FeedMessage) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg.clone());
    }
}

// ── ChangeFeed ──────────────────────────────────────────────────────────

/// Drains store deltas into a sink.
pub struct ChangeFeed {
    thoughts: Arc<ThoughtStore>,
    rules: Arc<RuleStore>,
    sink: Arc<dyn MessageSink>,
}

impl ChangeFeed {
    pub fn new(
        thoughts: Arc<ThoughtStore>,
        rules: Arc<RuleStore>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            thoughts,
            rules,
            sink,
        }
    }

    /// Emit everything that changed since the last drain. Returns the
    /// number of messages emitted.
    pub fn drain(&self) -> usize {
        let mut msgs = Vec::new();

        let delta = self.thoughts.get_delta();
        if !delta.changed.is_empty() {
            msgs.push(FeedMessage::Thoughts {
                changed: delta.changed,
            });
        }
        if !delta.deleted.is_empty() {
            msgs.push(FeedMessage::ThoughtsDeleted { ids: delta.deleted });
        }

        let delta = self.rules.get_delta();
        if !delta.changed.is_empty() {
            msgs.push(FeedMessage::Rules {
                changed: delta.changed,
            });
        }
        if !delta.deleted.is_empty() {
            msgs.push(FeedMessage::RulesDeleted { ids: delta.deleted });
        }

        self.sink.emit_batch(&msgs);
        msgs.len()
    }

    pub fn report(&self, reports: &[AttemptReport]) {
        let msgs: Vec<FeedMessage> = reports.iter().map(FeedMessage::from).collect();
        self.sink.emit_batch(&msgs);
    }

    pub fn system(&self, text: impl Into<String>) {
        self.sink.emit(&FeedMessage::System { text: text.into() });
    }
}
