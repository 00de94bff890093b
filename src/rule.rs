//! Rewrite rules: `pattern → action`.
//!
//! A rule's pattern is unified against a thought's content. On a match the
//! action term is substituted with the resulting bindings and dispatched to
//! the tool named by the action's functor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::belief::Belief;
use crate::store::Record;
use crate::term::Term;

/// Rule metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleMetadata {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Higher wins when several rules match.
    pub priority: f64,
    /// Where the rule came from: `bootstrap`, `runtime`, `user`, ...
    #[serde(skip_serializing_if = "String::is_empty")]
    pub provenance: String,
    pub created_at: u64,
    pub modified_at: u64,
    pub enabled: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Default for RuleMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            priority: 0.0,
            provenance: String::new(),
            created_at: 0,
            modified_at: 0,
            enabled: true,
            extra: BTreeMap::new(),
        }
    }
}

/// A `pattern → action` rewrite rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub pattern: Term,
    pub action: Term,
    #[serde(default)]
    pub belief: Belief,
    #[serde(default)]
    pub metadata: RuleMetadata,
}

impl Rule {
    /// Create a rule with a fresh id.
    pub fn new(pattern: Term, action: Term) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), pattern, action)
    }

    pub fn with_id(id: impl Into<String>, pattern: Term, action: Term) -> Self {
        Self {
            id: id.into(),
            pattern,
            action,
            belief: Belief::default(),
            metadata: RuleMetadata::default(),
        }
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.metadata.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    pub fn with_provenance(mut self, provenance: impl Into<String>) -> Self {
        self.metadata.provenance = provenance.into();
        self
    }

    /// Name of the tool the action dispatches to, if the action is a
    /// structure.
    pub fn tool_name(&self) -> Option<&str> {
        match &self.action {
            Term::Structure { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl Record for Rule {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> u64 {
        self.metadata.created_at
    }

    fn stamp(&mut self, created_at: u64, modified_at: u64) {
        self.metadata.created_at = created_at;
        self.metadata.modified_at = modified_at;
    }

    fn merge_from(&mut self, previous: &Self) {
        for (k, v) in &previous.metadata.extra {
            self.metadata.extra.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short: String = self.id.chars().take(8).collect();
        write!(
            f,
            "{short} [p={} b={:.2}] {} => {}",
            self.metadata.priority,
            self.belief.score(),
            self.pattern,
            self.action
        )?;
        if !self.metadata.enabled {
            f.write_str(" (disabled)")?;
        }
        Ok(())
    }
}
