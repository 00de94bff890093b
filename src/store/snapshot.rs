//! Persisted form of the thought and rule stores.
//!
//! The durable representation is a JSON object:
//!
//! ```json
//! { "thoughts": { "<id>": { ... } }, "rules": { "<id>": { ... } } }
//! ```
//!
//! A thought can only be ACTIVE while the engine holds it, so any ACTIVE
//! thought found on load is put back to PENDING.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{RuleStore, StoreResult, ThoughtStore};
use crate::error::StoreError;
use crate::rule::Rule;
use crate::thought::{Thought, ThoughtStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub thoughts: BTreeMap<String, Thought>,
    #[serde(default)]
    pub rules: BTreeMap<String, Rule>,
}

impl Snapshot {
    /// Capture the current content of both stores.
    pub fn capture(thoughts: &ThoughtStore, rules: &RuleStore) -> Self {
        Self {
            thoughts: thoughts
                .get_all()
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            rules: rules
                .get_all()
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect(),
        }
    }

    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::Serialization {
            message: format!("failed to serialize snapshot: {e}"),
        })
    }

    /// Parse a snapshot and normalize it for loading.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let mut snapshot: Self =
            serde_json::from_str(json).map_err(|e| StoreError::Serialization {
                message: format!("failed to parse snapshot: {e}"),
            })?;
        let reset = snapshot.normalize();
        if reset > 0 {
            tracing::info!(reset, "reset ACTIVE thoughts to PENDING on load");
        }
        Ok(snapshot)
    }

    /// Coerce ACTIVE thoughts back to PENDING and make map keys agree with
    /// entity ids. Returns the number of thoughts reset.
    pub fn normalize(&mut self) -> usize {
        let mut reset = 0;
        for thought in self.thoughts.values_mut() {
            if thought.status == ThoughtStatus::Active {
                thought.status = ThoughtStatus::Pending;
                reset += 1;
            }
        }
        for (key, thought) in &mut self.thoughts {
            if thought.id.is_empty() {
                thought.id = key.clone();
            }
        }
        for (key, rule) in &mut self.rules {
            if rule.id.is_empty() {
                rule.id = key.clone();
            }
        }
        reset
    }

    /// Replace the content of both stores with this snapshot.
    pub fn restore(self, thoughts: &ThoughtStore, rules: &RuleStore) {
        thoughts.replace_all(self.thoughts.into_values());
        rules.replace_all(self.rules.into_values());
    }
}
