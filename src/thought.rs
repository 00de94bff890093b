//! Thoughts: the unit of work the engine schedules.
//!
//! A thought carries symbolic content, a [`Belief`], a lifecycle
//! [`ThoughtStatus`] and a fixed metadata record. Thoughts are only ever
//! mutated through the [`ThoughtStore`](crate::store::ThoughtStore).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::belief::Belief;
use crate::store::Record;
use crate::term::Term;

/// What a thought represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ThoughtKind {
    /// Raw user note.
    Input,
    Goal,
    Strategy,
    Outcome,
    Query,
    /// A pending question to the user; completed by a response.
    UserPrompt,
    System,
    /// Extension point for tool-specific kinds.
    Other(String),
}

impl ThoughtKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Input => "INPUT",
            Self::Goal => "GOAL",
            Self::Strategy => "STRATEGY",
            Self::Outcome => "OUTCOME",
            Self::Query => "QUERY",
            Self::UserPrompt => "USER_PROMPT",
            Self::System => "SYSTEM",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for ThoughtKind {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "INPUT" => Self::Input,
            "GOAL" => Self::Goal,
            "STRATEGY" => Self::Strategy,
            "OUTCOME" => Self::Outcome,
            "QUERY" => Self::Query,
            "USER_PROMPT" => Self::UserPrompt,
            "SYSTEM" => Self::System,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for ThoughtKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<ThoughtKind> for String {
    fn from(kind: ThoughtKind) -> Self {
        match kind {
            ThoughtKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ThoughtKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a thought.
///
/// `Pending → Active → {Done | Failed | Waiting}`, and `Waiting → Pending`
/// once the awaited response arrives. `Active` only exists while the engine
/// holds an attempt on the thought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThoughtStatus {
    Pending,
    Active,
    Waiting,
    Done,
    Failed,
}

impl ThoughtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Waiting => "WAITING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ThoughtStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThoughtStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "WAITING" => Ok(Self::Waiting),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown thought status: {other}")),
        }
    }
}

/// Well-known thought metadata plus an open extension slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThoughtMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Rule that last advanced this thought.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Unix milliseconds.
    pub created_at: u64,
    /// Unix milliseconds.
    pub modified_at: u64,
    /// Explicit sampling weight; overrides the belief score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retries: u32,
    /// Id of the external request this thought is suspended on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_for: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ThoughtKind,
    pub content: Term,
    #[serde(default)]
    pub belief: Belief,
    pub status: ThoughtStatus,
    #[serde(default)]
    pub metadata: ThoughtMetadata,
}

impl Thought {
    /// Create a pending thought with a fresh id.
    pub fn new(kind: impl Into<ThoughtKind>, content: Term) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), kind, content)
    }

    /// Create a pending thought with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, kind: impl Into<ThoughtKind>, content: Term) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            content,
            belief: Belief::default(),
            status: ThoughtStatus::Pending,
            metadata: ThoughtMetadata::default(),
        }
    }

    /// Link this thought beneath `parent`, inheriting its root.
    pub fn child_of(mut self, parent: &Thought) -> Self {
        self.metadata.parent_id = Some(parent.id.clone());
        self.metadata.root_id = Some(parent.root_id().to_string());
        self
    }

    pub fn with_status(mut self, status: ThoughtStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.metadata.priority = Some(priority);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.push(tag.into());
        self
    }

    /// Root of this thought's tree (itself when it has no recorded root).
    pub fn root_id(&self) -> &str {
        self.metadata.root_id.as_deref().unwrap_or(&self.id)
    }

    /// Weight used when sampling among pending thoughts.
    pub fn sampling_weight(&self) -> f64 {
        self.metadata.priority.unwrap_or_else(|| self.belief.score())
    }
}

impl Record for Thought {
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

impl std::fmt::Display for Thought {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short: String = self.id.chars().take(8).collect();
        write!(
            f,
            "{short} {:<11} {:<8} {:.2} {}",
            self.kind.as_str(),
            self.status.as_str(),
            self.belief.score(),
            self.content
        )
    }
}
