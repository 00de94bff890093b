//! Rule packs: TOML bundles of rules used to seed an empty state.
//!
//! The `bootstrap` pack is bundled into the binary. Further packs can be read
//! from disk with [`RulePack::load`].

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::rule::Rule;
use crate::store::RuleStore;
use crate::term::Term;

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, Diagnostic)]
pub enum BootstrapError {
    #[error("failed to parse rule pack \"{id}\": {message}")]
    #[diagnostic(
        code(mindloop::bootstrap::parse),
        help("Check the TOML syntax and that every pattern and action is a valid term.")
    )]
    Parse { id: String, message: String },

    #[error("failed to read rule pack: {path}")]
    #[diagnostic(code(mindloop::bootstrap::io), help("Ensure the file exists and is readable."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type BootstrapResult<T> = std::result::Result<T, BootstrapError>;

// ── Data model ──────────────────────────────────────────────────────────

/// A parsed rule pack.
#[derive(Debug, Clone)]
pub struct RulePack {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub rules: Vec<Rule>,
    pub source: PackSource,
}

/// Where a rule pack came from.
#[derive(Debug, Clone, PartialEq)]
pub enum PackSource {
    /// Bundled into the binary via `include_str!`.
    Bundled,
    External(PathBuf),
}

/// Report after applying a pack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackReport {
    pub applied: usize,
    /// Rules whose id already existed.
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct PackToml {
    pack: PackMeta,
    #[serde(default)]
    rules: Vec<RuleToml>,
}

#[derive(Debug, Deserialize)]
struct PackMeta {
    id: String,
    name: String,
    version: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RuleToml {
    id: String,
    pattern: String,
    action: String,
    #[serde(default)]
    priority: f64,
    #[serde(default)]
    description: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

// ── Loading ─────────────────────────────────────────────────────────────

const BOOTSTRAP_TOML: &str = include_str!("../data/rules/bootstrap.toml");

impl RulePack {
    /// The bundled `bootstrap` pack.
    pub fn bootstrap() -> BootstrapResult<Self> {
        Self::parse(BOOTSTRAP_TOML, PackSource::Bundled)
    }

    /// Load a pack from a TOML file.
    pub fn load(path: &Path) -> BootstrapResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BootstrapError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, PackSource::External(path.to_path_buf()))
    }

    pub fn parse(toml_str: &str, source: PackSource) -> BootstrapResult<Self> {
        let parsed: PackToml = toml::from_str(toml_str).map_err(|e| BootstrapError::Parse {
            id: "(unknown)".into(),
            message: e.to_string(),
        })?;
        let pack_id = parsed.pack.id;
        let provenance = match &source {
            PackSource::Bundled => pack_id.clone(),
            PackSource::External(path) => path.display().to_string(),
        };

        let term = |rule_id: &str, what: &str, text: &str| {
            Term::parse(text).map_err(|e| BootstrapError::Parse {
                id: pack_id.clone(),
                message: format!("rule {rule_id}: bad {what} `{text}`: {e}"),
            })
        };

        let mut rules = Vec::with_capacity(parsed.rules.len());
        for r in parsed.rules {
            let pattern = term(&r.id, "pattern", &r.pattern)?;
            let action = term(&r.id, "action", &r.action)?;
            if !matches!(action, Term::Structure { .. }) {
                return Err(BootstrapError::Parse {
                    id: pack_id.clone(),
                    message: format!("rule {}: action must be a structure", r.id),
                });
            }
            let mut rule = Rule::with_id(r.id, pattern, action)
                .with_priority(r.priority)
                .with_description(r.description)
                .with_provenance(provenance.clone());
            rule.metadata.enabled = r.enabled;
            rules.push(rule);
        }

        Ok(Self {
            id: pack_id,
            name: parsed.pack.name,
            version: parsed.pack.version,
            description: parsed.pack.description,
            rules,
            source,
        })
    }

    /// Add every rule whose id is not already present.
    pub fn apply(&self, store: &RuleStore) -> PackReport {
        let mut report = PackReport::default();
        for rule in &self.rules {
            match store.add(rule.clone()) {
                Ok(()) => report.applied += 1,
                Err(_) => report.skipped += 1,
            }
        }
        tracing::info!(
            pack = %self.id,
            applied = report.applied,
            skipped = report.skipped,
            "rule pack applied"
        );
        report
    }
}
