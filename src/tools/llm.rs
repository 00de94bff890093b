//! LLM tool: expand a thought into children, or generate free text.
//!
//! - `llm(expand, KIND)` asks the generator to break the thought down and
//!   adds one child thought of `KIND` per non-empty response line.
//! - `llm(generate, Prompt)` stores the completion on the thought under
//!   `extra["response"]` and returns it.

use std::sync::LazyLock;

use regex::Regex;

use crate::term::Term;
use crate::thought::{Thought, ThoughtKind};
use crate::tool::{Invocation, Tool, ToolContext, ToolError, ToolParam, ToolResult, ToolSignature};

const NAME: &str = "llm";

/// Upper bound on children created by one expansion.
const MAX_EXPANSION: usize = 10;

/// Leading list markers: `- `, `* `, `• `, `1. `, `2) `.
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]+|\d+[.)])\s*").unwrap());

pub struct LlmTool;

impl Tool for LlmTool {
    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: NAME.into(),
            description: "Expand a thought into child thoughts, or generate text.".into(),
            parameters: vec![
                ToolParam::required("expand, KIND", "Create one child thought of KIND per generated item."),
                ToolParam::required("generate, Prompt", "Generate text for Prompt and attach it to the thought."),
            ],
        }
    }

    fn execute(&self, action: &Term, ctx: &ToolContext, thought: &Thought) -> ToolResult<Term> {
        let inv = Invocation::new(NAME, action);
        match inv.verb()? {
            "expand" => {
                let kind = match inv.require(1, "kind")? {
                    Term::Atom(kind) => ThoughtKind::from(kind.as_str()),
                    other => return Err(inv.invalid(format!("kind must be an atom, got {other}"))),
                };
                expand(ctx, thought, kind)
            }
            "generate" => {
                let prompt = inv.require(1, "prompt")?.text();
                let response = complete(ctx, &prompt)?;
                ctx.modify_thought(&thought.id, |t| {
                    t.metadata.extra.insert("response".into(), response.clone());
                })?;
                Ok(Term::atom(response))
            }
            other => Err(inv.invalid(format!("unknown operation \"{other}\""))),
        }
    }
}

fn complete(ctx: &ToolContext, prompt: &str) -> ToolResult<String> {
    ctx.generator
        .generate(prompt)
        .map_err(|e| ToolError::Execution {
            tool_name: NAME.into(),
            message: e.to_string(),
        })
}

fn expand(ctx: &ToolContext, thought: &Thought, kind: ThoughtKind) -> ToolResult<Term> {
    let prompt = expansion_prompt(thought, &kind);
    let response = complete(ctx, &prompt)?;
    let items = parse_items(&response);
    if items.is_empty() {
        return Ok(Term::error(format!(
            "model returned no {} items",
            kind.as_str().to_ascii_lowercase()
        )));
    }

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let child = Thought::new(kind.clone(), Term::atom(item)).child_of(thought);
        ids.push(Term::atom(child.id.clone()));
        ctx.add_thought(child)?;
    }
    tracing::debug!(parent = %thought.id, %kind, children = ids.len(), "expanded thought");
    Ok(Term::list(ids))
}

fn expansion_prompt(thought: &Thought, target: &ThoughtKind) -> String {
    let from = thought.kind.as_str().to_ascii_lowercase();
    let to = target.as_str().to_ascii_lowercase();
    format!(
        "You are helping a user organise their work.\n\
         Given this {from}:\n\n{}\n\n\
         List up to {MAX_EXPANSION} concrete {to} items that follow from it. \
         Write one item per line with no commentary.",
        thought.content.text()
    )
}

/// Split a model response into list items, dropping markers and blanks.
pub fn parse_items(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .take(MAX_EXPANSION)
        .collect()
}
