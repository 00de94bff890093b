//! Memory tool: store thoughts in vector memory and search it.

use crate::memory::MemoryEntry;
use crate::term::Term;
use crate::thought::Thought;
use crate::tool::{Invocation, Tool, ToolContext, ToolParam, ToolResult, ToolSignature};

const NAME: &str = "memory";
const DEFAULT_K: usize = 5;

pub struct MemoryTool;

impl Tool for MemoryTool {
    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: NAME.into(),
            description: "Store content in vector memory, or search it by similarity.".into(),
            parameters: vec![
                ToolParam::required("add", "Store the thought's own content."),
                ToolParam::optional("add, Content", "Store Content."),
                ToolParam::optional("search, Query, K", "Return up to K (default 5) nearest entries."),
            ],
        }
    }

    fn execute(&self, action: &Term, ctx: &ToolContext, thought: &Thought) -> ToolResult<Term> {
        let inv = Invocation::new(NAME, action);
        match inv.verb()? {
            "add" => {
                let entry = match inv.arg(1) {
                    None => MemoryEntry::new(thought.id.clone(), thought.content.text()),
                    Some(content) => {
                        MemoryEntry::new(uuid::Uuid::new_v4().to_string(), content.text())
                    }
                }
                .with_meta("thought", thought.id.clone())
                .with_meta("type", thought.kind.as_str())
                .with_meta("root", thought.root_id());

                let id = entry.id.clone();
                ctx.add_memory(entry)?;
                Ok(Term::atom(id))
            }
            "search" => {
                let query = inv.require(1, "query")?.text();
                let k = match inv.arg(2) {
                    None => DEFAULT_K,
                    Some(Term::Atom(n)) => n
                        .parse()
                        .map_err(|_| inv.invalid(format!("K must be a number, got {n}")))?,
                    Some(other) => return Err(inv.invalid(format!("K must be a number, got {other}"))),
                };
                let hits = ctx.memory.search(&query, k);
                tracing::debug!(%query, k, hits = hits.len(), "memory search");
                Ok(Term::list(
                    hits.into_iter().map(|h| Term::atom(h.content)).collect(),
                ))
            }
            other => Err(inv.invalid(format!("unknown operation \"{other}\""))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thought::ThoughtKind;
    use crate::tool::ToolError;
    use crate::tools::testing::{ScriptedGenerator, context};

    #[test]
    fn add_stores_thought_content() {
        let ctx = context(ScriptedGenerator::replying(""));
        let t = Thought::new(ThoughtKind::Outcome, Term::atom("v1 shipped"));
        let result = MemoryTool
            .execute(&Term::parse("memory(add)").unwrap(), &ctx, &t)
            .unwrap();
        assert_eq!(result, Term::atom(t.id.clone()));
        assert_eq!(ctx.memory.len(), 1);

        let hits = ctx.memory.search("v1 shipped", 1);
        assert_eq!(hits[0].content, "v1 shipped");
        assert_eq!(hits[0].metadata["type"], "OUTCOME");
    }

    #[test]
    fn add_explicit_content_and_search() {
        let ctx = context(ScriptedGenerator::replying(""));
        let t = Thought::new(ThoughtKind::Query, Term::atom("q"));
        MemoryTool
            .execute(&Term::parse("memory(add, \"note one\")").unwrap(), &ctx, &t)
            .unwrap();
        MemoryTool
            .execute(&Term::parse("memory(add, \"note two\")").unwrap(), &ctx, &t)
            .unwrap();

        let result = MemoryTool
            .execute(&Term::parse("memory(search, note, 1)").unwrap(), &ctx, &t)
            .unwrap();
        assert!(matches!(result, Term::List(ref hits) if hits.len() == 1));
    }

    #[test]
    fn embedding_failure_is_memory_error() {
        let ctx = context(ScriptedGenerator::failing());
        let t = Thought::new(ThoughtKind::Outcome, Term::atom("x"));
        assert!(matches!(
            MemoryTool.execute(&Term::parse("memory(add)").unwrap(), &ctx, &t),
            Err(ToolError::Memory(_))
        ));
    }

    #[test]
    fn bad_k_rejected() {
        let ctx = context(ScriptedGenerator::replying(""));
        let t = Thought::new(ThoughtKind::Query, Term::atom("q"));
        assert!(matches!(
            MemoryTool.execute(&Term::parse("memory(search, x, many)").unwrap(), &ctx, &t),
            Err(ToolError::InvalidAction { .. })
        ));
    }
}
