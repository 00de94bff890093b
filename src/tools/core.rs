//! Core tool: engine self-management from rule actions.
//!
//! | action                              | effect                                   |
//! |-------------------------------------|------------------------------------------|
//! | `core(set_status, S)`               | set the trigger thought's status         |
//! | `core(add_thought, TYPE, Content)`  | add a child thought                      |
//! | `core(add_rule, Pattern, Action)`   | add a runtime rule                       |
//! | `core(delete_thought, Id)`          | delete a thought by id or prefix         |
//! | `core(log, Msg)`                    | emit an info log line                    |

use crate::rule::Rule;
use crate::term::Term;
use crate::thought::{Thought, ThoughtKind, ThoughtStatus};
use crate::tool::{Invocation, Tool, ToolContext, ToolParam, ToolResult, ToolSignature};

const NAME: &str = "core";

pub struct CoreTool;

impl Tool for CoreTool {
    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: NAME.into(),
            description: "Manage thoughts and rules from within the engine.".into(),
            parameters: vec![
                ToolParam::optional("set_status, S", "Set the thought's status (PENDING, DONE, FAILED, ...)."),
                ToolParam::optional("add_thought, TYPE, Content", "Add a child thought."),
                ToolParam::optional("add_rule, Pattern, Action", "Add a rule with runtime provenance."),
                ToolParam::optional("delete_thought, Id", "Delete a thought by id or unique prefix."),
                ToolParam::optional("log, Msg", "Log a message."),
            ],
        }
    }

    fn execute(&self, action: &Term, ctx: &ToolContext, thought: &Thought) -> ToolResult<Term> {
        let inv = Invocation::new(NAME, action);
        match inv.verb()? {
            "set_status" => {
                let raw = inv.require(1, "status")?.text();
                let status: ThoughtStatus = raw.parse().map_err(|e: String| inv.invalid(e))?;
                if status == ThoughtStatus::Active {
                    return Err(inv.invalid("ACTIVE is reserved for the engine"));
                }
                ctx.set_status(&thought.id, status)?;
                Ok(Term::atom(status.as_str()))
            }
            "add_thought" => {
                let kind = ThoughtKind::from(inv.require(1, "type")?.text());
                let content = inv.require(2, "content")?.clone();
                let child = Thought::new(kind, content).child_of(thought);
                let id = child.id.clone();
                ctx.add_thought(child)?;
                Ok(Term::atom(id))
            }
            "add_rule" => {
                let pattern = inv.require(1, "pattern")?.clone();
                let rule_action = inv.require(2, "action")?.clone();
                if !matches!(rule_action, Term::Structure { .. }) {
                    return Err(inv.invalid(format!(
                        "rule action must be a structure, got {rule_action}"
                    )));
                }
                let rule = Rule::new(pattern, rule_action)
                    .with_provenance("runtime")
                    .with_description(format!("added by thought {}", thought.id));
                let id = rule.id.clone();
                ctx.add_rule(rule)?;
                tracing::info!(rule = %id, "runtime rule added");
                Ok(Term::atom(id))
            }
            "delete_thought" => {
                let prefix = inv.require(1, "id")?.text();
                let target = ctx.delete_thought(&prefix)?;
                Ok(Term::atom(target.id))
            }
            "log" => {
                let msg = inv.require(1, "message")?.text();
                tracing::info!(thought = %thought.id, "{msg}");
                Ok(Term::atom("ok"))
            }
            other => Err(inv.invalid(format!("unknown operation \"{other}\""))),
        }
    }
}
