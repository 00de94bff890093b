//! User interaction tool: suspend a thought on a question to the user.
//!
//! `user_interaction(prompt, Question)` creates a USER_PROMPT thought in
//! WAITING status whose id is the request id, and parks the trigger thought
//! in WAITING with `waiting_for` set to that id. The answer arrives later
//! through [`Engine::handle_response`](crate::engine::Engine::handle_response).

use crate::term::Term;
use crate::thought::{Thought, ThoughtKind, ThoughtStatus};
use crate::tool::{Invocation, Tool, ToolContext, ToolParam, ToolResult, ToolSignature};

const NAME: &str = "user_interaction";

pub struct UserInteractionTool;

impl Tool for UserInteractionTool {
    fn signature(&self) -> ToolSignature {
        ToolSignature {
            name: NAME.into(),
            description: "Ask the user a question and wait for the answer.".into(),
            parameters: vec![ToolParam::required(
                "prompt, Question",
                "Question shown to the user.",
            )],
        }
    }

    fn execute(&self, action: &Term, ctx: &ToolContext, thought: &Thought) -> ToolResult<Term> {
        let inv = Invocation::new(NAME, action);
        match inv.verb()? {
            "prompt" => {
                let question = inv.require(1, "question")?.text();
                let request = Thought::new(ThoughtKind::UserPrompt, Term::atom(question))
                    .child_of(thought)
                    .with_status(ThoughtStatus::Waiting);
                let request_id = request.id.clone();
                ctx.add_thought(request)?;
                ctx.modify_thought(&thought.id, |t| {
                    t.status = ThoughtStatus::Waiting;
                    t.metadata.waiting_for = Some(request_id.clone());
                })?;
                tracing::info!(thought = %thought.id, request = %request_id, "waiting for user");
                Ok(Term::atom(request_id))
            }
            other => Err(inv.invalid(format!("unknown operation \"{other}\""))),
        }
    }
}
