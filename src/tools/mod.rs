//! Built-in tools: text generation, vector memory, user interaction and
//! engine self-management.

pub mod core;
pub mod llm;
pub mod memory;
pub mod user_interaction;

pub use self::core::CoreTool;
pub use self::llm::LlmTool;
pub use self::memory::MemoryTool;
pub use self::user_interaction::UserInteractionTool;

use crate::tool::ToolRegistry;

/// Register every built-in tool.
pub fn register_builtin(registry: &mut ToolRegistry) {
    registry.register(LlmTool);
    registry.register(MemoryTool);
    registry.register(UserInteractionTool);
    registry.register(CoreTool);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use crate::llm::{Generator, LlmError, LlmResult};
    use crate::memory::EmbeddingMemory;
    use crate::store::{RuleStore, ThoughtStore};
    use crate::tool::ToolContext;

    /// Replies with a fixed text and records prompts.
    pub struct ScriptedGenerator {
        pub reply: Option<String>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl Generator for ScriptedGenerator {
        fn generate(&self, prompt: &str) -> LlmResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().ok_or(LlmError::RequestFailed {
                message: "scripted failure".into(),
            })
        }

        fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
            if self.reply.is_none() {
                return Err(LlmError::EmptyEmbedding);
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    pub fn context(generator: ScriptedGenerator) -> ToolContext {
        let generator: Arc<dyn Generator> = Arc::new(generator);
        let memory = Arc::new(EmbeddingMemory::new(Arc::clone(&generator)));
        ToolContext::new(
            Arc::new(ThoughtStore::new("thoughts")),
            Arc::new(RuleStore::new("rules")),
            generator,
            memory,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names() {
        let mut registry = ToolRegistry::new();
        register_builtin(&mut registry);
        assert_eq!(
            registry.names(),
            ["core", "llm", "memory", "user_interaction"]
        );
    }
}
