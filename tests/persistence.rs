//! Persistence and recovery tests.
//!
//! These tests verify that thoughts, rules, and their beliefs survive a
//! restart (save + reopen cycle), and that interrupted work is picked up
//! again.

use std::path::Path;
use std::sync::Arc;

use mindloop::bootstrap::RulePack;
use mindloop::engine::{Engine, EngineConfig};
use mindloop::llm::{Generator, LlmResult, OfflineGenerator};
use mindloop::memory::{EmbeddingMemory, MemoryEntry, VectorMemory};
use mindloop::persist::{Persister, load_memory, load_snapshot, memory_path, save_snapshot};
use mindloop::rule::Rule;
use mindloop::term::Term;
use mindloop::thought::{Thought, ThoughtKind, ThoughtStatus};
use mindloop::tool::ToolRegistry;

fn fresh_engine() -> Engine {
    let generator: Arc<dyn Generator> = Arc::new(OfflineGenerator);
    let memory = Arc::new(EmbeddingMemory::new(Arc::clone(&generator)));
    let mut tools = ToolRegistry::new();
    mindloop::tools::register_builtin(&mut tools);
    Engine::new(EngineConfig::default(), tools, generator, memory).unwrap()
}

/// Open an engine over a state file, the way the CLI does.
fn open_engine(state: &Path) -> (Engine, Persister) {
    let engine = fresh_engine();
    if let Some(snapshot) = load_snapshot(state).unwrap() {
        engine.restore(snapshot);
    }
    let persister = Persister::new(state);
    persister.watch(engine.thoughts(), engine.rules());
    (engine, persister)
}

#[test]
fn thoughts_and_rules_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    // First session: add state, adjust beliefs, save.
    {
        let (engine, persister) = open_engine(&state);
        engine
            .add_rule(Rule::with_id(
                "r1",
                Term::parse("todo(?T)").unwrap(),
                Term::parse("core(add_thought, GOAL, ?T)").unwrap(),
            ))
            .unwrap();
        engine
            .add_thought(
                Thought::with_id("t1", ThoughtKind::Input, Term::parse("todo(\"write docs\")").unwrap())
                    .with_priority(2.5),
            )
            .unwrap();
        engine.rules().modify("r1", |r| r.belief.update(false));
        assert!(persister.is_dirty());
        persister.save(engine.thoughts(), engine.rules()).unwrap();
        assert!(!persister.is_dirty());
    }

    // Second session: reopen and verify.
    {
        let (engine, _persister) = open_engine(&state);
        assert_eq!(engine.thoughts().count(), 1);
        assert_eq!(engine.rules().count(), 1);

        let t = engine.thoughts().get("t1").unwrap();
        assert_eq!(t.kind, ThoughtKind::Input);
        assert_eq!(t.content, Term::parse("todo(\"write docs\")").unwrap());
        assert_eq!(t.metadata.priority, Some(2.5));
        assert_eq!(t.status, ThoughtStatus::Pending);

        let r = engine.rules().get("r1").unwrap();
        assert_eq!(r.belief.neg, 2.0);
        assert_eq!(r.tool_name(), Some("core"));

        // Prefix lookup still works on reloaded ids.
        assert_eq!(engine.resolve_thought("t1").unwrap().id, "t1");
    }
}

#[test]
fn interrupted_attempts_resume_as_pending() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    {
        let engine = fresh_engine();
        engine
            .add_thought(
                Thought::with_id("busy", ThoughtKind::Goal, Term::atom("deploy"))
                    .with_status(ThoughtStatus::Active),
            )
            .unwrap();
        engine
            .add_thought(
                Thought::with_id("parked", ThoughtKind::Query, Term::atom("which host"))
                    .with_status(ThoughtStatus::Waiting),
            )
            .unwrap();
        save_snapshot(&state, &engine.snapshot()).unwrap();
    }

    let (engine, _persister) = open_engine(&state);
    assert_eq!(engine.thoughts().get("busy").unwrap().status, ThoughtStatus::Pending);
    // Only ACTIVE is reset; WAITING survives as is.
    assert_eq!(engine.thoughts().get("parked").unwrap().status, ThoughtStatus::Waiting);
}

#[test]
fn json_round_trip_through_engine() {
    let engine = fresh_engine();
    engine
        .add_thought(Thought::with_id("a", ThoughtKind::from("NOTE".to_string()), Term::atom("x")))
        .unwrap();
    let json = engine.to_json().unwrap();
    assert!(json.contains("\"thoughts\""));
    assert!(json.contains("\"NOTE\""));

    let other = fresh_engine();
    other.load_json(&json).unwrap();
    assert_eq!(other.thoughts().get("a").unwrap().kind, ThoughtKind::Other("NOTE".into()));
    assert!(other.load_json("{not json").is_err());
}

#[test]
fn missing_state_file_means_empty_engine() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = dir.path().join("nothing-here.json");
    assert!(load_snapshot(&state).unwrap().is_none());

    let (engine, persister) = open_engine(&state);
    assert!(engine.thoughts().is_empty());
    assert!(!persister.flush(engine.thoughts(), engine.rules()).unwrap());
    assert!(!state.exists());
}

#[test]
fn corrupt_state_file_is_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = dir.path().join("state.json");
    std::fs::write(&state, "{\"thoughts\": [1, 2").unwrap();
    let err = load_snapshot(&state).unwrap_err();
    assert!(err.to_string().contains("state.json"));
}

#[test]
fn bootstrap_pack_applies_once_across_restarts() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = dir.path().join("state.json");
    let pack = RulePack::bootstrap().unwrap();

    {
        let (engine, persister) = open_engine(&state);
        assert!(engine.rules().is_empty());
        let report = pack.apply(engine.rules());
        assert_eq!(report.applied, pack.rules.len());
        assert!(persister.flush(engine.thoughts(), engine.rules()).unwrap());
    }

    {
        let (engine, _persister) = open_engine(&state);
        assert_eq!(engine.rules().count(), pack.rules.len());
        assert_eq!(pack.apply(engine.rules()).applied, 0);
    }
}

#[tokio::test]
async fn processed_state_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    {
        let (engine, persister) = open_engine(&state);
        RulePack::bootstrap().unwrap().apply(engine.rules());
        engine
            .add_thought(Thought::with_id("t1", ThoughtKind::Input, Term::parse("todo(release)").unwrap()))
            .unwrap();
        let reports = engine.run_until_idle(5).await;
        assert!(!reports.is_empty());
        persister.flush(engine.thoughts(), engine.rules()).unwrap();
    }

    let (engine, _persister) = open_engine(&state);
    let t1 = engine.thoughts().get("t1").unwrap();
    assert_eq!(t1.status, ThoughtStatus::Done);
    assert_eq!(t1.metadata.rule_id.as_deref(), Some("bootstrap-todo"));

    let goals = engine.thoughts().children_of("t1");
    assert_eq!(goals.len(), 1);
    assert_eq!(goals[0].kind, ThoughtKind::Goal);
    assert_eq!(goals[0].content, Term::atom("release"));
    assert!(engine.rules().get("bootstrap-todo").unwrap().belief.pos >= 2.0);
}

/// Embeds text as vowel counts, plus one so no vector is zero.
struct VowelEmbedder;

impl Generator for VowelEmbedder {
    fn generate(&self, prompt: &str) -> LlmResult<String> {
        Ok(prompt.to_string())
    }

    fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        let mut v = vec![1.0; 5];
        for c in text.chars() {
            if let Some(i) = "aeiou".find(c.to_ascii_lowercase()) {
                v[i] += 1.0;
            }
        }
        Ok(v)
    }
}

/// Open an engine with memory restored from next to the state file.
fn open_with_memory(state: &Path) -> (Engine, Arc<EmbeddingMemory>, Persister) {
    let generator: Arc<dyn Generator> = Arc::new(VowelEmbedder);
    let memory = Arc::new(EmbeddingMemory::new(Arc::clone(&generator)));
    if let Some(saved) = load_memory(&memory_path(state)).unwrap() {
        memory.restore(saved);
    }
    let mut tools = ToolRegistry::new();
    mindloop::tools::register_builtin(&mut tools);
    let engine = Engine::new(EngineConfig::default(), tools, generator, memory.clone()).unwrap();
    if let Some(snapshot) = load_snapshot(state).unwrap() {
        engine.restore(snapshot);
    }
    let persister = Persister::new(state).with_memory(Arc::clone(&memory));
    persister.watch(engine.thoughts(), engine.rules());
    (engine, memory, persister)
}

#[tokio::test]
async fn remembered_outcomes_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    {
        let (engine, memory, persister) = open_with_memory(&state);
        engine
            .add_thought(Thought::with_id("o1", ThoughtKind::Outcome, Term::atom("aaaa done")))
            .unwrap();
        engine
            .add_thought(Thought::with_id("o2", ThoughtKind::Outcome, Term::atom("uuuu shipped")))
            .unwrap();
        engine.run_until_idle(5).await;
        assert_eq!(memory.len(), 2);
        assert!(persister.flush(engine.thoughts(), engine.rules()).unwrap());
        assert!(!persister.is_dirty());
    }
    assert!(memory_path(&state).exists());

    let (engine, memory, persister) = open_with_memory(&state);
    assert!(!persister.is_dirty());
    assert_eq!(memory.len(), 2);
    let hits = memory.search("aaa", 1);
    assert_eq!(hits[0].id, "o1");
    assert_eq!(hits[0].content, "aaaa done");

    // A new entry alone is enough to make the persister save again.
    memory.add(MemoryEntry::new("m3", "eee")).unwrap();
    assert!(persister.is_dirty());
    assert!(persister.flush(engine.thoughts(), engine.rules()).unwrap());
    assert_eq!(load_memory(&memory_path(&state)).unwrap().unwrap().entries.len(), 3);
}
