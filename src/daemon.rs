//! Long-running scheduler loop.
//!
//! `Daemon` drives the engine from tokio intervals: a scheduling tick that
//! runs one batch, a feed tick that drains store deltas to the sink, and a
//! persistence tick that flushes the dirty flag. It stops on Ctrl+C (or any
//! shutdown future) or after `max_batches` non-empty batches, and always
//! saves before returning.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{AttemptReport, Engine};
use crate::feed::ChangeFeed;
use crate::persist::{PersistResult, Persister};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Scheduling interval (default: 1s).
    pub tick_interval: Duration,
    /// Change feed drain interval (default: 250ms).
    pub feed_interval: Duration,
    /// Persistence interval (default: 2s).
    pub persist_interval: Duration,
    /// Stop after this many non-empty batches (0 = unlimited).
    pub max_batches: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            feed_interval: Duration::from_millis(250),
            persist_interval: Duration::from_secs(2),
            max_batches: 0,
        }
    }
}

/// What a daemon run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaemonReport {
    pub batches: usize,
    pub attempts: usize,
    pub saves: usize,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

pub struct Daemon {
    engine: Arc<Engine>,
    feed: ChangeFeed,
    persister: Option<Persister>,
    config: DaemonConfig,
    report: DaemonReport,
}

impl Daemon {
    /// `persister` should already watch the engine's stores.
    pub fn new(
        engine: Arc<Engine>,
        feed: ChangeFeed,
        persister: Option<Persister>,
        config: DaemonConfig,
    ) -> Self {
        Self {
            engine,
            feed,
            persister,
            config,
            report: DaemonReport::default(),
        }
    }

    /// Run until Ctrl+C or the batch limit.
    pub async fn run(self) -> PersistResult<DaemonReport> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "daemon: cannot listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves or the batch limit. A batch in progress
    /// finishes first.
    pub async fn run_until<F>(mut self, shutdown: F) -> PersistResult<DaemonReport>
    where
        F: Future<Output = ()>,
    {
        use tokio::time::interval;

        tokio::pin!(shutdown);

        let mut schedule_tick = interval(self.config.tick_interval);
        let mut feed_tick = interval(self.config.feed_interval);
        let mut persist_tick = interval(self.config.persist_interval);

        self.feed.system("daemon started");
        tracing::info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            max_batches = self.config.max_batches,
            "daemon started"
        );

        loop {
            tokio::select! {
                _ = schedule_tick.tick() => {
                    let reports = self.engine.process_batch().await;
                    if !reports.is_empty() {
                        self.report.batches += 1;
                        self.report.attempts += reports.len();
                        self.feed.report(&reports);
                    }
                    if self.config.max_batches > 0 && self.report.batches >= self.config.max_batches {
                        self.feed.system(format!(
                            "daemon: max batches ({}) reached, shutting down",
                            self.config.max_batches
                        ));
                        break;
                    }
                }
                _ = feed_tick.tick() => {
                    self.feed.drain();
                }
                _ = persist_tick.tick() => {
                    self.flush();
                }
                _ = &mut shutdown => {
                    self.feed.system("daemon: received shutdown signal, saving state...");
                    break;
                }
            }
        }

        self.feed.drain();
        if let Some(persister) = &self.persister {
            persister.save(self.engine.thoughts(), self.engine.rules())?;
            self.report.saves += 1;
        }
        self.feed.system("daemon stopped");
        tracing::info!(
            batches = self.report.batches,
            attempts = self.report.attempts,
            "daemon stopped"
        );
        Ok(self.report)
    }

    fn flush(&mut self) {
        let Some(persister) = &self.persister else {
            return;
        };
        match persister.flush(self.engine.thoughts(), self.engine.rules()) {
            Ok(true) => self.report.saves += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "daemon: save failed"),
        }
    }
}

/// Run up to `max_batches` batches in the foreground, then publish the
/// store deltas and attempt reports to the feed.
pub async fn run_steps(engine: &Engine, feed: &ChangeFeed, max_batches: usize) -> Vec<AttemptReport> {
    let reports = engine.run_until_idle(max_batches).await;
    feed.drain();
    feed.report(&reports);
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::feed::{FeedMessage, VecSink};
    use crate::llm::{Generator, OfflineGenerator};
    use crate::memory::EmbeddingMemory;
    use crate::term::Term;
    use crate::thought::{Thought, ThoughtKind, ThoughtStatus};
    use crate::tool::{Tool, ToolContext, ToolRegistry, ToolResult, ToolSignature};
    use crate::tools::register_builtin;

    /// Sleeps before succeeding.
    struct Sleepy(Duration);

    impl Tool for Sleepy {
        fn signature(&self) -> ToolSignature {
            ToolSignature {
                name: "sleepy".into(),
                description: "sleeps".into(),
                parameters: Vec::new(),
            }
        }

        fn execute(&self, _action: &Term, _ctx: &ToolContext, _t: &Thought) -> ToolResult<Term> {
            std::thread::sleep(self.0);
            Ok(Term::atom("ok"))
        }
    }

    fn engine_with(tools: ToolRegistry) -> Arc<Engine> {
        let generator: Arc<dyn Generator> = Arc::new(OfflineGenerator);
        let memory = Arc::new(EmbeddingMemory::new(Arc::clone(&generator)));
        Arc::new(
            Engine::new(
                EngineConfig {
                    max_retries: 1,
                    ..Default::default()
                },
                tools,
                generator,
                memory,
            )
            .unwrap(),
        )
    }

    fn feed_for(engine: &Engine, sink: Arc<VecSink>) -> ChangeFeed {
        ChangeFeed::new(Arc::clone(engine.thoughts()), Arc::clone(engine.rules()), sink)
    }

    #[tokio::test]
    async fn stops_after_max_batches_and_saves() {
        let tmp = tempfile::TempDir::new().unwrap();
        let generator: Arc<dyn Generator> = Arc::new(OfflineGenerator);
        let memory = Arc::new(EmbeddingMemory::new(Arc::clone(&generator)));
        let mut tools = ToolRegistry::new();
        register_builtin(&mut tools);
        let engine = Arc::new(
            Engine::new(
                EngineConfig {
                    max_retries: 1,
                    ..Default::default()
                },
                tools,
                generator,
                memory,
            )
            .unwrap(),
        );
        engine
            .add_thought(Thought::with_id("t1", ThoughtKind::UserPrompt, Term::atom("hi")))
            .unwrap();

        let sink = Arc::new(VecSink::new());
        let feed = ChangeFeed::new(
            Arc::clone(engine.thoughts()),
            Arc::clone(engine.rules()),
            sink.clone(),
        );
        let persister = Persister::new(tmp.path().join("state.json"));
        persister.watch(engine.thoughts(), engine.rules());

        let config = DaemonConfig {
            tick_interval: Duration::from_millis(5),
            feed_interval: Duration::from_millis(5),
            persist_interval: Duration::from_millis(5),
            max_batches: 1,
        };
        let report = Daemon::new(Arc::clone(&engine), feed, Some(persister), config)
            .run()
            .await
            .unwrap();

        assert_eq!(report.batches, 1);
        assert_eq!(report.attempts, 1);
        assert!(report.saves >= 1);
        assert_eq!(engine.thoughts().get("t1").unwrap().status, ThoughtStatus::Done);
        assert!(tmp.path().join("state.json").exists());
        assert!(
            sink.messages()
                .iter()
                .any(|m| matches!(m, FeedMessage::Attempt { outcome, .. } if outcome == "succeeded"))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_during_batch_stops_after_it() {
        let mut tools = ToolRegistry::new();
        tools.register(Sleepy(Duration::from_millis(200)));
        let engine = engine_with(tools);
        engine
            .add_rule(crate::rule::Rule::with_id(
                "r1",
                Term::parse("GOAL(?G)").unwrap(),
                Term::parse("sleepy(?G)").unwrap(),
            ))
            .unwrap();
        engine
            .add_thought(Thought::with_id("t1", ThoughtKind::Goal, Term::parse("GOAL(x)").unwrap()))
            .unwrap();

        let sink = Arc::new(VecSink::new());
        let config = DaemonConfig {
            tick_interval: Duration::from_millis(5),
            feed_interval: Duration::from_millis(5),
            persist_interval: Duration::from_millis(5),
            max_batches: 0,
        };
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(());
        });

        let daemon = Daemon::new(Arc::clone(&engine), feed_for(&engine, sink.clone()), None, config);
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            daemon.run_until(async {
                let _ = rx.await;
            }),
        )
        .await
        .expect("daemon did not stop")
        .unwrap();

        assert_eq!(report.batches, 1);
        assert_eq!(engine.thoughts().get("t1").unwrap().status, ThoughtStatus::Done);
        assert!(
            sink.messages()
                .iter()
                .any(|m| matches!(m, FeedMessage::System { text } if text.contains("shutdown")))
        );
    }

    #[tokio::test]
    async fn steps_publish_deltas_and_reports() {
        let mut tools = ToolRegistry::new();
        register_builtin(&mut tools);
        let engine = engine_with(tools);
        engine
            .add_thought(Thought::with_id("t1", ThoughtKind::UserPrompt, Term::atom("hi")))
            .unwrap();
        engine.thoughts().get_delta();

        let sink = Arc::new(VecSink::new());
        let feed = feed_for(&engine, sink.clone());
        let reports = run_steps(&engine, &feed, 3).await;

        assert_eq!(reports.len(), 1);
        let messages = sink.messages();
        assert!(messages.iter().any(|m| matches!(m, FeedMessage::Thoughts { .. })));
        assert!(messages.iter().any(|m| matches!(m, FeedMessage::Attempt { .. })));
    }
}
