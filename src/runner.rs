//! Runner
//!
//! Loads N agent configurations, builds N independent engines, staggers
//! their startup so they never fire their first request simultaneously,
//! and owns process-level shutdown. Stopping is graceful: resting engines
//! wake immediately, an in-flight publish is left to finish, and no new
//! cycle gets scheduled afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::Engine;
use crate::config::RunnerConfig;
use crate::generate::{backend_from_config, ContentGenerator};
use crate::protocol::ProtocolClient;
use crate::types::GenerationParams;

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Cooperative shutdown flag shared by every engine. Triggering wakes all
/// resting engines at once; nothing is aborted.
pub struct ShutdownSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `delay` unless shutdown arrives first. Returns whether
    /// the sleep was interrupted.
    pub async fn wait_interrupted(&self, delay: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register interest before re-checking the flag so a trigger
        // landing in between cannot be missed.
        notified.as_mut().enable();
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = &mut notified => true,
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Owns the spawned engine tasks and the shared shutdown signal.
pub struct Runner {
    shutdown: Arc<ShutdownSignal>,
    handles: Vec<JoinHandle<()>>,
    stagger: Duration,
}

impl Runner {
    pub fn new(stagger: Duration) -> Self {
        Self {
            shutdown: Arc::new(ShutdownSignal::new()),
            handles: Vec::new(),
            stagger,
        }
    }

    /// Build one engine per agent in `config`. Each engine gets its own
    /// protocol client and generation backend; engines share only the
    /// shutdown signal.
    pub fn build_engines(config: &RunnerConfig) -> Result<Vec<Engine>> {
        let protocol_timeout = Duration::from_secs(config.protocol_timeout_secs);
        let mut engines = Vec::with_capacity(config.agents.len());

        for agent in &config.agents {
            let protocol = Arc::new(
                ProtocolClient::new(&config.protocol_url, protocol_timeout)
                    .with_context(|| format!("Failed to build protocol client for {}", agent.name))?,
            );
            let generation_timeout = Duration::from_secs(agent.generation_timeout_secs);
            let backend = backend_from_config(&agent.backend, generation_timeout)
                .with_context(|| format!("Failed to build generation backend for {}", agent.name))?;
            let generator = ContentGenerator::new(
                backend,
                agent.system_prompt.clone(),
                GenerationParams {
                    temperature: agent.temperature,
                    max_tokens: agent.max_tokens,
                },
                generation_timeout,
            );
            engines.push(Engine::new(agent.clone(), protocol, generator));
        }

        Ok(engines)
    }

    /// Spawn every engine, offset by the stagger interval. Returns
    /// immediately; the engines run until shutdown.
    pub fn start(&mut self, engines: Vec<Engine>) {
        info!(count = engines.len(), "starting engines");

        for (index, engine) in engines.into_iter().enumerate() {
            let shutdown = Arc::clone(&self.shutdown);
            let offset = self.stagger * index as u32;
            let name = engine.identity().name.clone();

            let handle = tokio::spawn(async move {
                if !offset.is_zero() {
                    debug!(agent = %name, offset_secs = offset.as_secs(), "staggered start");
                    if shutdown.wait_interrupted(offset).await {
                        return;
                    }
                }
                engine.run(shutdown).await;
            });
            self.handles.push(handle);
        }
    }

    pub fn engine_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal shutdown and wait for every engine to wind down.
    pub async fn shutdown(&mut self) {
        info!("shutdown requested; stopping engines");
        self.shutdown.trigger();

        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                warn!(error = %err, "engine task ended abnormally");
            }
        }
        info!("all engines stopped");
    }
}
