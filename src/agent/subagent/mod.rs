use crate::agent::runner::AgentRunner;
use crate::agent::{AgentRegistry, AgentRunResult, AgentSpec};
use crate::context::RunContext;
use crate::errors::SleuthError;
use futures_util::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

/// One entry in a [`SubagentSupervisor::spawn_multiple`] batch.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub agent_name: String,
    pub prompt: String,
}

impl SpawnRequest {
    pub fn new(agent_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            prompt: prompt.into(),
        }
    }
}

/// Async completion token for a spawned subagent.
///
/// Exactly one of the two channels receives exactly one value; the other
/// closes when the worker returns. Readers may select on either, or use
/// [`SubagentHandle::wait`].
#[derive(Debug)]
pub struct SubagentHandle {
    pub subagent_id: String,
    pub agent_name: String,
    result_rx: oneshot::Receiver<AgentRunResult>,
    error_rx: oneshot::Receiver<SleuthError>,
}

impl SubagentHandle {
    /// Await the subagent's outcome, whichever channel delivers it.
    pub async fn wait(self) -> Result<AgentRunResult, SleuthError> {
        let mut result_rx = self.result_rx;
        let mut error_rx = self.error_rx;
        tokio::select! {
            res = &mut result_rx => match res {
                Ok(result) => Ok(result),
                Err(_) => match error_rx.await {
                    Ok(err) => Err(err),
                    Err(_) => Err(SleuthError::Internal(anyhow::anyhow!(
                        "subagent worker terminated without reporting"
                    ))),
                },
            },
            err = &mut error_rx => match err {
                Ok(err) => Err(err),
                Err(_) => match result_rx.await {
                    Ok(result) => Ok(result),
                    Err(_) => Err(SleuthError::Internal(anyhow::anyhow!(
                        "subagent worker terminated without reporting"
                    ))),
                },
            },
        }
    }

    /// Split into the raw channels for callers who want to select manually.
    pub fn into_channels(
        self,
    ) -> (
        oneshot::Receiver<AgentRunResult>,
        oneshot::Receiver<SleuthError>,
    ) {
        (self.result_rx, self.error_rx)
    }
}

/// Wraps the engine for task delegation: synchronous, asynchronous and
/// parallel spawning over the same [`AgentRunner`].
///
/// Recursion prevention is not implemented here: the runner marks every
/// session context as subagent, and its tool dispatch refuses delegation
/// tools under that marker, so any delegation tool is blocked consistently.
pub struct SubagentSupervisor {
    runner: Arc<AgentRunner>,
    registry: Arc<dyn AgentRegistry>,
    spawn_counter: AtomicU64,
}

impl SubagentSupervisor {
    pub fn new(runner: Arc<AgentRunner>, registry: Arc<dyn AgentRegistry>) -> Self {
        Self {
            runner,
            registry,
            spawn_counter: AtomicU64::new(0),
        }
    }

    /// Run a subagent to completion and return its result.
    pub async fn spawn(
        &self,
        ctx: &RunContext,
        agent_name: &str,
        prompt: &str,
    ) -> Result<AgentRunResult, SleuthError> {
        let agent = self.validate_and_load(ctx, agent_name, prompt).await?;
        let subagent_id = self.mint_id();
        info!(
            "spawning subagent [{}] for agent '{}'",
            subagent_id, agent.name
        );
        self.runner.run(ctx, &agent, prompt, &subagent_id).await
    }

    /// Start a subagent in the background and return a completion handle.
    ///
    /// Validation and the agent load happen synchronously so a missing agent
    /// fails fast without creating a worker; an already-cancelled context
    /// fails fast the same way.
    pub async fn spawn_async(
        &self,
        ctx: &RunContext,
        agent_name: &str,
        prompt: &str,
    ) -> Result<SubagentHandle, SleuthError> {
        let agent = self.validate_and_load(ctx, agent_name, prompt).await?;
        ctx.check()?;

        let subagent_id = self.mint_id();
        let (result_tx, result_rx) = oneshot::channel();
        let (error_tx, error_rx) = oneshot::channel();

        let runner = self.runner.clone();
        let worker_ctx = ctx.clone();
        let prompt = prompt.to_string();
        let id = subagent_id.clone();
        let agent_name = agent.name.clone();
        info!("spawning async subagent [{}] for agent '{}'", id, agent_name);

        tokio::spawn(async move {
            match runner.run(&worker_ctx, &agent, &prompt, &id).await {
                Ok(result) => {
                    let _ = result_tx.send(result);
                }
                Err(err) => {
                    warn!("subagent [{}] failed: {}", id, err);
                    let _ = error_tx.send(err);
                }
            }
            // The unused sender drops here, closing its channel.
        });

        Ok(SubagentHandle {
            subagent_id,
            agent_name,
            result_rx,
            error_rx,
        })
    }

    /// Fan out over `requests`, preserving request order in the returned
    /// slots. A failed slot never aborts its siblings; cancelling `ctx`
    /// propagates to every in-flight worker.
    pub async fn spawn_multiple(
        &self,
        ctx: &RunContext,
        requests: &[SpawnRequest],
    ) -> Vec<Result<AgentRunResult, SleuthError>> {
        if requests.is_empty() {
            return Vec::new();
        }
        join_all(
            requests
                .iter()
                .map(|req| self.spawn(ctx, &req.agent_name, &req.prompt)),
        )
        .await
    }

    async fn validate_and_load(
        &self,
        ctx: &RunContext,
        agent_name: &str,
        prompt: &str,
    ) -> Result<AgentSpec, SleuthError> {
        if agent_name.is_empty() {
            return Err(SleuthError::InvalidInput(
                "agent name must not be empty".into(),
            ));
        }
        if prompt.is_empty() {
            return Err(SleuthError::InvalidInput("prompt must not be empty".into()));
        }
        self.registry.load_agent(ctx, agent_name).await
    }

    /// Unique within the process for the process lifetime: a monotonic
    /// counter plus a random suffix.
    fn mint_id(&self) -> String {
        let seq = self.spawn_counter.fetch_add(1, Ordering::Relaxed);
        let random = Uuid::new_v4().to_string()[..8].to_string();
        format!("sub-{}-{}", seq, random)
    }
}
