/*!
 * Agent Lifecycle
 * One-shot startup handshake with BlueZ, then wait for disconnect
 */

use std::fmt;
use std::future::Future;
use tracing::{info, warn};

use crate::bluez::{adapter_path, AgentBus, AGENT_CAPABILITY};
use crate::config::AgentConfig;
use crate::error::AgentResult;
use crate::policy::PolicyResponder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Disconnected,
    Connected,
    Discoverable,
    Exported,
    Registered,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Disconnected => "disconnected",
            LifecycleState::Connected => "connected",
            LifecycleState::Discoverable => "discoverable",
            LifecycleState::Exported => "exported",
            LifecycleState::Registered => "registered",
        };
        f.write_str(name)
    }
}

/// This process's standing registration with the agent manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRegistration {
    pub path: String,
    pub capability: &'static str,
    pub adapter: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shutdown {
    Interrupted,
    Disconnected(String),
}

pub struct AgentLifecycle<B> {
    bus: B,
    config: AgentConfig,
    state: LifecycleState,
}

impl<B: AgentBus> AgentLifecycle<B> {
    /// Wraps an already connected bus.
    pub fn new(bus: B, config: AgentConfig) -> Self {
        let mut lifecycle = Self {
            bus,
            config,
            state: LifecycleState::Disconnected,
        };
        lifecycle.advance(LifecycleState::Connected);
        lifecycle
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn advance(&mut self, next: LifecycleState) {
        tracing::debug!("Agent lifecycle: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Runs the setup handshake. Any failure leaves the state where it stopped.
    pub async fn start(&mut self, adapter: &str) -> AgentResult<AgentRegistration> {
        let address = self.bus.resolve_adapter(adapter).await?;
        info!("Enabling infinite discovery on adapter {} ({})", adapter, address);
        self.bus.make_discoverable(adapter).await?;
        self.advance(LifecycleState::Discoverable);

        let path = self.config.agent_path.clone();
        self.bus.export_agent(&path, PolicyResponder::new())?;
        self.advance(LifecycleState::Exported);

        info!("Registering agent at {}", path);
        self.bus
            .register_agent(&path, AGENT_CAPABILITY)
            .await?;
        self.bus.request_default_agent(&path).await?;
        self.advance(LifecycleState::Registered);
        info!("Agent registered as default agent");

        Ok(AgentRegistration {
            path,
            capability: AGENT_CAPABILITY,
            adapter: adapter_path(adapter),
        })
    }

    /// Runs startup and then waits, with `shutdown` able to interrupt either.
    pub async fn run<F>(&mut self, adapter: &str, shutdown: F) -> AgentResult<Shutdown>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let started = tokio::select! {
            result = self.start(adapter) => Some(result),
            _ = &mut shutdown => None,
        };
        let registration = match started {
            Some(result) => result?,
            None => {
                info!("Shutdown requested while {}, exiting", self.state);
                return Ok(Shutdown::Interrupted);
            }
        };
        info!(
            "Agent ready at {} ({}) for {}",
            registration.path, registration.capability, registration.adapter
        );

        Ok(self.serve(shutdown).await)
    }

    /// Blocks until the bus goes away or `shutdown` resolves.
    pub async fn serve<F>(&mut self, shutdown: F) -> Shutdown
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            reason = self.bus.disconnected() => Shutdown::Disconnected(reason),
            _ = shutdown => Shutdown::Interrupted,
        };

        match &outcome {
            Shutdown::Interrupted => info!("Shutdown requested, exiting"),
            Shutdown::Disconnected(reason) => warn!("System bus disconnected: {}", reason),
        }
        outcome
    }
}
