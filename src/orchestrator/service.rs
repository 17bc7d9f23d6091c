//! Async driver for the orchestrator.
//!
//! The orchestrator is owned by a single tokio task. Callers talk to it
//! through a cloneable [`OrchestratorHandle`]; the store talks to it through
//! the gateway's event channel. Store events are handled before commands so a
//! query issued after a call observes the events that call produced.

use std::future::pending;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use super::{PurchaseOrchestrator, StoreState};
use crate::error::{IapError, Result, msg};
use crate::gateway::EventReceiver;
use crate::models::OperationToken;

const COMMAND_BUFFER: usize = 32;

enum Command {
    Initialize(oneshot::Sender<Result<()>>),
    Purchase(String, oneshot::Sender<Result<OperationToken>>),
    Restore(oneshot::Sender<Result<OperationToken>>),
    AlreadyPurchased(String, oneshot::Sender<bool>),
    PriceLabel(String, oneshot::Sender<Option<String>>),
    State(oneshot::Sender<StoreState>),
    Shutdown,
}

/// Cloneable handle to a running [`OrchestratorService`].
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
}

impl OrchestratorHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| IapError::Internal(msg::SERVICE_STOPPED.into()))?;
        rx.await
            .map_err(|_| IapError::Internal(msg::SERVICE_STOPPED.into()))
    }

    pub async fn initialize(&self) -> Result<()> {
        self.request(Command::Initialize).await?
    }

    pub async fn purchase(&self, product_id: &str) -> Result<OperationToken> {
        let product_id = product_id.to_string();
        self.request(|tx| Command::Purchase(product_id, tx)).await?
    }

    pub async fn restore(&self) -> Result<OperationToken> {
        self.request(Command::Restore).await?
    }

    pub async fn already_purchased(&self, product_id: &str) -> Result<bool> {
        let product_id = product_id.to_string();
        self.request(|tx| Command::AlreadyPurchased(product_id, tx))
            .await
    }

    pub async fn price_label(&self, product_id: &str) -> Result<Option<String>> {
        let product_id = product_id.to_string();
        self.request(|tx| Command::PriceLabel(product_id, tx)).await
    }

    pub async fn state(&self) -> Result<StoreState> {
        self.request(Command::State).await
    }

    /// Stop the service. Pending store events are dropped.
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| IapError::Internal(msg::SERVICE_STOPPED.into()))
    }
}

pub struct OrchestratorService {
    orchestrator: PurchaseOrchestrator,
    commands: mpsc::Receiver<Command>,
    events: EventReceiver,
}

impl OrchestratorService {
    /// Run `orchestrator` on a new task. The join handle yields the
    /// orchestrator back once the service shuts down.
    pub fn spawn(
        orchestrator: PurchaseOrchestrator,
        events: EventReceiver,
    ) -> (OrchestratorHandle, JoinHandle<PurchaseOrchestrator>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let service = Self {
            orchestrator,
            commands: rx,
            events,
        };

        let task = tokio::spawn(service.run());
        (OrchestratorHandle { commands: tx }, task)
    }

    async fn run(mut self) -> PurchaseOrchestrator {
        tracing::debug!("Orchestrator service started");
        let mut events_open = true;

        loop {
            let deadline = self.orchestrator.next_deadline();

            tokio::select! {
                biased;

                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.orchestrator.dispatch(event),
                    None => {
                        tracing::warn!("Store event channel closed");
                        events_open = false;
                    }
                },

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },

                _ = wait_until(deadline) => {
                    self.orchestrator.expire_overdue(Instant::now());
                }
            }
        }

        tracing::debug!("Orchestrator service stopped");
        self.orchestrator
    }

    fn handle(&mut self, command: Command) {
        // A dropped reply receiver means the caller stopped waiting.
        match command {
            Command::Initialize(reply) => {
                let _ = reply.send(self.orchestrator.initialize());
            }
            Command::Purchase(product_id, reply) => {
                let _ = reply.send(self.orchestrator.purchase(&product_id));
            }
            Command::Restore(reply) => {
                let _ = reply.send(self.orchestrator.restore());
            }
            Command::AlreadyPurchased(product_id, reply) => {
                let _ = reply.send(self.orchestrator.already_purchased(&product_id));
            }
            Command::PriceLabel(product_id, reply) => {
                let _ = reply.send(self.orchestrator.price_label(&product_id));
            }
            Command::State(reply) => {
                let _ = reply.send(self.orchestrator.state());
            }
            Command::Shutdown => {}
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
