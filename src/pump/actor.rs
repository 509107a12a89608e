//! Pump Task
//!
//! Every pump runs behind its own task that owns the `Pump` value outright.
//! Polling ticks, host writes and inbound responses all arrive as messages on
//! one queue and are applied strictly in arrival order, so a response can
//! never interleave with a tick halfway through its dispatch decision.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{PumpLinkError, Result};
use crate::events::EventBus;
use crate::gateway::ProtocolGateway;
use crate::types::{CommandRequest, PumpResponse};

use super::scheduler::TickOutcome;
use super::{Pump, PumpSnapshot};

/// Depth of a pump's message queue
const PUMP_QUEUE_CAPACITY: usize = 64;

/// Message applied to a pump by its task
#[derive(Debug)]
pub enum PumpRequest {
    /// Run one polling tick against the gateway
    Tick {
        reply: oneshot::Sender<Result<TickOutcome>>,
    },
    /// Queue a command into the dispatch slots
    Queue(CommandRequest),
    /// Drop any queued and planned command
    Cancel,
    /// Write a lock request immediately
    Lock { reply: oneshot::Sender<Result<()>> },
    /// Apply one decoded inbound response
    ApplyResponse(PumpResponse),
    SetActive(bool),
    SetLights(bool),
    SetPhysicalAddress(i64),
    SetChannel { value: i64, known_channels: Vec<u16> },
    /// Channel assignment claimed this pump
    AdoptChannel(u16),
    SetPrice { nozzle_id: u8, value: i64 },
    Snapshot {
        reply: oneshot::Sender<PumpSnapshot>,
    },
    Shutdown,
}

/// Cloneable handle to one pump task
#[derive(Debug, Clone)]
pub struct PumpHandle {
    id: u16,
    tx: mpsc::Sender<PumpRequest>,
}

impl PumpHandle {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub async fn tick(&self) -> Result<TickOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(PumpRequest::Tick { reply }).await?;
        rx.await.map_err(|_| PumpLinkError::PumpStopped(self.id))?
    }

    pub async fn queue(&self, request: CommandRequest) -> Result<()> {
        self.send(PumpRequest::Queue(request)).await
    }

    pub async fn cancel_command(&self) -> Result<()> {
        self.send(PumpRequest::Cancel).await
    }

    pub async fn lock(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(PumpRequest::Lock { reply }).await?;
        rx.await.map_err(|_| PumpLinkError::PumpStopped(self.id))?
    }

    pub async fn apply_response(&self, response: PumpResponse) -> Result<()> {
        self.send(PumpRequest::ApplyResponse(response)).await
    }

    pub async fn set_active(&self, active: bool) -> Result<()> {
        self.send(PumpRequest::SetActive(active)).await
    }

    pub async fn set_lights_state(&self, on: bool) -> Result<()> {
        self.send(PumpRequest::SetLights(on)).await
    }

    pub async fn set_physical_address(&self, value: i64) -> Result<()> {
        self.send(PumpRequest::SetPhysicalAddress(value)).await
    }

    pub async fn set_channel_id(&self, value: i64, known_channels: Vec<u16>) -> Result<()> {
        self.send(PumpRequest::SetChannel {
            value,
            known_channels,
        })
        .await
    }

    pub(crate) async fn adopt_channel(&self, channel_id: u16) -> Result<()> {
        self.send(PumpRequest::AdoptChannel(channel_id)).await
    }

    pub async fn set_price_per_liter(&self, nozzle_id: u8, value: i64) -> Result<()> {
        self.send(PumpRequest::SetPrice { nozzle_id, value }).await
    }

    pub async fn snapshot(&self) -> Result<PumpSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(PumpRequest::Snapshot { reply }).await?;
        rx.await.map_err(|_| PumpLinkError::PumpStopped(self.id))
    }

    /// Stop the task after the messages already queued are applied
    pub async fn shutdown(&self) -> Result<()> {
        self.send(PumpRequest::Shutdown).await
    }

    async fn send(&self, request: PumpRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| PumpLinkError::PumpStopped(self.id))
    }
}

/// Task owning one pump
pub struct PumpActor {
    pump: Pump,
    gateway: Arc<dyn ProtocolGateway>,
    events: Arc<EventBus>,
    rx: mpsc::Receiver<PumpRequest>,
}

impl PumpActor {
    /// Spawn the task for a pump and hand back its handle
    pub fn spawn(
        pump: Pump,
        gateway: Arc<dyn ProtocolGateway>,
        events: Arc<EventBus>,
    ) -> (PumpHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(PUMP_QUEUE_CAPACITY);
        let handle = PumpHandle { id: pump.id(), tx };
        let actor = Self {
            pump,
            gateway,
            events,
            rx,
        };
        let join = tokio::spawn(actor.run());
        (handle, join)
    }

    async fn run(mut self) {
        let pump_id = self.pump.id();
        debug!(pump_id, "pump task started");

        while let Some(request) = self.rx.recv().await {
            match request {
                PumpRequest::Tick { reply } => {
                    let outcome = self.pump.tick(self.gateway.as_ref()).await;
                    let _ = reply.send(outcome);
                }
                PumpRequest::Queue(command) => self.pump.queue(command),
                PumpRequest::Cancel => self.pump.cancel_command(),
                PumpRequest::Lock { reply } => {
                    let result = self.pump.lock(self.gateway.as_ref()).await;
                    let _ = reply.send(result);
                }
                PumpRequest::ApplyResponse(response) => {
                    self.pump.apply_response(response, &self.events)
                }
                PumpRequest::SetActive(active) => self.pump.set_active(active),
                PumpRequest::SetLights(on) => self.pump.set_lights_state(on),
                PumpRequest::SetPhysicalAddress(value) => self.pump.set_physical_address(value),
                PumpRequest::SetChannel {
                    value,
                    known_channels,
                } => self.pump.set_channel_id(value, &known_channels),
                PumpRequest::AdoptChannel(channel_id) => self.pump.adopt_channel(channel_id),
                PumpRequest::SetPrice { nozzle_id, value } => {
                    self.pump.set_price_per_liter(nozzle_id, value)
                }
                PumpRequest::Snapshot { reply } => {
                    let _ = reply.send(self.pump.snapshot());
                }
                PumpRequest::Shutdown => break,
            }
        }

        debug!(pump_id, "pump task stopped");
    }
}
