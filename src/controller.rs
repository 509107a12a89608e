//! Pump Controller
//!
//! Owns the whole session: builds the channel and pump topology from
//! configuration, spawns one task per pump, routes inbound responses, and
//! drives the polling loop that ticks every pump once per cycle in id order.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::channel::PumpChannel;
use crate::config::ControllerConfig;
use crate::error::{ErrorSink, PumpLinkError, Result, ValidationError};
use crate::events::{EventBus, PumpEvent};
use crate::gateway::ProtocolGateway;
use crate::pump::actor::{PumpActor, PumpHandle};
use crate::pump::scheduler::TickOutcome;
use crate::pump::Pump;
use crate::types::PumpResponse;

/// One controller session over a set of channels and pumps
pub struct Controller {
    config: ControllerConfig,
    gateway: Arc<dyn ProtocolGateway>,
    events: Arc<EventBus>,
    channels: BTreeMap<u16, PumpChannel>,
    pumps: BTreeMap<u16, PumpHandle>,
    tasks: Vec<JoinHandle<()>>,
    validation_rx: mpsc::UnboundedReceiver<ValidationError>,
    shutdown_tx: watch::Sender<bool>,
}

impl Controller {
    /// Build the topology from configuration and spawn the pump tasks
    pub async fn new(
        config: ControllerConfig,
        gateway: Arc<dyn ProtocolGateway>,
    ) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventBus::default());
        let (sink, validation_rx) = ErrorSink::channel();
        let (shutdown_tx, _) = watch::channel(false);

        let mut channels = BTreeMap::new();
        for channel_config in &config.channels {
            channels.insert(channel_config.id, PumpChannel::new(channel_config));
        }

        let mut pumps = BTreeMap::new();
        let mut tasks = Vec::new();
        for pump_config in &config.pumps {
            let pump = Pump::new(pump_config, config.limits, sink.clone());
            let (handle, join) = PumpActor::spawn(pump, gateway.clone(), events.clone());
            pumps.insert(pump_config.id, handle);
            tasks.push(join);
        }

        let mut controller = Self {
            config,
            gateway,
            events,
            channels,
            pumps,
            tasks,
            validation_rx,
            shutdown_tx,
        };
        controller.wire_configured_channels().await?;

        info!(
            pumps = controller.pumps.len(),
            channels = controller.channels.len(),
            "controller started"
        );
        Ok(controller)
    }

    async fn wire_configured_channels(&mut self) -> Result<()> {
        let mut by_channel: BTreeMap<u16, Vec<u16>> = BTreeMap::new();
        for pump_config in &self.config.pumps {
            if pump_config.channel_id != 0 {
                by_channel
                    .entry(pump_config.channel_id)
                    .or_default()
                    .push(pump_config.id);
            }
        }
        for (channel_id, pump_ids) in by_channel {
            self.assign_channel_pumps(channel_id, pump_ids).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Topology
    // ========================================================================

    pub fn pump(&self, pump_id: u16) -> Result<&PumpHandle> {
        self.pumps
            .get(&pump_id)
            .ok_or(PumpLinkError::PumpNotFound(pump_id))
    }

    pub fn channel(&self, channel_id: u16) -> Result<&PumpChannel> {
        self.channels
            .get(&channel_id)
            .ok_or(PumpLinkError::ChannelNotFound(channel_id))
    }

    /// Pump ids in ascending order
    pub fn pump_ids(&self) -> Vec<u16> {
        self.pumps.keys().copied().collect()
    }

    /// Channel ids the controller actually runs
    pub fn channel_ids(&self) -> Vec<u16> {
        self.channels.keys().copied().collect()
    }

    /// Replace the pump set of a channel, rewiring the backref of each
    /// pump that joins
    pub async fn assign_channel_pumps(
        &mut self,
        channel_id: u16,
        pump_ids: Vec<u16>,
    ) -> Result<()> {
        for pump_id in &pump_ids {
            if !self.pumps.contains_key(pump_id) {
                return Err(PumpLinkError::PumpNotFound(*pump_id));
            }
        }
        let channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or(PumpLinkError::ChannelNotFound(channel_id))?;

        for pump_id in channel.assign_pumps(pump_ids) {
            self.pumps[&pump_id].adopt_channel(channel_id).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Polling
    // ========================================================================

    /// Tick every pump once, in ascending id order
    ///
    /// A stopped pump task is logged and skipped; the cycle keeps going.
    pub async fn poll_cycle(&self) -> Vec<(u16, TickOutcome)> {
        let mut outcomes = Vec::with_capacity(self.pumps.len());
        for (pump_id, handle) in &self.pumps {
            match handle.tick().await {
                Ok(outcome) => outcomes.push((*pump_id, outcome)),
                Err(e) => warn!(pump_id, error = %e, "tick failed"),
            }
        }
        debug!(
            ticked = outcomes.len(),
            dispatched = outcomes
                .iter()
                .filter(|(_, o)| matches!(o, TickOutcome::Dispatched { .. }))
                .count(),
            "poll cycle done"
        );
        outcomes
    }

    /// Drive poll cycles at the configured cadence until stopped
    pub async fn run(&self) -> Result<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut interval = tokio::time::interval(self.config.polling_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.config.polling_interval_ms,
            "polling loop started"
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("polling loop stopped");
        Ok(())
    }

    /// Ask a running `run` loop to exit after its current cycle
    pub fn request_stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop the polling loop and every pump task
    pub async fn shutdown(&mut self) {
        self.request_stop();
        for handle in self.pumps.values() {
            let _ = handle.shutdown().await;
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("controller stopped");
    }

    // ========================================================================
    // Inbound traffic and observation
    // ========================================================================

    /// Route one decoded response to its pump
    pub async fn handle_response(&self, pump_id: u16, response: PumpResponse) -> Result<()> {
        self.pump(pump_id)?.apply_response(response).await
    }

    /// Subscribe to pump events emitted from here on
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PumpEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn gateway(&self) -> &Arc<dyn ProtocolGateway> {
        &self.gateway
    }

    /// Take all validation errors reported since the last drain
    pub fn drain_validation_errors(&mut self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        while let Ok(error) = self.validation_rx.try_recv() {
            errors.push(error);
        }
        errors
    }

    /// Full session state as JSON, for status endpoints and logs
    pub async fn diagnostics(&self) -> Result<serde_json::Value> {
        let mut pumps = Vec::with_capacity(self.pumps.len());
        for handle in self.pumps.values() {
            let snapshot = handle.snapshot().await?;
            pumps.push(
                serde_json::to_value(snapshot)
                    .map_err(|e| PumpLinkError::internal(format!("serialize snapshot: {e}")))?,
            );
        }
        let channels: Vec<serde_json::Value> = self
            .channels
            .values()
            .map(|channel| {
                serde_json::json!({
                    "id": channel.id(),
                    "baud_rate": channel.baud_rate().bits_per_second(),
                    "protocol": channel.protocol(),
                    "pumps": channel.pump_ids(),
                })
            })
            .collect();
        Ok(serde_json::json!({
            "active_pumps": self.gateway.active_pumps_count(),
            "channels": channels,
            "pumps": pumps,
        }))
    }
}
