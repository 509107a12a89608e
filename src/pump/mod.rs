//! Pump State
//!
//! One `Pump` holds everything the controller tracks for a fueling position:
//! bus addressing, nozzle records, operating state, the running transaction
//! and the command scheduler slots. All writes coming from outside the crate
//! go through validated setters; an out-of-range value is discarded, the
//! prior value kept, and the rejection reported to the validation sink.

pub mod actor;
pub mod nozzle;
pub mod scheduler;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ControllerLimits, PumpConfig};
use crate::error::{ErrorSink, ValidatedField, ValidationError};
use crate::events::{EventBus, PumpEvent};
use crate::types::{CommandRequest, PumpCommand, PumpResponse, PumpStatus};

use nozzle::NozzleBank;
use scheduler::CommandScheduler;

/// Missed polls before a pump is considered offline
pub const OFFLINE_AFTER_MISSES: u32 = 3;

/// One fueling position on the bus
#[derive(Debug)]
pub struct Pump {
    id: u16,
    physical_address: u16,
    channel_id: u16,
    /// Channel actually serving this pump; survives writes of unknown ids
    resolved_channel: Option<u16>,
    nozzles: NozzleBank,
    scheduler: CommandScheduler,
    status: PumpStatus,
    active_nozzle_id: u8,
    locked: bool,
    is_active: bool,
    lights_state: bool,
    autoclose_transaction: bool,
    transaction_id: u32,
    dispensed_amount: f64,
    dispensed_volume: u32,
    missed_polls: u32,
    limits: ControllerLimits,
    errors: ErrorSink,
}

/// Point-in-time copy of a pump's externally visible state
#[derive(Debug, Clone, Serialize)]
pub struct PumpSnapshot {
    pub id: u16,
    pub physical_address: u16,
    pub channel_id: u16,
    pub resolved_channel: Option<u16>,
    pub status: PumpStatus,
    pub active_nozzle_id: u8,
    pub locked: bool,
    pub is_active: bool,
    pub lights_state: bool,
    pub transaction_id: u32,
    pub dispensed_amount: f64,
    pub dispensed_volume: u32,
    pub prices: Vec<u32>,
    pub pending_opcode: u8,
    pub planned_opcode: u8,
    pub command_time: Option<DateTime<Utc>>,
}

impl Pump {
    /// Build a pump from its configuration entry
    pub fn new(config: &PumpConfig, limits: ControllerLimits, errors: ErrorSink) -> Self {
        Self {
            id: config.id,
            physical_address: config.physical_address,
            channel_id: config.channel_id,
            resolved_channel: None,
            nozzles: NozzleBank::new(config.id, limits.max_nozzles_count, errors.clone()),
            scheduler: CommandScheduler::default(),
            status: PumpStatus::Offline,
            active_nozzle_id: 0,
            locked: false,
            is_active: config.active,
            lights_state: false,
            autoclose_transaction: config.autoclose_transaction,
            transaction_id: 0,
            dispensed_amount: 0.0,
            dispensed_volume: 0,
            missed_polls: 0,
            limits,
            errors,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn physical_address(&self) -> u16 {
        self.physical_address
    }

    pub fn channel_id(&self) -> u16 {
        self.channel_id
    }

    /// Channel currently serving the pump, set by channel assignment
    pub fn resolved_channel(&self) -> Option<u16> {
        self.resolved_channel
    }

    pub fn status(&self) -> PumpStatus {
        self.status
    }

    /// Taken-up nozzle id (0 = all hung up)
    pub fn active_nozzle_id(&self) -> u8 {
        self.active_nozzle_id
    }

    /// Nozzle record currently taken up, if any
    pub fn active_nozzle(&self) -> Option<&nozzle::Nozzle> {
        self.nozzles.get(self.active_nozzle_id)
    }

    pub fn nozzles(&self) -> &NozzleBank {
        &self.nozzles
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn lights_state(&self) -> bool {
        self.lights_state
    }

    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    pub fn snapshot(&self) -> PumpSnapshot {
        PumpSnapshot {
            id: self.id,
            physical_address: self.physical_address,
            channel_id: self.channel_id,
            resolved_channel: self.resolved_channel,
            status: self.status,
            active_nozzle_id: self.active_nozzle_id,
            locked: self.locked,
            is_active: self.is_active,
            lights_state: self.lights_state,
            transaction_id: self.transaction_id,
            dispensed_amount: self.dispensed_amount,
            dispensed_volume: self.dispensed_volume,
            prices: self.nozzles.price_list(),
            pending_opcode: self.scheduler.pending_opcode(),
            planned_opcode: self.scheduler.planned_opcode(),
            command_time: self.scheduler.command_time(),
        }
    }

    // ========================================================================
    // Host-side writes
    // ========================================================================

    /// Include or exclude the pump from the polling loop
    pub fn set_active(&mut self, active: bool) {
        if self.is_active != active {
            info!(pump_id = self.id, active, "pump activity changed");
        }
        self.is_active = active;
    }

    /// Forecourt lights state sent by the next queued SetLights dispatch
    pub fn set_lights_state(&mut self, on: bool) {
        self.lights_state = on;
    }

    /// Queue a command toward the pump
    pub fn queue(&mut self, request: CommandRequest) {
        self.scheduler.queue(request);
        debug!(
            pump_id = self.id,
            opcode = self.scheduler.pending_opcode(),
            "command queued"
        );
    }

    /// Drop any queued and planned command without dispatching
    pub fn cancel_command(&mut self) {
        self.scheduler.cancel();
    }

    /// Set the bus address, discarding out-of-range values
    pub fn set_physical_address(&mut self, value: i64) {
        if value < 0 || value > self.limits.max_pump_address as i64 {
            self.errors.report(ValidationError {
                pump_id: self.id,
                nozzle_id: None,
                field: ValidatedField::PhysicalAddress,
                rejected: value,
            });
            return;
        }
        self.physical_address = value as u16;
    }

    /// Rewire the pump to another channel, discarding out-of-range ids
    ///
    /// `known_channels` are the ids the controller actually runs. A value
    /// inside the configured range but absent from that list is stored as the
    /// wired id while `resolved_channel` keeps its previous binding.
    pub fn set_channel_id(&mut self, value: i64, known_channels: &[u16]) {
        if value < 0 || value > self.limits.max_pump_channels_count as i64 {
            self.errors.report(ValidationError {
                pump_id: self.id,
                nozzle_id: None,
                field: ValidatedField::ChannelId,
                rejected: value,
            });
            return;
        }
        let id = value as u16;
        self.channel_id = id;
        if id == 0 {
            self.resolved_channel = None;
        } else if known_channels.contains(&id) {
            self.resolved_channel = Some(id);
        }
    }

    /// Record which channel adopted this pump during assignment
    pub(crate) fn adopt_channel(&mut self, channel_id: u16) {
        self.channel_id = channel_id;
        self.resolved_channel = Some(channel_id);
    }

    /// Set a nozzle price, discarding negative values
    pub fn set_price_per_liter(&mut self, nozzle_id: u8, value: i64) {
        self.nozzles.set_price_per_liter(nozzle_id, value);
    }

    fn set_active_nozzle(&mut self, value: i64) {
        if value < 0 || value > self.limits.max_nozzles_count as i64 {
            self.errors.report(ValidationError {
                pump_id: self.id,
                nozzle_id: None,
                field: ValidatedField::ActiveNozzleId,
                rejected: value,
            });
            return;
        }
        self.active_nozzle_id = value as u8;
    }

    fn set_status_raw(&mut self, raw: u8) {
        // The accepted range is capped by the nozzle limit, not by the
        // highest status code; raw codes inside the gate that decode to
        // nothing are dropped without a report.
        if raw > self.limits.max_nozzles_count {
            self.errors.report(ValidationError {
                pump_id: self.id,
                nozzle_id: None,
                field: ValidatedField::Status,
                rejected: raw as i64,
            });
            return;
        }
        if let Some(status) = PumpStatus::from_raw(raw) {
            self.status = status;
        }
    }

    // ========================================================================
    // Inbound responses
    // ========================================================================

    /// Apply one decoded response and emit events for observable changes
    pub fn apply_response(&mut self, response: PumpResponse, events: &EventBus) {
        if !matches!(response, PumpResponse::NoResponse) {
            self.missed_polls = 0;
            self.scheduler.clear_in_flight();
        }

        match response {
            PumpResponse::Status { status, nozzle_id } => {
                let prev_status = self.status;
                let prev_nozzle = self.active_nozzle_id;
                self.set_status_raw(status);
                self.set_active_nozzle(nozzle_id as i64);

                if self.status != prev_status {
                    info!(pump_id = self.id, status = %self.status, "status changed");
                    events.emit(PumpEvent::StatusChanged {
                        pump_id: self.id,
                        status: self.status,
                    });
                }
                if self.active_nozzle_id != prev_nozzle {
                    events.emit(PumpEvent::NozzleChanged {
                        pump_id: self.id,
                        nozzle_id: self.active_nozzle_id,
                    });
                }
            }
            PumpResponse::LockState { locked } => {
                self.locked = locked;
            }
            PumpResponse::DispenseProgress { amount, volume } => {
                self.dispensed_amount = amount;
                self.dispensed_volume = volume;
            }
            PumpResponse::TransactionEnd {
                transaction_id,
                amount,
                volume,
            } => {
                self.transaction_id = transaction_id;
                self.dispensed_amount = amount;
                self.dispensed_volume = volume;
                events.emit(PumpEvent::TransactionFinished {
                    pump_id: self.id,
                    transaction_id,
                    amount,
                    volume,
                });
                if self.autoclose_transaction {
                    self.queue(CommandRequest::new(PumpCommand::CloseTransaction));
                }
            }
            PumpResponse::Totals {
                nozzle_id,
                amount,
                volume,
            } => {
                self.nozzles.apply_totals(nozzle_id, amount, volume);
                events.emit(PumpEvent::TotalsUpdated {
                    pump_id: self.id,
                    nozzle_id,
                });
            }
            PumpResponse::Prices(prices) => {
                self.nozzles.apply_prices(&prices);
                events.emit(PumpEvent::PricesReceived { pump_id: self.id });
            }
            PumpResponse::Tag { nozzle_id, code } => {
                self.nozzles.apply_tag(nozzle_id, code.clone());
                events.emit(PumpEvent::TagReceived {
                    pump_id: self.id,
                    nozzle_id,
                    code,
                });
            }
            PumpResponse::NoResponse => {
                self.missed_polls += 1;
                if self.missed_polls >= OFFLINE_AFTER_MISSES && self.status != PumpStatus::Offline
                {
                    self.status = PumpStatus::Offline;
                    info!(pump_id = self.id, "pump went offline");
                    events.emit(PumpEvent::StatusChanged {
                        pump_id: self.id,
                        status: PumpStatus::Offline,
                    });
                }
            }
        }
    }
}
