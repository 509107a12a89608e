//! Command Scheduler
//!
//! Per-pump dispatch slots and the polling tick. A queued command is not
//! written to the bus immediately: once the pump confirms it is locked, it
//! keeps answering status polls for a number of rounds that depends on bus
//! load, and only then is the pending opcode dispatched through the gateway.
//! Without lock confirmation nothing counts down and nothing is written. A
//! second command can be planned behind the first; if the pump is still
//! locked when the first dispatches, the planned opcode takes over the
//! pending slot within that same dispatch.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Result, ValidatedField, ValidationError};
use crate::gateway::ProtocolGateway;
use crate::types::{opcode, AuthorizeType, CommandRequest, PumpCommand};

use super::Pump;

/// Status-poll rounds required before dispatch, by bus-wide active pump count
///
/// A lightly loaded bus answers polls quickly, so more confirmation rounds
/// fit into the same wall-clock window; a crowded bus gets fewer.
pub fn polling_threshold(active_pumps: usize) -> u16 {
    match active_pumps {
        1..=2 => 5,
        3..=4 => 4,
        5..=6 => 3,
        _ => 2,
    }
}

/// What one polling tick did for a pump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Pump excluded from polling; no wire traffic
    Inactive,
    /// Status poll sent
    Polled,
    /// Pending command written to the bus
    Dispatched { opcode: u8 },
}

/// Dispatch slots for one pump
#[derive(Debug, Default)]
pub struct CommandScheduler {
    /// Opcode waiting to be written (0 = none)
    command_to_execute: u8,
    /// Opcode promoted into the pending slot when the first dispatches locked
    command_planned: u8,
    /// Status polls answered, while locked, since the pending opcode was queued
    polls_since_queued: u16,
    /// Last opcode written to the bus, awaiting its response (0 = none)
    in_flight: u8,
    command_nozzle: u8,
    command_dose: u32,
    authorize_type: AuthorizeType,
    command_time: Option<DateTime<Utc>>,
}

impl CommandScheduler {
    /// Load the slots from a host request, restarting the poll countdown
    pub fn queue(&mut self, request: CommandRequest) {
        self.command_to_execute = request.command.opcode();
        self.command_planned = request.chained.map_or(opcode::NONE, PumpCommand::opcode);
        self.command_nozzle = request.nozzle;
        self.command_dose = request.dose;
        self.authorize_type = request.authorize_type;
        self.polls_since_queued = 0;
        self.command_time = Some(Utc::now());
    }

    /// Clear both slots without dispatching
    pub fn cancel(&mut self) {
        self.command_to_execute = opcode::NONE;
        self.command_planned = opcode::NONE;
        self.polls_since_queued = 0;
    }

    pub fn pending_opcode(&self) -> u8 {
        self.command_to_execute
    }

    pub fn planned_opcode(&self) -> u8 {
        self.command_planned
    }

    /// Opcode written to the bus and not yet answered
    pub fn in_flight_opcode(&self) -> u8 {
        self.in_flight
    }

    /// When the current or last command was queued
    pub fn command_time(&self) -> Option<DateTime<Utc>> {
        self.command_time
    }

    pub(super) fn clear_in_flight(&mut self) {
        self.in_flight = opcode::NONE;
    }

    fn promote_planned(&mut self) {
        self.command_to_execute = self.command_planned;
        self.command_planned = opcode::NONE;
        self.polls_since_queued = 0;
    }

    fn consume(&mut self, in_flight: u8) {
        self.command_to_execute = opcode::NONE;
        self.polls_since_queued = 0;
        self.in_flight = in_flight;
    }
}

impl Pump {
    /// Run one polling tick against the gateway
    ///
    /// With an empty pending slot this is a plain status poll. With a pending
    /// opcode and the pump confirmed locked, the pump first answers
    /// `polling_threshold` more status polls, then the next tick writes the
    /// command instead of polling. Without lock confirmation the countdown
    /// does not advance: the command stays parked and every tick polls.
    pub async fn tick<G: ProtocolGateway + ?Sized>(&mut self, gateway: &G) -> Result<TickOutcome> {
        if !self.is_active {
            return Ok(TickOutcome::Inactive);
        }

        if self.scheduler.command_to_execute == opcode::NONE || !self.locked {
            self.status_request(gateway).await?;
            return Ok(TickOutcome::Polled);
        }

        self.scheduler.polls_since_queued += 1;
        let threshold = polling_threshold(gateway.active_pumps_count());
        if self.scheduler.polls_since_queued > threshold {
            let dispatched = self.dispatch(gateway).await?;
            Ok(TickOutcome::Dispatched { opcode: dispatched })
        } else {
            self.status_request(gateway).await?;
            Ok(TickOutcome::Polled)
        }
    }

    /// Write a lock request directly, outside the dispatch slots
    pub async fn lock<G: ProtocolGateway + ?Sized>(&self, gateway: &G) -> Result<()> {
        gateway.lock_request(self.id).await
    }

    async fn status_request<G: ProtocolGateway + ?Sized>(&self, gateway: &G) -> Result<()> {
        if gateway.use_extended_commands() {
            gateway.extended_status_request(self.id).await
        } else {
            gateway.status_request(self.id).await
        }
    }

    /// Write the pending opcode to the bus and clear the slot
    ///
    /// A slot value that decodes to no command falls back to a plain status
    /// poll; the slot is consumed either way.
    async fn dispatch<G: ProtocolGateway + ?Sized>(&mut self, gateway: &G) -> Result<u8> {
        let stored = self.scheduler.command_to_execute;
        let extended = gateway.use_extended_commands();

        let mut written = stored;
        match PumpCommand::from_opcode(stored) {
            Some(PumpCommand::Unlock) => gateway.unlock_request(self.id).await?,
            Some(PumpCommand::Authorize) => {
                if !self.dispatch_authorize(gateway, extended).await? {
                    written = opcode::NONE;
                }
            }
            Some(PumpCommand::Halt) => gateway.stop_request(self.id).await?,
            Some(PumpCommand::Suspend) => gateway.suspend_request(self.id).await?,
            Some(PumpCommand::Resume) => gateway.resume_request(self.id).await?,
            Some(PumpCommand::CloseTransaction) => {
                gateway
                    .close_transaction_request(self.id, self.transaction_id)
                    .await?
            }
            Some(PumpCommand::ReadTotals) => {
                let nozzle = self.scheduler.command_nozzle;
                if extended {
                    gateway.extended_totals_request(self.id, nozzle).await?
                } else {
                    gateway.totals_request(self.id, nozzle).await?
                }
            }
            Some(PumpCommand::ReadPrices) => gateway.prices_get_request(self.id).await?,
            Some(PumpCommand::WritePrices) | Some(PumpCommand::SetParameter) => {
                let prices = self.nozzles.price_list();
                if extended {
                    gateway.extended_prices_set_request(self.id, &prices).await?
                } else {
                    gateway.prices_set_request(self.id, &prices).await?
                }
            }
            Some(PumpCommand::ReadTag) => {
                gateway
                    .tag_request(self.id, self.scheduler.command_nozzle)
                    .await?
            }
            Some(PumpCommand::SetLights) => {
                gateway.lights_request(self.id, self.lights_state).await?
            }
            None => {
                self.status_request(gateway).await?;
                written = opcode::NONE;
            }
        }

        debug!(pump_id = self.id, opcode = stored, written, "command dispatched");
        self.scheduler.consume(written);

        // Chain within the dispatch: still locked and a follow-up is planned
        if self.locked && self.scheduler.command_planned != opcode::NONE {
            self.scheduler.promote_planned();
            debug!(
                pump_id = self.id,
                opcode = self.scheduler.command_to_execute,
                "planned command promoted"
            );
        }
        Ok(stored)
    }

    /// Authorize with the price of the target nozzle
    ///
    /// An out-of-range nozzle id discards the authorize, reports it, and
    /// polls instead. Returns whether the authorize was actually written.
    async fn dispatch_authorize<G: ProtocolGateway + ?Sized>(
        &self,
        gateway: &G,
        extended: bool,
    ) -> Result<bool> {
        let nozzle_id = self.scheduler.command_nozzle;
        let Some(nozzle) = self.nozzles.get(nozzle_id) else {
            self.errors.report(ValidationError {
                pump_id: self.id,
                nozzle_id: None,
                field: ValidatedField::ActiveNozzleId,
                rejected: nozzle_id as i64,
            });
            self.status_request(gateway).await?;
            return Ok(false);
        };

        let price = nozzle.price_per_liter;
        if extended {
            gateway
                .extended_authorize_request(
                    self.id,
                    nozzle_id,
                    self.scheduler.authorize_type,
                    self.scheduler.command_dose,
                    price,
                )
                .await?;
        } else {
            gateway
                .authorize_request(
                    self.id,
                    nozzle_id,
                    self.scheduler.authorize_type,
                    self.scheduler.command_dose,
                    price,
                )
                .await?;
        }
        Ok(true)
    }
}
