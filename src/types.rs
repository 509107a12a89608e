//! Core Pump Types
//!
//! Command opcodes, authorization modes, pump operating states and channel
//! parameters shared across the scheduler, gateway and controller.

use serde::{Deserialize, Serialize};

// ============================================================================
// Command Opcodes
// ============================================================================

/// Raw opcode values as stored in the per-pump command slots (0 = none)
pub mod opcode {
    pub const NONE: u8 = 0x00;
    pub const UNLOCK: u8 = 0x01;
    pub const AUTHORIZE: u8 = 0x02;
    pub const HALT: u8 = 0x03;
    pub const SUSPEND: u8 = 0x04;
    pub const RESUME: u8 = 0x05;
    pub const CLOSE_TRANSACTION: u8 = 0x06;
    pub const READ_TOTALS: u8 = 0x07;
    pub const READ_PRICES: u8 = 0x08;
    pub const WRITE_PRICES: u8 = 0x09;
    pub const READ_TAG: u8 = 0x0A;
    pub const SET_LIGHTS: u8 = 0x0B;
    /// Parameter write; dispatches identically to WRITE_PRICES
    pub const SET_PARAMETER: u8 = 0x0C;
}

/// Queueable pump control command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpCommand {
    Unlock,
    Authorize,
    Halt,
    Suspend,
    Resume,
    CloseTransaction,
    ReadTotals,
    ReadPrices,
    WritePrices,
    ReadTag,
    SetLights,
    /// Alias of WritePrices at dispatch time, kept distinct for host intent
    SetParameter,
}

impl PumpCommand {
    /// Opcode stored in the pump's pending-command slot
    pub fn opcode(self) -> u8 {
        match self {
            PumpCommand::Unlock => opcode::UNLOCK,
            PumpCommand::Authorize => opcode::AUTHORIZE,
            PumpCommand::Halt => opcode::HALT,
            PumpCommand::Suspend => opcode::SUSPEND,
            PumpCommand::Resume => opcode::RESUME,
            PumpCommand::CloseTransaction => opcode::CLOSE_TRANSACTION,
            PumpCommand::ReadTotals => opcode::READ_TOTALS,
            PumpCommand::ReadPrices => opcode::READ_PRICES,
            PumpCommand::WritePrices => opcode::WRITE_PRICES,
            PumpCommand::ReadTag => opcode::READ_TAG,
            PumpCommand::SetLights => opcode::SET_LIGHTS,
            PumpCommand::SetParameter => opcode::SET_PARAMETER,
        }
    }

    /// Decode a stored opcode; `None` for 0 and unrecognized values
    pub fn from_opcode(value: u8) -> Option<Self> {
        match value {
            opcode::UNLOCK => Some(PumpCommand::Unlock),
            opcode::AUTHORIZE => Some(PumpCommand::Authorize),
            opcode::HALT => Some(PumpCommand::Halt),
            opcode::SUSPEND => Some(PumpCommand::Suspend),
            opcode::RESUME => Some(PumpCommand::Resume),
            opcode::CLOSE_TRANSACTION => Some(PumpCommand::CloseTransaction),
            opcode::READ_TOTALS => Some(PumpCommand::ReadTotals),
            opcode::READ_PRICES => Some(PumpCommand::ReadPrices),
            opcode::WRITE_PRICES => Some(PumpCommand::WritePrices),
            opcode::READ_TAG => Some(PumpCommand::ReadTag),
            opcode::SET_LIGHTS => Some(PumpCommand::SetLights),
            opcode::SET_PARAMETER => Some(PumpCommand::SetParameter),
            _ => None,
        }
    }
}

/// Host request queued toward a pump: one command plus an optional chained
/// follow-up fired right after the first dispatch, without a new trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: PumpCommand,
    /// Command promoted into the pending slot right after `command` dispatches
    pub chained: Option<PumpCommand>,
    /// Target nozzle for authorize/totals/tag dispatches (1-indexed, 0 = none)
    pub nozzle: u8,
    /// Preset dose for authorize (cents or 10 ml units per authorize type)
    pub dose: u32,
    pub authorize_type: AuthorizeType,
}

impl CommandRequest {
    /// Plain command with no nozzle/dose parameters
    pub fn new(command: PumpCommand) -> Self {
        Self {
            command,
            chained: None,
            nozzle: 0,
            dose: 0,
            authorize_type: AuthorizeType::default(),
        }
    }

    pub fn with_chained(mut self, chained: PumpCommand) -> Self {
        self.chained = Some(chained);
        self
    }

    pub fn with_nozzle(mut self, nozzle: u8) -> Self {
        self.nozzle = nozzle;
        self
    }

    pub fn with_dose(mut self, authorize_type: AuthorizeType, dose: u32) -> Self {
        self.authorize_type = authorize_type;
        self.dose = dose;
        self
    }
}

// ============================================================================
// Authorization
// ============================================================================

/// Authorization mode for a fuel dispense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizeType {
    /// Dispense until the nozzle is hung back up
    #[default]
    FullTank,
    /// Dispense a preset volume (10 ml units)
    Volume,
    /// Dispense a preset amount (cents)
    Amount,
}

// ============================================================================
// Pump Status
// ============================================================================

/// Categorical pump operating state as reported by the controller bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum PumpStatus {
    /// Not responding on the bus
    Offline = 0,
    /// Responding, no transaction in progress
    Idle = 1,
    /// Dispensing fuel
    Filling = 2,
    /// Dispense finished, transaction still open
    EndOfFilling = 3,
    /// Transaction closed
    Closed = 4,
    /// Dispense suspended
    Suspended = 5,
}

impl PumpStatus {
    /// Decode a raw status byte; `None` for unknown codes
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(PumpStatus::Offline),
            1 => Some(PumpStatus::Idle),
            2 => Some(PumpStatus::Filling),
            3 => Some(PumpStatus::EndOfFilling),
            4 => Some(PumpStatus::Closed),
            5 => Some(PumpStatus::Suspended),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PumpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PumpStatus::Offline => write!(f, "OFFLINE"),
            PumpStatus::Idle => write!(f, "IDLE"),
            PumpStatus::Filling => write!(f, "FILLING"),
            PumpStatus::EndOfFilling => write!(f, "END_OF_FILLING"),
            PumpStatus::Closed => write!(f, "CLOSED"),
            PumpStatus::Suspended => write!(f, "SUSPENDED"),
        }
    }
}

// ============================================================================
// Channel Parameters
// ============================================================================

/// Serial baud rate of a pump channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelBaudRate {
    #[serde(rename = "2400")]
    Baud2400,
    #[serde(rename = "4800")]
    Baud4800,
    #[serde(rename = "9600")]
    Baud9600,
    #[serde(rename = "19200")]
    Baud19200,
}

impl ChannelBaudRate {
    pub fn bits_per_second(self) -> u32 {
        match self {
            ChannelBaudRate::Baud2400 => 2400,
            ChannelBaudRate::Baud4800 => 4800,
            ChannelBaudRate::Baud9600 => 9600,
            ChannelBaudRate::Baud19200 => 19200,
        }
    }
}

/// Dispenser bus protocol spoken on a channel; opaque to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelProtocol {
    Unipump,
    Dart,
    GilbarcoTwoWire,
    AdastEasycall,
    TatsunoSsLan,
}

// ============================================================================
// Inbound Responses
// ============================================================================

/// Decoded controller response applied to a pump by the response handler
///
/// Wire decoding lives outside this crate; this is the contract the core
/// requires from whatever parses inbound traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpResponse {
    /// Status poll answer: raw status code plus taken-up nozzle (0 = none)
    Status { status: u8, nozzle_id: u8 },
    /// Lock/unlock confirmation observed on the bus
    LockState { locked: bool },
    /// Running dispense figures for the active transaction
    DispenseProgress { amount: f64, volume: u32 },
    /// Transaction finished on the dispenser side
    TransactionEnd {
        transaction_id: u32,
        amount: f64,
        volume: u32,
    },
    /// Lifetime electronic totals for one nozzle
    Totals {
        nozzle_id: u8,
        amount: u64,
        volume: u64,
    },
    /// Price-per-liter list ordered by nozzle id
    Prices(Vec<u32>),
    /// Nozzle ID tag read back
    Tag { nozzle_id: u8, code: String },
    /// Poll timed out; pump missed a response window
    NoResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for cmd in [
            PumpCommand::Unlock,
            PumpCommand::Authorize,
            PumpCommand::Halt,
            PumpCommand::Suspend,
            PumpCommand::Resume,
            PumpCommand::CloseTransaction,
            PumpCommand::ReadTotals,
            PumpCommand::ReadPrices,
            PumpCommand::WritePrices,
            PumpCommand::ReadTag,
            PumpCommand::SetLights,
            PumpCommand::SetParameter,
        ] {
            assert_eq!(PumpCommand::from_opcode(cmd.opcode()), Some(cmd));
        }
    }

    #[test]
    fn test_unknown_opcodes_decode_to_none() {
        assert_eq!(PumpCommand::from_opcode(opcode::NONE), None);
        assert_eq!(PumpCommand::from_opcode(0x7F), None);
        assert_eq!(PumpCommand::from_opcode(0xFF), None);
    }

    #[test]
    fn test_status_from_raw() {
        assert_eq!(PumpStatus::from_raw(0), Some(PumpStatus::Offline));
        assert_eq!(PumpStatus::from_raw(2), Some(PumpStatus::Filling));
        assert_eq!(PumpStatus::from_raw(6), None);
    }

    #[test]
    fn test_command_request_builder() {
        let req = CommandRequest::new(PumpCommand::Authorize)
            .with_nozzle(2)
            .with_dose(AuthorizeType::Volume, 500)
            .with_chained(PumpCommand::Unlock);
        assert_eq!(req.command, PumpCommand::Authorize);
        assert_eq!(req.nozzle, 2);
        assert_eq!(req.dose, 500);
        assert_eq!(req.authorize_type, AuthorizeType::Volume);
        assert_eq!(req.chained, Some(PumpCommand::Unlock));
    }
}
