//! Pump Channels
//!
//! A channel models one physical bus line: serial parameters, the protocol
//! spoken on it, and the set of pump ids served by it. Assignment replaces
//! the whole set at once; each pump that joins has its channel backref
//! rewritten, while a pump that leaves keeps its old backref until rewired.

use tracing::info;

use crate::config::ChannelConfig;
use crate::types::{ChannelBaudRate, ChannelProtocol};

/// One bus line and the pumps wired to it
#[derive(Debug, Clone)]
pub struct PumpChannel {
    id: u16,
    baud_rate: ChannelBaudRate,
    protocol: ChannelProtocol,
    pump_ids: Vec<u16>,
}

impl PumpChannel {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            id: config.id,
            baud_rate: config.baud_rate,
            protocol: config.protocol,
            pump_ids: Vec::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn baud_rate(&self) -> ChannelBaudRate {
        self.baud_rate
    }

    pub fn protocol(&self) -> ChannelProtocol {
        self.protocol
    }

    /// Pump ids currently served, in assignment order
    pub fn pump_ids(&self) -> &[u16] {
        &self.pump_ids
    }

    pub fn contains(&self, pump_id: u16) -> bool {
        self.pump_ids.contains(&pump_id)
    }

    /// Replace the served pump set, returning the ids that newly joined
    ///
    /// The caller rewrites the backref of every returned pump; pumps dropped
    /// from the set are left pointing at this channel until rewired.
    pub fn assign_pumps(&mut self, pump_ids: Vec<u16>) -> Vec<u16> {
        let joined: Vec<u16> = pump_ids
            .iter()
            .copied()
            .filter(|id| !self.pump_ids.contains(id))
            .collect();
        info!(
            channel_id = self.id,
            pumps = pump_ids.len(),
            joined = joined.len(),
            "channel pump set replaced"
        );
        self.pump_ids = pump_ids;
        joined
    }
}
