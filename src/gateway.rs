//! Protocol Gateway
//!
//! Boundary between the scheduling core and the wire. The gateway owns the
//! byte-level encoding and the transport; the core only asks it to send one
//! request at a time and reads back bus-load information. All request methods
//! are fire-and-forget: responses come back asynchronously through the
//! inbound response handler, never as return values here.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::AuthorizeType;

/// Wire-request surface the scheduler dispatches into
#[async_trait]
pub trait ProtocolGateway: Send + Sync {
    /// Number of pumps currently polled on the whole bus
    ///
    /// Drives the adaptive wait threshold: fewer simultaneously active pumps
    /// require more confirmation rounds before a command may be written.
    fn active_pumps_count(&self) -> usize;

    /// Whether the extended wire-command set is in use
    fn use_extended_commands(&self) -> bool;

    async fn status_request(&self, pump_id: u16) -> Result<()>;
    async fn extended_status_request(&self, pump_id: u16) -> Result<()>;

    async fn lock_request(&self, pump_id: u16) -> Result<()>;
    async fn unlock_request(&self, pump_id: u16) -> Result<()>;

    async fn authorize_request(
        &self,
        pump_id: u16,
        nozzle_id: u8,
        authorize_type: AuthorizeType,
        dose: u32,
        price: u32,
    ) -> Result<()>;
    async fn extended_authorize_request(
        &self,
        pump_id: u16,
        nozzle_id: u8,
        authorize_type: AuthorizeType,
        dose: u32,
        price: u32,
    ) -> Result<()>;

    async fn stop_request(&self, pump_id: u16) -> Result<()>;
    async fn suspend_request(&self, pump_id: u16) -> Result<()>;
    async fn resume_request(&self, pump_id: u16) -> Result<()>;

    async fn close_transaction_request(&self, pump_id: u16, transaction_id: u32) -> Result<()>;

    async fn totals_request(&self, pump_id: u16, nozzle_id: u8) -> Result<()>;
    async fn extended_totals_request(&self, pump_id: u16, nozzle_id: u8) -> Result<()>;

    async fn prices_get_request(&self, pump_id: u16) -> Result<()>;
    async fn prices_set_request(&self, pump_id: u16, prices: &[u32]) -> Result<()>;
    async fn extended_prices_set_request(&self, pump_id: u16, prices: &[u32]) -> Result<()>;

    async fn tag_request(&self, pump_id: u16, nozzle_id: u8) -> Result<()>;

    async fn lights_request(&self, pump_id: u16, on: bool) -> Result<()>;
}

// ============================================================================
// Recording Gateway
// ============================================================================

/// One recorded wire request, for assertions and diagnostics
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayRequest {
    Status { pump_id: u16, extended: bool },
    Lock { pump_id: u16 },
    Unlock { pump_id: u16 },
    Authorize {
        pump_id: u16,
        nozzle_id: u8,
        authorize_type: AuthorizeType,
        dose: u32,
        price: u32,
        extended: bool,
    },
    Stop { pump_id: u16 },
    Suspend { pump_id: u16 },
    Resume { pump_id: u16 },
    CloseTransaction { pump_id: u16, transaction_id: u32 },
    Totals {
        pump_id: u16,
        nozzle_id: u8,
        extended: bool,
    },
    PricesGet { pump_id: u16 },
    PricesSet {
        pump_id: u16,
        prices: Vec<u32>,
        extended: bool,
    },
    Tag { pump_id: u16, nozzle_id: u8 },
    Lights { pump_id: u16, on: bool },
}

impl GatewayRequest {
    /// True for plain or extended status polls
    pub fn is_status(&self) -> bool {
        matches!(self, GatewayRequest::Status { .. })
    }
}

/// In-memory gateway recording every request it is asked to send
///
/// Stands in for a real transport in tests the same way an in-process bus
/// simulator would; bus-load figures are set directly by the test.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    requests: Mutex<Vec<GatewayRequest>>,
    active_pumps: AtomicUsize,
    extended: AtomicBool,
}

impl RecordingGateway {
    pub fn new(active_pumps: usize, use_extended_commands: bool) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            active_pumps: AtomicUsize::new(active_pumps),
            extended: AtomicBool::new(use_extended_commands),
        }
    }

    /// Change the reported bus-wide active-pump count
    pub fn set_active_pumps(&self, count: usize) {
        self.active_pumps.store(count, Ordering::SeqCst);
    }

    /// Switch the reported command set
    pub fn set_use_extended_commands(&self, extended: bool) {
        self.extended.store(extended, Ordering::SeqCst);
    }

    /// Snapshot of all recorded requests in send order
    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    /// Drop all recorded requests
    pub fn clear(&self) {
        self.requests.lock().expect("request log poisoned").clear();
    }

    fn record(&self, request: GatewayRequest) {
        self.requests.lock().expect("request log poisoned").push(request);
    }
}

#[async_trait]
impl ProtocolGateway for RecordingGateway {
    fn active_pumps_count(&self) -> usize {
        self.active_pumps.load(Ordering::SeqCst)
    }

    fn use_extended_commands(&self) -> bool {
        self.extended.load(Ordering::SeqCst)
    }

    async fn status_request(&self, pump_id: u16) -> Result<()> {
        self.record(GatewayRequest::Status {
            pump_id,
            extended: false,
        });
        Ok(())
    }

    async fn extended_status_request(&self, pump_id: u16) -> Result<()> {
        self.record(GatewayRequest::Status {
            pump_id,
            extended: true,
        });
        Ok(())
    }

    async fn lock_request(&self, pump_id: u16) -> Result<()> {
        self.record(GatewayRequest::Lock { pump_id });
        Ok(())
    }

    async fn unlock_request(&self, pump_id: u16) -> Result<()> {
        self.record(GatewayRequest::Unlock { pump_id });
        Ok(())
    }

    async fn authorize_request(
        &self,
        pump_id: u16,
        nozzle_id: u8,
        authorize_type: AuthorizeType,
        dose: u32,
        price: u32,
    ) -> Result<()> {
        self.record(GatewayRequest::Authorize {
            pump_id,
            nozzle_id,
            authorize_type,
            dose,
            price,
            extended: false,
        });
        Ok(())
    }

    async fn extended_authorize_request(
        &self,
        pump_id: u16,
        nozzle_id: u8,
        authorize_type: AuthorizeType,
        dose: u32,
        price: u32,
    ) -> Result<()> {
        self.record(GatewayRequest::Authorize {
            pump_id,
            nozzle_id,
            authorize_type,
            dose,
            price,
            extended: true,
        });
        Ok(())
    }

    async fn stop_request(&self, pump_id: u16) -> Result<()> {
        self.record(GatewayRequest::Stop { pump_id });
        Ok(())
    }

    async fn suspend_request(&self, pump_id: u16) -> Result<()> {
        self.record(GatewayRequest::Suspend { pump_id });
        Ok(())
    }

    async fn resume_request(&self, pump_id: u16) -> Result<()> {
        self.record(GatewayRequest::Resume { pump_id });
        Ok(())
    }

    async fn close_transaction_request(&self, pump_id: u16, transaction_id: u32) -> Result<()> {
        self.record(GatewayRequest::CloseTransaction {
            pump_id,
            transaction_id,
        });
        Ok(())
    }

    async fn totals_request(&self, pump_id: u16, nozzle_id: u8) -> Result<()> {
        self.record(GatewayRequest::Totals {
            pump_id,
            nozzle_id,
            extended: false,
        });
        Ok(())
    }

    async fn extended_totals_request(&self, pump_id: u16, nozzle_id: u8) -> Result<()> {
        self.record(GatewayRequest::Totals {
            pump_id,
            nozzle_id,
            extended: true,
        });
        Ok(())
    }

    async fn prices_get_request(&self, pump_id: u16) -> Result<()> {
        self.record(GatewayRequest::PricesGet { pump_id });
        Ok(())
    }

    async fn prices_set_request(&self, pump_id: u16, prices: &[u32]) -> Result<()> {
        self.record(GatewayRequest::PricesSet {
            pump_id,
            prices: prices.to_vec(),
            extended: false,
        });
        Ok(())
    }

    async fn extended_prices_set_request(&self, pump_id: u16, prices: &[u32]) -> Result<()> {
        self.record(GatewayRequest::PricesSet {
            pump_id,
            prices: prices.to_vec(),
            extended: true,
        });
        Ok(())
    }

    async fn tag_request(&self, pump_id: u16, nozzle_id: u8) -> Result<()> {
        self.record(GatewayRequest::Tag { pump_id, nozzle_id });
        Ok(())
    }

    async fn lights_request(&self, pump_id: u16, on: bool) -> Result<()> {
        self.record(GatewayRequest::Lights { pump_id, on });
        Ok(())
    }
}
