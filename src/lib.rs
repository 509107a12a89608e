//! # pumplink
//!
//! Control core for forecourt fuel dispensers behind a polling bus
//! controller. The crate keeps per-pump state, schedules command dispatch
//! around the status-poll cadence, binds pumps to bus channels, and raises
//! typed events as inbound responses change what a pump reports.
//!
//! The wire itself stays outside: a [`ProtocolGateway`] implementation owns
//! encoding and transport, while [`Controller`] drives the polling loop and
//! every [`Pump`](pump::Pump) runs behind its own task so ticks, host writes
//! and responses apply in strict arrival order.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use pumplink::{Controller, ControllerConfig, RecordingGateway};
//!
//! # async fn demo() -> pumplink::Result<()> {
//! let config = ControllerConfig::from_file("controller.yaml")?;
//! let gateway = Arc::new(RecordingGateway::new(2, false));
//! let controller = Controller::new(config, gateway).await?;
//! controller.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod gateway;
pub mod pump;
pub mod types;

pub use channel::PumpChannel;
pub use config::{ChannelConfig, ControllerConfig, ControllerLimits, PumpConfig};
pub use controller::Controller;
pub use error::{ErrorSink, PumpLinkError, Result, ValidatedField, ValidationError};
pub use events::{EventBus, PumpEvent};
pub use gateway::{GatewayRequest, ProtocolGateway, RecordingGateway};
pub use pump::actor::{PumpActor, PumpHandle, PumpRequest};
pub use pump::nozzle::{Nozzle, NozzleBank};
pub use pump::scheduler::{polling_threshold, CommandScheduler, TickOutcome};
pub use pump::{Pump, PumpSnapshot};
pub use types::{
    AuthorizeType, ChannelBaudRate, ChannelProtocol, CommandRequest, PumpCommand, PumpResponse,
    PumpStatus,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
