//! # nextion-bridge
//!
//! Bridges a Nextion touch panel to a home-automation message bus.
//!
//! The panel speaks a binary serial protocol of `FF FF FF`-terminated
//! frames. This library discovers the buttons, switches and text fields on
//! every page the panel shows, announces them as bus entities and keeps both
//! sides in sync.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Element discovery by probing, one page at a time
//! - Single outstanding query, correlated with the panel's untagged replies
//! - Event stream for panel notifications and discovery progress
//! - Bus boundary as a trait, with an in-memory implementation
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nextion_bridge::{BridgeConfig, BusCommand, Controller, MemoryBus, SerialConfig};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), nextion_bridge::Error> {
//!     let config = BridgeConfig::new(SerialConfig::new("/dev/ttyS0").baud_rate(38_400));
//!     let bus = Arc::new(MemoryBus::new());
//!     let (bus_tx, bus_rx) = mpsc::channel::<BusCommand>(16);
//!
//!     let mut bridge = Controller::open(&config, bus.clone(), bus_rx).await?;
//!
//!     // Switch a discovered element from the bus side
//!     bus_tx.send(BusCommand::new("p0s0", "ON")).await.ok();
//!
//!     // Runs until the serial link fails
//!     bridge.closed().await
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Low-level protocol types (frames, return codes, commands)
//! - [`transport`] - Serial link with its read and write loops
//! - [`dispatcher`] - Opcode to handler routing
//! - [`commands`] - Command sending and query correlation
//! - [`discovery`] - Element discovery per page
//! - [`types`] - Pages, elements and touch data
//! - [`bus`] - Bus adapter boundary
//! - [`event`] - Async event system for panel notifications
//! - [`controller`] - The [`Controller`] tying it all together

pub mod bus;
pub mod commands;
pub mod controller;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use bus::{BusAdapter, BusCommand, Entity, EntityKind, MemoryBus, StateUpdate};
pub use commands::{CommandHandler, Reply};
pub use controller::{BridgeConfig, Controller};
pub use discovery::{Discovery, MAX_FAMILY_INDEX};
pub use dispatcher::OpcodeDispatcher;
pub use error::{Error, FrameError, Result};
pub use event::{Event, EventDispatcher, EventFilter, Subscription};
pub use protocol::{Attribute, PanelCommand, ReturnCode};
pub use transport::{SerialConfig, Transport, list_ports};
pub use types::{Element, ElementKind, Page, Registry, TouchCoordinate, TouchEvent};
