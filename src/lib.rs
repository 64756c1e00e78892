//! A minimal CANopen node on top of a raw CAN driver.
//!
//! A [`Node`] acts as either master or slave on one physical bus. It tracks
//! and advertises its NMT state, sends heartbeats, exchanges process data
//! objects and expedited (up to 4 byte) service data objects, and hands every
//! decoded event to the listeners registered for it.
//!
//! Invalid input is dropped rather than reported: the only trace it leaves is
//! a log line and a counter in [`Diagnostics`].
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod config;
mod event;
mod frame;
mod nmt;
mod node;
mod sdo;
mod transport;

/// Node ID used until `begin` assigns one
pub const DEFAULT_NODE_ID: u8 = 0x5F;

/// Heartbeat period used until one is configured
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u32 = 1000;

pub use config::*;
pub use event::*;
pub use frame::*;
pub use nmt::*;
pub use node::*;
pub use sdo::*;
pub use transport::*;

pub use embedded_can::{Id, StandardId};
