//! This crate provides the register level core of a DinFox bus node.
//!
//! It supports `no-std` environments by use of the `no_std` feature flag.
//!
//! A node exposes a small array of 32-bit registers to an RS485 bus master. The first eight
//! registers are common to every board (identification, boot flag, error stack, MCU
//! measurements), the following ones belong to the board type:
//! * LVRM - low voltage relay module
//! * BPSM - battery protection and storage module
//! * DDRM - DC-DC regulator module
//! * RRM - regulated relay module
//! * GPSM - GPS module
//! * UHFM - UHF radio module (Sigfox)
//!
//! The bus transport is not part of this crate. It decodes requests and forwards them to a
//! [`Node`], which enforces register access, runs the board driver and drives the hardware
//! through the traits of [`hal`].
//!
//! ```ignore
//! let config = NodeConfigBuilder::new(LvrmConfig::default()).build()?;
//! let mut node = Node::new(config, board_hardware)?;
//! node.init()?;
//! node.write_register(12, 0x1, 0x1)?; // close the relay
//! ```

#![cfg_attr(feature = "no_std", no_std)]

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod hal;
pub mod nodes;
pub mod nvm;
pub mod register;
pub mod registers;
pub mod types;

#[cfg(test)]
mod mock_hardware;

pub use config::{BoardConfig, NodeConfig, NodeConfigBuilder};
pub use dispatcher::{Node, NodeState};
pub use error::{Error, ErrorBase, Result};
pub use hal::{HalError, Hardware};
