//! Driver for the SSP-style bill acceptor.
//!
//! Layered like its sibling device crates: [`fsm`] holds the family's
//! states, events and transition table; `device` owns the serial link, the
//! SSP sequencing state and the reply mirrors; [`controller`] exposes the
//! operation surface ([`BillAcceptor`]) with the stable status-code
//! catalog; [`watcher`] runs the optional background polling loop.
//!
//! # Example
//!
//! ```no_run
//! use cashdeck_bill::BillAcceptor;
//! use cashdeck_core::BillConfig;
//!
//! let mut acceptor = BillAcceptor::new(BillConfig::default());
//! if acceptor.connect().is_success() {
//!     acceptor.start_reader();
//!     let tick = acceptor.get_bill();
//!     println!("{}: {}", tick.status_code, tick.message);
//! }
//! ```

pub mod controller;
mod device;
pub mod fsm;
pub mod watcher;

pub use controller::BillAcceptor;
pub use fsm::{BillEvent, BillState};
pub use watcher::{BillWatcher, spawn_bill_watcher};
