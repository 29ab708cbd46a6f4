//! Driver for the motorized card dispenser.
//!
//! Layered like its sibling device crates: [`fsm`] holds the family's
//! states, events and transition table; `device` owns the serial link, the
//! accumulate-and-retry receive loop, the host ACK write-back and the
//! status-flag mirrors; [`controller`] exposes the operation surface
//! ([`CardDispenser`]) with the stable status-code catalog.
//!
//! Unlike the two acceptor drivers the dispenser has no polling loop: it
//! is command-driven (dispense, recycle, end-process) with a status query
//! the controller replays whenever a motor command's outcome is unclear.

pub mod controller;
mod device;
pub mod fsm;

pub use controller::CardDispenser;
pub use fsm::{DispenserEvent, DispenserState};
