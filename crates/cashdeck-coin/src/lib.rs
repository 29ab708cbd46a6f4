//! Driver for the ccTalk-style coin acceptor.
//!
//! The driver is layered the same way as its two sibling device crates:
//!
//! - [`fsm`] — the family's states, events and static transition table,
//!   run by the shared `cashdeck-fsm` engine;
//! - `device` — command exchange over the serial link, decode mirrors and
//!   per-state entry actions;
//! - [`controller`] — the public operation surface ([`CoinAcceptor`]),
//!   mapping entry-action outcomes onto the stable status-code catalog and
//!   tracking the escalation counters;
//! - [`watcher`] — an optional background polling loop delivering
//!   [`CoinTick`](cashdeck_core::CoinTick)s over a channel.
//!
//! # Example
//!
//! ```no_run
//! use cashdeck_coin::CoinAcceptor;
//! use cashdeck_core::CoinConfig;
//!
//! let mut acceptor = CoinAcceptor::new(CoinConfig::default());
//! let connected = acceptor.connect();
//! if connected.is_success() {
//!     acceptor.start_reader();
//!     let tick = acceptor.get_coin();
//!     println!("{}: {}", tick.status_code, tick.message);
//! }
//! ```

pub mod controller;
mod device;
pub mod fsm;
pub mod watcher;

pub use controller::CoinAcceptor;
pub use fsm::{CoinEvent, CoinState};
pub use watcher::{CoinWatcher, spawn_coin_watcher};
