//! States, events and transition table of the coin acceptor.

use std::fmt;

use cashdeck_fsm::TransitionRow;

/// States of the coin-acceptor machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinState {
    /// Resting state; entry sets up the session.
    Idle,
    /// Scanning ports for the acceptor.
    Connect,
    /// Health probe: communication, self check, opto states.
    Check,
    /// Arming: reset, enable channels, verify the event counter cleared.
    WaitPoll,
    /// Reading buffered credits.
    Polling,
    /// Reset and verify the event counter cleared.
    Reset,
    /// Fault posture; entry re-probes communication.
    Error,
}

impl fmt::Display for CoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoinState::Idle => "Idle",
            CoinState::Connect => "Connect",
            CoinState::Check => "Check",
            CoinState::WaitPoll => "WaitPoll",
            CoinState::Polling => "Polling",
            CoinState::Reset => "Reset",
            CoinState::Error => "Error",
        };
        write!(f, "{name}")
    }
}

/// Events accepted by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinEvent {
    Any,
    SuccessConnect,
    CallPolling,
    Check,
    Ready,
    FinishPoll,
    Poll,
    Loop,
    Error,
}

/// The static transition table; lookup is linear first-match, and pairs
/// with no row are deliberately ignored by the engine.
pub static TRANSITIONS: [TransitionRow<CoinState, CoinEvent>; 15] = [
    TransitionRow { current: CoinState::Idle, event: CoinEvent::Any, next: CoinState::Connect },
    TransitionRow { current: CoinState::Connect, event: CoinEvent::SuccessConnect, next: CoinState::Check },
    TransitionRow { current: CoinState::Connect, event: CoinEvent::Error, next: CoinState::Error },
    TransitionRow { current: CoinState::Check, event: CoinEvent::CallPolling, next: CoinState::WaitPoll },
    TransitionRow { current: CoinState::Check, event: CoinEvent::Check, next: CoinState::Check },
    TransitionRow { current: CoinState::Check, event: CoinEvent::Error, next: CoinState::Error },
    TransitionRow { current: CoinState::WaitPoll, event: CoinEvent::Ready, next: CoinState::Polling },
    TransitionRow { current: CoinState::WaitPoll, event: CoinEvent::Error, next: CoinState::Error },
    TransitionRow { current: CoinState::Polling, event: CoinEvent::FinishPoll, next: CoinState::Reset },
    TransitionRow { current: CoinState::Polling, event: CoinEvent::Poll, next: CoinState::Polling },
    TransitionRow { current: CoinState::Polling, event: CoinEvent::Error, next: CoinState::Error },
    TransitionRow { current: CoinState::Reset, event: CoinEvent::Loop, next: CoinState::Check },
    TransitionRow { current: CoinState::Reset, event: CoinEvent::Any, next: CoinState::Reset },
    TransitionRow { current: CoinState::Reset, event: CoinEvent::Error, next: CoinState::Error },
    TransitionRow { current: CoinState::Error, event: CoinEvent::Any, next: CoinState::Idle },
];
