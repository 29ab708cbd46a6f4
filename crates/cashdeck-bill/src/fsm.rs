//! States, events and transition table of the bill acceptor.

use std::fmt;

use cashdeck_fsm::TransitionRow;

/// States of the bill-acceptor machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillState {
    /// Resting state; entry sets up the session.
    Idle,
    /// Scanning ports for the acceptor.
    Connect,
    /// Channels disabled, display off.
    Disable,
    /// Arming: sync, display on, set and enable channels.
    Enable,
    /// Polling for note events.
    Polling,
    /// Health probe: last-reject query plus one poll.
    Check,
    /// Fault posture; entry re-syncs.
    Error,
}

impl fmt::Display for BillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BillState::Idle => "Idle",
            BillState::Connect => "Connect",
            BillState::Disable => "Disable",
            BillState::Enable => "Enable",
            BillState::Polling => "Polling",
            BillState::Check => "Check",
            BillState::Error => "Error",
        };
        write!(f, "{name}")
    }
}

/// Events accepted by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillEvent {
    Any,
    SuccessConnect,
    CallPolling,
    Check,
    Ready,
    FinishPoll,
    Poll,
    Loop,
    Reset,
    Error,
}

/// The static transition table.
pub static TRANSITIONS: [TransitionRow<BillState, BillEvent>; 13] = [
    TransitionRow { current: BillState::Idle, event: BillEvent::Any, next: BillState::Connect },
    TransitionRow { current: BillState::Connect, event: BillEvent::SuccessConnect, next: BillState::Disable },
    TransitionRow { current: BillState::Connect, event: BillEvent::Error, next: BillState::Error },
    TransitionRow { current: BillState::Disable, event: BillEvent::Ready, next: BillState::Enable },
    TransitionRow { current: BillState::Disable, event: BillEvent::Error, next: BillState::Error },
    TransitionRow { current: BillState::Enable, event: BillEvent::CallPolling, next: BillState::Polling },
    TransitionRow { current: BillState::Enable, event: BillEvent::Error, next: BillState::Error },
    TransitionRow { current: BillState::Polling, event: BillEvent::FinishPoll, next: BillState::Check },
    TransitionRow { current: BillState::Polling, event: BillEvent::Poll, next: BillState::Polling },
    TransitionRow { current: BillState::Polling, event: BillEvent::Error, next: BillState::Error },
    TransitionRow { current: BillState::Check, event: BillEvent::Loop, next: BillState::Disable },
    TransitionRow { current: BillState::Check, event: BillEvent::Error, next: BillState::Error },
    TransitionRow { current: BillState::Error, event: BillEvent::Reset, next: BillState::Idle },
];

#[cfg(test)]
mod tests {
    use super::*;
    use cashdeck_fsm::{NO_TRANSITION, StateMachine};

    #[test]
    fn test_arm_path() {
        let mut machine = StateMachine::new(BillState::Idle, &TRANSITIONS);
        machine.run(BillEvent::Any, |_| 0);
        machine.run(BillEvent::SuccessConnect, |_| 0);
        assert_eq!(machine.state(), BillState::Disable);
        machine.run(BillEvent::Ready, |_| 0);
        machine.run(BillEvent::CallPolling, |_| 0);
        assert_eq!(machine.state(), BillState::Polling);
    }

    #[test]
    fn test_stop_path_loops_back_to_disable() {
        let mut machine = StateMachine::new(BillState::Idle, &TRANSITIONS);
        machine.run(BillEvent::Any, |_| 0);
        machine.run(BillEvent::SuccessConnect, |_| 0);
        machine.run(BillEvent::Ready, |_| 0);
        machine.run(BillEvent::CallPolling, |_| 0);
        machine.run(BillEvent::FinishPoll, |_| 0);
        assert_eq!(machine.state(), BillState::Check);
        machine.run(BillEvent::Loop, |_| 0);
        assert_eq!(machine.state(), BillState::Disable);
    }

    #[test]
    fn test_unmodeled_events_are_ignored() {
        let mut machine = StateMachine::new(BillState::Idle, &TRANSITIONS);
        assert_eq!(machine.run(BillEvent::Poll, |_| 0), NO_TRANSITION);
        assert_eq!(machine.state(), BillState::Idle);
    }
}
