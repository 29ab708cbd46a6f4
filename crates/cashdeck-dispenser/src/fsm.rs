//! States, events and transition table of the card dispenser.

use std::fmt;

use cashdeck_fsm::TransitionRow;

/// States of the dispenser machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenserState {
    /// Resting state; entry sets up the session.
    Idle,
    /// Scanning ports for the dispenser.
    Connect,
    /// Initializing the mechanism (skipped when already initialized).
    Init,
    /// Ready; entry refreshes the status flags.
    Wait,
    /// Motor running: moving a card to the gate.
    MovingMotor,
    /// Returning the gate card to the recycling box.
    HandingCard,
    /// Fault posture; entry re-reads the status.
    Error,
}

impl fmt::Display for DispenserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispenserState::Idle => "Idle",
            DispenserState::Connect => "Connect",
            DispenserState::Init => "Init",
            DispenserState::Wait => "Wait",
            DispenserState::MovingMotor => "MovingMotor",
            DispenserState::HandingCard => "HandingCard",
            DispenserState::Error => "Error",
        };
        write!(f, "{name}")
    }
}

/// Events accepted by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenserEvent {
    Any,
    SuccessConnect,
    SuccessInit,
    CallDispensing,
    Wait,
    CardInGate,
    Finish,
    Reset,
    Error,
}

/// The static transition table.
pub static TRANSITIONS: [TransitionRow<DispenserState, DispenserEvent>; 15] = [
    TransitionRow { current: DispenserState::Idle, event: DispenserEvent::Any, next: DispenserState::Connect },
    TransitionRow { current: DispenserState::Connect, event: DispenserEvent::SuccessConnect, next: DispenserState::Init },
    TransitionRow { current: DispenserState::Connect, event: DispenserEvent::Error, next: DispenserState::Error },
    TransitionRow { current: DispenserState::Init, event: DispenserEvent::SuccessInit, next: DispenserState::Wait },
    TransitionRow { current: DispenserState::Init, event: DispenserEvent::Error, next: DispenserState::Error },
    TransitionRow { current: DispenserState::Wait, event: DispenserEvent::CallDispensing, next: DispenserState::MovingMotor },
    TransitionRow { current: DispenserState::Wait, event: DispenserEvent::Wait, next: DispenserState::Wait },
    TransitionRow { current: DispenserState::Wait, event: DispenserEvent::CardInGate, next: DispenserState::HandingCard },
    TransitionRow { current: DispenserState::Wait, event: DispenserEvent::Error, next: DispenserState::Error },
    TransitionRow { current: DispenserState::MovingMotor, event: DispenserEvent::CardInGate, next: DispenserState::HandingCard },
    TransitionRow { current: DispenserState::MovingMotor, event: DispenserEvent::Finish, next: DispenserState::Wait },
    TransitionRow { current: DispenserState::MovingMotor, event: DispenserEvent::Error, next: DispenserState::Error },
    TransitionRow { current: DispenserState::HandingCard, event: DispenserEvent::Finish, next: DispenserState::Wait },
    TransitionRow { current: DispenserState::HandingCard, event: DispenserEvent::Error, next: DispenserState::Error },
    TransitionRow { current: DispenserState::Error, event: DispenserEvent::Reset, next: DispenserState::Idle },
];

#[cfg(test)]
mod tests {
    use super::*;
    use cashdeck_fsm::{NO_TRANSITION, StateMachine};

    #[test]
    fn test_connect_path() {
        let mut machine = StateMachine::new(DispenserState::Idle, &TRANSITIONS);
        machine.run(DispenserEvent::Any, |_| 0);
        machine.run(DispenserEvent::SuccessConnect, |_| 0);
        machine.run(DispenserEvent::SuccessInit, |_| 0);
        assert_eq!(machine.state(), DispenserState::Wait);
    }

    #[test]
    fn test_dispense_and_recycle_path() {
        let mut machine = StateMachine::new(DispenserState::Idle, &TRANSITIONS);
        machine.run(DispenserEvent::Any, |_| 0);
        machine.run(DispenserEvent::SuccessConnect, |_| 0);
        machine.run(DispenserEvent::SuccessInit, |_| 0);
        machine.run(DispenserEvent::CallDispensing, |_| 0);
        assert_eq!(machine.state(), DispenserState::MovingMotor);
        machine.run(DispenserEvent::CardInGate, |_| 0);
        assert_eq!(machine.state(), DispenserState::HandingCard);
        machine.run(DispenserEvent::Finish, |_| 0);
        assert_eq!(machine.state(), DispenserState::Wait);
    }

    #[test]
    fn test_error_exits_only_through_reset() {
        let mut machine = StateMachine::new(DispenserState::Idle, &TRANSITIONS);
        machine.run(DispenserEvent::Any, |_| 0);
        machine.run(DispenserEvent::Error, |_| 0);
        assert_eq!(machine.state(), DispenserState::Error);

        // Only Reset is modeled out of Error.
        assert_eq!(machine.run(DispenserEvent::Any, |_| 0), NO_TRANSITION);
        assert_eq!(machine.state(), DispenserState::Error);
        machine.run(DispenserEvent::Reset, |_| 0);
        assert_eq!(machine.state(), DispenserState::Idle);
    }
}
