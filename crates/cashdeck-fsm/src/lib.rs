//! Table-driven state machine engine shared by the three device drivers.
//!
//! Each device family supplies a fixed state enum, a fixed event enum, and
//! a static transition table; the engine owns the current state and runs a
//! per-state entry action whenever it lands on a state. Entry actions are
//! closures over the device layer and return a small outcome code (`0`
//! success, family-specific positives, negatives for communication
//! failures) that the controller interprets.
//!
//! Two properties are deliberate and load-bearing:
//!
//! - Lookup is linear first-match over the table. A `(state, event)` pair
//!   with no row is a **no-op**, not an error: the engine returns
//!   [`NO_TRANSITION`] and neither moves nor runs any action. States that
//!   can legitimately receive unmodeled events rely on this.
//! - [`StateMachine::run_pinned`] temporarily substitutes a state, runs its
//!   entry action once, and restores the previous state — the device
//!   health-check and reset helpers "peek" at a state's behavior without a
//!   modeled transition.

use std::fmt::Debug;

use tracing::trace;

/// Outcome returned by [`StateMachine::run`] when no table row matches.
pub const NO_TRANSITION: i32 = 0;

/// One immutable row of a family's transition table.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRow<S, E> {
    pub current: S,
    pub event: E,
    pub next: S,
}

/// Table-driven state machine for one device instance.
///
/// The current state is owned here and mutated only by [`run`],
/// [`init`] and (transiently) [`run_pinned`].
///
/// [`run`]: StateMachine::run
/// [`init`]: StateMachine::init
/// [`run_pinned`]: StateMachine::run_pinned
#[derive(Debug)]
pub struct StateMachine<S: 'static, E: 'static> {
    current: S,
    initial: S,
    table: &'static [TransitionRow<S, E>],
}

impl<S, E> StateMachine<S, E>
where
    S: Copy + PartialEq + Debug,
    E: Copy + PartialEq + Debug,
{
    /// Build a machine resting on `initial` with the family's static table.
    pub fn new(initial: S, table: &'static [TransitionRow<S, E>]) -> Self {
        Self {
            current: initial,
            initial,
            table,
        }
    }

    /// State the machine currently rests on.
    pub fn state(&self) -> S {
        self.current
    }

    /// Force the machine back to its initial state and run its entry action.
    ///
    /// Used once per connect sequence.
    pub fn init(&mut self, mut entry: impl FnMut(S) -> i32) -> i32 {
        self.current = self.initial;
        trace!(target: "cashdeck::fsm", state = ?self.current, "state machine initialized");
        entry(self.current)
    }

    /// Feed one event through the transition table.
    ///
    /// On a matching row the machine moves to the row's `next` state, runs
    /// that state's entry action, and returns the action's outcome. With no
    /// matching row the machine stays put and returns [`NO_TRANSITION`].
    pub fn run(&mut self, event: E, mut entry: impl FnMut(S) -> i32) -> i32 {
        for row in self.table {
            if row.current == self.current && row.event == event {
                trace!(
                    target: "cashdeck::fsm",
                    from = ?self.current, to = ?row.next, event = ?event,
                    "transition"
                );
                self.current = row.next;
                return entry(self.current);
            }
        }
        trace!(
            target: "cashdeck::fsm",
            state = ?self.current, event = ?event,
            "no transition row, ignoring event"
        );
        NO_TRANSITION
    }

    /// Run `state`'s entry action out-of-band, then restore the previous
    /// state.
    ///
    /// This is how health checks run while the machine nominally sits in
    /// the polling state.
    pub fn run_pinned(&mut self, state: S, mut entry: impl FnMut(S) -> i32) -> i32 {
        let saved = self.current;
        self.current = state;
        let outcome = entry(self.current);
        self.current = saved;
        outcome
    }
}
