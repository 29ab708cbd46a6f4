//! Public operation surface of the card dispenser.
//!
//! Status catalog (numeric values are the compatibility surface):
//!
//! | code | meaning |
//! |------|---------|
//! | 201  | OK, hopper full of cards |
//! | 202  | OK, some cards available |
//! | 203  | card dispensed and seen at the gate |
//! | 204  | card recycled into the box |
//! | 301  | card waiting at the gate |
//! | 302  | recycling box full, hopper full |
//! | 303  | recycling box full, some cards available |
//! | 304  | dispensed but the card was already taken |
//! | 305  | dispensed with comm errors, card seen at gate |
//! | 404  | uninitialized response |
//! | 500  | device fault code reported |
//! | 501  | connected and initialized but the check failed |
//! | 502  | connected but initialization failed |
//! | 503  | port not found |
//! | 504  | card stuck in the channel |
//! | 505  | recycling box full and no cards available |
//! | 506  | no cards, recycling box not full |
//! | 507  | not responding |
//! | 508  | dispensed but the card jammed |
//! | 509  | card state unknown after dispense |
//! | 510  | no cards to dispense |
//! | 511  | recycle attempted, card jammed |
//! | 512  | recycle attempted, card still at the gate |
//! | 513  | no card at the gate to recycle |
//! | 514  | recycling box full, cannot recycle |
//! | 515  | recycle failed with a fault code |
//! | 516  | card state unknown after recycle |

use std::time::Duration;

use cashdeck_core::{CommandResponse, DeviceStatus, DispenserConfig, DispenserFlags};
use cashdeck_fsm::StateMachine;
use cashdeck_transport::{PortOpener, SystemPortOpener};

use crate::device::{DispenserDevice, IO_OK};
use crate::fsm::{DispenserEvent, DispenserState, TRANSITIONS};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Controller for one card dispenser.
pub struct CardDispenser {
    device: DispenserDevice,
    fsm: StateMachine<DispenserState, DispenserEvent>,
    max_attempts: u32,
}

impl CardDispenser {
    /// Dispenser on the numbered `/dev/ttyUSB` ports.
    pub fn new(config: DispenserConfig) -> Self {
        let opener = Box::new(SystemPortOpener::usb());
        Self::with_opener(config, opener)
    }

    /// Dispenser over a custom port source (tests, unusual device naming).
    pub fn with_opener(config: DispenserConfig, opener: Box<dyn PortOpener>) -> Self {
        let max_attempts = config.max_init_attempts.max(1);
        Self {
            device: DispenserDevice::new(opener, config),
            fsm: StateMachine::new(DispenserState::Idle, &TRANSITIONS),
            max_attempts,
        }
    }

    /// Override the settle time between command write and reply read.
    pub fn set_settle_time(&mut self, settle: Duration) {
        self.device.set_settle(settle);
    }

    /// Port index the scan settled on, once connected.
    pub fn port(&self) -> Option<usize> {
        self.device.port
    }

    /// State the dispenser's machine currently rests on.
    pub fn state(&self) -> DispenserState {
        self.fsm.state()
    }

    fn init_fsm(&mut self) -> i32 {
        let device = &mut self.device;
        self.fsm.init(|s| device.enter(s))
    }

    fn step(&mut self, event: DispenserEvent) -> i32 {
        let device = &mut self.device;
        self.fsm.run(event, |s| device.enter(s))
    }

    fn step_pinned(&mut self, state: DispenserState) -> i32 {
        let device = &mut self.device;
        self.fsm.run_pinned(state, |s| device.enter(s))
    }

    fn fault_response(&self, code: u16) -> CommandResponse {
        CommandResponse::new(
            code,
            format!(
                "Dispenser failed. Fault code: {} - Fault message: {}",
                self.device.error_code, self.device.error_message
            ),
        )
    }

    /// Scan for the dispenser, initialize it, and read its status.
    ///
    /// Any failure forces the `Error` state with a 5xx status.
    pub fn connect(&mut self) -> CommandResponse {
        self.init_fsm();

        let response = if self.step(DispenserEvent::Any) == IO_OK {
            if self.step(DispenserEvent::SuccessConnect) == IO_OK {
                let check = self.step(DispenserEvent::SuccessInit);
                if check == IO_OK {
                    self.check_codes()
                } else if check == 2 {
                    self.fault_response(500)
                } else {
                    CommandResponse::new(
                        501,
                        "Dispenser failed. Connected and initialized, but the check failed",
                    )
                }
            } else {
                CommandResponse::new(502, "Dispenser failed. Connected, but could not initialize")
            }
        } else {
            CommandResponse::new(503, "Connection to the dispenser failed, port not found")
        };

        if matches!(response.status_code, 404 | 501 | 502 | 503) {
            self.step(DispenserEvent::Error);
        }

        response
    }

    /// Read the status flags out-of-band, without a modeled transition.
    pub fn check_device(&mut self) -> CommandResponse {
        let check = self.step_pinned(DispenserState::Wait);

        let response = if check == IO_OK {
            self.check_codes()
        } else if check == 2 {
            self.fault_response(500)
        } else {
            CommandResponse::new(507, "Dispenser failed. Not responding")
        };

        if matches!(response.status_code, 404 | 500 | 507) {
            self.step(DispenserEvent::Error);
        }

        response
    }

    /// Map the five status flags onto the status catalog.
    fn check_codes(&self) -> CommandResponse {
        let flags = &self.device.flags;

        if flags.rfic_card_in_gate {
            return CommandResponse::new(
                504,
                "Dispenser jammed. Check succeeded but a stuck card was detected",
            );
        }

        if flags.card_in_gate {
            return CommandResponse::new(
                301,
                "Dispenser has a card at the gate. Waiting for pickup or recycle",
            );
        }

        if flags.recycling_box_full {
            if flags.dispenser_full {
                CommandResponse::new(302, "Recycling box full. Hopper full of cards")
            } else if flags.cards_in_dispenser {
                CommandResponse::new(303, "Recycling box full. Some cards available")
            } else {
                CommandResponse::new(505, "Recycling box full. No cards available")
            }
        } else if flags.dispenser_full {
            CommandResponse::new(201, "Dispenser OK. Hopper full of cards")
        } else if flags.cards_in_dispenser {
            CommandResponse::new(202, "Dispenser OK. Some cards available")
        } else {
            CommandResponse::new(506, "Dispenser out of cards. Recycling box not full yet")
        }
    }

    /// Move one card to the gate.
    ///
    /// Valid from `Wait`; any other state transparently replays the
    /// connect sequence first. Hard failures force the `Error` state.
    pub fn dispense_card(&mut self) -> CommandResponse {
        let mut response = CommandResponse::new(404, "Default error");
        let mut flag_ready = false;

        if self.fsm.state() == DispenserState::Wait {
            flag_ready = true;
        } else {
            response = self.connect();
            if matches!(response.status_code, 201 | 202 | 302 | 303) {
                flag_ready = true;
            }
        }

        if flag_ready {
            response = self.check_device();

            if matches!(response.status_code, 201 | 202 | 302 | 303) {
                let dispense = self.step(DispenserEvent::CallDispensing);

                if dispense == IO_OK {
                    if self.device.flags.rfic_card_in_gate {
                        response = CommandResponse::new(
                            508,
                            "Dispenser jammed. Card was dispensed but got stuck",
                        );
                    } else if self.device.flags.card_in_gate {
                        response = CommandResponse::new(
                            203,
                            "Dispenser moved the card. Dispensed and seen at the gate",
                        );
                    } else {
                        response = CommandResponse::new(
                            304,
                            "Dispenser moved the card. Dispensed but already taken",
                        );
                    }
                } else if dispense == 2 {
                    response = self.fault_response(500);
                } else if dispense == 3 {
                    response =
                        CommandResponse::new(510, "Dispenser out of cards. Cannot dispense");
                } else {
                    // Dispense outcome unknown: poll the status until the
                    // card's whereabouts are established.
                    for _ in 0..self.max_attempts {
                        response = self.check_device();

                        if !matches!(response.status_code, 404 | 500 | 507) {
                            if self.device.flags.card_in_gate {
                                response = CommandResponse::new(
                                    305,
                                    "Dispenser moved the card. Comm errors, but the card is at the gate",
                                );
                            } else if self.device.flags.rfic_card_in_gate {
                                response = CommandResponse::new(
                                    508,
                                    "Dispenser jammed. Card was dispensed but got stuck",
                                );
                            } else {
                                response = CommandResponse::new(
                                    509,
                                    "Dispenser failed. Card state could not be established",
                                );
                            }
                            break;
                        }
                        response = CommandResponse::new(
                            509,
                            "Dispenser failed. Card state could not be established",
                        );
                    }
                }
            } else if matches!(response.status_code, 505 | 506) {
                response = CommandResponse::new(510, "Dispenser out of cards. Cannot dispense");
            }
        }

        if response.status_code == 404 {
            response = CommandResponse::new(507, "Dispenser failed. Not responding");
        }

        if matches!(response.status_code, 500 | 504 | 507 | 508 | 509) {
            self.step(DispenserEvent::Error);
        }

        response
    }

    /// Return the gate card to the recycling box.
    ///
    /// Valid from `MovingMotor`; any other state transparently replays
    /// the connect sequence first.
    pub fn recycle_card(&mut self) -> CommandResponse {
        let mut response = CommandResponse::new(404, "Default error");
        let mut flag_ready = false;

        if self.fsm.state() == DispenserState::MovingMotor {
            flag_ready = true;
        } else {
            response = self.connect();
            if matches!(response.status_code, 201 | 202 | 301 | 506) {
                flag_ready = true;
            }
        }

        if flag_ready {
            response = self.check_device();

            if !matches!(response.status_code, 404 | 500 | 507) {
                if self.device.flags.rfic_card_in_gate {
                    response = CommandResponse::new(
                        504,
                        "Dispenser jammed. Check succeeded but a stuck card was detected",
                    );
                } else if self.device.flags.card_in_gate && !self.device.flags.recycling_box_full {
                    let recycle = self.step(DispenserEvent::CardInGate);

                    if recycle == IO_OK {
                        if self.device.flags.rfic_card_in_gate {
                            response = CommandResponse::new(
                                511,
                                "Dispenser jammed. Recycle attempted but the card got stuck",
                            );
                        } else if self.device.flags.card_in_gate {
                            response = CommandResponse::new(
                                512,
                                "Card still at the gate. Recycle attempted without effect",
                            );
                        } else {
                            response = CommandResponse::new(
                                204,
                                "Dispenser recycled the card into the recycling box",
                            );
                        }
                    } else if recycle == 3 {
                        response = CommandResponse::new(
                            513,
                            "No card detected at the gate, recycle not attempted",
                        );
                    } else if recycle == 2 {
                        response = CommandResponse::new(
                            515,
                            format!(
                                "Recycle failed. Fault code: {} - Fault message: {}",
                                self.device.error_code, self.device.error_message
                            ),
                        );
                    } else {
                        for _ in 0..self.max_attempts {
                            response = self.check_device();

                            if !matches!(response.status_code, 404 | 500 | 507) {
                                if self.device.flags.card_in_gate {
                                    response = CommandResponse::new(
                                        512,
                                        "Card still at the gate. Recycle attempted without effect",
                                    );
                                } else if self.device.flags.rfic_card_in_gate {
                                    response = CommandResponse::new(
                                        511,
                                        "Dispenser jammed. Recycle attempted but the card got stuck",
                                    );
                                } else {
                                    response = CommandResponse::new(
                                        516,
                                        "Dispenser failed. Card state unknown after recycle",
                                    );
                                }
                                break;
                            }
                            response = CommandResponse::new(
                                516,
                                "Dispenser failed. Card state unknown after recycle",
                            );
                        }
                    }
                } else if self.device.flags.recycling_box_full {
                    response = CommandResponse::new(
                        514,
                        "Recycling box full. The card cannot be recycled",
                    );
                } else {
                    response = CommandResponse::new(
                        513,
                        "No card detected at the gate, recycle not attempted",
                    );
                }
            }
        }

        if matches!(response.status_code, 404 | 501 | 502 | 503 | 507) {
            response = CommandResponse::new(507, "Dispenser failed. Not responding");
            self.step(DispenserEvent::Error);
        }

        if matches!(response.status_code, 302 | 303 | 505) {
            response =
                CommandResponse::new(514, "Recycling box full. The card cannot be recycled");
        }

        response
    }

    /// Finish a dispense/recycle cycle and settle back into `Wait`.
    pub fn end_process(&mut self) -> CommandResponse {
        let ready = matches!(
            self.fsm.state(),
            DispenserState::MovingMotor | DispenserState::HandingCard
        );

        if !ready {
            return self.connect();
        }

        let check = self.step(DispenserEvent::Finish);
        if check == IO_OK {
            self.check_codes()
        } else if check == 2 {
            self.fault_response(500)
        } else {
            CommandResponse::new(507, "Dispenser failed. Not responding")
        }
    }

    /// Snapshot of the five sensor-derived flags.
    pub fn dispenser_flags(&self) -> DispenserFlags {
        self.device.flags
    }

    /// Diagnostics snapshot; refreshes the status via the check path.
    pub fn test_status(&mut self) -> DeviceStatus {
        let response = self.check_device();

        let mut status = DeviceStatus {
            version: VERSION.to_string(),
            device: 10,
            error_type: 1,
            error_code: i32::from(response.status_code),
            message: response.message.clone(),
            additional_info: format!(
                "LastErrorCode: {} - LastErrorMsg: {}",
                self.device.error_code, self.device.error_message
            ),
            priority: 1,
        };

        if matches!(response.status_code, 404 | 500 | 504 | 507) {
            status.error_type = 0;
            status.priority = 1;
        } else if matches!(response.status_code, 201 | 202)
            && self.fsm.state() != DispenserState::Error
        {
            status.priority = 0;
        }

        status
    }
}
