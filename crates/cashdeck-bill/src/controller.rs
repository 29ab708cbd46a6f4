//! Public operation surface of the bill acceptor.
//!
//! Status catalog (numeric values are the compatibility surface):
//!
//! | code | meaning |
//! |------|---------|
//! | 200  | synced successfully |
//! | 201  | checked successfully |
//! | 202  | ready to read bills |
//! | 203  | start-reader ran again, ready |
//! | 204  | channels inhibited |
//! | 205  | stop-reader ran successfully |
//! | 206  | reject ran successfully |
//! | 301  | repeated reply, already seen |
//! | 302  | no new information |
//! | 303  | reading a note, value unknown yet |
//! | 304  | note detected |
//! | 305  | note rejected, waiting for pickup |
//! | 306  | rejected note picked up |
//! | 307  | note read, stacking |
//! | 308  | note stacked |
//! | 309  | note credited, ready to stack |
//! | 311  | inhibited note, waiting for pickup |
//! | 312  | note credited and stacked |
//! | 404  | uninitialized response |
//! | 501  | acceptor not responding |
//! | 502  | port not found |
//! | 503  | reader not started |
//! | 504  | command returned a failure code |
//! | 505  | no note to act on / invalid reply length |
//! | 507  | sequence error, the previous note may be lost |
//! | 508  | credited with an unexpected additional event |
//! | 510  | unclassified event error |
//! | 511  | unknown note channel, or disable failed on stop |
//! | 512  | check failed during stop |
//! | 513  | cannot stop a reader that never started |
//!
//! A poll tick whose status equals the previous tick's status collapses to
//! the canned 302 reply. The device reporting the same terminal event
//! twice is indistinguishable from two genuinely identical outcomes, and
//! callers depend on the collapsed form; keep it.

use std::time::Duration;

use cashdeck_core::{BillConfig, BillTick, CommandResponse, DeviceStatus};
use cashdeck_fsm::StateMachine;
use cashdeck_protocol::bill::{
    CODE_OK, EVENT_CREDIT, EVENT_READ, EVENT_REJECTED, EVENT_REJECTING, EVENT_STACKED,
    EVENT_STACKING,
};
use cashdeck_transport::{PortOpener, SystemPortOpener};

use crate::device::{BillDevice, IO_OK};
use crate::fsm::{BillEvent, BillState, TRANSITIONS};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn no_news() -> BillTick {
    BillTick::new(302, 0, "Acceptor OK. No new information")
}

/// Controller for one bill acceptor.
pub struct BillAcceptor {
    device: BillDevice,
    fsm: StateMachine<BillState, BillEvent>,

    /// Channel inhibit mask; bit `n` set enables channel `n + 1`.
    inhibit: u8,
    /// A note is in flight between READ and its terminal event.
    flag_reading: bool,
    /// Previous tick, for the consecutive-duplicate collapse.
    last_tick: BillTick,
}

impl BillAcceptor {
    /// Acceptor on the numbered `/dev/ttyACM` ports.
    pub fn new(config: BillConfig) -> Self {
        let opener = Box::new(SystemPortOpener::acm());
        Self::with_opener(config, opener)
    }

    /// Acceptor over a custom port source (tests, unusual device naming).
    pub fn with_opener(config: BillConfig, opener: Box<dyn PortOpener>) -> Self {
        Self {
            device: BillDevice::new(opener, config.max_ports),
            fsm: StateMachine::new(BillState::Idle, &TRANSITIONS),
            inhibit: config.inhibit_mask,
            flag_reading: false,
            last_tick: BillTick::new(404, 0, "Default error"),
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

    /// State the acceptor's machine currently rests on.
    pub fn state(&self) -> BillState {
        self.fsm.state()
    }

    fn init_fsm(&mut self) -> i32 {
        let device = &mut self.device;
        self.fsm.init(|s| device.enter(s))
    }

    fn step(&mut self, event: BillEvent) -> i32 {
        let device = &mut self.device;
        self.fsm.run(event, |s| device.enter(s))
    }

    fn step_pinned(&mut self, state: BillState) -> i32 {
        let device = &mut self.device;
        self.fsm.run_pinned(state, |s| device.enter(s))
    }

    /// Scan for the acceptor, sync and settle into `Disable`.
    pub fn connect(&mut self) -> CommandResponse {
        self.init_fsm();

        let response = if self.step(BillEvent::Any) == IO_OK {
            if self.step(BillEvent::SuccessConnect) == IO_OK {
                CommandResponse::new(200, "Acceptor OK. Synced successfully")
            } else {
                CommandResponse::new(501, "Acceptor failed. Not responding")
            }
        } else {
            CommandResponse::new(502, "Connection to the acceptor failed, port not found")
        };

        if response.status_code != 200 {
            self.step(BillEvent::Error);
        }

        response
    }

    /// Run the health check (last-reject + poll) out-of-band.
    pub fn check_device(&mut self) -> CommandResponse {
        let check = self.step_pinned(BillState::Check);

        let response = if check == IO_OK {
            CommandResponse::new(201, "Acceptor OK. Checked successfully")
        } else {
            CommandResponse::new(501, "Acceptor failed. Not responding")
        };

        if response.status_code != 201 {
            self.step(BillEvent::Error);
        }

        response
    }

    /// Arm the acceptor for polling. Idempotent while already polling;
    /// from any foreign state the connect sequence is replayed first.
    pub fn start_reader(&mut self) -> CommandResponse {
        let mut response = CommandResponse::new(404, "Default error");
        let mut flag_ready = false;
        let mut flag_in_state = false;
        let mut flag_finish = false;

        match self.fsm.state() {
            BillState::Disable => flag_ready = true,
            BillState::Polling => flag_in_state = true,
            _ => {
                response = self.connect();
                if response.status_code == 200 {
                    flag_ready = true;
                }
            }
        }

        if flag_ready {
            let enable = self.step(BillEvent::Ready);
            if enable == IO_OK {
                let poll = self.step(BillEvent::CallPolling);
                if poll == IO_OK {
                    response = CommandResponse::new(202, "Acceptor OK. Ready to read bills");
                    flag_finish = true;
                }
            }
        }

        if !flag_finish {
            if flag_in_state {
                response = CommandResponse::new(
                    203,
                    "Acceptor OK. Start reader ran again. Ready to read bills",
                );
            } else {
                response = CommandResponse::new(501, "Acceptor failed. Not responding");
            }
        }

        if response.status_code != 202 && response.status_code != 203 {
            self.step(BillEvent::Error);
        }

        response
    }

    /// One poll tick; valid only while polling.
    ///
    /// A tick whose status equals the previous tick's collapses to the
    /// canned no-news reply (see the module docs).
    pub fn get_bill(&mut self) -> BillTick {
        let tick = if self.fsm.state() == BillState::Polling {
            let poll = self.step(BillEvent::Poll);

            if poll == IO_OK {
                self.classify_frame()
            } else if poll == 2 {
                BillTick::new(301, 0, "Acceptor OK. Repeated reply, already seen")
            } else {
                BillTick::new(501, 0, "Acceptor failed. Not responding")
            }
        } else {
            BillTick::new(503, 0, "Reader has not been started (StartReader)")
        };

        if self.last_tick.status_code == tick.status_code {
            no_news()
        } else {
            self.last_tick = tick.clone();
            tick
        }
    }

    /// Map the device mirrors of a fresh poll reply onto a tick.
    fn classify_frame(&mut self) -> BillTick {
        let length = self.device.length_data;
        let code = self.device.response_code;

        if length == 1 && code.code == CODE_OK {
            return BillTick::new(302, 0, "Acceptor OK. No new information");
        }

        if code.code != CODE_OK {
            // 245 is "command cannot be processed": there is no note to
            // act on. Anything else is a software-side failure.
            return if code.code != 245 {
                BillTick::new(
                    504,
                    0,
                    format!("Command failed. Command returns: {}", code.message),
                )
            } else {
                BillTick::new(505, 0, "No note. Command cannot be processed")
            };
        }

        if length < 2 {
            return BillTick::new(505, 0, "Reply failed. Invalid length");
        }

        let event = self.device.event;
        match event.code {
            EVENT_READ => self.classify_read(),
            EVENT_REJECTING => {
                self.flag_reading = false;
                BillTick::new(305, 0, "Note rejected. Waiting for the user to take it")
            }
            EVENT_REJECTED => {
                self.flag_reading = false;
                BillTick::new(306, 0, "Note rejected. User took the note back")
            }
            EVENT_STACKING => {
                self.flag_reading = true;
                BillTick::new(307, self.device.bill, "Note read. Stacking")
            }
            EVENT_STACKED => {
                if self.flag_reading {
                    if self.last_tick.status_code != 312 {
                        self.flag_reading = false;
                        BillTick::new(308, self.device.bill, "Note stacked")
                    } else {
                        BillTick::new(302, 0, "Acceptor OK. No new information")
                    }
                } else {
                    BillTick::new(302, 0, "Acceptor OK. No new information")
                }
            }
            EVENT_CREDIT => {
                let length = self.device.length_data;
                let bill = self.device.bill;
                let tick = if length == 3 {
                    BillTick::new(309, bill, "Note credited, ready to stack")
                } else if length == 4 {
                    let additional = self.device.additional;
                    if additional.code == EVENT_STACKING || additional.code == EVENT_STACKED {
                        if self.flag_reading {
                            BillTick::new(312, bill, "Note credited and stacked")
                        } else {
                            BillTick::new(302, 0, "Acceptor OK. No new information")
                        }
                    } else {
                        BillTick::new(
                            508,
                            bill,
                            format!("Note credited, but with error: {}", additional.message),
                        )
                    }
                } else {
                    BillTick::new(
                        508,
                        bill,
                        format!(
                            "Note credited, but with error: {}",
                            self.device.additional.message
                        ),
                    )
                };
                self.flag_reading = false;
                tick
            }
            _ => {
                let bill = if self.device.length_data == 3 {
                    self.device.bill
                } else {
                    0
                };
                BillTick::new(
                    510,
                    bill,
                    format!("Grave acceptor error: {}", event.message),
                )
            }
        }
    }

    /// READ event: a note is at the entrance, possibly recognized.
    fn classify_read(&mut self) -> BillTick {
        let bill = self.device.bill;

        if bill == 0 {
            // Value not known yet. A set reading flag here means the
            // previous note never reached a terminal event.
            return if !self.flag_reading {
                BillTick::new(303, 0, "Reading note. Value unknown yet")
            } else {
                BillTick::new(
                    507,
                    0,
                    "Acceptor sequence error. The previous note may be lost",
                )
            };
        }

        let channel = self.device.channel;
        if !(1..=7).contains(&channel) {
            self.flag_reading = false;
            return BillTick::new(511, bill, "Code failure. Unknown note channel");
        }

        if self.inhibit & (1 << (channel - 1)) == 0 {
            // Channel inhibited by the caller's mask: send the note back.
            let rejected = self.reject();
            self.flag_reading = false;
            if rejected.status_code == 206 {
                BillTick::new(311, bill, "Inhibited note. Waiting for the user to take it")
            } else {
                BillTick::new(501, bill, "Acceptor failed. Not responding")
            }
        } else {
            self.flag_reading = true;
            BillTick::new(304, bill, "Reading note. Note detected")
        }
    }

    /// Replace the inhibit mask. Pure configuration: nothing is written
    /// to the device; the mask is enforced at READ time.
    pub fn modify_channels(&mut self, inhibit_mask: u8) -> CommandResponse {
        self.inhibit = inhibit_mask;
        CommandResponse::new(204, "Acceptor OK. Channels inhibited")
    }

    /// Stop polling through the check and disable states.
    pub fn stop_reader(&mut self) -> CommandResponse {
        let response = if self.fsm.state() == BillState::Polling {
            let check = self.step(BillEvent::FinishPoll);
            if check == IO_OK {
                let disable = self.step(BillEvent::Loop);
                if disable == IO_OK {
                    CommandResponse::new(205, "Acceptor OK. Stop reader ran successfully")
                } else {
                    CommandResponse::new(511, "Acceptor failed. Could not be disabled")
                }
            } else {
                CommandResponse::new(512, "Acceptor failed. Could not be checked")
            }
        } else {
            CommandResponse::new(513, "Cannot stop a reader that has not been started")
        };

        if response.status_code != 205 {
            self.step(BillEvent::Error);
        }

        response
    }

    /// Send the current note back to the user.
    pub fn reject(&mut self) -> CommandResponse {
        if self.device.reject() == IO_OK {
            CommandResponse::new(206, "Acceptor OK. Reject ran successfully")
        } else {
            CommandResponse::new(501, "Acceptor failed. Not responding")
        }
    }

    /// Read-only diagnostics snapshot for alerting.
    pub fn test_status(&self) -> DeviceStatus {
        let response = self.device.response_code;
        let event = self.device.event;
        let reject = self.device.last_reject;

        if response.code != CODE_OK {
            DeviceStatus {
                version: VERSION.to_string(),
                device: 1,
                error_type: 0,
                error_code: i32::from(response.code),
                message: response.message.to_string(),
                additional_info: format!(
                    "LastEventCode: {} LastEventMessage: {}",
                    event.code, event.message
                ),
                priority: 1,
            }
        } else {
            let priority = u8::from(event.priority == 1 || reject.priority == 1);
            DeviceStatus {
                version: VERSION.to_string(),
                device: 1,
                error_type: 1,
                error_code: i32::from(event.code),
                message: event.message.to_string(),
                additional_info: format!(
                    "LastRejectCode: {} LastRejectMessage: {}",
                    reject.code, reject.message
                ),
                priority,
            }
        }
    }
}
