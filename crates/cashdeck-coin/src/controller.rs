//! Public operation surface of the coin acceptor.
//!
//! Every operation drives the state machine with events, interprets the
//! entry-action outcomes, and maps them onto the stable status catalog:
//!
//! | code | meaning |
//! |------|---------|
//! | 200  | all sensors report good state |
//! | 201  | ready to read coins |
//! | 202  | coin detected |
//! | 203  | channels inhibited |
//! | 204  | reset ran successfully |
//! | 300  | start-reader ran again, ready |
//! | 301  | coin-on-string alert |
//! | 302  | coin rejected |
//! | 303  | no new information |
//! | 401  | polling fault, counters below thresholds |
//! | 402  | critical counter latched full |
//! | 403  | warn counter latched full |
//! | 404  | uninitialized response |
//! | 405  | cannot stop a reader that never started |
//! | 501  | measure sensor blocked |
//! | 502  | out sensor blocked |
//! | 503  | acceptor not responding |
//! | 504  | unclassifiable check outcome |
//! | 505  | port not found |
//! | 506  | acceptor did not reset |
//! | 507  | reader not started |
//! | 508  | channels could not be inhibited |
//! | 509  | critical fault latched; reader stopped into error |
//!
//! The numeric values are the compatibility surface; they are never
//! renumbered.

use std::time::Duration;

use tracing::debug;

use cashdeck_core::{CoinConfig, CoinTick, CommandResponse, DeviceStatus, LostCoins};
use cashdeck_fsm::StateMachine;
use cashdeck_transport::{PortOpener, SystemPortOpener};

use crate::device::{CoinDevice, IO_OK, IO_POLL_FAULT};
use crate::fsm::{CoinEvent, CoinState, TRANSITIONS};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Event counter value at which the device wraps back to zero.
const EVENT_WRAP: u8 = 255;

/// Fault codes that feed the warn counter while polling.
const WARN_CODES: [u8; 7] = [5, 6, 9, 10, 20, 119, 254];

/// Delta between two event counter values, `curr == 0` treated as the
/// wraparound sentinel so the result is never negative.
fn event_delta(prev: u8, curr: u8) -> u8 {
    let curr = u16::from(if curr == 0 { EVENT_WRAP } else { curr });
    let prev = u16::from(prev);
    if curr >= prev {
        (curr - prev) as u8
    } else {
        (curr + u16::from(EVENT_WRAP) - prev) as u8
    }
}

/// Controller for one coin acceptor.
///
/// Construct once per physical device; all operations take `&mut self`
/// and are meant to be called sequentially from a single owner.
pub struct CoinAcceptor {
    device: CoinDevice,
    fsm: StateMachine<CoinState, CoinEvent>,
    config: CoinConfig,

    warn_counter: u32,
    critical_counter: u32,
    deck_counter: u32,
    flag_critical: bool,
    flag_critical2: bool,

    event_prev: u8,
    remaining: u8,
}

impl CoinAcceptor {
    /// Acceptor on the numbered `/dev/ttyUSB` ports.
    pub fn new(config: CoinConfig) -> Self {
        let opener = Box::new(SystemPortOpener::usb());
        Self::with_opener(config, opener)
    }

    /// Acceptor over a custom port source (tests, unusual device naming).
    pub fn with_opener(config: CoinConfig, opener: Box<dyn PortOpener>) -> Self {
        let device = CoinDevice::new(opener, config.max_ports);
        Self {
            device,
            fsm: StateMachine::new(CoinState::Idle, &TRANSITIONS),
            config,
            warn_counter: 0,
            critical_counter: 0,
            deck_counter: 0,
            flag_critical: false,
            flag_critical2: false,
            event_prev: 0,
            remaining: 0,
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
    pub fn state(&self) -> CoinState {
        self.fsm.state()
    }

    fn init_fsm(&mut self) -> i32 {
        let device = &mut self.device;
        self.fsm.init(|s| device.enter(s))
    }

    fn step(&mut self, event: CoinEvent) -> i32 {
        let device = &mut self.device;
        self.fsm.run(event, |s| device.enter(s))
    }

    fn step_pinned(&mut self, state: CoinState) -> i32 {
        let device = &mut self.device;
        self.fsm.run_pinned(state, |s| device.enter(s))
    }

    /// Scan for the acceptor and run the initial health probe.
    ///
    /// Success settles the machine in `Check`; any failure forces the
    /// `Error` state and reports a 5xx status.
    pub fn connect(&mut self) -> CommandResponse {
        self.init_fsm();

        let connection = self.step(CoinEvent::Any);
        if connection == IO_OK {
            let check = self.step(CoinEvent::SuccessConnect);
            self.check_codes(check)
        } else {
            self.step(CoinEvent::Error);
            CommandResponse::new(505, "Connection to the acceptor failed, port not found")
        }
    }

    /// Run the health probe out-of-band, without disturbing polling.
    pub fn check_device(&mut self) -> CommandResponse {
        let check = self.step_pinned(CoinState::Check);
        self.check_codes(check)
    }

    /// Arm the acceptor for polling. Idempotent: an already-polling
    /// reader reports 300 instead of re-initializing; from any state
    /// other than `Check`/`Polling` the connect sequence is replayed
    /// first. Resets every escalation counter and latch.
    pub fn start_reader(&mut self) -> CommandResponse {
        let mut response = CommandResponse::new(404, "Default error");
        let mut flag_ready = true;
        let mut flag_init = false;

        self.deck_counter = 0;
        self.warn_counter = 0;
        self.critical_counter = 0;
        self.event_prev = 0;
        self.remaining = 0;
        self.flag_critical = false;
        self.flag_critical2 = false;

        match self.fsm.state() {
            CoinState::Check => flag_init = true,
            CoinState::Polling => {
                if self.device.coin_event <= 1 {
                    response = CommandResponse::new(300, "Start reader ran again. Ready to start");
                } else {
                    // The event counter is dirty: pass through Reset and
                    // back to Check before re-arming.
                    let reset = self.step(CoinEvent::FinishPoll);
                    if reset == IO_OK {
                        let check = self.step(CoinEvent::Loop);
                        response = self.check_codes(check);
                        if response.status_code == 200 || response.status_code == 300 {
                            flag_init = true;
                        }
                    } else {
                        flag_ready = false;
                    }
                }
            }
            _ => {
                response = self.connect();
                if response.status_code == 200 || response.status_code == 300 {
                    flag_init = true;
                }
            }
        }

        if flag_ready {
            if flag_init {
                let enable = self.step(CoinEvent::CallPolling);
                if enable == IO_OK {
                    let poll = self.step(CoinEvent::Ready);
                    if (poll == IO_OK || poll == IO_POLL_FAULT) && self.device.coin_event <= 1 {
                        response =
                            CommandResponse::new(201, "Acceptor OK. Ready to start reading coins");
                    } else if self.device.coin_event > 1 {
                        response = CommandResponse::new(
                            506,
                            "Acceptor failed. It did not reset although a reset was attempted",
                        );
                    } else {
                        response = CommandResponse::new(503, "Acceptor failed. Not responding");
                    }
                } else {
                    response = CommandResponse::new(503, "Acceptor failed. Not responding");
                }
            }
        } else {
            response = self.check_codes(1);
        }

        response
    }

    /// One poll tick. Valid only while polling; reports credited coins,
    /// rejected coins, and the escalation ladder for recurring faults.
    pub fn get_coin(&mut self) -> CoinTick {
        let mut tick = CoinTick {
            status_code: 404,
            event: 0,
            coin: 0,
            message: "Default error".to_string(),
            remaining: 0,
        };

        if self.fsm.state() != CoinState::Polling {
            tick.status_code = 507;
            tick.message = "Reader has not been started (StartReader)".to_string();
            return tick;
        }

        let poll = self.step(CoinEvent::Poll);

        if self.device.coin_event != self.event_prev {
            self.remaining = event_delta(self.event_prev, self.device.coin_event);
            debug!(
                target: "cashdeck::coin",
                event = self.device.coin_event, prev = self.event_prev,
                "new event window"
            );

            if poll == IO_OK {
                tick.status_code = 202;
                tick.event = self.device.coin_event;
                tick.coin = self.device.last_coin;
                tick.message = "Coin detected".to_string();

                self.deck_counter = 0;
                self.warn_counter = 0;
                self.critical_counter = 0;
            } else if poll == IO_POLL_FAULT {
                let fault = self.device.poll_fault;
                if fault.code == 1 {
                    tick.status_code = 302;
                    tick.event = self.device.coin_event;
                    tick.message = "Coin rejected".to_string();
                    self.warn_counter += 1;
                } else {
                    if fault.critical == 1 {
                        self.critical_counter += 1;
                    }
                    if WARN_CODES.contains(&fault.code) {
                        self.warn_counter += 1;
                    }
                    if fault.code == 254 {
                        self.deck_counter += 1;
                    }

                    if self.critical_counter >= self.config.max_critical {
                        self.flag_critical = true;
                    }
                    if self.warn_counter >= self.config.warn_to_critical
                        || self.deck_counter >= self.config.warn_to_critical
                    {
                        self.flag_critical2 = true;
                    }

                    tick.event = self.device.coin_event;
                    if self.flag_critical {
                        tick.status_code = 402;
                        tick.message = format!(
                            "Code: {} Message: {} CC: Full WC: {}",
                            fault.code, fault.message, self.warn_counter
                        );
                        self.flag_critical2 = true;
                    } else if self.flag_critical2 {
                        tick.status_code = 403;
                        tick.message = format!(
                            "Code: {} Message: {} CC: {} WC: Full",
                            fault.code, fault.message, self.critical_counter
                        );
                    } else {
                        tick.status_code = 401;
                        tick.message = format!(
                            "Code: {} Message: {} CC: {} WC: {}",
                            fault.code, fault.message, self.critical_counter, self.warn_counter
                        );
                    }
                }
            } else {
                tick.status_code = 503;
                tick.event = self.device.coin_event;
                tick.message = "Acceptor failed. Not responding".to_string();
                self.flag_critical = true;
            }

            if self.remaining > 1 {
                tick.remaining = self.remaining;
            }

            self.event_prev = if self.device.coin_event == EVENT_WRAP {
                0
            } else {
                self.device.coin_event
            };
        } else {
            tick.status_code = 303;
            tick.event = self.event_prev;
            tick.message = "No new information".to_string();
        }

        tick
    }

    /// Per-denomination tally of coins credited inside multi-event
    /// windows; zeroes outside the polling state.
    pub fn get_lost_coins(&self) -> LostCoins {
        if self.fsm.state() == CoinState::Polling {
            self.device.lost
        } else {
            LostCoins::default()
        }
    }

    /// Write a custom inhibit mask. Pure configuration: no state change.
    pub fn modify_channels(&mut self, mask1: u8, mask2: u8) -> CommandResponse {
        if self.device.change_inhibit(mask1, mask2) == IO_OK {
            CommandResponse::new(203, "Acceptor OK. Channels inhibited")
        } else {
            CommandResponse::new(508, "Acceptor failed. Channels could not be inhibited")
        }
    }

    /// Stop polling. Fails closed: a latched critical posture refuses the
    /// normal shutdown and forces the `Error` state instead.
    pub fn stop_reader(&mut self) -> CommandResponse {
        if self.fsm.state() != CoinState::Polling {
            return CommandResponse::new(405, "Cannot stop a reader that has not been started");
        }

        if self.flag_critical || self.flag_critical2 {
            self.step(CoinEvent::Error);
            return CommandResponse::new(509, "Deposit failed. A critical fault was latched");
        }

        let reset = self.step(CoinEvent::FinishPoll);
        if reset == IO_OK {
            // FinishPoll is issued again here; from Reset no table row
            // matches, so this settles to the neutral outcome and the
            // machine stays in Reset.
            let check = self.step(CoinEvent::FinishPoll);
            self.check_codes(check)
        } else {
            self.step(CoinEvent::Error);
            CommandResponse::new(
                506,
                "Acceptor failed. It did not reset although a reset was attempted",
            )
        }
    }

    /// Reset the acceptor out-of-band and verify its event counter.
    pub fn reset_device(&mut self) -> CommandResponse {
        let reset = self.step_pinned(CoinState::Reset);
        if reset == IO_OK {
            CommandResponse::new(204, "Acceptor OK. Reset ran successfully")
        } else {
            CommandResponse::new(
                506,
                "Acceptor failed. It did not reset although a reset was attempted",
            )
        }
    }

    /// Read-only diagnostics snapshot for alerting.
    pub fn test_status(&self) -> DeviceStatus {
        let fault = self.device.poll_fault;
        if self.device.fault_code != 0 {
            DeviceStatus {
                version: VERSION.to_string(),
                device: 1,
                error_type: 0,
                error_code: i32::from(self.device.fault_code),
                message: self.device.fault_message.to_string(),
                additional_info: format!(
                    "ErrorCode: {} ErrorMessage: {}",
                    fault.code, fault.message
                ),
                priority: 1,
            }
        } else {
            DeviceStatus {
                version: VERSION.to_string(),
                device: 1,
                error_type: 1,
                error_code: i32::from(fault.code),
                message: fault.message.to_string(),
                additional_info: "FaultCode: OK".to_string(),
                priority: fault.critical,
            }
        }
    }

    /// Map a check outcome plus the opto flags onto the status catalog.
    fn check_codes(&self, check: i32) -> CommandResponse {
        if check == 0 {
            CommandResponse::new(200, "Acceptor OK. All sensors report good state")
        } else if check == 2 {
            if self.device.opto.no_used_bit {
                CommandResponse::new(200, "Acceptor OK. All sensors report good state")
            } else if self.device.opto.cos_alert {
                CommandResponse::new(301, "Acceptor OK. Coin-on-string alert reported")
            } else {
                CommandResponse::new(504, "Acceptor driver fault. Unclassifiable check outcome")
            }
        } else if self.device.opto.measure_photo_blocked {
            CommandResponse::new(501, "Acceptor failed. Measure sensor is blocked")
        } else if self.device.opto.out_photo_blocked {
            CommandResponse::new(502, "Acceptor failed. Out sensor is blocked")
        } else {
            CommandResponse::new(503, "Acceptor failed. Not responding")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_delta_simple_advance() {
        assert_eq!(event_delta(3, 4), 1);
        assert_eq!(event_delta(3, 8), 5);
        assert_eq!(event_delta(0, 1), 1);
    }

    #[test]
    fn test_event_delta_wraparound_is_not_negative() {
        // Counter wrapped: zero is treated as the sentinel value.
        assert_eq!(event_delta(250, 0), 5);
        assert_eq!(event_delta(255, 0), 0);
        // A post-wrap advance still counts forward.
        assert_eq!(event_delta(254, 3), 4);
    }

    #[test]
    fn test_event_delta_equal_counters() {
        assert_eq!(event_delta(10, 10), 0);
    }
}
