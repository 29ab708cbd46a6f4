//! Device layer of the card dispenser: command exchange with the
//! accumulate-and-retry receive loop, the host ACK write-back, status-flag
//! mirrors and the per-state entry actions.

use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use cashdeck_core::{DispenserConfig, DispenserFlags};
use cashdeck_protocol::dispenser::{self, DispDecode, MIN_RESPONSE_LEN};
use cashdeck_transport::{PortOpener, SerialLink, scan_ports};

use crate::fsm::DispenserState;

/// Outcome codes shared by entry actions and device commands.
pub(crate) const IO_OK: i32 = 0;
pub(crate) const IO_REPEAT: i32 = 1;
pub(crate) const IO_FATAL: i32 = -1;
/// The device answered with a fault code (see the error mirrors).
pub(crate) const IO_FAIL_CODE: i32 = 2;

const READ_BUFFER: usize = 100;

/// Base settle time after every write, before the receive loop starts.
pub(crate) const DEFAULT_SETTLE: Duration = Duration::from_millis(300);

const DEFAULT_ERROR: &str = "Default error";

/// One card dispenser on one serial line.
pub struct DispenserDevice {
    opener: Box<dyn PortOpener>,
    link: Option<Box<dyn SerialLink>>,
    settle: Duration,
    config: DispenserConfig,

    pub(crate) port: Option<usize>,
    pub(crate) initialized: bool,

    /// Sensor flags from the last success response.
    pub(crate) flags: DispenserFlags,

    /// Last device-reported fault.
    pub(crate) error_code: String,
    pub(crate) error_message: &'static str,
}

impl DispenserDevice {
    pub(crate) fn new(opener: Box<dyn PortOpener>, config: DispenserConfig) -> Self {
        Self {
            opener,
            link: None,
            settle: DEFAULT_SETTLE,
            config,
            port: None,
            initialized: false,
            flags: DispenserFlags::default(),
            error_code: DEFAULT_ERROR.to_string(),
            error_message: DEFAULT_ERROR,
        }
    }

    pub(crate) fn set_settle(&mut self, settle: Duration) {
        self.settle = settle;
    }

    // ---- state entry actions -------------------------------------------

    pub(crate) fn enter(&mut self, state: DispenserState) -> i32 {
        match state {
            DispenserState::Idle => self.st_idle(),
            DispenserState::Connect => self.st_connect(),
            DispenserState::Init => self.st_init(),
            DispenserState::Wait => self.st_wait(),
            DispenserState::MovingMotor => self.st_moving_motor(),
            DispenserState::HandingCard => self.st_handing_card(),
            DispenserState::Error => self.st_error(),
        }
    }

    fn st_idle(&mut self) -> i32 {
        info!(target: "cashdeck::dispenser", "session start");
        IO_OK
    }

    fn st_connect(&mut self) -> i32 {
        info!(target: "cashdeck::dispenser", "scanning ports");
        let settle = self.settle;
        let short_wait = self.config.short_wait;

        let found = scan_ports(self.opener.as_mut(), self.config.max_ports, |link| {
            probe_init(link, settle, short_wait)
        });

        match found {
            Some((index, link)) => {
                info!(target: "cashdeck::dispenser", port = index, "dispenser found");
                self.port = Some(index);
                self.link = Some(link);
                // The probe's init command already initialized the device.
                self.initialized = true;
                IO_OK
            }
            None => {
                error!(target: "cashdeck::dispenser", "dispenser not found on any port");
                self.port = None;
                self.link = None;
                IO_REPEAT
            }
        }
    }

    fn st_init(&mut self) -> i32 {
        if self.initialized {
            debug!(target: "cashdeck::dispenser", "already initialized");
            IO_OK
        } else {
            debug!(target: "cashdeck::dispenser", "initializing");
            self.init_dispenser()
        }
    }

    fn st_wait(&mut self) -> i32 {
        debug!(target: "cashdeck::dispenser", "refreshing status");
        let response = self.check_status();
        if response == IO_REPEAT {
            error!(target: "cashdeck::dispenser", "status check failed");
        } else if response == IO_OK {
            self.log_flags();
        }
        response
    }

    fn st_moving_motor(&mut self) -> i32 {
        if !(self.flags.cards_in_dispenser || self.flags.dispenser_full) {
            warn!(target: "cashdeck::dispenser", "no cards in dispenser");
            return 3;
        }

        debug!(target: "cashdeck::dispenser", "dispensing card");
        let dispensed = self.dispense_card();

        if dispensed == IO_OK {
            if self.flags.card_in_gate {
                debug!(target: "cashdeck::dispenser", "card is in gate");
                IO_OK
            } else if self.flags.rfic_card_in_gate {
                warn!(target: "cashdeck::dispenser", "card stuck in the channel");
                2
            } else {
                warn!(target: "cashdeck::dispenser", "card not seen at gate");
                IO_OK
            }
        } else if dispensed == IO_FAIL_CODE {
            error!(target: "cashdeck::dispenser", "card was not dispensed");
            2
        } else {
            debug!(target: "cashdeck::dispenser", "re-reading status after failed dispense");
            let checked = self.check_status();
            if checked == IO_OK && self.flags.card_in_gate {
                self.log_flags();
                IO_OK
            } else {
                checked
            }
        }
    }

    fn st_handing_card(&mut self) -> i32 {
        if self.flags.card_in_gate {
            debug!(target: "cashdeck::dispenser", "returning card to recycling box");
            let returned = self.return_card_to_box();

            if returned == IO_OK {
                debug!(target: "cashdeck::dispenser", "card is in recycling box");
                IO_OK
            } else if returned == IO_FAIL_CODE {
                debug!(target: "cashdeck::dispenser", "recycle failed with fault code");
                2
            } else {
                debug!(target: "cashdeck::dispenser", "re-reading status after failed recycle");
                let checked = self.check_status();
                if !self.flags.card_in_gate && checked == IO_OK && !self.flags.rfic_card_in_gate {
                    debug!(target: "cashdeck::dispenser", "problem solved");
                    IO_OK
                } else {
                    warn!(target: "cashdeck::dispenser", "problem could not be solved");
                    checked
                }
            }
        } else if self.flags.rfic_card_in_gate {
            error!(target: "cashdeck::dispenser", "card stuck in the channel");
            2
        } else {
            debug!(target: "cashdeck::dispenser", "no card in gate");
            3
        }
    }

    fn st_error(&mut self) -> i32 {
        error!(target: "cashdeck::dispenser", "error state, reading last status");
        let response = self.check_status();
        if response == IO_REPEAT {
            error!(target: "cashdeck::dispenser", "status check failed");
        } else if response == IO_OK {
            self.log_flags();
        }
        response
    }

    // ---- device commands -----------------------------------------------

    /// Initialize the mechanism, retrying up to the configured attempts.
    pub(crate) fn init_dispenser(&mut self) -> i32 {
        let attempts = self.config.max_init_attempts.max(1);
        for attempt in 1..=attempts {
            info!(target: "cashdeck::dispenser", attempt, "sending init");
            let response = self.send_command(&dispenser::INIT, self.config.short_wait);

            if response == IO_OK {
                info!(target: "cashdeck::dispenser", attempt, "initialized");
                self.initialized = true;
                return IO_OK;
            }
            if response == IO_FATAL {
                error!(target: "cashdeck::dispenser", "read/write error during init");
                return IO_REPEAT;
            }
            if attempt < attempts {
                warn!(target: "cashdeck::dispenser", attempt, "repeating init");
            }
        }

        error!(
            target: "cashdeck::dispenser",
            attempts, "dispenser could not be initialized"
        );
        IO_REPEAT
    }

    /// Move one card from the hopper to the gate (motor command).
    pub(crate) fn dispense_card(&mut self) -> i32 {
        info!(target: "cashdeck::dispenser", "sending dispense");
        let response = self.send_command(&dispenser::DISPENSE_CARD, self.config.long_wait);
        match response {
            IO_REPEAT | IO_FATAL => {
                error!(target: "cashdeck::dispenser", "dispense command could not run");
                IO_REPEAT
            }
            IO_OK => {
                info!(target: "cashdeck::dispenser", "card moved to gate");
                IO_OK
            }
            _ => {
                warn!(target: "cashdeck::dispenser", "dispense answered with a fault code");
                response
            }
        }
    }

    /// Refresh the status flags.
    pub(crate) fn check_status(&mut self) -> i32 {
        debug!(target: "cashdeck::dispenser", "sending status query");
        let response = self.send_command(&dispenser::GET_STATUS, self.config.short_wait);
        if response == IO_REPEAT || response == IO_FATAL {
            error!(target: "cashdeck::dispenser", "status query could not run");
            return IO_REPEAT;
        }
        response
    }

    /// Send the gate card to the recycling box (motor command).
    pub(crate) fn return_card_to_box(&mut self) -> i32 {
        info!(target: "cashdeck::dispenser", "sending recycle");
        let response = self.send_command(&dispenser::RETURN_CARD, self.config.long_wait);
        if response == IO_REPEAT || response == IO_FATAL {
            error!(target: "cashdeck::dispenser", "recycle command could not run");
            return IO_REPEAT;
        }
        response
    }

    fn log_flags(&self) {
        trace!(
            target: "cashdeck::dispenser",
            card_in_gate = self.flags.card_in_gate,
            rfic_card_in_gate = self.flags.rfic_card_in_gate,
            cards_in_dispenser = self.flags.cards_in_dispenser,
            dispenser_full = self.flags.dispenser_full,
            recycling_box_full = self.flags.recycling_box_full,
            "status flags"
        );
    }

    // ---- exchange plumbing ---------------------------------------------

    /// Send one command, assemble the reply, decode, and write the host
    /// ACK when the reply was accepted.
    fn send_command(&mut self, cmd: &[u8], extra_wait: Duration) -> i32 {
        let settle = self.settle;
        let long_wait = self.config.long_wait;
        let attempts = self.config.max_init_attempts.max(1);

        let Some(link) = self.link.as_mut() else {
            warn!(target: "cashdeck::dispenser", "no link open");
            return IO_FATAL;
        };

        if link.write_frame(cmd).is_err() {
            link.discard_io();
            return IO_FATAL;
        }

        std::thread::sleep(settle);
        std::thread::sleep(extra_wait);

        // Motor commands answer in fragments; keep reading until the
        // structural minimum is assembled or the attempts run out.
        let mut assembled: Vec<u8> = Vec::new();
        let mut attempt = 0;
        while assembled.len() < MIN_RESPONSE_LEN && attempt < attempts {
            let mut buf = [0u8; READ_BUFFER];
            match link.read_available(&mut buf) {
                Ok(0) => {
                    warn!(target: "cashdeck::dispenser", "not responding, waiting");
                    std::thread::sleep(long_wait);
                }
                Ok(read) => {
                    assembled.extend_from_slice(&buf[..read]);
                    if assembled.len() < MIN_RESPONSE_LEN {
                        warn!(
                            target: "cashdeck::dispenser",
                            got = assembled.len(), "partial response"
                        );
                        std::thread::sleep(long_wait);
                    }
                }
                Err(_) => {
                    error!(target: "cashdeck::dispenser", "read error");
                    link.discard_io();
                    return IO_FATAL;
                }
            }
            attempt += 1;
        }

        if assembled.len() < MIN_RESPONSE_LEN {
            warn!(target: "cashdeck::dispenser", "timeout waiting for response");
            link.discard_io();
            return IO_FATAL;
        }

        let decode = dispenser::decode(cmd, &assembled);
        self.apply_decode(decode)
    }

    fn apply_decode(&mut self, decode: DispDecode) -> i32 {
        match decode {
            DispDecode::Success(flags) => {
                self.flags = flags;
                // The device expects a lone ACK once the reply is taken.
                if let Some(link) = self.link.as_mut() {
                    if link.write_frame(&dispenser::HOST_ACK).is_err() {
                        error!(target: "cashdeck::dispenser", "could not write host ACK");
                    }
                }
                IO_OK
            }
            DispDecode::Fault(fault) => {
                warn!(
                    target: "cashdeck::dispenser",
                    code = %fault.code, message = fault.message,
                    "device fault"
                );
                self.error_code = fault.code;
                self.error_message = fault.message;
                IO_FAIL_CODE
            }
            DispDecode::UnknownCode { fault_code } => {
                error!(target: "cashdeck::dispenser", ?fault_code, "code not found in any table");
                if let Some(code) = fault_code {
                    self.error_code = code;
                    self.error_message = "Code not found!!!";
                }
                self.flush();
                IO_FATAL
            }
            DispDecode::StaleEcho => {
                error!(target: "cashdeck::dispenser", "reply echoes a different command");
                self.flush();
                IO_FATAL
            }
            DispDecode::Corrupt => {
                error!(target: "cashdeck::dispenser", "reply body corrupt");
                self.flush();
                IO_FATAL
            }
            DispDecode::Nak | DispDecode::Eot | DispDecode::Garbled => {
                warn!(target: "cashdeck::dispenser", "device did not acknowledge");
                IO_FATAL
            }
        }
    }

    fn flush(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.discard_io();
        }
    }
}

/// Scan probe: one init exchange on a candidate link.
fn probe_init(link: &mut dyn SerialLink, settle: Duration, extra_wait: Duration) -> bool {
    if link.write_frame(&dispenser::INIT).is_err() {
        return false;
    }

    std::thread::sleep(settle);
    std::thread::sleep(extra_wait);

    let mut buf = [0u8; READ_BUFFER];
    let Ok(read) = link.read_available(&mut buf) else {
        return false;
    };
    if read < MIN_RESPONSE_LEN {
        return false;
    }

    match dispenser::decode(&dispenser::INIT, &buf[..read]) {
        DispDecode::Success(_) => {
            let _ = link.write_frame(&dispenser::HOST_ACK);
            true
        }
        _ => false,
    }
}
