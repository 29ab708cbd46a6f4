//! Device layer of the coin acceptor: command exchange, decode mirrors and
//! the per-state entry actions driven by the controller's state machine.

use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use cashdeck_core::LostCoins;
use cashdeck_protocol::coin::{
    self, CoinDecode, OptoStates, PollRead, PollingFault, fault_message,
};
use cashdeck_transport::{PortOpener, SerialLink, scan_ports};

use crate::fsm::CoinState;

/// Outcome codes shared by entry actions and device commands.
pub(crate) const IO_OK: i32 = 0;
pub(crate) const IO_REPEAT: i32 = 1;
pub(crate) const IO_FATAL: i32 = -1;
pub(crate) const IO_POLL_FAULT: i32 = -2;

const READ_BUFFER: usize = 100;

/// Default settle time between writing a command and reading the reply.
pub(crate) const DEFAULT_SETTLE: Duration = Duration::from_millis(200);

fn placeholder_fault() -> PollingFault {
    PollingFault {
        code: 0,
        message: "Default error",
        rejected: 0,
        critical: 0,
    }
}

/// One coin acceptor on one serial line.
///
/// Owns the link, the scan configuration, and the mirrors of the last
/// decoded replies (event counter, credited coin, fault classification,
/// self-check and opto states) that the controller reads after driving the
/// state machine.
pub struct CoinDevice {
    opener: Box<dyn PortOpener>,
    link: Option<Box<dyn SerialLink>>,
    max_ports: usize,
    settle: Duration,

    /// Port index the scan settled on.
    pub(crate) port: Option<usize>,

    /// Device-side event counter from the last buffered-credit reply.
    pub(crate) coin_event: u8,
    /// Counter value the next poll interpretation diffs against.
    event_prev: u8,

    /// Most recent credited coin.
    pub(crate) last_coin: u32,
    /// Catch-up tally when a poll window held several events.
    pub(crate) lost: LostCoins,

    /// Classification of the last polling fault.
    pub(crate) poll_fault: PollingFault,

    /// Last self-check fault code and message.
    pub(crate) fault_code: u8,
    pub(crate) fault_message: &'static str,

    /// Opto sensor flags from the last read.
    pub(crate) opto: OptoStates,
}

impl CoinDevice {
    pub(crate) fn new(opener: Box<dyn PortOpener>, max_ports: usize) -> Self {
        Self {
            opener,
            link: None,
            max_ports,
            settle: DEFAULT_SETTLE,
            port: None,
            coin_event: 0,
            event_prev: 0,
            last_coin: 0,
            lost: LostCoins::default(),
            poll_fault: placeholder_fault(),
            fault_code: 0,
            fault_message: "Default error",
            opto: OptoStates::default(),
        }
    }

    pub(crate) fn set_settle(&mut self, settle: Duration) {
        self.settle = settle;
    }

    // ---- state entry actions -------------------------------------------

    pub(crate) fn enter(&mut self, state: CoinState) -> i32 {
        match state {
            CoinState::Idle => self.st_idle(),
            CoinState::Connect => self.st_connect(),
            CoinState::Check => self.st_check(),
            CoinState::WaitPoll => self.st_wait_poll(),
            CoinState::Polling => self.st_polling(),
            CoinState::Reset => self.st_reset(),
            CoinState::Error => self.st_error(),
        }
    }

    fn st_idle(&mut self) -> i32 {
        info!(target: "cashdeck::coin", "session start");
        IO_OK
    }

    fn st_connect(&mut self) -> i32 {
        info!(target: "cashdeck::coin", "scanning ports");
        let settle = self.settle;

        let found = scan_ports(self.opener.as_mut(), self.max_ports, |link| {
            matches!(
                exchange(link, &coin::SIMPLE_POLL, settle),
                Ok(CoinDecode::SimpleAck)
            )
        });

        match found {
            Some((index, link)) => {
                info!(target: "cashdeck::coin", port = index, "acceptor found");
                self.port = Some(index);
                self.link = Some(link);
                IO_OK
            }
            None => {
                error!(target: "cashdeck::coin", "acceptor not found on any port");
                self.port = None;
                self.link = None;
                IO_REPEAT
            }
        }
    }

    fn st_check(&mut self) -> i32 {
        info!(target: "cashdeck::coin", "checking communication");
        if self.simple_poll() != IO_OK {
            error!(target: "cashdeck::coin", "bad communication");
            return 1;
        }

        info!(target: "cashdeck::coin", "checking fault code");
        let mut response = self.self_check();
        if response >= 1 {
            error!(target: "cashdeck::coin", "fatal fault code found");
            return 1;
        } else if response == IO_FATAL {
            error!(target: "cashdeck::coin", "bad communication");
            return 1;
        } else if response == IO_POLL_FAULT {
            warn!(target: "cashdeck::coin", "repeating self check");
            response = self.self_check();
            if response != IO_OK {
                error!(target: "cashdeck::coin", "self check could not run");
                return 1;
            }
        }

        info!(target: "cashdeck::coin", "checking opto states");
        let mut response = self.check_opto_states();
        if response == 1 {
            error!(target: "cashdeck::coin", "measure or out phototransistor blocked");
            return 1;
        } else if response == 2 {
            warn!(target: "cashdeck::coin", "no-used-bit change or COS alert");
            return 2;
        } else if response == IO_FATAL {
            error!(target: "cashdeck::coin", "bad communication");
            return 1;
        } else if response == IO_POLL_FAULT {
            warn!(target: "cashdeck::coin", "repeating opto read");
            response = self.check_opto_states();
            if response == 2 {
                warn!(target: "cashdeck::coin", "no-used-bit change or COS alert");
                return 2;
            } else if response != IO_OK {
                error!(target: "cashdeck::coin", "opto read could not run");
                return 1;
            }
        }

        debug!(target: "cashdeck::coin", "all four opto states OK");
        0
    }

    fn st_wait_poll(&mut self) -> i32 {
        info!(target: "cashdeck::coin", "rebooting acceptor");
        if self.reset_device() != IO_OK {
            error!(target: "cashdeck::coin", "acceptor could not reset");
            return 1;
        }

        info!(target: "cashdeck::coin", "enabling channels");
        if self.enable_channels() != IO_OK {
            error!(target: "cashdeck::coin", "acceptor could not enable channels");
            return 1;
        }

        info!(target: "cashdeck::coin", "verifying event counter reset");
        if self.check_event_reset() != IO_OK {
            error!(target: "cashdeck::coin", "event counter did not reset");
            return 1;
        }

        self.event_prev = 0;
        0
    }

    fn st_polling(&mut self) -> i32 {
        trace!(target: "cashdeck::coin", "reading buffered credits");
        self.send_command(&coin::READ_BUFFERED_CREDIT)
    }

    fn st_reset(&mut self) -> i32 {
        info!(target: "cashdeck::coin", "rebooting acceptor");
        if self.reset_device() != IO_OK {
            error!(target: "cashdeck::coin", "acceptor could not reset");
            return 1;
        }

        info!(target: "cashdeck::coin", "verifying event counter reset");
        if self.check_event_reset() != IO_OK {
            error!(target: "cashdeck::coin", "event counter did not reset");
            return 1;
        }
        0
    }

    fn st_error(&mut self) -> i32 {
        info!(target: "cashdeck::coin", "error state, checking communication");
        if self.simple_poll() != IO_OK {
            error!(target: "cashdeck::coin", "bad communication");
            return 1;
        }
        0
    }

    // ---- device commands -----------------------------------------------

    /// No-op command expecting a plain ACK; one retry on benign failure.
    pub(crate) fn simple_poll(&mut self) -> i32 {
        let response = self.send_command(&coin::SIMPLE_POLL);
        if response == IO_FATAL {
            error!(target: "cashdeck::coin", "acceptor does not return ACK");
            return IO_FATAL;
        }
        if response >= IO_REPEAT {
            warn!(target: "cashdeck::coin", "repeating simple poll");
            if self.send_command(&coin::SIMPLE_POLL) != IO_OK {
                error!(target: "cashdeck::coin", "acceptor does not return ACK");
                return IO_FATAL;
            }
        }
        IO_OK
    }

    /// Self check; classifies the reported fault code.
    ///
    /// Returns 0 OK, 1 acceptor blocked, 2 hardware fault, 3 software
    /// fault, -1 fatal communication, -2 repeat-me.
    pub(crate) fn self_check(&mut self) -> i32 {
        let response = self.send_command(&coin::SELF_CHECK);
        if response == IO_OK {
            match self.fault_code {
                253 => {
                    error!(target: "cashdeck::coin", code = self.fault_code, "acceptor blocked");
                    return 1;
                }
                1 | 30 | 255 => {
                    error!(target: "cashdeck::coin", code = self.fault_code, "software fault");
                    return 3;
                }
                code if code != 0 && code != 20 && code != 2 => {
                    error!(target: "cashdeck::coin", code = self.fault_code, "hardware fault");
                    return 2;
                }
                _ => {}
            }
            trace!(target: "cashdeck::coin", "fault code OK");
            IO_OK
        } else if response != IO_FATAL {
            error!(target: "cashdeck::coin", "self check did not run, repeat");
            IO_POLL_FAULT
        } else {
            error!(target: "cashdeck::coin", "error sending self check");
            IO_FATAL
        }
    }

    /// Read the opto-state mask.
    ///
    /// Returns 0 all clear, 1 a coin sensor is blocked, 2 tray/COS alert,
    /// -1 fatal communication, -2 repeat-me.
    pub(crate) fn check_opto_states(&mut self) -> i32 {
        let response = self.send_command(&coin::READ_OPTO_STATES);
        if response == IO_OK {
            let mut result = IO_OK;
            if self.opto.no_used_bit || self.opto.cos_alert {
                warn!(target: "cashdeck::coin", "no-used-bit change or COS alert active");
                result = 2;
            }
            if self.opto.measure_photo_blocked || self.opto.out_photo_blocked {
                error!(target: "cashdeck::coin", "measure or out phototransistor blocked");
                result = 1;
            }
            result
        } else if response != IO_FATAL {
            error!(target: "cashdeck::coin", "opto read did not run, repeat");
            IO_POLL_FAULT
        } else {
            error!(target: "cashdeck::coin", "error sending opto read");
            IO_FATAL
        }
    }

    pub(crate) fn enable_channels(&mut self) -> i32 {
        debug!(target: "cashdeck::coin", "enabling all coin channels");
        if self.send_command(&coin::ENABLE_ALL_CHANNELS) != IO_OK {
            error!(target: "cashdeck::coin", "acceptor could not enable channels");
            return IO_FATAL;
        }
        IO_OK
    }

    /// Verify the event counter cleared after a reset.
    pub(crate) fn check_event_reset(&mut self) -> i32 {
        debug!(target: "cashdeck::coin", "reading event counter");
        let response = self.send_command(&coin::READ_BUFFERED_CREDIT);
        if response == IO_OK || response == IO_POLL_FAULT {
            if self.coin_event <= 1 {
                debug!(target: "cashdeck::coin", event = self.coin_event, "event counter OK");
            } else {
                error!(target: "cashdeck::coin", event = self.coin_event, "event counter not reset");
                return 1;
            }
        } else if response != IO_FATAL {
            error!(target: "cashdeck::coin", "event read did not run, repeat");
            return IO_POLL_FAULT;
        } else {
            error!(target: "cashdeck::coin", "error sending event read");
            return IO_FATAL;
        }
        IO_OK
    }

    pub(crate) fn reset_device(&mut self) -> i32 {
        debug!(target: "cashdeck::coin", "resetting acceptor");
        if self.send_command(&coin::RESET_DEVICE) != IO_OK {
            error!(target: "cashdeck::coin", "reset command failed");
            return IO_FATAL;
        }
        IO_OK
    }

    /// Write a custom inhibit mask; bit clear = channel inhibited.
    pub(crate) fn change_inhibit(&mut self, mask1: u8, mask2: u8) -> i32 {
        debug!(target: "cashdeck::coin", mask1, mask2, "changing inhibit mask");
        let frame = coin::build_modify_inhibit(mask1, mask2);
        if self.send_command(&frame) != IO_OK {
            error!(target: "cashdeck::coin", "inhibit command failed");
            return IO_FATAL;
        }
        IO_OK
    }

    // ---- exchange plumbing ---------------------------------------------

    /// Send one command and fold the decode into the four driver outcomes.
    fn send_command(&mut self, cmd: &[u8]) -> i32 {
        let settle = self.settle;
        let Some(link) = self.link.as_mut() else {
            warn!(target: "cashdeck::coin", "no link open");
            return IO_FATAL;
        };

        let decode = match exchange(link.as_mut(), cmd, settle) {
            Ok(decode) => decode,
            Err(ExchangeError::Write) | Err(ExchangeError::Read) => {
                link.discard_io();
                return IO_FATAL;
            }
            Err(ExchangeError::Timeout) => {
                link.discard_io();
                return IO_REPEAT;
            }
        };

        let outcome = self.apply_decode(decode);
        if outcome != IO_OK && outcome != IO_POLL_FAULT {
            if let Some(link) = self.link.as_mut() {
                link.discard_io();
            }
        }
        outcome
    }

    /// Update the mirrors from one decode and classify it.
    fn apply_decode(&mut self, decode: CoinDecode) -> i32 {
        match decode {
            CoinDecode::SimpleAck => IO_OK,
            CoinDecode::SelfCheck { fault } => {
                self.fault_code = fault;
                self.fault_message = fault_message(fault);
                debug!(
                    target: "cashdeck::coin",
                    code = fault, message = self.fault_message, "self-check fault code"
                );
                IO_OK
            }
            CoinDecode::OptoStates(states) => {
                self.opto = states;
                trace!(target: "cashdeck::coin", ?states, "opto states");
                IO_OK
            }
            CoinDecode::Poll(block) => {
                let read = coin::interpret_poll(&block, self.event_prev);
                self.coin_event = block.counter;
                self.event_prev = block.counter;
                self.apply_poll(read)
            }
            CoinDecode::Nak => {
                warn!(target: "cashdeck::coin", "negative ACK received");
                IO_REPEAT
            }
            CoinDecode::Busy => {
                warn!(target: "cashdeck::coin", "acceptor busy");
                IO_REPEAT
            }
            CoinDecode::UnknownAck(byte) => {
                error!(target: "cashdeck::coin", byte, "unknown byte in ACK position");
                IO_FATAL
            }
            CoinDecode::Incomplete | CoinDecode::ShortRead => {
                warn!(target: "cashdeck::coin", "reply incomplete");
                IO_REPEAT
            }
            CoinDecode::Unrecognized | CoinDecode::BadHeader => {
                warn!(target: "cashdeck::coin", "command not recognized");
                IO_REPEAT
            }
            CoinDecode::CorruptPoll => {
                warn!(target: "cashdeck::coin", "polling data corrupt, acceptor may need reset");
                IO_REPEAT
            }
        }
    }

    fn apply_poll(&mut self, read: PollRead) -> i32 {
        self.lost = LostCoins::default();
        self.last_coin = 0;
        self.poll_fault = placeholder_fault();

        match read {
            PollRead::NoChange { .. } => {
                trace!(target: "cashdeck::coin", "event counter unchanged");
                IO_OK
            }
            PollRead::Credit {
                channel,
                coin,
                lost,
                ..
            } => {
                self.last_coin = coin;
                self.lost = lost;
                debug!(target: "cashdeck::coin", coin, channel, "coin detected");
                IO_OK
            }
            PollRead::Fault {
                fault,
                critical,
                lost,
                ..
            } => {
                self.poll_fault = fault;
                self.lost = lost;
                error!(
                    target: "cashdeck::coin",
                    code = fault.code, message = fault.message, critical,
                    "polling fault"
                );
                IO_POLL_FAULT
            }
        }
    }
}

enum ExchangeError {
    Write,
    Read,
    Timeout,
}

/// One write/settle/read round on a link, decoded against the command.
fn exchange(
    link: &mut dyn SerialLink,
    cmd: &[u8],
    settle: Duration,
) -> Result<CoinDecode, ExchangeError> {
    if link.write_frame(cmd).is_err() {
        return Err(ExchangeError::Write);
    }

    std::thread::sleep(settle);

    let mut buf = [0u8; READ_BUFFER];
    match link.read_available(&mut buf) {
        Ok(0) => Err(ExchangeError::Timeout),
        Ok(n) => Ok(cashdeck_protocol::coin::decode(cmd, &buf[..n])),
        Err(_) => Err(ExchangeError::Read),
    }
}
