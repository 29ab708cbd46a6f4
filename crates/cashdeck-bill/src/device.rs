//! Device layer of the bill acceptor: framed command exchange over the
//! SSP-style channel, reply mirrors and the per-state entry actions.

use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use cashdeck_protocol::bill::{self, BillDecode, CODE_OK, CodeEntry, SspChannel};
use cashdeck_transport::{PortOpener, SerialLink, scan_ports};

use crate::fsm::BillState;

/// Outcome codes shared by entry actions and device commands.
pub(crate) const IO_OK: i32 = 0;
pub(crate) const IO_REPEAT: i32 = 1;
pub(crate) const IO_FATAL: i32 = -1;
/// The device replayed its previous answer (sequence unchanged).
pub(crate) const IO_DUPLICATE: i32 = -2;

const READ_BUFFER: usize = 30;

/// Default settle time between writing a command and reading the reply.
pub(crate) const DEFAULT_SETTLE: Duration = Duration::from_millis(200);

fn default_entry() -> CodeEntry {
    CodeEntry {
        code: 0,
        message: "Default error",
        priority: 0,
    }
}

/// One bill acceptor on one serial line.
///
/// Owns the link, the SSP sequencing state, and the mirrors of the last
/// decoded reply (generic response code, event, reject reason, channel and
/// denomination) read by the controller after driving the state machine.
pub struct BillDevice {
    opener: Box<dyn PortOpener>,
    link: Option<Box<dyn SerialLink>>,
    max_ports: usize,
    settle: Duration,
    ssp: SspChannel,

    pub(crate) port: Option<usize>,

    /// Payload length of the last fresh reply.
    pub(crate) length_data: u8,
    /// Generic response code of the last fresh reply.
    pub(crate) response_code: CodeEntry,
    /// Event fields of the last fresh reply.
    pub(crate) event: CodeEntry,
    pub(crate) additional: CodeEntry,
    /// Reject reason from the last last-reject query.
    pub(crate) last_reject: CodeEntry,
    /// Channel and denomination of the last note event.
    pub(crate) channel: u8,
    pub(crate) bill: u32,
}

impl BillDevice {
    pub(crate) fn new(opener: Box<dyn PortOpener>, max_ports: usize) -> Self {
        Self {
            opener,
            link: None,
            max_ports,
            settle: DEFAULT_SETTLE,
            ssp: SspChannel::new(),
            port: None,
            length_data: 0,
            response_code: default_entry(),
            event: default_entry(),
            additional: default_entry(),
            last_reject: default_entry(),
            channel: 0,
            bill: 0,
        }
    }

    pub(crate) fn set_settle(&mut self, settle: Duration) {
        self.settle = settle;
    }

    // ---- state entry actions -------------------------------------------

    pub(crate) fn enter(&mut self, state: BillState) -> i32 {
        match state {
            BillState::Idle => self.st_idle(),
            BillState::Connect => self.st_connect(),
            BillState::Disable => self.st_disable(),
            BillState::Enable => self.st_enable(),
            BillState::Polling => self.st_polling(),
            BillState::Check => self.st_check(),
            BillState::Error => self.st_error(),
        }
    }

    fn st_idle(&mut self) -> i32 {
        info!(target: "cashdeck::bill", "session start");
        IO_OK
    }

    fn st_connect(&mut self) -> i32 {
        info!(target: "cashdeck::bill", "scanning ports");
        let settle = self.settle;
        let ssp = &mut self.ssp;

        let found = scan_ports(self.opener.as_mut(), self.max_ports, |link| {
            probe_sync(link, ssp, settle)
        });

        match found {
            Some((index, link)) => {
                info!(target: "cashdeck::bill", port = index, "acceptor found");
                self.port = Some(index);
                self.link = Some(link);
                IO_OK
            }
            None => {
                error!(target: "cashdeck::bill", "acceptor not found on any port");
                self.port = None;
                self.link = None;
                IO_REPEAT
            }
        }
    }

    fn st_disable(&mut self) -> i32 {
        debug!(target: "cashdeck::bill", "disabling channels");
        if self.disable() != IO_OK {
            error!(target: "cashdeck::bill", "disable failed");
            return 1;
        }

        debug!(target: "cashdeck::bill", "turning display off");
        if self.display_off() != IO_OK {
            error!(target: "cashdeck::bill", "display off failed");
            return 1;
        }
        0
    }

    fn st_enable(&mut self) -> i32 {
        self.bill = 0;
        self.channel = 0;

        debug!(target: "cashdeck::bill", "syncing");
        if self.sync() != IO_OK {
            error!(target: "cashdeck::bill", "sync failed");
            return 1;
        }

        debug!(target: "cashdeck::bill", "turning display on");
        if self.display_on() != IO_OK {
            error!(target: "cashdeck::bill", "display on failed");
            return 1;
        }

        debug!(target: "cashdeck::bill", "setting channels");
        if self.set_channels() != IO_OK {
            error!(target: "cashdeck::bill", "set channels failed");
            return 1;
        }

        debug!(target: "cashdeck::bill", "enabling");
        if self.enable() != IO_OK {
            error!(target: "cashdeck::bill", "enable failed");
            return 1;
        }

        debug!(target: "cashdeck::bill", "reading last reject reason");
        if self.last_reject() != IO_OK {
            error!(target: "cashdeck::bill", "last-reject query failed");
            return 1;
        }
        0
    }

    fn st_polling(&mut self) -> i32 {
        trace!(target: "cashdeck::bill", "polling");
        let response = self.poll();
        if response == 1 {
            error!(target: "cashdeck::bill", "poll failed");
            return 1;
        }
        if response == 2 {
            debug!(target: "cashdeck::bill", "reply already seen");
            return 2;
        }
        0
    }

    fn st_check(&mut self) -> i32 {
        debug!(target: "cashdeck::bill", "checking last reject reason");
        if self.last_reject() != IO_OK {
            error!(target: "cashdeck::bill", "last-reject query failed");
            return 1;
        }

        debug!(target: "cashdeck::bill", "checking poll");
        let response = self.poll();
        if response != 0 && response != 2 {
            error!(target: "cashdeck::bill", "poll failed");
            return 1;
        }
        0
    }

    fn st_error(&mut self) -> i32 {
        info!(target: "cashdeck::bill", "error state, re-syncing");
        if self.sync() != IO_OK {
            error!(target: "cashdeck::bill", "sync failed");
            return 1;
        }
        0
    }

    // ---- device commands -----------------------------------------------

    fn simple(&mut self, payload: &'static [u8], what: &'static str) -> i32 {
        debug!(target: "cashdeck::bill", command = what, "sending");
        let response = self.send_command(payload);
        if response != IO_OK && response != IO_DUPLICATE {
            error!(target: "cashdeck::bill", command = what, "command failed");
            return IO_REPEAT;
        }
        IO_OK
    }

    pub(crate) fn display_on(&mut self) -> i32 {
        self.simple(bill::CMD_DISPLAY_ON, "display on")
    }

    pub(crate) fn display_off(&mut self) -> i32 {
        self.simple(bill::CMD_DISPLAY_OFF, "display off")
    }

    pub(crate) fn set_channels(&mut self) -> i32 {
        self.simple(bill::CMD_SET_CHANNELS, "set channels")
    }

    pub(crate) fn enable(&mut self) -> i32 {
        self.simple(bill::CMD_ENABLE, "enable")
    }

    pub(crate) fn disable(&mut self) -> i32 {
        self.simple(bill::CMD_DISABLE, "disable")
    }

    pub(crate) fn reject(&mut self) -> i32 {
        self.simple(bill::CMD_REJECT, "reject")
    }

    /// Re-synchronize the sequence bit with the device.
    pub(crate) fn sync(&mut self) -> i32 {
        self.ssp.reset_sequence();
        self.simple(bill::CMD_SYNC, "sync")
    }

    /// One poll round; 2 means the device replayed its previous answer.
    pub(crate) fn poll(&mut self) -> i32 {
        let response = self.send_command(bill::CMD_POLL);
        if response == IO_DUPLICATE {
            debug!(target: "cashdeck::bill", "reply already seen");
            return 2;
        }
        if response != IO_OK {
            error!(target: "cashdeck::bill", "poll failed");
            return 1;
        }
        IO_OK
    }

    /// Query the last reject reason; the reply reuses the event slot.
    pub(crate) fn last_reject(&mut self) -> i32 {
        self.ssp.set_last_reject_context(true);
        debug!(target: "cashdeck::bill", "querying last reject reason");
        let response = self.send_command(bill::CMD_LAST_REJECT);
        self.ssp.set_last_reject_context(false);

        if response != IO_OK && response != IO_DUPLICATE {
            error!(target: "cashdeck::bill", "last-reject query failed");
            return IO_REPEAT;
        }
        IO_OK
    }

    // ---- exchange plumbing ---------------------------------------------

    fn send_command(&mut self, payload: &[u8]) -> i32 {
        let frame = self.ssp.build(payload);
        let settle = self.settle;

        let Some(link) = self.link.as_mut() else {
            warn!(target: "cashdeck::bill", "no link open");
            return IO_FATAL;
        };

        if link.write_frame(&frame).is_err() {
            link.discard_io();
            return IO_FATAL;
        }

        std::thread::sleep(settle);

        let mut buf = [0u8; READ_BUFFER];
        let decode = match link.read_available(&mut buf) {
            Ok(0) => {
                warn!(target: "cashdeck::bill", "not responding, timeout");
                link.discard_io();
                return IO_REPEAT;
            }
            Ok(n) if n < 6 => {
                warn!(target: "cashdeck::bill", read = n, "reply too short");
                link.discard_io();
                return IO_REPEAT;
            }
            Ok(n) => self.ssp.decode(&buf[..n]),
            Err(_) => {
                error!(target: "cashdeck::bill", "read error");
                link.discard_io();
                return IO_FATAL;
            }
        };

        self.apply_decode(decode)
    }

    fn apply_decode(&mut self, decode: BillDecode) -> i32 {
        match decode {
            BillDecode::Frame(frame) => {
                self.length_data = frame.data_len;
                self.response_code = frame.code;
                if let Some(event) = frame.event {
                    self.event = event;
                    trace!(
                        target: "cashdeck::bill",
                        code = event.code, message = event.message, "event"
                    );
                }
                if let Some(reject) = frame.last_reject {
                    self.last_reject = reject;
                    trace!(
                        target: "cashdeck::bill",
                        code = reject.code, message = reject.message, "last reject"
                    );
                }
                if let Some(additional) = frame.additional {
                    self.additional = additional;
                    trace!(
                        target: "cashdeck::bill",
                        code = additional.code, message = additional.message,
                        "additional event"
                    );
                }
                if frame.data_len >= 3 {
                    self.channel = frame.channel;
                    self.bill = frame.bill;
                    trace!(
                        target: "cashdeck::bill",
                        channel = frame.channel, bill = frame.bill, "note channel"
                    );
                }

                if frame.code.code == CODE_OK {
                    IO_OK
                } else {
                    warn!(
                        target: "cashdeck::bill",
                        code = frame.code.code, message = frame.code.message,
                        "response code is not OK"
                    );
                    self.flush();
                    IO_FATAL
                }
            }
            BillDecode::Repeated => IO_DUPLICATE,
            BillDecode::Shifted => {
                error!(target: "cashdeck::bill", "reply shifted or corrupt");
                self.flush();
                IO_REPEAT
            }
            BillDecode::BadLength => {
                error!(target: "cashdeck::bill", "reply length byte invalid");
                self.flush();
                IO_FATAL
            }
            BillDecode::ShortRead => {
                warn!(target: "cashdeck::bill", "reply too short");
                self.flush();
                IO_REPEAT
            }
        }
    }

    fn flush(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.discard_io();
        }
    }
}

/// Scan probe: one sync exchange on a candidate link.
fn probe_sync(link: &mut dyn SerialLink, ssp: &mut SspChannel, settle: Duration) -> bool {
    ssp.reset_sequence();
    let frame = ssp.build(bill::CMD_SYNC);

    if link.write_frame(&frame).is_err() {
        return false;
    }

    std::thread::sleep(settle);

    let mut buf = [0u8; READ_BUFFER];
    let Ok(read) = link.read_available(&mut buf) else {
        return false;
    };
    if read < 6 {
        return false;
    }

    match ssp.decode(&buf[..read]) {
        BillDecode::Frame(frame) => frame.code.code == CODE_OK,
        BillDecode::Repeated => true,
        _ => false,
    }
}
