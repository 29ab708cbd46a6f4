//! End-to-end driver tests against a simulated dispenser on a mock bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cashdeck_core::DispenserConfig;
use cashdeck_dispenser::{CardDispenser, DispenserState};
use cashdeck_transport::mock::{MockBus, MockLink};

const ACK: u8 = 0x06;
const STX: u8 = 0xF2;

/// Wire-level simulation of the dispenser mechanism.
struct SimDispenser {
    /// Gate field: '0' empty, '1' card at exit, '2' card stuck.
    gate: u8,
    /// Hopper field: '0' empty, '1' some cards, '2' full.
    hopper: u8,
    /// Recycle-box field: '0' has room, '1' full.
    recycle: u8,
    /// When set, motor commands answer with this fault code.
    fault: Option<&'static [u8; 2]>,
}

impl SimDispenser {
    fn stocked() -> Self {
        Self {
            gate: b'0',
            hopper: b'1',
            recycle: b'0',
            fault: None,
        }
    }

    fn success(&self, cmd: u8, param: u8) -> Vec<u8> {
        vec![
            ACK, STX, 0x00, 0x00, 0x05, 0x50, cmd, param, self.gate, self.hopper, self.recycle,
            0x03,
        ]
    }

    fn failure(&self, cmd: u8, param: u8, code: &[u8; 2]) -> Vec<u8> {
        vec![
            ACK, STX, 0x00, 0x00, 0x05, b'N', cmd, param, code[0], code[1], 0x00, 0x03,
        ]
    }

    fn respond(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if frame.len() == 1 {
            // Host ACK write-back; nothing comes back.
            return None;
        }

        let (cmd, param) = (frame[5], frame[6]);
        match (cmd, param) {
            // Init and status query: report the current flags.
            (0x30, 0x33) | (0x31, 0x30) => Some(self.success(cmd, param)),
            // Dispense: move a card to the gate unless faulted or empty.
            (0x32, 0x30) => {
                if let Some(code) = self.fault {
                    return Some(self.failure(cmd, param, code));
                }
                if self.hopper == b'0' {
                    return Some(self.failure(cmd, param, b"A0"));
                }
                self.gate = b'1';
                Some(self.success(cmd, param))
            }
            // Recycle: drop the gate card into the box.
            (0x32, 0x33) => {
                if let Some(code) = self.fault {
                    return Some(self.failure(cmd, param, code));
                }
                self.gate = b'0';
                Some(self.success(cmd, param))
            }
            _ => None,
        }
    }
}

fn test_config() -> DispenserConfig {
    DispenserConfig {
        short_wait: Duration::ZERO,
        long_wait: Duration::ZERO,
        ..Default::default()
    }
}

fn dispenser_on(sim: Arc<Mutex<SimDispenser>>) -> CardDispenser {
    let bus = MockBus::single(0, move || {
        let sim = Arc::clone(&sim);
        MockLink::new(move |frame| sim.lock().unwrap().respond(frame))
    });

    let mut dispenser = CardDispenser::with_opener(test_config(), Box::new(bus));
    dispenser.set_settle_time(Duration::ZERO);
    dispenser
}

#[test]
fn empty_bus_reports_port_not_found_and_error_state() {
    let mut dispenser = CardDispenser::with_opener(test_config(), Box::new(MockBus::empty()));
    dispenser.set_settle_time(Duration::ZERO);

    let response = dispenser.connect();

    assert_eq!(response.status_code, 503);
    assert_eq!(dispenser.state(), DispenserState::Error);
}

#[test]
fn connect_reports_card_stock() {
    let sim = Arc::new(Mutex::new(SimDispenser::stocked()));
    let mut dispenser = dispenser_on(sim);

    let response = dispenser.connect();

    assert_eq!(response.status_code, 202);
    assert_eq!(dispenser.state(), DispenserState::Wait);
    assert_eq!(dispenser.port(), Some(0));

    let flags = dispenser.dispenser_flags();
    assert!(flags.cards_in_dispenser);
    assert!(!flags.dispenser_full);
}

#[test]
fn connect_with_full_hopper_reports_201() {
    let sim = Arc::new(Mutex::new(SimDispenser {
        hopper: b'2',
        ..SimDispenser::stocked()
    }));
    let mut dispenser = dispenser_on(sim);

    assert_eq!(dispenser.connect().status_code, 201);
}

#[test]
fn check_device_full_recycle_box_with_cards() {
    // Recycling box full while cards remain available: the combined
    // status, with both flags raised.
    let sim = Arc::new(Mutex::new(SimDispenser {
        recycle: b'1',
        ..SimDispenser::stocked()
    }));
    let mut dispenser = dispenser_on(sim);

    dispenser.connect();
    let response = dispenser.check_device();

    assert_eq!(response.status_code, 303);
    let flags = dispenser.dispenser_flags();
    assert!(flags.recycling_box_full);
    assert!(flags.cards_in_dispenser);
}

#[test]
fn check_device_does_not_change_state() {
    let sim = Arc::new(Mutex::new(SimDispenser::stocked()));
    let mut dispenser = dispenser_on(sim);

    dispenser.connect();
    assert_eq!(dispenser.state(), DispenserState::Wait);
    dispenser.check_device();
    assert_eq!(dispenser.state(), DispenserState::Wait);
}

#[test]
fn dispense_card_happy_path() {
    let sim = Arc::new(Mutex::new(SimDispenser::stocked()));
    let mut dispenser = dispenser_on(sim);

    dispenser.connect();
    let response = dispenser.dispense_card();

    assert_eq!(response.status_code, 203);
    assert_eq!(dispenser.state(), DispenserState::MovingMotor);
    assert!(dispenser.dispenser_flags().card_in_gate);
}

#[test]
fn dispense_then_recycle_then_end_process() {
    let sim = Arc::new(Mutex::new(SimDispenser::stocked()));
    let mut dispenser = dispenser_on(sim);

    dispenser.connect();
    assert_eq!(dispenser.dispense_card().status_code, 203);

    let recycled = dispenser.recycle_card();
    assert_eq!(recycled.status_code, 204);
    assert_eq!(dispenser.state(), DispenserState::HandingCard);
    assert!(!dispenser.dispenser_flags().card_in_gate);

    let ended = dispenser.end_process();
    assert_eq!(ended.status_code, 202);
    assert_eq!(dispenser.state(), DispenserState::Wait);
}

#[test]
fn dispense_with_empty_hopper_reports_510() {
    let sim = Arc::new(Mutex::new(SimDispenser {
        hopper: b'0',
        ..SimDispenser::stocked()
    }));
    let mut dispenser = dispenser_on(sim);

    // Connect reads "no cards, recycle box not full".
    assert_eq!(dispenser.connect().status_code, 506);

    let response = dispenser.dispense_card();
    assert_eq!(response.status_code, 510);
}

#[test]
fn device_fault_code_surfaces_as_500_and_error_state() {
    let sim = Arc::new(Mutex::new(SimDispenser {
        fault: Some(b"51"),
        ..SimDispenser::stocked()
    }));
    let mut dispenser = dispenser_on(sim);

    dispenser.connect();
    let response = dispenser.dispense_card();

    assert_eq!(response.status_code, 500);
    assert!(response.message.contains("51"));
    assert!(response.message.contains("Motor error"));
    assert_eq!(dispenser.state(), DispenserState::Error);
}

#[test]
fn recycle_with_full_box_reports_514() {
    let sim = Arc::new(Mutex::new(SimDispenser {
        recycle: b'1',
        ..SimDispenser::stocked()
    }));
    let mut dispenser = dispenser_on(sim);

    dispenser.connect();
    dispenser.dispense_card();

    let response = dispenser.recycle_card();
    assert_eq!(response.status_code, 514);
}

#[test]
fn recycle_without_gate_card_reports_513() {
    let sim = Arc::new(Mutex::new(SimDispenser::stocked()));
    let mut dispenser = dispenser_on(sim);

    dispenser.connect();
    // Straight to recycle: not in MovingMotor, so connect is replayed and
    // the gate is empty.
    let response = dispenser.recycle_card();
    assert_eq!(response.status_code, 513);
}

#[test]
fn test_status_reflects_healthy_dispenser() {
    let sim = Arc::new(Mutex::new(SimDispenser::stocked()));
    let mut dispenser = dispenser_on(sim);

    dispenser.connect();
    let status = dispenser.test_status();

    assert_eq!(status.device, 10);
    assert_eq!(status.error_type, 1);
    assert_eq!(status.error_code, 202);
    assert_eq!(status.priority, 0);
}
