//! End-to-end driver tests against a simulated acceptor on a mock bus.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cashdeck_bill::{BillAcceptor, BillState, spawn_bill_watcher};
use cashdeck_core::BillConfig;
use cashdeck_protocol::crc16;
use cashdeck_transport::mock::{MockBus, MockLink};

/// Wire-level simulation of the acceptor.
#[derive(Default)]
struct SimBill {
    /// Scripted poll reply payloads, oldest first; an empty queue answers
    /// the plain "OK, nothing happened" payload.
    poll_replies: VecDeque<Vec<u8>>,
}

impl SimBill {
    fn frame(seq: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x7F, seq, payload.len() as u8];
        frame.extend_from_slice(payload);
        let crc = crc16(&frame[1..]);
        frame.extend_from_slice(&crc);
        frame
    }

    fn respond(&mut self, command: &[u8]) -> Option<Vec<u8>> {
        let seq = command[1];
        let payload = match command[3] {
            // Poll: scripted events, else nothing new.
            0x07 => self.poll_replies.pop_front().unwrap_or_else(|| vec![240]),
            // Last-reject query: note accepted.
            0x17 => vec![240, 0],
            // Sync, enable/disable, display, set-channels, reject, reset.
            0x01 | 0x02 | 0x03 | 0x04 | 0x08 | 0x09 | 0x0A | 0x11 => vec![240],
            _ => return None,
        };
        Some(Self::frame(seq, &payload))
    }
}

fn acceptor_on(sim: Arc<Mutex<SimBill>>) -> BillAcceptor {
    let bus = MockBus::single(0, move || {
        let sim = Arc::clone(&sim);
        MockLink::new(move |frame| sim.lock().unwrap().respond(frame))
    });

    let mut acceptor = BillAcceptor::with_opener(BillConfig::default(), Box::new(bus));
    acceptor.set_settle_time(Duration::ZERO);
    acceptor
}

fn started_acceptor(sim: Arc<Mutex<SimBill>>) -> BillAcceptor {
    let mut acceptor = acceptor_on(sim);
    assert_eq!(acceptor.connect().status_code, 200);
    assert_eq!(acceptor.start_reader().status_code, 202);
    acceptor
}

#[test]
fn empty_bus_reports_port_not_found_and_error_state() {
    let mut acceptor = BillAcceptor::with_opener(BillConfig::default(), Box::new(MockBus::empty()));
    acceptor.set_settle_time(Duration::ZERO);

    let response = acceptor.connect();

    assert_eq!(response.status_code, 502);
    assert_eq!(acceptor.state(), BillState::Error);
}

#[test]
fn connect_syncs_and_disables() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let mut acceptor = acceptor_on(sim);

    let response = acceptor.connect();

    assert_eq!(response.status_code, 200);
    assert_eq!(acceptor.state(), BillState::Disable);
    assert_eq!(acceptor.port(), Some(0));
}

#[test]
fn start_reader_reaches_polling_and_is_idempotent() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let mut acceptor = started_acceptor(sim);

    assert_eq!(acceptor.state(), BillState::Polling);
    assert_eq!(acceptor.start_reader().status_code, 203);
    assert_eq!(acceptor.state(), BillState::Polling);
}

#[test]
fn get_bill_requires_start_reader() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let mut acceptor = acceptor_on(sim);

    acceptor.connect();
    let tick = acceptor.get_bill();
    assert_eq!(tick.status_code, 503);
}

#[test]
fn note_lifecycle_read_credit_stack() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let mut acceptor = started_acceptor(Arc::clone(&sim));

    {
        let mut sim = sim.lock().unwrap();
        sim.poll_replies.push_back(vec![240, 239, 0]); // READ, value unknown
        sim.poll_replies.push_back(vec![240, 239, 3]); // READ, channel 3
        sim.poll_replies.push_back(vec![240, 238, 3, 235]); // CREDIT + STACKED
    }

    let tick = acceptor.get_bill();
    assert_eq!(tick.status_code, 303);
    assert_eq!(tick.bill, 0);

    let tick = acceptor.get_bill();
    assert_eq!(tick.status_code, 304);
    assert_eq!(tick.bill, 5000);

    let tick = acceptor.get_bill();
    assert_eq!(tick.status_code, 312);
    assert_eq!(tick.bill, 5000);

    // Quiet line afterwards: plain no-news.
    let tick = acceptor.get_bill();
    assert_eq!(tick.status_code, 302);
}

#[test]
fn identical_consecutive_status_collapses_to_no_news() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let mut acceptor = started_acceptor(Arc::clone(&sim));

    {
        let mut sim = sim.lock().unwrap();
        sim.poll_replies.push_back(vec![240, 239, 3]);
        sim.poll_replies.push_back(vec![240, 239, 3]);
    }

    let tick = acceptor.get_bill();
    assert_eq!(tick.status_code, 304);
    assert_eq!(tick.bill, 5000);

    // Same internal status again: the tick collapses to the canned
    // no-news reply, bill value included.
    let tick = acceptor.get_bill();
    assert_eq!(tick.status_code, 302);
    assert_eq!(tick.bill, 0);
}

#[test]
fn inhibited_channel_rejects_the_note() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let mut acceptor = started_acceptor(Arc::clone(&sim));

    // Clear bit 2: channel 3 inhibited.
    assert_eq!(acceptor.modify_channels(0xFB).status_code, 204);

    sim.lock().unwrap().poll_replies.push_back(vec![240, 239, 3]);

    let tick = acceptor.get_bill();
    assert_eq!(tick.status_code, 311);
    assert_eq!(tick.bill, 5000);
}

#[test]
fn rejected_note_lifecycle() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let mut acceptor = started_acceptor(Arc::clone(&sim));

    {
        let mut sim = sim.lock().unwrap();
        sim.poll_replies.push_back(vec![240, 237]); // REJECTING
        sim.poll_replies.push_back(vec![240, 236]); // REJECTED
    }

    assert_eq!(acceptor.get_bill().status_code, 305);
    assert_eq!(acceptor.get_bill().status_code, 306);
}

#[test]
fn stop_reader_walks_check_and_disable() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let mut acceptor = started_acceptor(sim);

    let response = acceptor.stop_reader();
    assert_eq!(response.status_code, 205);
    assert_eq!(acceptor.state(), BillState::Disable);
}

#[test]
fn stop_reader_requires_polling_state() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let mut acceptor = acceptor_on(sim);

    acceptor.connect();
    let response = acceptor.stop_reader();
    assert_eq!(response.status_code, 513);
    assert_eq!(acceptor.state(), BillState::Error);
}

#[test]
fn check_device_does_not_disturb_polling() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let mut acceptor = started_acceptor(sim);

    let response = acceptor.check_device();
    assert_eq!(response.status_code, 201);
    assert_eq!(acceptor.state(), BillState::Polling);
}

#[tokio::test]
async fn watcher_delivers_ticks_and_filters_no_news() {
    let sim = Arc::new(Mutex::new(SimBill::default()));
    let acceptor = started_acceptor(Arc::clone(&sim));

    sim.lock().unwrap().poll_replies.push_back(vec![240, 239, 3]);

    let (watcher, mut ticks) = spawn_bill_watcher(acceptor, Duration::from_millis(1));

    let tick = ticks.recv().await.expect("one tick with news");
    assert_eq!(tick.status_code, 304);
    assert_eq!(tick.bill, 5000);

    let acceptor = watcher.stop().expect("watcher joins cleanly");
    assert_eq!(acceptor.state(), BillState::Polling);
}
