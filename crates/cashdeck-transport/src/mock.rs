//! Scripted transport doubles for driver tests.
//!
//! [`MockLink`] stands in for one serial line: every frame the driver
//! writes is recorded and answered either from a fixed script or by a
//! responder closure that inspects the outgoing bytes. [`MockBus`] maps
//! scan indices to links so the port-scan path can be exercised, including
//! the empty-bus case.

use std::collections::VecDeque;

use crate::error::{Result, TransportError};
use crate::link::SerialLink;
use crate::scan::PortOpener;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// In-memory [`SerialLink`] answering from a script or responder closure.
pub struct MockLink {
    responder: Responder,
    pending: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
}

impl MockLink {
    /// Link whose replies are computed from each written frame.
    ///
    /// Returning `None` leaves the line silent for that frame (the next
    /// read sees a timeout).
    pub fn new(responder: impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            pending: VecDeque::new(),
            writes: Vec::new(),
            fail_writes: false,
        }
    }

    /// Link that plays back `replies` in order, one per written frame,
    /// regardless of frame contents. Once exhausted the line goes silent.
    pub fn scripted(replies: Vec<Vec<u8>>) -> Self {
        let mut queue: VecDeque<Vec<u8>> = replies.into();
        Self::new(move |_| queue.pop_front())
    }

    /// Link whose writes fail outright (dead line).
    pub fn broken() -> Self {
        let mut link = Self::scripted(Vec::new());
        link.fail_writes = true;
        link
    }

    /// Every frame written so far, oldest first.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }
}

impl SerialLink for MockLink {
    fn write_frame(&mut self, bytes: &[u8]) -> Result<usize> {
        if self.fail_writes {
            return Err(TransportError::WriteFailed {
                written: 0,
                expected: bytes.len(),
            });
        }
        self.writes.push(bytes.to_vec());
        if let Some(reply) = (self.responder)(bytes) {
            self.pending.extend(reply);
        }
        Ok(bytes.len())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        let count = buf.len().min(self.pending.len());
        for slot in buf.iter_mut().take(count) {
            *slot = self.pending.pop_front().unwrap_or_default();
        }
        Ok(count)
    }

    fn discard_io(&mut self) {
        self.pending.clear();
    }
}

type BusFactory = Box<dyn FnMut(usize) -> Option<MockLink> + Send>;

/// [`PortOpener`] over a set of mock links keyed by scan index.
pub struct MockBus {
    factory: BusFactory,
}

impl MockBus {
    /// Bus where `factory` decides which indices hold a port. Indices
    /// mapping to `None` behave like missing device paths.
    pub fn new(factory: impl FnMut(usize) -> Option<MockLink> + Send + 'static) -> Self {
        Self {
            factory: Box::new(factory),
        }
    }

    /// Bus with no ports at all; every open fails.
    pub fn empty() -> Self {
        Self::new(|_| None)
    }

    /// Bus with a single port at `index`, built by `make` on every open so
    /// reconnects see a fresh link.
    pub fn single(index: usize, make: impl Fn() -> MockLink + Send + 'static) -> Self {
        Self::new(move |i| (i == index).then(&make))
    }
}

impl PortOpener for MockBus {
    fn open(&mut self, index: usize) -> Result<Box<dyn SerialLink>> {
        match (self.factory)(index) {
            Some(link) => Ok(Box::new(link)),
            None => Err(TransportError::InvalidPath {
                path: format!("mock:{index}"),
            }),
        }
    }
}
