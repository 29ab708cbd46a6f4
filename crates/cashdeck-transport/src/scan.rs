//! Port scanning: find the candidate path the peripheral answers on.

use tracing::{debug, warn};

use crate::error::Result;
use crate::link::{SerialLink, SystemPortOpener};

/// Source of serial links for the scanner, one per candidate index.
///
/// Production code uses [`SystemPortOpener`]; tests plug in
/// [`mock::MockBus`](crate::mock::MockBus).
pub trait PortOpener: Send {
    /// Open the candidate at `index`, or fail so the scan moves on.
    fn open(&mut self, index: usize) -> Result<Box<dyn SerialLink>>;
}

impl PortOpener for SystemPortOpener {
    fn open(&mut self, index: usize) -> Result<Box<dyn SerialLink>> {
        let link = self.open_index(index)?;
        Ok(Box::new(link))
    }
}

/// Scan candidate ports `0..max_ports`, probing each until one answers.
///
/// `probe` is the device family's "send a no-op command and expect a valid
/// reply" closure; the first candidate it accepts is returned together with
/// its index, and the scanner keeps that link open for the caller. A
/// candidate that fails to open, fails to configure, or fails the probe is
/// dropped (closing it) and the scan moves on. Exhausting the range yields
/// `None` — surfaced downstream as a "port not found" terminal status.
pub fn scan_ports<P>(
    opener: &mut P,
    max_ports: usize,
    mut probe: impl FnMut(&mut dyn SerialLink) -> bool,
) -> Option<(usize, Box<dyn SerialLink>)>
where
    P: PortOpener + ?Sized,
{
    for index in 0..max_ports {
        debug!(target: "cashdeck::transport", index, "trying candidate port");

        let mut link = match opener.open(index) {
            Ok(link) => link,
            Err(e) => {
                debug!(target: "cashdeck::transport", index, error = %e, "candidate skipped");
                continue;
            }
        };

        if probe(link.as_mut()) {
            debug!(target: "cashdeck::transport", index, "peripheral found");
            return Some((index, link));
        }

        warn!(
            target: "cashdeck::transport",
            index, "candidate opened but probe failed, closing"
        );
    }

    warn!(target: "cashdeck::transport", max_ports, "peripheral not found on any port");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBus, MockLink};

    #[test]
    fn test_scan_empty_bus_exhausts_range() {
        let mut bus = MockBus::empty();
        let mut probed = 0;
        let result = scan_ports(&mut bus, 5, |_| {
            probed += 1;
            true
        });
        assert!(result.is_none());
        // Nothing opened, so the probe never ran.
        assert_eq!(probed, 0);
    }

    #[test]
    fn test_scan_finds_answering_port() {
        let mut bus = MockBus::new(|index| {
            (index == 2).then(|| MockLink::scripted(vec![vec![0x01, 0x00]]))
        });

        let result = scan_ports(&mut bus, 5, |link| {
            link.write_frame(&[0xAA]).unwrap();
            let mut buf = [0u8; 8];
            link.read_available(&mut buf).unwrap() > 0
        });

        let (index, _link) = result.expect("port 2 answers");
        assert_eq!(index, 2);
    }

    #[test]
    fn test_scan_rejects_mute_ports() {
        // Every port opens but none ever answers the probe.
        let mut bus = MockBus::new(|_| Some(MockLink::scripted(Vec::new())));

        let result = scan_ports(&mut bus, 3, |link| {
            let mut buf = [0u8; 8];
            link.read_available(&mut buf).unwrap() > 0
        });

        assert!(result.is_none());
    }
}
