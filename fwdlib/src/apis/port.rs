//! The Port structure names one NIC port and wraps burst I/O against it
//!
//! Device setup lives outside the engine; whatever owns the hardware implements `Nic`
//! and the engine only ever asks it for bursts

use super::Mbuf;

/// Burst I/O against a set of ports
///
/// Neither call may block: `rx_burst` returns whatever is ready and `tx_burst` takes
/// whatever fits.
pub trait Nic {
	/// Number of ports, numbered `0..port_count()`
	fn port_count(&self) -> u16;

	/// Up to `max` received frames on `port`
	fn rx_burst(&mut self, port: u16, max: usize) -> Vec<Mbuf>;

	/// Queue frames for transmission on `port`
	///
	/// Accepted frames are drained from the front of `pkts`; frames left behind were
	/// not accepted and stay owned by the caller.
	fn tx_burst(&mut self, port: u16, pkts: &mut Vec<Mbuf>) -> usize;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Port {
	pub id: u16,
}

impl Port {
	pub const RX_BURST_MAX: usize = 32;

	pub fn new(id: u16) -> Self {
		Self { id }
	}

	/// All ports of a NIC in polling order
	pub fn all<N: Nic + ?Sized>(nic: &N) -> Vec<Port> {
		(0..nic.port_count()).map(Port::new).collect()
	}

	pub fn receive<N: Nic + ?Sized>(&self, nic: &mut N, sz: usize) -> Vec<Mbuf> {
		nic.rx_burst(self.id, sz)
	}

	/// Send packets out of the port
	///
	/// Whatever the NIC does not take is freed here. Returns the number sent.
	pub fn send<N: Nic + ?Sized>(&self, nic: &mut N, mut pkts: Vec<Mbuf>) -> usize {
		let len = pkts.len();
		let mut count = 0;
		while !pkts.is_empty() {
			let sent = nic.tx_burst(self.id, &mut pkts);
			count += sent;
			if sent == 0 {
				break;
			}
		}
		if count < len {
			log::debug!(
				"port {}: {} of {} packets not accepted",
				self.id,
				len - count,
				len
			);
			Mbuf::free_bulk(pkts);
		}
		count
	}
}
