//! An in-memory NIC
//!
//! Every port has a bounded receive ring and a bounded transmit ring. Frames are
//! injected into a receive ring by the caller and collected from a transmit ring
//! after the engine ran; nothing ever touches a real device

use crossbeam::queue::ArrayQueue;

use super::{Mbuf, Mempool, Nic, PortError};

pub struct VirtualNic {
	mempool: Mempool,
	rx: Vec<ArrayQueue<Mbuf>>,
	tx: Vec<ArrayQueue<Mbuf>>,
}

impl VirtualNic {
	pub const RING_SZ: usize = 512;

	pub fn new(ports: u16, ring_sz: usize, mempool: Mempool) -> Result<Self, PortError> {
		if ports == 0 {
			return Err(PortError::NoPorts);
		}
		let ring_sz = ring_sz.max(1);
		Ok(Self {
			mempool,
			rx: (0..ports).map(|_| ArrayQueue::new(ring_sz)).collect(),
			tx: (0..ports).map(|_| ArrayQueue::new(ring_sz)).collect(),
		})
	}

	fn ring(rings: &[ArrayQueue<Mbuf>], port: u16) -> Result<&ArrayQueue<Mbuf>, PortError> {
		rings.get(port as usize).ok_or(PortError::BadPort(port))
	}

	/// Place a frame on the receive ring of `port`
	pub fn inject(&self, port: u16, frame: &[u8]) -> Result<(), PortError> {
		let ring = Self::ring(&self.rx, port)?;
		let pkt = Mbuf::from_bytes(frame, &self.mempool)?;
		ring.push(pkt).map_err(|_| PortError::RingFull(port))
	}

	/// Everything transmitted on `port` so far, oldest first
	pub fn take_tx(&self, port: u16) -> Vec<Vec<u8>> {
		match Self::ring(&self.tx, port) {
			Ok(ring) => std::iter::from_fn(|| ring.pop())
				.map(|pkt| pkt.data().to_vec())
				.collect(),
			Err(_) => Vec::new(),
		}
	}

	/// Frames waiting on the transmit ring of `port`
	pub fn tx_pending(&self, port: u16) -> usize {
		Self::ring(&self.tx, port).map(|r| r.len()).unwrap_or(0)
	}

	pub fn mempool(&self) -> &Mempool {
		&self.mempool
	}
}

impl Nic for VirtualNic {
	fn port_count(&self) -> u16 {
		self.rx.len() as u16
	}

	fn rx_burst(&mut self, port: u16, max: usize) -> Vec<Mbuf> {
		match Self::ring(&self.rx, port) {
			Ok(ring) => std::iter::from_fn(|| ring.pop()).take(max).collect(),
			Err(_) => Vec::new(),
		}
	}

	fn tx_burst(&mut self, port: u16, pkts: &mut Vec<Mbuf>) -> usize {
		let ring = match Self::ring(&self.tx, port) {
			Ok(ring) => ring,
			Err(_) => return 0,
		};
		let room = ring.capacity() - ring.len();
		let count = room.min(pkts.len());
		for pkt in pkts.drain(..count) {
			// room was checked above and only this thread pushes
			let _ = ring.push(pkt);
		}
		count
	}
}
