//! The receive, process, transmit loop
//!
//! Every port is polled once per round, in port order. A received burst is handed to
//! the strategy frame by frame and whatever the strategy forwards is queued per
//! egress port, then transmitted once the burst is done. Frames the NIC refuses are
//! freed, never retried.
//!
//! The loop stops when its keep-running flag goes false. The flag is only looked at
//! between rounds, so a burst is never abandoned halfway.

mod deaddrop;
mod echo;
mod ping;
mod router;
mod strategy;
mod switch;

pub use deaddrop::*;
pub use echo::*;
pub use ping::*;
pub use router::*;
pub use strategy::*;
pub use switch::*;

use crate::apis::{Mbuf, Nic, Port};
use std::{
	collections::BTreeMap,
	fmt, mem,
	sync::atomic::{AtomicBool, Ordering},
};

#[derive(Clone, Debug, Default)]
pub struct Stats {
	pub rx: u64,
	pub tx: u64,
	/// Extra copies made for floods
	pub flooded: u64,
	/// Frames the NIC did not accept for transmission
	pub tx_overflow: u64,
	dropped: BTreeMap<DropReason, u64>,
}

impl Stats {
	#[inline]
	fn record_drop(&mut self, reason: DropReason) {
		*self.dropped.entry(reason).or_insert(0) += 1;
	}

	pub fn dropped(&self, reason: DropReason) -> u64 {
		self.dropped.get(&reason).copied().unwrap_or(0)
	}

	pub fn total_dropped(&self) -> u64 {
		self.dropped.values().sum()
	}
}

impl fmt::Display for Stats {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"rx {} tx {} flooded {} tx overflow {} dropped {}",
			self.rx,
			self.tx,
			self.flooded,
			self.tx_overflow,
			self.total_dropped()
		)?;
		for (reason, count) in &self.dropped {
			write!(f, " [{}: {}]", reason, count)?;
		}
		Ok(())
	}
}

pub struct Engine<N: Nic, S: Strategy = Box<dyn Strategy>> {
	nic: N,
	strategy: S,
	ports: Vec<Port>,
	burst_size: usize,
	/// Outgoing frames of the current burst, by egress port
	pending: Vec<Vec<Mbuf>>,
	stats: Stats,
}

impl<N: Nic, S: Strategy> Engine<N, S> {
	pub fn new(nic: N, strategy: S) -> Self {
		let ports = Port::all(&nic);
		let pending = ports.iter().map(|_| Vec::new()).collect();
		Self {
			nic,
			strategy,
			ports,
			burst_size: Port::RX_BURST_MAX,
			pending,
			stats: Stats::default(),
		}
	}

	pub fn with_burst_size(mut self, burst_size: usize) -> Self {
		self.burst_size = burst_size.max(1);
		self
	}

	pub fn nic(&self) -> &N {
		&self.nic
	}

	pub fn nic_mut(&mut self) -> &mut N {
		&mut self.nic
	}

	pub fn strategy(&self) -> &S {
		&self.strategy
	}

	pub fn strategy_mut(&mut self) -> &mut S {
		&mut self.strategy
	}

	pub fn stats(&self) -> &Stats {
		&self.stats
	}

	/// Poll until `keep_running` is cleared
	pub fn run(&mut self, keep_running: &AtomicBool) -> &Stats {
		log::info!(
			"{} forwarding on {} ports, burst size {}",
			self.strategy.name(),
			self.ports.len(),
			self.burst_size
		);
		while keep_running.load(Ordering::SeqCst) {
			self.poll_round();
		}
		log::info!("{} stopped: {}", self.strategy.name(), self.stats);
		&self.stats
	}

	/// Poll every port once; returns the number of frames received
	pub fn poll_round(&mut self) -> usize {
		let mut received = 0;
		for i in 0..self.ports.len() {
			received += self.poll_port(self.ports[i]);
		}
		received
	}

	fn poll_port(&mut self, port: Port) -> usize {
		let pkts = port.receive(&mut self.nic, self.burst_size);
		if pkts.is_empty() {
			return 0;
		}
		let len = pkts.len();
		#[cfg(feature = "debug")]
		log::trace!("port {}: received {} packets", port.id, len);
		self.stats.rx += len as u64;

		for mut pkt in pkts {
			match self.strategy.process(&mut pkt, port.id) {
				Verdict::Forward(out) => self.enqueue(out, pkt),
				Verdict::Flood => self.flood(port.id, pkt),
				Verdict::Drop(reason) => {
					log::trace!("port {}: dropped frame ({})", port.id, reason);
					self.stats.record_drop(reason);
				}
			}
		}
		self.flush();
		len
	}

	fn enqueue(&mut self, out: u16, pkt: Mbuf) {
		match self.pending.get_mut(out as usize) {
			Some(queue) => queue.push(pkt),
			None => {
				log::debug!("no port {} to forward to", out);
				self.stats.record_drop(DropReason::BadPort);
			}
		}
	}

	fn flood(&mut self, ingress: u16, pkt: Mbuf) {
		let targets = self
			.ports
			.iter()
			.map(|p| p.id)
			.filter(|&id| id != ingress)
			.collect::<Vec<_>>();
		let (last, rest) = match targets.split_last() {
			Some(split) => split,
			None => {
				self.stats.record_drop(DropReason::UnknownDestination);
				return;
			}
		};
		for &out in rest {
			match pkt.try_clone() {
				Ok(copy) => {
					self.stats.flooded += 1;
					self.enqueue(out, copy);
				}
				Err(e) => {
					log::debug!("flood copy for port {} failed: {}", out, e);
					self.stats.record_drop(DropReason::NoBuf);
				}
			}
		}
		self.enqueue(*last, pkt);
	}

	fn flush(&mut self) {
		for (port, queue) in self.ports.iter().zip(self.pending.iter_mut()) {
			if queue.is_empty() {
				continue;
			}
			let pkts = mem::take(queue);
			let len = pkts.len();
			let sent = port.send(&mut self.nic, pkts);
			#[cfg(feature = "debug")]
			log::trace!("port {}: sent {} of {} packets", port.id, sent, len);
			self.stats.tx += sent as u64;
			self.stats.tx_overflow += (len - sent) as u64;
		}
	}
}
