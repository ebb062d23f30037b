//! A learning bridge
//!
//! Source addresses are bound to the port they arrive on; frames go to the port
//! their destination is bound to, or everywhere else when it is not bound yet.
//! A frame whose destination sits behind its own ingress port is filtered.
//! A full table only stops learning, so the switch degrades into a hub.

use pnet::datalink::MacAddr;

use super::{DropReason, Strategy, Verdict};
use crate::{
	apis::Mbuf,
	net::{is_group, FrameView},
	tables::MacTable,
};

pub struct LearningSwitch {
	table: MacTable,
	/// Flood group destinations other than broadcast instead of dropping them
	flood_multicast: bool,
	warned_full: bool,
}

impl LearningSwitch {
	pub fn new(table: MacTable, flood_multicast: bool) -> Self {
		Self {
			table,
			flood_multicast,
			warned_full: false,
		}
	}

	pub fn table(&self) -> &MacTable {
		&self.table
	}

	fn learn(&mut self, src: MacAddr, ingress: u16) {
		if is_group(src) {
			return;
		}
		match self.table.learn(src, ingress) {
			Ok(()) => self.warned_full = false,
			Err(e) if !self.warned_full => {
				log::warn!("not learning {} on port {}: {}", src, ingress, e);
				self.warned_full = true;
			}
			Err(e) => log::debug!("not learning {} on port {}: {}", src, ingress, e),
		}
	}
}

impl Default for LearningSwitch {
	fn default() -> Self {
		Self::new(MacTable::default(), false)
	}
}

impl Strategy for LearningSwitch {
	fn name(&self) -> &'static str {
		"switch"
	}

	fn process(&mut self, pkt: &mut Mbuf, ingress: u16) -> Verdict {
		let frame = match FrameView::parse(pkt.data()) {
			Ok(frame) => frame,
			Err(e) => {
				log::debug!("port {}: {}", ingress, e);
				return Verdict::Drop(DropReason::Malformed);
			}
		};
		let (src, dst) = (frame.src_mac(), frame.dst_mac());
		self.learn(src, ingress);

		if dst == MacAddr::broadcast() {
			return Verdict::Flood;
		}
		if is_group(dst) {
			return if self.flood_multicast {
				Verdict::Flood
			} else {
				Verdict::Drop(DropReason::UnknownDestination)
			};
		}
		match self.table.lookup(dst) {
			Some(port) if port == ingress => Verdict::Drop(DropReason::NotForUs),
			Some(port) => Verdict::Forward(port),
			None => Verdict::Flood,
		}
	}
}
