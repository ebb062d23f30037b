//! MAC address to egress port bindings
//!
//! A binding is created the first time a source address is seen and moved when the
//! address shows up on another port. Nothing ever ages out.

use pnet::datalink::MacAddr;
use std::collections::HashMap;

use super::TableError;

pub struct MacTable {
	map: HashMap<MacAddr, u16>,
	capacity: usize,
}

impl MacTable {
	pub const DEFAULT_CAPACITY: usize = 1024;

	pub fn new(capacity: usize) -> Self {
		Self {
			map: HashMap::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
			capacity,
		}
	}

	/// Bind `mac` to `port`, replacing any earlier binding
	///
	/// Rebinding an address that is already present never fails, even when the table
	/// is full.
	#[inline]
	pub fn learn(&mut self, mac: MacAddr, port: u16) -> Result<(), TableError> {
		if let Some(bound) = self.map.get_mut(&mac) {
			if *bound != port {
				log::debug!("{} moved from port {} to port {}", mac, bound, port);
				*bound = port;
			}
			return Ok(());
		}
		if self.map.len() >= self.capacity {
			return Err(TableError::Capacity(self.capacity));
		}
		self.map.insert(mac, port);
		Ok(())
	}

	#[inline]
	pub fn lookup(&self, mac: MacAddr) -> Option<u16> {
		self.map.get(&mac).copied()
	}

	pub fn len(&self) -> usize {
		self.map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}

impl Default for MacTable {
	fn default() -> Self {
		Self::new(Self::DEFAULT_CAPACITY)
	}
}
