//! Statically provisioned IPv4 to MAC bindings

use pnet::datalink::MacAddr;
use std::{collections::HashMap, net::Ipv4Addr};

use super::TableError;

pub struct ArpTable {
	map: HashMap<Ipv4Addr, MacAddr>,
	capacity: usize,
}

impl ArpTable {
	pub const DEFAULT_CAPACITY: usize = 1024;

	pub fn new(capacity: usize) -> Self {
		Self {
			map: HashMap::new(),
			capacity,
		}
	}

	/// Provision a binding, replacing an earlier one for the same address
	pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr) -> Result<(), TableError> {
		if !self.map.contains_key(&ip) && self.map.len() >= self.capacity {
			return Err(TableError::Capacity(self.capacity));
		}
		self.map.insert(ip, mac);
		Ok(())
	}

	#[inline]
	pub fn resolve(&self, ip: Ipv4Addr) -> Option<MacAddr> {
		self.map.get(&ip).copied()
	}

	pub fn len(&self) -> usize {
		self.map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.map.is_empty()
	}
}

impl Default for ArpTable {
	fn default() -> Self {
		Self::new(Self::DEFAULT_CAPACITY)
	}
}
