//! Longest prefix match over IPv4 routes
//!
//! One hash map per prefix length. A lookup masks the address for each populated
//! length, longest first, and stops at the first hit. Host bits of an inserted
//! prefix are cleared, so `10.0.0.7/24` and `10.0.0.0/24` are the same route.

use std::{collections::HashMap, net::Ipv4Addr};

use super::TableError;

#[inline]
fn mask(len: u8) -> u32 {
	if len == 0 {
		0
	} else {
		u32::MAX << (32 - len as u32)
	}
}

pub struct LpmTable {
	/// Indexed by prefix length
	levels: Vec<HashMap<u32, u32>>,
	/// Bit `n` set when some route of length `n` exists
	populated: u64,
	len: usize,
	capacity: usize,
}

impl LpmTable {
	pub const DEFAULT_CAPACITY: usize = 1024;

	pub fn new(capacity: usize) -> Self {
		Self {
			levels: (0..=32).map(|_| HashMap::new()).collect(),
			populated: 0,
			len: 0,
			capacity,
		}
	}

	/// Install `prefix/len -> next_hop`
	pub fn add_route(&mut self, prefix: Ipv4Addr, len: u8, next_hop: u32) -> Result<(), TableError> {
		if len > 32 {
			return Err(TableError::BadPrefixLen(len));
		}
		let key = u32::from(prefix) & mask(len);
		let level = &mut self.levels[len as usize];
		if level.contains_key(&key) {
			return Err(TableError::Conflict {
				prefix: Ipv4Addr::from(key),
				len,
			});
		}
		if self.len >= self.capacity {
			return Err(TableError::Capacity(self.capacity));
		}
		level.insert(key, next_hop);
		self.populated |= 1 << len;
		self.len += 1;
		Ok(())
	}

	/// Remove `prefix/len`, returning the next hop it pointed at
	pub fn delete_route(&mut self, prefix: Ipv4Addr, len: u8) -> Option<u32> {
		if len > 32 {
			return None;
		}
		let key = u32::from(prefix) & mask(len);
		let level = &mut self.levels[len as usize];
		let next_hop = level.remove(&key)?;
		if level.is_empty() {
			self.populated &= !(1 << len);
		}
		self.len -= 1;
		Some(next_hop)
	}

	/// Next hop of the longest prefix covering `addr`
	pub fn lookup(&self, addr: Ipv4Addr) -> Option<u32> {
		let addr = u32::from(addr);
		(0..=32u8)
			.rev()
			.filter(|len| self.populated & (1 << len) != 0)
			.find_map(|len| self.levels[len as usize].get(&(addr & mask(len))).copied())
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}

impl Default for LpmTable {
	fn default() -> Self {
		Self::new(Self::DEFAULT_CAPACITY)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ip(s: &str) -> Ipv4Addr {
		s.parse().unwrap()
	}

	fn sample() -> LpmTable {
		let mut table = LpmTable::default();
		table.add_route(ip("10.0.0.0"), 24, 0).unwrap();
		table.add_route(ip("10.0.0.0"), 16, 1).unwrap();
		table
	}

	#[test]
	fn longest_prefix_wins() {
		let table = sample();
		assert_eq!(table.lookup(ip("10.0.0.5")), Some(0));
		assert_eq!(table.lookup(ip("10.0.1.5")), Some(1));
		assert_eq!(table.lookup(ip("192.168.0.1")), None);
	}

	#[test]
	fn identical_prefix_conflicts() {
		let mut table = sample();
		assert_eq!(
			table.add_route(ip("10.0.0.0"), 24, 7),
			Err(TableError::Conflict {
				prefix: ip("10.0.0.0"),
				len: 24
			})
		);
		// host bits don't make it a different route
		assert!(matches!(
			table.add_route(ip("10.0.0.99"), 24, 7),
			Err(TableError::Conflict { .. })
		));
		assert_eq!(table.lookup(ip("10.0.0.5")), Some(0));
		assert_eq!(table.len(), 2);
	}

	#[test]
	fn default_route_and_host_route() {
		let mut table = sample();
		table.add_route(ip("0.0.0.0"), 0, 9).unwrap();
		table.add_route(ip("10.0.0.5"), 32, 4).unwrap();
		assert_eq!(table.lookup(ip("192.168.0.1")), Some(9));
		assert_eq!(table.lookup(ip("10.0.0.5")), Some(4));
		assert_eq!(table.lookup(ip("10.0.0.6")), Some(0));
		assert_eq!(table.add_route(ip("1.2.3.4"), 33, 0), Err(TableError::BadPrefixLen(33)));
	}

	#[test]
	fn capacity_and_delete() {
		let mut table = LpmTable::new(2);
		table.add_route(ip("10.0.0.0"), 24, 0).unwrap();
		table.add_route(ip("10.0.0.0"), 16, 1).unwrap();
		assert_eq!(
			table.add_route(ip("172.16.0.0"), 12, 2),
			Err(TableError::Capacity(2))
		);
		assert_eq!(table.delete_route(ip("10.0.0.0"), 24), Some(0));
		assert_eq!(table.delete_route(ip("10.0.0.0"), 24), None);
		assert_eq!(table.lookup(ip("10.0.0.5")), Some(1));
		table.add_route(ip("172.16.0.0"), 12, 2).unwrap();
		assert_eq!(table.lookup(ip("172.31.255.1")), Some(2));
	}

	#[test]
	fn lookups_are_deterministic() {
		let table = sample();
		let first = table.lookup(ip("10.0.200.1"));
		assert!((0..100).all(|_| table.lookup(ip("10.0.200.1")) == first));
	}
}
