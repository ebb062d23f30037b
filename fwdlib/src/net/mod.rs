//! Bounds-checked views over received frames
//!
//! `FrameView::parse` walks Ethernet, IPv4 and UDP up front, so once a view exists
//! every accessor on it is in bounds. Rewriting headers is done by the caller on the
//! owned `Mbuf`, using the offsets exported here

mod frame;
mod secret;

pub use frame::*;
pub use secret::*;

use pnet::datalink::MacAddr;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layer {
	Ethernet,
	Ipv4,
	Udp,
	Secret,
}

impl fmt::Display for Layer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Layer::Ethernet => "ethernet",
			Layer::Ipv4 => "ipv4",
			Layer::Udp => "udp",
			Layer::Secret => "secret",
		};
		f.write_str(name)
	}
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
	/// The buffer ends before the header does
	#[error("malformed {} header: need {} bytes, have {}", layer, needed, available)]
	Malformed {
		layer: Layer,
		needed: usize,
		available: usize,
	},

	#[error("ipv4 header with version {} and ihl {}", version, ihl)]
	BadIpv4Header { version: u8, ihl: u8 },
}

impl FrameError {
	pub(crate) fn short(layer: Layer, needed: usize, available: usize) -> Self {
		FrameError::Malformed {
			layer,
			needed,
			available,
		}
	}
}

/// Group addresses have the I/G bit of the first octet set
#[inline]
pub fn is_group(mac: MacAddr) -> bool {
	mac.0 & 0x01 != 0
}

/// `b` must hold at least six bytes
#[inline]
pub(crate) fn mac_from_slice(b: &[u8]) -> MacAddr {
	MacAddr(b[0], b[1], b[2], b[3], b[4], b[5])
}

#[inline]
pub fn mac_octets(mac: MacAddr) -> [u8; 6] {
	[mac.0, mac.1, mac.2, mac.3, mac.4, mac.5]
}

/// Exchange source and destination MAC of an Ethernet frame in place
///
/// `frame` must hold at least an Ethernet header.
#[inline]
pub fn swap_eth_addrs(frame: &mut [u8]) {
	let (dst, src) = frame[..12].split_at_mut(6);
	dst.swap_with_slice(src);
}

/// Exchange source and destination address of an IPv4 header in place
///
/// The header checksum does not change under the swap. `hdr` must hold at least a
/// minimal IPv4 header.
#[inline]
pub fn swap_ipv4_addrs(hdr: &mut [u8]) {
	let (src, dst) = hdr[IPV4_SRC..IPV4_DST + 4].split_at_mut(4);
	src.swap_with_slice(dst);
}
