//! Answers ICMP echo requests for every address inside a prefix
//!
//! The request buffer is turned into the reply in place: Ethernet and IPv4
//! addresses swapped, type set to echo reply, ICMP checksum recomputed. The TTL is
//! left as it came.

use byteorder::{BigEndian, ByteOrder};
use pnet::packet::util::checksum;
use std::net::Ipv4Addr;

use super::{DropReason, Strategy, Verdict};
use crate::{
	apis::Mbuf,
	net::{swap_eth_addrs, swap_ipv4_addrs, FrameView, ETH_HDR_LEN, IPPROTO_ICMP},
};

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_ECHO_REQUEST: u8 = 8;
const ICMP_HDR_LEN: usize = 8;

pub struct Ping {
	prefix: u32,
	mask: u32,
}

impl Ping {
	pub const DEFAULT_PREFIX: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);
	pub const DEFAULT_PREFIX_LEN: u8 = 8;

	pub fn new(prefix: Ipv4Addr, prefix_len: u8) -> Self {
		let mask = match prefix_len {
			0 => 0,
			len if len >= 32 => u32::MAX,
			len => u32::MAX << (32 - len as u32),
		};
		Self {
			prefix: u32::from(prefix) & mask,
			mask,
		}
	}

	#[inline]
	fn covers(&self, ip: Ipv4Addr) -> bool {
		u32::from(ip) & self.mask == self.prefix
	}

	/// Offset and length of the ICMP message of an echo request we answer
	fn classify(&self, data: &[u8], ingress: u16) -> Result<(usize, usize), DropReason> {
		let frame = FrameView::parse(data).map_err(|e| {
			log::debug!("port {}: {}", ingress, e);
			DropReason::Malformed
		})?;
		let ip = frame.ipv4().ok_or(DropReason::NotIpv4)?;
		if ip.protocol() != IPPROTO_ICMP {
			return Err(DropReason::Unsupported);
		}
		if !self.covers(ip.dst()) {
			return Err(DropReason::NotForUs);
		}
		let icmp = ip.payload();
		if icmp.len() < ICMP_HDR_LEN {
			return Err(DropReason::Malformed);
		}
		if icmp[0] != ICMP_ECHO_REQUEST || icmp[1] != 0 {
			return Err(DropReason::Unsupported);
		}
		Ok((ETH_HDR_LEN + ip.header_len(), icmp.len()))
	}
}

impl Default for Ping {
	fn default() -> Self {
		Self::new(Self::DEFAULT_PREFIX, Self::DEFAULT_PREFIX_LEN)
	}
}

impl Strategy for Ping {
	fn name(&self) -> &'static str {
		"ping"
	}

	fn process(&mut self, pkt: &mut Mbuf, ingress: u16) -> Verdict {
		let (offset, len) = match self.classify(pkt.data(), ingress) {
			Ok(found) => found,
			Err(reason) => return Verdict::Drop(reason),
		};
		let data = pkt.data_mut();
		swap_eth_addrs(data);
		swap_ipv4_addrs(&mut data[ETH_HDR_LEN..]);

		let icmp = &mut data[offset..offset + len];
		icmp[0] = ICMP_ECHO_REPLY;
		icmp[1] = 0;
		BigEndian::write_u16(&mut icmp[2..4], 0);
		let csum = checksum(icmp, 1);
		BigEndian::write_u16(&mut icmp[2..4], csum);
		Verdict::Forward(ingress)
	}
}
