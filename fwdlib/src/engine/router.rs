//! A static IPv4 router
//!
//! Each interface owns one port, one MAC and one address, and installs the
//! connected route for its subnet. Further routes are provisioned at startup, with
//! or without a gateway. Next hops are resolved through the static ARP table only;
//! nothing is ever asked on the wire.
//!
//! The only ARP the router speaks is answering requests for the address of the
//! interface they arrive on.

use byteorder::{BigEndian, ByteOrder};
use pnet::{
	datalink::MacAddr,
	packet::{
		arp::{ArpOperations, ArpPacket, MutableArpPacket},
		ethernet::EtherTypes,
		util::checksum,
	},
};
use std::net::Ipv4Addr;

use super::{DropReason, Strategy, Verdict};
use crate::{
	apis::Mbuf,
	net::{mac_octets, FrameView, ETHERTYPE_ARP, ETH_DST, ETH_HDR_LEN, ETH_SRC, IPV4_CSUM, IPV4_TTL},
	tables::{ArpTable, LpmTable, TableError},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interface {
	pub port: u16,
	pub mac: MacAddr,
	pub ip: Ipv4Addr,
	pub prefix_len: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NextHop {
	pub port: u16,
	/// Resolve this address instead of the destination when set
	pub gateway: Option<Ipv4Addr>,
}

enum Action {
	Route {
		dst: MacAddr,
		src: MacAddr,
		port: u16,
		ip_hlen: usize,
	},
	ArpReply {
		iface: Interface,
		requester_mac: MacAddr,
		requester_ip: Ipv4Addr,
	},
}

pub struct Router {
	interfaces: Vec<Interface>,
	/// Indexed by the values stored in the LPM table
	next_hops: Vec<NextHop>,
	lpm: LpmTable,
	arp: ArpTable,
}

impl Router {
	pub fn new(lpm: LpmTable, arp: ArpTable) -> Self {
		Self {
			interfaces: Vec::new(),
			next_hops: Vec::new(),
			lpm,
			arp,
		}
	}

	/// Bring up an interface and install its connected route
	pub fn add_interface(&mut self, iface: Interface) -> Result<(), TableError> {
		self.interfaces.push(iface);
		if let Err(e) = self.add_route(iface.ip, iface.prefix_len, iface.port, None) {
			self.interfaces.pop();
			return Err(e);
		}
		log::info!(
			"interface {}/{} ({}) on port {}",
			iface.ip,
			iface.prefix_len,
			iface.mac,
			iface.port
		);
		Ok(())
	}

	pub fn add_route(
		&mut self,
		prefix: Ipv4Addr,
		len: u8,
		port: u16,
		gateway: Option<Ipv4Addr>,
	) -> Result<(), TableError> {
		if self.interface_on(port).is_none() {
			return Err(TableError::NoInterface(port));
		}
		let index = self.next_hops.len() as u32;
		self.lpm.add_route(prefix, len, index)?;
		self.next_hops.push(NextHop { port, gateway });
		Ok(())
	}

	pub fn delete_route(&mut self, prefix: Ipv4Addr, len: u8) -> Option<NextHop> {
		let index = self.lpm.delete_route(prefix, len)?;
		self.next_hops.get(index as usize).copied()
	}

	/// Where traffic for `addr` leaves
	pub fn next_hop(&self, addr: Ipv4Addr) -> Option<NextHop> {
		let index = self.lpm.lookup(addr)?;
		self.next_hops.get(index as usize).copied()
	}

	pub fn arp_mut(&mut self) -> &mut ArpTable {
		&mut self.arp
	}

	pub fn arp(&self) -> &ArpTable {
		&self.arp
	}

	pub fn lpm(&self) -> &LpmTable {
		&self.lpm
	}

	pub fn interfaces(&self) -> &[Interface] {
		&self.interfaces
	}

	fn interface_on(&self, port: u16) -> Option<&Interface> {
		self.interfaces.iter().find(|i| i.port == port)
	}

	fn classify(&self, data: &[u8], ingress: u16) -> Result<Action, DropReason> {
		let frame = FrameView::parse(data).map_err(|e| {
			log::debug!("port {}: {}", ingress, e);
			DropReason::Malformed
		})?;
		if frame.ether_type() == ETHERTYPE_ARP {
			return self.classify_arp(frame.payload(), ingress);
		}
		let ip = frame.ipv4().ok_or(DropReason::NotIpv4)?;
		let iface = self.interface_on(ingress).ok_or(DropReason::NotForUs)?;
		if frame.dst_mac() != iface.mac {
			return Err(DropReason::NotForUs);
		}
		let dst = ip.dst();
		if self.interfaces.iter().any(|i| i.ip == dst) {
			return Err(DropReason::Unsupported);
		}
		if ip.ttl() <= 1 {
			log::debug!("port {}: ttl expired for {}", ingress, dst);
			return Err(DropReason::TtlExpired);
		}
		let hop = self.next_hop(dst).ok_or_else(|| {
			log::debug!("port {}: no route to {}", ingress, dst);
			DropReason::NoRoute
		})?;
		let target = hop.gateway.unwrap_or(dst);
		let next_mac = self.arp.resolve(target).ok_or_else(|| {
			log::debug!("port {}: {} is not in the arp table", ingress, target);
			DropReason::Unresolved
		})?;
		let egress = self.interface_on(hop.port).ok_or(DropReason::BadPort)?;
		Ok(Action::Route {
			dst: next_mac,
			src: egress.mac,
			port: hop.port,
			ip_hlen: ip.header_len(),
		})
	}

	/// Only the interface on the ingress port answers for its own address
	fn classify_arp(&self, payload: &[u8], ingress: u16) -> Result<Action, DropReason> {
		let arp = ArpPacket::new(payload).ok_or(DropReason::Malformed)?;
		if arp.get_operation() != ArpOperations::Request
			|| arp.get_protocol_type() != EtherTypes::Ipv4
		{
			return Err(DropReason::Unsupported);
		}
		let target = arp.get_target_proto_addr();
		let iface = self
			.interfaces
			.iter()
			.find(|i| i.port == ingress && i.ip == target)
			.ok_or(DropReason::NotForUs)?;
		Ok(Action::ArpReply {
			iface: *iface,
			requester_mac: arp.get_sender_hw_addr(),
			requester_ip: arp.get_sender_proto_addr(),
		})
	}
}

impl Strategy for Router {
	fn name(&self) -> &'static str {
		"router"
	}

	fn process(&mut self, pkt: &mut Mbuf, ingress: u16) -> Verdict {
		let action = match self.classify(pkt.data(), ingress) {
			Ok(action) => action,
			Err(reason) => return Verdict::Drop(reason),
		};
		let data = pkt.data_mut();
		match action {
			Action::Route {
				dst,
				src,
				port,
				ip_hlen,
			} => {
				data[ETH_DST..ETH_DST + 6].copy_from_slice(&mac_octets(dst));
				data[ETH_SRC..ETH_SRC + 6].copy_from_slice(&mac_octets(src));
				let hdr = &mut data[ETH_HDR_LEN..ETH_HDR_LEN + ip_hlen];
				hdr[IPV4_TTL] -= 1;
				BigEndian::write_u16(&mut hdr[IPV4_CSUM..IPV4_CSUM + 2], 0);
				let csum = checksum(hdr, IPV4_CSUM / 2);
				BigEndian::write_u16(&mut hdr[IPV4_CSUM..IPV4_CSUM + 2], csum);
				Verdict::Forward(port)
			}
			Action::ArpReply {
				iface,
				requester_mac,
				requester_ip,
			} => {
				data[ETH_DST..ETH_DST + 6].copy_from_slice(&mac_octets(requester_mac));
				data[ETH_SRC..ETH_SRC + 6].copy_from_slice(&mac_octets(iface.mac));
				// classify_arp already parsed this much
				if let Some(mut arp) = MutableArpPacket::new(&mut data[ETH_HDR_LEN..]) {
					arp.set_operation(ArpOperations::Reply);
					arp.set_sender_hw_addr(iface.mac);
					arp.set_sender_proto_addr(iface.ip);
					arp.set_target_hw_addr(requester_mac);
					arp.set_target_proto_addr(requester_ip);
				}
				Verdict::Forward(ingress)
			}
		}
	}
}
