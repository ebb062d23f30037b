//! Covert mailboxes multiplexed over UDP next to plain L2 forwarding
//!
//! A datagram whose source and destination ports are both the secret port (and
//! whose destination address is the service address, when one is set) is a mailbox
//! request. It is answered in place and sent back out of the port it came in on.
//! Every other IPv4 frame goes where the static MAC table says, or nowhere.

use byteorder::{BigEndian, ByteOrder};
use shm_mailbox::MailboxStore;
use std::net::Ipv4Addr;

use super::{DropReason, Strategy, Verdict};
use crate::{
	apis::Mbuf,
	net::{
		swap_eth_addrs, swap_ipv4_addrs, FrameView, Opcode, SecretHeader, ETH_HDR_LEN,
		SECRET_HDR_LEN, SECRET_PORT, UDP_CSUM, UDP_DPORT, UDP_HDR_LEN, UDP_SPORT,
	},
	tables::MacTable,
};

enum Action {
	Answer { udp_off: usize, req: SecretHeader },
	Forward(u16),
}

pub struct DeadDrop {
	store: MailboxStore,
	macs: MacTable,
	secret_port: u16,
	service_ip: Option<Ipv4Addr>,
}

impl DeadDrop {
	pub const DEFAULT_SERVICE_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 254);

	pub fn new(store: MailboxStore, macs: MacTable) -> Self {
		Self {
			store,
			macs,
			secret_port: SECRET_PORT,
			service_ip: Some(Self::DEFAULT_SERVICE_IP),
		}
	}

	pub fn with_secret_port(mut self, port: u16) -> Self {
		self.secret_port = port;
		self
	}

	/// Only answer requests sent to `ip`; `None` answers them whatever the address
	pub fn with_service_ip(mut self, ip: Option<Ipv4Addr>) -> Self {
		self.service_ip = ip;
		self
	}

	pub fn store(&self) -> &MailboxStore {
		&self.store
	}

	/// The reply to one request, or `None` when `req` is not a request
	pub fn answer(&self, req: SecretHeader) -> Option<SecretHeader> {
		let index = req.mailbox as usize;
		let reply = match req.opcode()? {
			Opcode::Dropoff => match self.store.dropoff(index, req.message) {
				Ok(()) => SecretHeader::new(Opcode::Success, req.mailbox, req.message),
				Err(e) => {
					log::debug!("dropoff into mailbox {} failed: {}", index, e);
					SecretHeader::new(Opcode::Failure, req.mailbox, req.message)
				}
			},
			Opcode::Pickup => match self.store.pickup(index) {
				Ok(message) => SecretHeader::new(Opcode::Success, req.mailbox, message),
				Err(e) => {
					log::debug!("pickup from mailbox {} failed: {}", index, e);
					SecretHeader::new(Opcode::Failure, req.mailbox, 0)
				}
			},
			Opcode::Success | Opcode::Failure => return None,
		};
		Some(reply)
	}

	/// The request carried by secret traffic; `None` for any other frame
	fn secret_request(&self, frame: &FrameView) -> Option<Result<Action, DropReason>> {
		let ip = frame.ipv4()?;
		let udp = ip.udp()?;
		if udp.src_port() != self.secret_port || udp.dst_port() != self.secret_port {
			return None;
		}
		if self.service_ip.map_or(false, |service| service != ip.dst()) {
			return None;
		}
		let udp_off = ETH_HDR_LEN + ip.header_len();
		Some(
			udp.secret()
				.map(|req| Action::Answer { udp_off, req })
				.map_err(|_| DropReason::Malformed),
		)
	}

	fn classify(&self, data: &[u8], ingress: u16) -> Result<Action, DropReason> {
		let frame = FrameView::parse(data).map_err(|e| {
			log::debug!("port {}: {}", ingress, e);
			DropReason::Malformed
		})?;
		if frame.ipv4().is_none() {
			return Err(DropReason::NotIpv4);
		}
		if let Some(request) = self.secret_request(&frame) {
			return request;
		}
		let dst = frame.dst_mac();
		match self.macs.lookup(dst) {
			Some(port) => Ok(Action::Forward(port)),
			None => {
				log::debug!("port {}: {} not in the mac table", ingress, dst);
				Err(DropReason::UnknownDestination)
			}
		}
	}
}

impl Strategy for DeadDrop {
	fn name(&self) -> &'static str {
		"deaddrop"
	}

	fn process(&mut self, pkt: &mut Mbuf, ingress: u16) -> Verdict {
		let (udp_off, req) = match self.classify(pkt.data(), ingress) {
			Ok(Action::Answer { udp_off, req }) => (udp_off, req),
			Ok(Action::Forward(port)) => return Verdict::Forward(port),
			Err(reason) => return Verdict::Drop(reason),
		};
		let reply = match self.answer(req) {
			Some(reply) => reply,
			None => return Verdict::Drop(DropReason::Unsupported),
		};

		let data = pkt.data_mut();
		swap_eth_addrs(data);
		swap_ipv4_addrs(&mut data[ETH_HDR_LEN..]);
		let udp = &mut data[udp_off..];
		let (sport, dport) = (
			BigEndian::read_u16(&udp[UDP_SPORT..]),
			BigEndian::read_u16(&udp[UDP_DPORT..]),
		);
		BigEndian::write_u16(&mut udp[UDP_SPORT..], dport);
		BigEndian::write_u16(&mut udp[UDP_DPORT..], sport);
		BigEndian::write_u16(&mut udp[UDP_CSUM..], 0);
		udp[UDP_HDR_LEN..UDP_HDR_LEN + SECRET_HDR_LEN].copy_from_slice(&reply.to_bytes());
		Verdict::Forward(ingress)
	}
}
