//! A NIC backed by OS network interfaces through pnet datalink channels
//!
//! Each configured interface becomes one port, numbered in the order given. The
//! channels are opened with a zero read timeout so a receive burst returns as soon
//! as the socket has nothing more to give

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender};
use std::{io, time::Duration};

use super::{Mbuf, Mempool, Nic, PortError};

struct Link {
	tx: Box<dyn DataLinkSender>,
	rx: Box<dyn DataLinkReceiver>,
}

pub struct DatalinkNic {
	links: Vec<Link>,
	mempool: Mempool,
}

impl DatalinkNic {
	/// Open one channel per interface name
	pub fn open<S: AsRef<str>>(names: &[S], mempool: Mempool) -> Result<Self, PortError> {
		if names.is_empty() {
			return Err(PortError::NoPorts);
		}
		let interfaces = datalink::interfaces();
		let mut links = Vec::with_capacity(names.len());
		for name in names.iter().map(AsRef::as_ref) {
			let iface = interfaces
				.iter()
				.find(|i| i.name == name)
				.ok_or_else(|| PortError::NoDevice(name.to_owned()))?;
			let config = Config {
				read_timeout: Some(Duration::from_millis(0)),
				promiscuous: true,
				..Default::default()
			};
			let (tx, rx) = match datalink::channel(iface, config) {
				Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
				Ok(_) => return Err(PortError::NoSupport(name.to_owned())),
				Err(e) => {
					log::error!("couldn't open a channel on {}: {}", name, e);
					return Err(e.into());
				}
			};
			log::info!("port {} -> {} ({:?})", links.len(), name, iface.mac);
			links.push(Link { tx, rx });
		}
		Ok(Self { links, mempool })
	}
}

impl Nic for DatalinkNic {
	fn port_count(&self) -> u16 {
		self.links.len() as u16
	}

	fn rx_burst(&mut self, port: u16, max: usize) -> Vec<Mbuf> {
		let mempool = &self.mempool;
		let link = match self.links.get_mut(port as usize) {
			Some(link) => link,
			None => return Vec::new(),
		};
		let mut pkts = Vec::with_capacity(max);
		while pkts.len() < max {
			match link.rx.next() {
				Ok(frame) => match Mbuf::from_bytes(frame, mempool) {
					Ok(pkt) => pkts.push(pkt),
					Err(e) => {
						log::debug!("port {}: dropping received frame: {}", port, e);
						break;
					}
				},
				Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => {
					break
				}
				Err(e) => {
					log::warn!("port {}: receive failed: {}", port, e);
					break;
				}
			}
		}
		pkts
	}

	fn tx_burst(&mut self, port: u16, pkts: &mut Vec<Mbuf>) -> usize {
		let link = match self.links.get_mut(port as usize) {
			Some(link) => link,
			None => return 0,
		};
		let mut count = 0;
		for pkt in pkts.iter() {
			match link.tx.send_to(pkt.data(), None) {
				Some(Ok(())) => count += 1,
				Some(Err(e)) => {
					log::debug!("port {}: transmit failed: {}", port, e);
					break;
				}
				None => break,
			}
		}
		pkts.drain(..count);
		count
	}
}
