//! Sends every IPv4 frame back out of the port it came in on, untouched

use super::{DropReason, Strategy, Verdict};
use crate::{apis::Mbuf, net::FrameView};

#[derive(Clone, Copy, Debug, Default)]
pub struct Echo;

impl Strategy for Echo {
	fn name(&self) -> &'static str {
		"echo"
	}

	fn process(&mut self, pkt: &mut Mbuf, ingress: u16) -> Verdict {
		match FrameView::parse(pkt.data()) {
			Ok(frame) if frame.ipv4().is_some() => Verdict::Forward(ingress),
			Ok(_) => Verdict::Drop(DropReason::NotIpv4),
			Err(e) => {
				log::debug!("port {}: {}", ingress, e);
				Verdict::Drop(DropReason::Malformed)
			}
		}
	}
}
