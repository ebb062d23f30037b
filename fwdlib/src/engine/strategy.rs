use crate::apis::Mbuf;
use std::fmt;

/// What becomes of one received frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
	/// Transmit on this port, possibly after rewriting the buffer
	Forward(u16),
	/// Transmit on every port except the ingress port
	Flood,
	Drop(DropReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
	Malformed,
	NotIpv4,
	/// Not something this strategy answers, e.g. a non-echo ICMP message
	Unsupported,
	/// Destination MAC or IP is not one of ours
	NotForUs,
	UnknownDestination,
	NoRoute,
	Unresolved,
	TtlExpired,
	/// A flood copy could not get a buffer
	NoBuf,
	/// The verdict named a port the NIC does not have
	BadPort,
}

impl fmt::Display for DropReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			DropReason::Malformed => "malformed",
			DropReason::NotIpv4 => "not ipv4",
			DropReason::Unsupported => "unsupported",
			DropReason::NotForUs => "not for us",
			DropReason::UnknownDestination => "unknown destination",
			DropReason::NoRoute => "no route",
			DropReason::Unresolved => "unresolved next hop",
			DropReason::TtlExpired => "ttl expired",
			DropReason::NoBuf => "no buffer",
			DropReason::BadPort => "bad egress port",
		};
		f.write_str(name)
	}
}

/// A forwarding behaviour
///
/// `process` sees every received frame exactly once, in receive order, and may
/// rewrite it in place before handing back a verdict. It must not block.
pub trait Strategy {
	fn name(&self) -> &'static str;

	fn process(&mut self, pkt: &mut Mbuf, ingress: u16) -> Verdict;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
	fn name(&self) -> &'static str {
		(**self).name()
	}

	fn process(&mut self, pkt: &mut Mbuf, ingress: u16) -> Verdict {
		(**self).process(pkt, ingress)
	}
}
