use byteorder::{BigEndian, ByteOrder};
use pnet::datalink::MacAddr;
use std::net::Ipv4Addr;

use super::{mac_from_slice, FrameError, Layer, SecretHeader};

pub const ETH_HDR_LEN: usize = 14;
pub const IPV4_MIN_HDR_LEN: usize = 20;
pub const UDP_HDR_LEN: usize = 8;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_UDP: u8 = 17;

// Field offsets, relative to the start of their own header
pub const ETH_DST: usize = 0;
pub const ETH_SRC: usize = 6;
pub const IPV4_TTL: usize = 8;
pub const IPV4_CSUM: usize = 10;
pub const IPV4_SRC: usize = 12;
pub const IPV4_DST: usize = 16;
pub const UDP_SPORT: usize = 0;
pub const UDP_DPORT: usize = 2;
pub const UDP_CSUM: usize = 6;

/// A parsed frame
///
/// Parsing checks the whole Ethernet, IPv4, UDP chain the frame claims to carry,
/// so a frame that says IPv4 but is cut short never yields a view.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
	buf: &'a [u8],
	ipv4: Option<Ipv4View<'a>>,
}

impl<'a> FrameView<'a> {
	pub fn parse(buf: &'a [u8]) -> Result<Self, FrameError> {
		if buf.len() < ETH_HDR_LEN {
			return Err(FrameError::short(Layer::Ethernet, ETH_HDR_LEN, buf.len()));
		}
		let ipv4 = if BigEndian::read_u16(&buf[12..14]) == ETHERTYPE_IPV4 {
			Some(Ipv4View::parse(&buf[ETH_HDR_LEN..])?)
		} else {
			None
		};
		Ok(Self { buf, ipv4 })
	}

	#[inline]
	pub fn dst_mac(&self) -> MacAddr {
		mac_from_slice(&self.buf[ETH_DST..])
	}

	#[inline]
	pub fn src_mac(&self) -> MacAddr {
		mac_from_slice(&self.buf[ETH_SRC..])
	}

	#[inline]
	pub fn ether_type(&self) -> u16 {
		BigEndian::read_u16(&self.buf[12..14])
	}

	#[inline]
	pub fn ipv4(&self) -> Option<&Ipv4View<'a>> {
		self.ipv4.as_ref()
	}

	/// Everything after the Ethernet header
	#[inline]
	pub fn payload(&self) -> &'a [u8] {
		&self.buf[ETH_HDR_LEN..]
	}

	/// Offset of the UDP header in the frame, when there is one
	pub fn udp_offset(&self) -> Option<usize> {
		self.ipv4
			.as_ref()
			.filter(|ip| ip.udp().is_some())
			.map(|ip| ETH_HDR_LEN + ip.header_len())
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.buf.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}
}

#[derive(Clone, Copy, Debug)]
pub struct Ipv4View<'a> {
	/// From the first header byte to the end of the datagram; link padding is cut off
	buf: &'a [u8],
	udp: Option<UdpView<'a>>,
}

impl<'a> Ipv4View<'a> {
	fn parse(buf: &'a [u8]) -> Result<Self, FrameError> {
		if buf.len() < IPV4_MIN_HDR_LEN {
			return Err(FrameError::short(Layer::Ipv4, IPV4_MIN_HDR_LEN, buf.len()));
		}
		let version = buf[0] >> 4;
		let ihl = buf[0] & 0x0f;
		let hlen = ihl as usize * 4;
		if version != 4 || hlen < IPV4_MIN_HDR_LEN {
			return Err(FrameError::BadIpv4Header { version, ihl });
		}
		if buf.len() < hlen {
			return Err(FrameError::short(Layer::Ipv4, hlen, buf.len()));
		}
		let total = BigEndian::read_u16(&buf[2..4]) as usize;
		if total < hlen {
			return Err(FrameError::short(Layer::Ipv4, hlen, total));
		}
		if buf.len() < total {
			return Err(FrameError::short(Layer::Ipv4, total, buf.len()));
		}
		let buf = &buf[..total];
		let udp = if buf[9] == IPPROTO_UDP {
			Some(UdpView::parse(&buf[hlen..])?)
		} else {
			None
		};
		Ok(Self { buf, udp })
	}

	#[inline]
	pub fn ihl(&self) -> u8 {
		self.buf[0] & 0x0f
	}

	#[inline]
	pub fn header_len(&self) -> usize {
		self.ihl() as usize * 4
	}

	#[inline]
	pub fn total_length(&self) -> u16 {
		BigEndian::read_u16(&self.buf[2..4])
	}

	#[inline]
	pub fn ttl(&self) -> u8 {
		self.buf[IPV4_TTL]
	}

	#[inline]
	pub fn protocol(&self) -> u8 {
		self.buf[9]
	}

	#[inline]
	pub fn checksum(&self) -> u16 {
		BigEndian::read_u16(&self.buf[IPV4_CSUM..IPV4_CSUM + 2])
	}

	#[inline]
	pub fn src(&self) -> Ipv4Addr {
		Ipv4Addr::from(BigEndian::read_u32(&self.buf[IPV4_SRC..IPV4_SRC + 4]))
	}

	#[inline]
	pub fn dst(&self) -> Ipv4Addr {
		Ipv4Addr::from(BigEndian::read_u32(&self.buf[IPV4_DST..IPV4_DST + 4]))
	}

	/// The header bytes, options included
	#[inline]
	pub fn header(&self) -> &'a [u8] {
		&self.buf[..self.header_len()]
	}

	/// Everything after the header, up to the total length
	#[inline]
	pub fn payload(&self) -> &'a [u8] {
		&self.buf[self.header_len()..]
	}

	#[inline]
	pub fn udp(&self) -> Option<&UdpView<'a>> {
		self.udp.as_ref()
	}
}

#[derive(Clone, Copy, Debug)]
pub struct UdpView<'a> {
	/// Header and payload, as long as the length field says
	buf: &'a [u8],
}

impl<'a> UdpView<'a> {
	fn parse(buf: &'a [u8]) -> Result<Self, FrameError> {
		if buf.len() < UDP_HDR_LEN {
			return Err(FrameError::short(Layer::Udp, UDP_HDR_LEN, buf.len()));
		}
		let len = BigEndian::read_u16(&buf[4..6]) as usize;
		if len < UDP_HDR_LEN {
			return Err(FrameError::short(Layer::Udp, UDP_HDR_LEN, len));
		}
		if buf.len() < len {
			return Err(FrameError::short(Layer::Udp, len, buf.len()));
		}
		Ok(Self { buf: &buf[..len] })
	}

	#[inline]
	pub fn src_port(&self) -> u16 {
		BigEndian::read_u16(&self.buf[UDP_SPORT..UDP_SPORT + 2])
	}

	#[inline]
	pub fn dst_port(&self) -> u16 {
		BigEndian::read_u16(&self.buf[UDP_DPORT..UDP_DPORT + 2])
	}

	#[inline]
	pub fn length(&self) -> u16 {
		BigEndian::read_u16(&self.buf[4..6])
	}

	#[inline]
	pub fn checksum(&self) -> u16 {
		BigEndian::read_u16(&self.buf[UDP_CSUM..UDP_CSUM + 2])
	}

	#[inline]
	pub fn payload(&self) -> &'a [u8] {
		&self.buf[UDP_HDR_LEN..]
	}

	/// The dead-drop header, if the datagram is long enough to carry one
	pub fn secret(&self) -> Result<SecretHeader, FrameError> {
		SecretHeader::parse(self.payload())
	}
}
