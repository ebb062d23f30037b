//! The dead-drop header carried in the first eight bytes of a UDP payload
//!
//! ```text
//!  0               2               4                               8
//! +---------------+---------------+-------------------------------+
//! |    opcode     |    mailbox    |            message            |
//! +---------------+---------------+-------------------------------+
//! ```
//! All fields are big-endian.

use byteorder::{BigEndian, ByteOrder};

use super::{FrameError, Layer};

pub const SECRET_PORT: u16 = 0xFFFF;
pub const SECRET_HDR_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
	Failure = 0x0000,
	Dropoff = 0x0001,
	Pickup = 0x0002,
	Success = 0xFFFF,
}

impl Opcode {
	pub fn from_u16(raw: u16) -> Option<Self> {
		match raw {
			0x0000 => Some(Opcode::Failure),
			0x0001 => Some(Opcode::Dropoff),
			0x0002 => Some(Opcode::Pickup),
			0xFFFF => Some(Opcode::Success),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecretHeader {
	pub opcode: u16,
	pub mailbox: u16,
	pub message: u32,
}

impl SecretHeader {
	pub fn new(opcode: Opcode, mailbox: u16, message: u32) -> Self {
		Self {
			opcode: opcode as u16,
			mailbox,
			message,
		}
	}

	pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
		if buf.len() < SECRET_HDR_LEN {
			return Err(FrameError::short(Layer::Secret, SECRET_HDR_LEN, buf.len()));
		}
		Ok(Self {
			opcode: BigEndian::read_u16(&buf[0..2]),
			mailbox: BigEndian::read_u16(&buf[2..4]),
			message: BigEndian::read_u32(&buf[4..8]),
		})
	}

	#[inline]
	pub fn opcode(&self) -> Option<Opcode> {
		Opcode::from_u16(self.opcode)
	}

	pub fn to_bytes(&self) -> [u8; SECRET_HDR_LEN] {
		let mut raw = [0u8; SECRET_HDR_LEN];
		BigEndian::write_u16(&mut raw[0..2], self.opcode);
		BigEndian::write_u16(&mut raw[2..4], self.mailbox);
		BigEndian::write_u32(&mut raw[4..8], self.message);
		raw
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_fields_are_big_endian() {
		let hdr = SecretHeader::parse(&[0, 1, 0, 5, 0x41, 0x42, 0x43, 0x44, 0xee]).unwrap();
		assert_eq!(hdr.opcode(), Some(Opcode::Dropoff));
		assert_eq!(hdr.mailbox, 5);
		assert_eq!(hdr.message, 0x4142_4344);

		let reply = SecretHeader::new(Opcode::Success, 5, 0x4142_4344);
		assert_eq!(reply.to_bytes(), [0xff, 0xff, 0, 5, 0x41, 0x42, 0x43, 0x44]);
	}

	#[test]
	fn short_payload_and_unknown_opcode() {
		assert!(matches!(
			SecretHeader::parse(&[0, 2, 0, 1]),
			Err(FrameError::Malformed {
				layer: Layer::Secret,
				needed: 8,
				available: 4
			})
		));
		let hdr = SecretHeader::parse(&[0, 3, 0, 0, 0, 0, 0, 0]).unwrap();
		assert_eq!(hdr.opcode(), None);
	}
}
