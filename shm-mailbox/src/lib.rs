//! Dead-drop mailboxes kept in shared memory
//!
//! Every mailbox is one 32-bit slot of a [`SharedRegion`]. Next to the shared
//! payloads the store keeps a private checksum per slot. There is no lock between
//! writers and readers, in this process or any other: a payload whose checksum
//! does not match is treated as a torn or foreign write and is never handed out.

mod region;

pub use region::SharedRegion;

use std::{
	hint, io,
	sync::atomic::{AtomicU32, Ordering},
};

use crc::{Crc, CRC_32_XFER};
use thiserror::Error;

/// Slot count used by the dead-drop service and its inspection tool
pub const DEFAULT_SLOTS: usize = 1024;
/// Name of the shared memory object holding the payloads
pub const DEFAULT_SHM_NAME: &str = "/secret";

// zero-in, zero-out: an untouched slot verifies against an untouched checksum
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_XFER);

#[derive(Error, Debug)]
pub enum MailboxError {
	#[error("mailbox {index} is outside the store ({slots} slots)")]
	OutOfBounds { index: usize, slots: usize },
	#[error("mailbox {0} failed checksum verification")]
	Corrupted(usize),
	#[error("mailbox {0} already holds a message")]
	Occupied(usize),
	#[error("mailbox {0} is empty")]
	Empty(usize),
	#[error("value {0:?} does not fit in 4 bytes")]
	ValueTooLong(String),
	#[error("invalid shared memory name {0:?}")]
	BadName(String),
	#[error("a shared region needs at least one slot")]
	NoSlots,
	#[error("{0} slots do not fit in the address space")]
	TooManySlots(usize),
	#[error("shared region holds {found} bytes, expected at least {expected}")]
	TooSmall { found: usize, expected: usize },
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
}

/// How a mailbox treats repeated drop-offs and pick-ups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxMode {
	/// Drop-offs overwrite, pick-ups leave the message in place
	Overwrite,
	/// A mailbox holds at most one message and a pick-up consumes it
	OneShot,
}

impl Default for MailboxMode {
	fn default() -> Self {
		MailboxMode::Overwrite
	}
}

/// Checksum stored alongside a payload
#[inline]
pub fn checksum(value: u32) -> u32 {
	CRC32.checksum(&value.to_be_bytes())
}

pub struct MailboxStore {
	region: SharedRegion,
	checksums: Box<[AtomicU32]>,
	mode: MailboxMode,
}

impl MailboxStore {
	/// Re-reads attempted before a mismatching slot is reported as corrupted
	const PICKUP_RETRIES: usize = 3;

	pub fn new(region: SharedRegion, mode: MailboxMode) -> Self {
		let checksums = (0..region.slots())
			.map(|_| AtomicU32::new(0))
			.collect::<Vec<_>>()
			.into_boxed_slice();
		log::info!(
			"mailbox store over {} ({} slots, {:?})",
			region.name(),
			region.slots(),
			mode
		);
		Self {
			region,
			checksums,
			mode,
		}
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.region.slots()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[inline]
	pub fn mode(&self) -> MailboxMode {
		self.mode
	}

	pub fn region(&self) -> &SharedRegion {
		&self.region
	}

	fn slot(&self, index: usize) -> Result<(&AtomicU32, &AtomicU32), MailboxError> {
		match (self.region.slot(index), self.checksums.get(index)) {
			(Some(payload), Some(sum)) => Ok((payload, sum)),
			_ => Err(MailboxError::OutOfBounds {
				index,
				slots: self.len(),
			}),
		}
	}

	/// Store `message` in mailbox `index`
	pub fn dropoff(&self, index: usize, message: u32) -> Result<(), MailboxError> {
		let (payload, sum) = self.slot(index)?;
		if self.mode == MailboxMode::OneShot && payload.load(Ordering::Acquire) != 0 {
			return Err(MailboxError::Occupied(index));
		}
		payload.store(message, Ordering::Release);
		sum.store(checksum(message), Ordering::Release);
		Ok(())
	}

	/// Read mailbox `index`, verifying it against its checksum
	///
	/// A mismatch may be a drop-off caught halfway, so the slot is re-read a few
	/// times before it is reported as corrupted.
	pub fn pickup(&self, index: usize) -> Result<u32, MailboxError> {
		let (payload, sum) = self.slot(index)?;
		let value = Self::verified_load(payload, sum).ok_or(MailboxError::Corrupted(index))?;
		if self.mode == MailboxMode::Overwrite {
			return Ok(value);
		}
		if value == 0 {
			return Err(MailboxError::Empty(index));
		}
		// another reader may have consumed it in between
		payload
			.compare_exchange(value, 0, Ordering::AcqRel, Ordering::Acquire)
			.map_err(|_| MailboxError::Empty(index))?;
		sum.store(checksum(0), Ordering::Release);
		Ok(value)
	}

	fn verified_load(payload: &AtomicU32, sum: &AtomicU32) -> Option<u32> {
		for _ in 0..=Self::PICKUP_RETRIES {
			let value = payload.load(Ordering::Acquire);
			if checksum(value) == sum.load(Ordering::Acquire) {
				return Some(value);
			}
			hint::spin_loop();
		}
		None
	}
}

/// Pack up to four ASCII bytes into a slot value, first byte most significant
///
/// Unused low bytes stay zero, so `"bye"` becomes `0x62796500`.
pub fn pack_ascii(value: &str) -> Result<u32, MailboxError> {
	let bytes = value.as_bytes();
	if bytes.len() > 4 {
		return Err(MailboxError::ValueTooLong(value.to_owned()));
	}
	Ok(bytes
		.iter()
		.enumerate()
		.fold(0u32, |acc, (i, b)| acc | (*b as u32) << ((3 - i) * 8)))
}

/// Render a slot value as four characters, most significant byte first
///
/// Bytes that are not printable ASCII are shown as `.`.
pub fn render_ascii(value: u32) -> String {
	value
		.to_be_bytes()
		.iter()
		.map(|b| match b {
			0x20..=0x7e => *b as char,
			_ => '.',
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn store(slots: usize, mode: MailboxMode) -> MailboxStore {
		MailboxStore::new(SharedRegion::anonymous(slots).unwrap(), mode)
	}

	#[test]
	fn dropoff_then_pickup_returns_message() {
		let store = store(DEFAULT_SLOTS, MailboxMode::Overwrite);
		store.dropoff(5, 0x4142_4344).unwrap();
		assert_eq!(store.pickup(5).unwrap(), 0x4142_4344);
		assert_eq!(render_ascii(store.pickup(5).unwrap()), "ABCD");
	}

	#[test]
	fn untouched_mailbox_reads_zero() {
		let store = store(DEFAULT_SLOTS, MailboxMode::Overwrite);
		assert_eq!(checksum(0), 0);
		assert_eq!(store.pickup(900).unwrap(), 0);
	}

	#[test]
	fn out_of_range_mailboxes_fail() {
		let store = store(DEFAULT_SLOTS, MailboxMode::Overwrite);
		assert!(matches!(
			store.dropoff(DEFAULT_SLOTS, 1),
			Err(MailboxError::OutOfBounds { index: 1024, .. })
		));
		assert!(matches!(
			store.pickup(u16::MAX as usize),
			Err(MailboxError::OutOfBounds { .. })
		));
	}

	#[test]
	fn foreign_write_is_reported_as_corruption() {
		let store = store(16, MailboxMode::Overwrite);
		store.dropoff(8, 0xdead_beef).unwrap();
		// what the inspection tool does: payload only, no checksum
		store.region().write(8, pack_ascii("bye").unwrap()).unwrap();
		assert!(matches!(store.pickup(8), Err(MailboxError::Corrupted(8))));
	}

	#[test]
	fn one_shot_mailbox_is_consumed() {
		let store = store(16, MailboxMode::OneShot);
		assert!(matches!(store.pickup(4), Err(MailboxError::Empty(4))));
		store.dropoff(4, 0xdead_beef).unwrap();
		assert!(matches!(
			store.dropoff(4, 0xdead_beef),
			Err(MailboxError::Occupied(4))
		));
		assert_eq!(store.pickup(4).unwrap(), 0xdead_beef);
		assert!(matches!(store.pickup(4), Err(MailboxError::Empty(4))));
		// emptied slot accepts a new message
		store.dropoff(4, 7).unwrap();
		assert_eq!(store.pickup(4).unwrap(), 7);
	}

	#[test]
	fn ascii_packing() {
		assert_eq!(pack_ascii("ABCD").unwrap(), 0x4142_4344);
		assert_eq!(pack_ascii("bye").unwrap(), 0x6279_6500);
		assert_eq!(pack_ascii("").unwrap(), 0);
		assert!(matches!(
			pack_ascii("hello"),
			Err(MailboxError::ValueTooLong(_))
		));
		assert_eq!(render_ascii(0x6279_6500), "bye.");
	}
}
