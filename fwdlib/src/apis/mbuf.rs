//! The Mbuf structure owns one packet buffer borrowed from a `Mempool`
//!
//! Dropping an `Mbuf` hands the buffer back to its pool. The bytes visible through
//! `data` and `data_mut` stop at the received frame length

use std::{fmt, mem, sync::Arc};

use super::{mempool::PoolInner, MemoryError, Mempool};

pub struct Mbuf {
	buf: Box<[u8]>,
	data_len: usize,
	pool: Arc<PoolInner>,
}

impl Mbuf {
	pub fn new(mp: &Mempool) -> Result<Self, MemoryError> {
		match mp.inner().get() {
			Some(buf) => Ok(Self {
				buf,
				data_len: 0,
				pool: mp.inner().clone(),
			}),
			None => Err(MemoryError::NoBuf),
		}
	}

	/// Create a new message buffer from a byte array
	#[inline]
	pub fn from_bytes(data: &[u8], mp: &Mempool) -> Result<Self, MemoryError> {
		if data.len() > mp.buf_size() {
			return Err(MemoryError::TooLarge(data.len(), mp.buf_size()));
		}
		let mut mbuf = Mbuf::new(mp)?;
		mbuf.buf[..data.len()].copy_from_slice(data);
		mbuf.data_len = data.len();
		Ok(mbuf)
	}

	/// A second buffer from the same pool holding the same bytes
	#[inline]
	pub fn try_clone(&self) -> Result<Self, MemoryError> {
		let mut mbuf = Self {
			buf: self.pool.get().ok_or(MemoryError::NoBuf)?,
			data_len: 0,
			pool: self.pool.clone(),
		};
		mbuf.buf[..self.data_len].copy_from_slice(self.data());
		mbuf.data_len = self.data_len;
		Ok(mbuf)
	}

	/// The packet bytes
	#[inline]
	pub fn data(&self) -> &[u8] {
		&self.buf[..self.data_len]
	}

	/// The packet bytes, writable
	#[inline]
	pub fn data_mut(&mut self) -> &mut [u8] {
		&mut self.buf[..self.data_len]
	}

	/// Returns the buffer to its pool
	#[inline]
	pub fn free(self) {
		drop(self)
	}

	/// Frees the message buffers in bulk.
	pub fn free_bulk(mbufs: Vec<Mbuf>) {
		mbufs.into_iter().for_each(Mbuf::free);
	}
}

impl fmt::Debug for Mbuf {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("mbuf")
			.field("buf_len", &self.buf.len())
			.field("data_len", &self.data_len)
			.finish()
	}
}

impl Drop for Mbuf {
	fn drop(&mut self) {
		let buf = mem::take(&mut self.buf);
		self.pool.put(buf);
	}
}
