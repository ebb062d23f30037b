//! The Mempool hands out fixed size packet buffers and takes them back when an `Mbuf` drops
//!
//! The free list is a crossbeam `ArrayQueue`, so a pool can be shared across threads even
//! though the engine itself only ever touches it from its polling thread

use crossbeam::queue::ArrayQueue;
use std::{fmt, sync::Arc};

use super::MemoryError;

pub(crate) struct PoolInner {
	name: String,
	buf_size: usize,
	capacity: usize,
	free: ArrayQueue<Box<[u8]>>,
}

impl PoolInner {
	/// Returns a buffer to the free list
	#[inline]
	pub(crate) fn put(&self, buf: Box<[u8]>) {
		// a full free list means the buffer never came from here
		let _ = self.free.push(buf);
	}

	#[inline]
	pub(crate) fn get(&self) -> Option<Box<[u8]>> {
		self.free.pop()
	}
}

#[derive(Clone)]
pub struct Mempool {
	inner: Arc<PoolInner>,
}

impl Mempool {
	pub const RX_MBUF_DATA_SIZE: usize = 2048;
	pub const NUM_MBUFS: usize = 8191;

	pub fn new(name: &str, capacity: usize, buf_size: usize) -> Result<Self, MemoryError> {
		if capacity == 0 {
			return Err(MemoryError::Invalid(capacity));
		}
		if buf_size == 0 {
			return Err(MemoryError::Invalid(buf_size));
		}
		let free = ArrayQueue::new(capacity);
		for _ in 0..capacity {
			// cannot fail: exactly `capacity` pushes
			let _ = free.push(vec![0u8; buf_size].into_boxed_slice());
		}
		log::info!(
			"created mempool: {} ({} x {} bytes)",
			name,
			capacity,
			buf_size
		);
		Ok(Self {
			inner: Arc::new(PoolInner {
				name: name.to_owned(),
				buf_size,
				capacity,
				free,
			}),
		})
	}

	#[inline]
	pub(crate) fn inner(&self) -> &Arc<PoolInner> {
		&self.inner
	}

	/// Returns the name of the mempool
	#[inline]
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	#[inline]
	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}

	/// Size of every buffer in the pool
	#[inline]
	pub fn buf_size(&self) -> usize {
		self.inner.buf_size
	}

	/// Buffers currently available for allocation
	#[inline]
	pub fn available(&self) -> usize {
		self.inner.free.len()
	}
}

impl fmt::Debug for Mempool {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct(self.name())
			.field("capacity", &self.capacity())
			.field("available", &self.available())
			.field("buf_size", &self.buf_size())
			.finish()
	}
}
