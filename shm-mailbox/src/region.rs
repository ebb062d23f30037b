//! A fixed array of 32-bit slots living in memory that several processes can map
//!
//! The region is either a named POSIX shared memory object, a regular file or an
//! anonymous shared mapping. Slots are handed out as `AtomicU32` views over the
//! mapping so that readers and writers in different processes never tear a single
//! 4-byte value.

use std::{
	ffi::CString,
	fs::{File, OpenOptions},
	io,
	mem,
	os::unix::io::{AsRawFd, FromRawFd},
	path::Path,
	ptr::{self, NonNull},
	sync::atomic::{AtomicU32, Ordering},
};

use libc::{
	mmap, munmap, shm_open, MAP_ANONYMOUS, MAP_FAILED, MAP_SHARED, O_CREAT, O_RDWR, PROT_READ,
	PROT_WRITE,
};

use crate::MailboxError;

const SLOT_SZ: usize = mem::size_of::<u32>();

pub struct SharedRegion {
	base: NonNull<AtomicU32>,
	slots: usize,
	/// Mapped bytes, `slots * SLOT_SZ`
	len: usize,
	name: String,
}

// The mapping is only ever touched through atomics
unsafe impl Sync for SharedRegion {}
unsafe impl Send for SharedRegion {}

impl SharedRegion {
	const SHM_MODE: libc::mode_t = 0o666;

	/// Create (or attach to) the named shared memory object and size it for `slots` entries
	pub fn create(name: &str, slots: usize) -> Result<Self, MailboxError> {
		let len = Self::byte_len(slots)?;
		let file = Self::shm_file(name, O_CREAT | O_RDWR)?;
		file.set_len(len as u64)?;
		log::info!("created shared region {} with {} slots", name, slots);
		Self::map(&file, slots, name)
	}

	/// Attach to a named shared memory object that must already exist
	pub fn open(name: &str, slots: usize) -> Result<Self, MailboxError> {
		let len = Self::byte_len(slots)?;
		let file = Self::shm_file(name, O_RDWR)?;
		Self::check_len(&file, len)?;
		Self::map(&file, slots, name)
	}

	/// Map a regular file, growing it to fit when `create` is set
	pub fn map_file(path: &Path, slots: usize, create: bool) -> Result<Self, MailboxError> {
		let len = Self::byte_len(slots)?;
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(create)
			.open(path)?;
		if create && file.metadata()?.len() < len as u64 {
			file.set_len(len as u64)?;
		}
		Self::check_len(&file, len)?;
		Self::map(&file, slots, &path.display().to_string())
	}

	/// A zeroed region shared only with forked children of this process
	pub fn anonymous(slots: usize) -> Result<Self, MailboxError> {
		let len = Self::byte_len(slots)?;
		let addr = unsafe {
			mmap(
				ptr::null_mut(),
				len,
				PROT_READ | PROT_WRITE,
				MAP_SHARED | MAP_ANONYMOUS,
				-1,
				0,
			)
		};
		Self::from_addr(addr, slots, "anonymous")
	}

	fn shm_file(name: &str, flags: libc::c_int) -> Result<File, MailboxError> {
		if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
			return Err(MailboxError::BadName(name.to_owned()));
		}
		let cname = CString::new(name).map_err(|_| MailboxError::BadName(name.to_owned()))?;
		let fd = unsafe { shm_open(cname.as_ptr(), flags, Self::SHM_MODE) };
		if fd == -1 {
			return Err(io::Error::last_os_error().into());
		}
		// the File closes the descriptor once the mapping exists
		Ok(unsafe { File::from_raw_fd(fd) })
	}

	/// Size in bytes of a region of `slots` slots
	fn byte_len(slots: usize) -> Result<usize, MailboxError> {
		if slots == 0 {
			return Err(MailboxError::NoSlots);
		}
		slots
			.checked_mul(SLOT_SZ)
			.filter(|len| *len <= isize::MAX as usize)
			.ok_or(MailboxError::TooManySlots(slots))
	}

	fn check_len(file: &File, expected: usize) -> Result<(), MailboxError> {
		let found = file.metadata()?.len();
		if found < expected as u64 {
			let found = found as usize;
			return Err(MailboxError::TooSmall { found, expected });
		}
		Ok(())
	}

	fn map(file: &File, slots: usize, name: &str) -> Result<Self, MailboxError> {
		let len = Self::byte_len(slots)?;
		let addr = unsafe {
			mmap(
				ptr::null_mut(),
				len,
				PROT_READ | PROT_WRITE,
				MAP_SHARED,
				file.as_raw_fd(),
				0,
			)
		};
		Self::from_addr(addr, slots, name)
	}

	fn from_addr(addr: *mut libc::c_void, slots: usize, name: &str) -> Result<Self, MailboxError> {
		if addr == MAP_FAILED {
			let e = io::Error::last_os_error();
			log::error!("mmap of {} failed: {}", name, e);
			return Err(e.into());
		}
		match NonNull::new(addr as *mut AtomicU32) {
			Some(base) => Ok(Self {
				base,
				slots,
				len: slots * SLOT_SZ,
				name: name.to_owned(),
			}),
			None => Err(io::Error::new(io::ErrorKind::Other, "mmap returned null").into()),
		}
	}

	/// Number of slots in the region
	#[inline]
	pub fn slots(&self) -> usize {
		self.slots
	}

	#[inline]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The slot at `index`, or `None` when the index is outside the mapping
	#[inline]
	pub fn slot(&self, index: usize) -> Option<&AtomicU32> {
		if index >= self.slots {
			return None;
		}
		// in bounds of a live mapping; AtomicU32 has the layout of u32
		Some(unsafe { &*self.base.as_ptr().add(index) })
	}

	/// Read a slot
	pub fn read(&self, index: usize) -> Result<u32, MailboxError> {
		self.slot(index)
			.map(|s| s.load(Ordering::Acquire))
			.ok_or(MailboxError::OutOfBounds {
				index,
				slots: self.slots,
			})
	}

	/// Overwrite a slot
	pub fn write(&self, index: usize, value: u32) -> Result<(), MailboxError> {
		let slot = self.slot(index).ok_or(MailboxError::OutOfBounds {
			index,
			slots: self.slots,
		})?;
		slot.store(value, Ordering::Release);
		Ok(())
	}
}

impl Drop for SharedRegion {
	fn drop(&mut self) {
		unsafe {
			munmap(self.base.as_ptr() as *mut libc::c_void, self.len);
		}
	}
}
