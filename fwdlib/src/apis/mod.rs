//! This module defines the buffer and port structures the engine moves packets with
//!
//! Errors related to buffer and port operations
//!
//! The NIC itself sits behind the `Nic` trait; `VirtualNic` and `DatalinkNic` are the
//! two backends shipped with the library

mod datalink;
mod mbuf;
mod mempool;
mod port;
mod vdev;

pub use datalink::*;
pub use mbuf::*;
pub use mempool::*;
pub use port::*;
pub use vdev::*;

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
	#[error("pool size {} is not usable", _0)]
	Invalid(usize),
	#[error("not enough memory")]
	NoBuf,
	#[error("frame of {} bytes does not fit a {} byte buffer", _0, _1)]
	TooLarge(usize, usize),
}

#[derive(Error, Debug)]
pub enum PortError {
	#[error("No such device: {}", _0)]
	NoDevice(String),
	#[error("function not supported on this device: {}", _0)]
	NoSupport(String),
	#[error("No such port {}", _0)]
	BadPort(u16),
	#[error("at least one port is required")]
	NoPorts,
	#[error("receive ring of port {} is full", _0)]
	RingFull(u16),
	#[error("Memory Error: {}", _0)]
	Memory(#[from] MemoryError),
	#[error("I/O error: {}", _0)]
	Io(#[from] io::Error),
}
