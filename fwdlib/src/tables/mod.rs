//! Lookup tables owned by the forwarding strategies
//!
//! None of them lock: a table belongs to exactly one strategy and only the worker
//! thread that runs the strategy touches it

mod arp;
mod lpm;
mod mac;

pub use arp::*;
pub use lpm::*;
pub use mac::*;

use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
	/// An identical prefix is already installed; the first insert stays
	#[error("route {}/{} already exists", prefix, len)]
	Conflict { prefix: Ipv4Addr, len: u8 },

	#[error("table is full ({} entries)", _0)]
	Capacity(usize),

	#[error("prefix length {} is longer than 32", _0)]
	BadPrefixLen(u8),

	/// A route points at a port with no router interface on it
	#[error("no interface on port {}", _0)]
	NoInterface(u16),
}
