//! This is the library module that provides the packet forwarding core:
//! Mbuf, Mempool and Port for moving frames, a bounds-checked frame view,
//! the MAC, ARP and LPM tables, and the forwarding strategies driven by `Engine`
//!
//! The NIC is reached only through the `Nic` trait, so the same engine runs over
//! OS interfaces (`DatalinkNic`) or purely in memory (`VirtualNic`)

pub mod apis;
pub mod config;
pub mod engine;
pub mod net;
pub mod tables;

pub use apis::*;
pub use config::{Config, ConfigError, StrategyKind};
pub use engine::{Engine, Stats, Strategy, Verdict};
