//! TOML configuration
//!
//! Every section is optional. Left out, it provisions the same ports, addresses and
//! tables the lab topology expects: a router at `88:88:88:88:88:88` with one
//! interface per subnet, two static hosts behind the dead drop and so on.

use pnet::datalink::MacAddr;
use serde::{de, Deserialize, Deserializer};
use shm_mailbox::{MailboxError, MailboxMode, MailboxStore, SharedRegion};
use std::{
	fmt, fs,
	net::Ipv4Addr,
	path::{Path, PathBuf},
	str::FromStr,
};
use thiserror::Error;

use crate::{
	apis::{Mempool, Port},
	engine::{DeadDrop, Echo, Interface, LearningSwitch, Ping, Router, Strategy},
	net::SECRET_PORT,
	tables::{ArpTable, LpmTable, MacTable, TableError},
};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("couldn't read {}: {}", path.display(), source)]
	Io {
		path: PathBuf,
		source: std::io::Error,
	},
	#[error("bad config: {}", _0)]
	Parse(#[from] toml::de::Error),
	#[error("invalid config: {}", _0)]
	Invalid(String),
	#[error("provisioning failed: {}", _0)]
	Table(#[from] TableError),
	#[error("mailbox setup failed: {}", _0)]
	Mailbox(#[from] MailboxError),
}

fn de_mac<'de, D: Deserializer<'de>>(d: D) -> Result<MacAddr, D::Error> {
	let s = String::deserialize(d)?;
	s.parse()
		.map_err(|e| de::Error::custom(format!("bad mac address {:?}: {:?}", s, e)))
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
	Echo,
	Ping,
	Switch,
	Router,
	Deaddrop,
}

impl FromStr for StrategyKind {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"echo" => Ok(StrategyKind::Echo),
			"ping" => Ok(StrategyKind::Ping),
			"switch" => Ok(StrategyKind::Switch),
			"router" => Ok(StrategyKind::Router),
			"deaddrop" => Ok(StrategyKind::Deaddrop),
			_ => Err(ConfigError::Invalid(format!("unknown strategy {:?}", s))),
		}
	}
}

impl fmt::Display for StrategyKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			StrategyKind::Echo => "echo",
			StrategyKind::Ping => "ping",
			StrategyKind::Switch => "switch",
			StrategyKind::Router => "router",
			StrategyKind::Deaddrop => "deaddrop",
		};
		f.write_str(name)
	}
}

/// Top-level configuration
#[derive(Debug, Deserialize, Default)]
pub struct Config {
	#[serde(default)]
	pub engine: EngineConfig,
	#[serde(default)]
	pub switch: SwitchConfig,
	#[serde(default)]
	pub router: RouterConfig,
	#[serde(default)]
	pub deaddrop: DeadDropConfig,
	#[serde(default)]
	pub ping: PingConfig,
}

#[derive(Debug, Deserialize)]
pub struct EngineConfig {
	#[serde(default = "default_strategy")]
	pub strategy: StrategyKind,
	/// OS interfaces, one per port, in port order
	#[serde(default)]
	pub ports: Vec<String>,
	#[serde(default = "default_burst_size")]
	pub burst_size: usize,
	#[serde(default = "default_pool_size")]
	pub pool_size: usize,
	#[serde(default = "default_buf_size")]
	pub buf_size: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			strategy: default_strategy(),
			ports: Vec::new(),
			burst_size: default_burst_size(),
			pool_size: default_pool_size(),
			buf_size: default_buf_size(),
		}
	}
}

impl EngineConfig {
	pub fn mempool(&self) -> Result<Mempool, ConfigError> {
		Mempool::new("MBUF_POOL", self.pool_size, self.buf_size)
			.map_err(|e| ConfigError::Invalid(e.to_string()))
	}
}

#[derive(Debug, Deserialize)]
pub struct SwitchConfig {
	#[serde(default = "default_table_capacity")]
	pub capacity: usize,
	#[serde(default)]
	pub flood_multicast: bool,
}

impl Default for SwitchConfig {
	fn default() -> Self {
		Self {
			capacity: default_table_capacity(),
			flood_multicast: false,
		}
	}
}

impl SwitchConfig {
	pub fn build(&self) -> LearningSwitch {
		LearningSwitch::new(MacTable::new(self.capacity), self.flood_multicast)
	}
}

#[derive(Debug, Deserialize, Clone)]
pub struct InterfaceConfig {
	pub port: u16,
	#[serde(deserialize_with = "de_mac")]
	pub mac: MacAddr,
	pub ip: Ipv4Addr,
	#[serde(default = "default_subnet_len")]
	pub prefix_len: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArpEntryConfig {
	pub ip: Ipv4Addr,
	#[serde(deserialize_with = "de_mac")]
	pub mac: MacAddr,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouteConfig {
	pub prefix: Ipv4Addr,
	pub prefix_len: u8,
	pub port: u16,
	pub gateway: Option<Ipv4Addr>,
}

#[derive(Debug, Deserialize)]
pub struct RouterConfig {
	#[serde(default = "default_table_capacity")]
	pub capacity: usize,
	#[serde(default = "default_table_capacity")]
	pub arp_capacity: usize,
	#[serde(default = "default_interfaces")]
	pub interfaces: Vec<InterfaceConfig>,
	#[serde(default = "default_arp")]
	pub arp: Vec<ArpEntryConfig>,
	#[serde(default)]
	pub routes: Vec<RouteConfig>,
}

impl Default for RouterConfig {
	fn default() -> Self {
		Self {
			capacity: default_table_capacity(),
			arp_capacity: default_table_capacity(),
			interfaces: default_interfaces(),
			arp: default_arp(),
			routes: Vec::new(),
		}
	}
}

impl RouterConfig {
	pub fn build(&self) -> Result<Router, ConfigError> {
		let mut router = Router::new(LpmTable::new(self.capacity), ArpTable::new(self.arp_capacity));
		for iface in &self.interfaces {
			router.add_interface(Interface {
				port: iface.port,
				mac: iface.mac,
				ip: iface.ip,
				prefix_len: iface.prefix_len,
			})?;
		}
		for route in &self.routes {
			router.add_route(route.prefix, route.prefix_len, route.port, route.gateway)?;
			log::info!(
				"route {}/{} via port {}{}",
				route.prefix,
				route.prefix_len,
				route.port,
				route
					.gateway
					.map(|gw| format!(" gateway {}", gw))
					.unwrap_or_default()
			);
		}
		for entry in &self.arp {
			router.arp_mut().insert(entry.ip, entry.mac)?;
		}
		log::info!(
			"router: {} routes, {} arp entries",
			router.lpm().len(),
			router.arp().len()
		);
		Ok(router)
	}
}

#[derive(Debug, Deserialize, Clone)]
pub struct MacEntryConfig {
	#[serde(deserialize_with = "de_mac")]
	pub mac: MacAddr,
	pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct DeadDropConfig {
	#[serde(default = "default_shm_name")]
	pub shm_name: String,
	/// Map this file instead of the POSIX shared memory object
	pub shm_file: Option<PathBuf>,
	#[serde(default = "default_mailboxes")]
	pub mailboxes: usize,
	#[serde(default = "default_secret_port")]
	pub secret_port: u16,
	#[serde(default = "default_service_ip")]
	pub service_ip: Ipv4Addr,
	/// Answer secret traffic whatever its destination address
	#[serde(default)]
	pub any_destination: bool,
	#[serde(default)]
	pub one_shot: bool,
	#[serde(default = "default_mac_table")]
	pub mac_table: Vec<MacEntryConfig>,
}

impl Default for DeadDropConfig {
	fn default() -> Self {
		Self {
			shm_name: default_shm_name(),
			shm_file: None,
			mailboxes: default_mailboxes(),
			secret_port: default_secret_port(),
			service_ip: default_service_ip(),
			any_destination: false,
			one_shot: false,
			mac_table: default_mac_table(),
		}
	}
}

impl DeadDropConfig {
	/// Create (or attach to) the shared mailbox region
	pub fn open_store(&self) -> Result<MailboxStore, ConfigError> {
		let region = match &self.shm_file {
			Some(path) => SharedRegion::map_file(path, self.mailboxes, true)?,
			None => SharedRegion::create(&self.shm_name, self.mailboxes)?,
		};
		let mode = if self.one_shot {
			MailboxMode::OneShot
		} else {
			MailboxMode::Overwrite
		};
		log::info!(
			"{} mailboxes in {} ({:?} mode)",
			region.slots(),
			region.name(),
			mode
		);
		Ok(MailboxStore::new(region, mode))
	}

	pub fn build(&self, store: MailboxStore) -> Result<DeadDrop, ConfigError> {
		let mut macs = MacTable::new(self.mac_table.len().max(1));
		for entry in &self.mac_table {
			macs.learn(entry.mac, entry.port)?;
		}
		let service_ip = if self.any_destination {
			None
		} else {
			Some(self.service_ip)
		};
		Ok(DeadDrop::new(store, macs)
			.with_secret_port(self.secret_port)
			.with_service_ip(service_ip))
	}
}

#[derive(Debug, Deserialize)]
pub struct PingConfig {
	#[serde(default = "default_ping_prefix")]
	pub prefix: Ipv4Addr,
	#[serde(default = "default_ping_prefix_len")]
	pub prefix_len: u8,
}

impl Default for PingConfig {
	fn default() -> Self {
		Self {
			prefix: default_ping_prefix(),
			prefix_len: default_ping_prefix_len(),
		}
	}
}

impl PingConfig {
	pub fn build(&self) -> Ping {
		Ping::new(self.prefix, self.prefix_len)
	}
}

impl Config {
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_owned(),
			source,
		})?;
		raw.parse()
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		let invalid = |msg: String| Err(ConfigError::Invalid(msg));
		if self.engine.burst_size == 0 {
			return invalid("engine.burst_size must be at least 1".into());
		}
		if self.engine.pool_size == 0 || self.engine.buf_size == 0 {
			return invalid("engine.pool_size and engine.buf_size must be non-zero".into());
		}
		let mailboxes = self.deaddrop.mailboxes;
		if mailboxes == 0 || mailboxes > u16::MAX as usize + 1 {
			return invalid(format!(
				"deaddrop.mailboxes must be within 1..=65536, got {}",
				mailboxes
			));
		}
		let lens = self
			.router
			.interfaces
			.iter()
			.map(|i| i.prefix_len)
			.chain(self.router.routes.iter().map(|r| r.prefix_len))
			.chain(std::iter::once(self.ping.prefix_len));
		for len in lens {
			if len > 32 {
				return invalid(format!("prefix length {} is longer than 32", len));
			}
		}
		Ok(())
	}

	/// The strategy the engine section asks for, fully provisioned
	pub fn build_strategy(&self) -> Result<Box<dyn Strategy>, ConfigError> {
		let strategy: Box<dyn Strategy> = match self.engine.strategy {
			StrategyKind::Echo => Box::new(Echo),
			StrategyKind::Ping => Box::new(self.ping.build()),
			StrategyKind::Switch => Box::new(self.switch.build()),
			StrategyKind::Router => Box::new(self.router.build()?),
			StrategyKind::Deaddrop => {
				let store = self.deaddrop.open_store()?;
				Box::new(self.deaddrop.build(store)?)
			}
		};
		Ok(strategy)
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let config: Config = toml::from_str(s)?;
		config.validate()?;
		Ok(config)
	}
}

fn default_strategy() -> StrategyKind {
	StrategyKind::Echo
}

fn default_burst_size() -> usize {
	Port::RX_BURST_MAX
}

fn default_pool_size() -> usize {
	Mempool::NUM_MBUFS
}

fn default_buf_size() -> usize {
	Mempool::RX_MBUF_DATA_SIZE
}

fn default_table_capacity() -> usize {
	1024
}

fn default_subnet_len() -> u8 {
	24
}

fn default_interfaces() -> Vec<InterfaceConfig> {
	let router_mac = MacAddr::new(0x88, 0x88, 0x88, 0x88, 0x88, 0x88);
	[
		Ipv4Addr::new(10, 0, 0, 254),
		Ipv4Addr::new(192, 168, 1, 254),
		Ipv4Addr::new(172, 16, 0, 254),
	]
	.iter()
	.enumerate()
	.map(|(port, &ip)| InterfaceConfig {
		port: port as u16,
		mac: router_mac,
		ip,
		prefix_len: default_subnet_len(),
	})
	.collect()
}

fn default_arp() -> Vec<ArpEntryConfig> {
	vec![
		ArpEntryConfig {
			ip: Ipv4Addr::new(10, 0, 0, 1),
			mac: MacAddr::new(0x08, 0x01, 0, 0, 0x01, 0x11),
		},
		ArpEntryConfig {
			ip: Ipv4Addr::new(192, 168, 1, 1),
			mac: MacAddr::new(0x08, 0x02, 0, 0, 0x01, 0x11),
		},
		ArpEntryConfig {
			ip: Ipv4Addr::new(172, 16, 0, 1),
			mac: MacAddr::new(0x08, 0x03, 0, 0, 0x01, 0x11),
		},
	]
}

fn default_shm_name() -> String {
	shm_mailbox::DEFAULT_SHM_NAME.to_string()
}

fn default_mailboxes() -> usize {
	shm_mailbox::DEFAULT_SLOTS
}

fn default_secret_port() -> u16 {
	SECRET_PORT
}

fn default_service_ip() -> Ipv4Addr {
	DeadDrop::DEFAULT_SERVICE_IP
}

fn default_mac_table() -> Vec<MacEntryConfig> {
	vec![
		MacEntryConfig {
			mac: MacAddr::new(0x08, 0, 0, 0, 0x01, 0x11),
			port: 0,
		},
		MacEntryConfig {
			mac: MacAddr::new(0x08, 0, 0, 0, 0x02, 0x22),
			port: 1,
		},
	]
}

fn default_ping_prefix() -> Ipv4Addr {
	Ping::DEFAULT_PREFIX
}

fn default_ping_prefix_len() -> u8 {
	Ping::DEFAULT_PREFIX_LEN
}
