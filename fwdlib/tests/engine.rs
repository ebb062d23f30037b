use etherparse::PacketBuilder;
use fwdlib::{
	config::{DeadDropConfig, RouterConfig},
	engine::{DeadDrop, DropReason, Echo, LearningSwitch, Ping, Router},
	net::{FrameView, Opcode, SecretHeader, SECRET_PORT},
	tables::MacTable,
	Engine, Mempool, Strategy, VirtualNic,
};
use pnet::{
	datalink::MacAddr,
	packet::{
		arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket},
		ethernet::{EtherTypes, MutableEthernetPacket},
		MutablePacket,
	},
};
use shm_mailbox::{MailboxMode, MailboxStore, SharedRegion};
use std::net::Ipv4Addr;

const H1: [u8; 6] = [0x08, 0x01, 0x00, 0x00, 0x01, 0x11];
const H2: [u8; 6] = [0x08, 0x02, 0x00, 0x00, 0x01, 0x11];
const RTR: [u8; 6] = [0x88; 6];

fn mac(b: [u8; 6]) -> MacAddr {
	MacAddr::new(b[0], b[1], b[2], b[3], b[4], b[5])
}

fn engine<S: Strategy>(ports: u16, strategy: S) -> Engine<VirtualNic, S> {
	let mp = Mempool::new("test", 64, Mempool::RX_MBUF_DATA_SIZE).unwrap();
	Engine::new(VirtualNic::new(ports, 16, mp).unwrap(), strategy)
}

fn udp(src: [u8; 6], dst: [u8; 6], ip_src: [u8; 4], ip_dst: [u8; 4], ports: (u16, u16), payload: &[u8]) -> Vec<u8> {
	let builder = PacketBuilder::ethernet2(src, dst)
		.ipv4(ip_src, ip_dst, 64)
		.udp(ports.0, ports.1);
	let mut out = Vec::with_capacity(builder.size(payload.len()));
	builder.write(&mut out, payload).unwrap();
	out
}

fn icmp_echo(src: [u8; 6], dst: [u8; 6], ip_src: [u8; 4], ip_dst: [u8; 4], ttl: u8, reply: bool) -> Vec<u8> {
	let ip = PacketBuilder::ethernet2(src, dst).ipv4(ip_src, ip_dst, ttl);
	let payload = b"abcdefgh";
	let mut out = Vec::new();
	if reply {
		ip.icmpv4_echo_reply(7, 1).write(&mut out, payload).unwrap();
	} else {
		ip.icmpv4_echo_request(7, 1).write(&mut out, payload).unwrap();
	}
	out
}

fn arp_request(sender_mac: [u8; 6], sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
	let mut buf = vec![0u8; 42];
	{
		let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
		eth.set_destination(MacAddr::broadcast());
		eth.set_source(mac(sender_mac));
		eth.set_ethertype(EtherTypes::Arp);
		let mut arp = MutableArpPacket::new(eth.payload_mut()).unwrap();
		arp.set_hardware_type(ArpHardwareTypes::Ethernet);
		arp.set_protocol_type(EtherTypes::Ipv4);
		arp.set_hw_addr_len(6);
		arp.set_proto_addr_len(4);
		arp.set_operation(ArpOperations::Request);
		arp.set_sender_hw_addr(mac(sender_mac));
		arp.set_sender_proto_addr(sender_ip);
		arp.set_target_hw_addr(MacAddr::zero());
		arp.set_target_proto_addr(target_ip);
	}
	buf
}

fn secret(opcode: u16, mailbox: u16, message: u32) -> Vec<u8> {
	let hdr = SecretHeader {
		opcode,
		mailbox,
		message,
	};
	udp(
		[0x08, 0, 0, 0, 0x01, 0x11],
		[0x08, 0, 0, 0, 0x02, 0x22],
		[10, 0, 0, 1],
		[10, 0, 0, 254],
		(SECRET_PORT, SECRET_PORT),
		&hdr.to_bytes(),
	)
}

fn reply_header(frame: &[u8]) -> SecretHeader {
	let view = FrameView::parse(frame).unwrap();
	view.ipv4().unwrap().udp().unwrap().secret().unwrap()
}

fn deaddrop() -> DeadDrop {
	let store = MailboxStore::new(SharedRegion::anonymous(1024).unwrap(), MailboxMode::Overwrite);
	DeadDropConfig::default().build(store).unwrap()
}

#[test]
fn echo_returns_ipv4_on_ingress_port() {
	let mut engine = engine(2, Echo);
	let frame = udp(H1, H2, [10, 0, 0, 1], [10, 0, 0, 2], (1000, 2000), b"hello");
	engine.nic().inject(1, &frame).unwrap();
	engine.nic().inject(1, &arp_request(H1, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2))).unwrap();
	engine.poll_round();
	assert_eq!(engine.nic().take_tx(1), vec![frame]);
	assert!(engine.nic().take_tx(0).is_empty());
	assert_eq!(engine.stats().dropped(DropReason::NotIpv4), 1);
}

#[test]
fn unknown_destination_floods_all_but_ingress() {
	let mut engine = engine(3, LearningSwitch::default());
	let frame = udp(H1, H2, [10, 0, 0, 1], [10, 0, 0, 2], (1, 2), &[]);
	engine.nic().inject(0, &frame).unwrap();
	engine.poll_round();
	assert!(engine.nic().take_tx(0).is_empty());
	assert_eq!(engine.nic().take_tx(1), vec![frame.clone()]);
	assert_eq!(engine.nic().take_tx(2), vec![frame]);
}

#[test]
fn switch_learns_and_migrates() {
	let mut engine = engine(3, LearningSwitch::default());
	let to_h2 = udp(H1, H2, [10, 0, 0, 1], [10, 0, 0, 2], (1, 2), &[]);
	let to_h1 = udp(H2, H1, [10, 0, 0, 2], [10, 0, 0, 1], (2, 1), &[]);

	engine.nic().inject(0, &to_h2).unwrap();
	engine.poll_round();
	engine.nic().take_tx(1);
	engine.nic().take_tx(2);

	engine.nic().inject(2, &to_h1).unwrap();
	engine.poll_round();
	assert_eq!(engine.nic().take_tx(0), vec![to_h1.clone()]);
	assert!(engine.nic().take_tx(1).is_empty());

	// H1 shows up behind port 1 now
	engine.nic().inject(1, &to_h2).unwrap();
	engine.poll_round();
	assert_eq!(engine.nic().take_tx(2), vec![to_h2]);
	engine.nic().inject(2, &to_h1).unwrap();
	engine.poll_round();
	assert_eq!(engine.nic().take_tx(1), vec![to_h1]);
	assert_eq!(engine.strategy().table().lookup(mac(H1)), Some(1));
}

fn router() -> Router {
	RouterConfig::default().build().unwrap()
}

#[test]
fn router_rewrites_and_forwards() {
	let mut engine = engine(3, router());
	let pkt = icmp_echo(H1, RTR, [10, 0, 0, 1], [192, 168, 1, 1], 64, false);
	let expected = icmp_echo(RTR, H2, [10, 0, 0, 1], [192, 168, 1, 1], 63, false);
	engine.nic().inject(0, &pkt).unwrap();
	engine.poll_round();
	assert_eq!(engine.nic().take_tx(1), vec![expected]);
	assert!(engine.nic().take_tx(0).is_empty());
	assert!(engine.nic().take_tx(2).is_empty());
}

#[test]
fn router_drops_what_it_cannot_route() {
	let mut engine = engine(3, router());
	// no route
	engine.nic().inject(0, &icmp_echo(H1, RTR, [10, 0, 0, 1], [8, 8, 8, 8], 64, false)).unwrap();
	// no arp entry for this host
	engine.nic().inject(0, &icmp_echo(H1, RTR, [10, 0, 0, 1], [172, 16, 0, 9], 64, false)).unwrap();
	// ttl runs out here
	engine.nic().inject(0, &icmp_echo(H1, RTR, [10, 0, 0, 1], [192, 168, 1, 1], 1, false)).unwrap();
	// not sent to the router's mac
	engine.nic().inject(0, &icmp_echo(H1, H2, [10, 0, 0, 1], [192, 168, 1, 1], 64, false)).unwrap();
	engine.poll_round();
	for port in 0..3 {
		assert!(engine.nic().take_tx(port).is_empty());
	}
	let stats = engine.stats();
	assert_eq!(stats.dropped(DropReason::NoRoute), 1);
	assert_eq!(stats.dropped(DropReason::Unresolved), 1);
	assert_eq!(stats.dropped(DropReason::TtlExpired), 1);
	assert_eq!(stats.dropped(DropReason::NotForUs), 1);
	assert_eq!(engine.nic().mempool().available(), 64);
}

#[test]
fn router_answers_arp_for_its_addresses() {
	let mut engine = engine(3, router());
	let req = arp_request(H2, Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 254));
	engine.nic().inject(1, &req).unwrap();
	engine.nic().inject(1, &arp_request(H2, Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 77))).unwrap();
	// the port 0 interface does not answer on port 1
	engine.nic().inject(1, &arp_request(H2, Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(10, 0, 0, 254))).unwrap();
	engine.poll_round();

	let out = engine.nic().take_tx(1);
	assert_eq!(out.len(), 1);
	assert_eq!(&out[0][0..6], &H2);
	assert_eq!(&out[0][6..12], &RTR);
	let arp = ArpPacket::new(&out[0][14..]).unwrap();
	assert_eq!(arp.get_operation(), ArpOperations::Reply);
	assert_eq!(arp.get_sender_hw_addr(), mac(RTR));
	assert_eq!(arp.get_sender_proto_addr(), Ipv4Addr::new(192, 168, 1, 254));
	assert_eq!(arp.get_target_hw_addr(), mac(H2));
	assert_eq!(arp.get_target_proto_addr(), Ipv4Addr::new(192, 168, 1, 1));
}

#[test]
fn deaddrop_dropoff_then_pickup() {
	let mut engine = engine(2, deaddrop());
	engine.nic().inject(0, &secret(Opcode::Dropoff as u16, 5, 0x4142_4344)).unwrap();
	engine.nic().inject(0, &secret(Opcode::Pickup as u16, 5, 0)).unwrap();
	engine.nic().inject(0, &secret(Opcode::Pickup as u16, 900, 0)).unwrap();
	engine.poll_round();

	let out = engine.nic().take_tx(0);
	assert_eq!(out.len(), 3);
	assert_eq!(reply_header(&out[0]), SecretHeader::new(Opcode::Success, 5, 0x4142_4344));
	assert_eq!(reply_header(&out[1]), SecretHeader::new(Opcode::Success, 5, 0x4142_4344));
	assert_eq!(reply_header(&out[2]), SecretHeader::new(Opcode::Success, 900, 0));

	// addresses swapped, udp checksum cleared
	let view = FrameView::parse(&out[0]).unwrap();
	assert_eq!(view.dst_mac(), MacAddr::new(0x08, 0, 0, 0, 0x01, 0x11));
	assert_eq!(view.src_mac(), MacAddr::new(0x08, 0, 0, 0, 0x02, 0x22));
	let ip = view.ipv4().unwrap();
	assert_eq!(ip.src(), Ipv4Addr::new(10, 0, 0, 254));
	assert_eq!(ip.dst(), Ipv4Addr::new(10, 0, 0, 1));
	assert_eq!(ip.udp().unwrap().checksum(), 0);
	assert_eq!(ip.udp().unwrap().src_port(), SECRET_PORT);
}

#[test]
fn deaddrop_ignores_padding_after_a_short_request() {
	let mut engine = engine(2, deaddrop());
	engine.nic().inject(0, &secret(Opcode::Dropoff as u16, 5, 0x4142_4344)).unwrap();
	let mut short = udp(
		[0x08, 0, 0, 0, 0x01, 0x11],
		[0x08, 0, 0, 0, 0x02, 0x22],
		[10, 0, 0, 1],
		[10, 0, 0, 254],
		(SECRET_PORT, SECRET_PORT),
		&[0, 1, 0, 5],
	);
	short.resize(60, 0);
	engine.nic().inject(0, &short).unwrap();
	engine.nic().inject(0, &secret(Opcode::Pickup as u16, 5, 0)).unwrap();
	engine.poll_round();

	let out = engine.nic().take_tx(0);
	assert_eq!(out.len(), 2);
	assert_eq!(reply_header(&out[1]), SecretHeader::new(Opcode::Success, 5, 0x4142_4344));
	assert_eq!(engine.stats().dropped(DropReason::Malformed), 1);
	assert_eq!(engine.nic().mempool().available(), 64);
}

#[test]
fn deaddrop_rejects_out_of_range_mailboxes() {
	let mut engine = engine(2, deaddrop());
	engine.nic().inject(1, &secret(Opcode::Dropoff as u16, 1024, 0x4142_4344)).unwrap();
	engine.nic().inject(1, &secret(Opcode::Pickup as u16, 4000, 0)).unwrap();
	engine.poll_round();
	let out = engine.nic().take_tx(1);
	assert_eq!(reply_header(&out[0]), SecretHeader::new(Opcode::Failure, 1024, 0x4142_4344));
	assert_eq!(reply_header(&out[1]), SecretHeader::new(Opcode::Failure, 4000, 0));
}

#[test]
fn deaddrop_keeps_going_after_non_ipv4() {
	let mut engine = engine(2, deaddrop());
	let arp = arp_request(H1, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 254));
	engine.nic().inject(0, &arp).unwrap();
	engine.nic().inject(0, &secret(Opcode::Dropoff as u16, 1, 0x5a5a_5a5a)).unwrap();
	engine.poll_round();
	let out = engine.nic().take_tx(0);
	assert_eq!(out.len(), 1);
	assert_eq!(reply_header(&out[0]), SecretHeader::new(Opcode::Success, 1, 0x5a5a_5a5a));
	assert_eq!(engine.stats().dropped(DropReason::NotIpv4), 1);
}

#[test]
fn deaddrop_forwards_plain_traffic_by_static_table() {
	let mut engine = engine(2, deaddrop());
	let known = udp(
		[0x08, 0, 0, 0, 0x01, 0x11],
		[0x08, 0, 0, 0, 0x02, 0x22],
		[10, 0, 0, 1],
		[10, 0, 0, 2],
		(5000, 5001),
		b"plain",
	);
	let unknown = udp(H1, H2, [10, 0, 0, 1], [10, 0, 0, 2], (5000, 5001), b"plain");
	// secret ports but not addressed to the service
	let elsewhere = udp(
		[0x08, 0, 0, 0, 0x02, 0x22],
		[0x08, 0, 0, 0, 0x01, 0x11],
		[10, 0, 0, 2],
		[10, 0, 0, 1],
		(SECRET_PORT, SECRET_PORT),
		&SecretHeader::new(Opcode::Pickup, 1, 0).to_bytes(),
	);
	engine.nic().inject(0, &known).unwrap();
	engine.nic().inject(0, &unknown).unwrap();
	engine.nic().inject(1, &elsewhere).unwrap();
	engine.poll_round();
	assert_eq!(engine.nic().take_tx(1), vec![known]);
	assert_eq!(engine.nic().take_tx(0), vec![elsewhere]);
	assert_eq!(engine.stats().dropped(DropReason::UnknownDestination), 1);
}

#[test]
fn one_shot_mailboxes() {
	let store = MailboxStore::new(SharedRegion::anonymous(16).unwrap(), MailboxMode::OneShot);
	let mut engine = engine(1, DeadDrop::new(store, MacTable::default()));
	for req in &[
		secret(Opcode::Dropoff as u16, 2, 0x4142_4344),
		secret(Opcode::Dropoff as u16, 2, 0x4545_4545),
		secret(Opcode::Pickup as u16, 2, 0),
		secret(Opcode::Pickup as u16, 2, 0),
	] {
		engine.nic().inject(0, req).unwrap();
	}
	engine.poll_round();
	let replies = engine
		.nic()
		.take_tx(0)
		.iter()
		.map(|f| reply_header(f))
		.collect::<Vec<_>>();
	assert_eq!(
		replies,
		vec![
			SecretHeader::new(Opcode::Success, 2, 0x4142_4344),
			SecretHeader::new(Opcode::Failure, 2, 0x4545_4545),
			SecretHeader::new(Opcode::Success, 2, 0x4142_4344),
			SecretHeader::new(Opcode::Failure, 2, 0),
		]
	);
}

#[test]
fn ping_answers_inside_prefix_only() {
	let mut engine = engine(1, Ping::default());
	let src = [0x00, 0x11, 0x11, 0x11, 0x11, 0x11];
	let dst = [0x00, 0x22, 0x22, 0x22, 0x22, 0x22];
	engine.nic().inject(0, &icmp_echo(src, dst, [10, 0, 0, 1], [10, 222, 222, 222], 64, false)).unwrap();
	engine.nic().inject(0, &icmp_echo(src, dst, [10, 0, 0, 1], [33, 33, 33, 33], 64, false)).unwrap();
	engine.nic().inject(0, &udp(src, dst, [10, 0, 0, 1], [10, 1, 1, 1], (7, 7), b"x")).unwrap();
	engine.poll_round();
	let expected = icmp_echo(dst, src, [10, 222, 222, 222], [10, 0, 0, 1], 64, true);
	assert_eq!(engine.nic().take_tx(0), vec![expected]);
	assert_eq!(engine.stats().dropped(DropReason::NotForUs), 1);
	assert_eq!(engine.stats().dropped(DropReason::Unsupported), 1);
}

#[test]
fn boxed_strategy_from_config() {
	let config: fwdlib::Config = "[engine]\nstrategy = \"switch\"".parse().unwrap();
	let mut engine = engine(2, config.build_strategy().unwrap());
	assert_eq!(engine.strategy().name(), "switch");
	engine.nic().inject(0, &[0u8; 8]).unwrap();
	engine.poll_round();
	assert_eq!(engine.stats().dropped(DropReason::Malformed), 1);
}
