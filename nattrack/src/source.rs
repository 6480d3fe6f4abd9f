// where snapshots of the pf state table come from
//
// The packet filter device is only there on FreeBSD. Everywhere else the
// tracker can be fed recorded snapshots in a pfctl-like text form.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::{IpAddr, SocketAddrV4};
use std::path::Path;

use crate::decode::{Direction, RawState, StateKey, AF_INET};
use crate::error::SourceError;

pub trait StateSource {
	/// Next snapshot, `Ok(None)` once the source has nothing more to give.
	fn fetch(&mut self) -> Result<Option<Vec<RawState>>, SourceError>;
	fn name(&self) -> &str;
	/// Whether the poll loop sleeps between fetches.
	fn paced(&self) -> bool {
		true
	}
}

#[cfg(target_os = "freebsd")]
pub fn open_device(path: &Path) -> Result<Box<dyn StateSource>, SourceError> {
	Ok(Box::new(pf::PfDevice::open(path)?))
}

#[cfg(not(target_os = "freebsd"))]
pub fn open_device(path: &Path) -> Result<Box<dyn StateSource>, SourceError> {
	Err(SourceError::Unsupported(format!(
		"{} needs the FreeBSD packet filter, use --replay on this platform",
		path.display()
	)))
}

/// `-` reads standard input.
pub fn open_replay(path: &Path) -> Result<ReplaySource<Box<dyn BufRead>>, SourceError> {
	if path == Path::new("-") {
		return Ok(ReplaySource::new(Box::new(BufReader::new(io::stdin())), "stdin"));
	}
	let file = File::open(path).map_err(|source| SourceError::Open { path: path.to_path_buf(), source })?;
	Ok(ReplaySource::new(Box::new(BufReader::new(file)), path.display().to_string()))
}

const SEPARATOR: &str = "---";

/// Snapshots recorded as text, one state per line:
///
/// ```text
/// [iface] proto osrc:port (tsrc:port) -> dst:port [age=secs] [...]
/// ```
///
/// `->` is an outbound state, `<-` an inbound one. A `---` line closes a
/// snapshot; blank lines and `#` comments are skipped.
pub struct ReplaySource<R> {
	reader: R,
	name: String,
	line: usize,
	done: bool,
}

impl<R: BufRead> ReplaySource<R> {
	pub fn new(reader: R, name: impl Into<String>) -> Self {
		ReplaySource { reader, name: name.into(), line: 0, done: false }
	}
}

impl<R: BufRead> StateSource for ReplaySource<R> {
	fn fetch(&mut self) -> Result<Option<Vec<RawState>>, SourceError> {
		if self.done {
			return Ok(None);
		}
		let mut states = Vec::new();
		let mut malformed = None;
		let mut any = false;
		let mut buf = String::new();
		loop {
			buf.clear();
			match self.reader.read_line(&mut buf) {
				Ok(0) => {
					self.done = true;
					if !any {
						return Ok(None);
					}
					break;
				}
				Ok(_) => {}
				Err(e) => {
					self.done = true;
					return Err(e.into());
				}
			}
			self.line += 1;

			let line = buf.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			any = true;
			if line == SEPARATOR {
				break;
			}
			// after a bad line, read on to the separator so the next snapshot starts clean
			if malformed.is_some() {
				continue;
			}
			match parse_state(line) {
				Ok(s) => states.push(s),
				Err(reason) => malformed = Some(SourceError::Malformed { line: self.line, reason }),
			}
		}
		match malformed {
			Some(e) => Err(e),
			None => Ok(Some(states)),
		}
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn paced(&self) -> bool {
		false
	}
}

fn parse_proto(s: &str) -> Result<u8, String> {
	match s {
		"icmp" => Ok(1),
		"tcp" => Ok(6),
		"udp" => Ok(17),
		"ipv6-icmp" | "icmp6" => Ok(58),
		_ => s.parse().map_err(|_| format!("unknown protocol `{}`", s)),
	}
}

fn parse_endpoint(s: &str) -> Result<(IpAddr, u16), String> {
	let sa: SocketAddrV4 = s.parse().map_err(|_| format!("bad endpoint `{}`", s))?;
	Ok((IpAddr::V4(*sa.ip()), sa.port()))
}

fn parse_state(line: &str) -> Result<RawState, String> {
	let tokens: Vec<&str> = line.split_whitespace().collect();
	let paren = tokens
		.iter()
		.position(|t| t.starts_with('('))
		.ok_or_else(|| "missing (translated) endpoint".to_string())?;
	if paren < 2 || tokens.len() < paren + 3 {
		return Err("expected `proto osrc (tsrc) -> dst`".to_string());
	}

	let proto = parse_proto(tokens[paren - 2])?;
	let osrc = parse_endpoint(tokens[paren - 1])?;
	let tsrc = parse_endpoint(tokens[paren].trim_start_matches('(').trim_end_matches(')'))?;
	let direction = match tokens[paren + 1] {
		"->" => Direction::Out,
		"<-" => Direction::In,
		other => return Err(format!("expected -> or <-, got `{}`", other)),
	};
	let dst = parse_endpoint(tokens[paren + 2])?;

	let mut creation = 0;
	for t in &tokens[paren + 3..] {
		if let Some(v) = t.strip_prefix("age=") {
			creation = v.parse().map_err(|_| format!("bad age `{}`", v))?;
		}
	}

	// same layout the kernel uses: outbound keys are indexed [dst, src]
	let (orig, trans) = match direction {
		Direction::Out => (
			StateKey { addr: [dst.0, osrc.0], port: [dst.1, osrc.1] },
			StateKey { addr: [dst.0, tsrc.0], port: [dst.1, tsrc.1] },
		),
		Direction::In => (
			StateKey { addr: [osrc.0, dst.0], port: [osrc.1, dst.1] },
			StateKey { addr: [tsrc.0, dst.0], port: [tsrc.1, dst.1] },
		),
	};
	let (wire, stack) = match direction {
		Direction::Out => (trans, orig),
		Direction::In => (orig, trans),
	};

	Ok(RawState { af: AF_INET, proto, direction, wire, stack, creation, expire: 0 })
}

#[cfg(target_os = "freebsd")]
mod pf {
	use std::fs::{File, OpenOptions};
	use std::mem;
	use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
	use std::os::unix::io::AsRawFd;
	use std::path::Path;
	use std::ptr;

	use log::debug;

	use super::StateSource;
	use crate::decode::{Direction, RawState, StateKey};
	use crate::error::SourceError;

	const AF_INET6: u8 = libc::AF_INET6 as u8;
	const PF_SK_WIRE: usize = 0;
	const PF_SK_STACK: usize = 1;

	#[repr(C)]
	pub struct PfiocStates {
		ps_len: libc::c_int,
		ps_buf: *mut libc::c_void,
	}

	nix::ioctl_readwrite!(diocgetstates, b'D', 25, PfiocStates);

	#[repr(C, packed)]
	#[derive(Clone, Copy)]
	struct PfsyncStateKey {
		addr: [[u8; 16]; 2],
		port: [u16; 2],
	}

	// per-peer TCP tracking, never read here
	#[repr(C, packed)]
	#[derive(Clone, Copy)]
	struct PfsyncStatePeer {
		_scrub: [u8; 8],
		_seqlo: u32,
		_seqhi: u32,
		_seqdiff: u32,
		_max_win: u16,
		_mss: u16,
		_state: u8,
		_wscale: u8,
		_pad: [u8; 6],
	}

	// struct pfsync_state as returned by DIOCGETSTATES, network byte order
	#[repr(C, packed)]
	#[derive(Clone, Copy)]
	struct PfsyncState {
		_id: u64,
		_ifname: [u8; 16],
		key: [PfsyncStateKey; 2],
		_src: PfsyncStatePeer,
		_dst: PfsyncStatePeer,
		_rt_addr: [u8; 16],
		_rule: u32,
		_anchor: u32,
		_nat_rule: u32,
		creation: u32,
		expire: u32,
		_packets: [[u32; 2]; 2],
		_bytes: [[u32; 2]; 2],
		_creatorid: u32,
		af: u8,
		proto: u8,
		direction: u8,
		_spare: [u8; 2],
		_log: u8,
		_state_flags: u8,
		_timeout: u8,
		_sync_flags: u8,
		_updates: u8,
	}

	const _: () = assert!(mem::size_of::<PfsyncState>() == 242);

	fn addr(af: u8, raw: [u8; 16]) -> IpAddr {
		if af == AF_INET6 {
			IpAddr::V6(Ipv6Addr::from(raw))
		} else {
			IpAddr::V4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))
		}
	}

	fn state_key(af: u8, k: PfsyncStateKey) -> StateKey {
		let addrs = k.addr;
		let ports = k.port;
		StateKey {
			addr: [addr(af, addrs[0]), addr(af, addrs[1])],
			port: [u16::from_be(ports[0]), u16::from_be(ports[1])],
		}
	}

	fn to_raw(s: &PfsyncState) -> RawState {
		let af = s.af;
		let keys = s.key;
		RawState {
			af,
			proto: s.proto,
			direction: Direction::from_pf(s.direction),
			wire: state_key(af, keys[PF_SK_WIRE]),
			stack: state_key(af, keys[PF_SK_STACK]),
			creation: u32::from_be(s.creation),
			expire: u32::from_be(s.expire),
		}
	}

	pub struct PfDevice {
		dev: File,
		name: String,
	}

	impl PfDevice {
		pub fn open(path: &Path) -> Result<Self, SourceError> {
			let dev = OpenOptions::new()
				.read(true)
				.write(true)
				.open(path)
				.map_err(|source| SourceError::Open { path: path.to_path_buf(), source })?;
			Ok(PfDevice { dev, name: path.display().to_string() })
		}

		// Grows the buffer until the kernel's reply fits with room to spare.
		fn fetch_states(&self) -> Result<Vec<RawState>, SourceError> {
			let header = mem::size_of::<PfiocStates>();
			let mut buf: Vec<u8> = Vec::new();
			let mut len: usize = 0;
			loop {
				if len > buf.len() {
					buf.try_reserve_exact(len - buf.len()).map_err(|_| SourceError::Alloc(len))?;
					buf.resize(len, 0);
				}
				let mut ps = PfiocStates {
					ps_len: len as libc::c_int,
					ps_buf: if len > 0 { buf.as_mut_ptr() as *mut libc::c_void } else { ptr::null_mut() },
				};
				unsafe { diocgetstates(self.dev.as_raw_fd(), &mut ps) }
					.map_err(|errno| SourceError::Fetch(errno.into()))?;

				let reply = ps.ps_len.max(0) as usize;
				if len > 0 && reply + header < len {
					buf.truncate(reply);
					break;
				}
				if reply == 0 {
					return Ok(Vec::new());
				}
				if len == 0 {
					len = reply;
				}
				len *= 2;
				debug!("growing state buffer to {} bytes", len);
			}

			let states = buf
				.chunks_exact(mem::size_of::<PfsyncState>())
				.map(|c| {
					let s = unsafe { ptr::read_unaligned(c.as_ptr() as *const PfsyncState) };
					to_raw(&s)
				})
				.collect();
			Ok(states)
		}
	}

	impl StateSource for PfDevice {
		fn fetch(&mut self) -> Result<Option<Vec<RawState>>, SourceError> {
			self.fetch_states().map(Some)
		}

		fn name(&self) -> &str {
			&self.name
		}
	}
}
