// pf state -> SessionTuple, dropping states that are not translated

use std::net::IpAddr;

use crate::types::{Endpoint, SessionKey, SessionTuple};

pub const AF_INET: u8 = libc::AF_INET as u8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
	In,
	Out,
}

impl Direction {
	// PF_IN = 1, PF_OUT = 2
	#[cfg(any(test, target_os = "freebsd"))]
	pub fn from_pf(dir: u8) -> Self {
		if dir == 2 {
			Direction::Out
		} else {
			Direction::In
		}
	}
}

/// One half of a pf state: addresses and ports, indexed [0] and [1], host order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateKey {
	pub addr: [IpAddr; 2],
	pub port: [u16; 2],
}

/// The parts of a kernel `pfsync_state` the tracker looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawState {
	pub af: u8,
	pub proto: u8,
	pub direction: Direction,
	pub wire: StateKey,
	pub stack: StateKey,
	pub creation: u32,
	pub expire: u32,
}

/// `None` for anything but an IPv4 state whose stack and wire keys differ.
pub fn decode(state: &RawState) -> Option<SessionTuple> {
	if state.af != AF_INET {
		return None;
	}
	let (src, dst, orig, trans) = match state.direction {
		Direction::Out => (1, 0, &state.stack, &state.wire),
		Direction::In => (0, 1, &state.wire, &state.stack),
	};
	let key = SessionKey {
		proto: state.proto,
		osrc: Endpoint::new(orig.addr[src], orig.port[src]),
		tsrc: Endpoint::new(trans.addr[src], trans.port[src]),
		odst: Endpoint::new(orig.addr[dst], orig.port[dst]),
		tdst: Endpoint::new(trans.addr[dst], trans.port[dst]),
	};
	if !key.is_translated() {
		return None;
	}
	Some(SessionTuple::new(key, state.creation.wrapping_add(state.expire)))
}
