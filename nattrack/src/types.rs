// types in use

use std::fmt;
use std::net::IpAddr;


#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Endpoint {
	pub addr: IpAddr,
	pub port: u16,
}

impl Endpoint {
	pub fn new(addr: impl Into<IpAddr>, port: u16) -> Self {
		Endpoint { addr: addr.into(), port }
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.addr {
			IpAddr::V4(a) => write!(f, "{}:{}", a, self.port),
			IpAddr::V6(a) => write!(f, "[{}]:{}", a, self.port),
		}
	}
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Family {
	Inet,
	Inet6,
}

impl Family {
	pub fn of(addr: &IpAddr) -> Self {
		match addr {
			IpAddr::V4(_) => Family::Inet,
			IpAddr::V6(_) => Family::Inet6,
		}
	}

	pub fn code(self) -> u32 {
		match self {
			Family::Inet => libc::AF_INET as u32,
			Family::Inet6 => libc::AF_INET6 as u32,
		}
	}
}

/// Identity of a translated connection: everything but the duration.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct SessionKey {
	pub proto: u8,
	pub osrc: Endpoint,
	pub tsrc: Endpoint,
	pub odst: Endpoint,
	pub tdst: Endpoint,
}

impl SessionKey {
	/// Width of `words()`: four 128-bit address slots, two port pairs, family+proto.
	pub const WORDS: usize = 19;

	pub fn family(&self) -> Family {
		Family::of(&self.osrc.addr)
	}

	pub fn is_translated(&self) -> bool {
		self.osrc != self.tsrc || self.odst != self.tdst
	}

	/// Fixed-width word encoding of the identity fields, the hash input.
	/// IPv4 addresses occupy the first word of their slot, the rest stays zero.
	pub fn words(&self) -> [u32; Self::WORDS] {
		let mut w = [0u32; Self::WORDS];
		for (slot, ep) in [self.osrc, self.tsrc, self.odst, self.tdst].iter().enumerate() {
			let at = slot * 4;
			match ep.addr {
				IpAddr::V4(a) => w[at] = u32::from(a),
				IpAddr::V6(a) => {
					for (i, chunk) in a.octets().chunks_exact(4).enumerate() {
						w[at + i] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
					}
				}
			}
		}
		w[16] = (self.osrc.port as u32) << 16 | self.tsrc.port as u32;
		w[17] = (self.odst.port as u32) << 16 | self.tdst.port as u32;
		w[18] = self.family().code() << 8 | self.proto as u32;
		w
	}
}

/// A session as reported by one snapshot. Equality ignores `duration`.
#[derive(Clone, Copy, Debug)]
pub struct SessionTuple {
	pub key: SessionKey,
	pub duration: u32,
}

impl SessionTuple {
	pub fn new(key: SessionKey, duration: u32) -> Self {
		SessionTuple { key, duration }
	}
}

impl PartialEq for SessionTuple {
	fn eq(&self, other: &Self) -> bool {
		self.key == other.key
	}
}

impl Eq for SessionTuple {}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Lifecycle {
	New,
	Expired,
	Flushed,
}

impl Lifecycle {
	pub fn as_str(self) -> &'static str {
		match self {
			Lifecycle::New => "new",
			Lifecycle::Expired => "expired",
			Lifecycle::Flushed => "flushed",
		}
	}
}

impl fmt::Display for Lifecycle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
