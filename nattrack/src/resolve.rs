// reverse name resolution for rendered addresses, LRU cached

use std::ffi::CStr;
use std::mem;
use std::net::IpAddr;

const CACHESIZE: usize = 1024;
// NI_MAXHOST from <netdb.h>
const MAXHOST: usize = 1025;

pub struct Resolver {
	cache: lru::LruCache<IpAddr, String>,
}

impl Resolver {
	pub fn new() -> Self {
		Resolver { cache: lru::LruCache::new(CACHESIZE) }
	}

	/// Host name for `addr`, or its numeric form when it has none.
	pub fn name(&mut self, addr: IpAddr) -> String {
		if let Some(name) = self.cache.get(&addr) {
			return name.clone();
		}
		let name = reverse_lookup(addr).unwrap_or_else(|| addr.to_string());
		self.cache.put(addr, name.clone());
		name
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.cache.len()
	}
}

impl Default for Resolver {
	fn default() -> Self {
		Resolver::new()
	}
}

fn reverse_lookup(addr: IpAddr) -> Option<String> {
	let mut host = [0 as libc::c_char; MAXHOST];
	let rc = match addr {
		IpAddr::V4(a) => {
			let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
			#[cfg(any(target_os = "freebsd", target_os = "macos"))]
			{
				sin.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
			}
			sin.sin_family = libc::AF_INET as libc::sa_family_t;
			sin.sin_addr = libc::in_addr { s_addr: u32::from(a).to_be() };
			unsafe {
				libc::getnameinfo(
					&sin as *const libc::sockaddr_in as *const libc::sockaddr,
					mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
					host.as_mut_ptr(),
					host.len() as _,
					std::ptr::null_mut(),
					0,
					libc::NI_NAMEREQD,
				)
			}
		}
		IpAddr::V6(a) => {
			let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
			#[cfg(any(target_os = "freebsd", target_os = "macos"))]
			{
				sin6.sin6_len = mem::size_of::<libc::sockaddr_in6>() as u8;
			}
			sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
			sin6.sin6_addr = libc::in6_addr { s6_addr: a.octets() };
			unsafe {
				libc::getnameinfo(
					&sin6 as *const libc::sockaddr_in6 as *const libc::sockaddr,
					mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
					host.as_mut_ptr(),
					host.len() as _,
					std::ptr::null_mut(),
					0,
					libc::NI_NAMEREQD,
				)
			}
		}
	};
	if rc != 0 {
		return None;
	}
	let name = unsafe { CStr::from_ptr(host.as_ptr()) };
	Some(name.to_string_lossy().into_owned())
}
