// Bob Jenkins' lookup3 word hash, seeded once per process

use crate::error::SeedError;
use crate::types::SessionKey;

#[inline]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
	*a = a.wrapping_sub(*c); *a ^= c.rotate_left(4);  *c = c.wrapping_add(*b);
	*b = b.wrapping_sub(*a); *b ^= a.rotate_left(6);  *a = a.wrapping_add(*c);
	*c = c.wrapping_sub(*b); *c ^= b.rotate_left(8);  *b = b.wrapping_add(*a);
	*a = a.wrapping_sub(*c); *a ^= c.rotate_left(16); *c = c.wrapping_add(*b);
	*b = b.wrapping_sub(*a); *b ^= a.rotate_left(19); *a = a.wrapping_add(*c);
	*c = c.wrapping_sub(*b); *c ^= b.rotate_left(4);  *b = b.wrapping_add(*a);
}

#[inline]
fn finish(a: &mut u32, b: &mut u32, c: &mut u32) {
	*c ^= *b; *c = c.wrapping_sub(b.rotate_left(14));
	*a ^= *c; *a = a.wrapping_sub(c.rotate_left(11));
	*b ^= *a; *b = b.wrapping_sub(a.rotate_left(25));
	*c ^= *b; *c = c.wrapping_sub(b.rotate_left(16));
	*a ^= *c; *a = a.wrapping_sub(c.rotate_left(4));
	*b ^= *a; *b = b.wrapping_sub(a.rotate_left(14));
	*c ^= *b; *c = c.wrapping_sub(b.rotate_left(24));
}

/// `hashword()` from lookup3.c over whole 32-bit words.
pub fn hash32(words: &[u32], seed: u32) -> u32 {
	let init = 0xdead_beef_u32
		.wrapping_add((words.len() as u32) << 2)
		.wrapping_add(seed);
	let (mut a, mut b, mut c) = (init, init, init);

	let mut k = words;
	while k.len() > 3 {
		a = a.wrapping_add(k[0]);
		b = b.wrapping_add(k[1]);
		c = c.wrapping_add(k[2]);
		mix(&mut a, &mut b, &mut c);
		k = &k[3..];
	}

	match k.len() {
		3 => {
			c = c.wrapping_add(k[2]);
			b = b.wrapping_add(k[1]);
			a = a.wrapping_add(k[0]);
		}
		2 => {
			b = b.wrapping_add(k[1]);
			a = a.wrapping_add(k[0]);
		}
		1 => a = a.wrapping_add(k[0]),
		_ => return c,
	}
	finish(&mut a, &mut b, &mut c);
	c
}

#[derive(Clone, Copy, Debug)]
pub struct Hasher {
	seed: u32,
}

impl Hasher {
	/// Seed drawn from the OS CSPRNG so bucket placement can't be predicted from outside.
	pub fn random() -> Result<Self, SeedError> {
		let mut buf = [0u8; 4];
		getrandom::getrandom(&mut buf)?;
		Ok(Hasher { seed: u32::from_ne_bytes(buf) })
	}

	#[cfg(test)]
	pub fn with_seed(seed: u32) -> Self {
		Hasher { seed }
	}

	pub fn hash(&self, key: &SessionKey) -> u32 {
		hash32(&key.words(), self.seed)
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::tests::sample;

#[test]
	fn test_empty_input() {
		// no words: the initial state is returned untouched
		assert_eq!(hash32(&[], 0), 0xdead_beef);
		assert_eq!(hash32(&[], 1), 0xdead_bef0);
	}

#[test]
	fn test_deterministic() {
		let words = [1u32, 2, 3, 4, 5, 6, 7];
		assert_eq!(hash32(&words, 42), hash32(&words, 42));
		assert_ne!(hash32(&words, 42), hash32(&words, 43));
	}

#[test]
	fn test_tail_lengths_differ() {
		// every tail length path is taken and the length feeds the initial state
		let words = [7u32; 6];
		let mut seen = Vec::new();
		for n in 1..=6 {
			let h = hash32(&words[..n], 0);
			assert!(!seen.contains(&h), "collision at length {}", n);
			seen.push(h);
		}
	}

#[test]
	fn test_single_bit_changes_output() {
		let mut words = [0u32; 19];
		let base = hash32(&words, 0x1234);
		words[18] = 1;
		assert_ne!(base, hash32(&words, 0x1234));
	}

#[test]
	fn test_key_hash_matches_words() {
		let h = Hasher::with_seed(9);
		let k = sample();
		assert_eq!(h.hash(&k), hash32(&k.words(), 9));
		assert_ne!(h.hash(&k), Hasher::with_seed(10).hash(&k));
	}

#[test]
	fn test_random_seed() {
		// three equal draws in a row is a 1 in 2^64 event
		let k = sample();
		let a = Hasher::random().unwrap().hash(&k);
		let b = Hasher::random().unwrap().hash(&k);
		let c = Hasher::random().unwrap().hash(&k);
		assert!(a != b || b != c);
	}
}
