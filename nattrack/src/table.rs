// Fixed-size hash table of live NAT sessions.
//
// Each bucket is a list of SessionEntry nodes; an entry lives in bucket
// `hash(key) & mask` for its whole life and the table never rehashes.

use crate::arena::{Arena, Index};
use crate::hash::Hasher;
use crate::list::{Linked, Links, List};
use crate::tracker::EpochNode;
use crate::types::{SessionKey, SessionTuple};

pub const DEFAULT_BUCKETS: usize = 32768;

pub type EntryId = Index<SessionEntry>;

/// Bucket count for a configured hint: powers of two are taken as-is.
pub fn bucket_count(hint: usize) -> usize {
	if hint == 0 || !hint.is_power_of_two() {
		DEFAULT_BUCKETS
	} else {
		hint
	}
}

pub struct SessionEntry {
	tuple: SessionTuple,
	bucket: usize,
	links: Links<SessionEntry>,
	pub(crate) twin: Option<Index<EpochNode>>,
}

impl SessionEntry {
	pub fn tuple(&self) -> &SessionTuple {
		&self.tuple
	}

	#[cfg(test)]
	pub fn key(&self) -> &SessionKey {
		&self.tuple.key
	}

	#[cfg(test)]
	pub fn bucket(&self) -> usize {
		self.bucket
	}

	pub(crate) fn set_duration(&mut self, duration: u32) {
		self.tuple.duration = duration;
	}
}

impl Linked for SessionEntry {
	fn links(&self) -> &Links<Self> {
		&self.links
	}
	fn links_mut(&mut self) -> &mut Links<Self> {
		&mut self.links
	}
}

pub struct SessionTable {
	hasher: Hasher,
	mask: usize,
	buckets: Vec<List<SessionEntry>>,
	entries: Arena<SessionEntry>,
}

impl SessionTable {
	pub fn new(hasher: Hasher, hint: usize) -> Self {
		let n = bucket_count(hint);
		let mut buckets = Vec::with_capacity(n);
		buckets.resize_with(n, List::new);
		SessionTable { hasher, mask: n - 1, buckets, entries: Arena::new() }
	}

	pub fn capacity(&self) -> usize {
		self.buckets.len()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[cfg(test)]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn bucket_for(&self, key: &SessionKey) -> usize {
		self.hasher.hash(key) as usize & self.mask
	}

	#[cfg(test)]
	pub fn find(&self, key: &SessionKey) -> Option<EntryId> {
		self.find_in_bucket(self.bucket_for(key), key)
	}

	/// Scans one bucket comparing full keys; colliding hashes never match by accident.
	pub fn find_in_bucket(&self, bucket: usize, key: &SessionKey) -> Option<EntryId> {
		self.buckets
			.get(bucket)?
			.find(&self.entries, |e| e.tuple.key == *key)
	}

	#[cfg(test)]
	pub fn insert(&mut self, tuple: SessionTuple) -> EntryId {
		let bucket = self.bucket_for(&tuple.key);
		self.insert_in_bucket(bucket, tuple)
	}

	/// `bucket` must be `bucket_for(&tuple.key)`; the caller has it from the lookup.
	pub fn insert_in_bucket(&mut self, bucket: usize, tuple: SessionTuple) -> EntryId {
		debug_assert_eq!(bucket, self.bucket_for(&tuple.key));
		let id = self.entries.insert(SessionEntry {
			tuple,
			bucket,
			links: Links::default(),
			twin: None,
		});
		self.buckets[bucket].push_front(&mut self.entries, id);
		id
	}

	pub fn remove(&mut self, id: EntryId) -> Option<SessionEntry> {
		let bucket = self.entries.get(id)?.bucket;
		self.buckets[bucket].unlink(&mut self.entries, id);
		self.entries.remove(id)
	}

	pub fn get(&self, id: EntryId) -> Option<&SessionEntry> {
		self.entries.get(id)
	}

	pub fn get_mut(&mut self, id: EntryId) -> Option<&mut SessionEntry> {
		self.entries.get_mut(id)
	}

	/// Every live entry with the index of the bucket it is linked into.
	#[cfg(test)]
	pub fn iter(&self) -> impl Iterator<Item = (usize, &SessionEntry)> + '_ {
		self.buckets
			.iter()
			.enumerate()
			.flat_map(move |(b, list)| list.iter(&self.entries).map(move |(_, e)| (b, e)))
	}
}
