// Per-cycle diff of the pf state table against the sessions we already track.
//
// Every live SessionEntry has a twin EpochNode. During cycle k the node sits
// in `current` if the session was reported in k, otherwise in `carry_over`
// (which starts the cycle as last cycle's `current`). A hit moves the twin
// from carry_over to current in O(1); whatever is left in carry_over after
// the snapshot is exhausted has expired.

use log::debug;

use crate::arena::{Arena, Index};
use crate::list::{Linked, Links, List};
use crate::sink::Sink;
use crate::table::{EntryId, SessionTable};
use crate::types::{Lifecycle, SessionTuple};

pub struct EpochNode {
	links: Links<EpochNode>,
	twin: EntryId,
	epoch: u64,
}

impl Linked for EpochNode {
	fn links(&self) -> &Links<Self> {
		&self.links
	}
	fn links_mut(&mut self) -> &mut Links<Self> {
		&mut self.links
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
	/// Translated sessions in the snapshot, duplicates included.
	pub observed: usize,
	pub new: usize,
	pub continued: usize,
	/// Same session reported more than once in one snapshot.
	pub duplicate: usize,
	pub expired: usize,
	pub live: usize,
}

pub struct Tracker {
	table: SessionTable,
	nodes: Arena<EpochNode>,
	current: List<EpochNode>,
	carry_over: List<EpochNode>,
	epoch: u64,
	report_new: bool,
}

impl Tracker {
	pub fn new(table: SessionTable) -> Self {
		Tracker {
			table,
			nodes: Arena::new(),
			current: List::new(),
			carry_over: List::new(),
			epoch: 0,
			report_new: false,
		}
	}

	/// Also render sessions on the cycle they first show up.
	pub fn report_new(mut self, on: bool) -> Self {
		self.report_new = on;
		self
	}

	#[cfg(test)]
	pub fn table(&self) -> &SessionTable {
		&self.table
	}

	pub fn live(&self) -> usize {
		self.table.len()
	}

	/// Runs one full cycle over the translated sessions of a snapshot.
	pub fn reconcile<I>(&mut self, tuples: I, sink: &mut dyn Sink) -> CycleStats
	where
		I: IntoIterator<Item = SessionTuple>,
	{
		let mut stats = CycleStats::default();

		self.epoch += 1;
		self.carry_over = std::mem::take(&mut self.current);

		for tuple in tuples {
			stats.observed += 1;
			let bucket = self.table.bucket_for(&tuple.key);
			match self.table.find_in_bucket(bucket, &tuple.key) {
				Some(id) => {
					if self.refresh(id, tuple.duration) {
						stats.continued += 1;
					} else {
						stats.duplicate += 1;
					}
				}
				None => {
					let id = self.table.insert_in_bucket(bucket, tuple);
					self.attach(id);
					stats.new += 1;
					if self.report_new {
						if let Some(entry) = self.table.get(id) {
							sink.render(entry, Lifecycle::New);
						}
					}
				}
			}
		}

		let expired = std::mem::take(&mut self.carry_over);
		stats.expired = self.retire(expired, Lifecycle::Expired, sink);
		stats.live = self.table.len();
		debug_assert_eq!(self.nodes.len(), self.table.len());
		stats
	}

	/// Renders and drops every live session. Used once, on the way out.
	pub fn shutdown(&mut self, sink: &mut dyn Sink) -> usize {
		let carry = std::mem::take(&mut self.carry_over);
		let current = std::mem::take(&mut self.current);
		self.retire(carry, Lifecycle::Flushed, sink) + self.retire(current, Lifecycle::Flushed, sink)
	}

	// Refreshes duration and moves the twin into `current`. False when the
	// session was already seen earlier in this same snapshot.
	fn refresh(&mut self, id: EntryId, duration: u32) -> bool {
		let twin = match self.table.get_mut(id) {
			Some(entry) => {
				entry.set_duration(duration);
				entry.twin
			}
			None => return false,
		};
		let twin = match twin.filter(|t| self.nodes.contains(*t)) {
			Some(t) => t,
			None => {
				debug!("session without an epoch node, reattaching");
				self.attach(id);
				return true;
			}
		};

		if let Some(node) = self.nodes.get_mut(twin) {
			if node.epoch == self.epoch {
				return false;
			}
			node.epoch = self.epoch;
		}
		self.carry_over.unlink(&mut self.nodes, twin);
		self.current.push_front(&mut self.nodes, twin);
		true
	}

	fn attach(&mut self, id: EntryId) -> Index<EpochNode> {
		let node = self.nodes.insert(EpochNode {
			links: Links::default(),
			twin: id,
			epoch: self.epoch,
		});
		self.current.push_front(&mut self.nodes, node);
		if let Some(entry) = self.table.get_mut(id) {
			entry.twin = Some(node);
		}
		node
	}

	fn retire(&mut self, mut list: List<EpochNode>, event: Lifecycle, sink: &mut dyn Sink) -> usize {
		let mut count = 0;
		while let Some(node_id) = list.pop_front(&mut self.nodes) {
			let node = match self.nodes.remove(node_id) {
				Some(node) => node,
				None => continue,
			};
			if let Some(entry) = self.table.get(node.twin) {
				sink.render(entry, event);
			}
			if self.table.remove(node.twin).is_some() {
				count += 1;
			}
		}
		count
	}
}
