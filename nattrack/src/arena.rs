// slot storage for list nodes, addressed by generation-checked indices

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Handle to a value in an `Arena<T>`. Goes stale once the value is removed,
/// even if the slot is reused.
pub struct Index<T> {
	slot: u32,
	generation: u32,
	_marker: PhantomData<fn() -> T>,
}

impl<T> Index<T> {
	fn new(slot: u32, generation: u32) -> Self {
		Index { slot, generation, _marker: PhantomData }
	}
}

impl<T> Clone for Index<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T> Copy for Index<T> {}

impl<T> PartialEq for Index<T> {
	fn eq(&self, other: &Self) -> bool {
		self.slot == other.slot && self.generation == other.generation
	}
}

impl<T> Eq for Index<T> {}

impl<T> Hash for Index<T> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.slot.hash(state);
		self.generation.hash(state);
	}
}

impl<T> fmt::Debug for Index<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}v{}", self.slot, self.generation)
	}
}

enum Slot<T> {
	Occupied { generation: u32, value: T },
	Vacant { generation: u32, next_free: Option<u32> },
}

pub struct Arena<T> {
	slots: Vec<Slot<T>>,
	free_head: Option<u32>,
	len: usize,
}

impl<T> Arena<T> {
	pub fn new() -> Self {
		Arena { slots: Vec::new(), free_head: None, len: 0 }
	}

	pub fn len(&self) -> usize {
		self.len
	}

	#[cfg(test)]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn insert(&mut self, value: T) -> Index<T> {
		self.len += 1;
		if let Some(slot) = self.free_head {
			if let Slot::Vacant { generation, next_free } = self.slots[slot as usize] {
				self.free_head = next_free;
				self.slots[slot as usize] = Slot::Occupied { generation, value };
				return Index::new(slot, generation);
			}
		}
		let slot = self.slots.len() as u32;
		self.slots.push(Slot::Occupied { generation: 0, value });
		Index::new(slot, 0)
	}

	pub fn remove(&mut self, index: Index<T>) -> Option<T> {
		let slot = self.slots.get_mut(index.slot as usize)?;
		match slot {
			Slot::Occupied { generation, .. } if *generation == index.generation => {}
			_ => return None,
		}
		let vacant = Slot::Vacant {
			generation: index.generation.wrapping_add(1),
			next_free: self.free_head,
		};
		let old = std::mem::replace(slot, vacant);
		self.free_head = Some(index.slot);
		self.len -= 1;
		match old {
			Slot::Occupied { value, .. } => Some(value),
			Slot::Vacant { .. } => None,
		}
	}

	pub fn get(&self, index: Index<T>) -> Option<&T> {
		match self.slots.get(index.slot as usize)? {
			Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
			_ => None,
		}
	}

	pub fn get_mut(&mut self, index: Index<T>) -> Option<&mut T> {
		match self.slots.get_mut(index.slot as usize)? {
			Slot::Occupied { generation, value } if *generation == index.generation => Some(value),
			_ => None,
		}
	}

	pub fn contains(&self, index: Index<T>) -> bool {
		self.get(index).is_some()
	}
}

impl<T> Default for Arena<T> {
	fn default() -> Self {
		Arena::new()
	}
}


#[cfg(test)]
mod tests {
	use super::*;

#[test]
	fn test_insert_get_remove() {
		let mut arena = Arena::new();
		assert!(arena.is_empty());

		let a = arena.insert("a");
		let b = arena.insert("b");
		assert_eq!(arena.len(), 2);
		assert_eq!(arena.get(a), Some(&"a"));
		assert_eq!(arena.get(b), Some(&"b"));

		assert_eq!(arena.remove(a), Some("a"));
		assert_eq!(arena.len(), 1);
		assert!(!arena.contains(a));
		// double remove is a no-op
		assert_eq!(arena.remove(a), None);
		assert_eq!(arena.len(), 1);
	}

#[test]
	fn test_stale_index_after_reuse() {
		let mut arena = Arena::new();
		let a = arena.insert(1);
		arena.remove(a);

		let b = arena.insert(2);
		// same slot, new generation
		assert_ne!(a, b);
		assert_eq!(arena.get(a), None);
		assert_eq!(arena.get(b), Some(&2));
		assert_eq!(arena.remove(a), None);
		assert_eq!(arena.get(b), Some(&2));
	}

#[test]
	fn test_free_slots_reused() {
		let mut arena = Arena::new();
		let ids: Vec<_> = (0..4).map(|i| arena.insert(i)).collect();
		for id in &ids {
			arena.remove(*id);
		}
		for i in 0..4 {
			arena.insert(i + 10);
		}
		assert_eq!(arena.slots.len(), 4);
		assert_eq!(arena.len(), 4);
	}

#[test]
	fn test_get_mut() {
		let mut arena = Arena::new();
		let a = arena.insert(5u32);
		if let Some(v) = arena.get_mut(a) {
			*v += 1;
		}
		assert_eq!(arena.get(a), Some(&6));
	}
}
