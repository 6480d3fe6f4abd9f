// null-terminated doubly-linked lists threaded through an Arena
//
// A node carries its own prev/next links and can sit in at most one list at a
// time; the links also name that list. Lists are never circular: traversal
// stops at the first missing `next`.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::arena::{Arena, Index};

static NEXT_LIST_ID: AtomicU32 = AtomicU32::new(1);

pub struct Links<T> {
	prev: Option<Index<T>>,
	next: Option<Index<T>>,
	owner: Option<u32>,
}

impl<T> Default for Links<T> {
	fn default() -> Self {
		Links { prev: None, next: None, owner: None }
	}
}

pub trait Linked: Sized {
	fn links(&self) -> &Links<Self>;
	fn links_mut(&mut self) -> &mut Links<Self>;
}

pub struct List<T> {
	id: u32,
	head: Option<Index<T>>,
}

impl<T> Default for List<T> {
	fn default() -> Self {
		List { id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed), head: None }
	}
}

impl<T: Linked> List<T> {
	pub fn new() -> Self {
		List::default()
	}

	#[cfg(test)]
	pub fn len(&self, arena: &Arena<T>) -> usize {
		self.iter(arena).count()
	}

	#[cfg(test)]
	pub fn is_empty(&self) -> bool {
		self.head.is_none()
	}

	/// Makes `id` the new head. Returns false if `id` is not in `arena` or is
	/// already linked into a list.
	pub fn push_front(&mut self, arena: &mut Arena<T>, id: Index<T>) -> bool {
		match arena.get(id) {
			Some(node) if node.links().owner.is_none() => {}
			_ => return false,
		}
		if let Some(old) = self.head {
			if let Some(node) = arena.get_mut(old) {
				node.links_mut().prev = Some(id);
			}
		}
		if let Some(node) = arena.get_mut(id) {
			let links = node.links_mut();
			links.prev = None;
			links.next = self.head;
			links.owner = Some(self.id);
		}
		self.head = Some(id);
		true
	}

	/// Removes `id` from this list. A node that is gone, or not linked here, is
	/// left alone and false is returned.
	pub fn unlink(&mut self, arena: &mut Arena<T>, id: Index<T>) -> bool {
		let (prev, next) = match arena.get(id) {
			Some(node) if node.links().owner == Some(self.id) => (node.links().prev, node.links().next),
			_ => return false,
		};

		match prev.and_then(|p| arena.get_mut(p)) {
			Some(p) => p.links_mut().next = next,
			None => self.head = next,
		}
		if let Some(n) = next.and_then(|n| arena.get_mut(n)) {
			n.links_mut().prev = prev;
		}
		if let Some(node) = arena.get_mut(id) {
			*node.links_mut() = Links::default();
		}
		true
	}

	pub fn pop_front(&mut self, arena: &mut Arena<T>) -> Option<Index<T>> {
		let head = self.head?;
		if !self.unlink(arena, head) {
			// head pointed at a freed node; drop the rest rather than loop
			self.head = None;
			return None;
		}
		Some(head)
	}

	/// First node from the head matching `pred`.
	pub fn find<F>(&self, arena: &Arena<T>, mut pred: F) -> Option<Index<T>>
	where
		F: FnMut(&T) -> bool,
	{
		self.iter(arena).find(|(_, node)| pred(node)).map(|(id, _)| id)
	}

	pub fn iter<'a>(&self, arena: &'a Arena<T>) -> Iter<'a, T> {
		Iter { arena, cursor: self.head }
	}
}

pub struct Iter<'a, T> {
	arena: &'a Arena<T>,
	cursor: Option<Index<T>>,
}

impl<'a, T: Linked> Iterator for Iter<'a, T> {
	type Item = (Index<T>, &'a T);

	fn next(&mut self) -> Option<Self::Item> {
		let id = self.cursor?;
		let node = self.arena.get(id)?;
		self.cursor = node.links().next;
		Some((id, node))
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	struct Node {
		links: Links<Node>,
		val: u32,
	}

	impl Linked for Node {
		fn links(&self) -> &Links<Node> {
			&self.links
		}
		fn links_mut(&mut self) -> &mut Links<Node> {
			&mut self.links
		}
	}

	fn node(arena: &mut Arena<Node>, val: u32) -> Index<Node> {
		arena.insert(Node { links: Links::default(), val })
	}

	fn values(list: &List<Node>, arena: &Arena<Node>) -> Vec<u32> {
		list.iter(arena).map(|(_, n)| n.val).collect()
	}

#[test]
	fn test_push_front_order() {
		let mut arena = Arena::new();
		let mut list = List::new();
		for v in 1..=3 {
			let id = node(&mut arena, v);
			assert!(list.push_front(&mut arena, id));
		}
		assert_eq!(values(&list, &arena), vec![3, 2, 1]);
		assert_eq!(list.len(&arena), 3);
	}

#[test]
	fn test_unlink_head_middle_tail() {
		let mut arena = Arena::new();
		let mut list = List::new();
		let ids: Vec<_> = (1..=5).map(|v| node(&mut arena, v)).collect();
		for id in &ids {
			list.push_front(&mut arena, *id);
		}
		// list: 5 4 3 2 1
		assert!(list.unlink(&mut arena, ids[4]));
		assert_eq!(values(&list, &arena), vec![4, 3, 2, 1]);
		assert!(list.unlink(&mut arena, ids[2]));
		assert_eq!(values(&list, &arena), vec![4, 2, 1]);
		assert!(list.unlink(&mut arena, ids[0]));
		assert_eq!(values(&list, &arena), vec![4, 2]);
		assert_eq!(list.len(&arena), 2);

		// back-links were repaired too
		assert!(list.unlink(&mut arena, ids[1]));
		assert_eq!(values(&list, &arena), vec![4]);
	}

#[test]
	fn test_unlink_absent_is_noop() {
		let mut arena = Arena::new();
		let mut list = List::new();
		let a = node(&mut arena, 1);

		// empty list
		assert!(!list.unlink(&mut arena, a));

		let b = node(&mut arena, 2);
		list.push_front(&mut arena, b);
		// a is not linked anywhere
		assert!(!list.unlink(&mut arena, a));
		// freed node
		arena.remove(a);
		assert!(!list.unlink(&mut arena, a));
		assert_eq!(values(&list, &arena), vec![2]);

		// unlinking twice
		assert!(list.unlink(&mut arena, b));
		assert!(!list.unlink(&mut arena, b));
		assert!(list.is_empty());
		assert_eq!(list.len(&arena), 0);
	}

#[test]
	fn test_unlink_from_wrong_list_is_noop() {
		let mut arena = Arena::new();
		let mut x = List::new();
		let mut y = List::new();
		let ids: Vec<_> = (1..=3).map(|v| node(&mut arena, v)).collect();
		for id in &ids {
			x.push_front(&mut arena, *id);
		}
		let nine = node(&mut arena, 9);
		y.push_front(&mut arena, nine);

		// middle and head of x, neither belongs to y
		assert!(!y.unlink(&mut arena, ids[1]));
		assert!(!y.unlink(&mut arena, ids[2]));
		assert_eq!(values(&x, &arena), vec![3, 2, 1]);
		assert_eq!(values(&y, &arena), vec![9]);
		assert_eq!(x.len(&arena), 3);
		assert_eq!(y.len(&arena), 1);

		// a node already in x cannot be pushed onto y
		assert!(!y.push_front(&mut arena, ids[0]));
		assert_eq!(values(&x, &arena), vec![3, 2, 1]);
		assert!(x.unlink(&mut arena, ids[1]));
		assert!(y.push_front(&mut arena, ids[1]));
		assert_eq!(values(&y, &arena), vec![2, 9]);
	}

#[test]
	fn test_membership_follows_moved_list() {
		let mut arena = Arena::new();
		let mut current = List::new();
		let a = node(&mut arena, 1);
		current.push_front(&mut arena, a);

		let mut carry = std::mem::take(&mut current);
		assert!(!current.unlink(&mut arena, a));
		assert!(carry.unlink(&mut arena, a));
		assert!(carry.is_empty());
	}

#[test]
	fn test_find_stops_at_end() {
		let mut arena = Arena::new();
		let mut list = List::new();
		assert_eq!(list.find(&arena, |_| true), None);

		let only = node(&mut arena, 7);
		list.push_front(&mut arena, only);
		assert_eq!(list.find(&arena, |n| n.val == 7), Some(only));
		// a single-element list must report a miss, not spin
		assert_eq!(list.find(&arena, |n| n.val == 8), None);

		let newer = node(&mut arena, 7);
		list.push_front(&mut arena, newer);
		// most recently pushed match wins
		assert_eq!(list.find(&arena, |n| n.val == 7), Some(newer));
	}

#[test]
	fn test_pop_front_drains() {
		let mut arena = Arena::new();
		let mut list = List::new();
		for v in 1..=3 {
			let id = node(&mut arena, v);
			list.push_front(&mut arena, id);
		}
		let mut popped = Vec::new();
		while let Some(id) = list.pop_front(&mut arena) {
			popped.push(arena.get(id).map(|n| n.val).unwrap());
		}
		assert_eq!(popped, vec![3, 2, 1]);
		assert!(list.is_empty());
	}

#[test]
	fn test_move_between_lists() {
		let mut arena = Arena::new();
		let mut old = List::new();
		let mut new = List::new();
		let ids: Vec<_> = (1..=3).map(|v| node(&mut arena, v)).collect();
		for id in &ids {
			old.push_front(&mut arena, *id);
		}
		assert!(old.unlink(&mut arena, ids[1]));
		assert!(new.push_front(&mut arena, ids[1]));
		assert_eq!(values(&old, &arena), vec![3, 1]);
		assert_eq!(values(&new, &arena), vec![2]);
	}
}
