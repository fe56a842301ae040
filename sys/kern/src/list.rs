// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Intrusive circular doubly-linked lists.
//!
//! Every object that can wait somewhere -- a message in a queue, an actor
//! parked on a queue or the timer wheel or a run-queue -- embeds a [`Node`]
//! as its first field. A [`List`] is a sentinel node whose `next`/`prev`
//! close the ring, so enqueue and dequeue are O(1) pointer splices and
//! involve no allocation, ever.
//!
//! A list stores node pointers, not typed pointers; the [`Linked`] contract
//! (node at offset zero of a `#[repr(C)]` struct) is what lets `pop_front`
//! turn a node back into the enclosing object. The caller decides the type,
//! which is how a queue can hold messages at one moment and parked actors at
//! another.
//!
//! Lists do no locking of their own. Every call site splices inside a port
//! critical section; these methods merely keep each splice to a handful of
//! instructions so those sections stay short.

use crate::owned::Owned;
use core::cell::Cell;
use core::ptr::{self, NonNull};

/// Link pair embedded in everything that can be queued.
///
/// A node is in exactly one of two states: unlinked (both pointers null,
/// the initial state, restored on dequeue) or a member of exactly one ring.
pub(crate) struct Node {
    next: Cell<*const Node>,
    prev: Cell<*const Node>,
}

impl Node {
    pub const fn new() -> Self {
        Self {
            next: Cell::new(ptr::null()),
            prev: Cell::new(ptr::null()),
        }
    }

    pub fn is_linked(&self) -> bool {
        !self.next.get().is_null()
    }
}

/// Types that may live on a [`List`].
///
/// # Safety
///
/// Implementers must be `#[repr(C)]` with a [`Node`] as their first field, so
/// that a pointer to the node *is* a pointer to the object. `reclaim` is the
/// type's answer to an [`Owned`] handle being dropped; see [`Owned`].
pub unsafe trait Linked: Sized {
    /// Disposes of an object whose owning handle was dropped without the
    /// object reaching a new home.
    fn reclaim(ptr: NonNull<Self>);
}

/// FIFO ring of intrusive nodes, anchored by a sentinel.
///
/// The ring closes through the sentinel lazily, on first use, because a
/// `const fn` constructor cannot take the sentinel's own address.
pub(crate) struct List {
    root: Node,
}

impl List {
    pub const fn new() -> Self {
        Self { root: Node::new() }
    }

    pub fn is_empty(&self) -> bool {
        let head = self.root.next.get();
        head.is_null() || ptr::eq(head, &self.root)
    }

    /// Appends `item` at the tail, transferring ownership into the list.
    pub fn push_back<T: Linked>(&self, item: Owned<T>) {
        let root = &self.root as *const Node;
        if self.root.next.get().is_null() {
            self.root.next.set(root);
            self.root.prev.set(root);
        }

        let link = item.into_raw().cast::<Node>();
        // Safety: `item` was exclusively owned, so its node is unlinked and
        // nothing else can touch it; `Linked` guarantees the node sits at the
        // start of `T`. The neighbor pointers we chase are members of this
        // ring and thus valid.
        unsafe {
            let link_ref = link.as_ref();
            uassert!(!link_ref.is_linked());
            link_ref.next.set(root);
            link_ref.prev.set(self.root.prev.get());
            (*link_ref.prev.get()).next.set(link.as_ptr());
            self.root.prev.set(link.as_ptr());
        }
    }

    /// Detaches and returns the head item, if any, transferring ownership to
    /// the caller.
    ///
    /// The caller asserts, by choice of `T`, what kind of object this list
    /// currently holds.
    pub fn pop_front<T: Linked>(&self) -> Option<Owned<T>> {
        if self.is_empty() {
            return None;
        }

        let link = self.root.next.get();
        // Safety: `link` is a member of this ring (checked non-sentinel by
        // `is_empty`), so it and its neighbors are valid nodes. Per the
        // caller's assertion and the `Linked` layout contract, casting the
        // node pointer recovers the enclosing `T`.
        unsafe {
            let link_ref = &*link;
            (*link_ref.prev.get()).next.set(link_ref.next.get());
            (*link_ref.next.get()).prev.set(link_ref.prev.get());
            link_ref.next.set(ptr::null());
            link_ref.prev.set(ptr::null());
            Some(Owned::from_raw(
                NonNull::new_unchecked(link as *mut Node).cast::<T>(),
            ))
        }
    }

    /// Walks the ring and counts members, for checking length bookkeeping
    /// against ground truth.
    #[cfg(test)]
    pub fn count(&self) -> usize {
        let root = &self.root as *const Node;
        let mut n = 0;
        let mut cursor = self.root.next.get();
        while !cursor.is_null() && !ptr::eq(cursor, root) {
            n += 1;
            cursor = unsafe { (*cursor).next.get() };
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Message;
    use core::ptr::NonNull;

    fn leak_msg(v: u32) -> Owned<Message<u32>> {
        let slot: &'static mut Message<u32> = Box::leak(Box::new(Message::new(v)));
        // Safety: freshly leaked, so exclusively ours and never linked.
        unsafe { Owned::from_raw(NonNull::from(slot)) }
    }

    #[test]
    fn new_list_is_empty() {
        let list = List::new();
        assert!(list.is_empty());
        assert!(list.pop_front::<Message<u32>>().is_none());
    }

    #[test]
    fn fifo_order() {
        let list = List::new();
        for v in [1, 2, 3] {
            list.push_back(leak_msg(v));
        }
        assert!(!list.is_empty());
        assert_eq!(list.count(), 3);

        for expected in [1, 2, 3] {
            let item = list.pop_front::<Message<u32>>().unwrap();
            assert_eq!(**item, expected);
            // No parent pool in this test; forget instead of dropping.
            item.into_raw();
        }
        assert!(list.is_empty());
    }

    #[test]
    fn node_unlinks_on_pop() {
        let list = List::new();
        list.push_back(leak_msg(7));
        let item = list.pop_front::<Message<u32>>().unwrap();
        let raw = item.into_raw();
        assert!(!unsafe { raw.as_ref() }.node().is_linked());

        // The same slot can go around again.
        let again = unsafe { Owned::from_raw(raw) };
        list.push_back(again);
        assert_eq!(list.count(), 1);
    }

    #[test]
    fn interleaved_push_pop() {
        let list = List::new();
        let take = |expected: u32| {
            let item = list.pop_front::<Message<u32>>().unwrap();
            assert_eq!(**item, expected);
            item.into_raw();
        };

        list.push_back(leak_msg(1));
        list.push_back(leak_msg(2));
        take(1);
        list.push_back(leak_msg(3));
        take(2);
        take(3);
        assert!(list.pop_front::<Message<u32>>().is_none());
    }
}
