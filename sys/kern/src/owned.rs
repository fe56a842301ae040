// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The move-only ownership handle.
//!
//! [`Owned<T>`] is how the kernel passes messages and parked actors around
//! without ever copying them or sharing them: exactly one handle to an object
//! exists at a time, and moving the handle moves the ownership. Dropping a
//! handle runs the type's reclaim action -- a message goes home to its pool,
//! which is why application code can simply let a received message fall out
//! of scope. Actors are permanent; reclaiming one is a fatal wiring bug.
//!
//! The kernel internally converts handles to raw pointers ([`into_raw`]) when
//! an object changes owner -- into a list, into a mailbox, into a running
//! resume -- and back ([`from_raw`]) when it re-emerges. Between those points
//! the object has exactly one logical owner even though no handle exists;
//! the lists and mailboxes enforce that by construction.
//!
//! [`into_raw`]: Owned::into_raw
//! [`from_raw`]: Owned::from_raw

use crate::list::Linked;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

/// Exclusive owning handle to a pool-resident object.
pub struct Owned<T: Linked> {
    ptr: NonNull<T>,
}

impl<T: Linked> Owned<T> {
    /// Adopts `ptr` as exclusively owned.
    ///
    /// # Safety
    ///
    /// The caller must guarantee `ptr` is valid, currently unowned (not in a
    /// list, not in a mailbox, not behind another handle), and stays valid
    /// for as long as ownership circulates -- in practice, that it points
    /// into static storage.
    pub(crate) unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Self { ptr }
    }

    /// Extracts the raw pointer without running the reclaim action. The
    /// caller takes over responsibility for the object's ownership.
    pub(crate) fn into_raw(self) -> NonNull<T> {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }
}

impl<T: Linked> Deref for Owned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the handle owns the object exclusively, and the object is
        // in static storage, so the reference cannot dangle or alias a `&mut`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: Linked> DerefMut for Owned<T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: as above, and `&mut self` makes this the only path to the
        // object right now. (Kernel code never does this for actors, whose
        // statics are also reachable by shared reference; messages live in a
        // slab that is only ever reached through handles.)
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: Linked> Drop for Owned<T> {
    fn drop(&mut self) {
        T::reclaim(self.ptr);
    }
}

// Safety: a handle is the single owner of its referent, so sending it to
// another execution context is sound whenever the referent itself may move
// between contexts.
unsafe impl<T: Linked + Send> Send for Owned<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Message;

    #[test]
    fn into_raw_skips_reclaim() {
        // A parentless message dies loudly if reclaimed; `into_raw` must not
        // reclaim.
        let slot: &'static mut Message<u8> = Box::leak(Box::new(Message::new(9)));
        let handle = unsafe { Owned::from_raw(NonNull::from(slot)) };
        let raw = handle.into_raw();
        assert_eq!(**unsafe { raw.as_ref() }, 9);
    }

    #[test]
    #[should_panic]
    fn reclaim_without_home_is_fatal() {
        let slot: &'static mut Message<u8> = Box::leak(Box::new(Message::new(0)));
        let handle = unsafe { Owned::from_raw(NonNull::from(slot)) };
        drop(handle);
    }

    #[test]
    fn deref_reaches_payload() {
        let slot: &'static mut Message<u8> = Box::leak(Box::new(Message::new(5)));
        let mut handle = unsafe { Owned::from_raw(NonNull::from(slot)) };
        assert_eq!(**handle, 5);
        **handle = 6;
        assert_eq!(**handle, 6);
        handle.into_raw();
    }
}
