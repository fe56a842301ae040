// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed pools of pre-allocated messages.
//!
//! A [`Pool`] owns a static backing array of [`Message`] slots and *is its
//! own free list*: it embeds a [`Queue`] and a dropped message handle pushes
//! itself back onto that queue (via the message's `parent` pointer). Fresh
//! slots are handed out lazily from the array by bumping a cursor; once the
//! cursor hits the end, allocation is serviced entirely by returns. The
//! queue embedding is also what makes [`Pool::get`] fall out for free: an
//! actor that wants a slot and finds the pool dry just parks on the free
//! queue like any subscriber, and the next drop wakes it.
//!
//! The backing array is typically declared as a `ClaimCell` static and
//! attached during startup:
//!
//! ```ignore
//! const SLOT: Message<Frame> = Message::new(Frame::EMPTY);
//! static SLAB: ClaimCell<[Message<Frame>; 8]> = ClaimCell::new([SLOT; 8]);
//! static POOL: Pool<Frame> = Pool::new();
//! // in startup code:
//! POOL.attach(SLAB.claim());
//! ```

use crate::actor::Actor;
use crate::arch;
use crate::owned::Owned;
use crate::queue::{Message, Queue, Recv};
use core::cell::Cell;
use core::ptr::{self, NonNull};

/// Fixed-size message allocator that doubles as the free queue.
pub struct Pool<T: 'static> {
    free: Queue<T>,
    slab: Cell<*mut Message<T>>,
    slab_len: Cell<usize>,
    /// Cursor into the backing array; slots below it have been handed out at
    /// least once and are owned by the free queue or by handles.
    offset: Cell<usize>,
}

// Safety: the slab pointer and cursor are only touched inside critical
// sections, and the slab itself came from an exclusive `&'static mut`.
unsafe impl<T: Send> Sync for Pool<T> {}
unsafe impl<T: Send> Send for Pool<T> {}

impl<T: 'static> Pool<T> {
    /// Creates a pool with no backing storage; [`attach`](Pool::attach) one
    /// before use. `alloc` on an unattached pool returns `None`.
    pub const fn new() -> Self {
        Self {
            free: Queue::new(),
            slab: Cell::new(ptr::null_mut()),
            slab_len: Cell::new(0),
            offset: Cell::new(0),
        }
    }

    /// Adopts `storage` as the backing array. Call once, at startup.
    pub fn attach(&'static self, storage: &'static mut [Message<T>]) {
        arch::without_interrupts(|| {
            uassert!(self.slab.get().is_null());
            self.slab.set(storage.as_mut_ptr());
            self.slab_len.set(storage.len());
        });
    }

    /// Hands out the next never-used slot from the backing array, if any
    /// remain, stamping it with its way home.
    fn try_pick_from_array(&'static self) -> Option<Owned<Message<T>>> {
        arch::without_interrupts(|| {
            let index = self.offset.get();
            if self.slab.get().is_null() || index >= self.slab_len.get() {
                return None;
            }
            self.offset.set(index + 1);

            // Safety: `index` is in bounds and the cursor bump means each
            // slot is handed out by this path exactly once; from here on the
            // slot circulates by ownership handle.
            let msg = unsafe { NonNull::new_unchecked(self.slab.get().add(index)) };
            unsafe { msg.as_ref() }.set_parent(&self.free);
            Some(unsafe { Owned::from_raw(msg) })
        })
    }

    /// Allocates a message, preferring untouched array slots, falling back
    /// to returned ones. `None` means the pool's whole population is
    /// currently out; the caller decides what that means.
    pub fn alloc(&'static self) -> Option<Owned<Message<T>>> {
        let msg = self.try_pick_from_array();
        if msg.is_none() {
            return self.free.try_pop();
        }
        msg
    }

    /// Returns the future an actor awaits to obtain a message slot, parking
    /// if none is free.
    ///
    /// A freshly-available array slot is routed *through* the free queue
    /// rather than handed to the caller directly, so that an actor already
    /// parked on the pool is served first (FIFO, like any queue).
    pub fn get(&'static self, subscriber: &'static Actor) -> Recv<'static, T> {
        if let Some(fresh) = self.try_pick_from_array() {
            self.free.push(fresh);
        }
        self.free.recv(subscriber)
    }
}
