// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Messages, queues, and the rendezvous protocol.
//!
//! A [`Queue`] is a mailbox-style FIFO whose signed `length` both counts and
//! encodes what the internal list currently holds:
//!
//! - `length == 0`: empty, nobody waiting.
//! - `length > 0`: that many messages are buffered.
//! - `length < 0`: that many actors are parked waiting for messages.
//!
//! The list never holds both kinds at once: the first push to a queue with
//! parked subscribers doesn't get buffered at all -- it is handed straight to
//! the longest-waiting subscriber's mailbox, and the subscriber comes back as
//! the return value of the push so the caller can activate it *outside* the
//! critical section. Each operation is a single read-modify-write of `length`
//! plus one list splice under the port's interrupt mask, which is the entire
//! concurrency story: a preempting ISR that touches the same queue simply
//! runs its own complete section before or after ours.

use crate::actor::Actor;
use crate::arch;
use crate::list::{Linked, List, Node};
use crate::owned::Owned;
use crate::sched;
use core::cell::Cell;
use core::future::Future;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::ptr::NonNull;
use core::task::{Context, Poll};

/// A pool-resident message carrying a payload `T`.
///
/// Identity is the slot's address; messages are constructed once, in a static
/// backing array, and circulate by ownership handle forever after. `parent`
/// is the free queue of the owning pool -- a back-reference, not ownership --
/// set when the pool first hands the slot out and never changed, so a dropped
/// handle always knows its way home.
#[repr(C)]
pub struct Message<T: 'static> {
    link: Node,
    parent: Cell<Option<NonNull<Queue<T>>>>,
    payload: T,
}

impl<T: 'static> Message<T> {
    /// Makes an unpooled message slot around `payload`. Slots become live
    /// when a [`Pool`](crate::Pool) adopts the array they sit in.
    pub const fn new(payload: T) -> Self {
        Self {
            link: Node::new(),
            parent: Cell::new(None),
            payload,
        }
    }

    pub(crate) fn set_parent(&self, parent: &'static Queue<T>) {
        self.parent.set(Some(NonNull::from(parent)));
    }

    #[cfg(test)]
    pub(crate) fn node(&self) -> &Node {
        &self.link
    }
}

impl<T: 'static> Deref for Message<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.payload
    }
}

impl<T: 'static> DerefMut for Message<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.payload
    }
}

// Safety: `#[repr(C)]` with the node first, per the `Linked` contract.
unsafe impl<T: 'static> Linked for Message<T> {
    fn reclaim(ptr: NonNull<Self>) {
        // A dropped message goes back to its pool's free queue -- which also
        // wakes anybody parked waiting for a free slot.
        match unsafe { ptr.as_ref() }.parent.get() {
            // Safety: `parent` was set from a `&'static` queue and the handle
            // we forge is the one being retired by this drop.
            Some(parent) => unsafe { parent.as_ref() }.push(unsafe { Owned::from_raw(ptr) }),
            // Handles only exist for slots a pool has handed out, and the
            // pool sets `parent` first.
            None => panic!(),
        }
    }
}

// Safety: the raw parent pointer aims at a `'static` queue; the link cells
// are only touched inside critical sections. Moving a message between
// execution contexts is fine whenever its payload can move.
unsafe impl<T: Send> Send for Message<T> {}

/// FIFO rendezvous point between message producers and one or more
/// subscribing actors.
pub struct Queue<T: 'static> {
    items: List,
    length: Cell<i32>,
    _marker: PhantomData<fn(T)>,
}

// Safety: all interior mutability is confined to port critical sections;
// see the module doc.
unsafe impl<T: Send> Sync for Queue<T> {}
unsafe impl<T: Send> Send for Queue<T> {}

impl<T: 'static> Queue<T> {
    pub const fn new() -> Self {
        Self {
            items: List::new(),
            length: Cell::new(0),
            _marker: PhantomData,
        }
    }

    /// Delivers `msg`: buffers it if nobody is parked, otherwise hands it to
    /// the longest-parked subscriber and activates that subscriber.
    pub fn push(&self, msg: Owned<Message<T>>) {
        if let Some(subscriber) = self.push_internal(msg) {
            sched::activate(subscriber);
        }
    }

    /// The atomic half of `push`. Returns the subscriber to activate, if the
    /// message woke one; activation happens outside the critical section.
    fn push_internal(&self, msg: Owned<Message<T>>) -> Option<Owned<Actor>> {
        arch::without_interrupts(|| {
            let prev = self.length.get();
            self.length.set(prev + 1);

            if prev >= 0 {
                self.items.push_back(msg);
                None
            } else {
                // length < 0 means the list holds parked actors.
                match self.items.pop_front::<Actor>() {
                    Some(subscriber) => {
                        subscriber.deliver(msg);
                        Some(subscriber)
                    }
                    None => panic!(),
                }
            }
        })
    }

    /// Takes a buffered message if one is present; never parks.
    pub(crate) fn try_pop(&self) -> Option<Owned<Message<T>>> {
        arch::without_interrupts(|| {
            if self.length.get() > 0 {
                self.length.set(self.length.get() - 1);
                self.items.pop_front()
            } else {
                None
            }
        })
    }

    /// The atomic half of a receive: takes a buffered message, or parks
    /// `subscriber` on the queue and returns `None`.
    fn pop_or_park(&self, subscriber: &'static Actor) -> Option<Owned<Message<T>>> {
        arch::without_interrupts(|| {
            let prev = self.length.get();
            self.length.set(prev - 1);

            if prev <= 0 {
                // Safety: the subscriber is the actor executing this receive,
                // so it is unlinked and its execution is the sole owner.
                self.items.push_back(unsafe { subscriber.park() });
                None
            } else {
                self.items.pop_front()
            }
        })
    }

    /// Returns the future an actor awaits to receive from this queue.
    pub fn recv<'q>(&'q self, subscriber: &'static Actor) -> Recv<'q, T> {
        Recv {
            queue: self,
            subscriber,
            parked: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn len_for_test(&self) -> i32 {
        arch::without_interrupts(|| self.length.get())
    }

    #[cfg(test)]
    pub(crate) fn list_count_for_test(&self) -> usize {
        arch::without_interrupts(|| self.items.count())
    }
}

/// Future for receiving one message; created by [`Queue::recv`] (usually via
/// [`Actor::recv`]).
///
/// First poll either completes with a buffered message or parks the actor.
/// The next poll only happens after a push delivered into the actor's
/// mailbox and the scheduler resumed it, so it completes by draining the
/// mailbox.
pub struct Recv<'q, T: 'static> {
    queue: &'q Queue<T>,
    subscriber: &'static Actor,
    parked: bool,
}

impl<T: 'static> Future for Recv<'_, T> {
    type Output = Owned<Message<T>>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.parked {
            // Safety: this future parked the actor on `queue`, and only that
            // queue delivers to the mailbox, so the erased payload type is
            // `T`. A resume after parking on a queue implies delivery.
            match unsafe { this.subscriber.take_mailbox::<T>() } {
                Some(msg) => Poll::Ready(msg),
                None => panic!(),
            }
        } else {
            match this.queue.pop_or_park(this.subscriber) {
                Some(msg) => Poll::Ready(msg),
                None => {
                    this.parked = true;
                    Poll::Pending
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::InterruptNum;
    use crate::pool::Pool;
    use claim_cell::ClaimCell;
    use core::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn push_buffers_when_nobody_waits() {
        static SLAB: ClaimCell<[Message<u32>; 2]> =
            ClaimCell::new([Message::new(0), Message::new(0)]);
        static POOL: Pool<u32> = Pool::new();
        static QUEUE: Queue<u32> = Queue::new();
        POOL.attach(SLAB.claim());

        assert!(QUEUE.try_pop().is_none());
        assert_eq!(QUEUE.len_for_test(), 0);

        QUEUE.push(POOL.alloc().unwrap());
        QUEUE.push(POOL.alloc().unwrap());
        assert_eq!(QUEUE.len_for_test(), 2);
        assert_eq!(QUEUE.list_count_for_test(), 2);

        drop(QUEUE.try_pop().unwrap());
        drop(QUEUE.try_pop().unwrap());
        assert!(QUEUE.try_pop().is_none());
        assert_eq!(QUEUE.len_for_test(), 0);
    }

    /// Round-trip: push-then-pop on an idle queue yields the same slot,
    /// payload untouched.
    #[test]
    fn push_pop_roundtrip_is_identity() {
        static SLAB: ClaimCell<[Message<u32>; 1]> = ClaimCell::new([Message::new(0)]);
        static POOL: Pool<u32> = Pool::new();
        static QUEUE: Queue<u32> = Queue::new();
        POOL.attach(SLAB.claim());

        let mut msg = POOL.alloc().unwrap();
        **msg = 0xDEAD_BEEF;
        let addr = &*msg as *const Message<u32>;
        QUEUE.push(msg);

        let back = QUEUE.try_pop().unwrap();
        assert_eq!(&*back as *const Message<u32>, addr);
        assert_eq!(**back, 0xDEAD_BEEF);
    }

    /// S6: scripted interleaving of pushes, pops, and subscriber wakeups;
    /// after every step the signed length agrees with the walked list and
    /// with what `try_pop` is willing to do.
    #[test]
    fn length_tracks_list_through_interleavings() {
        const PRIO: u8 = 1;
        static SLAB: ClaimCell<[Message<u32>; 4]> = ClaimCell::new([
            Message::new(0),
            Message::new(0),
            Message::new(0),
            Message::new(0),
        ]);
        static POOL: Pool<u32> = Pool::new();
        static QUEUE: Queue<u32> = Queue::new();
        static A: Actor = Actor::new(InterruptNum(30));
        static B: Actor = Actor::new(InterruptNum(31));
        static CONSUMED: AtomicU32 = AtomicU32::new(0);

        async fn chew(us: &'static Actor) -> Infallible {
            loop {
                let msg = us.recv(&QUEUE).await;
                drop(msg);
                CONSUMED.fetch_add(1, Ordering::Relaxed);
            }
        }

        POOL.attach(SLAB.claim());
        arch::set_vector_priority(A.vector(), PRIO);
        arch::set_vector_priority(B.vector(), PRIO);
        A.start(chew(&A));
        B.start(chew(&B));

        let check = || {
            let length = QUEUE.len_for_test();
            assert_eq!(
                length.unsigned_abs() as usize,
                QUEUE.list_count_for_test()
            );
            if length <= 0 {
                // Nothing buffered: the list holds subscribers (or nothing).
                assert!(QUEUE.try_pop().is_none());
            }
        };
        check();

        // Fixed-seed LCG; the point is coverage of orderings, not
        // unpredictability.
        let mut state = 0x2F6E_2B1Eu32;
        let mut lcg = move || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            state >> 16
        };

        for _ in 0..400 {
            match lcg() % 3 {
                0 => {
                    if let Some(msg) = POOL.alloc() {
                        QUEUE.push(msg);
                    }
                }
                1 => {
                    drop(QUEUE.try_pop());
                }
                _ => {
                    for actor in [&A, &B] {
                        if arch::take_pending(actor.vector()) {
                            sched::schedule(actor.vector());
                        }
                    }
                }
            }
            check();
        }

        // Drain: run the subscribers dry and return everything to the pool.
        for actor in [&A, &B] {
            if arch::take_pending(actor.vector()) {
                sched::schedule(actor.vector());
            }
        }
        while QUEUE.try_pop().is_some() {}
        check();
        assert!(CONSUMED.load(Ordering::Relaxed) > 0);
    }
}
