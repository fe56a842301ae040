// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Actors and their suspended bodies.
//!
//! An [`Actor`] is a permanent, statically-declared unit of execution bound
//! to an interrupt vector. Its body is an `async` state machine that loops
//! forever, suspending only at the kernel's two await points (receive,
//! sleep). The kernel doesn't use wakers to schedule -- activation pends the
//! actor's vector and the vector's ISR re-polls the body -- so resumption is
//! performed with a no-op waker and the "captured continuation" is simply the
//! suspended future itself.
//!
//! Bodies are moved into a fixed bump arena at startup by [`Actor::start`],
//! which also runs the body to its first suspension. Nothing in the arena is
//! ever freed; actors don't exit. Arena overrun means the build was sized
//! wrong and is fatal.
//!
//! Between its suspensions an actor is *in flight*: popped off a run-queue,
//! owned by the ISR invocation resuming it, linked nowhere. Its own await
//! points are what park it again.

use crate::arch::{self, InterruptNum};
use crate::config;
use crate::list::{Linked, Node};
use crate::owned::Owned;
use crate::pool::Pool;
use crate::queue::{Message, Queue, Recv};
use crate::timer::{self, Sleep};
use core::cell::{Cell, UnsafeCell};
use core::convert::Infallible;
use core::future::Future;
use core::mem::{self, MaybeUninit};
use core::pin::Pin;
use core::ptr::NonNull;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

/// A unit of execution bound to an interrupt vector.
///
/// Declare one as a `static`, then wire it per the crate-level contract and
/// [`start`](Actor::start) it once. Actors are never destroyed.
#[repr(C)]
pub struct Actor {
    link: Node,
    /// Single-message receive slot. The payload type is erased here; the
    /// `Recv` future that parked the actor knows it.
    mailbox: Cell<Option<NonNull<()>>>,
    /// Tick deadline, meaningful only while parked on the timer wheel.
    timeout: Cell<u32>,
    /// The suspended body, once `start` has planted it in the arena.
    frame: Cell<Option<NonNull<dyn Future<Output = Infallible> + 'static>>>,
    vect: InterruptNum,
    /// Resolved from the vector's programmed priority during `start`, and
    /// fixed from then on.
    prio: Cell<u8>,
}

// Safety: the cells are only touched inside port critical sections, or (for
// `frame`) by the single resume running at this actor's priority; see the
// module doc for the in-flight ownership story.
unsafe impl Sync for Actor {}
unsafe impl Send for Actor {}

impl Actor {
    /// Creates the actor bound to `vect`. Its priority is resolved from the
    /// interrupt controller when `start` runs, after board wiring has
    /// programmed it.
    pub const fn new(vect: InterruptNum) -> Self {
        Self {
            link: Node::new(),
            mailbox: Cell::new(None),
            timeout: Cell::new(0),
            frame: Cell::new(None),
            vect,
            prio: Cell::new(0),
        }
    }

    /// The interrupt vector this actor is bound to.
    pub fn vector(&self) -> InterruptNum {
        self.vect
    }

    pub(crate) fn priority(&self) -> u8 {
        self.prio.get()
    }

    /// Moves `body` into the frame arena and runs it to its first
    /// suspension. Call exactly once per actor, before interrupts are
    /// enabled; starting twice is fatal.
    pub fn start(&'static self, body: impl Future<Output = Infallible> + Send + 'static) {
        uassert!(self.frame.get().is_none());
        self.prio.set(arch::vector_priority(self.vect));
        self.frame.set(Some(FRAME_ARENA.store(body)));
        self.resume();
    }

    /// Re-enters the suspended body. Runs in the ISR for this actor's
    /// vector (via the scheduler), or in `main` during `start`.
    pub(crate) fn resume(&self) {
        let frame = match self.frame.get() {
            Some(frame) => frame,
            // Activated before `start`: a wiring bug.
            None => panic!(),
        };

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        // Safety: the frame sits in the arena, pinned for the program's life,
        // and resumes never overlap: only one invocation per actor can be
        // live, because the actor is in exactly one list (or in flight in
        // exactly one ISR) at a time.
        let body = unsafe { Pin::new_unchecked(&mut *frame.as_ptr()) };
        match body.poll(&mut cx) {
            Poll::Pending => (),
            Poll::Ready(never) => match never {},
        }
    }

    /// Takes an owning handle to this actor for parking it on a wait list.
    ///
    /// # Safety
    ///
    /// The caller must be the actor's own execution (its body, during an
    /// await), which is the moment the actor is in flight and unowned by any
    /// list.
    pub(crate) unsafe fn park(&'static self) -> Owned<Actor> {
        uassert!(!self.link.is_linked());
        unsafe { Owned::from_raw(NonNull::from(self)) }
    }

    /// Places `msg` in the mailbox. The slot must be empty: an actor parked
    /// on a queue is delivered to at most once before it resumes.
    pub(crate) fn deliver<T: 'static>(&self, msg: Owned<Message<T>>) {
        uassert!(self.mailbox.get().is_none());
        self.mailbox.set(Some(msg.into_raw().cast::<()>()));
    }

    /// Empties the mailbox, restoring the erased payload type.
    ///
    /// # Safety
    ///
    /// `T` must be the element type of the queue this actor last parked on;
    /// the `Recv` future that parked it is the only caller in a position to
    /// know that.
    pub(crate) unsafe fn take_mailbox<T: 'static>(&self) -> Option<Owned<Message<T>>> {
        self.mailbox
            .take()
            .map(|msg| unsafe { Owned::from_raw(msg.cast::<Message<T>>()) })
    }

    pub(crate) fn set_timeout(&self, deadline: u32) {
        self.timeout.set(deadline);
    }

    pub(crate) fn timeout(&self) -> u32 {
        self.timeout.get()
    }

    /// Awaits one message from `queue`.
    pub fn recv<'q, T: 'static>(&'static self, queue: &'q Queue<T>) -> Recv<'q, T> {
        queue.recv(self)
    }

    /// Awaits a free message slot from `pool`, parking until a message is
    /// dropped back if the pool is dry.
    pub fn get<T: 'static>(&'static self, pool: &'static Pool<T>) -> Recv<'static, T> {
        pool.get(self)
    }

    /// Awaits the passage of `delay` timer ticks. `sleep(0)` completes
    /// immediately.
    pub fn sleep(&'static self, delay: u32) -> Sleep<'static> {
        timer::sleep(self, delay)
    }
}

// Safety: `#[repr(C)]` with the node first, per the `Linked` contract.
unsafe impl Linked for Actor {
    fn reclaim(_ptr: NonNull<Self>) {
        // Actors are permanent; every handle is either parked into a list or
        // consumed by a resume. Reaching this drop is a kernel bug.
        panic!()
    }
}

fn noop_waker() -> Waker {
    fn clone(_: *const ()) -> RawWaker {
        RawWaker::new(core::ptr::null(), &VTABLE)
    }
    static VTABLE: RawWakerVTable =
        RawWakerVTable::new(clone, |_| (), |_| (), |_| ());
    // Safety: every vtable entry is a no-op, which satisfies the RawWaker
    // contract trivially.
    unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) }
}

/// Bump arena holding every actor's body state machine.
///
/// Grows monotonically during startup, then never changes. Kept in a named
/// static so a debugger can see how much of it a build actually uses.
struct FrameArena {
    bytes: UnsafeCell<[MaybeUninit<u8>; config::FRAME_ARENA_SIZE]>,
    used: Cell<usize>,
}

// Safety: `store` runs under the port critical section, and the reservations
// it hands out are disjoint.
unsafe impl Sync for FrameArena {}

#[used]
static FRAME_ARENA: FrameArena = FrameArena {
    bytes: UnsafeCell::new([MaybeUninit::uninit(); config::FRAME_ARENA_SIZE]),
    used: Cell::new(0),
};

impl FrameArena {
    /// Moves `body` into the arena, returning the type-erased stable
    /// address. Exhaustion is fatal: frame sizes are a build-time property,
    /// so running out means `config::FRAME_ARENA_SIZE` is simply wrong.
    fn store<F>(&self, body: F) -> NonNull<dyn Future<Output = Infallible> + 'static>
    where
        F: Future<Output = Infallible> + Send + 'static,
    {
        arch::without_interrupts(|| {
            let align = mem::align_of::<F>();
            let start = (self.used.get() + align - 1) & !(align - 1);
            let end = match start.checked_add(mem::size_of::<F>()) {
                Some(end) if end <= config::FRAME_ARENA_SIZE => end,
                _ => panic!("actor frame arena exhausted"),
            };
            self.used.set(end);

            // Safety: the range [start, end) is in bounds, suitably aligned,
            // and reserved for this frame alone by the cursor bump above.
            unsafe {
                let slot = (self.bytes.get() as *mut u8).add(start) as *mut F;
                slot.write(body);
                NonNull::new_unchecked(slot as *mut (dyn Future<Output = Infallible> + 'static))
            }
        })
    }
}
