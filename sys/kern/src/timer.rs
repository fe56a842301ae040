// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The timer wheel.
//!
//! Sleeping actors are filed into one of [`config::TIMERQ_MAX`] buckets by
//! `diff_msb(now, deadline)`: the index of the most significant bit in which
//! the deadline differs from the current tick, capped at the last bucket.
//! The trick is that on any given tick, exactly one bucket can contain newly
//! due entries -- the bucket whose index is the highest bit that just flipped
//! in the counter -- so [`tick`] examines only that bucket. Entries found
//! there either fire now or cascade toward bucket 0, each paying O(log
//! horizon) visits over the whole sleep.
//!
//! The entire fire-or-cascade loop runs inside one timer critical section,
//! so a preempting push or subscribe can never observe a sleeper detached
//! from one bucket but not yet filed in the next. Activations nest their own
//! (save/restore) critical section inside ours, which is fine by the port
//! contract.
//!
//! Ticks are a wrapping 32-bit count. `diff_msb` works on the XOR of its
//! arguments, so bucket math stays consistent across the wrap; delays are
//! bounded below 2^31 to keep deadlines unambiguous.

use crate::actor::Actor;
use crate::arch;
use crate::config;
use crate::list::List;
use crate::sched;
use core::cell::Cell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

pub(crate) struct Timer {
    subscribers: [List; config::TIMERQ_MAX],
    /// Occupancy per bucket. Snapshot-and-zeroed by `advance` so a cascade
    /// that refiles into the bucket under examination isn't re-examined this
    /// tick.
    length: [Cell<usize>; config::TIMERQ_MAX],
    ticks: Cell<u32>,
}

// Safety: wheel state is only touched inside the timer's critical sections.
unsafe impl Sync for Timer {}

static TIMER: Timer = Timer::new();

/// Advances kernel time by one tick and activates every sleeper that came
/// due. This is the entire body of the periodic tick ISR.
pub fn tick() {
    TIMER.advance();
}

/// Returns the future an actor awaits to sleep for `delay` ticks.
pub(crate) fn sleep(subscriber: &'static Actor, delay: u32) -> Sleep<'static> {
    Sleep {
        timer: &TIMER,
        subscriber,
        delay,
        parked: false,
    }
}

impl Timer {
    pub(crate) const fn new() -> Self {
        const EMPTY: List = List::new();
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: Cell<usize> = Cell::new(0);
        Self {
            subscribers: [EMPTY; config::TIMERQ_MAX],
            length: [ZERO; config::TIMERQ_MAX],
            ticks: Cell::new(0),
        }
    }

    /// Bucket index for a sleeper filed at tick `a` with deadline `b` (or
    /// re-filed at tick `b` with deadline `a`; the metric is symmetric).
    fn diff_msb(a: u32, b: u32) -> usize {
        uassert!(a != b);
        let i = (31 - (a ^ b).leading_zeros()) as usize;
        if i < config::TIMERQ_MAX {
            i
        } else {
            config::TIMERQ_MAX - 1
        }
    }

    /// Files `subscriber` to be activated `delay` ticks from now.
    pub(crate) fn subscribe(&self, subscriber: &'static Actor, delay: u32) {
        uassert!(delay > 0);
        uassert!(delay < 1 << 31);
        arch::without_interrupts(|| {
            let now = self.ticks.get();
            let deadline = now.wrapping_add(delay);
            subscriber.set_timeout(deadline);

            let bucket = Self::diff_msb(now, deadline);
            // Safety: the subscriber is the actor executing this sleep, so
            // it is unlinked and its execution is the sole owner.
            self.subscribers[bucket].push_back(unsafe { subscriber.park() });
            self.length[bucket].set(self.length[bucket].get() + 1);
        });
    }

    pub(crate) fn advance(&self) {
        arch::without_interrupts(|| {
            let prev = self.ticks.get();
            let now = prev.wrapping_add(1);
            self.ticks.set(now);

            // The one bucket whose entries may have become due: indexed by
            // the highest bit that flipped in the counter.
            let bucket = Self::diff_msb(prev, now);
            let due = self.length[bucket].replace(0);

            for _ in 0..due {
                let subscriber = match self.subscribers[bucket].pop_front::<Actor>() {
                    Some(subscriber) => subscriber,
                    // Bucket occupancy disagreed with the list.
                    None => panic!(),
                };

                if subscriber.timeout() == now {
                    sched::activate(subscriber);
                } else {
                    let next = Self::diff_msb(subscriber.timeout(), now);
                    self.subscribers[next].push_back(subscriber);
                    self.length[next].set(self.length[next].get() + 1);
                }
            }
        });
    }

    /// The sleep future against a specific wheel, so tests can run private
    /// wheels without touching global time.
    #[cfg(test)]
    pub(crate) fn sleep_on<'t>(&'t self, subscriber: &'static Actor, delay: u32) -> Sleep<'t> {
        Sleep {
            timer: self,
            subscriber,
            delay,
            parked: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn bucket_len_for_test(&self, bucket: usize) -> usize {
        arch::without_interrupts(|| self.length[bucket].get())
    }

    #[cfg(test)]
    pub(crate) fn now_for_test(&self) -> u32 {
        arch::without_interrupts(|| self.ticks.get())
    }
}

/// Future for a timed sleep; created by [`Actor::sleep`].
///
/// First poll files the actor on the wheel and suspends (unless the delay is
/// zero, which completes immediately). The next poll only happens once the
/// wheel activated the actor at its deadline.
pub struct Sleep<'t> {
    timer: &'t Timer,
    subscriber: &'static Actor,
    delay: u32,
    parked: bool,
}

impl Future for Sleep<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        if this.delay == 0 || this.parked {
            Poll::Ready(())
        } else {
            this.timer.subscribe(this.subscriber, this.delay);
            this.parked = true;
            Poll::Pending
        }
    }
}
