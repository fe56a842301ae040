// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hosted stand-in for the interrupt controller, for `cargo test`.
//!
//! Three fakes:
//!
//! - Pends are recorded in a flag per vector. A test observes them with
//!   [`take_pending`] and plays interrupt controller by calling
//!   `sched::schedule` itself.
//! - Vector priorities come from a table filled in by [`set_vector_priority`]
//!   (the hosted analogue of programming an IPR slot during board wiring).
//! - `without_interrupts` takes a process-wide recursive lock. On hardware,
//!   masking interrupts serializes every kernel critical section in the
//!   system; the lock gives the same guarantee when the test harness runs
//!   tests on several threads. Tests that want isolation from each other use
//!   distinct vectors and priority lanes, not distinct lock domains.

use super::InterruptNum;
use core::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Vectors the fake controller models. Matches the NVIC architectural limit
/// for external interrupts on the parts we care about.
const VECTOR_LIMIT: usize = 240;

static PENDING: [AtomicBool; VECTOR_LIMIT] = {
    #[allow(clippy::declare_interior_mutable_const)]
    const CLEAR: AtomicBool = AtomicBool::new(false);
    [CLEAR; VECTOR_LIMIT]
};

static PRIORITY: [AtomicU8; VECTOR_LIMIT] = {
    #[allow(clippy::declare_interior_mutable_const)]
    const ZERO: AtomicU8 = AtomicU8::new(0);
    [ZERO; VECTOR_LIMIT]
};

/// Owner token of the fake PRIMASK lock; 0 means unlocked.
static LOCK: AtomicUsize = AtomicUsize::new(0);
static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);

std::thread_local! {
    static TOKEN: usize = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Releases the recursive lock on scope exit, so a panicking assertion
/// inside a critical section doesn't wedge every other test.
struct Unmask;

impl Drop for Unmask {
    fn drop(&mut self) {
        DEPTH.with(|d| {
            d.set(d.get() - 1);
            if d.get() == 0 {
                LOCK.store(0, Ordering::Release);
            }
        });
    }
}

/// Runs `f` under the process-wide recursive lock standing in for "all
/// interrupts masked".
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let me = TOKEN.with(|t| *t);
    if LOCK.load(Ordering::Acquire) != me {
        while LOCK
            .compare_exchange(0, me, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::thread::yield_now();
        }
    }
    DEPTH.with(|d| d.set(d.get() + 1));
    let _unmask = Unmask;
    f()
}

/// Records vector `n` as pending.
pub fn pend_software_irq(InterruptNum(n): InterruptNum) {
    PENDING[n as usize].store(true, Ordering::Release);
}

/// Reads the priority previously assigned to vector `n` (0 if none was).
pub fn vector_priority(InterruptNum(n): InterruptNum) -> u8 {
    PRIORITY[n as usize].load(Ordering::Relaxed)
}

/// Test hook: assigns a priority to vector `n`, as board wiring would by
/// programming the NVIC IPR.
pub fn set_vector_priority(InterruptNum(n): InterruptNum, prio: u8) {
    PRIORITY[n as usize].store(prio, Ordering::Relaxed);
}

/// Test hook: consumes and returns the pending flag for vector `n`.
pub fn take_pending(InterruptNum(n): InterruptNum) -> bool {
    PENDING[n as usize].swap(false, Ordering::Acquire)
}

/// Test hook: reads the pending flag for vector `n` without consuming it.
pub fn is_pending(InterruptNum(n): InterruptNum) -> bool {
    PENDING[n as usize].load(Ordering::Acquire)
}
