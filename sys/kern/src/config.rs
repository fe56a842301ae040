// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build-time sizing.
//!
//! These constants take the place of a generated configuration: applications
//! retune them by editing this file, and the tables they size are fixed for
//! the life of the program.

/// Number of priority bits implemented by the NVIC on the target part.
///
/// Cortex-M parts implement between 2 and 8 of the 8 architectural priority
/// bits; STM32F1-class devices implement 4. The kernel uses this to translate
/// the byte read from an IPR slot into a small priority index.
pub const NVIC_PRIO_BITS: u32 = 4;

/// Number of distinct priority levels, and therefore of scheduler run-queues.
///
/// One per NVIC priority level. Memory cost is one list head per level, so
/// there is little reason to shrink this below the hardware maximum.
pub const PRIO_MAX: usize = 1 << NVIC_PRIO_BITS;

/// Number of timer wheel buckets.
///
/// Bucket `b` holds sleepers whose deadline differs from the current tick in
/// bit `b` (capped at the last bucket), so 10 buckets give exact bucket
/// selection for sleeps up to 2^9 ticks and amortized cascading beyond that.
pub const TIMERQ_MAX: usize = 10;

/// Bytes reserved for actor body state machines.
///
/// [`Actor::start`](crate::Actor::start) moves each body into this arena
/// exactly once, at startup. Overrun is fatal; size it for the sum of your
/// actors' `async` state machines (the build reports each one's size if you
/// ask with `-Zprint-type-sizes`).
pub const FRAME_ARENA_SIZE: usize = 4096;
