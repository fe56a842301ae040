// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Osmium: an interrupt-driven actor kernel for microcontrollers.
//!
//! Osmium implements preemptive multitasking without a context-switching
//! scheduler: the interrupt controller *is* the scheduler. Each [`Actor`] is
//! bound to an interrupt vector, and the vector's hardware priority is the
//! actor's priority. Activating an actor means pending its vector; the
//! hardware then decides, exactly as it does for any other interrupt, whether
//! that means preempting what's running right now or waiting its turn. A
//! higher-priority actor preempts a lower-priority one because that's what
//! NVIC-class hardware does, not because we wrote code to make it happen.
//!
//! Actors communicate only by moving messages through [`Queue`]s. Messages
//! come from fixed [`Pool`]s sized at build time; the kernel allocates nothing
//! at steady state. An actor's body is an `async` state machine that suspends
//! at exactly two kinds of await points -- wait-for-message and
//! sleep-for-ticks -- and runs uninterrupted (by its own and lower priorities)
//! between them.
//!
//! # Design principles
//!
//! 1. Let the hardware do the scheduling. The kernel's entire scheduling
//!    state is one FIFO list per priority level.
//! 2. Static configuration. Actors, queues, and pools are `static`s; sizes
//!    are fixed in [`config`].
//! 3. Ownership by construction. Every live message has exactly one owner --
//!    a list, a mailbox, or an in-flight [`Owned`] handle -- and the type
//!    system won't let you make a second one.
//! 4. Errors are fatal and few. Pool exhaustion is an `Option`; everything
//!    else that can go wrong is a wiring bug and dies loudly.
//!
//! # Wiring contract
//!
//! For each actor, the application must pick an otherwise-unused interrupt
//! vector, program its NVIC priority, install an ISR whose body is exactly
//! `sched::schedule(VECT)`, and call [`Actor::start`] once before interrupts
//! are enabled. To use sleeps, install a periodic tick ISR whose body is
//! `timer::tick()`. See `app/demo-stm32f1` for the whole dance on real
//! hardware.

#![cfg_attr(target_os = "none", no_std)]

macro_rules! uassert {
    ($cond : expr) => {
        if !$cond {
            panic!("Assertion failed!");
        }
    };
}

pub mod arch;
pub mod config;

pub mod actor;
#[cfg(target_os = "none")]
pub mod fail;
pub mod list;
pub mod owned;
pub mod pool;
pub mod queue;
pub mod sched;
pub mod timer;

pub use actor::Actor;
pub use arch::InterruptNum;
pub use owned::Owned;
pub use pool::Pool;
pub use queue::{Message, Queue};
