// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Port layer: everything the kernel needs from an interrupt controller.
//!
//! The rest of the kernel is written against exactly three operations --
//! mask-all-interrupts around a closure, latch a vector as pending, and ask
//! what priority a vector was programmed with -- plus the [`InterruptNum`]
//! vocabulary type. Two ports provide them:
//!
//! - `arm_m`, the real thing, for ARMv6/7/8-M parts with an NVIC. Selected
//!   when building freestanding (`target_os = "none"`).
//! - `hosted`, a stand-in used for `cargo test`: pends are recorded instead
//!   of delivered, priorities come from a table the test fills in, and a
//!   process-wide recursive lock plays the role of PRIMASK. Tests act as the
//!   interrupt controller by observing recorded pends and calling
//!   [`sched::schedule`](crate::sched::schedule) themselves.

/// Name of an interrupt vector in the interrupt controller, i.e. an external
/// interrupt number as the NVIC counts them (IRQ0 is vector 0).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct InterruptNum(pub u32);

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        mod arm_m;
        pub use arm_m::*;
    } else {
        mod hosted;
        pub use hosted::*;
    }
}
