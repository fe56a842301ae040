// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Port for ARMv{6,7,8}-M parts with an NVIC.
//!
//! # Critical sections
//!
//! The kernel's critical sections are PRIMASK save/restore, not a bare
//! disable/enable pair. Sections nest -- the timer's tick loop activates
//! actors, and activation opens its own section -- and save/restore means the
//! inner exit leaves interrupts masked until the outermost exit. The cost is
//! one extra register read per section.
//!
//! # Pending a vector
//!
//! Activation latches the actor's vector through the Interrupt Set Pending
//! Register. Writing a vector's ISPR bit from inside a masked section is
//! fine: the NVIC remembers, and the interrupt fires once the section ends
//! and no higher-priority vector is active.

use super::InterruptNum;
use crate::config;

/// Runs `f` with all maskable interrupts disabled, restoring the previous
/// mask state afterward.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let primask = cortex_m::register::primask::read();
    cortex_m::interrupt::disable();
    let r = f();
    if primask.is_active() {
        // Safety: we are restoring the state we observed on entry, so we
        // cannot be unmasking inside somebody else's critical section.
        unsafe { cortex_m::interrupt::enable() };
    }
    r
}

/// Asks the NVIC to latch vector `n` as pending.
pub fn pend_software_irq(InterruptNum(n): InterruptNum) {
    let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };
    let reg_num = (n / 32) as usize;
    let bit_mask = 1 << (n % 32);

    // Pend the IRQ by poking the corresponding bit in the Interrupt Set
    // Pending Register (ISPR).
    match nvic.ispr.get(reg_num) {
        Some(ispr_reg) => unsafe { ispr_reg.write(bit_mask) },
        None => panic!(),
    }
}

/// Reads back the priority programmed into the NVIC for vector `n`, as a
/// small index (0 = most urgent).
///
/// This is how an actor learns its own priority: the application programs the
/// IPR slot as part of wiring, and the kernel treats the hardware as the
/// single source of truth rather than carrying a shadow copy.
pub fn vector_priority(InterruptNum(n): InterruptNum) -> u8 {
    // The IPR bytes live at 0xE000_E400 + n. Read the containing word rather
    // than the byte so this also works on ARMv6-M, which implements only
    // word access to the NVIC.
    const IPR_BASE: usize = 0xE000_E400;
    let addr = (IPR_BASE + (n as usize & !3)) as *const u32;
    // Safety: this is a read of an architecturally-defined, always-mapped
    // system control space register.
    let word = unsafe { core::ptr::read_volatile(addr) };
    let byte = (word >> (8 * (n as usize % 4))) as u8;
    byte >> (8 - config::NVIC_PRIO_BITS)
}
