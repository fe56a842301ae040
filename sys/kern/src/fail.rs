// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recording kernel deaths where a debugger can find them.
//!
//! The kernel has no recovery paths: an invariant violation, a mis-wired
//! actor, or an exhausted frame arena ends here. Two statics form the binary
//! interface to tooling:
//!
//! - `KERNEL_HAS_FAILED` is cleared at load and set on the way down; any
//!   other value means memory corruption or a half-booted image.
//! - `KERNEL_EPITAPH` receives as much of the failure description (UTF-8,
//!   NUL-padded) as fits.
//!
//! After writing the epitaph the CPU parks in a loop with interrupts in
//! whatever state they were -- there is nothing useful left to run, and a
//! halted loop is the friendliest thing to attach a debugger to.

use core::fmt::{Display, Write};
use core::sync::atomic::Ordering;

#[used]
static mut KERNEL_HAS_FAILED: bool = false;

const EPITAPH_LEN: usize = 96;

#[used]
static mut KERNEL_EPITAPH: [u8; EPITAPH_LEN] = [0; EPITAPH_LEN];

fn begin_epitaph() -> &'static mut [u8; EPITAPH_LEN] {
    // Safety: this is the only site that touches the flag, and it runs at
    // most once down the happy path; the double-failure case below never
    // returns.
    let previous_fail = unsafe {
        core::ptr::replace(core::ptr::addr_of_mut!(KERNEL_HAS_FAILED), true)
    };
    if previous_fail {
        // Dying while dying. Writing a second epitaph over the first would
        // destroy the interesting one, so just stop here.
        loop {
            core::sync::atomic::fence(Ordering::SeqCst);
        }
    }

    // Safety: the flag ensures only one execution ever gets here, so the
    // mutable reference is unique.
    unsafe { &mut *core::ptr::addr_of_mut!(KERNEL_EPITAPH) }
}

/// Records `msg` as the kernel's last words and parks the CPU.
#[inline(always)]
pub fn die(msg: impl Display) -> ! {
    die_impl(&msg)
}

#[inline(never)]
fn die_impl(msg: &dyn Display) -> ! {
    let buf = begin_epitaph();
    let mut chisel = Chisel { dest: buf };
    write!(chisel, "{msg}").ok();

    loop {
        core::sync::atomic::fence(Ordering::SeqCst);
    }
}

/// Writes into the epitaph buffer, silently truncating at its end.
struct Chisel {
    dest: &'static mut [u8],
}

impl Write for Chisel {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let s = s.as_bytes();
        let n = s.len().min(self.dest.len());
        let (dest, leftovers) = {
            let taken = core::mem::take(&mut self.dest);
            taken.split_at_mut(n)
        };
        dest.copy_from_slice(&s[..n]);
        self.dest = leftovers;
        Ok(())
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    die(info)
}
