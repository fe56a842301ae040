// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-shot claiming of `static` storage.
//!
//! Bare-metal code wants big arrays -- message slabs, buffers -- to live in
//! named `static`s, where the linker accounts for them and a debugger can find
//! them. But the code that *uses* such an array generally wants `&'static mut`
//! access, and Rust (quite reasonably) won't hand out a mutable reference to a
//! plain `static`.
//!
//! [`ClaimCell`] bridges the two: it wraps the value in a `static`-compatible
//! cell that can be claimed exactly once, producing a `&'static mut T`. A
//! second claim panics. Because at most one mutable reference is ever created,
//! and no shared reference to the interior is ever given out, the single
//! `&'static mut` is sound for the rest of the program.

#![cfg_attr(not(test), no_std)]

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

/// A cell holding a `T` that can be claimed, once, as `&'static mut T`.
pub struct ClaimCell<T> {
    taken: AtomicBool,
    cell: UnsafeCell<T>,
}

// Safety: the one-claim discipline enforced by `claim` means the contents are
// never aliased; sending the single `&mut T` to another context is fine
// whenever `T` itself can be sent.
unsafe impl<T> Sync for ClaimCell<T> where for<'a> &'a mut T: Send {}

impl<T> ClaimCell<T> {
    /// Creates a cell containing `value`, not yet claimed.
    pub const fn new(value: T) -> Self {
        Self {
            taken: AtomicBool::new(false),
            cell: UnsafeCell::new(value),
        }
    }

    /// Claims the contents, panicking if they have already been claimed.
    #[track_caller]
    #[must_use = "claiming and discarding the reference makes the contents \
                  permanently inaccessible"]
    pub fn claim(&'static self) -> &'static mut T {
        if self.taken.swap(true, Ordering::Relaxed) {
            panic!();
        }
        // Safety: the swap above succeeds for exactly one caller over the
        // life of the program, so this reference is never aliased.
        unsafe { &mut *self.cell.get() }
    }
}
