//! Abstraction for the memory that backs a heap. The allocator only needs
//! a contiguous region that grows at its high end; it never returns memory
//! and it doesn't care whether the bytes come from the real program break
//! or from a buffer somebody carved out in-process.
//!
//! [`SystemBreak`] moves the actual break with `sbrk`, which is what a
//! malloc replacement wants. [`FixedArena`] serves the same interface from
//! a bounded allocation, which is what tests, Miri and multi-instance
//! setups want, and is also the only way to observe growth refusal
//! deterministically.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::block::ALIGNMENT;
use crate::Pointer;

/// A contiguous, grow-only byte region.
///
/// # Safety
///
/// Implementations must uphold what the heap layout arithmetic relies on:
///
/// - the first address handed out is 16 byte aligned and stays the low
///   boundary forever,
/// - each successful [`grow`](MemorySource::grow) returns the previous
///   break, and the new bytes start exactly there,
/// - the region belongs to this source alone; nobody else writes it,
/// - a failed grow leaves the region untouched.
pub unsafe trait MemorySource {
    /// Advances the break by `delta` bytes and returns the old break, or
    /// `None` if the host refuses to grow.
    unsafe fn grow(&mut self, delta: usize) -> Pointer<u8>;

    /// Low boundary of the region. Meaningless before the first grow.
    fn low(&self) -> *mut u8;

    /// Last valid byte of the region, `low() - 1` when nothing has been
    /// requested yet.
    fn high(&self) -> *mut u8;

    /// Bytes between the low boundary and the break.
    fn size(&self) -> usize;

    /// Virtual memory page size in bytes.
    fn page_size(&self) -> usize;
}

/// The program break, moved with [`libc::sbrk`].
///
/// The first use records the break as the permanent low boundary, padding
/// it up to 16 bytes first so payload alignment works out. Anything
/// else in the process that moves the break afterwards breaks the
/// contiguity contract; that is the same bargain the classical `sbrk`
/// based mallocs strike.
#[cfg(all(unix, not(miri)))]
pub struct SystemBreak {
    start: *mut u8,
    brk: *mut u8,
}

#[cfg(all(unix, not(miri)))]
impl SystemBreak {
    pub const fn new() -> Self {
        Self {
            start: std::ptr::null_mut(),
            brk: std::ptr::null_mut(),
        }
    }

    unsafe fn ensure_init(&mut self) -> bool {
        use libc::{c_void, intptr_t, sbrk};

        if !self.start.is_null() {
            return true;
        }

        let brk = sbrk(0);
        if brk == usize::MAX as *mut c_void {
            return false;
        }

        let mut brk = brk.cast::<u8>();
        let misalign = brk as usize % ALIGNMENT;
        if misalign != 0 {
            if sbrk((ALIGNMENT - misalign) as intptr_t) == usize::MAX as *mut c_void {
                return false;
            }
            brk = brk.add(ALIGNMENT - misalign);
        }

        self.start = brk;
        self.brk = brk;

        true
    }
}

#[cfg(all(unix, not(miri)))]
impl Default for SystemBreak {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(unix, not(miri)))]
unsafe impl MemorySource for SystemBreak {
    unsafe fn grow(&mut self, delta: usize) -> Pointer<u8> {
        use libc::{c_void, intptr_t, sbrk};

        if !self.ensure_init() || delta > isize::MAX as usize {
            return None;
        }

        let address = sbrk(delta as intptr_t);
        if address == usize::MAX as *mut c_void {
            return None;
        }

        let address = address.cast::<u8>();
        debug_assert_eq!(address, self.brk, "the break moved behind our back");
        self.brk = address.add(delta);

        NonNull::new(address)
    }

    fn low(&self) -> *mut u8 {
        self.start
    }

    fn high(&self) -> *mut u8 {
        self.brk.wrapping_sub(1)
    }

    fn size(&self) -> usize {
        self.brk as usize - self.start as usize
    }

    fn page_size(&self) -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
    }
}

/// A bounded arena with an internal break. Growth past the capacity fails,
/// which makes out-of-memory paths testable.
pub struct FixedArena {
    base: NonNull<u8>,
    layout: Layout,
    brk: usize,
}

impl FixedArena {
    /// Reserves `capacity` bytes up front. The arena never grows its
    /// reservation; it only moves its break inside it.
    pub fn new(capacity: usize) -> Self {
        let layout = Layout::from_size_align(capacity.max(ALIGNMENT), ALIGNMENT).unwrap();
        let Some(base) = NonNull::new(unsafe { alloc::alloc(layout) }) else {
            alloc::handle_alloc_error(layout);
        };

        Self {
            base,
            layout,
            brk: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for FixedArena {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

unsafe impl MemorySource for FixedArena {
    unsafe fn grow(&mut self, delta: usize) -> Pointer<u8> {
        if delta > self.layout.size() - self.brk {
            return None;
        }

        let old_break = self.base.as_ptr().add(self.brk);
        self.brk += delta;

        Some(NonNull::new_unchecked(old_break))
    }

    fn low(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    fn high(&self) -> *mut u8 {
        self.base.as_ptr().wrapping_add(self.brk).wrapping_sub(1)
    }

    fn size(&self) -> usize {
        self.brk
    }

    fn page_size(&self) -> usize {
        4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_break_is_monotonic_and_contiguous() {
        let mut arena = FixedArena::new(4096);
        unsafe {
            let first = arena.grow(64).unwrap();
            let second = arena.grow(32).unwrap();
            assert_eq!(first.as_ptr() as usize % ALIGNMENT, 0);
            assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 64);
            assert_eq!(arena.size(), 96);
            assert_eq!(arena.low(), first.as_ptr());
            assert_eq!(arena.high() as usize, first.as_ptr() as usize + 95);
        }
    }

    #[test]
    fn arena_refuses_growth_past_capacity() {
        let mut arena = FixedArena::new(128);
        unsafe {
            assert!(arena.grow(128).is_some());
            assert!(arena.grow(1).is_none());
            // A refused grow changes nothing.
            assert_eq!(arena.size(), 128);
            assert!(arena.grow(0).is_some());
        }
    }

    #[test]
    fn tiny_capacity_is_rounded_up_to_alignment() {
        let arena = FixedArena::new(1);
        assert_eq!(arena.capacity(), ALIGNMENT);
    }
}
