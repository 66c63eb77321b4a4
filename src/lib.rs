//! Segregated free list allocator over a single contiguous heap that can
//! only grow at its high end.
//!
//! The heap is a sequence of blocks, each led by one packed header word.
//! Free blocks are indexed by 15 size-class buckets, allocated blocks carry
//! no footer (the successor's header remembers what sits below it), and
//! 16-byte mini blocks serve 8-byte payloads with minimal overhead. See
//! [`block`] for the on-heap format and [`allocator`] for the algorithms.
//!
//! The backing memory comes from a [`MemorySource`]: either the real
//! program break ([`SystemBreak`]) or a bounded in-process arena
//! ([`FixedArena`]), which is what tests and Miri use. [`Heap`] is an
//! ordinary struct, so several independent heaps can coexist. [`Segalloc`]
//! wraps one behind a mutex and implements [`std::alloc::GlobalAlloc`].

use std::ptr::NonNull;

mod allocator;
mod block;
mod checker;
mod freelist;
mod header;
mod platform;

/// Non-null pointer to `T`. We use this in most cases instead of `*mut T`
/// because the compiler will yell at us if we don't write code for the
/// `None` case. `None` plays the role of the null pointer in the classical
/// allocation interface: `allocate` returns it on failure and `free`
/// accepts it as a no-op.
pub type Pointer<T> = Option<NonNull<T>>;

pub use allocator::{Heap, Segalloc};
pub use platform::{FixedArena, MemorySource};

#[cfg(all(unix, not(miri)))]
pub use platform::SystemBreak;
