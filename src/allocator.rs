//! The allocator itself. A [`Heap`] owns one contiguous arena obtained
//! from a [`MemorySource`] and carves it into blocks:
//!
//! ```text
//!           heap_start                                      epilogue
//!               |                                               |
//! +----------+--v-------------+-----------+-------------+------v---+
//! | prologue |     block      |   block   |    block    | epilogue |
//! | footer   |  (allocated)   |  (free)   | (allocated) |  header  |
//! +----------+----------------+-----------+-------------+----------+
//! ^                                                               ^
//! heap low                                                 heap high
//! ```
//!
//! The prologue footer and epilogue header are zero-size allocated
//! boundary tags, so every real block has a predecessor and a successor
//! and the coalescer never needs a special case for the heap ends.
//!
//! `allocate` rounds the request up to a block size, asks the segregated
//! index for a fit ([`Heap::find_fit`], a bounded best fit), falls back to
//! growing the arena ([`Heap::extend_heap`]), then splits off whatever is
//! left over. `free` coalesces with both heap neighbours before going back
//! into the index. Reallocation is allocate, copy, free; there is no
//! in-place resizing. The heap only ever grows: freed memory is recycled
//! through the index, never returned to the host.
//!
//! [`Segalloc`] wraps a [`Heap`] behind a [`Mutex`] and implements
//! [`GlobalAlloc`] on top of it.

use std::alloc::{GlobalAlloc, Layout};
use std::ptr::{self, NonNull};
use std::sync::Mutex;

use crate::block::{Block, ALIGNMENT, MINI_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::freelist::{class_of, SegregatedList, BUCKET_COUNT, MINI_CLASS};
use crate::header::{self, Word, WORD_SIZE};
use crate::platform::MemorySource;
use crate::Pointer;

#[cfg(all(unix, not(miri)))]
use crate::platform::SystemBreak;

/// Minimum heap extension, in bytes.
pub(crate) const CHUNK_SIZE: usize = 4096;

/// How many qualifying candidates [`Heap::find_fit`] examines per bucket
/// before settling for the best of them. Raising it trades throughput for
/// fragmentation.
const FIT_SCAN_LIMIT: usize = 3;

/// Rounds a request up to a conforming block size: one header word of
/// overhead, then the next multiple of the alignment. Anything that fits
/// in one word of payload becomes a mini block. `None` on arithmetic
/// overflow, which the break could never satisfy anyway.
fn adjusted_size(size: usize) -> Option<usize> {
    if size <= WORD_SIZE {
        return Some(MINI_BLOCK_SIZE);
    }

    let padded = size.checked_add(WORD_SIZE + ALIGNMENT - 1)?;
    Some(padded & !(ALIGNMENT - 1))
}

/// A dynamic storage allocator over a single growable arena.
///
/// All state lives in the struct, so independent heaps over independent
/// sources can coexist, which the tests use extensively.
///
/// # Examples
///
/// ```
/// use segalloc::{FixedArena, Heap};
///
/// let mut heap = Heap::new(FixedArena::new(1 << 20));
///
/// let address = heap.allocate(100).unwrap();
/// unsafe {
///     address.as_ptr().write_bytes(69, 100);
///     assert_eq!(*address.as_ptr(), 69);
///     heap.free(Some(address));
/// }
/// assert!(heap.check_heap(line!()));
/// ```
pub struct Heap<M> {
    pub(crate) memory: M,
    /// First real block, right after the prologue footer. `None` until
    /// [`Heap::init`] succeeds.
    pub(crate) heap_start: Option<Block>,
    pub(crate) free_lists: SegregatedList,
}

impl<M: MemorySource> Heap<M> {
    pub const fn new(memory: M) -> Self {
        Self {
            memory,
            heap_start: None,
            free_lists: SegregatedList::new(),
        }
    }

    /// The backing memory, mostly useful to inspect how much the heap has
    /// grown.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Sets up the boundary tags and the first free chunk. Returns false
    /// if the source refuses the initial growth. Idempotent once it has
    /// succeeded; a failed init may be retried.
    ///
    /// [`Heap::allocate`] calls this lazily, so calling it up front is
    /// only needed when the first operation should not pay for it.
    pub fn init(&mut self) -> bool {
        if self.heap_start.is_some() {
            return true;
        }

        unsafe {
            let start = if self.memory.size() == 0 {
                let Some(start) = self.memory.grow(2 * WORD_SIZE) else {
                    return false;
                };
                start.as_ptr().cast::<Word>()
            } else {
                // A previous attempt laid the boundary tags and then
                // failed to extend; they are still in place at the bottom.
                self.memory.low().cast::<Word>()
            };

            // Prologue footer below, epilogue header above. The first
            // extension will overwrite the epilogue with a real block
            // header at this same address.
            start.write(header::pack(0, true, false, false));
            start.add(1).write(header::pack(0, true, true, false));

            self.heap_start = Some(Block::from_header_address(NonNull::new_unchecked(
                start.add(1).cast(),
            )));
            self.free_lists.clear();

            if self.extend_heap(CHUNK_SIZE).is_none() {
                self.heap_start = None;
                return false;
            }
        }

        log::debug!("heap initialized with {} bytes", self.memory.size());

        true
    }

    /// Allocates `size` bytes and returns the payload address, 16 byte
    /// aligned, or `None` when `size` is zero or memory is exhausted. The
    /// heap is left exactly as it was on failure.
    pub fn allocate(&mut self, size: usize) -> Pointer<u8> {
        if self.heap_start.is_none() && !self.init() {
            return None;
        }

        debug_assert!(self.check_heap(line!()));

        if size == 0 {
            return None;
        }

        let asize = adjusted_size(size)?;
        debug_assert!(asize == MINI_BLOCK_SIZE || asize >= MIN_BLOCK_SIZE);

        unsafe {
            let block = match self.find_fit(asize) {
                Some(block) => block,
                None => self.extend_heap(asize.max(CHUNK_SIZE))?,
            };
            debug_assert!(!block.is_allocated());

            // Mark allocated first; the free list links in the payload
            // survive until the removal right after.
            block.write(block.size(), true, block.prev_allocated(), block.prev_mini());
            self.free_lists.remove(block);

            if let Some(remainder) = self.split_block(block, asize) {
                self.free_lists.insert(remainder);
            }

            debug_assert!(self.check_heap(line!()));

            Some(block.payload())
        }
    }

    /// Returns a block to the heap. `None` is a no-op.
    ///
    /// # Safety
    ///
    /// The pointer must have come from this heap's `allocate` or
    /// `reallocate` and must not have been freed since.
    pub unsafe fn free(&mut self, pointer: Pointer<u8>) {
        let Some(pointer) = pointer else {
            return;
        };

        debug_assert!(self.check_heap(line!()));

        let block = Block::from_payload(pointer);
        debug_assert!(block.is_allocated());

        block.write(block.size(), false, block.prev_allocated(), block.prev_mini());

        let merged = self.coalesce(block);
        self.free_lists.insert(merged);

        debug_assert!(self.check_heap(line!()));
    }

    /// Resizes an allocation by allocating anew, copying the payload and
    /// freeing the old block. A null pointer acts like `allocate`, a zero
    /// size acts like `free` and yields `None`. When allocation fails the
    /// old block is untouched and `None` is returned.
    ///
    /// # Safety
    ///
    /// Same contract as [`Heap::free`].
    pub unsafe fn reallocate(&mut self, pointer: Pointer<u8>, size: usize) -> Pointer<u8> {
        let Some(old) = pointer else {
            return self.allocate(size);
        };

        if size == 0 {
            self.free(Some(old));
            return None;
        }

        let new = self.allocate(size)?;

        let old_block = Block::from_payload(old);
        ptr::copy_nonoverlapping(
            old.as_ptr(),
            new.as_ptr(),
            size.min(old_block.payload_size()),
        );
        self.free(Some(old));

        Some(new)
    }

    /// Allocates `count * size` zeroed bytes. Rejects a zero count and
    /// multiplicative overflow.
    pub fn zeroed_allocate(&mut self, count: usize, size: usize) -> Pointer<u8> {
        if count == 0 {
            return None;
        }

        let total = count.checked_mul(size)?;
        let address = self.allocate(total)?;
        unsafe { address.as_ptr().write_bytes(0, total) };

        Some(address)
    }

    /// Bounded best fit over the segregated index. A mini request takes
    /// the head of the mini bucket straight away since every member is an
    /// exact fit. Otherwise, starting at the request's own class, each
    /// bucket is scanned until [`FIT_SCAN_LIMIT`] candidates that fit have
    /// been seen, and the smallest of them wins; buckets that contribute
    /// no candidate pass the search on to the next class.
    unsafe fn find_fit(&self, asize: usize) -> Option<Block> {
        let start = class_of(asize);

        if start == MINI_CLASS {
            if let Some(head) = self.free_lists.head(MINI_CLASS) {
                return Some(head);
            }
        }

        for class in start..BUCKET_COUNT {
            let mut best: Option<Block> = None;
            let mut budget = FIT_SCAN_LIMIT;

            for block in self.free_lists.iter(class) {
                if budget == 0 {
                    break;
                }
                if block.size() >= asize {
                    let better = match best {
                        Some(best) => block.size() < best.size(),
                        None => true,
                    };
                    if better {
                        best = Some(block);
                    }
                    budget -= 1;
                }
            }

            if best.is_some() {
                return best;
            }
        }

        None
    }

    /// Grows the arena by at least `size` bytes and installs the new
    /// region as a free block, coalescing it with the old heap tail when
    /// that is free. Returns the resulting block, already indexed, or
    /// `None` if the source refuses without touching any bookkeeping.
    unsafe fn extend_heap(&mut self, size: usize) -> Option<Block> {
        // The old epilogue remembers what sits just below the new region,
        // and its address is exactly where the new block header goes.
        let epilogue = self.epilogue();
        let prev_alloc = epilogue.prev_allocated();
        let prev_mini = epilogue.prev_mini();

        let size = (size.checked_add(ALIGNMENT - 1)?) & !(ALIGNMENT - 1);

        let Some(old_break) = self.memory.grow(size) else {
            log::warn!("heap growth of {size} bytes refused");
            return None;
        };
        // The new bytes start one word above the old epilogue header,
        // which becomes the header of the new block.
        debug_assert_eq!(
            old_break.as_ptr(),
            epilogue.address().as_ptr().wrapping_add(WORD_SIZE),
        );

        let block = epilogue;
        let new_epilogue = Block::from_header_address(NonNull::new_unchecked(
            block.address().as_ptr().add(size),
        ));

        new_epilogue.write_sentinel(false, false);
        block.write(size, false, prev_alloc, prev_mini);

        let block = self.coalesce(block);
        self.free_lists.insert(block);

        log::trace!("extended heap by {size} bytes");

        Some(block)
    }

    /// Merges a just-freed block with whichever heap neighbours are free,
    /// unlinking them from the index. The caller gets back the surviving
    /// block, unindexed, with its header, footer and successor bits in
    /// place.
    unsafe fn coalesce(&mut self, block: Block) -> Block {
        let next = block.next_on_heap();
        let next = (!next.is_allocated()).then_some(next);
        // A clear predecessor bit means a real free block below us; the
        // prologue is allocated, so `None` doubles as "nothing to merge".
        let prev = if block.prev_allocated() {
            None
        } else {
            block.prev_on_heap()
        };

        match (prev, next) {
            (None, None) => block,
            (None, Some(next)) => {
                self.free_lists.remove(next);
                block.write(
                    block.size() + next.size(),
                    false,
                    block.prev_allocated(),
                    block.prev_mini(),
                );
                block
            }
            (Some(prev), None) => {
                self.free_lists.remove(prev);
                prev.write(
                    prev.size() + block.size(),
                    false,
                    prev.prev_allocated(),
                    prev.prev_mini(),
                );
                prev
            }
            (Some(prev), Some(next)) => {
                self.free_lists.remove(prev);
                self.free_lists.remove(next);
                prev.write(
                    prev.size() + block.size() + next.size(),
                    false,
                    prev.prev_allocated(),
                    prev.prev_mini(),
                );
                prev
            }
        }
    }

    /// Carves an allocated block down to `asize` bytes, leaving the rest
    /// as a free remainder for the caller to index. No split happens when
    /// the residue could not hold even a mini block.
    unsafe fn split_block(&mut self, block: Block, asize: usize) -> Option<Block> {
        debug_assert!(block.is_allocated());

        let block_size = block.size();
        if block_size - asize < MINI_BLOCK_SIZE {
            return None;
        }

        let prev_alloc = block.prev_allocated();
        let prev_mini = block.prev_mini();

        let remainder = Block::from_header_address(NonNull::new_unchecked(
            block.address().as_ptr().add(asize),
        ));
        remainder.write(block_size - asize, false, true, asize == MINI_BLOCK_SIZE);
        block.write(asize, true, prev_alloc, prev_mini);

        Some(block.next_on_heap())
    }

    /// The epilogue header lives in the last word of the arena.
    pub(crate) unsafe fn epilogue(&self) -> Block {
        Block::from_header_address(NonNull::new_unchecked(
            self.memory.high().wrapping_sub(WORD_SIZE - 1),
        ))
    }
}

/// [`Heap`] behind a [`Mutex`], exposing [`GlobalAlloc`].
///
/// Payloads are 16 byte aligned and no stricter, so layouts requesting
/// more fail with a null pointer.
///
/// # Examples
///
/// ```no_run
/// use segalloc::Segalloc;
///
/// #[global_allocator]
/// static ALLOCATOR: Segalloc = Segalloc::new();
///
/// fn main() {
///     let num = Box::new(5);
///     assert_eq!(*num, 5);
/// }
/// ```
#[cfg(all(unix, not(miri)))]
pub struct Segalloc<M: MemorySource = SystemBreak> {
    heap: Mutex<Heap<M>>,
}

#[cfg(not(all(unix, not(miri))))]
pub struct Segalloc<M: MemorySource> {
    heap: Mutex<Heap<M>>,
}

unsafe impl<M: MemorySource> Sync for Segalloc<M> {}

#[cfg(all(unix, not(miri)))]
impl Segalloc<SystemBreak> {
    /// An allocator over the program break.
    pub const fn new() -> Self {
        Self::with_source(SystemBreak::new())
    }
}

#[cfg(all(unix, not(miri)))]
impl Default for Segalloc<SystemBreak> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: MemorySource> Segalloc<M> {
    /// An allocator over any memory source, typically a
    /// [`crate::FixedArena`].
    pub const fn with_source(memory: M) -> Self {
        Self {
            heap: Mutex::new(Heap::new(memory)),
        }
    }

    /// Runs the heap checker. See [`Heap::check_heap`].
    pub fn check_heap(&self, line: u32) -> bool {
        match self.heap.lock() {
            Ok(heap) => heap.check_heap(line),
            Err(_) => false,
        }
    }
}

unsafe impl<M: MemorySource> GlobalAlloc for Segalloc<M> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        match self.heap.lock() {
            Ok(mut heap) => heap
                .allocate(layout.size())
                .map_or(ptr::null_mut(), |address| address.as_ptr()),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        match self.heap.lock() {
            Ok(mut heap) => heap
                .zeroed_allocate(1, layout.size())
                .map_or(ptr::null_mut(), |address| address.as_ptr()),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, address: *mut u8, _layout: Layout) {
        if let Ok(mut heap) = self.heap.lock() {
            heap.free(NonNull::new(address));
        }
    }

    unsafe fn realloc(&self, address: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > ALIGNMENT {
            return ptr::null_mut();
        }

        match self.heap.lock() {
            Ok(mut heap) => heap
                .reallocate(NonNull::new(address), new_size)
                .map_or(ptr::null_mut(), |address| address.as_ptr()),
            Err(_) => ptr::null_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::FixedArena;

    fn heap_with(capacity: usize) -> Heap<FixedArena> {
        let mut heap = Heap::new(FixedArena::new(capacity));
        assert!(heap.init());
        heap
    }

    fn heap() -> Heap<FixedArena> {
        heap_with(1 << 20)
    }

    /// Sizes and allocation status of every block between the boundary
    /// tags, in heap order.
    fn blocks(heap: &Heap<FixedArena>) -> Vec<(usize, bool)> {
        let mut result = Vec::new();
        unsafe {
            let mut block = heap.heap_start.unwrap();
            while block.size() != 0 {
                result.push((block.size(), block.is_allocated()));
                block = block.next_on_heap();
            }
        }
        result
    }

    fn free_blocks(heap: &Heap<FixedArena>) -> Vec<usize> {
        blocks(heap)
            .into_iter()
            .filter(|(_, allocated)| !allocated)
            .map(|(size, _)| size)
            .collect()
    }

    #[test]
    fn init_builds_one_free_chunk() {
        let heap = heap();
        assert_eq!(blocks(&heap), vec![(CHUNK_SIZE, false)]);
        assert_eq!(heap.memory().size(), CHUNK_SIZE + 2 * WORD_SIZE);
        assert!(heap.check_heap(line!()));
    }

    #[test]
    fn init_is_idempotent_after_success() {
        let mut heap = heap();
        let size = heap.memory().size();
        assert!(heap.init());
        assert_eq!(heap.memory().size(), size);
    }

    #[test]
    fn allocate_initializes_lazily() {
        let mut heap = Heap::new(FixedArena::new(1 << 20));
        let address = heap.allocate(100).unwrap();
        unsafe { heap.free(Some(address)) };
        assert!(heap.check_heap(line!()));
    }

    #[test]
    fn mini_allocation_round_trip() {
        let mut heap = heap();
        let address = heap.allocate(1).unwrap();
        assert_eq!(address.as_ptr() as usize % ALIGNMENT, 0);
        unsafe {
            assert_eq!(Block::from_payload(address).size(), MINI_BLOCK_SIZE);
            heap.free(Some(address));
        }
        assert!(heap.check_heap(line!()));
        assert_eq!(free_blocks(&heap), vec![CHUNK_SIZE]);
    }

    #[test]
    fn adjacent_free_blocks_coalesce() {
        let mut heap = heap();
        let first = heap.allocate(32).unwrap();
        let second = heap.allocate(32).unwrap();
        unsafe {
            heap.free(Some(first));
            heap.free(Some(second));
        }
        // Neighbouring frees must merge: one block owns the whole chunk
        // again.
        assert_eq!(free_blocks(&heap), vec![CHUNK_SIZE]);
    }

    #[test]
    fn reallocation_preserves_contents() {
        let mut heap = heap();
        let address = heap.allocate(8).unwrap();
        unsafe {
            ptr::copy_nonoverlapping(b"01234567".as_ptr(), address.as_ptr(), 8);
            let moved = heap.reallocate(Some(address), 64).unwrap();
            let mut contents = [0u8; 8];
            ptr::copy_nonoverlapping(moved.as_ptr(), contents.as_mut_ptr(), 8);
            assert_eq!(&contents, b"01234567");
            heap.free(Some(moved));
        }
        assert!(heap.check_heap(line!()));
    }

    #[test]
    fn seventeen_byte_requests_become_32_byte_blocks() {
        let mut heap = heap();
        let first = heap.allocate(17).unwrap();
        let second = heap.allocate(17).unwrap();
        unsafe {
            assert_eq!(Block::from_payload(first).size(), 32);
            assert_eq!(Block::from_payload(second).size(), 32);
            heap.free(Some(first));
            heap.free(Some(second));
        }
        assert!(heap.check_heap(line!()));
    }

    #[test]
    fn freed_slots_are_reused_before_growing() {
        let mut heap = heap();
        let addresses: Vec<_> = (0..64).map(|_| heap.allocate(64).unwrap()).collect();
        for address in addresses.iter().step_by(2) {
            unsafe { heap.free(Some(*address)) };
        }

        let grown = heap.memory().size();
        let reused = heap.allocate(48).unwrap();
        assert_eq!(heap.memory().size(), grown, "heap grew instead of reusing");
        assert!(addresses.iter().step_by(2).any(|address| *address == reused));

        unsafe {
            heap.free(Some(reused));
            for address in addresses.iter().skip(1).step_by(2) {
                heap.free(Some(*address));
            }
        }
        assert!(heap.check_heap(line!()));
    }

    #[test]
    fn zeroed_allocation() {
        let mut heap = heap();
        let address = heap.zeroed_allocate(10, 16).unwrap();
        unsafe {
            for i in 0..160 {
                assert_eq!(*address.as_ptr().add(i), 0);
            }
            heap.free(Some(address));
        }

        assert!(heap.zeroed_allocate(usize::MAX / 2, 4).is_none());
        assert!(heap.zeroed_allocate(0, 8).is_none());
        assert!(heap.check_heap(line!()));
    }

    #[test]
    fn zero_size_requests_yield_null() {
        let mut heap = heap();
        assert!(heap.allocate(0).is_none());
    }

    #[test]
    fn reallocate_null_and_zero_edge_cases() {
        let mut heap = heap();
        unsafe {
            // A null pointer behaves like allocate, a zero size like free.
            let address = heap.reallocate(None, 32).unwrap();
            assert!(heap.reallocate(Some(address), 0).is_none());
        }
        assert_eq!(free_blocks(&heap), vec![CHUNK_SIZE]);
    }

    #[test]
    fn exhausted_arena_reports_null_and_stays_usable() {
        let mut heap = heap_with(8192);
        assert!(heap.allocate(8000).is_none());
        assert!(heap.check_heap(line!()));

        let size = heap.memory().size();
        let address = heap.allocate(100).unwrap();
        assert_eq!(heap.memory().size(), size);
        unsafe { heap.free(Some(address)) };
        assert!(heap.check_heap(line!()));
    }

    #[test]
    fn mini_and_regular_blocks_interleave() {
        let mut heap = heap();
        let minis: Vec<_> = (0..20).map(|_| heap.allocate(8).unwrap()).collect();
        let regulars: Vec<_> = (0..20).map(|_| heap.allocate(24).unwrap()).collect();

        // Exercises both removal disciplines: mini holes between allocated
        // neighbours, regular frees walking back towards them.
        unsafe {
            for address in minis.iter().step_by(2) {
                heap.free(Some(*address));
            }
            assert!(heap.check_heap(line!()));
            for address in regulars.iter().rev() {
                heap.free(Some(*address));
            }
            for address in minis.iter().skip(1).step_by(2) {
                heap.free(Some(*address));
            }
        }

        assert_eq!(free_blocks(&heap), vec![CHUNK_SIZE]);
        assert!(heap.check_heap(line!()));
    }

    #[test]
    fn pseudo_random_trace_maintains_invariants() {
        let mut heap = heap();

        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        // Miri is really slow, but it doesn't need as many operations to
        // find bugs either.
        let operations = if cfg!(miri) { 60 } else { 400 };
        let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

        for _ in 0..operations {
            if live.len() > 48 || (next() % 4 == 3 && !live.is_empty()) {
                let index = (next() % live.len() as u64) as usize;
                let (address, size, fill) = live.swap_remove(index);
                unsafe {
                    // A clobbered payload means blocks overlapped somewhere.
                    for i in 0..size {
                        assert_eq!(*address.as_ptr().add(i), fill);
                    }
                    heap.free(Some(address));
                }
            } else {
                let size = (next() % 1024 + 1) as usize;
                let address = heap.allocate(size).unwrap();
                assert_eq!(address.as_ptr() as usize % ALIGNMENT, 0);

                let fill = (next() % 255) as u8 + 1;
                unsafe { address.as_ptr().write_bytes(fill, size) };
                live.push((address, size, fill));
            }
            assert!(heap.check_heap(line!()));
        }

        unsafe {
            for (address, size, fill) in live.drain(..) {
                for i in 0..size {
                    assert_eq!(*address.as_ptr().add(i), fill);
                }
                heap.free(Some(address));
            }
        }

        // With nothing live, coalescing must fold the arena back into one
        // block.
        assert_eq!(free_blocks(&heap), vec![heap.memory().size() - 2 * WORD_SIZE]);
        assert!(heap.check_heap(line!()));
    }

    #[test]
    fn global_alloc_interface() {
        let allocator = Segalloc::with_source(FixedArena::new(1 << 20));
        unsafe {
            let layout = Layout::from_size_align(64, 16).unwrap();
            let address = allocator.alloc(layout);
            assert!(!address.is_null());
            address.write_bytes(69, 64);

            let grown = allocator.realloc(address, layout, 128);
            assert!(!grown.is_null());
            assert_eq!(*grown, 69);
            assert_eq!(*grown.add(63), 69);

            let zeroed = allocator.alloc_zeroed(Layout::from_size_align(32, 8).unwrap());
            assert!(!zeroed.is_null());
            for i in 0..32 {
                assert_eq!(*zeroed.add(i), 0);
            }

            allocator.dealloc(grown, Layout::from_size_align(128, 16).unwrap());
            allocator.dealloc(zeroed, Layout::from_size_align(32, 8).unwrap());

            // Stricter alignment than payloads guarantee is refused.
            assert!(allocator
                .alloc(Layout::from_size_align(8, 32).unwrap())
                .is_null());
        }
        assert!(allocator.check_heap(line!()));
    }
}
