//! Whole-heap invariant verification. [`Heap::check_heap`] walks every
//! block and every bucket and reports the first violation through
//! [`log::error!`], returning false. The public entry points run it on
//! entry and exit under `debug_assertions`; release builds only pay for
//! it when instrumentation calls it explicitly.

use crate::allocator::Heap;
use crate::block::MINI_BLOCK_SIZE;
use crate::freelist::{class_of, BUCKET_COUNT, MINI_CLASS};
use crate::header::{self, Word, WORD_SIZE};
use crate::platform::MemorySource;

macro_rules! fail {
    ($line:expr, $($arg:tt)*) => {{
        log::error!("heap check at line {} failed: {}", $line, format_args!($($arg)*));
        return false;
    }};
}

impl<M: MemorySource> Heap<M> {
    /// Verifies the whole heap and the whole segregated index:
    ///
    /// - prologue and epilogue are zero-size and allocated,
    /// - every block lies inside the arena, 8 byte aligned, with a 16 byte
    ///   aligned payload and a sane size,
    /// - free non-mini blocks have matching header and footer words,
    /// - every header's predecessor bits describe the block below it,
    /// - no two free blocks are adjacent,
    /// - the block sizes tile the arena exactly,
    /// - every free block sits in the bucket its size maps to, bucket
    ///   chains are consistent in both directions, and the index holds
    ///   exactly the heap's free blocks, nothing else.
    ///
    /// `line` is echoed in the diagnostic so a failing call site can be
    /// found. An uninitialized heap passes vacuously.
    pub fn check_heap(&self, line: u32) -> bool {
        let Some(start) = self.heap_start else {
            return true;
        };

        unsafe {
            let low = self.memory.low() as usize;
            let high = self.memory.high() as usize;
            let epilogue = self.epilogue();

            let prologue = self.memory.low().cast::<Word>().read();
            if header::size_of(prologue) != 0 || !header::is_allocated(prologue) {
                fail!(line, "prologue footer is corrupt: {prologue:#x}");
            }
            if epilogue.size() != 0 || !epilogue.is_allocated() {
                fail!(line, "epilogue header is corrupt: {:#x}", epilogue.header_word());
            }
            if start.address().as_ptr() as usize != low + WORD_SIZE {
                fail!(line, "first block does not follow the prologue");
            }

            let mut free_blocks = 0;
            let mut total_bytes = 0;
            let mut block = start;

            while block.size() != 0 {
                let address = block.address().as_ptr() as usize;
                let size = block.size();

                if address % WORD_SIZE != 0 || (address + WORD_SIZE) % 16 != 0 {
                    fail!(line, "block {address:#x} is misaligned");
                }
                if size % 16 != 0 || size < MINI_BLOCK_SIZE {
                    fail!(line, "block {address:#x} has invalid size {size}");
                }
                if address < low + WORD_SIZE || address + size > high + 1 - WORD_SIZE {
                    fail!(line, "block {address:#x} reaches outside the heap");
                }

                if !block.is_allocated() && !block.is_mini()
                    && block.footer_word() != block.header_word()
                {
                    fail!(
                        line,
                        "block {address:#x}: footer {:#x} disagrees with header {:#x}",
                        block.footer_word(),
                        block.header_word()
                    );
                }

                let next = block.next_on_heap();
                if next.prev_allocated() != block.is_allocated() {
                    fail!(line, "block {address:#x}: successor's prev_alloc bit is stale");
                }
                if next.prev_mini() != block.is_mini() {
                    fail!(line, "block {address:#x}: successor's prev_mini bit is stale");
                }
                if !block.is_allocated() && next.size() != 0 && !next.is_allocated() {
                    fail!(line, "adjacent free blocks at {address:#x}");
                }

                if !block.is_allocated() {
                    free_blocks += 1;
                    if !self.free_lists.contains(block) {
                        fail!(line, "free block {address:#x} is missing from its bucket");
                    }
                }

                total_bytes += size;
                block = next;
            }

            if block != epilogue {
                fail!(line, "heap walk ended before the epilogue");
            }
            if total_bytes != self.memory.size() - 2 * WORD_SIZE {
                fail!(
                    line,
                    "blocks cover {total_bytes} bytes, arena holds {}",
                    self.memory.size() - 2 * WORD_SIZE
                );
            }

            let mut indexed = 0;
            for class in 0..BUCKET_COUNT {
                let Some(members) = self.check_bucket(line, class, free_blocks) else {
                    return false;
                };
                indexed += members;
            }
            if indexed != free_blocks {
                fail!(line, "index holds {indexed} blocks, the heap has {free_blocks} free");
            }
        }

        true
    }

    /// Validates one bucket chain and returns its length, or `None` after
    /// logging the violation. `free_blocks` bounds the walk so a cyclic
    /// chain fails instead of hanging.
    unsafe fn check_bucket(&self, line: u32, class: usize, free_blocks: usize) -> Option<usize> {
        // Keep the macro usable here: report, then yield None.
        macro_rules! fail {
            ($($arg:tt)*) => {{
                log::error!("heap check at line {} failed: {}", line, format_args!($($arg)*));
                return None;
            }};
        }

        let low = self.memory.low() as usize;
        let high = self.memory.high() as usize;

        if class != MINI_CLASS {
            if let Some(head) = self.free_lists.head(class) {
                if head.prev_free().is_some() {
                    fail!("bucket {class}: head has a backward link");
                }
            }
        }

        let mut forward = 0;
        let mut tail = None;
        let mut cursor = self.free_lists.head(class);

        while let Some(member) = cursor {
            if forward > free_blocks {
                fail!("bucket {class} appears cyclic");
            }

            let address = member.address().as_ptr() as usize;
            if address < low || address > high {
                fail!("bucket {class}: member {address:#x} is outside the heap");
            }
            if member.is_allocated() {
                fail!("bucket {class}: member {address:#x} is allocated");
            }
            if class_of(member.size()) != class {
                fail!(
                    "bucket {class}: member {address:#x} of size {} belongs in class {}",
                    member.size(),
                    class_of(member.size())
                );
            }
            if class != MINI_CLASS {
                if let Some(next) = member.next_free() {
                    if next.prev_free() != Some(member) {
                        fail!("bucket {class}: forward and backward links disagree");
                    }
                }
            }

            forward += 1;
            if member.next_free().is_none() {
                tail = Some(member);
            }
            cursor = member.next_free();
        }

        // Regular buckets must enumerate the same set in reverse.
        if class != MINI_CLASS {
            let mut backward = 0;
            let mut cursor = tail;
            while let Some(member) = cursor {
                if backward > forward {
                    fail!("bucket {class}: backward traversal diverges");
                }
                backward += 1;
                cursor = member.prev_free();
            }
            if backward != forward {
                fail!("bucket {class}: {forward} members forward, {backward} backward");
            }
        }

        Some(forward)
    }

    /// Logs one line per block and per non-empty bucket at debug level.
    pub fn dump(&self) {
        let Some(start) = self.heap_start else {
            log::debug!("heap not initialized");
            return;
        };

        unsafe {
            log::debug!(
                "heap: {} bytes, low {:p}, high {:p}",
                self.memory.size(),
                self.memory.low(),
                self.memory.high()
            );

            let mut block = start;
            while block.size() != 0 {
                log::debug!(
                    "  {:p} size {:>8} {} prev_alloc={} prev_mini={}",
                    block.address(),
                    block.size(),
                    if block.is_allocated() { "alloc" } else { "free " },
                    block.prev_allocated(),
                    block.prev_mini(),
                );
                block = block.next_on_heap();
            }

            for class in 0..BUCKET_COUNT {
                let members: Vec<String> = self
                    .free_lists
                    .iter(class)
                    .map(|member| format!("{:p}", member.address()))
                    .collect();
                if !members.is_empty() {
                    log::debug!("  bucket {class:>2}: {}", members.join(" -> "));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::block::Block;
    use crate::header::pack;
    use crate::platform::FixedArena;
    use crate::Heap;

    fn heap() -> Heap<FixedArena> {
        let mut heap = Heap::new(FixedArena::new(1 << 16));
        assert!(heap.init());
        heap
    }

    #[test]
    fn valid_heap_passes() {
        let mut heap = heap();
        assert!(heap.check_heap(line!()));

        let a = heap.allocate(100).unwrap();
        let b = heap.allocate(8).unwrap();
        unsafe { heap.free(Some(a)) };
        assert!(heap.check_heap(line!()));
        unsafe { heap.free(Some(b)) };
        assert!(heap.check_heap(line!()));
    }

    #[test]
    fn corrupt_header_is_reported() {
        let mut heap = heap();
        let address = heap.allocate(100).unwrap();

        // Clearing the allocated bit leaves a "free" block that no bucket
        // knows about and whose successor bits are stale.
        unsafe {
            let block = Block::from_payload(address);
            block
                .address()
                .as_ptr()
                .cast::<u64>()
                .write(pack(block.size(), false, block.prev_allocated(), block.prev_mini()));
        }

        assert!(!heap.check_heap(line!()));
    }

    #[test]
    fn corrupt_footer_is_reported() {
        let mut heap = heap();
        let a = heap.allocate(100).unwrap();
        let _b = heap.allocate(100).unwrap();
        unsafe { heap.free(Some(a)) };

        unsafe {
            let block = Block::from_payload(a);
            let footer = block.address().as_ptr().add(block.size() - 8).cast::<u64>();
            footer.write(pack(block.size(), true, false, false));
        }

        assert!(!heap.check_heap(line!()));
    }

    #[test]
    fn broken_bucket_link_is_reported() {
        let mut heap = heap();
        let a = heap.allocate(100).unwrap();
        let _b = heap.allocate(100).unwrap();
        unsafe { heap.free(Some(a)) };

        unsafe {
            let block = Block::from_payload(a);
            block.set_prev_free(Some(block));
        }

        assert!(!heap.check_heap(line!()));
    }
}
