use std::ptr::NonNull;

use segalloc::{FixedArena, Heap, MemorySource};

fn print_alloc(address: NonNull<u8>, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {address:?}");
}

fn main() {
    env_logger::init();

    let mut heap = Heap::new(FixedArena::new(1 << 20));

    let size1 = 1;
    let addr1 = heap.allocate(size1).unwrap();
    print_alloc(addr1, size1);

    let size2 = 1024;
    let addr2 = heap.allocate(size2).unwrap();
    print_alloc(addr2, size2);

    let size3 = 4096;
    let addr3 = heap.allocate(size3).unwrap();
    print_alloc(addr3, size3);

    println!("Heap has grown to {} bytes", heap.memory().size());
    heap.dump();

    println!("Deallocating everything...");
    unsafe {
        heap.free(Some(addr1));
        heap.free(Some(addr2));
        heap.free(Some(addr3));
    }

    assert!(heap.check_heap(line!()));
    heap.dump();

    println!("\nNow let's try some reallocs...");
    unsafe {
        let mut address = heap.allocate(16).unwrap();
        address.as_ptr().write_bytes(42, 16);

        for size in [64, 512, 8192] {
            address = heap.reallocate(Some(address), size).unwrap();
            println!("Moved to {address:?} with room for {size} bytes");
            assert_eq!(*address.as_ptr(), 42);
        }

        heap.free(Some(address));
    }

    assert!(heap.check_heap(line!()));
    println!("Final heap size: {} bytes", heap.memory().size());
}
