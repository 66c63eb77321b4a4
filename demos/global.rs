use segalloc::Segalloc;

// NOTE: This example moves the real program break. It behaves like the
// classical sbrk based mallocs: if anything else in the process moves the
// break behind our back, the contiguity that the block arithmetic relies
// on is gone. Rust code routes every allocation through us, so in practice
// this only matters for C libraries that call sbrk themselves.

#[global_allocator]
static ALLOCATOR: Segalloc = Segalloc::new();

fn main() {
    let num = Box::new(10);
    println!("Boxed num {num} at {:?}", &*num as *const usize);

    let mut vec = Vec::with_capacity(*num);

    for i in 0..*num {
        vec.push(i);
    }

    println!("Vec: {vec:?} at {:?}", vec.as_ptr());

    let handle = std::thread::spawn(|| {
        let mut vec: Vec<u8> = Vec::with_capacity(256);
        vec.push(5);
        vec.push(6);
        println!("Second thread Vec: {vec:?} at {:?}", vec.as_ptr());
    });

    handle.join().unwrap();

    let cap = 1024 * 1024;
    let mut vec: Vec<u8> = Vec::with_capacity(cap);
    vec.push(1);

    println!("Large allocation of {cap} bytes at {:?}", vec.as_ptr());
    drop(vec);

    assert!(ALLOCATOR.check_heap(line!()));
    println!("Heap checker is happy");
}
