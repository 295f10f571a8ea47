//! Walks through the allocator's five operations end to end: init, three
//! allocations, a peek at both diagnostic views, and three frees in
//! reverse order. Mirrors the original allocator's `main.c` driver, with
//! the debug trace routed through `log`/`env_logger` (set `RUST_LOG=trace`
//! to see every candidate the next-fit search examines).

use allocator::Allocator;

fn main() {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

  let mut heap = Allocator::init(4096).expect("mmap should succeed for a 4096-byte region");

  let ptr0 = heap.alloc(1024).expect("alloc(1024)");
  println!("alloc(1024) = {:p}", ptr0.as_ptr());

  let ptr1 = heap.alloc(1500).expect("alloc(1500)");
  println!("alloc(1500) = {:p}", ptr1.as_ptr());

  let ptr2 = heap.alloc(1456).expect("alloc(1456)");
  println!("alloc(1456) = {:p}", ptr2.as_ptr());

  print!("{}", heap.display_all());

  println!("free({:p}) = {:?}", ptr2.as_ptr(), heap.free(ptr2.as_ptr()));
  println!("free({:p}) = {:?}", ptr0.as_ptr(), heap.free(ptr0.as_ptr()));
  println!("free({:p}) = {:?}", ptr1.as_ptr(), heap.free(ptr1.as_ptr()));

  print!("{}", heap.display_all());

  heap.audit().expect("region should be back to a single free block");
}
