use std::{io::Read, ptr, slice};

use brkalloc::{Allocator, HEADER_SIZE, Sbrk};
use tracing_subscriber::EnvFilter;

/// Waits until the user presses ENTER, when running with `--step`.
/// Useful to inspect the process with `pmap` or `gdb` between steps.
fn pause(step: bool) {
  if !step {
    return;
  }

  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break, the upper boundary of the heap.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    Sbrk::program_break(),
  );
}

/// Copies `text` into the block at `pointer`.
unsafe fn store(
  pointer: *mut u8,
  text: &str,
) {
  unsafe { ptr::copy_nonoverlapping(text.as_ptr(), pointer, text.len()) };
}

unsafe fn load(
  pointer: *mut u8,
  len: usize,
) -> String {
  let bytes = unsafe { slice::from_raw_parts(pointer, len) };
  String::from_utf8_lossy(bytes).into_owned()
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let step = std::env::args().any(|arg| arg == "--step");
  let mut allocator = Allocator::with_program_break();

  println!("Block header size: {} bytes", HEADER_SIZE);
  print_program_break("start");
  pause(step);

  // --------------------------------------------------------------------
  // 1) Two blocks straight from the program break.
  // --------------------------------------------------------------------
  let (a, b) = match (allocator.acquire(32), allocator.acquire(64)) {
    (Ok(a), Ok(b)) => (a.as_ptr(), b.as_ptr()),
    (Err(error), _) | (_, Err(error)) => {
      eprintln!("allocation failed: {error}");
      return;
    }
  };

  unsafe {
    store(a, "hello");
    store(b, "world");

    println!("\n[1] a = {:?}: {}", a, load(a, 5));
    println!("[1] b = {:?}: {}", b, load(b, 5));
  }

  println!("[1] {}", allocator.stats());
  print_program_break("after a and b");
  pause(step);

  // --------------------------------------------------------------------
  // 2) Release both. `a` is released first, so releasing `b` cannot merge
  //    backwards into it: two free blocks remain.
  // --------------------------------------------------------------------
  unsafe {
    allocator.release(a);
    allocator.release(b);
  }

  println!("\n[2] Released a and b");
  for (payload, size) in allocator.free_blocks() {
    println!("[2]   free block {:?}, {} bytes", payload, size);
  }
  println!("[2] {}", allocator.stats());
  pause(step);

  // --------------------------------------------------------------------
  // 3) A small request reuses the block released last.
  // --------------------------------------------------------------------
  let c = match allocator.acquire(16) {
    Ok(c) => c.as_ptr(),
    Err(error) => {
      eprintln!("allocation failed: {error}");
      return;
    }
  };

  unsafe {
    store(c, "reuse");
    println!("\n[3] c = {:?}: {}", c, load(c, 5));
  }

  println!(
    "[3] c == b? {}",
    if c == b {
      "Yes, it reused the last released block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  println!("[3] {}", allocator.stats());
  pause(step);

  // --------------------------------------------------------------------
  // 4) A large request no free block can hold grows the heap.
  // --------------------------------------------------------------------
  print_program_break("before large acquire");

  match allocator.acquire(64 * 1024) {
    Ok(big) => println!("\n[4] Acquired 64 KiB at {:?}", big),
    Err(error) => println!("\n[4] Large allocation failed: {error}"),
  }

  print_program_break("after large acquire");

  unsafe { allocator.release(c) };

  println!("\n[5] {}", allocator.stats());
  println!("[5] End of walkthrough. The heap is never shrunk; the OS reclaims it on exit.");
}
