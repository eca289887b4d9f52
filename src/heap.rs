//! Sources of heap memory.
//!
//! The allocator only ever asks for more memory, never gives any back, and
//! expects successive growths to land at increasing addresses, the way the
//! program break moves with `sbrk(2)`:
//!
//! ```text
//!   heap start                                   heap end = program break
//!   ▼                                                                  ▼
//!   ┌──────────────┬──────────────┬──────────────┬─────────────────────┐
//!   │  growth #1   │  growth #2   │  growth #3   │      growth #4      │
//!   └──────────────┴──────────────┴──────────────┴─────────────────────┘
//!                                                ──────────────────────▶
//!                                                     next growth
//! ```

use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use libc::{c_void, intptr_t, sbrk};

use crate::align::{WORD, checked_align};

/// A monotonic, brk-like supply of memory.
///
/// # Safety
///
/// Implementors must guarantee that every pointer returned by `grow`:
///
/// - is word aligned and valid for reads and writes of `increment` bytes for
///   as long as the source is alive,
/// - does not overlap any region returned earlier,
/// - lies above every region returned earlier.
///
/// Regions should be contiguous, each starting where the previous one ended.
/// The allocator copes with gaps, but cannot coalesce across them.
pub unsafe trait HeapSource {
  /// Grows the heap by `increment` bytes and returns the start of the new
  /// region, or `None` if the growth was refused. A refused growth must leave
  /// the source unchanged.
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>>;
}

/// The process program break, moved with `sbrk(2)`.
///
/// Memory obtained this way is never returned to the operating system. The
/// break is shared by the whole process: if anything else moves it between two
/// growths, the allocator sees a gap and stops coalescing at it.
#[derive(Debug, Default)]
pub struct Sbrk {
  _private: (),
}

impl Sbrk {
  pub const fn new() -> Self {
    Self { _private: () }
  }

  /// Returns the current program break, `sbrk(0)`.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }
}

unsafe impl HeapSource for Sbrk {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    let padding = Self::program_break().align_offset(WORD);
    let total = increment.checked_add(padding)?;
    let delta = intptr_t::try_from(total).ok()?;

    let address = unsafe { sbrk(delta) };

    if address == usize::MAX as *mut c_void {
      return None;
    }

    let address = address as *mut u8;

    // Someone moved the break between the two calls; the padding computed
    // above no longer lines the region up on a word.
    if address.align_offset(WORD) > padding {
      tracing::debug!(?address, total, "program break moved during growth, region dropped");
      return None;
    }

    NonNull::new(address.wrapping_add(address.align_offset(WORD)))
  }
}

/// A fixed-capacity heap carved out of one up-front allocation.
///
/// Behaves like the program break with a hard limit: growth is refused once
/// the capacity is used up. The memory is released when the arena is dropped,
/// which makes it the source of choice for tests and for allocators that must
/// not touch the process break.
#[derive(Debug)]
pub struct Arena {
  memory: NonNull<u8>,
  layout: Layout,
  used: usize,
}

// The arena exclusively owns its buffer.
unsafe impl Send for Arena {}

impl Arena {
  /// Reserves `capacity` bytes.
  ///
  /// # Panics
  ///
  /// Panics if `capacity` exceeds `isize::MAX`, and aborts through
  /// [`alloc::handle_alloc_error`] if the system allocator fails.
  pub fn with_capacity(capacity: usize) -> Self {
    let layout = Layout::from_size_align(capacity.max(WORD), WORD).expect("arena capacity overflow");

    let memory = unsafe { alloc::alloc(layout) };

    let Some(memory) = NonNull::new(memory) else {
      alloc::handle_alloc_error(layout);
    };

    Self {
      memory,
      layout,
      used: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  pub fn used(&self) -> usize {
    self.used
  }

  pub fn remaining(&self) -> usize {
    self.capacity() - self.used
  }
}

unsafe impl HeapSource for Arena {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    let start = checked_align(self.used)?;
    let end = start.checked_add(increment)?;

    if end > self.capacity() {
      return None;
    }

    self.used = end;

    Some(unsafe { self.memory.add(start) })
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.memory.as_ptr(), self.layout) };
  }
}
