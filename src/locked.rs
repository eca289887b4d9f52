use std::ptr::NonNull;

use parking_lot::{Mutex, const_mutex};

use crate::{
  allocator::Allocator,
  error::AllocError,
  heap::{HeapSource, Sbrk},
  stats::HeapStats,
};

/// An [`Allocator`] shared between threads.
///
/// Each operation runs in full under a single lock: the free-list search, the
/// split or heap growth, the list splicing and the coalescing of one call are
/// never interleaved with another call.
#[derive(Debug)]
pub struct LockedAllocator<S = Sbrk> {
  inner: Mutex<Allocator<S>>,
}

impl LockedAllocator<Sbrk> {
  pub const fn with_program_break() -> Self {
    Self::new(Allocator::with_program_break())
  }
}

impl Default for LockedAllocator<Sbrk> {
  fn default() -> Self {
    Self::with_program_break()
  }
}

impl<S> LockedAllocator<S> {
  pub const fn new(allocator: Allocator<S>) -> Self {
    Self {
      inner: const_mutex(allocator),
    }
  }

  /// See [`Allocator::release`].
  ///
  /// # Safety
  ///
  /// Same contract as [`Allocator::release`]: a non-null `pointer` must come
  /// from `acquire` on this allocator and be released at most once.
  pub unsafe fn release(
    &self,
    pointer: *mut u8,
  ) {
    unsafe { self.inner.lock().release(pointer) }
  }

  pub fn stats(&self) -> HeapStats {
    self.inner.lock().stats()
  }

  pub fn into_inner(self) -> Allocator<S> {
    self.inner.into_inner()
  }
}

impl<S: HeapSource> LockedAllocator<S> {
  /// See [`Allocator::acquire`].
  pub fn acquire(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    self.inner.lock().acquire(size)
  }
}
