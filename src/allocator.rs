use std::ptr::{self, NonNull};

use tracing::{debug, trace};

use crate::{
  align::checked_align,
  block::{Block, HEADER_SIZE},
  error::AllocError,
  free_list::FreeList,
  heap::{HeapSource, Sbrk},
  stats::HeapStats,
};

/// First-fit free-list allocator over a monotonically growing heap.
///
/// The allocator owns the free-list head and the bookkeeping of the heap it
/// grew from `S`. It is single-threaded: every operation takes `&mut self`.
/// Wrap it in a [`LockedAllocator`](crate::LockedAllocator) to share it.
#[derive(Debug)]
pub struct Allocator<S = Sbrk> {
  source: S,
  free: FreeList,
  /// One past the last byte of the most recent region.
  heap_end: *mut u8,
  /// Highest-addressed block of the heap.
  tail: Option<NonNull<Block>>,
  heap_bytes: usize,
  extensions: usize,
}

// Every block reachable from the allocator lives in memory it exclusively
// manages.
unsafe impl<S: Send> Send for Allocator<S> {}

impl Allocator<Sbrk> {
  /// Creates an allocator growing the process program break.
  pub const fn with_program_break() -> Self {
    Self::new(Sbrk::new())
  }
}

impl Default for Allocator<Sbrk> {
  fn default() -> Self {
    Self::with_program_break()
  }
}

impl<S> Allocator<S> {
  /// Creates an empty allocator; no memory is requested until the first
  /// `acquire`.
  pub const fn new(source: S) -> Self {
    Self {
      source,
      free: FreeList::new(),
      heap_end: ptr::null_mut(),
      tail: None,
      heap_bytes: 0,
      extensions: 0,
    }
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  /// Free blocks in the order `acquire` would consider them, as payload
  /// pointer and capacity.
  pub fn free_blocks(&self) -> impl Iterator<Item = (NonNull<u8>, usize)> + '_ {
    self
      .free
      .iter()
      .map(|block| unsafe { (Block::payload(block), (*block.as_ptr()).size) })
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      heap_bytes: self.heap_bytes,
      extensions: self.extensions,
      ..HeapStats::default()
    };

    for (_, size) in self.free_blocks() {
      stats.free_blocks += 1;
      stats.free_bytes += size;
      stats.largest_free = stats.largest_free.max(size);
    }

    stats
  }

  /// Returns the usable capacity of an acquired block, which may exceed the
  /// requested size.
  ///
  /// # Safety
  ///
  /// `pointer` must have been returned by `acquire` on this allocator and not
  /// released since.
  pub unsafe fn usable_size(
    &self,
    pointer: NonNull<u8>,
  ) -> usize {
    unsafe { (*Block::from_payload(pointer).as_ptr()).size }
  }

  /// Returns a previously acquired block to the free list. A null pointer is
  /// ignored.
  ///
  /// The block is merged with the block physically following it if that one
  /// is free. It is never merged with the block preceding it.
  ///
  /// # Safety
  ///
  /// A non-null `pointer` must have been returned by `acquire` on this
  /// allocator and not released since. Releasing a pointer twice, releasing a
  /// foreign pointer, or having written past the acquired size is undefined
  /// behavior; none of these are detected.
  pub unsafe fn release(
    &mut self,
    pointer: *mut u8,
  ) {
    let Some(payload) = NonNull::new(pointer) else {
      return;
    };

    unsafe {
      let block = Block::from_payload(payload);
      (*block.as_ptr()).is_free = true;

      self.free.insert(block);
      self.coalesce(block);
    }
  }

  /// Carves a free remainder out of `block` if it holds more than `size`
  /// bytes plus a header.
  ///
  /// # Safety
  ///
  /// `block` must be in the free list with a capacity of at least `size`, and
  /// `size` must be word aligned.
  unsafe fn split(
    &mut self,
    block: NonNull<Block>,
    size: usize,
  ) {
    unsafe {
      let node = block.as_ptr();
      let slack = (*node).size - size;

      if slack < HEADER_SIZE {
        return;
      }

      let remainder = Block::write(Block::payload(block).add(size), slack - HEADER_SIZE, true);
      (*remainder.as_ptr()).ends_region = (*node).ends_region;

      (*node).ends_region = false;
      (*node).size = size;

      self.free.insert(remainder);

      if self.tail == Some(block) {
        self.tail = Some(remainder);
      }

      trace!(?block, size, remainder = slack - HEADER_SIZE, "split free block");
    }
  }

  /// Block physically following `block`, if it lies within the managed heap.
  ///
  /// # Safety
  ///
  /// `block` must be a valid header of this heap.
  unsafe fn successor(
    &self,
    block: NonNull<Block>,
  ) -> Option<NonNull<Block>> {
    unsafe {
      if (*block.as_ptr()).ends_region {
        return None;
      }

      let end = Block::end(block);

      if end >= self.heap_end {
        return None;
      }

      NonNull::new(end.cast::<Block>())
    }
  }

  /// Absorbs the successor of a freshly released `block` if it is free.
  ///
  /// # Safety
  ///
  /// `block` must be a free header of this heap, linked into the free list.
  unsafe fn coalesce(
    &mut self,
    block: NonNull<Block>,
  ) {
    unsafe {
      let Some(next) = self.successor(block) else {
        return;
      };

      if !(*next.as_ptr()).is_free {
        return;
      }

      self.free.remove(next);

      let node = block.as_ptr();
      (*node).size += HEADER_SIZE + (*next.as_ptr()).size;
      (*node).ends_region = (*next.as_ptr()).ends_region;

      if self.tail == Some(next) {
        self.tail = Some(block);
      }

      trace!(?block, size = (*node).size, "coalesced with successor");
    }
  }
}

impl<S: HeapSource> Allocator<S> {
  /// Acquires a block of at least `size` bytes and returns its payload.
  ///
  /// The returned pointer is word aligned and sits exactly [`HEADER_SIZE`]
  /// bytes after the block header. On error the allocator is left untouched.
  pub fn acquire(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let rounded = checked_align(size).ok_or(AllocError::SizeOverflow { requested: size })?;

    let block = match self.free.find_first_fit(rounded) {
      Some(block) => {
        unsafe {
          self.split(block, rounded);
          (*block.as_ptr()).is_free = false;
          self.free.remove(block);
        }

        trace!(?block, size = rounded, "reused free block");
        block
      }
      None => self.extend(size, rounded)?,
    };

    Ok(unsafe { Block::payload(block) })
  }

  /// Grows the heap by one allocated block of `size` bytes.
  fn extend(
    &mut self,
    requested: usize,
    size: usize,
  ) -> Result<NonNull<Block>, AllocError> {
    let increment = HEADER_SIZE
      .checked_add(size)
      .ok_or(AllocError::SizeOverflow { requested })?;

    let Some(region) = self.source.grow(increment) else {
      debug!(requested, increment, "heap growth refused");
      return Err(AllocError::HeapExhausted { requested, increment });
    };

    if region.as_ptr() != self.heap_end {
      if let Some(tail) = self.tail {
        debug!(?region, heap_end = ?self.heap_end, "heap region is not contiguous");
        unsafe { (*tail.as_ptr()).ends_region = true };
      }
    }

    let block = unsafe { Block::write(region, size, false) };

    self.heap_end = unsafe { region.as_ptr().add(increment) };
    self.tail = Some(block);
    self.heap_bytes += increment;
    self.extensions += 1;

    trace!(?block, size, heap_end = ?self.heap_end, "extended heap");

    Ok(block)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::VecDeque;

  use super::*;
  use crate::{align::WORD, heap::Arena};

  fn arena_allocator() -> Allocator<Arena> {
    Allocator::new(Arena::with_capacity(64 * 1024))
  }

  fn free_list<S>(allocator: &Allocator<S>) -> Vec<(*mut u8, usize)> {
    allocator
      .free_blocks()
      .map(|(payload, size)| (payload.as_ptr(), size))
      .collect()
  }

  /// Hands out regions at fixed offsets of one buffer, to lay out gaps.
  struct Scripted {
    buffer: Vec<usize>,
    offsets: VecDeque<usize>,
  }

  impl Scripted {
    fn new(
      bytes: usize,
      offsets: &[usize],
    ) -> Self {
      Self {
        buffer: vec![0; bytes / WORD],
        offsets: offsets.iter().copied().collect(),
      }
    }

    fn base(&mut self) -> NonNull<u8> {
      NonNull::new(self.buffer.as_mut_ptr() as *mut u8).unwrap()
    }
  }

  unsafe impl HeapSource for Scripted {
    fn grow(
      &mut self,
      increment: usize,
    ) -> Option<NonNull<u8>> {
      let offset = *self.offsets.front()?;

      if offset + increment > self.buffer.len() * WORD {
        return None;
      }

      self.offsets.pop_front();
      Some(unsafe { self.base().add(offset) })
    }
  }

  #[test]
  fn test_acquire_write_read() {
    let mut allocator = arena_allocator();
    let sizes = [1usize, 13, 128, 4096];

    let pointers: Vec<_> = sizes
      .iter()
      .enumerate()
      .map(|(i, &size)| {
        let pointer = allocator.acquire(size).unwrap();
        unsafe { ptr::write_bytes(pointer.as_ptr(), i as u8 + 1, size) };
        pointer
      })
      .collect();

    for (i, (&pointer, &size)) in pointers.iter().zip(&sizes).enumerate() {
      assert_eq!(0, pointer.as_ptr() as usize % WORD);

      let bytes = unsafe { std::slice::from_raw_parts(pointer.as_ptr(), size) };
      assert!(bytes.iter().all(|&byte| byte == i as u8 + 1));
    }

    let mut ranges: Vec<_> = pointers
      .iter()
      .zip(&sizes)
      .map(|(pointer, &size)| (pointer.as_ptr() as usize, pointer.as_ptr() as usize + size))
      .collect();
    ranges.sort();

    for pair in ranges.windows(2) {
      assert!(pair[0].1 <= pair[1].0);
    }
  }

  #[test]
  fn test_extensions_are_contiguous() {
    let mut allocator = arena_allocator();

    let first = allocator.acquire(32).unwrap();
    let second = allocator.acquire(13).unwrap();

    assert_eq!(unsafe { first.add(32 + HEADER_SIZE) }, second);
    assert_eq!(crate::align!(13usize), unsafe { allocator.usable_size(second) });

    let stats = allocator.stats();
    assert_eq!(2, stats.extensions);
    assert_eq!(2 * HEADER_SIZE + 32 + crate::align!(13usize), stats.heap_bytes);
    assert_eq!(stats.heap_bytes, allocator.source().used());
  }

  #[test]
  fn test_lifo_reuse() {
    let mut allocator = arena_allocator();

    let first = allocator.acquire(256).unwrap();
    unsafe { allocator.release(first.as_ptr()) };

    let second = allocator.acquire(200).unwrap();

    assert_eq!(first, second);
    assert_eq!(1, allocator.stats().extensions);
  }

  #[test]
  fn test_most_recent_release_is_reused_first() {
    let mut allocator = arena_allocator();

    let a = allocator.acquire(128).unwrap();
    let _guard = allocator.acquire(8).unwrap();
    let b = allocator.acquire(128).unwrap();
    let _guard = allocator.acquire(8).unwrap();

    unsafe {
      allocator.release(a.as_ptr());
      allocator.release(b.as_ptr());
    }

    assert_eq!(b, allocator.acquire(128).unwrap());
    assert_eq!(a, allocator.acquire(128).unwrap());
  }

  #[test]
  fn test_split_carves_remainder() {
    let mut allocator = arena_allocator();

    let large = allocator.acquire(1024).unwrap();
    unsafe { allocator.release(large.as_ptr()) };

    let first = allocator.acquire(128).unwrap();
    let second = allocator.acquire(256).unwrap();

    assert_eq!(large, first);
    assert_eq!(first.as_ptr() as usize + 128 + HEADER_SIZE, second.as_ptr() as usize);
    assert_eq!(128, unsafe { allocator.usable_size(first) });
    assert_eq!(256, unsafe { allocator.usable_size(second) });

    let remainder = unsafe { second.add(256 + HEADER_SIZE) };
    assert_eq!(
      vec![(remainder.as_ptr(), 1024 - 128 - 256 - 2 * HEADER_SIZE)],
      free_list(&allocator)
    );
    assert_eq!(1, allocator.stats().extensions);
  }

  #[test]
  fn test_no_split_below_header_slack() {
    let mut allocator = arena_allocator();

    let block = allocator.acquire(HEADER_SIZE + 2 * WORD).unwrap();
    unsafe { allocator.release(block.as_ptr()) };

    let reused = allocator.acquire(3 * WORD).unwrap();

    assert_eq!(block, reused);
    assert_eq!(HEADER_SIZE + 2 * WORD, unsafe { allocator.usable_size(reused) });
    assert!(free_list(&allocator).is_empty());
  }

  #[test]
  fn test_split_with_exact_header_slack() {
    let mut allocator = arena_allocator();

    let block = allocator.acquire(2 * HEADER_SIZE).unwrap();
    unsafe { allocator.release(block.as_ptr()) };

    let reused = allocator.acquire(HEADER_SIZE).unwrap();

    assert_eq!(block, reused);
    assert_eq!(HEADER_SIZE, unsafe { allocator.usable_size(reused) });

    let remainder = unsafe { reused.add(2 * HEADER_SIZE) };
    assert_eq!(vec![(remainder.as_ptr(), 0)], free_list(&allocator));
  }

  #[test]
  fn test_forward_coalescing() {
    let mut allocator = arena_allocator();

    let a = allocator.acquire(64).unwrap();
    let b = allocator.acquire(64).unwrap();
    let _guard = allocator.acquire(64).unwrap();

    unsafe {
      allocator.release(b.as_ptr());
      assert_eq!(vec![(b.as_ptr(), 64)], free_list(&allocator));

      allocator.release(a.as_ptr());
    }

    assert_eq!(vec![(a.as_ptr(), 64 + HEADER_SIZE + 64)], free_list(&allocator));

    let merged = allocator.acquire(64 + HEADER_SIZE + 64).unwrap();
    assert_eq!(a, merged);
    assert_eq!(3, allocator.stats().extensions);
  }

  #[test]
  fn test_no_backward_coalescing() {
    let mut allocator = arena_allocator();

    let a = allocator.acquire(64).unwrap();
    let b = allocator.acquire(64).unwrap();
    let guard = allocator.acquire(64).unwrap();

    unsafe {
      allocator.release(a.as_ptr());
      allocator.release(b.as_ptr());
    }

    assert_eq!(vec![(b.as_ptr(), 64), (a.as_ptr(), 64)], free_list(&allocator));

    // Neither free block holds 150 bytes on its own, so the heap grows.
    let wide = allocator.acquire(150).unwrap();
    assert!(wide > guard);
    assert_eq!(4, allocator.stats().extensions);
    assert_eq!(2, allocator.stats().free_blocks);
  }

  #[test]
  fn test_coalescing_chain_through_releases() {
    let mut allocator = arena_allocator();

    let a = allocator.acquire(32).unwrap();
    let b = allocator.acquire(32).unwrap();
    let c = allocator.acquire(32).unwrap();

    unsafe {
      allocator.release(c.as_ptr());
      allocator.release(b.as_ptr());
      allocator.release(a.as_ptr());
    }

    assert_eq!(vec![(a.as_ptr(), 3 * 32 + 2 * HEADER_SIZE)], free_list(&allocator));
  }

  #[test]
  fn test_release_null_is_noop() {
    let mut allocator = arena_allocator();

    let block = allocator.acquire(64).unwrap();
    unsafe { allocator.release(block.as_ptr()) };

    let before = allocator.stats();
    unsafe { allocator.release(ptr::null_mut()) };

    assert_eq!(before, allocator.stats());
    assert_eq!(vec![(block.as_ptr(), 64)], free_list(&allocator));
  }

  #[test]
  fn test_release_stops_at_heap_end() {
    let mut source = Scripted::new(1024, &[0]);

    // A free-looking header right past the only region.
    unsafe { Block::write(source.base().add(HEADER_SIZE + 64), 128, true) };

    let mut allocator = Allocator::new(source);

    let block = allocator.acquire(64).unwrap();
    unsafe { allocator.release(block.as_ptr()) };

    assert_eq!(vec![(block.as_ptr(), 64)], free_list(&allocator));
  }

  #[test]
  fn test_release_stops_at_region_gap() {
    let mut source = Scripted::new(4096, &[0, 1024]);

    // The gap after the first region looks like a free block.
    unsafe { Block::write(source.base().add(HEADER_SIZE + 256), 128, true) };

    let mut allocator = Allocator::new(source);

    let first = allocator.acquire(256).unwrap();
    let second = allocator.acquire(64).unwrap();

    assert_eq!(unsafe { first.add(1024) }, second);

    unsafe { allocator.release(first.as_ptr()) };
    assert_eq!(vec![(first.as_ptr(), 256)], free_list(&allocator));

    // Splitting hands the region boundary to the remainder, and coalescing
    // hands it back.
    let head = allocator.acquire(64).unwrap();
    assert_eq!(first, head);

    unsafe { allocator.release(head.as_ptr()) };
    assert_eq!(vec![(first.as_ptr(), 256)], free_list(&allocator));

    unsafe { allocator.release(second.as_ptr()) };
    assert_eq!(
      vec![(second.as_ptr(), 64), (first.as_ptr(), 256)],
      free_list(&allocator)
    );
  }

  #[test]
  fn test_exhaustion_leaves_state_unchanged() {
    let mut allocator = Allocator::new(Arena::with_capacity(256));

    let block = allocator.acquire(128).unwrap();
    unsafe { allocator.release(block.as_ptr()) };

    let before = allocator.stats();

    assert_eq!(
      Err(AllocError::HeapExhausted {
        requested: 192,
        increment: 192 + HEADER_SIZE,
      }),
      allocator.acquire(192)
    );

    assert_eq!(before, allocator.stats());
    assert_eq!(vec![(block.as_ptr(), 128)], free_list(&allocator));
    assert_eq!(block, allocator.acquire(128).unwrap());
  }

  #[test]
  fn test_unsatisfiable_sizes() {
    let mut allocator = arena_allocator();

    assert!(matches!(
      allocator.acquire(usize::MAX / 2),
      Err(AllocError::HeapExhausted { .. })
    ));
    assert_eq!(
      Err(AllocError::SizeOverflow { requested: usize::MAX }),
      allocator.acquire(usize::MAX)
    );
    assert_eq!(
      Err(AllocError::SizeOverflow {
        requested: usize::MAX - WORD + 1
      }),
      allocator.acquire(usize::MAX - WORD + 1)
    );

    assert_eq!(HeapStats::default(), allocator.stats());
  }

  #[test]
  fn test_zero_size() {
    let mut allocator = arena_allocator();

    let first = allocator.acquire(0).unwrap();
    let second = allocator.acquire(0).unwrap();

    assert_ne!(first, second);
    assert_eq!(0, unsafe { allocator.usable_size(first) });
    assert_eq!(unsafe { first.add(HEADER_SIZE) }, second);
  }

  #[test]
  fn test_reuse_after_release() {
    let mut allocator = arena_allocator();

    unsafe {
      let first_addr = allocator.acquire(8).unwrap().as_ptr() as *mut u64;

      *first_addr = 3u64;

      assert_eq!(*first_addr, 3);

      let size: usize = 6;

      let second_addr = allocator.acquire(size * 2).unwrap().as_ptr() as *mut u16;

      for i in 0..size {
        *(second_addr.add(i)) = (i + 1) as u16;
      }

      assert_eq!(*first_addr, 3);

      for i in 0..size {
        assert_eq!((i + 1) as u16, *(second_addr.add(i)))
      }

      allocator.release(first_addr as *mut u8);

      let third_addr = allocator.acquire(4).unwrap().as_ptr() as *mut u32;

      assert_eq!(first_addr as *mut u32, third_addr);

      allocator.release(third_addr as *mut u8);

      let fourth_addr = allocator.acquire(16).unwrap().as_ptr() as *mut u128;

      fourth_addr.write_unaligned(25);

      assert!(fourth_addr as usize > third_addr as usize);

      assert_eq!(fourth_addr.read_unaligned(), 25);
    }
  }
}
