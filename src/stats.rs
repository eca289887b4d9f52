use std::fmt;

/// Point-in-time summary of an allocator's heap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes obtained from the heap source, headers included.
  pub heap_bytes: usize,
  /// Successful heap growths.
  pub extensions: usize,
  /// Blocks currently in the free list.
  pub free_blocks: usize,
  /// Payload bytes held by free blocks, headers excluded.
  pub free_bytes: usize,
  /// Payload of the largest free block.
  pub largest_free: usize,
}

impl fmt::Display for HeapStats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "heap {} bytes over {} extensions, {} free blocks holding {} bytes (largest {})",
      self.heap_bytes, self.extensions, self.free_blocks, self.free_bytes, self.largest_free,
    )
  }
}
