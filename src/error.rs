//! Allocation errors.

use thiserror::Error;

/// Reasons `acquire` can fail.
///
/// Every failure leaves the allocator exactly as it was before the call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// The request, once rounded to a word and given a header, does not fit in
  /// the address space.
  #[error("allocation of {requested} bytes overflows the address space")]
  SizeOverflow {
    /// Size passed to `acquire`.
    requested: usize,
  },

  /// The heap source refused to grow.
  #[error("heap exhausted: could not grow by {increment} bytes for a {requested} byte request")]
  HeapExhausted {
    /// Size passed to `acquire`.
    requested: usize,
    /// Bytes asked of the heap source, header included.
    increment: usize,
  },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display() {
    let overflow = AllocError::SizeOverflow { requested: usize::MAX };
    assert_eq!(
      format!("allocation of {} bytes overflows the address space", usize::MAX),
      overflow.to_string()
    );

    let exhausted = AllocError::HeapExhausted {
      requested: 100,
      increment: 136,
    };
    assert_eq!(
      "heap exhausted: could not grow by 136 bytes for a 100 byte request",
      exhausted.to_string()
    );
  }
}
