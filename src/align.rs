use std::mem;

/// Size of a machine word, the only alignment the heap guarantees.
pub const WORD: usize = mem::size_of::<usize>();

/// Rounds the given size up to the next multiple of the machine word.
///
/// Overflows for values within a word of `usize::MAX`; use [`checked_align`]
/// on untrusted sizes.
///
/// # Examples
///
/// ```rust
/// use brkalloc::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Rounds `value` up to the machine word, or `None` if the result does not fit.
pub fn checked_align(value: usize) -> Option<usize> {
  value
    .checked_add(WORD - 1)
    .map(|padded| padded & !(WORD - 1))
}
