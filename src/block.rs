//! Block header layout and address translation.
//!
//! Every block in the heap starts with a [`Block`] header followed by its
//! payload. This module is the only place that turns payload pointers into
//! headers and back.

use std::{mem, ptr::NonNull};

/// Metadata record prefixed to every payload.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct Block {
  /// Bytes available to the caller, header excluded.
  pub(crate) size: usize,
  pub(crate) is_free: bool,
  /// Set on the last block of a region that the next extension did not
  /// continue: the bytes after it belong to someone else.
  pub(crate) ends_region: bool,
  pub(crate) next: Option<NonNull<Block>>,
  pub(crate) prev: Option<NonNull<Block>>,
}

/// Size of the header placed in front of every payload.
///
/// The pointer handed out for a block is always the header address plus
/// `HEADER_SIZE`.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

const _: () = assert!(HEADER_SIZE % mem::size_of::<usize>() == 0);

impl Block {
  pub(crate) fn new(
    size: usize,
    is_free: bool,
  ) -> Self {
    Self {
      size,
      is_free,
      ends_region: false,
      next: None,
      prev: None,
    }
  }

  /// Writes a fresh header at `address`.
  ///
  /// # Safety
  ///
  /// `address` must be word aligned and valid for `HEADER_SIZE + size` bytes of
  /// writes, none of which belong to a live block.
  pub(crate) unsafe fn write(
    address: NonNull<u8>,
    size: usize,
    is_free: bool,
  ) -> NonNull<Block> {
    let block = address.cast::<Block>();
    unsafe { block.as_ptr().write(Block::new(size, is_free)) };
    block
  }

  /// Payload pointer of `block`.
  ///
  /// # Safety
  ///
  /// `block` must point to a header inside the managed heap.
  pub(crate) unsafe fn payload(block: NonNull<Block>) -> NonNull<u8> {
    unsafe { block.cast::<u8>().add(HEADER_SIZE) }
  }

  /// Recovers the header of a payload pointer.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by `acquire` on the allocator that
  /// owns the heap, and must not have been released since. The result then
  /// points to that block's header.
  pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> NonNull<Block> {
    unsafe { payload.sub(HEADER_SIZE).cast::<Block>() }
  }

  /// Address one past the last payload byte of `block`, which is where the
  /// physically following block starts, if any.
  ///
  /// # Safety
  ///
  /// `block` must point to a valid header.
  pub(crate) unsafe fn end(block: NonNull<Block>) -> *mut u8 {
    unsafe {
      let size = (*block.as_ptr()).size;
      block.cast::<u8>().as_ptr().wrapping_add(HEADER_SIZE + size)
    }
  }
}
