use std::{marker::PhantomData, ptr::NonNull};

use crate::block::Block;

/// Intrusive doubly-linked list of free blocks, most recently freed first.
///
/// The links live inside the block headers, so the list itself is just the
/// head reference.
#[derive(Debug)]
pub(crate) struct FreeList {
  head: Option<NonNull<Block>>,
}

impl FreeList {
  pub(crate) const fn new() -> Self {
    Self { head: None }
  }

  /// Pushes `block` at the head.
  ///
  /// # Safety
  ///
  /// `block` must be a valid header that is not currently linked.
  pub(crate) unsafe fn insert(
    &mut self,
    block: NonNull<Block>,
  ) {
    unsafe {
      let node = block.as_ptr();
      (*node).next = self.head;
      (*node).prev = None;

      if let Some(head) = self.head {
        (*head.as_ptr()).prev = Some(block);
      }
    }

    self.head = Some(block);
  }

  /// Splices `block` out of the list and clears its links.
  ///
  /// # Safety
  ///
  /// `block` must currently be linked into this list.
  pub(crate) unsafe fn remove(
    &mut self,
    block: NonNull<Block>,
  ) {
    unsafe {
      let node = block.as_ptr();

      match (*node).prev {
        Some(prev) => (*prev.as_ptr()).next = (*node).next,
        None => self.head = (*node).next,
      }

      if let Some(next) = (*node).next {
        (*next.as_ptr()).prev = (*node).prev;
      }

      (*node).next = None;
      (*node).prev = None;
    }
  }

  /// Returns the first block, in list order, whose payload holds `size` bytes.
  pub(crate) fn find_first_fit(
    &self,
    size: usize,
  ) -> Option<NonNull<Block>> {
    self.iter().find(|&block| unsafe { (*block.as_ptr()).size >= size })
  }

  pub(crate) fn iter(&self) -> Iter<'_> {
    Iter {
      current: self.head,
      _list: PhantomData,
    }
  }
}

/// Walks a [`FreeList`] from its head.
pub(crate) struct Iter<'a> {
  current: Option<NonNull<Block>>,
  _list: PhantomData<&'a FreeList>,
}

impl Iterator for Iter<'_> {
  type Item = NonNull<Block>;

  fn next(&mut self) -> Option<Self::Item> {
    let block = self.current?;
    self.current = unsafe { (*block.as_ptr()).next };
    Some(block)
  }
}
