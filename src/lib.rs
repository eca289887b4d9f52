//! # brkalloc - A First-Fit Free-List Allocator
//!
//! This crate provides a dynamic memory allocator that grows a single heap
//! with the `sbrk` system call and recycles released blocks through an
//! explicit free list.
//!
//! ## Overview
//!
//! Every block carries a header in front of the bytes handed to the caller.
//! Released blocks are threaded into a doubly-linked free list whose links
//! live inside those headers:
//!
//! ```text
//!   Heap Memory:
//!
//!   ┌──────┬─────────┬──────┬─────────┬──────┬───────────────┬──────┬─────┐
//!   │ hdr  │  used   │ hdr  │  free   │ hdr  │     used      │ hdr  │free │
//!   └──────┴─────────┴──────┴─────────┴──────┴───────────────┴──────┴─────┘
//!                     ▲                                       ▲
//!                     │             prev ◀─────────────────── │
//!                     └──── next ─────────────────────────▶   │
//!                                                          free list head
//!                                                         (last released)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   brkalloc
//!   ├── align      - Word rounding (align!, checked_align)
//!   ├── allocator  - Allocator: first fit, splitting, coalescing, growth
//!   ├── block      - Block header and address translation (internal)
//!   ├── error      - AllocError
//!   ├── free_list  - Intrusive LIFO free list (internal)
//!   ├── heap       - HeapSource, Sbrk, Arena
//!   ├── locked     - LockedAllocator, one lock per operation
//!   └── stats      - HeapStats
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkalloc::{Allocator, Arena};
//!
//! let mut allocator = Allocator::new(Arena::with_capacity(4096));
//!
//! let first = allocator.acquire(256).unwrap();
//!
//! unsafe {
//!     first.as_ptr().write_bytes(0xAB, 256);
//!     allocator.release(first.as_ptr());
//! }
//!
//! // The block released last is the first one considered.
//! let second = allocator.acquire(200).unwrap();
//! assert_eq!(first, second);
//! ```
//!
//! ## How It Works
//!
//! `acquire(size)` walks the free list from its head and takes the first block
//! holding at least `size` bytes. If the block has room for another header
//! beyond that, the tail end is split off and pushed back on the free list:
//!
//! ```text
//!   Splitting a free block for a request of N bytes:
//!
//!   before  ┌─────┬──────────────────────────────────────┐
//!           │ hdr │               free: S                │
//!           └─────┴──────────────────────────────────────┘
//!   after   ┌─────┬──────────────┬─────┬─────────────────┐
//!           │ hdr │   used: N    │ hdr │ free: S - N - H │
//!           └─────┴──────────────┴─────┴─────────────────┘
//! ```
//!
//! When no free block fits, the heap grows by exactly one header plus the
//! request, and the new block goes straight to the caller.
//!
//! `release(pointer)` steps back one header to find the block, pushes it on the
//! free list, then merges it with the block physically after it if that block
//! is free too:
//!
//! ```text
//!   Forward coalescing:
//!
//!   ┌─────┬───────────┬─────┬───────────┐        ┌─────┬───────────────────────┐
//!   │ hdr │ released  │ hdr │   free    │  ───▶  │ hdr │   free: A + H + B     │
//!   └─────┴───────────┴─────┴───────────┘        └─────┴───────────────────────┘
//! ```
//!
//! Merging only looks forward: a free block *before* the released one is left
//! alone.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: `Allocator` needs `&mut self`; share it through
//!   `LockedAllocator`
//! - **Word alignment only**: payloads are aligned to `usize`, nothing more
//! - **No memory returned**: the heap only ever grows
//! - **No misuse detection**: double release and foreign pointers are
//!   undefined behavior
//! - **Unix-only**: `Sbrk` requires `libc` and `sbrk` (POSIX systems)
//!
//! ## Safety
//!
//! Releasing memory is inherently unsafe: the allocator trusts that every
//! pointer it is given came from its own `acquire` and is released once.

pub mod align;
mod allocator;
mod block;
mod error;
mod free_list;
mod heap;
mod locked;
mod stats;

pub use allocator::Allocator;
pub use block::HEADER_SIZE;
pub use error::AllocError;
pub use heap::{Arena, HeapSource, Sbrk};
pub use locked::LockedAllocator;
pub use stats::HeapStats;
