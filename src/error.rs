//! Error taxonomy for the allocator's fallible operations.
//!
//! Every public operation's contract stays a plain ok/err or null;
//! `AllocError` just gives that single word a name internally, the way
//! the rest of this corpus wraps libc failures in a typed error instead
//! of a bare `-1`.

use std::io;

/// Everything that can make [`crate::Allocator::init`] or
/// [`crate::Allocator::free`] fail.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AllocError {
  /// `init` was called on an allocator that has already been initialized.
  #[error("allocator already initialized")]
  AlreadyInitialized,

  /// `init` was called with a non-positive size.
  #[error("invalid size: {0}")]
  InvalidSize(i64),

  /// The `mmap` call backing `init` failed.
  #[error("mmap failed: {0}")]
  MmapFailed(#[source] io::Error),

  /// `free` (or `display_free`/`display_all`) was called before `init`.
  #[error("allocator not initialized")]
  NotInitialized,

  /// `free` was called with a null pointer.
  #[error("null pointer")]
  NullPointer,

  /// `free` was called with a pointer outside the managed region.
  #[error("pointer out of range")]
  OutOfRange,
}

/// A violation of one of the region's structural invariants, found by
/// [`crate::Allocator::audit`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuditError {
  #[error("block at {0:#x} does not tile the region: gap or overlap before {1:#x}")]
  Coverage(usize, usize),

  #[error("header/footer mismatch at {0:#x}: header size={1} free={2}, footer size={3} free={4}")]
  TagMismatch(usize, usize, bool, usize, bool),

  #[error("payload size {1} at {0:#x} is not a multiple of 16")]
  SizeNotAligned(usize, usize),

  #[error("header at {0:#x} is not 16-byte aligned")]
  HeaderNotAligned(usize),

  #[error("free block at {0:#x} is missing from the free list")]
  MissingFromFreeList(usize),

  #[error("allocated block at {0:#x} is present in the free list")]
  AllocatedInFreeList(usize),

  #[error("adjacent free blocks at {0:#x} and {1:#x} were not coalesced")]
  AdjacentFree(usize, usize),

  #[error("cursor points at {0:#x}, which is not on the free list")]
  CursorNotOnFreeList(usize),
}
