//! # allocator - a boundary-tag, next-fit heap allocator
//!
//! This crate manages one fixed-size region of memory, obtained once from
//! the OS via `mmap`, and subdivides it into variable-sized blocks on
//! request. Each block carries a boundary tag (header and footer) so that
//! freeing a block can find its physical neighbors in O(1) and merge with
//! whichever of them are also free.
//!
//! ## Overview
//!
//! ```text
//!   One region, carved into blocks:
//!
//!   top                                                              bot
//!    ┌────────┬──────────┬────────┬────────┬──────────┬────────┬───────┐
//!    │ Header │ Payload  │ Footer │ Header │ Payload  │ Footer │  ...  │
//!    │        │ (in use) │        │        │  (free)  │        │       │
//!    └────────┴──────────┴────────┴────────┴──────────┴────────┴───────┘
//!                                  ▲
//!                                  └── overlaid with a free-list Node
//! ```
//!
//! Allocation walks the free list starting at a persistent cursor
//! (next-fit), not from the head every time, so repeated allocations
//! rotate through the list instead of re-scanning the same prefix. A
//! block large enough to leave a useful remainder after satisfying a
//! request is split; otherwise the whole block is handed out. Freeing a
//! block looks at its immediate physical predecessor and successor via
//! their boundary tags and merges with whichever are free, so two free
//! blocks are never adjacent.
//!
//! ## Crate Structure
//!
//! ```text
//!   allocator
//!   ├── align     - size-rounding helpers (round_up!, BLOCK_ALIGN)
//!   ├── block     - boundary-tag layout and the only unchecked pointer arithmetic
//!   ├── freelist  - intrusive doubly-linked free list + next-fit cursor
//!   ├── region    - mmap acquisition of the managed range
//!   ├── error     - AllocError / AuditError
//!   └── allocator - the public Allocator type
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use allocator::Allocator;
//!
//! let mut heap = Allocator::init(4096).expect("mmap");
//!
//! let a = heap.alloc(1024).expect("alloc");
//! let b = heap.alloc(256).expect("alloc");
//!
//! heap.free(a.as_ptr()).expect("free");
//! heap.free(b.as_ptr()).expect("free");
//! ```
//!
//! ## Limitations
//!
//! - Single-threaded: `Allocator` is not `Sync`. Wrap one in a `Mutex` for
//!   multi-threaded use; the core assumes exclusive access for the
//!   duration of each call.
//! - One region per `Allocator`, fixed at `init` time: no growth,
//!   shrinkage, or `munmap`.
//! - No realloc, calloc-style zeroing, or alignment beyond the fixed
//!   16-byte guarantee.
//! - Unix-only: built on `libc::mmap`.
//!
//! ## Safety
//!
//! Freeing a pointer not returned by `alloc`, double-freeing, or writing
//! past a block's payload corrupts the region's boundary tags and is
//! undefined behavior. [`Allocator::audit`] can catch the resulting
//! inconsistency after the fact but the core does not guard against it.

pub mod align;
mod allocator;
mod block;
pub mod error;
mod freelist;
mod region;

pub use allocator::Allocator;
pub use error::{AllocError, AuditError};

pub mod global {
  //! A process-wide singleton wrapping one [`Allocator`](crate::Allocator)
  //! behind a `Mutex`, mirroring the original allocator's global
  //! `M_Init`/`M_Alloc`/`M_Free`/`M_Display`/`M_DisplayAll` functions for
  //! callers that want a single shared instance rather than carrying an
  //! `Allocator` value around themselves.

  use std::ptr::NonNull;
  use std::sync::Mutex;

  use crate::{AllocError, Allocator};

  static INSTANCE: Mutex<Option<Allocator>> = Mutex::new(None);

  /// Initializes the process-wide allocator. Errors if it was already
  /// initialized, leaving the existing instance untouched.
  pub fn init(size: usize) -> Result<(), AllocError> {
    let mut slot = INSTANCE.lock().unwrap();
    if slot.is_some() {
      return Err(AllocError::AlreadyInitialized);
    }
    *slot = Some(Allocator::init(size)?);
    Ok(())
  }

  /// Allocates from the process-wide allocator. `None` if it has not
  /// been initialized yet.
  pub fn alloc(req: usize) -> Option<NonNull<u8>> {
    INSTANCE.lock().unwrap().as_mut()?.alloc(req)
  }

  /// Frees through the process-wide allocator.
  pub fn free(p: *mut u8) -> Result<(), AllocError> {
    INSTANCE.lock().unwrap().as_mut().ok_or(AllocError::NotInitialized)?.free(p)
  }

  /// Renders the process-wide allocator's free-list snapshot.
  pub fn display_free() -> Result<String, AllocError> {
    Ok(INSTANCE.lock().unwrap().as_ref().ok_or(AllocError::NotInitialized)?.display_free())
  }

  /// Renders the process-wide allocator's full region layout.
  pub fn display_all() -> Result<String, AllocError> {
    Ok(INSTANCE.lock().unwrap().as_ref().ok_or(AllocError::NotInitialized)?.display_all())
  }

  #[cfg(test)]
  mod tests {
    use super::*;

    // init on an already-initialized allocator errs and leaves state
    // untouched. Exercised here (not in `allocator`'s own tests) because
    // only this process-wide singleton tracks "already initialized"
    // across calls; `Allocator::init` itself is a plain constructor.
    //
    // The static `INSTANCE` is shared with every other test in this
    // module, so this is deliberately the only test that touches it.
    #[test]
    fn reinit_errs_and_leaves_the_instance_untouched() {
      init(4096).expect("first init succeeds");
      let before = display_free().expect("instance is initialized");

      assert!(matches!(init(8192), Err(AllocError::AlreadyInitialized)));
      assert_eq!(display_free().expect("still initialized"), before);
    }
  }
}
