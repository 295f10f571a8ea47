//! Boundary-tag block layout.
//!
//! Every block in the managed region is `header | payload | footer`, where
//! header and footer are identical 16-byte tags. This module is the only
//! place that performs unchecked pointer arithmetic on the region; every
//! other module goes through these functions to move between a block's
//! header, its payload, its footer, and its physical neighbors.

use std::ptr::NonNull;

use crate::align::BLOCK_ALIGN;

/// A boundary tag. The same layout is used for both the header and the
/// footer of a block; `pair` on a header points at that block's footer
/// and vice versa, matching the original allocator's `header_t`. `size`
/// and `free` are `u32` (mirroring the original's two `int` fields) so the
/// whole tag fits in 16 bytes on a 64-bit target alongside the `pair`
/// pointer.
#[repr(C)]
#[derive(Debug)]
pub struct Tag {
  /// Payload capacity in bytes, not counting the two tags.
  pub size: u32,
  /// Nonzero if the block is on the free list.
  pub free: u32,
  /// Header -> footer, or footer -> header.
  pub pair: *mut Tag,
}

/// Size in bytes of a single boundary tag (header or footer).
pub const TAG_SIZE: usize = std::mem::size_of::<Tag>();

/// Total per-block overhead: one header plus one footer.
pub const BLOCK_OVERHEAD: usize = 2 * TAG_SIZE;

const _: () = assert!(TAG_SIZE == BLOCK_ALIGN, "boundary tag must be exactly 16 bytes");

impl Tag {
  pub fn is_free(&self) -> bool {
    self.free != 0
  }

  pub fn size(&self) -> usize {
    self.size as usize
  }
}

/// Writes matching header and footer tags for a block spanning `span` bytes
/// starting at `header`, with payload capacity `span - BLOCK_OVERHEAD`.
///
/// # Safety
/// `header` must be valid for a write of `span` bytes and `span` must be at
/// least [`BLOCK_OVERHEAD`].
pub unsafe fn write_tags(header: NonNull<Tag>, span: usize, free: bool) {
  debug_assert!(span >= BLOCK_OVERHEAD);
  let size = (span - BLOCK_OVERHEAD) as u32;
  let free = free as u32;

  unsafe {
    let footer = footer_of(header, size as usize);
    header.as_ptr().write(Tag { size, free, pair: footer.as_ptr() });
    footer.as_ptr().write(Tag { size, free, pair: header.as_ptr() });
  }
}

/// Footer address for a block whose header is at `header` and whose
/// payload capacity is `size` bytes.
///
/// # Safety
/// `header` must point at a live tag and `size` must be the block's
/// current payload size.
pub unsafe fn footer_of(header: NonNull<Tag>, size: usize) -> NonNull<Tag> {
  unsafe {
    let addr = (header.as_ptr() as *mut u8).add(TAG_SIZE + size);
    NonNull::new_unchecked(addr as *mut Tag)
  }
}

/// Payload address immediately following `header`.
///
/// # Safety
/// `header` must point at a live tag.
pub unsafe fn payload_of(header: NonNull<Tag>) -> NonNull<u8> {
  unsafe { NonNull::new_unchecked((header.as_ptr() as *mut u8).add(TAG_SIZE)) }
}

/// Header address for a payload pointer previously returned by
/// [`payload_of`] (or, equivalently, by `Allocator::alloc`).
///
/// # Safety
/// `payload` must point `TAG_SIZE` bytes past a live header.
pub unsafe fn header_of(payload: NonNull<u8>) -> NonNull<Tag> {
  unsafe { NonNull::new_unchecked(payload.as_ptr().sub(TAG_SIZE) as *mut Tag) }
}

/// Header of the block physically following the one headed by `header`,
/// or `None` if that would fall at or past `bot`.
///
/// # Safety
/// `header` must point at a live, correctly-tagged header whose `pair`
/// points at its own footer.
pub unsafe fn next_header(header: NonNull<Tag>, bot: *const Tag) -> Option<NonNull<Tag>> {
  unsafe {
    let footer = (*header.as_ptr()).pair;
    let candidate = (footer as *mut u8).add(TAG_SIZE) as *mut Tag;
    if candidate as *const Tag >= bot {
      None
    } else {
      Some(NonNull::new_unchecked(candidate))
    }
  }
}

/// Header of the block physically preceding the one headed by `header`,
/// or `None` if `header` is already the first block (sits at `top`).
///
/// # Safety
/// The tag immediately before `header` must be a live footer whose `pair`
/// points at its own header.
pub unsafe fn prev_header(header: NonNull<Tag>, top: *const Tag) -> Option<NonNull<Tag>> {
  unsafe {
    if header.as_ptr() as *const Tag <= top {
      return None;
    }
    let prev_footer = (header.as_ptr() as *mut Tag).sub(1);
    let prev_header = (*prev_footer).pair;
    Some(NonNull::new_unchecked(prev_header))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tag_size_is_sixteen_bytes() {
    assert_eq!(TAG_SIZE, 16);
    assert_eq!(BLOCK_OVERHEAD, 32);
  }

  #[test]
  fn write_tags_round_trips_through_conversions() {
    let mut buf = vec![0u8; 128];
    let header = unsafe { NonNull::new_unchecked(buf.as_mut_ptr() as *mut Tag) };

    unsafe {
      write_tags(header, 128, true);

      let footer = footer_of(header, 96);
      assert_eq!((*footer.as_ptr()).pair, header.as_ptr());
      assert_eq!((*header.as_ptr()).pair, footer.as_ptr());
      assert_eq!((*header.as_ptr()).size(), 96);
      assert!((*header.as_ptr()).is_free());

      let payload = payload_of(header);
      assert_eq!(header_of(payload), header);
    }
  }
}
