//! The public `Allocator` type: init, alloc, free, and the two
//! diagnostic walks, built on the `block`, `freelist`, and `region`
//! modules.

use std::fmt::Write as _;
use std::ptr::NonNull;

use log::{debug, trace};

use crate::align::BLOCK_ALIGN;
use crate::block::{self, Tag, BLOCK_OVERHEAD, TAG_SIZE};
use crate::error::{AllocError, AuditError};
use crate::freelist::{FreeList, Node, NODE_SIZE};
use crate::region::Region;
use crate::round_up;

/// A boundary-tag, next-fit, single-region heap allocator.
///
/// One instance owns exactly one mapped region; there is no growth,
/// shrinkage, or release back to the OS once [`Allocator::init`] succeeds.
/// Not `Sync`; callers who need a process-wide instance from multiple
/// threads should wrap one in a `Mutex` themselves.
#[derive(Debug)]
pub struct Allocator {
  region: Region,
  free_list: FreeList,
}

impl Allocator {
  /// Maps `size` bytes and carves them into a single free block spanning
  /// the whole region.
  pub fn init(size: usize) -> Result<Self, AllocError> {
    debug!("init({size})");

    let region = Region::map(size)?;
    let header = region.top();

    // SAFETY: the region was just mapped; its whole length is ours to
    // write a single block's tags into.
    unsafe { block::write_tags(header, region.len(), true) };

    let mut free_list = FreeList::new();
    let node = unsafe { header_to_node(header) };
    unsafe { free_list.prepend(node) };

    trace!(
      "init: top={:#x} bot={:#x} payload={}",
      header.as_ptr() as usize,
      region.bot() as usize,
      region.len() - BLOCK_OVERHEAD
    );

    Ok(Self { region, free_list })
  }

  /// Requests `req` bytes, rounding up to a multiple of 16 and walking
  /// the free list next-fit from the persistent cursor. Returns `None` on
  /// a non-positive request, an empty free list, or no block large
  /// enough.
  pub fn alloc(&mut self, req: usize) -> Option<NonNull<u8>> {
    if req == 0 || self.free_list.is_empty() {
      trace!("alloc({req}) = null (empty request or empty free list)");
      return None;
    }

    let want = round_up!(req, BLOCK_ALIGN);
    let start = self.free_list.current?;
    let mut candidate = start;

    loop {
      let header = unsafe { node_to_header(candidate) };
      let size = unsafe { header.as_ref().size() };
      trace!("alloc: examining {:#x} (size={size}, want={want})", header.as_ptr() as usize);

      if size >= want {
        let payload = unsafe { self.take_block(header, want) };
        trace!("alloc({req}) = {:#x}", payload.as_ptr() as usize);
        return Some(payload);
      }

      let next = unsafe { candidate.as_ref().next }.unwrap_or_else(|| {
        self.free_list.head.expect("free list non-empty while searching")
      });
      if next == start {
        trace!("alloc({req}) = null (no fit after full rotation)");
        return None;
      }
      candidate = next;
    }
  }

  /// Marks the selected block allocated, splitting off a free remainder
  /// first if the leftover would be large enough to hold a free-list node.
  /// Reseats the next-fit cursor onto the selected node's own former
  /// successor (wrapping to head) before unlinking it, not onto whatever
  /// the persistent cursor's own successor happens to be, since a rotation
  /// may have walked the search past several unfit candidates before
  /// landing here.
  ///
  /// # Safety
  /// `header` must be the header of a free block currently on
  /// `self.free_list` with payload capacity `>= want`.
  unsafe fn take_block(&mut self, header: NonNull<Tag>, want: usize) -> NonNull<u8> {
    let full_size = unsafe { header.as_ref().size() };
    let node = unsafe { header_to_node(header) };
    let successor = unsafe { node.as_ref().next };

    let final_size = if full_size > want + BLOCK_OVERHEAD + NODE_SIZE {
      let remainder_span = full_size - want;
      let remainder_header = unsafe {
        NonNull::new_unchecked(block::footer_of(header, want).as_ptr().add(1))
      };
      unsafe { block::write_tags(remainder_header, remainder_span, true) };
      let remainder_node = unsafe { header_to_node(remainder_header) };
      unsafe { self.free_list.prepend(remainder_node) };
      want
    } else {
      full_size
    };

    self.free_list.current = successor.or(self.free_list.head);
    unsafe { block::write_tags(header, final_size + BLOCK_OVERHEAD, false) };
    unsafe { self.free_list.unlink(node) };

    unsafe { block::payload_of(header) }
  }

  /// Frees the block at payload address `p` and coalesces it with
  /// whichever physically adjacent neighbors are also free.
  pub fn free(&mut self, p: *mut u8) -> Result<(), AllocError> {
    trace!("free({:?})", p);

    if p.is_null() {
      return Err(AllocError::NullPointer);
    }
    if !self.region.contains(p) {
      return Err(AllocError::OutOfRange);
    }

    let payload = unsafe { NonNull::new_unchecked(p) };
    let header = unsafe { block::header_of(payload) };
    unsafe { self.coalesce(header) };

    Ok(())
  }

  /// Marks `header`'s block free and merges it with whichever physical
  /// neighbors are also free: neither, the predecessor only, the successor
  /// only, or both.
  unsafe fn coalesce(&mut self, header: NonNull<Tag>) {
    let next = unsafe { block::next_header(header, self.region.bot()) };
    let prev = unsafe { block::prev_header(header, self.region.top().as_ptr()) };

    let next_free = next.map(|h| unsafe { h.as_ref().is_free() }).unwrap_or(false);
    let prev_free = prev.map(|h| unsafe { h.as_ref().is_free() }).unwrap_or(false);

    match (prev_free, next_free) {
      (false, false) => {
        let size = unsafe { header.as_ref().size() };
        unsafe { block::write_tags(header, size + BLOCK_OVERHEAD, true) };
        let node = unsafe { header_to_node(header) };
        unsafe { self.free_list.prepend(node) };
      }

      (true, false) => {
        let prev = prev.unwrap();
        let new_payload =
          unsafe { prev.as_ref().size() + header.as_ref().size() + 2 * TAG_SIZE };
        unsafe { block::write_tags(prev, new_payload + BLOCK_OVERHEAD, true) };
      }

      (false, true) => {
        let next = next.unwrap();
        let new_payload =
          unsafe { header.as_ref().size() + next.as_ref().size() + 2 * TAG_SIZE };

        let next_node = unsafe { header_to_node(next) };
        let header_node = unsafe { header_to_node(header) };
        unsafe {
          header_node
            .as_ptr()
            .write(Node { prev: next_node.as_ref().prev, next: next_node.as_ref().next });
          self.free_list.replace(next_node, header_node);
        }

        unsafe { block::write_tags(header, new_payload + BLOCK_OVERHEAD, true) };
      }

      (true, true) => {
        let prev = prev.unwrap();
        let next = next.unwrap();
        let new_payload = unsafe {
          prev.as_ref().size() + header.as_ref().size() + next.as_ref().size() + 4 * TAG_SIZE
        };

        let next_node = unsafe { header_to_node(next) };
        let prev_node = unsafe { header_to_node(prev) };
        // next_node's block is absorbed into prev's; if the cursor was
        // sitting on it, it must land on the surviving node instead of
        // wherever plain unlink would leave it (next_node's own successor).
        if self.free_list.current == Some(next_node) {
          self.free_list.current = Some(prev_node);
        }
        unsafe { self.free_list.unlink(next_node) };
        unsafe { block::write_tags(prev, new_payload + BLOCK_OVERHEAD, true) };
      }
    }
  }

  /// Renders a snapshot of the free list: one line per free block's
  /// header address and payload size. Does not mutate state.
  pub fn display_free(&self) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "---Free chuncks:");

    let mut cursor = self.free_list.head;
    let mut seen = std::collections::HashSet::new();
    while let Some(node) = cursor {
      if !seen.insert(node) {
        break;
      }
      let header = unsafe { node_to_header(node) };
      let size = unsafe { header.as_ref().size() };
      let _ = writeln!(out, "\tAddress: {:p}\t Size: {}", header.as_ptr(), size);
      cursor = unsafe { node.as_ref().next };
    }

    out
  }

  /// Renders the entire region: every block's header, free-list node (if
  /// free), and footer, followed by a compact free/used strip. Does not
  /// mutate state.
  pub fn display_all(&self) -> String {
    let mut out = String::new();
    out.push_str(&self.display_free());
    let _ = writeln!(out, "---DisplayAll");

    let mut header = Some(self.region.top());
    while let Some(h) = header {
      let tag = unsafe { h.as_ref() };
      let _ = writeln!(out, "Header: ({:p})", h.as_ptr());
      let _ = writeln!(out, "\tsize = {},\t free = {},\t pair = {:p}", tag.size(), tag.free, tag.pair);

      if tag.is_free() {
        let node = unsafe { header_to_node(h) };
        let node_ref = unsafe { node.as_ref() };
        let _ = writeln!(out, "Node: ({:p})", node.as_ptr());
        let _ = writeln!(
          out,
          "\tnext = {:?},\t prev = {:?}",
          node_ref.next.map(|n| n.as_ptr()),
          node_ref.prev.map(|n| n.as_ptr())
        );
      }

      let footer = tag.pair;
      let footer_ref = unsafe { &*footer };
      let _ = writeln!(out, "Footer: ({:p})", footer);
      let _ = writeln!(
        out,
        "\tsize = {},\t free = {},\t pair = {:p}",
        footer_ref.size(),
        footer_ref.free,
        footer_ref.pair
      );

      header = unsafe { block::next_header(h, self.region.bot()) };
    }

    out.push_str("\n\t");
    let mut header = Some(self.region.top());
    while let Some(h) = header {
      let tag = unsafe { h.as_ref() };
      out.push_str(if tag.is_free() { "|    |" } else { "|####|" });
      header = unsafe { block::next_header(h, self.region.bot()) };
    }
    out.push_str("\n\n");

    out
  }

  /// Walks the region and checks every structural invariant (tag
  /// agreement, alignment, coverage, no two adjacent free blocks,
  /// free-list membership in both directions, cursor validity), returning
  /// the first violation found. Never called implicitly; an opt-in audit.
  pub fn audit(&self) -> Result<(), AuditError> {
    let top = self.region.top().as_ptr() as usize;
    let bot = self.region.bot() as usize;

    let mut free_in_region = std::collections::HashSet::new();
    let mut prev_was_free: Option<usize> = None;
    let mut addr = top;
    let mut header = Some(self.region.top());

    while let Some(h) = header {
      let tag = unsafe { h.as_ref() };
      let footer = unsafe { &*tag.pair };

      if tag.size != footer.size || tag.free != footer.free {
        return Err(AuditError::TagMismatch(
          h.as_ptr() as usize,
          tag.size(),
          tag.is_free(),
          footer.size(),
          footer.is_free(),
        ));
      }
      if (h.as_ptr() as usize) % BLOCK_ALIGN != 0 {
        return Err(AuditError::HeaderNotAligned(h.as_ptr() as usize));
      }
      if tag.size() % BLOCK_ALIGN != 0 {
        return Err(AuditError::SizeNotAligned(h.as_ptr() as usize, tag.size()));
      }

      if tag.is_free() {
        free_in_region.insert(h.as_ptr() as usize);
        if let Some(prev_addr) = prev_was_free {
          return Err(AuditError::AdjacentFree(prev_addr, h.as_ptr() as usize));
        }
        prev_was_free = Some(h.as_ptr() as usize);
      } else {
        prev_was_free = None;
      }

      let span = BLOCK_OVERHEAD + tag.size();
      addr += span;

      header = unsafe { block::next_header(h, self.region.bot()) };
      if header.is_none() && addr != bot {
        return Err(AuditError::Coverage(h.as_ptr() as usize, addr));
      }
    }

    let mut listed = std::collections::HashSet::new();
    let mut cursor = self.free_list.head;
    while let Some(node) = cursor {
      if !listed.insert(node.as_ptr() as usize) {
        break;
      }
      let header = unsafe { node_to_header(node) };
      if !free_in_region.contains(&(header.as_ptr() as usize)) {
        return Err(AuditError::AllocatedInFreeList(header.as_ptr() as usize));
      }
      cursor = unsafe { node.as_ref().next };
    }

    for addr in &free_in_region {
      if !listed.contains(addr) {
        return Err(AuditError::MissingFromFreeList(*addr));
      }
    }

    if let Some(current) = self.free_list.current {
      if !listed.contains(&(current.as_ptr() as usize)) {
        return Err(AuditError::CursorNotOnFreeList(current.as_ptr() as usize));
      }
    }

    Ok(())
  }
}

/// Free-list node overlaid on a free block's payload.
///
/// # Safety
/// `header` must be the header of a block whose payload is at least
/// `NODE_SIZE` bytes (true for every free block, since the split rule
/// never creates a smaller one).
unsafe fn header_to_node(header: NonNull<Tag>) -> NonNull<Node> {
  unsafe { block::payload_of(header).cast() }
}

/// Inverse of [`header_to_node`].
///
/// # Safety
/// `node` must be the free-list node overlaid on some block's payload.
unsafe fn node_to_header(node: NonNull<Node>) -> NonNull<Tag> {
  unsafe { block::header_of(node.cast()) }
}
