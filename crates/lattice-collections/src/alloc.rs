//! The allocator seam every container grows through.
//!
//! Containers never call the global allocator directly. They hold a
//! [`RawAllocator`] and ask it for memory, which lets tests (and embedders
//! with their own heaps) substitute a different policy. Two implementations
//! ship with the crate:
//!
//! - [`SystemAllocator`] forwards to `std::alloc`.
//! - [`BudgetAllocator`] forwards to `std::alloc` until a byte budget is
//!   exhausted, then refuses. It is how the failure paths are exercised.

use std::alloc::{self, Layout};
use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use tracing::warn;

// ---------------------------------------------------------------------------
// RawAllocator
// ---------------------------------------------------------------------------

/// Raw memory provider used by [`GrowableArray`](crate::GrowableArray) and
/// [`HashTable`](crate::HashTable).
///
/// Callers never request zero-sized layouts.
pub trait RawAllocator {
    /// Allocate a block for `layout`. Returns `None` on failure.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Resize a block previously returned by this allocator.
    ///
    /// On failure `None` is returned and the original block is left untouched
    /// and still owned by the caller.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for `old_layout`, and
    /// `new_size` rounded up to `old_layout.align()` must not overflow `isize`.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator for `layout` and must
    /// not be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

// ---------------------------------------------------------------------------
// SystemAllocator
// ---------------------------------------------------------------------------

/// Forwards to the process-global allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemAllocator;

impl RawAllocator for SystemAllocator {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() > 0);
        // SAFETY: layout has a non-zero size.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        NonNull::new(alloc::realloc(ptr.as_ptr(), old_layout, new_size))
    }

    #[inline]
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        alloc::dealloc(ptr.as_ptr(), layout);
    }
}

// ---------------------------------------------------------------------------
// BudgetAllocator
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Budget {
    limit: Cell<usize>,
    in_use: Cell<usize>,
    refusals: Cell<usize>,
}

/// A [`SystemAllocator`] with a byte budget.
///
/// Clones share the same budget, so one `BudgetAllocator` handed to several
/// containers caps their combined footprint. Not thread-safe.
#[derive(Debug, Clone)]
pub struct BudgetAllocator {
    budget: Rc<Budget>,
}

impl BudgetAllocator {
    /// Create an allocator that hands out at most `limit` bytes at a time.
    pub fn new(limit: usize) -> Self {
        Self {
            budget: Rc::new(Budget {
                limit: Cell::new(limit),
                in_use: Cell::new(0),
                refusals: Cell::new(0),
            }),
        }
    }

    /// Change the budget. Blocks already handed out are not affected.
    pub fn set_limit(&self, limit: usize) {
        self.budget.limit.set(limit);
    }

    /// Bytes currently allocated through this budget.
    pub fn in_use(&self) -> usize {
        self.budget.in_use.get()
    }

    /// How many requests have been refused so far.
    pub fn refusals(&self) -> usize {
        self.budget.refusals.get()
    }

    fn admit(&self, extra: usize) -> bool {
        let in_use = self.budget.in_use.get();
        let limit = self.budget.limit.get();
        if in_use.saturating_add(extra) > limit {
            self.budget.refusals.set(self.budget.refusals.get() + 1);
            warn!(requested = extra, in_use, limit, "allocation refused: budget exhausted");
            return false;
        }
        true
    }
}

impl RawAllocator for BudgetAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if !self.admit(layout.size()) {
            return None;
        }
        let ptr = SystemAllocator.allocate(layout)?;
        self.budget.in_use.set(self.budget.in_use.get() + layout.size());
        Some(ptr)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        if new_size > old_layout.size() && !self.admit(new_size - old_layout.size()) {
            return None;
        }
        let new_ptr = SystemAllocator.reallocate(ptr, old_layout, new_size)?;
        let in_use = self.budget.in_use.get() - old_layout.size() + new_size;
        self.budget.in_use.set(in_use);
        Some(new_ptr)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        SystemAllocator.release(ptr, layout);
        self.budget
            .in_use
            .set(self.budget.in_use.get().saturating_sub(layout.size()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
