//! A growable, contiguous array that allocates through a [`RawAllocator`].
//!
//! [`GrowableArray`] is a `Vec`-like buffer with two differences that the
//! rest of the workspace relies on:
//!
//! - growth is fallible: [`push`](GrowableArray::push) and
//!   [`ensure_capacity`](GrowableArray::ensure_capacity) report an
//!   [`AllocError`] instead of aborting, and a failed growth leaves the
//!   existing elements in place;
//! - capacity follows a fixed policy: it never shrinks, and every growth
//!   lands on the next power of two at or above the request, with a floor of
//!   [`MIN_CAPACITY`].
//!
//! # Safety
//!
//! The buffer is a manually managed allocation. The invariants are that
//! `ptr` is valid for `cap` elements whenever `cap > 0` and `T` is not
//! zero-sized, and that exactly the first `len` slots are initialised.

use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use tracing::debug;

use crate::alloc::{RawAllocator, SystemAllocator};
use crate::AllocError;

/// Smallest capacity a non-empty array grows to.
pub const MIN_CAPACITY: usize = 16;

/// A contiguous, growable array of `T` backed by allocator `A`.
pub struct GrowableArray<T, A: RawAllocator = SystemAllocator> {
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
    alloc: A,
    _marker: PhantomData<T>,
}

// The array owns its elements exactly like a `Vec<T>` does.
unsafe impl<T: Send, A: RawAllocator + Send> Send for GrowableArray<T, A> {}
unsafe impl<T: Sync, A: RawAllocator + Sync> Sync for GrowableArray<T, A> {}

impl<T> GrowableArray<T, SystemAllocator> {
    /// Create an empty array. Does not allocate.
    pub fn new() -> Self {
        Self::new_in(SystemAllocator)
    }

    /// Create an array with room for at least `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
        Self::with_capacity_in(capacity, SystemAllocator)
    }
}

impl<T, A: RawAllocator> GrowableArray<T, A> {
    /// Create an empty array that will allocate from `alloc`.
    pub fn new_in(alloc: A) -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            // Zero-sized elements never need storage.
            cap: if mem::size_of::<T>() == 0 { usize::MAX } else { 0 },
            alloc,
            _marker: PhantomData,
        }
    }

    /// Create an array in `alloc` with room for at least `capacity` elements.
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Result<Self, AllocError> {
        let mut array = Self::new_in(alloc);
        array.ensure_capacity(capacity)?;
        Ok(array)
    }

    /// Number of live elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the current buffer can hold without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// The allocator backing this array.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    // -- growth -------------------------------------------------------------

    fn overflow(requested: usize) -> AllocError {
        AllocError::CapacityOverflow {
            requested,
            elem_size: mem::size_of::<T>(),
        }
    }

    /// Make room for at least `requested` elements.
    ///
    /// Does nothing if the capacity already suffices. Otherwise the buffer
    /// is resized to the next power of two `>= max(requested, MIN_CAPACITY)`.
    /// On failure the array is unchanged.
    pub fn ensure_capacity(&mut self, requested: usize) -> Result<(), AllocError> {
        if requested <= self.cap {
            return Ok(());
        }
        let new_cap = requested
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()
            .ok_or_else(|| Self::overflow(requested))?;
        let new_layout = Layout::array::<T>(new_cap).map_err(|_| Self::overflow(requested))?;

        let new_ptr = if self.cap == 0 {
            self.alloc.allocate(new_layout)
        } else {
            // SAFETY: `ptr` was allocated by `alloc` with the current layout,
            // and `new_layout` was validated above.
            unsafe {
                self.alloc
                    .reallocate(self.ptr.cast(), self.current_layout(), new_layout.size())
            }
        };
        let Some(new_ptr) = new_ptr else {
            return Err(AllocError::Refused {
                size: new_layout.size(),
                align: new_layout.align(),
            });
        };

        debug!(
            element = std::any::type_name::<T>(),
            from = self.cap,
            to = new_cap,
            "array grew"
        );
        self.ptr = new_ptr.cast();
        self.cap = new_cap;
        Ok(())
    }

    /// Layout of the live allocation. Only meaningful when one exists.
    fn current_layout(&self) -> Layout {
        debug_assert!(self.cap > 0 && mem::size_of::<T>() > 0);
        // SAFETY: the same size/align pair passed `Layout::array` when the
        // buffer was allocated.
        unsafe { Layout::from_size_align_unchecked(mem::size_of::<T>() * self.cap, mem::align_of::<T>()) }
    }

    // -- element operations -------------------------------------------------

    /// Append `value`, returning the index it was stored at.
    ///
    /// If the buffer has to grow and the allocator refuses, `value` is
    /// dropped and the array is left as it was.
    pub fn push(&mut self, value: T) -> Result<usize, AllocError> {
        if self.len == self.cap {
            self.ensure_capacity(self.len + 1)?;
        }
        // SAFETY: len < cap, so the slot is inside the allocation.
        unsafe { ptr::write(self.ptr.as_ptr().add(self.len), value) };
        let index = self.len;
        self.len += 1;
        Ok(index)
    }

    /// Remove and return the last element.
    ///
    /// # Panics
    ///
    /// Panics if the array is empty.
    pub fn pop(&mut self) -> T {
        assert!(self.len > 0, "pop on an empty GrowableArray");
        self.len -= 1;
        // SAFETY: the slot at the old `len - 1` was initialised and is now
        // outside the live range, so it is read exactly once.
        unsafe { ptr::read(self.ptr.as_ptr().add(self.len)) }
    }

    /// Remove and return the last element, or `None` when empty.
    pub fn try_pop(&mut self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            Some(self.pop())
        }
    }

    /// Remove the element at `index`, shifting everything after it down.
    ///
    /// Order is preserved; cost is O(len - index).
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn erase(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "erase index {index} out of range (len {})",
            self.len
        );
        // SAFETY: index is in bounds; the tail is shifted with an
        // overlapping copy and the vacated last slot leaves the live range.
        unsafe {
            let hole = self.ptr.as_ptr().add(index);
            let value = ptr::read(hole);
            ptr::copy(hole.add(1), hole, self.len - index - 1);
            self.len -= 1;
            value
        }
    }

    /// Remove the element at `index` by moving the last element into its
    /// place. O(1), but does not preserve order.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn erase_fast(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "erase_fast index {index} out of range (len {})",
            self.len
        );
        let last = self.len - 1;
        // SAFETY: both slots are in bounds and initialised; the last slot is
        // moved (not duplicated) because it leaves the live range.
        unsafe {
            let base = self.ptr.as_ptr();
            let value = ptr::read(base.add(index));
            if index != last {
                ptr::copy_nonoverlapping(base.add(last), base.add(index), 1);
            }
            self.len = last;
            value
        }
    }

    /// Drop every element. Capacity is kept.
    pub fn clear(&mut self) {
        let len = self.len;
        // Shrink first so a panicking destructor cannot cause a double drop.
        self.len = 0;
        // SAFETY: the first `len` slots were initialised.
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.ptr.as_ptr(), len)) };
    }

    /// The live elements as a slice. No copy is made.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `ptr` is non-null and aligned, and the first `len` slots
        // are initialised.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The live elements as a mutable slice.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in `as_slice`, plus `&mut self` guarantees uniqueness.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T, A: RawAllocator> Drop for GrowableArray<T, A> {
    fn drop(&mut self) {
        self.clear();
        if mem::size_of::<T>() > 0 && self.cap > 0 {
            // SAFETY: the buffer was obtained from `alloc` with this layout.
            unsafe { self.alloc.release(self.ptr.cast(), self.current_layout()) };
        }
    }
}

impl<T, A: RawAllocator + Default> Default for GrowableArray<T, A> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<T, A: RawAllocator> Deref for GrowableArray<T, A> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: RawAllocator> DerefMut for GrowableArray<T, A> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'a, T, A: RawAllocator> IntoIterator for &'a GrowableArray<T, A> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T, A: RawAllocator> IntoIterator for &'a mut GrowableArray<T, A> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

impl<T: fmt::Debug, A: RawAllocator> fmt::Debug for GrowableArray<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
