//! Lattice collections -- the data-layout layer underneath the Lattice ECS.
//!
//! Two containers live here:
//!
//! - [`GrowableArray`]: a contiguous, doubling buffer with order-preserving
//!   and swap-remove erasure.
//! - [`HashTable`]: a chaining hash table whose entries live in three dense
//!   parallel arrays (`nexts`, `keys`, `values`). Chains are linked by array
//!   offset rather than by pointer, and removal keeps the arrays packed by
//!   moving the last entry into the hole.
//!
//! Every allocation either container makes goes through the
//! [`RawAllocator`] seam. Allocation failure is reported as an
//! [`AllocError`] value and never corrupts already-committed contents.
//!
//! # Quick Start
//!
//! ```
//! use lattice_collections::prelude::*;
//!
//! let mut table: HashTable<u32, &str> = HashTable::new();
//! table.insert(7, "seven").unwrap();
//! table.insert(9, "nine").unwrap();
//! assert_eq!(table.get(&7), Some(&"seven"));
//!
//! assert_eq!(table.remove(&7), Some("seven"));
//! assert_eq!(table.remove(&7), None);
//! assert_eq!(table.len(), 1);
//! ```

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod alloc;
#[allow(unsafe_code)]
pub mod array;
pub mod table;

pub use crate::alloc::{BudgetAllocator, RawAllocator, SystemAllocator};
pub use crate::array::GrowableArray;
pub use crate::table::{HashTable, Slot};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced when a container cannot obtain memory.
///
/// These are the only recoverable failures in this crate. Misuse (popping an
/// empty array, erasing out of range) panics instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// The requested element count does not fit in the address space.
    #[error("capacity overflow: {requested} elements of {elem_size} bytes each")]
    CapacityOverflow {
        requested: usize,
        elem_size: usize,
    },

    /// The allocator refused the request.
    #[error("allocator refused a request of {size} bytes (align {align})")]
    Refused {
        size: usize,
        align: usize,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::alloc::{BudgetAllocator, RawAllocator, SystemAllocator};
    pub use crate::array::GrowableArray;
    pub use crate::table::{HashTable, Slot};
    pub use crate::AllocError;
}
