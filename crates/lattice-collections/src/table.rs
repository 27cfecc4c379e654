//! Chaining hash table over structure-of-arrays storage.
//!
//! Layout:
//!
//! ```text
//! buckets: [head, head, ...]          bucket_count entries, fixed
//! nexts:   [next, next, next, ...]    \
//! keys:    [k0,   k1,   k2,   ...]     } parallel, len live entries
//! values:  [v0,   v1,   v2,   ...]    /
//! ```
//!
//! `buckets[hash(k) % bucket_count]` holds the dense index of the first entry
//! in that bucket's chain, and `nexts[i]` links entry `i` to the next entry in
//! the same chain. [`NIL`] terminates both. New entries are appended at the
//! dense tail and prepended to their chain. Removal unlinks the entry and
//! moves the last dense entry into the hole, relinking whichever pointer
//! referenced it, so the dense arrays never contain holes.
//!
//! Iteration order is the dense order. It is unspecified and changes after
//! any [`remove`](HashTable::remove).

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};
use std::mem;

use tracing::debug;

use crate::alloc::{RawAllocator, SystemAllocator};
use crate::array::GrowableArray;
use crate::AllocError;

/// Chain terminator / empty bucket marker.
pub const NIL: u32 = u32::MAX;

/// Bucket count used by [`HashTable::new`].
pub const DEFAULT_BUCKET_COUNT: usize = 256;

/// Dense capacity reserved on the first insert.
pub const INITIAL_CAPACITY: usize = 32;

/// Deterministic hasher used unless another is supplied.
pub type DefaultHashBuilder = BuildHasherDefault<DefaultHasher>;

/// Where a key lives, as found by [`HashTable::find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Dense index of the entry.
    pub index: usize,
    /// Bucket whose chain contains the entry.
    pub bucket: usize,
    /// Dense index of the preceding entry in the chain, `None` at the head.
    pub prev: Option<usize>,
}

/// A hash table with chained buckets and packed parallel entry arrays.
pub struct HashTable<K, V, A = SystemAllocator, S = DefaultHashBuilder>
where
    A: RawAllocator,
{
    buckets: GrowableArray<u32, A>,
    bucket_count: usize,
    nexts: GrowableArray<u32, A>,
    keys: GrowableArray<K, A>,
    values: GrowableArray<V, A>,
    hash_builder: S,
}

impl<K: Hash + Eq, V> HashTable<K, V> {
    /// Create an empty table with [`DEFAULT_BUCKET_COUNT`] buckets.
    /// Nothing is allocated until the first insert.
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKET_COUNT)
    }

    /// Create an empty table with `bucket_count` buckets.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is zero.
    pub fn with_buckets(bucket_count: usize) -> Self {
        Self::with_buckets_in(bucket_count, SystemAllocator)
    }
}

impl<K, V, A, S> HashTable<K, V, A, S>
where
    K: Hash + Eq,
    A: RawAllocator + Clone,
    S: BuildHasher,
{
    /// Create an empty table allocating from `alloc`.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is zero.
    pub fn with_buckets_in(bucket_count: usize, alloc: A) -> Self
    where
        S: Default,
    {
        Self::with_hasher_in(bucket_count, alloc, S::default())
    }

    /// Create an empty table with an explicit hasher.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is zero.
    pub fn with_hasher_in(bucket_count: usize, alloc: A, hash_builder: S) -> Self {
        assert!(bucket_count > 0, "a HashTable needs at least one bucket");
        Self {
            buckets: GrowableArray::new_in(alloc.clone()),
            bucket_count,
            nexts: GrowableArray::new_in(alloc.clone()),
            keys: GrowableArray::new_in(alloc.clone()),
            values: GrowableArray::new_in(alloc),
            hash_builder,
        }
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the table holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Entries the dense arrays can hold before the next growth.
    pub fn capacity(&self) -> usize {
        self.nexts
            .capacity()
            .min(self.keys.capacity())
            .min(self.values.capacity())
    }

    /// Number of buckets. Fixed for the lifetime of the table.
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    #[inline]
    fn bucket_of(&self, key: &K) -> usize {
        (self.hash_builder.hash_one(key) % self.bucket_count as u64) as usize
    }

    // -- lookup -------------------------------------------------------------

    /// Locate `key`, returning its dense index, bucket and chain predecessor.
    pub fn find(&self, key: &K) -> Option<Slot> {
        if self.buckets.is_empty() {
            return None;
        }
        let bucket = self.bucket_of(key);
        let mut prev = None;
        let mut cur = self.buckets[bucket];
        while cur != NIL {
            let index = cur as usize;
            if self.keys[index] == *key {
                return Some(Slot {
                    index,
                    bucket,
                    prev,
                });
            }
            prev = Some(index);
            cur = self.nexts[index];
        }
        None
    }

    /// Dense index of `key`, or `None` if absent.
    #[inline]
    pub fn index_of(&self, key: &K) -> Option<usize> {
        self.find(key).map(|slot| slot.index)
    }

    /// Whether `key` is present.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Shared reference to the value stored under `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        let index = self.index_of(key)?;
        Some(&self.values[index])
    }

    /// Mutable reference to the value stored under `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = self.index_of(key)?;
        Some(&mut self.values[index])
    }

    // -- insertion ----------------------------------------------------------

    /// Allocate the bucket array on first use.
    fn ensure_buckets(&mut self) -> Result<(), AllocError> {
        if !self.buckets.is_empty() {
            return Ok(());
        }
        self.buckets.ensure_capacity(self.bucket_count)?;
        for _ in 0..self.bucket_count {
            self.buckets.push(NIL)?;
        }
        Ok(())
    }

    /// Reserve room for `needed` entries in all three dense arrays.
    ///
    /// Each array either grows or keeps its old buffer, so a refusal midway
    /// leaves every stored entry where it was.
    fn reserve_entries(&mut self, needed: usize) -> Result<(), AllocError> {
        let current = self.capacity();
        if needed <= current {
            return Ok(());
        }
        let target = (current.saturating_mul(2)).max(INITIAL_CAPACITY).max(needed);
        self.nexts.ensure_capacity(target)?;
        self.keys.ensure_capacity(target)?;
        self.values.ensure_capacity(target)?;
        debug!(from = current, to = self.capacity(), "hash table grew");
        Ok(())
    }

    /// Append a new entry and prepend it to its chain. `key` must be absent.
    fn push_entry(&mut self, key: K, value: V) -> Result<usize, AllocError> {
        self.ensure_buckets()?;
        self.reserve_entries(self.len() + 1)?;

        let index = self.len();
        assert!(index < NIL as usize, "HashTable is limited to {NIL} entries");
        let bucket = self.bucket_of(&key);
        // Capacity is reserved, so none of these pushes can fail.
        self.nexts.push(self.buckets[bucket])?;
        self.keys.push(key)?;
        self.values.push(value)?;
        self.buckets[bucket] = index as u32;
        Ok(index)
    }

    /// Return the value under `key`, inserting `make()` first if absent.
    pub fn get_or_insert_with<F>(&mut self, key: K, make: F) -> Result<&mut V, AllocError>
    where
        F: FnOnce() -> V,
    {
        let index = match self.index_of(&key) {
            Some(index) => index,
            None => self.push_entry(key, make())?,
        };
        Ok(&mut self.values[index])
    }

    /// Return the value under `key`, inserting `V::default()` first if absent.
    pub fn get_or_default(&mut self, key: K) -> Result<&mut V, AllocError>
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Store `value` under `key`, returning the previous value if there was one.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, AllocError> {
        if let Some(index) = self.index_of(&key) {
            return Ok(Some(mem::replace(&mut self.values[index], value)));
        }
        self.push_entry(key, value)?;
        Ok(None)
    }

    // -- removal ------------------------------------------------------------

    /// Remove `key`, returning its value. Absent keys return `None` and leave
    /// the table untouched.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.find(key)?;

        // Unlink from the chain.
        let next = self.nexts[slot.index];
        match slot.prev {
            Some(prev) => self.nexts[prev] = next,
            None => self.buckets[slot.bucket] = next,
        }

        // The last entry is about to move into the hole; repoint whatever
        // referenced it.
        let last = self.len() - 1;
        if slot.index != last {
            let moved_bucket = self.bucket_of(&self.keys[last]);
            let last = last as u32;
            if self.buckets[moved_bucket] == last {
                self.buckets[moved_bucket] = slot.index as u32;
            } else {
                let mut cur = self.buckets[moved_bucket];
                loop {
                    debug_assert_ne!(cur, NIL, "moved entry missing from its chain");
                    let next = self.nexts[cur as usize];
                    if next == last {
                        self.nexts[cur as usize] = slot.index as u32;
                        break;
                    }
                    cur = next;
                }
            }
        }

        self.nexts.erase_fast(slot.index);
        self.keys.erase_fast(slot.index);
        Some(self.values.erase_fast(slot.index))
    }

    /// Remove every entry. Buckets and dense capacity are kept.
    pub fn clear(&mut self) {
        self.nexts.clear();
        self.keys.clear();
        self.values.clear();
        for head in self.buckets.iter_mut() {
            *head = NIL;
        }
    }

    // -- iteration ----------------------------------------------------------

    /// Live keys in dense order.
    pub fn keys(&self) -> &[K] {
        self.keys.as_slice()
    }

    /// Live values in dense order.
    pub fn values(&self) -> &[V] {
        self.values.as_slice()
    }

    /// `(key, value)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.keys.iter().zip(self.values.iter())
    }

    /// `(key, &mut value)` pairs in dense order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> + '_ {
        self.keys.iter().zip(self.values.iter_mut())
    }
}

impl<K: Hash + Eq, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, A, S> fmt::Debug for HashTable<K, V, A, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
    A: RawAllocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.keys.iter().zip(self.values.iter()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
