//! Chained Hash Table
//!
//! `Dict` is the hash table used for every keyed structure in the server:
//! database keyspaces, expiration indexes, the command registry, the client
//! registry and the reactor's timer list.
//!
//! ## Layout
//!
//! ```text
//!  table (power-of-two buckets)        entries (arena)
//!  ┌───┐                               ┌──────────────────────┐
//!  │ 0 │──► 3                        0 │ key, value, next: -  │
//!  │ 1 │──► -                        1 │ (free)               │
//!  │ 2 │──► 0                        2 │ key, value, next: -  │
//!  │ 3 │──► 2                        3 │ key, value, next: 1? │
//!  └───┘                               └──────────────────────┘
//! ```
//!
//! Buckets hold the index of the first entry of their chain; each entry
//! holds the index of the next one. Entries never move inside the arena, so
//! a resize only rewrites the bucket heads and `next` links.
//!
//! ## Growth
//!
//! The table starts without buckets. The first insertion allocates
//! `DICT_HT_INITIAL_SIZE` buckets and any insertion that finds the table
//! full (`used == size`) doubles it. Resizing rehashes every entry in one
//! step; there is no incremental rehash. That is fine here because the
//! server only resizes between commands.
//!
//! ## Hashing
//!
//! The table is parameterized by a [`DictType`] that supplies the hash and
//! key equality. Ready-made types cover byte-string keys, case-insensitive
//! names and integer ids.

use bytes::Bytes;
use thiserror::Error;

/// Bucket count allocated by the first insertion.
pub const DICT_HT_INITIAL_SIZE: usize = 4;

/// Errors returned by table operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DictError {
    /// The key is already present; the table was not modified.
    #[error("key already exists")]
    DuplicateKey,

    /// `expand` was asked for fewer buckets than there are elements.
    #[error("cannot expand to {requested} buckets with {used} elements stored")]
    InvalidExpand { requested: usize, used: usize },

    /// The requested size has no power of two representable in `usize`.
    #[error("table size overflow: {0}")]
    SizeOverflow(usize),
}

/// Hashing and equality for the keys of a table.
///
/// The implementing value lives inside the table, so it can carry private
/// state if a hash needs any.
pub trait DictType<K> {
    fn hash(&self, key: &K) -> u32;
    fn key_eq(&self, a: &K, b: &K) -> bool;
}

/// Thomas Wang's 32 bit mix function.
pub fn int_hash(mut key: u32) -> u32 {
    key = key.wrapping_add(!(key << 15));
    key ^= key >> 10;
    key = key.wrapping_add(key << 3);
    key ^= key >> 6;
    key = key.wrapping_add(!(key << 11));
    key ^= key >> 16;
    key
}

/// Bernstein's multiplicative string hash (`hash * 33 + c`, seed 5381).
pub fn gen_hash(buf: &[u8]) -> u32 {
    buf.iter().fold(5381u32, |hash, &b| {
        (hash << 5).wrapping_add(hash).wrapping_add(b as u32)
    })
}

/// Same as [`gen_hash`] but folds ASCII letters to lowercase first.
pub fn gen_case_hash(buf: &[u8]) -> u32 {
    buf.iter().fold(5381u32, |hash, &b| {
        (hash << 5)
            .wrapping_add(hash)
            .wrapping_add(b.to_ascii_lowercase() as u32)
    })
}

/// Binary-safe byte-string keys compared exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesKey;

impl DictType<Bytes> for BytesKey {
    fn hash(&self, key: &Bytes) -> u32 {
        gen_hash(key)
    }

    fn key_eq(&self, a: &Bytes, b: &Bytes) -> bool {
        a == b
    }
}

/// Byte-string keys compared ignoring ASCII case (command names).
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitiveKey;

impl DictType<Bytes> for CaseInsensitiveKey {
    fn hash(&self, key: &Bytes) -> u32 {
        gen_case_hash(key)
    }

    fn key_eq(&self, a: &Bytes, b: &Bytes) -> bool {
        a.eq_ignore_ascii_case(b)
    }
}

/// Integer ids (client ids, timer ids).
#[derive(Debug, Clone, Copy, Default)]
pub struct IntKey;

impl DictType<u64> for IntKey {
    fn hash(&self, key: &u64) -> u32 {
        int_hash((*key as u32) ^ ((*key >> 32) as u32))
    }

    fn key_eq(&self, a: &u64, b: &u64) -> bool {
        a == b
    }
}

#[derive(Debug)]
struct DictEntry<K, V> {
    key: K,
    value: V,
    next: Option<usize>,
}

/// A chained hash table with power-of-two sizing.
#[derive(Debug)]
pub struct Dict<K, V, T> {
    /// Bucket heads; empty until the first insertion.
    table: Vec<Option<usize>>,
    size_mask: usize,
    used: usize,
    entries: Vec<Option<DictEntry<K, V>>>,
    /// Arena slots released by deletions, reused before growing the arena.
    free: Vec<usize>,
    ty: T,
}

impl<K, V, T: Default> Default for Dict<K, V, T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<K, V, T> Dict<K, V, T> {
    /// Creates an empty table. No buckets are allocated yet.
    pub fn new(ty: T) -> Self {
        Self {
            table: Vec::new(),
            size_mask: 0,
            used: 0,
            entries: Vec::new(),
            free: Vec::new(),
            ty,
        }
    }

    /// Number of stored elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Number of buckets (zero or a power of two).
    #[inline]
    pub fn slots(&self) -> usize {
        self.table.len()
    }

    /// Iterates over all `(key, value)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter_map(|slot| slot.as_ref().map(|e| (&e.key, &e.value)))
    }

    /// Removes every element and releases the bucket array.
    pub fn clear(&mut self) {
        self.table = Vec::new();
        self.size_mask = 0;
        self.used = 0;
        self.entries.clear();
        self.free.clear();
    }
}

impl<K, V, T: DictType<K>> Dict<K, V, T> {
    #[inline]
    fn bucket_of(&self, key: &K) -> usize {
        self.ty.hash(key) as usize & self.size_mask
    }

    #[inline]
    fn entry(&self, idx: usize) -> &DictEntry<K, V> {
        self.entries[idx]
            .as_ref()
            .unwrap_or_else(|| unreachable!("dangling chain link {idx}"))
    }

    /// Inserts `key` → `value`. Fails without touching the table if the key
    /// already exists.
    pub fn add(&mut self, key: K, value: V) -> Result<(), DictError> {
        let bucket = self.key_index(&key)?.ok_or(DictError::DuplicateKey)?;

        let entry = DictEntry {
            key,
            value,
            next: self.table[bucket],
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.entries[idx] = Some(entry);
                idx
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        };
        self.table[bucket] = Some(idx);
        self.used += 1;
        Ok(())
    }

    /// Inserts or overwrites. Returns `true` if the key was new.
    pub fn replace(&mut self, key: K, value: V) -> bool {
        if let Some(slot) = self.get_mut(&key) {
            *slot = value;
            return false;
        }
        // The key is absent, so the only possible failure is a size overflow,
        // which cannot happen before `used` reaches `usize::MAX / 2`.
        self.add(key, value).is_ok()
    }

    /// Looks up `key`, returning the stored key and value.
    pub fn find(&self, key: &K) -> Option<(&K, &V)> {
        let idx = self.find_index(key)?;
        let entry = self.entry(idx);
        Some((&entry.key, &entry.value))
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = self.find_index(key)?;
        self.entries[idx].as_mut().map(|e| &mut e.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find_index(key).is_some()
    }

    /// Removes `key` and drops its key and value. Returns `false` if absent.
    pub fn delete(&mut self, key: &K) -> bool {
        self.detach(key).is_some()
    }

    /// Unlinks `key` and hands ownership of the pair back to the caller
    /// instead of dropping it.
    pub fn detach(&mut self, key: &K) -> Option<(K, V)> {
        if self.table.is_empty() {
            return None;
        }
        let bucket = self.bucket_of(key);
        let mut prev: Option<usize> = None;
        let mut cursor = self.table[bucket];

        while let Some(idx) = cursor {
            let entry = self.entry(idx);
            let next = entry.next;
            if self.ty.key_eq(key, &entry.key) {
                match prev {
                    Some(p) => {
                        if let Some(prev_entry) = self.entries[p].as_mut() {
                            prev_entry.next = next;
                        }
                    }
                    None => self.table[bucket] = next,
                }
                let removed = self.entries[idx].take()?;
                self.free.push(idx);
                self.used -= 1;
                return Some((removed.key, removed.value));
            }
            prev = Some(idx);
            cursor = next;
        }
        None
    }

    /// Resizes the bucket array to the smallest power of two that is at
    /// least `min_size` (and at least `DICT_HT_INITIAL_SIZE`), rehashing
    /// every element into it.
    pub fn expand(&mut self, min_size: usize) -> Result<(), DictError> {
        if self.used > min_size {
            return Err(DictError::InvalidExpand {
                requested: min_size,
                used: self.used,
            });
        }
        let real_size = next_power(min_size)?;
        let new_mask = real_size - 1;
        let mut new_table: Vec<Option<usize>> = vec![None; real_size];

        for bucket in 0..self.table.len() {
            let mut cursor = self.table[bucket];
            while let Some(idx) = cursor {
                let entry = self.entries[idx]
                    .as_mut()
                    .unwrap_or_else(|| unreachable!("dangling chain link {idx}"));
                cursor = entry.next;
                let h = self.ty.hash(&entry.key) as usize & new_mask;
                entry.next = new_table[h];
                new_table[h] = Some(idx);
            }
        }

        self.table = new_table;
        self.size_mask = new_mask;
        Ok(())
    }

    fn expand_if_needed(&mut self) -> Result<(), DictError> {
        if self.table.is_empty() {
            return self.expand(DICT_HT_INITIAL_SIZE);
        }
        if self.used == self.table.len() {
            return self.expand(self.table.len() * 2);
        }
        Ok(())
    }

    /// Returns the bucket a new `key` should go into, or `None` if the key
    /// is already stored. Grows the table first when it is empty or full.
    fn key_index(&mut self, key: &K) -> Result<Option<usize>, DictError> {
        self.expand_if_needed()?;
        let bucket = self.bucket_of(key);
        let mut cursor = self.table[bucket];
        while let Some(idx) = cursor {
            let entry = self.entry(idx);
            if self.ty.key_eq(key, &entry.key) {
                return Ok(None);
            }
            cursor = entry.next;
        }
        Ok(Some(bucket))
    }

    fn find_index(&self, key: &K) -> Option<usize> {
        if self.table.is_empty() {
            return None;
        }
        let mut cursor = self.table[self.bucket_of(key)];
        while let Some(idx) = cursor {
            let entry = self.entry(idx);
            if self.ty.key_eq(key, &entry.key) {
                return Some(idx);
            }
            cursor = entry.next;
        }
        None
    }
}

fn next_power(size: usize) -> Result<usize, DictError> {
    size.max(DICT_HT_INITIAL_SIZE)
        .checked_next_power_of_two()
        .ok_or(DictError::SizeOverflow(size))
}

#[cfg(test)]
mod tests {
    use super::*;

    type Table = Dict<Bytes, u32, BytesKey>;

    fn key(i: u32) -> Bytes {
        Bytes::from(format!("key:{}", i))
    }

    /// Every key lands in exactly the same bucket.
    #[derive(Default)]
    struct Colliding;

    impl DictType<u64> for Colliding {
        fn hash(&self, _key: &u64) -> u32 {
            7
        }

        fn key_eq(&self, a: &u64, b: &u64) -> bool {
            a == b
        }
    }

    #[test]
    fn test_starts_without_buckets() {
        let table = Table::default();
        assert_eq!(table.slots(), 0);
        assert!(table.is_empty());
        assert!(table.find(&key(1)).is_none());
    }

    #[test]
    fn test_first_add_allocates_initial_size() {
        let mut table = Table::default();
        table.add(key(1), 1).unwrap();
        assert_eq!(table.slots(), DICT_HT_INITIAL_SIZE);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_add_duplicate_fails_without_mutation() {
        let mut table = Table::default();
        table.add(key(1), 1).unwrap();
        assert_eq!(table.add(key(1), 2), Err(DictError::DuplicateKey));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&key(1)), Some(&1));
    }

    #[test]
    fn test_doubles_when_full() {
        let mut table = Table::default();
        for i in 0..4 {
            table.add(key(i), i).unwrap();
        }
        assert_eq!(table.slots(), 4);

        table.add(key(4), 4).unwrap();
        assert_eq!(table.slots(), 8);

        for i in 5..9 {
            table.add(key(i), i).unwrap();
        }
        assert_eq!(table.slots(), 16);
    }

    #[test]
    fn test_resize_preserves_membership() {
        let mut table = Table::default();
        for i in 0..100 {
            table.add(key(i), i).unwrap();
        }
        let before: Vec<Option<u32>> = (0..100).map(|i| table.get(&key(i)).copied()).collect();

        table.expand(1000).unwrap();
        assert_eq!(table.slots(), 1024);

        let after: Vec<Option<u32>> = (0..100).map(|i| table.get(&key(i)).copied()).collect();
        assert_eq!(before, after);
        assert!(table.get(&key(100)).is_none());
    }

    #[test]
    fn test_expand_smaller_than_used_fails() {
        let mut table = Table::default();
        for i in 0..10 {
            table.add(key(i), i).unwrap();
        }
        assert_eq!(
            table.expand(5),
            Err(DictError::InvalidExpand {
                requested: 5,
                used: 10
            })
        );
        assert_eq!(table.len(), 10);
    }

    #[test]
    fn test_used_tracks_net_adds_and_deletes() {
        let mut table = Table::default();
        let mut expected = 0usize;
        for i in 0..200 {
            if table.add(key(i % 150), i).is_ok() {
                expected += 1;
            }
            if i % 3 == 0 && table.delete(&key(i / 2)) {
                expected -= 1;
            }
            assert_eq!(table.len(), expected);
        }
    }

    #[test]
    fn test_deleted_keys_are_gone_and_others_remain() {
        let mut table = Table::default();
        for i in 0..64 {
            table.add(key(i), i).unwrap();
        }
        for i in (0..64).step_by(2) {
            assert!(table.delete(&key(i)));
        }
        for i in 0..64 {
            assert_eq!(table.contains_key(&key(i)), i % 2 == 1);
        }
        assert!(!table.delete(&key(0)));
        assert_eq!(table.len(), 32);
    }

    #[test]
    fn test_detach_returns_ownership() {
        let mut table = Table::default();
        table.add(key(7), 70).unwrap();
        let (k, v) = table.detach(&key(7)).unwrap();
        assert_eq!(k, key(7));
        assert_eq!(v, 70);
        assert!(table.detach(&key(7)).is_none());
    }

    #[test]
    fn test_long_chain_unlinking() {
        let mut table: Dict<u64, u64, Colliding> = Dict::default();
        for i in 0..10 {
            table.add(i, i * 10).unwrap();
        }
        // Middle, head and tail of the same chain.
        assert!(table.delete(&5));
        assert!(table.delete(&9));
        assert!(table.delete(&0));
        for i in 0..10 {
            let present = !matches!(i, 0 | 5 | 9);
            assert_eq!(table.get(&i).copied(), present.then_some(i * 10));
        }
        // Freed slots are reused.
        table.add(42, 420).unwrap();
        assert_eq!(table.get(&42), Some(&420));
        assert_eq!(table.len(), 8);
    }

    #[test]
    fn test_replace_overwrites() {
        let mut table = Table::default();
        assert!(table.replace(key(1), 1));
        assert!(!table.replace(key(1), 2));
        assert_eq!(table.get(&key(1)), Some(&2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_case_insensitive_keys() {
        let mut table: Dict<Bytes, u8, CaseInsensitiveKey> = Dict::default();
        table.add(Bytes::from_static(b"get"), 1).unwrap();
        assert_eq!(table.get(&Bytes::from_static(b"GET")), Some(&1));
        assert_eq!(table.get(&Bytes::from_static(b"GeT")), Some(&1));
        assert_eq!(
            table.add(Bytes::from_static(b"Get"), 2),
            Err(DictError::DuplicateKey)
        );
    }

    #[test]
    fn test_int_keys() {
        let mut table: Dict<u64, &str, IntKey> = Dict::default();
        table.add(3, "three").unwrap();
        table.add(u64::MAX, "max").unwrap();
        assert_eq!(table.get(&3), Some(&"three"));
        assert_eq!(table.get(&u64::MAX), Some(&"max"));
        assert_eq!(table.iter().count(), 2);
    }

    #[test]
    fn test_clear_resets_to_empty() {
        let mut table = Table::default();
        for i in 0..20 {
            table.add(key(i), i).unwrap();
        }
        table.clear();
        assert_eq!(table.len(), 0);
        assert_eq!(table.slots(), 0);
        table.add(key(1), 1).unwrap();
        assert_eq!(table.slots(), DICT_HT_INITIAL_SIZE);
    }

    #[test]
    fn test_hash_functions() {
        assert_eq!(gen_hash(b""), 5381);
        assert_eq!(gen_hash(b"a"), 5381 * 33 + 97);
        assert_eq!(gen_case_hash(b"PING"), gen_hash(b"ping"));
        assert_ne!(int_hash(1), int_hash(2));
        assert_eq!(int_hash(99), int_hash(99));
    }
}
