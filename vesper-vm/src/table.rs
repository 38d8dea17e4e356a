// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Open-addressed hash table keyed by interned strings.
//!
//! Used for globals, instance fields, and class method tables. Keys carry
//! their string's FNV-1a hash, so probing never touches the heap; key
//! comparison is handle identity, which interning makes equivalent to
//! content equality.

use std::mem;

use crate::object::ObjRef;
use crate::value::Value;

/// An interned-string key: the string handle plus its precomputed hash.
#[derive(Debug, Clone, Copy)]
pub struct StrKey {
    pub obj: ObjRef,
    pub hash: u32,
}

impl PartialEq for StrKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.obj == other.obj
    }
}

impl Eq for StrKey {}

#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Tombstone,
    Pair { key: StrKey, value: Value },
}

/// Linear-probing map from [`StrKey`] to [`Value`].
///
/// Capacity is a power of two (starting at 8); tombstones left by deletion
/// count toward the 3/4 load factor so probe sequences stay bounded, and
/// are discarded on resize.
#[derive(Debug, Default)]
pub struct Table {
    slots: Vec<Slot>,
    /// Live pairs plus tombstones.
    count: usize,
}

const MIN_CAPACITY: usize = 8;

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, key: StrKey) -> Option<Value> {
        if self.slots.is_empty() {
            return None;
        }
        match self.slots[self.probe(key)] {
            Slot::Pair { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Insert or replace. Returns true when the key was not present before.
    pub fn set(&mut self, key: StrKey, value: Value) -> bool {
        if self.count + 1 > self.slots.len() * 3 / 4 {
            self.grow();
        }

        let index = self.probe(key);
        let slot = &mut self.slots[index];
        match slot {
            Slot::Pair { value: stored, .. } => {
                *stored = value;
                false
            }
            Slot::Tombstone => {
                *slot = Slot::Pair { key, value };
                true
            }
            Slot::Empty => {
                *slot = Slot::Pair { key, value };
                self.count += 1;
                true
            }
        }
    }

    /// Remove `key`, leaving a tombstone. Returns true if it was present.
    pub fn delete(&mut self, key: StrKey) -> bool {
        if self.slots.is_empty() {
            return false;
        }
        let index = self.probe(key);
        match self.slots[index] {
            Slot::Pair { .. } => {
                self.slots[index] = Slot::Tombstone;
                true
            }
            _ => false,
        }
    }

    /// Copy every live entry of `src` into this table. Existing keys are
    /// overwritten, so callers layering tables apply the base table first.
    pub fn add_all(&mut self, src: &Table) {
        for (key, value) in src.iter() {
            self.set(key, value);
        }
    }

    /// Probe for an entry by hash, deciding key equality through `eq`.
    /// This is the interner's content-based lookup path.
    pub fn find_key(&self, hash: u32, eq: impl Fn(ObjRef) -> bool) -> Option<StrKey> {
        if self.slots.is_empty() {
            return None;
        }
        let mask = self.slots.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            match &self.slots[index] {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Pair { key, .. } => {
                    if key.hash == hash && eq(key.obj) {
                        return Some(*key);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Drop every entry whose key fails the predicate. The garbage
    /// collector uses this to purge dead strings from the intern table.
    pub fn retain_keys(&mut self, mut keep: impl FnMut(ObjRef) -> bool) {
        for slot in &mut self.slots {
            if let Slot::Pair { key, .. } = slot
                && !keep(key.obj)
            {
                *slot = Slot::Tombstone;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (StrKey, Value)> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Pair { key, value } => Some((*key, *value)),
            _ => None,
        })
    }

    /// Backing-store footprint, for GC byte accounting.
    pub(crate) fn heap_size(&self) -> usize {
        self.slots.capacity() * mem::size_of::<Slot>()
    }

    /// Index of the slot holding `key`, or of the slot an insertion of
    /// `key` should use. The caller has ensured capacity is non-zero and
    /// the table is never full, so the scan always terminates.
    fn probe(&self, key: StrKey) -> usize {
        let mask = self.slots.len() - 1;
        let mut index = key.hash as usize & mask;
        let mut tombstone: Option<usize> = None;
        loop {
            match &self.slots[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    tombstone.get_or_insert(index);
                }
                Slot::Pair { key: stored, .. } => {
                    if *stored == key {
                        return index;
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    fn grow(&mut self) {
        let new_capacity = (self.slots.len() * 2).max(MIN_CAPACITY);
        let old = mem::replace(&mut self.slots, vec![Slot::Empty; new_capacity]);
        self.count = 0;
        for slot in old {
            if let Slot::Pair { key, value } = slot {
                let index = self.probe(key);
                self.slots[index] = Slot::Pair { key, value };
                self.count += 1;
            }
        }
    }
}
