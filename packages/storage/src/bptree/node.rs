//! Index and leaf node layouts for the B+ tree multimap.
//!
//! Mirrors the reference system's `Index<Key,Value>` / `Block<Key,Value>`
//! structs: a fixed node order/fanout with one slot of split headroom, a
//! `next` pointer threading leaves into a scan chain, and `Key_Value`
//! pairs ordered lexicographically (key first, then value) so the whole
//! leaf chain is a single total order.

use crate::codec::FixedSizeRecord;

/// Index node order: up to `ORDER` children / `ORDER - 1` separators in a
/// steady state, with one extra slot of headroom during insertion before
/// a split is triggered.
pub const ORDER: usize = 56;

/// Leaf fanout: up to `LEAF_CAP` (key, value) pairs in steady state, with
/// one extra slot of headroom before a split.
pub const LEAF_CAP: usize = 56;

/// No child/sibling/root at this offset.
pub const NIL: i64 = -1;

#[derive(Clone, Copy, Debug)]
pub struct KeyValue<K, V> {
    pub key: K,
    pub value: V,
}

impl<K: Ord, V: Ord> PartialEq for KeyValue<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}
impl<K: Ord, V: Ord> Eq for KeyValue<K, V> {}

impl<K: Ord, V: Ord> PartialOrd for KeyValue<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, V: Ord> Ord for KeyValue<K, V> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl<K: FixedSizeRecord, V: FixedSizeRecord> FixedSizeRecord for KeyValue<K, V> {
    const SIZE: usize = K::SIZE + V::SIZE;

    fn write_to(&self, buf: &mut [u8]) {
        self.key.write_to(&mut buf[..K::SIZE]);
        self.value.write_to(&mut buf[K::SIZE..K::SIZE + V::SIZE]);
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            key: K::read_from(&buf[..K::SIZE]),
            value: V::read_from(&buf[K::SIZE..K::SIZE + V::SIZE]),
        }
    }
}

/// An internal node: `entries.len() + 1 == children.len()`. `entries[i]`
/// is the smallest (key, value) reachable through `children[i + 1]`.
#[derive(Clone)]
pub struct IndexNode<K, V> {
    pub children: Vec<i64>,
    pub entries: Vec<KeyValue<K, V>>,
}

impl<K, V> IndexNode<K, V> {
    pub fn new() -> Self {
        Self {
            children: Vec::with_capacity(ORDER + 1),
            entries: Vec::with_capacity(ORDER),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<K: Copy + FixedSizeRecord, V: Copy + FixedSizeRecord> FixedSizeRecord for IndexNode<K, V> {
    const SIZE: usize = 4 + (ORDER + 1) * 8 + ORDER * (K::SIZE + V::SIZE);

    fn write_to(&self, buf: &mut [u8]) {
        use byteorder::{LittleEndian, ByteOrder};
        LittleEndian::write_u32(&mut buf[0..4], self.entries.len() as u32);
        let mut off = 4;
        for i in 0..=ORDER {
            let child = self.children.get(i).copied().unwrap_or(NIL);
            LittleEndian::write_i64(&mut buf[off..off + 8], child);
            off += 8;
        }
        let kv_size = KeyValue::<K, V>::SIZE;
        for i in 0..ORDER {
            match self.entries.get(i) {
                Some(kv) => kv.write_to(&mut buf[off..off + kv_size]),
                None => buf[off..off + kv_size].fill(0),
            }
            off += kv_size;
        }
    }

    fn read_from(buf: &[u8]) -> Self {
        use byteorder::{LittleEndian, ByteOrder};
        let count = LittleEndian::read_u32(&buf[0..4]) as usize;
        let mut off = 4;
        let mut children = Vec::with_capacity(ORDER + 1);
        for _ in 0..=ORDER {
            children.push(LittleEndian::read_i64(&buf[off..off + 8]));
            off += 8;
        }
        children.truncate(count + 1);
        let kv_size = KeyValue::<K, V>::SIZE;
        let mut entries = Vec::with_capacity(ORDER);
        for i in 0..ORDER {
            if i < count {
                entries.push(KeyValue::<K, V>::read_from(&buf[off..off + kv_size]));
            }
            off += kv_size;
        }
        Self { children, entries }
    }
}

/// A leaf node: up to `LEAF_CAP` (+1 headroom) key-value pairs, plus the
/// offset of the next leaf in the scan chain (`NIL` if last).
#[derive(Clone)]
pub struct LeafNode<K, V> {
    pub next: i64,
    pub entries: Vec<KeyValue<K, V>>,
}

impl<K, V> LeafNode<K, V> {
    pub fn new() -> Self {
        Self {
            next: NIL,
            entries: Vec::with_capacity(LEAF_CAP + 1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<K: Copy + FixedSizeRecord, V: Copy + FixedSizeRecord> FixedSizeRecord for LeafNode<K, V> {
    const SIZE: usize = 8 + 4 + (LEAF_CAP + 1) * (K::SIZE + V::SIZE);

    fn write_to(&self, buf: &mut [u8]) {
        use byteorder::{LittleEndian, ByteOrder};
        LittleEndian::write_i64(&mut buf[0..8], self.next);
        LittleEndian::write_u32(&mut buf[8..12], self.entries.len() as u32);
        let kv_size = KeyValue::<K, V>::SIZE;
        let mut off = 12;
        for i in 0..=LEAF_CAP {
            match self.entries.get(i) {
                Some(kv) => kv.write_to(&mut buf[off..off + kv_size]),
                None => buf[off..off + kv_size].fill(0),
            }
            off += kv_size;
        }
    }

    fn read_from(buf: &[u8]) -> Self {
        use byteorder::{LittleEndian, ByteOrder};
        let next = LittleEndian::read_i64(&buf[0..8]);
        let count = LittleEndian::read_u32(&buf[8..12]) as usize;
        let kv_size = KeyValue::<K, V>::SIZE;
        let mut off = 12;
        let mut entries = Vec::with_capacity(LEAF_CAP + 1);
        for i in 0..=LEAF_CAP {
            if i < count {
                entries.push(KeyValue::<K, V>::read_from(&buf[off..off + kv_size]));
            }
            off += kv_size;
        }
        Self { next, entries }
    }
}
