//! A generic, disk-backed, ordered-multimap B+ tree.
//!
//! Duplicate keys are allowed; values under one key are kept sorted, so
//! the structure is equivalently an ordered set over `(K, V)` pairs with
//! `find(k)` returning a contiguous run. Node shapes live in [`node`];
//! the descent/split/rebalance algorithms live in [`tree`].

mod node;
mod tree;

pub use node::{IndexNode, KeyValue, LeafNode, LEAF_CAP, NIL, ORDER};
pub use tree::BPlusTree;
