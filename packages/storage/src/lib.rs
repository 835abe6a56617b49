//! Ticket storage -- the persistence substrate for the reservation engine.
//!
//! Layered bottom-up exactly as the component design describes:
//!
//! - **`heap`** (L0): the paged heap file ("memory river"), a flat
//!   fixed-size-record store addressed by byte offset.
//! - **`cache`** (L0): a bounded, strictly-LRU, write-back page cache sitting
//!   in front of a heap file.
//! - **`bptree`** (L1): a generic on-disk B+ tree multimap composing the two
//!   above into an ordered (key, value) container.
//! - **`codec`**: the `FixedSizeRecord` encoding contract every page/record
//!   type in this crate implements.
//! - **`fixed_str`**: a bounded stack-allocated string, used wherever a
//!   domain type needs a compile-time-known byte width for a short string
//!   field (train ids, station names, usernames, ...).
//! - **`error`**: the structural error taxonomy -- I/O and on-disk
//!   corruption only; domain rejections never appear here.

pub mod bptree;
pub mod cache;
pub mod codec;
pub mod error;
pub mod fixed_str;
pub mod heap;

pub use bptree::BPlusTree;
pub use cache::{LruCache, PageCache};
pub use codec::FixedSizeRecord;
pub use error::{Error, Result};
pub use fixed_str::{FixedStr, TooLong};
pub use heap::PagedHeap;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {}
}
