//! The structural error taxonomy for the storage layer.
//!
//! Every failure here is considered fatal by the layers above: a lookup
//! miss is `Ok(None)`/`Ok(vec![])`, never an `Err`. Only I/O and on-disk
//! corruption surface through [`Error`].

use std::io;

/// Structural failure reading or writing the paged heap / B+ tree.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("heap file I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("header slot {slot} out of bounds (file has {info_len} slots)")]
    HeaderSlotOutOfBounds { slot: usize, info_len: usize },

    #[error("page offset {offset} does not point at a valid record boundary")]
    MisalignedOffset { offset: i64 },

    #[error("B+ tree structural invariant violated: {0}")]
    CorruptTree(String),
}

pub type Result<T> = std::result::Result<T, Error>;
