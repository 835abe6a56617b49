//! Fixed-size binary encoding for heap-file records.
//!
//! Every record ever written to a [`crate::heap::PagedHeap`] or stored as a
//! B+ tree key/value must have a compile-time-known byte width: the heap
//! addresses records purely by `offset = n * SIZE`, and the B+ tree nodes
//! pack a fixed number of (key, value) slots per page. [`FixedSizeRecord`]
//! is the seam that makes that possible without reflection.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// A type that can be encoded into, and decoded from, a fixed-width byte
/// buffer. `SIZE` must equal the exact number of bytes `write_to` emits.
pub trait FixedSizeRecord: Sized + Copy {
    const SIZE: usize;

    /// Encodes `self` into `buf`. `buf.len() == Self::SIZE`.
    fn write_to(&self, buf: &mut [u8]);

    /// Decodes a value previously produced by [`FixedSizeRecord::write_to`].
    /// `buf.len() == Self::SIZE`.
    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! impl_fixed_size_record_int {
    ($ty:ty, $size:expr, $write:ident, $read:ident) => {
        impl FixedSizeRecord for $ty {
            const SIZE: usize = $size;

            fn write_to(&self, mut buf: &mut [u8]) {
                buf.$write::<LittleEndian>(*self).expect("buffer sized to SIZE");
            }

            fn read_from(mut buf: &[u8]) -> Self {
                buf.$read::<LittleEndian>().expect("buffer sized to SIZE")
            }
        }
    };
}

impl_fixed_size_record_int!(i64, 8, write_i64, read_i64);
impl_fixed_size_record_int!(u64, 8, write_u64, read_u64);
impl_fixed_size_record_int!(i32, 4, write_i32, read_i32);
impl_fixed_size_record_int!(u32, 4, write_u32, read_u32);

impl FixedSizeRecord for u8 {
    const SIZE: usize = 1;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = *self;
    }

    fn read_from(buf: &[u8]) -> Self {
        buf[0]
    }
}

impl FixedSizeRecord for bool {
    const SIZE: usize = 1;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = u8::from(*self);
    }

    fn read_from(buf: &[u8]) -> Self {
        buf[0] != 0
    }
}

/// A tuple of two fixed-size records packs as the concatenation of both.
/// Used for composite keys such as `(train_id_hash, origin_date)`.
impl<A: FixedSizeRecord, B: FixedSizeRecord> FixedSizeRecord for (A, B) {
    const SIZE: usize = A::SIZE + B::SIZE;

    fn write_to(&self, buf: &mut [u8]) {
        self.0.write_to(&mut buf[..A::SIZE]);
        self.1.write_to(&mut buf[A::SIZE..A::SIZE + B::SIZE]);
    }

    fn read_from(buf: &[u8]) -> Self {
        let a = A::read_from(&buf[..A::SIZE]);
        let b = B::read_from(&buf[A::SIZE..A::SIZE + B::SIZE]);
        (a, b)
    }
}
