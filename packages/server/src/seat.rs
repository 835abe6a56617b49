//! The seat inventory engine (spec §4.4): a paged heap of `SeatMap`
//! records, one per (train, origin-date), addressed directly by byte
//! offset -- no B+ tree indirection, since the offset is already known
//! from `Train::seat_map_pos` plus the date's position in the sale
//! window.

use std::path::Path;

use ticket_storage::{FixedSizeRecord, PagedHeap, Result};

use crate::model::{Date, SeatMap};

/// Owns `seat.memoryriver`, the flat extent of `SeatMap` records backing
/// every released train's per-date inventory.
pub struct SeatEngine {
    heap: PagedHeap<SeatMap>,
}

impl SeatEngine {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let heap = PagedHeap::open(dir.as_ref().join("seat.memoryriver"), 1)?;
        Ok(Self { heap })
    }

    /// Allocates `sale_date_end - sale_date_start + 1` consecutive
    /// `SeatMap` records, all at `total_seats` capacity, and returns the
    /// base offset to be stashed in `Train::seat_map_pos`.
    pub fn allocate(
        &mut self,
        station_num: u8,
        total_seats: u32,
        sale_date_start: Date,
        sale_date_end: Date,
    ) -> Result<i64> {
        let days = sale_date_end.days_since(sale_date_start) + 1;
        let template = SeatMap::new(station_num, total_seats);
        self.heap.write_many(&template, days.max(0) as usize)
    }

    /// Byte offset of the seat map for `date`, given the train's extent
    /// base and the start of its sale window (spec §4.4).
    pub fn offset_for(seat_map_pos: i64, sale_date_start: Date, date: Date) -> i64 {
        seat_map_pos + date.days_since(sale_date_start) as i64 * SeatMap::SIZE as i64
    }

    pub fn query(&mut self, offset: i64) -> Result<SeatMap> {
        self.heap.read(offset)
    }

    /// Attempts to book `n` seats across segments `[i, j)`. On success,
    /// decrements `seat_map` in place and writes it back; on failure,
    /// `seat_map` is left untouched and the heap is not written.
    pub fn book(
        &mut self,
        offset: i64,
        i: usize,
        j: usize,
        n: u32,
        seat_map: &mut SeatMap,
    ) -> Result<bool> {
        if seat_map.available(i, j) < n {
            return Ok(false);
        }
        for seat in &mut seat_map.seat_num[i..j] {
            *seat -= n;
        }
        self.heap.update(seat_map, offset)?;
        Ok(true)
    }

    /// Unconditionally releases `n` seats across segments `[i, j)`.
    pub fn release(
        &mut self,
        offset: i64,
        i: usize,
        j: usize,
        n: u32,
        seat_map: &mut SeatMap,
    ) -> Result<()> {
        for seat in &mut seat_map.seat_num[i..j] {
            *seat += n;
        }
        self.heap.update(seat_map, offset)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.heap.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn allocate_and_book_then_release_round_trips() {
        let dir = tempdir().unwrap();
        let mut seats = SeatEngine::open(dir.path()).unwrap();
        let start = Date::new(6, 1);
        let end = Date::new(6, 2);
        let base = seats.allocate(3, 2, start, end).unwrap();

        let offset = SeatEngine::offset_for(base, start, start);
        let mut sm = seats.query(offset).unwrap();
        assert!(seats.book(offset, 0, 2, 2, &mut sm).unwrap());
        assert_eq!(sm.available(0, 2), 0);

        assert!(!seats.book(offset, 0, 2, 1, &mut sm).unwrap());

        seats.release(offset, 0, 2, 2, &mut sm).unwrap();
        assert_eq!(sm.available(0, 2), 2);
    }

    #[test]
    fn offset_for_addresses_distinct_dates() {
        let base = 100i64;
        let start = Date::new(6, 1);
        let off0 = SeatEngine::offset_for(base, start, start);
        let off1 = SeatEngine::offset_for(base, start, start.add_days(1));
        assert_eq!(off1 - off0, SeatMap::SIZE as i64);
    }
}
