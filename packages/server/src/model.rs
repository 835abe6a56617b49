//! The domain data model (spec §3): calendar/clock arithmetic, and the
//! fixed-size on-disk record shapes for trains, seat maps, users, and
//! orders.
//!
//! Every record type here implements [`FixedSizeRecord`] so it can be
//! stored directly as a B+ tree value or a seat-heap page -- no
//! serialization framework, just a fixed byte layout per field.

use byteorder::{ByteOrder, LittleEndian};

use ticket_storage::FixedSizeRecord;
use ticket_storage::FixedStr;

/// Upper bound on stations per train (spec §3: "Train (≤26 stations)").
pub const MAX_STATIONS: usize = 26;

/// Bound on a station name. Not given an explicit cap in the spec's prose,
/// so it is sized generously relative to `train_id`'s 20-byte cap.
pub const STATION_NAME_CAP: usize = 32;

pub type TrainId = FixedStr<20>;
pub type StationName = FixedStr<STATION_NAME_CAP>;
pub type Username = FixedStr<20>;
pub type Password = FixedStr<30>;
pub type PersonName = FixedStr<20>;
pub type MailAddr = FixedStr<30>;

const DAYS_IN_MONTH: [i32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// A month/day calendar date. The year is implicit (spec §3): every date
/// arithmetic operation here is relative within one non-leap 365-day
/// cycle, which is sufficient for the sale windows this system models
/// (none of which are specified to span a year boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date {
    pub month: u8,
    pub day: u8,
}

impl Date {
    pub fn new(month: u8, day: u8) -> Self {
        Self { month, day }
    }

    /// Day-of-year, zero-based from Jan 1.
    fn to_serial(self) -> i32 {
        let mut serial = 0;
        for m in 0..(self.month as usize - 1) {
            serial += DAYS_IN_MONTH[m];
        }
        serial + (self.day as i32 - 1)
    }

    fn from_serial(mut serial: i32) -> Self {
        serial = serial.rem_euclid(365);
        let mut month = 0usize;
        while serial >= DAYS_IN_MONTH[month] {
            serial -= DAYS_IN_MONTH[month];
            month += 1;
        }
        Self {
            month: (month + 1) as u8,
            day: (serial + 1) as u8,
        }
    }

    /// `self + n` days.
    pub fn add_days(self, n: i32) -> Self {
        Self::from_serial(self.to_serial() + n)
    }

    /// `self - n` days.
    pub fn sub_days(self, n: i32) -> Self {
        self.add_days(-n)
    }

    /// Day count from `other` to `self` (positive if `self` is later).
    pub fn days_since(self, other: Date) -> i32 {
        self.to_serial() - other.to_serial()
    }
}

impl std::fmt::Display for Date {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl FixedSizeRecord for Date {
    const SIZE: usize = 2;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = self.month;
        buf[1] = self.day;
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            month: buf[0],
            day: buf[1],
        }
    }
}

/// An hour/minute clock reading. `hour` may exceed 23 when used as an
/// offset-from-departure-day value (spec §3) -- arrival/departure times
/// are stored this way so a multi-day leg encodes its day shift directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    pub hour: u16,
    pub minute: u8,
}

impl Time {
    pub fn new(hour: u16, minute: u8) -> Self {
        Self { hour, minute }
    }

    pub fn total_minutes(self) -> i64 {
        self.hour as i64 * 60 + self.minute as i64
    }

    /// `self + minutes`, re-normalized into hour/minute (hour may still
    /// exceed 23 afterward).
    pub fn add_minutes(self, minutes: i64) -> Self {
        let total = self.total_minutes() + minutes;
        Self {
            hour: (total / 60) as u16,
            minute: (total % 60) as u8,
        }
    }

    /// `self + other`, treating `other` as a duration added onto `self`.
    pub fn add_time(self, other: Time) -> Self {
        self.add_minutes(other.total_minutes())
    }

    /// This offset's implied whole-day shift (`hour / 24`).
    pub fn day_shift(self) -> i32 {
        (self.hour / 24) as i32
    }

    /// The time-of-day component with the day shift stripped (`hour % 24`).
    pub fn time_of_day(self) -> Self {
        Self {
            hour: self.hour % 24,
            minute: self.minute,
        }
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour % 24, self.minute)
    }
}

impl FixedSizeRecord for Time {
    const SIZE: usize = 3;

    fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_u16(&mut buf[0..2], self.hour);
        buf[2] = self.minute;
    }

    fn read_from(buf: &[u8]) -> Self {
        Self {
            hour: LittleEndian::read_u16(&buf[0..2]),
            minute: buf[2],
        }
    }
}

/// A canonical (date, time-of-day) instant: `time.hour < 24` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint {
    pub date: Date,
    pub time: Time,
}

impl TimePoint {
    /// Builds the canonical instant that is `offset` (an hour/minute pair
    /// whose hour may be ≥ 24) after midnight on `origin_date`.
    pub fn from_offset(origin_date: Date, offset: Time) -> Self {
        Self {
            date: origin_date.add_days(offset.day_shift()),
            time: offset.time_of_day(),
        }
    }

    pub fn add_minutes(self, minutes: i64) -> Self {
        let total = self.time.add_minutes(minutes);
        Self {
            date: self.date.add_days(total.day_shift()),
            time: total.time_of_day(),
        }
    }

    /// Minutes from `other` to `self`.
    pub fn minutes_since(self, other: TimePoint) -> i64 {
        self.date.days_since(other.date) as i64 * 1440 + self.time.total_minutes()
            - other.time.total_minutes()
    }
}

impl std::fmt::Display for TimePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

/// A train's status after a booking attempt or refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Success,
    Pending,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Success => "success",
            OrderStatus::Pending => "pending",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl FixedSizeRecord for OrderStatus {
    const SIZE: usize = 1;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = match self {
            OrderStatus::Success => 0,
            OrderStatus::Pending => 1,
            OrderStatus::Refunded => 2,
        };
    }

    fn read_from(buf: &[u8]) -> Self {
        match buf[0] {
            0 => OrderStatus::Success,
            1 => OrderStatus::Pending,
            _ => OrderStatus::Refunded,
        }
    }
}

/// A single booking record (spec §3). Ordering under the order ledger's
/// B+ tree keys is by `timestamp` alone -- timestamps are unique by
/// construction (the dispatcher's monotonic input counter), so there are
/// never ties to break.
#[derive(Debug, Clone, Copy)]
pub struct Order {
    pub username: Username,
    pub train_id: TrainId,
    pub origin_station_date: Date,
    pub from: StationName,
    pub from_idx: u8,
    pub start_time: TimePoint,
    pub to: StationName,
    pub to_idx: u8,
    pub end_time: TimePoint,
    pub ticket_num: u32,
    pub timestamp: i64,
    pub price: i64,
    pub status: OrderStatus,
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}
impl Eq for Order {}
impl PartialOrd for Order {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Order {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

impl FixedSizeRecord for Order {
    const SIZE: usize = Username::SIZE
        + TrainId::SIZE
        + Date::SIZE
        + StationName::SIZE
        + 1
        + Date::SIZE
        + Time::SIZE
        + StationName::SIZE
        + 1
        + Date::SIZE
        + Time::SIZE
        + 4
        + 8
        + 8
        + OrderStatus::SIZE;

    fn write_to(&self, buf: &mut [u8]) {
        let mut off = 0;
        macro_rules! put {
            ($v:expr, $sz:expr) => {{
                $v.write_to(&mut buf[off..off + $sz]);
                off += $sz;
            }};
        }
        put!(self.username, Username::SIZE);
        put!(self.train_id, TrainId::SIZE);
        put!(self.origin_station_date, Date::SIZE);
        put!(self.from, StationName::SIZE);
        buf[off] = self.from_idx;
        off += 1;
        put!(self.start_time.date, Date::SIZE);
        put!(self.start_time.time, Time::SIZE);
        put!(self.to, StationName::SIZE);
        buf[off] = self.to_idx;
        off += 1;
        put!(self.end_time.date, Date::SIZE);
        put!(self.end_time.time, Time::SIZE);
        LittleEndian::write_u32(&mut buf[off..off + 4], self.ticket_num);
        off += 4;
        LittleEndian::write_i64(&mut buf[off..off + 8], self.timestamp);
        off += 8;
        LittleEndian::write_i64(&mut buf[off..off + 8], self.price);
        off += 8;
        put!(self.status, OrderStatus::SIZE);
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut off = 0;
        macro_rules! get {
            ($ty:ty, $sz:expr) => {{
                let v = <$ty>::read_from(&buf[off..off + $sz]);
                off += $sz;
                v
            }};
        }
        let username = get!(Username, Username::SIZE);
        let train_id = get!(TrainId, TrainId::SIZE);
        let origin_station_date = get!(Date, Date::SIZE);
        let from = get!(StationName, StationName::SIZE);
        let from_idx = buf[off];
        off += 1;
        let start_date = get!(Date, Date::SIZE);
        let start_tod = get!(Time, Time::SIZE);
        let to = get!(StationName, StationName::SIZE);
        let to_idx = buf[off];
        off += 1;
        let end_date = get!(Date, Date::SIZE);
        let end_tod = get!(Time, Time::SIZE);
        let ticket_num = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let timestamp = LittleEndian::read_i64(&buf[off..off + 8]);
        off += 8;
        let price = LittleEndian::read_i64(&buf[off..off + 8]);
        off += 8;
        let status = get!(OrderStatus, OrderStatus::SIZE);
        Self {
            username,
            train_id,
            origin_station_date,
            from,
            from_idx,
            start_time: TimePoint {
                date: start_date,
                time: start_tod,
            },
            to,
            to_idx,
            end_time: TimePoint {
                date: end_date,
                time: end_tod,
            },
            ticket_num,
            timestamp,
            price,
            status,
        }
    }
}

/// A train's static schedule and fare table (spec §3). Stored as one
/// fixed-size record per train in the catalog's primary B+ tree.
///
/// `train_id` is declared first, so the derived `Ord` compares it before
/// any other field — two trains differing in `train_id` order by that
/// alone, matching the primary tree's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Train {
    pub train_id: TrainId,
    pub kind: u8,
    pub station_num: u8,
    pub stations: [StationName; MAX_STATIONS],
    pub seat_num: u32,
    pub prices: [i64; MAX_STATIONS],
    pub arrival_times: [Time; MAX_STATIONS],
    pub departure_times: [Time; MAX_STATIONS],
    pub sale_date_start: Date,
    pub sale_date_end: Date,
    pub is_released: bool,
    pub seat_map_pos: i64,
}

impl Train {
    /// Index of `station` among this train's stops, if any.
    pub fn station_index(&self, station: &str) -> Option<usize> {
        self.stations[..self.station_num as usize]
            .iter()
            .position(|s| s.as_str() == station)
    }
}

impl FixedSizeRecord for Train {
    const SIZE: usize = TrainId::SIZE
        + 1
        + 1
        + MAX_STATIONS * StationName::SIZE
        + 4
        + MAX_STATIONS * 8
        + MAX_STATIONS * Time::SIZE
        + MAX_STATIONS * Time::SIZE
        + Date::SIZE
        + Date::SIZE
        + 1
        + 8;

    fn write_to(&self, buf: &mut [u8]) {
        let mut off = 0;
        self.train_id.write_to(&mut buf[off..off + TrainId::SIZE]);
        off += TrainId::SIZE;
        buf[off] = self.kind;
        off += 1;
        buf[off] = self.station_num;
        off += 1;
        for s in &self.stations {
            s.write_to(&mut buf[off..off + StationName::SIZE]);
            off += StationName::SIZE;
        }
        LittleEndian::write_u32(&mut buf[off..off + 4], self.seat_num);
        off += 4;
        for p in &self.prices {
            LittleEndian::write_i64(&mut buf[off..off + 8], *p);
            off += 8;
        }
        for t in &self.arrival_times {
            t.write_to(&mut buf[off..off + Time::SIZE]);
            off += Time::SIZE;
        }
        for t in &self.departure_times {
            t.write_to(&mut buf[off..off + Time::SIZE]);
            off += Time::SIZE;
        }
        self.sale_date_start
            .write_to(&mut buf[off..off + Date::SIZE]);
        off += Date::SIZE;
        self.sale_date_end
            .write_to(&mut buf[off..off + Date::SIZE]);
        off += Date::SIZE;
        buf[off] = u8::from(self.is_released);
        off += 1;
        LittleEndian::write_i64(&mut buf[off..off + 8], self.seat_map_pos);
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut off = 0;
        let train_id = TrainId::read_from(&buf[off..off + TrainId::SIZE]);
        off += TrainId::SIZE;
        let kind = buf[off];
        off += 1;
        let station_num = buf[off];
        off += 1;
        let mut stations = [StationName::default(); MAX_STATIONS];
        for s in &mut stations {
            *s = StationName::read_from(&buf[off..off + StationName::SIZE]);
            off += StationName::SIZE;
        }
        let seat_num = LittleEndian::read_u32(&buf[off..off + 4]);
        off += 4;
        let mut prices = [0i64; MAX_STATIONS];
        for p in &mut prices {
            *p = LittleEndian::read_i64(&buf[off..off + 8]);
            off += 8;
        }
        let mut arrival_times = [Time::new(0, 0); MAX_STATIONS];
        for t in &mut arrival_times {
            *t = Time::read_from(&buf[off..off + Time::SIZE]);
            off += Time::SIZE;
        }
        let mut departure_times = [Time::new(0, 0); MAX_STATIONS];
        for t in &mut departure_times {
            *t = Time::read_from(&buf[off..off + Time::SIZE]);
            off += Time::SIZE;
        }
        let sale_date_start = Date::read_from(&buf[off..off + Date::SIZE]);
        off += Date::SIZE;
        let sale_date_end = Date::read_from(&buf[off..off + Date::SIZE]);
        off += Date::SIZE;
        let is_released = buf[off] != 0;
        off += 1;
        let seat_map_pos = LittleEndian::read_i64(&buf[off..off + 8]);
        Self {
            train_id,
            kind,
            station_num,
            stations,
            seat_num,
            prices,
            arrival_times,
            departure_times,
            sale_date_start,
            sale_date_end,
            is_released,
            seat_map_pos,
        }
    }
}

/// Per-(train, origin-date) remaining-seat array (spec §3.4). Element
/// `station_num - 1` is never read or written; it exists only to keep
/// indices aligned with `Train::stations`.
#[derive(Debug, Clone, Copy)]
pub struct SeatMap {
    pub station_num: u8,
    pub total_seats: u32,
    pub seat_num: [u32; MAX_STATIONS],
}

impl SeatMap {
    pub fn new(station_num: u8, total_seats: u32) -> Self {
        Self {
            station_num,
            total_seats,
            seat_num: [total_seats; MAX_STATIONS],
        }
    }

    /// Minimum remaining capacity over segments `[i, j)`.
    pub fn available(&self, i: usize, j: usize) -> u32 {
        self.seat_num[i..j].iter().copied().min().unwrap_or(0)
    }
}

impl FixedSizeRecord for SeatMap {
    const SIZE: usize = 1 + 4 + MAX_STATIONS * 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = self.station_num;
        LittleEndian::write_u32(&mut buf[1..5], self.total_seats);
        let mut off = 5;
        for s in &self.seat_num {
            LittleEndian::write_u32(&mut buf[off..off + 4], *s);
            off += 4;
        }
    }

    fn read_from(buf: &[u8]) -> Self {
        let station_num = buf[0];
        let total_seats = LittleEndian::read_u32(&buf[1..5]);
        let mut seat_num = [0u32; MAX_STATIONS];
        let mut off = 5;
        for s in &mut seat_num {
            *s = LittleEndian::read_u32(&buf[off..off + 4]);
            off += 4;
        }
        Self {
            station_num,
            total_seats,
            seat_num,
        }
    }
}

/// An account record (spec §3). Privilege ranges 1..=10; the first user
/// the store ever sees is forced to 10 regardless of what was requested
/// (see [`crate::users::UserStore::add`]).
///
/// `username` is declared first, so the derived `Ord` compares it before
/// any other field, matching the user store's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct User {
    pub username: Username,
    pub password: Password,
    pub name: PersonName,
    pub mail_addr: MailAddr,
    pub privilege: u8,
}

impl FixedSizeRecord for User {
    const SIZE: usize = Username::SIZE + Password::SIZE + PersonName::SIZE + MailAddr::SIZE + 1;

    fn write_to(&self, buf: &mut [u8]) {
        let mut off = 0;
        self.username.write_to(&mut buf[off..off + Username::SIZE]);
        off += Username::SIZE;
        self.password.write_to(&mut buf[off..off + Password::SIZE]);
        off += Password::SIZE;
        self.name.write_to(&mut buf[off..off + PersonName::SIZE]);
        off += PersonName::SIZE;
        self.mail_addr
            .write_to(&mut buf[off..off + MailAddr::SIZE]);
        off += MailAddr::SIZE;
        buf[off] = self.privilege;
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut off = 0;
        let username = Username::read_from(&buf[off..off + Username::SIZE]);
        off += Username::SIZE;
        let password = Password::read_from(&buf[off..off + Password::SIZE]);
        off += Password::SIZE;
        let name = PersonName::read_from(&buf[off..off + PersonName::SIZE]);
        off += PersonName::SIZE;
        let mail_addr = MailAddr::read_from(&buf[off..off + MailAddr::SIZE]);
        off += MailAddr::SIZE;
        let privilege = buf[off];
        Self {
            username,
            password,
            name,
            mail_addr,
            privilege,
        }
    }
}

/// Deterministic string→u64 hash for mapping a `FixedStr` key onto the B+
/// tree's totally-ordered scalar key type (spec §4.5). `DefaultHasher`'s
/// non-portability across Rust versions is irrelevant here: the hash only
/// ever needs to be stable within a single process's on-disk files, which
/// are themselves tied to a specific build.
pub fn hash_key(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_add_days_rolls_over_month() {
        let d = Date::new(1, 30).add_days(3);
        assert_eq!(d, Date::new(2, 2));
    }

    #[test]
    fn date_days_since_is_signed() {
        let a = Date::new(6, 1);
        let b = Date::new(6, 3);
        assert_eq!(b.days_since(a), 2);
        assert_eq!(a.days_since(b), -2);
    }

    #[test]
    fn time_point_from_offset_shifts_day_when_hour_exceeds_24() {
        let origin = Date::new(6, 1);
        let offset = Time::new(25, 30);
        let tp = TimePoint::from_offset(origin, offset);
        assert_eq!(tp.date, Date::new(6, 2));
        assert_eq!(tp.time, Time::new(1, 30));
    }

    #[test]
    fn time_point_minutes_since_accounts_for_date_difference() {
        let a = TimePoint {
            date: Date::new(6, 1),
            time: Time::new(8, 0),
        };
        let b = TimePoint {
            date: Date::new(6, 2),
            time: Time::new(10, 10),
        };
        assert_eq!(b.minutes_since(a), 24 * 60 + 2 * 60 + 10);
    }

    #[test]
    fn order_fixed_size_round_trips() {
        let o = Order {
            username: "alice".try_into().unwrap(),
            train_id: "T1".try_into().unwrap(),
            origin_station_date: Date::new(6, 1),
            from: "A".try_into().unwrap(),
            from_idx: 0,
            start_time: TimePoint {
                date: Date::new(6, 1),
                time: Time::new(8, 0),
            },
            to: "C".try_into().unwrap(),
            to_idx: 2,
            end_time: TimePoint {
                date: Date::new(6, 1),
                time: Time::new(10, 10),
            },
            ticket_num: 2,
            timestamp: 13,
            price: 200,
            status: OrderStatus::Success,
        };
        let mut buf = vec![0u8; Order::SIZE];
        o.write_to(&mut buf);
        let decoded = Order::read_from(&buf);
        assert_eq!(decoded.username.as_str(), "alice");
        assert_eq!(decoded.train_id.as_str(), "T1");
        assert_eq!(decoded.timestamp, 13);
        assert_eq!(decoded.price, 200);
        assert_eq!(decoded.status, OrderStatus::Success);
    }

    #[test]
    fn seat_map_available_is_segment_minimum() {
        let mut sm = SeatMap::new(3, 10);
        sm.seat_num[0] = 5;
        sm.seat_num[1] = 8;
        assert_eq!(sm.available(0, 2), 5);
        assert_eq!(sm.available(1, 2), 8);
    }

    #[test]
    fn hash_key_is_deterministic_within_process() {
        assert_eq!(hash_key("Beijing"), hash_key("Beijing"));
    }
}
