//! The query planner: read-only searches over the train catalog and seat
//! inventory. Implemented as a second `impl Engine` block alongside
//! [`crate::booking`] since both operate on the same set of components,
//! but a search never mutates anything.

use ticket_storage::Result;

use crate::booking::Engine;
use crate::model::{Date, StationName, Time, TimePoint, Train, TrainId};
use crate::seat::SeatEngine;

/// Sort key requested by `query_ticket`/`query_transfer`: either total
/// travel time or total fare, cheapest/fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Time,
    Cost,
}

/// One directly bookable leg, ready to print or to feed to `buy_ticket`.
#[derive(Debug, Clone, Copy)]
pub struct TicketInfo {
    pub train_id: TrainId,
    pub from: StationName,
    pub to: StationName,
    pub departure: TimePoint,
    pub arrival: TimePoint,
    pub price: i64,
    pub seats: u32,
}

impl TicketInfo {
    fn travel_minutes(&self) -> i64 {
        self.arrival.minutes_since(self.departure)
    }
}

impl Engine {
    /// Every train serving the ordered route `from -> to` departing on
    /// `date` (the boarding date at `from`, not the train's origin date),
    /// sorted by `sort_by` then ascending `train_id` to break ties.
    pub fn query_ticket(
        &mut self,
        from: &str,
        to: &str,
        date: Date,
        sort_by: SortBy,
    ) -> Result<Vec<TicketInfo>> {
        let candidates = self.catalog.query_route(from, to)?;
        let mut tickets = Vec::new();
        for train_id in candidates {
            let Some(train) = self.catalog.query(train_id.as_str())? else {
                continue;
            };
            let (Some(i), Some(j)) = (train.station_index(from), train.station_index(to)) else {
                continue;
            };
            if i >= j {
                continue;
            }
            if let Some(ticket) = self.leg_on(&train, i, j, date)? {
                tickets.push(ticket);
            }
        }
        sort_tickets(&mut tickets, sort_by);
        Ok(tickets)
    }

    /// Two-leg journeys `from -> mid -> to` where the first leg's
    /// arrival station feeds the second leg's departure station, picking
    /// the single best combination by `sort_by` then a fixed
    /// lexicographic tiebreak `(primary, secondary, train1, train2)` that
    /// never depends on discovery order.
    pub fn query_transfer(
        &mut self,
        from: &str,
        to: &str,
        date: Date,
        sort_by: SortBy,
    ) -> Result<Option<(TicketInfo, TicketInfo)>> {
        let first_legs = self.catalog.query_station(from)?;
        let mut best: Option<(TicketInfo, TicketInfo)> = None;

        for train1_id in first_legs {
            let Some(train1) = self.catalog.query(train1_id.as_str())? else {
                continue;
            };
            let Some(i1) = train1.station_index(from) else {
                continue;
            };
            let n1 = train1.station_num as usize;
            for j1 in (i1 + 1)..n1 {
                let mid = train1.stations[j1];
                if mid.as_str() == to {
                    continue;
                }
                let Some(leg1) = self.leg_on(&train1, i1, j1, date)? else {
                    continue;
                };

                let second_legs = self.catalog.query_route(mid.as_str(), to)?;
                for train2_id in second_legs {
                    if train2_id.as_str() == train1.train_id.as_str() {
                        continue;
                    }
                    let Some(train2) = self.catalog.query(train2_id.as_str())? else {
                        continue;
                    };
                    let (Some(i2), Some(j2)) =
                        (train2.station_index(mid.as_str()), train2.station_index(to))
                    else {
                        continue;
                    };
                    if i2 >= j2 {
                        continue;
                    }
                    // The connecting leg may only depart at or after the
                    // first leg's arrival at the transfer station.
                    let earliest = leg1.arrival;
                    let transfer_date =
                        self.earliest_boarding_date(&train2, i2, earliest)?;
                    let Some(transfer_date) = transfer_date else {
                        continue;
                    };
                    let Some(leg2) = self.leg_on(&train2, i2, j2, transfer_date)? else {
                        continue;
                    };
                    if leg2.departure < earliest {
                        continue;
                    }

                    let candidate = (leg1, leg2);
                    best = Some(match best {
                        None => candidate,
                        Some(current) => {
                            if transfer_cmp(&candidate, &current, sort_by) == std::cmp::Ordering::Less {
                                candidate
                            } else {
                                current
                            }
                        }
                    });
                }
            }
        }
        Ok(best)
    }

    /// The earliest boarding date (in `leg_on`'s sense: the calendar date
    /// at which `train` departs station index `idx`) such that the
    /// resulting departure instant is not before `not_before`. `None` if
    /// the origin date that boarding date resolves to falls outside the
    /// train's sale window.
    fn earliest_boarding_date(
        &mut self,
        train: &Train,
        idx: usize,
        not_before: TimePoint,
    ) -> Result<Option<Date>> {
        let day_shift = train.departure_times[idx].day_shift();
        let same_day = TimePoint::from_offset(not_before.date, train.departure_times[idx]);
        let boarding_date = if same_day >= not_before {
            not_before.date
        } else {
            not_before.date.add_days(1)
        };
        let origin_date = boarding_date.sub_days(day_shift);
        if origin_date < train.sale_date_start || origin_date > train.sale_date_end {
            return Ok(None);
        }
        Ok(Some(boarding_date))
    }

    /// Builds the [`TicketInfo`] for `train`'s `[i, j)` segment boarding
    /// on `date`, or `None` if `date` falls outside the train's sale
    /// window. Uses the same origin-date arithmetic as booking, since
    /// both resolve the same underlying seat-map record.
    fn leg_on(&mut self, train: &Train, i: usize, j: usize, date: Date) -> Result<Option<TicketInfo>> {
        let origin_date = date.sub_days(train.departure_times[i].day_shift());
        if origin_date < train.sale_date_start || origin_date > train.sale_date_end {
            return Ok(None);
        }
        let offset = SeatEngine::offset_for(train.seat_map_pos, train.sale_date_start, origin_date);
        let seat_map = self.seats.query(offset)?;
        Ok(Some(TicketInfo {
            train_id: train.train_id,
            from: train.stations[i],
            to: train.stations[j],
            departure: TimePoint::from_offset(origin_date, train.departure_times[i]),
            arrival: TimePoint::from_offset(origin_date, train.arrival_times[j]),
            price: train.prices[j] - train.prices[i],
            seats: seat_map.available(i, j),
        }))
    }
}

fn sort_tickets(tickets: &mut [TicketInfo], sort_by: SortBy) {
    tickets.sort_by(|a, b| match sort_by {
        SortBy::Time => a
            .travel_minutes()
            .cmp(&b.travel_minutes())
            .then_with(|| a.train_id.as_str().cmp(b.train_id.as_str())),
        SortBy::Cost => a
            .price
            .cmp(&b.price)
            .then_with(|| a.train_id.as_str().cmp(b.train_id.as_str())),
    });
}

fn transfer_cmp(
    a: &(TicketInfo, TicketInfo),
    b: &(TicketInfo, TicketInfo),
    sort_by: SortBy,
) -> std::cmp::Ordering {
    // Transfer travel time is layover-inclusive: arrival of the connecting
    // leg minus departure of the first leg, not the sum of the two legs'
    // in-motion durations.
    let total_minutes = |t: &(TicketInfo, TicketInfo)| t.1.arrival.minutes_since(t.0.departure);
    let primary = |t: &(TicketInfo, TicketInfo)| match sort_by {
        SortBy::Time => total_minutes(t),
        SortBy::Cost => t.0.price + t.1.price,
    };
    let secondary = |t: &(TicketInfo, TicketInfo)| match sort_by {
        SortBy::Time => t.0.price + t.1.price,
        SortBy::Cost => total_minutes(t),
    };
    primary(a)
        .cmp(&primary(b))
        .then_with(|| secondary(a).cmp(&secondary(b)))
        .then_with(|| a.0.train_id.as_str().cmp(b.0.train_id.as_str()))
        .then_with(|| a.1.train_id.as_str().cmp(b.1.train_id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Time, MAX_STATIONS};
    use tempfile::tempdir;

    fn train(id: &str, stations: &[&str], dep_offset_min: i64, price_step: i64) -> Train {
        let n = stations.len();
        let mut names = [StationName::default(); MAX_STATIONS];
        for (k, s) in stations.iter().enumerate() {
            names[k] = (*s).try_into().unwrap();
        }
        let mut prices = [0i64; MAX_STATIONS];
        let mut arrival = [Time::new(0, 0); MAX_STATIONS];
        let mut departure = [Time::new(0, 0); MAX_STATIONS];
        departure[0] = Time::new(8, 0);
        for k in 1..n {
            prices[k] = price_step * k as i64;
            let prev_dep = departure[k - 1];
            arrival[k] = prev_dep.add_minutes(dep_offset_min);
            departure[k] = arrival[k].add_minutes(10);
        }
        Train {
            train_id: id.try_into().unwrap(),
            kind: b'G',
            station_num: n as u8,
            stations: names,
            seat_num: 10,
            prices,
            arrival_times: arrival,
            departure_times: departure,
            sale_date_start: Date::new(6, 1),
            sale_date_end: Date::new(6, 5),
            is_released: false,
            seat_map_pos: -1,
        }
    }

    fn setup() -> (tempfile::TempDir, Engine) {
        let dir = tempdir().unwrap();
        let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
        engine
            .add_user(None, "root".try_into().unwrap(), "x".try_into().unwrap(), "R".try_into().unwrap(), "r@x".try_into().unwrap(), 10)
            .unwrap();
        (dir, engine)
    }

    #[test]
    fn query_ticket_finds_direct_route_and_sorts_by_train_id() {
        let (_dir, mut engine) = setup();
        engine.add_train(train("T2", &["A", "B", "C"], 60, 10)).unwrap();
        engine.add_train(train("T1", &["A", "B", "C"], 60, 5)).unwrap();
        engine.release_train("T1").unwrap();
        engine.release_train("T2").unwrap();

        let tickets = engine.query_ticket("A", "C", Date::new(6, 1), SortBy::Cost).unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].train_id.as_str(), "T1");
        assert_eq!(tickets[1].train_id.as_str(), "T2");
    }

    #[test]
    fn query_transfer_requires_disjoint_trains_through_a_shared_station() {
        let (_dir, mut engine) = setup();
        engine.add_train(train("T1", &["A", "M"], 60, 10)).unwrap();
        engine.add_train(train("T2", &["M", "C"], 60, 10)).unwrap();
        engine.release_train("T1").unwrap();
        engine.release_train("T2").unwrap();

        let result = engine.query_transfer("A", "C", Date::new(6, 1), SortBy::Time).unwrap();
        assert!(result.is_some());
        let (leg1, leg2) = result.unwrap();
        assert_eq!(leg1.train_id.as_str(), "T1");
        assert_eq!(leg2.train_id.as_str(), "T2");
    }
}
