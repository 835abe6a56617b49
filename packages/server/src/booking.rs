//! The booking engine (spec §4.8): orchestrates the seat inventory, order
//! ledger, train catalog and user store across `buy`/`refund`, the only
//! operations that touch more than one L2 component in a single command.

use std::fs;
use std::path::{Path, PathBuf};

use ticket_storage::Result;

use crate::catalog::TrainCatalog;
use crate::model::{Date, MailAddr, Order, OrderStatus, PersonName, Password, Time, TimePoint, Train, Username};
use crate::orders::OrderLedger;
use crate::seat::SeatEngine;
use crate::users::{LoginSet, ProfilePatch, UserStore};

/// Outcome of a `buy_ticket` attempt (spec §4.8). Every variant is a
/// legitimate domain result, never an error -- structural failures
/// propagate separately as `ticket_storage::Error`.
pub enum BuyOutcome {
    /// Booked immediately; the total price for all `n` tickets.
    Booked(i64),
    /// No room, but the caller asked to wait.
    Queued,
    /// Rejected: not logged in, unknown/unreleased train, bad station
    /// pair, out-of-sale date, or (no-wait) no capacity.
    Rejected,
}

/// Bundles every L2 store this system persists, and implements the L3
/// `buy`/`refund` and account/catalog operations that touch them. The
/// ticket-search planner (spec §4.9) is implemented in a second `impl
/// Engine` block in [`crate::planner`].
pub struct Engine {
    pub(crate) catalog: TrainCatalog,
    pub(crate) seats: SeatEngine,
    pub(crate) orders: OrderLedger,
    pub(crate) users: UserStore,
    pub(crate) logins: LoginSet,
    data_dir: PathBuf,
}

impl Engine {
    pub fn open(dir: impl AsRef<Path>, index_cap: usize, leaf_cap: usize) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(ticket_storage::Error::Io)?;
        Ok(Self {
            catalog: TrainCatalog::open(dir, index_cap, leaf_cap)?,
            seats: SeatEngine::open(dir)?,
            orders: OrderLedger::open(dir, index_cap, leaf_cap)?,
            users: UserStore::open(dir, index_cap, leaf_cap)?,
            logins: LoginSet::default(),
            data_dir: dir.to_path_buf(),
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.catalog.flush()?;
        self.seats.flush()?;
        self.orders.flush()?;
        self.users.flush()
    }

    /// `clean` verb: flush then delete every on-disk file this process
    /// owns, leaving a pristine directory for the next run.
    pub fn clean(&mut self) -> Result<()> {
        self.flush()?;
        for name in [
            "train.index", "train.block",
            "station.index", "station.block",
            "route.index", "route.block",
            "user.index", "user.block",
            "orders.index", "orders.block",
            "pending.index", "pending.block",
            "seat.memoryriver",
        ] {
            let _ = fs::remove_file(self.data_dir.join(name));
        }
        Ok(())
    }

    // -- Accounts (spec §4.7) -------------------------------------------------

    pub fn add_user(
        &mut self,
        cur: Option<&str>,
        username: Username,
        password: Password,
        name: PersonName,
        mail_addr: MailAddr,
        privilege: u8,
    ) -> Result<bool> {
        self.users
            .add(cur, &self.logins, username, password, name, mail_addr, privilege)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<bool> {
        self.users.login(&mut self.logins, username, password)
    }

    pub fn logout(&mut self, username: &str) -> bool {
        self.users.logout(&mut self.logins, username)
    }

    pub fn query_profile(&mut self, cur: &str, target: &str) -> Result<Option<crate::model::User>> {
        self.users.query_profile(&self.logins, cur, target)
    }

    pub fn modify_profile(
        &mut self,
        cur: &str,
        target: &str,
        patch: ProfilePatch,
    ) -> Result<Option<crate::model::User>> {
        self.users.modify_profile(&mut self.logins, cur, target, patch)
    }

    // -- Catalog (spec §4.5) --------------------------------------------------

    pub fn add_train(&mut self, train: Train) -> Result<bool> {
        if !train.validate() {
            return Ok(false);
        }
        self.catalog.add(train)
    }

    pub fn delete_train(&mut self, train_id: &str) -> Result<bool> {
        self.catalog.delete(train_id)
    }

    pub fn release_train(&mut self, train_id: &str) -> Result<bool> {
        let Some(mut train) = self.catalog.release(train_id)? else {
            return Ok(false);
        };
        let base = self.seats.allocate(
            train.station_num,
            train.seat_num,
            train.sale_date_start,
            train.sale_date_end,
        )?;
        let old = train;
        train.seat_map_pos = base;
        self.catalog.update(old, train)?;
        Ok(true)
    }

    /// Returns the train plus its per-segment remaining seats on `date`.
    /// For an unreleased train every segment reads as fully available
    /// (nothing could have been booked yet); for a released train the
    /// date must fall inside the sale window.
    pub fn query_train(&mut self, train_id: &str, date: Date) -> Result<Option<(Train, Vec<u32>)>> {
        let Some(train) = self.catalog.query(train_id)? else {
            return Ok(None);
        };
        let n = train.station_num as usize;
        if !train.is_released {
            return Ok(Some((train, vec![train.seat_num; n.saturating_sub(1)])));
        }
        if date < train.sale_date_start || date > train.sale_date_end {
            return Ok(None);
        }
        let offset = SeatEngine::offset_for(train.seat_map_pos, train.sale_date_start, date);
        let seat_map = self.seats.query(offset)?;
        Ok(Some((train, seat_map.seat_num[..n.saturating_sub(1)].to_vec())))
    }

    // -- Booking (spec §4.8) --------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn buy_ticket(
        &mut self,
        username: &str,
        train_id: &str,
        boarding_date: Date,
        from: &str,
        to: &str,
        n: u32,
        wait: bool,
        timestamp: i64,
    ) -> Result<BuyOutcome> {
        if !self.logins.is_logged_in(username) {
            return Ok(BuyOutcome::Rejected);
        }
        let Some(train) = self.catalog.query(train_id)? else {
            return Ok(BuyOutcome::Rejected);
        };
        if !train.is_released {
            return Ok(BuyOutcome::Rejected);
        }
        let (Some(i), Some(j)) = (train.station_index(from), train.station_index(to)) else {
            return Ok(BuyOutcome::Rejected);
        };
        if i >= j {
            return Ok(BuyOutcome::Rejected);
        }
        let origin_date = boarding_date.sub_days(train.departure_times[i].day_shift());
        if origin_date < train.sale_date_start || origin_date > train.sale_date_end {
            return Ok(BuyOutcome::Rejected);
        }
        if n > train.seat_num {
            return Ok(BuyOutcome::Rejected);
        }

        let offset = SeatEngine::offset_for(train.seat_map_pos, train.sale_date_start, origin_date);
        let mut seat_map = self.seats.query(offset)?;
        let price_per_ticket = train.prices[j] - train.prices[i];
        let start_time = TimePoint::from_offset(origin_date, train.departure_times[i]);
        let end_time = TimePoint::from_offset(origin_date, train.arrival_times[j]);

        let order = Order {
            username: username.try_into().unwrap_or_default(),
            train_id: train.train_id,
            origin_station_date: origin_date,
            from: from.try_into().unwrap_or_default(),
            from_idx: i as u8,
            start_time,
            to: to.try_into().unwrap_or_default(),
            to_idx: j as u8,
            end_time,
            ticket_num: n,
            timestamp,
            price: price_per_ticket,
            status: OrderStatus::Pending,
        };

        if self.seats.book(offset, i, j, n, &mut seat_map)? {
            let order = Order {
                status: OrderStatus::Success,
                ..order
            };
            self.orders.add_order(order)?;
            Ok(BuyOutcome::Booked(price_per_ticket * n as i64))
        } else if wait {
            self.orders.add_order(order)?;
            self.orders.add_pending(order)?;
            Ok(BuyOutcome::Queued)
        } else {
            Ok(BuyOutcome::Rejected)
        }
    }

    /// Refunds the `k`-th most recent order of `username` (1-based).
    /// Returns `false` for every domain rejection (spec §4.8).
    pub fn refund_ticket(&mut self, username: &str, k: usize) -> Result<bool> {
        if !self.logins.is_logged_in(username) || k == 0 {
            return Ok(false);
        }
        let mut history = self.orders.list_orders(username)?;
        history.reverse();
        let Some(&order) = history.get(k - 1) else {
            return Ok(false);
        };

        match order.status {
            OrderStatus::Refunded => Ok(false),
            OrderStatus::Pending => {
                self.orders.update_status(order, OrderStatus::Refunded)?;
                self.orders.remove_pending(order)?;
                Ok(true)
            }
            OrderStatus::Success => {
                self.release_and_promote(order)?;
                Ok(true)
            }
        }
    }

    fn release_and_promote(&mut self, order: Order) -> Result<()> {
        let Some(train) = self.catalog.query(order.train_id.as_str())? else {
            // A released train can never vanish from the catalog in this
            // engine's lifetime, but guard anyway rather than panic.
            self.orders.update_status(order, OrderStatus::Refunded)?;
            return Ok(());
        };
        let offset = SeatEngine::offset_for(
            train.seat_map_pos,
            train.sale_date_start,
            order.origin_station_date,
        );
        let mut seat_map = self.seats.query(offset)?;
        self.seats.release(
            offset,
            order.from_idx as usize,
            order.to_idx as usize,
            order.ticket_num,
            &mut seat_map,
        )?;
        self.orders.update_status(order, OrderStatus::Refunded)?;

        let pending = self
            .orders
            .list_pending(order.train_id.as_str(), order.origin_station_date)?;
        let mut promoted = Vec::new();
        for p in pending {
            let disjoint = p.from_idx as usize >= order.to_idx as usize
                || p.to_idx as usize <= order.from_idx as usize;
            if disjoint {
                continue;
            }
            if self.seats.book(
                offset,
                p.from_idx as usize,
                p.to_idx as usize,
                p.ticket_num,
                &mut seat_map,
            )? {
                self.orders.update_status(p, OrderStatus::Success)?;
                promoted.push(p);
            }
        }
        for p in promoted.into_iter().rev() {
            self.orders.remove_pending(p)?;
        }
        Ok(())
    }

    pub fn list_orders_most_recent_first(&mut self, username: &str) -> Result<Vec<Order>> {
        let mut orders = self.orders.list_orders(username)?;
        orders.reverse();
        Ok(orders)
    }
}

impl Train {
    /// Checks the static invariants spec §3 lists for a newly added
    /// (unreleased) train.
    pub fn validate(&self) -> bool {
        let n = self.station_num as usize;
        if n < 2 || n > crate::model::MAX_STATIONS {
            return false;
        }
        if self.prices[0] != 0 {
            return false;
        }
        if self.arrival_times[0] != Time::new(0, 0) {
            return false;
        }
        for i in 0..n {
            for j in (i + 1)..n {
                if self.stations[i].as_str() == self.stations[j].as_str() {
                    return false;
                }
            }
        }
        for i in 1..n {
            if self.prices[i] < self.prices[i - 1] {
                return false;
            }
        }
        for i in 0..n - 1 {
            if self.arrival_times[i] > self.departure_times[i] {
                return false;
            }
            if self.departure_times[i] > self.arrival_times[i + 1] {
                return false;
            }
        }
        self.sale_date_start <= self.sale_date_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StationName, MAX_STATIONS};
    use tempfile::tempdir;

    fn sample_train(id: &str, seat_num: u32) -> Train {
        let mut stations = [StationName::default(); MAX_STATIONS];
        stations[0] = "X".try_into().unwrap();
        stations[1] = "Y".try_into().unwrap();
        stations[2] = "Z".try_into().unwrap();
        let mut prices = [0i64; MAX_STATIONS];
        prices[1] = 50;
        prices[2] = 100;
        let mut arrival = [Time::new(0, 0); MAX_STATIONS];
        let mut departure = [Time::new(0, 0); MAX_STATIONS];
        departure[0] = Time::new(8, 0);
        arrival[1] = Time::new(9, 0);
        departure[1] = Time::new(9, 10);
        arrival[2] = Time::new(10, 10);
        Train {
            train_id: id.try_into().unwrap(),
            kind: b'G',
            station_num: 3,
            stations,
            seat_num,
            prices,
            arrival_times: arrival,
            departure_times: departure,
            sale_date_start: Date::new(7, 1),
            sale_date_end: Date::new(7, 2),
            is_released: false,
            seat_map_pos: -1,
        }
    }

    fn boot_root(engine: &mut Engine) {
        engine
            .add_user(
                None,
                "root".try_into().unwrap(),
                "123".try_into().unwrap(),
                "R".try_into().unwrap(),
                "r@x".try_into().unwrap(),
                10,
            )
            .unwrap();
        engine.login("root", "123").unwrap();
    }

    #[test]
    fn buy_then_refund_restores_capacity_with_no_pending_queue() {
        let dir = tempdir().unwrap();
        let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
        boot_root(&mut engine);
        engine.add_train(sample_train("T", 1)).unwrap();
        engine.release_train("T").unwrap();

        let outcome = engine
            .buy_ticket("root", "T", Date::new(7, 1), "X", "Z", 1, false, 1)
            .unwrap();
        assert!(matches!(outcome, BuyOutcome::Booked(100)));

        let (_, seats) = engine.query_train("T", Date::new(7, 1)).unwrap().unwrap();
        assert_eq!(seats, vec![0, 0]);

        assert!(engine.refund_ticket("root", 1).unwrap());
        let (_, seats) = engine.query_train("T", Date::new(7, 1)).unwrap().unwrap();
        assert_eq!(seats, vec![1, 1]);
    }

    #[test]
    fn fifo_promotion_on_refund() {
        let dir = tempdir().unwrap();
        let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
        boot_root(&mut engine);
        engine.add_train(sample_train("T2", 1)).unwrap();
        engine.release_train("T2").unwrap();

        engine.add_user(Some("root"), "u1".try_into().unwrap(), "p".try_into().unwrap(), "U1".try_into().unwrap(), "u1@x".try_into().unwrap(), 3).unwrap();
        engine.add_user(Some("root"), "u2".try_into().unwrap(), "p".try_into().unwrap(), "U2".try_into().unwrap(), "u2@x".try_into().unwrap(), 3).unwrap();
        engine.add_user(Some("root"), "u3".try_into().unwrap(), "p".try_into().unwrap(), "U3".try_into().unwrap(), "u3@x".try_into().unwrap(), 3).unwrap();
        engine.login("u1", "p").unwrap();
        engine.login("u2", "p").unwrap();
        engine.login("u3", "p").unwrap();

        let a = engine.buy_ticket("u1", "T2", Date::new(7, 1), "X", "Y", 1, false, 10).unwrap();
        assert!(matches!(a, BuyOutcome::Booked(_)));
        let b = engine.buy_ticket("u2", "T2", Date::new(7, 1), "Y", "Z", 1, false, 11).unwrap();
        assert!(matches!(b, BuyOutcome::Booked(_)));
        let c = engine.buy_ticket("u3", "T2", Date::new(7, 1), "X", "Z", 1, true, 12).unwrap();
        assert!(matches!(c, BuyOutcome::Queued));

        assert!(engine.refund_ticket("u1", 1).unwrap());

        let orders = engine.list_orders_most_recent_first("u3").unwrap();
        assert_eq!(orders[0].status, OrderStatus::Success);
    }

    #[test]
    fn disjoint_segments_share_a_single_seat() {
        let dir = tempdir().unwrap();
        let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
        boot_root(&mut engine);
        engine.add_train(sample_train("T3", 1)).unwrap();
        engine.release_train("T3").unwrap();

        let a = engine.buy_ticket("root", "T3", Date::new(7, 1), "X", "Y", 1, false, 1).unwrap();
        assert!(matches!(a, BuyOutcome::Booked(_)));
        let b = engine.buy_ticket("root", "T3", Date::new(7, 1), "Y", "Z", 1, false, 2).unwrap();
        assert!(matches!(b, BuyOutcome::Booked(_)));
    }
}
