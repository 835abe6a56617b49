//! The order ledger (spec §4.6): per-user chronological order history and
//! a per-(train, origin-date) pending FIFO, both backed by B+ tree
//! multimaps ordered by `Order`'s `timestamp`.

use std::path::Path;

use ticket_storage::{BPlusTree, Result};

use crate::model::{hash_key, Date, Order, OrderStatus};

type PendingKey = (u64, i32);

pub struct OrderLedger {
    orders: BPlusTree<u64, Order>,
    pending: BPlusTree<PendingKey, Order>,
}

fn pending_key(train_id: &str, origin_date: Date) -> PendingKey {
    (hash_key(train_id), origin_date.days_since(Date::new(1, 1)))
}

impl OrderLedger {
    pub fn open(dir: impl AsRef<Path>, index_cap: usize, leaf_cap: usize) -> Result<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            orders: BPlusTree::open(dir, "orders", index_cap, leaf_cap)?,
            pending: BPlusTree::open(dir, "pending", index_cap, leaf_cap)?,
        })
    }

    pub fn add_order(&mut self, order: Order) -> Result<()> {
        self.orders.insert(hash_key(order.username.as_str()), order)
    }

    pub fn add_pending(&mut self, order: Order) -> Result<()> {
        let key = pending_key(order.train_id.as_str(), order.origin_station_date);
        self.pending.insert(key, order)
    }

    /// All of `username`'s orders in ascending timestamp order (chronological).
    pub fn list_orders(&mut self, username: &str) -> Result<Vec<Order>> {
        self.orders.find(&hash_key(username))
    }

    /// Pending orders for `(train_id, origin_date)` in ascending
    /// timestamp order (FIFO).
    pub fn list_pending(&mut self, train_id: &str, origin_date: Date) -> Result<Vec<Order>> {
        self.pending.find(&pending_key(train_id, origin_date))
    }

    pub fn update_status(&mut self, old: Order, new_status: OrderStatus) -> Result<Order> {
        let mut new = old;
        new.status = new_status;
        self.orders
            .update(hash_key(old.username.as_str()), new, old)?;
        Ok(new)
    }

    pub fn remove_pending(&mut self, order: Order) -> Result<()> {
        let key = pending_key(order.train_id.as_str(), order.origin_station_date);
        self.pending.remove(key, order)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.orders.flush()?;
        self.pending.flush()
    }
}
