//! The train catalog (spec §4.5): a primary index keyed by hashed
//! `train_id`, plus two secondary multimap indexes (by station, and by
//! ordered (from, to) route pair) that are only populated on release.

use std::path::Path;

use ticket_storage::{BPlusTree, Result};

use crate::model::{hash_key, Train, TrainId};

pub struct TrainCatalog {
    primary: BPlusTree<u64, Train>,
    station_index: BPlusTree<u64, TrainId>,
    route_index: BPlusTree<(u64, u64), TrainId>,
}

impl TrainCatalog {
    pub fn open(dir: impl AsRef<Path>, index_cap: usize, leaf_cap: usize) -> Result<Self> {
        let dir = dir.as_ref();
        Ok(Self {
            primary: BPlusTree::open(dir, "train", index_cap, leaf_cap)?,
            station_index: BPlusTree::open(dir, "station", index_cap, leaf_cap)?,
            route_index: BPlusTree::open(dir, "route", index_cap, leaf_cap)?,
        })
    }

    /// `false` if `train.train_id` already exists.
    pub fn add(&mut self, train: Train) -> Result<bool> {
        let key = hash_key(train.train_id.as_str());
        if self.primary.exists(&key)? {
            return Ok(false);
        }
        self.primary.insert(key, train)
    }

    /// `false` if absent or already released.
    pub fn delete(&mut self, train_id: &str) -> Result<bool> {
        let key = hash_key(train_id);
        let trains = self.primary.find(&key)?;
        let Some(train) = trains.into_iter().find(|t| t.train_id.as_str() == train_id) else {
            return Ok(false);
        };
        if train.is_released {
            return Ok(false);
        }
        self.primary.remove(key, train)?;
        Ok(true)
    }

    /// Flips `is_released`, materializes the station and route indexes,
    /// and returns the released train so the caller can allocate its
    /// seat-map extent. `None` if absent or already released.
    pub fn release(&mut self, train_id: &str) -> Result<Option<Train>> {
        let key = hash_key(train_id);
        let trains = self.primary.find(&key)?;
        let Some(mut train) = trains.into_iter().find(|t| t.train_id.as_str() == train_id) else {
            return Ok(None);
        };
        if train.is_released {
            return Ok(None);
        }
        let old = train;
        train.is_released = true;
        self.primary.update(key, train, old)?;

        let n = train.station_num as usize;
        for station in &train.stations[..n] {
            self.station_index
                .insert(hash_key(station.as_str()), train.train_id)?;
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let route_key = (
                    hash_key(train.stations[i].as_str()),
                    hash_key(train.stations[j].as_str()),
                );
                self.route_index.insert(route_key, train.train_id)?;
            }
        }
        Ok(Some(train))
    }

    pub fn query(&mut self, train_id: &str) -> Result<Option<Train>> {
        let key = hash_key(train_id);
        Ok(self
            .primary
            .find(&key)?
            .into_iter()
            .find(|t| t.train_id.as_str() == train_id))
    }

    /// Train ids serving the ordered route `(from, to)`, ascending by id.
    pub fn query_route(&mut self, from: &str, to: &str) -> Result<Vec<TrainId>> {
        self.route_index.find(&(hash_key(from), hash_key(to)))
    }

    /// Train ids stopping at `station`, in no particular cross-train
    /// order (the index is keyed by station hash, not by station name
    /// directly -- see [`crate::model::hash_key`]'s collision note).
    pub fn query_station(&mut self, station: &str) -> Result<Vec<TrainId>> {
        self.station_index.find(&hash_key(station))
    }

    pub fn update(&mut self, old: Train, new: Train) -> Result<()> {
        let key = hash_key(new.train_id.as_str());
        self.primary.update(key, new, old)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.primary.flush()?;
        self.station_index.flush()?;
        self.route_index.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Date, Time, MAX_STATIONS};
    use tempfile::tempdir;

    fn sample_train(id: &str) -> Train {
        let mut stations = [crate::model::StationName::default(); MAX_STATIONS];
        stations[0] = "A".try_into().unwrap();
        stations[1] = "B".try_into().unwrap();
        stations[2] = "C".try_into().unwrap();
        let mut prices = [0i64; MAX_STATIONS];
        prices[1] = 100;
        prices[2] = 200;
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
            seat_num: 100,
            prices,
            arrival_times: arrival,
            departure_times: departure,
            sale_date_start: Date::new(6, 1),
            sale_date_end: Date::new(6, 2),
            is_released: false,
            seat_map_pos: -1,
        }
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let dir = tempdir().unwrap();
        let mut catalog = TrainCatalog::open(dir.path(), 8, 8).unwrap();
        assert!(catalog.add(sample_train("T")).unwrap());
        assert!(!catalog.add(sample_train("T")).unwrap());
    }

    #[test]
    fn release_populates_station_and_route_indexes() {
        let dir = tempdir().unwrap();
        let mut catalog = TrainCatalog::open(dir.path(), 8, 8).unwrap();
        catalog.add(sample_train("T")).unwrap();
        let released = catalog.release("T").unwrap().unwrap();
        assert!(released.is_released);
        assert!(catalog.release("T").unwrap().is_none());

        let at_b = catalog.query_station("B").unwrap();
        assert_eq!(at_b.len(), 1);
        assert_eq!(at_b[0].as_str(), "T");

        let route = catalog.query_route("A", "C").unwrap();
        assert_eq!(route.len(), 1);
        assert_eq!(route[0].as_str(), "T");
    }

    #[test]
    fn delete_fails_once_released() {
        let dir = tempdir().unwrap();
        let mut catalog = TrainCatalog::open(dir.path(), 8, 8).unwrap();
        catalog.add(sample_train("T")).unwrap();
        catalog.release("T").unwrap();
        assert!(!catalog.delete("T").unwrap());
    }
}
