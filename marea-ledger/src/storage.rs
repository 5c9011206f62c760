//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `trips` - Trips (key: trip_id)
//! - `quota` - Quota ledger entries (key: control_id)
//! - `production` - Production records of every kind (key: production_id)
//! - `operations` - Daily operation reports (key: operation_id)
//! - `indices` - Secondary indices (key: tag || parts, see [`keys`])
//!
//! All writes go through a [`Txn`]: reads see the transaction's own staged
//! writes first, and [`Txn::commit`] applies everything as one `WriteBatch`.
//! Dropping a `Txn` without committing discards it.

use crate::{
    audit::{AuditAction, PendingAudit},
    error::{Error, Result},
    types::{Activatable, Entity},
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode,
    Options, WriteBatch, DB,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Column family names
const CF_TRIPS: &str = "trips";
const CF_QUOTA: &str = "quota";
const CF_PRODUCTION: &str = "production";
const CF_OPERATIONS: &str = "operations";
const CF_INDICES: &str = "indices";

const COLUMN_FAMILIES: [&str; 5] = [CF_TRIPS, CF_QUOTA, CF_PRODUCTION, CF_OPERATIONS, CF_INDICES];

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_TRIPS, Self::cf_options_entities()),
            ColumnFamilyDescriptor::new(CF_QUOTA, Self::cf_options_ledger()),
            ColumnFamilyDescriptor::new(CF_PRODUCTION, Self::cf_options_ledger()),
            ColumnFamilyDescriptor::new(CF_OPERATIONS, Self::cf_options_ledger()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = COLUMN_FAMILIES.len(),
            "Opened RocksDB"
        );

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_entities() -> Options {
        let mut opts = Options::default();
        // Trips are read on nearly every request, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_ledger() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn read(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(cf_name)?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    fn scan(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf_handle(cf_name)?;
        let mut out = Vec::new();

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }

        Ok(out)
    }

    /// Start a unit of work
    pub fn begin(&self) -> Txn<'_> {
        Txn {
            storage: self,
            staged: BTreeMap::new(),
            audits: Vec::new(),
        }
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            trips: self.approximate_count(CF_TRIPS)?,
            quota_entries: self.approximate_count(CF_QUOTA)?,
            production_records: self.approximate_count(CF_PRODUCTION)?,
            operations: self.approximate_count(CF_OPERATIONS)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let prop = self
            .db
            .property_int_value_cf(&cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate number of trips
    pub trips: u64,
    /// Approximate number of quota entries
    pub quota_entries: u64,
    /// Approximate number of production records
    pub production_records: u64,
    /// Approximate number of daily operations
    pub operations: u64,
}

/// Result of a committed unit of work
#[derive(Debug)]
pub struct Committed {
    /// Keys written or deleted, indices included
    pub writes: usize,
    /// One audit payload per entity written
    pub audits: Vec<PendingAudit>,
}

/// Staged unit of work over [`Storage`]
pub struct Txn<'a> {
    storage: &'a Storage,
    staged: BTreeMap<(&'static str, Vec<u8>), Option<Vec<u8>>>,
    audits: Vec<PendingAudit>,
}

impl fmt::Debug for Txn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Txn")
            .field("staged", &self.staged.len())
            .field("audits", &self.audits.len())
            .finish()
    }
}

impl<'a> Txn<'a> {
    fn read(&self, cf: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.staged.get(&(cf, key.to_vec())) {
            return Ok(staged.clone());
        }
        self.storage.read(cf, key)
    }

    fn scan(&self, cf: &'static str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.storage.scan(cf, prefix)?.into_iter().collect();

        for ((staged_cf, key), value) in self.staged.range((cf, prefix.to_vec())..) {
            if *staged_cf != cf || !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    // Entity operations

    /// Get entity by id
    pub fn get<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        match self.read(E::COLUMN, id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get entity by id, `NotFound` if absent
    pub fn require<E: Entity>(&self, id: &str) -> Result<E> {
        self.get(id)?
            .ok_or_else(|| Error::not_found(format!("{} {}", E::ENTITY_TYPE, id)))
    }

    /// Check whether an id is taken
    pub fn contains<E: Entity>(&self, id: &str) -> Result<bool> {
        Ok(self.read(E::COLUMN, id.as_bytes())?.is_some())
    }

    /// Insert a new entity; `Conflict` if its id is taken
    pub fn insert<E: Entity>(&mut self, entity: &E, detail: impl Into<String>) -> Result<()> {
        if self.contains::<E>(entity.id())? {
            return Err(Error::conflict(format!(
                "{} with {} {} already exists",
                E::ENTITY_TYPE,
                E::ID_FIELD,
                entity.id()
            )));
        }
        self.write(entity, AuditAction::Insert, detail.into())
    }

    /// Overwrite an existing entity
    pub fn update<E: Entity>(&mut self, entity: &E, detail: impl Into<String>) -> Result<()> {
        if !self.contains::<E>(entity.id())? {
            return Err(Error::not_found(format!("{} {}", E::ENTITY_TYPE, entity.id())));
        }
        self.write(entity, AuditAction::Update, detail.into())
    }

    /// Persist a lifecycle transition, setting the active flag
    pub fn transition<E: Entity + Activatable>(
        &mut self,
        entity: &mut E,
        active: bool,
        detail: impl Into<String>,
    ) -> Result<()> {
        if !self.contains::<E>(entity.id())? {
            return Err(Error::not_found(format!("{} {}", E::ENTITY_TYPE, entity.id())));
        }
        entity.set_active(active);
        self.write(entity, AuditAction::StateChange, detail.into())
    }

    fn write<E: Entity>(&mut self, entity: &E, action: AuditAction, detail: String) -> Result<()> {
        let value = bincode::serialize(entity)?;
        let snapshot = serde_json::to_value(entity).map_err(|e| {
            Error::Storage(format!("Failed to snapshot {}: {}", E::ENTITY_TYPE, e))
        })?;

        self.staged
            .insert((E::COLUMN, entity.id().as_bytes().to_vec()), Some(value));
        self.audits.push(PendingAudit {
            entity_type: E::ENTITY_TYPE,
            action,
            detail,
            snapshot,
        });

        Ok(())
    }

    // Index operations

    /// Read an index value
    pub fn index_get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.read(CF_INDICES, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write an index value
    pub fn index_put<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> Result<()> {
        let value = bincode::serialize(value)?;
        self.staged.insert((CF_INDICES, key), Some(value));
        Ok(())
    }

    /// Remove an index entry
    pub fn index_remove(&mut self, key: Vec<u8>) {
        self.staged.insert((CF_INDICES, key), None);
    }

    /// All index values under a prefix, in key order
    pub fn index_scan<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>> {
        self.scan(CF_INDICES, prefix)?
            .into_iter()
            .map(|(_, value)| Ok(bincode::deserialize(&value)?))
            .collect()
    }

    /// Apply every staged write as one atomic batch
    pub fn commit(self) -> Result<Committed> {
        let Txn {
            storage,
            staged,
            audits,
        } = self;

        if staged.is_empty() {
            return Ok(Committed {
                writes: 0,
                audits,
            });
        }

        let mut batch = WriteBatch::default();
        for ((cf_name, key), value) in &staged {
            let cf = storage.cf_handle(cf_name)?;
            match value {
                Some(value) => batch.put_cf(&cf, key, value),
                None => batch.delete_cf(&cf, key),
            }
        }

        // Atomic commit
        storage.db.write(batch)?;

        Ok(Committed {
            writes: staged.len(),
            audits,
        })
    }
}

/// Secondary index keys
///
/// A key is a one-byte tag followed by its parts, each terminated by `0x00`
/// so that a prefix never matches a longer id (`Z1` vs `Z10`).
pub mod keys {
    use crate::types::{ProductionKey, QuotaPartition};
    use chrono::NaiveDate;

    const ACTIVE_TRIP: u8 = b'A';
    const QUOTA_SEQUENCE: u8 = b'S';
    const QUOTA_ANNUAL: u8 = b'U';
    const QUOTA_PARTITION: u8 = b'Q';
    const PRODUCTION_HEAD: u8 = b'H';
    const TRIP_PRODUCTION: u8 = b'P';
    const OPERATION_HEAD: u8 = b'O';

    fn key(tag: u8, parts: &[&str]) -> Vec<u8> {
        let mut key = vec![tag];
        for part in parts {
            key.extend_from_slice(part.as_bytes());
            key.push(0);
        }
        key
    }

    /// vessel -> trip id currently `InProgress`
    pub fn active_trip(vessel_id: &str) -> Vec<u8> {
        key(ACTIVE_TRIP, &[vessel_id])
    }

    /// partition -> highest sequence issued
    pub fn quota_sequence(partition: &QuotaPartition) -> Vec<u8> {
        key(
            QUOTA_SEQUENCE,
            &[
                partition.movement_id.as_str(),
                partition.species_id.as_str(),
                partition.zone_id.as_str(),
                partition.year.to_string().as_str(),
            ],
        )
    }

    /// Prefix of every entry of a partition
    pub fn quota_partition_prefix(partition: &QuotaPartition) -> Vec<u8> {
        key(
            QUOTA_PARTITION,
            &[
                partition.movement_id.as_str(),
                partition.species_id.as_str(),
                partition.zone_id.as_str(),
                partition.year.to_string().as_str(),
            ],
        )
    }

    /// partition || sequence (big endian) -> control id
    pub fn quota_partition_entry(partition: &QuotaPartition, sequence: u32) -> Vec<u8> {
        let mut key = quota_partition_prefix(partition);
        key.extend_from_slice(&sequence.to_be_bytes());
        key
    }

    /// Prefix of every entry for (movement, species, year) across zones
    pub fn quota_annual_prefix(movement_id: &str, species_id: &str, year: i32) -> Vec<u8> {
        key(QUOTA_ANNUAL, &[movement_id, species_id, year.to_string().as_str()])
    }

    /// (movement, species, year) || control id -> control id
    pub fn quota_annual_entry(
        movement_id: &str,
        species_id: &str,
        year: i32,
        control_id: &str,
    ) -> Vec<u8> {
        key(
            QUOTA_ANNUAL,
            &[movement_id, species_id, year.to_string().as_str(), control_id],
        )
    }

    /// base key -> version head
    pub fn production_head(base: &ProductionKey) -> Vec<u8> {
        key(
            PRODUCTION_HEAD,
            &[
                base.operation_id.as_str(),
                base.product_id.as_str(),
                base.haul.to_string().as_str(),
            ],
        )
    }

    /// Prefix of every record of a trip
    pub fn trip_production_prefix(trip_id: &str) -> Vec<u8> {
        key(TRIP_PRODUCTION, &[trip_id])
    }

    /// trip || production id -> production id
    pub fn trip_production(trip_id: &str, production_id: &str) -> Vec<u8> {
        key(TRIP_PRODUCTION, &[trip_id, production_id])
    }

    /// (vessel, date) -> version head
    pub fn operation_head(vessel_id: &str, date: NaiveDate) -> Vec<u8> {
        key(
            OPERATION_HEAD,
            &[vessel_id, date.format("%Y%m%d").to_string().as_str()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, test_storage};
    use crate::types::{Trip, TripState};

    fn trip(id: &str) -> Trip {
        Trip {
            trip_id: id.to_string(),
            vessel_id: "B01".to_string(),
            trip_number: 1,
            start_date: date(2024, 1, 10),
            end_date: None,
            objective_id: "OBJ1".to_string(),
            zone_id: "Z1".to_string(),
            state: TripState::Inactive,
            active: false,
        }
    }

    #[test]
    fn test_storage_open() {
        let (storage, _temp) = test_storage();
        for cf in COLUMN_FAMILIES {
            assert!(storage.db.cf_handle(cf).is_some());
        }
    }

    #[test]
    fn test_insert_commit_and_get() {
        let (storage, _temp) = test_storage();

        let mut txn = storage.begin();
        txn.insert(&trip("M-B01-202401"), "created").unwrap();
        let committed = txn.commit().unwrap();
        assert_eq!(committed.writes, 1);
        assert_eq!(committed.audits.len(), 1);
        assert_eq!(committed.audits[0].action, AuditAction::Insert);

        let txn = storage.begin();
        let stored: Trip = txn.require("M-B01-202401").unwrap();
        assert_eq!(stored, trip("M-B01-202401"));
    }

    #[test]
    fn test_insert_conflict() {
        let (storage, _temp) = test_storage();

        let mut txn = storage.begin();
        txn.insert(&trip("M-B01-202401"), "created").unwrap();
        txn.commit().unwrap();

        let mut txn = storage.begin();
        let err = txn.insert(&trip("M-B01-202401"), "again").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_reads_see_staged_writes() {
        let (storage, _temp) = test_storage();

        let mut txn = storage.begin();
        txn.insert(&trip("M-B01-202401"), "created").unwrap();
        assert!(txn.contains::<Trip>("M-B01-202401").unwrap());

        // A staged insert is visible to its own conflict check
        let err = txn.insert(&trip("M-B01-202401"), "again").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_drop_discards_staged_writes() {
        let (storage, _temp) = test_storage();

        {
            let mut txn = storage.begin();
            txn.insert(&trip("M-B01-202401"), "created").unwrap();
            txn.index_put(keys::active_trip("B01"), &"M-B01-202401".to_string())
                .unwrap();
        }

        let txn = storage.begin();
        assert!(txn.get::<Trip>("M-B01-202401").unwrap().is_none());
        assert!(txn
            .index_get::<String>(&keys::active_trip("B01"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_index_scan_merges_overlay() {
        let (storage, _temp) = test_storage();

        let mut txn = storage.begin();
        txn.index_put(keys::trip_production("M1", "PR-a"), &"PR-a".to_string())
            .unwrap();
        txn.index_put(keys::trip_production("M1", "PR-b"), &"PR-b".to_string())
            .unwrap();
        txn.index_put(keys::trip_production("M10", "PR-z"), &"PR-z".to_string())
            .unwrap();
        txn.commit().unwrap();

        let mut txn = storage.begin();
        txn.index_put(keys::trip_production("M1", "PR-c"), &"PR-c".to_string())
            .unwrap();
        txn.index_remove(keys::trip_production("M1", "PR-a"));

        let ids: Vec<String> = txn
            .index_scan(&keys::trip_production_prefix("M1"))
            .unwrap();
        assert_eq!(ids, vec!["PR-b".to_string(), "PR-c".to_string()]);
    }

    #[test]
    fn test_transition_sets_flag() {
        let (storage, _temp) = test_storage();

        let mut txn = storage.begin();
        txn.insert(&trip("M-B01-202401"), "created").unwrap();
        txn.commit().unwrap();

        let mut txn = storage.begin();
        let mut stored: Trip = txn.require("M-B01-202401").unwrap();
        stored.state = TripState::InProgress;
        txn.transition(&mut stored, true, "activated").unwrap();
        let committed = txn.commit().unwrap();
        assert_eq!(committed.audits[0].action, AuditAction::StateChange);

        let stored: Trip = storage.begin().require("M-B01-202401").unwrap();
        assert!(stored.active);
        assert_eq!(stored.state, TripState::InProgress);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let (storage, _temp) = test_storage();
        let mut txn = storage.begin();
        let err = txn.update(&trip("M-B01-202409"), "nope").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_stats() {
        let (storage, _temp) = test_storage();
        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.quota_entries, 0);
    }
}
