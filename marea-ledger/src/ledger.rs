//! Main ledger orchestration layer
//!
//! This module ties together storage, reference data, audit and the actor
//! into the high-level API of the fleet core. Mutations go through the
//! single-writer actor; reads go straight to storage and see committed
//! state only.
//!
//! # Example
//!
//! ```no_run
//! use marea_ledger::{Config, InMemoryReferenceData, Ledger, NewTrip};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> marea_ledger::Result<()> {
//!     let reference = InMemoryReferenceData::from_file("reference.toml")?;
//!     let ledger = Ledger::open(Config::default(), Arc::new(reference)).await?;
//!
//!     // let trip = ledger.create_trip(request, "jdoe").await?;
//!     // ledger.activate_trip(&trip.trip_id, "jdoe").await?;
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    audit::{AuditSink, TracingAuditSink},
    certification::{self, CertificationPreview, Discharge, FinalCertification},
    marea::NewTrip,
    metrics::Metrics,
    operation::{self, OperationReport},
    production::{self, ProductionBatch},
    quota::{self, QuotaAdjustment, ZoneTransfer},
    reference::ReferenceData,
    storage::StorageStats,
    types::{DailyOperation, ProductionKey, ProductionRecord, QuotaEntry, QuotaPartition, Trip},
    Config, Error, Result, Storage,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Metrics shared with the actor
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger, auditing through `tracing`
    pub async fn open(config: Config, reference: Arc<dyn ReferenceData>) -> Result<Self> {
        Self::open_with_audit(config, reference, Arc::new(TracingAuditSink)).await
    }

    /// Open ledger with an explicit audit sink
    pub async fn open_with_audit(
        config: Config,
        reference: Arc<dyn ReferenceData>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        let handle = spawn_ledger_actor(
            storage.clone(),
            reference,
            audit,
            metrics.clone(),
            config.mailbox_capacity,
        );

        tracing::info!(
            service = %config.service_name,
            data_dir = %config.data_dir.display(),
            "Ledger opened"
        );

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    // Trips

    /// Create a trip in state `Inactive`
    pub async fn create_trip(&self, request: NewTrip, user_id: &str) -> Result<Trip> {
        self.handle.create_trip(request, user_id.to_string()).await
    }

    /// Put a trip at sea; at most one per vessel
    pub async fn activate_trip(&self, trip_id: &str, user_id: &str) -> Result<Trip> {
        self.handle
            .activate_trip(trip_id.to_string(), user_id.to_string())
            .await
    }

    /// Bring a trip back to port
    pub async fn finalize_trip(
        &self,
        trip_id: &str,
        end_date: NaiveDate,
        user_id: &str,
    ) -> Result<Trip> {
        let today = Utc::now().date_naive();
        self.handle
            .finalize_trip(trip_id.to_string(), end_date, today, user_id.to_string())
            .await
    }

    /// Certify every production record of a trip and close it
    pub async fn close_trip(&self, trip_id: &str, user_id: &str) -> Result<Trip> {
        self.handle
            .close_trip(trip_id.to_string(), user_id.to_string())
            .await
    }

    /// Get trip by id
    pub fn trip(&self, trip_id: &str) -> Result<Trip> {
        self.storage.begin().require(trip_id)
    }

    // Quota

    /// Append an increase entry
    pub async fn increase_quota(&self, request: QuotaAdjustment, user_id: &str) -> Result<QuotaEntry> {
        self.handle.increase_quota(request, user_id.to_string()).await
    }

    /// Append a decrease entry
    pub async fn decrease_quota(&self, request: QuotaAdjustment, user_id: &str) -> Result<QuotaEntry> {
        self.handle.decrease_quota(request, user_id.to_string()).await
    }

    /// Append the paired entries of a zone transfer
    pub async fn change_quota_zone(
        &self,
        request: ZoneTransfer,
        user_id: &str,
    ) -> Result<(QuotaEntry, QuotaEntry)> {
        self.handle
            .change_quota_zone(request, user_id.to_string())
            .await
    }

    /// Entries of a partition in sequence order
    pub fn quota_entries(&self, partition: &QuotaPartition) -> Result<Vec<QuotaEntry>> {
        quota::entries(&self.storage.begin(), partition)
    }

    /// Signed sum of a partition
    pub fn quota_balance(&self, partition: &QuotaPartition) -> Result<Decimal> {
        quota::balance(&self.storage.begin(), partition)
    }

    // Production

    /// Register version 0 of each line
    pub async fn register_production(
        &self,
        batch: ProductionBatch,
        user_id: &str,
    ) -> Result<Vec<String>> {
        self.handle
            .register_production(batch, user_id.to_string())
            .await
    }

    /// Supersede each line's active version
    pub async fn modify_production(
        &self,
        batch: ProductionBatch,
        user_id: &str,
    ) -> Result<Vec<String>> {
        self.handle.modify_production(batch, user_id.to_string()).await
    }

    /// Get production record by id
    pub fn production_record(&self, production_id: &str) -> Result<ProductionRecord> {
        self.storage.begin().require(production_id)
    }

    /// All versions of one base key, oldest first
    pub fn production_history(&self, base: &ProductionKey) -> Result<Vec<ProductionRecord>> {
        production::history(&self.storage.begin(), base)
    }

    /// Every production record of a trip
    pub fn trip_production(&self, trip_id: &str) -> Result<Vec<ProductionRecord>> {
        production::trip_records(&self.storage.begin(), trip_id)
    }

    /// Uncertified kilos per product
    pub fn outstanding_by_product(&self, trip_id: &str) -> Result<BTreeMap<String, Decimal>> {
        production::outstanding_by_product(&self.storage.begin(), trip_id)
    }

    // Certification

    /// Spread a certified total over the outstanding lines without writing
    pub fn certify_preview(
        &self,
        trip_id: &str,
        total_certified_kilos: Decimal,
    ) -> Result<CertificationPreview> {
        certification::preview(&self.storage.begin(), trip_id, total_certified_kilos)
    }

    /// Write the negating discharge entries of a trip
    pub async fn register_discharge(&self, request: Discharge, user_id: &str) -> Result<Vec<String>> {
        self.handle
            .register_discharge(request, user_id.to_string())
            .await
    }

    /// Write the certified record of one product
    pub async fn certify_final(&self, request: FinalCertification, user_id: &str) -> Result<String> {
        self.handle.certify_final(request, user_id.to_string()).await
    }

    // Daily operations

    /// Register a day's report
    pub async fn register_operation(
        &self,
        report: OperationReport,
        user_id: &str,
    ) -> Result<DailyOperation> {
        self.handle
            .register_operation(report, user_id.to_string())
            .await
    }

    /// Replace a day's report with a new version
    pub async fn modify_operation(
        &self,
        report: OperationReport,
        user_id: &str,
    ) -> Result<DailyOperation> {
        self.handle.modify_operation(report, user_id.to_string()).await
    }

    /// Active report of a vessel for a date
    pub fn active_operation(&self, vessel_id: &str, date: NaiveDate) -> Result<Option<DailyOperation>> {
        operation::active(&self.storage.begin(), vessel_id, date)
    }

    // Housekeeping

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Entity counts
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Shutdown ledger, draining the actor first
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        tracing::info!("Ledger shut down");
        Ok(())
    }
}
