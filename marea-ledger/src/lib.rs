//! Marea Ledger
//!
//! Transactional core of a fishing-fleet operations system: trips (mareas)
//! and their lifecycle, an append-only quota ledger, versioned production
//! records with port certification, and versioned daily operation logs.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task owns the write path, so sequence and
//!   version allocation and the per-vessel activation check never race
//! - **Unit of Work**: Every operation stages into a [`storage::Txn`] and
//!   commits as one RocksDB write batch, or not at all
//! - **Never Update, Supersede**: Production and operation records are
//!   versioned; a modification marks the old version `M` and inserts a new one
//! - **Collaborators at the seams**: reference data and audit are traits
//!
//! # Invariants
//!
//! - Trip state only moves forward: Inactive → InProgress → InDischarge → Certified
//! - At most one trip in progress per vessel
//! - Quota sequences are contiguous per partition; balance is the signed sum
//! - Exactly one active version per production or operation key

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod ids;
pub mod storage;
pub mod ledger;
pub mod error;
pub mod actor;
pub mod audit;
pub mod config;
pub mod metrics;
pub mod reference;
pub mod marea;
pub mod quota;
pub mod production;
pub mod certification;
pub mod operation;
mod amount;

#[cfg(test)]
mod testing;

// Re-exports
pub use error::{Error, ErrorKind, Result};
pub use types::{
    Certification, DailyOperation, HourBreakdown, ProductionKey, ProductionRecord, QuotaCategory,
    QuotaEntry, QuotaMovement, QuotaPartition, QuotaTreatment, RecordKind, RecordStatus, Trip,
    TripState,
};
pub use marea::NewTrip;
pub use quota::{QuotaAdjustment, ZoneTransfer};
pub use production::{ProductionBatch, ProductionLine};
pub use certification::{CertificationPreview, Discharge, FinalCertification, PreviewLine};
pub use operation::OperationReport;
pub use audit::{AuditAction, AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use reference::{InMemoryReferenceData, ReferenceData};
pub use storage::{Storage, StorageStats};
pub use metrics::Metrics;
pub use ledger::Ledger;
pub use config::Config;
