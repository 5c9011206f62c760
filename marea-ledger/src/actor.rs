//! Actor-based concurrency for the ledger
//!
//! Every mutating operation runs inside one task that owns the write path:
//! - One logical writer serializes sequence allocation, version allocation
//!   and the per-vessel activation check
//! - Each message is one unit of work: a [`Txn`] committed as one batch
//! - Async message passing with backpressure (bounded mailbox)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   begin Txn → validate + stage → commit WriteBatch   │
//! │                       │                               │
//! │                       ▼                               │
//! │        AuditSink (one event per written entity)      │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{
    audit::{AuditEvent, AuditSink},
    certification::{self, Discharge, FinalCertification},
    error::{ensure_present, ErrorKind},
    marea::{self, NewTrip},
    metrics::Metrics,
    operation::{self, OperationReport},
    production::{self, ProductionBatch},
    quota::{self, QuotaAdjustment, ZoneTransfer},
    reference::ReferenceData,
    storage::Txn,
    types::{DailyOperation, QuotaEntry, Trip},
    Error, Result, Storage,
};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Create a trip
    CreateTrip {
        request: NewTrip,
        user_id: String,
        response: Reply<Trip>,
    },

    /// Activate a trip
    ActivateTrip {
        trip_id: String,
        user_id: String,
        response: Reply<Trip>,
    },

    /// Finalize a trip
    FinalizeTrip {
        trip_id: String,
        end_date: NaiveDate,
        today: NaiveDate,
        user_id: String,
        response: Reply<Trip>,
    },

    /// Certify all production and close the trip
    CloseTrip {
        trip_id: String,
        user_id: String,
        response: Reply<Trip>,
    },

    /// Quota increase
    IncreaseQuota {
        request: QuotaAdjustment,
        user_id: String,
        response: Reply<QuotaEntry>,
    },

    /// Quota decrease
    DecreaseQuota {
        request: QuotaAdjustment,
        user_id: String,
        response: Reply<QuotaEntry>,
    },

    /// Quota zone change
    ChangeQuotaZone {
        request: ZoneTransfer,
        user_id: String,
        response: Reply<(QuotaEntry, QuotaEntry)>,
    },

    /// Register production lines
    RegisterProduction {
        batch: ProductionBatch,
        user_id: String,
        response: Reply<Vec<String>>,
    },

    /// Modify production lines
    ModifyProduction {
        batch: ProductionBatch,
        user_id: String,
        response: Reply<Vec<String>>,
    },

    /// Write discharge records
    RegisterDischarge {
        request: Discharge,
        user_id: String,
        response: Reply<Vec<String>>,
    },

    /// Write a final certification record
    CertifyFinal {
        request: FinalCertification,
        user_id: String,
        response: Reply<String>,
    },

    /// Register a daily operation
    RegisterOperation {
        report: OperationReport,
        user_id: String,
        response: Reply<DailyOperation>,
    },

    /// Modify a daily operation
    ModifyOperation {
        report: OperationReport,
        user_id: String,
        response: Reply<DailyOperation>,
    },

    /// Shutdown actor
    Shutdown { response: oneshot::Sender<()> },
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Reference-data collaborator
    reference: Arc<dyn ReferenceData>,

    /// Audit collaborator
    audit: Arc<dyn AuditSink>,

    /// Metrics
    metrics: Metrics,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        reference: Arc<dyn ReferenceData>,
        audit: Arc<dyn AuditSink>,
        metrics: Metrics,
        mailbox: mpsc::Receiver<LedgerMessage>,
    ) -> Self {
        Self {
            storage,
            reference,
            audit,
            metrics,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown { response } => {
                    let _ = response.send(());
                    break;
                }
                msg => self.handle_message(msg),
            }
        }

        tracing::info!("Ledger actor stopped");
    }

    /// Handle a single message
    fn handle_message(&self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::CreateTrip {
                request,
                user_id,
                response,
            } => {
                let result = self.execute("create_trip", &user_id, |txn, reference| {
                    marea::create(txn, reference, &request)
                });
                let _ = response.send(result);
            }

            LedgerMessage::ActivateTrip {
                trip_id,
                user_id,
                response,
            } => {
                let result = self.execute("activate_trip", &user_id, |txn, _| {
                    marea::activate(txn, &trip_id)
                });
                let _ = response.send(result);
            }

            LedgerMessage::FinalizeTrip {
                trip_id,
                end_date,
                today,
                user_id,
                response,
            } => {
                let result = self.execute("finalize_trip", &user_id, |txn, _| {
                    marea::finalize(txn, &trip_id, end_date, today)
                });
                let _ = response.send(result);
            }

            LedgerMessage::CloseTrip {
                trip_id,
                user_id,
                response,
            } => {
                let result = self.execute("close_trip", &user_id, |txn, _| {
                    certification::close_trip(txn, &trip_id)
                });
                let _ = response.send(result);
            }

            LedgerMessage::IncreaseQuota {
                request,
                user_id,
                response,
            } => {
                let result = self.execute("increase_quota", &user_id, |txn, reference| {
                    quota::increase(txn, reference, &request)
                });
                let _ = response.send(result);
            }

            LedgerMessage::DecreaseQuota {
                request,
                user_id,
                response,
            } => {
                let result = self.execute("decrease_quota", &user_id, |txn, reference| {
                    quota::decrease(txn, reference, &request)
                });
                let _ = response.send(result);
            }

            LedgerMessage::ChangeQuotaZone {
                request,
                user_id,
                response,
            } => {
                let result = self.execute("change_quota_zone", &user_id, |txn, reference| {
                    quota::change_zone(txn, reference, &request)
                });
                let _ = response.send(result);
            }

            LedgerMessage::RegisterProduction {
                batch,
                user_id,
                response,
            } => {
                let result = self.execute("register_production", &user_id, |txn, reference| {
                    production::register(txn, reference, &batch)
                });
                let _ = response.send(result);
            }

            LedgerMessage::ModifyProduction {
                batch,
                user_id,
                response,
            } => {
                let result = self.execute("modify_production", &user_id, |txn, reference| {
                    production::modify(txn, reference, &batch)
                });
                let _ = response.send(result);
            }

            LedgerMessage::RegisterDischarge {
                request,
                user_id,
                response,
            } => {
                let result = self.execute("register_discharge", &user_id, |txn, _| {
                    certification::discharge(txn, &request)
                });
                let _ = response.send(result);
            }

            LedgerMessage::CertifyFinal {
                request,
                user_id,
                response,
            } => {
                let result = self.execute("certify_final", &user_id, |txn, reference| {
                    certification::certify_final(txn, reference, &request)
                });
                let _ = response.send(result);
            }

            LedgerMessage::RegisterOperation {
                report,
                user_id,
                response,
            } => {
                let result = self.execute("register_operation", &user_id, |txn, reference| {
                    operation::register(txn, reference, &report)
                });
                let _ = response.send(result);
            }

            LedgerMessage::ModifyOperation {
                report,
                user_id,
                response,
            } => {
                let result = self.execute("modify_operation", &user_id, |txn, reference| {
                    operation::modify(txn, reference, &report)
                });
                let _ = response.send(result);
            }

            LedgerMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }

    /// Run one unit of work, then log and measure the outcome
    fn execute<T>(
        &self,
        operation: &'static str,
        user_id: &str,
        work: impl FnOnce(&mut Txn<'_>, &dyn ReferenceData) -> Result<T>,
    ) -> Result<T> {
        let started = Instant::now();

        match self.commit_unit(user_id, work) {
            Ok((value, records)) => {
                let elapsed = started.elapsed().as_secs_f64();
                self.metrics.record_committed(operation, records, elapsed);
                tracing::info!(operation, user_id, records, elapsed, "Operation committed");
                Ok(value)
            }
            Err(e) => {
                let kind = e.kind();
                self.metrics.record_rejected(operation, kind);
                if kind == ErrorKind::System {
                    tracing::error!(operation, user_id, error = %e, "Operation failed");
                } else {
                    tracing::warn!(
                        operation,
                        user_id,
                        kind = kind.as_str(),
                        error = %e,
                        "Operation rejected"
                    );
                }
                Err(e)
            }
        }
    }

    fn commit_unit<T>(
        &self,
        user_id: &str,
        work: impl FnOnce(&mut Txn<'_>, &dyn ReferenceData) -> Result<T>,
    ) -> Result<(T, usize)> {
        ensure_present("user_id", user_id)?;

        let mut txn = self.storage.begin();
        let value = work(&mut txn, self.reference.as_ref())?;
        let committed = txn.commit()?;

        let records = committed.audits.len();
        for pending in committed.audits {
            let event = AuditEvent::from_pending(pending, user_id);
            self.audit.record(&event);
        }

        Ok((value, records))
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> LedgerMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Create a trip
    pub async fn create_trip(&self, request: NewTrip, user_id: String) -> Result<Trip> {
        self.request(|response| LedgerMessage::CreateTrip {
            request,
            user_id,
            response,
        })
        .await
    }

    /// Activate a trip
    pub async fn activate_trip(&self, trip_id: String, user_id: String) -> Result<Trip> {
        self.request(|response| LedgerMessage::ActivateTrip {
            trip_id,
            user_id,
            response,
        })
        .await
    }

    /// Finalize a trip
    pub async fn finalize_trip(
        &self,
        trip_id: String,
        end_date: NaiveDate,
        today: NaiveDate,
        user_id: String,
    ) -> Result<Trip> {
        self.request(|response| LedgerMessage::FinalizeTrip {
            trip_id,
            end_date,
            today,
            user_id,
            response,
        })
        .await
    }

    /// Close a trip
    pub async fn close_trip(&self, trip_id: String, user_id: String) -> Result<Trip> {
        self.request(|response| LedgerMessage::CloseTrip {
            trip_id,
            user_id,
            response,
        })
        .await
    }

    /// Quota increase
    pub async fn increase_quota(
        &self,
        request: QuotaAdjustment,
        user_id: String,
    ) -> Result<QuotaEntry> {
        self.request(|response| LedgerMessage::IncreaseQuota {
            request,
            user_id,
            response,
        })
        .await
    }

    /// Quota decrease
    pub async fn decrease_quota(
        &self,
        request: QuotaAdjustment,
        user_id: String,
    ) -> Result<QuotaEntry> {
        self.request(|response| LedgerMessage::DecreaseQuota {
            request,
            user_id,
            response,
        })
        .await
    }

    /// Quota zone change
    pub async fn change_quota_zone(
        &self,
        request: ZoneTransfer,
        user_id: String,
    ) -> Result<(QuotaEntry, QuotaEntry)> {
        self.request(|response| LedgerMessage::ChangeQuotaZone {
            request,
            user_id,
            response,
        })
        .await
    }

    /// Register production lines
    pub async fn register_production(
        &self,
        batch: ProductionBatch,
        user_id: String,
    ) -> Result<Vec<String>> {
        self.request(|response| LedgerMessage::RegisterProduction {
            batch,
            user_id,
            response,
        })
        .await
    }

    /// Modify production lines
    pub async fn modify_production(
        &self,
        batch: ProductionBatch,
        user_id: String,
    ) -> Result<Vec<String>> {
        self.request(|response| LedgerMessage::ModifyProduction {
            batch,
            user_id,
            response,
        })
        .await
    }

    /// Write discharge records
    pub async fn register_discharge(
        &self,
        request: Discharge,
        user_id: String,
    ) -> Result<Vec<String>> {
        self.request(|response| LedgerMessage::RegisterDischarge {
            request,
            user_id,
            response,
        })
        .await
    }

    /// Write a final certification record
    pub async fn certify_final(
        &self,
        request: FinalCertification,
        user_id: String,
    ) -> Result<String> {
        self.request(|response| LedgerMessage::CertifyFinal {
            request,
            user_id,
            response,
        })
        .await
    }

    /// Register a daily operation
    pub async fn register_operation(
        &self,
        report: OperationReport,
        user_id: String,
    ) -> Result<DailyOperation> {
        self.request(|response| LedgerMessage::RegisterOperation {
            report,
            user_id,
            response,
        })
        .await
    }

    /// Modify a daily operation
    pub async fn modify_operation(
        &self,
        report: OperationReport,
        user_id: String,
    ) -> Result<DailyOperation> {
        self.request(|response| LedgerMessage::ModifyOperation {
            report,
            user_id,
            response,
        })
        .await
    }

    /// Shutdown actor, waiting for the in-flight message to finish
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    reference: Arc<dyn ReferenceData>,
    audit: Arc<dyn AuditSink>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, reference, audit, metrics, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
