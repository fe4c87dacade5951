//! Rebuild orchestrator.
//!
//! Recomputes every stock record from the movement ledger and open order lines inside
//! one storage transaction:
//!
//! 1. query which optional sources exist (once)
//! 2. zero every existing stock record, or create the stock table if it is missing
//! 3. per warehouse: aggregate, merge, and upsert
//! 4. commit, then emit the `rebuilt-stock` notice and audit entry
//!
//! Any storage failure rolls the whole transaction back; the caller gets one error and
//! decides whether to retry. Completion events go out only after a successful commit,
//! since the audit sink cannot be rolled back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use stockrebuild_core::{RebuildId, WarehouseCode};
use stockrebuild_inventory::{StockAggregate, StockAggregates, StockRecord, merge_warehouse};

use crate::audit::{AuditSink, REBUILT_STOCK, TracingAuditSink};
use crate::storage::{SourceSet, StockStorage, StockTransaction, StorageError};

/// Where a rebuild is in its lifecycle; used as a structured logging field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RebuildPhase {
    Clearing,
    PerWarehouseRebuild,
    Committing,
    RolledBack,
}

impl RebuildPhase {
    pub fn name(self) -> &'static str {
        match self {
            RebuildPhase::Clearing => "clearing",
            RebuildPhase::PerWarehouseRebuild => "per_warehouse_rebuild",
            RebuildPhase::Committing => "committing",
            RebuildPhase::RolledBack => "rolled_back",
        }
    }
}

impl core::fmt::Display for RebuildPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary of one committed rebuild.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildReport {
    pub run_id: RebuildId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub warehouses: usize,
    /// Records reset by the clear pass.
    pub records_zeroed: u64,
    /// The stock table did not exist and was created by this run.
    pub stock_table_created: bool,
    pub records_updated: usize,
    pub records_inserted: usize,
    /// Source rows ignored because their reference was blank.
    pub skipped_rows: usize,
    pub sources: SourceSet,
}

impl RebuildReport {
    fn start() -> Self {
        Self {
            run_id: RebuildId::new(),
            started_at: Utc::now(),
            finished_at: None,
            warehouses: 0,
            records_zeroed: 0,
            stock_table_created: false,
            records_updated: 0,
            records_inserted: 0,
            skipped_rows: 0,
            sources: SourceSet::default(),
        }
    }
}

/// Rebuild failure. The stock table is left as it was before the rebuild started.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("stock rebuild failed: {0}")]
    Storage(#[from] StorageError),

    #[error("stock rebuild failed ({cause}) and rollback also failed ({rollback})")]
    Rollback {
        cause: StorageError,
        rollback: StorageError,
    },
}

/// Full, atomic stock recomputation.
///
/// Holds no storage handle: the caller passes the storage to each [`rebuild`] call.
///
/// [`rebuild`]: StockRebuild::rebuild
#[derive(Debug, Clone)]
pub struct StockRebuild<A = TracingAuditSink> {
    audit: A,
}

impl StockRebuild<TracingAuditSink> {
    pub fn new() -> Self {
        Self {
            audit: TracingAuditSink,
        }
    }
}

impl Default for StockRebuild<TracingAuditSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: AuditSink> StockRebuild<A> {
    pub fn with_audit(audit: A) -> Self {
        Self { audit }
    }

    /// Recompute every stock record and commit, or roll back on the first failure.
    #[instrument(name = "stock_rebuild", skip_all, err)]
    pub async fn rebuild<S>(&self, storage: &S) -> Result<RebuildReport, RebuildError>
    where
        S: StockStorage + ?Sized,
    {
        let mut report = RebuildReport::start();
        info!(run_id = %report.run_id, "stock rebuild started");

        let mut tx = storage.begin().await?;

        let outcome = recompute(tx.as_mut(), &mut report).await;
        if let Err(cause) = outcome {
            warn!(
                run_id = %report.run_id,
                phase = %RebuildPhase::RolledBack,
                operation = cause.operation(),
                error = %cause,
                "stock rebuild failed; rolling back"
            );
            return match tx.rollback().await {
                Ok(()) => Err(RebuildError::Storage(cause)),
                Err(rollback) => Err(RebuildError::Rollback { cause, rollback }),
            };
        }

        debug!(run_id = %report.run_id, phase = %RebuildPhase::Committing);
        if let Err(cause) = tx.commit().await {
            warn!(
                run_id = %report.run_id,
                phase = %RebuildPhase::RolledBack,
                operation = cause.operation(),
                error = %cause,
                "stock rebuild commit failed; transaction discarded"
            );
            return Err(RebuildError::Storage(cause));
        }
        report.finished_at = Some(Utc::now());

        self.audit.notice(REBUILT_STOCK);
        self.audit.audit(REBUILT_STOCK);

        info!(
            run_id = %report.run_id,
            warehouses = report.warehouses,
            records_zeroed = report.records_zeroed,
            records_updated = report.records_updated,
            records_inserted = report.records_inserted,
            skipped_rows = report.skipped_rows,
            "stock rebuilt"
        );
        Ok(report)
    }
}

async fn recompute(
    tx: &mut (dyn StockTransaction + '_),
    report: &mut RebuildReport,
) -> Result<(), StorageError> {
    let sources = tx.sources().await?;
    report.sources = sources;
    for missing in sources.missing() {
        info!(source = %missing, "source not installed; contributes nothing");
    }

    debug!(phase = %RebuildPhase::Clearing);
    if sources.stock {
        report.records_zeroed = tx.zero_stock().await?;
    } else {
        tx.create_stock_table().await?;
        report.stock_table_created = true;
        info!("stock table created");
    }

    let warehouses = tx.warehouses().await?;
    for warehouse in &warehouses {
        debug!(phase = %RebuildPhase::PerWarehouseRebuild, warehouse = %warehouse);

        let aggregates = collect_aggregates(tx, warehouse, sources).await?;
        report.skipped_rows += aggregates.skipped();

        for aggregate in aggregates {
            upsert(tx, &aggregate, sources.stock, report).await?;
        }
        report.warehouses += 1;
    }

    Ok(())
}

/// Read one warehouse's sources through the transaction and merge them.
async fn collect_aggregates(
    tx: &mut (dyn StockTransaction + '_),
    warehouse: &WarehouseCode,
    sources: SourceSet,
) -> Result<StockAggregates, StorageError> {
    let movements = if sources.movements {
        Some(tx.movements(warehouse).await?)
    } else {
        None
    };
    let purchase_lines = if sources.purchase_lines {
        Some(tx.purchase_lines(warehouse).await?)
    } else {
        None
    };
    let sales_lines = if sources.sales_lines {
        Some(tx.sales_lines(warehouse).await?)
    } else {
        None
    };

    Ok(merge_warehouse(
        warehouse,
        movements.as_deref(),
        purchase_lines.as_deref(),
        sales_lines.as_deref(),
    ))
}

async fn upsert(
    tx: &mut (dyn StockTransaction + '_),
    aggregate: &StockAggregate,
    stock_table_exists: bool,
    report: &mut RebuildReport,
) -> Result<(), StorageError> {
    let existing = if stock_table_exists {
        tx.find_stock(&aggregate.key()).await?
    } else {
        None
    };

    match existing {
        Some(mut record) => {
            record.apply_aggregate(aggregate);
            tx.update_stock(&record).await?;
            report.records_updated += 1;
        }
        None => {
            tx.insert_stock(&StockRecord::from_aggregate(aggregate)).await?;
            report.records_inserted += 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_counts_and_sources() {
        let mut report = RebuildReport::start();
        report.warehouses = 2;
        report.records_inserted = 3;
        report.sources = SourceSet::all();

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["warehouses"], 2);
        assert_eq!(json["records_inserted"], 3);
        assert_eq!(json["sources"]["purchase_lines"], true);
        assert!(json["finished_at"].is_null());
        assert_eq!(json["run_id"], report.run_id.to_string());
    }

    #[test]
    fn rollback_error_mentions_both_failures() {
        let err = RebuildError::Rollback {
            cause: StorageError::Injected { operation: "insert_stock" },
            rollback: StorageError::Transaction {
                operation: "rollback",
                message: "connection reset".to_string(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("insert_stock"));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn phases_have_stable_names() {
        assert_eq!(RebuildPhase::PerWarehouseRebuild.to_string(), "per_warehouse_rebuild");
        assert_eq!(RebuildPhase::RolledBack.name(), "rolled_back");
    }
}
