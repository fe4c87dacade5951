//! Storage abstractions consumed by the rebuild orchestrator.
//!
//! A rebuild talks to storage only through one [`StockTransaction`], opened by a
//! [`StockStorage`] the caller owns and passes in. Every read and write of a rebuild
//! goes through that transaction, so the rebuild commits or rolls back as a unit.
//!
//! ## Optional sources
//!
//! The movement ledger and the purchase/sales order lines belong to subsystems that may
//! not be installed. [`StockTransaction::sources`] reports which exist; it is queried
//! once per rebuild and the answer is passed down. Reading an absent source is never
//! attempted.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use stockrebuild_core::WarehouseCode;
use stockrebuild_inventory::{MovementEntry, PurchaseLine, SalesLine, StockKey, StockRecord};

pub use in_memory::{FailurePoint, InMemoryStockStorage, StockDataset};
pub use postgres::PostgresStockStorage;

/// A data source whose existence varies by deployment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Stock,
    Movements,
    PurchaseLines,
    SalesLines,
}

impl DataSource {
    pub const ALL: [DataSource; 4] = [
        DataSource::Stock,
        DataSource::Movements,
        DataSource::PurchaseLines,
        DataSource::SalesLines,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataSource::Stock => "stock",
            DataSource::Movements => "movements",
            DataSource::PurchaseLines => "purchase_lines",
            DataSource::SalesLines => "sales_lines",
        }
    }
}

impl core::fmt::Display for DataSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which optional sources exist in the current deployment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SourceSet {
    pub stock: bool,
    pub movements: bool,
    pub purchase_lines: bool,
    pub sales_lines: bool,
}

impl SourceSet {
    pub fn all() -> Self {
        Self {
            stock: true,
            movements: true,
            purchase_lines: true,
            sales_lines: true,
        }
    }

    pub fn has(&self, source: DataSource) -> bool {
        match source {
            DataSource::Stock => self.stock,
            DataSource::Movements => self.movements,
            DataSource::PurchaseLines => self.purchase_lines,
            DataSource::SalesLines => self.sales_lines,
        }
    }

    pub fn missing(self) -> impl Iterator<Item = DataSource> {
        DataSource::ALL.into_iter().filter(move |s| !self.has(*s))
    }
}

/// Storage operation error.
///
/// Any of these is fatal to the current rebuild.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("query failed in {operation}: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },

    #[error("transaction control failed in {operation}: {message}")]
    Transaction {
        operation: &'static str,
        message: String,
    },

    #[error("failed to decode row in {operation}: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("injected failure in {operation}")]
    Injected { operation: &'static str },
}

impl StorageError {
    pub fn operation(&self) -> &'static str {
        match self {
            StorageError::Query { operation, .. }
            | StorageError::Transaction { operation, .. }
            | StorageError::Decode { operation, .. }
            | StorageError::Injected { operation } => *operation,
        }
    }
}

/// Opens rebuild transactions.
#[async_trait::async_trait]
pub trait StockStorage: Send + Sync {
    /// Begin one atomic transaction.
    ///
    /// Dropping the returned transaction without committing must roll it back.
    async fn begin(&self) -> Result<Box<dyn StockTransaction + '_>, StorageError>;
}

#[async_trait::async_trait]
impl<S> StockStorage for Arc<S>
where
    S: StockStorage + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StockTransaction + '_>, StorageError> {
        (**self).begin().await
    }
}

/// One open rebuild transaction.
///
/// Reads return rows for a single warehouse; aggregation happens in the domain crate.
#[async_trait::async_trait]
pub trait StockTransaction: Send {
    /// Capability query: which optional sources exist.
    async fn sources(&mut self) -> Result<SourceSet, StorageError>;

    /// Every warehouse in the catalog, unfiltered.
    async fn warehouses(&mut self) -> Result<Vec<WarehouseCode>, StorageError>;

    /// Movement rows for a warehouse, possibly pre-summed per raw reference.
    async fn movements(&mut self, warehouse: &WarehouseCode) -> Result<Vec<MovementEntry>, StorageError>;

    /// Pending-receipt purchase lines whose order belongs to `warehouse`.
    async fn purchase_lines(&mut self, warehouse: &WarehouseCode) -> Result<Vec<PurchaseLine>, StorageError>;

    /// Reserving sales lines whose order belongs to `warehouse`.
    async fn sales_lines(&mut self, warehouse: &WarehouseCode) -> Result<Vec<SalesLine>, StorageError>;

    /// Zero every quantity of every stock record in one bulk update.
    ///
    /// Returns the number of records touched.
    async fn zero_stock(&mut self) -> Result<u64, StorageError>;

    /// Create the stock table (empty) when [`sources`](Self::sources) reported it missing.
    ///
    /// Part of the transaction: a rollback leaves the schema as it was.
    async fn create_stock_table(&mut self) -> Result<(), StorageError>;

    async fn find_stock(&mut self, key: &StockKey) -> Result<Option<StockRecord>, StorageError>;

    /// Persist on-hand, pending and reserved of an existing record.
    async fn update_stock(&mut self, record: &StockRecord) -> Result<(), StorageError>;

    async fn insert_stock(&mut self, record: &StockRecord) -> Result<(), StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lists_absent_sources_in_order() {
        let sources = SourceSet {
            stock: true,
            movements: false,
            purchase_lines: true,
            sales_lines: false,
        };
        let missing: Vec<_> = sources.missing().collect();
        assert_eq!(missing, vec![DataSource::Movements, DataSource::SalesLines]);
        assert_eq!(SourceSet::all().missing().count(), 0);
    }

    #[test]
    fn storage_error_reports_operation() {
        let err = StorageError::Injected { operation: "insert_stock" };
        assert_eq!(err.operation(), "insert_stock");
        assert_eq!(err.to_string(), "injected failure in insert_stock");
    }
}
