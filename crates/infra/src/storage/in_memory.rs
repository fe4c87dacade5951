//! In-memory stock storage for tests/dev.
//!
//! A transaction takes the store-wide lock for its whole lifetime, works on a copy of
//! the stock table, and publishes the copy on commit. Rolling back (or dropping the
//! transaction) discards the copy. Optional sources are modelled as `Option`s: `None`
//! means the source is not installed.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use stockrebuild_core::WarehouseCode;
use stockrebuild_inventory::{MovementEntry, PurchaseLine, SalesLine, StockKey, StockRecord};

use super::{SourceSet, StockStorage, StockTransaction, StorageError};

/// Initial contents of an in-memory store.
#[derive(Debug, Clone, Default)]
pub struct StockDataset {
    pub warehouses: Vec<WarehouseCode>,
    pub stock: Option<Vec<StockRecord>>,
    pub movements: Option<Vec<MovementEntry>>,
    pub purchase_lines: Option<Vec<PurchaseLine>>,
    pub sales_lines: Option<Vec<SalesLine>>,
}

impl StockDataset {
    /// Every source installed and empty.
    pub fn with_all_sources(warehouses: Vec<WarehouseCode>) -> Self {
        Self {
            warehouses,
            stock: Some(Vec::new()),
            movements: Some(Vec::new()),
            purchase_lines: Some(Vec::new()),
            sales_lines: Some(Vec::new()),
        }
    }
}

/// Operation that fails once when armed with [`InMemoryStockStorage::fail_at`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailurePoint {
    Sources,
    Warehouses,
    Movements,
    PurchaseLines,
    SalesLines,
    ZeroStock,
    CreateStockTable,
    FindStock,
    UpdateStock,
    InsertStock,
    Commit,
}

impl FailurePoint {
    pub fn operation(self) -> &'static str {
        match self {
            FailurePoint::Sources => "sources",
            FailurePoint::Warehouses => "warehouses",
            FailurePoint::Movements => "movements",
            FailurePoint::PurchaseLines => "purchase_lines",
            FailurePoint::SalesLines => "sales_lines",
            FailurePoint::ZeroStock => "zero_stock",
            FailurePoint::CreateStockTable => "create_stock_table",
            FailurePoint::FindStock => "find_stock",
            FailurePoint::UpdateStock => "update_stock",
            FailurePoint::InsertStock => "insert_stock",
            FailurePoint::Commit => "commit",
        }
    }
}

type StockTable = BTreeMap<StockKey, StockRecord>;

#[derive(Debug)]
struct State {
    warehouses: Vec<WarehouseCode>,
    stock: Option<StockTable>,
    movements: Option<Vec<MovementEntry>>,
    purchase_lines: Option<Vec<PurchaseLine>>,
    sales_lines: Option<Vec<SalesLine>>,
    failure: Option<FailurePoint>,
}

/// In-memory, transactional stock storage.
#[derive(Debug, Clone)]
pub struct InMemoryStockStorage {
    state: Arc<Mutex<State>>,
}

impl InMemoryStockStorage {
    pub fn new(dataset: StockDataset) -> Self {
        let stock = dataset.stock.map(|records| {
            records
                .into_iter()
                .map(|r| (r.key().clone(), r))
                .collect::<StockTable>()
        });

        Self {
            state: Arc::new(Mutex::new(State {
                warehouses: dataset.warehouses,
                stock,
                movements: dataset.movements,
                purchase_lines: dataset.purchase_lines,
                sales_lines: dataset.sales_lines,
                failure: None,
            })),
        }
    }

    /// Make the next call of `point` fail (once).
    pub async fn fail_at(&self, point: FailurePoint) {
        self.state.lock().await.failure = Some(point);
    }

    /// Committed stock records in key order; empty if the stock table does not exist.
    pub async fn records(&self) -> Vec<StockRecord> {
        let state = self.state.lock().await;
        state
            .stock
            .as_ref()
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn record(&self, key: &StockKey) -> Option<StockRecord> {
        let state = self.state.lock().await;
        state.stock.as_ref().and_then(|t| t.get(key).cloned())
    }

    pub async fn has_stock_table(&self) -> bool {
        self.state.lock().await.stock.is_some()
    }

    /// Append a movement, installing the ledger if it was absent.
    pub async fn push_movement(&self, movement: MovementEntry) {
        let mut state = self.state.lock().await;
        state.movements.get_or_insert_with(Vec::new).push(movement);
    }

    pub async fn push_purchase_line(&self, line: PurchaseLine) {
        let mut state = self.state.lock().await;
        state.purchase_lines.get_or_insert_with(Vec::new).push(line);
    }

    pub async fn push_sales_line(&self, line: SalesLine) {
        let mut state = self.state.lock().await;
        state.sales_lines.get_or_insert_with(Vec::new).push(line);
    }

    /// Overwrite a committed record directly, as an outside writer would.
    pub async fn put_record(&self, record: StockRecord) {
        let mut state = self.state.lock().await;
        state
            .stock
            .get_or_insert_with(StockTable::new)
            .insert(record.key().clone(), record);
    }
}

impl Default for InMemoryStockStorage {
    fn default() -> Self {
        Self::new(StockDataset::default())
    }
}

#[async_trait::async_trait]
impl StockStorage for InMemoryStockStorage {
    async fn begin(&self) -> Result<Box<dyn StockTransaction + '_>, StorageError> {
        let state = self.state.clone().lock_owned().await;
        let working = state.stock.clone();
        Ok(Box::new(InMemoryTransaction { state, working }))
    }
}

struct InMemoryTransaction {
    state: OwnedMutexGuard<State>,
    working: Option<StockTable>,
}

impl InMemoryTransaction {
    fn check(&mut self, point: FailurePoint) -> Result<(), StorageError> {
        if self.state.failure == Some(point) {
            self.state.failure = None;
            return Err(StorageError::Injected {
                operation: point.operation(),
            });
        }
        Ok(())
    }
}

fn rows_for<T: Clone>(
    rows: Option<&Vec<T>>,
    warehouse: &WarehouseCode,
    warehouse_of: impl Fn(&T) -> &WarehouseCode,
) -> Vec<T> {
    rows.map(|rows| {
        rows.iter()
            .filter(|r| warehouse_of(r) == warehouse)
            .cloned()
            .collect()
    })
    .unwrap_or_default()
}

#[async_trait::async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn sources(&mut self) -> Result<SourceSet, StorageError> {
        self.check(FailurePoint::Sources)?;
        Ok(SourceSet {
            stock: self.working.is_some(),
            movements: self.state.movements.is_some(),
            purchase_lines: self.state.purchase_lines.is_some(),
            sales_lines: self.state.sales_lines.is_some(),
        })
    }

    async fn warehouses(&mut self) -> Result<Vec<WarehouseCode>, StorageError> {
        self.check(FailurePoint::Warehouses)?;
        Ok(self.state.warehouses.clone())
    }

    async fn movements(&mut self, warehouse: &WarehouseCode) -> Result<Vec<MovementEntry>, StorageError> {
        self.check(FailurePoint::Movements)?;
        Ok(rows_for(self.state.movements.as_ref(), warehouse, |m| &m.warehouse))
    }

    async fn purchase_lines(&mut self, warehouse: &WarehouseCode) -> Result<Vec<PurchaseLine>, StorageError> {
        self.check(FailurePoint::PurchaseLines)?;
        Ok(rows_for(self.state.purchase_lines.as_ref(), warehouse, |l| &l.warehouse))
    }

    async fn sales_lines(&mut self, warehouse: &WarehouseCode) -> Result<Vec<SalesLine>, StorageError> {
        self.check(FailurePoint::SalesLines)?;
        Ok(rows_for(self.state.sales_lines.as_ref(), warehouse, |l| &l.warehouse))
    }

    async fn zero_stock(&mut self) -> Result<u64, StorageError> {
        self.check(FailurePoint::ZeroStock)?;
        let Some(table) = self.working.as_mut() else {
            return Ok(0);
        };
        for record in table.values_mut() {
            record.zero();
        }
        Ok(table.len() as u64)
    }

    async fn create_stock_table(&mut self) -> Result<(), StorageError> {
        self.check(FailurePoint::CreateStockTable)?;
        self.working.get_or_insert_with(StockTable::new);
        Ok(())
    }

    async fn find_stock(&mut self, key: &StockKey) -> Result<Option<StockRecord>, StorageError> {
        self.check(FailurePoint::FindStock)?;
        Ok(self.working.as_ref().and_then(|t| t.get(key).cloned()))
    }

    async fn update_stock(&mut self, record: &StockRecord) -> Result<(), StorageError> {
        self.check(FailurePoint::UpdateStock)?;
        let existing = self
            .working
            .as_mut()
            .and_then(|t| t.get_mut(record.key()))
            .ok_or_else(|| StorageError::Query {
                operation: "update_stock",
                message: format!("no stock record for {}", record.key()),
            })?;
        existing.on_hand = record.on_hand;
        existing.pending_receipt = record.pending_receipt;
        existing.reserved = record.reserved;
        Ok(())
    }

    async fn insert_stock(&mut self, record: &StockRecord) -> Result<(), StorageError> {
        self.check(FailurePoint::InsertStock)?;
        let table = self.working.as_mut().ok_or_else(|| StorageError::Query {
            operation: "insert_stock",
            message: "stock table does not exist".to_string(),
        })?;
        if table.contains_key(record.key()) {
            return Err(StorageError::Query {
                operation: "insert_stock",
                message: format!("duplicate stock record for {}", record.key()),
            });
        }
        table.insert(record.key().clone(), record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let mut tx = *self;
        tx.check(FailurePoint::Commit)?;
        tx.state.stock = tx.working.take();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        // Working copy is discarded with the guard.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockrebuild_core::Reference;

    fn wh() -> WarehouseCode {
        WarehouseCode::new("W1").unwrap()
    }

    fn key(reference: &str) -> StockKey {
        StockKey::new(wh(), Reference::new(reference).unwrap())
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let storage = InMemoryStockStorage::new(StockDataset::with_all_sources(vec![wh()]));

        let mut tx = storage.begin().await.unwrap();
        tx.insert_stock(&StockRecord::new(key("A"))).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(storage.records().await.is_empty());
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let storage = InMemoryStockStorage::new(StockDataset::with_all_sources(vec![wh()]));

        {
            let mut tx = storage.begin().await.unwrap();
            tx.insert_stock(&StockRecord::new(key("A"))).await.unwrap();
        }

        assert!(storage.records().await.is_empty());
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let storage = InMemoryStockStorage::new(StockDataset::default());
        assert!(!storage.has_stock_table().await);

        let mut tx = storage.begin().await.unwrap();
        tx.create_stock_table().await.unwrap();
        tx.insert_stock(&StockRecord::new(key("A"))).await.unwrap();
        tx.commit().await.unwrap();

        assert!(storage.has_stock_table().await);
        assert!(storage.record(&key("A")).await.is_some());
    }

    #[tokio::test]
    async fn insert_without_stock_table_is_rejected() {
        let storage = InMemoryStockStorage::new(StockDataset::default());

        let mut tx = storage.begin().await.unwrap();
        let err = tx.insert_stock(&StockRecord::new(key("A"))).await.unwrap_err();
        assert_eq!(err.operation(), "insert_stock");
    }

    #[tokio::test]
    async fn rolled_back_table_creation_is_discarded() {
        let storage = InMemoryStockStorage::new(StockDataset::default());

        let mut tx = storage.begin().await.unwrap();
        tx.create_stock_table().await.unwrap();
        assert!(tx.sources().await.unwrap().stock);
        tx.rollback().await.unwrap();

        assert!(!storage.has_stock_table().await);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let storage = InMemoryStockStorage::new(StockDataset::with_all_sources(vec![wh()]));
        storage.put_record(StockRecord::new(key("A"))).await;

        let mut tx = storage.begin().await.unwrap();
        let err = tx.insert_stock(&StockRecord::new(key("A"))).await.unwrap_err();
        assert_eq!(err.operation(), "insert_stock");
    }

    #[tokio::test]
    async fn armed_failure_fires_once() {
        let storage = InMemoryStockStorage::new(StockDataset::with_all_sources(vec![wh()]));
        storage.fail_at(FailurePoint::Warehouses).await;

        let mut tx = storage.begin().await.unwrap();
        assert!(matches!(
            tx.warehouses().await,
            Err(StorageError::Injected { operation: "warehouses" })
        ));
        assert_eq!(tx.warehouses().await.unwrap(), vec![wh()]);
    }

    #[tokio::test]
    async fn sources_reflect_installed_tables() {
        let storage = InMemoryStockStorage::new(StockDataset {
            warehouses: vec![wh()],
            movements: Some(Vec::new()),
            ..StockDataset::default()
        });

        let mut tx = storage.begin().await.unwrap();
        let sources = tx.sources().await.unwrap();
        assert!(sources.movements);
        assert!(!sources.stock);
        assert!(!sources.purchase_lines);
        assert!(!sources.sales_lines);
    }
}
