use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockrebuild_core::{Reference, WarehouseCode};

use crate::record::StockKey;

/// Recomputed quantities for one (warehouse, reference) during a rebuild.
///
/// Transient: built fresh on every rebuild and translated 1:1 into a stock record upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAggregate {
    pub warehouse: WarehouseCode,
    pub reference: Reference,
    pub on_hand: f64,
    pub pending_receipt: f64,
    pub reserved: f64,
}

impl StockAggregate {
    /// Zero-initialised aggregate for a reference first seen in any source.
    pub fn empty(warehouse: WarehouseCode, reference: Reference) -> Self {
        Self {
            warehouse,
            reference,
            on_hand: 0.0,
            pending_receipt: 0.0,
            reserved: 0.0,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.warehouse.clone(), self.reference.clone())
    }
}

/// Per-warehouse merge map of stock aggregates, keyed by trimmed reference.
///
/// The ledger pass seeds it; the pending-receipt and reservation passes update existing
/// entries or insert zero-initialised ones. Iteration is in reference order.
#[derive(Debug, Clone, PartialEq)]
pub struct StockAggregates {
    warehouse: WarehouseCode,
    entries: BTreeMap<Reference, StockAggregate>,
    skipped: usize,
}

impl StockAggregates {
    pub fn new(warehouse: WarehouseCode) -> Self {
        Self {
            warehouse,
            entries: BTreeMap::new(),
            skipped: 0,
        }
    }

    pub fn warehouse(&self) -> &WarehouseCode {
        &self.warehouse
    }

    /// Entry for `reference`, inserting a zero-initialised aggregate if absent.
    pub fn entry_mut(&mut self, reference: Reference) -> &mut StockAggregate {
        let warehouse = &self.warehouse;
        self.entries
            .entry(reference)
            .or_insert_with_key(|r| StockAggregate::empty(warehouse.clone(), r.clone()))
    }

    pub fn get(&self, reference: &Reference) -> Option<&StockAggregate> {
        self.entries.get(reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StockAggregate> {
        self.entries.values()
    }

    /// Number of source rows ignored because their reference was blank.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub(crate) fn record_skipped(&mut self) {
        self.skipped += 1;
    }
}

impl IntoIterator for StockAggregates {
    type Item = StockAggregate;
    type IntoIter = std::collections::btree_map::IntoValues<Reference, StockAggregate>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
