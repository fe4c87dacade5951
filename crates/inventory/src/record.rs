use serde::{Deserialize, Serialize};

use stockrebuild_core::{Entity, Reference, WarehouseCode};

use crate::aggregate::StockAggregate;

/// Identity of a persisted stock record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub warehouse: WarehouseCode,
    pub reference: Reference,
}

impl StockKey {
    pub fn new(warehouse: WarehouseCode, reference: Reference) -> Self {
        Self { warehouse, reference }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.warehouse, self.reference)
    }
}

/// Persisted, queryable stock quantities for one (warehouse, reference).
///
/// `available` is owned elsewhere: a rebuild only ever zeroes it, and new records start
/// at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    key: StockKey,
    pub on_hand: f64,
    pub pending_receipt: f64,
    pub reserved: f64,
    pub available: f64,
}

impl StockRecord {
    pub fn new(key: StockKey) -> Self {
        Self {
            key,
            on_hand: 0.0,
            pending_receipt: 0.0,
            reserved: 0.0,
            available: 0.0,
        }
    }

    /// Record to insert for an aggregate with no persisted counterpart.
    pub fn from_aggregate(aggregate: &StockAggregate) -> Self {
        let mut record = Self::new(aggregate.key());
        record.apply_aggregate(aggregate);
        record
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn warehouse(&self) -> &WarehouseCode {
        &self.key.warehouse
    }

    pub fn reference(&self) -> &Reference {
        &self.key.reference
    }

    /// Overwrite the recomputed quantities; `available` is left as is.
    pub fn apply_aggregate(&mut self, aggregate: &StockAggregate) {
        self.on_hand = aggregate.on_hand;
        self.pending_receipt = aggregate.pending_receipt;
        self.reserved = aggregate.reserved;
    }

    /// Reset every quantity, as the clear pass does before recomputation.
    pub fn zero(&mut self) {
        self.on_hand = 0.0;
        self.pending_receipt = 0.0;
        self.reserved = 0.0;
        self.available = 0.0;
    }

    pub fn is_zero(&self) -> bool {
        self.on_hand == 0.0 && self.pending_receipt == 0.0 && self.reserved == 0.0 && self.available == 0.0
    }
}

impl Entity for StockRecord {
    type Id = StockKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StockKey {
        StockKey::new(WarehouseCode::new("W1").unwrap(), Reference::new("REF1").unwrap())
    }

    fn aggregate() -> StockAggregate {
        StockAggregate {
            warehouse: WarehouseCode::new("W1").unwrap(),
            reference: Reference::new("REF1").unwrap(),
            on_hand: 3.0,
            pending_receipt: 7.0,
            reserved: 1.0,
        }
    }

    #[test]
    fn apply_aggregate_leaves_available_alone() {
        let mut record = StockRecord::new(key());
        record.available = 12.0;

        record.apply_aggregate(&aggregate());

        assert_eq!(record.on_hand, 3.0);
        assert_eq!(record.pending_receipt, 7.0);
        assert_eq!(record.reserved, 1.0);
        assert_eq!(record.available, 12.0);
    }

    #[test]
    fn new_record_from_aggregate_has_zero_available() {
        let record = StockRecord::from_aggregate(&aggregate());
        assert_eq!(record.id(), &key());
        assert_eq!(record.available, 0.0);
        assert_eq!(record.on_hand, 3.0);
    }

    #[test]
    fn zero_resets_every_quantity() {
        let mut record = StockRecord::from_aggregate(&aggregate());
        record.available = 2.0;
        record.zero();
        assert!(record.is_zero());
    }
}
