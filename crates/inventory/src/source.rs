//! Source rows consumed by a rebuild.
//!
//! These are read-only inputs owned by other subsystems (stock movements, purchase
//! orders, sales orders). References are carried raw, exactly as stored; trimming
//! happens when they become aggregation keys.

use serde::{Deserialize, Serialize};

use stockrebuild_core::{DomainError, DomainResult, WarehouseCode};

/// How an order line affects stock.
///
/// Serialized as its numeric code, the marker value stored on order lines.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum StockAffect {
    /// Counts toward the reserved quantity while unserved.
    Reserve,
    /// Takes stock out on delivery; never reserves.
    Decrease,
    /// Does not touch stock (services, text lines).
    None,
    /// Puts stock in on receipt; never pending.
    Increase,
    /// Counts toward the pending-receipt quantity while unserved.
    PendingReceipt,
}

impl StockAffect {
    pub fn code(self) -> i32 {
        match self {
            StockAffect::Reserve => -2,
            StockAffect::Decrease => -1,
            StockAffect::None => 0,
            StockAffect::Increase => 1,
            StockAffect::PendingReceipt => 2,
        }
    }

    pub fn from_code(code: i32) -> DomainResult<Self> {
        match code {
            -2 => Ok(StockAffect::Reserve),
            -1 => Ok(StockAffect::Decrease),
            0 => Ok(StockAffect::None),
            1 => Ok(StockAffect::Increase),
            2 => Ok(StockAffect::PendingReceipt),
            other => Err(DomainError::validation(format!("unknown stock-affect code {other}"))),
        }
    }
}

impl TryFrom<i32> for StockAffect {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_code(value)
    }
}

impl From<StockAffect> for i32 {
    fn from(value: StockAffect) -> Self {
        value.code()
    }
}

/// One row of the stock movement ledger.
///
/// Storage adapters may pre-sum deltas per raw reference and hand over one entry per
/// group; the aggregated result is the same.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementEntry {
    pub warehouse: WarehouseCode,
    pub reference: String,
    pub quantity: f64,
}

impl MovementEntry {
    pub fn new(warehouse: WarehouseCode, reference: impl Into<String>, quantity: f64) -> Self {
        Self {
            warehouse,
            reference: reference.into(),
            quantity,
        }
    }
}

/// Ordered vs. served quantity of an order line.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineQuantities {
    pub ordered: f64,
    pub served: f64,
}

impl LineQuantities {
    pub fn new(ordered: f64, served: f64) -> Self {
        Self { ordered, served }
    }

    /// Quantity still outstanding on the line.
    ///
    /// Fully or over-served lines yield `0.0`, never a negative amount.
    pub fn shortfall(&self) -> f64 {
        if self.ordered > self.served {
            self.ordered - self.served
        } else {
            0.0
        }
    }

    pub fn is_open(&self) -> bool {
        self.ordered > self.served
    }
}

/// A purchase order line, resolved to the warehouse of its parent order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub warehouse: WarehouseCode,
    pub reference: String,
    pub quantities: LineQuantities,
    pub stock_affect: StockAffect,
}

/// A sales order line, resolved to the warehouse of its parent order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesLine {
    pub warehouse: WarehouseCode,
    pub reference: String,
    pub quantities: LineQuantities,
    pub stock_affect: StockAffect,
}

impl PurchaseLine {
    pub fn new(
        warehouse: WarehouseCode,
        reference: impl Into<String>,
        ordered: f64,
        served: f64,
        stock_affect: StockAffect,
    ) -> Self {
        Self {
            warehouse,
            reference: reference.into(),
            quantities: LineQuantities::new(ordered, served),
            stock_affect,
        }
    }

    /// Whether this line counts toward pending receipts at all.
    pub fn is_pending_receipt(&self) -> bool {
        self.stock_affect == StockAffect::PendingReceipt
    }
}

impl SalesLine {
    pub fn new(
        warehouse: WarehouseCode,
        reference: impl Into<String>,
        ordered: f64,
        served: f64,
        stock_affect: StockAffect,
    ) -> Self {
        Self {
            warehouse,
            reference: reference.into(),
            quantities: LineQuantities::new(ordered, served),
            stock_affect,
        }
    }

    /// Whether this line counts toward reservations at all.
    pub fn is_reservation(&self) -> bool {
        self.stock_affect == StockAffect::Reserve
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortfall_never_goes_negative() {
        assert_eq!(LineQuantities::new(10.0, 3.0).shortfall(), 7.0);
        assert_eq!(LineQuantities::new(8.0, 8.0).shortfall(), 0.0);
        assert_eq!(LineQuantities::new(5.0, 9.0).shortfall(), 0.0);
        assert!(!LineQuantities::new(8.0, 8.0).is_open());
    }

    #[test]
    fn stock_affect_codes_round_trip() {
        for code in -2..=2 {
            assert_eq!(StockAffect::from_code(code).unwrap().code(), code);
        }
        assert!(StockAffect::from_code(3).is_err());
    }

    #[test]
    fn stock_affect_serializes_as_code() {
        let json = serde_json::to_string(&StockAffect::Reserve).unwrap();
        assert_eq!(json, "-2");
        let parsed: StockAffect = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, StockAffect::PendingReceipt);
        assert!(serde_json::from_str::<StockAffect>("7").is_err());
    }
}
