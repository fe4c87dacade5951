//! Inventory domain module (stock reconciliation).
//!
//! This crate contains the rules for recomputing stock quantities from the movement
//! ledger and open order lines, implemented purely as deterministic domain logic
//! (no IO, no storage, no transactions).

pub mod aggregate;
pub mod aggregators;
pub mod record;
pub mod source;

pub use aggregate::{StockAggregate, StockAggregates};
pub use aggregators::{add_pending_receipts, add_reservations, aggregate_movements, merge_warehouse};
pub use record::{StockKey, StockRecord};
pub use source::{LineQuantities, MovementEntry, PurchaseLine, SalesLine, StockAffect};
