//! Aggregation passes that build the per-warehouse merge map.
//!
//! Order matters only for seeding: the ledger pass creates the map, and the order-line
//! passes add to it. Every pass keys by the trimmed reference, so padding in any source
//! never splits one product into two entries.

use stockrebuild_core::{Reference, WarehouseCode};

use crate::aggregate::StockAggregates;
use crate::source::{MovementEntry, PurchaseLine, SalesLine};

/// Sum movement deltas per trimmed reference for one warehouse.
///
/// Rows from other warehouses are ignored. Rows whose trimmed references collide are
/// summed into the same entry.
pub fn aggregate_movements(warehouse: &WarehouseCode, movements: &[MovementEntry]) -> StockAggregates {
    let mut aggregates = StockAggregates::new(warehouse.clone());

    for movement in movements.iter().filter(|m| &m.warehouse == warehouse) {
        match Reference::new(&movement.reference) {
            Ok(reference) => aggregates.entry_mut(reference).on_hand += movement.quantity,
            Err(_) => aggregates.record_skipped(),
        }
    }

    aggregates
}

/// Add the unserved quantity of open, pending-receipt purchase lines.
///
/// Lines with `ordered <= served` contribute nothing and do not create entries.
pub fn add_pending_receipts(aggregates: &mut StockAggregates, lines: &[PurchaseLine]) {
    let warehouse = aggregates.warehouse().clone();

    for line in lines
        .iter()
        .filter(|l| l.warehouse == warehouse && l.is_pending_receipt() && l.quantities.is_open())
    {
        match Reference::new(&line.reference) {
            Ok(reference) => {
                aggregates.entry_mut(reference).pending_receipt += line.quantities.shortfall()
            }
            Err(_) => aggregates.record_skipped(),
        }
    }
}

/// Add the unserved quantity of open, reserving sales lines.
///
/// Same zero-floor policy as [`add_pending_receipts`].
pub fn add_reservations(aggregates: &mut StockAggregates, lines: &[SalesLine]) {
    let warehouse = aggregates.warehouse().clone();

    for line in lines
        .iter()
        .filter(|l| l.warehouse == warehouse && l.is_reservation() && l.quantities.is_open())
    {
        match Reference::new(&line.reference) {
            Ok(reference) => aggregates.entry_mut(reference).reserved += line.quantities.shortfall(),
            Err(_) => aggregates.record_skipped(),
        }
    }
}

/// Run all three passes for one warehouse.
///
/// `None` means the source does not exist in this deployment and contributes nothing.
pub fn merge_warehouse(
    warehouse: &WarehouseCode,
    movements: Option<&[MovementEntry]>,
    purchase_lines: Option<&[PurchaseLine]>,
    sales_lines: Option<&[SalesLine]>,
) -> StockAggregates {
    let mut aggregates = aggregate_movements(warehouse, movements.unwrap_or_default());

    if let Some(lines) = purchase_lines {
        add_pending_receipts(&mut aggregates, lines);
    }
    if let Some(lines) = sales_lines {
        add_reservations(&mut aggregates, lines);
    }

    aggregates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StockAffect;
    use proptest::prelude::*;

    fn wh(code: &str) -> WarehouseCode {
        WarehouseCode::new(code).unwrap()
    }

    fn r(s: &str) -> Reference {
        Reference::new(s).unwrap()
    }

    #[test]
    fn movements_are_summed_per_reference() {
        let w1 = wh("W1");
        let movements = vec![
            MovementEntry::new(w1.clone(), "REF1", 5.0),
            MovementEntry::new(w1.clone(), "REF1", -2.0),
            MovementEntry::new(wh("W2"), "REF1", 100.0),
        ];

        let aggs = aggregate_movements(&w1, &movements);

        assert_eq!(aggs.len(), 1);
        let agg = aggs.get(&r("REF1")).unwrap();
        assert_eq!(agg.on_hand, 3.0);
        assert_eq!(agg.pending_receipt, 0.0);
        assert_eq!(agg.reserved, 0.0);
    }

    #[test]
    fn padded_movement_references_collapse() {
        let w1 = wh("W1");
        let movements = vec![
            MovementEntry::new(w1.clone(), "ABC1  ", 1.5),
            MovementEntry::new(w1.clone(), "ABC1", 2.5),
        ];

        let aggs = aggregate_movements(&w1, &movements);

        assert_eq!(aggs.len(), 1);
        assert_eq!(aggs.get(&r("ABC1")).unwrap().on_hand, 4.0);
    }

    #[test]
    fn only_erp_padding_is_trimmed_from_keys() {
        let w1 = wh("W1");
        let movements = vec![
            MovementEntry::new(w1.clone(), "REF\0", 1.0),
            MovementEntry::new(w1.clone(), "REF", 2.0),
            MovementEntry::new(w1.clone(), "REF\u{a0}", 4.0),
        ];

        let aggs = aggregate_movements(&w1, &movements);

        assert_eq!(aggs.len(), 2);
        assert_eq!(aggs.get(&r("REF")).unwrap().on_hand, 3.0);
        assert_eq!(aggs.get(&r("REF\u{a0}")).unwrap().on_hand, 4.0);
    }

    #[test]
    fn blank_references_are_skipped() {
        let w1 = wh("W1");
        let movements = vec![MovementEntry::new(w1.clone(), "   ", 3.0)];
        let lines = vec![PurchaseLine::new(w1.clone(), "", 4.0, 0.0, StockAffect::PendingReceipt)];

        let mut aggs = aggregate_movements(&w1, &movements);
        add_pending_receipts(&mut aggs, &lines);

        assert!(aggs.is_empty());
        assert_eq!(aggs.skipped(), 2);
    }

    #[test]
    fn pending_receipt_uses_shortfall() {
        let w1 = wh("W1");
        let lines = vec![
            PurchaseLine::new(w1.clone(), "REF2", 10.0, 3.0, StockAffect::PendingReceipt),
            PurchaseLine::new(w1.clone(), "REF2", 4.0, 1.0, StockAffect::PendingReceipt),
        ];

        let mut aggs = StockAggregates::new(w1);
        add_pending_receipts(&mut aggs, &lines);

        let agg = aggs.get(&r("REF2")).unwrap();
        assert_eq!(agg.pending_receipt, 10.0);
        assert_eq!(agg.on_hand, 0.0);
    }

    #[test]
    fn served_lines_contribute_nothing() {
        let w1 = wh("W1");
        let purchases = vec![
            PurchaseLine::new(w1.clone(), "P1", 5.0, 5.0, StockAffect::PendingReceipt),
            PurchaseLine::new(w1.clone(), "P2", 5.0, 9.0, StockAffect::PendingReceipt),
        ];
        let sales = vec![SalesLine::new(w1.clone(), "REF3", 8.0, 8.0, StockAffect::Reserve)];

        let aggs = merge_warehouse(&w1, None, Some(purchases.as_slice()), Some(sales.as_slice()));

        assert!(aggs.is_empty());
    }

    #[test]
    fn served_lines_keep_existing_entries_untouched() {
        let w1 = wh("W1");
        let movements = vec![MovementEntry::new(w1.clone(), "REF3", 2.0)];
        let sales = vec![SalesLine::new(w1.clone(), "REF3", 8.0, 8.0, StockAffect::Reserve)];

        let aggs = merge_warehouse(&w1, Some(movements.as_slice()), None, Some(sales.as_slice()));

        let agg = aggs.get(&r("REF3")).unwrap();
        assert_eq!(agg.on_hand, 2.0);
        assert_eq!(agg.reserved, 0.0);
    }

    #[test]
    fn non_participating_flags_are_ignored() {
        let w1 = wh("W1");
        let purchases = vec![
            PurchaseLine::new(w1.clone(), "A", 5.0, 0.0, StockAffect::Increase),
            PurchaseLine::new(w1.clone(), "A", 5.0, 0.0, StockAffect::None),
            PurchaseLine::new(w1.clone(), "A", 5.0, 0.0, StockAffect::Reserve),
        ];
        let sales = vec![
            SalesLine::new(w1.clone(), "B", 5.0, 0.0, StockAffect::Decrease),
            SalesLine::new(w1.clone(), "B", 5.0, 0.0, StockAffect::PendingReceipt),
        ];

        let aggs = merge_warehouse(&w1, None, Some(purchases.as_slice()), Some(sales.as_slice()));

        assert!(aggs.is_empty());
    }

    #[test]
    fn lines_from_other_warehouses_are_ignored() {
        let w1 = wh("W1");
        let sales = vec![SalesLine::new(wh("W2"), "REF", 3.0, 0.0, StockAffect::Reserve)];

        let mut aggs = StockAggregates::new(w1);
        add_reservations(&mut aggs, &sales);

        assert!(aggs.is_empty());
    }

    #[test]
    fn all_sources_merge_into_one_entry_per_reference() {
        let w1 = wh("W1");
        let movements = vec![MovementEntry::new(w1.clone(), " REF4", 6.0)];
        let purchases = vec![PurchaseLine::new(w1.clone(), "REF4 ", 10.0, 4.0, StockAffect::PendingReceipt)];
        let sales = vec![
            SalesLine::new(w1.clone(), "\tREF4", 3.0, 1.0, StockAffect::Reserve),
            SalesLine::new(w1.clone(), "REF5", 1.0, 0.0, StockAffect::Reserve),
        ];

        let aggs = merge_warehouse(&w1, Some(movements.as_slice()), Some(purchases.as_slice()), Some(sales.as_slice()));

        assert_eq!(aggs.len(), 2);
        let ref4 = aggs.get(&r("REF4")).unwrap();
        assert_eq!((ref4.on_hand, ref4.pending_receipt, ref4.reserved), (6.0, 6.0, 2.0));
        let ref5 = aggs.get(&r("REF5")).unwrap();
        assert_eq!((ref5.on_hand, ref5.pending_receipt, ref5.reserved), (0.0, 0.0, 1.0));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: on-hand equals the plain sum of the warehouse's deltas for each
        /// reference, regardless of padding.
        #[test]
        fn on_hand_is_sum_of_deltas(
            rows in prop::collection::vec((0usize..4, 0usize..3, -1_000i32..1_000i32), 0..40)
        ) {
            let w1 = wh("W1");
            let names = ["A", "B", "C", "D"];
            let pads = ["", " ", "  \t"];

            let movements: Vec<_> = rows
                .iter()
                .map(|(n, p, q)| MovementEntry::new(w1.clone(), format!("{}{}{}", pads[*p], names[*n], pads[*p]), *q as f64))
                .collect();

            let aggs = aggregate_movements(&w1, &movements);

            for (i, name) in names.iter().enumerate() {
                let expected: i64 = rows.iter().filter(|(n, _, _)| *n == i).map(|(_, _, q)| *q as i64).sum();
                let present = rows.iter().any(|(n, _, _)| *n == i);
                match aggs.get(&r(name)) {
                    Some(agg) => {
                        prop_assert!(present);
                        prop_assert_eq!(agg.on_hand, expected as f64);
                    }
                    None => prop_assert!(!present),
                }
            }
        }

        /// Property: pending receipts are never negative, whatever the served quantity.
        #[test]
        fn pending_receipt_is_never_negative(
            lines in prop::collection::vec((0u32..100, 0u32..100), 0..20)
        ) {
            let w1 = wh("W1");
            let purchase_lines: Vec<_> = lines
                .iter()
                .map(|(o, s)| PurchaseLine::new(w1.clone(), "REF", *o as f64, *s as f64, StockAffect::PendingReceipt))
                .collect();

            let mut aggs = StockAggregates::new(w1);
            add_pending_receipts(&mut aggs, &purchase_lines);

            let expected: u32 = lines.iter().map(|(o, s)| o.saturating_sub(*s)).sum();
            let got = aggs.get(&r("REF")).map(|a| a.pending_receipt).unwrap_or(0.0);
            prop_assert!(got >= 0.0);
            prop_assert_eq!(got, expected as f64);
        }
    }
}
