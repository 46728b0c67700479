use crate::types::{AggregateRow, AmountKind, GroupKey, Record, UNKNOWN_LABEL};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Per-key sums produced by [`aggregate`]. Iteration order is unspecified;
/// use [`Aggregation::sorted_by`] for a ranking.
#[derive(Debug, Clone)]
pub struct Aggregation {
    rows: HashMap<String, AggregateRow>,
}

/// Group `records` by `key` and sum the amounts of the listed kinds.
///
/// Records without a value for `key` are collected under the unknown label,
/// so every summed amount ends up in exactly one row.
pub fn aggregate(records: &[Record], key: GroupKey, kinds: &[AmountKind]) -> Aggregation {
    let mut rows: HashMap<String, AggregateRow> = HashMap::new();
    for r in records.iter().filter(|r| kinds.contains(&r.kind)) {
        let k = r.key(key).unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        rows.entry(k.clone())
            .or_insert_with(|| AggregateRow::new(k))
            .add(r.kind, r.amount);
    }
    Aggregation { rows }
}

impl Aggregation {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &AggregateRow> {
        self.rows.values()
    }

    /// Rows by `kind` amount, largest first; equal amounts by key.
    pub fn sorted_by(&self, kind: AmountKind) -> Vec<&AggregateRow> {
        let mut v: Vec<&AggregateRow> = self.rows.values().collect();
        v.sort_by(|a, b| {
            b.amount(kind)
                .partial_cmp(&a.amount(kind))
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        v
    }

    /// The `kind` amount of every row, in no particular order.
    pub fn amounts(&self, kind: AmountKind) -> Vec<f64> {
        self.rows.values().map(|r| r.amount(kind)).collect()
    }

    /// Column totals as a single row keyed `"total"`.
    pub fn totals(&self) -> AggregateRow {
        let mut t = AggregateRow::new("total");
        for r in self.rows.values() {
            t.credit += r.credit;
            t.contract += r.contract;
            t.payment += r.payment;
            t.contract_count += r.contract_count;
            t.payment_count += r.payment_count;
        }
        t
    }
}

/// Number of distinct `of` values per `key` value, e.g. universities per
/// subject. Records lacking either attribute are skipped.
pub fn distinct_count(records: &[Record], key: GroupKey, of: GroupKey) -> HashMap<String, usize> {
    let mut sets: HashMap<String, HashSet<String>> = HashMap::new();
    for r in records {
        if let (Some(k), Some(v)) = (r.key(key), r.key(of)) {
            sets.entry(k).or_default().insert(v);
        }
    }
    sets.into_iter().map(|(k, s)| (k, s.len())).collect()
}

/// Number of `kind` records per `(row, col)` pair, e.g. contracts per
/// subject × university.
pub fn cross_count(
    records: &[Record],
    kind: AmountKind,
    row: GroupKey,
    col: GroupKey,
) -> HashMap<(String, String), usize> {
    let mut counts = HashMap::new();
    for r in records.iter().filter(|r| r.kind == kind) {
        if let (Some(a), Some(b)) = (r.key(row), r.key(col)) {
            *counts.entry((a, b)).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ratio;

    const ALL: &[AmountKind] = &[AmountKind::Credit, AmountKind::Contract, AmountKind::Payment];

    fn row<'a>(agg: &'a Aggregation, key: &str) -> &'a AggregateRow {
        agg.rows().find(|r| r.key == key).unwrap()
    }

    fn scenario() -> Vec<Record> {
        vec![
            Record::new(AmountKind::Credit, "A", 1000.0),
            Record::new(AmountKind::Contract, "A", 300.0),
            Record::new(AmountKind::Payment, "A", 150.0),
            Record::new(AmountKind::Credit, "B", 500.0),
            Record::new(AmountKind::Contract, "B", 0.0),
            Record::new(AmountKind::Payment, "B", 0.0),
        ]
    }

    #[test]
    fn test_end_to_end_scenario() {
        let agg = aggregate(&scenario(), GroupKey::Subject, ALL);
        let a = row(&agg, "A");
        assert_eq!((a.credit, a.contract, a.payment), (1000.0, 300.0, 150.0));
        assert_eq!(a.contract_pct(), Ratio(Some(30.0)));
        assert_eq!(a.payment_pct(), Ratio(Some(15.0)));
        assert_eq!(a.payment_from_contract_pct(), Ratio(Some(50.0)));

        let b = row(&agg, "B");
        assert_eq!((b.credit, b.contract, b.payment), (500.0, 0.0, 0.0));
        assert_eq!(b.contract_pct(), Ratio(Some(0.0)));
        assert_eq!(b.payment_pct(), Ratio(Some(0.0)));
        assert!(b.payment_from_contract_pct().is_undefined());

        let t = agg.totals();
        assert_eq!(t.credit, 1500.0);
        assert_eq!(t.contract, 300.0);
        assert_eq!(t.contract_pct(), Ratio(Some(20.0)));
    }

    #[test]
    fn test_zero_credit_with_contract_is_sentinel() {
        let records = vec![
            Record::new(AmountKind::Credit, "C", 0.0),
            Record::new(AmountKind::Contract, "C", 50.0),
        ];
        let agg = aggregate(&records, GroupKey::Subject, ALL);
        let c = row(&agg, "C");
        assert!(c.contract_pct().is_undefined());
        assert_eq!(c.payment_pct(), Ratio(Some(0.0)));
    }

    #[test]
    fn test_conservation_under_grouping() {
        let records: Vec<Record> = (0..40)
            .map(|i| {
                let kind = ALL[i % 3];
                let uni = (i % 4 != 0).then(|| format!("دانشگاه {}", i % 5));
                Record::new(kind, format!("S{}", i % 7), i as f64 * 1.5).with_university(uni)
            })
            .collect();
        for key in [GroupKey::Subject, GroupKey::University, GroupKey::Province] {
            let agg = aggregate(&records, key, ALL);
            for kind in ALL {
                let input: f64 = records.iter().filter(|r| r.kind == *kind).map(|r| r.amount).sum();
                let grouped: f64 = agg.amounts(*kind).iter().sum();
                assert!((input - grouped).abs() < 1e-9, "{:?} {:?}", key, kind);
            }
        }
    }

    #[test]
    fn test_only_listed_kinds_are_summed() {
        let agg = aggregate(&scenario(), GroupKey::Subject, &[AmountKind::Contract]);
        let a = row(&agg, "A");
        assert_eq!(a.credit, 0.0);
        assert_eq!(a.contract, 300.0);
        assert_eq!(a.contract_count, 1);
    }

    #[test]
    fn test_sorted_by_desc_with_key_tiebreak() {
        let records = vec![
            Record::new(AmountKind::Contract, "b", 10.0),
            Record::new(AmountKind::Contract, "a", 10.0),
            Record::new(AmountKind::Contract, "c", 30.0),
        ];
        let agg = aggregate(&records, GroupKey::Subject, &[AmountKind::Contract]);
        let keys: Vec<&str> = agg
            .sorted_by(AmountKind::Contract)
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_distinct_and_cross_counts() {
        let records = vec![
            Record::new(AmountKind::Contract, "A", 1.0).with_university(Some("U1".into())),
            Record::new(AmountKind::Contract, "A", 1.0).with_university(Some("U1".into())),
            Record::new(AmountKind::Contract, "A", 1.0).with_university(Some("U2".into())),
            Record::new(AmountKind::Contract, "B", 1.0),
        ];
        let d = distinct_count(&records, GroupKey::Subject, GroupKey::University);
        assert_eq!(d.get("A"), Some(&2));
        assert_eq!(d.get("B"), None);
        let x = cross_count(&records, AmountKind::Contract, GroupKey::Subject, GroupKey::University);
        assert_eq!(x.get(&("A".to_string(), "U1".to_string())), Some(&2));
    }
}
