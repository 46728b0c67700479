//! Statistics tables of the three report chapters.

use crate::aggregate::{aggregate, distinct_count, Aggregation};
use crate::concentration::ParetoSummary;
use crate::config::ReportConfig;
use crate::province::Province;
use crate::types::{AmountKind, GroupKey, ProvinceRow, Ratio, Record, StatRow, SummaryRow};
use crate::util::{average, median, std_dev};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::warn;

const ALL_KINDS: &[AmountKind] = &[AmountKind::Credit, AmountKind::Contract, AmountKind::Payment];

/// Headline figures of chapter 1, amounts in billion rials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub total_credit: f64,
    pub total_contract: f64,
    pub total_payment: f64,
    pub deposited_to_fund: Option<f64>,
    pub deposited_pct: Ratio,
    pub contract_pct: Ratio,
    pub payment_pct: Ratio,
    pub payment_from_contract_pct: Ratio,
    /// Subjects whose credit exceeds the configured minimum.
    pub subjects: usize,
    pub credit_mean: f64,
    pub credit_median: f64,
    pub credit_std_dev: f64,
    /// `None` when every credit is zero or no subject passes the minimum.
    pub credit_concentration: Option<ParetoSummary>,
}

/// Credit of each subject above `min_credit` (million rials), in the order
/// given by the aggregation.
pub fn credits_per_subject(records: &[Record], min_credit: f64) -> Vec<f64> {
    aggregate(records, GroupKey::Subject, &[AmountKind::Credit])
        .amounts(AmountKind::Credit)
        .into_iter()
        .filter(|c| *c > min_credit)
        .collect()
}

fn pareto_or_warn(what: &str, amounts: &[f64]) -> Option<ParetoSummary> {
    match ParetoSummary::from_amounts(amounts) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("{} concentration undefined: {}", what, e);
            None
        }
    }
}

pub fn kpis(records: &[Record], report: &ReportConfig) -> Kpis {
    let totals = aggregate(records, GroupKey::Subject, ALL_KINDS).totals();
    let div = report.unit_divisor;
    let credits: Vec<f64> = credits_per_subject(records, report.min_credit)
        .into_iter()
        .map(|c| c / div)
        .collect();

    Kpis {
        total_credit: totals.credit / div,
        total_contract: totals.contract / div,
        total_payment: totals.payment / div,
        deposited_to_fund: report.deposited_to_fund.map(|d| d / div),
        deposited_pct: report
            .deposited_to_fund
            .map(|d| Ratio::percent(d, totals.credit))
            .unwrap_or(Ratio::UNDEFINED),
        contract_pct: totals.contract_pct(),
        payment_pct: totals.payment_pct(),
        payment_from_contract_pct: totals.payment_from_contract_pct(),
        subjects: credits.len(),
        credit_mean: average(&credits),
        credit_median: median(credits.clone()),
        credit_std_dev: std_dev(&credits),
        credit_concentration: pareto_or_warn("credit", &credits),
    }
}

/// Chapter 1: credits, deposits, contracts and payments overall.
pub fn chapter1_statistics(k: &Kpis, min_credit: f64) -> Vec<StatRow> {
    let conc = k.credit_concentration.as_ref();
    let mut rows = vec![StatRow::new("اعتبار کل (میلیارد ریال)", k.total_credit)];
    if let Some(d) = k.deposited_to_fund {
        rows.push(StatRow::new("واریز به صندوق عتف (میلیارد ریال)", d));
        rows.push(StatRow::new("درصد واریز به صندوق", k.deposited_pct));
    }
    rows.extend([
        StatRow::new("مجموع قراردادها (میلیارد ریال)", k.total_contract),
        StatRow::new("درصد قراردادها از اعتبار", k.contract_pct),
        StatRow::new("مجموع پرداخت‌ها (میلیارد ریال)", k.total_payment),
        StatRow::new("درصد پرداخت‌ها از اعتبار", k.payment_pct),
        StatRow::new("درصد پرداخت از قرارداد", k.payment_from_contract_pct),
        StatRow::new(
            format!("تعداد مشمولین (بالای {} میلیون ریال)", min_credit),
            k.subjects,
        ),
        StatRow::new("میانگین اعتبار (میلیارد ریال)", k.credit_mean),
        StatRow::new("میانه اعتبار (میلیارد ریال)", k.credit_median),
        StatRow::new("انحراف معیار اعتبار", k.credit_std_dev),
        StatRow::new("10 مشمول برتر - درصد از کل", opt(conc.map(|c| c.top10_share))),
        StatRow::new("20% مشمولین برتر - درصد از کل", opt(conc.map(|c| c.top20pct_share))),
        StatRow::new("ضریب جینی", opt(conc.map(|c| c.gini))),
    ]);
    rows
}

fn opt(v: Option<f64>) -> Ratio {
    Ratio(v)
}

/// Chapter 2: per-subject realisation of credits.
pub fn chapter2_statistics(records: &[Record], divisor: f64) -> Vec<StatRow> {
    let by_subject = aggregate(records, GroupKey::Subject, ALL_KINDS);
    let departments: HashSet<String> = records.iter().filter_map(|r| r.department.clone()).collect();
    let with_contract = by_subject.rows().filter(|r| r.contract > 0.0).count();
    let realised: Vec<f64> = by_subject
        .rows()
        .filter(|r| r.credit > 0.0)
        .filter_map(|r| r.contract_pct().value())
        .collect();
    let contracts = by_subject.amounts(AmountKind::Contract);
    let conc = pareto_or_warn("subject contract", &contracts);
    let unis = distinct_count(
        &records
            .iter()
            .filter(|r| r.kind == AmountKind::Contract)
            .cloned()
            .collect::<Vec<_>>(),
        GroupKey::Subject,
        GroupKey::University,
    );
    let unis_per_subject: Vec<f64> = unis.values().map(|&n| n as f64).collect();

    vec![
        StatRow::new("تعداد مشمولین", by_subject.len()),
        StatRow::new("تعداد دستگاه‌های اجرایی", departments.len()),
        StatRow::new("مشمولین دارای قرارداد", with_contract),
        StatRow::new("مشمولین بدون قرارداد", by_subject.len() - with_contract),
        StatRow::new("مجموع قراردادها (میلیارد ریال)", by_subject.totals().contract / divisor),
        StatRow::new("میانگین درصد تحقق قرارداد", average(&realised)),
        StatRow::new("میانه درصد تحقق قرارداد", median(realised.clone())),
        StatRow::new(
            "سهم 10 مشمول برتر از قراردادها (%)",
            opt(conc.as_ref().map(|c| c.top10_share)),
        ),
        StatRow::new("ضریب جینی قراردادها", opt(conc.as_ref().map(|c| c.gini))),
        StatRow::new("میانگین تعداد دانشگاه هر مشمول", average(&unis_per_subject)),
    ]
}

/// Chapter 3: universities and provinces.
pub fn chapter3_statistics(records: &[Record], divisor: f64) -> Vec<StatRow> {
    let by_uni = aggregate(
        &records
            .iter()
            .filter(|r| r.university.is_some())
            .cloned()
            .collect::<Vec<_>>(),
        GroupKey::University,
        &[AmountKind::Contract, AmountKind::Payment],
    );
    let contracts: Vec<f64> = by_uni.amounts(AmountKind::Contract);
    let provinces: HashSet<Province> = records
        .iter()
        .filter(|r| r.province.is_known())
        .map(|r| r.province)
        .collect();
    let conc = pareto_or_warn("university contract", &contracts);
    let totals = by_uni.totals();

    vec![
        StatRow::new("تعداد کل دانشگاه‌ها", by_uni.len()),
        StatRow::new(
            "دانشگاه‌های دارای قرارداد",
            by_uni.rows().filter(|r| r.contract > 0.0).count(),
        ),
        StatRow::new(
            "دانشگاه‌های دارای پرداخت",
            by_uni.rows().filter(|r| r.payment > 0.0).count(),
        ),
        StatRow::new("تعداد استان‌ها", provinces.len()),
        StatRow::new("مجموع قراردادها (میلیارد)", totals.contract / divisor),
        StatRow::new("مجموع پرداخت‌ها (میلیارد)", totals.payment / divisor),
        StatRow::new("میانگین قرارداد هر دانشگاه (میلیارد)", average(&contracts) / divisor),
        StatRow::new("میانه قرارداد (میلیارد)", median(contracts.clone()) / divisor),
        StatRow::new(
            "سهم 10 دانشگاه برتر از کل (%)",
            opt(conc.as_ref().map(|c| c.top10_share)),
        ),
        StatRow::new("ضریب جینی قراردادها", opt(conc.map(|c| c.gini))),
    ]
}

/// Participation counts quoted in the analysis prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub subjects: usize,
    pub subjects_with_contracts: usize,
    pub departments: usize,
    pub universities_with_contracts: usize,
    pub universities_with_payments: usize,
    pub contract_count: usize,
}

pub fn overview(records: &[Record]) -> Overview {
    let by_subject = aggregate(records, GroupKey::Subject, ALL_KINDS);
    let universities = |kind: AmountKind| {
        records
            .iter()
            .filter(|r| r.kind == kind)
            .filter_map(|r| r.university.as_deref())
            .collect::<HashSet<_>>()
            .len()
    };
    Overview {
        subjects: by_subject.len(),
        subjects_with_contracts: by_subject.rows().filter(|r| r.contract > 0.0).count(),
        departments: records
            .iter()
            .filter_map(|r| r.department.as_deref())
            .collect::<HashSet<_>>()
            .len(),
        universities_with_contracts: universities(AmountKind::Contract),
        universities_with_payments: universities(AmountKind::Payment),
        contract_count: by_subject.totals().contract_count,
    }
}

/// Statistics sheet of one chapter.
pub fn chapter_statistics(chapter: u8, records: &[Record], report: &ReportConfig) -> Vec<StatRow> {
    match chapter {
        1 => chapter1_statistics(&kpis(records, report), report.min_credit),
        2 => chapter2_statistics(records, report.unit_divisor),
        _ => chapter3_statistics(records, report.unit_divisor),
    }
}

/// Export rows ranked by `kind`, amounts divided by `divisor`. The share
/// column is each row's part of the `kind` total.
pub fn summary_rows(agg: &Aggregation, kind: AmountKind, divisor: f64) -> Vec<SummaryRow> {
    let total = agg.totals().amount(kind);
    agg.sorted_by(kind)
        .into_iter()
        .map(|r| SummaryRow {
            key: r.key.clone(),
            credit: r.credit / divisor,
            contract: r.contract / divisor,
            payment: r.payment / divisor,
            contract_count: r.contract_count,
            contract_pct: r.contract_pct(),
            payment_pct: r.payment_pct(),
            payment_from_contract_pct: r.payment_from_contract_pct(),
            share_pct: Ratio::percent(r.amount(kind), total),
        })
        .collect()
}

/// Contract and payment per province, largest contract first.
pub fn province_rows(records: &[Record], divisor: f64) -> Vec<ProvinceRow> {
    let agg = aggregate(
        records,
        GroupKey::Province,
        &[AmountKind::Contract, AmountKind::Payment],
    );
    let mut universities: HashMap<&'static str, HashSet<&str>> = HashMap::new();
    for r in records {
        if let Some(u) = r.university.as_deref() {
            universities.entry(r.province.label()).or_default().insert(u);
        }
    }
    let mut rows: Vec<ProvinceRow> = agg
        .rows()
        .map(|r| ProvinceRow {
            province: r.key.clone(),
            contract: r.contract / divisor,
            payment: r.payment / divisor,
            universities: universities.get(r.key.as_str()).map_or(0, |s| s.len()),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.contract
            .partial_cmp(&a.contract)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.province.cmp(&b.province))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::province::OTHER_LABEL;

    fn records() -> Vec<Record> {
        vec![
            Record::new(AmountKind::Credit, "A", 1000.0).with_department(Some("D1".into())),
            Record::new(AmountKind::Contract, "A", 300.0).with_university(Some("دانشگاه تهران".into())),
            Record::new(AmountKind::Payment, "A", 150.0).with_university(Some("دانشگاه تهران".into())),
            Record::new(AmountKind::Credit, "B", 500.0).with_department(Some("D2".into())),
            Record::new(AmountKind::Contract, "B", 0.0).with_university(Some("مرکز ناشناس".into())),
            Record::new(AmountKind::Credit, "C", 50.0),
        ]
    }

    fn stat(rows: &[StatRow], name: &str) -> Ratio {
        rows.iter()
            .find(|r| r.indicator == name)
            .map(|r| r.value)
            .unwrap_or_else(|| panic!("missing {}", name))
    }

    #[test]
    fn test_kpis_scenario() {
        let report = ReportConfig {
            deposited_to_fund: Some(155.0),
            ..ReportConfig::default()
        };
        let k = kpis(&records(), &report);
        assert_eq!(k.total_credit, 1.55);
        assert_eq!(k.total_contract, 0.3);
        assert_eq!(k.deposited_pct, Ratio(Some(10.0)));
        assert_eq!(k.payment_from_contract_pct, Ratio(Some(50.0)));
        // C is at or below the 100 million minimum
        assert_eq!(k.subjects, 2);
        assert_eq!(k.credit_mean, 0.75);
        assert!(k.credit_concentration.is_some());

        let rows = chapter1_statistics(&k, report.min_credit);
        assert_eq!(stat(&rows, "درصد پرداخت از قرارداد"), Ratio(Some(50.0)));
        assert_eq!(stat(&rows, "تعداد مشمولین (بالای 100 میلیون ریال)"), Ratio(Some(2.0)));
    }

    #[test]
    fn test_kpis_without_credit_reports_sentinels() {
        let records = vec![Record::new(AmountKind::Contract, "X", 20.0)];
        let k = kpis(&records, &ReportConfig::default());
        assert!(k.contract_pct.is_undefined());
        assert!(k.credit_concentration.is_none());
        let rows = chapter1_statistics(&k, 100.0);
        assert!(stat(&rows, "ضریب جینی").is_undefined());
    }

    #[test]
    fn test_summary_rows_ranked_with_share() {
        let agg = aggregate(&records(), GroupKey::Subject, ALL_KINDS);
        let rows = summary_rows(&agg, AmountKind::Credit, 1000.0);
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        assert_eq!(rows[0].credit, 1.0);
        assert_eq!(rows[1].contract_pct, Ratio(Some(0.0)));
        assert!(rows[1].payment_from_contract_pct.is_undefined());
        let share: f64 = rows.iter().filter_map(|r| r.share_pct.value()).sum();
        assert!((share - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_province_rows() {
        let rows = province_rows(&records(), 1.0);
        assert_eq!(rows[0].province, "تهران");
        assert_eq!(rows[0].contract, 300.0);
        assert_eq!(rows[0].payment, 150.0);
        assert_eq!(rows[0].universities, 1);
        assert!(rows.iter().any(|r| r.province == OTHER_LABEL));
    }

    #[test]
    fn test_chapter3_counts() {
        let rows = chapter3_statistics(&records(), 1000.0);
        assert_eq!(stat(&rows, "تعداد کل دانشگاه‌ها"), Ratio(Some(2.0)));
        assert_eq!(stat(&rows, "دانشگاه‌های دارای قرارداد"), Ratio(Some(1.0)));
        assert_eq!(stat(&rows, "تعداد استان‌ها"), Ratio(Some(1.0)));
        assert_eq!(stat(&rows, "سهم 10 دانشگاه برتر از کل (%)"), Ratio(Some(100.0)));
    }

    #[test]
    fn test_overview_counts() {
        let o = overview(&records());
        assert_eq!(o.subjects, 3);
        assert_eq!(o.subjects_with_contracts, 1);
        assert_eq!(o.departments, 2);
        assert_eq!(o.universities_with_contracts, 2);
        assert_eq!(o.universities_with_payments, 1);
        assert_eq!(o.contract_count, 2);
    }

    #[test]
    fn test_chapter2_counts() {
        let rows = chapter2_statistics(&records(), 1000.0);
        assert_eq!(stat(&rows, "تعداد مشمولین"), Ratio(Some(3.0)));
        assert_eq!(stat(&rows, "تعداد دستگاه‌های اجرایی"), Ratio(Some(2.0)));
        assert_eq!(stat(&rows, "مشمولین دارای قرارداد"), Ratio(Some(1.0)));
        assert_eq!(stat(&rows, "میانگین تعداد دانشگاه هر مشمول"), Ratio(Some(1.0)));
    }
}
