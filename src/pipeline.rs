//! One parameterized run over the three report chapters.
//!
//! Inputs are loaded once. Every configured [`FigureSpec`] is rendered into
//! `<output_dir>/s<chapter>/chart_<chapter>_<number>.<ext>`, then the chapter
//! statistics sheets and the chapter 1 analysis prompts are written next to
//! the charts.

use crate::aggregate::{aggregate, cross_count, distinct_count, Aggregation};
use crate::charts::{self, Bar, BoxSeries, Canvas, Group, Point, Step, Tile};
use crate::concentration::ConcentrationCurve;
use crate::config::Config;
use crate::error::{ReportError, Result};
use crate::geo::{load_provinces, ProvinceShape};
use crate::loader::{load_dataset, Dataset};
use crate::markdown::{write_analysis_prompts, PromptFigure, PromptKind};
use crate::output::{write_csv, write_json, write_xlsx};
use crate::reports::{
    chapter_statistics, credits_per_subject, kpis, overview, province_rows, summary_rows, Kpis,
};
use crate::types::{AggregateRow, AmountKind, GroupKey, Ratio, Record, StatRow};
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const BILLION_RIALS: &str = "میلیارد ریال";
const HISTOGRAM_BINS: usize = 20;
const TREEMAP_TILES: usize = 30;
const RANKED_ROWS: usize = 20;
const PIE_SLICES: usize = 10;
const RADAR_SERIES: usize = 6;
const DEPARTMENT_GROUPS: usize = 10;
const SCATTER_HIGHLIGHT: usize = 10;

const CONTRACT_RATE_TARGET: f64 = 30.0;
const PAYMENT_RATE_TARGET: f64 = 20.0;
const PAYMENT_FROM_CONTRACT_RATE_TARGET: f64 = 67.0;

const ALL_KINDS: &[AmountKind] = &[AmountKind::Credit, AmountKind::Contract, AmountKind::Payment];

/// Every figure the report knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FigureKind {
    // Chapter 1: program totals.
    CreditColumns,
    CreditHistogram,
    CreditPareto,
    // Chapter 2: subjects and departments.
    SubjectTreemap,
    CreditContractScatter,
    ContractRateBars,
    SubjectUniversityHeatmap,
    FundingWaterfall,
    SubjectBullet,
    FundingFunnel,
    CreditPies,
    DepartmentRadar,
    DepartmentBars,
    RateBoxPlot,
    // Chapter 3: universities and provinces.
    UniversityContractBox,
    UniversityPareto,
    TopUniversitiesContract,
    TopUniversitiesPayment,
    UniversityComparison,
    UniversityPie,
    ContractAmountBox,
    UniversityScatter,
    AverageContractHistogram,
    ProvinceBars,
    // Not in the default set; selected through `[[figures]]`.
    YearlyCredits,
    ProvinceMap,
}

impl FigureKind {
    pub fn title(self) -> &'static str {
        match self {
            FigureKind::CreditColumns => "مقایسه اعتبار، قرارداد و پرداخت",
            FigureKind::CreditHistogram => "توزیع اعتبار تکلیفی مشمولین",
            FigureKind::CreditPareto => "تمرکز اعتبار تکلیفی (نمودار پارتو)",
            FigureKind::SubjectTreemap => "30 مشمول برتر بر اساس اعتبار (رنگ: درصد قرارداد)",
            FigureKind::CreditContractScatter => "اعتبار و قرارداد هر مشمول",
            FigureKind::ContractRateBars => "درصد تحقق قرارداد 20 مشمول برتر",
            FigureKind::SubjectUniversityHeatmap => "تعداد قرارداد مشمولین با دانشگاه‌ها",
            FigureKind::FundingWaterfall => "جریان اعتبار از تخصیص تا پرداخت",
            FigureKind::SubjectBullet => "عملکرد قرارداد و پرداخت مشمولین برتر",
            FigureKind::FundingFunnel => "قیف اعتبار، قرارداد و پرداخت",
            FigureKind::CreditPies => "سهم دستگاه‌ها و مشمولین از اعتبار",
            FigureKind::DepartmentRadar => "مقایسه چندبعدی دستگاه‌های اجرایی برتر",
            FigureKind::DepartmentBars => "اعتبار، قرارداد و پرداخت 10 دستگاه برتر",
            FigureKind::RateBoxPlot => "توزیع نرخ‌های عملکرد مشمولین",
            FigureKind::UniversityContractBox => "توزیع حجم قراردادهای دانشگاه‌ها",
            FigureKind::UniversityPareto => "توزیع مبالغ قراردادهای دانشگاه‌ها (نمودار پارتو)",
            FigureKind::TopUniversitiesContract => "20 دانشگاه برتر از نظر مبلغ قراردادها",
            FigureKind::TopUniversitiesPayment => "20 دانشگاه برتر از نظر مبلغ پرداخت‌ها",
            FigureKind::UniversityComparison => "مقایسه قرارداد و پرداخت دانشگاه‌های برتر",
            FigureKind::UniversityPie => "توزیع قراردادها: 10 دانشگاه برتر و سایر",
            FigureKind::ContractAmountBox => "پراکندگی مبالغ قراردادهای منعقد شده",
            FigureKind::UniversityScatter => "رابطه تعداد مشمولین و مجموع قراردادهای دانشگاه‌ها",
            FigureKind::AverageContractHistogram => "توزیع میانگین مبلغ قرارداد دانشگاه‌ها",
            FigureKind::ProvinceBars => "پراکندگی استانی قراردادها و پرداخت‌ها",
            FigureKind::YearlyCredits => "روند اعتبار تکلیفی در سال‌های مختلف",
            FigureKind::ProvinceMap => "توزیع جغرافیایی قراردادها",
        }
    }

    fn prompt_kind(self) -> PromptKind {
        match self {
            FigureKind::CreditHistogram | FigureKind::CreditPareto => PromptKind::Distribution,
            _ => PromptKind::Flow,
        }
    }
}

/// One output figure: `chart_<chapter>_<number>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureSpec {
    pub chapter: u8,
    pub number: u32,
    pub kind: FigureKind,
}

impl FigureSpec {
    pub fn new(chapter: u8, number: u32, kind: FigureKind) -> Self {
        Self {
            chapter,
            number,
            kind,
        }
    }

    pub fn id(&self) -> String {
        format!("{}-{}", self.chapter, self.number)
    }

    pub fn stem(&self) -> String {
        format!("chart_{}_{}", self.chapter, self.number)
    }
}

/// The report's figures in chapter order, numbered 1-1 … 3-10.
pub fn default_figures() -> Vec<FigureSpec> {
    use FigureKind::*;
    let chapters: [(u8, &[FigureKind]); 3] = [
        (1, &[CreditColumns, CreditHistogram, CreditPareto]),
        (
            2,
            &[
                SubjectTreemap,
                CreditContractScatter,
                ContractRateBars,
                SubjectUniversityHeatmap,
                FundingWaterfall,
                SubjectBullet,
                FundingFunnel,
                CreditPies,
                DepartmentRadar,
                DepartmentBars,
                RateBoxPlot,
            ],
        ),
        (
            3,
            &[
                UniversityContractBox,
                UniversityPareto,
                TopUniversitiesContract,
                TopUniversitiesPayment,
                UniversityComparison,
                UniversityPie,
                ContractAmountBox,
                UniversityScatter,
                AverageContractHistogram,
                ProvinceBars,
            ],
        ),
    ];
    chapters
        .iter()
        .flat_map(|(chapter, kinds)| {
            kinds
                .iter()
                .enumerate()
                .map(move |(i, &kind)| FigureSpec::new(*chapter, i as u32 + 1, kind))
        })
        .collect()
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub rendered: Vec<(FigureSpec, Vec<PathBuf>)>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub files_written: Vec<PathBuf>,
    pub statistics: Vec<(u8, Vec<StatRow>)>,
    /// `<input>: <column>` for every expected column an input lacked.
    pub missing_columns: Vec<String>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Everything the figures draw from, computed once per run.
struct Prepared<'a> {
    config: &'a Config,
    dataset: &'a Dataset,
    records: Vec<Record>,
    kpis: Kpis,
    geo: Option<Vec<ProvinceShape>>,
}

impl Prepared<'_> {
    fn div(&self) -> f64 {
        self.config.report.unit_divisor
    }

    fn top_n(&self) -> usize {
        self.config.report.top_n
    }

    /// Aggregation over the records that carry a `key` value.
    fn grouped(&self, key: GroupKey, kinds: &[AmountKind]) -> Aggregation {
        grouped(&self.records, key, kinds)
    }
}

fn grouped(records: &[Record], key: GroupKey, kinds: &[AmountKind]) -> Aggregation {
    let with_key: Vec<Record> = records.iter().filter(|r| r.key(key).is_some()).cloned().collect();
    aggregate(&with_key, key, kinds)
}

fn pct_note(r: Ratio) -> Option<String> {
    r.value().map(|v| format!("{:.1}%", v))
}

fn bar_with(label: &str, value: f64, note: Option<String>) -> Bar {
    let bar = Bar::new(label, value);
    match note {
        Some(n) => bar.with_note(n),
        None => bar,
    }
}

fn chapter_dir(config: &Config, chapter: u8) -> PathBuf {
    config.report.output_dir.join(format!("s{}", chapter))
}

/// Credits per year, every year between the first and last present. Years
/// without a record (the suspended 1403 levy) show as zero.
pub fn yearly_series(history: &[Record]) -> Vec<(i32, f64)> {
    let mut by_year: BTreeMap<i32, f64> = BTreeMap::new();
    for r in history.iter().filter(|r| r.kind == AmountKind::Credit) {
        if let Some(y) = r.year {
            *by_year.entry(y).or_insert(0.0) += r.amount;
        }
    }
    let (first, last) = match (by_year.keys().next(), by_year.keys().next_back()) {
        (Some(&a), Some(&b)) => (a, b),
        _ => return Vec::new(),
    };
    (first..=last)
        .map(|y| (y, by_year.get(&y).copied().unwrap_or(0.0)))
        .collect()
}

/// Contract counts of the `size` subjects with the largest credit against
/// the `size` universities with the most contracts.
pub fn heatmap_matrix(records: &[Record], size: usize) -> (Vec<String>, Vec<String>, Vec<Vec<usize>>) {
    let subjects: Vec<String> = grouped(records, GroupKey::Subject, &[AmountKind::Credit])
        .sorted_by(AmountKind::Credit)
        .into_iter()
        .filter(|r| r.credit > 0.0)
        .take(size)
        .map(|r| r.key.clone())
        .collect();
    let by_uni = grouped(records, GroupKey::University, &[AmountKind::Contract]);
    let mut busiest: Vec<&AggregateRow> = by_uni.rows().filter(|r| r.contract_count > 0).collect();
    busiest.sort_by(|a, b| {
        b.contract_count
            .cmp(&a.contract_count)
            .then_with(|| a.key.cmp(&b.key))
    });
    let universities: Vec<String> = busiest.into_iter().take(size).map(|r| r.key.clone()).collect();

    let counts = cross_count(records, AmountKind::Contract, GroupKey::Subject, GroupKey::University);
    let matrix = subjects
        .iter()
        .map(|s| {
            universities
                .iter()
                .map(|u| counts.get(&(s.clone(), u.clone())).copied().unwrap_or(0))
                .collect()
        })
        .collect();
    (subjects, universities, matrix)
}

fn curve_or_skip(what: &str, amounts: &[f64]) -> Option<ConcentrationCurve> {
    match ConcentrationCurve::from_amounts(amounts) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("{} Pareto chart skipped: {}", what, e);
            None
        }
    }
}

fn province_fallback(canvas: &Canvas, stem: &str, ctx: &Prepared) -> Result<Vec<PathBuf>> {
    let bars: Vec<Bar> = province_rows(&ctx.records, ctx.div())
        .into_iter()
        .filter(|r| r.contract > 0.0)
        .map(|r| Bar::new(r.province, r.contract))
        .collect();
    charts::ranked_bars(
        canvas,
        stem,
        FigureKind::ProvinceMap.title(),
        &format!("قرارداد ({})", BILLION_RIALS),
        &bars,
    )
}

/// Rates of every subject with credit, one box each, against their targets.
fn rate_boxes(ctx: &Prepared) -> Option<Vec<BoxSeries>> {
    let agg = ctx.grouped(GroupKey::Subject, ALL_KINDS);
    let rows: Vec<&AggregateRow> = agg.rows().filter(|r| r.credit > 0.0).collect();
    if rows.is_empty() {
        return None;
    }
    let undefined = rows
        .iter()
        .filter(|r| r.payment_from_contract_pct().is_undefined())
        .count();
    if undefined > 0 {
        debug!("{} subjects without contracts left out of the payment-from-contract box", undefined);
    }
    let rate = |f: fn(&AggregateRow) -> Ratio| -> Vec<f64> { rows.iter().filter_map(|&r| f(r).value()).collect() };
    Some(vec![
        BoxSeries {
            label: "درصد قرارداد از اعتبار".to_string(),
            values: rate(AggregateRow::contract_pct),
            target: Some(CONTRACT_RATE_TARGET),
        },
        BoxSeries {
            label: "درصد پرداخت از اعتبار".to_string(),
            values: rate(AggregateRow::payment_pct),
            target: Some(PAYMENT_RATE_TARGET),
        },
        BoxSeries {
            label: "درصد پرداخت از قرارداد".to_string(),
            values: rate(AggregateRow::payment_from_contract_pct),
            target: Some(PAYMENT_FROM_CONTRACT_RATE_TARGET),
        },
    ])
}

/// The six largest departments by credit on five 0–100 axes: three rates and
/// subject and university counts relative to the largest among them.
fn department_profiles(ctx: &Prepared) -> Vec<Group> {
    let agg = ctx.grouped(GroupKey::Department, ALL_KINDS);
    let subjects = distinct_count(&ctx.records, GroupKey::Department, GroupKey::Subject);
    let universities = distinct_count(&ctx.records, GroupKey::Department, GroupKey::University);
    let top: Vec<&AggregateRow> = agg
        .sorted_by(AmountKind::Credit)
        .into_iter()
        .filter(|r| r.credit > 0.0)
        .take(RADAR_SERIES)
        .collect();
    let count = |m: &HashMap<String, usize>, key: &str| m.get(key).copied().unwrap_or(0);
    let max_subjects = top.iter().map(|r| count(&subjects, &r.key)).max().unwrap_or(0);
    let max_universities = top.iter().map(|r| count(&universities, &r.key)).max().unwrap_or(0);
    let relative = |n: usize, max: usize| if max > 0 { n as f64 / max as f64 * 100.0 } else { 0.0 };

    top.iter()
        .map(|r| Group {
            label: r.key.clone(),
            values: vec![
                r.contract_pct().value().unwrap_or(0.0),
                r.payment_pct().value().unwrap_or(0.0),
                r.payment_from_contract_pct().value().unwrap_or(0.0),
                relative(count(&subjects, &r.key), max_subjects),
                relative(count(&universities, &r.key), max_universities),
            ],
        })
        .collect()
}

/// Render one figure. `Ok(None)` means the data cannot support the figure
/// and it was skipped.
fn render_figure(canvas: &Canvas, spec: &FigureSpec, ctx: &Prepared) -> Result<Option<Vec<PathBuf>>> {
    let stem = spec.stem();
    let title = spec.kind.title();
    let div = ctx.div();
    let k = &ctx.kpis;
    let amount_desc = format!("مبلغ ({})", BILLION_RIALS);
    let skip = |why: &str| -> Result<Option<Vec<PathBuf>>> {
        warn!("chart {} skipped: {}", spec.id(), why);
        Ok(None)
    };

    let files = match spec.kind {
        FigureKind::CreditColumns => {
            let mut bars = vec![Bar::new("اعتبار تکلیفی", k.total_credit)];
            if let Some(d) = k.deposited_to_fund {
                bars.push(bar_with("واریز به صندوق", d, pct_note(k.deposited_pct)));
            }
            bars.push(bar_with("قراردادها", k.total_contract, pct_note(k.contract_pct)));
            bars.push(bar_with("پرداخت‌ها", k.total_payment, pct_note(k.payment_pct)));
            charts::column_comparison(canvas, &stem, title, &amount_desc, &bars)?
        }
        FigureKind::CreditHistogram => {
            let credits: Vec<f64> = credits_per_subject(&ctx.records, ctx.config.report.min_credit)
                .into_iter()
                .map(|c| c / div)
                .collect();
            if credits.is_empty() {
                return skip("no subject above the minimum credit");
            }
            charts::histogram(
                canvas,
                &stem,
                title,
                &format!("اعتبار ({})", BILLION_RIALS),
                "تعداد مشمولین",
                BILLION_RIALS,
                &credits,
                HISTOGRAM_BINS,
            )?
        }
        FigureKind::CreditPareto => {
            let credits: Vec<f64> = credits_per_subject(&ctx.records, ctx.config.report.min_credit)
                .into_iter()
                .map(|c| c / div)
                .collect();
            match curve_or_skip("credit", &credits) {
                Some(curve) => charts::pareto(canvas, &stem, title, &amount_desc, &curve)?,
                None => return Ok(None),
            }
        }
        FigureKind::SubjectTreemap => {
            let agg = ctx.grouped(GroupKey::Subject, &[AmountKind::Credit, AmountKind::Contract]);
            let tiles: Vec<Tile> = agg
                .sorted_by(AmountKind::Credit)
                .into_iter()
                .filter(|r| r.credit > 0.0)
                .take(TREEMAP_TILES)
                .map(|r| Tile {
                    label: r.key.clone(),
                    value: r.credit / div,
                    shade: r.contract_pct().value(),
                })
                .collect();
            if tiles.is_empty() {
                return skip("no subject has credit");
            }
            charts::treemap(canvas, &stem, title, "درصد قرارداد از اعتبار", &tiles)?
        }
        FigureKind::CreditContractScatter => {
            let agg = ctx.grouped(GroupKey::Subject, &[AmountKind::Credit, AmountKind::Contract]);
            let points: Vec<Point> = agg
                .sorted_by(AmountKind::Credit)
                .into_iter()
                .filter(|r| r.credit > 0.0 || r.contract > 0.0)
                .map(|r| Point {
                    label: r.key.clone(),
                    x: r.credit / div,
                    y: r.contract / div,
                })
                .collect();
            if points.is_empty() {
                return skip("no subject has credit or contracts");
            }
            let target = format!("هدف {}% قرارداد", CONTRACT_RATE_TARGET);
            charts::scatter(
                canvas,
                &stem,
                title,
                &format!("اعتبار ({})", BILLION_RIALS),
                &format!("قرارداد ({})", BILLION_RIALS),
                &points,
                Some((CONTRACT_RATE_TARGET / 100.0, target.as_str())),
                SCATTER_HIGHLIGHT,
            )?
        }
        FigureKind::ContractRateBars => {
            let agg = ctx.grouped(GroupKey::Subject, &[AmountKind::Credit, AmountKind::Contract]);
            let mut rated: Vec<(String, f64)> = agg
                .sorted_by(AmountKind::Credit)
                .into_iter()
                .filter(|r| r.credit > 0.0)
                .take(RANKED_ROWS)
                .filter_map(|r| r.contract_pct().value().map(|v| (r.key.clone(), v)))
                .collect();
            if rated.is_empty() {
                return skip("no subject has credit");
            }
            rated.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            let bars: Vec<Bar> = rated.into_iter().map(|(label, v)| Bar::new(label, v)).collect();
            charts::ranked_bars(canvas, &stem, title, "درصد قرارداد از اعتبار (%)", &bars)?
        }
        FigureKind::SubjectUniversityHeatmap => {
            let (rows, cols, counts) = heatmap_matrix(&ctx.records, ctx.top_n());
            if rows.is_empty() || cols.is_empty() {
                return skip("no subject-university contracts");
            }
            charts::heatmap(canvas, &stem, title, &rows, &cols, &counts)?
        }
        FigureKind::FundingWaterfall => {
            let steps = [
                Step::Total("اعتبار تکلیفی".to_string(), k.total_credit),
                Step::Decrease("بدون قرارداد".to_string(), k.total_credit - k.total_contract),
                Step::Total("قراردادها".to_string(), k.total_contract),
                Step::Decrease("پرداخت نشده".to_string(), k.total_contract - k.total_payment),
                Step::Total("پرداخت‌ها".to_string(), k.total_payment),
            ];
            charts::waterfall(canvas, &stem, title, &amount_desc, &steps)?
        }
        FigureKind::SubjectBullet => {
            let agg = ctx.grouped(GroupKey::Subject, ALL_KINDS);
            let rows: Vec<Group> = agg
                .sorted_by(AmountKind::Credit)
                .into_iter()
                .filter(|r| r.credit > 0.0)
                .take(ctx.top_n())
                .map(|r| Group {
                    label: r.key.clone(),
                    values: vec![
                        r.contract_pct().value().unwrap_or(0.0),
                        r.payment_from_contract_pct().value().unwrap_or(0.0),
                    ],
                })
                .collect();
            if rows.is_empty() {
                return skip("no subject has credit");
            }
            charts::bullet(
                canvas,
                &stem,
                title,
                &["درصد قرارداد از اعتبار", "درصد پرداخت از قرارداد"],
                &rows,
                PAYMENT_FROM_CONTRACT_RATE_TARGET,
            )?
        }
        FigureKind::FundingFunnel => {
            if k.total_credit <= 0.0 && k.total_contract <= 0.0 && k.total_payment <= 0.0 {
                return skip("all totals are zero");
            }
            let stages = [
                Bar::new("اعتبار تکلیفی", k.total_credit),
                bar_with("قراردادها", k.total_contract, pct_note(k.contract_pct)),
                bar_with("پرداخت‌ها", k.total_payment, pct_note(k.payment_pct)),
            ];
            charts::funnel(canvas, &stem, title, &stages)?
        }
        FigureKind::CreditPies => {
            let top = |key: GroupKey, n: usize| -> Vec<Bar> {
                ctx.grouped(key, &[AmountKind::Credit])
                    .sorted_by(AmountKind::Credit)
                    .into_iter()
                    .filter(|r| r.credit > 0.0)
                    .take(n)
                    .map(|r| Bar::new(r.key.clone(), r.credit / div))
                    .collect()
            };
            let panels: Vec<(&str, Vec<Bar>)> = [
                ("دستگاه‌های اجرایی", top(GroupKey::Department, PIE_SLICES)),
                ("مشمولین", top(GroupKey::Subject, ctx.top_n())),
            ]
            .into_iter()
            .filter(|(_, slices)| !slices.is_empty())
            .collect();
            if panels.is_empty() {
                return skip("no credit to divide");
            }
            charts::pies(canvas, &stem, title, &panels)?
        }
        FigureKind::DepartmentRadar => {
            let series = department_profiles(ctx);
            if series.is_empty() {
                return skip("no department has credit");
            }
            let axes = [
                "درصد قرارداد",
                "درصد پرداخت",
                "پرداخت از قرارداد",
                "تعداد مشمولین (نسبی)",
                "تنوع دانشگاه‌ها (نسبی)",
            ];
            charts::radar(canvas, &stem, title, &axes, &series, 100.0)?
        }
        FigureKind::DepartmentBars => {
            let agg = ctx.grouped(GroupKey::Department, ALL_KINDS);
            let groups: Vec<Group> = agg
                .sorted_by(AmountKind::Credit)
                .into_iter()
                .take(DEPARTMENT_GROUPS)
                .map(|r| Group {
                    label: r.key.clone(),
                    values: vec![r.credit / div, r.contract / div, r.payment / div],
                })
                .collect();
            if groups.is_empty() {
                return skip("no department column in the inputs");
            }
            charts::grouped_bars(
                canvas,
                &stem,
                title,
                &amount_desc,
                &["اعتبار", "قرارداد", "پرداخت"],
                &groups,
            )?
        }
        FigureKind::RateBoxPlot => match rate_boxes(ctx) {
            Some(series) => charts::box_plot(
                canvas,
                &stem,
                title,
                "درصد (%)",
                "%",
                &series,
                Some((-5.0, 105.0)),
            )?,
            None => return skip("no subject has credit"),
        },
        FigureKind::UniversityContractBox => {
            let values: Vec<f64> = ctx
                .grouped(GroupKey::University, &[AmountKind::Contract])
                .amounts(AmountKind::Contract)
                .into_iter()
                .filter(|a| *a > 0.0)
                .map(|a| a / div)
                .collect();
            if values.is_empty() {
                return skip("no university has contracts");
            }
            let series = [BoxSeries {
                label: "حجم قراردادهای دانشگاه‌ها".to_string(),
                values,
                target: None,
            }];
            charts::box_plot(canvas, &stem, title, &amount_desc, "میلیارد", &series, None)?
        }
        FigureKind::UniversityPareto => {
            let amounts: Vec<f64> = ctx
                .grouped(GroupKey::University, &[AmountKind::Contract])
                .amounts(AmountKind::Contract)
                .into_iter()
                .map(|a| a / div)
                .collect();
            match curve_or_skip("university", &amounts) {
                Some(curve) => charts::pareto(canvas, &stem, title, &amount_desc, &curve)?,
                None => return Ok(None),
            }
        }
        FigureKind::TopUniversitiesContract | FigureKind::TopUniversitiesPayment => {
            let agg = ctx.grouped(GroupKey::University, &[AmountKind::Contract, AmountKind::Payment]);
            if agg.is_empty() {
                return skip("no university in the inputs");
            }
            let (kind, desc) = if spec.kind == FigureKind::TopUniversitiesContract {
                (AmountKind::Contract, "مبلغ قراردادها")
            } else {
                (AmountKind::Payment, "مبلغ پرداخت‌ها")
            };
            let bars: Vec<Bar> = agg
                .sorted_by(kind)
                .into_iter()
                .filter(|r| r.amount(kind) > 0.0)
                .take(RANKED_ROWS)
                .map(|r| match kind {
                    AmountKind::Contract => {
                        bar_with(&r.key, r.contract / div, Some(format!("{} قرارداد", r.contract_count)))
                    }
                    _ => Bar::new(r.key.clone(), r.amount(kind) / div),
                })
                .collect();
            if bars.is_empty() {
                return skip("no university has a positive amount");
            }
            charts::ranked_bars(canvas, &stem, title, &format!("{} ({})", desc, BILLION_RIALS), &bars)?
        }
        FigureKind::UniversityComparison => {
            let agg = ctx.grouped(GroupKey::University, &[AmountKind::Contract, AmountKind::Payment]);
            if agg.is_empty() {
                return skip("no university in the inputs");
            }
            let groups: Vec<Group> = agg
                .sorted_by(AmountKind::Contract)
                .into_iter()
                .take(ctx.top_n())
                .map(|r| Group {
                    label: r.key.clone(),
                    values: vec![r.contract / div, r.payment / div],
                })
                .collect();
            charts::grouped_bars(canvas, &stem, title, &amount_desc, &["قرارداد", "پرداخت"], &groups)?
        }
        FigureKind::UniversityPie => {
            let agg = ctx.grouped(GroupKey::University, &[AmountKind::Contract]);
            let ranked = agg.sorted_by(AmountKind::Contract);
            let mut slices: Vec<Bar> = ranked
                .iter()
                .take(PIE_SLICES)
                .filter(|r| r.contract > 0.0)
                .map(|r| Bar::new(r.key.clone(), r.contract / div))
                .collect();
            let rest = &ranked[PIE_SLICES.min(ranked.len())..];
            let others: f64 = rest.iter().map(|r| r.contract).sum::<f64>() / div;
            if others > 0.0 {
                slices.push(Bar::new(format!("سایر ({} دانشگاه)", rest.len()), others));
            }
            if slices.is_empty() {
                return skip("no university has contracts");
            }
            charts::pies(canvas, &stem, title, &[("دانشگاه‌ها", slices)])?
        }
        FigureKind::ContractAmountBox => {
            let values: Vec<f64> = ctx
                .records
                .iter()
                .filter(|r| r.kind == AmountKind::Contract)
                .map(|r| r.amount / div)
                .collect();
            if values.is_empty() {
                return skip("no contract rows");
            }
            let series = [BoxSeries {
                label: "مبالغ قراردادها".to_string(),
                values,
                target: None,
            }];
            charts::box_plot(canvas, &stem, title, &amount_desc, "میلیارد", &series, None)?
        }
        FigureKind::UniversityScatter => {
            let contracts: Vec<Record> = ctx
                .records
                .iter()
                .filter(|r| r.kind == AmountKind::Contract)
                .cloned()
                .collect();
            let subjects = distinct_count(&contracts, GroupKey::University, GroupKey::Subject);
            let points: Vec<Point> = grouped(&contracts, GroupKey::University, &[AmountKind::Contract])
                .sorted_by(AmountKind::Contract)
                .into_iter()
                .filter(|r| r.contract > 0.0)
                .map(|r| Point {
                    label: r.key.clone(),
                    x: subjects.get(&r.key).copied().unwrap_or(0) as f64,
                    y: r.contract / div,
                })
                .collect();
            if points.is_empty() {
                return skip("no university has contracts");
            }
            charts::scatter(
                canvas,
                &stem,
                title,
                "تعداد مشمولین طرف قرارداد",
                &format!("مجموع قراردادها ({})", BILLION_RIALS),
                &points,
                None,
                SCATTER_HIGHLIGHT,
            )?
        }
        FigureKind::AverageContractHistogram => {
            let averages: Vec<f64> = ctx
                .grouped(GroupKey::University, &[AmountKind::Contract])
                .rows()
                .filter(|r| r.contract_count > 0 && r.contract > 0.0)
                .map(|r| r.contract / r.contract_count as f64 / div)
                .collect();
            if averages.is_empty() {
                return skip("no university has contracts");
            }
            charts::histogram(
                canvas,
                &stem,
                title,
                &format!("میانگین مبلغ قرارداد ({})", BILLION_RIALS),
                "تعداد دانشگاه‌ها",
                BILLION_RIALS,
                &averages,
                HISTOGRAM_BINS,
            )?
        }
        FigureKind::ProvinceBars => {
            let groups: Vec<Group> = province_rows(&ctx.records, div)
                .into_iter()
                .filter(|r| r.contract > 0.0 || r.payment > 0.0)
                .take(ctx.top_n())
                .map(|r| Group {
                    label: r.province,
                    values: vec![r.contract, r.payment],
                })
                .collect();
            if groups.is_empty() {
                return skip("no contracts or payments to place on provinces");
            }
            charts::grouped_bars(canvas, &stem, title, &amount_desc, &["قرارداد", "پرداخت"], &groups)?
        }
        FigureKind::YearlyCredits => {
            let history = match &ctx.dataset.history {
                Some(h) => h,
                None => return skip("no credits history"),
            };
            let years: Vec<(i32, f64)> = yearly_series(history)
                .into_iter()
                .map(|(y, v)| (y, v / div))
                .collect();
            let title = if ctx.dataset.history_is_sample {
                format!("{} (داده نمونه)", title)
            } else {
                title.to_string()
            };
            charts::yearly_trend(canvas, &stem, &title, &format!("اعتبار ({})", BILLION_RIALS), &years)?
        }
        FigureKind::ProvinceMap => match &ctx.geo {
            Some(shapes) => {
                let values: HashMap<String, f64> = province_rows(&ctx.records, div)
                    .into_iter()
                    .map(|r| (r.province, r.contract))
                    .collect();
                match charts::choropleth(canvas, &stem, title, BILLION_RIALS, shapes, &values) {
                    Ok(files) => files,
                    Err(ReportError::Geo(e)) => {
                        warn!("province map unavailable ({}); drawing ranked bars instead", e);
                        province_fallback(canvas, &stem, ctx)?
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                info!("no province polygons; chart {} drawn as ranked bars", spec.id());
                province_fallback(canvas, &stem, ctx)?
            }
        },
    };
    Ok(Some(files))
}

fn load_geo(config: &Config) -> Option<Vec<ProvinceShape>> {
    let inputs = &config.inputs;
    let path = match &inputs.geo {
        Some(p) => inputs.resolve(p),
        None => return None,
    };
    match load_provinces(&path, &inputs.geo_name_property) {
        Ok(shapes) => shapes,
        Err(e) => {
            warn!("{}; province map falls back to ranked bars", e);
            None
        }
    }
}

fn write_tables<T>(dir: &Path, stem: &str, sheet: &str, rows: &[T], written: &mut Vec<PathBuf>) -> anyhow::Result<()>
where
    T: Serialize + tabled::Tabled,
{
    let csv = dir.join(format!("{}.csv", stem));
    let xlsx = dir.join(format!("{}.xlsx", stem));
    let json = dir.join(format!("{}.json", stem));
    write_csv(&csv, rows)?;
    write_xlsx(&xlsx, sheet, rows)?;
    write_json(&json, &rows)?;
    written.extend([csv, xlsx, json]);
    Ok(())
}

/// Statistics and summary tables of one chapter.
fn write_chapter_tables(ctx: &Prepared, chapter: u8, summary: &mut RunSummary) -> anyhow::Result<()> {
    let dir = chapter_dir(ctx.config, chapter);
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let div = ctx.div();

    let stats = chapter_statistics(chapter, &ctx.records, &ctx.config.report);
    write_tables(
        &dir,
        &format!("chapter{}_statistics", chapter),
        "آمار",
        &stats,
        &mut summary.files_written,
    )?;
    summary.statistics.push((chapter, stats));

    match chapter {
        1 => {}
        2 => {
            let agg = aggregate(&ctx.records, GroupKey::Subject, &[AmountKind::Credit, AmountKind::Contract, AmountKind::Payment]);
            let rows = summary_rows(&agg, AmountKind::Credit, div);
            write_tables(&dir, "subject_summary", "مشمولین", &rows, &mut summary.files_written)?;
        }
        _ => {
            let with_uni: Vec<Record> = ctx
                .records
                .iter()
                .filter(|r| r.university.is_some())
                .cloned()
                .collect();
            let agg = aggregate(&with_uni, GroupKey::University, &[AmountKind::Contract, AmountKind::Payment]);
            let rows = summary_rows(&agg, AmountKind::Contract, div);
            write_tables(&dir, "university_summary", "دانشگاه‌ها", &rows, &mut summary.files_written)?;
            let rows = province_rows(&ctx.records, div);
            write_tables(&dir, "provincial_statistics", "استان‌ها", &rows, &mut summary.files_written)?;
        }
    }
    Ok(())
}

fn write_prompts(ctx: &Prepared, summary: &mut RunSummary) -> anyhow::Result<()> {
    let figures: Vec<(PromptFigure, PromptKind)> = ctx
        .config
        .figures
        .iter()
        .filter(|f| f.chapter == 1)
        .map(|f| {
            let files = summary
                .rendered
                .iter()
                .find(|(spec, _)| spec == f)
                .map(|(_, files)| files.clone())
                .unwrap_or_default();
            (
                PromptFigure {
                    number: f.number,
                    title: f.kind.title().to_string(),
                    files,
                },
                f.kind.prompt_kind(),
            )
        })
        .collect();
    let dir = chapter_dir(ctx.config, 1);
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join("analysis_prompts_chapter1.md");
    write_analysis_prompts(&path, &ctx.kpis, &overview(&ctx.records), &figures)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("✓ Analysis prompts saved to {}", path.display());
    summary.files_written.push(path);
    Ok(())
}

/// Load the inputs and produce the selected chapters. An empty `chapters`
/// selects all three.
pub fn run(config: &Config, chapters: &[u8], no_charts: bool) -> anyhow::Result<RunSummary> {
    let chapters: Vec<u8> = if chapters.is_empty() {
        vec![1, 2, 3]
    } else {
        let mut c = chapters.to_vec();
        c.sort_unstable();
        c.dedup();
        c
    };
    let dataset = load_dataset(config)?;
    let records = dataset.records();
    let figures: Vec<&FigureSpec> = config
        .figures
        .iter()
        .filter(|f| chapters.contains(&f.chapter))
        .collect();
    let needs_geo = !no_charts && figures.iter().any(|f| f.kind == FigureKind::ProvinceMap);

    let ctx = Prepared {
        config,
        dataset: &dataset,
        kpis: kpis(&records, &config.report),
        geo: if needs_geo { load_geo(config) } else { None },
        records,
    };
    let mut summary = RunSummary {
        missing_columns: dataset
            .reports
            .iter()
            .flat_map(|r| {
                r.missing_columns
                    .iter()
                    .map(move |c| format!("{}: {}", r.path.display(), c))
            })
            .collect(),
        ..Default::default()
    };

    if !no_charts {
        for &chapter in &chapters {
            let canvas = Canvas::new(&config.render, chapter_dir(config, chapter));
            for spec in figures.iter().filter(|f| f.chapter == chapter) {
                match render_figure(&canvas, spec, &ctx) {
                    Ok(Some(files)) => {
                        println!("✓ Chart {} saved", spec.id());
                        summary.rendered.push(((*spec).clone(), files));
                    }
                    Ok(None) => summary.skipped.push(spec.id()),
                    Err(e) => {
                        error!("chart {} failed: {}", spec.id(), e);
                        summary.failed.push(spec.id());
                    }
                }
            }
        }
    }

    for &chapter in &chapters {
        write_chapter_tables(&ctx, chapter, &mut summary)?;
    }
    if chapters.contains(&1) && config.report.write_prompts {
        write_prompts(&ctx, &mut summary)?;
    }

    info!(
        "{} charts rendered, {} skipped, {} failed, {} files written",
        summary.rendered.len(),
        summary.skipped.len(),
        summary.failed.len(),
        summary.files_written.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACTS_CSV: &str = "نام مشمول,دستگاه اجرایی مرتبط,دانشگاه,اعتبار سال 1404,مجموع مبالغ قراردادها\n\
         شرکت الف,وزارت نفت,دانشگاه تهران,1000,300\n\
         شرکت ب,وزارت نیرو,دانشگاه شیراز,500,0\n";
    const PAYMENTS_CSV: &str = "نام مشمول,دانشگاه,مجموع مبالغ پرداختی\n\
         شرکت الف,دانشگاه تهران,150\n";

    /// Inputs written into a temp dir and a config pointing at them.
    fn fixture(contracts: &str, payments: &str) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("contracts.csv"), contracts).unwrap();
        std::fs::write(dir.path().join("payments.csv"), payments).unwrap();

        let mut config = Config::default();
        config.inputs.data_dir = dir.path().to_path_buf();
        config.inputs.contracts = PathBuf::from("contracts.csv");
        config.inputs.payments = PathBuf::from("payments.csv");
        config.inputs.credits_history = None;
        config.inputs.geo = None;
        config.report.output_dir = dir.path().join("figs");
        (dir, config)
    }

    fn prepared<'a>(config: &'a Config, dataset: &'a Dataset, records: Vec<Record>) -> Prepared<'a> {
        Prepared {
            config,
            dataset,
            kpis: kpis(&records, &config.report),
            geo: None,
            records,
        }
    }

    #[test]
    fn test_default_figures_are_unique_per_chapter() {
        let figures = default_figures();
        assert_eq!(figures.len(), 24);
        for (i, a) in figures.iter().enumerate() {
            assert!(figures[i + 1..].iter().all(|b| b.stem() != a.stem()));
        }
        assert_eq!(figures.iter().filter(|f| f.chapter == 1).count(), 3);
        assert_eq!(figures.iter().filter(|f| f.chapter == 2).count(), 11);
        assert_eq!(figures.iter().filter(|f| f.chapter == 3).count(), 10);
        assert_eq!(figures[2].stem(), "chart_1_3");
        assert_eq!(figures[2].kind, FigureKind::CreditPareto);
        assert_eq!(figures[3].kind, FigureKind::SubjectTreemap);
        assert_eq!(figures[13].id(), "2-11");
        assert_eq!(figures[13].kind, FigureKind::RateBoxPlot);
        assert_eq!(figures[23].id(), "3-10");
        assert_eq!(figures[23].kind, FigureKind::ProvinceBars);
        assert!(figures
            .iter()
            .all(|f| f.kind != FigureKind::YearlyCredits && f.kind != FigureKind::ProvinceMap));
    }

    #[test]
    fn test_figure_kind_names() {
        assert_eq!(
            serde_json::to_string(&FigureKind::SubjectUniversityHeatmap).unwrap(),
            "\"subject_university_heatmap\""
        );
        let kind: FigureKind = serde_json::from_str("\"province_map\"").unwrap();
        assert_eq!(kind, FigureKind::ProvinceMap);
        let kind: FigureKind = serde_json::from_str("\"department_radar\"").unwrap();
        assert_eq!(kind, FigureKind::DepartmentRadar);
    }

    #[test]
    fn test_yearly_series_fills_gaps() {
        let history = vec![
            Record::new(AmountKind::Credit, "A", 10.0).with_year(1402),
            Record::new(AmountKind::Credit, "B", 5.0).with_year(1402),
            Record::new(AmountKind::Credit, "A", 7.0).with_year(1404),
        ];
        assert_eq!(
            yearly_series(&history),
            vec![(1402, 15.0), (1403, 0.0), (1404, 7.0)]
        );
        assert!(yearly_series(&[]).is_empty());
    }

    #[test]
    fn test_heatmap_matrix() {
        let c = |s: &str, u: &str| {
            Record::new(AmountKind::Contract, s, 10.0).with_university(Some(u.to_string()))
        };
        let records = vec![
            Record::new(AmountKind::Credit, "A", 100.0),
            Record::new(AmountKind::Credit, "B", 300.0),
            c("A", "U1"),
            c("A", "U1"),
            c("A", "U2"),
            c("B", "U2"),
            c("B", "U2"),
        ];
        let (rows, cols, counts) = heatmap_matrix(&records, 10);
        assert_eq!(rows, vec!["B".to_string(), "A".to_string()]);
        assert_eq!(cols, vec!["U2".to_string(), "U1".to_string()]);
        assert_eq!(counts, vec![vec![2, 0], vec![1, 2]]);

        let (rows, cols, _) = heatmap_matrix(&records, 1);
        assert_eq!((rows.len(), cols.len()), (1, 1));
    }

    #[test]
    fn test_university_figures_skip_without_universities() {
        let config = Config::default();
        let dataset = Dataset::default();
        let records = vec![
            Record::new(AmountKind::Credit, "A", 100.0),
            Record::new(AmountKind::Credit, "B", 40.0),
        ];
        let ctx = prepared(&config, &dataset, records);
        let dir = tempfile::tempdir().unwrap();
        let canvas = Canvas::new(&config.render, dir.path());
        for kind in [
            FigureKind::TopUniversitiesContract,
            FigureKind::TopUniversitiesPayment,
            FigureKind::UniversityComparison,
            FigureKind::UniversityPie,
            FigureKind::ProvinceBars,
        ] {
            let spec = FigureSpec::new(3, 1, kind);
            assert!(render_figure(&canvas, &spec, &ctx).unwrap().is_none(), "{:?}", kind);
        }
        assert_eq!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0), 0);
    }

    #[test]
    fn test_rate_boxes_leave_out_undefined_rates() {
        let config = Config::default();
        let dataset = Dataset::default();
        let records = vec![
            Record::new(AmountKind::Credit, "A", 1000.0),
            Record::new(AmountKind::Contract, "A", 300.0),
            Record::new(AmountKind::Payment, "A", 150.0),
            Record::new(AmountKind::Credit, "B", 500.0),
        ];
        let ctx = prepared(&config, &dataset, records);
        let boxes = rate_boxes(&ctx).unwrap();
        assert_eq!(boxes[0].values.len(), 2);
        assert_eq!(boxes[2].values, vec![50.0]);
        assert_eq!(boxes[2].target, Some(PAYMENT_FROM_CONTRACT_RATE_TARGET));
    }

    #[test]
    fn test_department_profiles_are_relative() {
        let config = Config::default();
        let dataset = Dataset::default();
        let dept = |r: Record, d: &str| r.with_department(Some(d.to_string()));
        let records = vec![
            dept(Record::new(AmountKind::Credit, "A", 100.0), "D1"),
            dept(Record::new(AmountKind::Credit, "B", 100.0), "D1"),
            dept(Record::new(AmountKind::Contract, "A", 50.0), "D1"),
            dept(Record::new(AmountKind::Credit, "C", 40.0), "D2"),
        ];
        let ctx = prepared(&config, &dataset, records);
        let profiles = department_profiles(&ctx);
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].label, "D1");
        assert_eq!(profiles[0].values[0], 25.0);
        assert_eq!(profiles[0].values[3], 100.0);
        assert_eq!(profiles[1].values[3], 50.0);
    }

    #[test]
    fn test_run_writes_tables_without_charts() {
        let (dir, config) = fixture(CONTRACTS_CSV, PAYMENTS_CSV);

        let summary = run(&config, &[], true).unwrap();
        assert!(summary.is_complete());
        assert!(summary.rendered.is_empty());
        assert!(summary.missing_columns.is_empty());
        let s1 = dir.path().join("figs/s1");
        assert!(s1.join("chapter1_statistics.xlsx").exists());
        assert!(s1.join("analysis_prompts_chapter1.md").exists());
        assert!(dir.path().join("figs/s2/subject_summary.csv").exists());
        assert!(dir.path().join("figs/s3/provincial_statistics.json").exists());
        assert_eq!(summary.statistics.len(), 3);

        let md = std::fs::read_to_string(s1.join("analysis_prompts_chapter1.md")).unwrap();
        assert!(md.contains("Contract Achievement Rate: 20.0%"));
    }

    #[test]
    fn test_run_renders_chapter_three() {
        let (dir, mut config) = fixture(CONTRACTS_CSV, PAYMENTS_CSV);
        config.render.width = 900;
        config.render.height = 600;
        config.render.formats = vec!["png".to_string()];
        config.inputs.credits_history = Some(PathBuf::from("missing_history.xlsx"));
        config.report.sample_fallback = true;
        config.figures.push(FigureSpec::new(3, 11, FigureKind::ProvinceMap));
        config.figures.push(FigureSpec::new(3, 12, FigureKind::YearlyCredits));

        let summary = run(&config, &[3], false).unwrap();
        assert!(summary.failed.is_empty(), "failed: {:?}", summary.failed);
        let rendered: Vec<String> = summary.rendered.iter().map(|(f, _)| f.id()).collect();
        for id in ["3-3", "3-4", "3-5", "3-11", "3-12"] {
            assert!(rendered.contains(&id.to_string()), "{} not in {:?}", id, rendered);
        }
        assert!(rendered.iter().all(|id| id.starts_with("3-")));
        assert!(dir.path().join("figs/s3/chart_3_4.png").exists());
        assert!(!dir.path().join("figs/s1").exists());
    }

    #[test]
    fn test_run_reports_missing_columns() {
        let contracts = "نام مشمول,دانشگاه,اعتبار سال 1404\n\
             شرکت الف,دانشگاه تهران,1000\n";
        let (_dir, config) = fixture(contracts, PAYMENTS_CSV);
        let summary = run(&config, &[1], true).unwrap();
        assert!(summary
            .missing_columns
            .iter()
            .any(|c| c.ends_with(": مجموع مبالغ قراردادها") && c.contains("contracts.csv")));
    }

    #[test]
    fn test_run_fails_on_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.inputs.data_dir = dir.path().to_path_buf();
        config.report.output_dir = dir.path().join("figs");
        let err = run(&config, &[1], true).unwrap_err();
        assert!(err.to_string().contains("input file not found"));
    }
}
