//! Analysis prompt file for chapter 1.
//!
//! The file pairs every chapter-1 figure with the computed values it shows, a
//! fixed analysis prompt and a placeholder where the written analysis goes.

use crate::locale::{format_plain, format_ratio, DigitSystem};
use crate::reports::{Kpis, Overview};
use crate::types::Ratio;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const CONTRACT_TARGET: f64 = 60.0;
pub const PAYMENT_TARGET: f64 = 40.0;
pub const PAYMENT_FROM_CONTRACT_TARGET: f64 = 50.0;

/// A rendered figure the prompt file refers to.
#[derive(Debug, Clone)]
pub struct PromptFigure {
    pub number: u32,
    pub title: String,
    pub files: Vec<PathBuf>,
}

fn pct(r: Ratio) -> String {
    format_ratio(r, 1, DigitSystem::Latin)
}

fn billions(v: f64) -> String {
    format_plain(v, 0)
}

/// "Above target", "Below target", or "Undefined" for the sentinel.
pub fn status(r: Ratio, target: f64) -> &'static str {
    match r.value() {
        Some(v) if v >= target => "Above target",
        Some(_) => "Below target",
        None => "Undefined",
    }
}

fn remainder(total: f64, part: f64) -> f64 {
    (total - part).max(0.0)
}

fn complement(r: Ratio) -> Ratio {
    Ratio(r.value().map(|v| 100.0 - v))
}

fn files_line(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| format!("`{}`", p.display()))
        .collect::<Vec<_>>()
        .join(" و ")
}

fn section(out: &mut String, title: &str, files: Option<&[PathBuf]>, prompt: &str, placeholder: &str) {
    let _ = writeln!(out, "### {}\n", title);
    if let Some(files) = files.filter(|f| !f.is_empty()) {
        let _ = writeln!(out, "**مسیر فایل:** {}\n", files_line(files));
    }
    let _ = writeln!(out, "#### A. پرامپت تحلیل:\n");
    let _ = writeln!(out, "```\n{}\n```\n", prompt.trim());
    let _ = writeln!(out, "#### B. محل تحلیل:\n");
    let _ = writeln!(out, "[{}]\n", placeholder);
    let _ = writeln!(out, "---\n");
}

fn flow_prompt(number: u32, k: &Kpis) -> String {
    format!(
        "SECTION A - ANALYSIS PROMPT FOR CHART 1-{number}

Analyze the chart showing the credit flow from allocation to payment in the SATC system.

KEY METRICS:
- Total Mandatory Credits: {credit} billion Rials
- Total Contracts Signed: {contract} billion Rials ({contract_pct} of credits)
- Total Payments Made: {payment} billion Rials ({payment_pct} of credits)
- Credits Without Contracts: {uncontracted} billion Rials ({uncontracted_pct} of credits)
- Contracts Without Payments: {unpaid} billion Rials ({unpaid_pct} of contracts)

ANALYSIS REQUIREMENTS:
1. Assess the efficiency of the credit flow
2. Identify where the largest drops occur
3. Evaluate performance against the legal requirement ({target:.0}% of the research budget through SATC)
4. Compare the contract rate with the payment rate
5. Provide 3-4 key insights in Persian

OUTPUT FORMAT:
Write in professional Persian, 3-4 paragraphs, analytical tone.",
        credit = billions(k.total_credit),
        contract = billions(k.total_contract),
        contract_pct = pct(k.contract_pct),
        payment = billions(k.total_payment),
        payment_pct = pct(k.payment_pct),
        uncontracted = billions(remainder(k.total_credit, k.total_contract)),
        uncontracted_pct = pct(complement(k.contract_pct)),
        unpaid = billions(remainder(k.total_contract, k.total_payment)),
        unpaid_pct = pct(complement(k.payment_from_contract_pct)),
        target = CONTRACT_TARGET,
    )
}

fn distribution_prompt(number: u32, k: &Kpis) -> String {
    let c = k.credit_concentration.as_ref();
    let or_dash = |v: Option<f64>, d: usize| v.map_or("-".to_string(), |v| format!("{:.*}", d, v));
    format!(
        "SECTION A - ANALYSIS PROMPT FOR CHART 1-{number}

Analyze how mandatory credits are distributed across subjects.

DISTRIBUTION:
- Subjects counted: {subjects}
- Mean credit: {mean:.1} billion Rials
- Median credit: {median:.1} billion Rials
- Standard deviation: {std:.1} billion Rials
- Top 10 subjects hold: {top10}%
- Top 20% of subjects hold: {top20}%
- Subjects needed for 80% of credits: {for80}
- Gini coefficient: {gini}

ANALYSIS REQUIREMENTS:
1. Describe the shape of the distribution and the gap between mean and median
2. Evaluate how concentrated the credits are
3. Discuss what the concentration implies for follow-up with the largest subjects

OUTPUT FORMAT:
Write in professional Persian, 2-3 paragraphs.",
        subjects = k.subjects,
        mean = k.credit_mean,
        median = k.credit_median,
        std = k.credit_std_dev,
        top10 = or_dash(c.map(|c| c.top10_share), 1),
        top20 = or_dash(c.map(|c| c.top20pct_share), 1),
        for80 = c.map_or("-".to_string(), |c| c.entities_for_80pct.to_string()),
        gini = or_dash(c.map(|c| c.gini), 3),
    )
}

fn kpi_prompt(k: &Kpis) -> String {
    format!(
        "SECTION A - ANALYSIS PROMPT FOR KEY PERFORMANCE INDICATORS

KPI VALUES:
1. Contract Achievement Rate: {c}
   - Target threshold: {ct:.0}%
   - Status: {cs}

2. Payment from Total Credits: {p}
   - Target threshold: {pt:.0}%
   - Status: {ps}

3. Payment from Contracts: {pc}
   - Target threshold: {pct_t:.0}%
   - Status: {pcs}

ANALYSIS REQUIREMENTS:
1. Evaluate each KPI against its target threshold
2. Analyze the relationship between the three indicators
3. Identify the weakest link (contracting vs payment execution)
4. Provide actionable recommendations

OUTPUT FORMAT:
Write in professional Persian, 3-4 paragraphs, including the percentages and targets.",
        c = pct(k.contract_pct),
        ct = CONTRACT_TARGET,
        cs = status(k.contract_pct, CONTRACT_TARGET),
        p = pct(k.payment_pct),
        pt = PAYMENT_TARGET,
        ps = status(k.payment_pct, PAYMENT_TARGET),
        pc = pct(k.payment_from_contract_pct),
        pct_t = PAYMENT_FROM_CONTRACT_TARGET,
        pcs = status(k.payment_from_contract_pct, PAYMENT_FROM_CONTRACT_TARGET),
    )
}

fn synthesis_prompt(k: &Kpis, o: &Overview) -> String {
    format!(
        "SECTION A - SYNTHESIS PROMPT FOR CHAPTER 1

OVERALL STATISTICS:
- Total subjects: {subjects}
- Subjects with contracts: {with} ({with_pct})
- Subjects without contracts: {without}
- Active universities in contracts: {unis_c}
- Universities receiving payments: {unis_p}
- Total number of contracts: {contracts}
- Executive departments: {departments}

FINANCIAL FLOW:
- Credits -> Contracts: {cp}
- Credits -> Payments: {pp}
- Contracts -> Payments: {pcp}

ANALYSIS REQUIREMENTS:
1. Summarize the overall health of the system
2. Identify the most critical challenge (participation, contracting or payment)
3. Provide strategic recommendations

OUTPUT FORMAT:
Write in professional Persian, 2-3 paragraphs, forward-looking tone.",
        subjects = o.subjects,
        with = o.subjects_with_contracts,
        with_pct = pct(Ratio::percent(o.subjects_with_contracts as f64, o.subjects as f64)),
        without = o.subjects - o.subjects_with_contracts,
        unis_c = o.universities_with_contracts,
        unis_p = o.universities_with_payments,
        contracts = o.contract_count,
        departments = o.departments,
        cp = pct(k.contract_pct),
        pp = pct(k.payment_pct),
        pcp = pct(k.payment_from_contract_pct),
    )
}

/// Which prompt a figure gets: distribution figures talk about concentration,
/// everything else about the credit flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Flow,
    Distribution,
}

pub fn render_prompts(
    k: &Kpis,
    o: &Overview,
    figures: &[(PromptFigure, PromptKind)],
    generated_at: DateTime<Local>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# فصل اول: مقدمه و کلیات سامانه ساتع\n");
    let _ = writeln!(out, "## آمار کلی عملکرد\n");
    let _ = writeln!(out, "| شاخص | مقدار |\n|------|-------|");
    let rows: [(&str, String); 12] = [
        ("تعداد کل مشمولین", o.subjects.to_string()),
        ("تعداد مشمولین با قرارداد", o.subjects_with_contracts.to_string()),
        ("تعداد مشمولین بدون قرارداد", (o.subjects - o.subjects_with_contracts).to_string()),
        ("تعداد دستگاه‌های اجرایی", o.departments.to_string()),
        ("تعداد دانشگاه‌های فعال در قرارداد", o.universities_with_contracts.to_string()),
        ("تعداد دانشگاه‌های دریافت‌کننده پرداخت", o.universities_with_payments.to_string()),
        ("تعداد کل قراردادها", o.contract_count.to_string()),
        ("جمع اعتبارات تکلیفی", format!("{} میلیارد ریال", billions(k.total_credit))),
        ("جمع مبلغ قراردادها", format!("{} میلیارد ریال", billions(k.total_contract))),
        ("جمع پرداخت‌ها", format!("{} میلیارد ریال", billions(k.total_payment))),
        ("درصد تحقق قرارداد", pct(k.contract_pct)),
        ("درصد پرداخت از قرارداد", pct(k.payment_from_contract_pct)),
    ];
    for (name, value) in rows {
        let _ = writeln!(out, "| {} | {} |", name, value);
    }
    let _ = writeln!(out, "\n---\n\n## نمودارهای فصل اول\n");

    for (fig, kind) in figures {
        let prompt = match kind {
            PromptKind::Flow => flow_prompt(fig.number, k),
            PromptKind::Distribution => distribution_prompt(fig.number, k),
        };
        section(
            &mut out,
            &format!("نمودار 1-{}: {}", fig.number, fig.title),
            Some(&fig.files),
            &prompt,
            &format!("تحلیل نمودار 1-{} در اینجا قرار می‌گیرد", fig.number),
        );
    }

    section(
        &mut out,
        "شاخص‌های کلیدی عملکرد",
        None,
        &kpi_prompt(k),
        "تحلیل شاخص‌های کلیدی در اینجا قرار می‌گیرد",
    );
    section(
        &mut out,
        "نتیجه‌گیری بخش آمار کلی",
        None,
        &synthesis_prompt(k, o),
        "نتیجه‌گیری کلی فصل اول در اینجا قرار می‌گیرد",
    );
    let _ = writeln!(
        out,
        "*تاریخ تولید گزارش: {}*",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    out
}

pub fn write_analysis_prompts(
    path: &Path,
    k: &Kpis,
    o: &Overview,
    figures: &[(PromptFigure, PromptKind)],
) -> std::io::Result<()> {
    std::fs::write(path, render_prompts(k, o, figures, Local::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kpis() -> Kpis {
        Kpis {
            total_credit: 1.5,
            total_contract: 0.3,
            total_payment: 0.15,
            deposited_to_fund: None,
            deposited_pct: Ratio::UNDEFINED,
            contract_pct: Ratio(Some(20.0)),
            payment_pct: Ratio(Some(45.0)),
            payment_from_contract_pct: Ratio::UNDEFINED,
            subjects: 2,
            credit_mean: 0.75,
            credit_median: 0.75,
            credit_std_dev: 0.35,
            credit_concentration: None,
        }
    }

    #[test]
    fn test_status_against_targets() {
        assert_eq!(status(Ratio(Some(60.0)), CONTRACT_TARGET), "Above target");
        assert_eq!(status(Ratio(Some(59.9)), CONTRACT_TARGET), "Below target");
        assert_eq!(status(Ratio::UNDEFINED, PAYMENT_TARGET), "Undefined");
    }

    #[test]
    fn test_render_prompts() {
        let at = Local.with_ymd_and_hms(2025, 10, 1, 9, 30, 0).unwrap();
        let figure = PromptFigure {
            number: 3,
            title: "پارتو".to_string(),
            files: vec![PathBuf::from("figs/s1/chart_1_3.png")],
        };
        let md = render_prompts(
            &kpis(),
            &Overview::default(),
            &[(figure, PromptKind::Distribution)],
            at,
        );
        assert!(md.starts_with("# فصل اول"));
        assert!(md.contains("### نمودار 1-3: پارتو"));
        assert!(md.contains("`figs/s1/chart_1_3.png`"));
        assert!(md.contains("Contract Achievement Rate: 20.0%"));
        assert!(md.contains("Status: Below target"));
        // payment 45% beats the 40% target
        assert!(md.contains("Status: Above target"));
        assert!(md.contains("Payment from Contracts: -"));
        assert!(md.contains("Gini coefficient: -"));
        assert!(md.ends_with("*تاریخ تولید گزارش: 2025-10-01 09:30:00*\n"));
    }
}
