use crate::locale::format_plain;
use crate::province::Province;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

/// Label used for a missing grouping attribute. Shared with the province
/// sentinel so that "no university" and "no province" read the same.
pub const UNKNOWN_LABEL: &str = "نامشخص";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountKind {
    Credit,
    Contract,
    Payment,
}

/// Attribute a set of records can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Subject,
    Department,
    University,
    Province,
    Year,
}

/// One row of source data, in million rials. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub subject: String,
    pub department: Option<String>,
    pub university: Option<String>,
    pub province: Province,
    pub year: Option<i32>,
    pub kind: AmountKind,
    pub amount: f64,
}

impl Record {
    pub fn new(kind: AmountKind, subject: impl Into<String>, amount: f64) -> Self {
        Self {
            subject: subject.into(),
            department: None,
            university: None,
            province: Province::Unknown,
            year: None,
            kind,
            amount,
        }
    }

    pub fn with_department(mut self, department: Option<String>) -> Self {
        self.department = department;
        self
    }

    /// Sets the university and derives the province from it.
    pub fn with_university(mut self, university: Option<String>) -> Self {
        self.province = crate::province::province_of(university.as_deref());
        self.university = university;
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Grouping value for `key`; `None` when the record lacks that attribute.
    pub fn key(&self, key: GroupKey) -> Option<String> {
        match key {
            GroupKey::Subject => Some(self.subject.clone()),
            GroupKey::Department => self.department.clone(),
            GroupKey::University => self.university.clone(),
            GroupKey::Province => Some(self.province.label().to_string()),
            GroupKey::Year => self.year.map(|y| y.to_string()),
        }
    }
}

/// A percentage that may be undefined.
///
/// `Ratio(None)` is the sentinel for a nonzero amount measured against a zero
/// base. It serializes as an empty CSV cell / JSON `null` and displays as `-`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Ratio(pub Option<f64>);

impl Ratio {
    pub const UNDEFINED: Ratio = Ratio(None);

    /// `part / base * 100`, with `0 / 0 = 0` and `x / 0 = UNDEFINED`.
    pub fn percent(part: f64, base: f64) -> Self {
        if base == 0.0 {
            if part == 0.0 {
                Ratio(Some(0.0))
            } else {
                Ratio::UNDEFINED
            }
        } else {
            Ratio(Some(part / base * 100.0))
        }
    }

    /// `part / base * 100`, undefined whenever the base is zero.
    pub fn percent_strict(part: f64, base: f64) -> Self {
        if base == 0.0 {
            Ratio::UNDEFINED
        } else {
            Ratio(Some(part / base * 100.0))
        }
    }

    pub fn value(self) -> Option<f64> {
        self.0
    }

    pub fn is_undefined(self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{:.1}", v),
            None => write!(f, "-"),
        }
    }
}

/// Summed amounts for one entity key.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateRow {
    pub key: String,
    pub credit: f64,
    pub contract: f64,
    pub payment: f64,
    pub contract_count: usize,
    pub payment_count: usize,
}

impl AggregateRow {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn amount(&self, kind: AmountKind) -> f64 {
        match kind {
            AmountKind::Credit => self.credit,
            AmountKind::Contract => self.contract,
            AmountKind::Payment => self.payment,
        }
    }

    pub(crate) fn add(&mut self, kind: AmountKind, amount: f64) {
        match kind {
            AmountKind::Credit => self.credit += amount,
            AmountKind::Contract => {
                self.contract += amount;
                self.contract_count += 1;
            }
            AmountKind::Payment => {
                self.payment += amount;
                self.payment_count += 1;
            }
        }
    }

    /// Contract amount as a percentage of credit.
    pub fn contract_pct(&self) -> Ratio {
        Ratio::percent(self.contract, self.credit)
    }

    /// Payment amount as a percentage of credit.
    pub fn payment_pct(&self) -> Ratio {
        Ratio::percent(self.payment, self.credit)
    }

    /// Payment amount as a percentage of the contracted amount. Undefined
    /// when nothing was contracted.
    pub fn payment_from_contract_pct(&self) -> Ratio {
        Ratio::percent_strict(self.payment, self.contract)
    }
}

fn display_amount(v: &f64) -> String {
    format_plain(*v, 2)
}

/// Per-entity export row; amounts in billion rials.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SummaryRow {
    #[serde(rename = "عنوان")]
    #[tabled(rename = "عنوان")]
    pub key: String,
    #[serde(rename = "اعتبار (میلیارد ریال)")]
    #[tabled(rename = "اعتبار (میلیارد ریال)", display_with = "display_amount")]
    pub credit: f64,
    #[serde(rename = "مبلغ قرارداد (میلیارد ریال)")]
    #[tabled(rename = "مبلغ قرارداد (میلیارد ریال)", display_with = "display_amount")]
    pub contract: f64,
    #[serde(rename = "مبلغ پرداخت (میلیارد ریال)")]
    #[tabled(rename = "مبلغ پرداخت (میلیارد ریال)", display_with = "display_amount")]
    pub payment: f64,
    #[serde(rename = "تعداد قرارداد")]
    #[tabled(rename = "تعداد قرارداد")]
    pub contract_count: usize,
    #[serde(rename = "درصد قرارداد")]
    #[tabled(rename = "درصد قرارداد")]
    pub contract_pct: Ratio,
    #[serde(rename = "درصد پرداخت از اعتبار")]
    #[tabled(rename = "درصد پرداخت از اعتبار")]
    pub payment_pct: Ratio,
    #[serde(rename = "درصد پرداخت از قرارداد")]
    #[tabled(rename = "درصد پرداخت از قرارداد")]
    pub payment_from_contract_pct: Ratio,
    #[serde(rename = "سهم از کل (%)")]
    #[tabled(rename = "سهم از کل (%)")]
    pub share_pct: Ratio,
}

fn display_stat(v: &Ratio) -> String {
    match v.value() {
        Some(x) if x.abs() < 1.0 => format_plain(x, 3),
        Some(x) => format_plain(x, 2),
        None => "-".to_string(),
    }
}

/// One `(indicator, value)` line of a chapter statistics sheet.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct StatRow {
    #[serde(rename = "شاخص")]
    #[tabled(rename = "شاخص")]
    pub indicator: String,
    #[serde(rename = "مقدار")]
    #[tabled(rename = "مقدار", display_with = "display_stat")]
    pub value: Ratio,
}

impl StatRow {
    pub fn new(indicator: impl Into<String>, value: impl Into<Ratio>) -> Self {
        Self {
            indicator: indicator.into(),
            value: value.into(),
        }
    }
}

impl From<f64> for Ratio {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            Ratio(Some(v))
        } else {
            Ratio::UNDEFINED
        }
    }
}

impl From<usize> for Ratio {
    fn from(v: usize) -> Self {
        Ratio(Some(v as f64))
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ProvinceRow {
    #[serde(rename = "استان")]
    #[tabled(rename = "استان")]
    pub province: String,
    #[serde(rename = "مبلغ قرارداد (میلیارد)")]
    #[tabled(rename = "مبلغ قرارداد (میلیارد)", display_with = "display_amount")]
    pub contract: f64,
    #[serde(rename = "مبلغ پرداخت (میلیارد)")]
    #[tabled(rename = "مبلغ پرداخت (میلیارد)", display_with = "display_amount")]
    pub payment: f64,
    #[serde(rename = "تعداد دانشگاه")]
    #[tabled(rename = "تعداد دانشگاه")]
    pub universities: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_policy() {
        assert_eq!(Ratio::percent(0.0, 0.0), Ratio(Some(0.0)));
        assert!(Ratio::percent(50.0, 0.0).is_undefined());
        assert_eq!(Ratio::percent(30.0, 100.0), Ratio(Some(30.0)));
        assert!(Ratio::percent_strict(0.0, 0.0).is_undefined());
        assert_eq!(Ratio::from(f64::NAN), Ratio::UNDEFINED);
    }

    #[test]
    fn test_ratio_display() {
        assert_eq!(Ratio(Some(12.345)).to_string(), "12.3");
        assert_eq!(Ratio::UNDEFINED.to_string(), "-");
    }

    #[test]
    fn test_record_key_for_missing_attribute() {
        let r = Record::new(AmountKind::Credit, "A", 10.0);
        assert_eq!(r.key(GroupKey::Subject).as_deref(), Some("A"));
        assert_eq!(r.key(GroupKey::University), None);
        assert_eq!(r.key(GroupKey::Province).as_deref(), Some(UNKNOWN_LABEL));
    }
}
