use crate::config::{ColumnConfig, Config};
use crate::error::{ReportError, Result};
use crate::sample;
use crate::types::{AmountKind, Record, UNKNOWN_LABEL};
use crate::util::{normalize_letters, parse_f64_safe, parse_i32_safe};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl From<&Data> for Cell {
    fn from(d: &Data) -> Self {
        match d {
            Data::Empty => Cell::Empty,
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// A sheet read into memory: one header row plus data rows.
#[derive(Debug, Clone)]
pub struct Table {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Column index by header name; whitespace and Arabic/Persian letter
    /// variants are ignored.
    pub fn column(&self, name: &str) -> Option<usize> {
        let wanted = normalize_letters(name);
        self.headers
            .iter()
            .position(|h| normalize_letters(h) == wanted)
    }

    fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&Cell::Empty)
    }

    pub fn text(&self, row: usize, col: usize) -> Option<String> {
        match self.cell(row, col) {
            Cell::Empty => None,
            Cell::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
        }
    }
}

/// Outcome of turning one table into records.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub path: PathBuf,
    pub total_rows: usize,
    pub parse_errors: usize,
    pub missing_columns: Vec<String>,
}

impl LoadReport {
    fn new(table: &Table) -> Self {
        Self {
            path: table.path.clone(),
            total_rows: table.rows.len(),
            ..Default::default()
        }
    }

    /// Column lookup that records (and warns about) a missing header.
    fn require(&mut self, table: &Table, name: &str, fallback: &str) -> Option<usize> {
        let idx = table.column(name);
        if idx.is_none() {
            warn!(
                "column '{}' missing in {}; using {}",
                name,
                table.path.display(),
                fallback
            );
            self.missing_columns.push(name.to_string());
        }
        idx
    }

    /// Amount cell as million rials. Blank and missing read as zero; text that
    /// is not a number also reads as zero and counts as a parse error.
    fn amount(&mut self, table: &Table, row: usize, col: Option<usize>) -> f64 {
        let Some(col) = col else {
            return 0.0;
        };
        match table.cell(row, col) {
            Cell::Empty => 0.0,
            Cell::Number(n) if n.is_finite() => *n,
            Cell::Number(_) => {
                self.parse_errors += 1;
                0.0
            }
            Cell::Text(s) => parse_f64_safe(Some(s)).unwrap_or_else(|| {
                self.parse_errors += 1;
                0.0
            }),
        }
    }
}

fn text_or_unknown(table: &Table, row: usize, col: Option<usize>) -> String {
    col.and_then(|c| table.text(row, c))
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}

/// Read the first (or the named) sheet of a workbook, or a CSV file.
pub fn read_table(path: &Path, sheet: Option<&str>) -> Result<Table> {
    if !path.exists() {
        return Err(ReportError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    let table = if is_csv {
        read_csv_table(path)?
    } else {
        read_workbook_table(path, sheet)?
    };
    debug!(
        "read {} ({} columns, {} rows)",
        path.display(),
        table.headers.len(),
        table.rows.len()
    );
    Ok(table)
}

fn unreadable(path: &Path, reason: impl ToString) -> ReportError {
    ReportError::UnreadableInput {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_workbook_table(path: &Path, sheet: Option<&str>) -> Result<Table> {
    let mut workbook = open_workbook_auto(path).map_err(|e| unreadable(path, e))?;
    let names = workbook.sheet_names();
    let name = match sheet {
        Some(wanted) => {
            let wanted_norm = normalize_letters(wanted);
            names
                .iter()
                .find(|n| normalize_letters(n) == wanted_norm)
                .cloned()
                .ok_or_else(|| ReportError::MissingSheet {
                    path: path.to_path_buf(),
                    sheet: wanted.to_string(),
                })?
        }
        None => names.first().cloned().ok_or_else(|| ReportError::EmptyInput {
            path: path.to_path_buf(),
        })?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| unreadable(path, e))?;

    let mut rows = range.rows();
    let header = rows.next().ok_or_else(|| ReportError::EmptyInput {
        path: path.to_path_buf(),
    })?;
    let headers = header.iter().map(|c| c.to_string().trim().to_string()).collect();
    let rows = rows
        .filter(|r| r.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|r| r.iter().map(Cell::from).collect())
        .collect();
    Ok(Table {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

fn read_csv_table(path: &Path) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| unreadable(path, e))?;
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| unreadable(path, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ReportError::EmptyInput {
            path: path.to_path_buf(),
        });
    }
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| unreadable(path, e))?;
        rows.push(
            record
                .iter()
                .map(|s| {
                    if s.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(s.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(Table {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

/// Contract rows become one `Contract` record each. The subject's credit is
/// repeated on each of its rows, so credits become one `Credit` record per
/// subject carrying the first non-blank value.
pub fn load_contracts(table: &Table, cols: &ColumnConfig) -> (Vec<Record>, LoadReport) {
    let mut report = LoadReport::new(table);
    let subject_col = report.require(table, &cols.subject, UNKNOWN_LABEL);
    let dept_col = report.require(table, &cols.department, UNKNOWN_LABEL);
    let uni_col = report.require(table, &cols.university, UNKNOWN_LABEL);
    let credit_col = report.require(table, &cols.credit, "zero");
    let amount_col = report.require(table, &cols.contract_amount, "zero");

    let mut records = Vec::with_capacity(table.rows.len());
    // subject → (department, first credit); `order` keeps first-seen order.
    let mut credits: HashMap<String, (Option<String>, Option<f64>)> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for row in 0..table.rows.len() {
        let subject = text_or_unknown(table, row, subject_col);
        let department = dept_col.and_then(|c| table.text(row, c));
        let university = uni_col.and_then(|c| table.text(row, c));
        let amount = report.amount(table, row, amount_col);

        let credit = credit_col
            .filter(|c| !matches!(table.cell(row, *c), Cell::Empty))
            .map(|c| report.amount(table, row, Some(c)));
        let entry = credits.entry(subject.clone()).or_insert_with(|| {
            order.push(subject.clone());
            (department.clone(), None)
        });
        if entry.1.is_none() {
            entry.1 = credit;
        }
        if entry.0.is_none() {
            entry.0 = department.clone();
        }

        records.push(
            Record::new(AmountKind::Contract, subject, amount)
                .with_department(department)
                .with_university(university),
        );
    }

    for subject in order {
        if let Some((department, credit)) = credits.remove(&subject) {
            records.push(
                Record::new(AmountKind::Credit, subject, credit.unwrap_or(0.0))
                    .with_department(department),
            );
        }
    }
    (records, report)
}

/// Payment rows become one `Payment` record each.
pub fn load_payments(table: &Table, cols: &ColumnConfig) -> (Vec<Record>, LoadReport) {
    let mut report = LoadReport::new(table);
    let subject_col = report.require(table, &cols.subject, UNKNOWN_LABEL);
    let uni_col = report.require(table, &cols.university, UNKNOWN_LABEL);
    let amount_col = report.require(table, &cols.payment_amount, "zero");
    // The payments export does not always carry the department.
    let dept_col = table.column(&cols.department);

    let records = (0..table.rows.len())
        .map(|row| {
            let amount = report.amount(table, row, amount_col);
            Record::new(
                AmountKind::Payment,
                text_or_unknown(table, row, subject_col),
                amount,
            )
            .with_department(dept_col.and_then(|c| table.text(row, c)))
            .with_university(uni_col.and_then(|c| table.text(row, c)))
        })
        .collect();
    (records, report)
}

/// One `Credit` record per entity and configured year.
pub fn load_credit_history(table: &Table, cols: &ColumnConfig) -> (Vec<Record>, LoadReport) {
    let mut report = LoadReport::new(table);
    let subject_col = report.require(table, &cols.subject, UNKNOWN_LABEL);
    let dept_col = report.require(table, &cols.department, UNKNOWN_LABEL);
    let year_cols: Vec<(i32, Option<usize>)> = cols
        .history_years
        .iter()
        .filter_map(|(year, header)| {
            let year = parse_i32_safe(Some(year))?;
            Some((year, report.require(table, header, "zero")))
        })
        .collect();

    let mut records = Vec::new();
    for row in 0..table.rows.len() {
        let subject = text_or_unknown(table, row, subject_col);
        let department = dept_col.and_then(|c| table.text(row, c));
        for (year, col) in &year_cols {
            let amount = report.amount(table, row, *col);
            records.push(
                Record::new(AmountKind::Credit, subject.clone(), amount)
                    .with_department(department.clone())
                    .with_year(*year),
            );
        }
    }
    (records, report)
}

/// Everything one run reads.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Contract records plus one credit record per subject.
    pub contracts: Vec<Record>,
    pub payments: Vec<Record>,
    /// Per-year credits; `None` when neither the workbook nor sample data is
    /// available.
    pub history: Option<Vec<Record>>,
    pub history_is_sample: bool,
    pub reports: Vec<LoadReport>,
}

impl Dataset {
    /// Credit, contract and payment records together.
    pub fn records(&self) -> Vec<Record> {
        self.contracts
            .iter()
            .chain(self.payments.iter())
            .cloned()
            .collect()
    }
}

fn log_report(label: &str, report: &LoadReport) {
    info!(
        "{}: {} rows from {}",
        label,
        report.total_rows,
        report.path.display()
    );
    if report.parse_errors > 0 {
        warn!(
            "{}: {} cells could not be read as numbers and count as zero",
            label, report.parse_errors
        );
    }
}

/// Load the contracts, payments and (optional) history inputs.
///
/// A missing or unreadable contracts / payments file is fatal. A missing
/// history workbook falls back to sample data when configured.
pub fn load_dataset(config: &Config) -> Result<Dataset> {
    let inputs = &config.inputs;
    let cols = &config.columns;

    let table = read_table(&inputs.resolve(&inputs.contracts), None)?;
    let (contracts, contracts_report) = load_contracts(&table, cols);
    log_report("contracts", &contracts_report);

    let table = read_table(&inputs.resolve(&inputs.payments), None)?;
    let (payments, payments_report) = load_payments(&table, cols);
    log_report("payments", &payments_report);

    let mut reports = vec![contracts_report, payments_report];
    let mut history_is_sample = false;
    let history = match &inputs.credits_history {
        None => None,
        Some(rel) => {
            let path = inputs.resolve(rel);
            if path.exists() {
                let table = read_table(&path, inputs.credits_history_sheet.as_deref())?;
                let (records, report) = load_credit_history(&table, cols);
                log_report("credits history", &report);
                reports.push(report);
                Some(records)
            } else if config.report.sample_fallback {
                warn!(
                    "{} not found; using generated sample data for the yearly credit figures",
                    path.display()
                );
                history_is_sample = true;
                Some(sample::sample_history(42))
            } else {
                warn!(
                    "{} not found; yearly credit figures will be skipped",
                    path.display()
                );
                None
            }
        }
    };

    Ok(Dataset {
        contracts,
        payments,
        history,
        history_is_sample,
        reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::province::Province;
    use std::io::Write;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn contracts_table() -> Table {
        Table {
            path: PathBuf::from("contracts.xlsx"),
            headers: vec![
                "نام مشمول".into(),
                "دستگاه اجرايي مرتبط".into(),
                "دانشگاه".into(),
                "اعتبار سال 1404".into(),
                "مجموع مبالغ قراردادها".into(),
            ],
            rows: vec![
                vec![text("A"), text("D1"), text("دانشگاه تهران"), Cell::Empty, Cell::Number(100.0)],
                vec![text("A"), text("D1"), text("دانشگاه شیراز"), Cell::Number(1000.0), Cell::Number(200.0)],
                vec![text("A"), text("D1"), Cell::Empty, Cell::Number(999.0), text("n/a")],
                vec![text("B"), Cell::Empty, text("جای دیگر"), Cell::Number(500.0), text("1,500")],
            ],
        }
    }

    #[test]
    fn test_contracts_credit_is_first_non_blank_per_subject() {
        let (records, report) = load_contracts(&contracts_table(), &ColumnConfig::default());
        let credits: Vec<&Record> = records.iter().filter(|r| r.kind == AmountKind::Credit).collect();
        assert_eq!(credits.len(), 2);
        assert_eq!(credits[0].subject, "A");
        assert_eq!(credits[0].amount, 1000.0);
        assert_eq!(credits[0].department.as_deref(), Some("D1"));
        assert_eq!(credits[1].amount, 500.0);

        let contracts: Vec<&Record> = records.iter().filter(|r| r.kind == AmountKind::Contract).collect();
        assert_eq!(contracts.len(), 4);
        assert_eq!(contracts[0].province, Province::Known("تهران"));
        assert_eq!(contracts[2].province, Province::Unknown);
        assert_eq!(contracts[3].province, Province::Other);
        assert_eq!(contracts[3].amount, 1500.0);
        // "n/a" in the amount column
        assert_eq!(report.parse_errors, 1);
        assert!(report.missing_columns.is_empty());
    }

    #[test]
    fn test_missing_amount_column_falls_back_to_zero() {
        let mut table = contracts_table();
        table.headers[4] = "ستون تغییر نام یافته".into();
        let (records, report) = load_contracts(&table, &ColumnConfig::default());
        assert_eq!(report.missing_columns, vec!["مجموع مبالغ قراردادها".to_string()]);
        assert!(records
            .iter()
            .filter(|r| r.kind == AmountKind::Contract)
            .all(|r| r.amount == 0.0));
    }

    #[test]
    fn test_missing_subject_column_uses_unknown_label() {
        let mut table = contracts_table();
        table.headers[0] = "x".into();
        let (records, _) = load_contracts(&table, &ColumnConfig::default());
        assert!(records.iter().all(|r| r.subject == UNKNOWN_LABEL));
    }

    #[test]
    fn test_read_csv_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payments.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "نام مشمول,دانشگاه,مجموع مبالغ پرداختی").unwrap();
        writeln!(f, "A,دانشگاه تبریز,\"1,250\"").unwrap();
        writeln!(f, "B,,").unwrap();
        drop(f);

        let table = read_table(&path, None).unwrap();
        let (records, report) = load_payments(&table, &ColumnConfig::default());
        assert_eq!(report.total_rows, 2);
        assert_eq!(records[0].amount, 1250.0);
        assert_eq!(records[0].province.label(), "آذربایجان شرقی");
        assert_eq!(records[1].amount, 0.0);
        assert_eq!(records[1].province, Province::Unknown);

        let missing = read_table(&dir.path().join("nope.xlsx"), None);
        assert!(matches!(missing, Err(ReportError::InputNotFound { .. })));
    }

    #[test]
    fn test_unreadable_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        assert!(matches!(
            read_table(&path, None),
            Err(ReportError::UnreadableInput { .. })
        ));
    }

    #[test]
    fn test_credit_history_records_per_year() {
        let table = Table {
            path: PathBuf::from("history.xlsx"),
            headers: vec![
                "نام مشمول".into(),
                "دستگاه اجرایی مرتبط".into(),
                "اعتبار 40% سال 1398".into(),
                "اعتبار 60% سال 1404".into(),
            ],
            rows: vec![vec![text("A"), text("D"), Cell::Number(10.0), Cell::Number(30.0)]],
        };
        let (records, report) = load_credit_history(&table, &ColumnConfig::default());
        // Four of the six default year columns are absent.
        assert_eq!(report.missing_columns.len(), 4);
        let total_1404: f64 = records
            .iter()
            .filter(|r| r.year == Some(1404))
            .map(|r| r.amount)
            .sum();
        assert_eq!(total_1404, 30.0);
        assert!(records.iter().all(|r| r.kind == AmountKind::Credit));
    }
}
