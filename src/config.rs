//! Configuration file handling.
//!
//! Loads `satc-report.toml`. Every field has a default matching the report
//! workspace layout (`./data/*.xlsx`, `./figs/sN`), so the
//! file is optional.

use crate::locale::DigitSystem;
use crate::pipeline::{default_figures, FigureSpec};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "satc-report.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inputs: InputConfig,

    #[serde(default)]
    pub columns: ColumnConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub render: RenderConfig,

    /// Figures to produce, in order.
    #[serde(default = "default_figures")]
    pub figures: Vec<FigureSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inputs: InputConfig::default(),
            columns: ColumnConfig::default(),
            report: ReportConfig::default(),
            render: RenderConfig::default(),
            figures: default_figures(),
        }
    }
}

/// Input files, relative to `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_contracts")]
    pub contracts: PathBuf,

    #[serde(default = "default_payments")]
    pub payments: PathBuf,

    /// Multi-year credits table; optional.
    #[serde(default = "default_history")]
    pub credits_history: Option<PathBuf>,

    #[serde(default = "default_history_sheet")]
    pub credits_history_sheet: Option<String>,

    /// GeoJSON with one feature per province; optional.
    #[serde(default = "default_geo")]
    pub geo: Option<PathBuf>,

    /// Feature property holding the province name.
    #[serde(default = "default_geo_name_property")]
    pub geo_name_property: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            contracts: default_contracts(),
            payments: default_payments(),
            credits_history: default_history(),
            credits_history_sheet: default_history_sheet(),
            geo: default_geo(),
            geo_name_property: default_geo_name_property(),
        }
    }
}

impl InputConfig {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_contracts() -> PathBuf {
    PathBuf::from("Credits_Contracts.xlsx")
}

fn default_payments() -> PathBuf {
    PathBuf::from("Credits_Payments.xlsx")
}

fn default_history() -> Option<PathBuf> {
    Some(PathBuf::from("Research-Credibility.xlsx"))
}

fn default_history_sheet() -> Option<String> {
    Some("هزینه پژوهشی (میلیون)".to_string())
}

fn default_geo() -> Option<PathBuf> {
    Some(PathBuf::from("iran_provinces.geojson"))
}

fn default_geo_name_property() -> String {
    "name".to_string()
}

/// Header names in the source workbooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default = "default_subject_col")]
    pub subject: String,

    #[serde(default = "default_department_col")]
    pub department: String,

    #[serde(default = "default_university_col")]
    pub university: String,

    /// Credit of the report year, repeated on every contract row of a subject.
    #[serde(default = "default_credit_col")]
    pub credit: String,

    #[serde(default = "default_contract_col")]
    pub contract_amount: String,

    #[serde(default = "default_payment_col")]
    pub payment_amount: String,

    /// Year → header of the per-year credit columns in the history table.
    #[serde(default = "default_history_cols")]
    pub history_years: BTreeMap<String, String>,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            subject: default_subject_col(),
            department: default_department_col(),
            university: default_university_col(),
            credit: default_credit_col(),
            contract_amount: default_contract_col(),
            payment_amount: default_payment_col(),
            history_years: default_history_cols(),
        }
    }
}

fn default_subject_col() -> String {
    "نام مشمول".to_string()
}

fn default_department_col() -> String {
    "دستگاه اجرایی مرتبط".to_string()
}

fn default_university_col() -> String {
    "دانشگاه".to_string()
}

fn default_credit_col() -> String {
    "اعتبار سال 1404".to_string()
}

fn default_contract_col() -> String {
    "مجموع مبالغ قراردادها".to_string()
}

fn default_payment_col() -> String {
    "مجموع مبالغ پرداختی".to_string()
}

fn default_history_cols() -> BTreeMap<String, String> {
    [
        ("1398", "اعتبار 40% سال 1398"),
        ("1399", "اعتبار 40% سال 1399"),
        ("1400", "اعتبار 40% سال 1400"),
        ("1401", "اعتبار 40% سال 1401"),
        ("1402", "اعتبار 60% سال 1402"),
        ("1404", "اعتبار 60% سال 1404"),
    ]
    .into_iter()
    .map(|(y, h)| (y.to_string(), h.to_string()))
    .collect()
}

/// Report-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Source amounts are in million rials; charts and tables divide by this
    /// to show billions.
    #[serde(default = "default_unit_divisor")]
    pub unit_divisor: f64,

    /// Subjects at or below this credit (million rials) are left out of the
    /// distribution figures.
    #[serde(default = "default_min_credit")]
    pub min_credit: f64,

    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Amount already deposited to the research fund, in million rials.
    /// Not derivable from the workbooks.
    #[serde(default = "default_deposited")]
    pub deposited_to_fund: Option<f64>,

    /// Use generated sample data when the credits history workbook is missing.
    #[serde(default = "default_true")]
    pub sample_fallback: bool,

    #[serde(default = "default_true")]
    pub write_prompts: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            unit_divisor: default_unit_divisor(),
            min_credit: default_min_credit(),
            top_n: default_top_n(),
            deposited_to_fund: default_deposited(),
            sample_fallback: true,
            write_prompts: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("figs")
}

fn default_unit_divisor() -> f64 {
    1000.0
}

fn default_min_credit() -> f64 {
    100.0
}

fn default_top_n() -> usize {
    15
}

fn default_deposited() -> Option<f64> {
    Some(4_228_781.0)
}

fn default_true() -> bool {
    true
}

/// Rendering settings handed to every chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_font_family")]
    pub font_family: String,

    #[serde(default)]
    pub digits: DigitSystem,

    /// Shape and reorder labels for right-to-left display.
    #[serde(default = "default_true")]
    pub rtl: bool,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Image file extensions; each figure is written once per entry.
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_family: default_font_family(),
            digits: DigitSystem::Persian,
            rtl: true,
            width: default_width(),
            height: default_height(),
            formats: default_formats(),
        }
    }
}

fn default_font_family() -> String {
    "Vazirmatn".to_string()
}

fn default_width() -> u32 {
    1800
}

fn default_height() -> u32 {
    1100
}

fn default_formats() -> Vec<String> {
    vec!["png".to_string(), "jpg".to_string()]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref dir) = args.data_dir {
            self.inputs.data_dir = dir.clone();
        }
        if let Some(ref dir) = args.output_dir {
            self.report.output_dir = dir.clone();
        }
        if args.latin_digits {
            self.render.digits = DigitSystem::Latin;
        }
        if args.no_prompts {
            self.report.write_prompts = false;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FigureKind;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.columns.subject, "نام مشمول");
        assert_eq!(config.report.unit_divisor, 1000.0);
        assert_eq!(config.render.digits, DigitSystem::Persian);
        assert!(config.render.formats.contains(&"png".to_string()));
        assert!(!config.figures.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[inputs]
data_dir = "/srv/satc"
geo = "provinces.json"

[report]
top_n = 10
deposited_to_fund = 1000.0

[render]
digits = "latin"
rtl = false
formats = ["png"]

[[figures]]
chapter = 1
number = 3
kind = "credit_pareto"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.inputs.data_dir, PathBuf::from("/srv/satc"));
        assert_eq!(config.inputs.geo, Some(PathBuf::from("provinces.json")));
        assert_eq!(config.inputs.contracts, PathBuf::from("Credits_Contracts.xlsx"));
        assert_eq!(config.report.top_n, 10);
        assert_eq!(config.render.digits, DigitSystem::Latin);
        assert!(!config.render.rtl);
        assert_eq!(config.figures.len(), 1);
        assert_eq!(config.figures[0].kind, FigureKind::CreditPareto);
    }

    #[test]
    fn test_resolve_relative_to_data_dir() {
        let inputs = InputConfig::default();
        assert_eq!(
            inputs.resolve(Path::new("a.xlsx")),
            PathBuf::from("data").join("a.xlsx")
        );
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[inputs]"));
        assert!(toml_str.contains("[render]"));
        assert!(toml_str.contains("[[figures]]"));
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.figures.len(), Config::default().figures.len());
    }
}
