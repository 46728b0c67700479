use std::path::PathBuf;
use thiserror::Error;

/// Failures that end a run (or, for `Geo`, drop a figure back to its fallback).
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("input file not found: {} (check `data_dir` and the [inputs] paths)", path.display())]
    InputNotFound { path: PathBuf },

    #[error("cannot read {}: {reason}", path.display())]
    UnreadableInput { path: PathBuf, reason: String },

    #[error("sheet '{sheet}' not found in {}", path.display())]
    MissingSheet { path: PathBuf, sheet: String },

    #[error("{} has no header row", path.display())]
    EmptyInput { path: PathBuf },

    #[error("geo data error: {0}")]
    Geo(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Conditions under which a concentration measure is undefined.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConcentrationError {
    #[error("no amounts to analyse")]
    Empty,

    #[error("invalid amount {0} in concentration input (must be finite and non-negative)")]
    InvalidAmount(f64),

    #[error("all amounts are zero (no data)")]
    NoData,
}

pub type Result<T> = std::result::Result<T, ReportError>;
