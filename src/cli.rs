//! Command-line interface argument parsing.

use clap::Parser;
use std::path::PathBuf;
use tracing::Level;

/// SATC report generator
///
/// Reads the contracts / payments workbooks of the research-credit program
/// and writes the report charts, statistics sheets and analysis prompts.
///
/// Examples:
///   satc-report
///   satc-report --chapter 3 --data-dir ./data --output-dir ./figs
///   satc-report --latin-digits --no-charts
///   satc-report --init-config
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for satc-report.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the input workbooks
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Root directory for generated files (one sub-directory per chapter)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only produce this chapter (repeatable)
    #[arg(long = "chapter", value_name = "N")]
    pub chapters: Vec<u8>,

    /// Use Latin digits in chart labels
    #[arg(long)]
    pub latin_digits: bool,

    /// Write statistics only, skip chart rendering
    #[arg(long)]
    pub no_charts: bool,

    /// Do not write the analysis prompt Markdown files
    #[arg(long)]
    pub no_prompts: bool,

    /// Write a default satc-report.toml and exit
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (warnings and errors only)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("--verbose and --quiet cannot be used together".to_string());
        }
        if let Some(bad) = self.chapters.iter().find(|c| !(1..=3).contains(*c)) {
            return Err(format!("chapter {} does not exist (expected 1, 2 or 3)", bad));
        }
        Ok(())
    }

    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chapters_and_flags() {
        let args = Args::parse_from([
            "satc-report",
            "--chapter",
            "1",
            "--chapter",
            "3",
            "--latin-digits",
            "-v",
        ]);
        assert_eq!(args.chapters, vec![1, 3]);
        assert!(args.latin_digits);
        assert_eq!(args.log_level(), Level::DEBUG);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_combinations() {
        let args = Args::parse_from(["satc-report", "-v", "-q"]);
        assert!(args.validate().is_err());
        let args = Args::parse_from(["satc-report", "--chapter", "4"]);
        assert!(args.validate().is_err());
    }
}
