//! Number and label formatting for display.
//!
//! Presentation only: nothing here feeds back into aggregation or
//! concentration values, which stay plain `f64` in Latin notation.

use crate::config::RenderConfig;
use crate::shaping;
use crate::types::Ratio;
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

/// Which digit glyphs a display string uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitSystem {
    #[default]
    Persian,
    Latin,
}

/// Replace Latin digits, the thousands comma and the percent sign with their
/// Persian counterparts. Latin input is returned unchanged.
pub fn localize_digits(s: &str, digits: DigitSystem) -> String {
    match digits {
        DigitSystem::Latin => s.to_string(),
        DigitSystem::Persian => s
            .chars()
            .map(|c| match c {
                '0'..='9' => char::from_u32('۰' as u32 + (c as u32 - '0' as u32)).unwrap_or(c),
                ',' => '،',
                '%' => '٪',
                _ => c,
            })
            .collect(),
    }
}

/// Format a floating-point value with a fixed number of decimal places and
/// `,` thousands separators, e.g. `1,234,567.89`. Non-finite input formats
/// as zero.
pub fn format_plain(n: f64, decimals: usize) -> String {
    let n = if n.is_finite() { n } else { 0.0 };
    // First, format to a plain fixed-decimal string like `1234567.89`.
    let s = format!("{:.*}", decimals, n.abs());
    let neg = n < 0.0 && s.chars().any(|c| matches!(c, '1'..='9'));
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    // Use `num-format` to insert commas into the integer portion.
    // Beyond u128 the digits are kept ungrouped.
    let mut res = match int_part.parse::<u128>() {
        Ok(v) => v.to_formatted_string(&Locale::en),
        Err(_) => int_part.to_string(),
    };
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// Whole-number amount with thousands separators in the requested digits.
/// Missing, NaN or infinite input gives the zero representation.
pub fn format_amount(n: Option<f64>, digits: DigitSystem) -> String {
    let n = n.filter(|v| v.is_finite()).unwrap_or(0.0);
    localize_digits(&format_plain(n, 0), digits)
}

pub fn format_decimal(n: f64, decimals: usize, digits: DigitSystem) -> String {
    localize_digits(&format_plain(n, decimals), digits)
}

pub fn format_percent(n: f64, decimals: usize, digits: DigitSystem) -> String {
    localize_digits(&format!("{}%", format_plain(n, decimals)), digits)
}

/// Percentage display for a possibly undefined ratio; the sentinel shows as `-`.
pub fn format_ratio(r: Ratio, decimals: usize, digits: DigitSystem) -> String {
    match r.value() {
        Some(v) => format_percent(v, decimals, digits),
        None => "-".to_string(),
    }
}

/// Break `text` into at most `max_lines` lines of roughly `max_chars_per_line`
/// characters on word boundaries. When words are left over the last line is
/// cut and ends in `...`.
pub fn wrap_label(text: &str, max_chars_per_line: usize, max_lines: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || max_lines == 0 {
        return String::new();
    }
    let mut lines: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for &word in &words {
        let word_len = word.chars().count();
        if current_len + word_len + current.len() <= max_chars_per_line {
            current.push(word);
            current_len += word_len;
        } else {
            if !current.is_empty() {
                lines.push(current.join(" "));
                if lines.len() >= max_lines {
                    current.clear();
                    break;
                }
            }
            current = vec![word];
            current_len = word_len;
        }
    }
    if !current.is_empty() && lines.len() < max_lines {
        lines.push(current.join(" "));
    }

    let used: usize = lines.iter().map(|l| l.split_whitespace().count()).sum();
    if words.len() > used {
        if let Some(last) = lines.last_mut() {
            let keep = max_chars_per_line.saturating_sub(3);
            *last = format!("{}...", last.chars().take(keep).collect::<String>());
        }
    }
    lines.join("\n")
}

/// Cut `text` to `max_chars` characters, marking the cut with `...`.
pub fn truncate_label(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    format!("{}...", text.chars().take(keep).collect::<String>())
}

impl RenderConfig {
    /// Display form of a label: shaped and reordered when RTL is on.
    pub fn text(&self, s: &str) -> String {
        if self.rtl {
            shaping::shape(s)
        } else {
            s.to_string()
        }
    }

    /// Label text with localized digits, then shaped.
    pub fn label(&self, s: &str) -> String {
        self.text(&localize_digits(s, self.digits))
    }

    pub fn amount(&self, n: f64) -> String {
        format_amount(Some(n), self.digits)
    }

    pub fn decimal(&self, n: f64, decimals: usize) -> String {
        format_decimal(n, decimals, self.digits)
    }

    pub fn percent(&self, n: f64) -> String {
        format_percent(n, 1, self.digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localize_digits() {
        assert_eq!(localize_digits("1,234.5%", DigitSystem::Persian), "۱،۲۳۴.۵٪");
        assert_eq!(localize_digits("1,234.5%", DigitSystem::Latin), "1,234.5%");
    }

    #[test]
    fn test_format_amount_zero_representation() {
        assert_eq!(format_amount(None, DigitSystem::Persian), "۰");
        assert_eq!(format_amount(Some(f64::NAN), DigitSystem::Latin), "0");
        assert_eq!(format_amount(Some(f64::INFINITY), DigitSystem::Latin), "0");
        assert_eq!(format_amount(Some(4228781.4), DigitSystem::Latin), "4,228,781");
        assert_eq!(format_amount(Some(1500.0), DigitSystem::Persian), "۱،۵۰۰");
    }

    #[test]
    fn test_format_plain() {
        assert_eq!(format_plain(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_plain(-0.001, 2), "0.00");
        assert_eq!(format_plain(-12.5, 1), "-12.5");
        assert_eq!(format_plain(7.0, 0), "7");
        assert_eq!(format_plain(2e19, 0), "20,000,000,000,000,000,000");
        assert_eq!(format_plain(-2e19, 1), "-20,000,000,000,000,000,000.0");
    }

    #[test]
    fn test_format_ratio_sentinel() {
        assert_eq!(format_ratio(Ratio::UNDEFINED, 1, DigitSystem::Persian), "-");
        assert_eq!(format_ratio(Ratio(Some(30.0)), 1, DigitSystem::Latin), "30.0%");
        assert_eq!(format_percent(15.0, 1, DigitSystem::Persian), "۱۵.۰٪");
    }

    #[test]
    fn test_wrap_label() {
        assert_eq!(wrap_label("", 20, 2), "");
        assert_eq!(wrap_label("one two", 20, 2), "one two");
        assert_eq!(wrap_label("alpha beta gamma", 10, 2), "alpha beta\ngamma");
        assert_eq!(
            wrap_label("alpha beta gamma delta epsilon", 10, 2),
            "alpha beta\ngamma..."
        );
        assert_eq!(wrap_label("alpha beta gamma", 10, 1), "alpha b...");
    }

    #[test]
    fn test_truncate_label() {
        assert_eq!(truncate_label("short", 10), "short");
        assert_eq!(truncate_label("abcdefghijkl", 8), "abcde...");
    }
}
