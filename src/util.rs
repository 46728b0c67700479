// Cell parsing, Persian text folding and the descriptive statistics shared
// by the chapter tables.

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in spreadsheet exports.
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace.
/// - Reads Persian/Arabic-Indic digits as their Latin counterparts.
/// - Rejects values that contain alphabetic characters.
/// - Strips thousands separators (`,`, `٬`, `،`) before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    let s = latinize_digits(s);
    if s.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    let s: String = s
        .chars()
        .filter(|c| !matches!(c, ',' | '٬' | '،' | ' '))
        .map(|c| if c == '٫' { '.' } else { c })
        .collect();
    let v = s.parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    latinize_digits(s).parse::<i32>().ok()
}

/// Replace Persian (U+06F0..) and Arabic-Indic (U+0660..) digits with ASCII.
pub fn latinize_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '۰'..='۹' => char::from(b'0' + (c as u32 - '۰' as u32) as u8),
            '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
            _ => c,
        })
        .collect()
}

/// Fold the Arabic letter variants that show up in Iranian data entry onto
/// their Persian forms and collapse runs of whitespace.
///
/// Header matching and province keyword matching both go through this, so
/// `"دانشگاه  علم و صنعت"` and `"دانشگاه علم و صنعت"` compare equal, as do
/// `ي`/`ی`, `ئ`/`ی` and `ك`/`ک`.
pub fn normalize_letters(s: &str) -> String {
    let folded: String = s
        .chars()
        .map(|c| match c {
            'ي' | 'ى' | 'ئ' => 'ی',
            'ك' => 'ک',
            'ؤ' => 'و',
            'أ' | 'إ' => 'ا',
            'ة' => 'ه',
            '\u{200c}' => ' ',
            _ => c,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Mean, 0 for an empty slice.
pub fn average(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

/// Median of the values (sorted in place), 0 when empty.
pub fn median(mut v: Vec<f64>) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        v[mid]
    } else {
        (v[mid - 1] + v[mid]) / 2.0
    }
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two values.
pub fn std_dev(v: &[f64]) -> f64 {
    if v.len() < 2 {
        return 0.0;
    }
    let mean = average(v);
    let ss: f64 = v.iter().map(|x| (x - mean).powi(2)).sum();
    (ss / (v.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_f64_with_separators_and_persian_digits() {
        assert_eq!(parse_f64_safe(Some(" 1,234.5 ")), Some(1234.5));
        assert_eq!(parse_f64_safe(Some("۱۲٬۳۴۵")), Some(12345.0));
        assert_eq!(parse_f64_safe(Some("abc")), None);
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn test_normalize_letters() {
        assert_eq!(normalize_letters("  علي  كرمان "), "علی کرمان");
        assert_eq!(normalize_letters("خواجه\u{200c}نصیر"), "خواجه نصیر");
        assert_eq!(normalize_letters("طباطبائی مؤسسه"), "طباطبایی موسسه");
    }

    #[test]
    fn test_basic_stats() {
        assert_eq!(average(&[]), 0.0);
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), 2.5);
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((sd - 2.138089935).abs() < 1e-6);
        assert_eq!(std_dev(&[1.0]), 0.0);
    }
}
