//! Right-to-left text preparation for the bitmap chart backend.
//!
//! Plotters draws code points one glyph at a time, so Persian text has to be
//! converted to its contextual presentation forms (`ar-reshaper`) and
//! reordered into visual order (`unicode-bidi`) before it reaches a chart.

use ar_reshaper::reshape_line;
use unicode_bidi::BidiInfo;

const ZWNJ: char = '\u{200C}';

/// Replace letters with their contextual presentation forms (logical order is
/// kept). Zero-width non-joiners break the joining and are dropped.
fn join_letters(line: &str) -> String {
    reshape_line(line).chars().filter(|&c| c != ZWNJ).collect()
}

/// Reorder one line from logical to visual order.
fn visual_order(line: &str) -> String {
    let bidi = BidiInfo::new(line, None);
    if !bidi.has_rtl() {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    for para in &bidi.paragraphs {
        let range = para.range.clone();
        out.push_str(&bidi.reorder_line(para, range));
    }
    out
}

/// Shape and reorder text for display, line by line.
pub fn shape(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    text.lines()
        .map(|line| visual_order(&join_letters(line)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_word_forms() {
        // بانک: beh initial, alef final, noon initial, keheh final.
        assert_eq!(
            join_letters("بانک"),
            "\u{FE91}\u{FE8E}\u{FEE7}\u{FB8F}"
        );
    }

    #[test]
    fn test_lam_alef_ligature() {
        // سلام: seen initial, lam-alef final, meem isolated.
        assert_eq!(join_letters("سلام"), "\u{FEB3}\u{FEFC}\u{FEE1}");
    }

    #[test]
    fn test_zwnj_breaks_joining() {
        // می‌شود: meem initial, yeh final, then a fresh word start.
        let joined = join_letters("می\u{200C}شود");
        let chars: Vec<char> = joined.chars().collect();
        assert_eq!(chars[0], '\u{FEE3}');
        assert_eq!(chars[1], '\u{FBFD}');
        assert_eq!(chars[2], '\u{FEB7}');
        assert!(!joined.contains(ZWNJ));
    }

    #[test]
    fn test_shape_reverses_rtl_and_keeps_latin() {
        assert_eq!(shape("abc 123"), "abc 123");
        assert_eq!(shape(""), "");
        let shaped = shape("بانک");
        assert_eq!(shaped, "\u{FB8F}\u{FEE7}\u{FE8E}\u{FE91}");
    }

    #[test]
    fn test_shape_multiline() {
        let shaped = shape("آب\nدر");
        assert_eq!(shaped.lines().count(), 2);
    }
}
