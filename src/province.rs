//! Province normalization.
//!
//! Maps a free-text university / facility name onto one of Iran's 31
//! provinces. Matching runs in two passes over an ordered rule list, and the
//! first matching rule wins in each pass:
//!
//! 1. keywords contained anywhere in the name;
//! 2. short or generic words (`قم`, `یزد`, `رازی`) that must appear as a
//!    whole word, so `رقم` is not Qom and `شیرازی` is not Kermanshah.
//!
//! Within the first pass the order matters: provinces whose keyword contains
//! another province's keyword come first (`کرمانشاه` before `کرمان`,
//! `خلیج فارس` → بوشهر before `فارس`, the two small Khorasans before Razavi
//! Khorasan), and Tehran precedes Qazvin so that `امام خمینی` inside a Tehran
//! hospital name stays in Tehran.

use crate::types::UNKNOWN_LABEL;
use crate::util::normalize_letters;
use once_cell::sync::Lazy;
use std::fmt;

pub const OTHER_LABEL: &str = "سایر";

/// Canonical province label, or one of the two sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Province {
    Known(&'static str),
    /// A name was given but no keyword matched.
    Other,
    /// No name at all (missing or blank cell).
    Unknown,
}

impl Province {
    pub fn label(&self) -> &'static str {
        match self {
            Province::Known(label) => *label,
            Province::Other => OTHER_LABEL,
            Province::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Province::Known(_))
    }

    /// Resolve a geographic feature name, which may be the Latin province
    /// name ("Razavi Khorasan") or any Persian spelling `province_of` accepts.
    pub fn from_feature_name(name: &str) -> Province {
        let trimmed = name.trim();
        if let Some(rule) = PROVINCE_RULES
            .iter()
            .find(|r| r.latin.eq_ignore_ascii_case(trimmed))
        {
            return Province::Known(rule.label);
        }
        province_of(Some(trimmed))
    }
}

impl fmt::Display for Province {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub struct ProvinceRule {
    pub label: &'static str,
    pub latin: &'static str,
    /// Matched anywhere in the name.
    pub keywords: &'static [&'static str],
    /// Matched only as a whole word, after every rule's keywords failed.
    pub words: &'static [&'static str],
}

const fn rule(
    label: &'static str,
    latin: &'static str,
    keywords: &'static [&'static str],
) -> ProvinceRule {
    ProvinceRule {
        label,
        latin,
        keywords,
        words: &[],
    }
}

impl ProvinceRule {
    const fn with_words(self, words: &'static [&'static str]) -> Self {
        ProvinceRule { words, ..self }
    }
}

/// Priority-ordered province rules. Every label also matches itself.
pub static PROVINCE_RULES: &[ProvinceRule] = &[
    rule("آذربایجان غربی", "West Azerbaijan", &["آذربایجان غربی", "ارومیه", "ارمیه"]),
    rule("آذربایجان شرقی", "East Azerbaijan", &["آذربایجان شرقی", "تبریز", "سهند", "مراغه"]),
    rule("خراسان شمالی", "North Khorasan", &["خراسان شمالی", "بجنورد"]),
    rule("خراسان جنوبی", "South Khorasan", &["خراسان جنوبی", "بیرجند"]),
    rule("خراسان رضوی", "Razavi Khorasan", &["خراسان رضوی", "مشهد", "فردوسی", "سبزوار"]),
    rule("کرمانشاه", "Kermanshah", &["کرمانشاه"]).with_words(&["رازی"]),
    rule("کرمان", "Kerman", &["کرمان", "باهنر", "رفسنجان"]),
    rule("بوشهر", "Bushehr", &["بوشهر", "خلیج فارس"]),
    rule("فارس", "Fars", &["فارس", "شیراز"]),
    rule(
        "تهران",
        "Tehran",
        &[
            "تهران",
            "شهید بهشتی",
            "علم و صنعت",
            "امیرکبیر",
            "شریف",
            "الزهرا",
            "خواجه نصیر",
            "تربیت مدرس",
            "علامه طباطبایی",
        ],
    ),
    rule("اصفهان", "Isfahan", &["اصفهان", "کاشان"]),
    rule("خوزستان", "Khuzestan", &["خوزستان", "اهواز", "چمران", "جندی شاپور"]),
    rule("مازندران", "Mazandaran", &["مازندران", "بابلسر", "بابل", "نوشیروانی"]).with_words(&["ساری"]),
    rule("گیلان", "Gilan", &["گیلان"]).with_words(&["رشت"]),
    rule("گلستان", "Golestan", &["گلستان", "گرگان"]),
    rule("همدان", "Hamadan", &["همدان", "بوعلی سینا"]),
    rule("قزوین", "Qazvin", &["قزوین", "امام خمینی"]),
    rule("اردبیل", "Ardabil", &["اردبیل"]),
    rule("زنجان", "Zanjan", &["زنجان"]),
    rule("کردستان", "Kurdistan", &["کردستان", "سنندج"]),
    rule("لرستان", "Lorestan", &["لرستان", "خرم آباد"]),
    rule("ایلام", "Ilam", &["ایلام"]),
    rule("هرمزگان", "Hormozgan", &["هرمزگان", "بندرعباس", "بندر عباس"]),
    rule("سیستان و بلوچستان", "Sistan and Baluchestan", &["سیستان", "بلوچستان", "زاهدان"]),
    rule("البرز", "Alborz", &["البرز", "کرج"]),
    rule("چهارمحال و بختیاری", "Chaharmahal and Bakhtiari", &["چهارمحال", "شهرکرد"]),
    rule("کهگیلویه و بویراحمد", "Kohgiluyeh and Boyer-Ahmad", &["کهگیلویه", "یاسوج"]),
    rule("مرکزی", "Markazi", &["استان مرکزی", "اراک"]),
    rule("یزد", "Yazd", &[]).with_words(&["یزد"]),
    rule("سمنان", "Semnan", &["سمنان", "شاهرود"]),
    rule("قم", "Qom", &[]).with_words(&["قم"]),
];

struct NormalizedRule {
    label: &'static str,
    keywords: Vec<String>,
    words: Vec<String>,
}

/// Rules with the same letter normalization applied to the input, in rule
/// order.
static NORMALIZED_RULES: Lazy<Vec<NormalizedRule>> = Lazy::new(|| {
    let normalize = |list: &[&str]| -> Vec<String> { list.iter().map(|k| normalize_letters(k)).collect() };
    PROVINCE_RULES
        .iter()
        .map(|r| NormalizedRule {
            label: r.label,
            keywords: normalize(r.keywords),
            words: normalize(r.words),
        })
        .collect()
});

/// All canonical labels in rule order.
pub fn canonical_labels() -> impl Iterator<Item = &'static str> {
    PROVINCE_RULES.iter().map(|r| r.label)
}

/// Map a university / facility name to its province.
///
/// Total: missing or blank input gives `Unknown`, a name matching no rule
/// gives `Other`.
pub fn province_of(name: Option<&str>) -> Province {
    let Some(name) = name else {
        return Province::Unknown;
    };
    let name = normalize_letters(name);
    if name.is_empty() {
        return Province::Unknown;
    }
    let tokens: Vec<&str> = name.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect();
    NORMALIZED_RULES
        .iter()
        .find(|r| r.keywords.iter().any(|k| name.contains(k.as_str())))
        .or_else(|| {
            NORMALIZED_RULES
                .iter()
                .find(|r| r.words.iter().any(|w| tokens.contains(&w.as_str())))
        })
        .map(|r| Province::Known(r.label))
        .unwrap_or(Province::Other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_closed_set_of_31_distinct_labels() {
        let labels: HashSet<_> = canonical_labels().collect();
        assert_eq!(labels.len(), 31);
        assert_eq!(PROVINCE_RULES.len(), 31);
        assert!(!labels.contains(OTHER_LABEL));
        assert!(!labels.contains(UNKNOWN_LABEL));
    }

    #[test]
    fn test_missing_and_blank_are_unknown_not_other() {
        assert_eq!(province_of(None), Province::Unknown);
        assert_eq!(province_of(Some("   ")), Province::Unknown);
        assert_eq!(province_of(Some("دانشگاه ناشناخته")), Province::Other);
        assert_ne!(Province::Unknown.label(), Province::Other.label());
    }

    #[test]
    fn test_city_and_university_keywords() {
        assert_eq!(province_of(Some("دانشگاه صنعتی شریف")).label(), "تهران");
        assert_eq!(province_of(Some("دانشگاه شیراز")).label(), "فارس");
        assert_eq!(province_of(Some("دانشگاه تبریز")).label(), "آذربایجان شرقی");
        assert_eq!(province_of(Some("دانشگاه فردوسی مشهد")).label(), "خراسان رضوی");
        assert_eq!(province_of(Some("دانشگاه شهید چمران اهواز")).label(), "خوزستان");
    }

    #[test]
    fn test_priority_order_for_overlapping_keywords() {
        // `کرمان` is a prefix of `کرمانشاه`.
        assert_eq!(province_of(Some("دانشگاه علوم پزشکی کرمانشاه")).label(), "کرمانشاه");
        assert_eq!(province_of(Some("دانشگاه شهید باهنر کرمان")).label(), "کرمان");
        // `فارس` appears inside `خلیج فارس`.
        assert_eq!(province_of(Some("دانشگاه خلیج فارس")).label(), "بوشهر");
        assert_eq!(province_of(Some("دانشگاه آزاد واحد فارس")).label(), "فارس");
        assert_eq!(province_of(Some("دانشگاه امام خمینی قزوین")).label(), "قزوین");
        assert_eq!(
            province_of(Some("بیمارستان امام خمینی تهران")).label(),
            "تهران"
        );
        // `رازی` and `قم` only count as whole words, and a city keyword wins
        // over them.
        assert_ne!(
            province_of(Some("دانشگاه صدرالمتالهین شیرازی")).label(),
            "کرمانشاه"
        );
        assert_eq!(province_of(Some("پژوهشگاه رازی کرج")).label(), "البرز");
        assert_eq!(province_of(Some("دانشگاه رازی")).label(), "کرمانشاه");
        assert_ne!(province_of(Some("مؤسسه رقم")).label(), "قم");
        assert_eq!(province_of(Some("دانشگاه قم")).label(), "قم");
        assert_eq!(province_of(Some("دانشگاه علامه طباطبائی")).label(), "تهران");
        assert_eq!(province_of(Some("دانشگاه یزد")).label(), "یزد");
        assert_eq!(province_of(Some("دانشگاه گیلان، رشت")).label(), "گیلان");
    }

    #[test]
    fn test_arabic_letter_variants_match() {
        // Arabic kaf and yeh.
        assert_eq!(province_of(Some("دانشگاه كرمان")).label(), "کرمان");
        assert_eq!(province_of(Some("دانشگاه علامه طباطبايی")).label(), "تهران");
    }

    #[test]
    fn test_deterministic() {
        let name = Some("دانشگاه گیلان");
        assert_eq!(province_of(name), province_of(name));
    }

    #[test]
    fn test_feature_name_lookup() {
        assert_eq!(Province::from_feature_name("Razavi Khorasan").label(), "خراسان رضوی");
        assert_eq!(Province::from_feature_name("tehran").label(), "تهران");
        assert_eq!(Province::from_feature_name("کرمانشاه").label(), "کرمانشاه");
    }
}
