//! Synthetic multi-year credits, used when the history workbook is absent.

use crate::types::{AmountKind, Record};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SAMPLE_YEARS: [i32; 7] = [1398, 1399, 1400, 1401, 1402, 1403, 1404];

/// The levy article was suspended in 1403, so that year carries no credit.
pub const SUSPENDED_YEAR: i32 = 1403;

const DEPARTMENTS: [&str; 10] = [
    "وزارت نفت",
    "وزارت نیرو",
    "وزارت صنعت، معدن و تجارت",
    "وزارت راه و شهرسازی",
    "وزارت ارتباطات و فناوری اطلاعات",
    "وزارت بهداشت، درمان و آموزش پزشکی",
    "وزارت جهاد کشاورزی",
    "وزارت امور اقتصادی و دارایی",
    "بانک مرکزی",
    "سازمان برنامه و بودجه",
];

const ENTITIES: usize = 50;

/// Exponentially distributed draw with the given mean.
fn exponential(rng: &mut StdRng, mean: f64) -> f64 {
    let u: f64 = rng.gen_range(0.0..1.0);
    -(1.0 - u).ln() * mean
}

/// Credits (million rials) of 50 entities over 1398–1404, deterministic for a
/// given seed.
pub fn sample_history(seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(ENTITIES * SAMPLE_YEARS.len());
    for i in 0..ENTITIES {
        let subject = format!("مشمول نمونه {}", i + 1);
        let department = DEPARTMENTS[i % DEPARTMENTS.len()].to_string();
        // Entities keep their relative size across years.
        let scale = exponential(&mut rng, 50_000.0) + 1_000.0;
        for (y, &year) in SAMPLE_YEARS.iter().enumerate() {
            let amount = if year == SUSPENDED_YEAR {
                0.0
            } else {
                let growth = 1.0 + 0.15 * y as f64;
                (scale * growth * rng.gen_range(0.7..1.3)).round()
            };
            records.push(
                Record::new(AmountKind::Credit, subject.clone(), amount)
                    .with_department(Some(department.clone()))
                    .with_year(year),
            );
        }
    }
    records
}
