//! Pareto / Lorenz-style concentration measures.

use crate::error::ConcentrationError;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    /// 1-based rank, largest amount first.
    pub rank: usize,
    pub amount: f64,
    pub cumulative: f64,
    pub cumulative_pct: f64,
}

/// Amounts ranked largest first with their running share of the total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcentrationCurve {
    pub points: Vec<CurvePoint>,
    pub total: f64,
}

fn validate(amounts: &[f64]) -> Result<(), ConcentrationError> {
    if amounts.is_empty() {
        return Err(ConcentrationError::Empty);
    }
    if let Some(bad) = amounts.iter().find(|a| !a.is_finite() || **a < 0.0) {
        return Err(ConcentrationError::InvalidAmount(*bad));
    }
    Ok(())
}

impl ConcentrationCurve {
    pub fn from_amounts(amounts: &[f64]) -> Result<Self, ConcentrationError> {
        validate(amounts)?;
        let mut sorted = amounts.to_vec();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));

        let mut running = 0.0;
        let cumulative: Vec<f64> = sorted
            .iter()
            .map(|a| {
                running += a;
                running
            })
            .collect();
        // The last running sum is the total, so the final point is exactly 100.
        let total = running;
        if total == 0.0 {
            return Err(ConcentrationError::NoData);
        }

        let points = sorted
            .iter()
            .zip(cumulative)
            .enumerate()
            .map(|(i, (&amount, cumulative))| CurvePoint {
                rank: i + 1,
                amount,
                cumulative,
                cumulative_pct: cumulative / total * 100.0,
            })
            .collect();
        Ok(Self { points, total })
    }

    pub(crate) fn len(&self) -> usize {
        self.points.len()
    }

    /// Share (percent) of the total held by the top `k` entities.
    pub fn share_of_top(&self, k: usize) -> f64 {
        match k.min(self.points.len()) {
            0 => 0.0,
            k => self.points[k - 1].cumulative_pct,
        }
    }

    /// Share held by the top `fraction` of entities, counting `⌊n·fraction⌋`
    /// entities.
    pub fn share_of_top_fraction(&self, fraction: f64) -> f64 {
        let k = (self.points.len() as f64 * fraction).floor() as usize;
        self.share_of_top(k)
    }

    /// Smallest number of top entities whose cumulative share reaches `pct`.
    /// `None` only if `pct` exceeds 100.
    pub fn entities_for_share(&self, pct: f64) -> Option<usize> {
        // Cumulative percentages are non-decreasing, so the first index at or
        // above `pct` is also the lowest rank among equal values.
        let idx = self.points.partition_point(|p| p.cumulative_pct < pct);
        (idx < self.points.len()).then_some(idx + 1)
    }
}

/// Gini coefficient of non-negative amounts:
/// `G = 2·Σ i·x_i / (n·Σx) − (n+1)/n` with `x` ascending and `i` 1-based.
pub fn gini(amounts: &[f64]) -> Result<f64, ConcentrationError> {
    validate(amounts)?;
    let n = amounts.len();
    if n == 1 {
        return Ok(0.0);
    }
    let mut sorted = amounts.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let total: f64 = sorted.iter().sum();
    if total == 0.0 {
        return Err(ConcentrationError::NoData);
    }
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, x)| (i + 1) as f64 * x)
        .sum();
    let nf = n as f64;
    let g = 2.0 * weighted / (nf * total) - (nf + 1.0) / nf;
    Ok(g.clamp(0.0, 1.0))
}

/// Headline concentration figures for one amount distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoSummary {
    pub entities: usize,
    pub top10_share: f64,
    pub top20pct_share: f64,
    pub top50pct_share: f64,
    pub entities_for_80pct: usize,
    pub entities_for_80pct_share: f64,
    pub gini: f64,
}

impl ParetoSummary {
    pub fn from_amounts(amounts: &[f64]) -> Result<Self, ConcentrationError> {
        let curve = ConcentrationCurve::from_amounts(amounts)?;
        let gini = gini(amounts)?;
        let n = curve.len();
        let for_80 = curve.entities_for_share(80.0).unwrap_or(n);
        Ok(Self {
            entities: n,
            top10_share: curve.share_of_top(10),
            top20pct_share: curve.share_of_top_fraction(0.2),
            top50pct_share: curve.share_of_top_fraction(0.5),
            entities_for_80pct: for_80,
            entities_for_80pct_share: for_80 as f64 / n as f64 * 100.0,
            gini,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_monotone_and_ends_at_100() {
        let curve = ConcentrationCurve::from_amounts(&[5.0, 40.0, 0.0, 12.5, 7.25, 40.0]).unwrap();
        assert_eq!(curve.points.last().unwrap().cumulative_pct, 100.0);
        for w in curve.points.windows(2) {
            assert!(w[1].cumulative_pct >= w[0].cumulative_pct);
            assert!(w[1].amount <= w[0].amount);
        }
        assert_eq!(curve.points[0].rank, 1);
        assert_eq!(curve.total, 104.75);
    }

    #[test]
    fn test_curve_errors() {
        assert_eq!(ConcentrationCurve::from_amounts(&[]), Err(ConcentrationError::Empty));
        assert_eq!(
            ConcentrationCurve::from_amounts(&[0.0, 0.0]),
            Err(ConcentrationError::NoData)
        );
        assert_eq!(
            ConcentrationCurve::from_amounts(&[1.0, -2.0]),
            Err(ConcentrationError::InvalidAmount(-2.0))
        );
    }

    #[test]
    fn test_gini_fixtures() {
        assert_eq!(gini(&[7.0, 7.0, 7.0, 7.0]).unwrap(), 0.0);
        assert!((gini(&[100.0, 0.0, 0.0, 0.0, 0.0]).unwrap() - 0.8).abs() < 1e-12);
        assert!((gini(&[10.0, 20.0, 30.0, 40.0]).unwrap() - 0.25).abs() < 1e-12);
        // Input order does not matter.
        assert!((gini(&[40.0, 10.0, 30.0, 20.0]).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_gini_single_entity_is_zero() {
        assert_eq!(gini(&[123.0]).unwrap(), 0.0);
        assert_eq!(gini(&[0.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_gini_no_data() {
        assert_eq!(gini(&[0.0, 0.0, 0.0]), Err(ConcentrationError::NoData));
        assert_eq!(gini(&[]), Err(ConcentrationError::Empty));
    }

    #[test]
    fn test_threshold_lookups() {
        // cumulative: 50, 80, 90, 100
        let curve = ConcentrationCurve::from_amounts(&[10.0, 50.0, 30.0, 10.0]).unwrap();
        assert_eq!(curve.entities_for_share(80.0), Some(2));
        assert_eq!(curve.entities_for_share(50.0), Some(1));
        assert_eq!(curve.entities_for_share(0.0), Some(1));
        assert_eq!(curve.entities_for_share(100.0), Some(4));
        assert_eq!(curve.entities_for_share(100.5), None);
        assert_eq!(curve.share_of_top(2), 80.0);
        assert_eq!(curve.share_of_top(0), 0.0);
        assert_eq!(curve.share_of_top(99), 100.0);
        assert_eq!(curve.share_of_top_fraction(0.5), 80.0);
    }

    #[test]
    fn test_threshold_tie_picks_lowest_rank() {
        // Trailing zeros repeat the final cumulative share.
        let curve = ConcentrationCurve::from_amounts(&[80.0, 0.0, 20.0, 0.0]).unwrap();
        assert_eq!(curve.points[0].cumulative_pct, 80.0);
        assert_eq!(curve.entities_for_share(80.0), Some(1));
        assert_eq!(curve.entities_for_share(100.0), Some(2));
    }

    #[test]
    fn test_pareto_summary() {
        let amounts: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let s = ParetoSummary::from_amounts(&amounts).unwrap();
        assert_eq!(s.entities, 20);
        // top 4 = 20+19+18+17 = 74 of 210
        assert!((s.top20pct_share - 74.0 / 210.0 * 100.0).abs() < 1e-9);
        assert!(s.gini > 0.0 && s.gini < 1.0);
    }
}
