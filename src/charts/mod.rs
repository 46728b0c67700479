//! Chart rendering with plotters.
//!
//! Every renderer draws through a [`Canvas`], which owns the output directory
//! and the rendering configuration, and writes the figure once per configured
//! image format. Labels are shaped for right-to-left display and numbers are
//! localized here, never upstream.

mod bars;
mod composition;
mod distribution;
mod map;
mod profile;

pub use bars::{bullet, column_comparison, grouped_bars, ranked_bars, waterfall, Bar, Group, Step};
pub use composition::{funnel, pies, treemap, Tile};
pub use distribution::{heatmap, histogram, pareto, scatter, yearly_trend, Point};
pub use map::choropleth;
pub use profile::{box_plot, radar, BoxSeries};

use crate::config::RenderConfig;
use crate::error::{ReportError, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Bar colours of the report, in order of use.
pub(crate) const PALETTE: [RGBColor; 8] = [
    RGBColor(0x19, 0x76, 0xD2),
    RGBColor(0x7B, 0x1F, 0xA2),
    RGBColor(0x38, 0x8E, 0x3C),
    RGBColor(0xF5, 0x7C, 0x00),
    RGBColor(0xC6, 0x28, 0x28),
    RGBColor(0x00, 0x83, 0x8F),
    RGBColor(0x5D, 0x40, 0x37),
    RGBColor(0x45, 0x5A, 0x64),
];

pub(crate) const BACKGROUND: RGBColor = RGBColor(0xF5, 0xF5, 0xF5);
pub(crate) const NO_DATA: RGBColor = RGBColor(0xD0, 0xD0, 0xD0);

pub(crate) type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Output directory plus rendering settings for one chapter.
pub struct Canvas<'a> {
    pub render: &'a RenderConfig,
    dir: PathBuf,
    font: String,
}

fn render_err(path: &Path, e: impl std::fmt::Display) -> ReportError {
    ReportError::Render(format!("{}: {}", path.display(), e))
}

/// The configured family when the system has it, otherwise plotters'
/// generic sans-serif.
fn resolve_font(family: &str) -> String {
    let candidate = FontDesc::new(FontFamily::Name(family), 12.0, FontStyle::Normal);
    match candidate.box_size("ab") {
        Ok(_) => family.to_string(),
        Err(e) => {
            warn!("font '{}' unavailable ({:?}); falling back to sans-serif", family, e);
            "sans-serif".to_string()
        }
    }
}

impl<'a> Canvas<'a> {
    pub fn new(render: &'a RenderConfig, dir: impl Into<PathBuf>) -> Self {
        Self {
            render,
            dir: dir.into(),
            font: resolve_font(&render.font_family),
        }
    }

    pub(crate) fn font(&self, size: u32) -> FontDesc<'_> {
        (self.font.as_str(), size).into_font()
    }

    pub(crate) fn style(&self, size: u32) -> TextStyle<'_> {
        self.font(size).color(&BLACK)
    }

    /// Text style anchored at the given horizontal / vertical position.
    pub(crate) fn anchored(&self, size: u32, h: HPos, v: VPos) -> TextStyle<'_> {
        self.style(size).pos(Pos::new(h, v))
    }

    /// Shaped, digit-localized label.
    pub(crate) fn label(&self, s: &str) -> String {
        self.render.label(s)
    }

    /// Render `stem.<ext>` for every configured format.
    pub fn draw<F>(&self, stem: &str, f: F) -> Result<Vec<PathBuf>>
    where
        F: Fn(&Area<'_>) -> anyhow::Result<()>,
    {
        std::fs::create_dir_all(&self.dir)?;
        let mut written = Vec::with_capacity(self.render.formats.len());
        for ext in &self.render.formats {
            let path = self.dir.join(format!("{}.{}", stem, ext));
            {
                let root = BitMapBackend::new(&path, (self.render.width, self.render.height))
                    .into_drawing_area();
                root.fill(&WHITE).map_err(|e| render_err(&path, e))?;
                f(&root).map_err(|e| render_err(&path, format!("{:#}", e)))?;
                root.present().map_err(|e| render_err(&path, e))?;
            }
            debug!("wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

/// Axis label for a segmented coordinate: the label of the segment centre,
/// blank elsewhere.
pub(crate) fn segment_label(labels: &[String], v: &SegmentValue<i32>) -> String {
    match v {
        SegmentValue::CenterOf(i) if *i >= 0 => labels.get(*i as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Upper end of a value axis with headroom; never an empty range.
pub(crate) fn axis_max(values: impl Iterator<Item = f64>, headroom: f64) -> f64 {
    let max = values.filter(|v| v.is_finite()).fold(0.0_f64, f64::max);
    if max > 0.0 {
        max * headroom
    } else {
        1.0
    }
}

/// Linear blend from `from` to `to`; `t` is clamped to [0, 1].
pub(crate) fn blend(from: RGBColor, to: RGBColor, t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    RGBColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_label() {
        let labels = vec!["a".to_string(), "b".to_string()];
        assert_eq!(segment_label(&labels, &SegmentValue::CenterOf(1)), "b");
        assert_eq!(segment_label(&labels, &SegmentValue::CenterOf(5)), "");
        assert_eq!(segment_label(&labels, &SegmentValue::Exact(0)), "");
    }

    #[test]
    fn test_axis_max() {
        assert_eq!(axis_max([0.0, 0.0].into_iter(), 1.2), 1.0);
        assert!((axis_max([10.0, 50.0, f64::NAN].into_iter(), 1.2) - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_blend_endpoints() {
        let a = RGBColor(0, 0, 0);
        let b = RGBColor(200, 100, 50);
        assert_eq!(blend(a, b, 0.0), a);
        assert_eq!(blend(a, b, 1.0), b);
        assert_eq!(blend(a, b, 0.5), RGBColor(100, 50, 25));
        assert_eq!(blend(a, b, f64::NAN), a);
    }
}
