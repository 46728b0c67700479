use super::{axis_max, segment_label, Canvas, BACKGROUND, PALETTE};
use crate::error::Result;
use crate::locale::{truncate_label, wrap_label};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, VPos};
use std::path::PathBuf;

/// One labelled bar. `note` is printed next to the value, e.g. a percentage.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    pub note: Option<String>,
}

impl Bar {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A category with one value per series.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub label: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Bar from zero; resets the running level.
    Total(String, f64),
    /// Floating bar taken off the running level.
    Decrease(String, f64),
}

impl Step {
    fn label(&self) -> &str {
        match self {
            Step::Total(l, _) | Step::Decrease(l, _) => l,
        }
    }
}

/// `(bottom, top)` of each waterfall bar.
pub fn waterfall_spans(steps: &[Step]) -> Vec<(f64, f64)> {
    let mut level = 0.0;
    steps
        .iter()
        .map(|s| match s {
            Step::Total(_, v) => {
                level = *v;
                (0.0, *v)
            }
            Step::Decrease(_, v) => {
                let top = level;
                level -= v;
                (level.min(top), level.max(top))
            }
        })
        .collect()
}

fn value_text(canvas: &Canvas, b: &Bar) -> String {
    match &b.note {
        Some(note) => format!("{} ({})", canvas.render.amount(b.value), note),
        None => canvas.render.amount(b.value),
    }
}

/// Vertical bars, one colour each, with the value above every bar.
pub fn column_comparison(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    y_desc: &str,
    bars: &[Bar],
) -> Result<Vec<PathBuf>> {
    let n = bars.len() as i32;
    let y_max = axis_max(bars.iter().map(|b| b.value), 1.2);
    let labels: Vec<String> = bars
        .iter()
        .map(|b| canvas.label(&truncate_label(&b.label, 28)))
        .collect();

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(36))
            .margin(20)
            .x_label_area_size(70)
            .y_label_area_size(120)
            .build_cartesian_2d((0..n).into_segmented(), 0f64..y_max)?;
        chart.plotting_area().fill(&BACKGROUND)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(bars.len().max(1))
            .x_label_formatter(&|v| segment_label(&labels, v))
            .y_label_formatter(&|v| canvas.render.amount(*v))
            .y_desc(canvas.label(y_desc))
            .label_style(canvas.font(18))
            .axis_desc_style(canvas.font(20))
            .draw()?;

        chart.draw_series(bars.iter().enumerate().map(|(i, b)| {
            let i = i as i32;
            let mut rect = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), b.value)],
                PALETTE[i as usize % PALETTE.len()].mix(0.85).filled(),
            );
            rect.set_margin(0, 0, 40, 40);
            rect
        }))?;
        chart.draw_series(bars.iter().enumerate().map(|(i, b)| {
            Text::new(
                canvas.label(&value_text(canvas, b)),
                (SegmentValue::CenterOf(i as i32), b.value + y_max * 0.01),
                canvas.anchored(18, HPos::Center, VPos::Bottom),
            )
        }))?;
        Ok(())
    })
}

/// Horizontal bars, largest at the top.
pub fn ranked_bars(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    x_desc: &str,
    bars: &[Bar],
) -> Result<Vec<PathBuf>> {
    let n = bars.len() as i32;
    let x_max = axis_max(bars.iter().map(|b| b.value), 1.25);
    // Segment 0 is the bottom row, so the first bar goes last.
    let labels: Vec<String> = bars
        .iter()
        .rev()
        .map(|b| canvas.label(&wrap_label(&b.label, 40, 1)))
        .collect();

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(34))
            .margin(20)
            .x_label_area_size(60)
            .y_label_area_size(420)
            .build_cartesian_2d(0f64..x_max, (0..n).into_segmented())?;
        chart.plotting_area().fill(&BACKGROUND)?;
        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_labels(bars.len().max(1))
            .y_label_formatter(&|v| segment_label(&labels, v))
            .x_label_formatter(&|v| canvas.render.amount(*v))
            .x_desc(canvas.label(x_desc))
            .label_style(canvas.font(16))
            .axis_desc_style(canvas.font(20))
            .draw()?;

        chart.draw_series(bars.iter().enumerate().map(|(i, b)| {
            let row = n - 1 - i as i32;
            let mut rect = Rectangle::new(
                [(0.0, SegmentValue::Exact(row)), (b.value, SegmentValue::Exact(row + 1))],
                PALETTE[0].mix(0.8).filled(),
            );
            rect.set_margin(4, 4, 0, 0);
            rect
        }))?;
        chart.draw_series(bars.iter().enumerate().map(|(i, b)| {
            Text::new(
                canvas.label(&value_text(canvas, b)),
                (b.value + x_max * 0.01, SegmentValue::CenterOf(n - 1 - i as i32)),
                canvas.anchored(15, HPos::Left, VPos::Center),
            )
        }))?;
        Ok(())
    })
}

/// Side-by-side bars per group, one colour per series, with a legend.
pub fn grouped_bars(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    y_desc: &str,
    series: &[&str],
    groups: &[Group],
) -> Result<Vec<PathBuf>> {
    let n = groups.len() as i32;
    let k = series.len().max(1);
    let y_max = axis_max(groups.iter().flat_map(|g| g.values.iter().copied()), 1.15);
    let labels: Vec<String> = groups
        .iter()
        .map(|g| canvas.label(&wrap_label(&g.label, 18, 1)))
        .collect();

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(34))
            .margin(20)
            .x_label_area_size(70)
            .y_label_area_size(120)
            .build_cartesian_2d((0..n).into_segmented(), 0f64..y_max)?;
        chart.plotting_area().fill(&BACKGROUND)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(groups.len().max(1))
            .x_label_formatter(&|v| segment_label(&labels, v))
            .y_label_formatter(&|v| canvas.render.amount(*v))
            .y_desc(canvas.label(y_desc))
            .label_style(canvas.font(14))
            .axis_desc_style(canvas.font(20))
            .draw()?;

        // Sub-bars share one segment, so they are placed with pixel margins.
        let (width, _) = chart.plotting_area().dim_in_pixel();
        let segment = width as f64 / n.max(1) as f64;
        let bar = segment * 0.8 / k as f64;
        for (j, name) in series.iter().enumerate() {
            let color = PALETTE[j % PALETTE.len()];
            let left = (segment * 0.1 + j as f64 * bar) as u32;
            let right = (segment - segment * 0.1 - (j + 1) as f64 * bar).max(0.0) as u32;
            chart
                .draw_series(groups.iter().enumerate().map(|(i, g)| {
                    let v = g.values.get(j).copied().unwrap_or(0.0);
                    let i = i as i32;
                    let mut rect = Rectangle::new(
                        [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), v)],
                        color.mix(0.85).filled(),
                    );
                    rect.set_margin(0, 0, left, right);
                    rect
                }))?
                .label(canvas.label(name))
                .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 18, y + 6)], color.filled()));
        }
        chart
            .configure_series_labels()
            .label_font(canvas.font(18))
            .background_style(WHITE.mix(0.9))
            .border_style(BLACK)
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;
        Ok(())
    })
}

/// Horizontal rows on a 0–100 scale: a grey full-range band, the first value
/// as a wide bar, the second as a narrow bar inside it and a target line.
pub fn bullet(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    series: &[&str],
    rows: &[Group],
    target: f64,
) -> Result<Vec<PathBuf>> {
    let n = rows.len() as i32;
    // First row at the top.
    let labels: Vec<String> = rows
        .iter()
        .rev()
        .map(|g| canvas.label(&wrap_label(&g.label, 40, 1)))
        .collect();
    let r = canvas.render;

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(34))
            .margin(20)
            .x_label_area_size(60)
            .y_label_area_size(420)
            .build_cartesian_2d(0f64..105f64, (0..n).into_segmented())?;
        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_labels(rows.len().max(1))
            .y_label_formatter(&|v| segment_label(&labels, v))
            .x_label_formatter(&|v| r.percent(*v))
            .label_style(canvas.font(16))
            .draw()?;

        let (_, height) = chart.plotting_area().dim_in_pixel();
        let row_px = height / n.max(1) as u32;
        // Wider margin for each later series, so they nest inside the first.
        let margins = [row_px / 8, row_px * 3 / 8];
        let band = |i: usize, from: f64, to: f64, margin: u32, style: ShapeStyle| {
            let row = n - 1 - i as i32;
            let mut rect = Rectangle::new(
                [(from, SegmentValue::Exact(row)), (to, SegmentValue::Exact(row + 1))],
                style,
            );
            rect.set_margin(margin, margin, 0, 0);
            rect
        };

        chart.draw_series((0..rows.len()).map(|i| band(i, 0.0, 100.0, margins[0], BACKGROUND.filled())))?;
        for (j, name) in series.iter().enumerate().take(margins.len()) {
            let color = PALETTE[j % PALETTE.len()];
            chart
                .draw_series(rows.iter().enumerate().map(|(i, g)| {
                    let v = g.values.get(j).copied().unwrap_or(0.0).clamp(0.0, 100.0);
                    band(i, 0.0, v, margins[j], color.mix(0.85).filled())
                }))?
                .label(canvas.label(name))
                .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 18, y + 6)], color.filled()));
        }
        chart
            .draw_series((0..rows.len()).map(|i| band(i, target, target, 0, RED.stroke_width(3))))?
            .label(canvas.label(&format!("هدف {}", r.percent(target))))
            .legend(|(x, y)| PathElement::new(vec![(x + 9, y - 8), (x + 9, y + 8)], RED.stroke_width(3)));
        chart
            .configure_series_labels()
            .label_font(canvas.font(18))
            .background_style(WHITE.mix(0.9))
            .border_style(BLACK)
            .position(SeriesLabelPosition::LowerRight)
            .draw()?;
        Ok(())
    })
}

/// Waterfall from a starting total through successive decreases.
pub fn waterfall(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    y_desc: &str,
    steps: &[Step],
) -> Result<Vec<PathBuf>> {
    let n = steps.len() as i32;
    let spans = waterfall_spans(steps);
    let y_max = axis_max(spans.iter().map(|s| s.1), 1.15);
    let y_min = spans.iter().map(|s| s.0).fold(0.0_f64, f64::min) * 1.15;
    let labels: Vec<String> = steps
        .iter()
        .map(|s| canvas.label(&truncate_label(s.label(), 28)))
        .collect();

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(34))
            .margin(20)
            .x_label_area_size(70)
            .y_label_area_size(120)
            .build_cartesian_2d((0..n).into_segmented(), y_min..y_max)?;
        chart.plotting_area().fill(&BACKGROUND)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(steps.len().max(1))
            .x_label_formatter(&|v| segment_label(&labels, v))
            .y_label_formatter(&|v| canvas.render.amount(*v))
            .y_desc(canvas.label(y_desc))
            .label_style(canvas.font(18))
            .axis_desc_style(canvas.font(20))
            .draw()?;

        chart.draw_series(steps.iter().zip(&spans).enumerate().map(|(i, (step, &(lo, hi)))| {
            let color = match step {
                Step::Total(..) => PALETTE[0],
                Step::Decrease(..) => PALETTE[4],
            };
            let i = i as i32;
            let mut rect = Rectangle::new(
                [(SegmentValue::Exact(i), lo), (SegmentValue::Exact(i + 1), hi)],
                color.mix(0.85).filled(),
            );
            rect.set_margin(0, 0, 40, 40);
            rect
        }))?;
        chart.draw_series(steps.iter().zip(&spans).enumerate().map(|(i, (step, &(_, hi)))| {
            let v = match step {
                Step::Total(_, v) => *v,
                Step::Decrease(_, v) => -*v,
            };
            Text::new(
                canvas.label(&canvas.render.amount(v)),
                (SegmentValue::CenterOf(i as i32), hi + y_max * 0.01),
                canvas.anchored(18, HPos::Center, VPos::Bottom),
            )
        }))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waterfall_spans() {
        let steps = vec![
            Step::Total("credit".into(), 100.0),
            Step::Decrease("fund".into(), 30.0),
            Step::Decrease("contract".into(), 50.0),
            Step::Total("remaining".into(), 20.0),
        ];
        assert_eq!(
            waterfall_spans(&steps),
            vec![(0.0, 100.0), (70.0, 100.0), (20.0, 70.0), (0.0, 20.0)]
        );
    }

    #[test]
    fn test_waterfall_overdraw_keeps_span_ordered() {
        let steps = vec![Step::Total("a".into(), 10.0), Step::Decrease("b".into(), 25.0)];
        assert_eq!(waterfall_spans(&steps), vec![(0.0, 10.0), (-15.0, 10.0)]);
    }

    #[test]
    fn test_bar_builder() {
        let b = Bar::new("x", 3.0).with_note("30%");
        assert_eq!(b.note.as_deref(), Some("30%"));
    }
}
