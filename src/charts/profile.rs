use super::{segment_label, Canvas, Group, BACKGROUND, PALETTE};
use crate::error::Result;
use crate::locale::truncate_label;
use crate::util::{average, median};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, VPos};
use std::f64::consts::TAU;
use std::path::PathBuf;

/// Pixel position of `value` on spoke `axis` of `axes`. Spoke 0 points up and
/// the rest follow clockwise; `value` is clamped to `[0, max]`.
pub fn radar_point(center: (i32, i32), radius: f64, axis: usize, axes: usize, value: f64, max: f64) -> (i32, i32) {
    let angle = TAU * axis as f64 / axes.max(1) as f64;
    let t = if max > 0.0 && value.is_finite() {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (
        center.0 + (radius * t * angle.sin()).round() as i32,
        center.1 - (radius * t * angle.cos()).round() as i32,
    )
}

/// One closed polygon per series over the named spokes, on a `0..max` scale,
/// with rings every fifth of the scale and a legend on the right.
pub fn radar(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    axes: &[&str],
    series: &[Group],
    max: f64,
) -> Result<Vec<PathBuf>> {
    let m = axes.len();
    let r = canvas.render;

    canvas.draw(stem, |root| {
        let area = root.titled(&canvas.label(title), canvas.font(34))?;
        let (w, h) = area.dim_in_pixel();
        let (plot, legend) = area.split_horizontally((w as f64 * 0.72) as i32);
        let (pw, _) = plot.dim_in_pixel();
        let center = (pw as i32 / 2, h as i32 / 2);
        let radius = (pw.min(h) as f64 / 2.0) * 0.7;

        for ring in 1..=5 {
            let v = max * ring as f64 / 5.0;
            let mut outline: Vec<(i32, i32)> = (0..m).map(|k| radar_point(center, radius, k, m, v, max)).collect();
            if let Some(&first) = outline.first() {
                outline.push(first);
            }
            plot.draw(&PathElement::new(outline, BLACK.mix(0.2).stroke_width(1)))?;
            plot.draw(&Text::new(
                r.amount(v),
                radar_point(center, radius, 0, m, v, max),
                canvas.anchored(13, HPos::Left, VPos::Bottom),
            ))?;
        }
        for (k, name) in axes.iter().enumerate() {
            let tip = radar_point(center, radius, k, m, max, max);
            plot.draw(&PathElement::new(vec![center, tip], BLACK.mix(0.3).stroke_width(1)))?;
            let outside = radar_point(center, radius * 1.12, k, m, max, max);
            let h_pos = match outside.0.cmp(&center.0) {
                std::cmp::Ordering::Less => HPos::Right,
                std::cmp::Ordering::Equal => HPos::Center,
                std::cmp::Ordering::Greater => HPos::Left,
            };
            plot.draw(&Text::new(
                canvas.label(name),
                outside,
                canvas.anchored(18, h_pos, VPos::Center),
            ))?;
        }

        for (i, s) in series.iter().enumerate() {
            let color = PALETTE[i % PALETTE.len()];
            let points: Vec<(i32, i32)> = (0..m)
                .map(|k| radar_point(center, radius, k, m, s.values.get(k).copied().unwrap_or(0.0), max))
                .collect();
            plot.draw(&Polygon::new(points.clone(), color.mix(0.15).filled()))?;
            let mut outline = points;
            if let Some(&first) = outline.first() {
                outline.push(first);
            }
            plot.draw(&PathElement::new(outline, color.stroke_width(3)))?;

            let y = 80 + i as i32 * 34;
            legend.draw(&Rectangle::new([(10, y - 8), (34, y + 8)], color.filled()))?;
            legend.draw(&Text::new(
                canvas.label(&truncate_label(&s.label, 30)),
                (44, y),
                canvas.anchored(16, HPos::Left, VPos::Center),
            ))?;
        }
        Ok(())
    })
}

/// Five-number summary with Tukey whiskers.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
    /// Most extreme values within 1.5 IQR of the box.
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

/// Quartiles as the medians of the lower and upper halves (the middle value
/// of an odd count belongs to neither). `None` when no value is finite.
pub fn box_stats(values: &[f64]) -> Option<BoxStats> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = v.len();
    let (q1, q3) = if n == 1 {
        (v[0], v[0])
    } else {
        (median(v[..n / 2].to_vec()), median(v[(n + 1) / 2..].to_vec()))
    };
    let iqr = q3 - q1;
    let (lo_fence, hi_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    let inside = || v.iter().copied().filter(|x| *x >= lo_fence && *x <= hi_fence);
    Some(BoxStats {
        count: n,
        min: v[0],
        q1,
        median: median(v.clone()),
        q3,
        max: v[n - 1],
        mean: average(&v),
        lower_whisker: inside().fold(f64::INFINITY, f64::min),
        upper_whisker: inside().fold(f64::NEG_INFINITY, f64::max),
        outliers: v.iter().copied().filter(|x| *x < lo_fence || *x > hi_fence).collect(),
    })
}

/// One box of a box plot, with an optional target drawn across it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSeries {
    pub label: String,
    pub values: Vec<f64>,
    pub target: Option<f64>,
}

/// Boxes with median, mean and whiskers; outliers as dots. A single box gets
/// its summary printed beside it.
pub fn box_plot(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    y_desc: &str,
    unit: &str,
    series: &[BoxSeries],
    y_range: Option<(f64, f64)>,
) -> Result<Vec<PathBuf>> {
    let stats: Vec<Option<BoxStats>> = series.iter().map(|s| box_stats(&s.values)).collect();
    let n = series.len() as i32;
    let (y_min, y_max) = y_range.unwrap_or_else(|| {
        let hi = stats.iter().flatten().map(|s| s.max).fold(0.0_f64, f64::max);
        let lo = stats.iter().flatten().map(|s| s.min).fold(0.0_f64, f64::min);
        (lo, if hi > lo { hi * 1.1 } else { lo + 1.0 })
    });
    let labels: Vec<String> = series.iter().map(|s| canvas.label(&truncate_label(&s.label, 30))).collect();
    let r = canvas.render;

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(34))
            .margin(20)
            .x_label_area_size(60)
            .y_label_area_size(110)
            .build_cartesian_2d((0..n).into_segmented(), y_min..y_max)?;
        chart.plotting_area().fill(&BACKGROUND)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(series.len().max(1))
            .x_label_formatter(&|v| segment_label(&labels, v))
            .y_label_formatter(&|v| r.amount(*v))
            .y_desc(canvas.label(y_desc))
            .label_style(canvas.font(18))
            .axis_desc_style(canvas.font(20))
            .draw()?;

        let (width, _) = chart.plotting_area().dim_in_pixel();
        let segment = width / n.max(1) as u32;
        let body = segment / 4;
        let cap = segment * 3 / 8;
        // A zero-height rectangle with side margins is a horizontal line
        // across part of the segment.
        let across = |i: i32, y: f64, margin: u32, style: ShapeStyle| {
            let mut line = Rectangle::new([(SegmentValue::Exact(i), y), (SegmentValue::Exact(i + 1), y)], style);
            line.set_margin(0, 0, margin, margin);
            line
        };

        for (i, (s, st)) in series.iter().zip(&stats).enumerate() {
            let i = i as i32;
            let color = PALETTE[i as usize % PALETTE.len()];
            let st = match st {
                Some(st) => st,
                None => continue,
            };
            let mid = SegmentValue::CenterOf(i);
            chart.draw_series([
                PathElement::new(vec![(mid.clone(), st.lower_whisker), (mid.clone(), st.q1)], BLACK.stroke_width(2)),
                PathElement::new(vec![(mid.clone(), st.q3), (mid.clone(), st.upper_whisker)], BLACK.stroke_width(2)),
            ])?;
            chart.draw_series([
                across(i, st.lower_whisker, cap, BLACK.stroke_width(2)),
                across(i, st.upper_whisker, cap, BLACK.stroke_width(2)),
            ])?;
            let mut rect = Rectangle::new(
                [(SegmentValue::Exact(i), st.q1), (SegmentValue::Exact(i + 1), st.q3)],
                color.mix(0.7).filled(),
            );
            rect.set_margin(0, 0, body, body);
            chart.draw_series([rect, {
                let mut edge = Rectangle::new(
                    [(SegmentValue::Exact(i), st.q1), (SegmentValue::Exact(i + 1), st.q3)],
                    BLACK.stroke_width(2),
                );
                edge.set_margin(0, 0, body, body);
                edge
            }])?;
            chart.draw_series([across(i, st.median, body, RED.stroke_width(4))])?;
            chart.draw_series(std::iter::once(Circle::new((mid.clone(), st.mean), 8, GREEN.filled())))?;
            chart.draw_series(
                st.outliers
                    .iter()
                    .map(|&o| Circle::new((mid.clone(), o), 5, RED.mix(0.6).filled())),
            )?;
            if let Some(t) = s.target {
                chart.draw_series([across(i, t, cap / 2, BLUE.stroke_width(3))])?;
                chart.draw_series(std::iter::once(Text::new(
                    canvas.label(&format!("هدف: {}", r.percent(t))),
                    (SegmentValue::Exact(i), t),
                    canvas.anchored(15, HPos::Left, VPos::Bottom),
                )))?;
            }
        }

        if let [Some(st)] = stats.as_slice() {
            let lines = [
                format!("تعداد: {}", st.count),
                format!("حداقل: {} {}", r.decimal(st.min, 1), unit),
                format!("چارک اول: {} {}", r.decimal(st.q1, 1), unit),
                format!("میانه: {} {}", r.decimal(st.median, 1), unit),
                format!("میانگین: {} {}", r.decimal(st.mean, 1), unit),
                format!("چارک سوم: {} {}", r.decimal(st.q3, 1), unit),
                format!("حداکثر: {} {}", r.decimal(st.max, 1), unit),
            ];
            let (w, _) = root.dim_in_pixel();
            for (k, line) in lines.iter().enumerate() {
                root.draw(&Text::new(
                    canvas.label(line),
                    (w as i32 - 60, 120 + k as i32 * 30),
                    canvas.anchored(18, HPos::Right, VPos::Top),
                ))?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_stats_odd_count() {
        let values: Vec<f64> = (1..=9).map(f64::from).collect();
        let st = box_stats(&values).unwrap();
        assert_eq!((st.q1, st.median, st.q3), (2.5, 5.0, 7.5));
        assert_eq!((st.lower_whisker, st.upper_whisker), (1.0, 9.0));
        assert!(st.outliers.is_empty());
        assert_eq!(st.mean, 5.0);
    }

    #[test]
    fn test_box_stats_flags_outlier() {
        let mut values: Vec<f64> = (1..=9).map(f64::from).collect();
        values.push(100.0);
        let st = box_stats(&values).unwrap();
        assert_eq!((st.q1, st.median, st.q3), (3.0, 5.5, 8.0));
        assert_eq!(st.upper_whisker, 9.0);
        assert_eq!(st.outliers, vec![100.0]);
        assert_eq!(st.max, 100.0);
    }

    #[test]
    fn test_box_stats_degenerate() {
        assert!(box_stats(&[]).is_none());
        assert!(box_stats(&[f64::NAN]).is_none());
        let st = box_stats(&[4.0]).unwrap();
        assert_eq!((st.q1, st.median, st.q3), (4.0, 4.0, 4.0));
        assert_eq!((st.lower_whisker, st.upper_whisker), (4.0, 4.0));
    }

    #[test]
    fn test_radar_point() {
        let c = (100, 100);
        assert_eq!(radar_point(c, 50.0, 0, 4, 100.0, 100.0), (100, 50));
        assert_eq!(radar_point(c, 50.0, 1, 4, 100.0, 100.0), (150, 100));
        assert_eq!(radar_point(c, 50.0, 2, 4, 50.0, 100.0), (100, 125));
        // clamped to the outer ring
        assert_eq!(radar_point(c, 50.0, 3, 4, 500.0, 100.0), (50, 100));
        assert_eq!(radar_point(c, 50.0, 0, 4, f64::NAN, 100.0), c);
    }
}
