use super::{axis_max, blend, segment_label, Canvas, BACKGROUND, PALETTE};
use crate::concentration::ConcentrationCurve;
use crate::error::Result;
use crate::locale::truncate_label;
use crate::util::{average, median, std_dev};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, VPos};
use std::path::PathBuf;

const LOW: RGBColor = RGBColor(0xFF, 0xF7, 0xBC);
const HIGH: RGBColor = RGBColor(0xD9, 0x48, 0x01);

/// A labelled point of a scatter plot.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub label: String,
    pub x: f64,
    pub y: f64,
}

/// Equal-width bins over `[min, max]` as `(lower, upper, count)`. The last
/// bin includes its upper edge; a single distinct value gets one unit-wide
/// range around it.
pub fn histogram_bins(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = if max > min { (min, max) } else { (min - 0.5, max + 0.5) };
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in finite {
        let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (lo + i as f64 * width, lo + (i + 1) as f64 * width, c))
        .collect()
}

/// Frequency histogram with mean and median markers and a summary box.
#[allow(clippy::too_many_arguments)]
pub fn histogram(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    x_desc: &str,
    y_desc: &str,
    unit: &str,
    values: &[f64],
    bins: usize,
) -> Result<Vec<PathBuf>> {
    let edges = histogram_bins(values, bins);
    let (x_min, x_max) = match (edges.first(), edges.last()) {
        (Some(first), Some(last)) => (first.0, last.1),
        _ => (0.0, 1.0),
    };
    let peak = edges.iter().map(|e| e.2).max().unwrap_or(0);
    let y_max = axis_max(std::iter::once(peak as f64), 1.15);
    let mean = average(values);
    let med = median(values.to_vec());
    let r = canvas.render;

    let lowest = values.iter().copied().fold(f64::INFINITY, f64::min);
    let highest = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let summary = [
        format!("تعداد: {}", values.len()),
        format!("حداقل: {} {}", r.decimal(lowest, 1), unit),
        format!("حداکثر: {} {}", r.decimal(highest, 1), unit),
        format!("انحراف معیار: {} {}", r.decimal(std_dev(values), 1), unit),
    ];

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(34))
            .margin(20)
            .x_label_area_size(70)
            .y_label_area_size(90)
            .build_cartesian_2d(x_min..x_max, 0f64..y_max)?;
        chart.plotting_area().fill(&BACKGROUND)?;
        chart
            .configure_mesh()
            .x_label_formatter(&|v| r.amount(*v))
            .y_label_formatter(&|v| r.amount(*v))
            .x_desc(canvas.label(x_desc))
            .y_desc(canvas.label(y_desc))
            .label_style(canvas.font(16))
            .axis_desc_style(canvas.font(20))
            .draw()?;

        chart.draw_series(edges.iter().map(|&(lo, hi, count)| {
            let t = if peak > 0 { count as f64 / peak as f64 } else { 0.0 };
            Rectangle::new([(lo, 0.0), (hi, count as f64)], blend(LOW, HIGH, t).filled())
        }))?;
        chart.draw_series(
            edges
                .iter()
                .map(|&(lo, hi, count)| Rectangle::new([(lo, 0.0), (hi, count as f64)], BLACK.stroke_width(1))),
        )?;

        let mean_label = canvas.label(&format!("میانگین: {} {}", r.decimal(mean, 1), unit));
        chart
            .draw_series(LineSeries::new(vec![(mean, 0.0), (mean, y_max)], RED.stroke_width(3)))?
            .label(mean_label)
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 24, y)], RED.stroke_width(3)));
        let median_label = canvas.label(&format!("میانه: {} {}", r.decimal(med, 1), unit));
        chart
            .draw_series(LineSeries::new(vec![(med, 0.0), (med, y_max)], GREEN.stroke_width(3)))?
            .label(median_label)
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 24, y)], GREEN.stroke_width(3)));
        chart
            .configure_series_labels()
            .label_font(canvas.font(18))
            .background_style(WHITE.mix(0.9))
            .border_style(BLACK)
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;

        let (width, _) = root.dim_in_pixel();
        for (i, line) in summary.iter().enumerate() {
            root.draw(&Text::new(
                canvas.label(line),
                (width as i32 - 60, 240 + i as i32 * 30),
                canvas.anchored(18, HPos::Right, VPos::Top),
            ))?;
        }
        Ok(())
    })
}

/// Descending bars with the cumulative share on a secondary axis and an 80%
/// guide line.
pub fn pareto(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    y_desc: &str,
    curve: &ConcentrationCurve,
) -> Result<Vec<PathBuf>> {
    let n = curve.len().max(1) as f64;
    let y_max = axis_max(curve.points.iter().map(|p| p.amount), 1.1);
    let for_80 = curve.entities_for_share(80.0);
    let r = canvas.render;

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(34))
            .margin(20)
            .x_label_area_size(70)
            .y_label_area_size(110)
            .right_y_label_area_size(90)
            .build_cartesian_2d(0f64..n, 0f64..y_max)?
            .set_secondary_coord(0f64..n, 0f64..105f64);
        chart.plotting_area().fill(&BACKGROUND)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_label_formatter(&|v| r.amount(*v))
            .y_label_formatter(&|v| r.amount(*v))
            .x_desc(canvas.label("رتبه"))
            .y_desc(canvas.label(y_desc))
            .label_style(canvas.font(16))
            .axis_desc_style(canvas.font(20))
            .draw()?;
        chart
            .configure_secondary_axes()
            .y_label_formatter(&|v| r.percent(*v))
            .y_desc(canvas.label("درصد تجمعی"))
            .label_style(canvas.font(16))
            .axis_desc_style(canvas.font(20))
            .draw()?;

        chart.draw_series(curve.points.iter().map(|p| {
            let x = (p.rank - 1) as f64;
            Rectangle::new([(x, 0.0), (x + 1.0, p.amount)], PALETTE[0].mix(0.75).filled())
        }))?;
        chart
            .draw_secondary_series(LineSeries::new(
                curve.points.iter().map(|p| (p.rank as f64 - 0.5, p.cumulative_pct)),
                RED.stroke_width(3),
            ))?
            .label(canvas.label("درصد تجمعی"))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 24, y)], RED.stroke_width(3)));
        chart
            .draw_secondary_series(LineSeries::new(vec![(0.0, 80.0), (n, 80.0)], GREEN.stroke_width(2)))?
            .label(canvas.label("خط ۸۰٪"))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 24, y)], GREEN.stroke_width(2)));
        if let Some(k) = for_80 {
            let x = k as f64;
            chart.draw_secondary_series(LineSeries::new(vec![(x, 0.0), (x, 80.0)], GREEN.stroke_width(2)))?;
            chart.draw_secondary_series(std::iter::once(Text::new(
                canvas.label(&format!("{} نهاد = ۸۰٪", k)),
                (x, 82.0),
                canvas.anchored(18, HPos::Left, VPos::Bottom),
            )))?;
        }
        chart
            .configure_series_labels()
            .label_font(canvas.font(18))
            .background_style(WHITE.mix(0.9))
            .border_style(BLACK)
            .position(SeriesLabelPosition::MiddleRight)
            .draw()?;
        Ok(())
    })
}

/// Points with an optional `y = slope·x` reference line; the `highlight`
/// largest-x points are labelled.
#[allow(clippy::too_many_arguments)]
pub fn scatter(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    x_desc: &str,
    y_desc: &str,
    points: &[Point],
    reference: Option<(f64, &str)>,
    highlight: usize,
) -> Result<Vec<PathBuf>> {
    let x_max = axis_max(points.iter().map(|p| p.x), 1.1);
    let y_max = axis_max(points.iter().map(|p| p.y), 1.1);
    let mut by_x: Vec<&Point> = points.iter().collect();
    by_x.sort_by(|a, b| b.x.partial_cmp(&a.x).unwrap_or(std::cmp::Ordering::Equal));
    let labelled: Vec<&Point> = by_x.into_iter().take(highlight).collect();
    let r = canvas.render;

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(34))
            .margin(20)
            .x_label_area_size(70)
            .y_label_area_size(110)
            .build_cartesian_2d(0f64..x_max, 0f64..y_max)?;
        chart.plotting_area().fill(&BACKGROUND)?;
        chart
            .configure_mesh()
            .x_label_formatter(&|v| r.amount(*v))
            .y_label_formatter(&|v| r.amount(*v))
            .x_desc(canvas.label(x_desc))
            .y_desc(canvas.label(y_desc))
            .label_style(canvas.font(16))
            .axis_desc_style(canvas.font(20))
            .draw()?;

        if let Some((slope, name)) = reference.filter(|(s, _)| *s > 0.0) {
            let end = x_max.min(y_max / slope);
            chart
                .draw_series(LineSeries::new(
                    vec![(0.0, 0.0), (end, end * slope)],
                    BLACK.mix(0.5).stroke_width(2),
                ))?
                .label(canvas.label(name))
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 24, y)], BLACK.mix(0.5).stroke_width(2)));
        }
        chart.draw_series(
            points
                .iter()
                .map(|p| Circle::new((p.x, p.y), 7, PALETTE[0].mix(0.6).filled())),
        )?;
        chart.draw_series(labelled.iter().map(|p| {
            Text::new(
                canvas.label(&truncate_label(&p.label, 24)),
                (p.x, p.y),
                canvas.anchored(14, HPos::Right, VPos::Bottom),
            )
        }))?;
        if reference.is_some() {
            chart
                .configure_series_labels()
                .label_font(canvas.font(18))
                .background_style(WHITE.mix(0.9))
                .border_style(BLACK)
                .position(SeriesLabelPosition::UpperLeft)
                .draw()?;
        }
        Ok(())
    })
}

/// Count matrix; cells shaded by count with the count printed inside.
pub fn heatmap(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    rows: &[String],
    cols: &[String],
    counts: &[Vec<usize>],
) -> Result<Vec<PathBuf>> {
    let (nr, nc) = (rows.len() as i32, cols.len() as i32);
    let peak = counts.iter().flatten().copied().max().unwrap_or(0);
    // First row at the top.
    let row_labels: Vec<String> = rows
        .iter()
        .rev()
        .map(|s| canvas.label(&truncate_label(s, 30)))
        .collect();
    let col_labels: Vec<String> = cols
        .iter()
        .map(|s| canvas.label(&truncate_label(s, 14)))
        .collect();
    let r = canvas.render;

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(32))
            .margin(20)
            .x_label_area_size(90)
            .y_label_area_size(320)
            .build_cartesian_2d((0..nc).into_segmented(), (0..nr).into_segmented())?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(cols.len().max(1))
            .y_labels(rows.len().max(1))
            .x_label_formatter(&|v| segment_label(&col_labels, v))
            .y_label_formatter(&|v| segment_label(&row_labels, v))
            .label_style(canvas.font(13))
            .draw()?;

        let cells: Vec<(i32, i32, usize)> = counts
            .iter()
            .enumerate()
            .flat_map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .map(move |(j, &c)| (j as i32, nr - 1 - i as i32, c))
            })
            .collect();
        chart.draw_series(cells.iter().map(|&(x, y, c)| {
            let t = if peak > 0 { c as f64 / peak as f64 } else { 0.0 };
            let mut rect = Rectangle::new(
                [
                    (SegmentValue::Exact(x), SegmentValue::Exact(y)),
                    (SegmentValue::Exact(x + 1), SegmentValue::Exact(y + 1)),
                ],
                blend(WHITE, HIGH, t).filled(),
            );
            rect.set_margin(1, 1, 1, 1);
            rect
        }))?;
        chart.draw_series(cells.iter().filter(|c| c.2 > 0).map(|&(x, y, c)| {
            Text::new(
                r.label(&c.to_string()),
                (SegmentValue::CenterOf(x), SegmentValue::CenterOf(y)),
                canvas.anchored(14, HPos::Center, VPos::Center),
            )
        }))?;
        Ok(())
    })
}

/// Amount per year as bars joined by a trend line.
pub fn yearly_trend(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    y_desc: &str,
    years: &[(i32, f64)],
) -> Result<Vec<PathBuf>> {
    let n = years.len() as i32;
    let y_max = axis_max(years.iter().map(|y| y.1), 1.2);
    let labels: Vec<String> = years.iter().map(|(y, _)| canvas.label(&y.to_string())).collect();
    let r = canvas.render;

    canvas.draw(stem, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(canvas.label(title), canvas.font(34))
            .margin(20)
            .x_label_area_size(60)
            .y_label_area_size(120)
            .build_cartesian_2d((0..n).into_segmented(), 0f64..y_max)?;
        chart.plotting_area().fill(&BACKGROUND)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(years.len().max(1))
            .x_label_formatter(&|v| segment_label(&labels, v))
            .y_label_formatter(&|v| r.amount(*v))
            .x_desc(canvas.label("سال"))
            .y_desc(canvas.label(y_desc))
            .label_style(canvas.font(18))
            .axis_desc_style(canvas.font(20))
            .draw()?;

        chart.draw_series(years.iter().enumerate().map(|(i, &(_, v))| {
            let i = i as i32;
            let mut rect = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), v)],
                PALETTE[2].mix(0.8).filled(),
            );
            rect.set_margin(0, 0, 30, 30);
            rect
        }))?;
        chart.draw_series(LineSeries::new(
            years
                .iter()
                .enumerate()
                .map(|(i, &(_, v))| (SegmentValue::CenterOf(i as i32), v)),
            PALETTE[4].stroke_width(3),
        ))?;
        chart.draw_series(years.iter().enumerate().map(|(i, &(_, v))| {
            Text::new(
                r.amount(v),
                (SegmentValue::CenterOf(i as i32), v + y_max * 0.02),
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
    fn test_histogram_bins_cover_all_values() {
        let values = [1.0, 2.0, 2.5, 3.0, 10.0];
        let bins = histogram_bins(&values, 3);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins.iter().map(|b| b.2).sum::<usize>(), values.len());
        assert_eq!(bins[0].0, 1.0);
        assert_eq!(bins[2].1, 10.0);
        // the maximum lands in the last bin
        assert_eq!(bins[2].2, 1);
    }

    #[test]
    fn test_histogram_bins_degenerate() {
        assert!(histogram_bins(&[], 5).is_empty());
        assert!(histogram_bins(&[1.0], 0).is_empty());
        let bins = histogram_bins(&[4.0, 4.0], 2);
        assert_eq!(bins, vec![(3.5, 4.0, 0), (4.0, 4.5, 2)]);
    }
}
