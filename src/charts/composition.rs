use super::{blend, Bar, Canvas, NO_DATA, PALETTE};
use crate::error::Result;
use crate::locale::{truncate_label, wrap_label};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::f64::consts::{PI, TAU};
use std::path::PathBuf;

const BAD: RGBColor = RGBColor(0xD7, 0x30, 0x27);
const FAIR: RGBColor = RGBColor(0xFE, 0xE0, 0x8B);
const GOOD: RGBColor = RGBColor(0x1A, 0x98, 0x50);

/// Red through yellow to green over 0–100.
pub(crate) fn rate_color(pct: f64) -> RGBColor {
    let t = (pct / 100.0).clamp(0.0, 1.0);
    if t < 0.5 {
        blend(BAD, FAIR, t * 2.0)
    } else {
        blend(FAIR, GOOD, (t - 0.5) * 2.0)
    }
}

/// One treemap cell: area from `value`, colour from `shade` (a percentage).
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub label: String,
    pub value: f64,
    pub shade: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn area(&self) -> f64 {
        self.w * self.h
    }
}

/// Worst aspect ratio of a row of areas laid along a side of length `side`.
fn worst(row: &[f64], side: f64) -> f64 {
    let sum: f64 = row.iter().sum();
    let (min, max) = row
        .iter()
        .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &a| (lo.min(a), hi.max(a)));
    if sum <= 0.0 || min <= 0.0 {
        return f64::INFINITY;
    }
    let (s2, sum2) = (side * side, sum * sum);
    (s2 * max / sum2).max(sum2 / (s2 * min))
}

/// Place one row along the shorter side of `free`; returns the space left.
fn lay_row(row: &[f64], free: Rect, out: &mut Vec<Rect>) -> Rect {
    let sum: f64 = row.iter().sum();
    if sum <= 0.0 {
        out.extend(row.iter().map(|_| Rect { w: 0.0, h: 0.0, ..free }));
        return free;
    }
    if free.w >= free.h {
        let w = sum / free.h;
        let mut y = free.y;
        for a in row {
            let h = a / w;
            out.push(Rect { x: free.x, y, w, h });
            y += h;
        }
        Rect {
            x: free.x + w,
            w: (free.w - w).max(0.0),
            ..free
        }
    } else {
        let h = sum / free.w;
        let mut x = free.x;
        for a in row {
            let w = a / h;
            out.push(Rect { x, y: free.y, w, h });
            x += w;
        }
        Rect {
            y: free.y + h,
            h: (free.h - h).max(0.0),
            ..free
        }
    }
}

/// Squarified treemap layout of `values` (largest first) inside `bounds`.
/// One rectangle per value, in input order; non-positive values get an
/// empty one.
pub fn squarify(values: &[f64], bounds: Rect) -> Vec<Rect> {
    let total: f64 = values.iter().filter(|v| v.is_finite() && **v > 0.0).sum();
    if total <= 0.0 || bounds.area() <= 0.0 {
        return values.iter().map(|_| Rect { w: 0.0, h: 0.0, ..bounds }).collect();
    }
    let scale = bounds.area() / total;
    let areas: Vec<f64> = values
        .iter()
        .map(|v| if v.is_finite() { v.max(0.0) * scale } else { 0.0 })
        .collect();

    let mut out = Vec::with_capacity(areas.len());
    let mut free = bounds;
    let mut start = 0;
    while start < areas.len() {
        let side = free.w.min(free.h);
        let mut end = start + 1;
        while end < areas.len() && worst(&areas[start..=end], side) <= worst(&areas[start..end], side) {
            end += 1;
        }
        free = lay_row(&areas[start..end], free, &mut out);
        start = end;
    }
    out
}

/// Tiles sized by value and coloured by their shade, with a 0–100% colour
/// key under the map.
pub fn treemap(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    key_desc: &str,
    tiles: &[Tile],
) -> Result<Vec<PathBuf>> {
    let values: Vec<f64> = tiles.iter().map(|t| t.value).collect();
    let r = canvas.render;

    canvas.draw(stem, |root| {
        let area = root.titled(&canvas.label(title), canvas.font(34))?.margin(10, 10, 20, 20);
        let (_, h) = area.dim_in_pixel();
        let (map, key) = area.split_vertically(h as i32 - 60);
        let (w, h) = map.dim_in_pixel();
        let rects = squarify(
            &values,
            Rect {
                x: 0.0,
                y: 0.0,
                w: w as f64,
                h: h as f64,
            },
        );

        for (tile, rect) in tiles.iter().zip(&rects) {
            if rect.area() < 1.0 {
                continue;
            }
            let corners = [
                (rect.x as i32, rect.y as i32),
                ((rect.x + rect.w) as i32, (rect.y + rect.h) as i32),
            ];
            let fill = tile.shade.map_or(NO_DATA, rate_color);
            map.draw(&Rectangle::new(corners, fill.filled()))?;
            map.draw(&Rectangle::new(corners, WHITE.stroke_width(2)))?;

            if rect.w < 90.0 || rect.h < 50.0 {
                continue;
            }
            let mut lines: Vec<String> = wrap_label(&tile.label, (rect.w / 11.0) as usize, 2)
                .lines()
                .map(str::to_string)
                .collect();
            lines.push(r.amount(tile.value));
            if let Some(s) = tile.shade {
                lines.push(r.percent(s));
            }
            let cx = (rect.x + rect.w / 2.0) as i32;
            let top = (rect.y + rect.h / 2.0) as i32 - lines.len() as i32 * 11;
            for (i, line) in lines.iter().enumerate() {
                map.draw(&Text::new(
                    canvas.label(line),
                    (cx, top + i as i32 * 22),
                    canvas.anchored(16, HPos::Center, VPos::Top),
                ))?;
            }
        }

        let (kw, _) = key.dim_in_pixel();
        let steps = 20;
        let left = kw as i32 / 4;
        let cell = (kw as i32 / 2) / steps;
        for i in 0..steps {
            let x = left + i * cell;
            let pct = (i as f64 + 0.5) / steps as f64 * 100.0;
            key.draw(&Rectangle::new([(x, 10), (x + cell, 30)], rate_color(pct).filled()))?;
        }
        for (pct, x) in [(0.0, left), (50.0, left + cell * steps / 2), (100.0, left + cell * steps)] {
            key.draw(&Text::new(
                r.percent(pct),
                (x, 34),
                canvas.anchored(14, HPos::Center, VPos::Top),
            ))?;
        }
        key.draw(&Text::new(
            canvas.label(key_desc),
            (left - 12, 20),
            canvas.anchored(16, HPos::Right, VPos::Center),
        ))?;
        Ok(())
    })
}

/// Top and bottom width of every funnel stage as a fraction of the largest
/// value. A stage narrows to the width of the next one; the last keeps its
/// own width.
pub fn funnel_widths(values: &[f64]) -> Vec<(f64, f64)> {
    let max = values.iter().copied().filter(|v| v.is_finite()).fold(0.0_f64, f64::max);
    let frac = |v: f64| if max > 0.0 && v.is_finite() { (v / max).clamp(0.0, 1.0) } else { 0.0 };
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let next = values.get(i + 1).copied().unwrap_or(v);
            (frac(v), frac(next))
        })
        .collect()
}

/// Stacked trapezoids, one per stage, with the value and note inside.
pub fn funnel(canvas: &Canvas, stem: &str, title: &str, stages: &[Bar]) -> Result<Vec<PathBuf>> {
    let widths = funnel_widths(&stages.iter().map(|s| s.value).collect::<Vec<_>>());
    let r = canvas.render;

    canvas.draw(stem, |root| {
        let area = root.titled(&canvas.label(title), canvas.font(34))?.margin(20, 20, 40, 40);
        let (w, h) = area.dim_in_pixel();
        let n = stages.len().max(1) as i32;
        let row = h as i32 / n;
        let cx = w as f64 / 2.0;
        let full = w as f64 * 0.6;

        for (i, (stage, &(top, bottom))) in stages.iter().zip(&widths).enumerate() {
            let y0 = i as i32 * row + 4;
            let y1 = (i as i32 + 1) * row - 4;
            let (ht, hb) = (full * top / 2.0, full * bottom / 2.0);
            let color = PALETTE[i % PALETTE.len()];
            area.draw(&Polygon::new(
                vec![
                    ((cx - ht) as i32, y0),
                    ((cx + ht) as i32, y0),
                    ((cx + hb) as i32, y1),
                    ((cx - hb) as i32, y1),
                ],
                color.mix(0.85).filled(),
            ))?;

            let mid = (y0 + y1) / 2;
            let value = match &stage.note {
                Some(note) => format!("{} ({})", r.amount(stage.value), note),
                None => r.amount(stage.value),
            };
            area.draw(&Text::new(
                canvas.label(&stage.label),
                ((cx + full / 2.0) as i32 + 30, mid),
                canvas.anchored(22, HPos::Left, VPos::Center),
            ))?;
            area.draw(&Text::new(
                canvas.label(&value),
                (cx as i32, mid),
                canvas.font(22).color(&WHITE).pos(Pos::new(HPos::Center, VPos::Center)),
            ))?;
        }
        Ok(())
    })
}

/// Start and end angle of every slice, in radians clockwise from twelve
/// o'clock. Non-positive values get an empty slice.
pub fn pie_angles(values: &[f64]) -> Vec<(f64, f64)> {
    let total: f64 = values.iter().filter(|v| v.is_finite() && **v > 0.0).sum();
    let mut start = 0.0;
    values
        .iter()
        .map(|&v| {
            let sweep = if total > 0.0 && v.is_finite() && v > 0.0 {
                v / total * TAU
            } else {
                0.0
            };
            let span = (start, start + sweep);
            start += sweep;
            span
        })
        .collect()
}

fn on_circle(center: (i32, i32), radius: f64, angle: f64) -> (i32, i32) {
    (
        center.0 + (radius * angle.sin()).round() as i32,
        center.1 - (radius * angle.cos()).round() as i32,
    )
}

/// One pie per panel, side by side. Slices under 3% carry no percentage.
pub fn pies(canvas: &Canvas, stem: &str, title: &str, panels: &[(&str, Vec<Bar>)]) -> Result<Vec<PathBuf>> {
    canvas.draw(stem, |root| {
        let area = root.titled(&canvas.label(title), canvas.font(34))?;
        let cells = area.split_evenly((1, panels.len().max(1)));
        for ((name, slices), cell) in panels.iter().zip(&cells) {
            let cell = cell.titled(&canvas.label(name), canvas.font(24))?;
            let (w, h) = cell.dim_in_pixel();
            let center = (w as i32 / 2, h as i32 / 2);
            let radius = (w.min(h) as f64 / 2.0) * 0.62;
            let angles = pie_angles(&slices.iter().map(|s| s.value).collect::<Vec<_>>());

            for (i, (slice, &(a0, a1))) in slices.iter().zip(&angles).enumerate() {
                if a1 <= a0 {
                    continue;
                }
                let steps = ((a1 - a0) / (PI / 180.0)).ceil().max(1.0) as usize;
                let mut outline = vec![center];
                outline.extend((0..=steps).map(|k| {
                    on_circle(center, radius, a0 + (a1 - a0) * k as f64 / steps as f64)
                }));
                let color = PALETTE[i % PALETTE.len()].mix(0.9);
                cell.draw(&Polygon::new(outline.clone(), color.filled()))?;
                outline.push(center);
                cell.draw(&PathElement::new(outline, WHITE.stroke_width(2)))?;

                let mid = (a0 + a1) / 2.0;
                let share = (a1 - a0) / TAU * 100.0;
                if share >= 3.0 {
                    cell.draw(&Text::new(
                        canvas.render.percent(share),
                        on_circle(center, radius * 0.7, mid),
                        canvas.anchored(15, HPos::Center, VPos::Center),
                    ))?;
                }
                let h_pos = if mid.sin() >= 0.0 { HPos::Left } else { HPos::Right };
                cell.draw(&Text::new(
                    canvas.label(&truncate_label(&slice.label, 26)),
                    on_circle(center, radius * 1.08, mid),
                    canvas.anchored(14, h_pos, VPos::Center),
                ))?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Rect {
        Rect {
            x: 0.0,
            y: 0.0,
            w: 6.0,
            h: 4.0,
        }
    }

    #[test]
    fn test_squarify_areas_are_proportional_and_inside() {
        let values = [6.0, 6.0, 4.0, 3.0, 2.0, 2.0, 1.0];
        let rects = squarify(&values, bounds());
        assert_eq!(rects.len(), values.len());
        for (v, r) in values.iter().zip(&rects) {
            // total value 24 fills the 6x4 box, so area equals value
            assert!((r.area() - v).abs() < 1e-9);
            assert!(r.x >= -1e-9 && r.y >= -1e-9);
            assert!(r.x + r.w <= 6.0 + 1e-9 && r.y + r.h <= 4.0 + 1e-9);
        }
        // the first row holds the two largest tiles stacked on the left
        assert_eq!((rects[0].x, rects[1].x), (0.0, 0.0));
        assert!((rects[0].w - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_squarify_skips_non_positive() {
        let rects = squarify(&[3.0, 0.0, -1.0], bounds());
        assert!((rects[0].area() - 24.0).abs() < 1e-9);
        assert_eq!(rects[1].area(), 0.0);
        assert_eq!(rects[2].area(), 0.0);
        assert!(squarify(&[0.0], bounds()).iter().all(|r| r.area() == 0.0));
    }

    #[test]
    fn test_funnel_widths() {
        assert_eq!(
            funnel_widths(&[200.0, 100.0, 50.0]),
            vec![(1.0, 0.5), (0.5, 0.25), (0.25, 0.25)]
        );
        assert_eq!(funnel_widths(&[0.0, 0.0]), vec![(0.0, 0.0), (0.0, 0.0)]);
    }

    #[test]
    fn test_pie_angles_cover_the_circle() {
        let angles = pie_angles(&[1.0, 0.0, 3.0]);
        assert_eq!(angles[0], (0.0, TAU / 4.0));
        assert_eq!(angles[1].0, angles[1].1);
        assert!((angles[2].1 - TAU).abs() < 1e-12);
        assert!(pie_angles(&[0.0]).iter().all(|(a, b)| a == b));
    }

    #[test]
    fn test_rate_color_ends() {
        assert_eq!(rate_color(0.0), BAD);
        assert_eq!(rate_color(100.0), GOOD);
        assert_eq!(rate_color(250.0), GOOD);
    }
}
