use super::{blend, Canvas, NO_DATA};
use crate::error::{ReportError, Result};
use crate::geo::{map_bounds, ProvinceShape};
use crate::province::{canonical_labels, Province};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, VPos};
use std::collections::HashMap;
use std::path::PathBuf;

const LIGHT: RGBColor = RGBColor(0xE3, 0xF2, 0xFD);
const DARK: RGBColor = RGBColor(0x0D, 0x47, 0xA1);

/// Value of every shape (`None` = no data) and the provinces that have a
/// value but no polygon, sorted.
pub fn join_provinces(
    shapes: &[ProvinceShape],
    values: &HashMap<String, f64>,
) -> (Vec<Option<f64>>, Vec<String>) {
    let shaded = shapes
        .iter()
        .map(|s| match s.province {
            Province::Known(label) => values.get(label).copied(),
            _ => None,
        })
        .collect();
    let mut missing: Vec<String> = values
        .keys()
        .filter(|k| canonical_labels().any(|l| l == k.as_str()))
        .filter(|k| !shapes.iter().any(|s| s.province.label() == k.as_str()))
        .cloned()
        .collect();
    missing.sort();
    (shaded, missing)
}

/// Centre of the bounding box of the largest ring.
fn label_anchor(shape: &ProvinceShape) -> Option<(f64, f64)> {
    let ring = shape.rings.iter().max_by_key(|r| r.len())?;
    let (x0, x1, y0, y1) = ring.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(a, b, c, d), &(x, y)| (a.min(x), b.max(x), c.min(y), d.max(y)),
    );
    x0.is_finite().then(|| ((x0 + x1) / 2.0, (y0 + y1) / 2.0))
}

/// Provinces shaded by value. Provinces without a value are grey; provinces
/// with a value but no polygon are listed under the map.
pub fn choropleth(
    canvas: &Canvas,
    stem: &str,
    title: &str,
    unit: &str,
    shapes: &[ProvinceShape],
    values: &HashMap<String, f64>,
) -> Result<Vec<PathBuf>> {
    let (x0, x1, y0, y1) =
        map_bounds(shapes).ok_or_else(|| ReportError::Geo("no polygons to draw".to_string()))?;
    let (shaded, missing) = join_provinces(shapes, values);
    let peak = shaded.iter().flatten().copied().fold(0.0_f64, f64::max);
    let r = canvas.render;
    let pad_x = (x1 - x0) * 0.03;
    let pad_y = (y1 - y0) * 0.03;

    canvas.draw(stem, |root| {
        let (map_area, legend_area) = root.split_horizontally((r.width as f64 * 0.78) as i32);
        let mut chart = ChartBuilder::on(&map_area)
            .caption(canvas.label(title), canvas.font(34))
            .margin(20)
            .build_cartesian_2d(x0 - pad_x..x1 + pad_x, y0 - pad_y..y1 + pad_y)?;

        for (shape, value) in shapes.iter().zip(&shaded) {
            let fill = match value {
                Some(v) if peak > 0.0 => blend(LIGHT, DARK, v / peak),
                Some(_) => LIGHT,
                None => NO_DATA,
            };
            chart.draw_series(
                shape
                    .rings
                    .iter()
                    .map(|ring| Polygon::new(ring.clone(), fill.filled())),
            )?;
            chart.draw_series(shape.rings.iter().map(|ring| {
                let mut outline = ring.clone();
                if let Some(first) = ring.first() {
                    outline.push(*first);
                }
                PathElement::new(outline, BLACK.stroke_width(1))
            }))?;
        }
        chart.draw_series(shapes.iter().filter_map(|s| {
            let at = label_anchor(s)?;
            Some(Text::new(
                canvas.label(s.province.label()),
                at,
                canvas.anchored(13, HPos::Center, VPos::Center),
            ))
        }))?;

        // Legend: five swatches from zero to the peak, then the no-data swatch.
        let x = 20;
        let mut y = 120;
        legend_area.draw(&Text::new(
            canvas.label(unit),
            (x, y - 40),
            canvas.anchored(18, HPos::Left, VPos::Top),
        ))?;
        for step in (0..5).rev() {
            let t = step as f64 / 4.0;
            legend_area.draw(&Rectangle::new(
                [(x, y), (x + 36, y + 24)],
                blend(LIGHT, DARK, t).filled(),
            ))?;
            legend_area.draw(&Text::new(
                r.amount(peak * t),
                (x + 48, y + 12),
                canvas.anchored(16, HPos::Left, VPos::Center),
            ))?;
            y += 34;
        }
        legend_area.draw(&Rectangle::new([(x, y), (x + 36, y + 24)], NO_DATA.filled()))?;
        legend_area.draw(&Text::new(
            canvas.label("بدون داده"),
            (x + 48, y + 12),
            canvas.anchored(16, HPos::Left, VPos::Center),
        ))?;
        y += 60;

        if !missing.is_empty() {
            legend_area.draw(&Text::new(
                canvas.label("بدون نقشه:"),
                (x, y),
                canvas.anchored(16, HPos::Left, VPos::Top),
            ))?;
            for name in &missing {
                y += 26;
                legend_area.draw(&Text::new(
                    canvas.label(name),
                    (x, y),
                    canvas.anchored(15, HPos::Left, VPos::Top),
                ))?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::province::OTHER_LABEL;
    use crate::types::UNKNOWN_LABEL;

    fn shape(name: &str) -> ProvinceShape {
        ProvinceShape {
            name: name.to_string(),
            province: Province::from_feature_name(name),
            rings: vec![vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]],
        }
    }

    #[test]
    fn test_join_marks_no_data_and_missing() {
        let shapes = vec![shape("Tehran"), shape("Fars"), shape("Yazd")];
        let values: HashMap<String, f64> = [
            ("تهران", 10.0),
            ("فارس", 4.0),
            ("گیلان", 2.0),
            (OTHER_LABEL, 1.0),
            (UNKNOWN_LABEL, 1.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let (shaded, missing) = join_provinces(&shapes, &values);
        assert_eq!(shaded, vec![Some(10.0), Some(4.0), None]);
        assert_eq!(missing, vec!["گیلان".to_string()]);
    }

    #[test]
    fn test_label_anchor() {
        assert_eq!(label_anchor(&shape("Tehran")), Some((0.5, 0.5)));
    }
}
