use std::path::Path;

use plotters::prelude::*;
use plotters::style::{FontStyle, RGBColor};

pub const FONT: &str = "sans-serif";
pub const NA_COLOR: RGBColor = RGBColor(0x80, 0x80, 0x80);

/// Colors per component, covariate or cell type. Legend entries follow this order.
pub const PALETTE: [(&str, RGBColor); 17] = [
    ("Neuron", RGBColor(0x00, 0x72, 0xB2)),
    ("Oligodendrocyte", RGBColor(0x00, 0x9E, 0x73)),
    ("EndothelialCell", RGBColor(0xCC, 0x79, 0xA7)),
    ("Macrophage", RGBColor(0xE6, 0x9F, 0x00)),
    ("Astrocyte", RGBColor(0xD5, 0x5E, 0x00)),
    ("PCT_INTRONIC_BASES", RGBColor(0x00, 0x00, 0x00)),
    ("comp0", RGBColor(0x00, 0x72, 0xB2)),
    ("comp1", RGBColor(0x00, 0x9E, 0x73)),
    ("comp2", RGBColor(0xCC, 0x79, 0xA7)),
    ("comp3", RGBColor(0xE6, 0x9F, 0x00)),
    ("comp4", RGBColor(0xD5, 0x5E, 0x00)),
    ("PIC1", RGBColor(0x00, 0x72, 0xB2)),
    ("PIC2", RGBColor(0x00, 0x9E, 0x73)),
    ("PIC3", RGBColor(0xCC, 0x79, 0xA7)),
    ("PIC4", RGBColor(0xE6, 0x9F, 0x00)),
    ("PIC5", RGBColor(0xD5, 0x5E, 0x00)),
    ("PIC6", RGBColor(0x56, 0xB4, 0xE9)),
];

pub fn palette_color(key: &str) -> Option<RGBColor> {
    PALETTE
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, color)| *color)
}

/// Axis range over the finite values, padded by 5% on each side.
/// Falls back to a unit range around a constant (or missing) value.
pub fn padded_range(values: impl IntoIterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if min == max {
        return (min - 1.0, max + 1.0);
    }
    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

/// One line of a [`lineplot`].
pub struct Line {
    pub label: String,
    pub color: RGBColor,
    pub points: Vec<(f64, f64)>,
}

/// Draw one line per group with a legend panel to the right.
///
/// # Arguments
/// * `lines`
///     * Lines drawn in order. Legend entries follow the same order.
/// * `xlabel`, `ylabel`
///     * Axis descriptions.
/// * `outpath`
///     * PNG output path.
pub fn lineplot(
    lines: &[Line],
    title: &str,
    xlabel: &str,
    ylabel: &str,
    outpath: &Path,
) -> eyre::Result<()> {
    let (width, height) = (1200, 900);
    let root = BitMapBackend::new(outpath, (width, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let (plot_area, legend_area) = root.split_horizontally(width * 85 / 100);

    let (x_min, x_max) = padded_range(lines.iter().flat_map(|l| l.points.iter().map(|p| p.0)));
    let (y_min, y_max) = padded_range(lines.iter().flat_map(|l| l.points.iter().map(|p| p.1)));

    let mut chart = ChartBuilder::on(&plot_area)
        .caption(title, (FONT, 28).into_font().style(FontStyle::Bold))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc(xlabel)
        .y_desc(ylabel)
        .axis_desc_style((FONT, 20).into_font().style(FontStyle::Bold))
        .draw()?;

    for line in lines {
        chart.draw_series(LineSeries::new(
            line.points.iter().copied(),
            line.color.stroke_width(2),
        ))?;
    }

    // Legend entries, vertically centered.
    let entry_height = 24;
    let y_start = (height as i32 - entry_height * lines.len() as i32) / 2;
    for (i, line) in lines.iter().enumerate() {
        let y = y_start + entry_height * i as i32;
        legend_area.draw(&Rectangle::new(
            [(10, y), (24, y + 14)],
            line.color.filled(),
        ))?;
        legend_area.draw(&Text::new(
            line.label.clone(),
            (30, y),
            (FONT, 14).into_font(),
        ))?;
    }

    root.present()?;
    log::info!("\tSaved plot: {outpath:?}");
    Ok(())
}

/// Scatter plot of colored points with a legend of color patches to the right.
///
/// # Arguments
/// * `points`
///     * `(x, y, color)` per point.
/// * `legend`
///     * Legend entries drawn top to bottom, vertically centered.
pub fn scatterplot(
    points: &[(f64, f64, RGBColor)],
    legend: &[(String, RGBColor)],
    title: &str,
    xlabel: &str,
    ylabel: &str,
    outpath: &Path,
) -> eyre::Result<()> {
    let (width, height) = (1200, 900);
    let root = BitMapBackend::new(outpath, (width, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let (plot_area, legend_area) = root.split_horizontally(width * 90 / 100);

    let (x_min, x_max) = padded_range(points.iter().map(|p| p.0));
    let (y_min, y_max) = padded_range(points.iter().map(|p| p.1));
    let mut chart = ChartBuilder::on(&plot_area)
        .caption(title, (FONT, 40).into_font().style(FontStyle::Bold))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc(xlabel)
        .y_desc(ylabel)
        .axis_desc_style((FONT, 28).into_font().style(FontStyle::Bold))
        .draw()?;
    chart.draw_series(
        points
            .iter()
            .filter(|(x, y, _)| x.is_finite() && y.is_finite())
            .map(|(x, y, color)| Circle::new((*x, *y), 6, color.filled())),
    )?;

    let entry_height = 24;
    let y_start = (height as i32 - entry_height * legend.len() as i32) / 2;
    for (i, (label, color)) in legend.iter().enumerate() {
        let y = y_start + entry_height * i as i32;
        legend_area.draw(&Rectangle::new([(4, y), (18, y + 14)], color.filled()))?;
        legend_area.draw(&Text::new(label.clone(), (22, y), (FONT, 14).into_font()))?;
    }

    root.present()?;
    log::info!("\tSaved plot: {outpath:?}");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_padded_range() {
        let (lo, hi) = padded_range([0.0, 10.0, f64::NAN]);
        assert!((lo + 0.5).abs() < 1e-12);
        assert!((hi - 10.5).abs() < 1e-12);
        assert_eq!(padded_range([2.0, 2.0]), (1.0, 3.0));
        assert_eq!(padded_range(std::iter::empty()), (0.0, 1.0));
    }

    #[test]
    fn test_lineplot_writes_png() {
        let tmp = tempfile::tempdir().unwrap();
        let outpath = tmp.path().join("n.png");
        let lines = vec![
            Line {
                label: "PIC1 [Neuron]".to_owned(),
                color: PALETTE[0].1,
                points: vec![(1.0, 100.0), (2.0, 120.0), (3.0, 125.0)],
            },
            Line {
                label: "PIC2".to_owned(),
                color: NA_COLOR,
                points: vec![(1.0, 90.0), (2.0, 80.0)],
            },
        ];
        lineplot(&lines, "", "iteration", "N", &outpath).unwrap();
        assert!(std::fs::metadata(&outpath).unwrap().len() > 0);
    }

    #[test]
    fn test_scatterplot_writes_png() {
        let tmp = tempfile::tempdir().unwrap();
        let outpath = tmp.path().join("pca.png");
        let points = vec![
            (0.1, 0.2, PALETTE[0].1),
            (-0.3, 0.4, PALETTE[1].1),
            (f64::NAN, 0.0, NA_COLOR),
        ];
        let legend = vec![("GTEx".to_owned(), PALETTE[0].1), ("NA".to_owned(), NA_COLOR)];
        scatterplot(&points, &legend, "PCA - eigenvectors", "PC1", "PC2", &outpath).unwrap();
        assert!(std::fs::metadata(&outpath).unwrap().len() > 0);
    }

    #[test]
    fn test_palette_lookup() {
        assert_eq!(palette_color("PIC6"), Some(RGBColor(0x56, 0xB4, 0xE9)));
        assert_eq!(palette_color("PIC7"), None);
    }
}
