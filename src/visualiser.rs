use std::path::{Path, PathBuf};

use clap::Args;
use eyre::bail;
use itertools::Itertools;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontStyle, RGBColor};

use crate::{
    io::{create_outdir, f64_values, load_tsv},
    plot::{padded_range, FONT},
    stats::{calc_vertex_xpos, pearsonr, regression_band, spearmanr, OlsSolver},
};

const GROUP_COLORS: [(i64, RGBColor); 3] = [
    (0, RGBColor(0xE6, 0x9F, 0x00)),
    (1, RGBColor(0x00, 0x72, 0xB2)),
    (2, RGBColor(0xD5, 0x5E, 0x00)),
];
/// Annotation heights as a fraction of the y-axis, per genotype group.
const GROUP_LABEL_POS: [f64; 3] = [0.94, 0.90, 0.86];
const RSQUARED_LABEL_POS: f64 = 0.82;
const FDR_LABEL_POS: f64 = 0.78;
/// Two-sided level of the regression confidence bands.
const CI_LEVEL: f64 = 0.95;
/// Grid points along the covariate at which a band is evaluated.
const BAND_POINTS: usize = 100;
/// Genotype dosage marking a missing call.
const MISSING_GENOTYPE: f64 = -1.0;

#[derive(Debug, Args)]
pub struct PlotIeqtlArgs {
    /// TSV with the columns `genotype`, `covariate` and `expression`, one row per sample.
    #[arg(short = 'd', long = "data")]
    pub data: PathBuf,

    /// Identifier of the ieQTL, ex. `<snp>:<probe>`.
    #[arg(long = "id")]
    pub id: String,

    /// Iteration the ieQTL is plotted for.
    #[arg(long, default_value_t = 0)]
    pub iteration: usize,

    /// FDR of the ieQTL, annotated on the start panel.
    #[arg(long)]
    pub fdr: Option<f64>,

    /// Optimized covariate values, one per row of `--data` (column `ocf` or the last column).
    #[arg(long)]
    pub ocf: Option<PathBuf>,

    /// Output path. Plots are written to `<out-path>/plot`.
    #[arg(short = 'o', long = "out-path")]
    pub out_path: PathBuf,
}

/// Interaction eQTL model `expression ~ 1 + genotype + covariate + genotype:covariate`.
///
/// Only samples with a genotype call and non-missing covariate and expression are part of the model.
/// [`Ieqtl::mask`] marks them in the input order.
#[derive(Debug, Clone)]
pub struct Ieqtl {
    id: String,
    genotype: Vec<f64>,
    covariate: Vec<f64>,
    expression: Vec<f64>,
    mask: Vec<bool>,
}

impl Ieqtl {
    pub fn new(
        id: impl Into<String>,
        genotype: &[Option<f64>],
        covariate: &[Option<f64>],
        expression: &[Option<f64>],
    ) -> eyre::Result<Self> {
        if genotype.len() != covariate.len() || genotype.len() != expression.len() {
            bail!(
                "Genotype ({}), covariate ({}) and expression ({}) differ in length.",
                genotype.len(),
                covariate.len(),
                expression.len()
            );
        }
        let mask: Vec<bool> = genotype
            .iter()
            .zip(covariate)
            .zip(expression)
            .map(|((g, c), y)| match (g, c, y) {
                (Some(g), Some(c), Some(y)) => {
                    *g != MISSING_GENOTYPE && g.is_finite() && c.is_finite() && y.is_finite()
                }
                _ => false,
            })
            .collect();
        let masked = |values: &[Option<f64>]| -> Vec<f64> {
            values
                .iter()
                .zip(&mask)
                .filter_map(|(v, keep)| keep.then_some(*v).flatten())
                .collect()
        };
        let ieqtl = Self {
            id: id.into(),
            genotype: masked(genotype),
            covariate: masked(covariate),
            expression: masked(expression),
            mask,
        };
        if ieqtl.n() < 4 {
            bail!(
                "ieQTL {} has {} usable samples, at least 4 are needed.",
                ieqtl.id,
                ieqtl.n()
            );
        }
        Ok(ieqtl)
    }

    /// Load from a TSV with the columns `genotype`, `covariate` and `expression`.
    pub fn from_tsv(path: impl AsRef<Path>, id: impl Into<String>) -> eyre::Result<Self> {
        let df = load_tsv(path, true)?;
        Self::new(
            id,
            &f64_values(&df, "genotype")?,
            &f64_values(&df, "covariate")?,
            &f64_values(&df, "expression")?,
        )
    }

    pub fn get_ieqtl_id(&self) -> &str {
        &self.id
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn n(&self) -> usize {
        self.expression.len()
    }

    pub fn y(&self) -> &[f64] {
        &self.expression
    }

    /// Design matrix columns `[intercept, genotype, covariate, interaction]`.
    pub fn x(&self) -> Vec<Vec<f64>> {
        design_matrix(&self.genotype, &self.covariate)
    }

    /// Per-sample quadratic `a c² + b c` of the squared residual as a function of the covariate `c`.
    ///
    /// With the fitted model `y = b0 + b1 g + b2 c + b3 g c` the residual of a sample is
    /// `(y - b0 - b1 g) - (b2 + b3 g) c`, which gives:
    /// * `a = (b2 + b3 g)²`
    /// * `b = -2 (y - b0 - b1 g)(b2 + b3 g)`
    pub fn get_mll_coef_representation(&self) -> eyre::Result<(Vec<f64>, Vec<f64>)> {
        let betas = OlsSolver::new(&self.x())?.coefficients(&self.expression)?;
        let (b0, b1, b2, b3) = (betas[0], betas[1], betas[2], betas[3]);
        Ok(self
            .genotype
            .iter()
            .zip(&self.expression)
            .map(|(g, y)| {
                let slope = b2 + b3 * g;
                let offset = y - b0 - b1 * g;
                (slope * slope, -2.0 * offset * slope)
            })
            .unzip())
    }
}

fn design_matrix(genotype: &[f64], covariate: &[f64]) -> Vec<Vec<f64>> {
    vec![
        vec![1.0; genotype.len()],
        genotype.to_vec(),
        covariate.to_vec(),
        genotype.iter().zip(covariate).map(|(g, c)| g * c).collect(),
    ]
}

/// R² of the fit, as the squared Pearson correlation of observed and fitted values.
fn explained_variance(x: &[Vec<f64>], y: &[f64]) -> eyre::Result<f64> {
    let fitted = OlsSolver::new(x)?.predict(y)?;
    let r = pearsonr(y, &fitted);
    Ok(r * r)
}

/// Optimized covariate per sample: the vertex of [`Ieqtl::get_mll_coef_representation`].
pub fn solo_optimized_covariate(ieqtl: &Ieqtl) -> eyre::Result<Vec<f64>> {
    let (coef_a, coef_b) = ieqtl.get_mll_coef_representation()?;
    Ok(vertex_or_covariate(&coef_a, &coef_b, &ieqtl.covariate))
}

/// Vertex `-b / 2a` per sample. Samples whose quadratic is flat (`a == 0`) keep their covariate.
fn vertex_or_covariate(coef_a: &[f64], coef_b: &[f64], covariate: &[f64]) -> Vec<f64> {
    coef_a
        .iter()
        .zip(coef_b)
        .zip(covariate)
        .map(|((a, b), c)| if *a == 0.0 { *c } else { calc_vertex_xpos(*a, *b) })
        .collect()
}

/// Data of one panel of the interaction figure.
pub struct Panel {
    pub title: String,
    pub xlabel: String,
    pub ylabel: String,
    pub covariate: Vec<f64>,
    pub expression: Vec<f64>,
    pub group: Vec<i64>,
    pub rsquared: Option<f64>,
    pub fdr: Option<f64>,
    /// Level of the confidence band around each regression line, none if not drawn.
    pub ci: Option<f64>,
}

impl Panel {
    /// Samples of one genotype group as `(covariate, expression)`.
    fn group_points(&self, group_id: i64) -> (Vec<f64>, Vec<f64>) {
        self.group
            .iter()
            .zip(self.covariate.iter().zip(&self.expression))
            .filter(|(g, _)| **g == group_id)
            .map(|(_, (x, y))| (*x, *y))
            .unzip()
    }

    /// Annotation of a genotype group: Spearman correlation of expression and covariate and group size.
    ///
    /// Groups are rounded dosages and labelled as such, ex. `1.0: r = 0.25 [n=40]`.
    pub fn group_label(&self, group_id: i64) -> String {
        let (x, y) = self.group_points(group_id);
        let coef_str = if x.len() > 1 {
            let coef = spearmanr(&y, &x);
            if coef.is_nan() {
                "nan".to_owned()
            } else {
                format!("{coef:.2}")
            }
        } else {
            "NA".to_owned()
        };
        format!("{:.1}: r = {coef_str} [n={}]", group_id as f64, x.len())
    }

    /// Only panels with exactly the genotype groups 0, 1 and 2 are drawn.
    pub fn has_all_groups(&self) -> bool {
        let groups: Vec<i64> = self.group.iter().copied().unique().sorted().collect();
        groups == [0, 1, 2]
    }
}

/// Both panels of an interaction figure and where it is written.
pub struct InteractionFigure {
    pub title: String,
    pub path: PathBuf,
    pub start: Panel,
    pub optimized: Panel,
}

impl InteractionFigure {
    pub fn rsquared_start(&self) -> Option<f64> {
        self.start.rsquared
    }

    /// Only computed when optimized covariate values were given.
    pub fn rsquared_opt(&self) -> Option<f64> {
        self.optimized.rsquared
    }
}

/// Compute the start and optimized panels of an ieQTL.
///
/// # Arguments
/// * `ieqtl`
///     * Model to plot.
/// * `out_path`
///     * Figures are written to `<out_path>/plot`. The directory is created.
/// * `iteration`
///     * Iteration number, part of the title and file name.
/// * `fdr`
///     * Annotated on the start panel if given.
/// * `ocf`
///     * Optimized covariate for every input sample, masked with [`Ieqtl::mask`].
///     * If `None`, the covariate is optimized for this ieQTL alone (see [`solo_optimized_covariate`]).
pub fn interaction_figure(
    ieqtl: &Ieqtl,
    out_path: &Path,
    iteration: usize,
    fdr: Option<f64>,
    ocf: Option<&[f64]>,
) -> eyre::Result<InteractionFigure> {
    let outdir = create_outdir(out_path.join("plot"))?;

    let x_start = ieqtl.x();
    let y = ieqtl.y();
    let rsquared_start = explained_variance(&x_start, y)?;

    let (solo_optimized, ocf) = match ocf {
        None => (true, solo_optimized_covariate(ieqtl)?),
        Some(ocf) => {
            if ocf.len() != ieqtl.mask().len() {
                bail!(
                    "Got {} optimized covariate values for {} samples.",
                    ocf.len(),
                    ieqtl.mask().len()
                );
            }
            let masked = ocf
                .iter()
                .zip(ieqtl.mask())
                .filter_map(|(v, keep)| keep.then_some(*v))
                .collect();
            (false, masked)
        }
    };

    let x_opt = design_matrix(&ieqtl.genotype, &ocf);
    let rsquared_opt = if solo_optimized {
        None
    } else {
        Some(explained_variance(&x_opt, y)?)
    };

    let group: Vec<i64> = ieqtl
        .genotype
        .iter()
        .map(|g| g.round_ties_even() as i64)
        .collect();
    let start = Panel {
        title: "start".to_owned(),
        xlabel: "normalised cell fraction".to_owned(),
        ylabel: "gene expression".to_owned(),
        covariate: ieqtl.covariate.clone(),
        expression: y.to_vec(),
        group: group.clone(),
        rsquared: Some(rsquared_start),
        fdr,
        ci: Some(CI_LEVEL),
    };
    let (p2_title, file_appendix) = if solo_optimized {
        ("optimized [solo]", "_soloOptimized")
    } else {
        ("optimized", "")
    };
    let optimized = Panel {
        title: p2_title.to_owned(),
        xlabel: "optimized cell fraction".to_owned(),
        ylabel: String::new(),
        covariate: ocf,
        expression: y.to_vec(),
        group,
        rsquared: rsquared_opt,
        fdr: None,
        ci: (!solo_optimized).then_some(CI_LEVEL),
    };

    let title = format!("{}:{iteration}", ieqtl.get_ieqtl_id());
    let path = outdir.join(format!("{}{file_appendix}.png", title.replace(':', "-")));
    Ok(InteractionFigure {
        title,
        path,
        start,
        optimized,
    })
}

/// Plot an ieQTL before and after optimizing its covariate. See [`interaction_figure`].
pub fn plot(
    ieqtl: &Ieqtl,
    out_path: &Path,
    iteration: usize,
    fdr: Option<f64>,
    ocf: Option<&[f64]>,
) -> eyre::Result<InteractionFigure> {
    let figure = interaction_figure(ieqtl, out_path, iteration, fdr, ocf)?;
    create_interaction_figure(&figure)?;
    Ok(figure)
}

fn create_interaction_figure(figure: &InteractionFigure) -> eyre::Result<()> {
    let root = BitMapBackend::new(&figure.path, (2400, 900)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(&figure.title, (FONT, 36))?;
    let areas = root.split_evenly((1, 2));
    for (area, panel) in areas.iter().zip([&figure.start, &figure.optimized]) {
        inter_plot(area, panel)?;
    }
    root.present()?;
    log::info!("\tSaved plot: {:?}", figure.path);
    Ok(())
}

fn inter_plot(area: &DrawingArea<BitMapBackend, Shift>, panel: &Panel) -> eyre::Result<()> {
    if !panel.has_all_groups() {
        log::warn!(
            "Panel {:?} does not have exactly the genotype groups 0, 1 and 2. Skipping.",
            panel.title
        );
        return Ok(());
    }

    let (x_min, x_max) = padded_range(panel.covariate.iter().copied());
    let (y_min, y_max) = padded_range(panel.expression.iter().copied());
    let mut chart = ChartBuilder::on(area)
        .caption(&panel.title, (FONT, 32).into_font().style(FontStyle::Bold))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc(panel.xlabel.as_str())
        .y_desc(panel.ylabel.as_str())
        .axis_desc_style((FONT, 28).into_font().style(FontStyle::Bold))
        .draw()?;

    // Annotations are placed relative to the axes.
    let annotate_at = |frac: f64| (x_min + 0.03 * (x_max - x_min), y_min + frac * (y_max - y_min));

    for ((group_id, color), label_pos) in GROUP_COLORS.iter().zip(GROUP_LABEL_POS) {
        let (x, y) = panel.group_points(*group_id);
        if x.len() > 1 {
            chart.draw_series(
                x.iter()
                    .zip(&y)
                    .map(|(x, y)| Circle::new((*x, *y), 4, color.mix(0.3).filled())),
            )?;
            let (lo, hi) = x
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(*v), hi.max(*v))
                });
            // No line through a constant covariate.
            if lo < hi {
                if let Some(level) = panel.ci {
                    let grid: Vec<f64> = (0..BAND_POINTS)
                        .map(|i| lo + (hi - lo) * i as f64 / (BAND_POINTS - 1) as f64)
                        .collect();
                    let band = regression_band(&x, &y, &grid, level)?;
                    if !band.is_empty() {
                        let outline: Vec<(f64, f64)> = band
                            .iter()
                            .map(|(x, lower, _)| (*x, *lower))
                            .chain(band.iter().rev().map(|(x, _, upper)| (*x, *upper)))
                            .collect();
                        chart.draw_series(std::iter::once(Polygon::new(
                            outline,
                            color.mix(0.15).filled(),
                        )))?;
                    }
                }
                let coef = OlsSolver::new(&[vec![1.0; x.len()], x.clone()])?.coefficients(&y)?;
                chart.draw_series(LineSeries::new(
                    [lo, hi].map(|v| (v, coef[0] + coef[1] * v)),
                    color.mix(0.75).stroke_width(3),
                ))?;
            }
        }
        chart.draw_series(std::iter::once(Text::new(
            panel.group_label(*group_id),
            annotate_at(label_pos),
            (FONT, 24)
                .into_font()
                .style(FontStyle::Bold)
                .color(&color.mix(0.75)),
        )))?;
    }

    let black = RGBColor(0, 0, 0).mix(0.75);
    if let Some(rsquared) = panel.rsquared {
        chart.draw_series(std::iter::once(Text::new(
            format!("r-squared = {rsquared:.2}"),
            annotate_at(RSQUARED_LABEL_POS),
            (FONT, 24).into_font().style(FontStyle::Bold).color(&black),
        )))?;
    }
    if let Some(fdr) = panel.fdr {
        chart.draw_series(std::iter::once(Text::new(
            format!("FDR = {fdr:.2e}"),
            annotate_at(FDR_LABEL_POS),
            (FONT, 24).into_font().style(FontStyle::Bold).color(&black),
        )))?;
    }
    Ok(())
}

/// Optimized covariate values from a TSV: column `ocf` if present, else the last column.
fn load_ocf(path: &Path) -> eyre::Result<Vec<f64>> {
    let df = load_tsv(path, true)?;
    let name = match df.column("ocf") {
        Ok(_) => "ocf".to_owned(),
        Err(_) => match df.get_column_names().last() {
            Some(name) => name.to_string(),
            None => bail!("No columns in {path:?}."),
        },
    };
    Ok(f64_values(&df, &name)?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

pub fn run(args: &PlotIeqtlArgs) -> eyre::Result<()> {
    log::info!("Arguments:");
    log::info!("  > Data: {:?}", args.data);
    log::info!("  > ieQTL: {}", args.id);
    log::info!("  > Iteration: {}", args.iteration);
    log::info!("  > OCF: {:?}", args.ocf);
    log::info!("  > Output path: {:?}", args.out_path);

    let ieqtl = Ieqtl::from_tsv(&args.data, &args.id)?;
    let ocf = args.ocf.as_deref().map(load_ocf).transpose()?;
    let figure = plot(
        &ieqtl,
        &args.out_path,
        args.iteration,
        args.fdr,
        ocf.as_deref(),
    )?;
    let fmt = |r: Option<f64>| r.map_or_else(|| "NA".to_owned(), |r| format!("{r:.4}"));
    log::info!(
        "r-squared start: {}, optimized: {}",
        fmt(figure.rsquared_start()),
        fmt(figure.rsquared_opt())
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    /// Expression generated from a known interaction model without noise.
    fn simulated(n: usize) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
        let mut genotype = vec![];
        let mut covariate = vec![];
        let mut expression = vec![];
        for i in 0..n {
            let g = (i % 3) as f64;
            let c = ((i * 7) % 11) as f64 / 10.0;
            genotype.push(Some(g));
            covariate.push(Some(c));
            expression.push(Some(0.5 + 0.2 * g + 1.5 * c + 0.8 * g * c));
        }
        (genotype, covariate, expression)
    }

    #[test]
    fn test_mask_drops_missing_samples() {
        let (mut g, c, mut y) = simulated(12);
        g[0] = Some(MISSING_GENOTYPE);
        g[1] = None;
        y[2] = None;
        let ieqtl = Ieqtl::new("rs1:ENSG1", &g, &c, &y).unwrap();
        assert_eq!(ieqtl.n(), 9);
        assert_eq!(&ieqtl.mask()[..4], [false, false, false, true]);
        assert_eq!(ieqtl.x().len(), 4);
        assert!(ieqtl.x().iter().all(|col| col.len() == 9));
    }

    #[test]
    fn test_too_few_samples() {
        let (g, c, y) = simulated(3);
        assert!(Ieqtl::new("id", &g, &c, &y).is_err());
    }

    #[test]
    fn test_solo_optimized_recovers_covariate() {
        // Noise-free data: every sample's residual is zero at its observed covariate.
        let (g, c, y) = simulated(30);
        let ieqtl = Ieqtl::new("rs1:ENSG1", &g, &c, &y).unwrap();
        let ocf = solo_optimized_covariate(&ieqtl).unwrap();
        for (opt, orig) in ocf.iter().zip(c.iter().flatten()) {
            assert!((opt - orig).abs() < 1e-6, "{opt} != {orig}");
        }
    }

    #[test]
    fn test_group_label() {
        let panel = Panel {
            title: "start".to_owned(),
            xlabel: String::new(),
            ylabel: String::new(),
            covariate: vec![0.1, 0.2, 0.3, 0.5],
            expression: vec![1.0, 2.0, 3.0, 4.0],
            group: vec![0, 0, 0, 1],
            rsquared: None,
            fdr: None,
            ci: None,
        };
        assert_eq!(panel.group_label(0), "0.0: r = 1.00 [n=3]");
        assert_eq!(panel.group_label(1), "1.0: r = NA [n=1]");
        assert_eq!(panel.group_label(2), "2.0: r = NA [n=0]");
        assert!(!panel.has_all_groups());

        // Constant expression within a group has no defined correlation.
        let flat = Panel {
            expression: vec![2.0, 2.0, 2.0, 4.0],
            ..panel
        };
        assert_eq!(flat.group_label(0), "0.0: r = nan [n=3]");
    }

    #[test]
    fn test_vertex_or_covariate() {
        let optimized = vertex_or_covariate(&[0.0, 2.0, 0.0], &[5.0, -4.0, 0.0], &[0.3, 0.4, 0.5]);
        assert_eq!(optimized, vec![0.3, 1.0, 0.5]);
    }

    #[test]
    fn test_interaction_figure() {
        let tmp = tempfile::tempdir().unwrap();
        let (g, c, y) = simulated(30);
        let ieqtl = Ieqtl::new("rs1:ENSG1", &g, &c, &y).unwrap();

        let solo = interaction_figure(&ieqtl, tmp.path(), 2, Some(1.5e-5), None).unwrap();
        assert!(solo.path.ends_with("plot/rs1-ENSG1-2_soloOptimized.png"));
        assert!(tmp.path().join("plot").is_dir());
        assert_eq!(solo.title, "rs1:ENSG1:2");
        assert_eq!(solo.optimized.title, "optimized [solo]");
        assert!((solo.rsquared_start().unwrap() - 1.0).abs() < 1e-9);
        assert!(solo.rsquared_opt().is_none());
        assert_eq!(solo.start.ci, Some(CI_LEVEL));
        assert_eq!(solo.optimized.ci, None);
        assert!(solo.start.has_all_groups());
        assert_eq!(solo.start.fdr, Some(1.5e-5));
        assert_eq!(solo.optimized.fdr, None);

        let ocf: Vec<f64> = c.iter().flatten().map(|v| v * 2.0).collect();
        let opt = interaction_figure(&ieqtl, tmp.path(), 2, None, Some(&ocf)).unwrap();
        assert!(opt.path.ends_with("plot/rs1-ENSG1-2.png"));
        assert_eq!(opt.optimized.covariate, ocf);
        assert!((opt.rsquared_opt().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(opt.optimized.ci, Some(CI_LEVEL));

        assert!(interaction_figure(&ieqtl, tmp.path(), 2, None, Some(&ocf[1..])).is_err());
    }

    /// Simulated data with some noise so the bands have a width.
    fn noisy(n: usize) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
        let (g, c, y) = simulated(n);
        let y = y
            .into_iter()
            .enumerate()
            .map(|(i, y)| y.map(|y| y + ((i * 5) % 7) as f64 * 0.05))
            .collect();
        (g, c, y)
    }

    #[test]
    fn test_plot_writes_png() {
        let tmp = tempfile::tempdir().unwrap();
        let (g, c, y) = noisy(30);
        let ieqtl = Ieqtl::new("rs1:ENSG1", &g, &c, &y).unwrap();
        let figure = plot(&ieqtl, tmp.path(), 1, Some(0.01), None).unwrap();
        assert!(std::fs::metadata(&figure.path).unwrap().len() > 0);

        // A panel without all genotype groups is left empty, the figure is still written.
        let (mut g, c, y) = noisy(30);
        for v in g.iter_mut().filter(|v| **v == Some(2.0)) {
            *v = Some(1.0);
        }
        let ieqtl = Ieqtl::new("rs2:ENSG2", &g, &c, &y).unwrap();
        let figure = interaction_figure(&ieqtl, tmp.path(), 1, None, None).unwrap();
        assert!(!figure.start.has_all_groups());
        create_interaction_figure(&figure).unwrap();
        assert!(std::fs::metadata(&figure.path).unwrap().len() > 0);
    }

    #[test]
    fn test_run_with_ocf() {
        let tmp = tempfile::tempdir().unwrap();
        let (g, c, y) = noisy(30);
        let mut data = "genotype\tcovariate\texpression\n".to_owned();
        let mut ocf = "sample\tocf\n".to_owned();
        for (i, ((g, c), y)) in g.iter().zip(&c).zip(&y).enumerate() {
            let (g, c, y) = (g.unwrap(), c.unwrap(), y.unwrap());
            data.push_str(&format!("{g}\t{c}\t{y}\n"));
            ocf.push_str(&format!("s{i}\t{}\n", c + 0.1));
        }
        let data_path = tmp.path().join("ieqtl.txt");
        let ocf_path = tmp.path().join("ocf.txt");
        std::fs::write(&data_path, data).unwrap();
        std::fs::write(&ocf_path, ocf).unwrap();

        let args = PlotIeqtlArgs {
            data: data_path,
            id: "rs1:ENSG1".to_owned(),
            iteration: 3,
            fdr: Some(0.05),
            ocf: Some(ocf_path.clone()),
            out_path: tmp.path().to_path_buf(),
        };
        run(&args).unwrap();
        assert!(tmp.path().join("plot").join("rs1-ENSG1-3.png").is_file());

        let values = load_ocf(&ocf_path).unwrap();
        assert_eq!(values.len(), 30);

        let solo = PlotIeqtlArgs { ocf: None, ..args };
        run(&solo).unwrap();
        assert!(tmp
            .path()
            .join("plot")
            .join("rs1-ENSG1-3_soloOptimized.png")
            .is_file());
    }
}
