use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
    time::Instant,
};

use clap::{Args, ValueEnum};
use eyre::{bail, Context};
use faer::Mat;
use itertools::Itertools;
use plotters::style::RGBColor;
use polars::prelude::*;
use rayon::prelude::*;

use crate::{
    io::{
        create_outdir, f64_values, first_column_name, labelled_frame, load_tsv, string_values,
        write_tsv,
    },
    pca::{pca, Pca},
    plot::{scatterplot, NA_COLOR},
    stats::{mean, std, OlsSolver},
};

/// Dataset (GTE file name) to cohort.
const FILE_COHORTS: [(&str, &str); 17] = [
    ("AMPAD-MAYO-V2", "MAYO"),
    ("CMC_HBCC_set2", "CMC HBCC"),
    ("GTEx", "GTEx"),
    ("AMPAD-ROSMAP-V2", "ROSMAP"),
    ("BrainGVEX-V2", "Brain GVEx"),
    ("TargetALS", "Target ALS"),
    ("AMPAD-MSBB-V2", "MSBB"),
    ("NABEC-H610", "NABEC"),
    ("LIBD_1M", "LIBD"),
    ("ENA", "ENA"),
    ("LIBD_h650", "LIBD"),
    ("GVEX", "GVEX"),
    ("NABEC-H550", "NABEC"),
    ("CMC_HBCC_set3", "CMC HBCC"),
    ("UCLA_ASD", "UCLA ASD"),
    ("CMC", "CMC"),
    ("CMC_HBCC_set1", "CMC HBCC"),
];

const NA_COHORT: &str = "NA";

/// Cohort colors of the PCA plots. Legend entries follow this order.
const COHORT_PALETTE: [(&str, RGBColor); 14] = [
    ("MAYO", RGBColor(0x9c, 0x9f, 0xa0)),
    ("CMC HBCC", RGBColor(0x08, 0x77, 0xb4)),
    ("GTEx", RGBColor(0x0f, 0xa6, 0x7d)),
    ("ROSMAP", RGBColor(0x69, 0x50, 0xa1)),
    ("Brain GVEx", RGBColor(0x48, 0xb2, 0xe5)),
    ("Target ALS", RGBColor(0xd5, 0xc7, 0x7a)),
    ("MSBB", RGBColor(0x5c, 0xc5, 0xbf)),
    ("NABEC", RGBColor(0x6d, 0x74, 0x3a)),
    ("LIBD", RGBColor(0xe4, 0x9d, 0x26)),
    ("ENA", RGBColor(0xd4, 0x67, 0x27)),
    ("GVEX", RGBColor(0x00, 0x00, 0x00)),
    ("UCLA ASD", RGBColor(0xf3, 0x6d, 0x2a)),
    ("CMC", RGBColor(0xea, 0xe4, 0x53)),
    (NA_COHORT, NA_COLOR),
];

/// Number of principal components saved per PCA.
const N_PCA_COMPONENTS: usize = 25;

/// Technical covariates explained above this R² by the others are pruned.
pub const VIF_RSQUARED_THRESHOLD: f64 = 0.9999;
const INDEX_NAME: &str = "-";
const INTERCEPT_COL: &str = "INTERCEPT";
const LOG_INTERVAL_SECS: u64 = 10;
const RESIDUAL_CHUNK_SIZE: usize = 1000;

const STEP_LOG2: &str = "SampleSelection.ProbesWithZeroVarianceRemoved.Log2Transformed";
const STEP_ZTRANSFORM: &str = "SampleSelection.ProbesWithZeroVarianceRemoved.Log2Transformed.ProbesCentered.SamplesZTransformed";

/// Segments of the correction matrix that can be regressed out on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum CorrectionSegment {
    #[value(name = "TechnicalCovariates")]
    TechnicalCovariates,
    #[value(name = "MDS")]
    Mds,
    #[value(name = "Datasets")]
    Datasets,
}

impl CorrectionSegment {
    pub fn name(&self) -> &'static str {
        match self {
            CorrectionSegment::TechnicalCovariates => "TechnicalCovariates",
            CorrectionSegment::Mds => "MDS",
            CorrectionSegment::Datasets => "Datasets",
        }
    }
}

#[derive(Debug, Args)]
pub struct PreprocessExpressionArgs {
    /// The path to the data matrix (probes x samples).
    #[arg(short = 'd', long = "data")]
    pub data: PathBuf,

    /// The path to the technical covariates matrix (samples x covariates).
    #[arg(short = 't', long = "technical-covariates")]
    pub technical_covariates: PathBuf,

    /// The directory with the gene-expression link files.
    #[arg(long = "gte-dir")]
    pub gte_dir: PathBuf,

    /// The gene-expression link file prefix.
    #[arg(short = 'p', long = "gte-prefix")]
    pub gte_prefix: String,

    /// The gene-expression link files (datasets) to exclude.
    #[arg(long = "gte-exclude", num_args = 0..)]
    pub gte_exclude: Vec<String>,

    /// File with the samples to exclude, one per line.
    #[arg(long = "sample-exclude")]
    pub sample_exclude: Option<PathBuf>,

    /// Also regress out each of these segments of the correction matrix on its own.
    #[arg(long = "solo-correction", num_args = 0.., value_enum)]
    pub solo_correction: Vec<CorrectionSegment>,

    /// The name of the output folder.
    #[arg(long = "outfolder", default_value = "output")]
    pub outfolder: String,
}

/// Sample links of all GTE files, in file then row order.
#[derive(Debug, Clone)]
pub struct SampleLinks {
    pub samples: Vec<String>,
    pub datasets: Vec<String>,
    pub cohorts: Vec<Option<String>>,
}

impl SampleLinks {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Drop samples in `exclude`.
    pub fn remove_samples(&mut self, exclude: &HashSet<String>) {
        let keep: Vec<bool> = self.samples.iter().map(|s| !exclude.contains(s)).collect();
        let retain = |values: &mut Vec<String>| {
            let mut flags = keep.iter();
            values.retain(|_| *flags.next().unwrap_or(&false));
        };
        retain(&mut self.samples);
        retain(&mut self.datasets);
        let mut flags = keep.iter();
        self.cohorts.retain(|_| *flags.next().unwrap_or(&false));
    }

    pub fn sample_to_cohort(&self) -> eyre::Result<DataFrame> {
        Ok(DataFrame::new(vec![
            Column::new("sample".into(), self.samples.clone()),
            Column::new("cohort".into(), self.cohorts.clone()),
        ])?)
    }

    /// Sample to cohort, for samples whose dataset has a known cohort.
    pub fn cohort_lookup(&self) -> HashMap<String, String> {
        self.samples
            .iter()
            .zip(&self.cohorts)
            .filter_map(|(sample, cohort)| Some((sample.clone(), cohort.clone()?)))
            .collect()
    }

    pub fn sample_to_dataset(&self) -> eyre::Result<DataFrame> {
        Ok(DataFrame::new(vec![
            Column::new("sample".into(), self.samples.clone()),
            Column::new("dataset".into(), self.datasets.clone()),
        ])?)
    }

    /// Datasets ordered by descending sample count. Ties are ordered by name.
    pub fn datasets_by_size(&self) -> Vec<String> {
        let counts: BTreeMap<&str, usize> = self
            .datasets
            .iter()
            .map(|d| d.as_str())
            .counts()
            .into_iter()
            .collect();
        counts
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1))
            .map(|(dataset, _)| dataset.to_owned())
            .collect()
    }

    /// One-hot dataset membership per sample, columns ordered as [`SampleLinks::datasets_by_size`].
    pub fn dataset_matrix(&self) -> Vec<(String, Vec<f64>)> {
        self.datasets_by_size()
            .into_iter()
            .map(|dataset| {
                let values = self
                    .datasets
                    .iter()
                    .map(|d| if *d == dataset { 1.0 } else { 0.0 })
                    .collect();
                (dataset, values)
            })
            .collect()
    }
}

/// Load every `<prefix>*.txt` GTE file in `gte_dir`, skipping excluded datasets.
///
/// Files have no header; the second column holds the expression sample id.
/// The dataset name is the file name without prefix and `.txt`.
pub fn load_sample_links(
    gte_dir: &Path,
    prefix: &str,
    exclude: &[String],
) -> eyre::Result<SampleLinks> {
    let cohort_lookup: HashMap<&str, &str> = FILE_COHORTS.into_iter().collect();
    let mut files: Vec<PathBuf> = std::fs::read_dir(gte_dir)
        .wrap_err_with(|| format!("Failed to read GTE directory {gte_dir:?}"))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(prefix) && name.ends_with(".txt"))
        })
        .collect();
    files.sort();

    let mut links = SampleLinks {
        samples: vec![],
        datasets: vec![],
        cohorts: vec![],
    };
    for path in files {
        let Some(dataset) = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.trim_end_matches(".txt").replacen(prefix, "", 1))
        else {
            continue;
        };
        if exclude.contains(&dataset) {
            log::info!("\tSkipping dataset {dataset}");
            continue;
        }
        let df = load_tsv(&path, false)?;
        if df.width() < 2 {
            bail!("GTE file {path:?} has fewer than two columns.");
        }
        for sample in string_values(&df, "column_2")?.into_iter().flatten() {
            links.samples.push(sample);
            links.datasets.push(dataset.clone());
            links
                .cohorts
                .push(cohort_lookup.get(dataset.as_str()).map(|c| c.to_string()));
        }
    }
    if links.len() == 0 {
        bail!("No samples found in {gte_dir:?} with prefix {prefix:?}.");
    }
    Ok(links)
}

/// Probes x samples matrix of floats.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    pub index_name: String,
    pub probes: Vec<String>,
    pub samples: Vec<String>,
    pub data: Mat<f64>,
}

impl ExpressionMatrix {
    /// Select `samples` (in that order) from a table whose first column holds the probe ids.
    pub fn from_frame(df: &DataFrame, samples: &[String]) -> eyre::Result<Self> {
        let index_name = first_column_name(df)?;
        let probes: Vec<String> = string_values(df, &index_name)?
            .into_iter()
            .map(|p| p.unwrap_or_default())
            .collect();
        let mut columns = Vec::with_capacity(samples.len());
        for sample in samples {
            if df.column(sample).is_err() {
                bail!("Sample {sample:?} missing from expression matrix.");
            }
            columns.push(f64_values(df, sample)?);
        }
        let data = Mat::from_fn(probes.len(), samples.len(), |i, j| {
            columns[j][i].unwrap_or(f64::NAN)
        });
        Ok(Self {
            index_name,
            probes,
            samples: samples.to_vec(),
            data,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.data.nrows(), self.data.ncols())
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        (0..self.data.ncols()).map(|j| self.data.read(i, j)).collect()
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.data.nrows()).map(|i| self.data.read(i, j)).collect()
    }

    /// Drop probes with a standard deviation of zero. Returns the number kept.
    pub fn remove_zero_variance_probes(&mut self) -> usize {
        let keep: Vec<usize> = (0..self.data.nrows())
            .into_par_iter()
            .filter(|i| std(&self.row(*i)) != 0.0)
            .collect();
        self.data = Mat::from_fn(keep.len(), self.data.ncols(), |i, j| {
            self.data.read(keep[i], j)
        });
        self.probes = keep.iter().map(|i| self.probes[*i].clone()).collect();
        self.probes.len()
    }

    /// `log2(x + 1)`, shifted so the global minimum maps to zero when it is not positive.
    pub fn log2_transform(&mut self) {
        let (nrows, ncols) = self.shape();
        let min_value = (0..ncols)
            .flat_map(|j| (0..nrows).map(move |i| (i, j)))
            .map(|(i, j)| self.data.read(i, j))
            .fold(f64::INFINITY, f64::min);
        let shift = if min_value <= 0.0 { 1.0 - min_value } else { 1.0 };
        self.data = Mat::from_fn(nrows, ncols, |i, j| (self.data.read(i, j) + shift).log2());
    }

    /// Subtract each probe's mean.
    pub fn center_probes(&mut self) {
        let means: Vec<f64> = (0..self.data.nrows())
            .into_par_iter()
            .map(|i| mean(&self.row(i)))
            .collect();
        let (nrows, ncols) = self.shape();
        self.data = Mat::from_fn(nrows, ncols, |i, j| self.data.read(i, j) - means[i]);
    }

    /// Standardize each sample (column) to mean 0 and standard deviation 1.
    pub fn ztransform_samples(&mut self) {
        let stats: Vec<(f64, f64)> = (0..self.data.ncols())
            .into_par_iter()
            .map(|j| {
                let column = self.column(j);
                (mean(&column), std(&column))
            })
            .collect();
        let (nrows, ncols) = self.shape();
        self.data = Mat::from_fn(nrows, ncols, |i, j| {
            let (mu, sd) = stats[j];
            (self.data.read(i, j) - mu) / sd
        });
    }

    /// Residuals of every probe after regressing out the design columns (one value per sample).
    ///
    /// Probes are corrected in chunks on the rayon pool.
    pub fn residuals(&self, design: &[Vec<f64>]) -> eyre::Result<Self> {
        let solver = OlsSolver::new(design)?;
        if solver.rank() < solver.ncols() {
            log::warn!(
                "\tDesign matrix has rank {} for {} columns. Using the pseudo-inverse.",
                solver.rank(),
                solver.ncols()
            );
        }
        let (n_tests, ncols) = self.shape();
        let n_chunks = n_tests.div_ceil(RESIDUAL_CHUNK_SIZE);
        let start = Instant::now();
        let chunks = (0..n_chunks)
            .into_par_iter()
            .map(|chunk| {
                let offset = chunk * RESIDUAL_CHUNK_SIZE;
                let len = RESIDUAL_CHUNK_SIZE.min(n_tests - offset);
                let block = Mat::from_fn(len, ncols, |i, j| self.data.read(offset + i, j));
                let corrected = solver.residual_rows(&block)?;
                log::debug!(
                    "\t{}/{n_tests} probes corrected [{:.2}%] after {}s",
                    offset + len,
                    100.0 * (offset + len) as f64 / n_tests as f64,
                    start.elapsed().as_secs()
                );
                Ok(corrected)
            })
            .collect::<eyre::Result<Vec<Mat<f64>>>>()?;
        if start.elapsed().as_secs() >= LOG_INTERVAL_SECS {
            log::info!(
                "\t{n_tests} probes corrected in {}s",
                start.elapsed().as_secs()
            );
        }
        let data = Mat::from_fn(n_tests, ncols, |i, j| {
            chunks[i / RESIDUAL_CHUNK_SIZE].read(i % RESIDUAL_CHUNK_SIZE, j)
        });
        Ok(Self {
            index_name: self.index_name.clone(),
            probes: self.probes.clone(),
            samples: self.samples.clone(),
            data,
        })
    }

    pub fn to_frame(&self) -> eyre::Result<DataFrame> {
        let columns: Vec<(String, Vec<f64>)> = self
            .samples
            .iter()
            .enumerate()
            .map(|(j, sample)| (sample.clone(), self.column(j)))
            .collect();
        labelled_frame(&self.index_name, &self.probes, &columns)
    }
}

/// Named design columns over the selected samples.
#[derive(Debug, Clone, Default)]
pub struct CovariateMatrix {
    pub columns: Vec<(String, Vec<f64>)>,
}

impl CovariateMatrix {
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn values(&self) -> Vec<Vec<f64>> {
        self.columns.iter().map(|(_, values)| values.clone()).collect()
    }

    pub fn to_frame(&self, samples: &[String]) -> eyre::Result<DataFrame> {
        labelled_frame(INDEX_NAME, samples, &self.columns)
    }
}

/// Iteratively drop the column best explained by the others while its R² exceeds `threshold`.
pub fn remove_multicollinearity(
    mut columns: Vec<(String, Vec<f64>)>,
    threshold: f64,
) -> eyre::Result<Vec<(String, Vec<f64>)>> {
    while columns.len() > 1 {
        let rsquared: Vec<f64> = (0..columns.len())
            .into_par_iter()
            .map(|idx| {
                let others: Vec<Vec<f64>> = columns
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != idx)
                    .map(|(_, (_, values))| values.clone())
                    .collect();
                OlsSolver::new(&others)?.uncentered_rsquared(&columns[idx].1)
            })
            .collect::<eyre::Result<_>>()?;
        let Some((max_index, max_rsquared)) = rsquared
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
        else {
            break;
        };
        if max_rsquared <= threshold {
            break;
        }
        log::debug!(
            "\tDropping {:?} (R² = {max_rsquared:.6})",
            columns[max_index].0
        );
        columns.remove(max_index);
    }
    Ok(columns)
}

/// Correction matrix and its segments.
#[derive(Debug, Clone)]
pub struct Correction {
    pub full: CovariateMatrix,
    pub segments: Vec<(CorrectionSegment, CovariateMatrix)>,
}

impl Correction {
    pub fn segment(&self, segment: CorrectionSegment) -> Option<&CovariateMatrix> {
        self.segments
            .iter()
            .find(|(s, _)| *s == segment)
            .map(|(_, m)| m)
    }
}

/// Build the correction matrix `[INTERCEPT, technical covariates, MDS per dataset, dataset dummies]`.
///
/// # Arguments
/// * `tcov`
///     * Technical covariates of the selected samples, in sample order.
/// * `datasets`
///     * One-hot dataset matrix ordered by descending size. The largest dataset is left out.
pub fn prepare_correction_matrix(
    tcov: Vec<(String, Vec<f64>)>,
    datasets: &[(String, Vec<f64>)],
    n_samples: usize,
) -> eyre::Result<Correction> {
    let tcov: Vec<(String, Vec<f64>)> = tcov.into_iter().filter(|(_, v)| std(v) != 0.0).collect();

    let (mut tech_cov, mut mds, mut n_cohort) = (vec![], vec![], 0);
    for (name, values) in tcov {
        if name.contains("MDS") {
            mds.push((name, values));
        } else if is_binary(&values) {
            n_cohort += 1;
        } else {
            tech_cov.push((name, values));
        }
    }
    log::info!("\tColumn in input file:");
    log::info!("\t  > N-technical covariates: {}", tech_cov.len());
    log::info!("\t  > N-MDS components: {}", mds.len());
    log::info!("\t  > N-cohort dummy variables: {n_cohort}");

    let tech_cov = remove_multicollinearity(tech_cov, VIF_RSQUARED_THRESHOLD)?;

    let mut mds_per_dataset = vec![];
    for (dataset, membership) in datasets {
        for (mds_name, values) in &mds {
            let split = membership
                .iter()
                .zip(values)
                .map(|(m, v)| if *m == 1.0 { *v } else { 0.0 })
                .collect();
            mds_per_dataset.push((format!("{dataset}_{mds_name}"), split));
        }
    }
    let dataset_dummies: Vec<(String, Vec<f64>)> = datasets.iter().skip(1).cloned().collect();

    let full = CovariateMatrix {
        columns: std::iter::once((INTERCEPT_COL.to_owned(), vec![1.0; n_samples]))
            .chain(tech_cov.iter().cloned())
            .chain(mds_per_dataset.iter().cloned())
            .chain(dataset_dummies.iter().cloned())
            .collect(),
    };
    log::info!("\tColumn in technical covariates matrix:");
    log::info!("\t  > N-intercept: 1");
    log::info!("\t  > N-technical covariates: {}", tech_cov.len());
    log::info!("\t  > N-MDS components: {}", mds_per_dataset.len());
    log::info!("\t  > N-dataset dummy variables: {}", dataset_dummies.len());

    Ok(Correction {
        full,
        segments: vec![
            (
                CorrectionSegment::TechnicalCovariates,
                CovariateMatrix { columns: tech_cov },
            ),
            (
                CorrectionSegment::Mds,
                CovariateMatrix {
                    columns: mds_per_dataset,
                },
            ),
            (
                CorrectionSegment::Datasets,
                CovariateMatrix {
                    columns: dataset_dummies,
                },
            ),
        ],
    })
}

/// Values are exactly the set {0, 1}.
fn is_binary(values: &[f64]) -> bool {
    values.iter().all(|v| *v == 0.0 || *v == 1.0)
        && values.contains(&0.0)
        && values.contains(&1.0)
}

/// Technical covariates of `samples`, in that order. First column of `df` holds the sample ids.
pub fn select_covariates(
    df: &DataFrame,
    samples: &[String],
) -> eyre::Result<Vec<(String, Vec<f64>)>> {
    let index_name = first_column_name(df)?;
    let row_of: HashMap<String, usize> = string_values(df, &index_name)?
        .into_iter()
        .enumerate()
        .filter_map(|(i, s)| s.map(|s| (s, i)))
        .collect();
    let rows: Vec<usize> = samples
        .iter()
        .map(|s| match row_of.get(s) {
            Some(i) => Ok(*i),
            None => Err(eyre::eyre!("Sample {s:?} missing from technical covariates.")),
        })
        .collect::<eyre::Result<_>>()?;

    df.get_column_names()
        .iter()
        .skip(1)
        .map(|name| {
            let values = f64_values(df, name.as_str())?;
            let selected = rows
                .iter()
                .map(|i| values[*i].unwrap_or(f64::NAN))
                .collect();
            Ok((name.to_string(), selected))
        })
        .collect()
}

fn output_stem(data: &Path) -> String {
    data.file_name()
        .map(|name| name.to_string_lossy().replace(".gz", "").replace(".txt", ""))
        .unwrap_or_default()
}

/// PCA over the samples of `matrix`: save the eigenvectors and plot the first two by cohort.
///
/// Returns `None` when no PCA can be computed (ex. a sample with constant values).
pub fn save_pca(
    matrix: &ExpressionMatrix,
    sample_to_cohort: &HashMap<String, String>,
    file_path: &Path,
    plot_path: &Path,
) -> eyre::Result<Option<Pca>> {
    let pca = match pca(&matrix.data, N_PCA_COMPONENTS) {
        Ok(pca) => pca,
        Err(err) => {
            log::warn!("\tSkipping PCA: {err}");
            return Ok(None);
        }
    };
    let columns: Vec<(String, Vec<f64>)> = matrix
        .samples
        .iter()
        .enumerate()
        .map(|(j, sample)| {
            let loadings = (0..pca.n_components())
                .map(|k| pca.components.read(k, j))
                .collect();
            (sample.clone(), loadings)
        })
        .collect();
    log::info!("\tSaving file.");
    write_tsv(
        &mut labelled_frame(INDEX_NAME, &pca.component_names(), &columns)?,
        file_path,
        true,
    )?;

    if pca.n_components() < 2 {
        log::warn!("\tLess than two components. Not plotting.");
        return Ok(Some(pca));
    }
    log::info!("Plotting PCA");
    let cohorts: Vec<&str> = matrix
        .samples
        .iter()
        .map(|sample| sample_to_cohort.get(sample).map_or(NA_COHORT, |c| c.as_str()))
        .collect();
    let points: Vec<(f64, f64, RGBColor)> = pca
        .component(0)
        .into_iter()
        .zip(pca.component(1))
        .zip(&cohorts)
        .map(|((x, y), cohort)| (x, y, cohort_color(cohort)))
        .collect();
    let legend: Vec<(String, RGBColor)> = COHORT_PALETTE
        .iter()
        .filter(|(cohort, _)| cohorts.contains(cohort))
        .map(|(cohort, color)| (cohort.to_string(), *color))
        .collect();
    scatterplot(
        &points,
        &legend,
        "PCA - eigenvectors",
        &format!("PC1 [{:.2}%]", pca.explained_variance[0]),
        &format!("PC2 [{:.2}%]", pca.explained_variance[1]),
        plot_path,
    )?;
    Ok(Some(pca))
}

fn cohort_color(cohort: &str) -> RGBColor {
    COHORT_PALETTE
        .iter()
        .find(|(name, _)| *name == cohort)
        .map_or(NA_COLOR, |(_, color)| *color)
}

pub fn run(args: &PreprocessExpressionArgs, output_root: &Path) -> eyre::Result<()> {
    let outdir = output_root
        .join("pre_process_expression_matrix")
        .join(&args.outfolder);
    let file_outdir = create_outdir(outdir.join("data"))?;
    let plot_outdir = create_outdir(outdir.join("plot"))?;
    log::info!("Arguments:");
    log::info!("  > Data: {:?}", args.data);
    log::info!("  > Technical covariates: {:?}", args.technical_covariates);
    log::info!("  > GtE path: {:?}", args.gte_dir);
    log::info!("  >   GtE prefix: {}", args.gte_prefix);
    log::info!("  >   Exclude: {:?}", args.gte_exclude);
    log::info!("  > Sample exclude path: {:?}", args.sample_exclude);
    log::info!(
        "  > Solo correction: {:?}",
        args.solo_correction.iter().map(|s| s.name()).collect_vec()
    );
    log::info!("  > Plot output directory: {plot_outdir:?}");
    log::info!("  > File output directory: {file_outdir:?}");

    let filename = output_stem(&args.data);
    let pca_paths = |file_appendix: &str, plot_appendix: &str| {
        (
            file_outdir.join(format!(
                "{filename}.{file_appendix}.PCAOverSamplesEigenvectors.txt.gz"
            )),
            plot_outdir.join(format!("eigenvectors_plot{plot_appendix}.png")),
        )
    };

    log::info!("Loading samples.");
    let mut links = load_sample_links(&args.gte_dir, &args.gte_prefix, &args.gte_exclude)?;
    log::info!("\tN samples: {}", links.len());
    if let Some(sample_exclude) = &args.sample_exclude {
        let df = load_tsv(sample_exclude, false)?;
        let exclude: HashSet<String> = string_values(&df, "column_1")?.into_iter().flatten().collect();
        log::info!("\tRemoving N samples: {}", exclude.len());
        links.remove_samples(&exclude);
        log::info!("\tN samples: {}", links.len());
    }
    write_tsv(
        &mut links.sample_to_cohort()?,
        file_outdir.join("SampleToCohorts.txt.gz"),
        true,
    )?;
    write_tsv(
        &mut links.sample_to_dataset()?,
        file_outdir.join("SampleToDataset.txt.gz"),
        true,
    )?;
    let sample_to_cohort = links.cohort_lookup();

    let datasets = links.dataset_matrix();
    log::info!(
        "\tDatasets: {} [N = {}]",
        datasets.iter().map(|(name, _)| name).join(", "),
        datasets.len()
    );

    log::info!("Loading data.");
    let df = load_tsv(&args.data, true)?;

    log::info!("Step 1: sample selection.");
    log::info!("\tUsing {}/{} samples.", links.len(), df.width() - 1);
    let mut matrix = ExpressionMatrix::from_frame(&df, &links.samples)?;
    drop(df);

    log::info!("Step 2: remove probes with zero variance.");
    let n_probes = matrix.shape().0;
    let n_kept = matrix.remove_zero_variance_probes();
    log::info!("\tUsing {n_kept}/{n_probes} probes.");

    log::info!("Step 3: log2 transform.");
    matrix.log2_transform();
    log::info!("\tSaving file.");
    write_tsv(
        &mut matrix.to_frame()?,
        file_outdir.join(format!("{filename}.{STEP_LOG2}.txt.gz")),
        true,
    )?;

    log::info!("Step 4: center probes.");
    matrix.center_probes();

    log::info!("Step 5: sample z-transform.");
    matrix.ztransform_samples();
    log::info!("\tSaving file.");
    write_tsv(
        &mut matrix.to_frame()?,
        file_outdir.join(format!("{filename}.{STEP_ZTRANSFORM}.txt.gz")),
        true,
    )?;

    log::info!("Step 6: PCA analysis.");
    let (file_path, plot_path) = pca_paths(STEP_ZTRANSFORM, "_1");
    save_pca(&matrix, &sample_to_cohort, &file_path, &plot_path)?;

    log::info!("Step 7: Construct technical covariate matrix.");
    let df_tcov = load_tsv(&args.technical_covariates, true)?;
    let tcov = select_covariates(&df_tcov, &links.samples)?;
    let correction = prepare_correction_matrix(tcov, &datasets, links.len())?;
    log::info!("\tSaving file.");
    write_tsv(
        &mut correction.full.to_frame(&links.samples)?,
        file_outdir.join("correction_matrix.txt.gz"),
        true,
    )?;

    log::info!("Step 8: remove technical covariates OLS.");
    let corrected = matrix
        .residuals(&correction.full.values())
        .wrap_err("Failed to regress out the correction matrix")?;
    log::info!("\tSaving file.");
    write_tsv(
        &mut corrected.to_frame()?,
        file_outdir.join(format!("{filename}.{STEP_ZTRANSFORM}.CovariatesRemovedOLS.txt.gz")),
        true,
    )?;

    log::info!("Step 9: PCA analysis.");
    let (file_path, plot_path) = pca_paths(
        &format!("{STEP_ZTRANSFORM}.CovariatesRemovedOLS"),
        "_2_CovariatesRemovedOLS",
    );
    save_pca(&corrected, &sample_to_cohort, &file_path, &plot_path)?;
    drop(corrected);

    let mut step = 10;
    for segment in [
        CorrectionSegment::TechnicalCovariates,
        CorrectionSegment::Mds,
        CorrectionSegment::Datasets,
    ] {
        if !args.solo_correction.contains(&segment) {
            continue;
        }
        let name = segment.name();
        log::info!("Step {step}: remove {name} components OLS.");
        step += 1;
        let Some(segment_matrix) = correction.segment(segment) else {
            continue;
        };
        if segment_matrix.columns.is_empty() {
            log::warn!("\tNo {name} columns left. Skipping.");
            continue;
        }
        write_tsv(
            &mut segment_matrix.to_frame(&links.samples)?,
            file_outdir.join(format!("{name}_matrix.txt.gz")),
            true,
        )?;
        let corrected = matrix
            .residuals(&segment_matrix.values())
            .wrap_err_with(|| format!("Failed to regress out {name}"))?;
        log::info!("\tSaving file.");
        write_tsv(
            &mut corrected.to_frame()?,
            file_outdir.join(format!("{filename}.{STEP_ZTRANSFORM}.{name}RemovedOLS.txt.gz")),
            true,
        )?;

        log::info!("Step {step}: PCA analysis.");
        step += 1;
        let (file_path, plot_path) = pca_paths(
            &format!("{STEP_ZTRANSFORM}.{name}RemovedOLS"),
            &format!("_2_{name}RemovedOLS"),
        );
        save_pca(&corrected, &sample_to_cohort, &file_path, &plot_path)?;
    }
    Ok(())
}
