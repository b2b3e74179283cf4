use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use clap::Args;
use eyre::bail;
use polars::prelude::*;

use crate::io::{create_outdir, first_column_name, load_tsv, string_values, write_tsv};

/// Cohorts in the order of [`DATASET_SIZES`].
pub const DATASET_ORDER: [&str; 9] = [
    "RS",
    "LL",
    "LLS_660Q",
    "NTR_AFFY",
    "LLS_OmniExpr",
    "CODAM",
    "PAN",
    "NTR_GONL",
    "GONL",
];
/// Number of samples per cohort.
pub const DATASET_SIZES: [i64; 9] = [765, 733, 400, 341, 255, 184, 169, 138, 74];

const COLUMN_TRANSLATIONS: [(&str, &str); 2] = [("SNP", "SNPName"), ("Gene", "ProbeName")];

pub const SNP_COL: &str = "SNPName";
pub const PROBE_COL: &str = "ProbeName";
pub const N_DATASETS_COL: &str = "N datasets";
pub const N_SAMPLES_COL: &str = "N samples";
const INDEX_COL: &str = "index";
const OUTPUT_FNAME: &str = "BIOS_eQTLProbesFDR0.05-ProbeLevel.txt.gz";

#[derive(Debug, Args)]
pub struct PrepareEqtlArgs {
    /// The path to the replication eQTL matrix.
    #[arg(short = 'e', long = "eqtl")]
    pub eqtl: PathBuf,

    /// The path to the SNP x dataset presence matrix.
    #[arg(short = 's', long = "snps")]
    pub snps: PathBuf,

    /// Keep only the first eQTL per probe whose SNP is in the SNP matrix.
    #[arg(long)]
    pub top_per_probe: bool,
}

/// Rename `SNP` and `Gene` to `SNPName` and `ProbeName`. Other columns keep their name.
pub fn rename_eqtl_columns(df: &mut DataFrame) -> eyre::Result<()> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| {
            COLUMN_TRANSLATIONS
                .iter()
                .find(|(from, _)| *from == name.as_str())
                .map_or_else(|| name.to_string(), |(_, to)| to.to_string())
        })
        .collect();
    df.set_column_names(names)?;
    Ok(())
}

/// Add the per-SNP dataset and sample counts to a SNP x dataset presence matrix.
///
/// # Arguments
/// * `df_snps`
///     * [`DataFrame`] whose first column is the SNP id and remaining columns are presence flags per cohort.
///
/// # Returns
/// * [`DataFrame`] with the SNP id column renamed to `SNPName` and two extra columns:
///     * `N datasets`: number of cohorts the SNP is present in.
///     * `N samples`: presence vector dotted with [`DATASET_SIZES`] in [`DATASET_ORDER`].
pub fn summarise_snps(df_snps: &DataFrame) -> eyre::Result<DataFrame> {
    let snp_id_col = first_column_name(df_snps)?;
    let dataset_cols: Vec<String> = df_snps
        .get_column_names()
        .iter()
        .skip(1)
        .map(|name| name.to_string())
        .collect();
    if let Some(missing) = DATASET_ORDER
        .iter()
        .find(|dataset| !dataset_cols.iter().any(|name| name == *dataset))
    {
        bail!("Dataset {missing:?} missing from SNP matrix columns {dataset_cols:?}.");
    }

    let presence = |name: &str| col(name).cast(DataType::Int64).fill_null(lit(0i64));
    let n_datasets = dataset_cols
        .iter()
        .fold(lit(0i64), |acc, name| acc + presence(name));
    let n_samples = DATASET_ORDER
        .iter()
        .zip(DATASET_SIZES)
        .fold(lit(0i64), |acc, (name, size)| acc + presence(name) * lit(size));

    Ok(df_snps
        .clone()
        .lazy()
        .with_columns([
            n_datasets.alias(N_DATASETS_COL),
            n_samples.alias(N_SAMPLES_COL),
        ])
        .rename([snp_id_col.as_str()], [SNP_COL], true)
        .with_column(col(SNP_COL).cast(DataType::String))
        .collect()?)
}

/// Keep the first row per probe whose SNP is present in `present_snps`.
pub fn top_eqtl_per_probe(
    df_eqtl: &DataFrame,
    present_snps: &HashSet<String>,
) -> eyre::Result<DataFrame> {
    let snps = string_values(df_eqtl, SNP_COL)?;
    let probes = string_values(df_eqtl, PROBE_COL)?;
    let mut found_genes: HashSet<&str> = HashSet::new();
    let mask: BooleanChunked = snps
        .iter()
        .zip(probes.iter())
        .enumerate()
        .map(|(i, (snp, probe))| {
            if i % 1_000_000 == 0 {
                log::debug!("\tprocessed {i} lines");
            }
            let (Some(snp), Some(probe)) = (snp, probe) else {
                return false;
            };
            present_snps.contains(snp) && found_genes.insert(probe.as_str())
        })
        .collect();
    Ok(df_eqtl.filter(&mask)?)
}

/// Left join eQTLs against the summarised SNP table on `SNPName`.
///
/// Every eQTL row is kept in its original order; SNP columns are null where the SNP is absent.
/// An `index` column with the eQTL row position is appended last.
///
/// # Arguments
/// * `df_eqtl`
///     * [`DataFrame`] with renamed columns (see [`rename_eqtl_columns`]).
/// * `df_snps`
///     * Output of [`summarise_snps`].
/// * `top_per_probe`
///     * Prune to one eQTL per probe before joining (see [`top_eqtl_per_probe`]).
pub fn join_eqtl_snps(
    df_eqtl: &DataFrame,
    df_snps: &DataFrame,
    top_per_probe: bool,
) -> eyre::Result<DataFrame> {
    let mut df_eqtl = df_eqtl.clone();
    let n_rows = df_eqtl.height() as i64;
    df_eqtl.with_column(Series::new(INDEX_COL.into(), (0..n_rows).collect::<Vec<i64>>()))?;

    if top_per_probe {
        let present_snps = string_values(df_snps, SNP_COL)?
            .into_iter()
            .flatten()
            .collect();
        df_eqtl = top_eqtl_per_probe(&df_eqtl, &present_snps)?;
        log::info!("Kept {} top eQTLs.", df_eqtl.height());
    }

    let df = df_eqtl
        .lazy()
        .with_column(col(SNP_COL).cast(DataType::String))
        .join(
            df_snps.clone().lazy(),
            [col(SNP_COL)],
            [col(SNP_COL)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;

    // Move index to the end.
    let mut cols: Vec<String> = df
        .get_column_names()
        .iter()
        .filter(|name| name.as_str() != INDEX_COL)
        .map(|name| name.to_string())
        .collect();
    cols.push(INDEX_COL.to_owned());
    Ok(df.select(cols)?)
}

pub fn run(args: &PrepareEqtlArgs, output_root: &Path) -> eyre::Result<()> {
    let outdir = create_outdir(output_root.join("prepare_bios_eqtl_file"))?;
    log::info!("Arguments:");
    log::info!("  > eQTL: {:?}", args.eqtl);
    log::info!("  > SNPs: {:?}", args.snps);
    log::info!("  > Top eQTL per probe: {}", args.top_per_probe);
    log::info!("  > Output directory: {outdir:?}");

    log::info!("Loading data");
    let mut df_eqtl = load_tsv(&args.eqtl, true)?;
    let df_snps = load_tsv(&args.snps, true)?;

    log::info!("Preprocessing data");
    rename_eqtl_columns(&mut df_eqtl)?;
    let df_snps = summarise_snps(&df_snps)?;
    log::debug!("{df_snps}");

    let mut df_top_eqtl = join_eqtl_snps(&df_eqtl, &df_snps, args.top_per_probe)?;
    log::debug!("{df_top_eqtl}");

    log::info!("Saving file.");
    write_tsv(&mut df_top_eqtl, outdir.join(OUTPUT_FNAME), true)?;
    Ok(())
}
