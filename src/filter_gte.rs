use std::path::{Path, PathBuf};

use clap::Args;
use polars::prelude::*;

use crate::io::{create_outdir, load_tsv, string_set, string_values, write_tsv};

#[derive(Debug, Args)]
pub struct FilterGteArgs {
    /// The path to the genotype-to-expression link matrix.
    #[arg(short = 'g', long = "gte")]
    pub gte: PathBuf,

    /// The path to the samples to remove in GTE format.
    #[arg(short = 'e', long = "exclude")]
    pub exclude: PathBuf,

    /// Name of the output directory.
    #[arg(short = 'o', long = "outdir")]
    pub outdir: String,
}

/// Remove every GTE row whose `rnaseq_id` is in the exclusion table.
///
/// # Arguments
/// * `df_gte`
///     * [`DataFrame`] with at least the columns `[rnaseq_id, genotype_id, dataset]`.
/// * `df_exclude`
///     * [`DataFrame`] with at least the column `rnaseq_id`.
///
/// # Returns
/// * Filtered [`DataFrame`] with all columns and the original row order.
pub fn filter_gte(df_gte: &DataFrame, df_exclude: &DataFrame) -> eyre::Result<DataFrame> {
    let remove_rnaseq_ids = string_set(df_exclude, "rnaseq_id")?;
    let mask: BooleanChunked = string_values(df_gte, "rnaseq_id")?
        .iter()
        .map(|id| {
            id.as_ref()
                .map_or(true, |id| !remove_rnaseq_ids.contains(id))
        })
        .collect();
    log::info!(
        "Removing {} of {} samples.",
        mask.len() - mask.sum().unwrap_or(0) as usize,
        mask.len()
    );
    Ok(df_gte.filter(&mask)?)
}

/// Sample-to-dataset map with columns `[sample, dataset]`.
pub fn sample_to_dataset(df_gte: &DataFrame) -> eyre::Result<DataFrame> {
    let mut df = df_gte.select(["rnaseq_id", "dataset"])?;
    df.set_column_names(["sample", "dataset"])?;
    Ok(df)
}

/// Family-to-genotype map with columns `[family_id, genotype_id]`. Family id is always 0.
pub fn family_to_genotype(df_gte: &DataFrame) -> eyre::Result<DataFrame> {
    let genotype_ids = df_gte.column("genotype_id")?.clone();
    Ok(DataFrame::new(vec![
        Column::new("family_id".into(), vec![0i64; df_gte.height()]),
        genotype_ids,
    ])?)
}

pub fn run(args: &FilterGteArgs, output_root: &Path) -> eyre::Result<()> {
    let outdir = create_outdir(output_root.join("filter_gte_file").join(&args.outdir))?;
    log::info!("Arguments:");
    log::info!("  > GTE path: {:?}", args.gte);
    log::info!("  > Exclude GTE path: {:?}", args.exclude);
    log::info!("  > Output directory: {outdir:?}");

    log::info!("Loading data.");
    let df_gte = load_tsv(&args.gte, true)?;
    let df_exclude = load_tsv(&args.exclude, true)?;
    if df_exclude.column("dataset").is_ok() {
        let counts = df_exclude
            .clone()
            .lazy()
            .group_by([col("dataset")])
            .agg([col("dataset").len().alias("count")])
            .sort(
                ["count"],
                SortMultipleOptions::default().with_order_descending(true),
            )
            .collect()?;
        log::info!("Excluded samples per dataset:\n{counts}");
    }

    log::info!("Removing samples.");
    let mut df_subset = filter_gte(&df_gte, &df_exclude)?;
    drop(df_gte);

    log::info!("Saving files.");
    write_tsv(
        &mut sample_to_dataset(&df_subset)?,
        outdir.join("SampleToDataset.txt.gz"),
        true,
    )?;
    // No header. Used for MDS analyses.
    write_tsv(
        &mut family_to_genotype(&df_subset)?,
        outdir.join("FamilyToGenotype.txt"),
        false,
    )?;
    write_tsv(
        &mut df_subset,
        outdir.join("GenotypeToExpression.txt.gz"),
        true,
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn column_names(df: &DataFrame) -> Vec<&str> {
        df.get_column_names().iter().map(|name| name.as_str()).collect()
    }

    fn gte() -> DataFrame {
        DataFrame::new(vec![
            Column::new("genotype_id".into(), ["g1", "g2", "g3", "g4"]),
            Column::new("rnaseq_id".into(), ["r1", "r2", "r3", "r4"]),
            Column::new("dataset".into(), ["LL", "RS", "LL", "PAN"]),
        ])
        .unwrap()
    }

    fn exclude() -> DataFrame {
        DataFrame::new(vec![
            Column::new("rnaseq_id".into(), ["r2", "r4", "r9"]),
            Column::new("dataset".into(), ["RS", "PAN", "LL"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_filter_keeps_iff_not_excluded() {
        let df = filter_gte(&gte(), &exclude()).unwrap();
        assert_eq!(
            string_values(&df, "rnaseq_id").unwrap(),
            vec![Some("r1".to_owned()), Some("r3".to_owned())]
        );
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn test_derived_tables() {
        let df = filter_gte(&gte(), &exclude()).unwrap();
        let std_df = sample_to_dataset(&df).unwrap();
        assert_eq!(column_names(&std_df), ["sample", "dataset"]);
        let fam_df = family_to_genotype(&df).unwrap();
        assert_eq!(column_names(&fam_df), ["family_id", "genotype_id"]);
        assert_eq!(
            string_values(&fam_df, "family_id").unwrap(),
            vec![Some("0".to_owned()), Some("0".to_owned())]
        );
    }

    #[test]
    fn test_run_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let gte_path = tmp.path().join("gte.txt.gz");
        let exclude_path = tmp.path().join("exclude.txt");
        write_tsv(&mut gte(), &gte_path, true).unwrap();
        write_tsv(&mut exclude(), &exclude_path, true).unwrap();

        let args = FilterGteArgs {
            gte: gte_path,
            exclude: exclude_path,
            outdir: "run".to_owned(),
        };
        let outdir = tmp.path().join("filter_gte_file").join("run");
        let read_outputs = || {
            ["GenotypeToExpression.txt.gz", "SampleToDataset.txt.gz", "FamilyToGenotype.txt"]
                .map(|name| std::fs::read(outdir.join(name)).unwrap())
        };

        run(&args, tmp.path()).unwrap();
        let first = read_outputs();
        run(&args, tmp.path()).unwrap();
        assert_eq!(first, read_outputs());

        assert_eq!(
            std::fs::read_to_string(outdir.join("FamilyToGenotype.txt")).unwrap(),
            "0\tg1\n0\tg3\n"
        );
    }
}
