use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use clap::Args;
use eyre::bail;
use itertools::Itertools;
use polars::prelude::*;

use crate::{
    io::{create_outdir, f64_values, first_column_name, load_tsv, string_values},
    plot::{lineplot, palette_color, Line, NA_COLOR, PALETTE},
};

pub const MAX_COMPONENTS: usize = 10;
const INFO_FNAME: &str = "info_df.txt.gz";
const FIRST_ITERATION: &str = "iteration0";
/// Variable whose first iteration is not plotted.
const OVERLAP_VARIABLE: &str = "Overlap %";

#[derive(Debug, Args)]
pub struct OverviewLineplotArgs {
    /// The path to the input directory with one `PIC<n>` folder per component.
    #[arg(short = 'i', long = "indir")]
    pub indir: PathBuf,
}

/// Reshape one component's iteration table into long form.
///
/// # Arguments
/// * `df`
///     * Iteration table. First column is the iteration label, `covariate` holds the covariate name.
/// * `component`
///     * Component name, ex. `PIC1`.
///
/// # Returns
/// * [`DataFrame`] with columns `[index, covariate, component, variable, value, log10 value]`.
///     * `index` is the 1-based row position.
///     * Only numeric measure columns are reshaped.
/// * Covariate of the first iteration, used to annotate the legend.
pub fn melt_iterations(
    df: &DataFrame,
    component: &str,
) -> eyre::Result<(DataFrame, Option<String>)> {
    let label_col = first_column_name(df)?;
    let labels = string_values(df, &label_col)?;
    let covariates = match df.column("covariate") {
        Ok(_) => string_values(df, "covariate")?,
        Err(_) => vec![None; df.height()],
    };
    let first_covariate = labels
        .iter()
        .position(|label| label.as_deref() == Some(FIRST_ITERATION))
        .or((!labels.is_empty()).then_some(0))
        .and_then(|i| covariates[i].clone());

    let (mut index, mut covariate, mut variable, mut value, mut log10_value) =
        (vec![], vec![], vec![], vec![], vec![]);
    for column in df.get_columns() {
        let name = column.name().as_str();
        if name == label_col || name == "covariate" {
            continue;
        }
        if matches!(column.dtype(), DataType::String) {
            log::debug!("Skipping non-numeric column {name:?} for {component}");
            continue;
        }
        for (i, v) in f64_values(df, name)?.into_iter().enumerate() {
            index.push(i as i64 + 1);
            covariate.push(covariates[i].clone());
            variable.push(name.to_owned());
            value.push(v);
            log10_value.push(v.map(f64::log10));
        }
    }

    let df_m = DataFrame::new(vec![
        Column::new("index".into(), index),
        Column::new("covariate".into(), covariate),
        Column::new("component".into(), vec![component; variable.len()]),
        Column::new("variable".into(), variable),
        Column::new("value".into(), value),
        Column::new("log10 value".into(), log10_value),
    ])?;
    Ok((df_m, first_covariate))
}

/// Load `<indir>/PIC<n>/info_df.txt.gz` for every component that has one and concatenate their long forms.
///
/// # Returns
/// * Long-form [`DataFrame`] (see [`melt_iterations`]).
/// * Map of component to the covariate of its first iteration.
pub fn load_components(indir: &Path) -> eyre::Result<(DataFrame, HashMap<String, String>)> {
    let mut info = HashMap::new();
    let mut df_all: Option<DataFrame> = None;
    for i in 1..=MAX_COMPONENTS {
        let component = format!("PIC{i}");
        let fpath = indir.join(&component).join(INFO_FNAME);
        if !fpath.exists() {
            continue;
        }
        let df = load_tsv(&fpath, true)?;
        let (df_m, covariate) = melt_iterations(&df, &component)?;
        if let Some(covariate) = covariate {
            info.insert(component, covariate);
        }
        match df_all.as_mut() {
            Some(df_all) => {
                df_all.vstack_mut(&df_m)?;
            }
            None => df_all = Some(df_m),
        }
    }
    let Some(df_all) = df_all else {
        bail!("No {INFO_FNAME} found for PIC1..PIC{MAX_COMPONENTS} in {indir:?}.");
    };
    Ok((df_all, info))
}

/// Rows of one variable. The first iteration of `Overlap %` is dropped.
pub fn variable_subset(df_m: &DataFrame, variable: &str) -> eyre::Result<DataFrame> {
    let mut lf = df_m
        .clone()
        .lazy()
        .filter(col("variable").eq(lit(variable)));
    if variable == OVERLAP_VARIABLE {
        lf = lf.filter(col("index").neq(lit(1i64)));
    }
    Ok(lf.collect()?)
}

/// Output file stem for a variable, ex. `Overlap %` becomes `overlap_%`.
pub fn plot_filename(variable: &str) -> String {
    variable.replace(' ', "_").to_lowercase()
}

/// One [`Line`] per component, in palette order. Components without a palette color come last.
fn component_lines(
    df_subset: &DataFrame,
    y: &str,
    info: &HashMap<String, String>,
) -> eyre::Result<Vec<Line>> {
    let mut points: HashMap<String, Vec<(f64, f64)>> = HashMap::new();
    for df_grp in df_subset.partition_by_stable(["component"], true)? {
        let Some(Some(component)) = string_values(&df_grp, "component")?.into_iter().next()
        else {
            continue;
        };
        let pts = f64_values(&df_grp, "index")?
            .into_iter()
            .zip(f64_values(&df_grp, y)?)
            .filter_map(|(x, y)| Some((x?, y?)))
            .filter(|(_, y)| y.is_finite())
            .sorted_by(|a, b| a.0.total_cmp(&b.0))
            .collect();
        points.insert(component, pts);
    }

    let label = |component: &str| match info.get(component) {
        Some(covariate) => format!("{component} [{covariate}]"),
        None => component.to_owned(),
    };
    let mut lines: Vec<Line> = PALETTE
        .iter()
        .filter_map(|(key, color)| {
            let pts = points.remove(*key)?;
            Some(Line {
                label: label(key),
                color: *color,
                points: pts,
            })
        })
        .collect();
    lines.extend(
        points
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .map(|(component, pts)| Line {
                label: label(&component),
                color: palette_color(&component).unwrap_or(NA_COLOR),
                points: pts,
            }),
    );
    Ok(lines)
}

pub fn run(args: &OverviewLineplotArgs, output_root: &Path) -> eyre::Result<()> {
    let outdir = create_outdir(output_root.join("plot"))?;
    log::info!("Arguments:");
    log::info!("  > Input directory: {:?}", args.indir);
    log::info!("  > Outpath {outdir:?}");

    log::info!("Loading data");
    let (df_m, info) = load_components(&args.indir)?;

    log::info!("Plotting");
    let variables: Vec<String> = string_values(&df_m, "variable")?
        .into_iter()
        .flatten()
        .unique()
        .collect();
    for variable in variables {
        log::info!("\t{variable}");
        let df_subset = variable_subset(&df_m, &variable)?;
        let filename = plot_filename(&variable);

        let lines = component_lines(&df_subset, "value", &info)?;
        lineplot(
            &lines,
            "",
            "iteration",
            &variable,
            &outdir.join(format!("{filename}.png")),
        )?;

        if variable.contains("Likelihood") {
            let lines = component_lines(&df_subset, "log10 value", &info)?;
            lineplot(
                &lines,
                "",
                "iteration",
                &format!("log10 {variable}"),
                &outdir.join(format!("log10_{filename}.png")),
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::write_tsv;

    fn info_df(covariate: &str) -> DataFrame {
        DataFrame::new(vec![
            Column::new("-".into(), ["iteration0", "iteration1", "iteration2"]),
            Column::new("covariate".into(), [covariate, covariate, covariate]),
            Column::new("N".into(), [100i64, 120, 125]),
            Column::new("Overlap %".into(), [0.0, 80.0, 95.5]),
            Column::new("Sum Abs Normalized Delta Log Likelihood".into(), [1.0, 10.0, 100.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_melt() {
        let (df_m, covariate) = melt_iterations(&info_df("Neuron"), "PIC1").unwrap();
        assert_eq!(covariate.as_deref(), Some("Neuron"));
        // Three numeric variables x three iterations.
        assert_eq!(df_m.height(), 9);
        assert_eq!(
            f64_values(&df_m, "index").unwrap()[..3],
            [Some(1.0), Some(2.0), Some(3.0)]
        );
        let likelihood = variable_subset(&df_m, "Sum Abs Normalized Delta Log Likelihood").unwrap();
        assert_eq!(
            f64_values(&likelihood, "log10 value").unwrap(),
            vec![Some(0.0), Some(1.0), Some(2.0)]
        );
    }

    #[test]
    fn test_overlap_drops_first_iteration() {
        let (df_m, _) = melt_iterations(&info_df("Neuron"), "PIC1").unwrap();
        let df = variable_subset(&df_m, OVERLAP_VARIABLE).unwrap();
        assert_eq!(
            f64_values(&df, "index").unwrap(),
            vec![Some(2.0), Some(3.0)]
        );
        let df = variable_subset(&df_m, "N").unwrap();
        assert_eq!(df.height(), 3);
    }

    #[test]
    fn test_plot_filename() {
        assert_eq!(plot_filename("Overlap %"), "overlap_%");
        assert_eq!(plot_filename("N Overlap"), "n_overlap");
    }

    #[test]
    fn test_load_components_and_lines() {
        let tmp = tempfile::tempdir().unwrap();
        for (component, covariate) in [("PIC1", "Neuron"), ("PIC3", "Astrocyte")] {
            let dir = tmp.path().join(component);
            std::fs::create_dir_all(&dir).unwrap();
            write_tsv(&mut info_df(covariate), dir.join(INFO_FNAME), true).unwrap();
        }
        let (df_m, info) = load_components(tmp.path()).unwrap();
        assert_eq!(df_m.height(), 18);
        assert_eq!(info.get("PIC3").map(|s| s.as_str()), Some("Astrocyte"));

        let df_subset = variable_subset(&df_m, "N").unwrap();
        let lines = component_lines(&df_subset, "value", &info).unwrap();
        let labels: Vec<&str> = lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, ["PIC1 [Neuron]", "PIC3 [Astrocyte]"]);
        assert_eq!(lines[1].points, vec![(1.0, 100.0), (2.0, 120.0), (3.0, 125.0)]);
    }

    #[test]
    fn test_no_components_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_components(tmp.path()).is_err());
    }

    #[test]
    fn test_run_writes_plots() {
        let tmp = tempfile::tempdir().unwrap();
        let indir = tmp.path().join("input");
        for (component, covariate) in [("PIC1", "Neuron"), ("PIC2", "Astrocyte")] {
            let dir = indir.join(component);
            std::fs::create_dir_all(&dir).unwrap();
            write_tsv(&mut info_df(covariate), dir.join(INFO_FNAME), true).unwrap();
        }
        let output_root = tmp.path().join("out");
        run(&OverviewLineplotArgs { indir }, &output_root).unwrap();

        for file in [
            "n.png",
            "overlap_%.png",
            "sum_abs_normalized_delta_log_likelihood.png",
            "log10_sum_abs_normalized_delta_log_likelihood.png",
        ] {
            let path = output_root.join("plot").join(file);
            assert!(std::fs::metadata(&path).unwrap().len() > 0, "{file} missing");
        }
        assert!(!output_root.join("plot").join("log10_n.png").exists());
    }
}
