use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, BufWriter, Cursor, Read, Write},
    path::{Path, PathBuf},
};

use eyre::{bail, Context};
use flate2::{read::MultiGzDecoder, write::GzEncoder, Compression};
use polars::prelude::*;

/// Tokens read as missing values, on top of empty fields.
const NULL_VALUES: [&str; 3] = ["NA", "NaN", "nan"];

fn is_gzipped(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Create `path` and any missing parents. Returns the path for convenience.
pub fn create_outdir(path: impl AsRef<Path>) -> eyre::Result<PathBuf> {
    let path = path.as_ref();
    std::fs::create_dir_all(path)
        .wrap_err_with(|| format!("Failed to create output directory {path:?}"))?;
    Ok(path.to_owned())
}

/// Write a [`DataFrame`] as TSV. Output is gzip-compressed if `path` ends with `.gz`.
///
/// # Arguments
/// * `df`
///     * [`DataFrame`] to write.
/// * `path`
///     * Output path.
/// * `header`
///     * Write column names as the first line.
pub fn write_tsv(df: &mut DataFrame, path: impl AsRef<Path>, header: bool) -> eyre::Result<()> {
    let path = path.as_ref();
    let file =
        File::create(path).wrap_err_with(|| format!("Failed to create output file {path:?}"))?;
    let mut writer = BufWriter::new(file);
    if is_gzipped(path) {
        // Default gzip header carries no mtime so reruns are byte-identical.
        let mut encoder = GzEncoder::new(&mut writer, Compression::default());
        CsvWriter::new(&mut encoder)
            .include_header(header)
            .with_separator(b'\t')
            .finish(df)?;
        encoder.finish()?;
    } else {
        CsvWriter::new(&mut writer)
            .include_header(header)
            .with_separator(b'\t')
            .finish(df)?;
    }
    writer.flush()?;
    log::info!(
        "\tSaved dataframe: {} with shape: {:?}",
        file_name(path),
        df.shape()
    );
    Ok(())
}

/// Load a TSV file, transparently decompressing it if `path` ends with `.gz`.
///
/// Without a header, columns are named `column_1`, `column_2`, ...
pub fn load_tsv(path: impl AsRef<Path>, header: bool) -> eyre::Result<DataFrame> {
    let path = path.as_ref();
    let file = File::open(path).wrap_err_with(|| format!("Failed to open {path:?}"))?;
    let mut bytes = Vec::new();
    if is_gzipped(path) {
        MultiGzDecoder::new(BufReader::new(file))
            .read_to_end(&mut bytes)
            .wrap_err_with(|| format!("Failed to decompress {path:?}"))?;
    } else {
        BufReader::new(file).read_to_end(&mut bytes)?;
    }

    let null_values = NULL_VALUES.iter().map(|v| (*v).into()).collect();
    let df = CsvReadOptions::default()
        .with_has_header(header)
        .with_infer_schema_length(None)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(b'\t')
                .with_null_values(Some(NullValues::AllColumns(null_values))),
        )
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .wrap_err_with(|| format!("Failed to parse {path:?}"))?;

    log::info!(
        "\tLoaded dataframe: {} with shape: {:?}",
        file_name(path),
        df.shape()
    );
    Ok(df)
}

fn column_by_name_or_bail<'a>(df: &'a DataFrame, name: &str) -> eyre::Result<&'a Column> {
    let Ok(column) = df.column(name) else {
        bail!(
            "Missing column {name:?}. Available columns: {:?}",
            df.get_column_names()
        );
    };
    Ok(column)
}

/// Values of a column as strings, whatever its inferred type.
pub fn string_values(df: &DataFrame, name: &str) -> eyre::Result<Vec<Option<String>>> {
    let column = column_by_name_or_bail(df, name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(|v| v.to_owned()))
        .collect())
}

/// Values of a column as floats. Values that cannot be cast are null.
pub fn f64_values(df: &DataFrame, name: &str) -> eyre::Result<Vec<Option<f64>>> {
    let column = column_by_name_or_bail(df, name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Set of non-null values of a column.
pub fn string_set(df: &DataFrame, name: &str) -> eyre::Result<HashSet<String>> {
    Ok(string_values(df, name)?.into_iter().flatten().collect())
}

/// Name of the first column, used as the row label of index-like tables.
pub fn first_column_name(df: &DataFrame) -> eyre::Result<String> {
    let Some(name) = df.get_column_names().first().map(|name| name.to_string()) else {
        bail!("Table has no columns.");
    };
    Ok(name)
}

/// Build a [`DataFrame`] from a row label column and a set of named float columns.
pub fn labelled_frame(
    index_name: &str,
    labels: &[String],
    columns: &[(String, Vec<f64>)],
) -> eyre::Result<DataFrame> {
    let mut cols = Vec::with_capacity(columns.len() + 1);
    cols.push(Column::new(index_name.into(), labels));
    for (name, values) in columns {
        cols.push(Column::new(name.as_str().into(), values));
    }
    Ok(DataFrame::new(cols)?)
}
