use std::path::PathBuf;

use clap::{Parser, Subcommand};
use simple_logger::SimpleLogger;

mod filter_gte;
mod io;
mod overview_lineplot;
mod pca;
mod plot;
mod prepare_eqtl;
mod preprocess_expression;
mod stats;
mod visualiser;

use filter_gte::FilterGteArgs;
use overview_lineplot::OverviewLineplotArgs;
use prepare_eqtl::PrepareEqtlArgs;
use preprocess_expression::PreprocessExpressionArgs;
use visualiser::PlotIeqtlArgs;

/// Data preparation and plotting tools for the PICALO eQTL pipeline.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Directory under which each tool creates its output folder.
    #[arg(long, global = true, default_value = ".")]
    output_root: PathBuf,

    /// Log debug messages.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Remove excluded RNA-seq samples from a GTE file.
    FilterGte(FilterGteArgs),
    /// Annotate replication eQTLs with per-SNP dataset and sample counts.
    PrepareEqtl(PrepareEqtlArgs),
    /// Plot per-iteration statistics of every component.
    OverviewLineplot(OverviewLineplotArgs),
    /// Plot an interaction eQTL at its start and optimized covariate.
    PlotIeqtl(PlotIeqtlArgs),
    /// Normalize an expression matrix and regress out technical covariates.
    PreprocessExpression(PreprocessExpressionArgs),
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).env().init()?;

    match &cli.command {
        Commands::FilterGte(args) => filter_gte::run(args, &cli.output_root),
        Commands::PrepareEqtl(args) => prepare_eqtl::run(args, &cli.output_root),
        Commands::OverviewLineplot(args) => overview_lineplot::run(args, &cli.output_root),
        Commands::PlotIeqtl(args) => visualiser::run(args),
        Commands::PreprocessExpression(args) => {
            preprocess_expression::run(args, &cli.output_root)
        }
    }
}
