use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use tree_sorter::batch::{run_batch, write_report};
use tree_sorter::config::RunConfig;
use tree_sorter::criteria::compile_criteria;
use tree_sorter::io::{
    list_tree_directory, missing_sources, parse_list_file, InputError, TreeSource, DEFAULT_OUTPUT,
};

/// For every tree file, find the best-supported bipartition satisfying each
/// named criterion and write one CSV row per (file, seed taxon).
///
/// Criteria look like `NAME=0.5+(Homo*,Pan*),2+Mus*,Rattus_rattus`.
#[derive(Parser, Debug)]
#[command(name = "tree-sorter", version, about = "Best bootstrap support per taxon criterion")]
#[command(group(ArgGroup::new("input").required(true).args(["directory", "list", "files"])))]
#[command(group(ArgGroup::new("seed").required(true).args(["seed_taxon", "no_seed"])))]
struct Args {
    /// Directory with tree files (.tre .tree .nex .nxs .treefile, optionally .gz)
    #[arg(short = 'd', long = "directory")]
    directory: Option<PathBuf>,

    /// CSV list of tree files, one `path[,seed]` per line
    #[arg(short = 'l', long = "list")]
    list: Option<PathBuf>,

    /// Explicit tree files
    #[arg(short = 'f', long = "files", num_args = 1..)]
    files: Vec<PathBuf>,

    /// Seed taxon pattern (`*` wildcards), given as `-s=PATTERN`; a bare `-s`
    /// takes the seed from the list file or the file name
    #[arg(
        short = 's',
        long = "seed-taxon",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    seed_taxon: Option<String>,

    /// Search without a seed taxon (requires --min-taxons)
    #[arg(short = 'n', long = "no-seed", default_value_t = false)]
    no_seed: bool,

    /// Minimum number of taxa in an accepted subtree [default: 2 with a seed]
    #[arg(short = 'm', long = "min-taxons")]
    min_taxons: Option<usize>,

    /// Off-target tolerance: below 1 a fraction of the subtree, else a taxon count
    #[arg(short = 't', long = "tolerance", default_value_t = 0.0)]
    tolerance: f64,

    /// Output CSV (gzip-compressed when ending in .gz)
    #[arg(short = 'o', long = "output", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Verbose mode: per-criterion outcomes
    #[arg(short = 'v', long = "verbose", default_value_t = false, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode: only warnings and errors
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,

    /// Criteria as NAME=DEFINITION
    #[arg(required = true, num_args = 1..)]
    criteria: Vec<String>,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn collect_sources(args: &Args) -> Result<Vec<TreeSource>, InputError> {
    if let Some(dir) = &args.directory {
        list_tree_directory(dir)
    } else if let Some(list) = &args.list {
        parse_list_file(list)
    } else {
        Ok(args.files.iter().map(TreeSource::from_path).collect())
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let seed_pattern = if args.no_seed { None } else { args.seed_taxon.as_deref() };
    let config = match RunConfig::new(args.tolerance, args.min_taxons, seed_pattern) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            process::exit(2);
        }
    };
    let criteria = match compile_criteria(&args.criteria) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            process::exit(2);
        }
    };

    let sources = match collect_sources(&args) {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            process::exit(3);
        }
    };
    let missing = missing_sources(&sources);
    if !missing.is_empty() {
        for path in &missing {
            error!("tree file not found: {}", path.display());
        }
        error!("{}", InputError::MissingFiles(missing.len()));
        process::exit(3);
    }
    if sources.is_empty() {
        error!("no tree files to analyse");
        process::exit(3);
    }
    info!("Analysing {} tree file(s) against {} criteria", sources.len(), criteria.len());

    let t0 = Instant::now();
    let report = match run_batch(&sources, &config, &criteria) {
        Ok(r) => r,
        Err(e) => {
            error!("{e}");
            process::exit(5);
        }
    };
    let search_s = t0.elapsed().as_secs_f64();
    info!("Searched {} tree file(s) in {search_s:.3}s", sources.len() - report.skipped.len());

    let t1 = Instant::now();
    if let Err(e) = write_report(&args.output, &criteria, &report.records) {
        error!("{e}");
        process::exit(4);
    }
    let write_s = t1.elapsed().as_secs_f64();
    info!("Wrote {} row(s) to {:?} in {write_s:.3}s", report.records.len(), args.output);

    if !report.skipped.is_empty() {
        warn!("{} file(s) skipped", report.skipped.len());
    }
}
