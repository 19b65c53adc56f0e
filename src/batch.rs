//! Per-file pipeline and the parallel batch over many files.
//!
//! A file that cannot be read or parsed is skipped and reported; the rest of
//! the batch carries on. A broken graph invariant aborts the whole batch,
//! since it means every result may be wrong.

use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::bipartitions::Bipartitions;
use crate::config::{RunConfig, SeedSelection};
use crate::criteria::Criterion;
use crate::io::{read_tree_file, InputError, ResultWriter, TreeSource};
use crate::newick::{parse_newick, ParseError};
use crate::search::{ResultRecord, SearchOrchestrator};
use crate::tree::{GraphError, Tree};

/// Why a single file produced no records.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("cannot parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("tree from {path:?} violates graph invariants: {source}")]
    Invariant {
        path: PathBuf,
        #[source]
        source: GraphError,
    },
}

impl FileError {
    /// Invariant violations stop the run; everything else skips the file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FileError::Invariant { .. })
    }
}

/// Errors that end the whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Invariant(FileError),
    #[error("failed to write output {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Records of all evaluated files plus the files that were skipped.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<ResultRecord>,
    pub skipped: Vec<(PathBuf, FileError)>,
}

/// Seeds to try for one tree under the configured selection mode.
pub fn seeds_for<'t>(tree: &'t Tree, source: &'t TreeSource, selection: &SeedSelection) -> Vec<Option<&'t str>> {
    match selection {
        SeedSelection::Matching(pattern) => tree
            .taxon_names()
            .filter(|name| pattern.matches(name))
            .map(Some)
            .collect(),
        SeedSelection::FromSource => vec![source.seed.as_deref()],
        SeedSelection::Unconstrained => vec![None],
    }
}

/// Parse one tree text and search it for every seed.
pub fn process_tree(
    text: &str,
    source: &TreeSource,
    config: &RunConfig,
    search: &SearchOrchestrator<'_>,
) -> Result<Vec<ResultRecord>, FileError> {
    let path = &source.path;
    let tree = parse_newick(text).map_err(|e| match e {
        ParseError::Graph(source) => FileError::Invariant {
            path: path.clone(),
            source,
        },
        source => FileError::Parse {
            path: path.clone(),
            source,
        },
    })?;
    let table = Bipartitions::from_tree(&tree).map_err(|source| FileError::Invariant {
        path: path.clone(),
        source,
    })?;

    let seeds = seeds_for(&tree, source, &config.seed);
    if let (true, SeedSelection::Matching(pattern)) = (seeds.is_empty(), &config.seed) {
        warn!(file = %path.display(), %pattern, "seed pattern matches no taxon; no rows written");
    }

    let file_name = source.file_name();
    Ok(seeds
        .into_iter()
        .map(|seed| search.record(&file_name, &tree, &table, seed))
        .collect())
}

/// Read, parse and search one file.
pub fn process_file(
    source: &TreeSource,
    config: &RunConfig,
    search: &SearchOrchestrator<'_>,
) -> Result<Vec<ResultRecord>, FileError> {
    let text = read_tree_file(&source.path)?;
    process_tree(&text, source, config, search)
}

/// Evaluate all sources in parallel, keeping input order in the report.
///
/// # Errors
/// [`RunError::Invariant`] as soon as any file breaks a graph invariant.
pub fn run_batch(
    sources: &[TreeSource],
    config: &RunConfig,
    criteria: &[Criterion],
) -> Result<BatchReport, RunError> {
    let search = SearchOrchestrator::new(criteria, *config.search_settings());

    let results: Vec<Result<Vec<ResultRecord>, FileError>> = sources
        .par_iter()
        .map(|source| process_file(source, config, &search))
        .collect();

    let mut report = BatchReport::default();
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(records) => report.records.extend(records),
            Err(e) if e.is_fatal() => return Err(RunError::Invariant(e)),
            Err(e) => {
                warn!("skipping {}: {e}", source.path.display());
                report.skipped.push((source.path.clone(), e));
            }
        }
    }
    Ok(report)
}

/// Write the CSV for `records` to `path`, one column triple per criterion.
pub fn write_report(path: &Path, criteria: &[Criterion], records: &[ResultRecord]) -> Result<(), RunError> {
    let output_error = |source: io::Error| RunError::Output {
        path: path.to_path_buf(),
        source,
    };
    let names: Vec<String> = criteria.iter().map(|c| c.name.clone()).collect();
    let mut writer = ResultWriter::create(path, &names).map_err(output_error)?;
    for record in records {
        writer.write_record(record).map_err(output_error)?;
    }
    writer.finish().map_err(output_error)
}
