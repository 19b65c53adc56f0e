//! Python binding layer for the bootstrap criteria search.
//!
//! Provides a Python function that evaluates tree files against named
//! criteria and returns the result table.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::batch::run_batch;
use crate::config::{ConfigError, RunConfig};
use crate::criteria::compile_criteria;
use crate::io::{header_row_fields, missing_sources, record_row_fields, TreeSource};

/// Find the best-supported bipartition per criterion in each tree file.
///
/// Args:
///     paths: List of tree file paths (Newick or NEXUS, optionally gzipped)
///     criteria: List of `NAME=DEFINITION` strings
///     tolerance: Off-target tolerance, a fraction below 1 or a taxon count (default: 0)
///     min_taxons: Minimum accepted subtree size (default: 2)
///     seed_taxon: Seed taxon pattern; None derives the seed from each file name (default: None)
///     no_seed: Search without any seed taxon (default: False)
///
/// Returns:
///     A tuple of (header, rows) where:
///     - header is the list of column names
///     - rows is a list of rows, one per (file, seed taxon), as strings
///
/// Raises:
///     ValueError: On invalid settings or criteria, missing files, or a tree
///     that breaks the graph invariants. Unparseable files are skipped.
#[pyfunction]
#[pyo3(signature = (paths, criteria, tolerance=0.0, min_taxons=2, seed_taxon=None, no_seed=false))]
fn best_bootstraps(
    paths: Vec<String>,
    criteria: Vec<String>,
    tolerance: f64,
    min_taxons: usize,
    seed_taxon: Option<String>,
    no_seed: bool,
) -> PyResult<(Vec<String>, Vec<Vec<String>>)> {
    if criteria.is_empty() {
        return Err(PyValueError::new_err(ConfigError::NoCriteria.to_string()));
    }
    let seed_pattern = match (no_seed, seed_taxon.as_deref()) {
        (true, _) => None,
        (false, pattern) => Some(pattern.unwrap_or("")),
    };
    let config = RunConfig::new(tolerance, Some(min_taxons), seed_pattern)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    let criteria = compile_criteria(&criteria).map_err(|e| PyValueError::new_err(e.to_string()))?;

    let sources: Vec<TreeSource> = paths.iter().map(TreeSource::from_path).collect();
    let missing = missing_sources(&sources);
    if !missing.is_empty() {
        return Err(PyValueError::new_err(format!(
            "Tree file(s) not found: {:?}",
            missing
        )));
    }

    let report = run_batch(&sources, &config, &criteria).map_err(|e| PyValueError::new_err(e.to_string()))?;

    let names: Vec<String> = criteria.iter().map(|c| c.name.clone()).collect();
    let rows = report.records.iter().map(record_row_fields).collect();
    Ok((header_row_fields(&names), rows))
}

/// Python module definition
#[pymodule]
fn tree_sorter(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(best_bootstraps, m)?)?;
    Ok(())
}
