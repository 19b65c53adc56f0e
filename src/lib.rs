//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `pattern`: `*`-wildcard taxon name patterns.
//! - `tree`: arena graph of an unrooted bifurcating tree (taxa, nodes, edges).
//! - `newick`: bootstrap-annotated Newick parsing into a `Tree`.
//! - `bitset`: compact bitset representation for taxon sets.
//! - `bipartitions`: every edge of a tree as two taxon bitsets.
//! - `criteria`: named composition rules and their evaluation.
//! - `config`: validated run settings (tolerance, minimum size, seeds).
//! - `search`: best-supported bipartition per criterion.
//! - `io`: tree file discovery, reading and CSV output.
//! - `batch`: the per-file pipeline run in parallel over many files.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod pattern;
pub mod tree;
pub mod newick;
pub mod bitset;
pub mod bipartitions;
pub mod criteria;
pub mod config;
pub mod search;
pub mod io;
pub mod batch;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use batch::{run_batch, BatchReport};
pub use bipartitions::Bipartitions;
pub use bitset::Bitset;
pub use config::RunConfig;
pub use criteria::{compile_criteria, Criterion};
pub use io::ResultWriter;
pub use newick::parse_newick;
pub use search::{ResultRecord, SearchOrchestrator};
pub use tree::Tree;
