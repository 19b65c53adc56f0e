//! Best-supported bipartition per criterion.
//!
//! # Algorithm
//! For each criterion every split of the tree (each edge seen from both
//! sides) is evaluated. Among accepted splits the winner is:
//!
//! 1. the highest bootstrap,
//! 2. then the lowest relative tolerance used,
//! 3. then the first one found in scan order.
//!
//! The scan is exhaustive and unsorted, so the result only depends on the
//! tie-break rule and the parse order of the edges.

use tracing::debug;

use crate::bipartitions::{Bipartitions, Split};
use crate::config::SearchSettings;
use crate::criteria::Criterion;
use crate::tree::{EdgeId, Side, TaxonId, Tree};

/// The winning split for one criterion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub bootstrap: u32,
    pub relative_used: f64,
    pub absolute_used: usize,
    pub subtree_size: usize,
    pub edge: EdgeId,
    pub side: Side,
}

impl Outcome {
    fn beats(&self, best: &Outcome) -> bool {
        self.bootstrap > best.bootstrap
            || (self.bootstrap == best.bootstrap && self.relative_used < best.relative_used)
    }
}

/// Result of one (file, seed) pair: one optional outcome per criterion, in
/// criterion order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub file: String,
    pub seed: Option<String>,
    /// Number of taxa in the whole tree.
    pub total_taxa: usize,
    pub outcomes: Vec<Option<Outcome>>,
}

/// Runs the criteria of one run over parsed trees.
#[derive(Debug, Clone, Copy)]
pub struct SearchOrchestrator<'c> {
    criteria: &'c [Criterion],
    settings: SearchSettings,
}

impl<'c> SearchOrchestrator<'c> {
    pub fn new(criteria: &'c [Criterion], settings: SearchSettings) -> Self {
        SearchOrchestrator { criteria, settings }
    }

    /// Best split for a single criterion, or `None` if no split qualifies.
    pub fn best_for(
        &self,
        tree: &Tree,
        table: &Bipartitions,
        criterion: &Criterion,
        seed: Option<&str>,
    ) -> Option<Outcome> {
        // A seed absent from the tree can never be satisfied.
        let seed_id: Option<TaxonId> = match seed {
            Some(name) => Some(tree.find_taxon(name)?),
            None => None,
        };

        let mut best: Option<Outcome> = None;
        for split in table.iter() {
            if split.size() < self.settings.min_size {
                continue;
            }
            if seed_id.is_some_and(|id| !split.taxa.contains(id.0)) {
                continue;
            }
            let Some(candidate) = self.score(tree, split, criterion, seed) else {
                continue;
            };
            if best.as_ref().is_none_or(|b| candidate.beats(b)) {
                best = Some(candidate);
            }
        }

        debug!(
            criterion = %criterion.name,
            seed = seed.unwrap_or("-"),
            bootstrap = ?best.map(|b| b.bootstrap),
            "criterion evaluated"
        );
        best
    }

    fn score(&self, tree: &Tree, split: &Split, criterion: &Criterion, seed: Option<&str>) -> Option<Outcome> {
        let names = split.names(tree);
        let eval = criterion.evaluate(&names, &self.settings, seed)?;
        Some(Outcome {
            bootstrap: split.bootstrap,
            relative_used: eval.relative_used,
            absolute_used: eval.absolute_used,
            subtree_size: names.len(),
            edge: split.edge,
            side: split.side,
        })
    }

    /// Best split for every criterion, in criterion order.
    pub fn search(&self, tree: &Tree, table: &Bipartitions, seed: Option<&str>) -> Vec<Option<Outcome>> {
        self.criteria
            .iter()
            .map(|c| self.best_for(tree, table, c, seed))
            .collect()
    }

    pub fn record(&self, file: &str, tree: &Tree, table: &Bipartitions, seed: Option<&str>) -> ResultRecord {
        ResultRecord {
            file: file.to_string(),
            seed: seed.map(str::to_string),
            total_taxa: table.num_taxa(),
            outcomes: self.search(tree, table, seed),
        }
    }
}
