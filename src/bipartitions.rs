//! Every bipartition of one tree, computed once.
//!
//! # Overview
//! The search scans each edge from both sides for every criterion. Walking the
//! graph again for each criterion repeats the same work, so the sides are
//! extracted once per tree and kept as [`Bitset`]s over taxon indices.
//!
//! Only the distal side is walked. The anchor side is its complement: each
//! taxon lies on exactly one side of any edge.
//!
//! # Scan order
//! Splits are stored edge by edge in parse discovery order, anchor side first.
//! The search relies on this order for its first-found tie-break.

use crate::bitset::Bitset;
use crate::tree::{EdgeId, GraphError, Side, TaxonId, Tree};

/// One side of one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub edge: EdgeId,
    pub side: Side,
    pub bootstrap: u32,
    pub taxa: Bitset,
}

impl Split {
    pub fn size(&self) -> usize {
        self.taxa.count_ones()
    }

    /// Taxon names on this side, in taxon-index order.
    pub fn names<'t>(&self, tree: &'t Tree) -> Vec<&'t str> {
        self.taxa
            .iter_ones()
            .map(|i| tree.taxon(TaxonId(i)).name.as_str())
            .collect()
    }
}

/// Immutable table of all splits of a tree.
#[derive(Debug, Clone)]
pub struct Bipartitions {
    splits: Vec<Split>,
    num_taxa: usize,
}

impl Bipartitions {
    /// Extract both sides of every edge.
    ///
    /// # Errors
    /// Propagates a [`GraphError`] from the edge walk; that means the tree
    /// itself is corrupt.
    pub fn from_tree(tree: &Tree) -> Result<Self, GraphError> {
        let num_taxa = tree.num_taxa();
        let mut splits = Vec::with_capacity(tree.edges().len() * 2);

        for edge in tree.edge_ids() {
            let mut distal = Bitset::with_capacity(num_taxa);
            for taxon in tree.subtree_taxa(edge, Side::Distal)? {
                distal.set(taxon.0);
            }
            let anchor = distal.complement(num_taxa);
            let bootstrap = tree.edge(edge).bootstrap;

            splits.push(Split {
                edge,
                side: Side::Anchor,
                bootstrap,
                taxa: anchor,
            });
            splits.push(Split {
                edge,
                side: Side::Distal,
                bootstrap,
                taxa: distal,
            });
        }

        Ok(Bipartitions { splits, num_taxa })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Split> + '_ {
        self.splits.iter()
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn num_taxa(&self) -> usize {
        self.num_taxa
    }
}
