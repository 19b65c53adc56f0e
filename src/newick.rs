//! Parse bootstrap-annotated Newick strings into a [`Tree`].
//!
//! # Accepted input
//! The text has already been unwrapped from any container format, so it is a
//! single tree anchored on its first taxon:
//!
//! ```text
//! (A:0.1,(B:0.2,C:0.3)90:0.05,D:0.4);
//!  ^ anchor   ^^^^^^^^^^^^^^ ^^ bootstrap of the edge above (B,C)
//! ```
//!
//! Branch lengths are removed first. After that a recursive descent walks the
//! text by index: every call builds one [`Node`](crate::tree::Node) from a
//! `X,Y` segment whose children are either leaf names or bracketed subtrees
//! followed by an optional integer bootstrap (default 1).
//!
//! A rooted form `(A,(X,Y)95);` is also accepted. The single subtree is
//! unwrapped and its trailing bootstrap dropped, since that value annotates
//! the anchor's own leaf branch and does not describe a bipartition.

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use std::str::FromStr;
use thiserror::Error;

use crate::tree::{GraphError, NeighborRef, NodeId, Tree, TreeBuilder};

/// Bootstrap for edges whose text carries none. Such branches usually join
/// identical sequences and carry no information.
pub const DEFAULT_BOOTSTRAP: u32 = 1;

/// Deepest bracket nesting accepted. The descent recurses once per level, so
/// deeper trees are rejected instead of exhausting a worker thread's stack.
pub const MAX_NESTING: usize = 1000;

lazy_static! {
    static ref BRANCH_LENGTH_RE: Regex =
        Regex::new(r":[0-9]+(?:\.[0-9]*)?(?:[eE][-+]?[0-9]+)?").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("tree text must have the form '(<taxon>,<subtree>);'")]
    MissingEnvelope,
    #[error("anchor taxon missing before the first ','")]
    MissingAnchor,
    #[error("unbalanced bracket at byte {offset}")]
    Unbalanced { offset: usize },
    #[error("empty subtree at byte {offset}")]
    EmptySubtree { offset: usize },
    #[error("expected a second child before byte {offset}")]
    MissingSibling { offset: usize },
    #[error("more than two children at byte {offset}; only bifurcating trees are supported")]
    Multifurcation { offset: usize },
    #[error("malformed bootstrap '{token}' at byte {offset}")]
    MalformedBootstrap { offset: usize, token: String },
    #[error("empty taxon name at byte {offset}")]
    EmptyTaxonName { offset: usize },
    #[error("subtree at byte {offset} is nested deeper than {MAX_NESTING} levels")]
    TooDeep { offset: usize },
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Remove `:length` annotations (plain or scientific notation).
pub fn strip_branch_lengths(text: &str) -> Cow<'_, str> {
    BRANCH_LENGTH_RE.replace_all(text, "")
}

/// Index of the bracket closing the one at `open`, searching no further than `end`.
///
/// ```
/// # use tree_sorter::newick::matching_bracket;
/// let s = "((A,B),C)";
/// assert_eq!(matching_bracket(s, 0, s.len()).unwrap(), 8);
/// assert_eq!(matching_bracket(s, 1, s.len()).unwrap(), 5);
/// ```
pub fn matching_bracket(text: &str, open: usize, end: usize) -> Result<usize, ParseError> {
    let mut depth = 0usize;
    for (i, b) in text.as_bytes()[open..end].iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth = depth.checked_sub(1).ok_or(ParseError::Unbalanced { offset: open + i })?;
                if depth == 0 {
                    return Ok(open + i);
                }
            }
            _ => {}
        }
    }
    Err(ParseError::Unbalanced { offset: open })
}

/// Parse one canonical tree string.
///
/// # Errors
/// Any structural problem yields a [`ParseError`]; offsets refer to the text
/// after branch lengths were stripped.
pub fn parse_newick(text: &str) -> Result<Tree, ParseError> {
    let stripped = strip_branch_lengths(text.trim());
    let text: &str = &stripped;

    if !(text.starts_with('(') && text.ends_with(");")) || text.len() < 3 {
        return Err(ParseError::MissingEnvelope);
    }
    let end = text.len() - 2;
    check_nesting(text)?;

    let comma = text[1..end]
        .find(',')
        .map(|i| i + 1)
        .ok_or(ParseError::MissingAnchor)?;
    let anchor = leaf_name(text, 1, comma)?;

    let (start, end) = unwrap_rooted(text, comma + 1, end)?;

    let mut parser = Parser {
        text,
        builder: TreeBuilder::default(),
    };
    let root = parser.builder.add_taxon(anchor);
    parser.node(start, end, NeighborRef::Taxon(root))?;

    Ok(parser.builder.finish(root)?)
}

impl FromStr for Tree {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_newick(s)
    }
}

/// Reject trees nested deeper than [`MAX_NESTING`] before descending into them.
///
/// The outer `(...);` envelope does not count as a level.
fn check_nesting(text: &str) -> Result<(), ParseError> {
    let mut depth = 0usize;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'(' => {
                depth += 1;
                if depth > MAX_NESTING + 1 {
                    return Err(ParseError::TooDeep { offset: i });
                }
            }
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// Narrow `(X,Y)bs` spanning the whole range down to `X,Y`.
fn unwrap_rooted(text: &str, start: usize, end: usize) -> Result<(usize, usize), ParseError> {
    if text.as_bytes().get(start) != Some(&b'(') {
        return Ok((start, end));
    }
    let close = matching_bracket(text, start, end)?;
    let trailing = &text[close + 1..end];
    if trailing.contains(',') {
        return Ok((start, end));
    }
    parse_bootstrap(trailing, close + 1)?;
    Ok((start + 1, close))
}

fn parse_bootstrap(token: &str, offset: usize) -> Result<u32, ParseError> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(DEFAULT_BOOTSTRAP);
    }
    if token.contains(['(', ')']) {
        return Err(ParseError::Unbalanced { offset });
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::MalformedBootstrap {
            offset,
            token: token.to_string(),
        });
    }
    token.parse().map_err(|_| ParseError::MalformedBootstrap {
        offset,
        token: token.to_string(),
    })
}

fn leaf_name(text: &str, start: usize, end: usize) -> Result<&str, ParseError> {
    let raw = &text[start..end];
    if let Some(i) = raw.find(['(', ')']) {
        return Err(ParseError::Unbalanced { offset: start + i });
    }
    let name = raw.trim();
    if name.is_empty() {
        return Err(ParseError::EmptyTaxonName { offset: start });
    }
    Ok(name)
}

struct Parser<'a> {
    text: &'a str,
    builder: TreeBuilder,
}

impl Parser<'_> {
    /// Build the node described by `text[start..end]` (an `X,Y` segment).
    fn node(&mut self, start: usize, end: usize, toward_anchor: NeighborRef) -> Result<NodeId, ParseError> {
        if start >= end {
            return Err(ParseError::EmptySubtree { offset: start });
        }
        let node = self.builder.add_node(toward_anchor);

        let (first, next) = self.child(node, start, end, false)?;
        self.builder.set_slot(node, 1, first);

        if next >= end {
            return Err(ParseError::MissingSibling { offset: end });
        }
        let (second, _) = self.child(node, next, end, true)?;
        self.builder.set_slot(node, 2, second);

        Ok(node)
    }

    /// Parse one child starting at `start`. The second child (`last`) runs to
    /// `end`; the first stops at the next delimiting comma.
    ///
    /// Returns the neighbor and the index where the sibling starts.
    fn child(
        &mut self,
        node: NodeId,
        start: usize,
        end: usize,
        last: bool,
    ) -> Result<(NeighborRef, usize), ParseError> {
        let text = self.text;
        let segment = &text[start..end];
        let start = start + (segment.len() - segment.trim_start().len());

        if text.as_bytes().get(start) == Some(&b'(') && start < end {
            let close = matching_bracket(text, start, end)?;
            let after = close + 1;
            let (token_end, next) = if last {
                if let Some(i) = text[after..end].find(',') {
                    return Err(ParseError::Multifurcation { offset: after + i });
                }
                (end, end)
            } else {
                let comma = text[after..end]
                    .find(',')
                    .map(|i| after + i)
                    .ok_or(ParseError::MissingSibling { offset: end })?;
                (comma, comma + 1)
            };
            let bootstrap = parse_bootstrap(&text[after..token_end], after)?;

            let edge = self.builder.add_edge(node);
            let distal = self.node(start + 1, close, NeighborRef::Edge(edge))?;
            self.builder.close_edge(edge, distal, bootstrap);
            return Ok((NeighborRef::Edge(edge), next));
        }

        let (name_end, next) = if last {
            if let Some(i) = text[start..end].find(',') {
                return Err(ParseError::Multifurcation { offset: start + i });
            }
            (end, end)
        } else {
            let comma = text[start..end]
                .find(',')
                .map(|i| start + i)
                .ok_or(ParseError::MissingSibling { offset: end })?;
            (comma, comma + 1)
        };
        let name = leaf_name(text, start, name_end)?;
        let taxon = self.builder.add_taxon(name);
        Ok((NeighborRef::Taxon(taxon), next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{EdgeId, Side};
    use itertools::Itertools;
    use phylotree::tree::Tree as PhyloTree;
    use std::collections::BTreeSet;

    const TEN_TAXA: &str = "(A:0.1,B:0.1,(H:0.1,(D:0.1,(J:0.1,(((G:0.1,E:0.1)77:0.1,(F:0.1,I:0.1)64:0.1)100:0.1,C:0.1)51:0.1)88:0.1)93:0.1)99:0.1);";

    fn names(tree: &Tree, edge: EdgeId, side: Side) -> BTreeSet<String> {
        tree.subtree_names(edge, side)
            .unwrap()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parses_four_taxa_with_bootstrap() {
        let tree = parse_newick("(A,(B,C)90,D);").unwrap();
        assert_eq!(tree.num_taxa(), 4);
        assert_eq!(tree.nodes().len(), 2);
        assert_eq!(tree.edges().len(), 1);
        assert_eq!(tree.taxon(tree.root()).name, "A");
        assert_eq!(tree.edge(EdgeId(0)).bootstrap, 90);

        let distal = names(&tree, EdgeId(0), Side::Distal);
        let expected: BTreeSet<String> = ["B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(distal, expected);
    }

    #[test]
    fn entity_counts_follow_taxon_count() {
        let tree = parse_newick(TEN_TAXA).unwrap();
        let n = tree.num_taxa();
        assert_eq!(n, 10);
        assert_eq!(tree.nodes().len(), n - 2);
        assert_eq!(tree.edges().len(), n - 3);

        let unique: BTreeSet<_> = tree.taxon_names().collect();
        assert_eq!(unique.len(), n);
    }

    #[test]
    fn every_slot_is_filled_and_edges_join_nodes() {
        let tree = parse_newick(TEN_TAXA).unwrap();
        for (i, node) in tree.nodes().iter().enumerate() {
            for slot in &node.slots {
                if let NeighborRef::Edge(e) = slot {
                    assert!(tree.edge(*e).opposite(NodeId(i)).is_some());
                }
            }
        }
    }

    #[test]
    fn both_sides_partition_the_taxon_set() {
        let tree = parse_newick(TEN_TAXA).unwrap();
        let all: BTreeSet<String> = tree.taxon_names().map(str::to_string).collect();

        for edge in tree.edge_ids() {
            let a = names(&tree, edge, Side::Anchor);
            let d = names(&tree, edge, Side::Distal);
            assert!(a.is_disjoint(&d), "edge {edge:?} sides overlap");
            let union: BTreeSet<String> = a.union(&d).cloned().collect();
            assert_eq!(union, all);
        }
    }

    #[test]
    fn bipartitions_are_independent_of_anchor() {
        // Same unrooted topology written from two different anchors.
        let from_a = parse_newick("(A,B,((C,D)70,E)80);").unwrap();
        let from_c = parse_newick("(C,D,((A,B)80,E)70);").unwrap();

        let splits = |tree: &Tree| -> BTreeSet<(BTreeSet<String>, u32)> {
            tree.edge_ids()
                .map(|e| {
                    let a = names(tree, e, Side::Anchor);
                    let d = names(tree, e, Side::Distal);
                    // Canonical side: the one holding "A".
                    let side = if a.contains("A") { a } else { d };
                    (side, tree.edge(e).bootstrap)
                })
                .collect()
        };
        assert_eq!(splits(&from_a), splits(&from_c));
    }

    #[test]
    fn reparsing_is_deterministic() {
        let t1 = parse_newick(TEN_TAXA).unwrap();
        let t2 = parse_newick(TEN_TAXA).unwrap();
        assert_eq!(t1.taxa(), t2.taxa());
        for (e1, e2) in t1.edge_ids().zip(t2.edge_ids()) {
            assert_eq!(t1.edge(e1).bootstrap, t2.edge(e2).bootstrap);
            assert_eq!(names(&t1, e1, Side::Distal), names(&t2, e2, Side::Distal));
        }
    }

    #[test]
    fn pairwise_splits_are_compatible() {
        // Splits from one tree never cross: for any two edges, one distal
        // side contains the other or they are disjoint.
        let tree = parse_newick(TEN_TAXA).unwrap();
        for pair in tree.edge_ids().combinations(2) {
            let x = names(&tree, pair[0], Side::Distal);
            let y = names(&tree, pair[1], Side::Distal);
            assert!(x.is_subset(&y) || y.is_subset(&x) || x.is_disjoint(&y));
        }
    }

    #[test]
    fn missing_bootstrap_defaults_to_one() {
        let tree = parse_newick("(A,(B,C),(D,E)42);").unwrap();
        assert_eq!(tree.edge(EdgeId(0)).bootstrap, DEFAULT_BOOTSTRAP);
        assert_eq!(tree.edge(EdgeId(1)).bootstrap, 42);
    }

    #[test]
    fn branch_lengths_are_stripped() {
        assert_eq!(strip_branch_lengths("(A:0.12,B:1.5e-05)9:0.0;"), "(A,B)9;");
        let tree = parse_newick("(A:0.1,(B:0.2,C:0.3)90:0.05,D:0.4);").unwrap();
        assert_eq!(tree.edge(EdgeId(0)).bootstrap, 90);
        assert_eq!(tree.taxon_names().collect::<Vec<_>>(), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn whitespace_around_children_is_ignored() {
        let tree = parse_newick("(A, (B, C)90, D);").unwrap();
        assert_eq!(tree.taxon_names().collect::<Vec<_>>(), vec!["A", "B", "C", "D"]);
        assert_eq!(tree.edge(EdgeId(0)).bootstrap, 90);
    }

    #[test]
    fn rooted_envelope_is_unwrapped() {
        let tree = parse_newick("(A,((B,C)90,D)95);").unwrap();
        assert_eq!(tree.num_taxa(), 4);
        assert_eq!(tree.edges().len(), 1);
        assert_eq!(tree.edge(EdgeId(0)).bootstrap, 90);
    }

    #[test]
    fn leaf_set_agrees_with_phylotree() {
        let ours = parse_newick(TEN_TAXA).unwrap();
        let theirs = PhyloTree::from_newick(TEN_TAXA).unwrap();

        let ours: BTreeSet<String> = ours.taxon_names().map(str::to_string).collect();
        let theirs: BTreeSet<String> = theirs
            .get_leaves()
            .iter()
            .filter_map(|id| theirs.get(id).ok()?.name.clone())
            .collect();
        assert_eq!(ours, theirs);
    }

    #[test]
    fn matching_bracket_reports_unbalanced_input() {
        let s = "((A,B),C";
        assert_eq!(
            matching_bracket(s, 0, s.len()),
            Err(ParseError::Unbalanced { offset: 0 })
        );
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(parse_newick("A,B,C"), Err(ParseError::MissingEnvelope)));
        assert!(matches!(parse_newick("(A,(B,C,D);"), Err(ParseError::Unbalanced { .. })));
        assert!(matches!(parse_newick("(A,(B,C)x9,D);"), Err(ParseError::MalformedBootstrap { .. })));
        assert!(matches!(parse_newick("(A,B,C,D);"), Err(ParseError::Multifurcation { .. })));
        assert!(matches!(parse_newick("(A,B);"), Err(ParseError::MissingSibling { .. })));
        assert!(matches!(parse_newick("(A,(B,C)),D);"), Err(ParseError::Unbalanced { .. })));
        assert!(matches!(parse_newick("(A,,C);"), Err(ParseError::EmptyTaxonName { .. })));
    }

    /// `(T0,T1,(T2,(T3,...(Tn,Z)50...)50)50);` with `levels` nested subtrees.
    fn ladder(levels: usize) -> String {
        let mut inner = format!("T{},Z", levels + 1);
        for i in (1..=levels).rev() {
            inner = format!("T{i},({inner})50");
        }
        format!("(T0,{inner});")
    }

    #[test]
    fn deep_ladder_parses_within_limit() {
        let tree = parse_newick(&ladder(300)).unwrap();
        assert_eq!(tree.num_taxa(), 303);
        assert_eq!(tree.edges().len(), 300);
    }

    #[test]
    fn overly_deep_ladder_is_rejected() {
        let text = ladder(MAX_NESTING + 1);
        assert!(matches!(parse_newick(&text), Err(ParseError::TooDeep { .. })));
    }

    #[test]
    fn from_str_parses() {
        let tree: Tree = "(A,B,C);".parse().unwrap();
        assert_eq!(tree.num_taxa(), 3);
        assert!(tree.edges().is_empty());
    }
}
