//! Arena-backed graph for unrooted binary trees.
//!
//! # Overview
//! A parsed tree is stored as three flat vectors (taxa, nodes, edges) that
//! refer to each other by index. Every internal [`Node`] is trivalent: each of
//! its three slots holds either an [`Edge`] to another node or a leaf
//! [`Taxon`]. Edges only ever join two nodes, so the leaf branches are implicit.
//!
//! ```text
//!        A            slot 0 of node0 holds taxon A (the parse anchor)
//!        |
//!      node0 ---e0--- node1 --- C
//!        |              |
//!        D              B
//! ```
//!
//! # Why the rooting does not matter
//! The parser anchors the tree on its first taxon, but an edge has no
//! direction: removing it always leaves the same two leaf sets, whichever
//! taxon was used as anchor. [`Tree::subtree_taxa`] reads one of those sets.

use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaxonId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub usize);

/// What a node slot points at.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NeighborRef {
    Edge(EdgeId),
    Taxon(TaxonId),
}

/// One endpoint of an edge.
///
/// `Anchor` is the endpoint closer to the parse anchor (the node the edge
/// was discovered from), `Distal` the node created for the bracketed subtree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Anchor,
    Distal,
}

impl Side {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::Anchor => 0,
            Side::Distal => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxon {
    pub name: String,
    /// The node this leaf hangs off. Bookkeeping only.
    pub attachment: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Slot 0 points toward the anchor, slots 1 and 2 are the children in text order.
    pub slots: [NeighborRef; 3],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub nodes: [NodeId; 2],
    pub bootstrap: u32,
}

impl Edge {
    /// The endpoint across the edge from `node`, if `node` is an endpoint at all.
    #[inline]
    pub fn opposite(&self, node: NodeId) -> Option<NodeId> {
        if self.nodes[0] == node {
            Some(self.nodes[1])
        } else if self.nodes[1] == node {
            Some(self.nodes[0])
        } else {
            None
        }
    }
}

/// Broken graph invariants. These can only arise from a bug in tree
/// construction, so callers treat them as fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {node} is not an endpoint of edge {edge}")]
    Detached { edge: usize, node: usize },
    #[error("slot {slot} of node {node} was never filled")]
    EmptySlot { node: usize, slot: usize },
    #[error("edge {0} has no distal node")]
    OpenEdge(usize),
    #[error("taxon '{0}' is not attached to any node")]
    UnattachedTaxon(String),
}

/// An immutable parsed tree.
#[derive(Debug, Clone)]
pub struct Tree {
    root: TaxonId,
    taxa: Vec<Taxon>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Tree {
    pub fn root(&self) -> TaxonId {
        self.root
    }

    pub fn taxa(&self) -> &[Taxon] {
        &self.taxa
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[inline]
    pub fn taxon(&self, id: TaxonId) -> &Taxon {
        &self.taxa[id.0]
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    #[inline]
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub fn num_taxa(&self) -> usize {
        self.taxa.len()
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edges.len()).map(EdgeId)
    }

    pub fn taxon_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.taxa.iter().map(|t| t.name.as_str())
    }

    pub fn find_taxon(&self, name: &str) -> Option<TaxonId> {
        self.taxa.iter().position(|t| t.name == name).map(TaxonId)
    }

    /// Collect the taxa on one side of `edge`.
    ///
    /// # Algorithm
    /// Depth-first walk starting at the chosen endpoint. At each node the
    /// slots are visited in order; a taxon slot is collected, an edge slot is
    /// followed to its opposite node unless it is the edge we arrived by.
    /// The walk therefore never re-crosses `edge` and every taxon is reached
    /// exactly once.
    ///
    /// # Errors
    /// [`GraphError::Detached`] if an edge does not actually touch the node
    /// it was reached from.
    pub fn subtree_taxa(&self, edge: EdgeId, side: Side) -> Result<Vec<TaxonId>, GraphError> {
        let start = self.edge(edge).nodes[side.index()];
        let mut taxa = Vec::new();
        // (node, edge we came in by)
        let mut stack = vec![(start, edge)];

        while let Some((node_id, came_by)) = stack.pop() {
            let mut onward = Vec::with_capacity(2);
            for slot in &self.node(node_id).slots {
                match *slot {
                    NeighborRef::Taxon(t) => taxa.push(t),
                    NeighborRef::Edge(e) if e == came_by => {}
                    NeighborRef::Edge(e) => {
                        let next = self.edge(e).opposite(node_id).ok_or(GraphError::Detached {
                            edge: e.0,
                            node: node_id.0,
                        })?;
                        onward.push((next, e));
                    }
                }
            }
            // Reversed so the earlier slot is expanded first.
            stack.extend(onward.into_iter().rev());
        }

        Ok(taxa)
    }

    /// Names of the taxa on one side of `edge`.
    pub fn subtree_names(&self, edge: EdgeId, side: Side) -> Result<Vec<&str>, GraphError> {
        Ok(self
            .subtree_taxa(edge, side)?
            .into_iter()
            .map(|t| self.taxon(t).name.as_str())
            .collect())
    }
}

/// Incremental construction used by the parser. Slots and edge endpoints are
/// filled as the text is consumed; [`TreeBuilder::finish`] checks that
/// nothing was left open.
#[derive(Debug, Default)]
pub(crate) struct TreeBuilder {
    taxa: Vec<(String, Option<NodeId>)>,
    nodes: Vec<[Option<NeighborRef>; 3]>,
    edges: Vec<(NodeId, Option<NodeId>, u32)>,
}

impl TreeBuilder {
    pub(crate) fn add_taxon(&mut self, name: &str) -> TaxonId {
        self.taxa.push((name.to_string(), None));
        TaxonId(self.taxa.len() - 1)
    }

    /// New node whose slot 0 links back toward the anchor.
    pub(crate) fn add_node(&mut self, toward_anchor: NeighborRef) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push([None, None, None]);
        self.set_slot(id, 0, toward_anchor);
        id
    }

    /// New edge hanging off `from`; its distal node is attached later.
    pub(crate) fn add_edge(&mut self, from: NodeId) -> EdgeId {
        self.edges.push((from, None, 1));
        EdgeId(self.edges.len() - 1)
    }

    pub(crate) fn close_edge(&mut self, edge: EdgeId, distal: NodeId, bootstrap: u32) {
        let entry = &mut self.edges[edge.0];
        entry.1 = Some(distal);
        entry.2 = bootstrap;
    }

    pub(crate) fn set_slot(&mut self, node: NodeId, slot: usize, neighbor: NeighborRef) {
        self.nodes[node.0][slot] = Some(neighbor);
        if let NeighborRef::Taxon(t) = neighbor {
            self.taxa[t.0].1 = Some(node);
        }
    }

    pub(crate) fn finish(self, root: TaxonId) -> Result<Tree, GraphError> {
        let taxa = self
            .taxa
            .into_iter()
            .map(|(name, attachment)| match attachment {
                Some(attachment) => Ok(Taxon { name, attachment }),
                None => Err(GraphError::UnattachedTaxon(name)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let nodes = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(node, slots)| {
                let mut filled = [NeighborRef::Taxon(root); 3];
                for (slot, neighbor) in slots.into_iter().enumerate() {
                    filled[slot] = neighbor.ok_or(GraphError::EmptySlot { node, slot })?;
                }
                Ok(Node { slots: filled })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let edges = self
            .edges
            .into_iter()
            .enumerate()
            .map(|(idx, (anchor, distal, bootstrap))| {
                let distal = distal.ok_or(GraphError::OpenEdge(idx))?;
                Ok(Edge {
                    nodes: [anchor, distal],
                    bootstrap,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Tree {
            root,
            taxa,
            nodes,
            edges,
        })
    }
}
