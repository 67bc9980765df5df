//! Lazily materialized term tree.
//!
//! The tree is an arena of [`TreeNode`]s addressed by [`NodeId`]. A node's
//! children are fetched from the [`GraphQuery`] the first time they are asked
//! for and cached for the navigator's lifetime; the graph is read-only for a
//! session so the cache is never invalidated. A term with several parents
//! shows up once under each of them, as distinct nodes sharing one
//! `Arc<Term>`.
//!
//! Jumping to a term climbs from the term to the root one parent at a time.
//! In a DAG the parent chosen at each step decides which of the possible
//! root paths is expanded, so the choice is an explicit [`ParentPolicy`].

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::NavigationError;
use crate::labels::LabelIndex;
use crate::model::{compare_names, ConceptId, PhenotypeTerm, Span, Term};
use crate::ontology::GraphQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Which parent to climb through when a term has several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentPolicy {
    /// Whatever the graph lists first.
    #[default]
    FirstDeclared,
    /// The lexicographically smallest parent id; stable across graph
    /// implementations.
    LowestId,
}

impl ParentPolicy {
    pub fn pick(self, parents: Vec<ConceptId>) -> Option<ConceptId> {
        match self {
            ParentPolicy::FirstDeclared => parents.into_iter().next(),
            ParentPolicy::LowestId => parents.into_iter().min(),
        }
    }
}

#[derive(Debug)]
struct TreeNode {
    term: Arc<Term>,
    parent: Option<NodeId>,
    children: Option<Vec<NodeId>>,
    expanded: bool,
}

/// Outcome of a jump to a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub selected: NodeId,
    /// Number of path steps that were matched and expanded.
    pub depth: usize,
    /// False when the walk stopped early on an inconsistent graph.
    pub complete: bool,
}

/// One line of the rendered tree. The root is hidden, so its children sit at
/// depth 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRow {
    pub node: NodeId,
    pub depth: usize,
}

pub struct TreeNavigator {
    graph: Arc<dyn GraphQuery>,
    policy: ParentPolicy,
    nodes: Vec<TreeNode>,
    selected: Option<NodeId>,
    labels: LabelIndex,
}

impl TreeNavigator {
    pub fn new(graph: Arc<dyn GraphQuery>) -> Result<Self, NavigationError> {
        Self::with_policy(graph, ParentPolicy::default())
    }

    pub fn with_policy(
        graph: Arc<dyn GraphQuery>,
        policy: ParentPolicy,
    ) -> Result<Self, NavigationError> {
        let root_id = graph.root_id();
        let root = graph
            .term_for_id(&root_id)
            .ok_or_else(|| NavigationError::UnresolvedId(root_id.to_string()))?;
        let labels = LabelIndex::build(graph.as_ref());

        Ok(Self {
            graph,
            policy,
            nodes: vec![TreeNode {
                term: root,
                parent: None,
                children: None,
                expanded: true,
            }],
            selected: None,
            labels,
        })
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root_id(&self) -> &ConceptId {
        &self.nodes[0].term.id
    }

    pub fn policy(&self) -> ParentPolicy {
        self.policy
    }

    /// Change the parent tie-break for later jumps. Already expanded nodes
    /// stay as they are.
    pub fn set_policy(&mut self, policy: ParentPolicy) {
        self.policy = policy;
    }

    pub fn graph(&self) -> &Arc<dyn GraphQuery> {
        &self.graph
    }

    pub fn labels(&self) -> &LabelIndex {
        &self.labels
    }

    pub fn term(&self, node: NodeId) -> &Arc<Term> {
        &self.nodes[node.0].term
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Number of nodes materialized so far, root included.
    pub fn materialized(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Children
    // ========================================================================

    /// Children of `node` sorted by name, fetched on first access and cached.
    pub fn children_of(&mut self, node: NodeId) -> &[NodeId] {
        if self.nodes[node.0].children.is_none() {
            let children = self.materialize_children(node);
            self.nodes[node.0].children = Some(children);
        }
        self.nodes[node.0].children.as_deref().unwrap_or(&[])
    }

    /// Children already cached for `node`, without touching the graph.
    pub fn cached_children(&self, node: NodeId) -> Option<&[NodeId]> {
        self.nodes[node.0].children.as_deref()
    }

    fn materialize_children(&mut self, node: NodeId) -> Vec<NodeId> {
        let id = self.nodes[node.0].term.id.clone();
        tracing::debug!(term = %id, name = %self.nodes[node.0].term.name, "materializing children");

        let mut seen: HashSet<ConceptId> = HashSet::new();
        let mut terms: Vec<Arc<Term>> = Vec::new();
        for child in self.graph.children_of(&id) {
            match self.graph.term_for_id(&child) {
                Some(term) => {
                    if seen.insert(term.id.clone()) {
                        terms.push(term);
                    }
                }
                None => tracing::debug!(parent = %id, child = %child, "skipping unresolvable child id"),
            }
        }
        terms.sort_by(|a, b| compare_names(a, b));

        terms
            .into_iter()
            .map(|term| {
                let child = NodeId(self.nodes.len());
                self.nodes.push(TreeNode {
                    term,
                    parent: Some(node),
                    children: None,
                    expanded: false,
                });
                child
            })
            .collect()
    }

    /// Whether the graph reports no children for the node's term. Asks the
    /// graph directly and leaves the child cache alone.
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.graph.children_of(&self.nodes[node.0].term.id).is_empty()
    }

    pub fn is_expanded(&self, node: NodeId) -> bool {
        self.nodes[node.0].expanded
    }

    pub fn set_expanded(&mut self, node: NodeId, expanded: bool) {
        self.nodes[node.0].expanded = expanded;
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    pub fn selected_term(&self) -> Option<&Arc<Term>> {
        self.selected.map(|node| self.term(node))
    }

    pub fn select(&mut self, node: NodeId) {
        self.selected = Some(node);
    }

    /// The selected term as a hand-added annotation. `None` when nothing or
    /// only the hidden root is selected.
    pub fn selected_phenotype(&self, present: bool) -> Option<PhenotypeTerm> {
        let node = self.selected.filter(|n| *n != self.root())?;
        Some(PhenotypeTerm::new(
            self.term(node).clone(),
            Span::empty(),
            present,
        ))
    }

    /// Expanded tree flattened in display order.
    pub fn visible_rows(&mut self) -> Vec<VisibleRow> {
        let root = self.root();
        let mut stack: Vec<(NodeId, usize)> =
            self.children_of(root).iter().rev().map(|&c| (c, 0)).collect();
        let mut rows = Vec::new();
        while let Some((node, depth)) = stack.pop() {
            rows.push(VisibleRow { node, depth });
            if self.nodes[node.0].expanded {
                let children = self.children_of(node).to_vec();
                stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
            }
        }
        rows
    }

    /// Row index the view should scroll to so the selection is visible.
    pub fn scroll_target(&mut self) -> Option<usize> {
        let selected = self.selected?;
        self.visible_rows().iter().position(|row| row.node == selected)
    }

    // ========================================================================
    // Path resolution
    // ========================================================================

    /// Ids from just below the root down to `id`, climbing one parent per
    /// step as chosen by the [`ParentPolicy`]. The root itself is hidden and
    /// never part of the path, so the root's own path is empty.
    pub fn path_from_root_to(&self, id: &ConceptId) -> Result<Vec<ConceptId>, NavigationError> {
        let root = self.root_id();
        let not_found = || NavigationError::PathNotFound {
            term: id.clone(),
            root: root.clone(),
        };

        if id == root {
            return Ok(Vec::new());
        }
        if !self.graph.exists_path(id, root) {
            return Err(not_found());
        }

        let mut climbed = vec![id.clone()];
        let mut seen: HashSet<ConceptId> = HashSet::from([id.clone()]);
        let mut current = id.clone();
        while current != *root {
            let parent = self
                .policy
                .pick(self.graph.parents_of(&current))
                .ok_or_else(not_found)?;
            if !seen.insert(parent.clone()) {
                return Err(not_found());
            }
            climbed.push(parent.clone());
            current = parent;
        }

        climbed.pop();
        climbed.reverse();
        Ok(climbed)
    }

    /// Walk down from the root along `path`, expanding each matched node, and
    /// select the deepest node reached. A step with no matching child stops
    /// the walk there.
    pub fn expand_and_select(&mut self, path: &[ConceptId]) -> Navigation {
        let mut target = self.root();
        let mut depth = 0;
        for id in path {
            let children = self.children_of(target).to_vec();
            match children.into_iter().find(|c| self.nodes[c.0].term.id == *id) {
                Some(child) => {
                    self.nodes[child.0].expanded = true;
                    target = child;
                    depth += 1;
                }
                None => {
                    tracing::warn!(term = %id, depth, "term missing under its climbed parent; stopping expansion");
                    break;
                }
            }
        }

        self.selected = Some(target);
        Navigation {
            selected: target,
            depth,
            complete: depth == path.len(),
        }
    }

    /// Expand the tree down to `id` and select it. Failures are logged and
    /// leave the selection unchanged.
    pub fn focus(&mut self, id: &ConceptId) -> Result<Navigation, NavigationError> {
        let resolved = self
            .graph
            .term_for_id(id)
            .ok_or_else(|| NavigationError::UnresolvedId(id.to_string()))
            .and_then(|term| self.path_from_root_to(&term.id));

        match resolved {
            Ok(path) => Ok(self.expand_and_select(&path)),
            Err(err) => {
                tracing::warn!(term = %id, error = %err, "unable to focus on term");
                Err(err)
            }
        }
    }

    /// Jump to the term with exactly this name. Unknown names do nothing.
    pub fn search(&mut self, name: &str) -> Option<Navigation> {
        let Some(id) = self.labels.lookup(name).cloned() else {
            tracing::debug!(name, "no term with this name");
            return None;
        };
        self.focus(&id).ok()
    }

    /// Names for the search box autocompletion.
    pub fn complete(&self, prefix: &str, limit: usize) -> Vec<&str> {
        self.labels.complete(prefix, limit)
    }
}
