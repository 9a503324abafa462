//! The DAG of node names underlying a [`crate::Pipeline`]
//!
//! Vertices are node names; an edge points from a dependency to the node
//! that depends on it. A vertex with no registered [`crate::node::Node`]
//! is a virtual input. We keep the vertex/edge data in a `petgraph`
//! [`StableDiGraph`] (stable indices survive node removal) alongside a
//! name-to-index lookup, mirroring `ufo-pipeline`'s `FinalizedGraph` plus
//! name map, but backed directly by `petgraph` rather than a hand-rolled
//! adjacency list.

use std::collections::{HashMap, HashSet};

use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;

use crate::labels::NodeName;

/// The DAG of node names, independent of the node bodies themselves.
#[derive(Clone, Default)]
pub(crate) struct PipelineGraph {
	graph: StableDiGraph<NodeName, ()>,
	index: HashMap<NodeName, NodeIndex>,
	virtual_inputs: HashSet<NodeName>,
	/// Monotonic counter assigning each vertex an insertion order, used to
	/// break topological-sort ties deterministically.
	seq: HashMap<NodeName, u64>,
	next_seq: u64,
}

impl PipelineGraph {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	fn next_seq(&mut self) -> u64 {
		let s = self.next_seq;
		self.next_seq += 1;
		s
	}

	/// Get or create the vertex for `name`. Newly created vertices are
	/// virtual inputs until a node is registered under that name.
	fn ensure_vertex(&mut self, name: &NodeName) -> NodeIndex {
		if let Some(&idx) = self.index.get(name) {
			return idx;
		}
		let idx = self.graph.add_node(name.clone());
		self.index.insert(name.clone(), idx);
		self.virtual_inputs.insert(name.clone());
		let seq = self.next_seq();
		self.seq.insert(name.clone(), seq);
		idx
	}

	pub(crate) fn contains(&self, name: &NodeName) -> bool {
		self.index.contains_key(name)
	}

	pub(crate) fn is_virtual_input(&self, name: &NodeName) -> bool {
		self.virtual_inputs.contains(name)
	}

	pub(crate) fn virtual_inputs(&self) -> impl Iterator<Item = &NodeName> {
		self.virtual_inputs.iter()
	}

	fn idx_of(&self, name: &NodeName) -> Option<NodeIndex> {
		self.index.get(name).copied()
	}

	/// Would adding an edge `dep -> node` introduce a cycle? True if `node`
	/// can already reach `dep`.
	fn would_cycle(&self, dep: NodeIndex, node: NodeIndex) -> bool {
		if dep == node {
			return true;
		}
		has_path_connecting(&self.graph, node, dep, None)
	}

	/// Register `name` as a node vertex (promoting it from a virtual input
	/// if needed) with edges from each of `dependencies`. Unknown
	/// dependency names become new virtual inputs. Returns an error if this
	/// would introduce a cycle; on error, `self` is left untouched (the
	/// caller is expected to have cloned `self` before calling this, per
	/// the crate's stage-then-swap convention).
	pub(crate) fn register_node(
		&mut self,
		name: &NodeName,
		dependencies: &[NodeName],
	) -> Result<(), NodeName> {
		let node_idx = self.ensure_vertex(name);
		self.virtual_inputs.remove(name);

		for dep in dependencies {
			let dep_idx = self.ensure_vertex(dep);
			if self.would_cycle(dep_idx, node_idx) {
				return Err(dep.clone());
			}
			self.graph.update_edge(dep_idx, node_idx, ());
		}
		Ok(())
	}

	/// Remove the node vertex for `name`, along with any now-unreferenced
	/// *virtual input* dependency vertex. `name` itself is always removed
	/// if present, regardless of whether it had dependents (the caller is
	/// responsible for the "no dependents" conflict check). A dependency
	/// that is itself a real, registered node is left in place even if it
	/// now has no dependents — it's just a valid leaf, not an orphan.
	pub(crate) fn remove_node(&mut self, name: &NodeName) {
		let Some(idx) = self.idx_of(name) else {
			return;
		};

		// Dependencies that might now be unreferenced once `name` is gone.
		let deps: Vec<NodeIndex> = self
			.graph
			.neighbors_directed(idx, Direction::Incoming)
			.collect();

		self.graph.remove_node(idx);
		self.index.remove(name);
		self.virtual_inputs.remove(name);
		self.seq.remove(name);

		for dep_idx in deps {
			self.cleanup_if_orphaned_virtual_input(dep_idx);
		}
	}

	/// Drop every incoming edge into `name`'s vertex (i.e. its current
	/// dependency list), cleaning up any dependency vertex this orphans —
	/// same rule as `remove_node`: only virtual inputs are ever deleted,
	/// real nodes persist as valid leaves. `name`'s own vertex and its
	/// outgoing edges (dependents) are untouched. Used before re-registering
	/// a replaced node's fresh dependency list, so stale edges from the old
	/// declaration don't linger.
	pub(crate) fn clear_dependencies(&mut self, name: &NodeName) {
		let Some(idx) = self.idx_of(name) else {
			return;
		};
		let deps: Vec<NodeIndex> = self
			.graph
			.neighbors_directed(idx, Direction::Incoming)
			.collect();
		for dep_idx in &deps {
			if let Some(edge) = self.graph.find_edge(*dep_idx, idx) {
				self.graph.remove_edge(edge);
			}
		}
		for dep_idx in deps {
			self.cleanup_if_orphaned_virtual_input(dep_idx);
		}
	}

	/// If `idx` is a virtual input with no remaining dependents, delete its
	/// vertex entirely.
	fn cleanup_if_orphaned_virtual_input(&mut self, idx: NodeIndex) {
		let Some(name) = self.graph.node_weight(idx).cloned() else {
			return;
		};
		if !self.virtual_inputs.contains(&name) {
			return;
		}
		let has_dependents = self
			.graph
			.neighbors_directed(idx, Direction::Outgoing)
			.next()
			.is_some();
		if !has_dependents {
			self.graph.remove_node(idx);
			self.index.remove(&name);
			self.virtual_inputs.remove(&name);
			self.seq.remove(&name);
		}
	}

	/// Names with no outgoing edges (no dependents): the default output set.
	pub(crate) fn leaves<'a>(
		&'a self,
		is_node: impl Fn(&NodeName) -> bool + 'a,
	) -> impl Iterator<Item = NodeName> + 'a {
		self.graph.node_indices().filter_map(move |idx| {
			let name = self.graph.node_weight(idx)?;
			if !is_node(name) {
				return None;
			}
			let has_dependents = self
				.graph
				.neighbors_directed(idx, Direction::Outgoing)
				.next()
				.is_some();
			(!has_dependents).then(|| name.clone())
		})
	}

	/// Direct dependencies of `name`, in no particular order.
	pub(crate) fn dependencies_of(&self, name: &NodeName) -> Vec<NodeName> {
		let Some(idx) = self.idx_of(name) else {
			return Vec::new();
		};
		self.graph
			.neighbors_directed(idx, Direction::Incoming)
			.filter_map(|i| self.graph.node_weight(i).cloned())
			.collect()
	}

	/// All ancestors of `names` (inclusive), walking dependency edges
	/// backwards, stopping whenever `stop_at` returns true for a name
	/// (the name itself is still included, its ancestors are not).
	pub(crate) fn ancestors(
		&self,
		names: impl IntoIterator<Item = NodeName>,
		mut stop_at: impl FnMut(&NodeName) -> bool,
	) -> HashSet<NodeName> {
		let mut visited = HashSet::new();
		let mut stack: Vec<NodeName> = names.into_iter().collect();
		while let Some(name) = stack.pop() {
			if visited.contains(&name) {
				continue;
			}
			visited.insert(name.clone());
			if stop_at(&name) {
				continue;
			}
			let Some(idx) = self.idx_of(&name) else {
				continue;
			};
			for dep_idx in self.graph.neighbors_directed(idx, Direction::Incoming) {
				if let Some(dep_name) = self.graph.node_weight(dep_idx) {
					stack.push(dep_name.clone());
				}
			}
		}
		visited
	}

	/// Topologically sort `subset`, considering only edges whose endpoints
	/// are both in `subset`, breaking ties by insertion order. Errors with
	/// the offending name if `subset` somehow contains a cycle (shouldn't
	/// happen: the full graph is kept acyclic by construction).
	pub(crate) fn topo_sort_subset(&self, subset: &HashSet<NodeName>) -> Result<Vec<NodeName>, NodeName> {
		let mut in_degree: HashMap<NodeName, usize> = HashMap::new();
		for name in subset {
			let Some(idx) = self.idx_of(name) else { continue };
			let count = self
				.graph
				.neighbors_directed(idx, Direction::Incoming)
				.filter_map(|i| self.graph.node_weight(i))
				.filter(|dep| subset.contains(*dep))
				.count();
			in_degree.insert(name.clone(), count);
		}

		// Ready set ordered by insertion sequence for determinism.
		let mut initially_ready: Vec<NodeName> = in_degree
			.iter()
			.filter(|(_, &deg)| deg == 0)
			.map(|(n, _)| n.clone())
			.collect();
		initially_ready.sort_by_key(|n| self.seq.get(n).copied().unwrap_or(u64::MAX));

		let mut order = Vec::with_capacity(subset.len());
		let mut ready: std::collections::VecDeque<NodeName> = initially_ready.into();
		while let Some(name) = ready.pop_front() {
			order.push(name.clone());
			let Some(idx) = self.idx_of(&name) else { continue };
			let mut newly_ready = Vec::new();
			for dependent_idx in self.graph.neighbors_directed(idx, Direction::Outgoing) {
				let Some(dependent) = self.graph.node_weight(dependent_idx) else { continue };
				if !subset.contains(dependent) {
					continue;
				}
				if let Some(deg) = in_degree.get_mut(dependent) {
					*deg -= 1;
					if *deg == 0 {
						newly_ready.push(dependent.clone());
					}
				}
			}
			newly_ready.sort_by_key(|n| self.seq.get(n).copied().unwrap_or(u64::MAX));
			// Merge, keeping the whole deque ordered by sequence number.
			for n in newly_ready {
				let pos = ready
					.iter()
					.position(|existing| self.seq.get(existing) > self.seq.get(&n))
					.unwrap_or(ready.len());
				ready.insert(pos, n);
			}
		}

		if order.len() != subset.len() {
			let stuck = subset
				.iter()
				.find(|n| !order.contains(n))
				.cloned()
				.unwrap_or_else(|| NodeName::new("<unknown>"));
			return Err(stuck);
		}
		Ok(order)
	}

	/// All node/virtual-input names currently present, in insertion order.
	pub(crate) fn all_names_in_insertion_order(&self) -> Vec<NodeName> {
		let mut names: Vec<NodeName> = self.index.keys().cloned().collect();
		names.sort_by_key(|n| self.seq.get(n).copied().unwrap_or(u64::MAX));
		names
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn n(s: &str) -> NodeName {
		NodeName::new(s)
	}

	#[test]
	fn fresh_dependency_becomes_virtual_input() {
		let mut g = PipelineGraph::new();
		g.register_node(&n("b"), &[n("a")]).unwrap();
		assert!(g.is_virtual_input(&n("a")));
		assert!(!g.is_virtual_input(&n("b")));
	}

	#[test]
	fn registering_a_node_promotes_it_from_virtual_input() {
		let mut g = PipelineGraph::new();
		g.register_node(&n("b"), &[n("a")]).unwrap();
		g.register_node(&n("a"), &[]).unwrap();
		assert!(!g.is_virtual_input(&n("a")));
	}

	#[test]
	fn direct_self_dependency_is_rejected() {
		let mut g = PipelineGraph::new();
		let err = g.register_node(&n("a"), &[n("a")]).unwrap_err();
		assert_eq!(err, n("a"));
	}

	#[test]
	fn indirect_cycle_is_rejected() {
		let mut g = PipelineGraph::new();
		g.register_node(&n("b"), &[n("a")]).unwrap();
		g.register_node(&n("c"), &[n("b")]).unwrap();
		// a -> b -> c already holds; registering a depending on c closes the loop.
		let err = g.register_node(&n("a"), &[n("c")]).unwrap_err();
		assert_eq!(err, n("c"));
	}

	#[test]
	fn remove_node_drops_now_unreferenced_dependencies() {
		let mut g = PipelineGraph::new();
		g.register_node(&n("b"), &[n("a")]).unwrap();
		g.remove_node(&n("b"));
		assert!(!g.contains(&n("a")));
		assert!(!g.contains(&n("b")));
	}

	#[test]
	fn remove_node_keeps_dependency_still_used_elsewhere() {
		let mut g = PipelineGraph::new();
		g.register_node(&n("b"), &[n("a")]).unwrap();
		g.register_node(&n("c"), &[n("a")]).unwrap();
		g.remove_node(&n("b"));
		assert!(g.contains(&n("a")));
	}

	#[test]
	fn remove_node_never_deletes_an_orphaned_real_node() {
		let mut g = PipelineGraph::new();
		g.register_node(&n("a"), &[]).unwrap();
		g.register_node(&n("b"), &[n("a")]).unwrap();
		g.remove_node(&n("b"));
		// `a` is a registered node, not a virtual input: even with no
		// remaining dependents it must persist as a leaf.
		assert!(g.contains(&n("a")));
		assert!(!g.is_virtual_input(&n("a")));
	}

	#[test]
	fn clear_dependencies_drops_stale_edges_and_orphaned_virtual_inputs() {
		let mut g = PipelineGraph::new();
		g.register_node(&n("b"), &[n("x")]).unwrap();
		assert!(g.is_virtual_input(&n("x")));

		g.clear_dependencies(&n("b"));

		assert!(!g.contains(&n("x")), "x had no other dependents and should be dropped");
		assert!(g.contains(&n("b")));
		assert!(g.dependencies_of(&n("b")).is_empty());
	}

	#[test]
	fn clear_dependencies_keeps_a_real_dependency_that_is_now_unused() {
		let mut g = PipelineGraph::new();
		g.register_node(&n("a"), &[]).unwrap();
		g.register_node(&n("b"), &[n("a")]).unwrap();

		g.clear_dependencies(&n("b"));

		assert!(g.contains(&n("a")));
		assert!(g.dependencies_of(&n("b")).is_empty());
	}

	#[test]
	fn topo_sort_breaks_ties_by_insertion_order() {
		let mut g = PipelineGraph::new();
		// c and b both become ready at once once a runs; c was declared first.
		g.register_node(&n("c"), &[n("a")]).unwrap();
		g.register_node(&n("b"), &[n("a")]).unwrap();
		g.register_node(&n("a"), &[]).unwrap();
		let subset: HashSet<NodeName> = [n("a"), n("b"), n("c")].into_iter().collect();
		let order = g.topo_sort_subset(&subset).unwrap();
		assert_eq!(order, vec![n("a"), n("c"), n("b")]);
	}

	#[test]
	fn ancestors_stop_at_bypassed_names() {
		let mut g = PipelineGraph::new();
		g.register_node(&n("b"), &[n("a")]).unwrap();
		g.register_node(&n("c"), &[n("b")]).unwrap();
		let visited = g.ancestors([n("c")], |name| name == &n("b"));
		assert!(visited.contains(&n("c")));
		assert!(visited.contains(&n("b")));
		assert!(!visited.contains(&n("a")));
	}
}
