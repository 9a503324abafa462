//! The pipeline itself: node registry, DAG, and execution

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use crate::errors::{Phase, PipelineError};
use crate::graph::PipelineGraph;
use crate::labels::NodeName;
use crate::node::{Node, NodeConfig, OutputExtractor};
use crate::value::{OutputMap, Value, ValueMap};

/// A container of named computation steps and the DAG they induce.
///
/// See the crate docs for the full execution model. A `Pipeline` is not
/// thread-safe for mutation; concurrent reads (including concurrently
/// executing clones produced by [`Pipeline::extract_subgraph`]) are fine.
pub struct Pipeline {
	nodes: HashMap<NodeName, Node>,
	graph: PipelineGraph,
	validate_globally: bool,
	/// Scratch space for one `execute` call. Always empty between calls.
	cache: HashMap<NodeName, Value>,
}

impl Default for Pipeline {
	fn default() -> Self {
		Self::new()
	}
}

impl Pipeline {
	/// An empty pipeline with global validation enabled.
	pub fn new() -> Self {
		Self {
			nodes: HashMap::new(),
			graph: PipelineGraph::new(),
			validate_globally: true,
			cache: HashMap::new(),
		}
	}

	/// Set the global validation gate. When false, no node runs its hooks
	/// regardless of its own `validate_enabled` flag.
	pub fn set_validate_globally(&mut self, enabled: bool) -> &mut Self {
		self.validate_globally = enabled;
		self
	}

	/// Is global validation currently enabled?
	pub fn validate_globally(&self) -> bool {
		self.validate_globally
	}

	// ---------------------------------------------------------------
	// Graph management (spec.md §4.1)
	// ---------------------------------------------------------------

	/// Register a node, promoting a same-named virtual input if one
	/// exists, or replacing a same-named node if it has no dependents.
	///
	/// Fails (leaving the pipeline untouched) if: the name is blank, a
	/// dependency name is repeated, an existing node with dependents would
	/// be replaced, the edit would introduce a cycle, or (when `outputs`
	/// is set) a derived node's name collides with another node.
	pub fn add_node(&mut self, config: NodeConfig) -> Result<&mut Self, PipelineError> {
		if config.name.is_blank() {
			return Err(PipelineError::InvalidArgument(
				"node name must not be empty or whitespace".into(),
			));
		}
		let mut seen = HashSet::new();
		for dep in &config.dependencies {
			if !seen.insert(dep.clone()) {
				return Err(PipelineError::InvalidArgument(format!(
					"duplicate dependency `{dep}`"
				)));
			}
		}

		if let Some(existing) = self.nodes.get(&config.name) {
			if self.has_dependents(&existing.name) {
				return Err(PipelineError::Conflict(format!(
					"node `{}` has dependents and cannot be replaced",
					existing.name
				)));
			}
		}

		let (node, outputs) = config.build();
		let derived_names: Vec<NodeName> = outputs.entries.iter().map(|(n, _)| n.clone()).collect();
		let mut seen_derived = HashSet::new();
		for derived in &derived_names {
			if derived == &node.name {
				return Err(PipelineError::InvalidArgument(format!(
					"derived output `{derived}` collides with its source node's own name"
				)));
			}
			if !seen_derived.insert(derived.clone()) {
				return Err(PipelineError::InvalidArgument(format!(
					"duplicate derived output name `{derived}`"
				)));
			}
			if let Some(existing) = self.nodes.get(derived) {
				if existing.name != node.name {
					return Err(PipelineError::Conflict(format!(
						"derived output `{derived}` collides with an existing node"
					)));
				}
			}
		}

		// Stage the mutation on a clone so a cycle (or a later collision)
		// leaves `self` untouched.
		let mut staged_graph = self.graph.clone();
		if self.nodes.contains_key(&node.name) {
			// Replacing an existing node: drop its old dependency edges
			// first, or stale ones from the previous declaration would
			// linger alongside the fresh set registered below.
			staged_graph.clear_dependencies(&node.name);
		}
		staged_graph
			.register_node(&node.name, &node.dependencies)
			.map_err(|_| PipelineError::Cycle {
				node: node.name.clone(),
			})?;
		for (derived_name, _) in &outputs.entries {
			staged_graph
				.register_node(derived_name, std::slice::from_ref(&node.name))
				.map_err(|_| PipelineError::Cycle {
					node: derived_name.clone(),
				})?;
		}

		debug!(node = %node.name, dependencies = node.dependencies.len(), derived = derived_names.len(), "registering node");

		self.graph = staged_graph;
		self.nodes.insert(node.name.clone(), node.clone());
		for (derived_name, extractor) in outputs.entries {
			let derived = build_derived_node(derived_name.clone(), node.name.clone(), extractor);
			self.nodes.insert(derived_name, derived);
		}

		Ok(self)
	}

	fn has_dependents(&self, name: &NodeName) -> bool {
		self.nodes
			.values()
			.any(|n| n.dependencies.iter().any(|d| d == name))
	}

	/// Remove a node. Fails if `name` is not a node, or if some other node
	/// still depends on it.
	pub fn remove_node(&mut self, name: &NodeName) -> Result<(), PipelineError> {
		if !self.nodes.contains_key(name) {
			return Err(PipelineError::InvalidArgument(format!(
				"`{name}` is not a registered node"
			)));
		}
		if self.has_dependents(name) {
			return Err(PipelineError::Conflict(format!(
				"node `{name}` has dependents and cannot be removed"
			)));
		}
		let mut staged_graph = self.graph.clone();
		staged_graph.remove_node(name);
		self.graph = staged_graph;
		self.nodes.remove(name);
		debug!(node = %name, "removed node");
		Ok(())
	}

	/// Look up a node by name.
	pub fn get_node(&self, name: &NodeName) -> Option<&Node> {
		self.nodes.get(name)
	}

	/// All node names, in a valid topological order (dependency before
	/// dependent), ties broken by insertion order.
	pub fn list_nodes(&self) -> Vec<NodeName> {
		let all: HashSet<NodeName> = self.nodes.keys().cloned().collect();
		// The full graph is acyclic by construction, so this cannot fail.
		self.graph
			.topo_sort_subset(&all)
			.unwrap_or_default()
	}

	/// Is `name` a virtual input (referenced as a dependency, but not a
	/// registered node)?
	pub fn is_virtual_input(&self, name: &NodeName) -> bool {
		self.graph.is_virtual_input(name)
	}

	/// The current set of virtual inputs.
	pub fn get_virtual_inputs(&self) -> BTreeSet<NodeName> {
		self.graph.virtual_inputs().cloned().collect()
	}

	/// The virtual inputs that are ancestors of `outputs` (defaults to all
	/// leaf nodes when `outputs` is `None` or empty).
	pub fn get_required_inputs(&self, outputs: Option<&[NodeName]>) -> BTreeSet<NodeName> {
		let outputs = self.effective_outputs(outputs);
		let ancestry = self.graph.ancestors(outputs, |_| false);
		ancestry
			.into_iter()
			.filter(|n| self.graph.is_virtual_input(n))
			.collect()
	}

	fn effective_outputs(&self, outputs: Option<&[NodeName]>) -> Vec<NodeName> {
		match outputs {
			Some(o) if !o.is_empty() => o.to_vec(),
			_ => self.leaf_nodes(),
		}
	}

	fn leaf_nodes(&self) -> Vec<NodeName> {
		let is_node = |n: &NodeName| self.nodes.contains_key(n);
		let mut leaves: Vec<NodeName> = self.graph.leaves(is_node).collect();
		leaves.sort();
		leaves
	}

	/// An independent pipeline containing exactly the ancestor closure of
	/// `outputs`. Node and hook callables are shared by reference (cheap
	/// `Arc` clones), not deep-copied.
	pub fn extract_subgraph(&self, outputs: &[NodeName]) -> Result<Pipeline, PipelineError> {
		for name in outputs {
			if !self.nodes.contains_key(name) {
				return Err(PipelineError::InvalidArgument(format!(
					"`{name}` is not a known node"
				)));
			}
		}

		let ancestry = self.graph.ancestors(outputs.iter().cloned(), |_| false);

		let mut sub = Pipeline::new();
		sub.validate_globally = self.validate_globally;

		// Insert in the parent's topological order so each node's
		// dependencies are already registered (and thus not misread as
		// fresh virtual inputs) by the time it is added.
		for name in self.list_nodes() {
			if !ancestry.contains(&name) {
				continue;
			}
			let node = self.nodes.get(&name).expect("node listed by list_nodes");
			let mut staged_graph = sub.graph.clone();
			staged_graph
				.register_node(&node.name, &node.dependencies)
				.expect("subgraph of an acyclic graph is acyclic");
			sub.graph = staged_graph;
			sub.nodes.insert(name, node.clone());
		}

		Ok(sub)
	}

	// ---------------------------------------------------------------
	// Execution (spec.md §4.2)
	// ---------------------------------------------------------------

	/// Run the pipeline, producing the requested `outputs` (defaulting to
	/// all leaf nodes).
	///
	/// `inputs` entries are classified by name: a node name bypasses that
	/// node (its upstream contributes nothing), a virtual input name
	/// supplies that input's value. Any other key is rejected.
	pub fn execute(
		&mut self,
		outputs: Option<&[NodeName]>,
		inputs: HashMap<NodeName, Value>,
	) -> Result<HashMap<NodeName, Value>, PipelineError> {
		let outputs = self.effective_outputs(outputs);
		for name in &outputs {
			if !self.nodes.contains_key(name) {
				return Err(PipelineError::InvalidArgument(format!(
					"`{name}` is not a known node and cannot be requested as an output"
				)));
			}
		}

		let mut bypasses: HashMap<NodeName, Value> = HashMap::new();
		let mut virtual_values: HashMap<NodeName, Value> = HashMap::new();
		for (name, value) in inputs {
			if self.nodes.contains_key(&name) {
				bypasses.insert(name, value);
			} else if self.graph.is_virtual_input(&name) {
				virtual_values.insert(name, value);
			} else {
				return Err(PipelineError::InvalidArgument(format!(
					"`{name}` is neither a node nor a virtual input"
				)));
			}
		}

		// Reverse reachability from `outputs`, stopping at bypassed names.
		let visited = self.graph.ancestors(outputs.iter().cloned(), |name| {
			bypasses.contains_key(name)
		});
		let required_nodes: HashSet<NodeName> = visited
			.iter()
			.filter(|n| self.nodes.contains_key(*n) && !bypasses.contains_key(*n))
			.cloned()
			.collect();
		let required_virtual: HashSet<NodeName> = visited
			.iter()
			.filter(|n| self.graph.is_virtual_input(n))
			.cloned()
			.collect();

		trace!(
			outputs = outputs.len(),
			required_nodes = required_nodes.len(),
			required_virtual = required_virtual.len(),
			"computed required subgraph"
		);

		let mut missing: Vec<NodeName> = required_virtual
			.iter()
			.filter(|n| !virtual_values.contains_key(*n))
			.cloned()
			.collect();
		if !missing.is_empty() {
			missing.sort();
			return Err(PipelineError::MissingInput { names: missing });
		}

		for name in &outputs {
			let reachable = bypasses.contains_key(name) || required_nodes.contains(name);
			if !reachable {
				return Err(PipelineError::UnreachableOutput { name: name.clone() });
			}
		}

		let order = self
			.graph
			.topo_sort_subset(&required_nodes)
			.map_err(|stuck| PipelineError::Cycle { node: stuck })?;

		self.cache.clear();
		for (name, value) in bypasses {
			self.cache.insert(name, value);
		}
		for (name, value) in virtual_values {
			self.cache.insert(name, value);
		}

		for name in &order {
			self.run_node(name)?;
		}

		let result = outputs
			.into_iter()
			.map(|name| {
				let value = self
					.cache
					.get(&name)
					.cloned()
					.expect("output was validated reachable above");
				(name, value)
			})
			.collect();

		self.cache.clear();
		Ok(result)
	}

	/// Produce the value for `name`, using the cache if present. This is
	/// the documented "missing-cache fallback" (spec.md §4.2): the primary
	/// loop in `execute` always populates the cache in topological order
	/// first, so this recursive path is only ever exercised if a
	/// dependency was, for some reason, absent from the cache when a node
	/// that needs it runs.
	fn run_node(&mut self, name: &NodeName) -> Result<Value, PipelineError> {
		if let Some(value) = self.cache.get(name) {
			return Ok(value.clone());
		}

		let node = self
			.nodes
			.get(name)
			.cloned()
			.expect("run_node is only called with required, registered nodes");

		let mut inputs = ValueMap::new();
		for dep in &node.dependencies {
			let value = match self.cache.get(dep) {
				Some(v) => v.clone(),
				None => self.run_node(dep)?,
			};
			inputs.insert(dep.clone(), value);
		}

		let hooks_enabled = self.validate_globally && node.validate_enabled;

		if hooks_enabled {
			for hook in &node.pre_funcs {
				hook(&mut inputs)
					.map_err(|e| PipelineError::user_raised(name.clone(), Phase::Pre, e))?;
			}
		}

		let mut output = (node.func)(&inputs)
			.map_err(|e| PipelineError::user_raised(name.clone(), Phase::Func, e))?;

		if hooks_enabled {
			for hook in &node.post_funcs {
				hook(&mut output)
					.map_err(|e| PipelineError::user_raised(name.clone(), Phase::Post, e))?;
			}
		}

		self.cache.insert(name.clone(), output.clone());
		Ok(output)
	}
}

fn build_derived_node(name: NodeName, source: NodeName, extractor: OutputExtractor) -> Node {
	let func_source = source.clone();
	let func: crate::node::NodeFn = std::sync::Arc::new(move |inputs: &ValueMap| {
		let source_value = inputs.get(&func_source).ok_or_else(|| -> crate::errors::BoxError {
			format!("derived node missing its source node `{func_source}`").into()
		})?;
		let map: &OutputMap = source_value.downcast_ref().ok_or_else(|| -> crate::errors::BoxError {
			format!(
				"source node `{func_source}` did not return an output mapping (got {})",
				source_value.type_name()
			)
			.into()
		})?;
		match &extractor {
			OutputExtractor::Key(key) => map.get(key).cloned().ok_or_else(|| -> crate::errors::BoxError {
				format!("source node `{func_source}` output mapping has no key `{key}`").into()
			}),
			OutputExtractor::Func(f) => Ok(f(map)),
		}
	});

	Node {
		name,
		func,
		dependencies: vec![source],
		pre_funcs: Vec::new(),
		post_funcs: Vec::new(),
		validate_enabled: true,
		metadata: std::collections::BTreeMap::new(),
		description: None,
	}
}
