//! Nodes: a single computation step plus its hooks and metadata

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::errors::BoxError;
use crate::labels::NodeName;
use crate::value::{OutputMap, Value, ValueMap};

/// A node's computation. Invoked at most once per `execute` call, with its
/// dependencies already bound by name.
pub type NodeFn = Arc<dyn Fn(&ValueMap) -> Result<Value, BoxError> + Send + Sync>;

/// A pre-hook: runs before `func`, over the gathered input mapping. May
/// mutate it; the mutated mapping is what `func` actually sees.
pub type PreHook = Arc<dyn Fn(&mut ValueMap) -> Result<(), BoxError> + Send + Sync>;

/// A post-hook: runs after `func`, over the produced value. May mutate it;
/// the mutated value is what gets cached and returned.
pub type PostHook = Arc<dyn Fn(&mut Value) -> Result<(), BoxError> + Send + Sync>;

/// A registered computation step.
#[derive(Clone)]
pub struct Node {
	pub(crate) name: NodeName,
	pub(crate) func: NodeFn,
	pub(crate) dependencies: Vec<NodeName>,
	pub(crate) pre_funcs: Vec<PreHook>,
	pub(crate) post_funcs: Vec<PostHook>,
	pub(crate) validate_enabled: bool,
	pub(crate) metadata: BTreeMap<String, Value>,
	pub(crate) description: Option<String>,
}

impl Debug for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Node")
			.field("name", &self.name)
			.field("dependencies", &self.dependencies)
			.field("pre_funcs", &self.pre_funcs.len())
			.field("post_funcs", &self.post_funcs.len())
			.field("validate_enabled", &self.validate_enabled)
			.field("metadata", &self.metadata)
			.field("description", &self.description)
			.finish()
	}
}

impl Node {
	/// This node's name.
	pub fn name(&self) -> &NodeName {
		&self.name
	}

	/// The names this node depends on, in declaration order.
	pub fn dependencies(&self) -> &[NodeName] {
		&self.dependencies
	}

	/// Whether this node will run its hooks, independent of the pipeline's
	/// global validation flag.
	pub fn validate_enabled(&self) -> bool {
		self.validate_enabled
	}

	/// This node's free-form metadata.
	pub fn metadata(&self) -> &BTreeMap<String, Value> {
		&self.metadata
	}

	/// This node's human description, if any.
	pub fn description(&self) -> Option<&str> {
		self.description.as_deref()
	}

	/// How many pre-hooks this node carries.
	pub fn pre_hook_count(&self) -> usize {
		self.pre_funcs.len()
	}

	/// How many post-hooks this node carries.
	pub fn post_hook_count(&self) -> usize {
		self.post_funcs.len()
	}
}

/// How a derived output is pulled out of a multi-output node's returned
/// [`OutputMap`].
#[derive(Clone)]
pub enum OutputExtractor {
	/// Extract the entry under this key.
	Key(String),
	/// Apply this callable to the whole map.
	Func(Arc<dyn Fn(&OutputMap) -> Value + Send + Sync>),
}

/// A declaration of the derived nodes a multi-output node should expand
/// into. See the `outputs` table in spec.md §4.1.
#[derive(Clone, Default)]
pub struct Outputs {
	pub(crate) entries: Vec<(NodeName, OutputExtractor)>,
}

impl Outputs {
	/// No derived outputs (the default).
	pub fn new() -> Self {
		Self::default()
	}

	/// A sequence of names: each derived node extracts the like-named key
	/// from the source's returned mapping.
	pub fn names<I, N>(names: I) -> Self
	where
		I: IntoIterator<Item = N>,
		N: Into<NodeName>,
	{
		let entries = names
			.into_iter()
			.map(|n| {
				let n = n.into();
				let key = n.as_str().to_owned();
				(n, OutputExtractor::Key(key))
			})
			.collect();
		Self { entries }
	}

	/// Add a derived node that extracts a specific key from the source's
	/// returned mapping.
	pub fn with_key(mut self, name: impl Into<NodeName>, key: impl Into<String>) -> Self {
		self.entries.push((name.into(), OutputExtractor::Key(key.into())));
		self
	}

	/// Add a derived node that applies `extract` to the source's returned
	/// mapping.
	pub fn with_func<F>(mut self, name: impl Into<NodeName>, extract: F) -> Self
	where
		F: Fn(&OutputMap) -> Value + Send + Sync + 'static,
	{
		self.entries
			.push((name.into(), OutputExtractor::Func(Arc::new(extract))));
		self
	}

	/// Is this declaration empty?
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// The parameters for [`crate::Pipeline::add_node`], built fluently.
///
/// ```
/// use compute_pipeline::NodeConfig;
///
/// let config = NodeConfig::new("b", |inputs| {
///     let a: i64 = inputs.get("a").and_then(|v| v.downcast()).unwrap_or(0);
///     Ok(compute_pipeline::Value::new(a + 1))
/// })
/// .dependency("a")
/// .description("adds one to a");
/// ```
pub struct NodeConfig {
	pub(crate) name: NodeName,
	pub(crate) func: NodeFn,
	pub(crate) dependencies: Vec<NodeName>,
	pub(crate) outputs: Outputs,
	pub(crate) pre_funcs: Vec<PreHook>,
	pub(crate) post_funcs: Vec<PostHook>,
	pub(crate) validate_enabled: bool,
	pub(crate) metadata: BTreeMap<String, Value>,
	pub(crate) description: Option<String>,
}

impl NodeConfig {
	/// Start configuring a node named `name`, computed by `func`.
	pub fn new<F>(name: impl Into<NodeName>, func: F) -> Self
	where
		F: Fn(&ValueMap) -> Result<Value, BoxError> + Send + Sync + 'static,
	{
		Self {
			name: name.into(),
			func: Arc::new(func),
			dependencies: Vec::new(),
			outputs: Outputs::new(),
			pre_funcs: Vec::new(),
			post_funcs: Vec::new(),
			validate_enabled: true,
			metadata: BTreeMap::new(),
			description: None,
		}
	}

	/// Add one dependency.
	pub fn dependency(mut self, name: impl Into<NodeName>) -> Self {
		self.dependencies.push(name.into());
		self
	}

	/// Add several dependencies, in order.
	pub fn dependencies<I, N>(mut self, names: I) -> Self
	where
		I: IntoIterator<Item = N>,
		N: Into<NodeName>,
	{
		self.dependencies.extend(names.into_iter().map(Into::into));
		self
	}

	/// Declare the derived output nodes this node's returned mapping should
	/// expand into.
	pub fn outputs(mut self, outputs: Outputs) -> Self {
		self.outputs = outputs;
		self
	}

	/// Add one pre-hook, run (in order added) before `func`.
	pub fn pre_hook<F>(mut self, hook: F) -> Self
	where
		F: Fn(&mut ValueMap) -> Result<(), BoxError> + Send + Sync + 'static,
	{
		self.pre_funcs.push(Arc::new(hook));
		self
	}

	/// Add one post-hook, run (in order added) after `func`.
	pub fn post_hook<F>(mut self, hook: F) -> Self
	where
		F: Fn(&mut Value) -> Result<(), BoxError> + Send + Sync + 'static,
	{
		self.post_funcs.push(Arc::new(hook));
		self
	}

	/// Disable this node's hooks regardless of the pipeline's global flag.
	pub fn without_validation(mut self) -> Self {
		self.validate_enabled = false;
		self
	}

	/// Attach one metadata tag.
	pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
		self.metadata.insert(key.into(), value);
		self
	}

	/// Attach a human description.
	pub fn description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	pub(crate) fn build(self) -> (Node, Outputs) {
		let node = Node {
			name: self.name,
			func: self.func,
			dependencies: self.dependencies,
			pre_funcs: self.pre_funcs,
			post_funcs: self.post_funcs,
			validate_enabled: self.validate_enabled,
			metadata: self.metadata,
			description: self.description,
		};
		(node, self.outputs)
	}
}
