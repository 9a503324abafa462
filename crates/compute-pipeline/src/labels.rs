//! Name types used throughout the engine

use smartstring::{LazyCompact, SmartString};
use std::fmt::Display;

/// The name of a node, a virtual input, or both (they share one namespace).
///
/// Cheap to clone: small names are stored inline, larger ones are heap
/// allocated once and shared.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeName {
	x: SmartString<LazyCompact>,
}

impl NodeName {
	/// Make a new node name
	pub fn new(name: &str) -> Self {
		Self { x: name.into() }
	}

	/// This name as a `&str`
	pub fn as_str(&self) -> &str {
		&self.x
	}

	/// Is this name empty or made up entirely of whitespace?
	pub fn is_blank(&self) -> bool {
		self.x.trim().is_empty()
	}
}

impl Display for NodeName {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.x.fmt(f)
	}
}

impl From<&str> for NodeName {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for NodeName {
	fn from(value: String) -> Self {
		Self { x: value.into() }
	}
}

impl From<&String> for NodeName {
	fn from(value: &String) -> Self {
		Self::new(value)
	}
}

impl From<NodeName> for String {
	fn from(value: NodeName) -> Self {
		value.x.to_string()
	}
}

impl std::borrow::Borrow<str> for NodeName {
	fn borrow(&self) -> &str {
		&self.x
	}
}
