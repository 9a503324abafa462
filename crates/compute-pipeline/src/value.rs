//! The type-erased value carried between nodes.
//!
//! A node's `func` may return any value; the engine never inspects it
//! unless the node was declared with `outputs`. We store each value behind
//! `Arc<dyn Any>` so cloning it into the cache and into downstream input
//! maps is cheap, and so we never have to know a node's return type at
//! graph-construction time.

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An opaque value produced by a node, a hook, or supplied by the caller.
#[derive(Clone)]
pub struct Value {
	data: Arc<dyn Any + Send + Sync>,
	type_name: &'static str,
	debug: Arc<str>,
}

impl Value {
	/// Wrap `value`. The debug representation is captured once, eagerly,
	/// so `print_summary` and the DOT exporter can render a value without
	/// the embedder supplying a formatter later.
	pub fn new<T: Any + Send + Sync + fmt::Debug>(value: T) -> Self {
		let debug: Arc<str> = format!("{value:?}").into();
		Self {
			type_name: type_name::<T>(),
			debug,
			data: Arc::new(value),
		}
	}

	/// Borrow the contained value if it is a `T`.
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.data.downcast_ref::<T>()
	}

	/// Clone the contained value out if it is a `T`.
	pub fn downcast<T: Any + Clone>(&self) -> Option<T> {
		self.downcast_ref::<T>().cloned()
	}

	/// The `std::any::type_name` of the wrapped value, for diagnostics only.
	pub fn type_name(&self) -> &'static str {
		self.type_name
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.debug)
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.debug)
	}
}

/// The mapping a node's `func` and hooks see: dependency name to value.
pub type ValueMap = BTreeMap<crate::labels::NodeName, Value>;

/// The mapping a multi-output node's `func` must return to be indexed by
/// `outputs`.
pub type OutputMap = BTreeMap<String, Value>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn downcast_succeeds_for_matching_type() {
		let v = Value::new(42_i64);
		assert_eq!(v.downcast::<i64>(), Some(42));
	}

	#[test]
	fn downcast_fails_for_mismatched_type() {
		let v = Value::new(42_i64);
		assert_eq!(v.downcast::<String>(), None);
		assert!(v.downcast_ref::<String>().is_none());
	}

	#[test]
	fn clone_is_cheap_and_shares_the_debug_string() {
		let v = Value::new(vec![1, 2, 3]);
		let cloned = v.clone();
		assert_eq!(format!("{v:?}"), format!("{cloned:?}"));
		assert_eq!(cloned.downcast::<Vec<i32>>(), Some(vec![1, 2, 3]));
	}

	#[test]
	fn type_name_reports_the_wrapped_type() {
		let v = Value::new(String::from("hi"));
		assert!(v.type_name().contains("String"));
	}
}
