//! Errors we may encounter while building or running a pipeline

use std::{error::Error, fmt::Display};

use crate::labels::NodeName;

/// The opaque error type a node's `func` or a hook may return.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// The phase a user-raised error occurred in, for [`PipelineError::UserRaised`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	/// One of the node's `pre_funcs` raised.
	Pre,
	/// The node's own `func` raised.
	Func,
	/// One of the node's `post_funcs` raised.
	Post,
}

impl Display for Phase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Pre => write!(f, "pre"),
			Self::Func => write!(f, "func"),
			Self::Post => write!(f, "post"),
		}
	}
}

/// Everything that can go wrong while building or running a [`crate::Pipeline`].
#[derive(Debug)]
pub enum PipelineError {
	/// A name, dependency list, or output set was malformed.
	InvalidArgument(String),

	/// Replacing or removing a node that still has dependents, or adding
	/// a node whose derived outputs collide with an existing name.
	Conflict(String),

	/// A graph edit would have introduced a cycle.
	Cycle {
		/// The node whose addition would have closed the cycle.
		node: NodeName,
	},

	/// A required virtual input was not supplied to `execute`.
	MissingInput {
		/// The virtual inputs that were required but absent from `inputs`.
		names: Vec<NodeName>,
	},

	/// A requested output can't be produced from the supplied roots,
	/// bypasses, and virtual inputs.
	UnreachableOutput {
		/// The output that couldn't be reached.
		name: NodeName,
	},

	/// A node's `func` or one of its hooks raised.
	UserRaised {
		/// The node that was executing when the error occurred.
		node: NodeName,
		/// Which part of the node was running.
		phase: Phase,
		/// The underlying error.
		source: BoxError,
	},
}

impl PipelineError {
	pub(crate) fn user_raised(node: NodeName, phase: Phase, source: BoxError) -> Self {
		Self::UserRaised {
			node,
			phase,
			source,
		}
	}
}

impl Display for PipelineError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
			Self::Conflict(msg) => write!(f, "conflict: {msg}"),
			Self::Cycle { node } => {
				write!(f, "adding `{node}` would introduce a cycle")
			}
			Self::MissingInput { names } => {
				write!(f, "missing required input(s): ")?;
				for (i, name) in names.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "`{name}`")?;
				}
				Ok(())
			}
			Self::UnreachableOutput { name } => {
				write!(f, "output `{name}` is not reachable from the supplied inputs")
			}
			Self::UserRaised {
				node,
				phase,
				source,
			} => {
				write!(f, "node `{node}` raised during `{phase}`: {source}")
			}
		}
	}
}

impl Error for PipelineError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::UserRaised { source, .. } => Some(source.as_ref()),
			_ => None,
		}
	}
}
