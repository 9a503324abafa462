//! A computational pipeline engine.
//!
//! Build a directed acyclic graph of named computation steps, inject
//! external values for unbound dependencies, skip steps by supplying
//! precomputed values, execute the minimal subgraph needed to produce
//! requested outputs, run validation hooks around each step, and
//! introspect or export the graph for visualization.
//!
//! This crate is deliberately domain-agnostic: it knows nothing about what
//! a node computes. The intended use is as the execution core underneath a
//! larger system (for example, assembling the stages of a simulation or an
//! ETL job) whose domain-specific steps are registered as [`node::NodeConfig`]s.
//!
//! ```
//! use compute_pipeline::{NodeConfig, Pipeline, Value};
//!
//! let mut pipeline = Pipeline::new();
//! pipeline
//!     .add_node(NodeConfig::new("a", |_inputs| Ok(Value::new(1_i64))))
//!     .unwrap()
//!     .add_node(NodeConfig::new("b", |inputs| {
//!         let a: i64 = inputs.get("a").and_then(|v| v.downcast()).unwrap_or(0);
//!         Ok(Value::new(a + 1))
//!     }).dependency("a"))
//!     .unwrap();
//!
//! let result = pipeline.execute(None, Default::default()).unwrap();
//! assert_eq!(result.get("b").unwrap().downcast::<i64>(), Some(2));
//! ```
//!
//! ## Non-goals
//!
//! No parallel or distributed execution (one computation context per
//! `execute` call, run to completion on the calling thread), no
//! persistence of pipeline definitions or results across runs, and no
//! automatic type checking of node inputs/outputs — validation is explicit
//! via hooks.

mod dot;
mod errors;
mod graph;
mod labels;
mod node;
mod pipeline;
mod value;

pub use errors::{BoxError, Phase, PipelineError};
pub use labels::NodeName;
pub use node::{Node, NodeConfig, NodeFn, OutputExtractor, Outputs, PostHook, PreHook};
pub use pipeline::Pipeline;
pub use value::{OutputMap, Value, ValueMap};
