//! End-to-end scenarios exercising the public API as a whole: graph
//! construction, bypass/virtual-input classification, cycle rejection,
//! multi-output expansion, subgraph extraction, and hook failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use compute_pipeline::{NodeConfig, Outputs, Pipeline, PipelineError, Value};

fn get_i64(outputs: &HashMap<compute_pipeline::NodeName, Value>, name: &str) -> i64 {
	outputs.get(name).and_then(|v| v.downcast::<i64>()).unwrap()
}

#[test]
fn linear_chain() {
	let mut p = Pipeline::new();
	p.add_node(NodeConfig::new("a", |_| Ok(Value::new(1_i64)))).unwrap();
	p.add_node(NodeConfig::new("b", |inputs| {
		let a: i64 = inputs.get("a").and_then(|v| v.downcast()).unwrap();
		Ok(Value::new(a + 1))
	}).dependency("a"))
	.unwrap();
	p.add_node(NodeConfig::new("c", |inputs| {
		let b: i64 = inputs.get("b").and_then(|v| v.downcast()).unwrap();
		Ok(Value::new(b * 2))
	}).dependency("b"))
	.unwrap();

	let names = vec!["c".into()];
	let result = p.execute(Some(&names), HashMap::new()).unwrap();
	assert_eq!(get_i64(&result, "c"), 4);

	// c is the sole leaf, so no explicit outputs yields the same result.
	let result = p.execute(None, HashMap::new()).unwrap();
	assert_eq!(get_i64(&result, "c"), 4);
}

#[test]
fn virtual_input() {
	let mut p = Pipeline::new();
	p.add_node(NodeConfig::new("b", |inputs| {
		let a: i64 = inputs.get("a").and_then(|v| v.downcast()).unwrap();
		Ok(Value::new(a + 1))
	}).dependency("a"))
	.unwrap();

	assert_eq!(p.get_virtual_inputs(), ["a".into()].into_iter().collect());

	let outputs = vec!["b".into()];
	let inputs = HashMap::from([("a".into(), Value::new(10_i64))]);
	let result = p.execute(Some(&outputs), inputs).unwrap();
	assert_eq!(get_i64(&result, "b"), 11);

	let err = p.execute(Some(&outputs), HashMap::new()).unwrap_err();
	assert!(matches!(err, PipelineError::MissingInput { .. }));
}

#[test]
fn bypass_skips_upstream_computation() {
	let calls = Arc::new(AtomicUsize::new(0));
	let a_calls = calls.clone();

	let mut p = Pipeline::new();
	p.add_node(NodeConfig::new("a", move |_| {
		a_calls.fetch_add(1, Ordering::SeqCst);
		Ok(Value::new(1_i64))
	}))
	.unwrap();
	p.add_node(NodeConfig::new("b", |inputs| {
		let a: i64 = inputs.get("a").and_then(|v| v.downcast()).unwrap();
		Ok(Value::new(a + 1))
	}).dependency("a"))
	.unwrap();
	p.add_node(NodeConfig::new("c", |inputs| {
		let b: i64 = inputs.get("b").and_then(|v| v.downcast()).unwrap();
		Ok(Value::new(b * 2))
	}).dependency("b"))
	.unwrap();

	let outputs = vec!["c".into()];
	let inputs = HashMap::from([("b".into(), Value::new(100_i64))]);
	let result = p.execute(Some(&outputs), inputs).unwrap();
	assert_eq!(get_i64(&result, "c"), 200);
	assert_eq!(calls.load(Ordering::SeqCst), 0, "a's function must not run when b is bypassed");
}

#[test]
fn cycle_detection_leaves_pipeline_untouched() {
	let mut p = Pipeline::new();
	p.add_node(NodeConfig::new("a", |_| Ok(Value::new(1_i64))).dependency("b"))
		.unwrap();

	let err = p
		.add_node(NodeConfig::new("b", |_| Ok(Value::new(1_i64))).dependency("a"))
		.unwrap_err();
	assert!(matches!(err, PipelineError::Cycle { .. }));

	assert!(p.get_node(&"a".into()).is_some());
	assert!(p.get_node(&"b".into()).is_none());
	assert!(p.is_virtual_input(&"b".into()));
}

#[test]
fn multi_output_expansion() {
	let mut p = Pipeline::new();
	p.add_node(
		NodeConfig::new("stats", |_| {
			let mut map = compute_pipeline::OutputMap::new();
			map.insert("mean".into(), Value::new(2.0_f64));
			map.insert("std".into(), Value::new(0.5_f64));
			Ok(Value::new(map))
		})
		.outputs(Outputs::names(["mean", "std"])),
	)
	.unwrap();
	p.add_node(
		NodeConfig::new("cv", |inputs| {
			let mean: f64 = inputs.get("mean").and_then(|v| v.downcast()).unwrap();
			let std: f64 = inputs.get("std").and_then(|v| v.downcast()).unwrap();
			Ok(Value::new(std / mean))
		})
		.dependencies(["mean", "std"]),
	)
	.unwrap();

	let outputs = vec!["cv".into()];
	let result = p.execute(Some(&outputs), HashMap::new()).unwrap();
	let cv = result.get("cv").and_then(|v| v.downcast::<f64>()).unwrap();
	assert!((cv - 0.25).abs() < f64::EPSILON);
}

#[test]
fn subgraph_equivalence() {
	let mut p = Pipeline::new();
	p.add_node(NodeConfig::new("root", |_| Ok(Value::new(1_i64)))).unwrap();
	p.add_node(NodeConfig::new("b1", |inputs| {
		let r: i64 = inputs.get("root").and_then(|v| v.downcast()).unwrap();
		Ok(Value::new(r + 10))
	}).dependency("root"))
	.unwrap();
	p.add_node(NodeConfig::new("b2", |inputs| {
		let r: i64 = inputs.get("root").and_then(|v| v.downcast()).unwrap();
		Ok(Value::new(r + 20))
	}).dependency("root"))
	.unwrap();

	let b1: compute_pipeline::NodeName = "b1".into();
	let mut sub = p.extract_subgraph(&[b1.clone()]).unwrap();
	assert!(sub.get_node(&b1).is_some());
	assert!(sub.get_node(&"b2".into()).is_none());

	let outputs = vec![b1.clone()];
	let full_result = p.execute(Some(&outputs), HashMap::new()).unwrap();
	let sub_result = sub.execute(Some(&outputs), HashMap::new()).unwrap();
	assert_eq!(get_i64(&full_result, "b1"), get_i64(&sub_result, "b1"));
}

#[test]
fn hook_failure_carries_node_and_phase() {
	let mut p = Pipeline::new();
	p.add_node(
		NodeConfig::new("n", |_| Ok(Value::new(-1_i64))).post_hook(|value| {
			let v: i64 = value.downcast().unwrap_or(0);
			if v < 0 {
				return Err("value must not be negative".into());
			}
			Ok(())
		}),
	)
	.unwrap();

	let outputs = vec!["n".into()];
	let err = p.execute(Some(&outputs), HashMap::new()).unwrap_err();
	match err {
		PipelineError::UserRaised { node, phase, .. } => {
			assert_eq!(node, "n".into());
			assert_eq!(phase, compute_pipeline::Phase::Post);
		}
		other => panic!("expected UserRaised, got {other:?}"),
	}
}

#[test]
fn promotion_of_a_virtual_input() {
	let mut p = Pipeline::new();
	p.add_node(NodeConfig::new("b", |inputs| {
		let a: i64 = inputs.get("a").and_then(|v| v.downcast()).unwrap();
		Ok(Value::new(a + 1))
	}).dependency("a"))
	.unwrap();
	assert!(p.is_virtual_input(&"a".into()));

	p.add_node(NodeConfig::new("a", |_| Ok(Value::new(7_i64)))).unwrap();
	assert!(p.get_virtual_inputs().is_empty());

	let outputs = vec!["b".into()];
	let result = p.execute(Some(&outputs), HashMap::new()).unwrap();
	assert_eq!(get_i64(&result, "b"), 8);
}

#[test]
fn remove_node_keeps_an_upstream_real_node_as_a_leaf() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_max_level(tracing::Level::DEBUG)
		.try_init();

	let mut p = Pipeline::new();
	p.add_node(NodeConfig::new("a", |_| Ok(Value::new(1_i64)))).unwrap();
	p.add_node(NodeConfig::new("b", |inputs| {
		let a: i64 = inputs.get("a").and_then(|v| v.downcast()).unwrap();
		Ok(Value::new(a + 1))
	}).dependency("a"))
	.unwrap();

	p.remove_node(&"b".into()).unwrap();

	// `a` had no other dependents and no dependencies of its own, but it is
	// a registered node, not a virtual input — it must survive as a leaf.
	assert!(p.get_node(&"a".into()).is_some());
	assert!(p.list_nodes().contains(&"a".into()));

	let outputs = vec!["a".into()];
	let result = p.execute(Some(&outputs), HashMap::new()).unwrap();
	assert_eq!(get_i64(&result, "a"), 1);
}

#[test]
fn replacing_a_node_drops_its_stale_dependency_edges() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_max_level(tracing::Level::DEBUG)
		.try_init();

	let mut p = Pipeline::new();
	p.add_node(NodeConfig::new("b", |inputs| {
		let x: i64 = inputs.get("x").and_then(|v| v.downcast()).unwrap();
		Ok(Value::new(x + 1))
	}).dependency("x"))
	.unwrap();
	assert_eq!(p.get_virtual_inputs(), ["x".into()].into_iter().collect());

	// Replace `b` with a version that no longer depends on `x`.
	p.add_node(NodeConfig::new("b", |_| Ok(Value::new(2_i64)))).unwrap();

	assert!(p.get_node(&"b".into()).unwrap().dependencies().is_empty());
	assert!(
		p.get_virtual_inputs().is_empty(),
		"`x` should no longer be an ancestor of `b` once the dependency was dropped"
	);

	let outputs = vec!["b".into()];
	let result = p.execute(Some(&outputs), HashMap::new()).unwrap();
	assert_eq!(get_i64(&result, "b"), 2);
}
