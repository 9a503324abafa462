//! Visualization and introspection: DOT/PNG/SVG export and summaries.
//!
//! PNG and SVG export shell out to the `dot` binary (Graphviz); the engine
//! itself only builds the textual DOT description. If `dot` isn't on
//! `PATH`, those two methods fail with an `io::Error` of kind `NotFound`.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::labels::NodeName;
use crate::pipeline::Pipeline;

const COMPUTATION_FILL: &str = "#4f83cc"; // blue
const VIRTUAL_INPUT_FILL: &str = "#d4af37"; // gold
const HIGHLIGHT_FILL: &str = "#ff7f50"; // coral

impl Pipeline {
	/// Render this pipeline as a Graphviz DOT document.
	///
	/// Computation nodes are rounded boxes, virtual inputs are ellipses,
	/// `highlight` is rendered with an alternate (coral) fill, and
	/// metadata is rendered as supplementary italic label lines.
	pub fn to_dot(&self, highlight: &HashSet<NodeName>, legend: bool) -> String {
		let mut out = String::new();
		out.push_str("digraph pipeline {\n");
		out.push_str("  rankdir=LR;\n");
		out.push_str("  node [fontname=\"Helvetica\"];\n");

		for name in self.list_nodes() {
			let node = self.get_node(&name).expect("listed node exists");
			let fill = if highlight.contains(&name) {
				HIGHLIGHT_FILL
			} else {
				COMPUTATION_FILL
			};
			let label = node_label(&name, node);
			writeln!(
				out,
				"  \"{name}\" [shape=box, style=\"rounded,filled\", fillcolor=\"{fill}\", label=<{label}>];"
			)
			.unwrap();
		}

		for name in self.get_virtual_inputs() {
			let fill = if highlight.contains(&name) {
				HIGHLIGHT_FILL
			} else {
				VIRTUAL_INPUT_FILL
			};
			writeln!(
				out,
				"  \"{name}\" [shape=ellipse, style=filled, fillcolor=\"{fill}\"];"
			)
			.unwrap();
		}

		for name in self.list_nodes() {
			let node = self.get_node(&name).expect("listed node exists");
			for dep in node.dependencies() {
				writeln!(out, "  \"{dep}\" -> \"{name}\";").unwrap();
			}
		}

		if legend {
			out.push_str(&legend_subgraph());
		}

		out.push_str("}\n");
		out
	}

	/// Write the DOT description to `path`.
	pub fn write_dot(
		&self,
		path: impl AsRef<Path>,
		highlight: &HashSet<NodeName>,
		legend: bool,
	) -> io::Result<()> {
		std::fs::write(path, self.to_dot(highlight, legend))
	}

	/// Render and write an SVG via the `dot` binary.
	pub fn write_svg(
		&self,
		path: impl AsRef<Path>,
		highlight: &HashSet<NodeName>,
		legend: bool,
	) -> io::Result<()> {
		std::fs::write(path, self.render(highlight, legend, "svg")?)
	}

	/// Render and write a PNG via the `dot` binary.
	pub fn write_png(
		&self,
		path: impl AsRef<Path>,
		highlight: &HashSet<NodeName>,
		legend: bool,
	) -> io::Result<()> {
		std::fs::write(path, self.render(highlight, legend, "png")?)
	}

	/// Render to SVG bytes without writing a file; used by [`Pipeline::evcxr_display`].
	pub fn visualize(&self, highlight: &HashSet<NodeName>, legend: bool) -> io::Result<Vec<u8>> {
		self.render(highlight, legend, "svg")
	}

	fn render(&self, highlight: &HashSet<NodeName>, legend: bool, format: &str) -> io::Result<Vec<u8>> {
		let dot_source = self.to_dot(highlight, legend);

		let mut child = Command::new("dot")
			.arg(format!("-T{format}"))
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()?;

		child
			.stdin
			.take()
			.expect("stdin was piped")
			.write_all(dot_source.as_bytes())?;

		let output = child.wait_with_output()?;
		if !output.status.success() {
			let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
			return Err(io::Error::other(format!("`dot` failed: {stderr}")));
		}
		Ok(output.stdout)
	}

	/// A human-readable listing of nodes in topological order, with their
	/// dependencies, metadata, and hook counts.
	pub fn print_summary(&self) -> String {
		let mut out = String::new();
		writeln!(out, "pipeline ({} node(s)):", self.list_nodes().len()).unwrap();
		for name in self.list_nodes() {
			let node = self.get_node(&name).expect("listed node exists");
			write!(out, "  {name}").unwrap();
			if !node.dependencies().is_empty() {
				let deps: Vec<&str> = node.dependencies().iter().map(|d| d.as_str()).collect();
				write!(out, " <- [{}]", deps.join(", ")).unwrap();
			}
			writeln!(out).unwrap();
			if let Some(description) = node.description() {
				writeln!(out, "      \"{description}\"").unwrap();
			}
			if node.pre_hook_count() > 0 || node.post_hook_count() > 0 {
				writeln!(
					out,
					"      hooks: {} pre, {} post{}",
					node.pre_hook_count(),
					node.post_hook_count(),
					if node.validate_enabled() { "" } else { " (disabled)" }
				)
				.unwrap();
			}
			for (key, value) in node.metadata() {
				writeln!(out, "      {key} = {value:?}").unwrap();
			}
		}
		let virtual_inputs = self.get_virtual_inputs();
		if !virtual_inputs.is_empty() {
			let names: Vec<&str> = virtual_inputs.iter().map(|n| n.as_str()).collect();
			writeln!(out, "virtual inputs: [{}]", names.join(", ")).unwrap();
		}
		out
	}

	/// Rich-display hook recognized by the `evcxr` Jupyter kernel: when a
	/// pipeline is the trailing expression of a cell, `evcxr` calls this
	/// method (by name, no trait required) and renders the emitted mime
	/// block instead of the `Debug` output. A convenience, not a contract:
	/// nothing else in this crate depends on it, and it is a no-op print
	/// outside of `evcxr`.
	pub fn evcxr_display(&self) {
		match self.visualize(&HashSet::new(), false) {
			Ok(svg) => {
				println!(
					"EVCXR_BEGIN_CONTENT image/svg+xml\n{}\nEVCXR_END_CONTENT",
					String::from_utf8_lossy(&svg)
				);
			}
			Err(err) => {
				println!("EVCXR_BEGIN_CONTENT text/plain\n(failed to render pipeline: {err})\nEVCXR_END_CONTENT");
			}
		}
	}
}

fn node_label(name: &NodeName, node: &crate::node::Node) -> String {
	let mut label = format!("<b>{name}</b>");
	for (key, value) in node.metadata() {
		let _ = write!(label, "<br/><i>{key} = {value:?}</i>");
	}
	label
}

fn legend_subgraph() -> String {
	let mut out = String::new();
	out.push_str("  subgraph cluster_legend {\n");
	out.push_str("    label=\"legend\";\n");
	out.push_str("    style=dashed;\n");
	writeln!(
		out,
		"    legend_node [shape=box, style=\"rounded,filled\", fillcolor=\"{COMPUTATION_FILL}\", label=\"computation node\"];"
	)
	.unwrap();
	writeln!(
		out,
		"    legend_input [shape=ellipse, style=filled, fillcolor=\"{VIRTUAL_INPUT_FILL}\", label=\"virtual input\"];"
	)
	.unwrap();
	writeln!(
		out,
		"    legend_highlight [shape=box, style=\"rounded,filled\", fillcolor=\"{HIGHLIGHT_FILL}\", label=\"highlighted\"];"
	)
	.unwrap();
	out.push_str("  }\n");
	out
}
