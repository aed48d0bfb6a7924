// SPDX-License-Identifier: MIT

//! Workflow analyzer (spec §4.7): builds a causal graph of
//! probe/generator/detector/llm_response/vulnerability nodes, either live
//! from parser events or post-hoc from a completed report's JSON-Lines
//! entries. In-memory per scan; cleared on explicit request.

use parking_lot::Mutex;
use std::collections::HashMap;
use vg_core::{ProgressEvent, ReportEntry, ScanId};
use vg_wire::graph::{EdgeKind, GraphEdge, GraphNode, NodeKind, Severity, WorkflowGraph};

#[derive(Default)]
struct ProbeAccumulator {
    node_id: String,
    passed: u32,
    failed: u32,
}

/// Builds one [`WorkflowGraph`] incrementally; call [`Self::finish`] to
/// materialize vulnerability nodes once all attempts are seen.
#[derive(Default)]
pub struct GraphBuilder {
    graph: WorkflowGraph,
    probes: HashMap<String, ProbeAccumulator>,
    generator_emitted: bool,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn probe_node(&mut self, probe_classname: &str) -> String {
        if let Some(acc) = self.probes.get(probe_classname) {
            return acc.node_id.clone();
        }
        let node_id = format!("probe:{probe_classname}");
        self.graph.nodes.push(GraphNode {
            id: node_id.clone(),
            kind: NodeKind::Probe,
            label: probe_classname.to_string(),
            severity: None,
        });
        self.probes.insert(
            probe_classname.to_string(),
            ProbeAccumulator {
                node_id: node_id.clone(),
                passed: 0,
                failed: 0,
            },
        );
        node_id
    }

    fn generator_node(&mut self, target_name: &str) -> String {
        let node_id = format!("generator:{target_name}");
        if !self.generator_emitted {
            self.graph.nodes.push(GraphNode {
                id: node_id.clone(),
                kind: NodeKind::Generator,
                label: target_name.to_string(),
                severity: None,
            });
            self.generator_emitted = true;
        }
        node_id
    }

    /// Feeds one live parser event (spec §4.7 "may run live").
    pub fn apply_event(&mut self, target_name: &str, event: &ProgressEvent) {
        if let ProgressEvent::CurrentProbe { probe, .. } = event {
            let generator_id = self.generator_node(target_name);
            let probe_id = self.probe_node(probe);
            self.graph.edges.push(GraphEdge {
                from: generator_id,
                to: probe_id,
                kind: EdgeKind::Prompt,
            });
        }
    }

    /// Feeds one report entry (spec §4.7 "rebuilt post-hoc").
    pub fn apply_entry(&mut self, target_name: &str, entry: &ReportEntry) {
        if entry.entry_type != "attempt" {
            return;
        }
        let Some(probe_classname) = entry.probe_classname() else {
            return;
        };
        let generator_id = self.generator_node(target_name);
        let probe_id = self.probe_node(probe_classname);
        self.graph.edges.push(GraphEdge {
            from: generator_id,
            to: probe_id.clone(),
            kind: EdgeKind::Prompt,
        });

        let response_id = format!("response:{probe_classname}:{}", self.graph.nodes.len());
        self.graph.nodes.push(GraphNode {
            id: response_id.clone(),
            kind: NodeKind::LlmResponse,
            label: "response".to_string(),
            severity: None,
        });
        self.graph.edges.push(GraphEdge {
            from: probe_id.clone(),
            to: response_id.clone(),
            kind: EdgeKind::Response,
        });

        let detector_id = format!("detector:{probe_classname}");
        if !self.graph.nodes.iter().any(|n| n.id == detector_id) {
            self.graph.nodes.push(GraphNode {
                id: detector_id.clone(),
                kind: NodeKind::Detector,
                label: probe_classname.to_string(),
                severity: None,
            });
        }
        self.graph.edges.push(GraphEdge {
            from: response_id,
            to: detector_id,
            kind: EdgeKind::Detection,
        });

        match entry.attempt_status() {
            Some(2) => {
                if let Some(acc) = self.probes.get_mut(probe_classname) {
                    acc.passed += 1;
                }
            }
            Some(1) => {
                if let Some(acc) = self.probes.get_mut(probe_classname) {
                    acc.failed += 1;
                }
            }
            _ => {}
        }
    }

    /// Materializes vulnerability nodes for any probe whose `passed < total`
    /// (spec §4.7 severity rule).
    pub fn finish(mut self) -> WorkflowGraph {
        for (probe_classname, acc) in &self.probes {
            let total = acc.passed + acc.failed;
            if acc.passed < total {
                let severity = if acc.failed > total / 2 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                let vuln_id = format!("vulnerability:{probe_classname}");
                self.graph.nodes.push(GraphNode {
                    id: vuln_id.clone(),
                    kind: NodeKind::Vulnerability,
                    label: format!("{probe_classname} ({}/{} failed)", acc.failed, total),
                    severity: Some(severity),
                });
                self.graph.edges.push(GraphEdge {
                    from: acc.node_id.clone(),
                    to: vuln_id,
                    kind: EdgeKind::Chain,
                });
            }
        }
        self.graph
    }
}

/// Renders a graph as a Mermaid flowchart (spec §4.7 "exports as JSON or
/// Mermaid diagram text").
pub fn to_mermaid(graph: &WorkflowGraph) -> String {
    let mut out = String::from("flowchart LR\n");
    for node in &graph.nodes {
        let shape = match node.kind {
            NodeKind::Vulnerability => format!("{}{{\"{}\"}}", node.id, node.label),
            _ => format!("{}[\"{}\"]", node.id, node.label),
        };
        out.push_str(&format!("    {shape}\n"));
    }
    for edge in &graph.edges {
        out.push_str(&format!("    {} --> {}\n", edge.from, edge.to));
    }
    out
}

/// In-memory per-scan graph store; cleared on explicit request (spec §4.7).
#[derive(Default)]
pub struct WorkflowGraphs {
    by_scan: Mutex<HashMap<ScanId, WorkflowGraph>>,
}

impl WorkflowGraphs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, scan_id: ScanId, graph: WorkflowGraph) {
        self.by_scan.lock().insert(scan_id, graph);
    }

    pub fn get(&self, scan_id: ScanId) -> Option<WorkflowGraph> {
        self.by_scan.lock().get(&scan_id).cloned()
    }

    pub fn clear(&self, scan_id: ScanId) {
        self.by_scan.lock().remove(&scan_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(probe: &str, status: i64) -> ReportEntry {
        let line = format!(r#"{{"entry_type":"attempt","probe_classname":"{probe}","status":{status}}}"#);
        ReportEntry::parse_line(&line).unwrap()
    }

    #[test]
    fn failing_majority_yields_high_severity() {
        let mut builder = GraphBuilder::new();
        builder.apply_entry("llama3.2:3b", &attempt("dan.Dan_11_0", 1));
        builder.apply_entry("llama3.2:3b", &attempt("dan.Dan_11_0", 1));
        builder.apply_entry("llama3.2:3b", &attempt("dan.Dan_11_0", 2));
        let graph = builder.finish();
        let vuln = graph
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Vulnerability)
            .unwrap();
        assert_eq!(vuln.severity, Some(Severity::High));
    }

    #[test]
    fn all_passed_yields_no_vulnerability_node() {
        let mut builder = GraphBuilder::new();
        builder.apply_entry("llama3.2:3b", &attempt("dan.Dan_11_0", 2));
        let graph = builder.finish();
        assert!(!graph.nodes.iter().any(|n| n.kind == NodeKind::Vulnerability));
    }

    #[test]
    fn mermaid_export_includes_every_node() {
        let mut builder = GraphBuilder::new();
        builder.apply_entry("llama3.2:3b", &attempt("dan.Dan_11_0", 1));
        let graph = builder.finish();
        let mermaid = to_mermaid(&graph);
        assert!(mermaid.starts_with("flowchart LR"));
        for node in &graph.nodes {
            assert!(mermaid.contains(&node.id));
        }
    }
}
