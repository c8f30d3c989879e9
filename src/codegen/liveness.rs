use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;
use log::trace;

use crate::{
    common::Variable,
    ir::{Error, LiveSet, Program},
};

use super::{
    flow::FlowGraph,
    graph::{Graph, ID},
};

/// Number of instructions that use each variable.
pub type Usage = HashMap<Variable, usize>;

/// Fills in `live_in`/`live_out` of every instruction in `flow` and builds the
/// interference graph from the result.
pub fn analyze(program: &mut Program, flow: &FlowGraph) -> Result<(LiveGraph, Usage), Error> {
    live_sets(program, flow)?;

    let live_graph = LiveGraph::build(program, flow)?;
    let usage = usage(program, flow)?;

    Ok((live_graph, usage))
}

fn live_sets(program: &mut Program, flow: &FlowGraph) -> Result<(), Error> {
    for block in flow.blocks() {
        for instruction in program.get_mut(block)?.instructions_mut() {
            instruction.clear_liveness();
        }
    }

    let mut passes = 0;
    let mut has_change = true;
    while has_change {
        has_change = false;
        passes += 1;

        for block in flow.blocks().rev() {
            let mut out = LiveSet::new();
            for succ in flow.succ(block) {
                if let Some(first) = program.get(succ)?.instructions().first() {
                    out.extend(first.live_in().iter().cloned());
                }
            }

            for instruction in program.get_mut(block)?.instructions_mut().iter_mut().rev() {
                has_change |= instruction.update_liveness(out);
                out = instruction.live_in().clone();
            }
        }
    }

    trace!("liveness reached a fixed point after {} passes", passes);
    Ok(())
}

fn usage(program: &Program, flow: &FlowGraph) -> Result<Usage, Error> {
    let mut usage = Usage::new();
    for block in flow.blocks() {
        for instruction in program.get(block)?.instructions() {
            for variable in instruction.used() {
                *usage.entry(variable.clone()).or_insert(0) += 1;
            }
        }
    }
    Ok(usage)
}

pub type Node = Variable;

/// Interference graph. Every edge is stored in both directions.
#[derive(Debug)]
pub struct LiveGraph {
    graph: Graph<Node>,
    temp2id: HashMap<Node, ID>,
}

impl LiveGraph {
    pub fn graph_ref(&self) -> &Graph<Node> {
        &self.graph
    }

    pub fn id(&self, temp: &Node) -> Option<ID> {
        self.temp2id.get(temp).copied()
    }

    pub fn temp(&self, id: ID) -> &Node {
        self.graph.get(id).val()
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Variables in insertion order, which is sorted by name.
    pub fn variables(&self) -> impl Iterator<Item = &Node> {
        self.graph.nodes().iter().map(|node| node.val())
    }

    pub fn interferes(&self, a: &Node, b: &Node) -> bool {
        match (self.id(a), self.id(b)) {
            (Some(a), Some(b)) => self.graph.has_edge(a, b),
            _ => false,
        }
    }

    /// Sorted neighbours of `temp`.
    pub fn adjacent(&self, temp: &Node) -> Vec<&Node> {
        self.id(temp)
            .into_iter()
            .flat_map(|id| self.graph.adj(id))
            .map(|id| self.temp(id))
            .sorted()
            .collect()
    }

    /// Builds a graph from explicit edges. Unlike liveness-derived graphs,
    /// nothing stops `(v, v)` from being added here.
    pub fn from_edges<I>(variables: I, edges: &[(Node, Node)]) -> Self
    where
        I: IntoIterator<Item = Node>,
    {
        let mut temps: BTreeSet<Node> = variables.into_iter().collect();
        for (a, b) in edges {
            temps.insert(a.clone());
            temps.insert(b.clone());
        }

        let mut live_graph = Self::with_temps(temps);
        for (a, b) in edges {
            let (a, b) = (live_graph.temp2id[a], live_graph.temp2id[b]);
            live_graph.graph.double_link(a, b);
        }
        live_graph
    }

    fn with_temps(temps: BTreeSet<Node>) -> Self {
        let mut graph = Graph::with_capacity(temps.len());
        let mut temp2id = HashMap::new();
        for temp in temps {
            let id = graph.insert(temp.clone());
            temp2id.insert(temp, id);
        }
        LiveGraph { graph, temp2id }
    }

    fn build(program: &Program, flow: &FlowGraph) -> Result<Self, Error> {
        let mut temps = BTreeSet::new();
        for block in flow.blocks() {
            for instruction in program.get(block)?.instructions() {
                temps.extend(instruction.defined().iter().cloned());
                temps.extend(instruction.live_in().iter().cloned());
            }
        }

        let mut live_graph = Self::with_temps(temps);
        for block in flow.blocks() {
            for instruction in program.get(block)?.instructions() {
                for (a, b) in instruction.live_in().iter().tuple_combinations() {
                    live_graph.interfere(a, b);
                }
                for def in instruction.defined() {
                    for live in instruction.live_out() {
                        if live != def {
                            live_graph.interfere(def, live);
                        }
                    }
                }
            }
        }

        Ok(live_graph)
    }

    fn interfere(&mut self, a: &Node, b: &Node) {
        let from = self.temp2id[a];
        let to = self.temp2id[b];
        self.graph.double_link(from, to);
    }

    /// Graphviz rendering, one undirected edge per interfering pair.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("graph interference {\n");
        for node in self.graph.nodes() {
            dot.push_str(&format!("    \"{}\";\n", node.val()));
        }
        for node in self.graph.nodes() {
            let a = node.val();
            for b in self.adjacent(a) {
                if a < b {
                    dot.push_str(&format!("    \"{}\" -- \"{}\";\n", a, b));
                }
            }
        }
        dot.push_str("}\n");
        dot
    }
}
