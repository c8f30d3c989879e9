use std::collections::{HashMap, HashSet};

use log::trace;

use crate::{
    common::Variable,
    frame::{Palette, Register},
};

use super::{graph::ID, liveness::LiveGraph, liveness::Usage, Error};

/// Outcome of one colouring attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coloring {
    Colored(HashMap<Variable, Register>),
    /// No register was left; spill this variable and try again.
    Spill(Variable),
}

type LiveID = ID;
type Degree = HashMap<LiveID, usize>;
type AdjList = HashMap<LiveID, HashSet<LiveID>>;
type SelectStack = Vec<LiveID>;
type Colors = HashMap<LiveID, Register>;
type Class = HashSet<LiveID>;

/// Registers each node may take. Spilled variables only hold a register
/// between their load or store and the instruction next to it, so once the
/// palette is taken they may also use the scratch registers.
struct Classes<'a> {
    palette: &'a [Register],
    memory: Vec<Register>,
    spilled: Class,
}

impl<'a> Classes<'a> {
    fn new(interference: &LiveGraph, palette: &'a Palette, spilled: &HashSet<Variable>) -> Self {
        Self {
            palette: palette.registers(),
            memory: palette
                .registers()
                .iter()
                .chain(palette.scratch())
                .copied()
                .collect(),
            spilled: interference
                .graph_ref()
                .nodes()
                .iter()
                .map(|node| node.id())
                .filter(|&id| spilled.contains(interference.temp(id)))
                .collect(),
        }
    }

    fn is_spilled(&self, id: LiveID) -> bool {
        self.spilled.contains(&id)
    }

    fn registers(&self, id: LiveID) -> &[Register] {
        if self.is_spilled(id) {
            &self.memory
        } else {
            self.palette
        }
    }

    fn k(&self, id: LiveID) -> usize {
        self.registers(id).len()
    }
}

/// Colours `interference` with `palette`.
///
/// Only variables that are not in `spilled` are ever proposed for spilling.
/// When a spilled variable finds no register, an unspilled variable is
/// spilled instead to make room; if none is left the graph cannot be
/// coloured at all.
pub fn color(
    interference: &LiveGraph,
    palette: &Palette,
    usage: &Usage,
    spilled: &HashSet<Variable>,
) -> Result<Coloring, Error> {
    if palette.is_empty() {
        return Err(Error::EmptyPalette);
    }

    let graph = interference.graph_ref();
    for node in graph.nodes() {
        if graph.has_edge(node.id(), node.id()) {
            return Err(Error::SelfInterference(node.val().clone()));
        }
    }

    let classes = Classes::new(interference, palette, spilled);
    let adj_list = build(interference);
    let select_stack = select(interference, &adj_list, &classes, usage);

    let mut colors = Colors::new();
    let node = match assign_colors(interference, &select_stack, &adj_list, &classes, &mut colors) {
        Ok(()) => {
            return Ok(Coloring::Colored(
                colors
                    .into_iter()
                    .map(|(id, register)| (interference.temp(id).clone(), register))
                    .collect(),
            ))
        }
        Err(node) => node,
    };

    let temp = interference.temp(node).clone();
    if !classes.is_spilled(node) {
        trace!("no register left for {}", temp);
        return Ok(Coloring::Spill(temp));
    }

    let victim = make_room(interference, &adj_list, &classes, usage, node)
        .ok_or_else(|| Error::NoSpillCandidate(temp.clone()))?;
    let victim = interference.temp(victim).clone();
    trace!("no register left for spilled {}, spilling {}", temp, victim);
    Ok(Coloring::Spill(victim))
}

fn build(interference: &LiveGraph) -> AdjList {
    let graph = interference.graph_ref();
    graph
        .nodes()
        .iter()
        .map(|node| {
            let id = node.id();
            (id, graph.adj(id).filter(|other| *other != id).collect())
        })
        .collect()
}

/// Simplify with optimistic spilling. Returns the select stack, bottom first.
fn select(
    interference: &LiveGraph,
    adj_list: &AdjList,
    classes: &Classes,
    usage: &Usage,
) -> SelectStack {
    let mut degree: Degree = adj_list.iter().map(|(id, adj)| (*id, adj.len())).collect();
    let mut remaining: Class = adj_list.keys().copied().collect();
    let mut select_stack = SelectStack::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let node = simplify(interference, &remaining, &degree, classes)
            .or_else(|| select_spill(interference, &remaining, &degree, classes, usage))
            .or_else(|| lowest_degree(interference, &remaining, &degree));
        let node = match node {
            Some(node) => node,
            None => break,
        };

        remaining.remove(&node);
        for adj in &adj_list[&node] {
            if remaining.contains(adj) {
                if let Some(d) = degree.get_mut(adj) {
                    *d -= 1;
                }
            }
        }
        select_stack.push(node);
    }

    select_stack
}

fn by_degree_then_name<'a>(
    interference: &'a LiveGraph,
    degree: &'a Degree,
) -> impl Fn(&LiveID, &LiveID) -> std::cmp::Ordering + 'a {
    move |a, b| {
        degree[a]
            .cmp(&degree[b])
            .then_with(|| interference.temp(*a).cmp(interference.temp(*b)))
    }
}

/// Lowest-degree node with fewer neighbours than registers, ties broken by
/// name.
fn simplify(
    interference: &LiveGraph,
    remaining: &Class,
    degree: &Degree,
    classes: &Classes,
) -> Option<LiveID> {
    remaining
        .iter()
        .copied()
        .filter(|&id| degree[&id] < classes.k(id))
        .min_by(by_degree_then_name(interference, degree))
}

/// `argmax(degree - usage)` over the variables not spilled yet, ties broken
/// by lowest name.
fn select_spill(
    interference: &LiveGraph,
    remaining: &Class,
    degree: &Degree,
    classes: &Classes,
    usage: &Usage,
) -> Option<LiveID> {
    let cost = |id: &LiveID| {
        let used = usage.get(interference.temp(*id)).copied().unwrap_or(0);
        degree[id] as i64 - used as i64
    };

    let node = remaining
        .iter()
        .copied()
        .filter(|&id| !classes.is_spilled(id))
        .max_by(|a, b| {
            cost(a)
                .cmp(&cost(b))
                .then_with(|| interference.temp(*b).cmp(interference.temp(*a)))
        })?;
    trace!(
        "optimistically pushing {} with degree {}",
        interference.temp(node),
        degree[&node]
    );
    Some(node)
}

/// Only spilled variables are left and none of them can be simplified.
fn lowest_degree(interference: &LiveGraph, remaining: &Class, degree: &Degree) -> Option<LiveID> {
    remaining
        .iter()
        .copied()
        .min_by(by_degree_then_name(interference, degree))
}

/// Pops the stack, giving each node the first register of its class none of
/// its coloured neighbours holds. Fails with the first node that cannot be
/// coloured.
fn assign_colors(
    interference: &LiveGraph,
    select_stack: &SelectStack,
    adj_list: &AdjList,
    classes: &Classes,
    colors: &mut Colors,
) -> Result<(), LiveID> {
    for &node in select_stack.iter().rev() {
        let taken: HashSet<Register> = adj_list[&node]
            .iter()
            .filter_map(|adj| colors.get(adj).copied())
            .collect();

        let register = classes
            .registers(node)
            .iter()
            .copied()
            .find(|register| !taken.contains(register))
            .ok_or(node)?;

        trace!("{} -> {}", interference.temp(node), register);
        colors.insert(node, register);
    }
    Ok(())
}

/// The most used unspilled variable, preferring neighbours of `node`, ties
/// broken by lowest name.
fn make_room(
    interference: &LiveGraph,
    adj_list: &AdjList,
    classes: &Classes,
    usage: &Usage,
    node: LiveID,
) -> Option<LiveID> {
    let unspilled = |id: &LiveID| !classes.is_spilled(*id);
    let used = |id: &LiveID| usage.get(interference.temp(*id)).copied().unwrap_or(0);
    let most_used = |a: &LiveID, b: &LiveID| {
        used(a)
            .cmp(&used(b))
            .then_with(|| interference.temp(*b).cmp(interference.temp(*a)))
    };

    adj_list[&node]
        .iter()
        .copied()
        .filter(unspilled)
        .max_by(most_used)
        .or_else(|| adj_list.keys().copied().filter(unspilled).max_by(most_used))
}

#[cfg(test)]
mod tests {
    use super::*;

    type SpilledNodes = HashSet<Variable>;

    fn var(name: &str) -> Variable {
        Variable::new(name)
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<(Variable, Variable)> {
        pairs.iter().map(|(a, b)| (var(a), var(b))).collect()
    }

    fn usage(pairs: &[(&str, usize)]) -> Usage {
        pairs.iter().map(|(name, n)| (var(name), *n)).collect()
    }

    #[test]
    fn test_color_path() {
        let graph = LiveGraph::from_edges([], &edges(&[("a", "b"), ("b", "c")]));
        let palette = Palette::with_size(2).unwrap();

        let colors = match color(&graph, &palette, &Usage::new(), &SpilledNodes::new()).unwrap() {
            Coloring::Colored(colors) => colors,
            Coloring::Spill(v) => panic!("unexpected spill of {}", v),
        };
        assert_eq!(colors.len(), 3);
        assert_ne!(colors[&var("a")], colors[&var("b")]);
        assert_ne!(colors[&var("b")], colors[&var("c")]);
        assert!(colors.values().all(|r| palette.registers().contains(r)));
    }

    #[test]
    fn test_spill_when_graph_needs_more_colors() {
        // a = 1; b = 2; c = a + b with a single register.
        let graph = LiveGraph::from_edges([var("c")], &edges(&[("a", "b")]));
        let palette = Palette::with_size(1).unwrap();
        let usage = usage(&[("a", 1), ("b", 1)]);

        assert_eq!(
            color(&graph, &palette, &usage, &SpilledNodes::new()).unwrap(),
            Coloring::Spill(var("a"))
        );
    }

    #[test]
    fn test_spill_prefers_high_degree_low_usage() {
        // 4-clique, K = 2. d is pushed first, so colouring gives up on a
        // before it ever reaches d.
        let graph = LiveGraph::from_edges(
            [],
            &edges(&[("a", "b"), ("b", "c"), ("c", "a"), ("d", "a"), ("d", "b"), ("d", "c")]),
        );
        let palette = Palette::with_size(2).unwrap();
        let usage = usage(&[("a", 5), ("b", 5), ("c", 5), ("d", 0)]);

        assert_eq!(
            color(&graph, &palette, &usage, &SpilledNodes::new()).unwrap(),
            Coloring::Spill(var("a"))
        );
    }

    #[test]
    fn test_spilled_variables_overflow_into_scratch_registers() {
        let graph = LiveGraph::from_edges([var("c")], &edges(&[("a", "b")]));
        let palette = Palette::with_size(1).unwrap();
        let spilled = SpilledNodes::from([var("a")]);

        let colors = match color(&graph, &palette, &Usage::new(), &spilled).unwrap() {
            Coloring::Colored(colors) => colors,
            Coloring::Spill(v) => panic!("unexpected spill of {}", v),
        };
        assert_eq!(colors[&var("a")], Register::T7);
        assert_eq!(colors[&var("b")], Register::S0);
        assert_eq!(colors[&var("c")], Register::S0);
    }

    #[test]
    fn test_spilled_variables_prefer_palette_registers() {
        let graph = LiveGraph::from_edges([], &edges(&[("a", "b"), ("b", "c")]));
        let palette = Palette::with_size(2).unwrap();
        let spilled: SpilledNodes = ["a", "b", "c"].into_iter().map(var).collect();

        let colors = match color(&graph, &palette, &Usage::new(), &spilled).unwrap() {
            Coloring::Colored(colors) => colors,
            Coloring::Spill(v) => panic!("unexpected spill of {}", v),
        };
        assert!(colors.values().all(|r| palette.registers().contains(r)));
        assert_ne!(colors[&var("a")], colors[&var("b")]);
        assert_ne!(colors[&var("b")], colors[&var("c")]);
    }

    #[test]
    fn test_spilled_variable_without_register_spills_a_neighbour() {
        // a..e are spilled and all live at once, f is live with a, g is
        // unrelated. K = 1 leaves four registers for the clique.
        let graph = LiveGraph::from_edges(
            [var("g")],
            &edges(&[
                ("a", "b"),
                ("a", "c"),
                ("a", "d"),
                ("a", "e"),
                ("b", "c"),
                ("b", "d"),
                ("b", "e"),
                ("c", "d"),
                ("c", "e"),
                ("d", "e"),
                ("a", "f"),
            ]),
        );
        let palette = Palette::with_size(1).unwrap();
        let spilled: SpilledNodes = ["a", "b", "c", "d", "e"].into_iter().map(var).collect();
        let usage = usage(&[("f", 1), ("g", 9)]);

        assert_eq!(
            color(&graph, &palette, &usage, &spilled).unwrap(),
            Coloring::Spill(var("f"))
        );

        // Without f, g is the only variable left in a register.
        let graph = LiveGraph::from_edges(
            [var("g")],
            &edges(&[
                ("a", "b"),
                ("a", "c"),
                ("a", "d"),
                ("a", "e"),
                ("b", "c"),
                ("b", "d"),
                ("b", "e"),
                ("c", "d"),
                ("c", "e"),
                ("d", "e"),
            ]),
        );
        assert_eq!(
            color(&graph, &palette, &usage, &spilled).unwrap(),
            Coloring::Spill(var("g"))
        );
    }

    #[test]
    fn test_no_spill_candidate() {
        let graph = LiveGraph::from_edges(
            [],
            &edges(&[
                ("a", "b"),
                ("a", "c"),
                ("a", "d"),
                ("a", "e"),
                ("b", "c"),
                ("b", "d"),
                ("b", "e"),
                ("c", "d"),
                ("c", "e"),
                ("d", "e"),
            ]),
        );
        let palette = Palette::with_size(1).unwrap();
        let spilled: SpilledNodes = ["a", "b", "c", "d", "e"].into_iter().map(var).collect();

        assert_eq!(
            color(&graph, &palette, &Usage::new(), &spilled),
            Err(Error::NoSpillCandidate(var("a")))
        );

        // A fifth register is enough.
        let palette = Palette::with_size(2).unwrap();
        assert!(matches!(
            color(&graph, &palette, &Usage::new(), &spilled),
            Ok(Coloring::Colored(_))
        ));
    }

    #[test]
    fn test_fatal_configurations() {
        let graph = LiveGraph::from_edges([var("a")], &[]);
        let empty = Palette::new([]).unwrap();
        assert_eq!(
            color(&graph, &empty, &Usage::new(), &SpilledNodes::new()),
            Err(Error::EmptyPalette)
        );

        let graph = LiveGraph::from_edges([], &edges(&[("a", "a")]));
        assert_eq!(
            color(&graph, &Palette::default(), &Usage::new(), &SpilledNodes::new()),
            Err(Error::SelfInterference(var("a")))
        );
    }
}
