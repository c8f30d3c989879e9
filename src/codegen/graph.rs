use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ID(usize);

#[derive(Debug, Clone)]
pub struct Node<T> {
    id: ID,
    val: T,
    succ: HashSet<ID>,
    pred: HashSet<ID>,
}

impl<T> Node<T> {
    pub fn val(&self) -> &T {
        &self.val
    }

    pub fn id(&self) -> ID {
        self.id
    }

    fn new(val: T, id: ID) -> Self {
        Node {
            id,
            val,
            succ: HashSet::new(),
            pred: HashSet::new(),
        }
    }

    pub fn succ(&self) -> impl Iterator<Item = ID> + '_ {
        self.succ.iter().copied()
    }

    pub fn pred(&self) -> impl Iterator<Item = ID> + '_ {
        self.pred.iter().copied()
    }

    /// Neighbours in either direction.
    pub fn adj(&self) -> impl Iterator<Item = ID> + '_ {
        self.succ.union(&self.pred).copied()
    }
}

impl<T> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Node<T> {}

/// Arena graph: nodes are never removed, so an `ID` stays valid for the
/// lifetime of the graph.
#[derive(Debug, Clone)]
pub struct Graph<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Graph<T> {
    pub fn new() -> Self {
        Graph { nodes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Graph {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn get(&self, id: ID) -> &Node<T> {
        &self.nodes[id.0]
    }

    pub fn insert(&mut self, val: T) -> ID {
        let id = self.nodes.len();
        self.nodes.push(Node::new(val, ID(id)));
        ID(id)
    }

    /// Adds the edge `from -> to`. Returns false if it already existed.
    pub fn link(&mut self, from: ID, to: ID) -> bool {
        let inserted = self.nodes[from.0].succ.insert(to);
        let inserted_pred = self.nodes[to.0].pred.insert(from);
        assert_eq!(inserted, inserted_pred);
        inserted
    }

    /// Adds an undirected edge, stored as a pair of directed ones.
    pub fn double_link(&mut self, a: ID, b: ID) {
        self.link(a, b);
        self.link(b, a);
    }

    pub fn succ(&self, id: ID) -> impl Iterator<Item = ID> + '_ {
        self.nodes[id.0].succ()
    }

    pub fn pred(&self, id: ID) -> impl Iterator<Item = ID> + '_ {
        self.nodes[id.0].pred()
    }

    pub fn adj(&self, id: ID) -> impl Iterator<Item = ID> + '_ {
        self.nodes[id.0].adj()
    }

    pub fn has_edge(&self, from: ID, to: ID) -> bool {
        self.nodes[from.0].succ.contains(&to)
    }

    pub fn nodes(&self) -> &[Node<T>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
