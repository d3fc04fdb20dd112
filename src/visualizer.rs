use std::fmt::{self, Display, Formatter};
use std::fs;
use std::io;
use std::ops::Deref;

#[derive(Clone)]
pub struct Edge<N, W> {
    pub from: Node<N>,
    pub to: Node<N>,
    pub weight: W,
    pub kind: EdgeKind,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EdgeKind {
    /// Pushes or pops a field
    Field,
    Epsilon,
}

#[derive(Clone)]
pub struct Node<N> {
    pub inner: N,
    pub id: usize,
    /// Allocation states are drawn as boxes
    pub seed: bool,
}

impl<N> Deref for Node<N> {
    type Target = N;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<N: Display> Display for Node<N> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

pub trait Graph {
    type Node: Display + Clone;
    type Weight: Display + Clone;

    fn nodes(&self) -> Vec<Node<Self::Node>>;
    fn edges(&self) -> Vec<Edge<Self::Node, Self::Weight>>;
}

impl<'a, T, N, W> dot::Labeller<'a, Node<N>, Edge<N, W>> for (&T,)
where
    T: Graph<Node = N, Weight = W>,
    N: Display,
    W: Display,
{
    fn graph_id(&'a self) -> dot::Id<'a> {
        dot::Id::new("Field_Automata").unwrap()
    }

    fn node_id(&'a self, n: &Node<N>) -> dot::Id<'a> {
        dot::Id::new(format!("n{}", n.id)).unwrap()
    }

    fn node_label(&'a self, n: &Node<N>) -> dot::LabelText<'a> {
        dot::LabelText::label(n.inner.to_string())
    }

    fn node_shape(&'a self, n: &Node<N>) -> Option<dot::LabelText<'a>> {
        n.seed.then(|| dot::LabelText::label("box"))
    }

    fn edge_label(&'a self, e: &Edge<N, W>) -> dot::LabelText<'a> {
        match e.kind {
            EdgeKind::Field => dot::LabelText::label(e.weight.to_string()),
            EdgeKind::Epsilon => dot::LabelText::label(""),
        }
    }

    fn edge_style(&'a self, e: &Edge<N, W>) -> dot::Style {
        match e.kind {
            EdgeKind::Field => dot::Style::Solid,
            EdgeKind::Epsilon => dot::Style::Dashed,
        }
    }
}

impl<'a, T, N, W> dot::GraphWalk<'a, Node<N>, Edge<N, W>> for (&T,)
where
    T: Graph<Node = N, Weight = W>,
    N: Clone,
    W: Clone,
{
    fn nodes(&'a self) -> dot::Nodes<'a, Node<N>> {
        Graph::nodes(self.0).into()
    }

    fn edges(&'a self) -> dot::Edges<'a, Edge<N, W>> {
        Graph::edges(self.0).into()
    }

    fn source(&'a self, edge: &Edge<N, W>) -> Node<N> {
        edge.from.clone()
    }

    fn target(&'a self, edge: &Edge<N, W>) -> Node<N> {
        edge.to.clone()
    }
}

pub fn render(graph: &impl Graph) -> io::Result<String> {
    let mut buf = vec![];
    dot::render(&(graph,), &mut buf)?;
    let out = String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    // Improves compatibility
    Ok(out.replace("][", " "))
}

pub fn visualize(graph: &impl Graph, path: &str) -> io::Result<()> {
    fs::write(path, render(graph)?)
}
