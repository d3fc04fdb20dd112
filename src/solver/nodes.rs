use std::fmt::{self, Debug, Display, Formatter};

use crate::program::{Field, Statement, Value};

/// A value at a program point.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    pub stmt: Statement,
    pub value: Value,
}

impl Node {
    pub fn new(stmt: Statement, value: Value) -> Self {
        Self { stmt, value }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.stmt, self.value.name)
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

/// State of a field automaton.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum INode {
    Single(Node),
    /// Accepting state of the solver seeded at this node
    Alloc(Node),
    Generated { node: Node, field: Field },
}

impl INode {
    pub fn fact(&self) -> &Node {
        match self {
            Self::Single(node) | Self::Alloc(node) | Self::Generated { node, .. } => node,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated { .. })
    }
}

impl Display for INode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Single(node) => write!(f, "{node}"),
            Self::Alloc(node) => write!(f, "alloc{node}"),
            Self::Generated { node, field } => write!(f, "{node}.{field}"),
        }
    }
}

impl Debug for INode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

/// State of a call automaton.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallState {
    Single(Value),
    /// Empty call stack of the solver seeded with this value
    Initial(Value),
    /// Callee frame entered at `location`
    Generated { value: Value, location: Statement },
}

impl CallState {
    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated { .. })
    }
}

impl Display for CallState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Single(value) => write!(f, "{value}"),
            Self::Initial(value) => write!(f, "init({value})"),
            Self::Generated { value, location } => write!(f, "{value}@{location}"),
        }
    }
}

impl Debug for CallState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}
