use std::fmt::{self, Debug, Display, Formatter};

use crate::program::{Icfg, Instruction, Program, Type};
use crate::solver::{Direction, Node};

/// Seed of one solver. Forward queries start at an allocation site and ask
/// where the object flows; backward queries ask where a value was allocated.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Query {
    Forward { node: Node, ty: Option<Type> },
    Backward { node: Node, ty: Option<Type> },
}

impl Query {
    /// Forward query for the allocation at `node`, typed after its `new`.
    pub fn allocation(program: &Program, node: Node) -> Self {
        let ty = match program.instruction_at(&node.stmt) {
            Some(Instruction::New { ty, .. }) => Some(ty.clone()),
            _ => None,
        };
        Self::Forward { node, ty }
    }

    pub fn backward(node: Node) -> Self {
        Self::Backward { node, ty: None }
    }

    pub fn node(&self) -> &Node {
        match self {
            Self::Forward { node, .. } | Self::Backward { node, .. } => node,
        }
    }

    pub fn ty(&self) -> Option<&Type> {
        match self {
            Self::Forward { ty, .. } | Self::Backward { ty, .. } => ty.as_ref(),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Forward { .. } => Direction::Forward,
            Self::Backward { .. } => Direction::Backward,
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward { .. })
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Forward { node, ty: Some(ty) } => write!(f, "FQ{node}:{ty}"),
            Self::Forward { node, ty: None } => write!(f, "FQ{node}"),
            Self::Backward { node, .. } => write!(f, "BQ{node}"),
        }
    }
}

impl Debug for Query {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}
