use std::rc::Rc;

use super::{Instruction, Method, Statement, Value};

/// Interprocedural control-flow graph as seen by a solver.
///
/// "Successors" follow the direction of the analysis: the reversed view swaps
/// successors with predecessors and start points with end points.
pub trait Icfg {
    fn successors_of(&self, stmt: &Statement) -> Vec<Statement>;
    fn predecessors_of(&self, stmt: &Statement) -> Vec<Statement>;
    fn method_of(&self, stmt: &Statement) -> Method;
    fn instruction_at(&self, stmt: &Statement) -> Option<&Instruction>;
    /// Statements where flow enters `method`.
    fn start_points_of(&self, method: &Method) -> Vec<Statement>;
    /// Statements where flow leaves `method`.
    fn end_points_of(&self, method: &Method) -> Vec<Statement>;
    fn callees_of(&self, call_site: &Statement) -> Vec<Method>;
    fn callers_of(&self, method: &Method) -> Vec<Statement>;
    fn parameters_of(&self, method: &Method) -> Vec<Value>;

    fn is_end_point(&self, stmt: &Statement) -> bool {
        self.end_points_of(&self.method_of(stmt)).contains(stmt)
    }
}

impl<I: Icfg + ?Sized> Icfg for Rc<I> {
    fn successors_of(&self, stmt: &Statement) -> Vec<Statement> {
        (**self).successors_of(stmt)
    }

    fn predecessors_of(&self, stmt: &Statement) -> Vec<Statement> {
        (**self).predecessors_of(stmt)
    }

    fn method_of(&self, stmt: &Statement) -> Method {
        (**self).method_of(stmt)
    }

    fn instruction_at(&self, stmt: &Statement) -> Option<&Instruction> {
        (**self).instruction_at(stmt)
    }

    fn start_points_of(&self, method: &Method) -> Vec<Statement> {
        (**self).start_points_of(method)
    }

    fn end_points_of(&self, method: &Method) -> Vec<Statement> {
        (**self).end_points_of(method)
    }

    fn callees_of(&self, call_site: &Statement) -> Vec<Method> {
        (**self).callees_of(call_site)
    }

    fn callers_of(&self, method: &Method) -> Vec<Statement> {
        (**self).callers_of(method)
    }

    fn parameters_of(&self, method: &Method) -> Vec<Value> {
        (**self).parameters_of(method)
    }
}

/// Reversed-edges view used by backward solvers.
pub struct Reversed<I> {
    inner: I,
}

impl<I: Icfg> Reversed<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I: Icfg> Icfg for Reversed<I> {
    fn successors_of(&self, stmt: &Statement) -> Vec<Statement> {
        self.inner.predecessors_of(stmt)
    }

    fn predecessors_of(&self, stmt: &Statement) -> Vec<Statement> {
        self.inner.successors_of(stmt)
    }

    fn method_of(&self, stmt: &Statement) -> Method {
        self.inner.method_of(stmt)
    }

    fn instruction_at(&self, stmt: &Statement) -> Option<&Instruction> {
        self.inner.instruction_at(stmt)
    }

    fn start_points_of(&self, method: &Method) -> Vec<Statement> {
        self.inner.end_points_of(method)
    }

    fn end_points_of(&self, method: &Method) -> Vec<Statement> {
        self.inner.start_points_of(method)
    }

    fn callees_of(&self, call_site: &Statement) -> Vec<Method> {
        self.inner.callees_of(call_site)
    }

    fn callers_of(&self, method: &Method) -> Vec<Statement> {
        self.inner.callers_of(method)
    }

    fn parameters_of(&self, method: &Method) -> Vec<Value> {
        self.inner.parameters_of(method)
    }
}
