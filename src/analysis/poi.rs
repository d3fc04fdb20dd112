use std::fmt::{self, Display, Formatter};

use hashbrown::{HashMap, HashSet};
use indexmap::IndexSet;

use super::Query;
use crate::program::{Field, Statement, Value};
use crate::solver::Node;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PoiKind {
    /// `base.field = value`
    Write,
    /// `value = base.field`
    Read,
}

/// A field access instruction, the key of its point of indirection.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldAccess {
    pub kind: PoiKind,
    pub stmt: Statement,
    pub base: Value,
    pub field: Field,
    pub value: Value,
}

impl FieldAccess {
    /// The stored or loaded value at the access.
    pub fn node(&self) -> Node {
        Node::new(self.stmt.clone(), self.value.clone())
    }
}

impl Display for FieldAccess {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.kind {
            PoiKind::Write => write!(
                f,
                "{}: {}.{} = {}",
                self.stmt, self.base.name, self.field, self.value.name
            ),
            PoiKind::Read => write!(
                f,
                "{}: {} = {}.{}",
                self.stmt, self.value.name, self.base.name, self.field
            ),
        }
    }
}

/// Joins the queries explaining the base of a field access with the queries
/// explaining the value written or read.
pub struct FieldPoi {
    pub access: FieldAccess,
    base_allocations: IndexSet<Query>,
    flow_allocations: IndexSet<Query>,
    aliases: HashMap<Query, HashSet<Value>>,
}

impl FieldPoi {
    pub fn new(access: FieldAccess) -> Self {
        Self {
            access,
            base_allocations: IndexSet::new(),
            flow_allocations: IndexSet::new(),
            aliases: HashMap::new(),
        }
    }

    /// Records `query` as an allocation of the base pointer. Returns the new
    /// (base, flow) pairs that must execute.
    pub fn add_base_allocation(&mut self, query: Query) -> Vec<(Query, Query)> {
        if !self.base_allocations.insert(query.clone()) {
            return vec![];
        }
        self.flow_allocations
            .iter()
            .filter(|flow| self.executes(flow))
            .map(|flow| (query.clone(), flow.clone()))
            .collect()
    }

    pub fn add_flow_allocation(&mut self, query: Query) -> Vec<(Query, Query)> {
        if !self.flow_allocations.insert(query.clone()) || !self.executes(&query) {
            return vec![];
        }
        self.base_allocations
            .iter()
            .map(|base| (base.clone(), query.clone()))
            .collect()
    }

    /// Writes import aliases forward, reads backward. The other pairings
    /// carry information the flow query already propagates itself.
    pub fn executes(&self, flow: &Query) -> bool {
        match self.access.kind {
            PoiKind::Write => flow.is_forward(),
            PoiKind::Read => !flow.is_forward(),
        }
    }

    /// Returns `true` the first time `alias` is imported for `flow`.
    pub fn add_alias(&mut self, flow: &Query, alias: Value) -> bool {
        self.aliases.entry(flow.clone()).or_default().insert(alias)
    }

    pub fn base_allocations(&self) -> &IndexSet<Query> {
        &self.base_allocations
    }

    pub fn flow_allocations(&self) -> &IndexSet<Query> {
        &self.flow_allocations
    }
}
