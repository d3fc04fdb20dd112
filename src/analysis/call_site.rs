use indexmap::IndexSet;

use super::Query;
use crate::program::{Statement, Value};
use crate::solver::INode;

/// A value returned at a call site by `query`, through automaton state
/// `state`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FlowSource {
    pub query: Query,
    pub returned: Value,
    pub state: INode,
}

/// `value` of `by_passing` flows around the call and must be unified with
/// the value returned by `flow`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Activation {
    pub flow: FlowSource,
    pub by_passing: Query,
    pub value: Value,
}

/// Correlates values bypassing a call edge with allocations returned out of
/// the callee.
pub struct CallSitePoi {
    pub call_site: Statement,
    pub return_site: Statement,
    flow_source_to_base: IndexSet<(FlowSource, Query)>,
    by_passing: IndexSet<(Query, Value)>,
}

impl CallSitePoi {
    pub fn new(call_site: Statement, return_site: Statement) -> Self {
        Self {
            call_site,
            return_site,
            flow_source_to_base: IndexSet::new(),
            by_passing: IndexSet::new(),
        }
    }

    pub fn add_by_passing_allocation(&mut self, query: Query, value: Value) -> Vec<Activation> {
        if !self.by_passing.insert((query.clone(), value.clone())) {
            return vec![];
        }
        self.flow_source_to_base
            .iter()
            .filter(|(_, base)| *base == query)
            .filter_map(|(flow, _)| activation(flow, &query, &value))
            .collect()
    }

    pub fn add_flow_allocation(&mut self, flow: FlowSource, base: Query) -> Vec<Activation> {
        if !self.flow_source_to_base.insert((flow.clone(), base.clone())) {
            return vec![];
        }
        self.by_passing
            .iter()
            .filter(|(query, _)| *query == base)
            .filter_map(|(query, value)| activation(&flow, query, value))
            .collect()
    }

    pub fn by_passing_values(&self) -> impl Iterator<Item = &(Query, Value)> {
        self.by_passing.iter()
    }
}

/// Pairing a query with itself would only restate its own flow.
fn activation(flow: &FlowSource, by_passing: &Query, value: &Value) -> Option<Activation> {
    (flow.query != *by_passing).then(|| Activation {
        flow: flow.clone(),
        by_passing: by_passing.clone(),
        value: value.clone(),
    })
}
