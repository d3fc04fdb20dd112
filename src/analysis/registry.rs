use std::rc::Rc;

use bitvec::vec::BitVec;
use indexmap::{IndexMap, IndexSet};
use log::trace;

use super::Query;
use crate::program::{Icfg, Program, Reversed, Type};
use crate::solver::{Direction, ReachableMethodListener, SolverEvent, SyncSolver};

/// One solver per query, created on first use. Allocation types and
/// reachable-method listeners are shared by every solver, past and future.
pub struct SolverRegistry {
    program: Rc<Program>,
    reversed: Rc<Reversed<Rc<Program>>>,
    solvers: IndexMap<Query, SyncSolver>,
    /// Solvers whose propagation has been started
    started: BitVec,
    /// Solvers touched since their outbox was last drained
    dirty: BitVec,
    allocated_types: IndexSet<Type>,
    method_listeners: Vec<Rc<dyn ReachableMethodListener>>,
}

impl SolverRegistry {
    pub fn new(program: Rc<Program>) -> Self {
        Self {
            reversed: Rc::new(Reversed::new(program.clone())),
            program,
            solvers: IndexMap::new(),
            started: BitVec::new(),
            dirty: BitVec::new(),
            allocated_types: IndexSet::new(),
            method_listeners: vec![],
        }
    }

    /// Returns the index of the solver for `query`, creating it if needed.
    pub fn get_or_create(&mut self, query: &Query) -> usize {
        if let Some(index) = self.solvers.get_index_of(query) {
            return index;
        }

        let icfg: Rc<dyn Icfg> = match query.direction() {
            Direction::Forward => self.program.clone(),
            Direction::Backward => self.reversed.clone(),
        };
        let mut solver = SyncSolver::new(query.direction(), icfg, query.node().clone());
        for ty in &self.allocated_types {
            solver.add_allocated_type(ty.clone());
        }
        for listener in &self.method_listeners {
            solver.register_reachable_method_listener(listener.clone());
        }

        trace!("New solver for {query}");
        let (index, _) = self.solvers.insert_full(query.clone(), solver);
        self.started.push(false);
        self.dirty.push(true);

        if let Some(ty) = query.ty() {
            self.add_allocation_type(ty.clone());
        }
        index
    }

    /// Marks the solver as started. Returns `false` if it already was.
    pub fn start(&mut self, index: usize) -> bool {
        let started = self.started[index];
        self.started.set(index, true);
        !started
    }

    pub fn add_allocation_type(&mut self, ty: Type) -> bool {
        if !self.allocated_types.insert(ty.clone()) {
            return false;
        }
        for solver in self.solvers.values_mut() {
            solver.add_allocated_type(ty.clone());
        }
        true
    }

    pub fn register_reachable_method_listener(
        &mut self,
        listener: Rc<dyn ReachableMethodListener>,
    ) -> bool {
        if self
            .method_listeners
            .iter()
            .any(|l| Rc::ptr_eq(l, &listener))
        {
            return false;
        }
        for solver in self.solvers.values_mut() {
            solver.register_reachable_method_listener(listener.clone());
        }
        self.method_listeners.push(listener);
        true
    }

    pub fn index_of(&self, query: &Query) -> Option<usize> {
        self.solvers.get_index_of(query)
    }

    pub fn query(&self, index: usize) -> &Query {
        self.solvers
            .get_index(index)
            .map(|(query, _)| query)
            .unwrap_or_else(|| panic!("No solver with index {index}"))
    }

    pub fn get(&self, query: &Query) -> Option<&SyncSolver> {
        self.solvers.get(query)
    }

    pub fn solver(&self, index: usize) -> &SyncSolver {
        &self.solvers[index]
    }

    /// Mutable access to a solver; its new events are picked up by the next
    /// call to `drain_events`.
    pub fn solver_mut(&mut self, index: usize) -> &mut SyncSolver {
        self.dirty.set(index, true);
        &mut self.solvers[index]
    }

    pub fn drain_events(&mut self) -> Vec<(usize, SolverEvent)> {
        let dirty: Vec<usize> = self.dirty.iter_ones().collect();
        self.dirty.fill(false);
        let mut events = vec![];
        for index in dirty {
            events.extend(
                self.solvers[index]
                    .drain_events()
                    .into_iter()
                    .map(|e| (index, e)),
            );
        }
        events
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Query, &SyncSolver)> {
        self.solvers.iter()
    }

    pub fn allocated_types(&self) -> &IndexSet<Type> {
        &self.allocated_types
    }

    pub fn len(&self) -> usize {
        self.solvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solvers.is_empty()
    }
}
