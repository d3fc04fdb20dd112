use std::collections::VecDeque;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use hashbrown::{HashMap, HashSet};
use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};

mod call_site;
mod poi;
mod query;
mod registry;

pub use call_site::{Activation, CallSitePoi, FlowSource};
pub use poi::{FieldAccess, FieldPoi, PoiKind};
pub use query::Query;
pub use registry::SolverRegistry;

use crate::path_expression::{path_expression, Regex};
use crate::program::{Field, Icfg, Instruction, Program, Statement, Type, Value};
use crate::solver::{
    CallState, CallTransition, Direction, FieldTransition, INode, ListenerId, Node,
    ReachableMethodListener, SolverEvent, Subscription, SyncSolver, Transition,
};
use crate::visualizer::{Edge, EdgeKind, Graph, Node as VisualNode};

/// Reaction to empty-stack witnesses of backward queries spawned by the
/// analysis itself.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum WitnessPolicy {
    #[default]
    Ignore,
    Record,
}

/// When a forward query counts as the allocation of a field read's base.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ReadBaseRule {
    /// The base node reaches the seed under any field path
    #[default]
    SeedTransition,
    /// Only a direct epsilon transition into the seed
    EmptyFieldOnly,
}

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub witness_policy: WitnessPolicy,
    pub read_base_rule: ReadBaseRule,
    pub debug: bool,
}

/// Called when a backward query's value is reached by an allocation with an
/// empty field stack.
pub trait EmptyStackWitnessListener {
    fn witness_found(&self, query: &Query, alloc: &Node);
}

#[derive(Clone)]
enum WitnessListener {
    Client(Rc<dyn EmptyStackWitnessListener>),
    Record,
}

struct Ticket {
    query: Query,
    listener: WitnessListener,
}

#[derive(Clone, Debug)]
enum FieldListener {
    /// Waits for the base of a field access to be proven the seed itself.
    BaseAllocation { poi: usize },
    /// Imports the aliases of a base allocation at `base_stmt` into `flow`.
    ImportAliases {
        poi: usize,
        flow: usize,
        base_stmt: Statement,
        flow_stmts: Vec<Statement>,
    },
    Reach { visitor: usize },
}

#[derive(Clone, Debug)]
enum CallListener {
    UnbalancedFlow,
}

#[derive(Clone, Debug)]
enum ReachAction {
    /// Copy into `flow`, renaming `from` to `to`.
    Import {
        flow: usize,
        poi: usize,
        from: INode,
        to: INode,
        connect: bool,
    },
    FlowAllocation { call_site: usize, returned: Value },
    Splice { flow: usize },
    /// Marks the solver as a base allocation once the seed is reached.
    BaseAllocation { poi: usize },
}

/// Walks every transition reachable from a state, including future ones.
struct ReachVisitor {
    solver: usize,
    listener: ListenerId,
    visited: HashSet<INode>,
    action: ReachAction,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub forward_queries: usize,
    pub backward_queries: usize,
    pub field_pois: usize,
    pub imported_aliases: usize,
    pub call_site_pois: usize,
    pub activations: usize,
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "Forward queries: {}", self.forward_queries)?;
        writeln!(f, "Backward queries: {}", self.backward_queries)?;
        writeln!(f, "Field POIs: {}", self.field_pois)?;
        writeln!(f, "Imported aliases: {}", self.imported_aliases)?;
        writeln!(f, "Call site POIs: {}", self.call_site_pois)?;
        write!(f, "Call site activations: {}", self.activations)
    }
}

/// Demand-driven alias analysis. Every query gets its own solver; field
/// accesses and call sites connect the solvers with each other.
pub struct AliasAnalysis {
    program: Rc<Program>,
    config: Config,
    registry: SolverRegistry,
    queue: VecDeque<(usize, SolverEvent)>,
    field_listeners: Vec<FieldListener>,
    call_listeners: Vec<CallListener>,
    visitors: Vec<ReachVisitor>,
    field_pois: IndexMap<FieldAccess, FieldPoi>,
    call_site_pois: IndexMap<(Statement, Statement), CallSitePoi>,
    backward_to_forward: IndexMap<Query, IndexSet<Query>>,
    unbalanced_watch: HashSet<usize>,
    tickets: Vec<Ticket>,
    tickets_by_query: HashMap<Query, Vec<usize>>,
    witnesses: IndexSet<(Query, Node)>,
    imported_aliases: usize,
    activations: usize,
}

impl AliasAnalysis {
    pub fn new(program: Rc<Program>, config: Config) -> Self {
        Self {
            registry: SolverRegistry::new(program.clone()),
            program,
            config,
            queue: VecDeque::new(),
            field_listeners: vec![],
            call_listeners: vec![],
            visitors: vec![],
            field_pois: IndexMap::new(),
            call_site_pois: IndexMap::new(),
            backward_to_forward: IndexMap::new(),
            unbalanced_watch: HashSet::new(),
            tickets: vec![],
            tickets_by_query: HashMap::new(),
            witnesses: IndexSet::new(),
            imported_aliases: 0,
            activations: 0,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Solves `query` and everything it depends on to a fixpoint.
    pub fn solve(&mut self, query: Query) {
        match query.direction() {
            Direction::Forward => {
                self.forward_solve(&query);
            }
            Direction::Backward => {
                self.backward_solve(&query);
            }
        }
        self.run();
    }

    /// Solves a backward query and reports to `listener` every allocation
    /// reaching it with an empty field stack.
    pub fn add_backward_query(
        &mut self,
        query: Query,
        listener: Rc<dyn EmptyStackWitnessListener>,
    ) {
        self.backward_query(query, Some(WitnessListener::Client(listener)));
        self.run();
    }

    pub fn add_allocation_type(&mut self, ty: Type) -> bool {
        self.registry.add_allocation_type(ty)
    }

    pub fn register_reachable_method_listener(
        &mut self,
        listener: Rc<dyn ReachableMethodListener>,
    ) -> bool {
        self.registry.register_reachable_method_listener(listener)
    }

    pub fn forward_reachable_states(&self) -> IndexSet<Node> {
        self.registry
            .iter()
            .filter(|(query, _)| query.is_forward())
            .flat_map(|(_, solver)| solver.reached_states().iter().cloned())
            .collect()
    }

    pub fn solvers(&self) -> impl Iterator<Item = (&Query, &SyncSolver)> {
        self.registry.iter()
    }

    pub fn solver(&self, query: &Query) -> Option<&SyncSolver> {
        self.registry.get(query)
    }

    /// Forward queries whose object reaches the node of `query` with an
    /// empty field stack.
    pub fn allocation_sites(&self, query: &Query) -> Vec<Query> {
        self.registry
            .iter()
            .filter(|(q, solver)| q.is_forward() && solver.reaches_with_empty_stack(query.node()))
            .map(|(q, _)| q.clone())
            .collect()
    }

    /// Language of access paths relating `node` to the seed of `query`.
    pub fn access_path(&self, query: &Query, node: &Node) -> Option<Regex<Field>> {
        let solver = self.registry.get(query)?;
        Some(path_expression(
            solver.field_automaton(),
            &INode::Single(node.clone()),
            &solver.seed_state(),
        ))
    }

    pub fn witnesses(&self) -> &IndexSet<(Query, Node)> {
        &self.witnesses
    }

    pub fn field_pois(&self) -> impl Iterator<Item = &FieldPoi> {
        self.field_pois.values()
    }

    pub fn stats(&self) -> Stats {
        let forward_queries = self.registry.iter().filter(|(q, _)| q.is_forward()).count();
        Stats {
            forward_queries,
            backward_queries: self.registry.len() - forward_queries,
            field_pois: self.field_pois.len(),
            imported_aliases: self.imported_aliases,
            call_site_pois: self.call_site_pois.len(),
            activations: self.activations,
        }
    }

    pub fn debug_output(&self) {
        if !self.config.debug {
            return;
        }
        for (query, solver) in self.registry.iter() {
            debug!("{query}: {} reached nodes", solver.reached_states().len());
            for node in solver.reached_states() {
                debug!("  reached {node}");
            }
            for t in solver.field_automaton().transitions() {
                debug!("  field {t}");
            }
            for t in solver.call_automaton().transitions() {
                debug!("  call {t}");
            }
        }
        for poi in self.call_site_pois.values() {
            for (query, value) in poi.by_passing_values() {
                debug!("{} bypassed by {} of {query}", poi.call_site, value.name);
            }
        }
    }

    fn forward_solve(&mut self, query: &Query) -> usize {
        let index = self.registry.get_or_create(query);
        if !self.registry.start(index) {
            return index;
        }
        let seed = query.node().clone();
        if seed.stmt.index.is_none() {
            warn!("{query} starts at a synthetic statement");
            return index;
        }
        info!("Solving {query}");
        for succ in self.program.successors_of(&seed.stmt) {
            self.registry
                .solver_mut(index)
                .solve(Node::new(succ, seed.value.clone()));
        }
        index
    }

    fn backward_solve(&mut self, query: &Query) -> usize {
        let index = self.registry.get_or_create(query);
        if !self.registry.start(index) {
            return index;
        }
        let seed = query.node().clone();
        if seed.stmt.index.is_none() {
            warn!("{query} starts at a synthetic statement");
            return index;
        }
        info!("Solving {query}");
        for pred in self.program.predecessors_of(&seed.stmt) {
            self.registry
                .solver_mut(index)
                .solve(Node::new(pred, seed.value.clone()));
        }
        index
    }

    fn backward_query(&mut self, query: Query, listener: Option<WitnessListener>) {
        self.backward_solve(&query);
        let Some(listener) = listener else {
            return;
        };
        let ticket = self.tickets.len();
        self.tickets.push(Ticket {
            query: query.clone(),
            listener,
        });
        self.tickets_by_query
            .entry(query.clone())
            .or_default()
            .push(ticket);
        let forward: Vec<Query> = self
            .backward_to_forward
            .get(&query)
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default();
        for fq in forward {
            let index = self.registry.get_or_create(&fq);
            self.registry
                .solver_mut(index)
                .synched_empty_stack_reachable(query.node().clone(), ticket);
        }
    }

    /// Backward query started by the analysis for the base of a field access.
    fn spawn_backward_query(&mut self, query: Query) {
        if self.registry.index_of(&query).is_some() {
            return;
        }
        let listener = match self.config.witness_policy {
            WitnessPolicy::Ignore => None,
            WitnessPolicy::Record => Some(WitnessListener::Record),
        };
        self.backward_query(query, listener);
    }

    fn run(&mut self) {
        loop {
            self.queue.extend(self.registry.drain_events());
            let Some((index, event)) = self.queue.pop_front() else {
                break;
            };
            self.handle(index, event);
        }
    }

    fn handle(&mut self, index: usize, event: SolverEvent) {
        match event {
            SolverEvent::Reached(node) => {
                if self.registry.query(index).is_forward() {
                    self.forward_reached(index, node);
                } else {
                    self.backward_reached(index, node);
                }
            }
            SolverEvent::FieldTransition {
                listener,
                transition,
            } => self.on_field_transition(index, listener, transition),
            SolverEvent::CallTransition {
                listener,
                transition,
            } => self.on_call_transition(index, listener, transition),
            SolverEvent::ReturnFromCall {
                call_site,
                return_site,
                node,
            } => {
                let poi = self.call_site_poi(call_site, return_site);
                let returned = node.value.clone();
                self.start_visit(
                    index,
                    INode::Single(node),
                    ReachAction::FlowAllocation {
                        call_site: poi,
                        returned,
                    },
                );
            }
            SolverEvent::CallBypass {
                call_site,
                return_site,
                value,
            } => {
                let poi = self.call_site_poi(call_site, return_site);
                let query = self.registry.query(index).clone();
                let activations = self.call_site_pois[poi].add_by_passing_allocation(query, value);
                for activation in activations {
                    self.activate(poi, activation);
                }
            }
            SolverEvent::EmptyStackWitness { ticket, alloc } => {
                let ticket = &self.tickets[ticket];
                if let WitnessListener::Client(listener) = &ticket.listener {
                    listener.witness_found(&ticket.query, &alloc);
                }
                self.witnesses.insert((ticket.query.clone(), alloc));
            }
        }
    }

    fn backward_reached(&mut self, index: usize, node: Node) {
        let Some(instruction) = self.program.instruction_at(&node.stmt).cloned() else {
            return;
        };
        let query = self.registry.query(index).clone();
        match instruction {
            Instruction::New { dest, .. } | Instruction::Null { dest } if dest == node.value => {
                let allocation = Query::allocation(&self.program, node);
                self.backward_to_forward
                    .entry(query.clone())
                    .or_default()
                    .insert(allocation.clone());
                let forward = self.forward_solve(&allocation);
                if self.unbalanced_watch.insert(forward) {
                    let id = self.call_listener(CallListener::UnbalancedFlow);
                    self.registry
                        .solver_mut(forward)
                        .subscribe_call(Subscription::Any, id);
                }
                let tickets = self
                    .tickets_by_query
                    .get(&query)
                    .cloned()
                    .unwrap_or_default();
                for ticket in tickets {
                    self.registry
                        .solver_mut(forward)
                        .synched_empty_stack_reachable(query.node().clone(), ticket);
                }
            }
            Instruction::Load { dest, base, field } if dest == node.value => {
                self.spawn_backward_query(Query::backward(Node::new(
                    node.stmt.clone(),
                    base.clone(),
                )));
                let poi = self.field_poi(FieldAccess {
                    kind: PoiKind::Read,
                    stmt: node.stmt,
                    base,
                    field,
                    value: dest,
                });
                let pairs = self.field_pois[poi].add_flow_allocation(query);
                for (base, flow) in pairs {
                    self.execute(poi, base, flow);
                }
            }
            _ => {}
        }
    }

    fn forward_reached(&mut self, index: usize, node: Node) {
        let Some(instruction) = self.program.instruction_at(&node.stmt).cloned() else {
            return;
        };
        let query = self.registry.query(index).clone();
        match instruction {
            Instruction::Store { base, field, value } => {
                let access = FieldAccess {
                    kind: PoiKind::Write,
                    stmt: node.stmt.clone(),
                    base: base.clone(),
                    field,
                    value: value.clone(),
                };
                if value == node.value {
                    self.spawn_backward_query(Query::backward(Node::new(
                        node.stmt.clone(),
                        base.clone(),
                    )));
                    let poi = self.field_poi(access.clone());
                    let pairs = self.field_pois[poi].add_flow_allocation(query);
                    for (base, flow) in pairs {
                        self.execute(poi, base, flow);
                    }
                }
                if base == node.value {
                    let poi = self.field_poi(access);
                    self.watch_base(index, node, poi);
                }
            }
            Instruction::Load { dest, base, field } if base == node.value => {
                let poi = self.field_poi(FieldAccess {
                    kind: PoiKind::Read,
                    stmt: node.stmt.clone(),
                    base,
                    field,
                    value: dest,
                });
                match self.config.read_base_rule {
                    ReadBaseRule::EmptyFieldOnly => self.watch_base(index, node, poi),
                    ReadBaseRule::SeedTransition => self.start_visit(
                        index,
                        INode::Single(node),
                        ReachAction::BaseAllocation { poi },
                    ),
                }
            }
            _ => {}
        }
    }

    fn watch_base(&mut self, index: usize, node: Node, poi: usize) {
        let id = self.field_listener(FieldListener::BaseAllocation { poi });
        self.registry
            .solver_mut(index)
            .subscribe_field(Subscription::From(INode::Single(node)), id);
    }

    fn on_field_transition(&mut self, index: usize, listener: ListenerId, t: FieldTransition) {
        match self.field_listeners[listener.0].clone() {
            FieldListener::BaseAllocation { poi } => {
                if t.target == self.registry.solver(index).seed_state() && t.label.is_epsilon() {
                    self.add_base_allocation(index, poi);
                }
            }
            FieldListener::ImportAliases {
                poi,
                flow,
                base_stmt,
                flow_stmts,
            } => self.import_alias(index, poi, flow, &base_stmt, flow_stmts, t),
            FieldListener::Reach { visitor } => self.visit(visitor, t),
        }
    }

    fn on_call_transition(&mut self, index: usize, listener: ListenerId, t: CallTransition) {
        match self.call_listeners[listener.0] {
            CallListener::UnbalancedFlow => {
                if let CallState::Generated { location, .. } = t.target {
                    self.registry
                        .solver_mut(index)
                        .add_unbalanced_flow(location.method);
                }
            }
        }
    }

    fn add_base_allocation(&mut self, index: usize, poi: usize) {
        let query = self.registry.query(index).clone();
        let pairs = self.field_pois[poi].add_base_allocation(query);
        for (base, flow) in pairs {
            self.execute(poi, base, flow);
        }
    }

    /// Both ends of a field access are known: listen for the aliases of
    /// the base right after the access and import them into the flow query.
    fn execute(&mut self, poi: usize, base: Query, flow: Query) {
        let access = self.field_pois[poi].access.clone();
        debug!("Executing {access} with base {base} and flow {flow}");
        let base = self.registry.get_or_create(&base);
        let flow = self.registry.get_or_create(&flow);
        let succs = self.registry.solver(flow).get_succs_of(&access.stmt);
        if succs.is_empty() {
            panic!(
                "Field access {} has no successor for {}",
                access.stmt,
                self.registry.query(flow)
            );
        }

        let imports: Vec<(Statement, Vec<Statement>)> = match access.kind {
            PoiKind::Write => succs.into_iter().map(|s| (s.clone(), vec![s])).collect(),
            PoiKind::Read => vec![(access.stmt.clone(), succs)],
        };
        for (base_stmt, flow_stmts) in imports {
            let id = self.field_listener(FieldListener::ImportAliases {
                poi,
                flow,
                base_stmt,
                flow_stmts,
            });
            self.registry
                .solver_mut(base)
                .subscribe_field(Subscription::Any, id);
        }
    }

    fn import_alias(
        &mut self,
        base: usize,
        poi: usize,
        flow: usize,
        base_stmt: &Statement,
        flow_stmts: Vec<Statement>,
        t: FieldTransition,
    ) {
        let INode::Single(start) = &t.start else {
            return;
        };
        if &start.stmt != base_stmt {
            return;
        }
        let alias = start.value.clone();
        if !self.field_pois[poi].add_alias(self.registry.query(flow), alias.clone()) {
            return;
        }
        self.imported_aliases += 1;

        let access = self.field_pois[poi].access.clone();
        let connect = alias != access.base && alias != access.value;
        debug!(
            "Importing alias {} at {} into {}",
            alias.name,
            base_stmt,
            self.registry.query(flow)
        );
        for flow_stmt in flow_stmts {
            let aliased = Node::new(flow_stmt, alias.clone());
            self.start_visit(
                base,
                t.start.clone(),
                ReachAction::Import {
                    flow,
                    poi,
                    from: t.start.clone(),
                    to: INode::Single(aliased.clone()),
                    connect,
                },
            );
            if connect {
                self.registry
                    .solver_mut(flow)
                    .handle_poi(access.node(), aliased);
            }
        }
    }

    fn start_visit(&mut self, solver: usize, state: INode, action: ReachAction) {
        let visitor = self.visitors.len();
        let listener = self.field_listener(FieldListener::Reach { visitor });
        let mut visited = HashSet::new();
        visited.insert(state.clone());
        self.visitors.push(ReachVisitor {
            solver,
            listener,
            visited,
            action,
        });
        self.registry
            .solver_mut(solver)
            .subscribe_field(Subscription::From(state), listener);
    }

    fn visit(&mut self, visitor: usize, t: FieldTransition) {
        let source = self.visitors[visitor].solver;
        match self.visitors[visitor].action.clone() {
            ReachAction::Import {
                flow,
                poi,
                from,
                to,
                connect,
            } => {
                let rename = |s: &INode| if *s == from { to.clone() } else { s.clone() };
                let start = rename(&t.start);
                if connect && t.target == self.registry.solver(source).seed_state() {
                    let access = &self.field_pois[poi].access;
                    let (field, poi_node) = (access.field.clone(), access.node());
                    self.registry
                        .solver_mut(flow)
                        .connect_base(start.clone(), field, poi_node);
                }
                let copy = Transition::new(start, t.label.clone(), rename(&t.target));
                self.registry.solver_mut(flow).add_field_transition(copy);
            }
            ReachAction::FlowAllocation {
                call_site,
                returned,
            } => {
                if let INode::Alloc(fact) = &t.target {
                    if t.label.is_epsilon() {
                        let flow = FlowSource {
                            query: self.registry.query(source).clone(),
                            returned,
                            state: t.start.clone(),
                        };
                        let base = Query::allocation(&self.program, fact.clone());
                        let activations =
                            self.call_site_pois[call_site].add_flow_allocation(flow, base);
                        for activation in activations {
                            self.activate(call_site, activation);
                        }
                    }
                }
            }
            ReachAction::Splice { flow } => {
                self.registry
                    .solver_mut(flow)
                    .add_field_transition(t.clone());
            }
            ReachAction::BaseAllocation { poi } => {
                if t.target == self.registry.solver(source).seed_state() {
                    self.add_base_allocation(source, poi);
                }
            }
        }

        let visitor = &mut self.visitors[visitor];
        if visitor.visited.insert(t.target.clone()) {
            let listener = visitor.listener;
            self.registry
                .solver_mut(source)
                .subscribe_field(Subscription::From(t.target), listener);
        }
    }

    /// Unifies a value bypassing a call with a value returned from it.
    fn activate(&mut self, poi: usize, activation: Activation) {
        self.activations += 1;
        let return_site = self.call_site_pois[poi].return_site.clone();
        debug!(
            "Activating {} at {}: {} of {} aliases {} of {}",
            self.call_site_pois[poi].call_site,
            return_site,
            activation.value.name,
            activation.by_passing,
            activation.flow.returned.name,
            activation.flow.query
        );

        let by_passing = self.registry.get_or_create(&activation.by_passing);
        let flow = self.registry.get_or_create(&activation.flow.query);
        let source = Node::new(return_site.clone(), activation.value);
        self.start_visit(
            by_passing,
            INode::Single(source.clone()),
            ReachAction::Splice { flow },
        );

        let solver = self.registry.solver_mut(flow);
        if activation.flow.state.is_generated() {
            solver.connect_alias(source.clone(), activation.flow.state);
        }
        let returned = Node::new(return_site, activation.flow.returned);
        solver.add_normal_field_flow(returned.clone(), source.clone());
        solver.add_normal_call_flow(returned, source);
    }

    fn field_poi(&mut self, access: FieldAccess) -> usize {
        if let Some(index) = self.field_pois.get_index_of(&access) {
            return index;
        }
        self.field_pois
            .insert_full(access.clone(), FieldPoi::new(access))
            .0
    }

    fn call_site_poi(&mut self, call_site: Statement, return_site: Statement) -> usize {
        let key = (call_site, return_site);
        if let Some(index) = self.call_site_pois.get_index_of(&key) {
            return index;
        }
        let poi = CallSitePoi::new(key.0.clone(), key.1.clone());
        self.call_site_pois.insert_full(key, poi).0
    }

    fn field_listener(&mut self, listener: FieldListener) -> ListenerId {
        self.field_listeners.push(listener);
        ListenerId(self.field_listeners.len() - 1)
    }

    fn call_listener(&mut self, listener: CallListener) -> ListenerId {
        self.call_listeners.push(listener);
        ListenerId(self.call_listeners.len() - 1)
    }
}

/// Every field automaton side by side, states tagged with their query.
impl Graph for AliasAnalysis {
    type Node = String;
    type Weight = Field;

    fn nodes(&self) -> Vec<VisualNode<String>> {
        let mut nodes = vec![];
        for (query, solver) in self.registry.iter() {
            let seed = solver.seed_state();
            for state in solver.field_automaton().states() {
                nodes.push(VisualNode {
                    inner: format!("{state} in {query}"),
                    id: nodes.len(),
                    seed: state == seed,
                });
            }
        }
        nodes
    }

    fn edges(&self) -> Vec<Edge<String, Field>> {
        let nodes = self.nodes();
        let mut edges = vec![];
        let mut offset = 0;
        for (_, solver) in self.registry.iter() {
            let states = solver.field_automaton().states();
            let node = |state: &INode| {
                let index = states
                    .get_index_of(state)
                    .unwrap_or_else(|| panic!("{state} is not a state of its automaton"));
                nodes[offset + index].clone()
            };
            for t in solver.field_automaton().transitions() {
                edges.push(Edge {
                    from: node(&t.start),
                    to: node(&t.target),
                    weight: t.label.clone(),
                    kind: if t.label.is_epsilon() {
                        EdgeKind::Epsilon
                    } else {
                        EdgeKind::Field
                    },
                });
            }
            offset += states.len();
        }
        edges
    }
}
