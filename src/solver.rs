use std::collections::VecDeque;
use std::mem;
use std::rc::Rc;

use hashbrown::{HashMap, HashSet};
use indexmap::IndexSet;
use log::trace;

mod automaton;
mod flow;
mod nodes;
#[cfg(test)]
mod tests;

pub use automaton::{Automaton, EpsilonLabel, ListenerId, Subscription, Transition};
pub use nodes::{CallState, INode, Node};

use crate::program::{Field, Icfg, Method, Statement, Type, Value};
use flow::{CallOp, FieldOp, Rule};

pub type FieldTransition = Transition<INode, Field>;
pub type CallTransition = Transition<CallState, Statement>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
    Forward,
    Backward,
}

/// Notified once for every method a solver reaches.
pub trait ReachableMethodListener {
    fn reachable(&self, method: &Method);
}

/// Observable consequences of solving, collected in the solver's outbox.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum SolverEvent {
    /// A node became a witness: reached under some call context and
    /// connected to the seed in the field automaton.
    Reached(Node),
    FieldTransition {
        listener: ListenerId,
        transition: FieldTransition,
    },
    CallTransition {
        listener: ListenerId,
        transition: CallTransition,
    },
    ReturnFromCall {
        call_site: Statement,
        return_site: Statement,
        node: Node,
    },
    CallBypass {
        call_site: Statement,
        return_site: Statement,
        value: Value,
    },
    EmptyStackWitness {
        ticket: usize,
        alloc: Node,
    },
}

enum Work {
    Field(FieldTransition),
    Call(CallTransition),
}

/// Synchronized pushdown solver for a single query. The field automaton
/// tracks the access path of every reached value, the call automaton the
/// calling context it is reached in.
pub struct SyncSolver {
    direction: Direction,
    icfg: Rc<dyn Icfg>,
    seed: Node,
    field_automaton: Automaton<INode, Field>,
    call_automaton: Automaton<CallState, Statement>,
    worklist: VecDeque<Work>,
    outbox: VecDeque<SolverEvent>,
    emitted: HashSet<SolverEvent>,

    rules: HashMap<Node, Rc<[Rule]>>,
    field_flows: HashMap<Node, IndexSet<Node>>,
    call_flows: HashMap<Node, IndexSet<Node>>,
    pending_pops: HashMap<INode, IndexSet<Node>>,
    pending_exits: HashMap<CallState, IndexSet<(Statement, Node)>>,
    blocked_exits: HashMap<Method, Vec<(Node, CallState)>>,
    unbalanced: HashSet<Method>,

    allocated_types: HashSet<Type>,
    reachable_methods: IndexSet<Method>,
    method_listeners: Vec<Rc<dyn ReachableMethodListener>>,

    productive: HashSet<INode>,
    reached: IndexSet<Node>,
    empty_stack_requests: Vec<(Node, usize)>,
}

impl SyncSolver {
    pub fn new(direction: Direction, icfg: Rc<dyn Icfg>, seed: Node) -> Self {
        let mut productive = HashSet::new();
        productive.insert(INode::Alloc(seed.clone()));
        let mut unbalanced = HashSet::new();
        unbalanced.insert(seed.stmt.method.clone());
        Self {
            direction,
            icfg,
            seed,
            field_automaton: Automaton::new(),
            call_automaton: Automaton::new(),
            worklist: VecDeque::new(),
            outbox: VecDeque::new(),
            emitted: HashSet::new(),
            rules: HashMap::new(),
            field_flows: HashMap::new(),
            call_flows: HashMap::new(),
            pending_pops: HashMap::new(),
            pending_exits: HashMap::new(),
            blocked_exits: HashMap::new(),
            unbalanced,
            allocated_types: HashSet::new(),
            reachable_methods: IndexSet::new(),
            method_listeners: vec![],
            productive,
            reached: IndexSet::new(),
            empty_stack_requests: vec![],
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn seed(&self) -> &Node {
        &self.seed
    }

    pub fn seed_state(&self) -> INode {
        INode::Alloc(self.seed.clone())
    }

    /// Starts propagation at `initial`, reached with an empty field stack
    /// and an empty call stack.
    pub fn solve(&mut self, initial: Node) {
        trace!("{:?} solver {} starts at {initial}", self.direction, self.seed);
        self.add_field(Transition::new(
            INode::Single(initial.clone()),
            Field::Epsilon,
            self.seed_state(),
        ));
        self.add_call(Transition::new(
            CallState::Single(initial.value),
            initial.stmt,
            CallState::Initial(self.seed.value.clone()),
        ));
        self.saturate();
    }

    pub fn field_automaton(&self) -> &Automaton<INode, Field> {
        &self.field_automaton
    }

    pub fn call_automaton(&self) -> &Automaton<CallState, Statement> {
        &self.call_automaton
    }

    /// Subscribes to the field automaton. Matching transitions already
    /// present are replayed into the outbox.
    pub fn subscribe_field(&mut self, subscription: Subscription<INode>, listener: ListenerId) {
        for transition in self.field_automaton.subscribe(subscription, listener) {
            self.outbox
                .push_back(SolverEvent::FieldTransition { listener, transition });
        }
    }

    pub fn subscribe_call(&mut self, subscription: Subscription<CallState>, listener: ListenerId) {
        for transition in self.call_automaton.subscribe(subscription, listener) {
            self.outbox
                .push_back(SolverEvent::CallTransition { listener, transition });
        }
    }

    pub fn drain_events(&mut self) -> Vec<SolverEvent> {
        mem::take(&mut self.outbox).into()
    }

    pub fn add_field_transition(&mut self, t: FieldTransition) {
        self.add_field(t);
        self.saturate();
    }

    /// Records that `base_state` holds the value written or read at the
    /// field access `poi_node` under `field`.
    pub fn connect_base(&mut self, base_state: INode, field: Field, poi_node: Node) {
        self.add_field(Transition::new(base_state, field, INode::Single(poi_node)));
        self.saturate();
    }

    /// `node` shares the field stack found below `state`.
    pub fn connect_alias(&mut self, node: Node, state: INode) {
        self.add_pending_pop(state, node);
        self.saturate();
    }

    /// `alias_node` is reached under every calling context of `poi_node`.
    pub fn handle_poi(&mut self, poi_node: Node, alias_node: Node) {
        self.add_normal_call_flow(poi_node, alias_node);
    }

    pub fn add_normal_field_flow(&mut self, from: Node, to: Node) {
        if !self.field_flows.entry(from.clone()).or_default().insert(to.clone()) {
            return;
        }
        let existing: Vec<_> = self
            .field_automaton
            .outgoing_of(&INode::Single(from))
            .cloned()
            .collect();
        for t in existing {
            self.add_field(Transition::new(INode::Single(to.clone()), t.label, t.target));
        }
        self.saturate();
    }

    pub fn add_normal_call_flow(&mut self, from: Node, to: Node) {
        if !self.call_flows.entry(from.clone()).or_default().insert(to.clone()) {
            return;
        }
        for context in self.contexts_of(&from) {
            self.add_call(Transition::new(
                CallState::Single(to.value.clone()),
                to.stmt.clone(),
                context,
            ));
        }
        self.saturate();
    }

    /// Allows an empty call stack to unwind out of `method` into its callers.
    pub fn add_unbalanced_flow(&mut self, method: Method) {
        self.unbalance(method);
        self.saturate();
    }

    pub fn add_allocated_type(&mut self, ty: Type) -> bool {
        self.allocated_types.insert(ty)
    }

    pub fn allocated_types(&self) -> &HashSet<Type> {
        &self.allocated_types
    }

    pub fn register_reachable_method_listener(&mut self, listener: Rc<dyn ReachableMethodListener>) {
        if self
            .method_listeners
            .iter()
            .any(|l| Rc::ptr_eq(l, &listener))
        {
            return;
        }
        for method in &self.reachable_methods {
            listener.reachable(method);
        }
        self.method_listeners.push(listener);
    }

    pub fn reachable_methods(&self) -> &IndexSet<Method> {
        &self.reachable_methods
    }

    /// Emits an `EmptyStackWitness` with `ticket` once `node` is reached with
    /// an empty field stack.
    pub fn synched_empty_stack_reachable(&mut self, node: Node, ticket: usize) {
        if self
            .empty_stack_requests
            .iter()
            .any(|(n, t)| *n == node && *t == ticket)
        {
            return;
        }
        self.empty_stack_requests.push((node.clone(), ticket));
        self.check_empty_stack(&node);
    }

    pub fn get_succs_of(&self, stmt: &Statement) -> Vec<Statement> {
        self.icfg.successors_of(stmt)
    }

    pub fn reached_states(&self) -> &IndexSet<Node> {
        &self.reached
    }

    /// Whether `node` is reached with an empty field stack.
    pub fn reaches_with_empty_stack(&self, node: &Node) -> bool {
        self.rules.contains_key(node)
            && self.field_automaton.contains(&Transition::new(
                INode::Single(node.clone()),
                Field::Epsilon,
                self.seed_state(),
            ))
    }

    fn contexts_of(&self, node: &Node) -> Vec<CallState> {
        self.call_automaton
            .outgoing_of(&CallState::Single(node.value.clone()))
            .filter(|t| t.label == node.stmt)
            .map(|t| t.target.clone())
            .collect()
    }

    fn emit_once(&mut self, event: SolverEvent) {
        if self.emitted.insert(event.clone()) {
            self.outbox.push_back(event);
        }
    }

    fn add_field(&mut self, t: FieldTransition) {
        if let Some(listeners) = self.field_automaton.add_transition(t.clone()) {
            for listener in listeners {
                self.outbox.push_back(SolverEvent::FieldTransition {
                    listener,
                    transition: t.clone(),
                });
            }
            self.worklist.push_back(Work::Field(t));
        }
    }

    fn add_call(&mut self, t: CallTransition) {
        if let Some(listeners) = self.call_automaton.add_transition(t.clone()) {
            for listener in listeners {
                self.outbox.push_back(SolverEvent::CallTransition {
                    listener,
                    transition: t.clone(),
                });
            }
            self.worklist.push_back(Work::Call(t));
        }
    }

    fn saturate(&mut self) {
        while let Some(work) = self.worklist.pop_front() {
            match work {
                Work::Field(t) => self.process_field(t),
                Work::Call(t) => self.process_call(t),
            }
        }
    }

    fn process_field(&mut self, t: FieldTransition) {
        if self.productive.contains(&t.target) {
            self.mark_productive(t.start.clone());
        }

        if let INode::Single(node) = &t.start {
            if let Some(rules) = self.rules.get(node).cloned() {
                for rule in rules.iter() {
                    self.apply_field_rule(rule, &t);
                }
            }
            let flows: Vec<Node> = self
                .field_flows
                .get(node)
                .map(|f| f.iter().cloned().collect())
                .unwrap_or_default();
            for to in flows {
                self.add_field(Transition::new(INode::Single(to), t.label.clone(), t.target.clone()));
            }
            if t.label.is_epsilon() && t.target == self.seed_state() {
                self.check_empty_stack(node);
            }
        }

        let popped: Vec<Node> = self
            .pending_pops
            .get(&t.start)
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default();
        for node in popped {
            self.add_field(Transition::new(INode::Single(node), t.label.clone(), t.target.clone()));
        }
    }

    fn process_call(&mut self, t: CallTransition) {
        match &t.start {
            CallState::Single(value) => {
                let node = Node::new(t.label.clone(), value.clone());
                let rules = match self.rules.get(&node) {
                    Some(rules) => rules.clone(),
                    None => self.reach(&node),
                };
                for rule in rules.iter() {
                    self.apply_call_rule(&node, rule, &t.target);
                }
                let flows: Vec<Node> = self
                    .call_flows
                    .get(&node)
                    .map(|f| f.iter().cloned().collect())
                    .unwrap_or_default();
                for to in flows {
                    self.add_call(Transition::new(CallState::Single(to.value), to.stmt, t.target.clone()));
                }
            }
            CallState::Generated { .. } => {
                let exits: Vec<(Statement, Node)> = self
                    .pending_exits
                    .get(&t.start)
                    .map(|e| e.iter().cloned().collect())
                    .unwrap_or_default();
                for (call_site, to) in exits {
                    if call_site == t.label {
                        self.add_call(Transition::new(
                            CallState::Single(to.value),
                            to.stmt,
                            t.target.clone(),
                        ));
                    }
                }
            }
            CallState::Initial(_) => {}
        }
    }

    /// First visit of `node` in the call automaton.
    fn reach(&mut self, node: &Node) -> Rc<[Rule]> {
        let rules: Rc<[Rule]> = self.compute_rules(node).into();
        self.rules.insert(node.clone(), rules.clone());

        let method = node.stmt.method.clone();
        if self.reachable_methods.insert(method.clone()) {
            for listener in &self.method_listeners {
                listener.reachable(&method);
            }
        }

        let existing: Vec<_> = self
            .field_automaton
            .outgoing_of(&INode::Single(node.clone()))
            .cloned()
            .collect();
        for t in &existing {
            for rule in rules.iter() {
                self.apply_field_rule(rule, t);
            }
        }

        if self.productive.contains(&INode::Single(node.clone())) {
            self.witness(node.clone());
        }
        self.check_empty_stack(node);
        rules
    }

    fn apply_field_rule(&mut self, rule: &Rule, t: &FieldTransition) {
        let to = INode::Single(rule.to.clone());
        match &rule.field {
            FieldOp::Normal => {
                self.add_field(Transition::new(to, t.label.clone(), t.target.clone()));
            }
            FieldOp::Push(field) => {
                let generated = INode::Generated {
                    node: rule.to.clone(),
                    field: field.clone(),
                };
                self.add_field(Transition::new(to, field.clone(), generated.clone()));
                self.add_field(Transition::new(generated, t.label.clone(), t.target.clone()));
            }
            FieldOp::Pop(field) => {
                if &t.label == field {
                    self.add_pending_pop(t.target.clone(), rule.to.clone());
                }
            }
        }
    }

    /// `node` takes over everything below `state`, now and later.
    fn add_pending_pop(&mut self, state: INode, node: Node) {
        if !self.pending_pops.entry(state.clone()).or_default().insert(node.clone()) {
            return;
        }
        let existing: Vec<_> = self.field_automaton.outgoing_of(&state).cloned().collect();
        for t in existing {
            self.add_field(Transition::new(INode::Single(node.clone()), t.label, t.target));
        }
    }

    fn apply_call_rule(&mut self, from: &Node, rule: &Rule, context: &CallState) {
        let to = CallState::Single(rule.to.value.clone());
        match &rule.call {
            CallOp::Normal => {
                self.add_call(Transition::new(to, rule.to.stmt.clone(), context.clone()));
            }
            CallOp::Push { call_site } => {
                let frame = CallState::Generated {
                    value: rule.to.value.clone(),
                    location: rule.to.stmt.clone(),
                };
                self.add_call(Transition::new(to, rule.to.stmt.clone(), frame.clone()));
                self.add_call(Transition::new(frame, call_site.clone(), context.clone()));
            }
            CallOp::Exit { call_site } => match context {
                CallState::Generated { .. } => {
                    let entry = (call_site.clone(), rule.to.clone());
                    if !self
                        .pending_exits
                        .entry(context.clone())
                        .or_default()
                        .insert(entry)
                    {
                        return;
                    }
                    let callers: Vec<_> = self
                        .call_automaton
                        .outgoing_of(context)
                        .filter(|t| &t.label == call_site)
                        .map(|t| t.target.clone())
                        .collect();
                    for caller in callers {
                        self.add_call(Transition::new(to.clone(), rule.to.stmt.clone(), caller));
                    }
                }
                CallState::Initial(_) => {
                    let method = from.stmt.method.clone();
                    if self.unbalanced.contains(&method) {
                        self.add_call(Transition::new(to, rule.to.stmt.clone(), context.clone()));
                        self.unbalance(rule.to.stmt.method.clone());
                    } else {
                        self.blocked_exits
                            .entry(method)
                            .or_default()
                            .push((rule.to.clone(), context.clone()));
                    }
                }
                CallState::Single(_) => {}
            },
        }
    }

    fn unbalance(&mut self, method: Method) {
        let mut pending = vec![method];
        while let Some(method) = pending.pop() {
            if !self.unbalanced.insert(method.clone()) {
                continue;
            }
            trace!("{} returns unbalanced from {method}", self.seed);
            for (to, context) in self.blocked_exits.remove(&method).unwrap_or_default() {
                pending.push(to.stmt.method.clone());
                self.add_call(Transition::new(
                    CallState::Single(to.value),
                    to.stmt,
                    context,
                ));
            }
        }
    }

    fn mark_productive(&mut self, state: INode) {
        let mut stack = vec![state];
        while let Some(state) = stack.pop() {
            if !self.productive.insert(state.clone()) {
                continue;
            }
            if let INode::Single(node) = &state {
                if self.rules.contains_key(node) {
                    self.witness(node.clone());
                }
            }
            stack.extend(
                self.field_automaton
                    .incoming_of(&state)
                    .map(|t| t.start.clone()),
            );
        }
    }

    fn witness(&mut self, node: Node) {
        if self.reached.insert(node.clone()) {
            trace!("{} reaches {node}", self.seed);
            self.outbox.push_back(SolverEvent::Reached(node));
        }
    }

    fn check_empty_stack(&mut self, node: &Node) {
        if !self.reaches_with_empty_stack(node) {
            return;
        }
        let tickets: Vec<usize> = self
            .empty_stack_requests
            .iter()
            .filter(|(n, _)| n == node)
            .map(|(_, t)| *t)
            .collect();
        for ticket in tickets {
            self.emit_once(SolverEvent::EmptyStackWitness {
                ticket,
                alloc: self.seed.clone(),
            });
        }
    }
}
