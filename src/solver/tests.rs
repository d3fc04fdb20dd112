use std::cell::RefCell;
use std::rc::Rc;

use super::{
    Automaton, CallState, Direction, INode, ListenerId, Node, ReachableMethodListener,
    SolverEvent, Subscription, SyncSolver, Transition,
};
use crate::program::{Field, Icfg, Method, Program, Reversed, Statement, Type};

fn program(source: &str) -> Rc<Program> {
    Rc::new(source.parse().unwrap_or_else(|err| panic!("{err}")))
}

fn node(p: &Program, method: &str, label: &str, value: &str) -> Node {
    let stmt = p
        .statement(method, label)
        .unwrap_or_else(|| panic!("No statement {method}:{label}"));
    Node::new(stmt, p.value(method, value))
}

fn forward(p: &Rc<Program>, seed: Node) -> SyncSolver {
    let mut solver = SyncSolver::new(Direction::Forward, p.clone(), seed.clone());
    for succ in p.successors_of(&seed.stmt) {
        solver.solve(Node::new(succ, seed.value.clone()));
    }
    solver
}

fn backward(p: &Rc<Program>, seed: Node) -> SyncSolver {
    let reversed = Rc::new(Reversed::new(p.clone()));
    let mut solver = SyncSolver::new(Direction::Backward, reversed.clone(), seed.clone());
    for succ in reversed.successors_of(&seed.stmt) {
        solver.solve(Node::new(succ, seed.value.clone()));
    }
    solver
}

#[test]
fn automaton_replays_on_subscribe() {
    let mut automaton: Automaton<u32, char> = Automaton::new();
    automaton.add_transition(Transition::new(1, 'a', 2));
    automaton.add_transition(Transition::new(2, 'b', 3));

    let replay = automaton.subscribe(Subscription::From(2), ListenerId(0));
    assert_eq!(replay, vec![Transition::new(2, 'b', 3)]);
    let replay = automaton.subscribe(Subscription::Any, ListenerId(1));
    assert_eq!(replay.len(), 2);

    let notified = automaton.add_transition(Transition::new(2, 'c', 1));
    assert_eq!(notified, Some(vec![ListenerId(0), ListenerId(1)]));
    let notified = automaton.add_transition(Transition::new(3, 'c', 1));
    assert_eq!(notified, Some(vec![ListenerId(1)]));
    assert_eq!(automaton.add_transition(Transition::new(3, 'c', 1)), None);
    assert_eq!(automaton.len(), 4);
    assert_eq!(automaton.incoming_of(&1).count(), 2);
}

#[test]
fn subscription_replay_goes_to_outbox() {
    let p = program("method main() {\n  s: x = new A\n  y = x\n}");
    let mut solver = forward(&p, node(&p, "main", "s", "x"));
    solver.drain_events();

    solver.subscribe_field(Subscription::Any, ListenerId(7));
    let events = solver.drain_events();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| matches!(
        e,
        SolverEvent::FieldTransition {
            listener: ListenerId(7),
            ..
        }
    )));
}

const ASSIGNMENTS: &str = "
method main() {
  s: x = new A
    y = x
    x = null
  end: nop
}
";

#[test]
fn assignments_and_kills() {
    let p = program(ASSIGNMENTS);
    let solver = forward(&p, node(&p, "main", "s", "x"));
    let reached = solver.reached_states();
    assert!(reached.contains(&node(&p, "main", "end", "y")));
    assert!(!reached.contains(&node(&p, "main", "end", "x")));
    assert!(solver.reaches_with_empty_stack(&node(&p, "main", "end", "y")));
}

const FIELDS: &str = "
method main() {
  s: v = new V
    b = new B
    b.f = v
  load: r = b.f
    t = b.g
  end: nop
}
";

#[test]
fn forward_store_and_load() {
    let p = program(FIELDS);
    let solver = forward(&p, node(&p, "main", "s", "v"));
    let b_at_load = node(&p, "main", "load", "b");
    assert!(solver.reached_states().contains(&b_at_load));
    assert!(!solver.reaches_with_empty_stack(&b_at_load));
    assert!(solver.reaches_with_empty_stack(&node(&p, "main", "end", "r")));
    assert!(!solver.reached_states().contains(&node(&p, "main", "end", "t")));

    let generated = INode::Generated {
        node: b_at_load.clone(),
        field: Field::new("f"),
    };
    assert!(solver.field_automaton().contains(&Transition::new(
        INode::Single(b_at_load),
        Field::new("f"),
        generated
    )));
}

#[test]
fn backward_store_and_load() {
    let p = program(FIELDS);
    let solver = backward(&p, node(&p, "main", "end", "r"));
    let reached = solver.reached_states();
    assert!(reached.contains(&node(&p, "main", "s", "v")));
    // b is tracked with a pending field; its allocation is reached too
    assert!(reached.contains(&Node::new(
        Statement::new(&Method::new("main"), 2),
        p.value("main", "b")
    )));
}

const CONTEXTS: &str = "
method main() {
  a: x = new A
  b: y = new B
  c1: r1 = call id(x)
  c2: r2 = call id(y)
  end: nop
}

method id(p) {
    return p
}
";

#[test]
fn returns_respect_calling_context() {
    let p = program(CONTEXTS);
    let solver = forward(&p, node(&p, "main", "a", "x"));
    let reached = solver.reached_states();
    assert!(reached.contains(&node(&p, "main", "end", "r1")));
    assert!(!reached.contains(&node(&p, "main", "end", "r2")));
    assert!(reached.contains(&node(&p, "main", "end", "x")));
    assert!(solver.reachable_methods().contains(&Method::new("id")));

    let events = {
        let mut solver = forward(&p, node(&p, "main", "a", "x"));
        solver.drain_events()
    };
    assert!(events.iter().any(
        |e| matches!(e, SolverEvent::ReturnFromCall { node, .. } if &*node.value.name == "r1")
    ));
    // x is not an argument of the second call
    assert!(events.iter().any(
        |e| matches!(e, SolverEvent::CallBypass { value, .. } if &*value.name == "x")
    ));
}

#[test]
fn backward_enters_callee_through_return_value() {
    let p = program(CONTEXTS);
    let solver = backward(&p, node(&p, "main", "end", "r2"));
    let reached = solver.reached_states();
    assert!(reached.contains(&node(&p, "main", "b", "y")));
    assert!(!reached.contains(&node(&p, "main", "a", "x")));
}

const UNBALANCED: &str = "
method main() {
    r = call make()
  end: nop
}

method make() {
  s: o = new O
    return o
}
";

#[test]
fn unbalanced_return_from_seed_method() {
    let p = program(UNBALANCED);
    let solver = forward(&p, node(&p, "make", "s", "o"));
    assert!(solver.reaches_with_empty_stack(&node(&p, "main", "end", "r")));
}

const VIRTUAL: &str = "
method main() {
  s: a = new A
  c: r = vcall a.get()
  end: nop
}

method A.get(this) {
    return this
}
";

#[test]
fn virtual_calls_need_allocated_types() {
    let p = program(VIRTUAL);
    let seed = node(&p, "main", "s", "a");
    let end = node(&p, "main", "end", "r");

    let without = forward(&p, seed.clone());
    assert!(!without.reached_states().contains(&end));

    let mut with = SyncSolver::new(Direction::Forward, p.clone(), seed.clone());
    assert!(with.add_allocated_type(Type::new("A")));
    assert!(!with.add_allocated_type(Type::new("A")));
    with.solve(node(&p, "main", "c", "a"));
    assert!(with.reached_states().contains(&end));
}

#[test]
fn empty_stack_witness_is_reported_once() {
    let p = program(ASSIGNMENTS);
    let mut solver = forward(&p, node(&p, "main", "s", "x"));
    solver.drain_events();
    let target = node(&p, "main", "end", "y");
    solver.synched_empty_stack_reachable(target.clone(), 3);
    solver.synched_empty_stack_reachable(target, 3);
    let witnesses: Vec<_> = solver
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SolverEvent::EmptyStackWitness { ticket: 3, .. }))
        .collect();
    assert_eq!(witnesses.len(), 1);
}

#[derive(Default)]
struct Recorder(RefCell<Vec<Method>>);

impl ReachableMethodListener for Recorder {
    fn reachable(&self, method: &Method) {
        self.0.borrow_mut().push(method.clone());
    }
}

#[test]
fn reachable_method_listeners_see_past_methods() {
    let p = program(CONTEXTS);
    let mut solver = forward(&p, node(&p, "main", "a", "x"));
    let recorder = Rc::new(Recorder::default());
    solver.register_reachable_method_listener(recorder.clone());
    solver.register_reachable_method_listener(recorder.clone());
    assert_eq!(
        *recorder.0.borrow(),
        vec![Method::new("main"), Method::new("id")]
    );
}

#[test]
fn external_flows_apply_to_existing_and_future_facts() {
    let p = program(ASSIGNMENTS);
    let mut solver = forward(&p, node(&p, "main", "s", "x"));
    let from = node(&p, "main", "end", "y");
    let to = node(&p, "main", "end", "z");
    solver.add_normal_field_flow(from.clone(), to.clone());
    assert!(!solver.reached_states().contains(&to));
    solver.add_normal_call_flow(from, to.clone());
    assert!(solver.reaches_with_empty_stack(&to));
    assert!(solver
        .call_automaton()
        .transitions()
        .any(|t| t.start == CallState::Single(to.value.clone())));
}

#[test]
fn connected_base_holds_the_seed_under_its_field() {
    let p = program(ASSIGNMENTS);
    let mut solver = forward(&p, node(&p, "main", "s", "x"));
    let held = node(&p, "main", "end", "y");
    let holder = node(&p, "main", "end", "z");

    solver.connect_base(INode::Single(holder.clone()), Field::new("f"), held.clone());
    assert!(solver.field_automaton().contains(&Transition::new(
        INode::Single(holder.clone()),
        Field::new("f"),
        INode::Single(held.clone())
    )));
    // z has no calling context yet
    assert!(!solver.reached_states().contains(&holder));

    solver.handle_poi(held, holder.clone());
    assert!(solver.reached_states().contains(&holder));
    assert!(!solver.reaches_with_empty_stack(&holder));
}

#[test]
fn connected_alias_shares_the_stack_below_a_state() {
    let p = program(FIELDS);
    let mut solver = forward(&p, node(&p, "main", "s", "v"));
    let generated = INode::Generated {
        node: node(&p, "main", "load", "b"),
        field: Field::new("f"),
    };
    let alias = node(&p, "main", "end", "z");

    solver.connect_alias(alias.clone(), generated);
    assert!(solver.field_automaton().contains(&Transition::new(
        INode::Single(alias.clone()),
        Field::Epsilon,
        solver.seed_state()
    )));
    solver.handle_poi(node(&p, "main", "end", "r"), alias.clone());
    assert!(solver.reaches_with_empty_stack(&alias));
}
